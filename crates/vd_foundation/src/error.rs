// crates/vd_foundation/src/error.rs

//! 错误处理模块，定义统一错误类型
//!
//! 提供 `VdError` 枚举和 `VdResult` 类型别名，用于整个同化流程的错误处理。
//!
//! # 错误分类
//!
//! 1. **配置错误**（致命）：在任何矩阵计算之前报告
//! 2. **形状/维度错误**（致命）：在调用边界立即报告期望与实际形状
//! 3. **运行时错误**：预算耗尽、数值异常、IO
//!
//! 优化器未收敛不是错误，由 `vd_core::optimizer::ConvergenceStatus` 表示。
//!
//! # 示例
//!
//! ```
//! use vd_foundation::error::{VdError, VdResult};
//!
//! fn check_modes(requested: usize, rank: usize) -> VdResult<()> {
//!     if requested > rank {
//!         return Err(VdError::ModeCountExceedsRank { requested, rank });
//!     }
//!     Ok(())
//! }
//! assert!(check_modes(6, 5).unwrap_err().is_config());
//! ```

use thiserror::Error;

/// 统一结果类型
pub type VdResult<T> = Result<T, VdError>;

/// VarDA 错误类型
#[derive(Error, Debug)]
pub enum VdError {
    // ========================================================================
    // 配置错误
    // ========================================================================

    /// 配置值无效
    #[error("配置值无效: {key}={value}, 原因: {reason}")]
    InvalidConfig {
        /// 配置键名
        key: String,
        /// 配置值
        value: String,
        /// 无效原因说明
        reason: String,
    },

    /// 不支持的降维方法
    #[error("不支持的降维方法: {method} (支持的方法: {supported:?})")]
    UnsupportedMethod {
        /// 输入的方法名
        method: String,
        /// 支持的方法列表
        supported: Vec<String>,
    },

    /// 同化时刻落在历史窗口内
    #[error("同化时刻 t_DA={t_da} 必须严格晚于历史窗口末端 hist_idx={hist_idx}，请减小 HIST_FRAC 或 TDA_IDX_FROM_END")]
    HistoricalOverlap {
        /// 同化时刻索引
        t_da: usize,
        /// 历史窗口列数
        hist_idx: usize,
    },

    /// 截断模态数超过偏差矩阵的秩
    #[error("截断模态数 {requested} 超过历史偏差矩阵的秩 {rank}")]
    ModeCountExceedsRank {
        /// 请求的模态数
        requested: usize,
        /// 数值秩
        rank: usize,
    },

    /// 观测数为零
    #[error("观测比例 {fraction} 在状态维度 {n} 下选不出任何观测")]
    NoObservations {
        /// 观测比例
        fraction: f64,
        /// 状态维度
        n: usize,
    },

    /// 非线性路径缺少解码器
    #[error("降维方法为 AE 但未提供解码器")]
    MissingDecoder,

    // ========================================================================
    // 形状错误
    // ========================================================================

    /// 矩阵形状不匹配
    #[error("矩阵形状不匹配: {name} 期望 {expected:?}, 实际 {actual:?}")]
    ShapeMismatch {
        /// 数据名称
        name: &'static str,
        /// 期望形状 (行, 列)
        expected: (usize, usize),
        /// 实际形状 (行, 列)
        actual: (usize, usize),
    },

    /// 向量长度不匹配
    #[error("数组大小不匹配: {name} 期望{expected}, 实际{actual}")]
    SizeMismatch {
        /// 数据名称
        name: &'static str,
        /// 期望大小
        expected: usize,
        /// 实际大小
        actual: usize,
    },

    /// 索引越界
    #[error("索引越界: {index_type} 索引 {index} 超出范围 0..{len}")]
    IndexOutOfBounds {
        /// 索引类别描述
        index_type: &'static str,
        /// 访问的索引
        index: usize,
        /// 上界（长度）
        len: usize,
    },

    // ========================================================================
    // 运行时错误
    // ========================================================================

    /// 计算预算耗尽
    #[error("{what} 超出时间预算: 已用 {elapsed_ms} ms, 预算 {budget_ms} ms")]
    BudgetExhausted {
        /// 被限制的计算
        what: &'static str,
        /// 已用时间
        elapsed_ms: u64,
        /// 预算
        budget_ms: u64,
    },

    /// 数值异常
    #[error("数值异常: {0}")]
    Numerical(String),

    /// 无效输入
    #[error("无效的输入数据: {message}")]
    InvalidInput {
        /// 说明无效原因
        message: String,
    },

    /// IO 错误
    #[error("IO错误: {message}")]
    Io {
        /// 描述性错误信息
        message: String,
        #[source]
        /// 可选的底层 IO 错误
        source: Option<std::io::Error>,
    },

    /// 序列化错误
    #[error("序列化错误: {message}")]
    Serialization {
        /// 序列化失败原因
        message: String,
    },
}

// ========================================================================
// 便捷构造方法
// ========================================================================

impl VdError {
    /// 配置值无效
    pub fn invalid_config(
        key: impl Into<String>,
        value: impl ToString,
        reason: impl Into<String>,
    ) -> Self {
        Self::InvalidConfig {
            key: key.into(),
            value: value.to_string(),
            reason: reason.into(),
        }
    }

    /// 不支持的方法
    pub fn unsupported_method(method: impl Into<String>, supported: &[impl AsRef<str>]) -> Self {
        Self::UnsupportedMethod {
            method: method.into(),
            supported: supported.iter().map(|s| s.as_ref().to_string()).collect(),
        }
    }

    /// 矩阵形状不匹配
    pub fn shape_mismatch(
        name: &'static str,
        expected: (usize, usize),
        actual: (usize, usize),
    ) -> Self {
        Self::ShapeMismatch {
            name,
            expected,
            actual,
        }
    }

    /// 数组大小不匹配
    pub fn size_mismatch(name: &'static str, expected: usize, actual: usize) -> Self {
        Self::SizeMismatch {
            name,
            expected,
            actual,
        }
    }

    /// 索引越界
    pub fn index_out_of_bounds(index_type: &'static str, index: usize, len: usize) -> Self {
        Self::IndexOutOfBounds {
            index_type,
            index,
            len,
        }
    }

    /// 数值异常
    pub fn numerical(message: impl Into<String>) -> Self {
        Self::Numerical(message.into())
    }

    /// 无效输入
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: message.into(),
        }
    }

    /// 序列化错误
    pub fn serialization(message: impl Into<String>) -> Self {
        Self::Serialization {
            message: message.into(),
        }
    }

    /// 是否为配置类错误
    pub fn is_config(&self) -> bool {
        matches!(
            self,
            Self::InvalidConfig { .. }
                | Self::UnsupportedMethod { .. }
                | Self::HistoricalOverlap { .. }
                | Self::ModeCountExceedsRank { .. }
                | Self::NoObservations { .. }
                | Self::MissingDecoder
        )
    }
}

// ========================================================================
// 验证辅助方法
// ========================================================================

impl VdError {
    /// 检查向量长度是否匹配
    #[inline]
    pub fn check_size(name: &'static str, expected: usize, actual: usize) -> VdResult<()> {
        if expected != actual {
            Err(Self::size_mismatch(name, expected, actual))
        } else {
            Ok(())
        }
    }

    /// 检查矩阵形状是否匹配
    #[inline]
    pub fn check_shape(
        name: &'static str,
        expected: (usize, usize),
        actual: (usize, usize),
    ) -> VdResult<()> {
        if expected != actual {
            Err(Self::shape_mismatch(name, expected, actual))
        } else {
            Ok(())
        }
    }

    /// 检查索引是否在范围内
    #[inline]
    pub fn check_index(index_type: &'static str, index: usize, len: usize) -> VdResult<()> {
        if index >= len {
            Err(Self::index_out_of_bounds(index_type, index, len))
        } else {
            Ok(())
        }
    }
}

/// 条件不满足时提前返回错误
///
/// ```
/// use vd_foundation::{ensure, VdError, VdResult};
///
/// fn positive(x: f64) -> VdResult<f64> {
///     ensure!(x > 0.0, VdError::invalid_input("x 必须为正"));
///     Ok(x)
/// }
/// assert!(positive(-1.0).is_err());
/// ```
#[macro_export]
macro_rules! ensure {
    ($cond:expr, $err:expr $(,)?) => {
        if !$cond {
            return Err($err.into());
        }
    };
}

// ========================================================================
// 标准库错误转换
// ========================================================================

impl From<std::io::Error> for VdError {
    fn from(err: std::io::Error) -> Self {
        Self::Io {
            message: err.to_string(),
            source: Some(err),
        }
    }
}

// ========================================================================
// 测试
// ========================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_overlap_message() {
        let err = VdError::HistoricalOverlap { t_da: 20, hist_idx: 30 };
        let msg = err.to_string();
        assert!(msg.contains("t_DA=20"));
        assert!(msg.contains("hist_idx=30"));
        assert!(err.is_config());
    }

    #[test]
    fn test_shape_mismatch_reports_both_shapes() {
        let err = VdError::shape_mismatch("H", (10, 100), (10, 99));
        let msg = err.to_string();
        assert!(msg.contains("(10, 100)"));
        assert!(msg.contains("(10, 99)"));
        assert!(!err.is_config());
    }

    #[test]
    fn test_unsupported_method_lists_supported() {
        let err = VdError::unsupported_method("PCA", &["SVD", "AE"]);
        assert!(err.to_string().contains("PCA"));
        assert!(err.to_string().contains("SVD"));
    }

    #[test]
    fn test_check_size() {
        assert!(VdError::check_size("test", 10, 10).is_ok());
        assert!(VdError::check_size("test", 10, 5).is_err());
    }

    #[test]
    fn test_check_shape() {
        assert!(VdError::check_shape("m", (2, 3), (2, 3)).is_ok());
        assert!(VdError::check_shape("m", (2, 3), (3, 2)).is_err());
    }

    #[test]
    fn test_check_index() {
        assert!(VdError::check_index("state", 5, 10).is_ok());
        assert!(VdError::check_index("state", 10, 10).is_err());
    }

    #[test]
    fn test_ensure_macro() {
        fn check(value: i32) -> VdResult<()> {
            ensure!(value > 0, VdError::invalid_input("value must be positive"));
            Ok(())
        }

        assert!(check(1).is_ok());
        assert!(check(-1).is_err());
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "test");
        let err: VdError = io_err.into();
        assert!(matches!(err, VdError::Io { .. }));
    }
}
