// crates/vd_foundation/src/validation.rs

//! 运行时验证工具
//!
//! 提供验证报告和错误/警告类型，用于配置与输入数据的批量检查。
//! 与 [`VdError`](crate::error::VdError) 的区别：报告会收集全部问题而不是在第一个错误处返回。
//!
//! # 示例
//!
//! ```
//! use vd_foundation::validation::{ValidationReport, ValidationError};
//!
//! let alpha = -1.0f64;
//! let mut report = ValidationReport::new();
//! if alpha <= 0.0 {
//!     report.add_error(ValidationError::OutOfRange {
//!         field: "alpha",
//!         value: alpha,
//!         min: 0.0,
//!         max: f64::MAX,
//!     });
//! }
//! assert!(report.has_errors());
//! ```

use std::fmt;

/// 验证报告
#[derive(Debug, Default)]
pub struct ValidationReport {
    /// 错误列表
    pub errors: Vec<ValidationError>,
    /// 警告列表
    pub warnings: Vec<ValidationWarning>,
}

impl ValidationReport {
    /// 创建空的验证报告
    pub fn new() -> Self {
        Self::default()
    }

    /// 添加错误
    pub fn add_error(&mut self, error: ValidationError) {
        self.errors.push(error);
    }

    /// 添加警告
    pub fn add_warning(&mut self, warning: ValidationWarning) {
        self.warnings.push(warning);
    }

    /// 是否有错误
    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    /// 是否有警告
    pub fn has_warnings(&self) -> bool {
        !self.warnings.is_empty()
    }

    /// 是否通过（无错误）
    pub fn is_valid(&self) -> bool {
        !self.has_errors()
    }

    /// 合并另一个报告
    pub fn merge(&mut self, other: ValidationReport) {
        self.errors.extend(other.errors);
        self.warnings.extend(other.warnings);
    }
}

impl fmt::Display for ValidationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "验证报告:")?;
        writeln!(f, "  错误: {} 个", self.errors.len())?;
        writeln!(f, "  警告: {} 个", self.warnings.len())?;

        for (i, err) in self.errors.iter().enumerate() {
            writeln!(f, "  E{}. {}", i + 1, err)?;
        }
        for (i, warn) in self.warnings.iter().enumerate() {
            writeln!(f, "  W{}. {}", i + 1, warn)?;
        }
        Ok(())
    }
}

/// 验证错误类型
#[derive(Debug, Clone, PartialEq)]
pub enum ValidationError {
    /// 非有限值
    NonFinite {
        /// 字段名称
        field: &'static str,
        /// 非有限的数值
        value: f64,
    },
    /// 数据超出范围
    OutOfRange {
        /// 字段名称
        field: &'static str,
        /// 实际值
        value: f64,
        /// 下界
        min: f64,
        /// 上界
        max: f64,
    },
    /// 一致性错误（多个字段之间的约束）
    Inconsistent {
        /// 错误描述
        message: String,
    },
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NonFinite { field, value } => {
                write!(f, "字段{}={} (非有限值)", field, value)
            }
            Self::OutOfRange {
                field,
                value,
                min,
                max,
            } => {
                write!(f, "字段{}={} 超出范围[{}, {}]", field, value, min, max)
            }
            Self::Inconsistent { message } => write!(f, "一致性错误: {}", message),
        }
    }
}

impl std::error::Error for ValidationError {}

/// 验证警告类型
#[derive(Debug, Clone, PartialEq)]
pub enum ValidationWarning {
    /// 数值偏大
    HighValue {
        /// 字段名称
        field: &'static str,
        /// 实际值
        value: f64,
        /// 阈值
        threshold: f64,
    },
    /// 数值偏小
    LowValue {
        /// 字段名称
        field: &'static str,
        /// 实际值
        value: f64,
        /// 阈值
        threshold: f64,
    },
    /// 自定义警告
    Custom {
        /// 自定义消息
        message: String,
    },
}

impl fmt::Display for ValidationWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::HighValue {
                field,
                value,
                threshold,
            } => write!(f, "字段{}={} 超过阈值{}", field, value, threshold),
            Self::LowValue {
                field,
                value,
                threshold,
            } => write!(f, "字段{}={} 低于阈值{}", field, value, threshold),
            Self::Custom { message } => write!(f, "{}", message),
        }
    }
}

// ============================================================================
// 验证辅助函数
// ============================================================================

/// 检查值是否为有限正数
pub fn check_positive(report: &mut ValidationReport, field: &'static str, value: f64) -> bool {
    if !value.is_finite() {
        report.add_error(ValidationError::NonFinite { field, value });
        false
    } else if value <= 0.0 {
        report.add_error(ValidationError::OutOfRange {
            field,
            value,
            min: 0.0,
            max: f64::MAX,
        });
        false
    } else {
        true
    }
}

/// 检查值是否在区间内
///
/// `open_min`/`open_max` 为 `true` 时对应端点不可取。
pub fn check_interval(
    report: &mut ValidationReport,
    field: &'static str,
    value: f64,
    (min, open_min): (f64, bool),
    (max, open_max): (f64, bool),
) -> bool {
    if !value.is_finite() {
        report.add_error(ValidationError::NonFinite { field, value });
        return false;
    }
    let below = if open_min { value <= min } else { value < min };
    let above = if open_max { value >= max } else { value > max };
    if below || above {
        report.add_error(ValidationError::OutOfRange {
            field,
            value,
            min,
            max,
        });
        false
    } else {
        true
    }
}

/// 检查值是否低于阈值并添加警告
pub fn warn_if_below(
    report: &mut ValidationReport,
    field: &'static str,
    value: f64,
    threshold: f64,
) {
    if value < threshold {
        report.add_warning(ValidationWarning::LowValue {
            field,
            value,
            threshold,
        });
    }
}

/// 检查值是否高于阈值并添加警告
pub fn warn_if_above(
    report: &mut ValidationReport,
    field: &'static str,
    value: f64,
    threshold: f64,
) {
    if value > threshold {
        report.add_warning(ValidationWarning::HighValue {
            field,
            value,
            threshold,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_positive() {
        let mut report = ValidationReport::new();
        assert!(check_positive(&mut report, "alpha", 1.0));
        assert!(!check_positive(&mut report, "alpha", 0.0));
        assert!(!check_positive(&mut report, "alpha", f64::INFINITY));
        assert_eq!(report.errors.len(), 2);
        assert!(matches!(report.errors[1], ValidationError::NonFinite { .. }));
    }

    #[test]
    fn test_check_interval_open_and_closed() {
        let mut report = ValidationReport::new();
        // (0, 1]
        assert!(check_interval(&mut report, "obs_frac", 1.0, (0.0, true), (1.0, false)));
        assert!(!check_interval(&mut report, "obs_frac", 0.0, (0.0, true), (1.0, false)));
        // (0, 1)
        assert!(!check_interval(&mut report, "hist_frac", 1.0, (0.0, true), (1.0, true)));
        assert_eq!(report.errors.len(), 2);
    }

    #[test]
    fn test_warnings_do_not_invalidate() {
        let mut report = ValidationReport::new();
        warn_if_below(&mut report, "obs_variance", 1e-12, 1e-8);
        warn_if_above(&mut report, "alpha", 1.0, 10.0);
        assert!(report.is_valid());
        assert!(report.has_warnings());
        assert_eq!(report.warnings.len(), 1);
    }

    #[test]
    fn test_merge_and_display() {
        let mut a = ValidationReport::new();
        a.add_error(ValidationError::Inconsistent {
            message: "t_DA 与历史窗口重叠".into(),
        });
        let mut b = ValidationReport::new();
        b.add_warning(ValidationWarning::Custom {
            message: "提示".into(),
        });
        a.merge(b);
        let text = a.to_string();
        assert!(text.contains("错误: 1 个"));
        assert!(text.contains("警告: 1 个"));
    }
}
