// crates/vd_foundation/src/lib.rs

//! VarDA Foundation Layer
//!
//! 基础层，提供整个同化流程共享的最小抽象。
//!
//! # 模块概览
//!
//! - [`error`]: 统一错误类型 `VdError` 与形状/范围检查
//! - [`validation`]: 批量验证报告
//!
//! # 层级架构
//!
//! ```text
//! Layer 4: vd_cli        ─> 命令行、CSV 载入、结果输出
//! Layer 3: vd_core       ─> 背景模型、观测、代价函数、优化、评估
//! Layer 2: vd_config     ─> VarDaConfig
//! Layer 1: vd_foundation ─> VdError, ValidationReport (本层)
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod validation;

pub use error::{VdError, VdResult};
pub use validation::{ValidationError, ValidationReport, ValidationWarning};

/// Prelude 模块，包含常用类型
pub mod prelude {
    pub use crate::ensure;
    pub use crate::error::{VdError, VdResult};
    pub use crate::validation::{ValidationError, ValidationReport, ValidationWarning};
}
