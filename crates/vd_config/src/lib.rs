// crates/vd_config/src/lib.rs

//! VarDA Config Layer (Layer 2)
//!
//! 配置层，提供同化运行所需的全部参数。
//!
//! # 模块概览
//!
//! - [`varda_config`]: `VarDaConfig` 及其枚举选项
//! - [`error`]: 配置错误类型
//!
//! # 设计原则
//!
//! 1. **显式传递**: 配置在运行开始时构造一次，按引用传入各组件
//! 2. **尽早失败**: 所有可静态判定的错误在任何矩阵计算之前报告
//! 3. **JSON 序列化**: 缺省字段取默认值

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod varda_config;

pub use error::ConfigError;
pub use varda_config::{
    CompressionMethod, DecoderShape, InitialGuess, ObservationMode, ObservationNoise, VarDaConfig,
};
