// crates/vd_core/src/lib.rs

//! VarDA Core Layer (Layer 3)
//!
//! 降阶三维变分同化（3D-Var）的数值核心。
//!
//! # 模块概览
//!
//! - [`snapshot`]: 快照矩阵与历史窗口划分
//! - [`background`]: 背景态 u₀ 与偏差矩阵 V
//! - [`svd`]: 截断奇异值分解
//! - [`decoder`]: 可微解码器接口与全连接解码器
//! - [`reduction`]: 线性/非线性降维模型
//! - [`observation`]: 观测选取与选点观测算子
//! - [`cost`]: 代价函数与梯度
//! - [`optimizer`]: L-BFGS 求解
//! - [`evaluation`]: MAE 等误差评估
//! - [`synthetic`]: 合成快照
//! - [`pipeline`]: 完整同化流程
//!
//! # 示例
//!
//! ```no_run
//! use vd_config::VarDaConfig;
//! use vd_core::{SyntheticSnapshots, VarDaPipeline};
//!
//! let snapshots = SyntheticSnapshots::default().generate().unwrap();
//! let pipeline = VarDaPipeline::new(VarDaConfig::default()).unwrap();
//! let outcome = pipeline.run(&snapshots).unwrap();
//! println!("ref MAE = {}, DA MAE = {}", outcome.report.ref_mae(), outcome.report.da_mae());
//! ```
//!
//! # 特性
//!
//! - `parallel`（默认开启）：解码器雅可比按批并行计算列

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod background;
pub mod cost;
pub mod decoder;
pub mod evaluation;
pub mod observation;
pub mod optimizer;
pub mod pipeline;
pub mod reduction;
pub mod snapshot;
pub mod svd;
pub mod synthetic;

pub use background::BackgroundModel;
pub use cost::{CostFunctionEngine, GradientCheck};
pub use decoder::{
    check_decoder_shape, finite_difference_jacobian, Activation, Decoder, DenseLayer,
    JacobianBudget, JacobianOptions, MlpDecoder, NormalizationParams,
};
pub use evaluation::{AssimilationReport, ErrorMetrics, ResultEvaluator};
pub use observation::{
    observation_count, ObservationOperator, ObservationSelector, ObservationSet,
    PointObservationOperator,
};
pub use optimizer::{
    ConvergenceStatus, OptimizationOutcome, Optimizer, OptimizerSettings, DEFAULT_LBFGS_MEMORY,
};
pub use pipeline::{AssimilationOutcome, BasisSummary, VarDaPipeline};
pub use reduction::ReductionModel;
pub use snapshot::{HistoricalSplit, SnapshotMatrix};
pub use svd::{numerical_rank, truncated_svd, TruncatedBasis};
pub use synthetic::SyntheticSnapshots;
