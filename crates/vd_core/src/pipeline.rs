// crates/vd_core/src/pipeline.rs

//! 同化流程编排
//!
//! ```text
//! 快照 X ─> 历史划分 ─> 降维模型 (SVD | 解码器)
//!                 │
//!                 └─> u_c ─> 观测选取 ─> H ─> d = y − H·u₀
//!                                             │
//!                         CostFunctionEngine ─> L-BFGS ─> w* ─> 评估
//! ```
//!
//! 所有可静态判定的配置错误（未知方法、缺少解码器、历史窗口重叠、观测数为零）
//! 都在任何矩阵分解之前报告。

use std::sync::Arc;

use nalgebra::DVector;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use vd_config::{CompressionMethod, VarDaConfig};
use vd_foundation::{VdError, VdResult};

use crate::background::BackgroundModel;
use crate::cost::CostFunctionEngine;
use crate::decoder::{check_decoder_shape, Decoder, JacobianOptions};
use crate::evaluation::{AssimilationReport, ResultEvaluator};
use crate::observation::{ObservationSelector, ObservationSet, PointObservationOperator};
use crate::optimizer::{OptimizationOutcome, Optimizer, OptimizerSettings};
use crate::reduction::ReductionModel;
use crate::snapshot::{HistoricalSplit, SnapshotMatrix};
use crate::svd::truncated_svd;

/// 截断基摘要（线性路径）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BasisSummary {
    /// 保留模态数
    pub n_modes: usize,
    /// 偏差矩阵数值秩
    pub rank: usize,
    /// 全部奇异值（降序）
    pub singular_values: Vec<f64>,
    /// 保留模态捕获的方差比例
    pub captured_variance: f64,
    /// 秩 k 重构误差 ‖V − U_k S_k W_kᵀ‖_F
    pub reconstruction_error: f64,
}

/// 一次同化运行的全部结果
#[derive(Debug, Clone)]
pub struct AssimilationOutcome {
    /// 降维方法
    pub method: CompressionMethod,
    /// 历史划分
    pub split: HistoricalSplit,
    /// 截断基摘要（仅线性路径）
    pub basis: Option<BasisSummary>,
    /// 观测
    pub observations: ObservationSet,
    /// 初值 w₀
    pub w0: DVector<f64>,
    /// 优化结果
    pub optimization: OptimizationOutcome,
    /// 评估报告
    pub report: AssimilationReport,
    /// 背景态 u₀
    pub background: DVector<f64>,
    /// 真值 u_c
    pub control_state: DVector<f64>,
}

/// 同化流程
#[derive(Debug, Clone)]
pub struct VarDaPipeline {
    config: VarDaConfig,
    decoder: Option<Arc<dyn Decoder>>,
}

impl VarDaPipeline {
    /// 以校验过的配置创建
    pub fn new(config: VarDaConfig) -> VdResult<Self> {
        config.validate()?;
        Ok(Self {
            config,
            decoder: None,
        })
    }

    /// 提供非线性路径所需的解码器
    pub fn with_decoder(mut self, decoder: Arc<dyn Decoder>) -> Self {
        self.decoder = Some(decoder);
        self
    }

    /// 配置
    pub fn config(&self) -> &VarDaConfig {
        &self.config
    }

    /// 执行同化
    pub fn run(&self, snapshots: &SnapshotMatrix) -> VdResult<AssimilationOutcome> {
        let config = &self.config;
        let n = snapshots.n_state();
        let method = config.compression_method;

        let decoder = match method {
            CompressionMethod::Ae => Some(self.decoder.clone().ok_or(VdError::MissingDecoder)?),
            CompressionMethod::Svd => None,
        };

        let split = HistoricalSplit::from_config(snapshots.n_steps(), config)?;
        let selector = ObservationSelector::from_config(config);
        let expected_obs = selector.expected_count(n)?;
        info!(
            n,
            m = snapshots.n_steps(),
            hist_idx = split.hist_idx,
            t_da = split.t_da,
            method = %method,
            expected_obs,
            "历史划分完成"
        );

        let control_state = split.control_state(snapshots)?;

        let (reduction, basis) = match decoder {
            None => {
                let model = BackgroundModel::build(split.history(snapshots)?)?;
                let truncated = truncated_svd(&model.deviations, config.number_modes)?;
                let summary = BasisSummary {
                    n_modes: truncated.n_modes(),
                    rank: truncated.rank,
                    singular_values: truncated.all_singular_values.iter().copied().collect(),
                    captured_variance: truncated.captured_variance_fraction(),
                    reconstruction_error: truncated.reconstruction_error(&model.deviations)?,
                };
                info!(
                    modes = summary.n_modes,
                    rank = summary.rank,
                    captured_variance = summary.captured_variance,
                    "截断 SVD 降维完成"
                );
                (ReductionModel::linear(truncated, model.background)?, Some(summary))
            }
            Some(decoder) => {
                check_decoder_shape(decoder.as_ref(), n, &config.decoder)?;
                let reduction =
                    ReductionModel::nonlinear(decoder, JacobianOptions::from_config(config))?;
                info!(latent = reduction.reduced_dim(), "解码器降维就绪");
                (reduction, None)
            }
        };
        let background = reduction.background().clone();

        let observations = selector.select(&control_state)?;
        let operator =
            PointObservationOperator::build(&observations.indices, n, observations.count())?;
        info!(count = observations.count(), "观测选取完成");

        let engine = CostFunctionEngine::from_observations(
            reduction,
            Arc::new(operator),
            &observations,
            config,
        )?;
        let w0 = engine.reduction().initial_guess(config.initial_guess)?;

        let optimizer = Optimizer::new(OptimizerSettings::from_config(config));
        let optimization = optimizer.minimize(&engine, &w0)?;

        let report = ResultEvaluator::evaluate(engine.reduction(), &optimization.w_star, &control_state)?;
        if !report.improved() {
            warn!(
                ref_mae = report.ref_mae(),
                da_mae = report.da_mae(),
                "同化未降低 MAE"
            );
        }

        Ok(AssimilationOutcome {
            method,
            split,
            basis,
            observations,
            w0,
            optimization,
            report,
            background,
            control_state,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decoder::{Activation, MlpDecoder};
    use crate::synthetic::SyntheticSnapshots;
    use vd_config::DecoderShape;

    fn snapshots() -> SnapshotMatrix {
        SyntheticSnapshots {
            n_state: 40,
            n_steps: 20,
            ..SyntheticSnapshots::default()
        }
        .generate()
        .unwrap()
    }

    #[test]
    fn test_invalid_config_rejected_at_construction() {
        let config = VarDaConfig {
            alpha: 0.0,
            ..VarDaConfig::default()
        };
        let err = VarDaPipeline::new(config).unwrap_err();
        assert!(err.is_config());
    }

    #[test]
    fn test_missing_decoder() {
        let config = VarDaConfig {
            compression_method: CompressionMethod::Ae,
            ..VarDaConfig::default()
        };
        let err = VarDaPipeline::new(config).unwrap().run(&snapshots()).unwrap_err();
        assert!(matches!(err, VdError::MissingDecoder));
    }

    #[test]
    fn test_linear_run_produces_summary() {
        let config = VarDaConfig {
            number_modes: 3,
            ..VarDaConfig::default()
        };
        let out = VarDaPipeline::new(config).unwrap().run(&snapshots()).unwrap();
        let basis = out.basis.unwrap();
        assert_eq!(basis.n_modes, 3);
        assert_eq!(out.w0.len(), 3);
        assert_eq!(out.optimization.w_star.len(), 3);
        assert_eq!(out.observations.count(), 20);
        assert_eq!(out.split.t_da, 19);
    }

    #[test]
    fn test_decoder_shape_contract_enforced() {
        let dec = Arc::new(MlpDecoder::random(2, &[6, 5], 40, Activation::Tanh, 0).unwrap());
        let config = VarDaConfig {
            compression_method: CompressionMethod::Ae,
            decoder: DecoderShape {
                latent_size: 2,
                hidden_layers: vec![6, 5],
            },
            ..VarDaConfig::default()
        };
        // 自编码器顺序为 [5, 6]，与 [6, 5] 不符
        let err = VarDaPipeline::new(config)
            .unwrap()
            .with_decoder(dec)
            .run(&snapshots())
            .unwrap_err();
        assert!(err.is_config());
    }
}
