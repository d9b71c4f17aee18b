// crates/vd_core/src/evaluation.rs

//! 同化结果评估
//!
//! 按降维路径重构 u_DA，分别计算背景态与同化态相对真值 u_c 的逐分量绝对误差。
//! `da_mae < ref_mae` 是统计意义上的期望，不作为强制约束。

use nalgebra::DVector;
use serde::{Deserialize, Serialize};
use tracing::info;

use vd_foundation::{ensure, VdError, VdResult};

use crate::reduction::ReductionModel;

/// 误差统计
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ErrorMetrics {
    /// 平均绝对误差
    pub mae: f64,
    /// 均方根误差
    pub rmse: f64,
    /// 最大绝对误差
    pub max_abs: f64,
}

impl ErrorMetrics {
    /// 由逐分量绝对误差计算
    pub fn from_abs_errors(abs_errors: &DVector<f64>) -> Self {
        let n = abs_errors.len().max(1) as f64;
        Self {
            mae: abs_errors.sum() / n,
            rmse: (abs_errors.norm_squared() / n).sqrt(),
            max_abs: abs_errors.iter().copied().fold(0.0, f64::max),
        }
    }
}

/// 评估报告
#[derive(Debug, Clone)]
pub struct AssimilationReport {
    /// 同化态 u_DA
    pub u_da: DVector<f64>,
    /// |u₀ − u_c|
    pub ref_abs_error: DVector<f64>,
    /// |u_DA − u_c|
    pub da_abs_error: DVector<f64>,
    /// 背景态误差统计
    pub reference: ErrorMetrics,
    /// 同化态误差统计
    pub assimilated: ErrorMetrics,
}

impl AssimilationReport {
    /// 背景态 MAE
    #[inline]
    pub fn ref_mae(&self) -> f64 {
        self.reference.mae
    }

    /// 同化态 MAE
    #[inline]
    pub fn da_mae(&self) -> f64 {
        self.assimilated.mae
    }

    /// da_mae / ref_mae（背景态恰好等于真值时为 NaN）
    pub fn improvement_ratio(&self) -> f64 {
        if self.reference.mae == 0.0 {
            f64::NAN
        } else {
            self.assimilated.mae / self.reference.mae
        }
    }

    /// 同化是否降低了 MAE
    pub fn improved(&self) -> bool {
        self.da_mae() < self.ref_mae()
    }
}

/// 结果评估器
#[derive(Debug, Clone, Copy, Default)]
pub struct ResultEvaluator;

impl ResultEvaluator {
    /// 重构 u_DA 并与真值比较
    pub fn evaluate(
        reduction: &ReductionModel,
        w_star: &DVector<f64>,
        u_c: &DVector<f64>,
    ) -> VdResult<AssimilationReport> {
        VdError::check_size("control state", reduction.n_state(), u_c.len())?;
        let u_da = reduction.reconstruct(w_star)?;
        ensure!(
            u_da.iter().all(|v| v.is_finite()),
            VdError::numerical("同化态含非有限值")
        );

        let ref_abs_error = (reduction.background() - u_c).abs();
        let da_abs_error = (&u_da - u_c).abs();
        let reference = ErrorMetrics::from_abs_errors(&ref_abs_error);
        let assimilated = ErrorMetrics::from_abs_errors(&da_abs_error);

        info!(
            ref_mae = reference.mae,
            da_mae = assimilated.mae,
            ref_rmse = reference.rmse,
            da_rmse = assimilated.rmse,
            "评估完成"
        );

        Ok(AssimilationReport {
            u_da,
            ref_abs_error,
            da_abs_error,
            reference,
            assimilated,
        })
    }
}
