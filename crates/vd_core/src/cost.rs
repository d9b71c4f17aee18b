// crates/vd_core/src/cost.rs

//! 3D-Var 代价函数与梯度
//!
//! ```text
//! J(w)  = α‖w‖² + (1/σ²)‖H·g(w) − d‖²
//! ∇J(w) = 2α·w + (2/σ²)·Jg(w)ᵀ·Hᵀ·(H·g(w) − d)
//! ```
//!
//! 其中 d = y − H·u₀。所有捕获量在构造后只读，同一 w 的两次求值结果完全相同。

use std::sync::Arc;

use nalgebra::DVector;
use tracing::debug;

use vd_config::VarDaConfig;
use vd_foundation::{ensure, VdError, VdResult};

use crate::observation::{ObservationOperator, ObservationSet};
use crate::reduction::ReductionModel;

/// 梯度检验结果
#[derive(Debug, Clone)]
pub struct GradientCheck {
    /// 解析梯度
    pub analytic: DVector<f64>,
    /// 中心差分梯度
    pub numeric: DVector<f64>,
    /// 最大相对误差 |g_a − g_n| / max(1, |g_n|)
    pub max_rel_error: f64,
}

/// 代价函数引擎
#[derive(Debug)]
pub struct CostFunctionEngine {
    reduction: ReductionModel,
    operator: Arc<dyn ObservationOperator>,
    innovation: DVector<f64>,
    alpha: f64,
    obs_variance: f64,
}

impl CostFunctionEngine {
    /// 由新息向量 d 构造
    pub fn new(
        reduction: ReductionModel,
        operator: Arc<dyn ObservationOperator>,
        innovation: DVector<f64>,
        alpha: f64,
        obs_variance: f64,
    ) -> VdResult<Self> {
        ensure!(
            alpha.is_finite() && alpha > 0.0,
            VdError::invalid_config("alpha", alpha, "必须为正")
        );
        ensure!(
            obs_variance.is_finite() && obs_variance > 0.0,
            VdError::invalid_config("obs_variance", obs_variance, "必须为正")
        );
        VdError::check_shape(
            "H",
            (innovation.len(), reduction.n_state()),
            (operator.n_obs(), operator.state_dim()),
        )?;
        Ok(Self {
            reduction,
            operator,
            innovation,
            alpha,
            obs_variance,
        })
    }

    /// 由观测集合构造：d = y − H·u₀
    pub fn from_observations(
        reduction: ReductionModel,
        operator: Arc<dyn ObservationOperator>,
        observations: &ObservationSet,
        config: &VarDaConfig,
    ) -> VdResult<Self> {
        VdError::check_size("observations", operator.n_obs(), observations.count())?;
        let innovation = operator.residual(reduction.background(), &observations.values)?;
        debug!(
            n_obs = innovation.len(),
            innovation_norm = innovation.norm(),
            "新息向量 d 已计算"
        );
        Self::new(
            reduction,
            operator,
            innovation,
            config.alpha,
            config.obs_variance,
        )
    }

    /// 降维坐标维度
    #[inline]
    pub fn reduced_dim(&self) -> usize {
        self.reduction.reduced_dim()
    }

    /// 降维模型
    #[inline]
    pub fn reduction(&self) -> &ReductionModel {
        &self.reduction
    }

    /// 新息向量 d
    #[inline]
    pub fn innovation(&self) -> &DVector<f64> {
        &self.innovation
    }

    /// 观测空间失配 H·g(w) − d
    fn misfit(&self, w: &DVector<f64>) -> VdResult<DVector<f64>> {
        let g = self.reduction.increment(w)?;
        Ok(self.operator.observe(&g)? - &self.innovation)
    }

    fn value_from_misfit(&self, w: &DVector<f64>, misfit: &DVector<f64>) -> f64 {
        self.alpha * w.norm_squared() + misfit.norm_squared() / self.obs_variance
    }

    fn gradient_from_misfit(&self, w: &DVector<f64>, misfit: &DVector<f64>) -> VdResult<DVector<f64>> {
        let back = self.operator.adjoint(misfit)?;
        let jt = self.reduction.jacobian_transpose_apply(w, &back)?;
        Ok(w * (2.0 * self.alpha) + jt * (2.0 / self.obs_variance))
    }

    /// 代价 J(w)
    pub fn cost(&self, w: &DVector<f64>) -> VdResult<f64> {
        let misfit = self.misfit(w)?;
        Ok(self.value_from_misfit(w, &misfit))
    }

    /// 梯度 ∇J(w)
    pub fn gradient(&self, w: &DVector<f64>) -> VdResult<DVector<f64>> {
        let misfit = self.misfit(w)?;
        self.gradient_from_misfit(w, &misfit)
    }

    /// 同一 w 处的代价与梯度（共享一次前向计算）
    pub fn cost_and_gradient(&self, w: &DVector<f64>) -> VdResult<(f64, DVector<f64>)> {
        let misfit = self.misfit(w)?;
        let value = self.value_from_misfit(w, &misfit);
        let grad = self.gradient_from_misfit(w, &misfit)?;
        Ok((value, grad))
    }

    /// 中心差分梯度检验
    ///
    /// 第 j 个分量步长为 `step · max(1, |w_j|)`。
    pub fn check_gradient(&self, w: &DVector<f64>, step: f64) -> VdResult<GradientCheck> {
        ensure!(
            step.is_finite() && step > 0.0,
            VdError::invalid_input(format!("差分步长必须为正: {step}"))
        );
        let analytic = self.gradient(w)?;
        let mut numeric = DVector::zeros(w.len());
        for j in 0..w.len() {
            let h = step * w[j].abs().max(1.0);
            let mut plus = w.clone();
            let mut minus = w.clone();
            plus[j] += h;
            minus[j] -= h;
            numeric[j] = (self.cost(&plus)? - self.cost(&minus)?) / (plus[j] - minus[j]);
        }
        let max_rel_error = analytic
            .iter()
            .zip(numeric.iter())
            .map(|(a, n)| (a - n).abs() / n.abs().max(1.0))
            .fold(0.0_f64, f64::max);
        Ok(GradientCheck {
            analytic,
            numeric,
            max_rel_error,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decoder::{Activation, JacobianOptions, MlpDecoder};
    use crate::observation::PointObservationOperator;
    use crate::svd::truncated_svd;
    use nalgebra::DMatrix;

    fn linear_engine(alpha: f64, variance: f64) -> CostFunctionEngine {
        let v = DMatrix::from_fn(20, 8, |i, j| ((i as f64 + 1.0) * (j as f64 + 0.3) * 0.21).sin());
        let basis = truncated_svd(&v, 4).unwrap();
        let reduction = ReductionModel::linear(basis, DVector::from_element(20, 0.5)).unwrap();
        let op = Arc::new(PointObservationOperator::build(&[1, 4, 6, 11, 15, 19], 20, 6).unwrap());
        let d = DVector::from_vec(vec![0.3, -0.2, 0.1, 0.5, -0.4, 0.05]);
        CostFunctionEngine::new(reduction, op, d, alpha, variance).unwrap()
    }

    fn nonlinear_engine() -> CostFunctionEngine {
        let dec = Arc::new(MlpDecoder::random(3, &[10, 10], 16, Activation::Tanh, 6).unwrap());
        let reduction = ReductionModel::nonlinear(dec, JacobianOptions::default()).unwrap();
        let op = Arc::new(PointObservationOperator::build(&[0, 3, 7, 8, 12], 16, 5).unwrap());
        let d = DVector::from_vec(vec![0.2, -0.1, 0.4, 0.0, -0.3]);
        CostFunctionEngine::new(reduction, op, d, 0.5, 0.1).unwrap()
    }

    #[test]
    fn test_cost_at_zero_is_scaled_innovation() {
        let engine = linear_engine(1.0, 0.01);
        let j0 = engine.cost(&DVector::zeros(4)).unwrap();
        let expected = engine.innovation().norm_squared() / 0.01;
        assert!((j0 - expected).abs() < 1e-10 * expected);
    }

    #[test]
    fn test_cost_is_idempotent() {
        for engine in [linear_engine(1.0, 0.01), nonlinear_engine()] {
            let w = DVector::from_fn(engine.reduced_dim(), |i, _| 0.1 * (i as f64 + 1.0));
            let a = engine.cost(&w).unwrap();
            let b = engine.cost(&w).unwrap();
            assert_eq!(a.to_bits(), b.to_bits());
            assert_eq!(engine.gradient(&w).unwrap(), engine.gradient(&w).unwrap());
        }
    }

    #[test]
    fn test_linear_gradient_matches_finite_difference() {
        let engine = linear_engine(2.0, 0.05);
        for w in [
            DVector::zeros(4),
            DVector::from_vec(vec![0.5, -1.0, 0.25, 2.0]),
            DVector::from_vec(vec![-3.0, 0.1, 0.7, -0.2]),
        ] {
            let check = engine.check_gradient(&w, 1e-6).unwrap();
            assert!(check.max_rel_error < 1e-4, "{}", check.max_rel_error);
        }
    }

    #[test]
    fn test_nonlinear_gradient_matches_finite_difference() {
        let engine = nonlinear_engine();
        for w in [
            DVector::zeros(3),
            DVector::from_vec(vec![0.4, -0.8, 0.2]),
        ] {
            let check = engine.check_gradient(&w, 1e-6).unwrap();
            assert!(check.max_rel_error < 1e-4, "{}", check.max_rel_error);
        }
    }

    #[test]
    fn test_cost_and_gradient_consistent() {
        let engine = nonlinear_engine();
        let w = DVector::from_vec(vec![0.1, 0.2, -0.3]);
        let (value, grad) = engine.cost_and_gradient(&w).unwrap();
        assert_eq!(value, engine.cost(&w).unwrap());
        assert_eq!(grad, engine.gradient(&w).unwrap());
    }

    #[test]
    fn test_wrong_w_length_is_error() {
        let engine = linear_engine(1.0, 0.01);
        assert!(matches!(
            engine.cost(&DVector::zeros(5)),
            Err(VdError::SizeMismatch { .. })
        ));
        assert!(engine.gradient(&DVector::zeros(3)).is_err());
    }

    #[test]
    fn test_operator_shape_mismatch_rejected() {
        let v = DMatrix::from_fn(10, 4, |i, j| ((i + j) as f64 * 0.4).cos() + (i * j) as f64 * 0.01);
        let basis = truncated_svd(&v, 2).unwrap();
        let reduction = ReductionModel::linear(basis, DVector::zeros(10)).unwrap();
        let op = Arc::new(PointObservationOperator::build(&[1, 2], 11, 2).unwrap());
        let err = CostFunctionEngine::new(reduction, op, DVector::zeros(2), 1.0, 1.0).unwrap_err();
        assert!(matches!(err, VdError::ShapeMismatch { name: "H", .. }));
    }
}
