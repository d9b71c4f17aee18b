// crates/vd_core/src/reduction.rs

//! 降维模型
//!
//! 统一线性与非线性两条路径的"降维坐标 → 状态增量"映射 g(w)：
//!
//! | 路径 | g(w) | Jg(w) | u(w) |
//! |------|------|-------|------|
//! | 线性 | V_trunc·w | V_trunc | u₀ + V_trunc·w |
//! | 非线性 | decode(w) − decode(0) | ∂decode/∂w | decode(w) |

use std::borrow::Cow;
use std::sync::Arc;

use nalgebra::{DMatrix, DVector};
use tracing::debug;

use vd_config::{CompressionMethod, InitialGuess};
use vd_foundation::{VdError, VdResult};

use crate::decoder::{Decoder, JacobianOptions};
use crate::svd::TruncatedBasis;

/// 降维模型
#[derive(Debug, Clone)]
pub enum ReductionModel {
    /// 截断 SVD 基
    Linear {
        /// 截断基
        basis: TruncatedBasis,
        /// 背景态 u₀（历史均值）
        background: DVector<f64>,
    },
    /// 预训练解码器
    Nonlinear {
        /// 解码器（只读共享）
        decoder: Arc<dyn Decoder>,
        /// 背景态 u₀ = decode(0)
        background: DVector<f64>,
        /// 雅可比组装选项
        jacobian: JacobianOptions,
    },
}

impl ReductionModel {
    /// 线性路径
    pub fn linear(basis: TruncatedBasis, background: DVector<f64>) -> VdResult<Self> {
        VdError::check_size("background", basis.n_state(), background.len())?;
        Ok(Self::Linear { basis, background })
    }

    /// 非线性路径，背景态取零隐变量的解码结果
    pub fn nonlinear(decoder: Arc<dyn Decoder>, jacobian: JacobianOptions) -> VdResult<Self> {
        let zero = DVector::zeros(decoder.latent_size());
        let background = decoder.decode(&zero)?;
        VdError::check_size("decoded background", decoder.output_size(), background.len())?;
        debug!(
            latent = decoder.latent_size(),
            n = decoder.output_size(),
            "非线性降维模型就绪"
        );
        Ok(Self::Nonlinear {
            decoder,
            background,
            jacobian,
        })
    }

    /// 降维方法
    pub fn method(&self) -> CompressionMethod {
        match self {
            Self::Linear { .. } => CompressionMethod::Svd,
            Self::Nonlinear { .. } => CompressionMethod::Ae,
        }
    }

    /// 降维坐标维度（k 或 d）
    pub fn reduced_dim(&self) -> usize {
        match self {
            Self::Linear { basis, .. } => basis.n_modes(),
            Self::Nonlinear { decoder, .. } => decoder.latent_size(),
        }
    }

    /// 状态维度 n
    pub fn n_state(&self) -> usize {
        self.background().len()
    }

    /// 背景态 u₀
    pub fn background(&self) -> &DVector<f64> {
        match self {
            Self::Linear { background, .. } | Self::Nonlinear { background, .. } => background,
        }
    }

    /// 截断基（仅线性路径）
    pub fn basis(&self) -> Option<&TruncatedBasis> {
        match self {
            Self::Linear { basis, .. } => Some(basis),
            Self::Nonlinear { .. } => None,
        }
    }

    fn check_w(&self, w: &DVector<f64>) -> VdResult<()> {
        VdError::check_size("reduced coordinate", self.reduced_dim(), w.len())
    }

    /// 状态增量 g(w)
    pub fn increment(&self, w: &DVector<f64>) -> VdResult<DVector<f64>> {
        self.check_w(w)?;
        match self {
            Self::Linear { basis, .. } => Ok(&basis.v_trunc * w),
            Self::Nonlinear {
                decoder,
                background,
                ..
            } => Ok(decoder.decode(w)? - background),
        }
    }

    /// g 在 w 处的雅可比（n × dim）
    pub fn jacobian_at(&self, w: &DVector<f64>) -> VdResult<Cow<'_, DMatrix<f64>>> {
        self.check_w(w)?;
        match self {
            Self::Linear { basis, .. } => Ok(Cow::Borrowed(&basis.v_trunc)),
            Self::Nonlinear {
                decoder, jacobian, ..
            } => Ok(Cow::Owned(decoder.jacobian(w, jacobian)?)),
        }
    }

    /// Jg(w)ᵀ · r
    pub fn jacobian_transpose_apply(
        &self,
        w: &DVector<f64>,
        r: &DVector<f64>,
    ) -> VdResult<DVector<f64>> {
        VdError::check_size("state residual", self.n_state(), r.len())?;
        let jac = self.jacobian_at(w)?;
        Ok(jac.tr_mul(r))
    }

    /// 重构全状态 u(w)
    pub fn reconstruct(&self, w: &DVector<f64>) -> VdResult<DVector<f64>> {
        self.check_w(w)?;
        match self {
            Self::Linear { basis, background } => Ok(background + &basis.v_trunc * w),
            Self::Nonlinear { decoder, .. } => decoder.decode(w),
        }
    }

    /// 初值 w₀
    pub fn initial_guess(&self, guess: InitialGuess) -> VdResult<DVector<f64>> {
        match (guess, self) {
            (InitialGuess::Zero, _) => Ok(DVector::zeros(self.reduced_dim())),
            (InitialGuess::Projected, Self::Linear { basis, background }) => {
                basis.project(background)
            }
            (InitialGuess::Projected, Self::Nonlinear { .. }) => Err(VdError::invalid_config(
                "initial_guess",
                "projected",
                "只适用于 SVD 路径",
            )),
        }
    }
}
