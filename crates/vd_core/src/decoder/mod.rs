// crates/vd_core/src/decoder/mod.rs

//! 解码器能力接口
//!
//! 非线性降维路径把预训练解码器视为黑盒：
//!
//! - `decode(latent) -> state`
//! - `output_gradient(latent, i)`：∂output_i/∂latent
//! - `jacobian(latent)`：完整 n × d 雅可比
//!
//! 默认雅可比为中心差分，步长 `h_j = ε^{1/3} · max(1, |w_j|)`，
//! 截断误差 O(h²)，总误差约 ε^{2/3} 量级。能做自动微分的实现应覆盖它。
//!
//! 解码器权重在整个求解期间只读。

pub mod mlp;

pub use mlp::{Activation, DenseLayer, MlpDecoder, NormalizationParams};

use std::fmt::Debug;
use std::time::{Duration, Instant};

use nalgebra::{DMatrix, DVector};

use vd_config::{DecoderShape, VarDaConfig};
use vd_foundation::{ensure, VdError, VdResult};

/// 雅可比组装选项
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JacobianOptions {
    /// 每批计算的列数
    pub batch_size: usize,
    /// 单次组装的墙钟预算
    pub budget: Option<Duration>,
}

impl Default for JacobianOptions {
    fn default() -> Self {
        Self {
            batch_size: 8,
            budget: None,
        }
    }
}

impl JacobianOptions {
    /// 从配置构造
    pub fn from_config(config: &VarDaConfig) -> Self {
        Self {
            batch_size: config.jacobian_batch_size.max(1),
            budget: config.jacobian_budget_ms.map(Duration::from_millis),
        }
    }

    /// 开始计时
    pub fn start(&self) -> JacobianBudget {
        JacobianBudget {
            started: Instant::now(),
            limit: self.budget,
        }
    }
}

/// 单次雅可比组装的计时器
#[derive(Debug, Clone, Copy)]
pub struct JacobianBudget {
    started: Instant,
    limit: Option<Duration>,
}

impl JacobianBudget {
    /// 已用时间
    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// 预算耗尽时返回 `BudgetExhausted`
    pub fn check(&self) -> VdResult<()> {
        let Some(limit) = self.limit else {
            return Ok(());
        };
        let elapsed = self.elapsed();
        if elapsed >= limit {
            return Err(VdError::BudgetExhausted {
                what: "decoder jacobian",
                elapsed_ms: elapsed.as_millis() as u64,
                budget_ms: limit.as_millis() as u64,
            });
        }
        Ok(())
    }
}

/// 可微解码器
pub trait Decoder: Send + Sync + Debug {
    /// 隐空间维度 d
    fn latent_size(&self) -> usize;

    /// 输出（状态）维度 n
    fn output_size(&self) -> usize;

    /// 解码
    fn decode(&self, latent: &DVector<f64>) -> VdResult<DVector<f64>>;

    /// 隐藏层宽度（自隐空间一侧起），未知时返回 `None`
    fn hidden_widths(&self) -> Option<Vec<usize>> {
        None
    }

    /// 完整雅可比 ∂decode/∂latent（n × d）
    fn jacobian(&self, latent: &DVector<f64>, options: &JacobianOptions) -> VdResult<DMatrix<f64>> {
        finite_difference_jacobian(self, latent, options)
    }

    /// 单个输出分量对隐变量的梯度 ∂output_i/∂latent（长度 d）
    fn output_gradient(&self, latent: &DVector<f64>, output_index: usize) -> VdResult<DVector<f64>> {
        VdError::check_index("decoder output", output_index, self.output_size())?;
        let jac = self.jacobian(latent, &JacobianOptions::default())?;
        Ok(jac.row(output_index).transpose())
    }
}

/// 中心差分步长
#[inline]
pub fn finite_difference_step(w: f64) -> f64 {
    f64::EPSILON.cbrt() * w.abs().max(1.0)
}

/// 中心差分雅可比
///
/// 按批推进，每批之后检查时间预算；预算耗尽时丢弃已算出的列。
pub fn finite_difference_jacobian<D: Decoder + ?Sized>(
    decoder: &D,
    latent: &DVector<f64>,
    options: &JacobianOptions,
) -> VdResult<DMatrix<f64>> {
    let d = decoder.latent_size();
    let n = decoder.output_size();
    VdError::check_size("latent", d, latent.len())?;

    let budget = options.start();
    let batch = options.batch_size.max(1);
    let mut jac = DMatrix::zeros(n, d);

    for start in (0..d).step_by(batch) {
        for j in start..(start + batch).min(d) {
            let h = finite_difference_step(latent[j]);
            let mut plus = latent.clone();
            let mut minus = latent.clone();
            plus[j] += h;
            minus[j] -= h;
            // 实际步长以浮点表示后的差值为准
            let width = plus[j] - minus[j];
            let diff = (decoder.decode(&plus)? - decoder.decode(&minus)?) / width;
            jac.set_column(j, &diff);
        }
        budget.check()?;
    }
    Ok(jac)
}

/// 检查解码器是否满足形状约定
///
/// `output_size` 必须等于状态维度 n，`latent_size` 与隐藏层宽度须与配置一致。
/// 配置中的隐藏层按自编码器顺序（自状态一侧起）给出。
pub fn check_decoder_shape(
    decoder: &dyn Decoder,
    n_state: usize,
    shape: &DecoderShape,
) -> VdResult<()> {
    VdError::check_size("decoder output", n_state, decoder.output_size())?;
    VdError::check_size("decoder latent", shape.latent_size, decoder.latent_size())?;
    if let Some(mut widths) = decoder.hidden_widths() {
        widths.reverse();
        ensure!(
            widths == shape.hidden_layers,
            VdError::invalid_config(
                "decoder.hidden_layers",
                format!("{:?}", shape.hidden_layers),
                format!("与解码器实际结构 {widths:?} 不一致")
            )
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    /// 解析可微的小解码器：u_i = sin(a_i·w₀) + b_i·w₁²
    #[derive(Debug)]
    struct Analytic {
        a: Vec<f64>,
        b: Vec<f64>,
    }

    impl Decoder for Analytic {
        fn latent_size(&self) -> usize {
            2
        }
        fn output_size(&self) -> usize {
            self.a.len()
        }
        fn decode(&self, w: &DVector<f64>) -> VdResult<DVector<f64>> {
            VdError::check_size("latent", 2, w.len())?;
            Ok(DVector::from_fn(self.a.len(), |i, _| {
                (self.a[i] * w[0]).sin() + self.b[i] * w[1] * w[1]
            }))
        }
    }

    fn analytic() -> Analytic {
        Analytic {
            a: vec![0.5, 1.0, -2.0],
            b: vec![1.0, -0.3, 0.0],
        }
    }

    #[test]
    fn test_finite_difference_matches_analytic() {
        let dec = analytic();
        let w = DVector::from_vec(vec![0.3, -1.2]);
        let jac = dec.jacobian(&w, &JacobianOptions::default()).unwrap();
        for i in 0..3 {
            let d0 = dec.a[i] * (dec.a[i] * w[0]).cos();
            let d1 = 2.0 * dec.b[i] * w[1];
            assert!((jac[(i, 0)] - d0).abs() < 1e-8);
            assert!((jac[(i, 1)] - d1).abs() < 1e-8);
        }
    }

    #[test]
    fn test_default_output_gradient_is_row() {
        let dec = analytic();
        let w = DVector::from_vec(vec![0.1, 0.4]);
        let g = dec.output_gradient(&w, 1).unwrap();
        let jac = dec.jacobian(&w, &JacobianOptions::default()).unwrap();
        assert_eq!(g[0], jac[(1, 0)]);
        assert_eq!(g[1], jac[(1, 1)]);
        assert!(dec.output_gradient(&w, 3).is_err());
    }

    #[test]
    fn test_zero_budget_exhausts() {
        let dec = analytic();
        let options = JacobianOptions {
            batch_size: 1,
            budget: Some(Duration::ZERO),
        };
        let err = dec.jacobian(&DVector::zeros(2), &options).unwrap_err();
        assert!(matches!(err, VdError::BudgetExhausted { .. }));
    }

    #[test]
    fn test_wrong_latent_length() {
        let dec = analytic();
        let err = dec
            .jacobian(&DVector::zeros(3), &JacobianOptions::default())
            .unwrap_err();
        assert!(matches!(err, VdError::SizeMismatch { .. }));
    }

    #[test]
    fn test_shape_contract() {
        let dec = analytic();
        let shape = DecoderShape {
            latent_size: 2,
            hidden_layers: vec![],
        };
        assert!(check_decoder_shape(&dec, 3, &shape).is_ok());
        assert!(check_decoder_shape(&dec, 4, &shape).is_err());
        let wrong_latent = DecoderShape {
            latent_size: 3,
            hidden_layers: vec![],
        };
        assert!(check_decoder_shape(&dec, 3, &wrong_latent).is_err());
    }
}
