// crates/vd_core/src/decoder/mlp.rs

//! 全连接解码器
//!
//! 结构：latent(d) → hidden₁ → … → output(n)，每层 `x' = σ(W x + b)`，
//! 最后可选反归一化 `u = x · std + mean`。
//!
//! 提供三种导数：
//!
//! - 前向模式对偶数（`num_dual::Dual64`）：每个隐变量方向一次前向传播得到一列
//! - 显式链式法则：`M ← diag(σ'(a)) · W · M`，一次得到整个雅可比
//! - 反向传播：单个输出分量对隐变量的梯度
//!
//! 权重文件为 JSON，`weights` 按行给出（out × in）。

use nalgebra::{DMatrix, DVector};
use num_dual::{Dual64, DualNum};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::debug;

#[cfg(feature = "parallel")]
use rayon::prelude::*;

use super::{Decoder, JacobianOptions};
use vd_foundation::{ensure, VdError, VdResult};

/// 激活函数
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Activation {
    /// 恒等
    Identity,
    /// 双曲正切
    #[default]
    Tanh,
    /// 线性整流（0 处导数取 0）
    Relu,
    /// Logistic
    Sigmoid,
}

impl Activation {
    /// 作用于任意对偶数
    #[inline]
    pub fn apply<D: DualNum<f64> + Copy>(self, x: D) -> D {
        match self {
            Self::Identity => x,
            Self::Tanh => x.tanh(),
            Self::Relu => {
                if x.re() > 0.0 {
                    x
                } else {
                    D::from(0.0)
                }
            }
            Self::Sigmoid => (D::from(1.0) + (-x).exp()).recip(),
        }
    }

    /// 作用于实数
    #[inline]
    pub fn value(self, x: f64) -> f64 {
        match self {
            Self::Identity => x,
            Self::Tanh => x.tanh(),
            Self::Relu => x.max(0.0),
            Self::Sigmoid => 1.0 / (1.0 + (-x).exp()),
        }
    }

    /// 对激活前输入的导数 σ'(a)
    #[inline]
    pub fn derivative(self, a: f64) -> f64 {
        match self {
            Self::Identity => 1.0,
            Self::Tanh => {
                let t = a.tanh();
                1.0 - t * t
            }
            Self::Relu => {
                if a > 0.0 {
                    1.0
                } else {
                    0.0
                }
            }
            Self::Sigmoid => {
                let s = 1.0 / (1.0 + (-a).exp());
                s * (1.0 - s)
            }
        }
    }
}

/// 全连接层
#[derive(Debug, Clone)]
pub struct DenseLayer {
    /// 权重（out × in）
    pub weights: DMatrix<f64>,
    /// 偏置（长度 out）
    pub bias: DVector<f64>,
    /// 激活函数
    pub activation: Activation,
}

impl DenseLayer {
    /// 创建并检查形状
    pub fn new(weights: DMatrix<f64>, bias: DVector<f64>, activation: Activation) -> VdResult<Self> {
        VdError::check_size("layer bias", weights.nrows(), bias.len())?;
        ensure!(
            weights.nrows() > 0 && weights.ncols() > 0,
            VdError::invalid_input("全连接层权重不能为空")
        );
        ensure!(
            weights.iter().chain(bias.iter()).all(|v| v.is_finite()),
            VdError::numerical("全连接层参数含非有限值")
        );
        Ok(Self {
            weights,
            bias,
            activation,
        })
    }

    /// 输入宽度
    #[inline]
    pub fn input_size(&self) -> usize {
        self.weights.ncols()
    }

    /// 输出宽度
    #[inline]
    pub fn output_size(&self) -> usize {
        self.weights.nrows()
    }

    /// 激活前输入 a = W x + b
    #[inline]
    fn pre_activation(&self, x: &DVector<f64>) -> DVector<f64> {
        &self.weights * x + &self.bias
    }
}

/// 输出反归一化参数：u = x · std + mean
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizationParams {
    /// 均值
    pub mean: Vec<f64>,
    /// 标准差
    pub std: Vec<f64>,
}

/// 多层感知机解码器
#[derive(Debug, Clone)]
pub struct MlpDecoder {
    layers: Vec<DenseLayer>,
    normalization: Option<NormalizationParams>,
}

impl MlpDecoder {
    /// 由层序列创建，检查相邻层宽度衔接
    pub fn new(layers: Vec<DenseLayer>, normalization: Option<NormalizationParams>) -> VdResult<Self> {
        ensure!(!layers.is_empty(), VdError::invalid_input("解码器至少需要一层"));
        for pair in layers.windows(2) {
            VdError::check_size("layer input", pair[0].output_size(), pair[1].input_size())?;
        }
        let decoder = Self {
            layers,
            normalization: None,
        };
        match normalization {
            Some(params) => decoder.with_normalization(params),
            None => Ok(decoder),
        }
    }

    /// 随机初始化（Xavier 均匀分布），最后一层为恒等激活
    pub fn random(
        latent_size: usize,
        hidden: &[usize],
        output_size: usize,
        activation: Activation,
        seed: u64,
    ) -> VdResult<Self> {
        let mut rng = StdRng::seed_from_u64(seed);
        let mut widths = Vec::with_capacity(hidden.len() + 2);
        widths.push(latent_size);
        widths.extend_from_slice(hidden);
        widths.push(output_size);

        let n_layers = widths.len() - 1;
        let mut layers = Vec::with_capacity(n_layers);
        for (l, pair) in widths.windows(2).enumerate() {
            let (fan_in, fan_out) = (pair[0], pair[1]);
            ensure!(
                fan_in > 0 && fan_out > 0,
                VdError::invalid_input(format!("层宽度必须为正: {widths:?}"))
            );
            let limit = (6.0 / (fan_in + fan_out) as f64).sqrt();
            let weights = DMatrix::from_fn(fan_out, fan_in, |_, _| rng.gen_range(-limit..limit));
            let bias = DVector::from_fn(fan_out, |_, _| rng.gen_range(-0.1..0.1));
            let act = if l + 1 == n_layers {
                Activation::Identity
            } else {
                activation
            };
            layers.push(DenseLayer::new(weights, bias, act)?);
        }
        Self::new(layers, None)
    }

    /// 附加输出反归一化
    pub fn with_normalization(mut self, params: NormalizationParams) -> VdResult<Self> {
        let n = self.output_size();
        VdError::check_size("normalization mean", n, params.mean.len())?;
        VdError::check_size("normalization std", n, params.std.len())?;
        ensure!(
            params.mean.iter().chain(params.std.iter()).all(|v| v.is_finite()),
            VdError::numerical("归一化参数含非有限值")
        );
        self.normalization = Some(params);
        Ok(self)
    }

    /// 从 JSON 权重文件加载
    pub fn from_file<P: AsRef<Path>>(path: P) -> VdResult<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::from_json(&content)
    }

    /// 从 JSON 字符串加载
    pub fn from_json(content: &str) -> VdResult<Self> {
        let file: MlpDecoderFile =
            serde_json::from_str(content).map_err(|e| VdError::serialization(e.to_string()))?;
        let decoder = Self::try_from(file)?;
        debug!(layers = decoder.layers.len(), "解码器权重已加载");
        Ok(decoder)
    }

    /// 序列化为 JSON
    pub fn to_json(&self) -> VdResult<String> {
        serde_json::to_string_pretty(&MlpDecoderFile::from(self))
            .map_err(|e| VdError::serialization(e.to_string()))
    }

    /// 层序列
    pub fn layers(&self) -> &[DenseLayer] {
        &self.layers
    }

    fn std_at(&self, i: usize) -> f64 {
        self.normalization.as_ref().map_or(1.0, |p| p.std[i])
    }

    fn check_latent(&self, latent: &DVector<f64>) -> VdResult<()> {
        VdError::check_size("latent", self.latent_size(), latent.len())?;
        ensure!(
            latent.iter().all(|v| v.is_finite()),
            VdError::numerical("隐变量含非有限值")
        );
        Ok(())
    }

    /// 对任意对偶数类型的前向传播（不含反归一化）
    pub fn forward_generic<D: DualNum<f64> + Copy>(&self, latent: &[D]) -> Vec<D> {
        let mut x = latent.to_vec();
        for layer in &self.layers {
            let next = (0..layer.output_size())
                .map(|i| {
                    let mut a = D::from(layer.bias[i]);
                    for (j, &xj) in x.iter().enumerate() {
                        a = a + xj * D::from(layer.weights[(i, j)]);
                    }
                    layer.activation.apply(a)
                })
                .collect();
            x = next;
        }
        x
    }

    /// 沿第 j 个隐变量方向的一次前向模式传播，得到雅可比第 j 列
    fn tangent_column(&self, latent: &DVector<f64>, j: usize) -> DVector<f64> {
        let seeded: Vec<Dual64> = latent
            .iter()
            .enumerate()
            .map(|(k, &w)| Dual64::new(w, if k == j { 1.0 } else { 0.0 }))
            .collect();
        let out = self.forward_generic(&seeded);
        DVector::from_iterator(out.len(), out.iter().enumerate().map(|(i, v)| v.eps * self.std_at(i)))
    }

    /// 雅可比第 j 列（前向模式自动微分）
    pub fn jacobian_column(&self, latent: &DVector<f64>, j: usize) -> VdResult<DVector<f64>> {
        self.check_latent(latent)?;
        VdError::check_index("latent", j, self.latent_size())?;
        Ok(self.tangent_column(latent, j))
    }

    /// 显式链式法则雅可比
    pub fn jacobian_explicit(&self, latent: &DVector<f64>) -> VdResult<DMatrix<f64>> {
        self.check_latent(latent)?;
        let mut x = latent.clone();
        let mut m = DMatrix::<f64>::identity(self.latent_size(), self.latent_size());
        for layer in &self.layers {
            let a = layer.pre_activation(&x);
            let mut wm = &layer.weights * &m;
            for (i, mut row) in wm.row_iter_mut().enumerate() {
                row *= layer.activation.derivative(a[i]);
            }
            m = wm;
            x = a.map(|v| layer.activation.value(v));
        }
        if self.normalization.is_some() {
            for (i, mut row) in m.row_iter_mut().enumerate() {
                row *= self.std_at(i);
            }
        }
        Ok(m)
    }
}

impl Decoder for MlpDecoder {
    fn latent_size(&self) -> usize {
        self.layers.first().map_or(0, DenseLayer::input_size)
    }

    fn output_size(&self) -> usize {
        self.layers.last().map_or(0, DenseLayer::output_size)
    }

    fn hidden_widths(&self) -> Option<Vec<usize>> {
        let n = self.layers.len();
        Some(self.layers[..n - 1].iter().map(DenseLayer::output_size).collect())
    }

    fn decode(&self, latent: &DVector<f64>) -> VdResult<DVector<f64>> {
        self.check_latent(latent)?;
        let mut x = latent.clone();
        for layer in &self.layers {
            x = layer.pre_activation(&x).map(|v| layer.activation.value(v));
        }
        if let Some(params) = &self.normalization {
            for (i, v) in x.iter_mut().enumerate() {
                *v = *v * params.std[i] + params.mean[i];
            }
        }
        Ok(x)
    }

    /// 前向模式雅可比，按批组装
    ///
    /// 每列独立计算，批大小与并行与否都不影响结果。每批结束后检查预算，
    /// 超时即丢弃已算出的列。
    fn jacobian(&self, latent: &DVector<f64>, options: &JacobianOptions) -> VdResult<DMatrix<f64>> {
        self.check_latent(latent)?;
        let d = self.latent_size();
        let budget = options.start();
        let batch = options.batch_size.max(1);
        let mut jac = DMatrix::zeros(self.output_size(), d);

        for start in (0..d).step_by(batch) {
            let end = (start + batch).min(d);

            #[cfg(feature = "parallel")]
            let columns: Vec<DVector<f64>> = (start..end)
                .into_par_iter()
                .map(|j| self.tangent_column(latent, j))
                .collect();
            #[cfg(not(feature = "parallel"))]
            let columns: Vec<DVector<f64>> = (start..end)
                .map(|j| self.tangent_column(latent, j))
                .collect();

            budget.check()?;
            for (offset, col) in columns.iter().enumerate() {
                jac.set_column(start + offset, col);
            }
        }
        Ok(jac)
    }

    /// 反向传播：∂u_i/∂latent
    fn output_gradient(&self, latent: &DVector<f64>, output_index: usize) -> VdResult<DVector<f64>> {
        self.check_latent(latent)?;
        VdError::check_index("decoder output", output_index, self.output_size())?;

        let mut pre = Vec::with_capacity(self.layers.len());
        let mut x = latent.clone();
        for layer in &self.layers {
            let a = layer.pre_activation(&x);
            x = a.map(|v| layer.activation.value(v));
            pre.push(a);
        }

        let mut delta = DVector::zeros(self.output_size());
        delta[output_index] = self.std_at(output_index);
        for (layer, a) in self.layers.iter().zip(pre.iter()).rev() {
            for (k, v) in delta.iter_mut().enumerate() {
                *v *= layer.activation.derivative(a[k]);
            }
            delta = layer.weights.tr_mul(&delta);
        }
        Ok(delta)
    }
}

// ============================================================
// 权重文件格式
// ============================================================

#[derive(Debug, Serialize, Deserialize)]
struct LayerFile {
    /// 按行给出（out × in）
    weights: Vec<Vec<f64>>,
    bias: Vec<f64>,
    #[serde(default)]
    activation: Activation,
}

#[derive(Debug, Serialize, Deserialize)]
struct MlpDecoderFile {
    layers: Vec<LayerFile>,
    #[serde(default)]
    normalization: Option<NormalizationParams>,
}

impl TryFrom<MlpDecoderFile> for MlpDecoder {
    type Error = VdError;

    fn try_from(file: MlpDecoderFile) -> VdResult<Self> {
        let mut layers = Vec::with_capacity(file.layers.len());
        for layer in file.layers {
            let rows = layer.weights.len();
            let cols = layer.weights.first().map_or(0, Vec::len);
            for row in &layer.weights {
                VdError::check_size("weight row", cols, row.len())?;
            }
            let flat: Vec<f64> = layer.weights.into_iter().flatten().collect();
            let weights = DMatrix::from_row_slice(rows, cols, &flat);
            layers.push(DenseLayer::new(
                weights,
                DVector::from_vec(layer.bias),
                layer.activation,
            )?);
        }
        MlpDecoder::new(layers, file.normalization)
    }
}

impl From<&MlpDecoder> for MlpDecoderFile {
    fn from(decoder: &MlpDecoder) -> Self {
        let layers = decoder
            .layers
            .iter()
            .map(|layer| LayerFile {
                weights: layer
                    .weights
                    .row_iter()
                    .map(|row| row.iter().copied().collect())
                    .collect(),
                bias: layer.bias.iter().copied().collect(),
                activation: layer.activation,
            })
            .collect();
        Self {
            layers,
            normalization: decoder.normalization.clone(),
        }
    }
}
