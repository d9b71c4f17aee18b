// crates/vd_core/src/observation/mod.rs

//! 观测选取
//!
//! 从同化时刻的真值状态 u_c 中取出稀疏观测，返回 (values, indices, count)。
//!
//! | 方式 | 索引 |
//! |------|------|
//! | Random | 无放回均匀抽取 round(frac·n) 个，升序 |
//! | Regular | idx_i = floor((i + 0.5)·n / count) |
//! | Fixed | 调用方给定，保持原顺序 |
//!
//! 默认不加噪声；`ObservationNoise::Gaussian` 叠加零均值高斯噪声（同一种子可复现）。

pub mod operator;

pub use operator::{ObservationOperator, PointObservationOperator};

use nalgebra::DVector;
use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Distribution, Normal};
use tracing::debug;

use vd_config::{ObservationMode, ObservationNoise, VarDaConfig};
use vd_foundation::{ensure, VdError, VdResult};

/// 观测集合
#[derive(Debug, Clone, PartialEq)]
pub struct ObservationSet {
    /// 观测值
    pub values: DVector<f64>,
    /// 观测在全状态中的索引
    pub indices: Vec<usize>,
}

impl ObservationSet {
    /// 观测数
    #[inline]
    pub fn count(&self) -> usize {
        self.indices.len()
    }
}

/// 观测数 round(frac·n)，为零时报错
pub fn observation_count(fraction: f64, n: usize) -> VdResult<usize> {
    ensure!(
        fraction > 0.0 && fraction <= 1.0,
        VdError::invalid_config("obs_frac", fraction, "必须在 (0, 1] 范围内")
    );
    let count = (fraction * n as f64).round() as usize;
    ensure!(count > 0, VdError::NoObservations { fraction, n });
    Ok(count.min(n))
}

/// 观测选取器
#[derive(Debug, Clone)]
pub struct ObservationSelector {
    mode: ObservationMode,
    fraction: f64,
    noise: ObservationNoise,
    seed: u64,
}

impl ObservationSelector {
    /// 创建选取器
    pub fn new(mode: ObservationMode, fraction: f64, noise: ObservationNoise, seed: u64) -> Self {
        Self {
            mode,
            fraction,
            noise,
            seed,
        }
    }

    /// 从配置创建
    pub fn from_config(config: &VarDaConfig) -> Self {
        Self::new(
            config.obs_mode.clone(),
            config.obs_frac,
            config.obs_noise,
            config.seed,
        )
    }

    /// 不读真值即可确定的观测数
    pub fn expected_count(&self, n: usize) -> VdResult<usize> {
        match &self.mode {
            ObservationMode::Random | ObservationMode::Regular => observation_count(self.fraction, n),
            ObservationMode::Fixed { indices } => {
                ensure!(
                    !indices.is_empty(),
                    VdError::NoObservations { fraction: 0.0, n }
                );
                Ok(indices.len())
            }
        }
    }

    /// 从真值状态中选取观测
    pub fn select(&self, true_state: &DVector<f64>) -> VdResult<ObservationSet> {
        let n = true_state.len();
        let count = self.expected_count(n)?;
        let mut rng = StdRng::seed_from_u64(self.seed);

        let indices = match &self.mode {
            ObservationMode::Random => {
                let mut idx = rand::seq::index::sample(&mut rng, n, count).into_vec();
                idx.sort_unstable();
                idx
            }
            ObservationMode::Regular => (0..count)
                .map(|i| ((i as f64 + 0.5) * n as f64 / count as f64).floor() as usize)
                .map(|i| i.min(n - 1))
                .collect(),
            ObservationMode::Fixed { indices } => {
                for &i in indices {
                    VdError::check_index("observation", i, n)?;
                }
                let mut sorted = indices.clone();
                sorted.sort_unstable();
                sorted.dedup();
                ensure!(
                    sorted.len() == indices.len(),
                    VdError::invalid_input("固定观测索引存在重复")
                );
                indices.clone()
            }
        };

        let mut values = DVector::from_iterator(count, indices.iter().map(|&i| true_state[i]));

        if let ObservationNoise::Gaussian { std_dev } = self.noise {
            let normal = Normal::new(0.0, std_dev)
                .map_err(|e| VdError::invalid_config("obs_noise.std_dev", std_dev, e.to_string()))?;
            for v in values.iter_mut() {
                *v += normal.sample(&mut rng);
            }
        }

        debug!(n, count, mode = ?self.mode, "观测选取完成");
        Ok(ObservationSet { values, indices })
    }
}
