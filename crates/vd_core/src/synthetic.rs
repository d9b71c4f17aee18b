// crates/vd_core/src/synthetic.rs

//! 合成快照生成
//!
//! 用于无外部数据时的演示与测试：
//!
//! ```text
//! X[i, t] = offset + Σ_{m=1..r} (1/m) · sin(mπ(i+0.5)/n) · cos(2πm·t/M + 0.3m) + ε
//! ```
//!
//! ε ~ N(0, noise_std²)，由种子决定，可复现。

use nalgebra::DMatrix;
use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Distribution, Normal};
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

use vd_foundation::{ensure, VdError, VdResult};

use crate::snapshot::SnapshotMatrix;

/// 合成快照参数
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SyntheticSnapshots {
    /// 状态维度 n
    pub n_state: usize,
    /// 时间步数 M
    pub n_steps: usize,
    /// 模态数 r
    pub n_modes: usize,
    /// 常数偏置
    pub offset: f64,
    /// 噪声标准差（0 表示无噪声）
    pub noise_std: f64,
    /// 随机种子
    pub seed: u64,
}

impl Default for SyntheticSnapshots {
    fn default() -> Self {
        Self {
            n_state: 100,
            n_steps: 50,
            n_modes: 4,
            offset: 1.0,
            noise_std: 0.01,
            seed: 42,
        }
    }
}

impl SyntheticSnapshots {
    /// 生成快照矩阵
    pub fn generate(&self) -> VdResult<SnapshotMatrix> {
        ensure!(
            self.n_state > 0 && self.n_steps > 0,
            VdError::invalid_input(format!(
                "合成快照尺寸必须为正: {} × {}",
                self.n_state, self.n_steps
            ))
        );
        ensure!(
            self.noise_std.is_finite() && self.noise_std >= 0.0,
            VdError::invalid_input(format!("噪声标准差无效: {}", self.noise_std))
        );

        let (n, big_m) = (self.n_state as f64, self.n_steps as f64);
        let mut data = DMatrix::from_element(self.n_state, self.n_steps, self.offset);
        for m in 1..=self.n_modes {
            let mf = m as f64;
            for t in 0..self.n_steps {
                let a = (2.0 * PI * mf * t as f64 / big_m + 0.3 * mf).cos() / mf;
                for i in 0..self.n_state {
                    data[(i, t)] += a * (mf * PI * (i as f64 + 0.5) / n).sin();
                }
            }
        }

        if self.noise_std > 0.0 {
            let mut rng = StdRng::seed_from_u64(self.seed);
            let normal = Normal::new(0.0, self.noise_std)
                .map_err(|e| VdError::invalid_input(e.to_string()))?;
            for v in data.iter_mut() {
                *v += normal.sample(&mut rng);
            }
        }

        SnapshotMatrix::new(data)
    }
}
