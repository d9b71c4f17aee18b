// crates/vd_core/src/observation/operator.rs

//! 观测算子
//!
//! H 为 count × n 的选点算子：每行恰有一个单位元素，位于对应观测索引处，
//! 行顺序与索引顺序一致。既用于把模型状态投影到观测空间，也通过转置把
//! 观测空间残差映射回全状态空间（梯度中的 Hᵀ）。

use std::fmt::Debug;

use nalgebra::{DMatrix, DVector};

use vd_foundation::{ensure, VdError, VdResult};

/// 观测算子 trait
pub trait ObservationOperator: Send + Sync + Debug {
    /// 观测类型名称
    fn name(&self) -> &'static str;

    /// 状态维度 n
    fn state_dim(&self) -> usize;

    /// 观测数
    fn n_obs(&self) -> usize;

    /// 状态 → 观测空间：H·x
    fn observe(&self, state: &DVector<f64>) -> VdResult<DVector<f64>>;

    /// 观测空间 → 状态空间：Hᵀ·r
    fn adjoint(&self, residual: &DVector<f64>) -> VdResult<DVector<f64>>;

    /// 观测-模拟残差 y − H·x
    fn residual(&self, state: &DVector<f64>, observations: &DVector<f64>) -> VdResult<DVector<f64>> {
        VdError::check_size("observations", self.n_obs(), observations.len())?;
        Ok(observations - self.observe(state)?)
    }

    /// 稠密矩阵形式（count × n）
    fn linearize(&self) -> DMatrix<f64>;
}

/// 选点观测算子
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PointObservationOperator {
    indices: Vec<usize>,
    n: usize,
}

impl PointObservationOperator {
    /// 由观测索引构建
    ///
    /// `count` 必须等于索引个数，索引必须互不相同且小于 `n`。
    pub fn build(indices: &[usize], n: usize, count: usize) -> VdResult<Self> {
        VdError::check_size("observation indices", count, indices.len())?;
        ensure!(count > 0, VdError::NoObservations { fraction: 0.0, n });
        for &idx in indices {
            VdError::check_index("observation", idx, n)?;
        }
        let mut sorted = indices.to_vec();
        sorted.sort_unstable();
        if let Some(dup) = sorted.windows(2).find(|w| w[0] == w[1]) {
            return Err(VdError::invalid_input(format!("观测索引重复: {}", dup[0])));
        }
        Ok(Self {
            indices: indices.to_vec(),
            n,
        })
    }

    /// 观测索引（行顺序）
    pub fn indices(&self) -> &[usize] {
        &self.indices
    }
}

impl ObservationOperator for PointObservationOperator {
    fn name(&self) -> &'static str {
        "Point"
    }

    fn state_dim(&self) -> usize {
        self.n
    }

    fn n_obs(&self) -> usize {
        self.indices.len()
    }

    fn observe(&self, state: &DVector<f64>) -> VdResult<DVector<f64>> {
        VdError::check_size("state", self.n, state.len())?;
        Ok(DVector::from_iterator(
            self.indices.len(),
            self.indices.iter().map(|&i| state[i]),
        ))
    }

    fn adjoint(&self, residual: &DVector<f64>) -> VdResult<DVector<f64>> {
        VdError::check_size("observation residual", self.indices.len(), residual.len())?;
        let mut out = DVector::zeros(self.n);
        for (row, &i) in self.indices.iter().enumerate() {
            out[i] += residual[row];
        }
        Ok(out)
    }

    fn linearize(&self) -> DMatrix<f64> {
        let mut h = DMatrix::zeros(self.indices.len(), self.n);
        for (row, &i) in self.indices.iter().enumerate() {
            h[(row, i)] = 1.0;
        }
        h
    }
}
