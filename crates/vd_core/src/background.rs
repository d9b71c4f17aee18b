// crates/vd_core/src/background.rs

//! 背景态与偏差矩阵
//!
//! u₀ 为历史快照的列均值，V = hist_X - u₀（逐列广播）。
//! V 与 hist_X 同形，且每一行在集合方向上求和为零。

use nalgebra::{DMatrix, DMatrixView, DVector};
use tracing::debug;

use vd_foundation::{ensure, VdError, VdResult};

/// 背景模型
#[derive(Debug, Clone)]
pub struct BackgroundModel {
    /// 背景态 u₀（长度 n）
    pub background: DVector<f64>,
    /// 偏差矩阵 V（n × hist_idx）
    pub deviations: DMatrix<f64>,
}

impl BackgroundModel {
    /// 由历史快照构建背景态与偏差矩阵
    pub fn build(hist: DMatrixView<'_, f64>) -> VdResult<Self> {
        let (n, m) = hist.shape();
        ensure!(
            n > 0 && m > 0,
            VdError::invalid_input(format!("历史快照不能为空: {n} × {m}"))
        );

        let mut background = DVector::zeros(n);
        for col in hist.column_iter() {
            background += col;
        }
        background /= m as f64;

        let mut deviations = hist.clone_owned();
        for mut col in deviations.column_iter_mut() {
            col -= &background;
        }

        debug!(n, m, "背景态构建完成");
        Ok(Self {
            background,
            deviations,
        })
    }

    /// 状态维度
    #[inline]
    pub fn n_state(&self) -> usize {
        self.background.len()
    }

    /// 集合成员数
    #[inline]
    pub fn n_members(&self) -> usize {
        self.deviations.ncols()
    }
}
