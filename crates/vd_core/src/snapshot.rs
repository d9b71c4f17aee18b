// crates/vd_core/src/snapshot.rs

//! 快照矩阵与历史窗口划分
//!
//! 快照矩阵 X 为 n × M，每列是一个时刻的状态向量，列顺序即时间顺序。
//! 载入后不可变，只提供按列区间和单列的只读访问。

use nalgebra::{DMatrix, DMatrixView, DVector};
use tracing::debug;

use vd_config::VarDaConfig;
use vd_foundation::{ensure, VdError, VdResult};

/// 快照矩阵（n × M，只读）
#[derive(Debug, Clone)]
pub struct SnapshotMatrix {
    data: DMatrix<f64>,
}

impl SnapshotMatrix {
    /// 从稠密矩阵创建
    ///
    /// 矩阵必须非空且全部为有限值。
    pub fn new(data: DMatrix<f64>) -> VdResult<Self> {
        ensure!(
            data.nrows() > 0 && data.ncols() > 0,
            VdError::invalid_input(format!(
                "快照矩阵不能为空: {} × {}",
                data.nrows(),
                data.ncols()
            ))
        );
        if let Some((pos, v)) = data.iter().enumerate().find(|(_, v)| !v.is_finite()) {
            let (row, col) = (pos % data.nrows(), pos / data.nrows());
            return Err(VdError::numerical(format!(
                "快照矩阵在 ({row}, {col}) 处含非有限值 {v}"
            )));
        }
        Ok(Self { data })
    }

    /// 由按时间排序的状态向量构建
    pub fn from_columns(columns: &[DVector<f64>]) -> VdResult<Self> {
        let first = columns
            .first()
            .ok_or_else(|| VdError::invalid_input("快照列表为空"))?;
        let n = first.len();
        for col in columns {
            VdError::check_size("snapshot column", n, col.len())?;
        }
        Self::new(DMatrix::from_columns(columns))
    }

    /// 状态维度 n
    #[inline]
    pub fn n_state(&self) -> usize {
        self.data.nrows()
    }

    /// 时间步数 M
    #[inline]
    pub fn n_steps(&self) -> usize {
        self.data.ncols()
    }

    /// 底层矩阵
    #[inline]
    pub fn as_matrix(&self) -> &DMatrix<f64> {
        &self.data
    }

    /// 取第 t 列（拷贝）
    pub fn column(&self, t: usize) -> VdResult<DVector<f64>> {
        VdError::check_index("time step", t, self.n_steps())?;
        Ok(self.data.column(t).into_owned())
    }

    /// 取 [start, end) 列区间（视图）
    pub fn columns(&self, start: usize, end: usize) -> VdResult<DMatrixView<'_, f64>> {
        ensure!(
            start < end,
            VdError::invalid_input(format!("列区间为空: [{start}, {end})"))
        );
        ensure!(
            end <= self.n_steps(),
            VdError::index_out_of_bounds("time step", end - 1, self.n_steps())
        );
        Ok(self.data.columns(start, end - start))
    }
}

/// 历史窗口划分
///
/// `hist_idx = floor(M · hist_frac)`，`t_DA = M - tda_idx_from_end`，
/// 要求 `t_DA > hist_idx`。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HistoricalSplit {
    /// 历史窗口列数（X[:, ..hist_idx]）
    pub hist_idx: usize,
    /// 同化时刻
    pub t_da: usize,
    /// 总时间步数 M
    pub n_steps: usize,
}

impl HistoricalSplit {
    /// 计算划分并检查重叠
    pub fn new(n_steps: usize, hist_frac: f64, tda_idx_from_end: usize) -> VdResult<Self> {
        ensure!(
            hist_frac > 0.0 && hist_frac < 1.0,
            VdError::invalid_config("hist_frac", hist_frac, "必须在 (0, 1) 范围内")
        );
        ensure!(
            tda_idx_from_end >= 1 && tda_idx_from_end <= n_steps,
            VdError::invalid_config(
                "tda_idx_from_end",
                tda_idx_from_end,
                format!("必须在 [1, {n_steps}] 范围内")
            )
        );

        let hist_idx = (n_steps as f64 * hist_frac).floor() as usize;
        let t_da = n_steps - tda_idx_from_end;

        ensure!(
            hist_idx >= 1,
            VdError::invalid_config(
                "hist_frac",
                hist_frac,
                format!("M={n_steps} 时历史窗口为空")
            )
        );
        ensure!(t_da > hist_idx, VdError::HistoricalOverlap { t_da, hist_idx });

        debug!(hist_idx, t_da, n_steps, "历史窗口划分");
        Ok(Self {
            hist_idx,
            t_da,
            n_steps,
        })
    }

    /// 按配置计算划分
    pub fn from_config(n_steps: usize, config: &VarDaConfig) -> VdResult<Self> {
        Self::new(n_steps, config.hist_frac, config.tda_idx_from_end)
    }

    /// 历史快照视图
    pub fn history<'a>(&self, snapshots: &'a SnapshotMatrix) -> VdResult<DMatrixView<'a, f64>> {
        VdError::check_size("snapshot steps", self.n_steps, snapshots.n_steps())?;
        snapshots.columns(0, self.hist_idx)
    }

    /// 同化时刻的真值状态 u_c
    pub fn control_state(&self, snapshots: &SnapshotMatrix) -> VdResult<DVector<f64>> {
        VdError::check_size("snapshot steps", self.n_steps, snapshots.n_steps())?;
        snapshots.column(self.t_da)
    }
}
