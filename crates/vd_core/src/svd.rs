// crates/vd_core/src/svd.rs

//! 截断奇异值分解
//!
//! 对偏差矩阵 V (n × r) 做薄 SVD，保留前 k 个左奇异向量作为降维基
//! V_trunc = U_k (n × k)，其列正交归一。
//!
//! 奇异值按降序排列（不依赖底层分解的输出顺序）。数值秩按
//! `tol = max(n, r) · ε · s_max` 判定，k 超过秩时报错而不是静默截断。

use nalgebra::{DMatrix, DVector};
use tracing::{debug, warn};

use vd_foundation::{ensure, VdError, VdResult};

/// 截断基
#[derive(Debug, Clone)]
pub struct TruncatedBasis {
    /// 降维基 V_trunc（n × k，列正交归一）
    pub v_trunc: DMatrix<f64>,
    /// 保留的奇异值（降序，长度 k）
    pub singular_values: DVector<f64>,
    /// 对应的右奇异向量（k × r，行正交归一）
    pub right_vectors: DMatrix<f64>,
    /// 全部奇异值（降序）
    pub all_singular_values: DVector<f64>,
    /// 数值秩
    pub rank: usize,
}

impl TruncatedBasis {
    /// 截断模态数 k
    #[inline]
    pub fn n_modes(&self) -> usize {
        self.v_trunc.ncols()
    }

    /// 状态维度 n
    #[inline]
    pub fn n_state(&self) -> usize {
        self.v_trunc.nrows()
    }

    /// 前 k 个模态捕获的方差比例 Σs²_k / Σs²
    pub fn captured_variance_fraction(&self) -> f64 {
        let total: f64 = self.all_singular_values.iter().map(|s| s * s).sum();
        if total == 0.0 {
            return 0.0;
        }
        let kept: f64 = self.singular_values.iter().map(|s| s * s).sum();
        kept / total
    }

    /// 秩 k 重构误差 ‖V - U_k Σ_k V_kᵀ‖_F
    pub fn reconstruction_error(&self, deviations: &DMatrix<f64>) -> VdResult<f64> {
        VdError::check_shape(
            "deviations",
            (self.n_state(), self.right_vectors.ncols()),
            deviations.shape(),
        )?;
        let sigma = DMatrix::from_diagonal(&self.singular_values);
        let approx = &self.v_trunc * sigma * &self.right_vectors;
        Ok((deviations - approx).norm())
    }

    /// 把状态投影到降维空间：w = V_truncᵀ u
    ///
    /// 列正交归一时 V_truncᵀ 即伪逆。
    pub fn project(&self, state: &DVector<f64>) -> VdResult<DVector<f64>> {
        VdError::check_size("state", self.n_state(), state.len())?;
        Ok(self.v_trunc.tr_mul(state))
    }
}

/// 数值秩（奇异值须已降序）
pub fn numerical_rank(sorted_singular_values: &DVector<f64>, nrows: usize, ncols: usize) -> usize {
    let s_max = sorted_singular_values.iter().copied().fold(0.0_f64, f64::max);
    let tol = nrows.max(ncols) as f64 * f64::EPSILON * s_max;
    sorted_singular_values.iter().filter(|&&s| s > tol).count()
}

/// 截断 SVD
///
/// # 错误
///
/// - `k == 0` 或矩阵为空：`InvalidInput`
/// - `k` 超过数值秩：`ModeCountExceedsRank`
pub fn truncated_svd(deviations: &DMatrix<f64>, k: usize) -> VdResult<TruncatedBasis> {
    let (n, r) = deviations.shape();
    ensure!(
        n > 0 && r > 0,
        VdError::invalid_input(format!("偏差矩阵不能为空: {n} × {r}"))
    );
    ensure!(k > 0, VdError::invalid_config("number_modes", k, "必须至少为 1"));

    let svd = deviations.clone().svd(true, true);
    let u = svd
        .u
        .ok_or_else(|| VdError::numerical("SVD 未返回左奇异向量"))?;
    let v_t = svd
        .v_t
        .ok_or_else(|| VdError::numerical("SVD 未返回右奇异向量"))?;
    let values = svd.singular_values;

    if values.iter().any(|s| !s.is_finite()) {
        return Err(VdError::numerical("奇异值含非有限值"));
    }

    let mut order: Vec<usize> = (0..values.len()).collect();
    order.sort_by(|&a, &b| values[b].total_cmp(&values[a]));

    let all_singular_values = DVector::from_iterator(order.len(), order.iter().map(|&i| values[i]));
    let rank = numerical_rank(&all_singular_values, n, r);

    ensure!(
        k <= rank,
        VdError::ModeCountExceedsRank { requested: k, rank }
    );

    let kept = &order[..k];
    let v_trunc = DMatrix::from_fn(n, k, |i, j| u[(i, kept[j])]);
    let right_vectors = DMatrix::from_fn(k, r, |i, j| v_t[(kept[i], j)]);
    let singular_values = DVector::from_iterator(k, kept.iter().map(|&i| values[i]));

    let s_max = all_singular_values[0];
    let s_k = singular_values[k - 1];
    if s_k < 1e-8 * s_max {
        warn!(k, s_k, s_max, "截断模态包含极小奇异值，降维坐标可能病态");
    }

    let basis = TruncatedBasis {
        v_trunc,
        singular_values,
        right_vectors,
        all_singular_values,
        rank,
    };
    debug!(
        n,
        r,
        k,
        rank,
        captured = basis.captured_variance_fraction(),
        "截断 SVD 完成"
    );
    Ok(basis)
}
