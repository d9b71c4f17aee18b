// apps/vd_cli/src/output.rs

//! 同化结果的 JSON 输出格式

use std::path::Path;

use serde::Serialize;
use vd_core::{AssimilationOutcome, BasisSummary, ConvergenceStatus, ErrorMetrics};
use vd_foundation::{VdError, VdResult};

/// 结果文件
#[derive(Debug, Clone, Serialize)]
pub struct ResultFile {
    pub method: String,
    pub hist_idx: usize,
    pub t_da: usize,
    pub n_state: usize,
    pub observation_indices: Vec<usize>,
    pub observation_values: Vec<f64>,
    pub w0: Vec<f64>,
    pub w_star: Vec<f64>,
    pub cost: f64,
    pub gradient_norm: f64,
    pub iterations: u64,
    pub cost_evaluations: u64,
    pub gradient_evaluations: u64,
    pub status: ConvergenceStatus,
    pub termination: String,
    pub elapsed_ms: u128,
    pub reference: ErrorMetrics,
    pub assimilated: ErrorMetrics,
    pub improvement_ratio: f64,
    pub basis: Option<BasisSummary>,
    pub u_da: Vec<f64>,
    pub ref_abs_error: Vec<f64>,
    pub da_abs_error: Vec<f64>,
}

impl From<&AssimilationOutcome> for ResultFile {
    fn from(outcome: &AssimilationOutcome) -> Self {
        let opt = &outcome.optimization;
        let report = &outcome.report;
        Self {
            method: outcome.method.to_string(),
            hist_idx: outcome.split.hist_idx,
            t_da: outcome.split.t_da,
            n_state: outcome.control_state.len(),
            observation_indices: outcome.observations.indices.clone(),
            observation_values: outcome.observations.values.iter().copied().collect(),
            w0: outcome.w0.iter().copied().collect(),
            w_star: opt.w_star.iter().copied().collect(),
            cost: opt.cost,
            gradient_norm: opt.gradient_norm,
            iterations: opt.iterations,
            cost_evaluations: opt.cost_evaluations,
            gradient_evaluations: opt.gradient_evaluations,
            status: opt.status.clone(),
            termination: opt.termination.clone(),
            elapsed_ms: opt.elapsed.as_millis(),
            reference: report.reference,
            assimilated: report.assimilated,
            improvement_ratio: report.improvement_ratio(),
            basis: outcome.basis.clone(),
            u_da: report.u_da.iter().copied().collect(),
            ref_abs_error: report.ref_abs_error.iter().copied().collect(),
            da_abs_error: report.da_abs_error.iter().copied().collect(),
        }
    }
}

impl ResultFile {
    /// 写出为格式化 JSON
    pub fn save(&self, path: &Path) -> VdResult<()> {
        let json =
            serde_json::to_string_pretty(self).map_err(|e| VdError::serialization(e.to_string()))?;
        std::fs::write(path, json)?;
        Ok(())
    }
}
