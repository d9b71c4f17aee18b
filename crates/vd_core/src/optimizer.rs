// crates/vd_core/src/optimizer.rs

//! L-BFGS 优化器
//!
//! 以 argmin 的 L-BFGS + More-Thuente 线搜索在无约束降维空间中最小化 J(w)。
//!
//! # 终止与失败
//!
//! - 梯度范数或代价变化低于容差：`Converged`
//! - 达到迭代上限、超时、线搜索失败：`NotConverged`，仍返回目前为止最好的迭代点
//! - 代价引擎自身的错误（形状、预算耗尽）是致命的，直接向上传播

use std::sync::Arc;
use std::time::{Duration, Instant};

use argmin::core::observers::{Observe, ObserverMode};
use argmin::core::{
    CostFunction, Error as ArgminError, Executor, Gradient, State, TerminationReason,
    TerminationStatus, KV,
};
use argmin::solver::linesearch::MoreThuenteLineSearch;
use argmin::solver::quasinewton::LBFGS;
use nalgebra::DVector;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use vd_config::VarDaConfig;
use vd_foundation::{ensure, VdError, VdResult};

use crate::cost::CostFunctionEngine;

/// 默认 L-BFGS 历史长度
pub const DEFAULT_LBFGS_MEMORY: usize = 7;

/// 优化器设置
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OptimizerSettings {
    /// 收敛容差（梯度范数与代价变化）
    pub tolerance: f64,
    /// 最大迭代次数
    pub max_iterations: u64,
    /// L-BFGS 历史长度
    pub memory: usize,
    /// 墙钟预算
    pub timeout: Option<Duration>,
}

impl Default for OptimizerSettings {
    fn default() -> Self {
        Self {
            tolerance: 1e-3,
            max_iterations: 500,
            memory: DEFAULT_LBFGS_MEMORY,
            timeout: None,
        }
    }
}

impl OptimizerSettings {
    /// 从配置构造
    pub fn from_config(config: &VarDaConfig) -> Self {
        Self {
            tolerance: config.tolerance,
            max_iterations: config.max_iterations,
            memory: config.lbfgs_memory,
            timeout: config.optimizer_timeout_ms.map(Duration::from_millis),
        }
    }

    fn validate(&self) -> VdResult<()> {
        ensure!(
            self.tolerance.is_finite() && self.tolerance > 0.0,
            VdError::invalid_config("tolerance", self.tolerance, "必须为正")
        );
        ensure!(
            self.max_iterations >= 1,
            VdError::invalid_config("max_iterations", self.max_iterations, "必须至少为 1")
        );
        ensure!(
            self.memory >= 1,
            VdError::invalid_config("lbfgs_memory", self.memory, "必须至少为 1")
        );
        Ok(())
    }
}

/// 收敛状态
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ConvergenceStatus {
    /// 满足收敛准则
    Converged,
    /// 未收敛，但给出了最好的迭代点
    NotConverged {
        /// 终止原因
        reason: String,
    },
}

impl ConvergenceStatus {
    /// 是否收敛
    pub fn is_converged(&self) -> bool {
        matches!(self, Self::Converged)
    }
}

/// 优化结果
#[derive(Debug, Clone)]
pub struct OptimizationOutcome {
    /// 最优降维坐标 w*
    pub w_star: DVector<f64>,
    /// J(w*)
    pub cost: f64,
    /// ‖∇J(w*)‖
    pub gradient_norm: f64,
    /// 迭代次数（求解器中途失败时为失败前完成的迭代数）
    pub iterations: u64,
    /// 代价求值次数（含线搜索）
    pub cost_evaluations: u64,
    /// 梯度求值次数
    pub gradient_evaluations: u64,
    /// 收敛状态
    pub status: ConvergenceStatus,
    /// 终止原因描述
    pub termination: String,
    /// 耗时
    pub elapsed: Duration,
}

/// 迄今最好的迭代点
#[derive(Debug, Default)]
struct BestIterate {
    param: Option<DVector<f64>>,
    cost: f64,
}

/// 求解进度：迭代次数与 argmin 记录的求值次数
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct Progress {
    iterations: u64,
    cost_evaluations: u64,
    gradient_evaluations: u64,
}

impl Progress {
    fn with_counts<I: State>(iterations: u64, state: &I) -> Self {
        let counts = state.get_func_counts();
        Self {
            iterations,
            cost_evaluations: counts.get("cost_count").copied().unwrap_or(0),
            gradient_evaluations: counts.get("gradient_count").copied().unwrap_or(0),
        }
    }
}

/// 每次迭代后记录进度，求解器中途失败时仍可报告已完成的迭代
#[derive(Debug, Clone, Default)]
struct ProgressObserver(Arc<Mutex<Progress>>);

impl<I: State> Observe<I> for ProgressObserver {
    fn observe_iter(&mut self, state: &I, _kv: &KV) -> Result<(), ArgminError> {
        let mut progress = self.0.lock();
        *progress = Progress::with_counts(progress.iterations + 1, state);
        Ok(())
    }
}

/// argmin 问题适配器
struct VarDaProblem<'a> {
    engine: &'a CostFunctionEngine,
    best: &'a Mutex<BestIterate>,
}

impl VarDaProblem<'_> {
    fn record(&self, w: &DVector<f64>, cost: f64) {
        if !cost.is_finite() {
            return;
        }
        let mut best = self.best.lock();
        if best.param.is_none() || cost < best.cost {
            best.param = Some(w.clone());
            best.cost = cost;
        }
    }
}

impl CostFunction for VarDaProblem<'_> {
    type Param = DVector<f64>;
    type Output = f64;

    fn cost(&self, w: &Self::Param) -> Result<Self::Output, ArgminError> {
        let value = self.engine.cost(w)?;
        self.record(w, value);
        Ok(value)
    }
}

impl Gradient for VarDaProblem<'_> {
    type Param = DVector<f64>;
    type Gradient = DVector<f64>;

    fn gradient(&self, w: &Self::Param) -> Result<Self::Gradient, ArgminError> {
        Ok(self.engine.gradient(w)?)
    }
}

/// 优化器
#[derive(Debug, Clone, Default)]
pub struct Optimizer {
    settings: OptimizerSettings,
}

impl Optimizer {
    /// 创建优化器
    pub fn new(settings: OptimizerSettings) -> Self {
        Self { settings }
    }

    /// 设置
    pub fn settings(&self) -> &OptimizerSettings {
        &self.settings
    }

    /// 从 w₀ 出发最小化 J(w)
    ///
    /// 不修改输入。迭代与求值次数取自 argmin 的求解状态。
    pub fn minimize(
        &self,
        engine: &CostFunctionEngine,
        w0: &DVector<f64>,
    ) -> VdResult<OptimizationOutcome> {
        self.minimize_observed(engine, w0).map(|(outcome, _)| outcome)
    }

    fn minimize_observed(
        &self,
        engine: &CostFunctionEngine,
        w0: &DVector<f64>,
    ) -> VdResult<(OptimizationOutcome, Progress)> {
        self.settings.validate()?;
        VdError::check_size("initial guess", engine.reduced_dim(), w0.len())?;

        let started = Instant::now();
        let best = Mutex::new(BestIterate::default());
        let problem = VarDaProblem {
            engine,
            best: &best,
        };

        let linesearch = MoreThuenteLineSearch::new();
        let solver = LBFGS::new(linesearch, self.settings.memory)
            .with_tolerance_grad(self.settings.tolerance)
            .and_then(|s| s.with_tolerance_cost(self.settings.tolerance))
            .map_err(|e| VdError::invalid_config("tolerance", self.settings.tolerance, e.to_string()))?;

        let init = w0.clone();
        let max_iters = self.settings.max_iterations;
        let observer = ProgressObserver::default();
        let mut executor = Executor::new(problem, solver)
            .configure(|state| state.param(init).max_iters(max_iters))
            .add_observer(observer.clone(), ObserverMode::Always);
        if let Some(timeout) = self.settings.timeout {
            executor = executor.timeout(timeout);
        }

        debug!(
            dim = w0.len(),
            tolerance = self.settings.tolerance,
            max_iters,
            memory = self.settings.memory,
            "开始 L-BFGS"
        );

        let (w_star, progress, status, termination) = match executor.run() {
            Ok(result) => {
                let state = result.state();
                let progress = Progress::with_counts(state.get_iter(), state);
                let (status, termination) = classify(state.get_termination_status());
                let w_star = state
                    .get_best_param()
                    .cloned()
                    .or_else(|| best.lock().param.clone())
                    .unwrap_or_else(|| w0.clone());
                (w_star, progress, status, termination)
            }
            Err(err) => match err.downcast::<VdError>() {
                Ok(fatal) => return Err(fatal),
                Err(other) => {
                    let best_param = best.lock().param.clone();
                    let observed = *observer.0.lock();
                    breakdown(&other, observed, best_param, w0)
                }
            },
        };
        let iterations = progress.iterations;

        let (cost, gradient) = engine.cost_and_gradient(&w_star)?;
        let elapsed = started.elapsed();

        match &status {
            ConvergenceStatus::Converged => info!(
                iterations,
                cost,
                gradient_norm = gradient.norm(),
                elapsed_ms = elapsed.as_millis() as u64,
                "L-BFGS 收敛"
            ),
            ConvergenceStatus::NotConverged { reason } => warn!(
                iterations,
                cost,
                gradient_norm = gradient.norm(),
                %reason,
                "L-BFGS 未收敛，返回最好的迭代点"
            ),
        }

        let outcome = OptimizationOutcome {
            w_star,
            cost,
            gradient_norm: gradient.norm(),
            iterations,
            cost_evaluations: progress.cost_evaluations,
            gradient_evaluations: progress.gradient_evaluations,
            status,
            termination,
            elapsed,
        };
        Ok((outcome, progress))
    }
}

/// 求解器中途失败：沿用观察者记录的进度与迄今最好的迭代点
fn breakdown(
    err: &ArgminError,
    progress: Progress,
    best: Option<DVector<f64>>,
    w0: &DVector<f64>,
) -> (DVector<f64>, Progress, ConvergenceStatus, String) {
    let reason = format!("求解器失败: {err}");
    let w_star = best.unwrap_or_else(|| w0.clone());
    (
        w_star,
        progress,
        ConvergenceStatus::NotConverged {
            reason: reason.clone(),
        },
        reason,
    )
}

fn classify(status: &TerminationStatus) -> (ConvergenceStatus, String) {
    match status {
        TerminationStatus::Terminated(reason) => {
            let text = reason.to_string();
            match reason {
                TerminationReason::SolverConverged | TerminationReason::TargetCostReached => {
                    (ConvergenceStatus::Converged, text)
                }
                _ => (
                    ConvergenceStatus::NotConverged {
                        reason: text.clone(),
                    },
                    text,
                ),
            }
        }
        TerminationStatus::NotTerminated => {
            let text = "未终止".to_string();
            (
                ConvergenceStatus::NotConverged {
                    reason: text.clone(),
                },
                text,
            )
        }
    }
}
