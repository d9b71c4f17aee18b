// apps/vd_cli/src/commands/validate.rs

//! 配置验证命令
//!
//! 检查同化配置文件，可选地检查快照文件是否满足历史划分与模态数要求。

use std::path::{Path, PathBuf};

use anyhow::{bail, Result};
use clap::Args;
use tracing::{error, info, warn};
use vd_config::VarDaConfig;
use vd_core::{HistoricalSplit, ObservationSelector};

use crate::snapshot_csv::{load_snapshots, CsvOptions};

/// 验证参数
#[derive(Args)]
pub struct ValidateArgs {
    /// 配置文件路径
    #[arg(short, long)]
    pub config: PathBuf,

    /// 快照 CSV 路径
    #[arg(short, long)]
    pub snapshots: Option<PathBuf>,

    /// 严格模式（警告也视为错误）
    #[arg(long)]
    pub strict: bool,
}

#[derive(Default)]
struct ValidationResult {
    errors: Vec<String>,
    warnings: Vec<String>,
}

impl ValidationResult {
    fn is_ok(&self, strict: bool) -> bool {
        self.errors.is_empty() && (!strict || self.warnings.is_empty())
    }
}

/// 执行验证命令
pub fn execute(args: ValidateArgs) -> Result<()> {
    info!("=== VarDA 配置验证 ===");

    let mut result = ValidationResult::default();
    let config = validate_config(&args.config, &mut result);

    if let (Some(config), Some(path)) = (&config, &args.snapshots) {
        validate_snapshots(config, path, &mut result);
    }

    print_validation_result(&result, args.strict)
}

fn validate_config(path: &Path, result: &mut ValidationResult) -> Option<VarDaConfig> {
    println!("\n检查配置文件: {}", path.display());

    let config = match VarDaConfig::from_file(path) {
        Ok(config) => config,
        Err(e) => {
            result.errors.push(e.to_string());
            return None;
        }
    };
    println!("  ✓ 配置文件格式有效");

    let report = config.report();
    result.errors.extend(report.errors.iter().map(|e| e.to_string()));
    result.warnings.extend(report.warnings.iter().map(|w| w.to_string()));
    Some(config)
}

fn validate_snapshots(config: &VarDaConfig, path: &Path, result: &mut ValidationResult) {
    println!("\n检查快照文件: {}", path.display());

    let snapshots = match load_snapshots(path, &CsvOptions::default()) {
        Ok(s) => s,
        Err(e) => {
            result.errors.push(e.to_string());
            return;
        }
    };
    println!(
        "  ✓ {} 状态分量 × {} 时间步",
        snapshots.n_state(),
        snapshots.n_steps()
    );

    match HistoricalSplit::from_config(snapshots.n_steps(), config) {
        Ok(split) => {
            println!("  ✓ hist_idx={}, t_DA={}", split.hist_idx, split.t_da);
            if config.number_modes > split.hist_idx {
                result.errors.push(format!(
                    "number_modes={} 超过历史窗口长度 {}",
                    config.number_modes, split.hist_idx
                ));
            }
        }
        Err(e) => result.errors.push(e.to_string()),
    }

    match ObservationSelector::from_config(config).expected_count(snapshots.n_state()) {
        Ok(count) => println!("  ✓ 观测数 {count}"),
        Err(e) => result.errors.push(e.to_string()),
    }
}

fn print_validation_result(result: &ValidationResult, strict: bool) -> Result<()> {
    println!("\n=== 验证结果 ===");

    if !result.errors.is_empty() {
        println!("\n错误 ({}):", result.errors.len());
        for err in &result.errors {
            error!("  ✗ {}", err);
            println!("  ✗ {}", err);
        }
    }

    if !result.warnings.is_empty() {
        println!("\n警告 ({}):", result.warnings.len());
        for warning in &result.warnings {
            warn!("  ⚠ {}", warning);
            println!("  ⚠ {}", warning);
        }
    }

    if result.is_ok(strict) {
        println!("\n✓ 验证通过");
        Ok(())
    } else {
        println!("\n✗ 验证失败");
        bail!(
            "验证失败：发现 {} 个错误，{} 个警告",
            result.errors.len(),
            result.warnings.len()
        )
    }
}
