// apps/vd_cli/src/commands/run.rs

//! 运行同化命令
//!
//! 载入快照与配置，执行一次降阶三维变分同化并输出结果。
//!
//! # 架构说明
//!
//! 本模块属于 Layer 4: Application：
//! - 配置文件缺省时使用 `VarDaConfig::default()`
//! - 命令行参数覆盖配置中的同名字段
//! - 快照缺省时使用内置的合成快照

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Args;
use tracing::{info, warn};
use vd_config::{CompressionMethod, VarDaConfig};
use vd_core::{Decoder, MlpDecoder, SyntheticSnapshots, VarDaPipeline};

use crate::output::ResultFile;
use crate::snapshot_csv::{load_snapshots, CsvOptions};

/// 运行同化参数
#[derive(Args)]
pub struct RunArgs {
    /// 配置文件路径（JSON）
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// 快照 CSV 路径（n 行 × M 列）
    #[arg(short, long)]
    pub snapshots: Option<PathBuf>,

    /// 解码器权重路径（JSON，仅 AE）
    #[arg(short, long)]
    pub decoder: Option<PathBuf>,

    /// 结果输出路径（JSON）
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// 降维方法 (SVD, AE)
    #[arg(long)]
    pub method: Option<CompressionMethod>,

    /// 保留模态数
    #[arg(long)]
    pub modes: Option<usize>,

    /// 随机种子
    #[arg(long)]
    pub seed: Option<u64>,

    /// CSV 分隔符
    #[arg(long, default_value = ",")]
    pub delimiter: char,
}

/// 执行运行命令
pub fn execute(args: RunArgs) -> Result<()> {
    info!("=== VarDA 同化启动 ===");

    let mut config = match &args.config {
        Some(path) => VarDaConfig::from_file(path)
            .with_context(|| format!("无法加载配置文件 {}", path.display()))?,
        None => {
            info!("未指定配置文件，使用默认配置");
            VarDaConfig::default()
        }
    };
    if let Some(method) = args.method {
        config.compression_method = method;
    }
    if let Some(modes) = args.modes {
        config.number_modes = modes;
    }
    if let Some(seed) = args.seed {
        config.seed = seed;
    }

    info!(
        "配置: method={}, modes={}, alpha={}, sigma2={}, obs_frac={}",
        config.compression_method,
        config.number_modes,
        config.alpha,
        config.obs_variance,
        config.obs_frac
    );

    let snapshots = match &args.snapshots {
        Some(path) => {
            let options = CsvOptions {
                delimiter: args.delimiter,
                ..CsvOptions::default()
            };
            load_snapshots(path, &options)
                .with_context(|| format!("无法加载快照文件 {}", path.display()))?
        }
        None => {
            info!("未指定快照文件，使用合成快照");
            SyntheticSnapshots::default()
                .generate()
                .context("生成合成快照失败")?
        }
    };
    info!("快照: {} 状态分量 × {} 时间步", snapshots.n_state(), snapshots.n_steps());

    let mut pipeline = VarDaPipeline::new(config).context("配置无效")?;

    if let Some(path) = &args.decoder {
        if pipeline.config().compression_method != CompressionMethod::Ae {
            warn!("降维方法为 {}，忽略解码器 {}", pipeline.config().compression_method, path.display());
        } else {
            let decoder = MlpDecoder::from_file(path)
                .with_context(|| format!("无法加载解码器 {}", path.display()))?;
            info!("解码器: latent={}, output={}", decoder.latent_size(), decoder.output_size());
            pipeline = pipeline.with_decoder(Arc::new(decoder));
        }
    }

    let outcome = pipeline.run(&snapshots).context("同化失败")?;
    let opt = &outcome.optimization;
    let report = &outcome.report;

    info!("=== 同化完成 ===");
    info!(
        "划分: hist_idx={}, t_DA={}, 观测数={}",
        outcome.split.hist_idx,
        outcome.split.t_da,
        outcome.observations.count()
    );
    if let Some(basis) = &outcome.basis {
        info!(
            "截断基: k={}, rank={}, 捕获方差={:.4}",
            basis.n_modes, basis.rank, basis.captured_variance
        );
    }
    info!(
        "优化: 迭代 {}, J={:.6e}, |grad|={:.3e}, 耗时 {:.3} s",
        opt.iterations,
        opt.cost,
        opt.gradient_norm,
        opt.elapsed.as_secs_f64()
    );
    if !opt.status.is_converged() {
        warn!("优化未收敛: {}", opt.termination);
    }
    info!("背景态 MAE: {:.6e}", report.ref_mae());
    info!("同化态 MAE: {:.6e}", report.da_mae());
    info!("改进比: {:.4}", report.improvement_ratio());

    if let Some(path) = &args.output {
        ResultFile::from(&outcome)
            .save(path)
            .with_context(|| format!("无法写出结果 {}", path.display()))?;
        info!("结果已写入 {}", path.display());
    }

    Ok(())
}
