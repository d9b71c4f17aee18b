// apps/vd_cli/src/commands/generate.rs

//! 合成数据生成命令
//!
//! 写出低秩加噪声的快照 CSV，可选地写出一个随机初始化的 MLP 解码器，
//! 用于在没有真实数据时演练完整流程。

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use tracing::info;
use vd_core::{Activation, MlpDecoder, SyntheticSnapshots};

use crate::snapshot_csv::{save_snapshots, CsvOptions};

/// 生成参数
#[derive(Args)]
pub struct GenerateArgs {
    /// 快照输出路径
    #[arg(short, long, default_value = "snapshots.csv")]
    pub output: PathBuf,

    /// 状态维度 n
    #[arg(long, default_value = "100")]
    pub n_state: usize,

    /// 时间步数 M
    #[arg(long, default_value = "50")]
    pub n_steps: usize,

    /// 低秩模态数
    #[arg(long, default_value = "4")]
    pub n_modes: usize,

    /// 噪声标准差
    #[arg(long, default_value = "0.01")]
    pub noise: f64,

    /// 随机种子
    #[arg(long, default_value = "42")]
    pub seed: u64,

    /// 同时写出随机解码器（JSON）
    #[arg(long)]
    pub decoder: Option<PathBuf>,

    /// 解码器隐空间维度
    #[arg(long, default_value = "2")]
    pub latent: usize,

    /// 解码器隐藏层宽度（自隐空间一侧起，逗号分隔）
    #[arg(long, value_delimiter = ',', default_value = "16,32")]
    pub hidden: Vec<usize>,
}

/// 执行生成命令
pub fn execute(args: GenerateArgs) -> Result<()> {
    info!("=== VarDA 合成数据 ===");

    let params = SyntheticSnapshots {
        n_state: args.n_state,
        n_steps: args.n_steps,
        n_modes: args.n_modes,
        noise_std: args.noise,
        seed: args.seed,
        ..SyntheticSnapshots::default()
    };
    let snapshots = params.generate().context("生成合成快照失败")?;
    save_snapshots(&args.output, &snapshots, &CsvOptions::default())
        .with_context(|| format!("无法写出快照 {}", args.output.display()))?;
    info!(
        "快照: {} × {} 已写入 {}",
        snapshots.n_state(),
        snapshots.n_steps(),
        args.output.display()
    );

    if let Some(path) = &args.decoder {
        let decoder = MlpDecoder::random(
            args.latent,
            &args.hidden,
            args.n_state,
            Activation::Tanh,
            args.seed,
        )
        .context("构建随机解码器失败")?;
        let json = decoder.to_json()?;
        std::fs::write(path, json)
            .with_context(|| format!("无法写出解码器 {}", path.display()))?;

        let mut ae_hidden = args.hidden.clone();
        ae_hidden.reverse();
        info!("解码器已写入 {}", path.display());
        info!(
            "对应配置: decoder.latent_size={}, decoder.hidden_layers={:?}",
            args.latent, ae_hidden
        );
    }

    Ok(())
}
