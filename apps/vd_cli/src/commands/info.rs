// apps/vd_cli/src/commands/info.rs

//! 信息显示命令

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use tracing::info;
use vd_config::{CompressionMethod, VarDaConfig};

/// 信息显示参数
#[derive(Args)]
pub struct InfoArgs {
    /// 将默认配置写入该路径
    #[arg(long)]
    pub write_defaults: Option<PathBuf>,
}

/// 执行信息命令
pub fn execute(args: InfoArgs) -> Result<()> {
    info!("=== VarDA 信息 ===");

    print_system_info();
    println!();
    print_default_config()?;

    if let Some(path) = &args.write_defaults {
        VarDaConfig::default()
            .save_to_file(path)
            .with_context(|| format!("无法写出默认配置 {}", path.display()))?;
        println!("\n默认配置已写入 {}", path.display());
    }

    Ok(())
}

fn print_system_info() {
    println!("=== 系统信息 ===");
    println!("VarDA CLI 版本: {}", env!("CARGO_PKG_VERSION"));
    println!("目标平台: {}", std::env::consts::ARCH);
    println!("操作系统: {}", std::env::consts::OS);
    println!("\n降维方法:");
    for method in CompressionMethod::SUPPORTED {
        println!("  - {method}");
    }
}

fn print_default_config() -> Result<()> {
    println!("=== 默认配置 ===");
    let json = serde_json::to_string_pretty(&VarDaConfig::default())?;
    println!("{json}");
    Ok(())
}
