// apps/vd_cli/src/main.rs

//! VarDA 命令行界面
//!
//! 降阶三维变分同化的命令行工具。
//!
//! # 架构层级
//!
//! 本模块属于 **Layer 4: Application**：
//! - 负责快照 CSV 与解码器权重的载入、结果 JSON 的写出
//! - 数值计算全部委托给 `vd_core::VarDaPipeline`

mod commands;
mod output;
mod snapshot_csv;

use clap::{Parser, Subcommand};
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

/// VarDA 降阶变分同化命令行工具
#[derive(Parser)]
#[command(name = "vd_cli")]
#[command(author = "VarDA Team")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Reduced-order 3D-Var data assimilation", long_about = None)]
struct Cli {
    /// 日志级别 (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// 运行同化
    Run(commands::run::RunArgs),
    /// 验证配置
    Validate(commands::validate::ValidateArgs),
    /// 生成合成快照
    Generate(commands::generate::GenerateArgs),
    /// 显示信息
    Info(commands::info::InfoArgs),
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let level = match cli.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    match cli.command {
        Commands::Run(args) => commands::run::execute(args),
        Commands::Validate(args) => commands::validate::execute(args),
        Commands::Generate(args) => commands::generate::execute(args),
        Commands::Info(args) => commands::info::execute(args),
    }
}
