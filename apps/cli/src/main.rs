//! # Walker CLI
//!
//! 巡线机器人命令行工具。
//!
//! ```bash
//! # 解码一条指令消息
//! walker-cli decode "INSTRUCTIONS:FORWARD,2;TURN,1,LEFT;PICK,1"
//!
//! # 查看 / 校验配置
//! walker-cli config show
//! walker-cli --config walker.toml config check
//!
//! # 在仿真地图上执行任务（Ctrl+C 触发紧急停止）
//! walker-cli simulate -m "INSTRUCTIONS:FORWARD,2;TURN,1,RIGHT;PICK,1;DROP,1"
//! ```

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod commands;
mod sim;

use commands::{ConfigCommand, DecodeCommand, SimulateCommand};

/// Walker CLI - 巡线机器人命令行工具
#[derive(Parser, Debug)]
#[command(name = "walker-cli")]
#[command(about = "Command-line interface for the line-walker robot", long_about = None)]
#[command(version)]
struct Cli {
    /// 配置文件（TOML），缺省使用内置默认值
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// 解码一条 INSTRUCTIONS 消息
    Decode {
        #[command(flatten)]
        args: DecodeCommand,
    },

    /// 配置管理
    #[command(subcommand)]
    Config(ConfigCommand),

    /// 在仿真地图上执行指令
    Simulate {
        #[command(flatten)]
        args: SimulateCommand,
    },
}

fn main() -> Result<()> {
    if let Err(e) = walker_sdk::init_logger("walker_cli=info,walker_driver=info") {
        eprintln!("Failed to initialize logging: {}", e);
    }

    let cli = Cli::parse();

    match cli.command {
        Commands::Decode { args } => args.execute(),
        Commands::Config(cmd) => cmd.execute(cli.config.as_deref()),
        Commands::Simulate { args } => args.execute(cli.config.as_deref()),
    }
}
