//! 命令定义和实现

pub mod config;
pub mod decode;
pub mod simulate;

pub use config::ConfigCommand;
pub use decode::DecodeCommand;
pub use simulate::SimulateCommand;

use anyhow::{Context, Result};
use std::path::Path;
use walker_sdk::WalkerConfig;

/// 加载配置文件；未指定时使用默认配置
pub fn load_config(path: Option<&Path>) -> Result<WalkerConfig> {
    match path {
        Some(path) => WalkerConfig::load(path)
            .with_context(|| format!("Failed to load config from {}", path.display())),
        None => Ok(WalkerConfig::default()),
    }
}
