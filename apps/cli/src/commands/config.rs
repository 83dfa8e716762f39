//! 配置管理命令

use super::load_config;
use anyhow::Result;
use clap::Subcommand;
use std::path::Path;

/// 配置命令
#[derive(Subcommand, Debug)]
pub enum ConfigCommand {
    /// 打印生效的配置（TOML）
    Show,

    /// 校验配置文件
    Check,
}

impl ConfigCommand {
    pub fn execute(&self, path: Option<&Path>) -> Result<()> {
        let config = load_config(path)?;
        match self {
            ConfigCommand::Show => {
                print!("{}", config.to_toml_string()?);
            },
            ConfigCommand::Check => {
                match path {
                    Some(path) => println!("✅ {} is valid", path.display()),
                    None => println!("✅ Built-in defaults are valid"),
                }
                if let Some(timeout) = config.navigation.instruction_timeout_ms {
                    println!("   instruction timeout: {} ms", timeout);
                } else {
                    println!("   instruction timeout: disabled");
                }
            },
        }
        Ok(())
    }
}
