//! decode 命令
//!
//! 离线检查一条消息会被如何解码

use anyhow::{Result, bail};
use clap::Args;
use walker_sdk::protocol::{MessageKind, decode_message};

/// 解码命令参数
#[derive(Args, Debug)]
pub struct DecodeCommand {
    /// 消息文本，如 "INSTRUCTIONS:FORWARD,2;TURN,1,LEFT"
    pub message: String,

    /// 以 JSON 输出解码出的指令
    #[arg(long)]
    pub json: bool,
}

impl DecodeCommand {
    pub fn execute(&self) -> Result<()> {
        let report = decode_message(&self.message);

        if let MessageKind::Ignored(key) = &report.kind {
            println!("⏭️  Ignored message (key {:?})", key);
            return Ok(());
        }

        if self.json {
            println!("{}", serde_json::to_string_pretty(&report.accepted)?);
        } else {
            println!("📋 {} instruction(s)", report.accepted.len());
            for (i, instruction) in report.accepted.iter().enumerate() {
                println!("  {:>3}. {}", i + 1, instruction);
            }
        }

        for rejection in &report.rejected {
            eprintln!(
                "  ❌ entry #{} {:?}: {}",
                rejection.index, rejection.entry, rejection.error
            );
        }
        if !report.rejected.is_empty() {
            bail!("{} entry(ies) rejected", report.rejected.len());
        }
        Ok(())
    }
}
