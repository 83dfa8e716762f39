//! simulate 命令
//!
//! 在仿真地图上运行完整的 Walker（链路、导航、巡线三个线程），
//! 消息通过 mock 链路送入。Ctrl+C 触发紧急停止。

use super::load_config;
use crate::sim::SimWorld;
use anyhow::{Context, Result, bail};
use clap::Args;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use tracing::info;
use walker_sdk::WalkerBuilder;
use walker_sdk::driver::NavigationEvent;
use walker_sdk::hal::mock::{MockLink, MockRig};
use walker_sdk::protocol::decode_message;

/// 仿真命令参数
#[derive(Args, Debug)]
pub struct SimulateCommand {
    /// 要发送的消息（可重复）
    #[arg(short, long = "message")]
    pub messages: Vec<String>,

    /// 从文件读取消息（每行一条，`#` 开头为注释）
    #[arg(short, long)]
    pub script: Option<PathBuf>,

    /// 最长运行时间（秒）
    #[arg(short, long, default_value_t = 60)]
    pub timeout: u64,

    /// 横线间距（仿真单位）
    #[arg(long, default_value_t = 300.0)]
    pub line_spacing: f32,
}

impl SimulateCommand {
    pub fn execute(&self, config_path: Option<&Path>) -> Result<()> {
        let config = load_config(config_path)?;
        let messages = self.collect_messages()?;
        if messages.is_empty() {
            bail!("No messages given (use --message or --script)");
        }
        if !(self.line_spacing.is_finite() && self.line_spacing > 0.0) {
            bail!("--line-spacing must be > 0");
        }

        let expected: u64 = messages
            .iter()
            .map(|m| decode_message(m).accepted.len() as u64)
            .sum();

        let interrupted = Arc::new(AtomicBool::new(false));
        {
            let interrupted = Arc::clone(&interrupted);
            ctrlc::set_handler(move || {
                eprintln!("\nReceived interrupt signal. Emergency stop...");
                interrupted.store(true, Ordering::Release);
            })
            .context("Failed to set signal handler")?;
        }

        let rig = MockRig::new();
        let link = MockLink::new();
        for message in &messages {
            link.push_text(message)
                .with_context(|| format!("Message does not fit in a frame: {:?}", message))?;
        }

        let stop_world = Arc::new(AtomicBool::new(false));
        let world = SimWorld::new(rig.clone(), self.line_spacing);
        let world_thread = {
            let stop_world = Arc::clone(&stop_world);
            std::thread::Builder::new()
                .name("walker-sim".into())
                .spawn(move || world.run(stop_world))
                .context("Failed to spawn simulation thread")?
        };

        let walker = WalkerBuilder::new(rig.hardware())
            .config(config)
            .link(link.clone())
            .build()?;
        info!(
            "Simulating {} message(s), {} instruction(s)",
            messages.len(),
            expected
        );

        let deadline = Instant::now() + Duration::from_secs(self.timeout);
        let outcome = loop {
            if interrupted.swap(false, Ordering::AcqRel) {
                let _ = walker.emergency_stop();
            }
            if walker.metrics().instructions_completed >= expected {
                break Ok(());
            }
            if !walker.is_running() {
                break Err(anyhow::anyhow!("Walker halted"));
            }
            if Instant::now() >= deadline {
                break Err(anyhow::anyhow!(
                    "Timed out after {}s with {} instruction(s) queued",
                    self.timeout,
                    walker.queue().len()
                ));
            }

            match walker.events().recv_timeout(Duration::from_millis(50)) {
                Ok(NavigationEvent::Stalled {
                    instruction,
                    phase,
                    elapsed,
                }) => {
                    break Err(anyhow::anyhow!(
                        "{} stalled in {:?} after {:?}",
                        instruction,
                        phase,
                        elapsed
                    ));
                },
                Ok(event) => print_event(&event),
                Err(_) => {},
            }
        };

        // 把剩余事件打印完
        for event in walker.events().try_iter() {
            print_event(&event);
        }

        let metrics = walker.metrics();
        println!();
        println!("📊 Summary");
        println!("   completed:         {}/{}", metrics.instructions_completed, expected);
        println!("   entries rejected:  {}", metrics.entries_rejected);
        println!("   tracker iterations:{:>8}", metrics.tracker_iterations);
        println!("   windup resets:     {:.1}%", metrics.windup_rate());
        println!("   device errors:     {}", metrics.device_errors);
        println!("   gripper moves:     {:?}", rig.gripper.rotations());

        drop(walker);
        stop_world.store(true, Ordering::Release);
        if world_thread.join().is_err() {
            eprintln!("Simulation thread panicked");
        }

        outcome
    }

    fn collect_messages(&self) -> Result<Vec<String>> {
        let mut messages = self.messages.clone();
        if let Some(path) = &self.script {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read {}", path.display()))?;
            messages.extend(
                text.lines()
                    .map(str::trim)
                    .filter(|line| !line.is_empty() && !line.starts_with('#'))
                    .map(str::to_string),
            );
        }
        Ok(messages)
    }
}

fn print_event(event: &NavigationEvent) {
    match event {
        NavigationEvent::Started { instruction } => println!("▶️  {}", instruction),
        NavigationEvent::Completed { instruction } => println!("✅ {}", instruction),
        NavigationEvent::Idle => println!("💤 queue empty"),
        NavigationEvent::Paused => println!("⏸️  paused"),
        NavigationEvent::Resumed => println!("⏯️  resumed"),
        NavigationEvent::Stalled {
            instruction,
            phase,
            elapsed,
        } => println!("⚠️  {} stalled in {:?} after {:?}", instruction, phase, elapsed),
        NavigationEvent::Interrupted { instruction, phase } => {
            println!("⚠️  {} interrupted in {:?}", instruction, phase)
        },
        NavigationEvent::EmergencyStopped => println!("🛑 emergency stop"),
    }
}
