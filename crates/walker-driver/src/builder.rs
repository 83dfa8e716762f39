//! Builder 模式实现
//!
//! 提供链式构造 `Walker` 实例的便捷方式。

use crate::config::WalkerConfig;
use crate::error::DriverError;
use crate::gate::ActivationGate;
use crate::link::{LinkWorker, link_loop};
use crate::metrics::WalkerMetrics;
use crate::navigation::{NavigationController, navigation_loop};
use crate::queue::InstructionQueue;
use crate::tracker::{LineTracker, tracker_loop};
use crate::walker::Walker;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::thread;
use std::time::Duration;
use tracing::info;
use walker_hal::{LinkTransport, WalkerHardware};

/// Walker Builder（链式构造）
///
/// # Example
///
/// ```no_run
/// # use walker_driver::{WalkerBuilder, WalkerConfig};
/// # fn run(hardware: walker_hal::WalkerHardware) -> Result<(), walker_driver::DriverError> {
/// let walker = WalkerBuilder::new(hardware)
///     .config(WalkerConfig::load("walker.toml")?)
///     .build()?;
/// walker.submit_message("INSTRUCTIONS:FORWARD,2;TURN,1,LEFT");
/// # Ok(())
/// # }
/// ```
pub struct WalkerBuilder {
    hardware: WalkerHardware,
    config: WalkerConfig,
    link: Option<Box<dyn LinkTransport>>,
}

impl WalkerBuilder {
    pub fn new(hardware: WalkerHardware) -> Self {
        Self {
            hardware,
            config: WalkerConfig::default(),
            link: None,
        }
    }

    /// 设置运行配置
    pub fn config(mut self, config: WalkerConfig) -> Self {
        self.config = config;
        self
    }

    /// 设置无线链路
    ///
    /// 不设置时不启动链路线程，只能通过 [`Walker::submit_message`] 提交指令。
    pub fn link(mut self, transport: impl LinkTransport + 'static) -> Self {
        self.link = Some(Box::new(transport));
        self
    }

    /// 校验配置并启动工作线程
    ///
    /// # 错误
    /// - `DriverError::Config`: 配置无效
    /// - `DriverError::ThreadSpawn`: 线程启动失败
    pub fn build(self) -> Result<Walker, DriverError> {
        self.config.validate()?;
        let WalkerBuilder {
            hardware,
            config,
            link,
        } = self;

        let queue = Arc::new(InstructionQueue::new());
        let gate = Arc::new(ActivationGate::new());
        let metrics = Arc::new(WalkerMetrics::new());
        let is_running = Arc::new(AtomicBool::new(true));
        let (event_tx, events) = crossbeam_channel::bounded(config.navigation.event_capacity);
        let (overrides, override_rx) = crossbeam_channel::unbounded();

        let navigation = NavigationController::new(
            config.navigation.clone(),
            config.tracker.outer_sensor,
            Arc::clone(&queue),
            Arc::clone(&gate),
            hardware.clone(),
            Arc::clone(&metrics),
        )
        .with_events(event_tx)
        .with_overrides(override_rx);
        let status = navigation.snapshot_handle();

        let tracker = LineTracker::new(
            config.tracker.clone(),
            Arc::clone(&gate),
            hardware,
            Arc::clone(&metrics),
        );
        let worker = LinkWorker::new(Arc::clone(&queue), Arc::clone(&metrics), config.link.clone());

        // 先构造 Walker：后续任一线程启动失败时由 Drop 回收已启动的线程
        let mut walker = Walker {
            config,
            queue,
            gate,
            metrics,
            status,
            events,
            overrides,
            worker: worker.clone(),
            is_running: Arc::clone(&is_running),
            link_thread: None,
            nav_thread: None,
            tracker_thread: None,
        };

        let min_period = Duration::from_micros(walker.config.tracker.min_period_us);
        let running = Arc::clone(&is_running);
        walker.tracker_thread = Some(
            thread::Builder::new()
                .name("walker-tracker".into())
                .spawn(move || tracker_loop(tracker, running, min_period))
                .map_err(|e| DriverError::ThreadSpawn(format!("tracker thread: {}", e)))?,
        );

        let running = Arc::clone(&is_running);
        walker.nav_thread = Some(
            thread::Builder::new()
                .name("walker-nav".into())
                .spawn(move || navigation_loop(navigation, running))
                .map_err(|e| DriverError::ThreadSpawn(format!("navigation thread: {}", e)))?,
        );

        if let Some(transport) = link {
            let running = Arc::clone(&is_running);
            walker.link_thread = Some(
                thread::Builder::new()
                    .name("walker-link".into())
                    .spawn(move || link_loop(worker, transport, running))
                    .map_err(|e| DriverError::ThreadSpawn(format!("link thread: {}", e)))?,
            );
        }

        info!(
            "Walker started (link: {})",
            if walker.link_thread.is_some() { "attached" } else { "none" }
        );
        Ok(walker)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use walker_hal::mock::MockRig;

    #[test]
    fn test_invalid_config_rejected() {
        let rig = MockRig::new();
        let mut config = WalkerConfig::default();
        config.navigation.maneuver_speed = 0;
        let result = WalkerBuilder::new(rig.hardware()).config(config).build();
        assert!(matches!(result, Err(DriverError::Config(_))));
    }

    #[test]
    fn test_build_and_drop() {
        let rig = MockRig::new();
        let walker = WalkerBuilder::new(rig.hardware()).build().unwrap();
        assert!(walker.is_running());
        drop(walker);
    }
}
