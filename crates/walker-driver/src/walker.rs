//! Walker 对外 API
//!
//! 持有链路、导航、巡线三个工作线程，以及它们共享的队列、激活门与统计。

use crate::config::WalkerConfig;
use crate::error::DriverError;
use crate::gate::ActivationGate;
use crate::link::{LinkPoll, LinkWorker};
use crate::metrics::{MetricsSnapshot, WalkerMetrics};
use crate::navigation::{NavigationEvent, NavigationSnapshot, OverrideEvent};
use crate::queue::InstructionQueue;
use arc_swap::ArcSwap;
use crossbeam_channel::{Receiver, Sender};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{JoinHandle, spawn};
use std::time::{Duration, Instant};
use tracing::{error, info};
use walker_protocol::Instruction;

/// Extension trait for timeout-capable thread joins
trait JoinTimeout {
    fn join_timeout(self, timeout: Duration) -> std::thread::Result<()>;
}

impl<T: Send + 'static> JoinTimeout for JoinHandle<T> {
    fn join_timeout(self, timeout: Duration) -> std::thread::Result<()> {
        use std::sync::mpsc;

        let (tx, rx) = mpsc::channel();

        // 看门狗线程负责 join，超时后由进程退出回收
        spawn(move || {
            let result = self.join();
            let _ = tx.send(result);
        });

        match rx.recv_timeout(timeout) {
            Ok(join_result) => join_result.map(|_| ()),
            Err(mpsc::RecvTimeoutError::Timeout) => Err(Box::new(std::io::Error::new(
                std::io::ErrorKind::TimedOut,
                "Thread join timeout",
            ))),
            Err(mpsc::RecvTimeoutError::Disconnected) => Err(Box::new(std::io::Error::new(
                std::io::ErrorKind::ConnectionReset,
                "Thread panicked during join",
            ))),
        }
    }
}

/// 运行中的机器人
///
/// 通过 [`WalkerBuilder`](crate::WalkerBuilder) 创建。Drop 时停止所有线程并等待其退出。
pub struct Walker {
    pub(crate) config: WalkerConfig,
    pub(crate) queue: Arc<InstructionQueue>,
    pub(crate) gate: Arc<ActivationGate>,
    pub(crate) metrics: Arc<WalkerMetrics>,
    pub(crate) status: Arc<ArcSwap<NavigationSnapshot>>,
    pub(crate) events: Receiver<NavigationEvent>,
    pub(crate) overrides: Sender<OverrideEvent>,
    pub(crate) worker: LinkWorker,
    pub(crate) is_running: Arc<AtomicBool>,
    pub(crate) link_thread: Option<JoinHandle<()>>,
    pub(crate) nav_thread: Option<JoinHandle<()>>,
    pub(crate) tracker_thread: Option<JoinHandle<()>>,
}

impl Walker {
    pub fn config(&self) -> &WalkerConfig {
        &self.config
    }

    /// 共享指令队列
    pub fn queue(&self) -> &Arc<InstructionQueue> {
        &self.queue
    }

    /// 激活门（只读观察用；开关由导航线程负责）
    pub fn gate(&self) -> &Arc<ActivationGate> {
        &self.gate
    }

    /// 追加单条指令
    pub fn enqueue(&self, instruction: Instruction) {
        self.queue.push(instruction);
        self.metrics
            .instructions_enqueued
            .fetch_add(1, Ordering::Relaxed);
    }

    /// 像收到一帧一样处理一条消息文本
    pub fn submit_message(&self, text: &str) -> LinkPoll {
        self.worker.handle_text(text)
    }

    /// 最新的导航状态
    pub fn status(&self) -> NavigationSnapshot {
        **self.status.load()
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    /// 导航事件接收端
    pub fn events(&self) -> &Receiver<NavigationEvent> {
        &self.events
    }

    /// 工作线程是否仍在运行（紧急停止后为 `false`）
    pub fn is_running(&self) -> bool {
        self.is_running.load(Ordering::Acquire)
    }

    /// 发送覆盖信号
    ///
    /// # 错误
    /// 导航线程已退出时返回 `DriverError::EmergencyStopped`。
    pub fn send_override(&self, event: OverrideEvent) -> Result<(), DriverError> {
        if !self.is_running() {
            return Err(DriverError::EmergencyStopped);
        }
        self.overrides
            .send(event)
            .map_err(|_| DriverError::EmergencyStopped)
    }

    pub fn start(&self) -> Result<(), DriverError> {
        self.send_override(OverrideEvent::Start)
    }

    pub fn stop(&self) -> Result<(), DriverError> {
        self.send_override(OverrideEvent::Stop)
    }

    pub fn emergency_stop(&self) -> Result<(), DriverError> {
        self.send_override(OverrideEvent::EmergencyStop)
    }

    /// 等待队列执行完毕
    ///
    /// 返回 `Ok(true)` 表示队列已空且没有正在执行的指令；
    /// 超时或被 `Stop` 暂停时返回 `Ok(false)`。
    ///
    /// # 错误
    /// - `DriverError::Stalled`: 队首指令超时，导航已暂停
    /// - `DriverError::EmergencyStopped`: 已紧急停止
    pub fn wait_idle(&self, timeout: Duration) -> Result<bool, DriverError> {
        let start = Instant::now();
        loop {
            let status = self.status();
            if status.halted {
                return Err(DriverError::EmergencyStopped);
            }
            if let (Some(instruction), Some(elapsed)) = (status.head, status.stalled) {
                return Err(DriverError::Stalled {
                    instruction,
                    elapsed,
                });
            }
            if status.head.is_none() && self.queue.is_empty() {
                return Ok(true);
            }
            if status.paused || start.elapsed() >= timeout {
                return Ok(false);
            }
            std::thread::sleep(Duration::from_millis(1));
        }
    }
}

impl Drop for Walker {
    fn drop(&mut self) {
        // Release: 线程看到 false 时也能看到此前的全部写入
        self.is_running.store(false, Ordering::Release);
        // 唤醒阻塞在门上的巡线线程
        self.gate.shutdown();

        let join_timeout = Duration::from_secs(2);
        for (name, handle) in [
            ("Link", self.link_thread.take()),
            ("Navigation", self.nav_thread.take()),
            ("Tracker", self.tracker_thread.take()),
        ] {
            if let Some(handle) = handle
                && let Err(_e) = handle.join_timeout(join_timeout)
            {
                error!(
                    "{} thread panicked or failed to shut down within {:?}",
                    name, join_timeout
                );
            }
        }
        info!("Walker shut down");
    }
}
