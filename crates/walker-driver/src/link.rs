//! 无线链路线程
//!
//! 读取定长帧，解码 `INSTRUCTIONS:` 消息，把解码出的指令整批追加到队列，
//! 并按配置原样回显每一帧。

use crate::config::LinkConfig;
use crate::metrics::WalkerMetrics;
use crate::queue::InstructionQueue;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::{debug, error, info, trace, warn};
use walker_hal::{HalError, LinkTransport};
use walker_protocol::{MessageKind, WireFrame, decode_message};

/// 一次轮询的结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkPoll {
    /// 没有可读帧
    Empty,
    /// 收到指令消息，追加了 `enqueued` 条
    Instructions { enqueued: usize, rejected: usize },
    /// 收到非指令消息
    Ignored(String),
}

/// 链路处理器
#[derive(Debug, Clone)]
pub struct LinkWorker {
    queue: Arc<InstructionQueue>,
    metrics: Arc<WalkerMetrics>,
    config: LinkConfig,
}

impl LinkWorker {
    pub fn new(
        queue: Arc<InstructionQueue>,
        metrics: Arc<WalkerMetrics>,
        config: LinkConfig,
    ) -> Self {
        Self {
            queue,
            metrics,
            config,
        }
    }

    /// 读取并处理一帧
    pub fn poll(&self, transport: &mut dyn LinkTransport) -> Result<LinkPoll, HalError> {
        let Some(frame) = transport.read_frame()? else {
            return Ok(LinkPoll::Empty);
        };
        self.metrics.frames_received.fetch_add(1, Ordering::Relaxed);

        let result = self.handle_frame(&frame);

        if self.config.echo {
            transport.write_frame(&frame)?;
            self.metrics.frames_echoed.fetch_add(1, Ordering::Relaxed);
        }
        Ok(result)
    }

    /// 解码一帧并入队
    pub fn handle_frame(&self, frame: &WireFrame) -> LinkPoll {
        let text = frame.text();
        trace!("Frame received: {:?}", text);
        self.handle_text(&text)
    }

    /// 解码一条消息文本并入队
    pub fn handle_text(&self, text: &str) -> LinkPoll {
        let report = decode_message(text);

        for rejection in &report.rejected {
            warn!(
                "Rejected entry #{} {:?}: {}",
                rejection.index, rejection.entry, rejection.error
            );
        }
        let rejected = report.rejected.len();
        if rejected > 0 {
            self.metrics
                .entries_rejected
                .fetch_add(rejected as u64, Ordering::Relaxed);
        }

        match report.kind {
            MessageKind::Ignored(key) => {
                debug!("Ignoring message with key {:?}", key);
                self.metrics.messages_ignored.fetch_add(1, Ordering::Relaxed);
                LinkPoll::Ignored(key)
            },
            MessageKind::Instructions => {
                let enqueued = self.queue.extend(report.accepted);
                self.metrics
                    .instructions_enqueued
                    .fetch_add(enqueued as u64, Ordering::Relaxed);
                info!(
                    "Enqueued {} instruction(s), {} rejected, queue length {}",
                    enqueued,
                    rejected,
                    self.queue.len()
                );
                LinkPoll::Instructions { enqueued, rejected }
            },
        }
    }
}

/// 链路线程主循环
///
/// 可恢复的错误记录后继续；链路断开等致命错误结束本线程，
/// 导航线程继续执行已入队的指令。
pub fn link_loop(
    worker: LinkWorker,
    mut transport: Box<dyn LinkTransport>,
    is_running: Arc<AtomicBool>,
) {
    let backoff = Duration::from_millis(worker.config.idle_backoff_ms);

    while is_running.load(Ordering::Acquire) {
        match worker.poll(transport.as_mut()) {
            Ok(LinkPoll::Empty) => std::thread::sleep(backoff),
            Ok(_) => {},
            Err(e) if e.is_fatal() => {
                worker.metrics.link_errors.fetch_add(1, Ordering::Relaxed);
                error!("Link lost: {}, link thread exiting", e);
                return;
            },
            Err(e) => {
                worker.metrics.link_errors.fetch_add(1, Ordering::Relaxed);
                warn!("Link error: {}", e);
                std::thread::sleep(backoff);
            },
        }
    }
    trace!("Link thread exiting");
}
