//! 运行指标模块
//!
//! 原子计数器，任何线程都可以无锁读取。

use std::sync::atomic::{AtomicU64, Ordering};

/// Walker 实时指标
///
/// # 使用示例
///
/// ```rust
/// use walker_driver::WalkerMetrics;
/// use std::sync::atomic::Ordering;
///
/// let metrics = WalkerMetrics::default();
/// metrics.frames_received.fetch_add(1, Ordering::Relaxed);
/// assert_eq!(metrics.snapshot().frames_received, 1);
/// ```
#[derive(Debug, Default)]
pub struct WalkerMetrics {
    /// 链路收到的帧数
    pub frames_received: AtomicU64,

    /// 回显成功的帧数
    pub frames_echoed: AtomicU64,

    /// 链路读写错误次数
    pub link_errors: AtomicU64,

    /// 被忽略的消息数（未知顶层键）
    pub messages_ignored: AtomicU64,

    /// 入队的指令数
    pub instructions_enqueued: AtomicU64,

    /// 被丢弃的条目数
    pub entries_rejected: AtomicU64,

    /// 执行完成的指令数
    pub instructions_completed: AtomicU64,

    /// 巡线控制器迭代次数
    pub tracker_iterations: AtomicU64,

    /// 抗积分饱和保护触发次数
    pub windup_resets: AtomicU64,

    /// 电机/传感器错误次数
    pub device_errors: AtomicU64,

    /// 指令超时次数
    pub stalls: AtomicU64,

    /// 因事件通道已满而丢弃的导航事件数
    pub events_dropped: AtomicU64,
}

impl WalkerMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// 获取所有计数器的快照
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            frames_received: self.frames_received.load(Ordering::Relaxed),
            frames_echoed: self.frames_echoed.load(Ordering::Relaxed),
            link_errors: self.link_errors.load(Ordering::Relaxed),
            messages_ignored: self.messages_ignored.load(Ordering::Relaxed),
            instructions_enqueued: self.instructions_enqueued.load(Ordering::Relaxed),
            entries_rejected: self.entries_rejected.load(Ordering::Relaxed),
            instructions_completed: self.instructions_completed.load(Ordering::Relaxed),
            tracker_iterations: self.tracker_iterations.load(Ordering::Relaxed),
            windup_resets: self.windup_resets.load(Ordering::Relaxed),
            device_errors: self.device_errors.load(Ordering::Relaxed),
            stalls: self.stalls.load(Ordering::Relaxed),
            events_dropped: self.events_dropped.load(Ordering::Relaxed),
        }
    }

    /// 重置所有计数器
    pub fn reset(&self) {
        self.frames_received.store(0, Ordering::Relaxed);
        self.frames_echoed.store(0, Ordering::Relaxed);
        self.link_errors.store(0, Ordering::Relaxed);
        self.messages_ignored.store(0, Ordering::Relaxed);
        self.instructions_enqueued.store(0, Ordering::Relaxed);
        self.entries_rejected.store(0, Ordering::Relaxed);
        self.instructions_completed.store(0, Ordering::Relaxed);
        self.tracker_iterations.store(0, Ordering::Relaxed);
        self.windup_resets.store(0, Ordering::Relaxed);
        self.device_errors.store(0, Ordering::Relaxed);
        self.stalls.store(0, Ordering::Relaxed);
        self.events_dropped.store(0, Ordering::Relaxed);
    }
}

/// 指标快照（不可变）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MetricsSnapshot {
    pub frames_received: u64,
    pub frames_echoed: u64,
    pub link_errors: u64,
    pub messages_ignored: u64,
    pub instructions_enqueued: u64,
    pub entries_rejected: u64,
    pub instructions_completed: u64,
    pub tracker_iterations: u64,
    pub windup_resets: u64,
    pub device_errors: u64,
    pub stalls: u64,
    pub events_dropped: u64,
}

impl MetricsSnapshot {
    /// 条目丢弃率（百分比）
    ///
    /// 返回 0.0 到 100.0 之间的值。没有任何条目时返回 0.0。
    pub fn rejection_rate(&self) -> f64 {
        let total = self.instructions_enqueued + self.entries_rejected;
        if total == 0 {
            return 0.0;
        }
        (self.entries_rejected as f64 / total as f64) * 100.0
    }

    /// 抗积分饱和触发率（百分比）
    pub fn windup_rate(&self) -> f64 {
        if self.tracker_iterations == 0 {
            return 0.0;
        }
        (self.windup_resets as f64 / self.tracker_iterations as f64) * 100.0
    }

    /// 队列中尚未完成的指令数（入队数减完成数）
    pub fn outstanding(&self) -> u64 {
        self.instructions_enqueued
            .saturating_sub(self.instructions_completed)
    }
}
