//! 激活门
//!
//! 导航线程与巡线线程之间的唯一握手：
//!
//! - `activate()` 打开门；门已打开时为空操作（不会重置 PID 累积量）
//! - `deactivate()` 关门，并等待正在进行的巡线迭代结束。返回后，巡线线程在下一次
//!   激活之前不会再写轮速
//! - 巡线线程通过 [`ActivationGate::enter`] 进入一次迭代：门关闭时阻塞，
//!   每个激活周期（epoch）恰好执行一次重置回调
//! - `shutdown()` 唤醒所有等待者，此后 `enter` 返回 `None`

use parking_lot::{Condvar, Mutex};
use std::time::Duration;
use tracing::debug;
use walker_protocol::LineSensor;

#[derive(Debug, Default)]
struct GateState {
    active: bool,
    /// 每次 inactive → active 递增
    epoch: u64,
    /// 巡线线程已完成重置的 epoch
    consumed_epoch: u64,
    in_flight: bool,
    shutdown: bool,
    /// 下一次激活时巡线线程要切换到的传感器
    pending_sensor: Option<LineSensor>,
}

/// 激活门
#[derive(Debug, Default)]
pub struct ActivationGate {
    state: Mutex<GateState>,
    changed: Condvar,
}

impl ActivationGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// 打开门
    ///
    /// 返回 `true` 表示发生了 inactive → active 转换。
    pub fn activate(&self) -> bool {
        self.activate_with(None)
    }

    /// 打开门，并请求巡线线程在本次激活时切换传感器
    ///
    /// 门已打开时整个调用为空操作，传感器请求也被忽略。
    pub fn activate_with(&self, sensor: Option<LineSensor>) -> bool {
        let mut state = self.state.lock();
        if state.shutdown || state.active {
            return false;
        }
        state.active = true;
        state.epoch += 1;
        if sensor.is_some() {
            state.pending_sensor = sensor;
        }
        debug!("Gate activated (epoch {})", state.epoch);
        self.changed.notify_all();
        true
    }

    /// 关门，并等待进行中的巡线迭代结束
    ///
    /// 返回 `true` 表示发生了 active → inactive 转换。
    /// 不能在巡线线程内调用（会自锁）。
    pub fn deactivate(&self) -> bool {
        let mut state = self.state.lock();
        let was_active = state.active;
        state.active = false;
        while state.in_flight {
            self.changed.wait(&mut state);
        }
        if was_active {
            debug!("Gate deactivated (epoch {})", state.epoch);
            self.changed.notify_all();
        }
        was_active
    }

    pub fn is_active(&self) -> bool {
        self.state.lock().active
    }

    /// 当前激活周期编号
    pub fn epoch(&self) -> u64 {
        self.state.lock().epoch
    }

    /// 关闭门并唤醒所有等待者
    pub fn shutdown(&self) {
        let mut state = self.state.lock();
        state.active = false;
        state.shutdown = true;
        self.changed.notify_all();
    }

    pub fn is_shut_down(&self) -> bool {
        self.state.lock().shutdown
    }

    /// 等待门打开并进入一次迭代
    ///
    /// 新的激活周期中首次进入时，以待切换的传感器（如果有）调用 `reset`。
    /// 返回的 [`GatePass`] 存活期间，`deactivate()` 会阻塞等待。
    pub fn enter(&self, reset: impl FnOnce(Option<LineSensor>)) -> Option<GatePass<'_>> {
        let mut state = self.state.lock();
        loop {
            if state.shutdown {
                return None;
            }
            if state.active {
                break;
            }
            self.changed.wait(&mut state);
        }
        self.pass(&mut state, reset)
    }

    /// 与 [`enter`](Self::enter) 相同，但最多等待 `timeout`
    pub fn enter_timeout(
        &self,
        timeout: Duration,
        reset: impl FnOnce(Option<LineSensor>),
    ) -> Option<GatePass<'_>> {
        let mut state = self.state.lock();
        if !state.active && !state.shutdown {
            let _ = self.changed.wait_for(&mut state, timeout);
        }
        if state.shutdown || !state.active {
            return None;
        }
        self.pass(&mut state, reset)
    }

    fn pass(
        &self,
        state: &mut GateState,
        reset: impl FnOnce(Option<LineSensor>),
    ) -> Option<GatePass<'_>> {
        if state.consumed_epoch != state.epoch {
            state.consumed_epoch = state.epoch;
            reset(state.pending_sensor.take());
        }
        state.in_flight = true;
        Some(GatePass { gate: self })
    }
}

/// 一次巡线迭代的通行凭证
///
/// Drop 时清除 in-flight 标记并唤醒 `deactivate()`。
#[must_use = "the iteration ends when the pass is dropped"]
#[derive(Debug)]
pub struct GatePass<'a> {
    gate: &'a ActivationGate,
}

impl Drop for GatePass<'_> {
    fn drop(&mut self) {
        let mut state = self.gate.state.lock();
        state.in_flight = false;
        self.gate.changed.notify_all();
    }
}
