//! 导航状态机
//!
//! 每次 [`NavigationController::step`] 查看队首指令并推进一小步；
//! 只有当指令的完成条件满足时才移除队首。
//!
//! | 队首      | 阶段                                        | 完成条件                     |
//! |-----------|---------------------------------------------|------------------------------|
//! | FORWARD n | Forward（门打开，巡线线程控速）             | 越线计数 = n                 |
//! | BACKWARD n| Backward（门关闭，直接驱动）                | 越线计数 = n                 |
//! | TURN      | Turn                                        | 转动命令发出（或同步转完）   |
//! | PICK      | PickApproach → PickGrasp → PickRetreat      | 后退到反射率 ≤ `grip_release`|
//! | DROP      | DropExtend →（放下）→ DropRetract           | 左轮位置 ≤ `retract_target`  |
//!
//! 越线检测器的"已见白色"状态跨指令保留：停在线上开始的指令不会重复计数。

use crate::config::NavigationConfig;
use crate::gate::ActivationGate;
use crate::metrics::WalkerMetrics;
use crate::queue::InstructionQueue;
use arc_swap::ArcSwap;
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use tracing::{debug, info, trace, warn};
use walker_hal::{HalError, WalkerHardware};
use walker_protocol::{Direction, Instruction, LineSensor, Movement};

/// 导航阶段（由队首指令和子阶段标志推导）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    Idle,
    Forward,
    Backward,
    Turn,
    PickApproach,
    PickGrasp,
    PickRetreat,
    DropExtend,
    DropRetract,
}

impl Phase {
    /// 是否处于 PICK/DROP 的多步动作中
    pub fn is_manipulation(self) -> bool {
        matches!(
            self,
            Phase::PickApproach
                | Phase::PickGrasp
                | Phase::PickRetreat
                | Phase::DropExtend
                | Phase::DropRetract
        )
    }
}

/// 外部覆盖信号
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverrideEvent {
    /// 恢复导航（空闲时直接打开门）
    Start,
    /// 暂停：关门并停止电机
    Stop,
    /// 紧急停止：停止一切并结束所有线程
    EmergencyStop,
}

/// 导航事件
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NavigationEvent {
    Started {
        instruction: Instruction,
    },
    Completed {
        instruction: Instruction,
    },
    /// 队列已空
    Idle,
    Paused,
    Resumed,
    /// 指令超过 `instruction_timeout_ms`，导航已暂停
    Stalled {
        instruction: Instruction,
        phase: Phase,
        elapsed: Duration,
    },
    /// PICK/DROP 在中途被打断
    Interrupted {
        instruction: Instruction,
        phase: Phase,
    },
    EmergencyStopped,
}

/// 对外发布的导航状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NavigationSnapshot {
    pub head: Option<Instruction>,
    pub phase: Phase,
    pub edges: u32,
    pub paused: bool,
    /// 因超时而暂停时，队首已运行的时间
    pub stalled: Option<Duration>,
    pub halted: bool,
    pub queued: usize,
    pub completed: u64,
}

impl Default for NavigationSnapshot {
    fn default() -> Self {
        Self {
            head: None,
            phase: Phase::Idle,
            edges: 0,
            paused: false,
            stalled: None,
            halted: false,
            queued: 0,
            completed: 0,
        }
    }
}

/// 单步结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    Idle,
    Running,
    Completed(Instruction),
    Paused,
    Halted,
}

/// 带回差的越线检测器
///
/// 读数 ≤ 阈值且此前见过白色时计一次越线；读数 > 阈值后才能再次计数。
#[derive(Debug, Clone, Copy)]
pub struct EdgeDetector {
    threshold: f32,
    in_white: bool,
}

impl EdgeDetector {
    pub fn new(threshold: f32) -> Self {
        Self {
            threshold,
            in_white: true,
        }
    }

    /// 输入一次读数，返回是否检测到新的越线
    pub fn observe(&mut self, reading: f32) -> bool {
        if reading <= self.threshold {
            let edge = self.in_white;
            self.in_white = false;
            edge
        } else {
            self.in_white = true;
            false
        }
    }

    pub fn in_white(&self) -> bool {
        self.in_white
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Motion {
    Forward,
    Backward,
}

/// 每条指令的执行状态，新指令成为队首时整体重置
#[derive(Debug, Clone, Default)]
pub struct NavigationState {
    pub edges: u32,
    pub picking_stop: bool,
    pub go_back: bool,
    pub drop_started: bool,
    started_at: Option<Instant>,
    motion: Option<Motion>,
    /// DROP 当前子阶段的定位转动已下发（停车后清除）
    rotating: bool,
}

/// 导航控制器
pub struct NavigationController {
    config: NavigationConfig,
    queue: Arc<InstructionQueue>,
    gate: Arc<ActivationGate>,
    hardware: WalkerHardware,
    metrics: Arc<WalkerMetrics>,
    default_tracking: LineSensor,
    tracking: LineSensor,
    edges: EdgeDetector,
    state: NavigationState,
    current: Option<Instruction>,
    paused: bool,
    stalled: Option<Duration>,
    halted: bool,
    idle_stopped: bool,
    completed: u64,
    events: Option<Sender<NavigationEvent>>,
    overrides: Option<Receiver<OverrideEvent>>,
    snapshot: Arc<ArcSwap<NavigationSnapshot>>,
}

impl NavigationController {
    /// # 参数
    /// - `tracking`: 未指定传感器的 FORWARD 使用的巡线传感器
    pub fn new(
        config: NavigationConfig,
        tracking: LineSensor,
        queue: Arc<InstructionQueue>,
        gate: Arc<ActivationGate>,
        hardware: WalkerHardware,
        metrics: Arc<WalkerMetrics>,
    ) -> Self {
        Self {
            edges: EdgeDetector::new(config.edge_threshold),
            config,
            queue,
            gate,
            hardware,
            metrics,
            default_tracking: tracking,
            tracking,
            state: NavigationState::default(),
            current: None,
            paused: false,
            stalled: None,
            halted: false,
            idle_stopped: false,
            completed: 0,
            events: None,
            overrides: None,
            snapshot: Arc::new(ArcSwap::from_pointee(NavigationSnapshot::default())),
        }
    }

    /// 设置事件发送端
    pub fn with_events(mut self, events: Sender<NavigationEvent>) -> Self {
        self.events = Some(events);
        self
    }

    /// 设置覆盖信号接收端
    pub fn with_overrides(mut self, overrides: Receiver<OverrideEvent>) -> Self {
        self.overrides = Some(overrides);
        self
    }

    /// 快照的共享句柄（读端）
    pub fn snapshot_handle(&self) -> Arc<ArcSwap<NavigationSnapshot>> {
        Arc::clone(&self.snapshot)
    }

    pub fn config(&self) -> &NavigationConfig {
        &self.config
    }

    pub fn state(&self) -> &NavigationState {
        &self.state
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn is_halted(&self) -> bool {
        self.halted
    }

    /// 当前巡线传感器（越线检测使用另一侧）
    pub fn tracking_sensor(&self) -> LineSensor {
        self.tracking
    }

    /// 当前阶段
    pub fn phase(&self) -> Phase {
        let Some(head) = self.current else {
            return Phase::Idle;
        };
        match head.movement() {
            Movement::Forward => Phase::Forward,
            Movement::Backward => Phase::Backward,
            Movement::Turn => Phase::Turn,
            Movement::Pick if self.state.go_back => Phase::PickRetreat,
            Movement::Pick if self.state.picking_stop => Phase::PickGrasp,
            Movement::Pick => Phase::PickApproach,
            Movement::Drop if self.state.go_back => Phase::DropRetract,
            Movement::Drop => Phase::DropExtend,
        }
    }

    /// 推进一步
    pub fn step(&mut self) -> StepOutcome {
        self.drain_overrides();
        let before = self.phase();
        let outcome = self.advance();
        let after = self.phase();
        if before != after {
            debug!("Phase {:?} -> {:?}", before, after);
        }
        self.publish();
        outcome
    }

    /// 处理一个覆盖信号
    pub fn apply_override(&mut self, event: OverrideEvent) {
        if self.halted {
            return;
        }
        match event {
            OverrideEvent::Start => {
                let was_paused = self.paused;
                self.paused = false;
                self.stalled = None;
                if was_paused && self.current.is_some() {
                    self.state.started_at = Some(Instant::now());
                }
                match self.queue.peek() {
                    Some(head) if head.movement() == Movement::Forward => {
                        self.gate
                            .activate_with(Some(head.sensor().unwrap_or(self.default_tracking)));
                    },
                    Some(_) => {},
                    None => {
                        self.gate.activate();
                    },
                }
                if was_paused {
                    info!("Navigation resumed");
                    self.emit(NavigationEvent::Resumed);
                }
            },
            OverrideEvent::Stop => {
                if !self.paused {
                    self.halt_motion();
                    self.paused = true;
                    info!("Navigation paused");
                    self.emit(NavigationEvent::Paused);
                }
            },
            OverrideEvent::EmergencyStop => {
                warn!("Emergency stop");
                self.report_interruption();
                self.halt_motion();
                self.gate.shutdown();
                self.halted = true;
                self.emit(NavigationEvent::EmergencyStopped);
            },
        }
        self.publish();
    }

    /// 关门并停止两个驱动电机
    pub fn halt_motion(&mut self) {
        self.gate.deactivate();
        if let Err(e) = self.hardware.stop_motors() {
            self.device_error("stop", e);
        }
        self.state.motion = None;
        self.state.rotating = false;
    }

    fn drain_overrides(&mut self) {
        loop {
            let event = match &self.overrides {
                Some(rx) => rx.try_recv().ok(),
                None => None,
            };
            match event {
                Some(event) => self.apply_override(event),
                None => break,
            }
        }
    }

    fn advance(&mut self) -> StepOutcome {
        if self.halted {
            return StepOutcome::Halted;
        }
        if self.paused {
            self.wait_while_paused();
            return if self.halted {
                StepOutcome::Halted
            } else {
                StepOutcome::Paused
            };
        }

        let Some(head) = self.queue.peek() else {
            return self.idle();
        };
        if self.current.is_none() {
            self.begin(head);
        }

        if let Some(elapsed) = self.deadline_exceeded() {
            self.stall(head, elapsed);
            return StepOutcome::Paused;
        }

        match self.execute(head) {
            Ok(true) => {
                self.complete(head);
                StepOutcome::Completed(head)
            },
            Ok(false) => StepOutcome::Running,
            Err(e) => {
                self.device_error(head.movement().as_str(), e);
                StepOutcome::Running
            },
        }
    }

    fn wait_while_paused(&mut self) {
        let wait = Duration::from_millis(self.config.idle_wait_ms);
        let event = match &self.overrides {
            Some(rx) => match rx.recv_timeout(wait) {
                Ok(event) => Some(event),
                Err(RecvTimeoutError::Timeout) => None,
                Err(RecvTimeoutError::Disconnected) => {
                    std::thread::sleep(wait);
                    None
                },
            },
            None => {
                std::thread::sleep(wait);
                None
            },
        };
        if let Some(event) = event {
            self.apply_override(event);
        }
    }

    fn idle(&mut self) -> StepOutcome {
        if !self.idle_stopped {
            self.gate.deactivate();
            match self.hardware.stop_motors() {
                Ok(()) => {
                    self.idle_stopped = true;
                    self.state.motion = None;
                    info!("Instruction queue empty, idling");
                    self.emit(NavigationEvent::Idle);
                },
                Err(e) => self.device_error("stop", e),
            }
        }
        self.queue
            .wait_for_head(Duration::from_millis(self.config.idle_wait_ms));
        StepOutcome::Idle
    }

    fn begin(&mut self, head: Instruction) {
        self.current = Some(head);
        self.state = NavigationState {
            started_at: Some(Instant::now()),
            ..Default::default()
        };
        self.idle_stopped = false;
        // 空闲时被 Start 打开的门要重新开一次，才能带上传感器并重置 PID
        if head.movement() == Movement::Forward && self.gate.deactivate() {
            debug!("Gate reopened for {}", head);
        }
        info!("Starting {}", head);
        self.emit(NavigationEvent::Started { instruction: head });
    }

    fn complete(&mut self, head: Instruction) {
        let popped = self.queue.pop_head();
        debug_assert_eq!(popped, Some(head));
        self.current = None;
        self.completed += 1;
        self.metrics
            .instructions_completed
            .fetch_add(1, Ordering::Relaxed);
        info!("Completed {}", head);
        self.emit(NavigationEvent::Completed { instruction: head });
    }

    fn deadline_exceeded(&self) -> Option<Duration> {
        let timeout = Duration::from_millis(self.config.instruction_timeout_ms?);
        let elapsed = self.state.started_at?.elapsed();
        (elapsed > timeout).then_some(elapsed)
    }

    fn stall(&mut self, head: Instruction, elapsed: Duration) {
        let phase = self.phase();
        warn!("{} stalled in {:?} after {:?}", head, phase, elapsed);
        self.metrics.stalls.fetch_add(1, Ordering::Relaxed);
        self.report_interruption();
        self.halt_motion();
        self.paused = true;
        self.stalled = Some(elapsed);
        self.emit(NavigationEvent::Stalled {
            instruction: head,
            phase,
            elapsed,
        });
    }

    fn report_interruption(&mut self) {
        let phase = self.phase();
        if let Some(instruction) = self.current
            && phase.is_manipulation()
        {
            warn!("{} interrupted in {:?}", instruction, phase);
            self.emit(NavigationEvent::Interrupted { instruction, phase });
        }
    }

    fn execute(&mut self, head: Instruction) -> Result<bool, HalError> {
        match head.movement() {
            Movement::Forward => self.run_forward(head),
            Movement::Backward => self.run_backward(head),
            Movement::Turn => self.run_turn(head),
            Movement::Pick => self.run_pick(),
            Movement::Drop => self.run_drop(),
        }
    }

    fn run_forward(&mut self, head: Instruction) -> Result<bool, HalError> {
        let sensor = head.sensor().unwrap_or(self.default_tracking);
        self.tracking = sensor;
        self.gate.activate_with(Some(sensor));

        self.count_edge(head)?;
        self.drive(Motion::Forward, None)?;

        if self.state.edges >= head.duration() {
            self.gate.deactivate();
            return Ok(true);
        }
        Ok(false)
    }

    fn run_backward(&mut self, head: Instruction) -> Result<bool, HalError> {
        self.gate.deactivate();
        self.drive(Motion::Backward, Some(self.config.maneuver_speed))?;
        self.count_edge(head)?;

        if self.state.edges >= head.duration() {
            self.stop_motors()?;
            return Ok(true);
        }
        Ok(false)
    }

    fn run_turn(&mut self, head: Instruction) -> Result<bool, HalError> {
        self.gate.deactivate();
        self.stop_motors()?;

        let Some(direction) = head.direction() else {
            warn!("{} has no direction, skipping", head);
            return Ok(true);
        };

        let increment = self.config.turn_increment;
        let (motor, amount) = match (direction, head.duration() == 1) {
            (Direction::Right, true) => (&self.hardware.right_motor, increment),
            (Direction::Right, false) => (&self.hardware.left_motor, -increment),
            (Direction::Left, true) => (&self.hardware.left_motor, increment),
            (Direction::Left, false) => (&self.hardware.right_motor, -increment),
        };
        motor.rotate(amount, self.config.turn_completion.asynchronous())?;
        Ok(true)
    }

    fn run_pick(&mut self) -> Result<bool, HalError> {
        self.gate.deactivate();

        if !self.state.picking_stop && !self.state.go_back {
            let range = self.hardware.range_sensor.sample()?;
            if range < self.config.pick_stop_range {
                self.stop_motors()?;
                self.state.picking_stop = true;
                debug!("Object at {:.3} m, stopping", range);
            } else {
                self.drive(Motion::Forward, Some(self.config.maneuver_speed))?;
            }
            return Ok(false);
        }

        if !self.state.go_back {
            self.hardware.gripper.rotate(self.config.gripper_close)?;
            self.state.go_back = true;
            return Ok(false);
        }

        let reading = self.edge_sensor_sample()?;
        if reading > self.config.grip_release {
            self.drive(Motion::Backward, Some(self.config.maneuver_speed))?;
            return Ok(false);
        }

        self.stop_motors()?;
        self.state.picking_stop = false;
        self.state.go_back = false;
        Ok(true)
    }

    fn run_drop(&mut self) -> Result<bool, HalError> {
        self.gate.deactivate();
        let speed = self.config.maneuver_speed;
        let extend = self.config.drop_extend;

        if !self.state.drop_started {
            self.hardware.left_motor.reset_position()?;
            self.hardware.both_motors(|m| m.set_speed(speed))?;
            self.hardware.both_motors(|m| m.rotate(extend, true))?;
            self.state.drop_started = true;
            self.state.rotating = true;
            return Ok(false);
        }

        if !self.state.go_back {
            let position = self.hardware.left_motor.position()?;
            if position < extend {
                self.resume_rotation(extend.saturating_sub(position))?;
                return Ok(false);
            }
            self.stop_motors()?;
            self.hardware.gripper.rotate(self.config.gripper_open)?;
            let retract = self.config.drop_retract;
            self.hardware.both_motors(|m| m.rotate(-retract, true))?;
            self.state.go_back = true;
            self.state.rotating = true;
            debug!("Object released, retracting");
        }

        let position = self.hardware.left_motor.position()?;
        if position <= self.config.retract_target {
            self.stop_motors()?;
            return Ok(true);
        }
        self.resume_rotation(self.config.retract_target.saturating_sub(position))?;
        Ok(false)
    }

    /// 暂停打断了 DROP 的定位转动时，补发剩余行程
    fn resume_rotation(&mut self, remaining: i32) -> Result<(), HalError> {
        if self.state.rotating {
            return Ok(());
        }
        let speed = self.config.maneuver_speed;
        self.hardware.both_motors(|m| m.set_speed(speed))?;
        self.hardware.both_motors(|m| m.rotate(remaining, true))?;
        self.state.rotating = true;
        debug!("Drop rotation resumed ({} remaining)", remaining);
        Ok(())
    }

    fn edge_sensor_sample(&self) -> Result<f32, HalError> {
        self.hardware.line_sensors[self.tracking.opposite().index()].sample()
    }

    fn count_edge(&mut self, head: Instruction) -> Result<(), HalError> {
        let reading = self.edge_sensor_sample()?;
        if self.edges.observe(reading) {
            self.state.edges += 1;
            debug!("Edge {}/{} for {}", self.state.edges, head.duration(), head);
        } else {
            trace!("Edge sensor reading {:.3}", reading);
        }
        Ok(())
    }

    /// 进入持续运动（已处于该运动时不重复下发）
    fn drive(&mut self, motion: Motion, speed: Option<i32>) -> Result<(), HalError> {
        if self.state.motion == Some(motion) {
            return Ok(());
        }
        if let Some(speed) = speed {
            self.hardware.both_motors(|m| m.set_speed(speed))?;
        }
        match motion {
            Motion::Forward => self.hardware.both_motors(|m| m.forward())?,
            Motion::Backward => self.hardware.both_motors(|m| m.backward())?,
        }
        self.state.motion = Some(motion);
        Ok(())
    }

    fn stop_motors(&mut self) -> Result<(), HalError> {
        self.state.motion = None;
        self.hardware.stop_motors()
    }

    fn device_error(&self, context: &str, error: HalError) {
        self.metrics.device_errors.fetch_add(1, Ordering::Relaxed);
        warn!("Device error during {}: {}", context, error);
    }

    fn emit(&self, event: NavigationEvent) {
        if let Some(events) = &self.events
            && events.try_send(event).is_err()
        {
            self.metrics.events_dropped.fetch_add(1, Ordering::Relaxed);
        }
    }

    fn publish(&self) {
        let snapshot = NavigationSnapshot {
            head: self.current,
            phase: self.phase(),
            edges: self.state.edges,
            paused: self.paused,
            stalled: self.stalled,
            halted: self.halted,
            queued: self.queue.len(),
            completed: self.completed,
        };
        if **self.snapshot.load() != snapshot {
            self.snapshot.store(Arc::new(snapshot));
        }
    }
}

/// 导航线程主循环
///
/// 紧急停止后清除 `is_running`，使其他线程一并退出。
pub fn navigation_loop(mut nav: NavigationController, is_running: Arc<AtomicBool>) {
    let poll_period = Duration::from_micros(nav.config().poll_period_us);
    let sleeper = spin_sleep::SpinSleeper::default();

    while is_running.load(Ordering::Acquire) {
        match nav.step() {
            StepOutcome::Halted => {
                is_running.store(false, Ordering::Release);
                break;
            },
            StepOutcome::Running => {
                if !poll_period.is_zero() {
                    sleeper.sleep(poll_period);
                }
            },
            StepOutcome::Completed(_) | StepOutcome::Idle | StepOutcome::Paused => {},
        }
    }

    nav.halt_motion();
    trace!("Navigation thread exiting");
}
