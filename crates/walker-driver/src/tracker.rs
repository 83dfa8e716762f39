//! 巡线控制器
//!
//! # 算法
//!
//! ```text
//! error      = reading * scale - setpoint
//! correction = trunc(kp * error + ki * integral + kd * (error - prev_error))
//! ```
//!
//! 跟随传感器 0（右）时左轮 `base + c`、右轮 `base - c`；传感器 1 时符号对调。
//! 任一轮目标超过 `base + windup_margin` 时积分清零，两轮都以 `base` 运行。
//!
//! [`LineController`] 是纯计算部分，[`LineTracker`] 把它接到激活门与硬件上。

use crate::config::TrackerConfig;
use crate::gate::ActivationGate;
use crate::metrics::WalkerMetrics;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::{trace, warn};
use walker_hal::{HalError, WalkerHardware};
use walker_protocol::LineSensor;

/// 两轮目标速度
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WheelSpeeds {
    pub left: i32,
    pub right: i32,
}

/// 单次迭代的计算结果
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrackerOutput {
    pub error: f32,
    pub correction: i32,
    pub speeds: WheelSpeeds,
    /// 本次迭代是否触发了抗积分饱和
    pub windup_reset: bool,
}

/// PID 巡线控制器（无 IO）
#[derive(Debug, Clone)]
pub struct LineController {
    config: TrackerConfig,
    sensor: LineSensor,
    error: f32,
    integral: f32,
    prev_error: f32,
}

impl LineController {
    pub fn new(config: TrackerConfig) -> Self {
        Self {
            sensor: config.outer_sensor,
            config,
            error: 0.0,
            integral: 0.0,
            prev_error: 0.0,
        }
    }

    /// 清零误差累积量（不改变跟随的传感器）
    pub fn reset(&mut self) {
        self.error = 0.0;
        self.integral = 0.0;
        self.prev_error = 0.0;
    }

    pub fn sensor(&self) -> LineSensor {
        self.sensor
    }

    pub fn set_sensor(&mut self, sensor: LineSensor) {
        self.sensor = sensor;
    }

    pub fn error(&self) -> f32 {
        self.error
    }

    pub fn integral(&self) -> f32 {
        self.integral
    }

    pub fn prev_error(&self) -> f32 {
        self.prev_error
    }

    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }

    /// 根据一次反射率读数计算两轮速度，并更新累积量
    pub fn update(&mut self, reading: f32) -> TrackerOutput {
        let TrackerConfig {
            kp,
            ki,
            kd,
            setpoint,
            scale,
            base_speed,
            windup_margin,
            ..
        } = self.config;

        let error = reading * scale - setpoint;
        let correction =
            (kp * error + ki * self.integral + kd * (error - self.prev_error)) as i32;

        let (left, right) = match self.sensor {
            LineSensor::Right => (
                base_speed.saturating_add(correction),
                base_speed.saturating_sub(correction),
            ),
            LineSensor::Left => (
                base_speed.saturating_sub(correction),
                base_speed.saturating_add(correction),
            ),
        };

        let limit = base_speed.saturating_add(windup_margin);
        let windup_reset = left > limit || right > limit;
        let speeds = if windup_reset {
            // 保护触发的这一轮不再累加，积分保持为 0
            self.integral = 0.0;
            WheelSpeeds {
                left: base_speed,
                right: base_speed,
            }
        } else {
            self.integral += error;
            WheelSpeeds { left, right }
        };

        self.error = error;
        self.prev_error = error;

        TrackerOutput {
            error,
            correction,
            speeds,
            windup_reset,
        }
    }
}

/// 巡线线程的单步结果
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TrackerStep {
    /// 门在等待时间内没有打开
    Idle,
    /// 完成一次迭代
    Iterated(TrackerOutput),
    /// 硬件错误，本次迭代跳过
    Faulted,
    /// 门已关闭（shutdown）
    Shutdown,
}

/// 巡线控制器 + 激活门 + 硬件
pub struct LineTracker {
    controller: LineController,
    gate: Arc<ActivationGate>,
    hardware: WalkerHardware,
    metrics: Arc<WalkerMetrics>,
}

impl LineTracker {
    pub fn new(
        config: TrackerConfig,
        gate: Arc<ActivationGate>,
        hardware: WalkerHardware,
        metrics: Arc<WalkerMetrics>,
    ) -> Self {
        Self {
            controller: LineController::new(config),
            gate,
            hardware,
            metrics,
        }
    }

    pub fn controller(&self) -> &LineController {
        &self.controller
    }

    /// 等待门打开（最多 `wait`），然后执行一次迭代
    pub fn step(&mut self, wait: Duration) -> TrackerStep {
        let gate = Arc::clone(&self.gate);
        let controller = &mut self.controller;
        let pass = gate.enter_timeout(wait, |sensor| {
            controller.reset();
            if let Some(sensor) = sensor {
                controller.set_sensor(sensor);
            }
            trace!("Tracker reset, following {:?} sensor", controller.sensor());
        });
        let Some(_pass) = pass else {
            return if gate.is_shut_down() {
                TrackerStep::Shutdown
            } else {
                TrackerStep::Idle
            };
        };

        match self.iterate() {
            Ok(output) => {
                self.metrics.tracker_iterations.fetch_add(1, Ordering::Relaxed);
                if output.windup_reset {
                    self.metrics.windup_resets.fetch_add(1, Ordering::Relaxed);
                }
                TrackerStep::Iterated(output)
            },
            Err(e) => {
                self.metrics.device_errors.fetch_add(1, Ordering::Relaxed);
                warn!("Tracker iteration failed: {}", e);
                TrackerStep::Faulted
            },
        }
    }

    fn iterate(&mut self) -> Result<TrackerOutput, HalError> {
        let sensor = &self.hardware.line_sensors[self.controller.sensor().index()];
        let reading = sensor.sample()?;
        let output = self.controller.update(reading);
        trace!(
            "reading={:.3} error={:.1} c={} left={} right={}{}",
            reading,
            output.error,
            output.correction,
            output.speeds.left,
            output.speeds.right,
            if output.windup_reset { " (windup reset)" } else { "" }
        );
        self.hardware.left_motor.set_speed(output.speeds.left.abs())?;
        self.hardware.right_motor.set_speed(output.speeds.right.abs())?;
        Ok(output)
    }
}

/// 巡线线程主循环
///
/// 门关闭时阻塞在门上；`is_running` 变为 false 或门被 shutdown 时退出。
pub fn tracker_loop(mut tracker: LineTracker, is_running: Arc<AtomicBool>, min_period: Duration) {
    #[cfg(feature = "realtime")]
    {
        use thread_priority::*;

        match set_current_thread_priority(ThreadPriority::Max) {
            Ok(_) => tracing::info!("Tracker thread priority set to MAX (realtime)"),
            Err(e) => warn!(
                "Failed to set tracker thread priority: {}. \
                On Linux, you may need to run with CAP_SYS_NICE.",
                e
            ),
        }
    }

    let wait = Duration::from_millis(100);
    let sleeper = spin_sleep::SpinSleeper::default();

    // Acquire: 看到 false 时也能看到其他线程在此之前的清理写入
    while is_running.load(Ordering::Acquire) {
        match tracker.step(wait) {
            TrackerStep::Shutdown => break,
            TrackerStep::Idle => {},
            TrackerStep::Iterated(_) | TrackerStep::Faulted => {
                if !min_period.is_zero() {
                    sleeper.sleep(min_period);
                }
            },
        }
    }
    trace!("Tracker thread exiting");
}

#[cfg(test)]
mod tests {
    use super::*;
    use walker_hal::mock::{MockRig, MotorCommand};

    fn controller() -> LineController {
        LineController::new(TrackerConfig::default())
    }

    #[test]
    fn test_on_setpoint_drives_straight() {
        let mut c = controller();
        let out = c.update(0.28);
        assert_eq!(out.correction, 0);
        assert_eq!(out.speeds, WheelSpeeds { left: 200, right: 200 });
        assert!(!out.windup_reset);
    }

    #[test]
    fn test_first_iteration_correction() {
        // error = 30 - 28 = 2; c = trunc(1.2*2 + 0 + 10*2) = 22
        let mut c = controller();
        let out = c.update(0.30);
        assert!((out.error - 2.0).abs() < 1e-4);
        assert_eq!(out.correction, 22);
        assert_eq!(out.speeds, WheelSpeeds { left: 222, right: 178 });
        assert!((c.integral() - out.error).abs() < 1e-6);
        assert_eq!(c.prev_error(), out.error);
    }

    #[test]
    fn test_left_sensor_mirrors_signs() {
        let mut c = controller();
        c.set_sensor(LineSensor::Left);
        let out = c.update(0.30);
        assert_eq!(out.speeds, WheelSpeeds { left: 178, right: 222 });
    }

    #[test]
    fn test_correction_truncates_toward_zero() {
        // error = -1.5; c = trunc(1.2*-1.5 + 10*-1.5) = trunc(-16.8) = -16
        let mut c = controller();
        let out = c.update(0.265);
        assert_eq!(out.correction, -16);
    }

    #[test]
    fn test_anti_windup_outputs_base_speed_and_zero_integral() {
        let mut c = controller();
        c.update(0.30);
        assert!(c.integral() != 0.0);

        // error = 72 → c ≫ 50
        let out = c.update(1.0);
        assert!(out.windup_reset);
        assert_eq!(out.speeds, WheelSpeeds { left: 200, right: 200 });
        assert_eq!(c.integral(), 0.0);
        assert!((c.prev_error() - 72.0).abs() < 1e-4);
    }

    #[test]
    fn test_anti_windup_on_negative_error() {
        // error = -28 → c = trunc(-33.6 - 280) = -313, right = 513 > 250
        let mut c = controller();
        let out = c.update(0.0);
        assert!(out.windup_reset);
        assert_eq!(out.speeds, WheelSpeeds { left: 200, right: 200 });
    }

    #[test]
    fn test_reset_clears_accumulators_only() {
        let mut c = controller();
        c.set_sensor(LineSensor::Left);
        c.update(0.30);
        c.reset();
        assert_eq!(c.integral(), 0.0);
        assert_eq!(c.prev_error(), 0.0);
        assert_eq!(c.sensor(), LineSensor::Left);
    }

    #[test]
    fn test_tracker_idle_while_gate_closed() {
        let rig = MockRig::new();
        let gate = Arc::new(ActivationGate::new());
        let mut tracker = LineTracker::new(
            TrackerConfig::default(),
            gate,
            rig.hardware(),
            Arc::new(WalkerMetrics::new()),
        );
        assert_eq!(tracker.step(Duration::from_millis(1)), TrackerStep::Idle);
        assert!(rig.left_motor.commands().is_empty());
    }

    #[test]
    fn test_tracker_writes_absolute_speeds() {
        let rig = MockRig::new();
        rig.line_sensors[0].set(0.30);
        let gate = Arc::new(ActivationGate::new());
        let metrics = Arc::new(WalkerMetrics::new());
        let mut tracker =
            LineTracker::new(TrackerConfig::default(), gate.clone(), rig.hardware(), metrics.clone());

        gate.activate();
        assert!(matches!(
            tracker.step(Duration::ZERO),
            TrackerStep::Iterated(_)
        ));
        assert_eq!(rig.left_motor.commands(), vec![MotorCommand::SetSpeed(222)]);
        assert_eq!(rig.right_motor.commands(), vec![MotorCommand::SetSpeed(178)]);
        assert_eq!(metrics.snapshot().tracker_iterations, 1);
    }

    #[test]
    fn test_reactivation_keeps_accumulators() {
        let rig = MockRig::new();
        rig.line_sensors[0].set(0.30);
        let gate = Arc::new(ActivationGate::new());
        let mut tracker = LineTracker::new(
            TrackerConfig::default(),
            gate.clone(),
            rig.hardware(),
            Arc::new(WalkerMetrics::new()),
        );

        gate.activate();
        tracker.step(Duration::ZERO);
        let integral = tracker.controller().integral();
        assert!(integral > 0.0);

        gate.activate();
        tracker.step(Duration::ZERO);
        assert!(tracker.controller().integral() > integral);

        gate.deactivate();
        gate.activate();
        tracker.step(Duration::ZERO);
        // 重新激活后只剩本轮的误差
        assert!((tracker.controller().integral() - 2.0).abs() < 1e-4);
    }

    #[test]
    fn test_activation_switches_sensor() {
        let rig = MockRig::new();
        rig.line_sensors[0].set(0.28);
        rig.line_sensors[1].set(0.30);
        let gate = Arc::new(ActivationGate::new());
        let mut tracker = LineTracker::new(
            TrackerConfig::default(),
            gate.clone(),
            rig.hardware(),
            Arc::new(WalkerMetrics::new()),
        );

        gate.activate_with(Some(LineSensor::Left));
        let TrackerStep::Iterated(out) = tracker.step(Duration::ZERO) else {
            panic!("expected an iteration");
        };
        assert_eq!(tracker.controller().sensor(), LineSensor::Left);
        assert_eq!(out.speeds, WheelSpeeds { left: 178, right: 222 });
    }

    #[test]
    fn test_sensor_fault_counted() {
        let rig = MockRig::new();
        rig.line_sensors[0].fail_next(walker_hal::DeviceError::from("flaky"));
        let gate = Arc::new(ActivationGate::new());
        let metrics = Arc::new(WalkerMetrics::new());
        let mut tracker =
            LineTracker::new(TrackerConfig::default(), gate.clone(), rig.hardware(), metrics.clone());

        gate.activate();
        assert_eq!(tracker.step(Duration::ZERO), TrackerStep::Faulted);
        assert_eq!(metrics.snapshot().device_errors, 1);
        assert!(matches!(
            tracker.step(Duration::ZERO),
            TrackerStep::Iterated(_)
        ));
    }

    #[test]
    fn test_tracker_shutdown() {
        let rig = MockRig::new();
        let gate = Arc::new(ActivationGate::new());
        let mut tracker = LineTracker::new(
            TrackerConfig::default(),
            gate.clone(),
            rig.hardware(),
            Arc::new(WalkerMetrics::new()),
        );
        gate.shutdown();
        assert_eq!(tracker.step(Duration::from_millis(1)), TrackerStep::Shutdown);
    }

    #[test]
    fn test_speeds_never_exceed_guard_limit() {
        use rand::Rng;

        let mut rng = rand::thread_rng();
        for sensor in [LineSensor::Right, LineSensor::Left] {
            let mut c = LineController::new(TrackerConfig {
                outer_sensor: sensor,
                ..TrackerConfig::default()
            });
            for _ in 0..10_000 {
                let out = c.update(rng.gen_range(0.0..=1.0));
                assert!(out.speeds.left <= 250 && out.speeds.right <= 250);
                if out.windup_reset {
                    assert_eq!(c.integral(), 0.0);
                }
            }
        }
    }
}
