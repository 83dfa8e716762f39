//! 仿真地图
//!
//! 一维地图：等间距的横线，机器人沿直线前后移动。每个 tick 根据两轮的
//! 运动状态和速度更新位置，再写回 mock 传感器的读数：
//!
//! - 压在横线上时两个反射率传感器都读到黑色，否则读到在目标值附近摆动的线边读数
//! - 测距读数随前进距离减小，后退时恢复

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use walker_sdk::hal::mock::{MockRig, MotorMotion};

/// 速度单位到每 tick 位移的换算
const DISTANCE_PER_SPEED_UNIT: f32 = 0.001;
const LINE_READING: f32 = 0.05;
const EDGE_READING: f32 = 0.28;
const EDGE_WOBBLE: f32 = 0.04;
const OPEN_RANGE: f32 = 0.30;
const MIN_RANGE: f32 = 0.01;
const RANGE_PER_DISTANCE: f32 = 0.001;

pub struct SimWorld {
    rig: MockRig,
    line_spacing: f32,
    line_width: f32,
    position: f32,
    approach: f32,
    tick: u64,
}

impl SimWorld {
    pub fn new(rig: MockRig, line_spacing: f32) -> Self {
        let world = Self {
            rig,
            line_spacing,
            line_width: line_spacing / 15.0,
            // 从两条线中间出发
            position: line_spacing / 2.0,
            approach: 0.0,
            tick: 0,
        };
        world.publish();
        world
    }

    pub fn position(&self) -> f32 {
        self.position
    }

    pub fn on_line(&self) -> bool {
        self.position.rem_euclid(self.line_spacing) < self.line_width
    }

    /// 推进一个 tick
    pub fn step(&mut self) {
        self.tick += 1;
        let speed = (self.rig.left_motor.speed().abs() + self.rig.right_motor.speed().abs())
            as f32
            / 2.0
            * DISTANCE_PER_SPEED_UNIT;

        match self.rig.left_motor.motion() {
            MotorMotion::Forward => {
                self.position += speed;
                self.approach += speed;
            },
            MotorMotion::Backward => {
                self.position -= speed;
                self.approach = 0.0;
            },
            MotorMotion::Stopped => {},
        }
        self.publish();
    }

    fn publish(&self) {
        let reading = if self.on_line() {
            LINE_READING
        } else {
            EDGE_READING + EDGE_WOBBLE * (self.tick as f32 / 50.0).sin()
        };
        for sensor in &self.rig.line_sensors {
            sensor.set(reading);
        }
        let range = (OPEN_RANGE - self.approach * RANGE_PER_DISTANCE).max(MIN_RANGE);
        self.rig.range_sensor.set(range);
    }

    /// 以 1 ms 的 tick 运行，直到 `stop` 被置位
    pub fn run(mut self, stop: Arc<AtomicBool>) {
        while !stop.load(Ordering::Acquire) {
            self.step();
            std::thread::sleep(Duration::from_millis(1));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use walker_sdk::hal::DriveMotor;

    #[test]
    fn test_forward_reaches_next_line() {
        let rig = MockRig::new();
        let mut world = SimWorld::new(rig.clone(), 300.0);
        assert!(!world.on_line());

        for motor in [&rig.left_motor, &rig.right_motor] {
            motor.set_speed(200).unwrap();
            motor.forward().unwrap();
        }
        // 半个线间距 / 每 tick 0.2
        let mut ticks = 0;
        while !world.on_line() && ticks < 10_000 {
            world.step();
            ticks += 1;
        }
        assert!(world.on_line());
        assert!((740..=760).contains(&ticks), "ticks = {}", ticks);
        assert_eq!(rig.line_sensors[1].current(), LINE_READING);
    }

    #[test]
    fn test_stopped_robot_does_not_move() {
        let rig = MockRig::new();
        let mut world = SimWorld::new(rig, 300.0);
        let start = world.position();
        for _ in 0..100 {
            world.step();
        }
        assert_eq!(world.position(), start);
    }

    #[test]
    fn test_range_closes_while_advancing() {
        let rig = MockRig::new();
        let mut world = SimWorld::new(rig.clone(), 300.0);
        for motor in [&rig.left_motor, &rig.right_motor] {
            motor.set_speed(100).unwrap();
            motor.forward().unwrap();
        }
        for _ in 0..3000 {
            world.step();
        }
        assert_eq!(rig.range_sensor.current(), MIN_RANGE);

        for motor in [&rig.left_motor, &rig.right_motor] {
            motor.backward().unwrap();
        }
        world.step();
        assert_eq!(rig.range_sensor.current(), OPEN_RANGE);
    }
}
