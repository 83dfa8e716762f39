//! Mock 硬件（仅在 `mock` feature 下编译）
//!
//! 所有 mock 设备都记录收到的命令，并支持注入一次性故障，
//! 供单元测试、集成测试和 CLI 仿真使用。

use crate::{
    DeviceError, DriveMotor, GripperActuator, HalError, LinkTransport, RangeSensor,
    ReflectivitySensor, WalkerHardware, WireFrame,
};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use walker_protocol::ProtocolError;

/// 电机收到的命令
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MotorCommand {
    Forward,
    Backward,
    Stop { immediate: bool },
    Rotate { amount: i32, asynchronous: bool },
    SetSpeed(i32),
    ResetPosition,
}

/// 电机当前的持续运动状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MotorMotion {
    #[default]
    Stopped,
    Forward,
    Backward,
}

#[derive(Debug, Default)]
struct MotorState {
    speed: i32,
    motion: MotorMotion,
    position: i32,
    commands: Vec<MotorCommand>,
    fail_next: Option<DeviceError>,
}

/// Mock 驱动电机
///
/// `rotate` 立即完成（位置直接累加），持续运动只有在调用 [`MockMotor::advance`]
/// 时才会改变位置。
#[derive(Debug)]
pub struct MockMotor {
    name: &'static str,
    state: Mutex<MotorState>,
}

impl MockMotor {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            state: Mutex::new(MotorState::default()),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn speed(&self) -> i32 {
        self.state.lock().speed
    }

    pub fn motion(&self) -> MotorMotion {
        self.state.lock().motion
    }

    pub fn commands(&self) -> Vec<MotorCommand> {
        self.state.lock().commands.clone()
    }

    pub fn take_commands(&self) -> Vec<MotorCommand> {
        std::mem::take(&mut self.state.lock().commands)
    }

    pub fn set_position(&self, position: i32) {
        self.state.lock().position = position;
    }

    /// 按当前运动方向推进 `ticks`（停止时无效果）
    pub fn advance(&self, ticks: i32) {
        let mut state = self.state.lock();
        match state.motion {
            MotorMotion::Forward => state.position += ticks,
            MotorMotion::Backward => state.position -= ticks,
            MotorMotion::Stopped => {},
        }
    }

    /// 下一次调用（任意命令）返回该错误
    pub fn fail_next(&self, error: DeviceError) {
        self.state.lock().fail_next = Some(error);
    }

    fn record(
        &self,
        command: MotorCommand,
        apply: impl FnOnce(&mut MotorState),
    ) -> Result<(), HalError> {
        let mut state = self.state.lock();
        if let Some(error) = state.fail_next.take() {
            return Err(error.into());
        }
        state.commands.push(command);
        apply(&mut state);
        Ok(())
    }
}

impl DriveMotor for MockMotor {
    fn forward(&self) -> Result<(), HalError> {
        self.record(MotorCommand::Forward, |s| s.motion = MotorMotion::Forward)
    }

    fn backward(&self) -> Result<(), HalError> {
        self.record(MotorCommand::Backward, |s| s.motion = MotorMotion::Backward)
    }

    fn stop(&self, immediate: bool) -> Result<(), HalError> {
        self.record(MotorCommand::Stop { immediate }, |s| {
            s.motion = MotorMotion::Stopped
        })
    }

    fn rotate(&self, amount: i32, asynchronous: bool) -> Result<(), HalError> {
        self.record(
            MotorCommand::Rotate {
                amount,
                asynchronous,
            },
            |s| {
                s.motion = MotorMotion::Stopped;
                s.position += amount;
            },
        )
    }

    fn set_speed(&self, speed: i32) -> Result<(), HalError> {
        self.record(MotorCommand::SetSpeed(speed), |s| s.speed = speed)
    }

    fn position(&self) -> Result<i32, HalError> {
        let mut state = self.state.lock();
        if let Some(error) = state.fail_next.take() {
            return Err(error.into());
        }
        Ok(state.position)
    }

    fn reset_position(&self) -> Result<(), HalError> {
        self.record(MotorCommand::ResetPosition, |s| s.position = 0)
    }
}

#[derive(Debug)]
struct SensorState {
    script: VecDeque<f32>,
    current: f32,
    reads: u64,
    fail_next: Option<DeviceError>,
}

/// Mock 传感器（同时实现 [`ReflectivitySensor`] 与 [`RangeSensor`]）
///
/// 每次采样先消费脚本中的下一个值；脚本耗尽后一直返回最后一个值。
#[derive(Debug)]
pub struct MockSensor {
    state: Mutex<SensorState>,
}

impl MockSensor {
    pub fn new(initial: f32) -> Self {
        Self {
            state: Mutex::new(SensorState {
                script: VecDeque::new(),
                current: initial,
                reads: 0,
                fail_next: None,
            }),
        }
    }

    /// 设置当前值并清空脚本
    pub fn set(&self, value: f32) {
        let mut state = self.state.lock();
        state.script.clear();
        state.current = value;
    }

    /// 追加脚本值
    pub fn script(&self, values: impl IntoIterator<Item = f32>) {
        self.state.lock().script.extend(values);
    }

    /// 最近一次设置或采样的值（不消费脚本，不计入采样次数）
    pub fn current(&self) -> f32 {
        self.state.lock().current
    }

    /// 剩余脚本长度
    pub fn pending(&self) -> usize {
        self.state.lock().script.len()
    }

    /// 成功采样次数
    pub fn reads(&self) -> u64 {
        self.state.lock().reads
    }

    pub fn fail_next(&self, error: DeviceError) {
        self.state.lock().fail_next = Some(error);
    }

    fn next_sample(&self) -> Result<f32, HalError> {
        let mut state = self.state.lock();
        if let Some(error) = state.fail_next.take() {
            return Err(error.into());
        }
        if let Some(value) = state.script.pop_front() {
            state.current = value;
        }
        state.reads += 1;
        Ok(state.current)
    }
}

impl ReflectivitySensor for MockSensor {
    fn sample(&self) -> Result<f32, HalError> {
        self.next_sample()
    }
}

impl RangeSensor for MockSensor {
    fn sample(&self) -> Result<f32, HalError> {
        self.next_sample()
    }
}

/// Mock 夹爪
#[derive(Debug, Default)]
pub struct MockGripper {
    rotations: Mutex<Vec<i32>>,
}

impl MockGripper {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn rotations(&self) -> Vec<i32> {
        self.rotations.lock().clone()
    }

    /// 累计转角
    pub fn angle(&self) -> i32 {
        self.rotations.lock().iter().sum()
    }
}

impl GripperActuator for MockGripper {
    fn rotate(&self, amount: i32) -> Result<(), HalError> {
        self.rotations.lock().push(amount);
        Ok(())
    }
}

/// Mock 无线链路
///
/// 克隆体共享同一组收发缓冲区：一份交给链路线程，一份留在测试中注入和检查。
#[derive(Debug, Clone, Default)]
pub struct MockLink {
    inbound: Arc<Mutex<VecDeque<Result<WireFrame, DeviceError>>>>,
    outbound: Arc<Mutex<Vec<WireFrame>>>,
    disconnected: Arc<Mutex<bool>>,
}

impl MockLink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_frame(&self, frame: WireFrame) {
        self.inbound.lock().push_back(Ok(frame));
    }

    pub fn push_text(&self, text: &str) -> Result<(), ProtocolError> {
        self.push_frame(WireFrame::from_text(text)?);
        Ok(())
    }

    /// 在入站队列中插入一次读取错误
    pub fn push_error(&self, error: DeviceError) {
        self.inbound.lock().push_back(Err(error));
    }

    /// 尚未被读取的入站帧数
    pub fn pending(&self) -> usize {
        self.inbound.lock().len()
    }

    pub fn written(&self) -> Vec<WireFrame> {
        self.outbound.lock().clone()
    }

    pub fn take_written(&self) -> Vec<WireFrame> {
        std::mem::take(&mut *self.outbound.lock())
    }

    pub fn disconnect(&self) {
        *self.disconnected.lock() = true;
    }
}

impl LinkTransport for MockLink {
    fn read_frame(&mut self) -> Result<Option<WireFrame>, HalError> {
        if *self.disconnected.lock() {
            return Err(HalError::Disconnected);
        }
        match self.inbound.lock().pop_front() {
            Some(Ok(frame)) => Ok(Some(frame)),
            Some(Err(error)) => Err(error.into()),
            None => Ok(None),
        }
    }

    fn write_frame(&mut self, frame: &WireFrame) -> Result<(), HalError> {
        if *self.disconnected.lock() {
            return Err(HalError::Disconnected);
        }
        self.outbound.lock().push(*frame);
        Ok(())
    }
}

/// 一整套 mock 硬件
///
/// 默认状态：两个反射率传感器读数 0.5（白色地面），前方距离 1.0 m。
#[derive(Debug, Clone)]
pub struct MockRig {
    pub left_motor: Arc<MockMotor>,
    pub right_motor: Arc<MockMotor>,
    pub gripper: Arc<MockGripper>,
    pub line_sensors: [Arc<MockSensor>; 2],
    pub range_sensor: Arc<MockSensor>,
}

impl Default for MockRig {
    fn default() -> Self {
        Self::new()
    }
}

impl MockRig {
    pub fn new() -> Self {
        Self {
            left_motor: Arc::new(MockMotor::new("left")),
            right_motor: Arc::new(MockMotor::new("right")),
            gripper: Arc::new(MockGripper::new()),
            line_sensors: [Arc::new(MockSensor::new(0.5)), Arc::new(MockSensor::new(0.5))],
            range_sensor: Arc::new(MockSensor::new(1.0)),
        }
    }

    /// 生成共享同一组 mock 设备的 [`WalkerHardware`]
    pub fn hardware(&self) -> WalkerHardware {
        let [right, left] = &self.line_sensors;
        WalkerHardware {
            left_motor: self.left_motor.clone(),
            right_motor: self.right_motor.clone(),
            gripper: self.gripper.clone(),
            line_sensors: [right.clone(), left.clone()],
            range_sensor: self.range_sensor.clone(),
        }
    }

    /// 清空两个电机的命令记录
    pub fn clear_commands(&self) {
        self.left_motor.take_commands();
        self.right_motor.take_commands();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::DeviceErrorKind;

    #[test]
    fn test_mock_motor_records_commands() {
        let motor = MockMotor::new("left");
        motor.set_speed(120).unwrap();
        motor.forward().unwrap();
        motor.advance(30);
        assert_eq!(motor.position().unwrap(), 30);
        motor.stop(true).unwrap();
        motor.advance(30);
        assert_eq!(motor.position().unwrap(), 30);
        assert_eq!(
            motor.commands(),
            vec![
                MotorCommand::SetSpeed(120),
                MotorCommand::Forward,
                MotorCommand::Stop { immediate: true }
            ]
        );
    }

    #[test]
    fn test_mock_motor_rotate_and_reset() {
        let motor = MockMotor::new("left");
        motor.rotate(250, true).unwrap();
        assert_eq!(motor.position().unwrap(), 250);
        motor.reset_position().unwrap();
        assert_eq!(motor.position().unwrap(), 0);
    }

    #[test]
    fn test_mock_motor_fail_next_once() {
        let motor = MockMotor::new("right");
        motor.fail_next(DeviceError::new(DeviceErrorKind::Busy, "busy"));
        assert!(motor.forward().is_err());
        assert!(motor.forward().is_ok());
        assert_eq!(motor.commands(), vec![MotorCommand::Forward]);
    }

    #[test]
    fn test_mock_sensor_script_then_hold() {
        let sensor = MockSensor::new(0.5);
        sensor.script([0.1, 0.2]);
        assert_eq!(ReflectivitySensor::sample(&sensor).unwrap(), 0.1);
        assert_eq!(ReflectivitySensor::sample(&sensor).unwrap(), 0.2);
        assert_eq!(ReflectivitySensor::sample(&sensor).unwrap(), 0.2);
        assert_eq!(sensor.reads(), 3);
    }

    #[test]
    fn test_mock_link_shared_buffers() {
        let link = MockLink::new();
        let mut transport = link.clone();
        link.push_text("INSTRUCTIONS:PICK,1").unwrap();

        let frame = transport.read_frame().unwrap().unwrap();
        transport.write_frame(&frame).unwrap();
        assert!(transport.read_frame().unwrap().is_none());
        assert_eq!(link.take_written(), vec![frame]);

        link.disconnect();
        assert!(matches!(transport.read_frame(), Err(HalError::Disconnected)));
    }

    #[test]
    fn test_mock_rig_hardware_shares_devices() {
        let rig = MockRig::new();
        let hw = rig.hardware();
        hw.left_motor.set_speed(77).unwrap();
        assert_eq!(rig.left_motor.speed(), 77);
        hw.stop_motors().unwrap();
        assert_eq!(rig.right_motor.motion(), MotorMotion::Stopped);
    }
}
