//! # Walker Hardware Abstraction Layer
//!
//! 硬件能力抽象层：驱动电机、反射率传感器、测距传感器、夹爪与无线链路。
//!
//! 所有设备接口都使用 `&self`，实现内部负责同步：导航线程与巡线线程
//! 会同时持有同一个电机句柄。

use std::sync::Arc;
use thiserror::Error;

pub use walker_protocol::WireFrame;

#[cfg(feature = "mock")]
pub mod mock;

/// 硬件层统一错误类型
#[derive(Error, Debug)]
pub enum HalError {
    #[error("IO Error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Device Error: {0}")]
    Device(#[from] DeviceError),
    #[error("Device timeout")]
    Timeout,
    #[error("Link disconnected")]
    Disconnected,
    #[error("Operation not supported: {0}")]
    NotSupported(&'static str),
}

impl HalError {
    /// 是否为不可恢复的错误（继续重试没有意义）
    pub fn is_fatal(&self) -> bool {
        match self {
            HalError::Device(e) => e.is_fatal(),
            HalError::Disconnected | HalError::NotSupported(_) => true,
            HalError::Io(_) | HalError::Timeout => false,
        }
    }
}

/// 设备错误的结构化分类
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceErrorKind {
    Unknown,
    NotFound,
    NoDevice,
    Busy,
    InvalidReading,
    Stalled,
    Backend,
}

/// 结构化设备错误
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{kind:?}: {message}")]
pub struct DeviceError {
    pub kind: DeviceErrorKind,
    pub message: String,
}

impl DeviceError {
    pub fn new(kind: DeviceErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn is_fatal(&self) -> bool {
        matches!(self.kind, DeviceErrorKind::NoDevice | DeviceErrorKind::NotFound)
    }
}

impl From<String> for DeviceError {
    fn from(message: String) -> Self {
        Self::new(DeviceErrorKind::Unknown, message)
    }
}

impl From<&str> for DeviceError {
    fn from(message: &str) -> Self {
        Self::new(DeviceErrorKind::Unknown, message)
    }
}

/// 驱动电机
///
/// 速度与位置的单位由具体电机决定（通常为 度/秒 与 编码器度数）。
pub trait DriveMotor: Send + Sync {
    /// 以当前速度持续正转
    fn forward(&self) -> Result<(), HalError>;

    /// 以当前速度持续反转
    fn backward(&self) -> Result<(), HalError>;

    /// 停止；`immediate == true` 时立即制动，否则惯性滑行
    fn stop(&self, immediate: bool) -> Result<(), HalError>;

    /// 相对转动 `amount`；`asynchronous == true` 时立即返回
    fn rotate(&self, amount: i32, asynchronous: bool) -> Result<(), HalError>;

    /// 设置速度（只接受非负值，方向由 `forward`/`backward` 决定）
    fn set_speed(&self, speed: i32) -> Result<(), HalError>;

    /// 编码器位置
    fn position(&self) -> Result<i32, HalError>;

    /// 编码器清零
    fn reset_position(&self) -> Result<(), HalError>;
}

/// 地面反射率传感器，读数范围 `[0, 1]`（0 = 黑线，1 = 白色地面）
pub trait ReflectivitySensor: Send + Sync {
    fn sample(&self) -> Result<f32, HalError>;
}

/// 前向测距传感器，读数单位为米
pub trait RangeSensor: Send + Sync {
    fn sample(&self) -> Result<f32, HalError>;
}

/// 夹爪
pub trait GripperActuator: Send + Sync {
    /// 相对转动（负值闭合，正值张开）
    fn rotate(&self, amount: i32) -> Result<(), HalError>;
}

/// 无线链路（帧级）
///
/// 只由链路线程使用，因此接口为 `&mut self`。
pub trait LinkTransport: Send {
    /// 读取一帧；当前没有可用数据时返回 `Ok(None)`
    fn read_frame(&mut self) -> Result<Option<WireFrame>, HalError>;

    /// 写出一帧（用于确认回显）
    fn write_frame(&mut self, frame: &WireFrame) -> Result<(), HalError>;
}

/// 机器人的全部执行器与传感器
///
/// `line_sensors[0]` 为右侧传感器，`line_sensors[1]` 为左侧传感器
/// （与 `walker_protocol::LineSensor::index()` 对应）。
#[derive(Clone)]
pub struct WalkerHardware {
    pub left_motor: Arc<dyn DriveMotor>,
    pub right_motor: Arc<dyn DriveMotor>,
    pub gripper: Arc<dyn GripperActuator>,
    pub line_sensors: [Arc<dyn ReflectivitySensor>; 2],
    pub range_sensor: Arc<dyn RangeSensor>,
}

impl WalkerHardware {
    /// 两个驱动电机执行同一操作（左侧先行）
    ///
    /// 任一电机失败时返回第一个错误，但仍会尝试另一个电机。
    pub fn both_motors(
        &self,
        mut op: impl FnMut(&dyn DriveMotor) -> Result<(), HalError>,
    ) -> Result<(), HalError> {
        let left = op(self.left_motor.as_ref());
        let right = op(self.right_motor.as_ref());
        left.and(right)
    }

    /// 立即停止两个驱动电机
    pub fn stop_motors(&self) -> Result<(), HalError> {
        self.both_motors(|m| m.stop(true))
    }
}

impl std::fmt::Debug for WalkerHardware {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WalkerHardware").finish_non_exhaustive()
    }
}
