//! Prelude - 常用类型的便捷导入
//!
//! ```rust
//! use walker_sdk::prelude::*;
//! ```

// 协议层
pub use crate::protocol::{Direction, Instruction, LineSensor, Movement, decode_message};

// 硬件层（常用 Trait）
pub use crate::hal::{
    DriveMotor, GripperActuator, LinkTransport, RangeSensor, ReflectivitySensor, WalkerHardware,
};

// 驱动层
pub use crate::driver::{
    NavigationEvent, NavigationSnapshot, OverrideEvent, Phase, Walker, WalkerBuilder,
    WalkerConfig,
};

// 错误类型
pub use crate::driver::DriverError;
pub use crate::hal::HalError;
pub use crate::protocol::ProtocolError;
