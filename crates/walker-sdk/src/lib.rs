//! Walker SDK - 巡线机器人 Rust SDK
//!
//! # 架构设计
//!
//! 本 SDK 采用分层架构，从底层到高层：
//!
//! - **协议层** (`protocol`): 指令模型与 `INSTRUCTIONS:` 文本解码
//! - **硬件层** (`hal`): 电机、传感器、夹爪与无线链路的能力抽象
//! - **驱动层** (`driver`): 指令队列、激活门、巡线 PID 与导航状态机
//!
//! # 快速开始
//!
//! ```no_run
//! use walker_sdk::prelude::*;
//!
//! # fn run(hardware: WalkerHardware) -> Result<(), DriverError> {
//! walker_sdk::init_logger("info").ok();
//! let walker = WalkerBuilder::new(hardware).build()?;
//! walker.submit_message("INSTRUCTIONS:FORWARD,2;TURN,1,LEFT;PICK,1");
//! # Ok(())
//! # }
//! ```

mod logging;
pub mod prelude;

pub use walker_driver as driver;
pub use walker_hal as hal;
pub use walker_protocol as protocol;

pub use logging::{LoggerError, init_logger};

pub use driver::{DriverError, Walker, WalkerBuilder, WalkerConfig};
pub use hal::{HalError, WalkerHardware};
pub use protocol::{Instruction, ProtocolError, decode_message};
