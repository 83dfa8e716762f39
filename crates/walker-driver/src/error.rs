//! 驱动层错误类型定义

use std::time::Duration;
use thiserror::Error;
use walker_hal::HalError;
use walker_protocol::{Instruction, ProtocolError};

/// 驱动层错误类型
#[derive(Error, Debug)]
pub enum DriverError {
    /// 硬件错误
    #[error("Hardware error: {0}")]
    Hal(#[from] HalError),

    /// 协议解析错误
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// 配置值无效
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// 配置文件解析失败
    #[error("Config parse error: {0}")]
    Toml(#[from] toml::de::Error),

    /// 配置文件读取失败
    #[error("Config IO error: {0}")]
    Io(#[from] std::io::Error),

    /// 工作线程启动失败
    #[error("Failed to spawn thread: {0}")]
    ThreadSpawn(String),

    /// 指令执行超时
    #[error("Instruction {instruction} stalled after {elapsed:?}")]
    Stalled {
        instruction: Instruction,
        elapsed: Duration,
    },

    /// 已紧急停止
    #[error("Emergency stop engaged")]
    EmergencyStopped,
}

#[cfg(test)]
mod tests {
    use super::DriverError;
    use std::time::Duration;
    use walker_hal::HalError;
    use walker_protocol::{Instruction, ProtocolError};

    #[test]
    fn test_driver_error_display() {
        let msg = format!("{}", DriverError::Hal(HalError::Timeout));
        assert_eq!(msg, "Hardware error: Device timeout");

        let msg = format!(
            "{}",
            DriverError::Protocol(ProtocolError::UnknownMovement("JUMP".into()))
        );
        assert!(msg.contains("Unknown movement"), "{}", msg);

        let msg = format!(
            "{}",
            DriverError::Stalled {
                instruction: Instruction::forward(3),
                elapsed: Duration::from_millis(1500),
            }
        );
        assert!(msg.contains("FORWARD,3") && msg.contains("1.5s"), "{}", msg);

        assert_eq!(
            format!("{}", DriverError::EmergencyStopped),
            "Emergency stop engaged"
        );
    }

    #[test]
    fn test_from_hal_error() {
        let driver_error: DriverError = HalError::Disconnected.into();
        assert!(matches!(
            driver_error,
            DriverError::Hal(HalError::Disconnected)
        ));
    }

    #[test]
    fn test_from_toml_error() {
        let err = toml::from_str::<toml::Table>("= broken").unwrap_err();
        let driver_error: DriverError = err.into();
        assert!(matches!(driver_error, DriverError::Toml(_)));
    }
}
