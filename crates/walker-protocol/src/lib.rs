//! # Walker Protocol
//!
//! 导航指令的数据模型与文本线协议（无硬件依赖）
//!
//! ## 模块
//!
//! - `instruction`: 指令类型（`Movement`、`Direction`、`LineSensor`、`Instruction`）
//! - `decode`: `INSTRUCTIONS:...` 消息解码（逐条目容错）
//!
//! ## 线协议
//!
//! 字节流上以固定 200 字节的帧传输文本：
//!
//! ```text
//! INSTRUCTIONS:FORWARD,2;TURN,1,LEFT;PICK,1
//! ```
//!
//! 不足 200 字节的部分以 `\0` 填充。每个被接收的帧都会原样回显作为确认。

pub mod decode;
pub mod instruction;

pub use decode::{
    DecodeReport, EntryRejection, INSTRUCTIONS_KEY, MessageKind, decode_message, parse_entry,
};
pub use instruction::{Direction, Instruction, LineSensor, Movement};

use std::borrow::Cow;
use thiserror::Error;

/// 线协议帧大小（字节）
pub const FRAME_SIZE: usize = 200;

/// 固定长度的线协议帧
///
/// # 设计特性
///
/// - **固定 200 字节**：与发送端的缓冲区大小一致，避免堆分配
/// - **Copy trait**：帧在读取线程与回显路径之间按值传递
/// - **回显原样**：`as_bytes()` 返回包含填充的完整帧，用于确认回显
///
/// # 示例
///
/// ```rust
/// use walker_protocol::WireFrame;
///
/// let frame = WireFrame::from_text("INSTRUCTIONS:FORWARD,2").unwrap();
/// assert_eq!(frame.text(), "INSTRUCTIONS:FORWARD,2");
/// assert_eq!(frame.as_bytes().len(), walker_protocol::FRAME_SIZE);
/// ```
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct WireFrame {
    /// 帧数据（固定 200 字节，未使用部分为 0）
    data: [u8; FRAME_SIZE],

    /// 有效数据长度 (0-200)
    len: u8,
}

impl WireFrame {
    /// 从原始字节创建帧
    ///
    /// # 错误
    /// - `ProtocolError::FrameTooLong`: 字节数超过 `FRAME_SIZE`
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ProtocolError> {
        if bytes.len() > FRAME_SIZE {
            return Err(ProtocolError::FrameTooLong {
                len: bytes.len(),
                max: FRAME_SIZE,
            });
        }

        let mut data = [0u8; FRAME_SIZE];
        data[..bytes.len()].copy_from_slice(bytes);

        Ok(Self {
            data,
            len: bytes.len() as u8,
        })
    }

    /// 从文本创建帧
    pub fn from_text(text: &str) -> Result<Self, ProtocolError> {
        Self::from_bytes(text.as_bytes())
    }

    /// 完整帧（包含 `\0` 填充），用于回显
    pub fn as_bytes(&self) -> &[u8; FRAME_SIZE] {
        &self.data
    }

    /// 有效数据切片
    pub fn payload(&self) -> &[u8] {
        &self.data[..self.len as usize]
    }

    /// 有效数据长度
    pub fn len(&self) -> usize {
        self.len as usize
    }

    /// 是否为空帧
    pub fn is_empty(&self) -> bool {
        self.text().is_empty()
    }

    /// 帧中的文本
    ///
    /// 非 UTF-8 字节按替换字符处理；尾部的 `\0` 填充与首尾空白会被去除。
    pub fn text(&self) -> Cow<'_, str> {
        match String::from_utf8_lossy(self.payload()) {
            Cow::Borrowed(s) => Cow::Borrowed(trim_frame_text(s)),
            Cow::Owned(s) => Cow::Owned(trim_frame_text(&s).to_string()),
        }
    }
}

fn trim_frame_text(s: &str) -> &str {
    s.trim_matches(|c: char| c == '\0' || c.is_whitespace())
}

impl std::fmt::Debug for WireFrame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WireFrame")
            .field("len", &self.len)
            .field("text", &self.text())
            .finish()
    }
}

/// 协议解析错误类型
///
/// 每个条目独立解析，出错的条目被丢弃，错误以 `EntryRejection` 的形式报告。
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("Unknown movement: {0:?}")]
    UnknownMovement(String),

    #[error("Unknown direction: {0:?}")]
    UnknownDirection(String),

    #[error("Invalid duration: {0:?}")]
    InvalidDuration(String),

    #[error("Missing field `{field}` in entry {entry:?}")]
    MissingField { field: &'static str, entry: String },

    #[error("TURN requires a LEFT or RIGHT direction")]
    MissingDirection,

    #[error("Unexpected field {field:?} in entry {entry:?}")]
    UnexpectedField { field: String, entry: String },

    #[error("Frame too long: {len} bytes (max {max})")]
    FrameTooLong { len: usize, max: usize },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_from_text_pads_with_zero() {
        let frame = WireFrame::from_text("INSTRUCTIONS:PICK,1").unwrap();
        assert_eq!(frame.len(), 19);
        assert!(frame.as_bytes()[19..].iter().all(|b| *b == 0));
    }

    #[test]
    fn test_frame_text_trims_padding_and_newline() {
        let mut raw = [0u8; FRAME_SIZE];
        raw[..24].copy_from_slice(b"INSTRUCTIONS:FORWARD,2\r\n");
        let frame = WireFrame::from_bytes(&raw).unwrap();
        assert_eq!(frame.len(), FRAME_SIZE);
        assert_eq!(frame.text(), "INSTRUCTIONS:FORWARD,2");
    }

    #[test]
    fn test_frame_too_long() {
        let raw = vec![b'A'; FRAME_SIZE + 1];
        let err = WireFrame::from_bytes(&raw).unwrap_err();
        assert_eq!(
            err,
            ProtocolError::FrameTooLong {
                len: FRAME_SIZE + 1,
                max: FRAME_SIZE
            }
        );
    }

    #[test]
    fn test_frame_invalid_utf8_is_lossy() {
        let frame = WireFrame::from_bytes(&[b'O', b'K', 0xFF]).unwrap();
        assert!(frame.text().starts_with("OK"));
    }

    #[test]
    fn test_empty_frame() {
        let frame = WireFrame::from_bytes(&[0u8; FRAME_SIZE]).unwrap();
        assert!(frame.is_empty());
    }

    #[test]
    fn test_protocol_error_display() {
        let msg = format!("{}", ProtocolError::UnknownMovement("FOO".into()));
        assert_eq!(msg, "Unknown movement: \"FOO\"");

        let msg = format!("{}", ProtocolError::MissingDirection);
        assert!(msg.contains("TURN"));
    }
}
