//! 消息解码
//!
//! 语法：`INSTRUCTIONS:<entry>[;<entry>...]`，`entry = MOVEMENT,duration[,QUALIFIER]`。
//!
//! - 未知的顶层键被忽略（无操作）
//! - 每个条目独立解析：出错的条目被丢弃，解码继续进行，整条消息永远不会整体失败
//! - 被丢弃的条目以 [`EntryRejection`] 报告，便于记录和测试

use crate::{Direction, Instruction, LineSensor, Movement, ProtocolError};
use tracing::debug;

/// 指令消息的顶层键
pub const INSTRUCTIONS_KEY: &str = "INSTRUCTIONS";

/// 消息类型
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageKind {
    /// `INSTRUCTIONS:` 消息
    Instructions,
    /// 其他顶层键（或缺少 `:`），整条消息被忽略
    Ignored(String),
}

/// 被丢弃的条目
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryRejection {
    /// 条目在消息中的位置（从 0 开始，含空条目）
    pub index: usize,
    /// 原始条目文本
    pub entry: String,
    /// 丢弃原因
    pub error: ProtocolError,
}

/// 解码结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodeReport {
    pub kind: MessageKind,
    /// 按消息顺序排列的有效指令
    pub accepted: Vec<Instruction>,
    pub rejected: Vec<EntryRejection>,
}

impl DecodeReport {
    fn ignored(key: &str) -> Self {
        Self {
            kind: MessageKind::Ignored(key.to_string()),
            accepted: Vec::new(),
            rejected: Vec::new(),
        }
    }

    pub fn is_ignored(&self) -> bool {
        matches!(self.kind, MessageKind::Ignored(_))
    }
}

/// 解码一条消息
///
/// # 示例
///
/// ```rust
/// use walker_protocol::{Direction, Instruction, decode_message};
///
/// let report = decode_message("INSTRUCTIONS:FORWARD,2;TURN,1,LEFT;FOO,2");
/// assert_eq!(
///     report.accepted,
///     vec![Instruction::forward(2), Instruction::turn(1, Direction::Left)]
/// );
/// assert_eq!(report.rejected.len(), 1);
/// ```
pub fn decode_message(message: &str) -> DecodeReport {
    let message = message.trim_matches(|c: char| c == '\0' || c.is_whitespace());

    let Some((key, body)) = message.split_once(':') else {
        debug!("Ignoring message without key separator: {:?}", message);
        return DecodeReport::ignored(message);
    };

    let key = key.trim();
    if key != INSTRUCTIONS_KEY {
        debug!("Ignoring message with key {:?}", key);
        return DecodeReport::ignored(key);
    }

    let mut report = DecodeReport {
        kind: MessageKind::Instructions,
        accepted: Vec::new(),
        rejected: Vec::new(),
    };

    for (index, entry) in body.split(';').enumerate() {
        let entry = entry.trim();
        if entry.is_empty() {
            continue;
        }

        match parse_entry(entry) {
            Ok(instruction) => {
                debug!("Decoded entry #{}: {}", index, instruction);
                report.accepted.push(instruction);
            },
            Err(error) => {
                debug!("Dropping entry #{} {:?}: {}", index, entry, error);
                report.rejected.push(EntryRejection {
                    index,
                    entry: entry.to_string(),
                    error,
                });
            },
        }
    }

    report
}

/// 解析单个条目 `MOVEMENT,duration[,QUALIFIER]`
///
/// 第三个字段：
/// - TURN：`LEFT` / `RIGHT`（必需）
/// - FORWARD / BACKWARD：`LEFT` / `RIGHT` 被接受并忽略，`0` / `1` 为巡线传感器选择
/// - PICK / DROP：`LEFT` / `RIGHT` 被接受并忽略
pub fn parse_entry(entry: &str) -> Result<Instruction, ProtocolError> {
    let mut fields = entry.split(',').map(str::trim);

    let movement: Movement = fields
        .next()
        .filter(|f| !f.is_empty())
        .ok_or_else(|| ProtocolError::MissingField {
            field: "movement",
            entry: entry.to_string(),
        })?
        .parse()?;

    let duration_field = fields.next().ok_or_else(|| ProtocolError::MissingField {
        field: "duration",
        entry: entry.to_string(),
    })?;
    let duration: u32 = duration_field
        .parse()
        .map_err(|_| ProtocolError::InvalidDuration(duration_field.to_string()))?;

    let qualifier = fields.next();

    if let Some(extra) = fields.next() {
        return Err(ProtocolError::UnexpectedField {
            field: extra.to_string(),
            entry: entry.to_string(),
        });
    }

    match (movement, qualifier) {
        (Movement::Forward, Some(q)) | (Movement::Backward, Some(q))
            if q.len() == 1 && q.as_bytes()[0].is_ascii_digit() =>
        {
            let sensor = q
                .parse::<usize>()
                .ok()
                .and_then(LineSensor::from_index)
                .ok_or_else(|| ProtocolError::UnexpectedField {
                    field: q.to_string(),
                    entry: entry.to_string(),
                })?;
            Ok(match movement {
                Movement::Forward => Instruction::forward_on(duration, sensor),
                _ => Instruction::backward(duration),
            })
        },
        (Movement::Turn, Some(q)) => Ok(Instruction::turn(duration, q.parse::<Direction>()?)),
        (_, Some(q)) => {
            // 非 TURN 的方向字段仅做校验，不参与执行
            q.parse::<Direction>()?;
            Instruction::try_new(movement, duration, None)
        },
        (_, None) => Instruction::try_new(movement, duration, None),
    }
}
