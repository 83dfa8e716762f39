//! 指令类型定义
//!
//! 指令是不可变值：运动类型 + 持续量 + 可选修饰（方向或巡线传感器）。

use crate::ProtocolError;
use std::fmt;
use std::str::FromStr;

/// 运动类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "UPPERCASE"))]
pub enum Movement {
    /// 沿引导线前进，按越线次数计量
    Forward,
    /// 直接驱动后退，按越线次数计量
    Backward,
    /// 原地转向
    Turn,
    /// 抓取物体
    Pick,
    /// 放下物体
    Drop,
}

impl Movement {
    /// 所有运动类型
    pub const ALL: [Movement; 5] = [
        Movement::Forward,
        Movement::Backward,
        Movement::Turn,
        Movement::Pick,
        Movement::Drop,
    ];

    /// 线协议中的名称
    pub fn as_str(self) -> &'static str {
        match self {
            Movement::Forward => "FORWARD",
            Movement::Backward => "BACKWARD",
            Movement::Turn => "TURN",
            Movement::Pick => "PICK",
            Movement::Drop => "DROP",
        }
    }

    /// 是否由巡线控制器负责转向
    pub fn is_line_tracked(self) -> bool {
        self == Movement::Forward
    }
}

impl FromStr for Movement {
    type Err = ProtocolError;

    /// 名称区分大小写，与发送端保持一致
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Movement::ALL
            .into_iter()
            .find(|m| m.as_str() == s)
            .ok_or_else(|| ProtocolError::UnknownMovement(s.to_string()))
    }
}

impl fmt::Display for Movement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 转向方向
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "UPPERCASE"))]
pub enum Direction {
    Left,
    Right,
}

impl Direction {
    pub fn as_str(self) -> &'static str {
        match self {
            Direction::Left => "LEFT",
            Direction::Right => "RIGHT",
        }
    }
}

impl FromStr for Direction {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "LEFT" => Ok(Direction::Left),
            "RIGHT" => Ok(Direction::Right),
            _ => Err(ProtocolError::UnknownDirection(s.to_string())),
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 巡线反射传感器选择
///
/// 路径规划器在 FORWARD 条目的第三个字段中给出：`0` = 右侧传感器，`1` = 左侧传感器。
/// 巡线控制器使用被选中的传感器，导航层用另一个传感器数越线。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum LineSensor {
    /// 传感器 0（右侧）
    #[default]
    Right,
    /// 传感器 1（左侧）
    Left,
}

impl LineSensor {
    /// 传感器索引（0 或 1）
    pub fn index(self) -> usize {
        match self {
            LineSensor::Right => 0,
            LineSensor::Left => 1,
        }
    }

    /// 从索引转换
    pub fn from_index(index: usize) -> Option<Self> {
        match index {
            0 => Some(LineSensor::Right),
            1 => Some(LineSensor::Left),
            _ => None,
        }
    }

    /// 另一侧的传感器
    pub fn opposite(self) -> Self {
        match self {
            LineSensor::Right => LineSensor::Left,
            LineSensor::Left => LineSensor::Right,
        }
    }
}

/// 导航指令
///
/// 构造后不可变。`direction` 仅对 TURN 有意义（且必需），
/// `sensor` 仅对 FORWARD/BACKWARD 有意义。
///
/// # 示例
///
/// ```rust
/// use walker_protocol::{Direction, Instruction, Movement};
///
/// let turn = Instruction::turn(1, Direction::Left);
/// assert_eq!(turn.movement(), Movement::Turn);
/// assert_eq!(turn.to_string(), "TURN,1,LEFT");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Instruction {
    movement: Movement,
    duration: u32,
    direction: Option<Direction>,
    sensor: Option<LineSensor>,
}

impl Instruction {
    /// 前进 `lines` 条线
    pub fn forward(lines: u32) -> Self {
        Self::plain(Movement::Forward, lines)
    }

    /// 前进 `lines` 条线，并指定巡线传感器
    pub fn forward_on(lines: u32, sensor: LineSensor) -> Self {
        Self {
            sensor: Some(sensor),
            ..Self::forward(lines)
        }
    }

    /// 后退 `lines` 条线
    pub fn backward(lines: u32) -> Self {
        Self::plain(Movement::Backward, lines)
    }

    /// 转向
    ///
    /// `mode == 1` 为常规转向，其他值为"后退之后"的反向枢轴转向。
    pub fn turn(mode: u32, direction: Direction) -> Self {
        Self {
            direction: Some(direction),
            ..Self::plain(Movement::Turn, mode)
        }
    }

    /// 抓取
    pub fn pick(count: u32) -> Self {
        Self::plain(Movement::Pick, count)
    }

    /// 放下
    pub fn drop_off(count: u32) -> Self {
        Self::plain(Movement::Drop, count)
    }

    /// 通用构造（校验 TURN 必须带方向）
    pub fn try_new(
        movement: Movement,
        duration: u32,
        direction: Option<Direction>,
    ) -> Result<Self, ProtocolError> {
        if movement == Movement::Turn && direction.is_none() {
            return Err(ProtocolError::MissingDirection);
        }
        Ok(Self {
            direction,
            ..Self::plain(movement, duration)
        })
    }

    fn plain(movement: Movement, duration: u32) -> Self {
        Self {
            movement,
            duration,
            direction: None,
            sensor: None,
        }
    }

    pub fn movement(&self) -> Movement {
        self.movement
    }

    /// 持续量：FORWARD/BACKWARD 为越线数，TURN 为转向模式
    pub fn duration(&self) -> u32 {
        self.duration
    }

    pub fn direction(&self) -> Option<Direction> {
        self.direction
    }

    pub fn sensor(&self) -> Option<LineSensor> {
        self.sensor
    }
}

impl fmt::Display for Instruction {
    /// 按线协议条目格式输出
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{}", self.movement, self.duration)?;
        if let Some(direction) = self.direction {
            write!(f, ",{direction}")?;
        } else if let Some(sensor) = self.sensor {
            write!(f, ",{}", sensor.index())?;
        }
        Ok(())
    }
}
