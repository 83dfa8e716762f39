//! 运行配置
//!
//! 所有控制常数都集中在这里，可以从 TOML 文件加载。缺省字段取默认值：
//!
//! ```toml
//! [tracker]
//! kp = 1.2
//! base_speed = 200
//!
//! [navigation]
//! instruction_timeout_ms = 20000
//! turn_completion = "blocking"
//! ```

use crate::error::DriverError;
use serde::{Deserialize, Serialize};
use std::path::Path;
use walker_protocol::LineSensor;

/// 完整配置
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct WalkerConfig {
    pub tracker: TrackerConfig,
    pub navigation: NavigationConfig,
    pub link: LinkConfig,
}

impl WalkerConfig {
    /// 从 TOML 文本解析并校验
    ///
    /// # 错误
    /// - `DriverError::Toml`: 语法或类型错误
    /// - `DriverError::Config`: 数值不合法
    pub fn from_toml_str(text: &str) -> Result<Self, DriverError> {
        let config: WalkerConfig = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// 从 TOML 文件加载并校验
    pub fn load(path: impl AsRef<Path>) -> Result<Self, DriverError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    /// 序列化为 TOML 文本
    pub fn to_toml_string(&self) -> Result<String, DriverError> {
        toml::to_string_pretty(self).map_err(|e| DriverError::Config(e.to_string()))
    }

    /// 校验所有数值
    pub fn validate(&self) -> Result<(), DriverError> {
        self.tracker.validate()?;
        self.navigation.validate()?;
        Ok(())
    }
}

/// 巡线 PID 控制器配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    pub kp: f32,
    pub ki: f32,
    pub kd: f32,
    /// 目标值（缩放后的读数）
    pub setpoint: f32,
    /// 读数缩放系数（`[0, 1]` → 百分比）
    pub scale: f32,
    /// 基础轮速
    pub base_speed: i32,
    /// 任一轮的目标速度超过 `base_speed + windup_margin` 时触发抗积分饱和
    pub windup_margin: i32,
    /// 启动时跟随的传感器（FORWARD 指令可以覆盖）
    pub outer_sensor: LineSensor,
    /// 最小迭代周期（微秒），0 表示不限速
    pub min_period_us: u64,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            kp: 1.2,
            ki: 0.02,
            kd: 10.0,
            setpoint: 28.0,
            scale: 100.0,
            base_speed: 200,
            windup_margin: 50,
            outer_sensor: LineSensor::Right,
            min_period_us: 0,
        }
    }
}

impl TrackerConfig {
    pub fn validate(&self) -> Result<(), DriverError> {
        for (name, gain) in [("kp", self.kp), ("ki", self.ki), ("kd", self.kd)] {
            if !gain.is_finite() {
                return Err(DriverError::Config(format!(
                    "tracker.{} must be finite (got {})",
                    name, gain
                )));
            }
        }
        if !self.setpoint.is_finite() {
            return Err(DriverError::Config(format!(
                "tracker.setpoint must be finite (got {})",
                self.setpoint
            )));
        }
        if !(self.scale.is_finite() && self.scale > 0.0) {
            return Err(DriverError::Config(format!(
                "tracker.scale must be > 0 (got {})",
                self.scale
            )));
        }
        if self.base_speed <= 0 {
            return Err(DriverError::Config(format!(
                "tracker.base_speed must be > 0 (got {})",
                self.base_speed
            )));
        }
        if self.windup_margin < 0 {
            return Err(DriverError::Config(format!(
                "tracker.windup_margin must be >= 0 (got {})",
                self.windup_margin
            )));
        }
        Ok(())
    }
}

/// TURN 的完成方式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnCompletion {
    /// 发出转动命令后立即出队
    #[default]
    FireAndForget,
    /// 同步转动，转完后出队
    Blocking,
}

impl TurnCompletion {
    /// 对应 `DriveMotor::rotate` 的 `asynchronous` 参数
    pub fn asynchronous(self) -> bool {
        self == TurnCompletion::FireAndForget
    }
}

/// 导航状态机配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NavigationConfig {
    /// 越线判定阈值（原始读数，≤ 阈值视为黑线）
    pub edge_threshold: f32,
    /// 直接驱动（PICK/DROP/BACKWARD）时的轮速
    pub maneuver_speed: i32,
    /// PICK 接近阶段的停止距离（米）
    pub pick_stop_range: f32,
    /// PICK 后退阶段的结束阈值（反射率读数 ≤ 该值时停止）
    pub grip_release: f32,
    /// 夹爪闭合转角
    pub gripper_close: i32,
    /// 夹爪张开转角
    pub gripper_open: i32,
    /// DROP 前伸转角
    pub drop_extend: i32,
    /// DROP 回撤转角
    pub drop_retract: i32,
    /// DROP 回撤完成的位置（左轮编码器 ≤ 该值）
    pub retract_target: i32,
    /// TURN 的单轮转角
    pub turn_increment: i32,
    pub turn_completion: TurnCompletion,
    /// 空闲时在队列上等待的最长时间（毫秒）
    pub idle_wait_ms: u64,
    /// 执行指令时的轮询周期（微秒）
    pub poll_period_us: u64,
    /// 单条指令的超时时间（毫秒），`None` 表示不限
    pub instruction_timeout_ms: Option<u64>,
    /// 导航事件通道容量
    pub event_capacity: usize,
}

impl Default for NavigationConfig {
    fn default() -> Self {
        Self {
            edge_threshold: 0.10,
            maneuver_speed: 100,
            pick_stop_range: 0.04,
            grip_release: 0.10,
            gripper_close: -630,
            gripper_open: 600,
            drop_extend: 250,
            drop_retract: 340,
            retract_target: 0,
            turn_increment: 360,
            turn_completion: TurnCompletion::FireAndForget,
            idle_wait_ms: 50,
            poll_period_us: 1000,
            instruction_timeout_ms: None,
            event_capacity: 256,
        }
    }
}

impl NavigationConfig {
    pub fn validate(&self) -> Result<(), DriverError> {
        if self.maneuver_speed <= 0 {
            return Err(DriverError::Config(format!(
                "navigation.maneuver_speed must be > 0 (got {})",
                self.maneuver_speed
            )));
        }
        if !(0.0..=1.0).contains(&self.edge_threshold) {
            return Err(DriverError::Config(format!(
                "navigation.edge_threshold must be within [0, 1] (got {})",
                self.edge_threshold
            )));
        }
        if !(self.pick_stop_range.is_finite() && self.pick_stop_range > 0.0) {
            return Err(DriverError::Config(format!(
                "navigation.pick_stop_range must be > 0 (got {})",
                self.pick_stop_range
            )));
        }
        if !self.grip_release.is_finite() {
            return Err(DriverError::Config(format!(
                "navigation.grip_release must be finite (got {})",
                self.grip_release
            )));
        }
        if self.retract_target >= self.drop_extend {
            return Err(DriverError::Config(format!(
                "navigation.retract_target ({}) must be below drop_extend ({})",
                self.retract_target, self.drop_extend
            )));
        }
        if i64::from(self.drop_extend) - i64::from(self.drop_retract)
            > i64::from(self.retract_target)
        {
            return Err(DriverError::Config(format!(
                "navigation.drop_retract ({}) cannot bring the wheel from {} back to {}",
                self.drop_retract, self.drop_extend, self.retract_target
            )));
        }
        if self.turn_increment == 0 {
            return Err(DriverError::Config(
                "navigation.turn_increment must be non-zero".to_string(),
            ));
        }
        if self.idle_wait_ms == 0 {
            return Err(DriverError::Config(
                "navigation.idle_wait_ms must be > 0".to_string(),
            ));
        }
        if self.instruction_timeout_ms == Some(0) {
            return Err(DriverError::Config(
                "navigation.instruction_timeout_ms must be > 0 when set".to_string(),
            ));
        }
        if self.event_capacity == 0 {
            return Err(DriverError::Config(
                "navigation.event_capacity must be > 0".to_string(),
            ));
        }
        Ok(())
    }
}

/// 无线链路配置
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LinkConfig {
    /// 没有可读帧时的休眠时间（毫秒）
    pub idle_backoff_ms: u64,
    /// 是否回显每个收到的帧
    pub echo: bool,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            idle_backoff_ms: 5,
            echo: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = WalkerConfig::default();
        config.validate().unwrap();
        assert_eq!(config.tracker.base_speed, 200);
        assert_eq!(config.navigation.drop_extend, 250);
        assert_eq!(config.navigation.instruction_timeout_ms, None);
        assert!(config.navigation.turn_completion.asynchronous());
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config = WalkerConfig::from_toml_str(
            r#"
            [tracker]
            kp = 2.0
            outer_sensor = "left"

            [navigation]
            instruction_timeout_ms = 1500
            turn_completion = "blocking"
            "#,
        )
        .unwrap();
        assert_eq!(config.tracker.kp, 2.0);
        assert_eq!(config.tracker.ki, 0.02);
        assert_eq!(config.tracker.outer_sensor, LineSensor::Left);
        assert_eq!(config.navigation.instruction_timeout_ms, Some(1500));
        assert_eq!(config.navigation.turn_completion, TurnCompletion::Blocking);
        assert!(config.link.echo);
    }

    #[test]
    fn test_toml_round_trip() {
        let config = WalkerConfig::default();
        let text = config.to_toml_string().unwrap();
        assert_eq!(WalkerConfig::from_toml_str(&text).unwrap(), config);
    }

    #[test]
    fn test_extreme_drop_values_rejected() {
        let err = WalkerConfig::from_toml_str(
            "[navigation]\ndrop_extend = 2147483647\ndrop_retract = -1\n",
        )
        .unwrap_err();
        assert!(matches!(err, DriverError::Config(ref msg) if msg.contains("drop_retract")));
    }

    #[test]
    fn test_invalid_scale_rejected() {
        let err = WalkerConfig::from_toml_str("[tracker]\nscale = 0.0\n").unwrap_err();
        assert!(matches!(err, DriverError::Config(ref msg) if msg.contains("scale")));
    }

    #[test]
    fn test_invalid_gain_rejected() {
        let mut config = WalkerConfig::default();
        config.tracker.kd = f32::NAN;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_retract_target_must_be_below_extend() {
        let mut config = WalkerConfig::default();
        config.navigation.retract_target = 250;
        assert!(matches!(config.validate(), Err(DriverError::Config(_))));
    }

    #[test]
    fn test_unreachable_retract_rejected() {
        let mut config = WalkerConfig::default();
        config.navigation.drop_retract = 100;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_zero_maneuver_speed_rejected() {
        let err = WalkerConfig::from_toml_str("[navigation]\nmaneuver_speed = 0\n").unwrap_err();
        assert!(err.to_string().contains("maneuver_speed"));
    }

    #[test]
    fn test_unknown_turn_completion_is_parse_error() {
        let err =
            WalkerConfig::from_toml_str("[navigation]\nturn_completion = \"sometimes\"\n")
                .unwrap_err();
        assert!(matches!(err, DriverError::Toml(_)));
    }
}
