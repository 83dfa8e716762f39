//! 驱动层模块
//!
//! 本模块提供巡线机器人的运行时，包括：
//! - 指令队列（链路线程追加，导航线程消费）
//! - 激活门（导航线程与巡线线程的握手）
//! - 巡线 PID 控制器（抗积分饱和）
//! - 导航状态机（FORWARD/BACKWARD/TURN/PICK/DROP）
//! - 状态发布（ArcSwap 无锁读取）与运行统计
//!
//! # 线程模型
//!
//! | 线程             | 职责                           |
//! |------------------|--------------------------------|
//! | `walker-link`    | 收帧、解码、入队、回显         |
//! | `walker-nav`     | 执行队首指令，开关激活门       |
//! | `walker-tracker` | 门打开时以 PID 控制两轮速度    |

mod builder;
pub mod config;
mod error;
pub mod gate;
pub mod link;
pub mod metrics;
pub mod navigation;
pub mod queue;
pub mod tracker;
mod walker;

pub use builder::WalkerBuilder;
pub use config::{LinkConfig, NavigationConfig, TrackerConfig, TurnCompletion, WalkerConfig};
pub use error::DriverError;
pub use gate::{ActivationGate, GatePass};
pub use link::{LinkPoll, LinkWorker, link_loop};
pub use metrics::{MetricsSnapshot, WalkerMetrics};
pub use navigation::{
    EdgeDetector, NavigationController, NavigationEvent, NavigationSnapshot, NavigationState,
    OverrideEvent, Phase, StepOutcome, navigation_loop,
};
pub use queue::InstructionQueue;
pub use tracker::{
    LineController, LineTracker, TrackerOutput, TrackerStep, WheelSpeeds, tracker_loop,
};
pub use walker::Walker;
