//! 日志初始化
//!
//! `RUST_LOG` 优先；未设置时使用调用方给出的默认过滤规则。
//! 依赖库通过 `log` 宏输出的记录也会转发到 tracing。

use thiserror::Error;
use tracing_log::LogTracer;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::prelude::*;

#[derive(Error, Debug)]
pub enum LoggerError {
    #[error("Invalid log filter: {0}")]
    Filter(#[from] tracing_subscriber::filter::ParseError),
    #[error("Global subscriber already set: {0}")]
    Subscriber(#[from] tracing::subscriber::SetGlobalDefaultError),
    #[error("Log bridge already set: {0}")]
    LogBridge(#[from] log::SetLoggerError),
}

/// 安装全局 tracing subscriber
///
/// # 参数
/// - `default_filter`: `RUST_LOG` 未设置时使用的过滤规则，如 `"info"` 或 `"walker_driver=debug"`
///
/// # 错误
/// 过滤规则无效，或全局 subscriber 已被设置。
pub fn init_logger(default_filter: &str) -> Result<(), LoggerError> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(default_filter)?,
    };

    let subscriber = tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_thread_names(true));
    tracing::subscriber::set_global_default(subscriber)?;
    LogTracer::builder()
        .with_max_level(log::LevelFilter::Trace)
        .init()?;
    Ok(())
}
