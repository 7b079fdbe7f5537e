//! # MedRef 管理模块
//!
//! 分层配置加载、配置验证与日志初始化

pub mod config;
pub mod logging;

pub use config::{ConfigValidator, LogFormat, LoggingConfig, MedrefConfig, QueryConfig, StoreConfig};
pub use logging::init_logging;
