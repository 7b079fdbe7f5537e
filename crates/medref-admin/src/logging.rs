//! 日志初始化
//!
//! `RUST_LOG` 存在时优先于配置中的 `logging.level`。日志统一写入 stderr，
//! stdout 只输出查询响应。

use crate::config::{LogFormat, LoggingConfig};
use anyhow::{Context, Result};
use tracing_subscriber::EnvFilter;

/// 根据配置构建过滤器
pub fn build_filter(config: &LoggingConfig) -> Result<EnvFilter> {
    match EnvFilter::try_from_default_env() {
        Ok(filter) => Ok(filter),
        Err(_) => EnvFilter::try_new(&config.level)
            .with_context(|| format!("Invalid log level: {}", config.level)),
    }
}

/// 安装全局 tracing subscriber
pub fn init_logging(config: &LoggingConfig) -> Result<()> {
    let filter = build_filter(config)?;
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(true);

    let installed = match config.format {
        LogFormat::Pretty => builder.pretty().try_init(),
        LogFormat::Compact => builder.compact().try_init(),
        LogFormat::Json => builder.json().try_init(),
    };

    installed.map_err(|e| anyhow::anyhow!("Failed to install log subscriber: {}", e))?;
    tracing::debug!("Logging initialized with format {:?}", config.format);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_filter_from_directive() {
        let config = LoggingConfig {
            level: "medref_store=debug,info".to_string(),
            format: LogFormat::Json,
        };
        if std::env::var("RUST_LOG").is_err() {
            assert!(build_filter(&config).is_ok());
        }
    }

    #[test]
    fn test_second_init_fails() {
        let config = LoggingConfig::default();
        let _ = init_logging(&config);
        assert!(init_logging(&config).is_err());
    }
}
