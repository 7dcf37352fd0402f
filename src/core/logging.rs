//! 日志初始化
//!
//! 基于 `tracing` + `tracing-subscriber`，`RUST_LOG` 优先于配置文件中的级别。

use crate::config::LoggingConfig;
use tracing_subscriber::EnvFilter;

/// 初始化日志系统
///
/// 重复调用是安全的：已安装全局 subscriber 时直接返回 `false`。
pub fn init_logging(config: &LoggingConfig) -> bool {
    if !config.log_to_console {
        return false;
    }

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.level.directive()));

    let installed = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init()
        .is_ok();

    if installed {
        tracing::info!(target: "chronos", level = ?config.level, "logging initialized");
    }
    installed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LogLevel;

    #[test]
    fn test_level_directive() {
        assert_eq!(LogLevel::Warn.directive(), "warn");
        assert_eq!("TRACE".parse::<LogLevel>().unwrap().directive(), "trace");
    }

    #[test]
    fn test_disabled_console_logging() {
        let config = LoggingConfig {
            log_to_console: false,
            ..LoggingConfig::default()
        };
        assert!(!init_logging(&config));
    }
}
