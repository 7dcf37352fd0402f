//! 引擎配置
//!
//! 配置来源按优先级叠加：默认值 < 配置文件（TOML 或 JSON）< `ENGINE_*` 环境变量。
//! 所有结构体都带 `#[serde(default)]`，配置文件只需写出要改的字段。

use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use thiserror::Error;

pub mod graphics;
pub mod performance;

pub use graphics::{BackendPreference, GraphicsConfig, PixelRatioConfig, PowerPreference, Resolution};
pub use performance::{MonitorConfig, PerformanceConfig};

use crate::impl_default;

/// 显式指定配置文件路径的环境变量
pub const CONFIG_PATH_VAR: &str = "CHRONOS_CONFIG";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("cannot read config: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid {format} config: {message}")]
    Parse { format: ConfigFormat, message: String },
    #[error("unsupported config file extension: {0}")]
    UnknownFormat(String),
    #[error("invalid config value: {0}")]
    Invalid(String),
}

pub type ConfigResult<T> = Result<T, ConfigError>;

/// 配置文件格式，由扩展名决定
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    Toml,
    Json,
}

impl ConfigFormat {
    pub fn from_path(path: &Path) -> ConfigResult<Self> {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some("toml") => Ok(Self::Toml),
            Some("json") => Ok(Self::Json),
            other => Err(ConfigError::UnknownFormat(other.unwrap_or("").to_string())),
        }
    }

    fn parse_error(self, message: impl ToString) -> ConfigError {
        ConfigError::Parse {
            format: self,
            message: message.to_string(),
        }
    }
}

impl std::fmt::Display for ConfigFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            ConfigFormat::Toml => "TOML",
            ConfigFormat::Json => "JSON",
        })
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub graphics: GraphicsConfig,
    pub performance: PerformanceConfig,
    pub logging: LoggingConfig,
}

impl EngineConfig {
    /// 按扩展名读取配置文件并校验
    pub fn load(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let path = path.as_ref();
        let format = ConfigFormat::from_path(path)?;
        let config = Self::parse(&fs::read_to_string(path)?, format)?;
        config.validate()?;
        Ok(config)
    }

    pub fn parse(content: &str, format: ConfigFormat) -> ConfigResult<Self> {
        match format {
            ConfigFormat::Toml => toml::from_str(content).map_err(|e| format.parse_error(e)),
            ConfigFormat::Json => serde_json::from_str(content).map_err(|e| format.parse_error(e)),
        }
    }

    pub fn from_toml_str(content: &str) -> ConfigResult<Self> {
        Self::parse(content, ConfigFormat::Toml)
    }

    pub fn from_json_str(content: &str) -> ConfigResult<Self> {
        Self::parse(content, ConfigFormat::Json)
    }

    pub fn render(&self, format: ConfigFormat) -> ConfigResult<String> {
        match format {
            ConfigFormat::Toml => toml::to_string_pretty(self).map_err(|e| format.parse_error(e)),
            ConfigFormat::Json => serde_json::to_string_pretty(self).map_err(|e| format.parse_error(e)),
        }
    }

    /// 写回配置文件，格式同样由扩展名决定
    pub fn save(&self, path: impl AsRef<Path>) -> ConfigResult<()> {
        let path = path.as_ref();
        let content = self.render(ConfigFormat::from_path(path)?)?;
        fs::write(path, content)?;
        Ok(())
    }

    /// 用进程环境变量覆盖
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| env::var(key).ok());
    }

    /// 用任意键值来源覆盖；无法解析的值被忽略
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let parsed = |key: &str| lookup(key).map(|value| value.trim().to_string());

        if let Some(width) = parsed("ENGINE_GRAPHICS_WIDTH").and_then(|v| v.parse().ok()) {
            self.graphics.resolution.width = width;
        }
        if let Some(height) = parsed("ENGINE_GRAPHICS_HEIGHT").and_then(|v| v.parse().ok()) {
            self.graphics.resolution.height = height;
        }
        // DPR 按步长吸附，避免出现不在档位表里的值
        if let Some(dpr) = parsed("ENGINE_GRAPHICS_DPR").and_then(|v| v.parse::<f32>().ok()) {
            self.graphics.pixel_ratio.initial = self.graphics.pixel_ratio.snap(dpr);
        }
        if let Some(tier) = parsed("ENGINE_GRAPHICS_QUALITY").and_then(|v| v.parse().ok()) {
            self.graphics.quality = tier;
        }
        if let Some(fps) = parsed("ENGINE_PERFORMANCE_TARGET_FPS").and_then(|v| v.parse().ok()) {
            self.performance.target_fps = fps;
        }
        if let Some(level) = parsed("ENGINE_LOG_LEVEL").and_then(|v| v.parse().ok()) {
            self.logging.level = level;
        }
    }

    pub fn validate(&self) -> ConfigResult<()> {
        self.graphics.validate()?;
        self.performance.validate()
    }

    /// 宿主启动时使用的配置
    ///
    /// 依次尝试 `$CHRONOS_CONFIG`、`./chronos.toml`、`./chronos.json`、
    /// `~/.config/chronos/render.toml`；都不可用时取默认值。最后叠加环境变量。
    pub fn load_or_default() -> Self {
        let mut candidates: Vec<PathBuf> = Vec::new();
        if let Some(explicit) = env::var_os(CONFIG_PATH_VAR) {
            candidates.push(PathBuf::from(explicit));
        }
        candidates.push(PathBuf::from("chronos.toml"));
        candidates.push(PathBuf::from("chronos.json"));
        if let Some(home) = env::var_os("HOME") {
            candidates.push(PathBuf::from(home).join(".config/chronos/render.toml"));
        }

        let mut config = candidates
            .iter()
            .filter(|path| path.exists())
            .find_map(|path| match Self::load(path) {
                Ok(config) => {
                    tracing::info!(target: "chronos::config", path = %path.display(), "config loaded");
                    Some(config)
                }
                Err(error) => {
                    tracing::warn!(target: "chronos::config", path = %path.display(), %error, "config skipped");
                    None
                }
            })
            .unwrap_or_else(|| {
                tracing::info!(target: "chronos::config", "using default config");
                Self::default()
            });
        config.apply_env_overrides();
        config
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: LogLevel,
    /// 关闭后 `init_logging` 不安装 subscriber（宿主自带日志时）
    pub log_to_console: bool,
}

impl_default!(LoggingConfig {
    level: LogLevel::Info,
    log_to_console: true,
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    /// `EnvFilter` 指令
    pub fn directive(self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

impl FromStr for LogLevel {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_ascii_lowercase().as_str() {
            "trace" => Ok(Self::Trace),
            "debug" => Ok(Self::Debug),
            "info" => Ok(Self::Info),
            "warn" | "warning" => Ok(Self::Warn),
            "error" => Ok(Self::Error),
            other => Err(ConfigError::Invalid(format!("unknown log level '{other}'"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::quality::QualityTier;
    use std::collections::HashMap;

    #[test]
    fn test_defaults_are_valid() {
        assert!(EngineConfig::default().validate().is_ok());
    }

    #[test]
    fn test_render_and_parse_both_formats() {
        let mut config = EngineConfig::default();
        config.graphics.quality = QualityTier::Low;
        config.performance.monitor.flipflops = 5;
        for format in [ConfigFormat::Toml, ConfigFormat::Json] {
            let parsed = EngineConfig::parse(&config.render(format).unwrap(), format).unwrap();
            assert_eq!(parsed.graphics.quality, QualityTier::Low);
            assert_eq!(parsed.performance.monitor.flipflops, 5);
        }
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let parsed = EngineConfig::from_toml_str(
            r#"
            [graphics]
            quality = "low"
            deferred = true

            [logging]
            level = "warn"
            "#,
        )
        .unwrap();
        assert_eq!(parsed.graphics.quality, QualityTier::Low);
        assert!(parsed.graphics.deferred);
        assert_eq!(parsed.logging.level, LogLevel::Warn);
        assert_eq!(parsed.performance.metrics_window_ms, 1000);
    }

    #[test]
    fn test_parse_error_names_format() {
        let err = EngineConfig::from_json_str("{ \"graphics\": 3 }").unwrap_err();
        assert!(matches!(err, ConfigError::Parse { format: ConfigFormat::Json, .. }));
        assert!(err.to_string().starts_with("invalid JSON config"));
    }

    #[test]
    fn test_format_from_extension() {
        assert_eq!(ConfigFormat::from_path(Path::new("a/render.toml")).unwrap(), ConfigFormat::Toml);
        assert_eq!(ConfigFormat::from_path(Path::new("render.json")).unwrap(), ConfigFormat::Json);
        assert!(matches!(
            ConfigFormat::from_path(Path::new("render.yaml")),
            Err(ConfigError::UnknownFormat(ext)) if ext == "yaml"
        ));
    }

    #[test]
    fn test_overrides() {
        let vars: HashMap<&str, &str> = [
            ("ENGINE_GRAPHICS_WIDTH", "800"),
            ("ENGINE_GRAPHICS_DPR", "1.2"),
            ("ENGINE_GRAPHICS_QUALITY", "ultra"),
            ("ENGINE_LOG_LEVEL", " debug "),
            ("ENGINE_PERFORMANCE_TARGET_FPS", "not-a-number"),
        ]
        .into_iter()
        .collect();

        let mut config = EngineConfig::default();
        config.apply_overrides(|key| vars.get(key).map(|v| v.to_string()));

        assert_eq!(config.graphics.resolution.width, 800);
        assert_eq!(config.graphics.pixel_ratio.initial, 1.0);
        assert_eq!(config.graphics.quality, QualityTier::Ultra);
        assert_eq!(config.logging.level, LogLevel::Debug);
        assert_eq!(config.performance.target_fps, 60);
    }
}
