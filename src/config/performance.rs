use super::{ConfigError, ConfigResult};
use crate::impl_default;
use serde::{Deserialize, Serialize};

/// 性能配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PerformanceConfig {
    /// 目标帧率
    pub target_fps: u32,

    /// 指标采样窗口（毫秒）
    pub metrics_window_ms: u64,

    /// 性能监视器（自适应 DPR）
    pub monitor: MonitorConfig,
}

impl_default!(PerformanceConfig {
    target_fps: 60,
    metrics_window_ms: 1000,
    monitor: MonitorConfig::default(),
});

impl PerformanceConfig {
    /// 验证配置
    pub fn validate(&self) -> ConfigResult<()> {
        if self.target_fps == 0 || self.target_fps > 1000 {
            return Err(ConfigError::Invalid("target fps must be in 1..=1000".to_string()));
        }
        if self.metrics_window_ms == 0 {
            return Err(ConfigError::Invalid("metrics window must be non-zero".to_string()));
        }
        self.monitor.validate()
    }
}

/// 性能监视器配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    /// 低于该帧率触发 decline
    pub lower_fps: f32,
    /// 高于该帧率触发 incline
    pub upper_fps: f32,
    /// 每个判定窗口的长度（毫秒）
    pub sample_window_ms: u64,
    /// 两次调整之间的冷却时间（毫秒）
    pub cooldown_ms: u64,
    /// 方向反转次数上限，超过后触发 fallback 并停止调整
    pub flipflops: u32,
}

impl_default!(MonitorConfig {
    lower_fps: 45.0,
    upper_fps: 58.0,
    sample_window_ms: 1000,
    cooldown_ms: 2000,
    flipflops: 3,
});

impl MonitorConfig {
    pub fn validate(&self) -> ConfigResult<()> {
        if self.lower_fps <= 0.0 || self.lower_fps >= self.upper_fps {
            return Err(ConfigError::Invalid(format!(
                "monitor bounds [{}, {}]",
                self.lower_fps, self.upper_fps
            )));
        }
        if self.sample_window_ms == 0 {
            return Err(ConfigError::Invalid("monitor sample window must be non-zero".to_string()));
        }
        Ok(())
    }
}
