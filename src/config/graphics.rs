use super::{ConfigError, ConfigResult};
use crate::impl_default;
use crate::render::quality::QualityTier;
use serde::{Deserialize, Serialize};

/// 图形配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GraphicsConfig {
    /// 画布分辨率（CSS 像素）
    pub resolution: Resolution,

    /// 后端偏好
    pub backend: BackendPreference,

    /// 适配器功耗偏好
    pub power_preference: PowerPreference,

    /// 抗锯齿
    pub antialias: bool,

    /// 初始质量等级
    pub quality: QualityTier,

    /// 设备像素比
    pub pixel_ratio: PixelRatioConfig,

    /// 是否启用延迟渲染（分配 G-Buffer）
    pub deferred: bool,

    /// 显存预算（MB），用于 `PerformanceMetrics::memory_total`
    pub memory_budget_mb: u64,
}

impl_default!(GraphicsConfig {
    resolution: Resolution::default(),
    backend: BackendPreference::Auto,
    power_preference: PowerPreference::HighPerformance,
    antialias: true,
    quality: QualityTier::High,
    pixel_ratio: PixelRatioConfig::default(),
    deferred: false,
    memory_budget_mb: 512,
});

impl GraphicsConfig {
    /// 验证配置
    pub fn validate(&self) -> ConfigResult<()> {
        if self.resolution.width == 0 || self.resolution.height == 0 {
            return Err(ConfigError::Invalid("resolution must be non-zero".to_string()));
        }
        self.pixel_ratio.validate()
    }
}

/// 分辨率
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Resolution {
    /// 宽度（像素）
    pub width: u32,
    /// 高度（像素）
    pub height: u32,
}

impl_default!(Resolution {
    width: 1280,
    height: 720,
});

/// 后端偏好
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendPreference {
    /// 优先 WebGPU，失败时回退到 WebGL
    Auto,
    /// 仅 WebGPU
    WebGpu,
    /// 仅 WebGL
    WebGl,
}

/// 功耗偏好
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PowerPreference {
    LowPower,
    HighPerformance,
}

impl From<PowerPreference> for wgpu::PowerPreference {
    fn from(value: PowerPreference) -> Self {
        match value {
            PowerPreference::LowPower => wgpu::PowerPreference::LowPower,
            PowerPreference::HighPerformance => wgpu::PowerPreference::HighPerformance,
        }
    }
}

/// 设备像素比范围
///
/// `Scene3D` 是唯一写入者，按 `step` 在 `[min, max]` 内调整。
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PixelRatioConfig {
    pub min: f32,
    pub max: f32,
    pub initial: f32,
    pub step: f32,
}

impl_default!(PixelRatioConfig {
    min: 0.5,
    max: 2.0,
    initial: 1.5,
    step: 0.5,
});

impl PixelRatioConfig {
    pub fn validate(&self) -> ConfigResult<()> {
        if self.min <= 0.0 || self.min > self.max {
            return Err(ConfigError::Invalid(format!(
                "pixel ratio bounds [{}, {}]",
                self.min, self.max
            )));
        }
        if self.step <= 0.0 {
            return Err(ConfigError::Invalid("pixel ratio step must be positive".to_string()));
        }
        if self.initial < self.min || self.initial > self.max {
            return Err(ConfigError::Invalid(format!(
                "initial pixel ratio {} outside [{}, {}]",
                self.initial, self.min, self.max
            )));
        }
        Ok(())
    }

    /// 吸附到最近的步进值并夹紧到范围内
    pub fn snap(&self, dpr: f32) -> f32 {
        let steps = ((dpr - self.min) / self.step).round();
        (self.min + steps * self.step).clamp(self.min, self.max)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pixel_ratio_snap() {
        let dpr = PixelRatioConfig::default();
        assert_eq!(dpr.snap(1.3), 1.5);
        assert_eq!(dpr.snap(0.1), 0.5);
        assert_eq!(dpr.snap(3.7), 2.0);
        assert_eq!(dpr.snap(1.0), 1.0);
    }

    #[test]
    fn test_invalid_resolution() {
        let mut config = GraphicsConfig::default();
        config.resolution.width = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_invalid_pixel_ratio() {
        let mut config = GraphicsConfig::default();
        config.pixel_ratio.initial = 4.0;
        assert!(config.validate().is_err());
    }
}
