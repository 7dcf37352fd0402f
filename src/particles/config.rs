//! 粒子配置
//!
//! 三种粒子策略共用 [`ParticleConfig`]（发射、寿命、颜色、物理）；
//! GPU 与交互策略在其上添加各自的字段。

use crate::core::error::{ParticleError, ParticleResult};
use crate::core::utils::parse_hex_color;
use crate::render::backend::BlendMode;
use crate::impl_default;
use glam::{Vec3, Vec4};
use serde::{Deserialize, Serialize};

/// 发射形状
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmissionShape {
    #[default]
    Point,
    Sphere,
    Box,
    Cone,
    Disk,
    Ring,
    Torus,
}

/// 颜色模式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColorMode {
    /// 只用第一种颜色
    #[default]
    Solid,
    /// 在调色板上随机插值
    Gradient,
    /// 从调色板中随机挑选
    Random,
}

/// 粒子混合方式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParticleBlending {
    Normal,
    #[default]
    Additive,
    Multiply,
    Screen,
}

impl From<ParticleBlending> for BlendMode {
    fn from(blending: ParticleBlending) -> Self {
        match blending {
            ParticleBlending::Normal => BlendMode::Alpha,
            ParticleBlending::Additive => BlendMode::Additive,
            ParticleBlending::Multiply => BlendMode::Multiply,
            ParticleBlending::Screen => BlendMode::Screen,
        }
    }
}

/// 粒子配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ParticleConfig {
    /// 粒子数量（构造后不可变）
    pub count: usize,
    /// 基础尺寸（着色器 `uPointSize`）
    pub size: f32,
    pub size_range: [f32; 2],
    /// 十六进制颜色调色板
    pub colors: Vec<String>,
    pub color_mode: ColorMode,
    pub opacity: f32,
    pub speed_range: [f32; 2],
    /// 名义寿命；补丁只给出它时寿命区间收缩为 `[lifetime, lifetime]`
    pub lifetime: f32,
    pub lifetime_range: [f32; 2],
    /// 每秒发射数（固定容量的池按寿命回收，此值供按速率发射的调用方参考）
    pub emission_rate: f32,
    pub emission_shape: EmissionShape,
    pub emission_radius: f32,
    /// 盒形发射的尺寸
    pub emission_size: Vec3,
    pub gravity: Vec3,
    pub wind: Vec3,
    pub turbulence: f32,
    pub blending: ParticleBlending,
    /// 随机种子（测试可复现）
    pub seed: Option<u64>,
}

impl_default!(ParticleConfig {
    count: 10_000,
    size: 0.1,
    size_range: [0.05, 0.15],
    colors: vec!["#ffffff".to_string()],
    color_mode: ColorMode::Solid,
    opacity: 1.0,
    speed_range: [0.5, 1.5],
    lifetime: 3.0,
    lifetime_range: [2.0, 4.0],
    emission_rate: 100.0,
    emission_shape: EmissionShape::Point,
    emission_radius: 1.0,
    emission_size: Vec3::ONE,
    gravity: Vec3::new(0.0, -0.5, 0.0),
    wind: Vec3::ZERO,
    turbulence: 0.5,
    blending: ParticleBlending::Additive,
    seed: None,
});

fn check_range(field: &'static str, range: [f32; 2]) -> ParticleResult<()> {
    let [min, max] = range;
    if !min.is_finite() || !max.is_finite() || min < 0.0 || min > max {
        return Err(ParticleError::InvalidRange { field, min, max });
    }
    Ok(())
}

impl ParticleConfig {
    pub fn validate(&self) -> ParticleResult<()> {
        if self.count == 0 {
            return Err(ParticleError::EmptyArena);
        }
        check_range("size_range", self.size_range)?;
        check_range("speed_range", self.speed_range)?;
        check_range("lifetime_range", self.lifetime_range)?;
        if self.lifetime_range[1] <= 0.0 {
            return Err(ParticleError::InvalidRange {
                field: "lifetime_range",
                min: self.lifetime_range[0],
                max: self.lifetime_range[1],
            });
        }
        self.palette().map(|_| ())
    }

    /// 解析后的调色板（至少一种颜色）
    pub fn palette(&self) -> ParticleResult<Vec<Vec3>> {
        if self.colors.is_empty() {
            return Err(ParticleError::InvalidColor("empty palette".to_string()));
        }
        self.colors
            .iter()
            .map(|hex| parse_hex_color(hex).ok_or_else(|| ParticleError::InvalidColor(hex.clone())))
            .collect()
    }

    /// 应用补丁
    pub fn merged(&self, patch: &ParticleConfigPatch) -> ParticleConfig {
        let mut config = self.clone();
        macro_rules! apply {
            ($($field:ident),*) => {
                $(if let Some(value) = &patch.$field {
                    config.$field = value.clone();
                })*
            };
        }
        apply!(
            count, size, size_range, colors, color_mode, opacity, speed_range, lifetime_range,
            emission_rate, emission_shape, emission_radius, emission_size, gravity, wind, turbulence,
            blending
        );
        if let Some(lifetime) = patch.lifetime {
            config.lifetime = lifetime;
            if patch.lifetime_range.is_none() {
                config.lifetime_range = [lifetime, lifetime];
            }
        }
        if patch.seed.is_some() {
            config.seed = patch.seed;
        }
        config
    }
}

/// 配置补丁：每个字段可选，覆盖预设中的对应字段
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ParticleConfigPatch {
    pub count: Option<usize>,
    pub size: Option<f32>,
    pub size_range: Option<[f32; 2]>,
    pub colors: Option<Vec<String>>,
    pub color_mode: Option<ColorMode>,
    pub opacity: Option<f32>,
    pub speed_range: Option<[f32; 2]>,
    pub lifetime: Option<f32>,
    pub lifetime_range: Option<[f32; 2]>,
    pub emission_rate: Option<f32>,
    pub emission_shape: Option<EmissionShape>,
    pub emission_radius: Option<f32>,
    pub emission_size: Option<Vec3>,
    pub gravity: Option<Vec3>,
    pub wind: Option<Vec3>,
    pub turbulence: Option<f32>,
    pub blending: Option<ParticleBlending>,
    pub seed: Option<u64>,
}

/// GPU 计算粒子配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GpuParticleConfig {
    #[serde(flatten)]
    pub base: ParticleConfig,
    /// 重生发射体积的中心，形状取 `base.emission_shape`
    pub emitter_position: Vec3,
    /// 每步速度衰减系数
    pub damping: f32,
    /// 轴对齐边界的半尺寸
    pub bounds: Vec3,
    /// 碰到边界时的反弹系数
    pub restitution: f32,
    /// 寿命结束时的颜色（起始颜色为调色板第一种）
    pub end_color: String,
    pub mass: f32,
}

impl_default!(GpuParticleConfig {
    base: ParticleConfig {
        count: 100_000,
        emission_shape: EmissionShape::Sphere,
        ..ParticleConfig::default()
    },
    emitter_position: Vec3::ZERO,
    damping: 0.98,
    bounds: Vec3::splat(10.0),
    restitution: 0.6,
    end_color: "#8b5cf6".to_string(),
    mass: 1.0,
});

impl GpuParticleConfig {
    pub fn validate(&self) -> ParticleResult<()> {
        self.base.validate()?;
        if u32::try_from(self.base.count).is_err() {
            return Err(ParticleError::InvalidRange {
                field: "count",
                min: 1.0,
                max: self.base.count as f32,
            });
        }
        self.colors().map(|_| ())
    }

    /// (起始颜色, 结束颜色)，alpha 分别为 `opacity` 与 0
    pub fn colors(&self) -> ParticleResult<(Vec4, Vec4)> {
        let start = self.base.palette()?[0];
        let end = parse_hex_color(&self.end_color)
            .ok_or_else(|| ParticleError::InvalidColor(self.end_color.clone()))?;
        Ok((start.extend(self.base.opacity), end.extend(0.0)))
    }
}

/// 指针交互类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InteractionType {
    #[default]
    Attract,
    Repel,
    Orbit,
    Follow,
}

impl InteractionType {
    /// 着色器中的整数编码
    pub fn code(&self) -> i32 {
        match self {
            InteractionType::Attract => 0,
            InteractionType::Repel => 1,
            InteractionType::Orbit => 2,
            InteractionType::Follow => 3,
        }
    }
}

/// 指针交互粒子配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InteractiveParticleConfig {
    #[serde(flatten)]
    pub base: ParticleConfig,
    pub interaction_radius: f32,
    pub interaction_strength: f32,
    pub interaction_type: InteractionType,
    /// 回到原位的弹簧角频率（临界阻尼）
    pub return_speed: f32,
    /// 寿命无限（默认）；关闭时按寿命区间重生
    pub infinite_life: bool,
    /// 指针投射平面 `n·p + d = 0`
    pub plane_normal: Vec3,
    pub plane_constant: f32,
}

impl_default!(InteractiveParticleConfig {
    base: ParticleConfig {
        count: 5_000,
        emission_shape: EmissionShape::Box,
        emission_size: Vec3::new(10.0, 6.0, 2.0),
        gravity: Vec3::ZERO,
        turbulence: 0.2,
        ..ParticleConfig::default()
    },
    interaction_radius: 2.0,
    interaction_strength: 1.0,
    interaction_type: InteractionType::Attract,
    return_speed: 4.0,
    infinite_life: true,
    plane_normal: Vec3::Z,
    plane_constant: 0.0,
});

impl InteractiveParticleConfig {
    pub fn validate(&self) -> ParticleResult<()> {
        self.base.validate()?;
        if self.interaction_radius <= 0.0 || !self.interaction_radius.is_finite() {
            return Err(ParticleError::InvalidRange {
                field: "interaction_radius",
                min: 0.0,
                max: self.interaction_radius,
            });
        }
        if self.return_speed < 0.0 {
            return Err(ParticleError::InvalidRange {
                field: "return_speed",
                min: 0.0,
                max: self.return_speed,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_validate() {
        assert!(ParticleConfig::default().validate().is_ok());
        assert!(GpuParticleConfig::default().validate().is_ok());
        assert!(InteractiveParticleConfig::default().validate().is_ok());
    }

    #[test]
    fn test_validation_errors() {
        let empty = ParticleConfig {
            count: 0,
            ..ParticleConfig::default()
        };
        assert_eq!(empty.validate(), Err(ParticleError::EmptyArena));

        let inverted = ParticleConfig {
            lifetime_range: [4.0, 2.0],
            ..ParticleConfig::default()
        };
        assert!(matches!(
            inverted.validate(),
            Err(ParticleError::InvalidRange { field: "lifetime_range", .. })
        ));

        let zero_life = ParticleConfig {
            lifetime_range: [0.0, 0.0],
            ..ParticleConfig::default()
        };
        assert!(zero_life.validate().is_err());

        let bad_color = ParticleConfig {
            colors: vec!["red".to_string()],
            ..ParticleConfig::default()
        };
        assert_eq!(bad_color.validate(), Err(ParticleError::InvalidColor("red".to_string())));
    }

    #[test]
    fn test_lifetime_patch_collapses_range() {
        let config = ParticleConfig::default().merged(&ParticleConfigPatch {
            lifetime: Some(999.0),
            ..Default::default()
        });
        assert_eq!(config.lifetime_range, [999.0, 999.0]);

        let config = ParticleConfig::default().merged(&ParticleConfigPatch {
            lifetime: Some(2.0),
            lifetime_range: Some([1.0, 3.0]),
            ..Default::default()
        });
        assert_eq!(config.lifetime_range, [1.0, 3.0]);
    }

    #[test]
    fn test_patch_deserializes_partial_json() {
        let patch: ParticleConfigPatch =
            serde_json::from_str(r#"{"count": 42, "emission_shape": "torus", "gravity": [0.0, 1.0, 0.0]}"#).unwrap();
        let config = ParticleConfig::default().merged(&patch);
        assert_eq!(config.count, 42);
        assert_eq!(config.emission_shape, EmissionShape::Torus);
        assert_eq!(config.gravity, Vec3::Y);
        assert_eq!(config.size, 0.1);
    }

    #[test]
    fn test_gpu_colors() {
        let (start, end) = GpuParticleConfig::default().colors().unwrap();
        assert_eq!(start, Vec4::ONE);
        assert_eq!(end.w, 0.0);
    }
}
