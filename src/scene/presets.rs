//! 场景与环境预设
//!
//! `Scene3DPreset` 组合相机、环境、控制器、后处理预设与初始 DPR；
//! `EnvironmentPreset` 给出光照装置与清屏色。

use super::controls::OrbitControlsConfig;
use crate::core::utils::parse_hex_color;
use crate::render::lighting::{Light, LightingRig};
use crate::render::postprocess::PostProcessPreset;
use glam::Vec3;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

fn hex(color: &str) -> Vec3 {
    parse_hex_color(color).unwrap_or(Vec3::ONE)
}

/// 环境预设
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EnvironmentPreset {
    Night,
    City,
    Sunset,
    Studio,
}

impl EnvironmentPreset {
    pub const ALL: [EnvironmentPreset; 4] = [
        EnvironmentPreset::Night,
        EnvironmentPreset::City,
        EnvironmentPreset::Sunset,
        EnvironmentPreset::Studio,
    ];

    pub fn key(&self) -> &'static str {
        match self {
            EnvironmentPreset::Night => "night",
            EnvironmentPreset::City => "city",
            EnvironmentPreset::Sunset => "sunset",
            EnvironmentPreset::Studio => "studio",
        }
    }

    /// 环境对应的光照装置（主光总是投射阴影）
    pub fn rig(&self) -> LightingRig {
        let key_position = Vec3::new(5.0, 10.0, 5.0);
        match self {
            EnvironmentPreset::Night => LightingRig::new(hex("#1e1b4b"), 0.3)
                .with_light(Light::directional(hex("#a5b4fc"), 0.6, key_position).with_shadow(true))
                .with_light(Light::point(hex("#8b5cf6"), 0.5, Vec3::new(-5.0, 3.0, -5.0), 20.0))
                .with_light(Light::point(hex("#06b6d4"), 0.5, Vec3::new(5.0, -3.0, 5.0), 20.0)),
            EnvironmentPreset::City => LightingRig::new(Vec3::ONE, 0.5)
                .with_light(Light::directional(hex("#fff4e6"), 1.0, key_position).with_shadow(true))
                .with_light(Light::point(hex("#60a5fa"), 0.4, Vec3::new(-6.0, 4.0, 2.0), 25.0))
                .with_light(Light::point(hex("#f59e0b"), 0.3, Vec3::new(6.0, 2.0, -4.0), 25.0)),
            EnvironmentPreset::Sunset => LightingRig::new(hex("#fed7aa"), 0.4)
                .with_light(Light::directional(hex("#fb923c"), 1.2, Vec3::new(-8.0, 4.0, 6.0)).with_shadow(true))
                .with_light(Light::point(hex("#f43f5e"), 0.4, Vec3::new(5.0, 2.0, -5.0), 20.0))
                .with_light(Light::point(hex("#a855f7"), 0.3, Vec3::new(-5.0, 5.0, -5.0), 20.0)),
            EnvironmentPreset::Studio => LightingRig::new(Vec3::ONE, 0.6)
                .with_light(Light::directional(Vec3::ONE, 1.0, key_position).with_shadow(true))
                .with_light(Light::point(Vec3::ONE, 0.3, Vec3::new(-5.0, 5.0, 5.0), 30.0))
                .with_light(Light::point(Vec3::ONE, 0.3, Vec3::new(5.0, 5.0, -5.0), 30.0)),
        }
    }

    /// 清屏色（RGBA）
    pub fn clear_color(&self) -> [f32; 4] {
        let color = match self {
            EnvironmentPreset::Night => hex("#030014"),
            EnvironmentPreset::City => hex("#0f172a"),
            EnvironmentPreset::Sunset => hex("#1c0a1f"),
            EnvironmentPreset::Studio => hex("#111111"),
        };
        [color.x, color.y, color.z, 1.0]
    }
}

impl fmt::Display for EnvironmentPreset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

impl FromStr for EnvironmentPreset {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EnvironmentPreset::ALL
            .into_iter()
            .find(|preset| preset.key().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("unknown environment preset `{s}`"))
    }
}

/// `Scene3D` 的完整配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scene3DConfig {
    pub camera_position: Vec3,
    /// 垂直视场角（度）
    pub fov: f32,
    pub environment: EnvironmentPreset,
    /// `None` 表示不挂载控制器
    pub controls: Option<OrbitControlsConfig>,
    pub post_processing: PostProcessPreset,
    pub initial_dpr: f32,
    /// 是否根据性能监视器调整 DPR
    pub adaptive: bool,
}

/// 命名场景预设
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scene3DPreset {
    Dashboard,
    Hero,
    Ambient,
    Minimal,
}

impl Scene3DPreset {
    pub const ALL: [Scene3DPreset; 4] = [
        Scene3DPreset::Dashboard,
        Scene3DPreset::Hero,
        Scene3DPreset::Ambient,
        Scene3DPreset::Minimal,
    ];

    pub fn key(&self) -> &'static str {
        match self {
            Scene3DPreset::Dashboard => "dashboard",
            Scene3DPreset::Hero => "hero",
            Scene3DPreset::Ambient => "ambient",
            Scene3DPreset::Minimal => "minimal",
        }
    }

    pub fn config(&self) -> Scene3DConfig {
        match self {
            Scene3DPreset::Dashboard => Scene3DConfig {
                camera_position: Vec3::new(0.0, 2.0, 8.0),
                fov: 50.0,
                environment: EnvironmentPreset::Night,
                controls: Some(OrbitControlsConfig {
                    auto_rotate: true,
                    auto_rotate_speed: 0.5,
                    enable_zoom: false,
                    ..Default::default()
                }),
                post_processing: PostProcessPreset::Cinematic,
                initial_dpr: 1.5,
                adaptive: true,
            },
            Scene3DPreset::Hero => Scene3DConfig {
                camera_position: Vec3::new(0.0, 0.0, 6.0),
                fov: 45.0,
                environment: EnvironmentPreset::Sunset,
                controls: Some(OrbitControlsConfig {
                    auto_rotate: true,
                    auto_rotate_speed: 1.0,
                    enable_zoom: false,
                    ..Default::default()
                }),
                post_processing: PostProcessPreset::Cyberpunk,
                initial_dpr: 2.0,
                adaptive: true,
            },
            Scene3DPreset::Ambient => Scene3DConfig {
                camera_position: Vec3::new(0.0, 0.0, 10.0),
                fov: 60.0,
                environment: EnvironmentPreset::Night,
                controls: None,
                post_processing: PostProcessPreset::Dreamy,
                initial_dpr: 1.0,
                adaptive: true,
            },
            Scene3DPreset::Minimal => Scene3DConfig {
                camera_position: Vec3::new(0.0, 0.0, 5.0),
                fov: 75.0,
                environment: EnvironmentPreset::Studio,
                controls: None,
                post_processing: PostProcessPreset::Minimal,
                initial_dpr: 1.0,
                adaptive: false,
            },
        }
    }
}

impl fmt::Display for Scene3DPreset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

impl FromStr for Scene3DPreset {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Scene3DPreset::ALL
            .into_iter()
            .find(|preset| preset.key().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("unknown scene preset `{s}`"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_preset_keys_parse() {
        for preset in Scene3DPreset::ALL {
            assert_eq!(preset.key().parse::<Scene3DPreset>(), Ok(preset));
        }
        for preset in EnvironmentPreset::ALL {
            assert_eq!(preset.to_string().parse::<EnvironmentPreset>(), Ok(preset));
        }
        assert!("lobby".parse::<Scene3DPreset>().is_err());
    }

    #[test]
    fn test_environment_rigs_cast_one_shadow() {
        for preset in EnvironmentPreset::ALL {
            let rig = preset.rig();
            assert_eq!(rig.lights().iter().filter(|l| l.cast_shadow).count(), 1, "{preset}");
            assert_eq!(preset.clear_color()[3], 1.0);
        }
    }

    #[test]
    fn test_initial_dpr_on_step_grid() {
        let dpr = crate::config::PixelRatioConfig::default();
        for preset in Scene3DPreset::ALL {
            let config = preset.config();
            assert_eq!(dpr.snap(config.initial_dpr), config.initial_dpr, "{preset}");
        }
        assert!(Scene3DPreset::Minimal.config().controls.is_none());
    }
}
