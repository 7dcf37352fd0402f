//! 粒子预设
//!
//! 八个命名配置（火焰、雪、星空、闪光、尘埃、彩纸、魔法、能量），
//! 以补丁形式叠加在默认配置上；调用方的覆盖项再叠加在预设上。

use super::config::{ColorMode, EmissionShape, ParticleBlending, ParticleConfig, ParticleConfigPatch};
use super::cpu::ParticleSystem;
use crate::core::error::{EngineResult, ParticleError};
use glam::Vec3;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// 命名粒子预设
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParticlePreset {
    Fire,
    Snow,
    Stars,
    Sparkles,
    Dust,
    Confetti,
    Magic,
    Energy,
}

fn colors(hex: &[&str]) -> Option<Vec<String>> {
    Some(hex.iter().map(|c| c.to_string()).collect())
}

impl ParticlePreset {
    pub const ALL: [ParticlePreset; 8] = [
        ParticlePreset::Fire,
        ParticlePreset::Snow,
        ParticlePreset::Stars,
        ParticlePreset::Sparkles,
        ParticlePreset::Dust,
        ParticlePreset::Confetti,
        ParticlePreset::Magic,
        ParticlePreset::Energy,
    ];

    pub fn key(&self) -> &'static str {
        match self {
            ParticlePreset::Fire => "fire",
            ParticlePreset::Snow => "snow",
            ParticlePreset::Stars => "stars",
            ParticlePreset::Sparkles => "sparkles",
            ParticlePreset::Dust => "dust",
            ParticlePreset::Confetti => "confetti",
            ParticlePreset::Magic => "magic",
            ParticlePreset::Energy => "energy",
        }
    }

    /// 预设相对默认配置的差异
    pub fn patch(&self) -> ParticleConfigPatch {
        match self {
            ParticlePreset::Fire => ParticleConfigPatch {
                count: Some(5000),
                size: Some(0.15),
                size_range: Some([0.1, 0.2]),
                colors: colors(&["#ff4400", "#ff8800", "#ffcc00"]),
                color_mode: Some(ColorMode::Gradient),
                lifetime: Some(2.0),
                lifetime_range: Some([1.0, 3.0]),
                emission_shape: Some(EmissionShape::Cone),
                emission_radius: Some(0.3),
                gravity: Some(Vec3::new(0.0, 1.0, 0.0)),
                turbulence: Some(0.8),
                blending: Some(ParticleBlending::Additive),
                ..Default::default()
            },
            ParticlePreset::Snow => ParticleConfigPatch {
                count: Some(10_000),
                size: Some(0.05),
                size_range: Some([0.03, 0.08]),
                colors: colors(&["#ffffff"]),
                lifetime: Some(8.0),
                lifetime_range: Some([6.0, 10.0]),
                emission_shape: Some(EmissionShape::Box),
                emission_size: Some(Vec3::new(20.0, 0.0, 20.0)),
                gravity: Some(Vec3::new(0.0, -0.5, 0.0)),
                wind: Some(Vec3::new(0.2, 0.0, 0.1)),
                turbulence: Some(0.3),
                blending: Some(ParticleBlending::Normal),
                ..Default::default()
            },
            ParticlePreset::Stars => ParticleConfigPatch {
                count: Some(2000),
                size: Some(0.08),
                size_range: Some([0.05, 0.12]),
                colors: colors(&["#ffffff", "#aaccff", "#ffddaa"]),
                color_mode: Some(ColorMode::Random),
                lifetime: Some(999.0),
                emission_shape: Some(EmissionShape::Sphere),
                emission_radius: Some(50.0),
                gravity: Some(Vec3::ZERO),
                turbulence: Some(0.0),
                blending: Some(ParticleBlending::Additive),
                ..Default::default()
            },
            ParticlePreset::Sparkles => ParticleConfigPatch {
                count: Some(3000),
                size: Some(0.06),
                size_range: Some([0.03, 0.1]),
                colors: colors(&["#6600ff", "#ff00ff", "#00ffff"]),
                color_mode: Some(ColorMode::Random),
                lifetime: Some(2.0),
                lifetime_range: Some([1.0, 3.0]),
                emission_shape: Some(EmissionShape::Sphere),
                emission_radius: Some(2.0),
                gravity: Some(Vec3::new(0.0, -0.2, 0.0)),
                turbulence: Some(1.0),
                blending: Some(ParticleBlending::Additive),
                ..Default::default()
            },
            ParticlePreset::Dust => ParticleConfigPatch {
                count: Some(8000),
                size: Some(0.02),
                size_range: Some([0.01, 0.03]),
                colors: colors(&["#888888"]),
                lifetime: Some(10.0),
                lifetime_range: Some([8.0, 12.0]),
                emission_shape: Some(EmissionShape::Box),
                emission_size: Some(Vec3::new(10.0, 5.0, 10.0)),
                gravity: Some(Vec3::new(0.0, 0.05, 0.0)),
                wind: Some(Vec3::new(0.1, 0.0, 0.05)),
                turbulence: Some(0.5),
                blending: Some(ParticleBlending::Normal),
                ..Default::default()
            },
            ParticlePreset::Confetti => ParticleConfigPatch {
                count: Some(5000),
                size: Some(0.1),
                size_range: Some([0.08, 0.15]),
                colors: colors(&["#ff0000", "#00ff00", "#0000ff", "#ffff00", "#ff00ff", "#00ffff"]),
                color_mode: Some(ColorMode::Random),
                lifetime: Some(5.0),
                lifetime_range: Some([4.0, 6.0]),
                emission_shape: Some(EmissionShape::Point),
                gravity: Some(Vec3::new(0.0, -2.0, 0.0)),
                turbulence: Some(0.5),
                blending: Some(ParticleBlending::Normal),
                ..Default::default()
            },
            ParticlePreset::Magic => ParticleConfigPatch {
                count: Some(4000),
                size: Some(0.08),
                size_range: Some([0.05, 0.12]),
                colors: colors(&["#8844ff", "#ff44aa", "#44ffff"]),
                color_mode: Some(ColorMode::Gradient),
                lifetime: Some(3.0),
                lifetime_range: Some([2.0, 4.0]),
                emission_shape: Some(EmissionShape::Ring),
                emission_radius: Some(1.0),
                gravity: Some(Vec3::new(0.0, 0.5, 0.0)),
                turbulence: Some(1.2),
                blending: Some(ParticleBlending::Additive),
                ..Default::default()
            },
            ParticlePreset::Energy => ParticleConfigPatch {
                count: Some(6000),
                size: Some(0.05),
                size_range: Some([0.03, 0.08]),
                colors: colors(&["#00ffff", "#0088ff", "#ffffff"]),
                color_mode: Some(ColorMode::Gradient),
                lifetime: Some(1.5),
                lifetime_range: Some([1.0, 2.0]),
                emission_shape: Some(EmissionShape::Sphere),
                emission_radius: Some(0.5),
                gravity: Some(Vec3::ZERO),
                turbulence: Some(2.0),
                blending: Some(ParticleBlending::Additive),
                ..Default::default()
            },
        }
    }

    /// 完整配置
    pub fn config(&self) -> ParticleConfig {
        ParticleConfig::default().merged(&self.patch())
    }
}

impl fmt::Display for ParticlePreset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

impl FromStr for ParticlePreset {
    type Err = ParticleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ParticlePreset::ALL
            .into_iter()
            .find(|preset| preset.key().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| ParticleError::UnknownPreset(s.to_string()))
    }
}

/// 按预设创建粒子系统，`overrides` 覆盖预设中的字段
pub fn create_particle_system(preset: ParticlePreset, overrides: &ParticleConfigPatch) -> EngineResult<ParticleSystem> {
    let config = preset.config().merged(overrides);
    tracing::debug!(target: "chronos::particles", preset = %preset, count = config.count, "creating particle preset");
    ParticleSystem::new(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_presets_validate() {
        for preset in ParticlePreset::ALL {
            let config = preset.config();
            assert!(config.validate().is_ok(), "{preset}");
            assert_eq!(preset.key().parse::<ParticlePreset>(), Ok(preset));
        }
    }

    #[test]
    fn test_preset_values() {
        let fire = ParticlePreset::Fire.config();
        assert_eq!(fire.count, 5000);
        assert_eq!(fire.emission_shape, EmissionShape::Cone);
        assert_eq!(fire.colors.len(), 3);

        let stars = ParticlePreset::Stars.config();
        assert_eq!(stars.lifetime_range, [999.0, 999.0]);
        assert_eq!(stars.emission_radius, 50.0);

        let snow = ParticlePreset::Snow.config();
        assert_eq!(snow.blending, ParticleBlending::Normal);
        assert_eq!(snow.wind, Vec3::new(0.2, 0.0, 0.1));
    }

    #[test]
    fn test_unknown_preset() {
        assert_eq!(
            "plasma".parse::<ParticlePreset>(),
            Err(ParticleError::UnknownPreset("plasma".to_string()))
        );
        assert_eq!(" Magic ".parse::<ParticlePreset>(), Ok(ParticlePreset::Magic));
    }

    #[test]
    fn test_overrides_win_over_preset() {
        let system = create_particle_system(
            ParticlePreset::Confetti,
            &ParticleConfigPatch {
                count: Some(16),
                seed: Some(5),
                ..Default::default()
            },
        )
        .unwrap();
        assert_eq!(system.count(), 16);
        assert_eq!(system.config().gravity, Vec3::new(0.0, -2.0, 0.0));
    }
}
