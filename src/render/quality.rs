//! 渲染质量等级
//!
//! `QualityLevel` 是渲染管线与后端共同读取的质量参数集合；
//! `QualityPatch` 用于部分更新（合并到当前等级上）。

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// 纹理质量
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TextureQuality {
    Low,
    Medium,
    High,
}

/// 质量等级
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityLevel {
    pub name: String,
    /// 渲染目标相对画布尺寸的缩放
    pub resolution_scale: f32,
    pub shadows: bool,
    /// 阴影贴图边长（像素）
    pub shadow_map_size: u32,
    pub antialiasing: bool,
    pub post_processing: bool,
    /// 粒子数量上限（仅在创建粒子策略时读取）
    pub particle_count: u32,
    pub lod_bias: f32,
    pub texture_quality: TextureQuality,
    pub reflections: bool,
    pub ambient_occlusion: bool,
}

impl QualityLevel {
    /// 合并部分更新，返回新的等级
    pub fn merged(&self, patch: &QualityPatch) -> QualityLevel {
        QualityLevel {
            name: patch.name.clone().unwrap_or_else(|| self.name.clone()),
            resolution_scale: patch.resolution_scale.unwrap_or(self.resolution_scale),
            shadows: patch.shadows.unwrap_or(self.shadows),
            shadow_map_size: patch.shadow_map_size.unwrap_or(self.shadow_map_size),
            antialiasing: patch.antialiasing.unwrap_or(self.antialiasing),
            post_processing: patch.post_processing.unwrap_or(self.post_processing),
            particle_count: patch.particle_count.unwrap_or(self.particle_count),
            lod_bias: patch.lod_bias.unwrap_or(self.lod_bias),
            texture_quality: patch.texture_quality.unwrap_or(self.texture_quality),
            reflections: patch.reflections.unwrap_or(self.reflections),
            ambient_occlusion: patch.ambient_occlusion.unwrap_or(self.ambient_occlusion),
        }
    }

    /// 阴影贴图是否需要重建
    pub fn shadow_maps_differ(&self, other: &QualityLevel) -> bool {
        self.shadows != other.shadows || self.shadow_map_size != other.shadow_map_size
    }
}

impl Default for QualityLevel {
    fn default() -> Self {
        QualityTier::High.level()
    }
}

/// 质量等级的部分更新
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QualityPatch {
    pub name: Option<String>,
    pub resolution_scale: Option<f32>,
    pub shadows: Option<bool>,
    pub shadow_map_size: Option<u32>,
    pub antialiasing: Option<bool>,
    pub post_processing: Option<bool>,
    pub particle_count: Option<u32>,
    pub lod_bias: Option<f32>,
    pub texture_quality: Option<TextureQuality>,
    pub reflections: Option<bool>,
    pub ambient_occlusion: Option<bool>,
}

impl QualityPatch {
    pub fn shadow_map_size(size: u32) -> Self {
        Self {
            shadow_map_size: Some(size),
            ..Self::default()
        }
    }
}

impl From<QualityLevel> for QualityPatch {
    fn from(level: QualityLevel) -> Self {
        Self {
            name: Some(level.name),
            resolution_scale: Some(level.resolution_scale),
            shadows: Some(level.shadows),
            shadow_map_size: Some(level.shadow_map_size),
            antialiasing: Some(level.antialiasing),
            post_processing: Some(level.post_processing),
            particle_count: Some(level.particle_count),
            lod_bias: Some(level.lod_bias),
            texture_quality: Some(level.texture_quality),
            reflections: Some(level.reflections),
            ambient_occlusion: Some(level.ambient_occlusion),
        }
    }
}

/// 命名质量档位
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QualityTier {
    Low,
    Medium,
    High,
    Ultra,
}

impl QualityTier {
    pub const ALL: [QualityTier; 4] = [
        QualityTier::Low,
        QualityTier::Medium,
        QualityTier::High,
        QualityTier::Ultra,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            QualityTier::Low => "low",
            QualityTier::Medium => "medium",
            QualityTier::High => "high",
            QualityTier::Ultra => "ultra",
        }
    }

    /// 档位对应的完整质量参数
    pub fn level(&self) -> QualityLevel {
        let (scale, shadows, shadow_map_size, aa, post, particles, lod, texture, refl, ao) =
            match self {
                QualityTier::Low => (0.5, false, 512, false, false, 1_000, 2.0, TextureQuality::Low, false, false),
                QualityTier::Medium => (0.75, true, 1024, true, true, 5_000, 1.0, TextureQuality::Medium, false, false),
                QualityTier::High => (1.0, true, 2048, true, true, 10_000, 0.0, TextureQuality::High, true, false),
                QualityTier::Ultra => (1.0, true, 4096, true, true, 50_000, -0.5, TextureQuality::High, true, true),
            };
        QualityLevel {
            name: self.name().to_string(),
            resolution_scale: scale,
            shadows,
            shadow_map_size,
            antialiasing: aa,
            post_processing: post,
            particle_count: particles,
            lod_bias: lod,
            texture_quality: texture,
            reflections: refl,
            ambient_occlusion: ao,
        }
    }

    /// DPR 到档位的映射：0.5 → low, 1.0 → medium, 1.5 → high, 2.0 → ultra
    pub fn from_dpr(dpr: f32) -> QualityTier {
        if dpr < 0.75 {
            QualityTier::Low
        } else if dpr < 1.25 {
            QualityTier::Medium
        } else if dpr < 1.75 {
            QualityTier::High
        } else {
            QualityTier::Ultra
        }
    }

    /// 档位对应的 DPR
    pub fn dpr(&self) -> f32 {
        match self {
            QualityTier::Low => 0.5,
            QualityTier::Medium => 1.0,
            QualityTier::High => 1.5,
            QualityTier::Ultra => 2.0,
        }
    }
}

impl fmt::Display for QualityTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for QualityTier {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "low" => Ok(QualityTier::Low),
            "medium" => Ok(QualityTier::Medium),
            "high" => Ok(QualityTier::High),
            "ultra" => Ok(QualityTier::Ultra),
            other => Err(format!("unknown quality tier `{other}`")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_tier_round_trip() {
        for tier in QualityTier::ALL {
            assert_eq!(tier.name().parse::<QualityTier>().unwrap(), tier);
            assert_eq!(QualityTier::from_dpr(tier.dpr()), tier);
            assert_eq!(tier.level().name, tier.name());
        }
        assert!("extreme".parse::<QualityTier>().is_err());
    }

    #[test]
    fn test_merge_only_touches_present_fields() {
        let high = QualityTier::High.level();
        let merged = high.merged(&QualityPatch::shadow_map_size(512));
        assert_eq!(merged.shadow_map_size, 512);
        assert_eq!(merged.name, "high");
        assert!(merged.reflections);
        assert!(merged.shadow_maps_differ(&high));
        assert!(!high.shadow_maps_differ(&high.merged(&QualityPatch::default())));
    }

    proptest! {
        #[test]
        fn prop_merge_full_patch_replaces(size in 64u32..8192, shadows: bool, scale in 0.1f32..2.0) {
            let target = QualityLevel {
                shadow_map_size: size,
                shadows,
                resolution_scale: scale,
                ..QualityTier::Low.level()
            };
            let merged = QualityTier::Ultra.level().merged(&QualityPatch::from(target.clone()));
            prop_assert_eq!(merged, target);
        }
    }
}
