//! 着色器与粒子缓冲句柄

use crate::core::error::{ParticleError, ParticleResult, ShaderResult};
use crate::shaders::material::{ShaderConfig, ShaderMaterial};
use crate::shaders::uniforms::{self, UniformValue};
use glam::Vec3;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// 材质句柄
#[derive(Debug, Clone)]
pub struct ShaderHandle {
    material: ShaderMaterial,
}

/// 由配置创建材质
pub fn use_shader(config: ShaderConfig) -> ShaderResult<ShaderHandle> {
    Ok(ShaderHandle {
        material: ShaderMaterial::new(config)?,
    })
}

impl ShaderHandle {
    pub fn material(&self) -> &ShaderMaterial {
        &self.material
    }

    pub fn material_mut(&mut self) -> &mut ShaderMaterial {
        &mut self.material
    }

    /// 原地写入 uniform；未声明的名称返回 `false`
    pub fn update_uniform(&mut self, name: &str, value: impl Into<UniformValue>) -> bool {
        self.material.update_uniform(name, value.into())
    }

    pub fn update_time(&mut self, time: f32) -> bool {
        uniforms::update_time(&mut self.material, time)
    }
}

/// 简单粒子场参数
#[derive(Debug, Clone, PartialEq)]
pub struct ParticleFieldOptions {
    pub count: usize,
    /// 立方体边长
    pub spread: f32,
    pub size: f32,
    pub color: Vec3,
    pub seed: Option<u64>,
}

impl Default for ParticleFieldOptions {
    fn default() -> Self {
        Self {
            count: 1000,
            spread: 10.0,
            size: 0.05,
            color: Vec3::ONE,
            seed: None,
        }
    }
}

/// 扁平的位置/颜色/尺寸数组
///
/// 长度在创建时固定，供调用方直接写入。
#[derive(Debug, Clone, PartialEq)]
pub struct ParticleField {
    pub positions: Vec<f32>,
    pub colors: Vec<f32>,
    pub sizes: Vec<f32>,
}

/// 在 `spread` 立方体内随机分布粒子
pub fn use_particles(options: &ParticleFieldOptions) -> ParticleField {
    let mut rng = match options.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };
    let half = options.spread * 0.5;
    let mut positions = Vec::with_capacity(options.count * 3);
    let mut colors = Vec::with_capacity(options.count * 3);
    let mut sizes = Vec::with_capacity(options.count);
    for _ in 0..options.count {
        for _ in 0..3 {
            positions.push(if half > 0.0 { rng.gen_range(-half..=half) } else { 0.0 });
        }
        colors.extend_from_slice(&options.color.to_array());
        sizes.push(options.size * rng.gen_range(0.5..=1.5));
    }
    ParticleField {
        positions,
        colors,
        sizes,
    }
}

impl ParticleField {
    pub fn len(&self) -> usize {
        self.sizes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sizes.is_empty()
    }

    pub fn position(&self, index: usize) -> Option<Vec3> {
        self.positions
            .get(index * 3..index * 3 + 3)
            .map(Vec3::from_slice)
    }

    pub fn update_position(&mut self, index: usize, x: f32, y: f32, z: f32) -> ParticleResult<()> {
        let count = self.len();
        let slot = self
            .positions
            .get_mut(index * 3..index * 3 + 3)
            .ok_or(ParticleError::IndexOutOfBounds { index, count })?;
        slot.copy_from_slice(&[x, y, z]);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shaders::presets::ShaderPreset;

    #[test]
    fn test_shader_handle_updates_in_place() {
        let mut handle = use_shader(ShaderPreset::Plasma.config()).unwrap();
        assert!(handle.update_time(1.5));
        assert_eq!(handle.material().uniform("uTime"), Some(&UniformValue::Float(1.5)));
        assert!(!handle.update_uniform("uMissing", 1.0));
    }

    #[test]
    fn test_particle_field_layout() {
        let mut field = use_particles(&ParticleFieldOptions {
            count: 64,
            spread: 4.0,
            seed: Some(7),
            ..Default::default()
        });
        assert_eq!(field.positions.len(), 192);
        assert_eq!(field.colors.len(), 192);
        assert_eq!(field.len(), 64);
        assert!(field.positions.iter().all(|p| p.abs() <= 2.0));

        field.update_position(3, 1.0, 2.0, 3.0).unwrap();
        assert_eq!(field.position(3), Some(Vec3::new(1.0, 2.0, 3.0)));
        assert!(field.update_position(64, 0.0, 0.0, 0.0).is_err());
    }
}
