//! CPU 粒子系统
//!
//! 固定容量的粒子池：每帧只推进寿命，寿命耗尽的粒子在发射体积内重生。
//! 运动轨迹（初速度、重力、风、湍流）由顶点着色器按粒子年龄解析计算，
//! CPU 侧只在重生时改写粒子数据。

use super::config::{ParticleConfig, ParticleConfigPatch};
use super::emission::{sample_color, sample_range, sample_velocity, EmissionVolume};
use super::quad::{QuadBatch, BILLBOARD, PARTICLE_FRAGMENT, SIZE_SCALE};
use crate::core::error::{EngineResult, ParticleError, ParticleResult, RenderResult};
use crate::render::backend::{BufferUsage, RenderCommand, StepMode, VertexFormat, VertexLayout};
use crate::render::context::{GpuBuffer, GpuContext};
use crate::render::scene::{DrawPhase, Drawable, ViewState};
use crate::shaders::material::{ShaderConfig, ShaderMaterial, Side};
use crate::shaders::uniforms::{update_shader_uniforms, update_time, UniformValue};
use bytemuck::{Pod, Zeroable};
use glam::Vec3;
use rand::rngs::StdRng;
use rand::SeedableRng;

/// 单个粒子（也是逐实例顶点数据）
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct Particle {
    /// 出生位置
    pub position: [f32; 3],
    pub velocity: [f32; 3],
    /// 剩余寿命（秒）
    pub life: f32,
    pub max_life: f32,
    pub color: [f32; 3],
    pub size: f32,
}

impl Particle {
    /// 寿命比例：出生时为 1，死亡时为 0
    pub fn life_ratio(&self) -> f32 {
        if self.max_life > 0.0 {
            (self.life / self.max_life).clamp(0.0, 1.0)
        } else {
            0.0
        }
    }

    /// 出生以来的秒数
    pub fn age(&self) -> f32 {
        (1.0 - self.life_ratio()) * self.max_life
    }
}

const PARTICLE_VERTEX: &str = r#"
#include <noise>

layout(location = 3) in vec3 particlePosition;
layout(location = 4) in vec3 particleVelocity;
layout(location = 5) in float particleLife;
layout(location = 6) in float particleMaxLife;
layout(location = 7) in vec3 particleColor;
layout(location = 8) in float particleSize;

layout(location = 0) out vec3 vColor;
layout(location = 1) out float vAlpha;
layout(location = 2) out vec2 vUv;
"#;

const PARTICLE_MAIN: &str = r#"
void main() {
    float lifeRatio = clamp(particleLife / max(particleMaxLife, 0.0001), 0.0, 1.0);
    float age = (1.0 - lifeRatio) * particleMaxLife;

    vec3 pos = particlePosition
        + particleVelocity * age
        + 0.5 * uGravity * age * age
        + uWind * age;

    if (uTurbulence > 0.0) {
        vec3 p = pos * 0.5 + uTime * 0.3;
        pos += vec3(gradientNoise(p), gradientNoise(p + 100.0), gradientNoise(p + 200.0)) * uTurbulence;
    }

    float fadeIn = smoothstep(0.0, 0.1, lifeRatio);
    float fadeOut = 1.0 - smoothstep(0.8, 1.0, lifeRatio);
    vColor = particleColor;
    vAlpha = fadeIn * fadeOut * uOpacity;
    vUv = uv;

    float worldSize = particleSize * uPointSize * SIZE_SCALE * (0.5 + lifeRatio * 0.5);
    gl_Position = billboard(pos, worldSize);
}
"#;

fn vertex_shader() -> String {
    format!(
        "{PARTICLE_VERTEX}#define SIZE_SCALE {SIZE_SCALE:.1}\n{BILLBOARD}{PARTICLE_MAIN}"
    )
}

/// 粒子实例布局（位置 3..=8）
pub fn instance_layout() -> VertexLayout {
    VertexLayout::packed(
        StepMode::Instance,
        3,
        &[
            VertexFormat::Float32x3,
            VertexFormat::Float32x3,
            VertexFormat::Float32,
            VertexFormat::Float32,
            VertexFormat::Float32x3,
            VertexFormat::Float32,
        ],
    )
}

fn physics_uniforms(config: &ParticleConfig) -> [(&'static str, UniformValue); 5] {
    [
        ("uPointSize", config.size.into()),
        ("uOpacity", config.opacity.into()),
        ("uGravity", config.gravity.into()),
        ("uWind", config.wind.into()),
        ("uTurbulence", config.turbulence.into()),
    ]
}

fn particle_material(config: &ParticleConfig) -> EngineResult<ShaderMaterial> {
    let mut shader = ShaderConfig {
        name: "particles".to_string(),
        vertex_shader: vertex_shader(),
        fragment_shader: PARTICLE_FRAGMENT.to_string(),
        transparent: true,
        depth_write: false,
        depth_test: true,
        blending: config.blending.into(),
        side: Side::Double,
        ..ShaderConfig::default()
    }
    .with_uniform("uTime", 0.0f32);
    for (name, value) in physics_uniforms(config) {
        shader = shader.with_uniform(name, value);
    }
    Ok(ShaderMaterial::new(shader)?)
}

#[derive(Debug)]
struct ParticleGpu {
    batch: Option<QuadBatch>,
    instances: GpuBuffer,
}

/// CPU 粒子系统
#[derive(Debug)]
pub struct ParticleSystem {
    config: ParticleConfig,
    volume: EmissionVolume,
    palette: Vec<Vec3>,
    particles: Box<[Particle]>,
    rng: StdRng,
    running: bool,
    time: f32,
    dirty: bool,
    material: ShaderMaterial,
    gpu: Option<ParticleGpu>,
}

impl ParticleSystem {
    /// 按配置分配粒子池并初始化全部粒子
    pub fn new(config: ParticleConfig) -> EngineResult<Self> {
        config.validate()?;
        let palette = config.palette()?;
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let material = particle_material(&config)?;
        let mut system = Self {
            volume: EmissionVolume::new(config.emission_shape, config.emission_radius, config.emission_size),
            particles: vec![Particle::zeroed(); config.count].into_boxed_slice(),
            config,
            palette,
            rng,
            running: true,
            time: 0.0,
            dirty: true,
            material,
            gpu: None,
        };
        system.respawn_all();
        tracing::debug!(
            target: "chronos::particles",
            count = system.particles.len(),
            shape = ?system.config.emission_shape,
            "particle system created"
        );
        Ok(system)
    }

    fn respawn(&mut self, index: usize) {
        let position = self.volume.sample(&mut self.rng);
        let velocity = sample_velocity(self.config.speed_range, &mut self.rng);
        let life = sample_range(self.config.lifetime_range, &mut self.rng);
        let color = sample_color(&self.palette, self.config.color_mode, &mut self.rng);
        let size = sample_range(self.config.size_range, &mut self.rng);
        self.particles[index] = Particle {
            position: position.to_array(),
            velocity: velocity.to_array(),
            life,
            max_life: life,
            color: color.to_array(),
            size,
        };
    }

    fn respawn_all(&mut self) {
        for index in 0..self.particles.len() {
            self.respawn(index);
        }
        self.dirty = true;
    }

    /// 推进 `delta` 秒；停止时不做任何事
    pub fn update(&mut self, delta: f32) {
        if !self.running || delta <= 0.0 {
            return;
        }
        self.time += delta;
        update_time(&mut self.material, self.time);

        for index in 0..self.particles.len() {
            let particle = &mut self.particles[index];
            particle.life -= delta;
            if particle.life <= 0.0 {
                self.respawn(index);
            }
        }
        self.dirty = true;
    }

    pub fn start(&mut self) {
        self.running = true;
    }

    pub fn stop(&mut self) {
        self.running = false;
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    /// 重新初始化全部粒子并清零时间
    pub fn reset(&mut self) {
        self.time = 0.0;
        update_time(&mut self.material, 0.0);
        self.respawn_all();
    }

    /// 应用配置补丁（`count` 除外：粒子池容量在构造后不变）
    ///
    /// 新配置只影响之后重生的粒子；物理 uniform 立即更新。
    pub fn set_config(&mut self, patch: &ParticleConfigPatch) -> ParticleResult<()> {
        let mut next = self.config.merged(patch);
        next.count = self.config.count;
        next.validate()?;
        self.palette = next.palette()?;
        self.volume = EmissionVolume::new(next.emission_shape, next.emission_radius, next.emission_size);
        update_shader_uniforms(&mut self.material, physics_uniforms(&next));
        self.material.blending = next.blending.into();
        self.config = next;
        Ok(())
    }

    pub fn config(&self) -> &ParticleConfig {
        &self.config
    }

    pub fn count(&self) -> usize {
        self.particles.len()
    }

    pub fn time(&self) -> f32 {
        self.time
    }

    pub fn particles(&self) -> &[Particle] {
        &self.particles
    }

    pub fn particle(&self, index: usize) -> ParticleResult<&Particle> {
        self.particles.get(index).ok_or(ParticleError::IndexOutOfBounds {
            index,
            count: self.particles.len(),
        })
    }

    /// 与顶点着色器相同的轨迹（不含湍流）
    pub fn world_position(&self, index: usize) -> ParticleResult<Vec3> {
        let particle = self.particle(index)?;
        let age = particle.age();
        Ok(Vec3::from(particle.position)
            + Vec3::from(particle.velocity) * age
            + 0.5 * self.config.gravity * age * age
            + self.config.wind * age)
    }

    pub fn material(&self) -> &ShaderMaterial {
        &self.material
    }

    pub fn material_mut(&mut self) -> &mut ShaderMaterial {
        &mut self.material
    }

    /// 释放 GPU 资源；可重复调用
    pub fn dispose(&mut self) {
        if self.gpu.take().is_some() {
            tracing::debug!(target: "chronos::particles", "particle system disposed");
        }
    }
}

impl Drawable for ParticleSystem {
    fn label(&self) -> String {
        format!("particles:{}", self.particles.len())
    }

    fn prepare(&mut self, gpu: &mut GpuContext, view: &ViewState) -> RenderResult<()> {
        let state = match self.gpu.take() {
            Some(state) => state,
            None => {
                let instances = gpu.create_buffer_init(
                    "particle instances",
                    BufferUsage::VERTEX,
                    bytemuck::cast_slice(&self.particles),
                )?;
                self.dirty = false;
                ParticleGpu { batch: None, instances }
            }
        };
        let state = self.gpu.insert(state);
        if self.dirty {
            gpu.write_buffer(&state.instances, 0, bytemuck::cast_slice(&self.particles))?;
            self.dirty = false;
        }
        let batch = QuadBatch::ensure(&mut state.batch, gpu, &self.material, &instance_layout())?;
        batch.write_uniforms(gpu, &self.material, view)
    }

    fn encode(&self, phase: DrawPhase, out: &mut Vec<RenderCommand>) {
        if phase != DrawPhase::Transparent {
            return;
        }
        if let Some(ParticleGpu { batch: Some(batch), instances }) = &self.gpu {
            out.push(batch.draw(instances, self.particles.len() as u32));
        }
    }

    fn is_transparent(&self) -> bool {
        true
    }

    fn release(&mut self) {
        self.dispose();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::particles::config::EmissionShape;
    use crate::render::backend::NullBackend;

    fn config(count: usize) -> ParticleConfig {
        ParticleConfig {
            count,
            seed: Some(42),
            ..ParticleConfig::default()
        }
    }

    #[test]
    fn test_initial_particles_within_ranges() {
        let system = ParticleSystem::new(ParticleConfig {
            emission_shape: EmissionShape::Sphere,
            emission_radius: 2.0,
            ..config(500)
        })
        .unwrap();
        assert_eq!(system.count(), 500);
        for particle in system.particles() {
            assert!(Vec3::from(particle.position).length() <= 2.0 + 1e-4);
            assert!((2.0..=4.0).contains(&particle.life));
            assert_eq!(particle.life, particle.max_life);
            assert!((0.05..=0.15).contains(&particle.size));
        }
    }

    #[test]
    fn test_expired_particles_respawn() {
        let mut system = ParticleSystem::new(ParticleConfig {
            lifetime_range: [2.0, 2.0],
            ..config(100)
        })
        .unwrap();
        system.update(2.01);
        for particle in system.particles() {
            assert_eq!(particle.life, 2.0);
            assert_eq!(particle.position, [0.0; 3]);
        }
    }

    #[test]
    fn test_stop_freezes_update() {
        let mut system = ParticleSystem::new(config(10)).unwrap();
        system.stop();
        let before = system.particles().to_vec();
        system.update(1.0);
        assert_eq!(system.particles(), &before[..]);
        assert_eq!(system.time(), 0.0);
        system.start();
        system.update(0.5);
        assert!(system.time() > 0.0);
        assert_eq!(system.material().uniform("uTime"), Some(&UniformValue::Float(0.5)));
    }

    #[test]
    fn test_set_config_keeps_count() {
        let mut system = ParticleSystem::new(config(10)).unwrap();
        system
            .set_config(&ParticleConfigPatch {
                count: Some(999),
                gravity: Some(Vec3::Y),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(system.count(), 10);
        assert_eq!(system.config().count, 10);
        assert_eq!(system.material().uniform("uGravity"), Some(&UniformValue::Vec3(Vec3::Y)));

        let invalid = system.set_config(&ParticleConfigPatch {
            colors: Some(vec!["nope".to_string()]),
            ..Default::default()
        });
        assert!(invalid.is_err());
        assert_eq!(system.config().gravity, Vec3::Y);
    }

    #[test]
    fn test_world_position_follows_trajectory() {
        let mut system = ParticleSystem::new(ParticleConfig {
            lifetime_range: [3.0, 3.0],
            gravity: Vec3::ZERO,
            ..config(1)
        })
        .unwrap();
        system.update(1.0);
        let particle = *system.particle(0).unwrap();
        let expected = Vec3::from(particle.velocity);
        assert!((system.world_position(0).unwrap() - expected).length() < 1e-5);
        assert!(matches!(
            system.world_position(5),
            Err(ParticleError::IndexOutOfBounds { index: 5, count: 1 })
        ));
    }

    #[test]
    fn test_draws_instanced_quads_in_transparent_phase() {
        let mut gpu = GpuContext::new(Box::new(NullBackend::new()));
        let mut system = ParticleSystem::new(config(64)).unwrap();
        system.prepare(&mut gpu, &ViewState::default()).unwrap();

        let mut commands = Vec::new();
        system.encode(DrawPhase::Opaque, &mut commands);
        assert!(commands.is_empty());
        system.encode(DrawPhase::Transparent, &mut commands);
        match &commands[..] {
            [RenderCommand::Draw {
                vertex_buffers,
                vertex_count,
                instance_count,
                ..
            }] => {
                assert_eq!(vertex_buffers.len(), 2);
                assert_eq!(*vertex_count, 6);
                assert_eq!(*instance_count, 64);
            }
            other => panic!("unexpected commands: {other:?}"),
        }

        system.dispose();
        system.dispose();
        assert!(gpu.collect_garbage() >= 3);
    }

    #[test]
    fn test_instance_layout_matches_particle() {
        assert_eq!(instance_layout().stride, std::mem::size_of::<Particle>() as u64);
    }
}
