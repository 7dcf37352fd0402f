//! 指针交互粒子
//!
//! 每个粒子记住自己的原位。CPU 侧用临界阻尼弹簧把粒子拉回原位，
//! 指针造成的位移（吸引、排斥、环绕、跟随）在顶点着色器中按 `uMouse` 计算。
//! [`interaction_offset`] 是同一公式的 Rust 版本。

use super::config::{InteractionType, InteractiveParticleConfig};
use super::emission::{sample_color, sample_range, EmissionVolume};
use super::quad::{QuadBatch, BILLBOARD, PARTICLE_FRAGMENT, SIZE_SCALE};
use crate::core::error::{EngineResult, ParticleError, ParticleResult, RenderResult};
use crate::core::utils::smoothstep;
use crate::render::backend::{BufferUsage, RenderCommand, StepMode, VertexFormat, VertexLayout};
use crate::render::camera::Camera;
use crate::render::context::{GpuBuffer, GpuContext};
use crate::render::scene::{DrawPhase, Drawable, ViewState};
use crate::shaders::material::{ShaderConfig, ShaderMaterial, Side};
use crate::shaders::uniforms::{update_shader_uniforms, update_time, UniformValue};
use bytemuck::{Pod, Zeroable};
use glam::Vec3;
use rand::rngs::StdRng;
use rand::SeedableRng;

/// 逐实例数据
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct InteractiveInstance {
    pub position: [f32; 3],
    pub size: f32,
    pub color: [f32; 3],
    pub alpha: f32,
}

const INTERACTIVE_VERTEX: &str = r#"
layout(location = 3) in vec3 particlePosition;
layout(location = 4) in float particleSize;
layout(location = 5) in vec3 particleColor;
layout(location = 6) in float particleAlpha;

layout(location = 0) out vec3 vColor;
layout(location = 1) out float vAlpha;
layout(location = 2) out vec2 vUv;

float interactionFalloff(float dist, float reach) {
    return 1.0 - smoothstep(0.0, reach, dist);
}

vec3 interactionOffset(vec3 p) {
    vec3 toMouse = uMouse - p;
    float dist = length(toMouse);
    if (uMouseActive == 0 || dist < 0.0001) {
        return vec3(0.0);
    }
    if (uInteractionType == 3) {
        float reach = uInteractionRadius * 2.0;
        if (dist >= reach) {
            return vec3(0.0);
        }
        return toMouse * interactionFalloff(dist, reach) * uInteractionStrength * 0.5;
    }
    if (dist >= uInteractionRadius) {
        return vec3(0.0);
    }
    float falloff = interactionFalloff(dist, uInteractionRadius);
    vec3 dir = toMouse / dist;
    if (uInteractionType == 0) {
        return toMouse * min(falloff * uInteractionStrength, 1.0);
    }
    if (uInteractionType == 1) {
        return -dir * falloff * uInteractionStrength * uInteractionRadius * 0.5;
    }
    return vec3(-dir.y, dir.x, 0.0) * falloff * uInteractionStrength * uInteractionRadius * 0.5;
}
"#;

const INTERACTIVE_MAIN: &str = r#"
void main() {
    vec3 offset = interactionOffset(particlePosition);
    float glow = min(length(offset), 1.0);
    vColor = particleColor * (1.0 + glow * 0.5);
    vAlpha = particleAlpha;
    vUv = uv;
    gl_Position = billboard(particlePosition + offset, particleSize * uPointSize * SIZE_SCALE);
}
"#;

/// 与顶点着色器相同的指针位移
pub fn interaction_offset(
    position: Vec3,
    mouse: Vec3,
    kind: InteractionType,
    radius: f32,
    strength: f32,
) -> Vec3 {
    let to_mouse = mouse - position;
    let distance = to_mouse.length();
    if distance < 0.0001 {
        return Vec3::ZERO;
    }
    let reach = match kind {
        InteractionType::Follow => radius * 2.0,
        _ => radius,
    };
    if distance >= reach {
        return Vec3::ZERO;
    }
    let falloff = 1.0 - smoothstep(0.0, reach, distance);
    let direction = to_mouse / distance;
    match kind {
        InteractionType::Attract => to_mouse * (falloff * strength).min(1.0),
        InteractionType::Repel => -direction * falloff * strength * radius * 0.5,
        InteractionType::Orbit => Vec3::new(-direction.y, direction.x, 0.0) * falloff * strength * radius * 0.5,
        InteractionType::Follow => to_mouse * falloff * strength * 0.5,
    }
}

/// 临界阻尼弹簧 x'' = force - 2ωx' - ω²(x - home) 的解析解
///
/// 恒定外力只是把平衡点移到 `home + force / ω²`，因此任意步长都不会发散。
/// `omega <= 0` 时没有回复力，退化为显式积分。
pub fn spring_step(position: Vec3, velocity: Vec3, home: Vec3, force: Vec3, omega: f32, dt: f32) -> (Vec3, Vec3) {
    if omega <= 0.0 {
        let velocity = velocity + force * dt;
        return (position + velocity * dt, velocity);
    }
    let target = home + force / (omega * omega);
    let c1 = position - target;
    let c2 = velocity + omega * c1;
    let decay = (-omega * dt).exp();
    (target + (c1 + c2 * dt) * decay, (velocity - omega * c2 * dt) * decay)
}

/// 实例布局（位置 3..=6）
pub fn instance_layout() -> VertexLayout {
    VertexLayout::packed(
        StepMode::Instance,
        3,
        &[
            VertexFormat::Float32x3,
            VertexFormat::Float32,
            VertexFormat::Float32x3,
            VertexFormat::Float32,
        ],
    )
}

fn interaction_uniforms(config: &InteractiveParticleConfig) -> [(&'static str, UniformValue); 4] {
    [
        ("uInteractionRadius", config.interaction_radius.into()),
        ("uInteractionStrength", config.interaction_strength.into()),
        ("uInteractionType", config.interaction_type.code().into()),
        ("uPointSize", config.base.size.into()),
    ]
}

#[derive(Debug)]
struct InteractiveGpu {
    batch: Option<QuadBatch>,
    instances: GpuBuffer,
}

/// 指针交互粒子系统
#[derive(Debug)]
pub struct InteractiveParticles {
    config: InteractiveParticleConfig,
    volume: EmissionVolume,
    palette: Vec<Vec3>,
    home: Box<[Vec3]>,
    velocities: Box<[Vec3]>,
    lives: Box<[(f32, f32)]>,
    instances: Box<[InteractiveInstance]>,
    rng: StdRng,
    mouse: Option<Vec3>,
    time: f32,
    running: bool,
    material: ShaderMaterial,
    gpu: Option<InteractiveGpu>,
}

impl InteractiveParticles {
    pub fn new(config: InteractiveParticleConfig) -> EngineResult<Self> {
        config.validate()?;
        let base = &config.base;
        let palette = base.palette()?;
        let rng = match base.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let mut shader = ShaderConfig {
            name: "interactive-particles".to_string(),
            vertex_shader: format!(
                "{INTERACTIVE_VERTEX}#define SIZE_SCALE {SIZE_SCALE:.1}\n{BILLBOARD}{INTERACTIVE_MAIN}"
            ),
            fragment_shader: PARTICLE_FRAGMENT.to_string(),
            transparent: true,
            depth_write: false,
            depth_test: true,
            blending: base.blending.into(),
            side: Side::Double,
            ..ShaderConfig::default()
        }
        .with_uniform("uTime", 0.0f32)
        .with_uniform("uMouse", Vec3::ZERO)
        .with_uniform("uMouseActive", false);
        for (name, value) in interaction_uniforms(&config) {
            shader = shader.with_uniform(name, value);
        }
        let material = ShaderMaterial::new(shader)?;

        let count = base.count;
        let mut system = Self {
            volume: EmissionVolume::new(base.emission_shape, base.emission_radius, base.emission_size),
            palette,
            home: vec![Vec3::ZERO; count].into_boxed_slice(),
            velocities: vec![Vec3::ZERO; count].into_boxed_slice(),
            lives: vec![(f32::INFINITY, f32::INFINITY); count].into_boxed_slice(),
            instances: vec![InteractiveInstance::zeroed(); count].into_boxed_slice(),
            rng,
            mouse: None,
            time: 0.0,
            running: true,
            material,
            gpu: None,
            config,
        };
        for index in 0..count {
            system.respawn(index);
        }
        Ok(system)
    }

    fn respawn(&mut self, index: usize) {
        let base = &self.config.base;
        let home = self.volume.sample(&mut self.rng);
        let color = sample_color(&self.palette, base.color_mode, &mut self.rng);
        let size = sample_range(base.size_range, &mut self.rng);
        let life = if self.config.infinite_life {
            f32::INFINITY
        } else {
            sample_range(base.lifetime_range, &mut self.rng)
        };
        self.home[index] = home;
        self.velocities[index] = Vec3::ZERO;
        self.lives[index] = (life, life);
        self.instances[index] = InteractiveInstance {
            position: home.to_array(),
            size,
            color: color.to_array(),
            alpha: self.alpha(index),
        };
    }

    fn alpha(&self, index: usize) -> f32 {
        let (life, max_life) = self.lives[index];
        let opacity = self.config.base.opacity;
        if !life.is_finite() {
            return opacity;
        }
        let ratio = (life / max_life).clamp(0.0, 1.0);
        smoothstep(0.0, 0.1, ratio) * (1.0 - smoothstep(0.8, 1.0, ratio)) * opacity
    }

    /// 推进 `delta` 秒：漂移、弹簧回位与（可选的）寿命重生
    pub fn update(&mut self, delta: f32) {
        if !self.running || delta <= 0.0 {
            return;
        }
        self.time += delta;
        update_time(&mut self.material, self.time);

        let omega = self.config.return_speed;
        let base = &self.config.base;
        let (gravity, wind, turbulence) = (base.gravity, base.wind, base.turbulence);
        let mut expired = Vec::new();

        for index in 0..self.instances.len() {
            let seed = index as f32;
            let wander = Vec3::new(
                (self.time * 0.7 + seed * 1.3).sin(),
                (self.time * 0.5 + seed * 2.1).cos(),
                (self.time * 0.3 + seed * 0.7).sin(),
            ) * turbulence;
            let (position, velocity) = spring_step(
                Vec3::from(self.instances[index].position),
                self.velocities[index],
                self.home[index],
                wander + wind + gravity,
                omega,
                delta,
            );
            self.velocities[index] = velocity;
            self.instances[index].position = position.to_array();

            let (life, _) = &mut self.lives[index];
            if life.is_finite() {
                *life -= delta;
                if *life <= 0.0 {
                    expired.push(index);
                    continue;
                }
            }
            self.instances[index].alpha = self.alpha(index);
        }
        for index in expired {
            self.respawn(index);
        }
    }

    /// 指针平面上的世界坐标，`None` 表示指针离开
    pub fn set_mouse(&mut self, mouse: Option<Vec3>) {
        self.mouse = mouse;
        update_shader_uniforms(
            &mut self.material,
            [
                ("uMouse", mouse.unwrap_or(Vec3::ZERO).into()),
                ("uMouseActive", mouse.is_some().into()),
            ],
        );
    }

    /// 由 NDC 指针坐标求出与交互平面的交点并更新 `uMouse`
    pub fn update_mouse(&mut self, camera: &Camera, ndc_x: f32, ndc_y: f32) -> Option<Vec3> {
        let hit = camera
            .ray_from_ndc(ndc_x, ndc_y)
            .intersect_plane(self.config.plane_normal, self.config.plane_constant);
        if hit.is_some() {
            self.set_mouse(hit);
        }
        hit
    }

    pub fn mouse(&self) -> Option<Vec3> {
        self.mouse
    }

    pub fn set_interaction(&mut self, kind: InteractionType, radius: f32, strength: f32) -> ParticleResult<()> {
        let mut next = self.config.clone();
        next.interaction_type = kind;
        next.interaction_radius = radius;
        next.interaction_strength = strength;
        next.validate()?;
        update_shader_uniforms(&mut self.material, interaction_uniforms(&next));
        self.config = next;
        Ok(())
    }

    /// 把粒子推离原位（随后由弹簧拉回）
    pub fn displace(&mut self, index: usize, offset: Vec3) -> ParticleResult<()> {
        let count = self.instances.len();
        let instance = self
            .instances
            .get_mut(index)
            .ok_or(ParticleError::IndexOutOfBounds { index, count })?;
        instance.position = (Vec3::from(instance.position) + offset).to_array();
        Ok(())
    }

    /// 当前位置（不含指针位移）
    pub fn position(&self, index: usize) -> ParticleResult<Vec3> {
        self.instances
            .get(index)
            .map(|instance| Vec3::from(instance.position))
            .ok_or(ParticleError::IndexOutOfBounds {
                index,
                count: self.instances.len(),
            })
    }

    /// 原位
    pub fn home(&self, index: usize) -> ParticleResult<Vec3> {
        self.home.get(index).copied().ok_or(ParticleError::IndexOutOfBounds {
            index,
            count: self.home.len(),
        })
    }

    /// 着色器实际绘制的位置（含指针位移）
    pub fn displaced_position(&self, index: usize) -> ParticleResult<Vec3> {
        let position = self.position(index)?;
        let offset = self.mouse.map_or(Vec3::ZERO, |mouse| {
            interaction_offset(
                position,
                mouse,
                self.config.interaction_type,
                self.config.interaction_radius,
                self.config.interaction_strength,
            )
        });
        Ok(position + offset)
    }

    pub fn count(&self) -> usize {
        self.instances.len()
    }

    pub fn config(&self) -> &InteractiveParticleConfig {
        &self.config
    }

    pub fn material(&self) -> &ShaderMaterial {
        &self.material
    }

    pub fn start(&mut self) {
        self.running = true;
    }

    pub fn stop(&mut self) {
        self.running = false;
    }

    pub fn dispose(&mut self) {
        if self.gpu.take().is_some() {
            tracing::debug!(target: "chronos::particles", "interactive particles disposed");
        }
    }
}

impl Drawable for InteractiveParticles {
    fn label(&self) -> String {
        format!("interactive-particles:{}", self.instances.len())
    }

    fn prepare(&mut self, gpu: &mut GpuContext, view: &ViewState) -> RenderResult<()> {
        let data: &[u8] = bytemuck::cast_slice(&self.instances);
        let state = match self.gpu.take() {
            Some(state) => {
                gpu.write_buffer(&state.instances, 0, data)?;
                state
            }
            None => InteractiveGpu {
                batch: None,
                instances: gpu.create_buffer_init("interactive particle instances", BufferUsage::VERTEX, data)?,
            },
        };
        let state = self.gpu.insert(state);
        let batch = QuadBatch::ensure(&mut state.batch, gpu, &self.material, &instance_layout())?;
        batch.write_uniforms(gpu, &self.material, view)
    }

    fn encode(&self, phase: DrawPhase, out: &mut Vec<RenderCommand>) {
        if phase != DrawPhase::Transparent {
            return;
        }
        if let Some(InteractiveGpu {
            batch: Some(batch),
            instances,
        }) = &self.gpu
        {
            out.push(batch.draw(instances, self.instances.len() as u32));
        }
    }

    fn is_transparent(&self) -> bool {
        true
    }

    fn release(&mut self) {
        self.dispose();
    }
}
