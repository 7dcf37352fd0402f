//! GPU 计算粒子
//!
//! 粒子状态常驻存储缓冲区，每帧由计算着色器推进；CPU 只写入一个小的参数 uniform
//! 并发出调度命令。同一个存储缓冲区随后作为实例顶点缓冲区绘制。
//!
//! 后端不支持计算着色器时初始化返回 `false`，系统保持静默（不绘制、不调度）。

use super::config::{EmissionShape, GpuParticleConfig};
use super::emission::{sample_range, sample_velocity, EmissionVolume, TORUS_TUBE_RATIO};
use super::quad::{QuadBatch, BILLBOARD, PARTICLE_FRAGMENT, SIZE_SCALE};
use crate::core::error::{EngineResult, RenderResult};
use crate::core::utils::hash;
use crate::render::backend::{
    BindingKind, BindingResource, BufferUsage, ProgramDescriptor, RenderCommand, StepMode, VertexFormat,
    VertexLayout,
};
use crate::render::context::{GpuBuffer, GpuContext, GpuProgram};
use crate::render::scene::{DrawPhase, Drawable, ViewState};
use crate::shaders::material::{ShaderConfig, ShaderMaterial, Side};
use bytemuck::{Pod, Zeroable};
use glam::{Vec3, Vec4};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::f32::consts::{PI, TAU};

/// 每个工作组的线程数
pub const WORKGROUP_SIZE: u32 = 256;

const UPDATE_PROGRAM_KEY: &str = "gpu-particles-update";

/// 存储缓冲区中的粒子（64 字节）
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct GpuParticle {
    /// xyz: 位置, w: 剩余寿命
    pub position: [f32; 4],
    /// xyz: 速度, w: 质量
    pub velocity: [f32; 4],
    pub color: [f32; 4],
    /// x: 尺寸, y: 最大寿命, z: 年龄, w: 尺寸缩放
    pub attributes: [f32; 4],
}

/// 计算着色器参数（std140/WGSL uniform 布局，160 字节）
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct SimulationParams {
    pub delta_time: f32,
    pub time: f32,
    pub particle_count: u32,
    pub mouse_influence: f32,
    pub gravity: [f32; 3],
    pub damping: f32,
    pub mouse: [f32; 3],
    pub turbulence: f32,
    pub bounds: [f32; 3],
    pub restitution: f32,
    pub emitter_position: [f32; 3],
    pub emitter_radius: f32,
    pub life_min: f32,
    pub life_max: f32,
    pub speed_min: f32,
    pub speed_max: f32,
    pub size_min: f32,
    pub size_max: f32,
    pub _padding: [f32; 2],
    pub color_start: [f32; 4],
    pub color_end: [f32; 4],
    /// 盒形发射的尺寸
    pub emission_size: [f32; 3],
    /// 重生采样的发射形状，见 [`shape_id`]
    pub emission_shape: u32,
}

/// 发射形状在着色器中的编号
pub fn shape_id(shape: EmissionShape) -> u32 {
    match shape {
        EmissionShape::Point => 0,
        EmissionShape::Sphere => 1,
        EmissionShape::Box => 2,
        EmissionShape::Cone => 3,
        EmissionShape::Disk => 4,
        EmissionShape::Ring => 5,
        EmissionShape::Torus => 6,
    }
}

pub const UPDATE_SHADER: &str = r#"
struct Particle {
    position: vec4<f32>,
    velocity: vec4<f32>,
    color: vec4<f32>,
    attributes: vec4<f32>,
}

struct SimulationParams {
    delta_time: f32,
    time: f32,
    particle_count: u32,
    mouse_influence: f32,
    gravity: vec3<f32>,
    damping: f32,
    mouse: vec3<f32>,
    turbulence: f32,
    bounds: vec3<f32>,
    restitution: f32,
    emitter_position: vec3<f32>,
    emitter_radius: f32,
    life_min: f32,
    life_max: f32,
    speed_min: f32,
    speed_max: f32,
    size_min: f32,
    size_max: f32,
    padding: vec2<f32>,
    color_start: vec4<f32>,
    color_end: vec4<f32>,
    emission_size: vec3<f32>,
    emission_shape: u32,
}

@group(0) @binding(0) var<storage, read_write> particles: array<Particle>;
@group(0) @binding(1) var<uniform> params: SimulationParams;

const PI: f32 = 3.14159265;
const TAU: f32 = 6.2831853;
const TORUS_TUBE_RATIO: f32 = 0.25;

fn hash(n: f32) -> f32 {
    return fract(sin(n) * 43758.5453123);
}

fn hash3(p: vec3<f32>) -> vec3<f32> {
    let q = vec3<f32>(
        dot(p, vec3<f32>(127.1, 311.7, 74.7)),
        dot(p, vec3<f32>(269.5, 183.3, 246.1)),
        dot(p, vec3<f32>(113.5, 271.9, 124.6)),
    );
    return fract(sin(q) * 43758.5453123);
}

fn safe_normalize(v: vec3<f32>) -> vec3<f32> {
    let len = length(v);
    if (len < 0.0001) {
        return vec3<f32>(0.0);
    }
    return v / len;
}

// 与 EmissionVolume::sample 相同的形状，u 与 w 为 [0, 1) 的哈希值
fn respawn_offset(u: vec3<f32>, w: f32) -> vec3<f32> {
    let radius = params.emitter_radius;
    let theta = u.x * TAU;
    var offset = vec3<f32>(0.0);
    switch params.emission_shape {
        case 1u: {
            offset = safe_normalize(u - vec3<f32>(0.5)) * radius * pow(w, 1.0 / 3.0);
        }
        case 2u: {
            offset = (u - vec3<f32>(0.5)) * params.emission_size;
        }
        case 3u: {
            let r = radius * u.y;
            offset = vec3<f32>(r * u.z * cos(theta), u.z, r * u.z * sin(theta));
        }
        case 4u: {
            let r = radius * sqrt(u.y);
            offset = vec3<f32>(r * cos(theta), 0.0, r * sin(theta));
        }
        case 5u: {
            offset = vec3<f32>(radius * cos(theta), 0.0, radius * sin(theta));
        }
        case 6u: {
            let phi = u.y * TAU;
            let tube = radius * TORUS_TUBE_RATIO * sqrt(u.z);
            let ring = radius + tube * cos(phi);
            offset = vec3<f32>(ring * cos(theta), tube * sin(phi), ring * sin(theta));
        }
        default: {}
    }
    return offset;
}

@compute @workgroup_size(256)
fn update(@builtin(global_invocation_id) id: vec3<u32>) {
    let index = id.x;
    if (index >= params.particle_count) {
        return;
    }

    let p = particles[index];
    let dt = params.delta_time;
    let fi = f32(index);
    let mass = max(p.velocity.w, 0.001);
    var position = p.position.xyz;
    var velocity = p.velocity.xyz;
    var life = p.position.w - dt;
    var size = p.attributes.x;
    var max_life = p.attributes.y;
    var age = p.attributes.z + dt;

    if (life <= 0.0) {
        let seed = vec3<f32>(fi, params.time, fi * 0.1);
        position = params.emitter_position + respawn_offset(hash3(seed), hash(fi * 7.31 + params.time));
        let speed = mix(params.speed_min, params.speed_max, hash(fi * 1.618 + params.time));
        velocity = safe_normalize(hash3(seed + vec3<f32>(100.0, 200.0, 300.0)) - vec3<f32>(0.5)) * speed;
        max_life = mix(params.life_min, params.life_max, hash(fi + params.time));
        life = max_life;
        age = 0.0;
        size = mix(params.size_min, params.size_max, hash(fi * 3.14159));
    }

    var force = params.gravity;
    let to_mouse = params.mouse - position;
    let distance = length(to_mouse);
    if (params.mouse_influence != 0.0 && distance > 0.001) {
        force += to_mouse / distance * params.mouse_influence / (distance * distance + 1.0);
    }
    if (params.turbulence > 0.0) {
        let cell = floor(position * 0.5 + vec3<f32>(params.time * 0.3));
        force += (hash3(cell) - vec3<f32>(0.5)) * 2.0 * params.turbulence;
    }

    velocity += force / mass * dt;
    velocity *= params.damping;
    position += velocity * dt;

    let lower = params.emitter_position - params.bounds;
    let upper = params.emitter_position + params.bounds;
    let outside = (position < lower) | (position > upper);
    position = clamp(position, lower, upper);
    velocity = select(velocity, -velocity * params.restitution, outside);

    let life_ratio = clamp(1.0 - life / max(max_life, 0.0001), 0.0, 1.0);
    let color = mix(params.color_start, params.color_end, life_ratio);
    let scale = sin(life_ratio * PI) * 0.5 + 0.5;

    particles[index] = Particle(
        vec4<f32>(position, life),
        vec4<f32>(velocity, mass),
        color,
        vec4<f32>(size, max_life, age, scale),
    );
}
"#;

fn safe_normalize(v: Vec3) -> Vec3 {
    if v.length() < 0.0001 {
        Vec3::ZERO
    } else {
        v.normalize()
    }
}

fn hash3(p: Vec3) -> Vec3 {
    let q = Vec3::new(
        p.dot(Vec3::new(127.1, 311.7, 74.7)),
        p.dot(Vec3::new(269.5, 183.3, 246.1)),
        p.dot(Vec3::new(113.5, 271.9, 124.6)),
    );
    Vec3::new(hash(q.x), hash(q.y), hash(q.z))
}

fn respawn_offset(params: &SimulationParams, u: Vec3, w: f32) -> Vec3 {
    let radius = params.emitter_radius;
    let theta = u.x * TAU;
    match params.emission_shape {
        1 => safe_normalize(u - Vec3::splat(0.5)) * radius * w.cbrt(),
        2 => (u - Vec3::splat(0.5)) * Vec3::from(params.emission_size),
        3 => {
            let r = radius * u.y;
            Vec3::new(r * u.z * theta.cos(), u.z, r * u.z * theta.sin())
        }
        4 => {
            let r = radius * u.y.sqrt();
            Vec3::new(r * theta.cos(), 0.0, r * theta.sin())
        }
        5 => Vec3::new(radius * theta.cos(), 0.0, radius * theta.sin()),
        6 => {
            let phi = u.y * TAU;
            let tube = radius * TORUS_TUBE_RATIO * u.z.sqrt();
            let ring = radius + tube * phi.cos();
            Vec3::new(ring * theta.cos(), tube * phi.sin(), ring * theta.sin())
        }
        _ => Vec3::ZERO,
    }
}

/// CPU 上执行一步与计算着色器相同的更新
pub fn reference_step(particles: &mut [GpuParticle], params: &SimulationParams) {
    let dt = params.delta_time;
    let gravity = Vec3::from(params.gravity);
    let mouse = Vec3::from(params.mouse);
    let emitter = Vec3::from(params.emitter_position);
    let bounds = Vec3::from(params.bounds);
    let count = (params.particle_count as usize).min(particles.len());

    for (index, particle) in particles[..count].iter_mut().enumerate() {
        let fi = index as f32;
        let mass = particle.velocity[3].max(0.001);
        let mut position = Vec3::from_slice(&particle.position[..3]);
        let mut velocity = Vec3::from_slice(&particle.velocity[..3]);
        let mut life = particle.position[3] - dt;
        let mut size = particle.attributes[0];
        let mut max_life = particle.attributes[1];
        let mut age = particle.attributes[2] + dt;

        if life <= 0.0 {
            let seed = Vec3::new(fi, params.time, fi * 0.1);
            position = emitter + respawn_offset(params, hash3(seed), hash(fi * 7.31 + params.time));
            let speed = params.speed_min + (params.speed_max - params.speed_min) * hash(fi * 1.618 + params.time);
            velocity = safe_normalize(hash3(seed + Vec3::new(100.0, 200.0, 300.0)) - Vec3::splat(0.5)) * speed;
            max_life = params.life_min + (params.life_max - params.life_min) * hash(fi + params.time);
            life = max_life;
            age = 0.0;
            size = params.size_min + (params.size_max - params.size_min) * hash(fi * 3.14159);
        }

        let mut force = gravity;
        let to_mouse = mouse - position;
        let distance = to_mouse.length();
        if params.mouse_influence != 0.0 && distance > 0.001 {
            force += to_mouse / distance * params.mouse_influence / (distance * distance + 1.0);
        }
        if params.turbulence > 0.0 {
            let cell = (position * 0.5 + Vec3::splat(params.time * 0.3)).floor();
            force += (hash3(cell) - Vec3::splat(0.5)) * 2.0 * params.turbulence;
        }

        velocity += force / mass * dt;
        velocity *= params.damping;
        position += velocity * dt;

        let lower = emitter - bounds;
        let upper = emitter + bounds;
        let outside = position.cmplt(lower) | position.cmpgt(upper);
        position = position.clamp(lower, upper);
        velocity = Vec3::select(outside, -velocity * params.restitution, velocity);

        let life_ratio = (1.0 - life / max_life.max(0.0001)).clamp(0.0, 1.0);
        let color = Vec4::from(params.color_start).lerp(Vec4::from(params.color_end), life_ratio);
        let scale = (life_ratio * PI).sin() * 0.5 + 0.5;

        *particle = GpuParticle {
            position: position.extend(life).to_array(),
            velocity: velocity.extend(mass).to_array(),
            color: color.to_array(),
            attributes: [size, max_life, age, scale],
        };
    }
}

const RENDER_VERTEX: &str = r#"
layout(location = 3) in vec4 particlePosition;
layout(location = 4) in vec4 particleVelocity;
layout(location = 5) in vec4 particleColor;
layout(location = 6) in vec4 particleAttributes;

layout(location = 0) out vec3 vColor;
layout(location = 1) out float vAlpha;
layout(location = 2) out vec2 vUv;
"#;

const RENDER_MAIN: &str = r#"
void main() {
    vColor = particleColor.rgb;
    vAlpha = particleColor.a * uOpacity * step(0.0, particlePosition.w);
    vUv = uv;
    float worldSize = particleAttributes.x * particleAttributes.w * uPointSize * SIZE_SCALE;
    gl_Position = billboard(particlePosition.xyz, worldSize);
}
"#;

/// 存储缓冲区作为实例缓冲区时的布局（位置 3..=6）
pub fn instance_layout() -> VertexLayout {
    VertexLayout::packed(StepMode::Instance, 3, &[VertexFormat::Float32x4; 4])
}

/// 初始化状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InitState {
    /// 尚未尝试
    Pending,
    Ready,
    /// 后端不支持或资源创建失败
    Unavailable,
}

#[derive(Debug)]
struct ComputeState {
    particles: GpuBuffer,
    params: GpuBuffer,
    program: GpuProgram,
    batch: Option<QuadBatch>,
}

/// GPU 计算粒子系统
#[derive(Debug)]
pub struct GpuParticles {
    config: GpuParticleConfig,
    initial: Vec<GpuParticle>,
    params: SimulationParams,
    material: ShaderMaterial,
    state: Option<ComputeState>,
    init: InitState,
    time: f32,
    params_dirty: bool,
    dispatch_ready: bool,
}

impl GpuParticles {
    pub fn new(config: GpuParticleConfig) -> EngineResult<Self> {
        config.validate()?;
        let base = &config.base;
        let (color_start, color_end) = config.colors()?;
        let mut rng = match base.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let volume = EmissionVolume::new(base.emission_shape, base.emission_radius, base.emission_size);
        // 初始寿命错开，避免同一帧集中重生
        let initial = (0..base.count)
            .map(|_| {
                let max_life = sample_range(base.lifetime_range, &mut rng);
                GpuParticle {
                    position: (config.emitter_position + volume.sample(&mut rng))
                        .extend(max_life * rng.gen_range(0.05..=1.0))
                        .to_array(),
                    velocity: sample_velocity(base.speed_range, &mut rng).extend(config.mass).to_array(),
                    color: color_start.to_array(),
                    attributes: [sample_range(base.size_range, &mut rng), max_life, 0.0, 1.0],
                }
            })
            .collect();

        let params = SimulationParams {
            delta_time: 0.0,
            time: 0.0,
            particle_count: base.count as u32,
            mouse_influence: 0.0,
            gravity: base.gravity.to_array(),
            damping: config.damping,
            mouse: [0.0; 3],
            turbulence: base.turbulence,
            bounds: config.bounds.to_array(),
            restitution: config.restitution,
            emitter_position: config.emitter_position.to_array(),
            emitter_radius: base.emission_radius,
            life_min: base.lifetime_range[0],
            life_max: base.lifetime_range[1],
            speed_min: base.speed_range[0],
            speed_max: base.speed_range[1],
            size_min: base.size_range[0],
            size_max: base.size_range[1],
            _padding: [0.0; 2],
            color_start: color_start.to_array(),
            color_end: color_end.to_array(),
            emission_size: base.emission_size.to_array(),
            emission_shape: shape_id(base.emission_shape),
        };

        let material = ShaderMaterial::new(
            ShaderConfig {
                name: "gpu-particles".to_string(),
                vertex_shader: format!("{RENDER_VERTEX}#define SIZE_SCALE {SIZE_SCALE:.1}\n{BILLBOARD}{RENDER_MAIN}"),
                fragment_shader: PARTICLE_FRAGMENT.to_string(),
                transparent: true,
                depth_write: false,
                depth_test: true,
                blending: base.blending.into(),
                side: Side::Double,
                ..ShaderConfig::default()
            }
            .with_uniform("uPointSize", base.size)
            .with_uniform("uOpacity", base.opacity),
        )?;

        Ok(Self {
            config,
            initial,
            params,
            material,
            state: None,
            init: InitState::Pending,
            time: 0.0,
            params_dirty: false,
            dispatch_ready: false,
        })
    }

    /// 创建存储缓冲区与计算程序
    ///
    /// 不支持计算着色器或创建失败时返回 `false`（不返回错误）。
    pub fn initialize(&mut self, gpu: &mut GpuContext) -> bool {
        if self.init == InitState::Ready {
            return true;
        }
        if !gpu.capabilities().compute_shaders {
            tracing::warn!(
                target: "chronos::particles",
                backend = gpu.backend_name(),
                "compute shaders unavailable, GPU particles disabled"
            );
            self.init = InitState::Unavailable;
            return false;
        }
        match self.create_state(gpu) {
            Ok(state) => {
                self.state = Some(state);
                self.init = InitState::Ready;
                tracing::info!(
                    target: "chronos::particles",
                    count = self.count(),
                    workgroups = self.workgroup_count(),
                    "GPU particles initialized"
                );
                true
            }
            Err(err) => {
                tracing::warn!(target: "chronos::particles", error = %err, "GPU particle initialization failed");
                self.init = InitState::Unavailable;
                false
            }
        }
    }

    fn create_state(&self, gpu: &mut GpuContext) -> RenderResult<ComputeState> {
        let particles = gpu.create_buffer_init(
            "gpu particles",
            BufferUsage::STORAGE | BufferUsage::VERTEX,
            bytemuck::cast_slice(&self.initial),
        )?;
        let params = gpu.create_buffer_init(
            "gpu particle params",
            BufferUsage::UNIFORM,
            bytemuck::bytes_of(&self.params),
        )?;
        let program = gpu.program(UPDATE_PROGRAM_KEY, || {
            ProgramDescriptor::compute(
                "GPU Particle Update",
                UPDATE_SHADER,
                "update",
                vec![BindingKind::StorageBuffer { read_only: false }, BindingKind::UniformBuffer],
            )
        })?;
        Ok(ComputeState {
            particles,
            params,
            program,
            batch: None,
        })
    }

    pub fn is_initialized(&self) -> bool {
        self.init == InitState::Ready
    }

    pub fn init_state(&self) -> InitState {
        self.init
    }

    /// 推进模拟：只更新参数，计算在下一次提交时执行
    pub fn update(&mut self, delta: f32) {
        if !self.is_initialized() || delta <= 0.0 {
            return;
        }
        self.time += delta;
        self.params.delta_time = delta;
        self.params.time = self.time;
        self.params_dirty = true;
    }

    /// 设置指针吸引点；`influence` 为负时排斥
    pub fn set_mouse(&mut self, position: Vec3, influence: f32) {
        self.params.mouse = position.to_array();
        self.params.mouse_influence = influence;
        self.params_dirty = true;
    }

    pub fn config(&self) -> &GpuParticleConfig {
        &self.config
    }

    pub fn params(&self) -> &SimulationParams {
        &self.params
    }

    /// 上传前的初始粒子数据
    pub fn initial_particles(&self) -> &[GpuParticle] {
        &self.initial
    }

    pub fn count(&self) -> usize {
        self.initial.len()
    }

    /// 覆盖全部粒子所需的工作组数
    pub fn workgroup_count(&self) -> u32 {
        (self.count() as u32).div_ceil(WORKGROUP_SIZE)
    }

    pub fn dispose(&mut self) {
        if self.state.take().is_some() {
            tracing::debug!(target: "chronos::particles", "GPU particles disposed");
        }
        if self.init == InitState::Ready {
            self.init = InitState::Pending;
        }
        self.dispatch_ready = false;
    }
}

impl Drawable for GpuParticles {
    fn label(&self) -> String {
        format!("gpu-particles:{}", self.count())
    }

    fn prepare(&mut self, gpu: &mut GpuContext, view: &ViewState) -> RenderResult<()> {
        if self.init == InitState::Pending {
            self.initialize(gpu);
        }
        let Some(state) = self.state.as_mut() else {
            return Ok(());
        };
        self.dispatch_ready = self.params_dirty;
        if self.params_dirty {
            gpu.write_buffer(&state.params, 0, bytemuck::bytes_of(&self.params))?;
            self.params_dirty = false;
        }
        let batch = QuadBatch::ensure(&mut state.batch, gpu, &self.material, &instance_layout())?;
        batch.write_uniforms(gpu, &self.material, view)
    }

    fn encode_compute(&self, out: &mut Vec<RenderCommand>) {
        if let Some(state) = self.state.as_ref().filter(|_| self.dispatch_ready) {
            out.push(RenderCommand::Dispatch {
                program: state.program.handle(),
                bindings: vec![
                    BindingResource::Buffer(state.particles.handle()),
                    BindingResource::Buffer(state.params.handle()),
                ],
                workgroups: [self.workgroup_count(), 1, 1],
            });
        }
    }

    fn encode(&self, phase: DrawPhase, out: &mut Vec<RenderCommand>) {
        if phase != DrawPhase::Transparent {
            return;
        }
        if let Some(ComputeState {
            particles,
            batch: Some(batch),
            ..
        }) = &self.state
        {
            out.push(batch.draw(particles, self.count() as u32));
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
    use crate::particles::config::ParticleConfig;
    use crate::render::backend::NullBackend;

    fn config(count: usize) -> GpuParticleConfig {
        GpuParticleConfig {
            base: ParticleConfig {
                count,
                seed: Some(3),
                emission_radius: 1.5,
                lifetime_range: [1.0, 2.0],
                ..GpuParticleConfig::default().base
            },
            ..GpuParticleConfig::default()
        }
    }

    #[test]
    fn test_params_layout() {
        assert_eq!(std::mem::size_of::<SimulationParams>(), 160);
        assert_eq!(std::mem::size_of::<GpuParticle>(), 64);
        assert_eq!(instance_layout().stride, 64);
    }

    #[test]
    fn test_initialize_without_compute_is_silent() {
        let mut gpu = GpuContext::new(Box::new(NullBackend::without_compute()));
        let mut particles = GpuParticles::new(config(1000)).unwrap();
        assert!(!particles.initialize(&mut gpu));
        assert_eq!(particles.init_state(), InitState::Unavailable);

        particles.update(0.016);
        particles.prepare(&mut gpu, &ViewState::default()).unwrap();
        let mut commands = Vec::new();
        particles.encode_compute(&mut commands);
        particles.encode(DrawPhase::Transparent, &mut commands);
        assert!(commands.is_empty());
    }

    #[test]
    fn test_dispatch_covers_all_particles() {
        let mut gpu = GpuContext::new(Box::new(NullBackend::new()));
        let mut particles = GpuParticles::new(config(1000)).unwrap();
        particles.prepare(&mut gpu, &ViewState::default()).unwrap();
        assert!(particles.is_initialized());

        // 没有 update 就没有调度
        let mut commands = Vec::new();
        particles.encode_compute(&mut commands);
        assert!(commands.is_empty());

        particles.update(0.016);
        particles.prepare(&mut gpu, &ViewState::default()).unwrap();
        particles.encode_compute(&mut commands);
        match &commands[..] {
            [RenderCommand::Dispatch { workgroups, bindings, .. }] => {
                assert_eq!(*workgroups, [4, 1, 1]);
                assert_eq!(bindings.len(), 2);
            }
            other => panic!("unexpected commands: {other:?}"),
        }

        commands.clear();
        particles.encode(DrawPhase::Transparent, &mut commands);
        assert!(matches!(&commands[..], [RenderCommand::Draw { instance_count: 1000, .. }]));
    }

    #[test]
    fn test_reference_step_respawns_inside_volume() {
        let particles = GpuParticles::new(config(64)).unwrap();
        let mut state = particles.initial_particles().to_vec();
        for particle in &mut state {
            particle.position[3] = 0.001;
        }
        let params = SimulationParams {
            delta_time: 0.016,
            time: 1.0,
            gravity: [0.0; 3],
            turbulence: 0.0,
            ..*particles.params()
        };
        reference_step(&mut state, &params);
        for particle in &state {
            let life = particle.position[3];
            let max_life = particle.attributes[1];
            assert!((1.0..=2.0).contains(&max_life), "{max_life}");
            assert_eq!(life, max_life);
            let position = Vec3::from_slice(&particle.position[..3]);
            // 重生后再积分一步
            let speed = Vec3::from_slice(&particle.velocity[..3]).length();
            assert!(position.length() <= 1.5 + speed * 0.016 + 1e-4);
        }
    }

    #[test]
    fn test_reference_step_respawns_in_emission_shape() {
        let shapes = [
            EmissionShape::Point,
            EmissionShape::Sphere,
            EmissionShape::Box,
            EmissionShape::Cone,
            EmissionShape::Disk,
            EmissionShape::Ring,
            EmissionShape::Torus,
        ];
        let emitter = Vec3::new(1.0, 2.0, 3.0);
        let size = Vec3::new(4.0, 2.0, 6.0);
        for shape in shapes {
            let volume = EmissionVolume::new(shape, 3.0, size);
            let params = SimulationParams {
                time: 2.5,
                particle_count: 128,
                damping: 1.0,
                bounds: [100.0; 3],
                emitter_position: emitter.to_array(),
                emitter_radius: 3.0,
                life_min: 1.0,
                life_max: 2.0,
                emission_size: size.to_array(),
                emission_shape: shape_id(shape),
                ..SimulationParams::zeroed()
            };
            let mut state = vec![GpuParticle::zeroed(); 128];
            reference_step(&mut state, &params);
            for particle in &state {
                let offset = Vec3::from_slice(&particle.position[..3]) - emitter;
                assert!(volume.contains(offset, 1e-3), "{shape:?} {offset}");
            }
        }
    }

    #[test]
    fn test_set_mouse_schedules_dispatch() {
        let mut gpu = GpuContext::new(Box::new(NullBackend::new()));
        let mut particles = GpuParticles::new(config(256)).unwrap();
        particles.prepare(&mut gpu, &ViewState::default()).unwrap();

        particles.set_mouse(Vec3::new(1.0, 0.0, 0.0), 2.0);
        particles.prepare(&mut gpu, &ViewState::default()).unwrap();
        let mut commands = Vec::new();
        particles.encode_compute(&mut commands);
        assert!(matches!(&commands[..], [RenderCommand::Dispatch { .. }]));
        assert_eq!(particles.params().mouse_influence, 2.0);
    }

    #[test]
    fn test_reference_step_bounces_off_bounds() {
        let mut state = vec![GpuParticle {
            position: [9.99, 0.0, 0.0, 5.0],
            velocity: [10.0, 0.0, 0.0, 1.0],
            color: [1.0; 4],
            attributes: [0.1, 5.0, 0.0, 1.0],
        }];
        let params = SimulationParams {
            delta_time: 0.1,
            particle_count: 1,
            damping: 1.0,
            bounds: [10.0; 3],
            restitution: 0.5,
            life_max: 5.0,
            ..SimulationParams::zeroed()
        };
        reference_step(&mut state, &params);
        assert_eq!(state[0].position[0], 10.0);
        assert_eq!(state[0].velocity[0], -5.0);
        assert!((state[0].position[3] - 4.9).abs() < 1e-5);
    }
}
