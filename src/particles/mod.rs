//! 粒子系统
//!
//! 三种可互换的策略共用同一套配置：
//! - [`ParticleSystem`] - CPU 固定容量池，轨迹在顶点着色器中解析计算
//! - [`GpuParticles`] - 计算着色器模拟，状态常驻存储缓冲区
//! - [`InteractiveParticles`] - 指针驱动的位移与弹簧回位
//!
//! 三者都实现 [`Drawable`](crate::render::scene::Drawable)，
//! 以实例化四边形在透明阶段绘制。

pub mod config;
pub mod cpu;
pub mod emission;
pub mod gpu;
pub mod interactive;
pub mod presets;
mod quad;

pub use config::{
    ColorMode, EmissionShape, GpuParticleConfig, InteractionType, InteractiveParticleConfig, ParticleBlending,
    ParticleConfig, ParticleConfigPatch,
};
pub use cpu::{Particle, ParticleSystem};
pub use gpu::{reference_step, GpuParticle, GpuParticles, SimulationParams, WORKGROUP_SIZE};
pub use interactive::{interaction_offset, InteractiveParticles};
pub use presets::{create_particle_system, ParticlePreset};
