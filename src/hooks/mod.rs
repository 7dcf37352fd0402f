//! 集成接口
//!
//! UI 层只通过这里的类型使用渲染引擎。

pub mod animation;
pub mod input;
pub mod shader;
pub mod webgpu;

pub use animation::AnimationController;
pub use input::{Mouse3D, PerformanceHook, ViewportSize};
pub use shader::{use_particles, use_shader, ParticleField, ParticleFieldOptions, ShaderHandle};
pub use webgpu::{probe_webgpu, WebGpuCapabilities, WebGpuProbe};
