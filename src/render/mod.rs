//! 渲染系统
//!
//! - `backend` - 后端接口、命令列表与无头记录后端
//! - `wgpu_backend` - wgpu 实现（WebGL2 / WebGPU）
//! - `context` - RAII 资源与延迟回收
//! - `engine` / `webgl` / `webgpu` - 渲染引擎
//! - `pipeline` / `gbuffer` / `quality` - 渲染通道与画质
//! - `lighting` / `postprocess` - 光照、阴影与后处理链
//! - `frame_loop` / `metrics` - 帧循环与性能指标
//! - `scene` / `camera` - 可绘制对象与相机

pub mod backend;
pub mod camera;
pub mod context;
pub mod engine;
pub mod frame_loop;
pub mod gbuffer;
pub mod lighting;
pub mod metrics;
pub mod pipeline;
pub mod postprocess;
pub mod quality;
pub mod scene;
pub mod webgl;
pub mod webgpu;
pub mod wgpu_backend;

pub use backend::{
    BackendCapabilities, BackendEvent, BlendMode, BufferHandle, NullBackend, ProgramHandle, Recording,
    RenderBackend, RenderCommand, RenderTarget, TextureHandle,
};
pub use camera::{Camera, Ray};
pub use context::{GpuBuffer, GpuContext, GpuProgram, GpuTexture};
pub use engine::{EngineCore, EngineOptions, RenderEngine};
pub use frame_loop::{FrameInfo, LoopHandle, Unsubscribe};
pub use gbuffer::GBuffer;
pub use lighting::{Light, LightKind, LightingRig, ShadowMap};
pub use metrics::{MetricsSampler, PerformanceMetrics};
pub use pipeline::{RenderPassConfig, RenderPassType, RenderPipeline};
pub use postprocess::{PostProcessComposer, PostProcessConfig, PostProcessPreset};
pub use quality::{QualityLevel, QualityPatch, QualityTier, TextureQuality};
pub use scene::{DrawPhase, Drawable, DrawableId, Geometry, Mesh, Scene};
pub use webgl::WebGlEngine;
pub use webgpu::WebGpuEngine;
pub use wgpu_backend::{BackendKind, WgpuBackend, WgpuBackendOptions};
