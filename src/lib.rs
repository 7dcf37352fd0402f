//! # Chronos Render
//!
//! 仪表盘装饰层使用的 3D 渲染引擎。
//!
//! ## Features
//!
//! - **双后端**: WebGPU（含计算着色器）与 WebGL2，WebGPU 不可用时自动回退
//! - **着色器材质**: 可组合的 GLSL 函数库、材质工厂与命名预设
//! - **渲染管线**: 按优先级排序、受画质开关控制的渲染通道，可选 G-Buffer 延迟光照
//! - **粒子**: CPU 固定容量池、GPU 计算模拟、指针交互三种策略
//! - **自适应画质**: 性能监视器驱动设备像素比，像素比决定画质档位
//!
//! ### Example
//!
//! ```ignore
//! use chronos_render::config::EngineConfig;
//! use chronos_render::scene::{Scene3D, Scene3DPreset};
//!
//! let mut scene = Scene3D::from_preset(Scene3DPreset::Dashboard, EngineConfig::load_or_default());
//! let backend = scene.mount().await?;
//! scene.tick(now)?;
//! ```
//!
//! ## Modules
//!
//! - [`core`]: 错误类型、日志与工具函数
//! - [`config`]: TOML/JSON 配置与环境变量覆盖
//! - [`render`]: 后端、引擎、管线、光照与后处理
//! - [`shaders`]: 着色器库与材质工厂
//! - [`particles`]: 粒子策略
//! - [`scene`]: 场景编排与自适应 DPR
//! - [`hooks`]: 供 UI 层使用的集成接口

/// Core infrastructure: errors, logging, macros
#[macro_use]
pub mod core;
/// Configuration system
pub mod config;
/// Rendering backends, engines and passes
pub mod render;
/// Shader library and material factory
pub mod shaders;
/// CPU, GPU and interactive particle strategies
pub mod particles;
/// Scene orchestration and adaptive pixel ratio
pub mod scene;
/// Integration surface for the UI layer
pub mod hooks;

#[cfg(target_arch = "wasm32")]
use wasm_bindgen::prelude::*;

#[cfg(target_arch = "wasm32")]
#[wasm_bindgen(start)]
pub fn start() {
    console_error_panic_hook::set_once();
    core::init_logging(&config::LoggingConfig::default());
}

/// 宿主页面探测 WebGPU 是否可用
#[cfg(target_arch = "wasm32")]
#[wasm_bindgen(js_name = probeWebGpu)]
pub async fn probe_webgpu_supported() -> bool {
    hooks::probe_webgpu(config::PowerPreference::HighPerformance)
        .await
        .is_supported
}
