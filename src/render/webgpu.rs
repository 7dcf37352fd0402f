//! WebGPU 渲染引擎
//!
//! 在 WebGL 引擎的基础上额外负责 GPU 粒子的计算调度。
//! 初始化失败（无适配器、设备请求被拒、不支持计算着色器）时返回 `false`，
//! 由调用方回退到 [`WebGlEngine`](super::webgl::WebGlEngine)。

use super::backend::RenderBackend;
use super::engine::{EngineCore, EngineOptions, RenderEngine};
use super::wgpu_backend::{BackendKind, WgpuBackend, WgpuBackendOptions};
use crate::core::error::{EngineError, EngineResult};
use crate::particles::{GpuParticleConfig, GpuParticles};
use std::cell::RefCell;
use std::rc::Rc;

/// WebGPU 引擎
pub struct WebGpuEngine {
    core: EngineCore,
}

impl WebGpuEngine {
    pub fn new(options: EngineOptions) -> Self {
        Self {
            core: EngineCore::new(options),
        }
    }

    /// 请求 WebGPU 适配器与设备；不可用时返回 `false`
    pub async fn initialize(&mut self) -> bool {
        let (width, height) = self.core.render_size();
        let options = WgpuBackendOptions {
            kind: BackendKind::WebGpu,
            power_preference: self.core.options().power_preference,
            width,
            height,
        };
        match WgpuBackend::new(options).await {
            Ok(backend) => self.initialize_with(Box::new(backend)),
            Err(error) => {
                tracing::warn!(target: "chronos::webgpu", %error, "WebGPU unavailable");
                false
            }
        }
    }

    /// 使用给定后端初始化；后端不支持计算着色器时拒绝
    pub fn initialize_with(&mut self, backend: Box<dyn RenderBackend>) -> bool {
        if !backend.capabilities().compute_shaders {
            tracing::warn!(target: "chronos::webgpu", backend = backend.name(), "compute shaders not supported");
            return false;
        }
        match self.core.attach(backend) {
            Ok(()) => true,
            Err(error) => {
                tracing::error!(target: "chronos::webgpu", %error, "WebGPU engine initialization failed");
                false
            }
        }
    }

    /// 创建 GPU 粒子并加入场景
    ///
    /// 返回的共享句柄用于在帧回调中调用 `update` / `set_mouse`。
    pub fn add_gpu_particles(&mut self, config: GpuParticleConfig) -> EngineResult<Rc<RefCell<GpuParticles>>> {
        let mut particles = GpuParticles::new(config)?;
        let gpu = self
            .core
            .gpu_mut()
            .ok_or_else(|| EngineError::Init("WebGPU engine is not initialized".to_string()))?;
        if !particles.initialize(gpu) {
            return Err(EngineError::Init("GPU particle initialization failed".to_string()));
        }
        let (_, shared) = self.core.scene_mut().add_shared(particles);
        Ok(shared)
    }
}

impl RenderEngine for WebGpuEngine {
    fn core(&self) -> &EngineCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut EngineCore {
        &mut self.core
    }

    fn backend(&self) -> &'static str {
        BackendKind::WebGpu.name()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::backend::NullBackend;

    #[test]
    fn test_rejects_backend_without_compute() {
        let mut engine = WebGpuEngine::new(EngineOptions::default());
        assert!(!engine.initialize_with(Box::new(NullBackend::without_compute())));
        assert!(!engine.core().is_initialized());
        assert!(engine.initialize_with(Box::new(NullBackend::new())));
    }

    #[test]
    fn test_gpu_particles_require_initialization() {
        let mut engine = WebGpuEngine::new(EngineOptions::default());
        assert!(engine.add_gpu_particles(GpuParticleConfig::default()).is_err());
        assert!(engine.initialize_with(Box::new(NullBackend::new())));
        let particles = engine
            .add_gpu_particles(GpuParticleConfig {
                base: crate::particles::ParticleConfig {
                    count: 256,
                    ..Default::default()
                },
                ..Default::default()
            })
            .unwrap();
        assert!(particles.borrow().is_initialized());
        assert_eq!(engine.core().scene().len(), 1);
    }
}
