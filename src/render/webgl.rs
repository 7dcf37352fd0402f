//! WebGL2 渲染引擎
//!
//! 光栅化后端，不支持计算着色器；WebGPU 不可用时作为回退。

use super::backend::RenderBackend;
use super::engine::{EngineCore, EngineOptions, RenderEngine};
use super::wgpu_backend::{BackendKind, WgpuBackend, WgpuBackendOptions};

/// WebGL2 引擎
pub struct WebGlEngine {
    core: EngineCore,
}

impl WebGlEngine {
    pub fn new(options: EngineOptions) -> Self {
        Self {
            core: EngineCore::new(options),
        }
    }

    /// 创建 GL 后端；失败返回 `false`
    pub async fn initialize(&mut self) -> bool {
        let (width, height) = self.core.render_size();
        let options = WgpuBackendOptions {
            kind: BackendKind::WebGl,
            power_preference: self.core.options().power_preference,
            width,
            height,
        };
        match WgpuBackend::new(options).await {
            Ok(backend) => self.initialize_with(Box::new(backend)),
            Err(error) => {
                tracing::error!(target: "chronos::webgl", %error, "failed to create WebGL backend");
                false
            }
        }
    }

    /// 使用给定后端初始化（测试中传入 `NullBackend`）
    pub fn initialize_with(&mut self, backend: Box<dyn RenderBackend>) -> bool {
        match self.core.attach(backend) {
            Ok(()) => true,
            Err(error) => {
                tracing::error!(target: "chronos::webgl", %error, "WebGL engine initialization failed");
                false
            }
        }
    }
}

impl RenderEngine for WebGlEngine {
    fn core(&self) -> &EngineCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut EngineCore {
        &mut self.core
    }

    fn backend(&self) -> &'static str {
        BackendKind::WebGl.name()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::backend::NullBackend;

    #[test]
    fn test_initialize_with_null_backend() {
        let mut engine = WebGlEngine::new(EngineOptions::default());
        assert!(engine.initialize_with(Box::new(NullBackend::without_compute())));
        assert!(engine.core().is_initialized());
        assert_eq!(engine.backend(), "webgl");
        engine.dispose();
        assert!(!engine.initialize_with(Box::new(NullBackend::new())));
    }
}
