//! 场景编排
//!
//! `Scene3D` 把相机、轨道控制器、环境光照与后处理预设接到一个后端引擎上，
//! 并根据性能监视器的事件调整设备像素比。
//!
//! DPR 是画质的唯一来源：每次调整都把 DPR 吸附到步进网格，
//! 再用 [`QualityTier::from_dpr`] 推导档位，两者一起写入引擎。
//! 除 `Scene3D` 外没有其他地方修改 DPR 或档位。

use super::controls::OrbitControls;
use super::monitor::{MonitorEvent, PerformanceMonitor};
use super::presets::{EnvironmentPreset, Scene3DConfig, Scene3DPreset};
use crate::config::{BackendPreference, EngineConfig};
use crate::core::error::{EngineError, EngineResult, RenderResult};
use crate::render::backend::RenderBackend;
use crate::render::camera::Camera;
use crate::render::engine::{EngineOptions, RenderEngine};
use crate::render::postprocess::PostProcessPreset;
use crate::render::quality::{QualityPatch, QualityTier};
use crate::render::webgl::WebGlEngine;
use crate::render::webgpu::WebGpuEngine;
use std::time::Duration;

/// 当前挂载的后端引擎
pub enum ActiveEngine {
    WebGpu(WebGpuEngine),
    WebGl(WebGlEngine),
}

impl ActiveEngine {
    pub fn as_engine(&self) -> &dyn RenderEngine {
        match self {
            ActiveEngine::WebGpu(engine) => engine,
            ActiveEngine::WebGl(engine) => engine,
        }
    }

    pub fn as_engine_mut(&mut self) -> &mut dyn RenderEngine {
        match self {
            ActiveEngine::WebGpu(engine) => engine,
            ActiveEngine::WebGl(engine) => engine,
        }
    }

    pub fn name(&self) -> &'static str {
        self.as_engine().backend()
    }
}

/// 受管理的 3D 画布
pub struct Scene3D {
    config: Scene3DConfig,
    engine_config: EngineConfig,
    engine: Option<ActiveEngine>,
    controls: Option<OrbitControls>,
    monitor: PerformanceMonitor,
    pixel_ratio: f32,
    tier: QualityTier,
    adaptive: bool,
    last_tick: Option<Duration>,
}

impl Scene3D {
    pub fn new(config: Scene3DConfig, engine_config: EngineConfig) -> Self {
        let pixel_ratio = engine_config.graphics.pixel_ratio.snap(config.initial_dpr);
        let controls = config.controls.clone().map(|controls| {
            let camera = Camera::new(config.camera_position, config.fov);
            OrbitControls::from_camera(&camera, controls)
        });
        Self {
            monitor: PerformanceMonitor::new(engine_config.performance.monitor.clone()),
            tier: QualityTier::from_dpr(pixel_ratio),
            adaptive: config.adaptive,
            pixel_ratio,
            controls,
            engine: None,
            last_tick: None,
            config,
            engine_config,
        }
    }

    pub fn from_preset(preset: Scene3DPreset, engine_config: EngineConfig) -> Self {
        Self::new(preset.config(), engine_config)
    }

    /// 当前 DPR 与档位对应的引擎参数
    fn engine_options(&self) -> EngineOptions {
        let mut options = EngineOptions::from_config(&self.engine_config);
        options.pixel_ratio = self.pixel_ratio;
        options.quality = self.tier.level();
        options.camera = Camera::new(self.config.camera_position, self.config.fov);
        options.post_processing = self.config.post_processing.config();
        options.clear_color = self.config.environment.clear_color();
        options
    }

    /// 按后端偏好挂载引擎；`Auto` 时 WebGPU 失败回退到 WebGL
    pub async fn mount(&mut self) -> EngineResult<&'static str> {
        let preference = self.engine_config.graphics.backend;
        if preference != BackendPreference::WebGl {
            let mut engine = WebGpuEngine::new(self.engine_options());
            if engine.initialize().await {
                return self.install(ActiveEngine::WebGpu(engine));
            }
            if preference == BackendPreference::WebGpu {
                return Err(EngineError::Init("WebGPU backend unavailable".to_string()));
            }
            tracing::info!(target: "chronos::scene", "falling back to WebGL");
        }
        let mut engine = WebGlEngine::new(self.engine_options());
        if !engine.initialize().await {
            return Err(EngineError::Init("no render backend available".to_string()));
        }
        self.install(ActiveEngine::WebGl(engine))
    }

    /// 使用给定后端挂载，规则与 [`mount`](Self::mount) 相同
    pub fn mount_with(
        &mut self,
        webgpu: Option<Box<dyn RenderBackend>>,
        webgl: Box<dyn RenderBackend>,
    ) -> EngineResult<&'static str> {
        let preference = self.engine_config.graphics.backend;
        if preference != BackendPreference::WebGl {
            if let Some(backend) = webgpu {
                let mut engine = WebGpuEngine::new(self.engine_options());
                if engine.initialize_with(backend) {
                    return self.install(ActiveEngine::WebGpu(engine));
                }
            }
            if preference == BackendPreference::WebGpu {
                return Err(EngineError::Init("WebGPU backend unavailable".to_string()));
            }
            tracing::info!(target: "chronos::scene", "falling back to WebGL");
        }
        let mut engine = WebGlEngine::new(self.engine_options());
        if !engine.initialize_with(webgl) {
            return Err(EngineError::Init("no render backend available".to_string()));
        }
        self.install(ActiveEngine::WebGl(engine))
    }

    fn install(&mut self, mut engine: ActiveEngine) -> EngineResult<&'static str> {
        if let Some(previous) = self.engine.as_mut() {
            previous.as_engine_mut().dispose();
        }
        let core = engine.as_engine_mut().core_mut();
        core.set_lighting(self.config.environment.rig());
        core.set_clear_color(self.config.environment.clear_color());
        engine.as_engine_mut().start_render_loop();

        let name = engine.name();
        tracing::info!(
            target: "chronos::scene",
            backend = name,
            dpr = self.pixel_ratio,
            tier = %self.tier,
            "scene mounted"
        );
        self.engine = Some(engine);
        self.monitor.reset();
        self.last_tick = None;
        Ok(name)
    }

    pub fn config(&self) -> &Scene3DConfig {
        &self.config
    }

    pub fn engine(&self) -> Option<&dyn RenderEngine> {
        self.engine.as_ref().map(ActiveEngine::as_engine)
    }

    pub fn engine_mut(&mut self) -> Option<&mut dyn RenderEngine> {
        self.engine.as_mut().map(ActiveEngine::as_engine_mut)
    }

    /// WebGPU 引擎（GPU 粒子需要）
    pub fn webgpu_mut(&mut self) -> Option<&mut WebGpuEngine> {
        match self.engine.as_mut() {
            Some(ActiveEngine::WebGpu(engine)) => Some(engine),
            _ => None,
        }
    }

    pub fn backend(&self) -> Option<&'static str> {
        self.engine.as_ref().map(ActiveEngine::name)
    }

    pub fn pixel_ratio(&self) -> f32 {
        self.pixel_ratio
    }

    pub fn tier(&self) -> QualityTier {
        self.tier
    }

    pub fn is_adaptive(&self) -> bool {
        self.adaptive
    }

    pub fn monitor(&self) -> &PerformanceMonitor {
        &self.monitor
    }

    pub fn controls_mut(&mut self) -> Option<&mut OrbitControls> {
        self.controls.as_mut()
    }

    /// 设置 DPR；返回吸附后的值
    ///
    /// DPR 与推导出的档位一起写入引擎。
    pub fn set_pixel_ratio(&mut self, dpr: f32) -> RenderResult<f32> {
        let snapped = self.engine_config.graphics.pixel_ratio.snap(dpr);
        let tier = QualityTier::from_dpr(snapped);
        if let Some(engine) = self.engine.as_mut() {
            let core = engine.as_engine_mut().core_mut();
            if tier != self.tier {
                core.set_quality(&QualityPatch::from(tier.level()))?;
            }
            core.set_pixel_ratio(snapped)?;
        }
        if tier != self.tier || snapped != self.pixel_ratio {
            tracing::info!(
                target: "chronos::scene",
                from = self.pixel_ratio,
                to = snapped,
                tier = %tier,
                "pixel ratio changed"
            );
        }
        self.pixel_ratio = snapped;
        self.tier = tier;
        Ok(snapped)
    }

    /// 响应性能监视器事件
    pub fn handle_monitor_event(&mut self, event: MonitorEvent) -> RenderResult<()> {
        let step = self.engine_config.graphics.pixel_ratio.step;
        match event {
            MonitorEvent::Incline { .. } => {
                self.set_pixel_ratio(self.pixel_ratio + step)?;
            }
            MonitorEvent::Decline { .. } => {
                self.set_pixel_ratio(self.pixel_ratio - step)?;
            }
            MonitorEvent::Fallback => {
                self.adaptive = false;
                tracing::warn!(
                    target: "chronos::scene",
                    dpr = self.pixel_ratio,
                    "adaptive pixel ratio disabled"
                );
            }
        }
        Ok(())
    }

    /// 推进一帧：控制器、渲染、性能反馈
    pub fn tick(&mut self, now: Duration) -> RenderResult<bool> {
        let delta = self
            .last_tick
            .map(|last| now.saturating_sub(last).as_secs_f32())
            .unwrap_or(0.0);
        self.last_tick = Some(now);

        let Some(engine) = self.engine.as_mut() else {
            return Ok(false);
        };
        let engine = engine.as_engine_mut();
        if let Some(controls) = self.controls.as_mut() {
            controls.update(delta, engine.core_mut().camera_mut());
        }
        let rendered = engine.tick(now)?;

        if rendered && self.adaptive {
            if let Some(event) = self.monitor.record_frame(now) {
                self.handle_monitor_event(event)?;
            }
        }
        Ok(rendered)
    }

    /// 调整画布尺寸（CSS 像素）
    pub fn resize(&mut self, width: u32, height: u32) -> RenderResult<()> {
        match self.engine.as_mut() {
            Some(engine) => engine.as_engine_mut().resize(width, height),
            None => {
                self.engine_config.graphics.resolution.width = width;
                self.engine_config.graphics.resolution.height = height;
                Ok(())
            }
        }
    }

    pub fn set_environment(&mut self, environment: EnvironmentPreset) {
        self.config.environment = environment;
        if let Some(engine) = self.engine_mut() {
            let core = engine.core_mut();
            core.set_lighting(environment.rig());
            core.set_clear_color(environment.clear_color());
        }
    }

    pub fn set_post_processing(&mut self, preset: PostProcessPreset) {
        self.config.post_processing = preset;
        if let Some(engine) = self.engine_mut() {
            engine.core_mut().set_post_processing(preset.config());
        }
    }

    /// 释放引擎；重复调用无副作用
    pub fn dispose(&mut self) {
        if let Some(mut engine) = self.engine.take() {
            engine.as_engine_mut().dispose();
            tracing::info!(target: "chronos::scene", "scene disposed");
        }
    }
}

impl Drop for Scene3D {
    fn drop(&mut self) {
        self.dispose();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::backend::NullBackend;

    fn scene(preset: Scene3DPreset) -> Scene3D {
        Scene3D::from_preset(preset, EngineConfig::default())
    }

    #[test]
    fn test_falls_back_to_webgl_without_compute() {
        let mut scene = scene(Scene3DPreset::Dashboard);
        let backend = scene
            .mount_with(
                Some(Box::new(NullBackend::without_compute())),
                Box::new(NullBackend::without_compute()),
            )
            .unwrap();
        assert_eq!(backend, "webgl");
        assert!(scene.engine().unwrap().is_running());
    }

    #[test]
    fn test_prefers_webgpu() {
        let mut scene = scene(Scene3DPreset::Hero);
        let backend = scene
            .mount_with(Some(Box::new(NullBackend::new())), Box::new(NullBackend::new()))
            .unwrap();
        assert_eq!(backend, "webgpu");
        assert!(scene.webgpu_mut().is_some());
    }

    #[test]
    fn test_webgpu_only_preference_fails() {
        let mut config = EngineConfig::default();
        config.graphics.backend = BackendPreference::WebGpu;
        let mut scene = Scene3D::from_preset(Scene3DPreset::Minimal, config);
        assert!(scene.mount_with(None, Box::new(NullBackend::new())).is_err());
        assert!(scene.engine().is_none());
    }

    #[test]
    fn test_pixel_ratio_drives_tier() {
        let mut scene = scene(Scene3DPreset::Dashboard);
        scene
            .mount_with(None, Box::new(NullBackend::without_compute()))
            .unwrap();
        assert_eq!(scene.tier(), QualityTier::High);

        assert_eq!(scene.set_pixel_ratio(0.6).unwrap(), 0.5);
        assert_eq!(scene.tier(), QualityTier::Low);
        let core = scene.engine().unwrap().core();
        assert_eq!(core.pixel_ratio(), 0.5);
        assert_eq!(core.quality().name, "low");
        assert!(!core.quality().shadows);
    }

    #[test]
    fn test_monitor_events_step_dpr() {
        let mut scene = scene(Scene3DPreset::Dashboard);
        scene
            .mount_with(None, Box::new(NullBackend::without_compute()))
            .unwrap();
        scene.handle_monitor_event(MonitorEvent::Decline { fps: 30.0 }).unwrap();
        assert_eq!(scene.pixel_ratio(), 1.0);
        assert_eq!(scene.tier(), QualityTier::Medium);
        scene.handle_monitor_event(MonitorEvent::Incline { fps: 60.0 }).unwrap();
        scene.handle_monitor_event(MonitorEvent::Incline { fps: 60.0 }).unwrap();
        scene.handle_monitor_event(MonitorEvent::Incline { fps: 60.0 }).unwrap();
        assert_eq!(scene.pixel_ratio(), 2.0);
        assert_eq!(scene.tier(), QualityTier::Ultra);

        scene.handle_monitor_event(MonitorEvent::Fallback).unwrap();
        assert!(!scene.is_adaptive());
    }

    #[test]
    fn test_dispose_releases_engine() {
        let mut scene = scene(Scene3DPreset::Ambient);
        scene
            .mount_with(None, Box::new(NullBackend::without_compute()))
            .unwrap();
        assert!(scene.tick(Duration::from_millis(16)).unwrap());
        scene.dispose();
        scene.dispose();
        assert!(scene.backend().is_none());
        assert!(!scene.tick(Duration::from_millis(32)).unwrap());
    }
}
