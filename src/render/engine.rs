//! 渲染引擎核心
//!
//! `EngineCore` 持有 GPU 上下文、渲染管线、场景、光照、后处理、帧循环与指标，
//! 两个后端引擎（[`WebGlEngine`](super::webgl::WebGlEngine)、
//! [`WebGpuEngine`](super::webgpu::WebGpuEngine)）只负责创建后端并包装它。
//!
//! 每帧的固定顺序：
//! 1. 帧回调
//! 2. 场景准备（上传 uniform）
//! 3. 计算调度
//! 4. 按优先级编码渲染通道
//! 5. 提交
//! 6. 指标采样
//! 7. 回收已释放的 GPU 资源

use super::backend::{BackendCapabilities, RenderBackend, RenderCommand, RenderTarget};
use super::camera::Camera;
use super::context::GpuContext;
use super::frame_loop::{FrameInfo, FrameLoop, LoopHandle, Unsubscribe};
use super::lighting::{DeferredLighting, LightingRig};
use super::metrics::{MetricsSampler, PerformanceMetrics};
use super::pipeline::{RenderPassConfig, RenderPassType, RenderPipeline};
use super::postprocess::{PostProcessComposer, PostProcessConfig};
use super::quality::{QualityLevel, QualityPatch};
use super::scene::{DrawPhase, Scene, ViewState};
use crate::config::{EngineConfig, PowerPreference};
use crate::core::error::{CallbackError, RenderError, RenderResult};
use glam::Vec2;
use std::time::Duration;

/// 引擎创建参数
#[derive(Debug, Clone)]
pub struct EngineOptions {
    /// 画布尺寸（CSS 像素）
    pub width: u32,
    pub height: u32,
    pub pixel_ratio: f32,
    pub quality: QualityLevel,
    /// 分配 G-Buffer 并走延迟光照
    pub deferred: bool,
    pub clear_color: [f32; 4],
    pub camera: Camera,
    pub post_processing: PostProcessConfig,
    pub power_preference: PowerPreference,
    pub metrics_window: Duration,
    pub memory_budget_mb: u64,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self::from_config(&EngineConfig::default())
    }
}

impl EngineOptions {
    pub fn from_config(config: &EngineConfig) -> Self {
        let graphics = &config.graphics;
        Self {
            width: graphics.resolution.width,
            height: graphics.resolution.height,
            pixel_ratio: graphics.pixel_ratio.initial,
            quality: graphics.quality.level(),
            deferred: graphics.deferred,
            clear_color: [0.0, 0.0, 0.0, 0.0],
            camera: Camera::default(),
            post_processing: PostProcessConfig::default(),
            power_preference: graphics.power_preference,
            metrics_window: Duration::from_millis(config.performance.metrics_window_ms),
            memory_budget_mb: graphics.memory_budget_mb,
        }
    }
}

/// 两个后端引擎共享的状态
pub struct EngineCore {
    gpu: Option<GpuContext>,
    options: EngineOptions,
    quality: QualityLevel,
    pipeline: RenderPipeline,
    scene: Scene,
    camera: Camera,
    lighting: LightingRig,
    deferred_lighting: DeferredLighting,
    composer: PostProcessComposer,
    frame_loop: FrameLoop,
    metrics: MetricsSampler,
    size: (u32, u32),
    pixel_ratio: f32,
    shadows_dirty: bool,
    disposed: bool,
}

impl EngineCore {
    pub fn new(options: EngineOptions) -> Self {
        let mut camera = options.camera.clone();
        camera.set_viewport(options.width, options.height);
        Self {
            gpu: None,
            quality: options.quality.clone(),
            pipeline: RenderPipeline::with_default_passes(&options.quality),
            scene: Scene::new(),
            camera,
            lighting: LightingRig::default(),
            deferred_lighting: DeferredLighting::new(),
            composer: PostProcessComposer::new(options.post_processing.clone()),
            frame_loop: FrameLoop::new(),
            metrics: MetricsSampler::new(options.metrics_window, options.memory_budget_mb * 1024 * 1024),
            size: (options.width.max(1), options.height.max(1)),
            pixel_ratio: options.pixel_ratio,
            shadows_dirty: true,
            disposed: false,
            options,
        }
    }

    /// 接管后端并创建所有尺寸相关的目标
    pub fn attach(&mut self, backend: Box<dyn RenderBackend>) -> RenderResult<()> {
        if self.disposed {
            return Err(RenderError::InvalidState("engine has been disposed".to_string()));
        }
        let mut gpu = GpuContext::new(backend);
        let (width, height) = self.render_size();
        gpu.resize(width, height);
        if self.options.deferred {
            self.pipeline.initialize_gbuffer(&mut gpu, width, height)?;
        }
        self.composer.resize(&mut gpu, width, height)?;
        self.lighting.rebuild_shadow_maps(&mut gpu, &self.quality)?;
        self.shadows_dirty = false;

        tracing::info!(
            target: "chronos::engine",
            backend = gpu.backend_name(),
            width,
            height,
            quality = %self.quality.name,
            deferred = self.options.deferred,
            "render engine initialized"
        );
        self.gpu = Some(gpu);
        Ok(())
    }

    pub fn is_initialized(&self) -> bool {
        self.gpu.is_some()
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed
    }

    pub fn options(&self) -> &EngineOptions {
        &self.options
    }

    /// 渲染像素尺寸：CSS 尺寸 × DPR × 分辨率缩放
    pub fn render_size(&self) -> (u32, u32) {
        let scale = self.pixel_ratio * self.quality.resolution_scale;
        let scaled = |v: u32| ((v as f32 * scale).round() as u32).max(1);
        (scaled(self.size.0), scaled(self.size.1))
    }

    pub fn size(&self) -> (u32, u32) {
        self.size
    }

    pub fn pixel_ratio(&self) -> f32 {
        self.pixel_ratio
    }

    pub fn start(&mut self) -> bool {
        let started = self.frame_loop.start();
        if started {
            tracing::debug!(target: "chronos::engine", "render loop started");
        }
        started
    }

    /// 在帧回调内调用时，循环在本帧结束后停止
    pub fn stop(&mut self) {
        self.frame_loop.stop();
    }

    pub fn is_running(&self) -> bool {
        self.frame_loop.is_running()
    }

    pub fn loop_handle(&self) -> LoopHandle {
        self.frame_loop.handle()
    }

    pub fn frame_count(&self) -> u64 {
        self.frame_loop.frame_count()
    }

    pub fn on_render<F>(&self, callback: F) -> Unsubscribe
    where
        F: FnMut(&FrameInfo) -> Result<(), CallbackError> + 'static,
    {
        self.frame_loop.callbacks().register(Box::new(callback))
    }

    /// 驱动一帧；循环未运行时返回 `Ok(false)`
    pub fn tick(&mut self, now: Duration) -> RenderResult<bool> {
        if !self.is_initialized() {
            return Err(RenderError::NotInitialized);
        }
        let Some(info) = self.frame_loop.begin(now) else {
            return Ok(false);
        };
        self.frame_loop.callbacks().run(&info);
        let result = self.render_frame(&info, now);
        self.frame_loop.end();
        result.map(|_| true)
    }

    fn view_state(&self, info: &FrameInfo, shadows: bool, deferred: bool) -> ViewState {
        let (width, height) = self.render_size();
        ViewState {
            view: self.camera.view_matrix(),
            projection: self.camera.projection_matrix(),
            camera_position: self.camera.position,
            time: info.elapsed.as_secs_f32(),
            delta: info.delta,
            viewport: Vec2::new(width as f32, height as f32),
            pixel_ratio: self.pixel_ratio,
            shadow_view_projection: if shadows {
                self.lighting.shadow_view_projection()
            } else {
                None
            },
            deferred,
        }
    }

    fn render_frame(&mut self, info: &FrameInfo, now: Duration) -> RenderResult<()> {
        let passes = self.pipeline.active_passes();
        let has = |pass_type: RenderPassType| passes.iter().any(|pass| pass.pass_type == pass_type);
        let deferred = self.pipeline.gbuffer().is_some();
        let post = has(RenderPassType::PostProcessing) && self.composer.is_active();
        let shadows = has(RenderPassType::Shadows) && self.scene.has_shadow_casters();

        let gpu = self.gpu.as_mut().ok_or(RenderError::NotInitialized)?;
        if gpu.is_lost() {
            return Err(RenderError::ContextLost);
        }
        if self.shadows_dirty {
            self.lighting.rebuild_shadow_maps(gpu, &self.quality)?;
            self.shadows_dirty = false;
        }
        let shadows = shadows && self.lighting.primary_shadow_map().is_some();

        let view = self.view_state(info, shadows, deferred);
        let gpu = self.gpu.as_mut().ok_or(RenderError::NotInitialized)?;
        let failures = self.scene.prepare(gpu, &view);
        if failures > 0 {
            tracing::debug!(target: "chronos::engine", failures, "some drawables skipped this frame");
        }
        if post {
            self.composer.prepare(gpu, view.time)?;
        }
        if deferred {
            self.deferred_lighting.prepare(gpu, &self.lighting, &view, &self.quality)?;
        }

        let mut commands = Vec::new();
        self.scene.encode_compute(&mut commands);

        let (scene_color, scene_depth) = match (post, self.composer.scene_color(), self.composer.scene_depth()) {
            (true, Some(color), Some(depth)) => (RenderTarget::Texture(color), RenderTarget::Texture(depth)),
            _ => (RenderTarget::Surface, RenderTarget::Surface),
        };
        for pass in passes.iter() {
            self.encode_pass(pass, shadows, post, scene_color, scene_depth, &mut commands);
        }

        let gpu = self.gpu.as_mut().ok_or(RenderError::NotInitialized)?;
        gpu.submit(&commands)?;
        self.metrics.record_frame(now, gpu);
        gpu.collect_garbage();
        Ok(())
    }

    fn clear_color(&self, pass: &RenderPassConfig) -> [f32; 4] {
        match pass.clear_color {
            Some([r, g, b]) => [r, g, b, pass.clear_alpha.unwrap_or(1.0)],
            None => self.options.clear_color,
        }
    }

    fn encode_pass(
        &self,
        pass: &RenderPassConfig,
        shadows: bool,
        post: bool,
        scene_color: RenderTarget,
        scene_depth: RenderTarget,
        out: &mut Vec<RenderCommand>,
    ) {
        let gbuffer = self.pipeline.gbuffer();
        let begin = |label: &str, color, depth, clear_color, clear_depth| RenderCommand::BeginRenderPass {
            label: label.to_string(),
            color,
            depth,
            clear_color,
            clear_depth,
        };
        let clears = pass.clear.unwrap_or(true);

        match pass.pass_type {
            RenderPassType::Shadows => {
                let Some(map) = self.lighting.primary_shadow_map().filter(|_| shadows) else {
                    return;
                };
                out.push(begin(
                    pass.pass_type.id(),
                    Vec::new(),
                    Some(RenderTarget::Texture(map.handle())),
                    None,
                    true,
                ));
                self.scene.encode(DrawPhase::ShadowCaster, out);
                out.push(RenderCommand::EndRenderPass);
            }
            RenderPassType::Geometry => {
                match gbuffer {
                    Some(gbuffer) => {
                        out.push(begin(
                            pass.pass_type.id(),
                            gbuffer.color_targets().map(RenderTarget::Texture).to_vec(),
                            Some(RenderTarget::Texture(gbuffer.depth_target())),
                            Some([0.0; 4]),
                            true,
                        ));
                        self.scene.encode(DrawPhase::Geometry, out);
                    }
                    None => {
                        out.push(begin(
                            pass.pass_type.id(),
                            vec![scene_color],
                            Some(scene_depth),
                            clears.then(|| self.clear_color(pass)),
                            true,
                        ));
                        self.scene.encode(DrawPhase::Opaque, out);
                    }
                }
                out.push(RenderCommand::EndRenderPass);
            }
            RenderPassType::Lighting => {
                match gbuffer {
                    Some(gbuffer) => {
                        // 深度沿用 G-Buffer，前向对象与延迟结果正确遮挡
                        out.push(begin(
                            pass.pass_type.id(),
                            vec![scene_color],
                            Some(RenderTarget::Texture(gbuffer.depth_target())),
                            clears.then(|| self.clear_color(pass)),
                            false,
                        ));
                        self.deferred_lighting.encode(gbuffer, out);
                        self.scene.encode(DrawPhase::Opaque, out);
                    }
                    None => {
                        out.push(begin(pass.pass_type.id(), vec![scene_color], Some(scene_depth), None, false));
                    }
                }
                self.scene.encode(DrawPhase::Transparent, out);
                out.push(RenderCommand::EndRenderPass);
            }
            // 反射与 AO 在光照着色器中按质量开关计算
            RenderPassType::Reflections | RenderPassType::AmbientOcclusion => {}
            RenderPassType::PostProcessing => {
                if post {
                    self.composer.encode(out);
                }
            }
            RenderPassType::Ui => {
                out.push(begin(pass.pass_type.id(), vec![RenderTarget::Surface], None, None, false));
                self.scene.encode(DrawPhase::Overlay, out);
                out.push(RenderCommand::EndRenderPass);
            }
        }
    }

    pub fn quality(&self) -> &QualityLevel {
        &self.quality
    }

    /// 合并质量补丁
    ///
    /// 阴影贴图尺寸或开关变化时，旧贴图在返回前销毁并重建；
    /// 尚未初始化时推迟到第一帧渲染之前。
    pub fn set_quality(&mut self, patch: &QualityPatch) -> RenderResult<()> {
        let next = self.quality.merged(patch);
        let rebuild = self.quality.shadow_maps_differ(&next);
        let rescale = self.quality.resolution_scale != next.resolution_scale;

        if rebuild {
            match self.gpu.as_mut() {
                Some(gpu) => {
                    // 失败时保留原有等级，下一帧按它重建阴影贴图
                    if let Err(error) = self.lighting.rebuild_shadow_maps(gpu, &next) {
                        self.shadows_dirty = true;
                        tracing::warn!(target: "chronos::engine", %error, "quality change rejected");
                        return Err(error);
                    }
                    self.shadows_dirty = false;
                }
                None => self.shadows_dirty = true,
            }
        }
        self.quality = next;
        self.pipeline.set_quality(&self.quality);
        if rescale {
            self.apply_size()?;
        }
        tracing::info!(
            target: "chronos::engine",
            quality = %self.quality.name,
            shadow_map_size = self.quality.shadow_map_size,
            rebuild,
            "quality updated"
        );
        Ok(())
    }

    /// 最近一次采样的副本
    pub fn metrics(&self) -> PerformanceMetrics {
        self.metrics.latest()
    }

    pub fn metrics_samples(&self) -> u64 {
        self.metrics.samples()
    }

    pub fn metrics_window(&self) -> Duration {
        self.metrics.window()
    }

    /// 调整画布尺寸（CSS 像素），相机与全部目标同步更新
    pub fn resize(&mut self, width: u32, height: u32) -> RenderResult<()> {
        self.size = (width.max(1), height.max(1));
        self.camera.set_viewport(self.size.0, self.size.1);
        self.apply_size()
    }

    /// 设置设备像素比
    pub fn set_pixel_ratio(&mut self, pixel_ratio: f32) -> RenderResult<()> {
        if (self.pixel_ratio - pixel_ratio).abs() < f32::EPSILON {
            return Ok(());
        }
        self.pixel_ratio = pixel_ratio;
        self.apply_size()
    }

    fn apply_size(&mut self) -> RenderResult<()> {
        let (width, height) = self.render_size();
        let Some(gpu) = self.gpu.as_mut() else {
            return Ok(());
        };
        gpu.resize(width, height);
        self.pipeline.resize_gbuffer(gpu, width, height)?;
        self.composer.resize(gpu, width, height)?;
        gpu.collect_garbage();
        tracing::debug!(target: "chronos::engine", width, height, "render targets resized");
        Ok(())
    }

    /// 替换光照；阴影贴图在下一帧之前重建
    pub fn set_lighting(&mut self, lighting: LightingRig) {
        self.lighting.release_shadow_maps();
        self.lighting = lighting;
        self.shadows_dirty = true;
    }

    pub fn lighting(&self) -> &LightingRig {
        &self.lighting
    }

    pub fn set_post_processing(&mut self, config: PostProcessConfig) {
        self.composer.set_config(config);
    }

    pub fn post_processing(&self) -> &PostProcessConfig {
        self.composer.config()
    }

    pub fn set_clear_color(&mut self, color: [f32; 4]) {
        self.options.clear_color = color;
    }

    pub fn scene(&self) -> &Scene {
        &self.scene
    }

    pub fn scene_mut(&mut self) -> &mut Scene {
        &mut self.scene
    }

    pub fn camera(&self) -> &Camera {
        &self.camera
    }

    pub fn camera_mut(&mut self) -> &mut Camera {
        &mut self.camera
    }

    pub fn pipeline(&self) -> &RenderPipeline {
        &self.pipeline
    }

    pub fn pipeline_mut(&mut self) -> &mut RenderPipeline {
        &mut self.pipeline
    }

    pub fn gpu_mut(&mut self) -> Option<&mut GpuContext> {
        self.gpu.as_mut()
    }

    pub fn capabilities(&self) -> Option<BackendCapabilities> {
        self.gpu.as_ref().map(GpuContext::capabilities)
    }

    pub fn backend_name(&self) -> Option<&str> {
        self.gpu.as_ref().map(GpuContext::backend_name)
    }

    /// 释放场景、后处理、阴影贴图与 G-Buffer，并强制丢失上下文
    ///
    /// 重复调用无副作用。
    pub fn dispose(&mut self) {
        if self.disposed {
            return;
        }
        self.disposed = true;
        self.frame_loop.stop();
        self.frame_loop.end();
        self.frame_loop.callbacks().clear();
        self.scene.dispose();
        self.composer.dispose();
        self.deferred_lighting.release();
        self.lighting.release_shadow_maps();
        if let Some(mut gpu) = self.gpu.take() {
            self.pipeline.dispose(&mut gpu);
            let released = gpu.collect_garbage();
            gpu.lose_context();
            tracing::info!(target: "chronos::engine", released, "render engine disposed");
        }
    }
}

/// 渲染引擎接口
///
/// 后端引擎只需提供 `core`/`core_mut`，其余操作由默认实现转发。
pub trait RenderEngine {
    fn core(&self) -> &EngineCore;

    fn core_mut(&mut self) -> &mut EngineCore;

    /// 后端名称
    fn backend(&self) -> &'static str;

    fn start_render_loop(&mut self) -> bool {
        self.core_mut().start()
    }

    fn stop_render_loop(&mut self) {
        self.core_mut().stop();
    }

    fn is_running(&self) -> bool {
        self.core().is_running()
    }

    fn on_render(&self, callback: Box<dyn FnMut(&FrameInfo) -> Result<(), CallbackError>>) -> Unsubscribe {
        self.core().on_render(callback)
    }

    fn tick(&mut self, now: Duration) -> RenderResult<bool> {
        self.core_mut().tick(now)
    }

    fn set_quality(&mut self, patch: &QualityPatch) -> RenderResult<()> {
        self.core_mut().set_quality(patch)
    }

    fn metrics(&self) -> PerformanceMetrics {
        self.core().metrics()
    }

    fn resize(&mut self, width: u32, height: u32) -> RenderResult<()> {
        self.core_mut().resize(width, height)
    }

    fn dispose(&mut self) {
        self.core_mut().dispose();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::backend::{BackendEvent, NullBackend, TextureHandle};
    use crate::render::quality::QualityTier;

    fn engine() -> (EngineCore, std::rc::Rc<std::cell::RefCell<crate::render::backend::Recording>>) {
        let backend = NullBackend::new();
        let recording = backend.recording();
        let mut core = EngineCore::new(EngineOptions {
            width: 200,
            height: 100,
            pixel_ratio: 1.0,
            quality: QualityTier::High.level(),
            ..EngineOptions::default()
        });
        core.attach(Box::new(backend)).unwrap();
        (core, recording)
    }

    #[test]
    fn test_tick_requires_running_loop() {
        let (mut core, recording) = engine();
        assert!(!core.tick(Duration::ZERO).unwrap());
        assert!(recording.borrow().submissions().is_empty());

        assert!(core.start());
        assert!(!core.start());
        assert!(core.tick(Duration::from_millis(16)).unwrap());
        assert_eq!(recording.borrow().submissions().len(), 1);
    }

    #[test]
    fn test_tick_before_attach_fails() {
        let mut core = EngineCore::new(EngineOptions::default());
        assert!(matches!(core.tick(Duration::ZERO), Err(RenderError::NotInitialized)));
    }

    #[test]
    fn test_render_size_follows_dpr_and_scale() {
        let (mut core, recording) = engine();
        assert_eq!(core.render_size(), (200, 100));
        core.set_pixel_ratio(2.0).unwrap();
        assert_eq!(core.render_size(), (400, 200));
        core.set_quality(&QualityPatch {
            resolution_scale: Some(0.5),
            ..Default::default()
        })
        .unwrap();
        assert_eq!(core.render_size(), (200, 100));
        let resized = recording
            .borrow()
            .events()
            .iter()
            .filter(|e| matches!(e, BackendEvent::Resize { .. }))
            .count();
        assert_eq!(resized, 3);
    }

    #[test]
    fn test_ui_pass_is_last() {
        let (mut core, recording) = engine();
        core.start();
        core.tick(Duration::ZERO).unwrap();
        let recording = recording.borrow();
        let frame = recording.submissions()[0];
        let labels: Vec<&str> = frame
            .iter()
            .filter_map(|c| match c {
                RenderCommand::BeginRenderPass { label, .. } => Some(label.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(labels.last(), Some(&"ui"));
        assert_eq!(labels.first(), Some(&"geometry"));
    }

    #[test]
    fn test_set_lighting_rebuilds_before_render() {
        let (mut core, recording) = engine();
        let before: Vec<TextureHandle> = core.lighting().shadow_maps().iter().map(|m| m.handle()).collect();
        assert_eq!(before.len(), 1);
        core.set_lighting(LightingRig::default());
        assert!(core.lighting().shadow_maps().is_empty());
        core.start();
        core.tick(Duration::ZERO).unwrap();
        assert_eq!(core.lighting().shadow_maps().len(), 1);
        assert_eq!(recording.borrow().destroy_count(before[0]), 1);
    }

    #[test]
    fn test_rejected_quality_keeps_previous_level() {
        let backend = NullBackend::with_capabilities(BackendCapabilities {
            max_texture_size: 2048,
            ..Default::default()
        });
        let mut core = EngineCore::new(EngineOptions {
            width: 200,
            height: 100,
            pixel_ratio: 1.0,
            quality: QualityTier::High.level(),
            ..EngineOptions::default()
        });
        core.attach(Box::new(backend)).unwrap();

        assert!(core.set_quality(&QualityPatch::shadow_map_size(4096)).is_err());
        assert_eq!(core.quality().shadow_map_size, 2048);
        assert_eq!(core.quality().name, "high");

        core.start();
        core.tick(Duration::ZERO).unwrap();
        let maps = core.lighting().shadow_maps();
        assert_eq!(maps.len(), 1);
        assert_eq!(maps[0].size(), 2048);
    }

    #[test]
    fn test_dispose_is_idempotent() {
        let (mut core, recording) = engine();
        core.dispose();
        core.dispose();
        assert!(core.is_disposed());
        assert!(!core.is_initialized());
        let lost = recording
            .borrow()
            .events()
            .iter()
            .filter(|e| **e == BackendEvent::ContextLost)
            .count();
        assert_eq!(lost, 1);
        assert!(core.attach(Box::new(NullBackend::new())).is_err());
    }
}
