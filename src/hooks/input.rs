//! 指针、视口与性能轮询

use crate::render::camera::Camera;
use crate::render::engine::RenderEngine;
use crate::render::metrics::PerformanceMetrics;
use glam::Vec3;
use std::time::Duration;

/// 按采样窗口轮询引擎指标
#[derive(Debug, Clone, Default)]
pub struct PerformanceHook {
    metrics: PerformanceMetrics,
    last_poll: Option<Duration>,
}

impl PerformanceHook {
    pub fn new() -> Self {
        Self::default()
    }

    /// 距上次刷新不足一个窗口时返回缓存值
    pub fn poll<E>(&mut self, engine: &E, now: Duration) -> PerformanceMetrics
    where
        E: RenderEngine + ?Sized,
    {
        let window = engine.core().metrics_window();
        let due = self
            .last_poll
            .map_or(true, |last| now.saturating_sub(last) >= window);
        if due {
            self.metrics = engine.metrics();
            self.last_poll = Some(now);
        }
        self.metrics
    }

    pub fn metrics(&self) -> PerformanceMetrics {
        self.metrics
    }
}

/// 投影到世界平面上的指针位置
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Mouse3D {
    normal: Vec3,
    distance: f32,
    position: Vec3,
}

impl Default for Mouse3D {
    fn default() -> Self {
        Self::new(Vec3::Z, 0.0)
    }
}

impl Mouse3D {
    /// 平面 `normal · p + distance = 0`
    pub fn new(normal: Vec3, distance: f32) -> Self {
        Self {
            normal: normal.normalize_or_zero(),
            distance,
            position: Vec3::ZERO,
        }
    }

    /// 用 NDC 坐标更新；射线与平面不相交时保留上一帧的位置
    pub fn update(&mut self, camera: &Camera, ndc_x: f32, ndc_y: f32) -> Vec3 {
        if let Some(hit) = camera
            .ray_from_ndc(ndc_x, ndc_y)
            .intersect_plane(self.normal, self.distance)
        {
            self.position = hit;
        }
        self.position
    }

    pub fn position(&self) -> Vec3 {
        self.position
    }
}

/// 视口尺寸
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ViewportSize {
    pub width: u32,
    pub height: u32,
    pub pixel_ratio: f32,
}

impl Default for ViewportSize {
    fn default() -> Self {
        Self {
            width: 1,
            height: 1,
            pixel_ratio: 1.0,
        }
    }
}

impl ViewportSize {
    pub fn resize(&mut self, width: u32, height: u32, pixel_ratio: f32) {
        self.width = width.max(1);
        self.height = height.max(1);
        self.pixel_ratio = pixel_ratio;
    }

    pub fn aspect(&self) -> f32 {
        self.width as f32 / self.height as f32
    }

    /// 物理像素尺寸
    pub fn physical(&self) -> (u32, u32) {
        (
            ((self.width as f32 * self.pixel_ratio).round() as u32).max(1),
            ((self.height as f32 * self.pixel_ratio).round() as u32).max(1),
        )
    }

    /// 像素坐标（原点左上）到 NDC
    pub fn to_ndc(&self, x: f32, y: f32) -> (f32, f32) {
        (
            x / self.width as f32 * 2.0 - 1.0,
            1.0 - y / self.height as f32 * 2.0,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::backend::NullBackend;
    use crate::render::engine::EngineOptions;
    use crate::render::webgl::WebGlEngine;

    #[test]
    fn test_mouse_projects_to_plane() {
        let camera = Camera::default();
        let mut mouse = Mouse3D::default();
        let hit = mouse.update(&camera, 0.0, 0.0);
        assert!(hit.length() < 1e-4);

        let edge = mouse.update(&camera, 0.5, 0.0);
        assert!(edge.x > 0.0);
        assert!(edge.z.abs() < 1e-4);
    }

    #[test]
    fn test_viewport_conversions() {
        let mut viewport = ViewportSize::default();
        viewport.resize(800, 400, 1.5);
        assert_eq!(viewport.aspect(), 2.0);
        assert_eq!(viewport.physical(), (1200, 600));
        assert_eq!(viewport.to_ndc(400.0, 200.0), (0.0, 0.0));
        assert_eq!(viewport.to_ndc(0.0, 0.0), (-1.0, 1.0));
    }

    #[test]
    fn test_performance_hook_polls_once_per_window() {
        let mut engine = WebGlEngine::new(EngineOptions::default());
        assert!(engine.initialize_with(Box::new(NullBackend::new())));
        engine.start_render_loop();
        let mut hook = PerformanceHook::new();

        let first = hook.poll(&engine, Duration::ZERO);
        for ms in (0..=1500).step_by(16) {
            engine.tick(Duration::from_millis(ms)).unwrap();
        }
        assert_eq!(hook.poll(&engine, Duration::from_millis(500)), first);
        assert_ne!(hook.poll(&engine, Duration::from_millis(1000)), first);
    }
}
