//! 渲染管线
//!
//! 管理渲染通道配置：按优先级排序、按质量等级启用/禁用，
//! 并按需持有延迟渲染所需的 G-Buffer。

use super::context::GpuContext;
use super::gbuffer::GBuffer;
use super::quality::QualityLevel;
use crate::core::error::RenderResult;
use serde::{Deserialize, Serialize};
use std::rc::Rc;

/// 渲染通道类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RenderPassType {
    Shadows,
    Geometry,
    Lighting,
    Reflections,
    AmbientOcclusion,
    PostProcessing,
    Ui,
}

impl RenderPassType {
    pub const ALL: [RenderPassType; 7] = [
        RenderPassType::Shadows,
        RenderPassType::Geometry,
        RenderPassType::Lighting,
        RenderPassType::Reflections,
        RenderPassType::AmbientOcclusion,
        RenderPassType::PostProcessing,
        RenderPassType::Ui,
    ];

    pub fn default_priority(&self) -> i32 {
        match self {
            RenderPassType::Shadows => 10,
            RenderPassType::Geometry => 20,
            RenderPassType::Lighting => 30,
            RenderPassType::Reflections => 40,
            RenderPassType::AmbientOcclusion => 50,
            RenderPassType::PostProcessing => 90,
            RenderPassType::Ui => 100,
        }
    }

    pub fn id(&self) -> &'static str {
        match self {
            RenderPassType::Shadows => "shadows",
            RenderPassType::Geometry => "geometry",
            RenderPassType::Lighting => "lighting",
            RenderPassType::Reflections => "reflections",
            RenderPassType::AmbientOcclusion => "ambient-occlusion",
            RenderPassType::PostProcessing => "post-processing",
            RenderPassType::Ui => "ui",
        }
    }

    /// 由质量等级决定是否启用的通道
    fn gate(&self, quality: &QualityLevel) -> Option<bool> {
        match self {
            RenderPassType::Shadows => Some(quality.shadows),
            RenderPassType::Reflections => Some(quality.reflections),
            RenderPassType::AmbientOcclusion => Some(quality.ambient_occlusion),
            RenderPassType::PostProcessing => Some(quality.post_processing),
            _ => None,
        }
    }
}

/// 渲染通道配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RenderPassConfig {
    pub pass_type: RenderPassType,
    pub enabled: bool,
    pub priority: i32,
    pub render_target: Option<String>,
    pub clear: Option<bool>,
    pub clear_color: Option<[f32; 3]>,
    pub clear_alpha: Option<f32>,
}

impl RenderPassConfig {
    pub fn new(pass_type: RenderPassType) -> Self {
        Self {
            pass_type,
            enabled: true,
            priority: pass_type.default_priority(),
            render_target: None,
            clear: None,
            clear_color: None,
            clear_alpha: None,
        }
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn with_clear(mut self, color: [f32; 3], alpha: f32) -> Self {
        self.clear = Some(true);
        self.clear_color = Some(color);
        self.clear_alpha = Some(alpha);
        self
    }
}

/// 渲染管线
#[derive(Debug, Default)]
pub struct RenderPipeline {
    /// 按插入顺序保存
    passes: Vec<(String, RenderPassConfig)>,
    active: Option<Rc<[RenderPassConfig]>>,
    gbuffer: Option<GBuffer>,
}

impl RenderPipeline {
    pub fn new() -> Self {
        Self::default()
    }

    /// 带默认七个通道的管线
    pub fn with_default_passes(quality: &QualityLevel) -> Self {
        let mut pipeline = Self::new();
        for pass_type in RenderPassType::ALL {
            pipeline.add_pass(pass_type.id(), RenderPassConfig::new(pass_type));
        }
        pipeline.set_quality(quality);
        pipeline
    }

    /// 添加通道；同名通道被原位替换
    pub fn add_pass(&mut self, id: &str, config: RenderPassConfig) {
        match self.passes.iter_mut().find(|(existing, _)| existing == id) {
            Some((_, slot)) => *slot = config,
            None => self.passes.push((id.to_string(), config)),
        }
        self.active = None;
    }

    pub fn remove_pass(&mut self, id: &str) -> bool {
        let before = self.passes.len();
        self.passes.retain(|(existing, _)| existing != id);
        let removed = self.passes.len() != before;
        if removed {
            self.active = None;
        }
        removed
    }

    pub fn enable_pass(&mut self, id: &str, enabled: bool) -> bool {
        match self.passes.iter_mut().find(|(existing, _)| existing == id) {
            Some((_, config)) => {
                if config.enabled != enabled {
                    config.enabled = enabled;
                    self.active = None;
                }
                true
            }
            None => false,
        }
    }

    pub fn pass(&self, id: &str) -> Option<&RenderPassConfig> {
        self.passes
            .iter()
            .find(|(existing, _)| existing == id)
            .map(|(_, config)| config)
    }

    /// 启用的通道，按优先级升序（UI 通道永远在最后）
    ///
    /// 结果在下一次修改前被缓存。
    pub fn active_passes(&mut self) -> Rc<[RenderPassConfig]> {
        if let Some(active) = &self.active {
            return Rc::clone(active);
        }
        let mut enabled: Vec<(usize, &RenderPassConfig)> = self
            .passes
            .iter()
            .enumerate()
            .filter(|(_, (_, config))| config.enabled)
            .map(|(index, (_, config))| (index, config))
            .collect();
        enabled.sort_by_key(|(index, config)| {
            (config.pass_type == RenderPassType::Ui, config.priority, *index)
        });
        let active: Rc<[RenderPassConfig]> = enabled
            .into_iter()
            .map(|(_, config)| config.clone())
            .collect();
        self.active = Some(Rc::clone(&active));
        active
    }

    /// 按质量等级重新推导阴影/反射/AO/后处理通道的启用状态，不改变优先级
    pub fn set_quality(&mut self, quality: &QualityLevel) {
        let mut changed = false;
        for (_, config) in self.passes.iter_mut() {
            if let Some(enabled) = config.pass_type.gate(quality) {
                changed |= config.enabled != enabled;
                config.enabled = enabled;
            }
        }
        if changed {
            self.active = None;
        }
    }

    pub fn initialize_gbuffer(&mut self, gpu: &mut GpuContext, width: u32, height: u32) -> RenderResult<()> {
        self.gbuffer = Some(GBuffer::new(gpu, width, height)?);
        tracing::debug!(target: "chronos::pipeline", width, height, "G-Buffer initialized");
        Ok(())
    }

    pub fn resize_gbuffer(&mut self, gpu: &mut GpuContext, width: u32, height: u32) -> RenderResult<()> {
        match self.gbuffer.as_mut() {
            Some(gbuffer) => gbuffer.resize(gpu, width, height),
            None => Ok(()),
        }
    }

    pub fn gbuffer(&self) -> Option<&GBuffer> {
        self.gbuffer.as_ref()
    }

    /// 释放 G-Buffer
    pub fn dispose(&mut self, gpu: &mut GpuContext) {
        if self.gbuffer.take().is_some() {
            gpu.collect_garbage();
            tracing::debug!(target: "chronos::pipeline", "G-Buffer disposed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::backend::NullBackend;
    use crate::render::quality::QualityTier;

    fn types(passes: &[RenderPassConfig]) -> Vec<RenderPassType> {
        passes.iter().map(|p| p.pass_type).collect()
    }

    #[test]
    fn test_default_order_at_ultra() {
        let mut pipeline = RenderPipeline::with_default_passes(&QualityTier::Ultra.level());
        assert_eq!(types(&pipeline.active_passes()), RenderPassType::ALL.to_vec());
    }

    #[test]
    fn test_low_quality_disables_gated_passes() {
        let mut pipeline = RenderPipeline::with_default_passes(&QualityTier::Low.level());
        assert_eq!(
            types(&pipeline.active_passes()),
            vec![RenderPassType::Geometry, RenderPassType::Lighting, RenderPassType::Ui]
        );
    }

    #[test]
    fn test_ui_stays_last_and_priority_kept() {
        let mut pipeline = RenderPipeline::with_default_passes(&QualityTier::High.level());
        pipeline.add_pass(
            "late",
            RenderPassConfig::new(RenderPassType::PostProcessing).with_priority(500),
        );
        let active = pipeline.active_passes();
        assert_eq!(active.last().unwrap().pass_type, RenderPassType::Ui);
        assert_eq!(active[active.len() - 2].priority, 500);

        pipeline.set_quality(&QualityTier::Low.level());
        assert_eq!(pipeline.pass("late").unwrap().priority, 500);
    }

    #[test]
    fn test_active_passes_memoized() {
        let mut pipeline = RenderPipeline::with_default_passes(&QualityTier::High.level());
        let first = pipeline.active_passes();
        let second = pipeline.active_passes();
        assert!(Rc::ptr_eq(&first, &second));

        assert!(pipeline.enable_pass("geometry", false));
        let third = pipeline.active_passes();
        assert!(!Rc::ptr_eq(&first, &third));
        assert!(third.iter().all(|p| p.enabled));

        assert!(!pipeline.enable_pass("missing", true));
        assert!(pipeline.remove_pass("ui"));
        assert!(!pipeline.remove_pass("ui"));
    }

    #[test]
    fn test_gbuffer_lifecycle() {
        let backend = NullBackend::new();
        let recording = backend.recording();
        let mut gpu = GpuContext::new(Box::new(backend));
        let mut pipeline = RenderPipeline::new();

        pipeline.resize_gbuffer(&mut gpu, 10, 10).unwrap();
        assert!(pipeline.gbuffer().is_none());

        pipeline.initialize_gbuffer(&mut gpu, 320, 240).unwrap();
        assert_eq!(recording.borrow().live_textures().len(), 4);
        pipeline.dispose(&mut gpu);
        assert!(recording.borrow().live_textures().is_empty());
        pipeline.dispose(&mut gpu);
    }
}
