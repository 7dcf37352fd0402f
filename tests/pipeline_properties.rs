//! 渲染通道排序与画质门控的性质测试

use chronos_render::render::pipeline::{RenderPassConfig, RenderPassType, RenderPipeline};
use chronos_render::render::quality::{QualityPatch, QualityTier};
use proptest::prelude::*;
use std::rc::Rc;

fn pass_type() -> impl Strategy<Value = RenderPassType> {
    prop::sample::select(RenderPassType::ALL.to_vec())
}

proptest! {
    #[test]
    fn active_passes_sorted_enabled_and_ui_last(
        passes in prop::collection::vec((pass_type(), -50i32..200, any::<bool>()), 1..24),
        toggles in prop::collection::vec((0usize..24, any::<bool>()), 0..8),
    ) {
        let mut pipeline = RenderPipeline::new();
        for (index, (kind, priority, enabled)) in passes.iter().enumerate() {
            pipeline.add_pass(
                &format!("pass-{index}"),
                RenderPassConfig::new(*kind).with_priority(*priority).with_enabled(*enabled),
            );
        }
        for (index, enabled) in toggles {
            pipeline.enable_pass(&format!("pass-{index}"), enabled);
        }

        let active = pipeline.active_passes();
        let again = pipeline.active_passes();
        prop_assert!(Rc::ptr_eq(&active, &again));
        prop_assert!(active.iter().all(|pass| pass.enabled));

        let (ui, rest): (Vec<_>, Vec<_>) = active.iter().partition(|p| p.pass_type == RenderPassType::Ui);
        prop_assert!(rest.windows(2).all(|w| w[0].priority <= w[1].priority));
        prop_assert!(ui.windows(2).all(|w| w[0].priority <= w[1].priority));
        if let Some(first_ui) = active.iter().position(|p| p.pass_type == RenderPassType::Ui) {
            prop_assert!(active[first_ui..].iter().all(|p| p.pass_type == RenderPassType::Ui));
        }
    }

    #[test]
    fn quality_gates_never_change_priority(tier in prop::sample::select(QualityTier::ALL.to_vec())) {
        let mut pipeline = RenderPipeline::with_default_passes(&QualityTier::Ultra.level());
        let before: Vec<(RenderPassType, i32)> = RenderPassType::ALL
            .iter()
            .filter_map(|t| pipeline.pass(t.id()).map(|p| (*t, p.priority)))
            .collect();

        let level = tier.level();
        pipeline.set_quality(&level);
        for (kind, priority) in &before {
            let pass = pipeline.pass(kind.id()).expect("default pass present");
            prop_assert_eq!(pass.priority, *priority);
        }
        let active = pipeline.active_passes();
        let has = |kind: RenderPassType| active.iter().any(|p| p.pass_type == kind);
        prop_assert_eq!(has(RenderPassType::Shadows), level.shadows);
        prop_assert_eq!(has(RenderPassType::PostProcessing), level.post_processing);
        prop_assert_eq!(has(RenderPassType::Reflections), level.reflections);
        prop_assert_eq!(has(RenderPassType::AmbientOcclusion), level.ambient_occlusion);
        prop_assert!(has(RenderPassType::Geometry));
        prop_assert_eq!(active.last().map(|p| p.pass_type), Some(RenderPassType::Ui));
    }

    #[test]
    fn partial_quality_patch_keeps_other_fields(size in 64u32..8192) {
        let base = QualityTier::Medium.level();
        let merged = base.merged(&QualityPatch::shadow_map_size(size));
        prop_assert_eq!(merged.shadow_map_size, size);
        prop_assert_eq!(merged.shadows, base.shadows);
        prop_assert_eq!(merged.resolution_scale, base.resolution_scale);
        prop_assert_eq!(merged.name, base.name);
    }
}
