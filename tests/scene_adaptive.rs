//! 场景编排与自适应 DPR 的集成测试

use chronos_render::config::EngineConfig;
use chronos_render::render::backend::NullBackend;
use chronos_render::render::engine::RenderEngine;
use chronos_render::render::quality::QualityTier;
use chronos_render::scene::{EnvironmentPreset, Scene3D, Scene3DPreset};
use std::time::Duration;

fn drive(scene: &mut Scene3D, from_ms: u64, to_ms: u64, frame_ms: u64) -> anyhow::Result<()> {
    for t in (from_ms..to_ms).step_by(frame_ms as usize) {
        scene.tick(Duration::from_millis(t))?;
    }
    Ok(())
}

#[test]
fn slow_frames_step_pixel_ratio_down() -> anyhow::Result<()> {
    let mut scene = Scene3D::from_preset(Scene3DPreset::Dashboard, EngineConfig::default());
    scene.mount_with(None, Box::new(NullBackend::without_compute()))?;
    assert_eq!(scene.pixel_ratio(), 1.5);
    assert_eq!(scene.tier(), QualityTier::High);

    // 20 fps：第一个窗口结束时下降一档，冷却期内保持
    drive(&mut scene, 0, 1_500, 50)?;
    assert_eq!(scene.pixel_ratio(), 1.0);
    assert_eq!(scene.tier(), QualityTier::Medium);

    let core = scene.engine().expect("mounted").core();
    assert_eq!(core.pixel_ratio(), 1.0);
    assert_eq!(core.quality().name, "medium");
    assert_eq!(core.render_size(), (960, 540));

    drive(&mut scene, 1_500, 3_100, 50)?;
    assert_eq!(scene.pixel_ratio(), 0.5);
    assert_eq!(scene.tier(), QualityTier::Low);

    // 已在下限：继续降帧不再改变
    drive(&mut scene, 3_100, 8_000, 50)?;
    assert_eq!(scene.pixel_ratio(), 0.5);
    Ok(())
}

#[test]
fn non_adaptive_preset_ignores_frame_rate() -> anyhow::Result<()> {
    let mut scene = Scene3D::from_preset(Scene3DPreset::Minimal, EngineConfig::default());
    scene.mount_with(None, Box::new(NullBackend::without_compute()))?;
    drive(&mut scene, 0, 5_000, 100)?;
    assert_eq!(scene.pixel_ratio(), 1.0);
    assert_eq!(scene.tier(), QualityTier::Medium);
    Ok(())
}

#[test]
fn configured_backend_preference_is_respected() -> anyhow::Result<()> {
    let config = EngineConfig::from_toml_str(
        r#"
        [graphics]
        backend = "webgl"

        [graphics.resolution]
        width = 640
        height = 360
        "#,
    )?;
    let mut scene = Scene3D::from_preset(Scene3DPreset::Hero, config);
    let backend = scene.mount_with(Some(Box::new(NullBackend::new())), Box::new(NullBackend::new()))?;
    assert_eq!(backend, "webgl");
    assert_eq!(scene.engine().expect("mounted").core().size(), (640, 360));
    Ok(())
}

#[test]
fn environment_switch_replaces_lighting() -> anyhow::Result<()> {
    let mut scene = Scene3D::from_preset(Scene3DPreset::Ambient, EngineConfig::default());
    scene.mount_with(None, Box::new(NullBackend::without_compute()))?;
    scene.tick(Duration::ZERO)?;

    scene.set_environment(EnvironmentPreset::Studio);
    let core = scene.engine().expect("mounted").core();
    assert_eq!(core.lighting().ambient().1, 0.6);
    assert!(core.lighting().shadow_maps().is_empty());

    scene.tick(Duration::from_millis(16))?;
    let core = scene.engine().expect("mounted").core();
    assert_eq!(core.lighting().shadow_maps().len(), 1);
    Ok(())
}
