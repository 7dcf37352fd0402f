//! 引擎生命周期集成测试（无头 NullBackend）

use chronos_render::core::error::CallbackError;
use chronos_render::particles::{GpuParticleConfig, ParticleConfig};
use chronos_render::render::backend::{BackendEvent, NullBackend, Recording, RenderCommand};
use chronos_render::render::engine::{EngineOptions, RenderEngine};
use chronos_render::render::quality::{QualityPatch, QualityTier};
use chronos_render::render::{WebGlEngine, WebGpuEngine};
use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::time::Duration;

fn options() -> EngineOptions {
    EngineOptions {
        width: 320,
        height: 180,
        pixel_ratio: 1.0,
        quality: QualityTier::High.level(),
        ..EngineOptions::default()
    }
}

fn webgl() -> (WebGlEngine, Rc<RefCell<Recording>>) {
    let backend = NullBackend::without_compute();
    let recording = backend.recording();
    let mut engine = WebGlEngine::new(options());
    assert!(engine.initialize_with(Box::new(backend)));
    (engine, recording)
}

fn ms(value: u64) -> Duration {
    Duration::from_millis(value)
}

#[test]
fn shadow_maps_rebuilt_before_next_render() -> anyhow::Result<()> {
    let (mut engine, recording) = webgl();
    engine.start_render_loop();
    engine.tick(ms(0))?;

    let old: Vec<_> = engine.core().lighting().shadow_maps().iter().map(|m| m.handle()).collect();
    assert_eq!(old.len(), 1);
    assert_eq!(engine.core().lighting().shadow_maps()[0].size(), 2048);
    recording.borrow_mut().clear_events();

    engine.set_quality(&QualityPatch::shadow_map_size(512))?;
    engine.tick(ms(16))?;

    let recording = recording.borrow();
    let events = recording.events();
    let destroyed = events
        .iter()
        .position(|e| matches!(e, BackendEvent::DestroyTexture(h) if *h == old[0]))
        .expect("old shadow map destroyed");
    let created = events
        .iter()
        .position(|e| matches!(e, BackendEvent::CreateTexture { width: 512, height: 512, .. }))
        .expect("new shadow map created");
    let submitted = events
        .iter()
        .position(|e| matches!(e, BackendEvent::Submit(_)))
        .expect("frame submitted");
    assert!(destroyed < created && created < submitted);
    assert_eq!(recording.destroy_count(old[0]), 1);

    let maps = engine.core().lighting().shadow_maps();
    assert_eq!(maps.len(), 1);
    assert_eq!(maps[0].size(), 512);
    Ok(())
}

#[test]
fn compute_dispatch_precedes_render_passes() -> anyhow::Result<()> {
    let backend = NullBackend::new();
    let recording = backend.recording();
    let mut engine = WebGpuEngine::new(options());
    assert!(engine.initialize_with(Box::new(backend)));

    let particles = engine.add_gpu_particles(GpuParticleConfig {
        base: ParticleConfig {
            count: 1000,
            seed: Some(3),
            ..Default::default()
        },
        ..Default::default()
    })?;
    let handle = particles.clone();
    let _subscription = engine.core().on_render(move |info| {
        handle.borrow_mut().update(info.delta.max(1.0 / 60.0));
        Ok(())
    });

    engine.start_render_loop();
    engine.tick(ms(0))?;
    engine.tick(ms(16))?;

    let recording = recording.borrow();
    let frame = recording.submissions().last().copied().expect("frame submitted");
    let dispatch = frame
        .iter()
        .position(|c| matches!(c, RenderCommand::Dispatch { .. }))
        .expect("compute dispatch encoded");
    let first_pass = frame
        .iter()
        .position(|c| matches!(c, RenderCommand::BeginRenderPass { .. }))
        .expect("render pass encoded");
    assert!(dispatch < first_pass);
    if let RenderCommand::Dispatch { workgroups, .. } = &frame[dispatch] {
        assert_eq!(workgroups[0], particles.borrow().workgroup_count());
    }
    Ok(())
}

#[test]
fn failing_callback_does_not_stop_frame() -> anyhow::Result<()> {
    let (mut engine, recording) = webgl();
    let calls = Rc::new(Cell::new(0));

    let _failing = engine.core().on_render(|_| Err(CallbackError::new("boom")));
    let _panicking = engine.core().on_render(|_| -> Result<(), CallbackError> { panic!("callback panic") });
    let counter = calls.clone();
    let _counting = engine.core().on_render(move |_| {
        counter.set(counter.get() + 1);
        Ok(())
    });

    engine.start_render_loop();
    assert!(engine.tick(ms(0))?);
    assert!(engine.tick(ms(16))?);
    assert_eq!(calls.get(), 2);
    assert_eq!(recording.borrow().submissions().len(), 2);
    Ok(())
}

#[test]
fn unsubscribe_removes_only_that_callback() -> anyhow::Result<()> {
    let (mut engine, _) = webgl();
    let first = Rc::new(Cell::new(0));
    let second = Rc::new(Cell::new(0));
    let (a, b) = (first.clone(), second.clone());
    let unsubscribe = engine.core().on_render(move |_| {
        a.set(a.get() + 1);
        Ok(())
    });
    let _keep = engine.core().on_render(move |_| {
        b.set(b.get() + 1);
        Ok(())
    });

    engine.start_render_loop();
    engine.tick(ms(0))?;
    unsubscribe.unsubscribe();
    engine.tick(ms(16))?;
    assert_eq!(first.get(), 1);
    assert_eq!(second.get(), 2);
    Ok(())
}

#[test]
fn stop_inside_callback_halts_after_frame() -> anyhow::Result<()> {
    let (mut engine, recording) = webgl();
    let handle = engine.core().loop_handle();
    let _stopper = engine.core().on_render(move |info| {
        if info.frame == 1 {
            handle.stop();
        }
        Ok(())
    });

    engine.start_render_loop();
    assert!(engine.tick(ms(0))?);
    assert!(engine.tick(ms(16))?);
    assert!(!engine.is_running());
    assert!(!engine.tick(ms(32))?);
    assert_eq!(recording.borrow().submissions().len(), 2);
    Ok(())
}

#[test]
fn metrics_refresh_once_per_window() -> anyhow::Result<()> {
    let (mut engine, _) = webgl();
    engine.start_render_loop();

    for t in (0..=900).step_by(10) {
        engine.tick(ms(t))?;
    }
    assert_eq!(engine.core().metrics_samples(), 0);
    let before = engine.metrics();
    assert_eq!(before, engine.metrics());

    for t in (910..=1990).step_by(10) {
        engine.tick(ms(t))?;
    }
    assert_eq!(engine.core().metrics_samples(), 1);
    let sampled = engine.metrics();
    assert!((sampled.fps - 100.0).abs() < 0.01);
    assert_eq!(sampled, engine.metrics());
    Ok(())
}

#[test]
fn double_dispose_is_safe() {
    let (mut engine, recording) = webgl();
    let shadow_map = engine.core().lighting().shadow_maps()[0].handle();
    engine.start_render_loop();
    engine.dispose();
    engine.dispose();

    let recording = recording.borrow();
    let events = recording.events();
    let lost: Vec<usize> = events
        .iter()
        .enumerate()
        .filter(|(_, e)| **e == BackendEvent::ContextLost)
        .map(|(i, _)| i)
        .collect();
    assert_eq!(lost.len(), 1);
    let destroyed = events
        .iter()
        .position(|e| *e == BackendEvent::DestroyTexture(shadow_map))
        .expect("shadow map destroyed");
    assert!(destroyed < lost[0]);
    assert!(!engine.is_running());
}

#[test]
fn webgpu_initialize_false_without_compute() {
    let mut engine = WebGpuEngine::new(options());
    assert!(!engine.initialize_with(Box::new(NullBackend::without_compute())));
    assert!(engine.tick(ms(0)).is_err());
}
