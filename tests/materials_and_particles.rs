//! 材质预设与粒子策略的集成测试

use chronos_render::particles::emission::EmissionVolume;
use chronos_render::particles::{
    create_particle_system, reference_step, EmissionShape, GpuParticleConfig, GpuParticles, InteractiveParticleConfig,
    InteractiveParticles, ParticleConfig, ParticleConfigPatch, ParticlePreset, ParticleSystem, SimulationParams,
};
use chronos_render::shaders::{
    create_preset_material, create_preset_material_by_key, update_shader_uniforms, ShaderPreset, UniformValue,
};
use glam::Vec3;
use proptest::prelude::*;
use std::collections::BTreeMap;

#[test]
fn holographic_overrides_round_trip() -> anyhow::Result<()> {
    let mut overrides = BTreeMap::new();
    overrides.insert("uHoloIntensity".to_string(), UniformValue::Float(0.25));
    overrides.insert("uTime".to_string(), UniformValue::Float(4.0));

    let material = create_preset_material(ShaderPreset::Holographic, &overrides)?;
    let defaults = ShaderPreset::Holographic.config().uniforms;
    for (name, default) in &defaults {
        let expected = overrides.get(name).unwrap_or(default);
        assert_eq!(material.uniform(name), Some(expected), "{name}");
    }
    assert_eq!(material.uniforms().len(), defaults.len());
    Ok(())
}

#[test]
fn preset_lookup_by_key_and_type_mismatch() {
    assert!(create_preset_material_by_key("plasma", &BTreeMap::new()).is_ok());
    assert!(create_preset_material_by_key("velvet", &BTreeMap::new()).is_err());

    let mut wrong = BTreeMap::new();
    wrong.insert("uTime".to_string(), UniformValue::Vec3(Vec3::ONE));
    assert!(create_preset_material(ShaderPreset::Plasma, &wrong).is_err());
}

#[test]
fn switching_presets_ignores_unknown_uniforms() -> anyhow::Result<()> {
    let mut material = create_preset_material(ShaderPreset::GradientFlow, &BTreeMap::new())?;
    let version = material.program_version();
    let written = update_shader_uniforms(
        &mut material,
        [
            ("uTime", UniformValue::Float(1.0)),
            ("uHoloIntensity", UniformValue::Float(2.0)),
            ("uSpeed", UniformValue::Float(0.8)),
        ],
    );
    assert_eq!(written, 2);
    assert!(!material.has_uniform("uHoloIntensity"));
    assert_eq!(material.program_version(), version);
    Ok(())
}

#[test]
fn cpu_point_emitter_respawns_once() -> anyhow::Result<()> {
    let mut system = ParticleSystem::new(ParticleConfig {
        count: 100,
        lifetime: 2.0,
        lifetime_range: [2.0, 2.0],
        emission_shape: EmissionShape::Point,
        seed: Some(11),
        ..Default::default()
    })?;
    system.update(2.01);
    for index in 0..system.count() {
        let particle = system.particle(index)?;
        assert_eq!(particle.life, particle.max_life);
        assert_eq!(particle.max_life, 2.0);
        assert!(system.world_position(index)?.length() < 1e-6);
    }
    Ok(())
}

#[test]
fn preset_overrides_never_touch_count_after_construction() -> anyhow::Result<()> {
    let mut system = create_particle_system(
        ParticlePreset::Snow,
        &ParticleConfigPatch {
            count: Some(128),
            seed: Some(5),
            ..Default::default()
        },
    )?;
    assert_eq!(system.count(), 128);
    system.set_config(&ParticleConfigPatch {
        count: Some(4096),
        gravity: Some(Vec3::new(0.0, -2.0, 0.0)),
        ..Default::default()
    })?;
    assert_eq!(system.count(), 128);
    assert_eq!(system.config().gravity, Vec3::new(0.0, -2.0, 0.0));
    Ok(())
}

#[test]
fn interactive_particle_returns_home_on_long_frames() -> anyhow::Result<()> {
    let mut particles = InteractiveParticles::new(InteractiveParticleConfig {
        base: ParticleConfig {
            count: 16,
            seed: Some(5),
            turbulence: 0.0,
            wind: Vec3::ZERO,
            gravity: Vec3::ZERO,
            ..InteractiveParticleConfig::default().base
        },
        ..InteractiveParticleConfig::default()
    })?;
    let home = particles.home(7)?;
    particles.displace(7, Vec3::new(0.0, 0.1, 0.0))?;

    let mut distance = (particles.position(7)? - home).length();
    for delta in [0.25; 20].into_iter().chain([2.0]) {
        particles.update(delta);
        let next = (particles.position(7)? - home).length();
        assert!(next.is_finite() && next <= distance + 1e-6, "{next} after {distance}");
        distance = next;
    }
    assert!(distance < 1e-4);
    Ok(())
}

fn respawned_offsets(shape: EmissionShape, time: f32) -> anyhow::Result<Vec<Vec3>> {
    let particles = GpuParticles::new(GpuParticleConfig {
        base: ParticleConfig {
            count: 200,
            seed: Some(9),
            emission_shape: shape,
            emission_radius: 3.0,
            emission_size: Vec3::new(2.0, 4.0, 1.0),
            speed_range: [0.0, 0.0],
            gravity: Vec3::ZERO,
            turbulence: 0.0,
            ..GpuParticleConfig::default().base
        },
        ..GpuParticleConfig::default()
    })?;
    let mut state = particles.initial_particles().to_vec();
    for particle in &mut state {
        particle.position[3] = 0.0;
    }
    let params = SimulationParams {
        delta_time: 0.016,
        time,
        mouse_influence: 0.0,
        bounds: [50.0; 3],
        ..*particles.params()
    };
    reference_step(&mut state, &params);
    let emitter = Vec3::from(params.emitter_position);
    Ok(state
        .iter()
        .map(|particle| Vec3::from_slice(&particle.position[..3]) - emitter)
        .collect())
}

#[test]
fn gpu_ring_emitter_respawns_on_the_ring() -> anyhow::Result<()> {
    let volume = EmissionVolume::new(EmissionShape::Ring, 3.0, Vec3::new(2.0, 4.0, 1.0));
    for offset in respawned_offsets(EmissionShape::Ring, 1.25)? {
        assert!(volume.contains(offset, 1e-3), "{offset}");
        assert!((offset.length() - 3.0).abs() < 1e-3);
    }
    Ok(())
}

proptest! {
    #[test]
    fn life_decreases_until_respawn(seed: u64, steps in prop::collection::vec(0.01f32..0.5, 1..20)) {
        let mut system = ParticleSystem::new(ParticleConfig {
            count: 32,
            lifetime_range: [1.0, 3.0],
            emission_shape: EmissionShape::Sphere,
            emission_radius: 2.0,
            seed: Some(seed),
            ..Default::default()
        }).unwrap();

        for delta in steps {
            let before: Vec<f32> = system.particles().iter().map(|p| p.life).collect();
            system.update(delta);
            for (particle, previous) in system.particles().iter().zip(before) {
                prop_assert!(particle.life >= 0.0 && particle.life <= particle.max_life);
                if previous - delta > 0.0 {
                    prop_assert!((particle.life - (previous - delta)).abs() < 1e-4);
                } else {
                    prop_assert!(particle.max_life >= 1.0 && particle.max_life <= 3.0);
                    prop_assert!(Vec3::from(particle.position).length() <= 2.0 + 1e-4);
                }
            }
        }
    }

    #[test]
    fn gpu_respawn_stays_in_emission_volume(shape_index in 0usize..7, time in 0.0f32..100.0) {
        let shape = [
            EmissionShape::Point,
            EmissionShape::Sphere,
            EmissionShape::Box,
            EmissionShape::Cone,
            EmissionShape::Disk,
            EmissionShape::Ring,
            EmissionShape::Torus,
        ][shape_index];
        let volume = EmissionVolume::new(shape, 3.0, Vec3::new(2.0, 4.0, 1.0));
        for offset in respawned_offsets(shape, time).unwrap() {
            prop_assert!(volume.contains(offset, 1e-3), "{:?} {}", shape, offset);
        }
    }
}
