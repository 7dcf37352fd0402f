//! 发射采样
//!
//! 每种 [`EmissionShape`] 的位置采样、初速度、颜色与区间采样。
//! 采样器对任意 [`Rng`] 泛型，测试用固定种子复现。

use super::config::{ColorMode, EmissionShape};
use glam::Vec3;
use rand::Rng;
use std::f32::consts::{PI, TAU};

/// 圆环发射的管半径与主半径之比
pub const TORUS_TUBE_RATIO: f32 = 0.25;

/// 发射体积参数
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EmissionVolume {
    pub shape: EmissionShape,
    pub radius: f32,
    pub size: Vec3,
}

impl EmissionVolume {
    pub fn new(shape: EmissionShape, radius: f32, size: Vec3) -> Self {
        Self { shape, radius, size }
    }

    /// 在体积内采样一个位置
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> Vec3 {
        let radius = self.radius;
        match self.shape {
            EmissionShape::Point => Vec3::ZERO,
            EmissionShape::Sphere => {
                let r = radius * rng.gen::<f32>().cbrt();
                let theta = rng.gen::<f32>() * TAU;
                let phi = (2.0 * rng.gen::<f32>() - 1.0).clamp(-1.0, 1.0).acos();
                Vec3::new(
                    r * phi.sin() * theta.cos(),
                    r * phi.sin() * theta.sin(),
                    r * phi.cos(),
                )
            }
            EmissionShape::Box => Vec3::new(
                (rng.gen::<f32>() - 0.5) * self.size.x,
                (rng.gen::<f32>() - 0.5) * self.size.y,
                (rng.gen::<f32>() - 0.5) * self.size.z,
            ),
            EmissionShape::Cone => {
                let theta = rng.gen::<f32>() * TAU;
                let r = radius * rng.gen::<f32>();
                let h = rng.gen::<f32>();
                Vec3::new(r * h * theta.cos(), h, r * h * theta.sin())
            }
            EmissionShape::Disk => {
                let theta = rng.gen::<f32>() * TAU;
                let r = radius * rng.gen::<f32>().sqrt();
                Vec3::new(r * theta.cos(), 0.0, r * theta.sin())
            }
            EmissionShape::Ring => {
                let theta = rng.gen::<f32>() * TAU;
                Vec3::new(radius * theta.cos(), 0.0, radius * theta.sin())
            }
            EmissionShape::Torus => {
                let theta = rng.gen::<f32>() * TAU;
                let phi = rng.gen::<f32>() * TAU;
                let tube = radius * TORUS_TUBE_RATIO * rng.gen::<f32>().sqrt();
                let ring = radius + tube * phi.cos();
                Vec3::new(ring * theta.cos(), tube * phi.sin(), ring * theta.sin())
            }
        }
    }

    /// 点是否落在体积内（允许 `epsilon` 的数值误差）
    pub fn contains(&self, p: Vec3, epsilon: f32) -> bool {
        let radius = self.radius;
        match self.shape {
            EmissionShape::Point => p.length() <= epsilon,
            EmissionShape::Sphere => p.length() <= radius + epsilon,
            EmissionShape::Box => {
                let half = self.size * 0.5;
                p.abs().cmple(half + Vec3::splat(epsilon)).all()
            }
            EmissionShape::Cone => {
                let planar = Vec3::new(p.x, 0.0, p.z).length();
                (-epsilon..=1.0 + epsilon).contains(&p.y) && planar <= radius * p.y.max(0.0) + epsilon
            }
            EmissionShape::Disk => p.y.abs() <= epsilon && Vec3::new(p.x, 0.0, p.z).length() <= radius + epsilon,
            EmissionShape::Ring => {
                p.y.abs() <= epsilon && (Vec3::new(p.x, 0.0, p.z).length() - radius).abs() <= epsilon
            }
            EmissionShape::Torus => {
                let planar = Vec3::new(p.x, 0.0, p.z).length() - radius;
                (planar * planar + p.y * p.y).sqrt() <= radius * TORUS_TUBE_RATIO + epsilon
            }
        }
    }
}

/// 在 `[min, max]` 内均匀采样
pub fn sample_range<R: Rng + ?Sized>(range: [f32; 2], rng: &mut R) -> f32 {
    let [min, max] = range;
    min + rng.gen::<f32>() * (max - min)
}

/// 随机方向的初速度，速率取自 `speed_range`
pub fn sample_velocity<R: Rng + ?Sized>(speed_range: [f32; 2], rng: &mut R) -> Vec3 {
    let theta = rng.gen::<f32>() * TAU;
    let phi = rng.gen::<f32>() * PI;
    let speed = sample_range(speed_range, rng);
    Vec3::new(phi.sin() * theta.cos(), phi.cos(), phi.sin() * theta.sin()) * speed
}

/// 按颜色模式从调色板取色
pub fn sample_color<R: Rng + ?Sized>(palette: &[Vec3], mode: ColorMode, rng: &mut R) -> Vec3 {
    match (palette, mode) {
        ([], _) => Vec3::ONE,
        ([only], _) | ([only, ..], ColorMode::Solid) => *only,
        (colors, ColorMode::Random) => colors[rng.gen_range(0..colors.len())],
        (colors, ColorMode::Gradient) => {
            let scaled = rng.gen::<f32>() * (colors.len() - 1) as f32;
            let index = (scaled.floor() as usize).min(colors.len() - 2);
            colors[index].lerp(colors[index + 1], scaled - index as f32)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn shape_strategy() -> impl Strategy<Value = EmissionShape> {
        prop_oneof![
            Just(EmissionShape::Point),
            Just(EmissionShape::Sphere),
            Just(EmissionShape::Box),
            Just(EmissionShape::Cone),
            Just(EmissionShape::Disk),
            Just(EmissionShape::Ring),
            Just(EmissionShape::Torus),
        ]
    }

    proptest! {
        #[test]
        fn prop_samples_stay_inside_volume(
            shape in shape_strategy(),
            radius in 0.1f32..50.0,
            sx in 0.0f32..20.0,
            sy in 0.0f32..20.0,
            sz in 0.0f32..20.0,
            seed in any::<u64>(),
        ) {
            let volume = EmissionVolume::new(shape, radius, Vec3::new(sx, sy, sz));
            let mut rng = StdRng::seed_from_u64(seed);
            for _ in 0..64 {
                let p = volume.sample(&mut rng);
                prop_assert!(volume.contains(p, 1e-3 * radius.max(1.0)), "{:?} escaped {:?}", p, volume);
            }
        }

        #[test]
        fn prop_velocity_speed_in_range(min in 0.0f32..5.0, extra in 0.0f32..5.0, seed in any::<u64>()) {
            let mut rng = StdRng::seed_from_u64(seed);
            let v = sample_velocity([min, min + extra], &mut rng);
            prop_assert!(v.length() >= min - 1e-3 && v.length() <= min + extra + 1e-3);
        }
    }

    #[test]
    fn test_color_modes() {
        let mut rng = StdRng::seed_from_u64(7);
        let palette = [Vec3::X, Vec3::Y, Vec3::Z];
        assert_eq!(sample_color(&palette, ColorMode::Solid, &mut rng), Vec3::X);
        for _ in 0..100 {
            let picked = sample_color(&palette, ColorMode::Random, &mut rng);
            assert!(palette.contains(&picked));
            let blended = sample_color(&palette, ColorMode::Gradient, &mut rng);
            assert!((blended.x + blended.y + blended.z - 1.0).abs() < 1e-5);
        }
        assert_eq!(sample_color(&[], ColorMode::Random, &mut rng), Vec3::ONE);
    }

    #[test]
    fn test_point_always_origin() {
        let mut rng = StdRng::seed_from_u64(1);
        let volume = EmissionVolume::new(EmissionShape::Point, 3.0, Vec3::ONE);
        assert_eq!(volume.sample(&mut rng), Vec3::ZERO);
    }
}
