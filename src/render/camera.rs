use glam::{Mat4, Vec3, Vec4};
use serde::{Deserialize, Serialize};

/// 透视相机
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Camera {
    pub position: Vec3,
    pub target: Vec3,
    pub up: Vec3,
    /// 垂直视场角（度）
    pub fov: f32,
    pub aspect: f32,
    pub near: f32,
    pub far: f32,
}

impl Default for Camera {
    fn default() -> Self {
        Self {
            position: Vec3::new(0.0, 0.0, 5.0),
            target: Vec3::ZERO,
            up: Vec3::Y,
            fov: 75.0,
            aspect: 16.0 / 9.0,
            near: 0.1,
            far: 1000.0,
        }
    }
}

impl Camera {
    pub fn new(position: Vec3, fov: f32) -> Self {
        Self {
            position,
            fov,
            ..Self::default()
        }
    }

    /// 按画布尺寸更新宽高比
    pub fn set_viewport(&mut self, width: u32, height: u32) {
        if width > 0 && height > 0 {
            self.aspect = width as f32 / height as f32;
        }
    }

    pub fn view_matrix(&self) -> Mat4 {
        Mat4::look_at_rh(self.position, self.target, self.up)
    }

    pub fn projection_matrix(&self) -> Mat4 {
        Mat4::perspective_rh(self.fov.to_radians(), self.aspect, self.near, self.far)
    }

    pub fn view_projection(&self) -> Mat4 {
        self.projection_matrix() * self.view_matrix()
    }

    /// 从 NDC 坐标（[-1, 1]，y 向上）发出的世界空间射线
    pub fn ray_from_ndc(&self, x: f32, y: f32) -> Ray {
        let inverse = self.view_projection().inverse();
        let near = inverse * Vec4::new(x, y, 0.0, 1.0);
        let far = inverse * Vec4::new(x, y, 1.0, 1.0);
        let near = near.truncate() / near.w;
        let far = far.truncate() / far.w;
        Ray {
            origin: self.position,
            direction: (far - near).normalize_or_zero(),
        }
    }
}

/// 射线
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Ray {
    pub origin: Vec3,
    pub direction: Vec3,
}

impl Ray {
    /// 与平面 `normal · p + constant = 0` 求交
    ///
    /// 射线与平面平行或交点在射线后方时返回 `None`。
    pub fn intersect_plane(&self, normal: Vec3, constant: f32) -> Option<Vec3> {
        let denominator = normal.dot(self.direction);
        if denominator.abs() < 1e-6 {
            return None;
        }
        let t = -(normal.dot(self.origin) + constant) / denominator;
        if t < 0.0 {
            return None;
        }
        Some(self.origin + self.direction * t)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_center_ray_hits_origin_plane() {
        let camera = Camera::default();
        let ray = camera.ray_from_ndc(0.0, 0.0);
        let hit = ray.intersect_plane(Vec3::Z, 0.0).unwrap();
        assert!(hit.length() < 1e-4);
    }

    #[test]
    fn test_parallel_ray_misses() {
        let ray = Ray {
            origin: Vec3::ZERO,
            direction: Vec3::X,
        };
        assert!(ray.intersect_plane(Vec3::Y, 1.0).is_none());
    }

    #[test]
    fn test_viewport_updates_aspect() {
        let mut camera = Camera::default();
        camera.set_viewport(800, 400);
        assert_eq!(camera.aspect, 2.0);
        camera.set_viewport(0, 400);
        assert_eq!(camera.aspect, 2.0);
    }
}
