//! 轨道控制器
//!
//! 相机绕目标点在球面上运动；指针输入累积为角速度，
//! 每次 `update` 按阻尼系数衰减，自动旋转按每秒角度叠加。

use crate::impl_default;
use crate::render::camera::Camera;
use glam::Vec3;
use serde::{Deserialize, Serialize};
use std::f32::consts::{PI, TAU};

/// 极角与两极保持的最小距离
const POLAR_EPSILON: f32 = 1e-4;

/// 轨道控制器配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrbitControlsConfig {
    pub enable_damping: bool,
    pub damping_factor: f32,
    pub auto_rotate: bool,
    /// 2.0 对应 60 fps 下每 30 秒一圈
    pub auto_rotate_speed: f32,
    pub enable_zoom: bool,
    pub min_distance: f32,
    pub max_distance: f32,
    /// 极角范围（弧度，0 为正上方）
    pub min_polar_angle: f32,
    pub max_polar_angle: f32,
}

impl_default!(OrbitControlsConfig {
    enable_damping: true,
    damping_factor: 0.05,
    auto_rotate: false,
    auto_rotate_speed: 2.0,
    enable_zoom: true,
    min_distance: 1.0,
    max_distance: 100.0,
    min_polar_angle: 0.0,
    max_polar_angle: PI,
});

/// 轨道控制器
#[derive(Debug, Clone)]
pub struct OrbitControls {
    config: OrbitControlsConfig,
    target: Vec3,
    distance: f32,
    azimuth: f32,
    polar: f32,
    azimuth_velocity: f32,
    polar_velocity: f32,
    zoom_scale: f32,
}

impl OrbitControls {
    /// 从相机当前位置推导球坐标
    pub fn from_camera(camera: &Camera, config: OrbitControlsConfig) -> Self {
        let offset = camera.position - camera.target;
        let distance = offset.length().max(POLAR_EPSILON);
        Self {
            target: camera.target,
            distance: distance.clamp(config.min_distance, config.max_distance),
            azimuth: offset.x.atan2(offset.z),
            polar: (offset.y / distance).clamp(-1.0, 1.0).acos(),
            azimuth_velocity: 0.0,
            polar_velocity: 0.0,
            zoom_scale: 1.0,
            config,
        }
    }

    pub fn config(&self) -> &OrbitControlsConfig {
        &self.config
    }

    pub fn set_auto_rotate(&mut self, enabled: bool, speed: f32) {
        self.config.auto_rotate = enabled;
        self.config.auto_rotate_speed = speed;
    }

    /// 指针拖动（弧度）
    pub fn rotate(&mut self, delta_azimuth: f32, delta_polar: f32) {
        self.azimuth_velocity += delta_azimuth;
        self.polar_velocity += delta_polar;
    }

    /// 滚轮缩放；`scale > 1` 拉远
    pub fn zoom(&mut self, scale: f32) {
        if self.config.enable_zoom && scale > 0.0 {
            self.zoom_scale *= scale;
        }
    }

    pub fn distance(&self) -> f32 {
        self.distance
    }

    pub fn azimuth(&self) -> f32 {
        self.azimuth
    }

    pub fn polar(&self) -> f32 {
        self.polar
    }

    /// 推进一帧并写回相机
    pub fn update(&mut self, delta: f32, camera: &mut Camera) {
        if self.config.auto_rotate {
            self.azimuth -= TAU / 60.0 * self.config.auto_rotate_speed * delta;
        }

        let factor = if self.config.enable_damping {
            self.config.damping_factor
        } else {
            1.0
        };
        self.azimuth += self.azimuth_velocity * factor;
        self.polar += self.polar_velocity * factor;
        if self.config.enable_damping {
            self.azimuth_velocity *= 1.0 - factor;
            self.polar_velocity *= 1.0 - factor;
        } else {
            self.azimuth_velocity = 0.0;
            self.polar_velocity = 0.0;
        }

        let min_polar = self.config.min_polar_angle.max(POLAR_EPSILON);
        let max_polar = self.config.max_polar_angle.min(PI - POLAR_EPSILON);
        self.polar = self.polar.clamp(min_polar, max_polar);
        self.distance = (self.distance * self.zoom_scale).clamp(self.config.min_distance, self.config.max_distance);
        self.zoom_scale = 1.0;

        let sin_polar = self.polar.sin();
        let offset = Vec3::new(
            self.distance * sin_polar * self.azimuth.sin(),
            self.distance * self.polar.cos(),
            self.distance * sin_polar * self.azimuth.cos(),
        );
        camera.position = self.target + offset;
        camera.target = self.target;
    }
}
