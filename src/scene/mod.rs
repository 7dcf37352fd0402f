//! 场景编排
//!
//! 把后端引擎、相机控制、环境预设与自适应 DPR 组合成一个受管理的画布。

pub mod controls;
pub mod monitor;
pub mod orchestrator;
pub mod presets;

pub use controls::{OrbitControls, OrbitControlsConfig};
pub use monitor::{MonitorEvent, PerformanceMonitor};
pub use orchestrator::{ActiveEngine, Scene3D};
pub use presets::{EnvironmentPreset, Scene3DConfig, Scene3DPreset};
