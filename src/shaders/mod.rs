//! 着色器模块
//!
//! - `library` - 可组合的 GLSL 函数片段
//! - `material` - 材质工厂（片段 + 效果源码 + 带类型的 uniform）
//! - `uniforms` - uniform 值、std140 布局与批量更新
//! - `presets` - 命名的材质预设

pub mod library;
pub mod material;
pub mod presets;
pub mod uniforms;

pub use library::{compose, ShaderChunk};
pub use material::{ShaderConfig, ShaderMaterial, Side};
pub use presets::{create_preset_material, create_preset_material_by_key, ShaderPreset};
pub use uniforms::{
    update_shader_uniforms, update_time, BuiltinUniforms, UniformLayout, UniformType, UniformValue,
};
