//! 着色器材质工厂
//!
//! `ShaderMaterial` 由库片段 + 效果专属的顶点/片元源码 + 带类型的 uniform 表组成。
//! 每帧的 uniform 写入只改值（`uniforms_version` 递增）；
//! 只有结构变化（源码、uniform 集合）才会让 `program_version` 递增并触发程序重建。

use super::library;
use super::uniforms::{UniformLayout, UniformType, UniformValue};
use crate::core::error::{ShaderError, ShaderResult};
use crate::render::backend::{BindingKind, BlendMode, CullMode, ProgramDescriptor, ProgramSource, VertexLayout};
use serde::{Deserialize, Serialize};
use std::collections::hash_map::DefaultHasher;
use std::collections::BTreeMap;
use std::hash::{Hash, Hasher};

/// 渲染面
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    #[default]
    Front,
    Back,
    Double,
}

impl From<Side> for CullMode {
    fn from(side: Side) -> Self {
        match side {
            Side::Front => CullMode::Back,
            Side::Back => CullMode::Front,
            Side::Double => CullMode::None,
        }
    }
}

/// 材质配置
#[derive(Debug, Clone, PartialEq)]
pub struct ShaderConfig {
    pub name: String,
    /// 顶点程序主体（可含 `#include <chunk>`）
    pub vertex_shader: String,
    /// 片元程序主体（可含 `#include <chunk>`）
    pub fragment_shader: String,
    pub uniforms: BTreeMap<String, UniformValue>,
    pub transparent: bool,
    pub depth_write: bool,
    pub depth_test: bool,
    pub blending: BlendMode,
    pub side: Side,
}

impl Default for ShaderConfig {
    fn default() -> Self {
        Self {
            name: "material".to_string(),
            vertex_shader: library::STANDARD_VERTEX.to_string(),
            fragment_shader: String::new(),
            uniforms: BTreeMap::new(),
            transparent: false,
            depth_write: true,
            depth_test: true,
            blending: BlendMode::Opaque,
            side: Side::Front,
        }
    }
}

impl ShaderConfig {
    pub fn with_uniform(mut self, name: &str, value: impl Into<UniformValue>) -> Self {
        self.uniforms.insert(name.to_string(), value.into());
        self
    }
}

/// 着色器材质
#[derive(Debug, Clone)]
pub struct ShaderMaterial {
    name: String,
    vertex_body: String,
    fragment_body: String,
    vertex_source: String,
    fragment_source: String,
    uniforms: BTreeMap<String, UniformValue>,
    layout: UniformLayout,
    pub transparent: bool,
    pub depth_write: bool,
    pub depth_test: bool,
    pub blending: BlendMode,
    pub side: Side,
    uniforms_version: u64,
    program_version: u64,
}

/// 网格材质的顶点属性位置
pub const ATTRIBUTE_HEADER: &str = "layout(location = 0) in vec3 position;
layout(location = 1) in vec3 normal;
layout(location = 2) in vec2 uv;
";

const BLOCK_NAME: &str = "MaterialUniforms";

// location 0 沿用材质的 fragColor，写入位置目标
const GBUFFER_TAIL: &str = r#"
layout(location = 1) out vec4 gNormal;
layout(location = 2) out vec4 gAlbedo;

void main() {
    materialMain();
    gAlbedo = fragColor;
    gNormal = vec4(normalize(vNormal), 1.0);
    fragColor = vec4(vWorldPosition, 1.0);
}
"#;

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        && !name.starts_with("gl_")
}

impl ShaderMaterial {
    pub fn new(config: ShaderConfig) -> ShaderResult<Self> {
        if config.fragment_shader.trim().is_empty() || config.vertex_shader.trim().is_empty() {
            return Err(ShaderError::InvalidSource(format!(
                "material `{}` needs both vertex and fragment sources",
                config.name
            )));
        }
        for name in config.uniforms.keys() {
            if !is_identifier(name) {
                return Err(ShaderError::InvalidSource(format!("invalid uniform name `{name}`")));
            }
        }

        let mut material = Self {
            name: config.name,
            vertex_body: config.vertex_shader,
            fragment_body: config.fragment_shader,
            vertex_source: String::new(),
            fragment_source: String::new(),
            layout: UniformLayout::for_values(&config.uniforms),
            uniforms: config.uniforms,
            transparent: config.transparent,
            depth_write: config.depth_write,
            depth_test: config.depth_test,
            blending: config.blending,
            side: config.side,
            uniforms_version: 0,
            program_version: 0,
        };
        material.rebuild_sources()?;
        Ok(material)
    }

    fn rebuild_sources(&mut self) -> ShaderResult<()> {
        let block = self.layout.glsl_block(BLOCK_NAME);
        let vertex = library::compose(&self.vertex_body)?;
        let fragment = library::compose(&self.fragment_body)?;
        self.vertex_source = format!("#version 450\n{ATTRIBUTE_HEADER}{block}{vertex}");
        self.fragment_source = format!("#version 450\n{block}{fragment}");
        Ok(())
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// 完整的顶点源码（已展开片段并插入 uniform 块）
    pub fn vertex_source(&self) -> &str {
        &self.vertex_source
    }

    pub fn fragment_source(&self) -> &str {
        &self.fragment_source
    }

    pub fn uniforms(&self) -> &BTreeMap<String, UniformValue> {
        &self.uniforms
    }

    pub fn uniform(&self, name: &str) -> Option<&UniformValue> {
        self.uniforms.get(name)
    }

    pub fn has_uniform(&self, name: &str) -> bool {
        self.uniforms.contains_key(name)
    }

    pub fn layout(&self) -> &UniformLayout {
        &self.layout
    }

    /// 原位写入已声明的 uniform
    ///
    /// 未声明返回 `Ok(false)`；类型不符返回 `TypeMismatch`。
    pub fn set_uniform(&mut self, name: &str, value: UniformValue) -> ShaderResult<bool> {
        let Some(slot) = self.uniforms.get_mut(name) else {
            return Ok(false);
        };
        let expected = slot.uniform_type();
        if expected != value.uniform_type() {
            return Err(ShaderError::TypeMismatch {
                name: name.to_string(),
                expected: expected.name(),
                actual: value.uniform_type().name(),
            });
        }
        if *slot != value {
            *slot = value;
            self.uniforms_version += 1;
        }
        Ok(true)
    }

    /// 写入 uniform；未声明或类型不符时静默忽略并返回 `false`
    pub fn update_uniform(&mut self, name: &str, value: UniformValue) -> bool {
        match self.set_uniform(name, value) {
            Ok(true) => true,
            Ok(false) => {
                tracing::debug!(target: "chronos::shader", material = %self.name, uniform = name, "ignoring undeclared uniform");
                false
            }
            Err(error) => {
                tracing::debug!(target: "chronos::shader", material = %self.name, %error, "ignoring uniform write");
                false
            }
        }
    }

    /// 声明新 uniform 或改变其类型（结构变化，程序需要重建）
    pub fn declare_uniform(&mut self, name: &str, value: UniformValue) -> ShaderResult<()> {
        if !is_identifier(name) {
            return Err(ShaderError::InvalidSource(format!("invalid uniform name `{name}`")));
        }
        let previous = self.uniforms.insert(name.to_string(), value);
        if previous.map(|v| v.uniform_type()) == Some(value.uniform_type()) {
            self.uniforms_version += 1;
            return Ok(());
        }
        self.layout = UniformLayout::for_values(&self.uniforms);
        self.rebuild_sources()?;
        self.program_version += 1;
        self.uniforms_version += 1;
        Ok(())
    }

    /// 替换着色器主体（结构变化）
    pub fn set_sources(&mut self, vertex: &str, fragment: &str) -> ShaderResult<()> {
        let previous = (
            std::mem::replace(&mut self.vertex_body, vertex.to_string()),
            std::mem::replace(&mut self.fragment_body, fragment.to_string()),
        );
        if let Err(error) = self.rebuild_sources() {
            self.vertex_body = previous.0;
            self.fragment_body = previous.1;
            return Err(error);
        }
        self.program_version += 1;
        Ok(())
    }

    pub fn uniforms_version(&self) -> u64 {
        self.uniforms_version
    }

    pub fn program_version(&self) -> u64 {
        self.program_version
    }

    pub fn uniform_type(&self, name: &str) -> Option<UniformType> {
        self.uniforms.get(name).map(UniformValue::uniform_type)
    }

    /// 程序缓存键：源码与渲染状态相同的材质共享一个程序
    pub fn program_key(&self) -> String {
        let mut hasher = DefaultHasher::new();
        self.vertex_source.hash(&mut hasher);
        self.fragment_source.hash(&mut hasher);
        self.transparent.hash(&mut hasher);
        self.depth_write.hash(&mut hasher);
        self.depth_test.hash(&mut hasher);
        self.blending.hash(&mut hasher);
        self.side.hash(&mut hasher);
        format!("{}#{:016x}", self.name, hasher.finish())
    }

    /// 写入 G-Buffer 的片元源码
    ///
    /// 原 `main` 改名后由新的 `main` 调用，颜色写入反照率目标，
    /// 位置/法线来自标准插值变量。片元未声明这两个变量时返回 `None`。
    pub fn gbuffer_fragment_source(&self) -> Option<String> {
        let source = &self.fragment_source;
        if !source.contains("in vec3 vWorldPosition;") || !source.contains("in vec3 vNormal;") {
            return None;
        }
        let entry = source.find("void main()")?;
        let mut fragment = String::with_capacity(source.len() + GBUFFER_TAIL.len());
        fragment.push_str(&source[..entry]);
        fragment.push_str("void materialMain()");
        fragment.push_str(&source[entry + "void main()".len()..]);
        fragment.push_str(GBUFFER_TAIL);
        Some(fragment)
    }

    /// G-Buffer 程序描述符（不透明写入三个颜色目标）
    pub fn gbuffer_descriptor(&self, vertex_layouts: Vec<VertexLayout>) -> Option<ProgramDescriptor> {
        let fragment = self.gbuffer_fragment_source()?;
        Some(ProgramDescriptor {
            label: Some(format!("{} (G-Buffer)", self.name)),
            source: ProgramSource::Glsl {
                vertex: self.vertex_source.clone(),
                fragment,
            },
            vertex_layouts,
            bindings: vec![BindingKind::UniformBuffer],
            blend: BlendMode::Opaque,
            depth_test: true,
            depth_write: true,
            cull: self.side.into(),
        })
    }

    /// 构建程序描述符
    pub fn program_descriptor(&self, vertex_layouts: Vec<VertexLayout>) -> ProgramDescriptor {
        ProgramDescriptor {
            label: Some(self.name.clone()),
            source: ProgramSource::Glsl {
                vertex: self.vertex_source.clone(),
                fragment: self.fragment_source.clone(),
            },
            vertex_layouts,
            bindings: vec![BindingKind::UniformBuffer],
            blend: self.blending,
            depth_test: self.depth_test,
            depth_write: self.depth_write && !self.transparent,
            cull: self.side.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec3;

    fn material() -> ShaderMaterial {
        ShaderMaterial::new(
            ShaderConfig {
                name: "test".to_string(),
                fragment_shader: "#include <color>\nlayout(location = 0) out vec4 fragColor;\nvoid main() { fragColor = vec4(uColor, uOpacity); }".to_string(),
                ..ShaderConfig::default()
            }
            .with_uniform("uColor", Vec3::ONE)
            .with_uniform("uOpacity", 1.0f32),
        )
        .unwrap()
    }

    #[test]
    fn test_sources_are_assembled() {
        let material = material();
        assert!(material.vertex_source().starts_with("#version 450\n"));
        assert!(material.vertex_source().contains("layout(location = 0) in vec3 position;"));
        assert!(material.fragment_source().contains("vec3 uColor;"));
        assert!(material.fragment_source().contains("vec3 hsl2rgb("));
        assert!(!material.fragment_source().contains("#include"));
    }

    #[test]
    fn test_update_uniform_in_place() {
        let mut material = material();
        let key = material.program_key();

        assert!(material.update_uniform("uOpacity", UniformValue::Float(0.5)));
        assert_eq!(material.uniform("uOpacity"), Some(&UniformValue::Float(0.5)));
        assert_eq!(material.uniforms_version(), 1);
        assert_eq!(material.program_version(), 0);
        assert_eq!(material.program_key(), key);
    }

    #[test]
    fn test_undeclared_and_mismatched_writes_are_ignored() {
        let mut material = material();
        assert!(!material.update_uniform("uMissing", UniformValue::Float(1.0)));
        assert!(!material.update_uniform("uOpacity", UniformValue::Vec3(Vec3::ONE)));
        assert_eq!(material.uniforms_version(), 0);
        assert!(matches!(
            material.set_uniform("uOpacity", UniformValue::Int(1)),
            Err(ShaderError::TypeMismatch { expected: "float", actual: "int", .. })
        ));
    }

    #[test]
    fn test_declare_uniform_is_structural() {
        let mut material = material();
        let key = material.program_key();
        material.declare_uniform("uGlow", UniformValue::Float(2.0)).unwrap();
        assert_eq!(material.program_version(), 1);
        assert_ne!(material.program_key(), key);
        assert!(material.fragment_source().contains("float uGlow;"));
    }

    #[test]
    fn test_gbuffer_fragment_wraps_main() {
        assert!(material().gbuffer_fragment_source().is_none());

        let material = ShaderMaterial::new(ShaderConfig {
            name: "lit".to_string(),
            fragment_shader: "#include <varyings>\nlayout(location = 0) out vec4 fragColor;\nvoid main() { fragColor = vec4(vNormal, 1.0); }".to_string(),
            ..ShaderConfig::default()
        })
        .unwrap();
        let fragment = material.gbuffer_fragment_source().unwrap();
        assert!(fragment.contains("void materialMain() { fragColor"));
        assert_eq!(fragment.matches("void main()").count(), 1);
        assert!(fragment.contains("out vec4 gAlbedo;"));
        let desc = material.gbuffer_descriptor(Vec::new()).unwrap();
        assert_eq!(desc.blend, BlendMode::Opaque);
    }

    #[test]
    fn test_invalid_config_rejected() {
        assert!(ShaderMaterial::new(ShaderConfig::default()).is_err());
        let bad_name = ShaderConfig {
            fragment_shader: "void main() {}".to_string(),
            ..ShaderConfig::default()
        }
        .with_uniform("1bad", 1.0f32);
        assert!(ShaderMaterial::new(bad_name).is_err());
    }

    #[test]
    fn test_failed_source_swap_keeps_previous() {
        let mut material = material();
        let before = material.fragment_source().to_string();
        assert!(material.set_sources("void main() {}", "#include <missing>").is_err());
        assert_eq!(material.fragment_source(), before);
        assert_eq!(material.program_version(), 0);
    }
}
