//! Uniform 值、std140 布局与打包
//!
//! 每个材质只有一个 uniform 块（set 0, binding 0）。内置矩阵排在最前，
//! 用户 uniform 按名称排序跟在后面，因此同一组 uniform 总是得到同一布局。

use super::material::ShaderMaterial;
use glam::{Mat3, Mat4, Vec2, Vec3, Vec4};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt::Write;

/// Uniform 类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UniformType {
    Float,
    Int,
    Bool,
    Vec2,
    Vec3,
    Vec4,
    Mat3,
    Mat4,
}

impl UniformType {
    /// GLSL 类型名（bool 在 uniform 块中以 int 声明）
    pub fn glsl_name(&self) -> &'static str {
        match self {
            UniformType::Float => "float",
            UniformType::Int | UniformType::Bool => "int",
            UniformType::Vec2 => "vec2",
            UniformType::Vec3 => "vec3",
            UniformType::Vec4 => "vec4",
            UniformType::Mat3 => "mat3",
            UniformType::Mat4 => "mat4",
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            UniformType::Bool => "bool",
            other => other.glsl_name(),
        }
    }

    /// std140 对齐（字节）
    pub fn align(&self) -> u64 {
        match self {
            UniformType::Float | UniformType::Int | UniformType::Bool => 4,
            UniformType::Vec2 => 8,
            _ => 16,
        }
    }

    /// std140 大小（字节）
    pub fn size(&self) -> u64 {
        match self {
            UniformType::Float | UniformType::Int | UniformType::Bool => 4,
            UniformType::Vec2 => 8,
            UniformType::Vec3 => 12,
            UniformType::Vec4 => 16,
            UniformType::Mat3 => 48,
            UniformType::Mat4 => 64,
        }
    }
}

/// Uniform 值
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "lowercase")]
pub enum UniformValue {
    Float(f32),
    Int(i32),
    Bool(bool),
    Vec2(Vec2),
    Vec3(Vec3),
    Vec4(Vec4),
    Mat3(Mat3),
    Mat4(Mat4),
}

impl UniformValue {
    pub fn uniform_type(&self) -> UniformType {
        match self {
            UniformValue::Float(_) => UniformType::Float,
            UniformValue::Int(_) => UniformType::Int,
            UniformValue::Bool(_) => UniformType::Bool,
            UniformValue::Vec2(_) => UniformType::Vec2,
            UniformValue::Vec3(_) => UniformType::Vec3,
            UniformValue::Vec4(_) => UniformType::Vec4,
            UniformValue::Mat3(_) => UniformType::Mat3,
            UniformValue::Mat4(_) => UniformType::Mat4,
        }
    }

    pub fn as_f32(&self) -> Option<f32> {
        match self {
            UniformValue::Float(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_vec3(&self) -> Option<Vec3> {
        match self {
            UniformValue::Vec3(v) => Some(*v),
            _ => None,
        }
    }

    /// 按 std140 写入 `out[offset..]`
    fn write_std140(&self, out: &mut [u8], offset: usize) {
        let mut put = |index: usize, bytes: [u8; 4]| {
            let start = offset + index * 4;
            out[start..start + 4].copy_from_slice(&bytes);
        };
        match *self {
            UniformValue::Float(v) => put(0, v.to_le_bytes()),
            UniformValue::Int(v) => put(0, v.to_le_bytes()),
            UniformValue::Bool(v) => put(0, (v as i32).to_le_bytes()),
            UniformValue::Vec2(v) => {
                for (i, c) in v.to_array().iter().enumerate() {
                    put(i, c.to_le_bytes());
                }
            }
            UniformValue::Vec3(v) => {
                for (i, c) in v.to_array().iter().enumerate() {
                    put(i, c.to_le_bytes());
                }
            }
            UniformValue::Vec4(v) => {
                for (i, c) in v.to_array().iter().enumerate() {
                    put(i, c.to_le_bytes());
                }
            }
            UniformValue::Mat3(m) => {
                // 每列填充到 vec4
                for (column, values) in m.to_cols_array_2d().iter().enumerate() {
                    for (row, c) in values.iter().enumerate() {
                        put(column * 4 + row, c.to_le_bytes());
                    }
                }
            }
            UniformValue::Mat4(m) => {
                for (i, c) in m.to_cols_array().iter().enumerate() {
                    put(i, c.to_le_bytes());
                }
            }
        }
    }
}

impl From<f32> for UniformValue {
    fn from(value: f32) -> Self {
        UniformValue::Float(value)
    }
}

impl From<i32> for UniformValue {
    fn from(value: i32) -> Self {
        UniformValue::Int(value)
    }
}

impl From<bool> for UniformValue {
    fn from(value: bool) -> Self {
        UniformValue::Bool(value)
    }
}

impl From<Vec2> for UniformValue {
    fn from(value: Vec2) -> Self {
        UniformValue::Vec2(value)
    }
}

impl From<Vec3> for UniformValue {
    fn from(value: Vec3) -> Self {
        UniformValue::Vec3(value)
    }
}

impl From<[f32; 3]> for UniformValue {
    fn from(value: [f32; 3]) -> Self {
        UniformValue::Vec3(Vec3::from_array(value))
    }
}

impl From<Vec4> for UniformValue {
    fn from(value: Vec4) -> Self {
        UniformValue::Vec4(value)
    }
}

impl From<Mat3> for UniformValue {
    fn from(value: Mat3) -> Self {
        UniformValue::Mat3(value)
    }
}

impl From<Mat4> for UniformValue {
    fn from(value: Mat4) -> Self {
        UniformValue::Mat4(value)
    }
}

/// 内置 uniform（名称, 类型），位于每个 uniform 块的开头
pub const BUILTIN_UNIFORMS: [(&str, UniformType); 5] = [
    ("modelMatrix", UniformType::Mat4),
    ("viewMatrix", UniformType::Mat4),
    ("projectionMatrix", UniformType::Mat4),
    ("normalMatrix", UniformType::Mat3),
    ("cameraPosition", UniformType::Vec3),
];

/// 每帧由渲染器提供的内置值
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BuiltinUniforms {
    pub model: Mat4,
    pub view: Mat4,
    pub projection: Mat4,
    pub camera_position: Vec3,
}

impl Default for BuiltinUniforms {
    fn default() -> Self {
        Self {
            model: Mat4::IDENTITY,
            view: Mat4::IDENTITY,
            projection: Mat4::IDENTITY,
            camera_position: Vec3::ZERO,
        }
    }
}

impl BuiltinUniforms {
    /// 模型视图矩阵的逆转置（3x3）
    pub fn normal_matrix(&self) -> Mat3 {
        Mat3::from_mat4(self.view * self.model).inverse().transpose()
    }

    fn values(&self) -> [UniformValue; 5] {
        [
            UniformValue::Mat4(self.model),
            UniformValue::Mat4(self.view),
            UniformValue::Mat4(self.projection),
            UniformValue::Mat3(self.normal_matrix()),
            UniformValue::Vec3(self.camera_position),
        ]
    }
}

/// 布局条目
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UniformEntry {
    pub name: String,
    pub ty: UniformType,
    pub offset: u64,
}

/// std140 uniform 块布局
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UniformLayout {
    entries: Vec<UniformEntry>,
    size: u64,
}

impl UniformLayout {
    /// 内置 uniform + 给定的用户 uniform
    pub fn new<'a, I>(uniforms: I) -> Self
    where
        I: IntoIterator<Item = (&'a str, UniformType)>,
    {
        let mut entries = Vec::new();
        let mut offset = 0;
        let all = BUILTIN_UNIFORMS.iter().copied().chain(uniforms);
        for (name, ty) in all {
            offset = align_to(offset, ty.align());
            entries.push(UniformEntry {
                name: name.to_string(),
                ty,
                offset,
            });
            offset += ty.size();
        }
        Self {
            entries,
            size: align_to(offset.max(16), 16),
        }
    }

    pub fn for_values(values: &BTreeMap<String, UniformValue>) -> Self {
        Self::new(values.iter().map(|(name, value)| (name.as_str(), value.uniform_type())))
    }

    pub fn entries(&self) -> &[UniformEntry] {
        &self.entries
    }

    pub fn entry(&self, name: &str) -> Option<&UniformEntry> {
        self.entries.iter().find(|entry| entry.name == name)
    }

    /// 块大小（16 字节对齐）
    pub fn size(&self) -> u64 {
        self.size
    }

    /// GLSL 块声明
    pub fn glsl_block(&self, block_name: &str) -> String {
        let mut block = format!("layout(set = 0, binding = 0, std140) uniform {block_name} {{\n");
        for entry in &self.entries {
            let _ = writeln!(block, "    {} {};", entry.ty.glsl_name(), entry.name);
        }
        block.push_str("};\n");
        block
    }

    /// 打包内置值与用户值
    pub fn pack(&self, builtins: &BuiltinUniforms, values: &BTreeMap<String, UniformValue>) -> Vec<u8> {
        let mut out = vec![0u8; self.size as usize];
        for (entry, value) in self.entries.iter().zip(builtins.values()) {
            value.write_std140(&mut out, entry.offset as usize);
        }
        for entry in self.entries.iter().skip(BUILTIN_UNIFORMS.len()) {
            if let Some(value) = values.get(&entry.name) {
                if value.uniform_type() == entry.ty {
                    value.write_std140(&mut out, entry.offset as usize);
                }
            }
        }
        out
    }
}

fn align_to(value: u64, align: u64) -> u64 {
    value.div_ceil(align) * align
}

/// 批量更新材质 uniform，返回实际写入的数量
///
/// 未声明或类型不符的名称被跳过。与后端无关，只修改材质上的值。
pub fn update_shader_uniforms<'a, I>(material: &mut ShaderMaterial, updates: I) -> usize
where
    I: IntoIterator<Item = (&'a str, UniformValue)>,
{
    updates
        .into_iter()
        .filter(|(name, value)| material.update_uniform(name, *value))
        .count()
}

/// 推进 `uTime`；材质未声明时返回 `false`
pub fn update_time(material: &mut ShaderMaterial, time: f32) -> bool {
    material.update_uniform("uTime", UniformValue::Float(time))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn f32_at(bytes: &[u8], offset: u64) -> f32 {
        let o = offset as usize;
        f32::from_le_bytes([bytes[o], bytes[o + 1], bytes[o + 2], bytes[o + 3]])
    }

    #[test]
    fn test_builtin_offsets() {
        let layout = UniformLayout::new(std::iter::empty());
        assert_eq!(layout.entry("viewMatrix").unwrap().offset, 64);
        assert_eq!(layout.entry("normalMatrix").unwrap().offset, 192);
        assert_eq!(layout.entry("cameraPosition").unwrap().offset, 240);
        assert_eq!(layout.size(), 256);
    }

    #[test]
    fn test_std140_packing_rules() {
        let mut values = BTreeMap::new();
        values.insert("a".to_string(), UniformValue::Float(1.0));
        values.insert("b".to_string(), UniformValue::Vec3(Vec3::new(2.0, 3.0, 4.0)));
        values.insert("c".to_string(), UniformValue::Vec2(Vec2::new(5.0, 6.0)));
        let layout = UniformLayout::for_values(&values);

        // cameraPosition(vec3) 结束于 252，float 可以紧跟
        assert_eq!(layout.entry("a").unwrap().offset, 252);
        assert_eq!(layout.entry("b").unwrap().offset, 256);
        assert_eq!(layout.entry("c").unwrap().offset, 272);
        assert_eq!(layout.size(), 288);

        let bytes = layout.pack(&BuiltinUniforms::default(), &values);
        assert_eq!(f32_at(&bytes, 252), 1.0);
        assert_eq!(f32_at(&bytes, 264), 4.0);
        assert_eq!(f32_at(&bytes, 276), 6.0);
        // 单位模型矩阵的第一个元素
        assert_eq!(f32_at(&bytes, 0), 1.0);
    }

    #[test]
    fn test_glsl_block_declares_bool_as_int() {
        let mut values = BTreeMap::new();
        values.insert("uEnabled".to_string(), UniformValue::Bool(true));
        let block = UniformLayout::for_values(&values).glsl_block("MaterialUniforms");
        assert!(block.contains("int uEnabled;"));
        assert!(block.contains("mat3 normalMatrix;"));
        assert!(block.starts_with("layout(set = 0, binding = 0, std140) uniform MaterialUniforms {"));
    }

    #[test]
    fn test_mat3_columns_padded() {
        let layout = UniformLayout::new(std::iter::empty());
        let builtins = BuiltinUniforms::default();
        let bytes = layout.pack(&builtins, &BTreeMap::new());
        let base = layout.entry("normalMatrix").unwrap().offset;
        assert_eq!(f32_at(&bytes, base), 1.0);
        assert_eq!(f32_at(&bytes, base + 16 + 4), 1.0);
        assert_eq!(f32_at(&bytes, base + 32 + 8), 1.0);
    }
}
