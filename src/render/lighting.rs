//! 光照与阴影
//!
//! - [`LightingRig`] - 环境光 + 主方向光 + 彩色点光源，持有阴影贴图
//! - [`DeferredLighting`] - 读取 G-Buffer 的全屏光照通道
//!
//! 阴影贴图随质量等级整体重建：旧贴图全部释放后再按新尺寸创建，
//! 返回前完成垃圾回收，下一帧渲染前不会残留旧尺寸的贴图。

use super::backend::{
    BindingKind, BindingResource, BlendMode, BufferUsage, CullMode, ProgramDescriptor, ProgramSource,
    RenderCommand, TextureDescriptor, TextureFormat, TextureHandle, TextureUsage, Topology,
};
use super::context::{GpuBuffer, GpuContext, GpuProgram, GpuTexture};
use super::gbuffer::GBuffer;
use super::postprocess::FULLSCREEN_VERTEX;
use super::quality::QualityLevel;
use super::scene::ViewState;
use crate::core::error::RenderResult;
use crate::core::utils::parse_hex_color;
use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec3};

/// 同时参与着色的点光源上限
pub const MAX_POINT_LIGHTS: usize = 4;

/// 阴影正交投影的半宽
const SHADOW_EXTENT: f32 = 10.0;
const SHADOW_NEAR: f32 = 0.1;
const SHADOW_FAR: f32 = 50.0;
const SHADOW_BIAS: f32 = 0.002;

/// 光源类型
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LightKind {
    /// 从 `position` 指向原点的平行光
    Directional,
    Point,
}

/// 光源
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Light {
    pub kind: LightKind,
    pub color: Vec3,
    pub intensity: f32,
    pub position: Vec3,
    /// 点光源衰减到零的距离
    pub range: f32,
    pub cast_shadow: bool,
}

impl Light {
    pub fn directional(color: Vec3, intensity: f32, position: Vec3) -> Self {
        Self {
            kind: LightKind::Directional,
            color,
            intensity,
            position,
            range: 0.0,
            cast_shadow: false,
        }
    }

    pub fn point(color: Vec3, intensity: f32, position: Vec3, range: f32) -> Self {
        Self {
            kind: LightKind::Point,
            color,
            intensity,
            position,
            range,
            cast_shadow: false,
        }
    }

    pub fn with_shadow(mut self, cast_shadow: bool) -> Self {
        self.cast_shadow = cast_shadow;
        self
    }

    /// 方向光的视图投影矩阵（正交，朝向原点）
    pub fn shadow_view_projection(&self) -> Mat4 {
        let direction = (-self.position).normalize_or_zero();
        let up = if direction.cross(Vec3::Y).length_squared() < 1e-6 {
            Vec3::Z
        } else {
            Vec3::Y
        };
        let view = Mat4::look_at_rh(self.position, Vec3::ZERO, up);
        let projection = Mat4::orthographic_rh(
            -SHADOW_EXTENT,
            SHADOW_EXTENT,
            -SHADOW_EXTENT,
            SHADOW_EXTENT,
            SHADOW_NEAR,
            SHADOW_FAR,
        );
        projection * view
    }
}

/// 单个光源的阴影贴图（`size²` 深度纹理）
#[derive(Debug)]
pub struct ShadowMap {
    texture: GpuTexture,
    light: usize,
    size: u32,
}

impl ShadowMap {
    pub fn handle(&self) -> TextureHandle {
        self.texture.handle()
    }

    /// 对应光源在 `LightingRig::lights()` 中的下标
    pub fn light(&self) -> usize {
        self.light
    }

    pub fn size(&self) -> u32 {
        self.size
    }
}

/// 光照装置
#[derive(Debug)]
pub struct LightingRig {
    ambient_color: Vec3,
    ambient_intensity: f32,
    lights: Vec<Light>,
    shadow_maps: Vec<ShadowMap>,
}

fn hex(color: &str) -> Vec3 {
    parse_hex_color(color).unwrap_or(Vec3::ONE)
}

impl Default for LightingRig {
    /// 仪表盘装饰光：环境光 0.4，投射阴影的主光，紫/青两盏补光
    fn default() -> Self {
        Self::new(Vec3::ONE, 0.4)
            .with_light(Light::directional(Vec3::ONE, 1.0, Vec3::new(5.0, 10.0, 5.0)).with_shadow(true))
            .with_light(Light::point(hex("#8b5cf6"), 0.5, Vec3::new(-5.0, 3.0, -5.0), 20.0))
            .with_light(Light::point(hex("#06b6d4"), 0.5, Vec3::new(5.0, -3.0, 5.0), 20.0))
    }
}

impl LightingRig {
    /// 只有环境光的装置
    pub fn new(ambient_color: Vec3, ambient_intensity: f32) -> Self {
        Self {
            ambient_color,
            ambient_intensity,
            lights: Vec::new(),
            shadow_maps: Vec::new(),
        }
    }

    pub fn with_light(mut self, light: Light) -> Self {
        self.lights.push(light);
        self
    }

    /// 添加光源；投射阴影的光源在下一次 `rebuild_shadow_maps` 时获得贴图
    pub fn add_light(&mut self, light: Light) -> usize {
        self.lights.push(light);
        self.lights.len() - 1
    }

    pub fn lights(&self) -> &[Light] {
        &self.lights
    }

    pub fn set_ambient(&mut self, color: Vec3, intensity: f32) {
        self.ambient_color = color;
        self.ambient_intensity = intensity;
    }

    pub fn ambient(&self) -> (Vec3, f32) {
        (self.ambient_color, self.ambient_intensity)
    }

    /// 释放全部阴影贴图，质量等级开启阴影时按新尺寸重建
    ///
    /// 旧贴图在返回前销毁，返回新建的贴图数量。
    pub fn rebuild_shadow_maps(&mut self, gpu: &mut GpuContext, quality: &QualityLevel) -> RenderResult<usize> {
        let previous = self.shadow_maps.len();
        self.shadow_maps.clear();
        gpu.collect_garbage();

        if quality.shadows {
            let size = quality.shadow_map_size.max(1);
            for (index, light) in self.lights.iter().enumerate() {
                if !light.cast_shadow || light.kind != LightKind::Directional {
                    continue;
                }
                let texture = gpu.create_texture(&TextureDescriptor {
                    label: Some(format!("Shadow Map {index}")),
                    width: size,
                    height: size,
                    format: TextureFormat::Depth32Float,
                    usage: TextureUsage::RENDER_ATTACHMENT | TextureUsage::TEXTURE_BINDING,
                })?;
                self.shadow_maps.push(ShadowMap {
                    texture,
                    light: index,
                    size,
                });
            }
        }
        tracing::info!(
            target: "chronos::lighting",
            released = previous,
            created = self.shadow_maps.len(),
            size = quality.shadow_map_size,
            "shadow maps rebuilt"
        );
        Ok(self.shadow_maps.len())
    }

    /// 释放阴影贴图（由 `collect_garbage` 实际销毁）
    pub fn release_shadow_maps(&mut self) {
        self.shadow_maps.clear();
    }

    pub fn shadow_maps(&self) -> &[ShadowMap] {
        &self.shadow_maps
    }

    /// 阴影通道使用的贴图
    pub fn primary_shadow_map(&self) -> Option<&ShadowMap> {
        self.shadow_maps.first()
    }

    /// 主阴影光源的视图投影矩阵
    pub fn shadow_view_projection(&self) -> Option<Mat4> {
        let map = self.primary_shadow_map()?;
        self.lights.get(map.light).map(Light::shadow_view_projection)
    }

    fn key_light(&self) -> Option<&Light> {
        self.lights.iter().find(|light| light.kind == LightKind::Directional)
    }

    /// 打包本帧的光照 uniform（方向与位置转换到视图空间）
    pub fn uniforms(&self, view: &ViewState, quality: &QualityLevel) -> LightUniforms {
        let mut uniforms = LightUniforms::zeroed();
        uniforms.view_matrix = view.view.to_cols_array();
        uniforms.shadow_matrix = self
            .shadow_view_projection()
            .unwrap_or(Mat4::IDENTITY)
            .to_cols_array();
        uniforms.ambient = (self.ambient_color * self.ambient_intensity).extend(1.0).to_array();

        if let Some(key) = self.key_light() {
            let direction = view.view.transform_vector3(key.position.normalize_or_zero());
            uniforms.key_direction = direction.extend(key.intensity).to_array();
            uniforms.key_color = key.color.extend(1.0).to_array();
        }

        let points = self
            .lights
            .iter()
            .filter(|light| light.kind == LightKind::Point)
            .take(MAX_POINT_LIGHTS);
        let mut count = 0;
        for (slot, light) in points.enumerate() {
            let position = view.view.transform_point3(light.position);
            uniforms.point_positions[slot] = position.extend(light.intensity).to_array();
            uniforms.point_colors[slot] = light.color.extend(light.range).to_array();
            count += 1;
        }

        let flag = |enabled: bool| if enabled { 1.0 } else { 0.0 };
        uniforms.params = [
            count as f32,
            flag(quality.ambient_occlusion),
            flag(quality.reflections),
            SHADOW_BIAS,
        ];
        uniforms
    }
}

/// 延迟光照 uniform 块（std140，320 字节）
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct LightUniforms {
    pub view_matrix: [f32; 16],
    pub shadow_matrix: [f32; 16],
    /// RGB = 环境光颜色 × 强度
    pub ambient: [f32; 4],
    /// XYZ = 视图空间中指向光源的方向, W = 强度
    pub key_direction: [f32; 4],
    pub key_color: [f32; 4],
    /// XYZ = 视图空间位置, W = 强度
    pub point_positions: [[f32; 4]; MAX_POINT_LIGHTS],
    /// RGB = 颜色, W = 衰减距离
    pub point_colors: [[f32; 4]; MAX_POINT_LIGHTS],
    /// (点光源数量, AO 开关, 反射开关, 阴影偏移)
    pub params: [f32; 4],
}

const LIGHTING_FRAGMENT: &str = r#"
layout(location = 0) in vec2 vUv;
layout(location = 0) out vec4 fragColor;

layout(set = 0, binding = 0, std140) uniform LightUniforms {
    mat4 viewMatrix;
    mat4 shadowMatrix;
    vec4 ambientColor;
    vec4 keyDirection;
    vec4 keyColor;
    vec4 pointPositions[4];
    vec4 pointColors[4];
    vec4 params;
};
layout(set = 0, binding = 1) uniform texture2D gPosition;
layout(set = 0, binding = 2) uniform sampler gPositionSampler;
layout(set = 0, binding = 3) uniform texture2D gNormal;
layout(set = 0, binding = 4) uniform sampler gNormalSampler;
layout(set = 0, binding = 5) uniform texture2D gAlbedo;
layout(set = 0, binding = 6) uniform sampler gAlbedoSampler;

#ifdef SHADOWS
layout(set = 0, binding = 7) uniform texture2D shadowMap;
layout(set = 0, binding = 8) uniform samplerShadow shadowSampler;

float shadowFactor(vec3 worldPosition) {
    vec4 clip = shadowMatrix * vec4(worldPosition, 1.0);
    vec3 ndc = clip.xyz / clip.w;
    vec2 uv = vec2(ndc.x * 0.5 + 0.5, 0.5 - ndc.y * 0.5);
    if (uv.x < 0.0 || uv.x > 1.0 || uv.y < 0.0 || uv.y > 1.0 || ndc.z > 1.0) {
        return 1.0;
    }
    return texture(sampler2DShadow(shadowMap, shadowSampler), vec3(uv, ndc.z - params.w));
}
#else
float shadowFactor(vec3 worldPosition) {
    return 1.0;
}
#endif

void main() {
    vec4 normalSample = texture(sampler2D(gNormal, gNormalSampler), vUv);
    if (normalSample.a == 0.0) {
        discard;
    }
    vec3 worldPosition = texture(sampler2D(gPosition, gPositionSampler), vUv).xyz;
    vec4 albedo = texture(sampler2D(gAlbedo, gAlbedoSampler), vUv);

    vec3 N = normalize(normalSample.xyz);
    vec3 viewPosition = (viewMatrix * vec4(worldPosition, 1.0)).xyz;
    vec3 V = normalize(-viewPosition);

    vec3 color = albedo.rgb * ambientColor.rgb;

    vec3 L = normalize(keyDirection.xyz);
    float diffuse = max(dot(N, L), 0.0);
    float specular = pow(max(dot(N, normalize(L + V)), 0.0), 32.0);
    color += (albedo.rgb * diffuse + specular * 0.25) * keyColor.rgb * keyDirection.w * shadowFactor(worldPosition);

    int count = int(params.x);
    for (int i = 0; i < 4; i++) {
        if (i >= count) {
            break;
        }
        vec3 toLight = pointPositions[i].xyz - viewPosition;
        float dist = length(toLight);
        vec3 Lp = toLight / max(dist, 0.0001);
        float falloff = clamp(1.0 - dist / max(pointColors[i].w, 0.0001), 0.0, 1.0);
        float lit = max(dot(N, Lp), 0.0) * falloff * falloff * pointPositions[i].w;
        color += albedo.rgb * pointColors[i].rgb * lit;
    }

    float facing = max(dot(N, V), 0.0);
    if (params.y > 0.5) {
        color *= mix(0.6, 1.0, facing);
    }
    if (params.z > 0.5) {
        color += pow(1.0 - facing, 3.0) * ambientColor.rgb * 0.5;
    }

    fragColor = vec4(color, albedo.a);
}
"#;

const PROGRAM_KEY: &str = "deferred-lighting";
const SHADOWED_PROGRAM_KEY: &str = "deferred-lighting-shadowed";

fn lighting_descriptor(shadowed: bool) -> ProgramDescriptor {
    let defines = if shadowed { "#define SHADOWS\n" } else { "" };
    let mut bindings = vec![
        BindingKind::UniformBuffer,
        BindingKind::SampledTexture,
        BindingKind::SampledTexture,
        BindingKind::SampledTexture,
    ];
    if shadowed {
        bindings.push(BindingKind::DepthTexture);
    }
    ProgramDescriptor {
        label: Some(if shadowed { SHADOWED_PROGRAM_KEY } else { PROGRAM_KEY }.to_string()),
        source: ProgramSource::Glsl {
            vertex: FULLSCREEN_VERTEX.to_string(),
            fragment: format!("#version 450\n{defines}{LIGHTING_FRAGMENT}"),
        },
        vertex_layouts: Vec::new(),
        bindings,
        blend: BlendMode::Opaque,
        depth_test: false,
        depth_write: false,
        cull: CullMode::None,
    }
}

/// 延迟光照通道
#[derive(Debug, Default)]
pub struct DeferredLighting {
    uniforms: Option<GpuBuffer>,
    program: Option<GpuProgram>,
    shadow_map: Option<TextureHandle>,
}

impl DeferredLighting {
    pub fn new() -> Self {
        Self::default()
    }

    /// 选择程序变体并写入本帧光照数据
    pub fn prepare(
        &mut self,
        gpu: &mut GpuContext,
        rig: &LightingRig,
        view: &ViewState,
        quality: &QualityLevel,
    ) -> RenderResult<()> {
        self.shadow_map = rig.primary_shadow_map().map(ShadowMap::handle);
        let shadowed = self.shadow_map.is_some();
        let key = if shadowed { SHADOWED_PROGRAM_KEY } else { PROGRAM_KEY };
        self.program = Some(gpu.program(key, || lighting_descriptor(shadowed))?);

        if self.uniforms.is_none() {
            self.uniforms = Some(gpu.create_buffer(
                "Light Uniforms",
                std::mem::size_of::<LightUniforms>() as u64,
                BufferUsage::UNIFORM,
            )?);
        }
        if let Some(buffer) = &self.uniforms {
            let data = rig.uniforms(view, quality);
            gpu.write_buffer(buffer, 0, bytemuck::bytes_of(&data))?;
        }
        Ok(())
    }

    /// 全屏光照绘制（在已开始的渲染通道内）
    pub fn encode(&self, gbuffer: &GBuffer, out: &mut Vec<RenderCommand>) {
        let (Some(program), Some(uniforms)) = (&self.program, &self.uniforms) else {
            return;
        };
        let [position, normal, albedo] = gbuffer.color_targets();
        let mut bindings = vec![
            BindingResource::Buffer(uniforms.handle()),
            BindingResource::Texture(position),
            BindingResource::Texture(normal),
            BindingResource::Texture(albedo),
        ];
        bindings.extend(self.shadow_map.map(BindingResource::Texture));
        out.push(RenderCommand::Draw {
            program: program.handle(),
            vertex_buffers: Vec::new(),
            bindings,
            vertex_count: 3,
            instance_count: 1,
            topology: Topology::TriangleList,
        });
    }

    pub fn release(&mut self) {
        self.uniforms = None;
        self.program = None;
        self.shadow_map = None;
    }
}
