//! 场景图
//!
//! 场景持有一组 [`Drawable`]。每帧先 `prepare`（上传 uniform、按需创建 GPU 资源），
//! 再按绘制阶段 `encode` 出渲染命令。粒子系统、网格等都实现同一个 trait。

use super::backend::{
    BindingKind, BindingResource, BlendMode, BufferUsage, CullMode, ProgramDescriptor, ProgramSource,
    RenderCommand, StepMode, Topology, VertexFormat, VertexLayout,
};
use super::context::{GpuBuffer, GpuContext, GpuProgram};
use crate::core::error::{RenderError, RenderResult};
use crate::shaders::material::ShaderMaterial;
use crate::shaders::uniforms::BuiltinUniforms;
use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec2, Vec3};
use std::cell::RefCell;
use std::f32::consts::{PI, TAU};
use std::rc::Rc;

/// 每帧的视图状态
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ViewState {
    pub view: Mat4,
    pub projection: Mat4,
    pub camera_position: Vec3,
    /// 循环启动以来的秒数
    pub time: f32,
    pub delta: f32,
    /// 渲染分辨率（像素）
    pub viewport: Vec2,
    pub pixel_ratio: f32,
    /// 主阴影光源的视图投影矩阵（阴影关闭时为 `None`）
    pub shadow_view_projection: Option<Mat4>,
    /// 是否使用延迟渲染
    pub deferred: bool,
}

impl Default for ViewState {
    fn default() -> Self {
        Self {
            view: Mat4::IDENTITY,
            projection: Mat4::IDENTITY,
            camera_position: Vec3::ZERO,
            time: 0.0,
            delta: 0.0,
            viewport: Vec2::new(1.0, 1.0),
            pixel_ratio: 1.0,
            shadow_view_projection: None,
            deferred: false,
        }
    }
}

impl ViewState {
    pub fn builtins(&self, model: Mat4) -> BuiltinUniforms {
        BuiltinUniforms {
            model,
            view: self.view,
            projection: self.projection,
            camera_position: self.camera_position,
        }
    }
}

/// 绘制阶段
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DrawPhase {
    /// 写入阴影贴图（仅深度）
    ShadowCaster,
    /// 写入 G-Buffer
    Geometry,
    /// 前向不透明
    Opaque,
    /// 前向透明（粒子等）
    Transparent,
    /// UI 叠加层
    Overlay,
}

/// 可绘制对象
pub trait Drawable {
    fn label(&self) -> String {
        "drawable".to_string()
    }

    /// 上传本帧数据；GPU 资源在第一次调用时创建
    fn prepare(&mut self, gpu: &mut GpuContext, view: &ViewState) -> RenderResult<()>;

    /// 计算调度命令（在所有渲染通道之前提交）
    fn encode_compute(&self, _out: &mut Vec<RenderCommand>) {}

    /// 指定阶段的绘制命令
    fn encode(&self, phase: DrawPhase, out: &mut Vec<RenderCommand>);

    fn is_transparent(&self) -> bool {
        false
    }

    fn casts_shadow(&self) -> bool {
        false
    }

    /// 释放 GPU 资源（由 `GpuContext::collect_garbage` 实际销毁）
    fn release(&mut self);
}

/// 共享的可绘制对象：场景与帧回调同时持有
///
/// 帧回调执行期间借用冲突时，`prepare` 返回错误，`encode` 跳过该对象。
impl<T: Drawable> Drawable for Rc<RefCell<T>> {
    fn label(&self) -> String {
        self.try_borrow()
            .map(|inner| inner.label())
            .unwrap_or_else(|_| "shared drawable".to_string())
    }

    fn prepare(&mut self, gpu: &mut GpuContext, view: &ViewState) -> RenderResult<()> {
        let mut inner = self
            .try_borrow_mut()
            .map_err(|_| RenderError::InvalidState("drawable is borrowed during prepare".to_string()))?;
        inner.prepare(gpu, view)
    }

    fn encode_compute(&self, out: &mut Vec<RenderCommand>) {
        if let Ok(inner) = self.try_borrow() {
            inner.encode_compute(out);
        }
    }

    fn encode(&self, phase: DrawPhase, out: &mut Vec<RenderCommand>) {
        if let Ok(inner) = self.try_borrow() {
            inner.encode(phase, out);
        }
    }

    fn is_transparent(&self) -> bool {
        self.try_borrow().map(|inner| inner.is_transparent()).unwrap_or(false)
    }

    fn casts_shadow(&self) -> bool {
        self.try_borrow().map(|inner| inner.casts_shadow()).unwrap_or(false)
    }

    fn release(&mut self) {
        if let Ok(mut inner) = self.try_borrow_mut() {
            inner.release();
        }
    }
}

// ============================================================================
// 几何体
// ============================================================================

/// 交错顶点：位置、法线、UV
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct Vertex {
    pub position: [f32; 3],
    pub normal: [f32; 3],
    pub uv: [f32; 2],
}

impl Vertex {
    fn new(position: Vec3, normal: Vec3, uv: Vec2) -> Self {
        Self {
            position: position.to_array(),
            normal: normal.to_array(),
            uv: uv.to_array(),
        }
    }
}

/// 非索引三角形列表
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Geometry {
    vertices: Vec<Vertex>,
}

impl Geometry {
    pub fn new(vertices: Vec<Vertex>) -> Self {
        Self { vertices }
    }

    /// 顶点布局（location 0..=2）
    pub fn layout() -> VertexLayout {
        VertexLayout::packed(
            StepMode::Vertex,
            0,
            &[VertexFormat::Float32x3, VertexFormat::Float32x3, VertexFormat::Float32x2],
        )
    }

    pub fn vertices(&self) -> &[Vertex] {
        &self.vertices
    }

    pub fn vertex_count(&self) -> u32 {
        self.vertices.len() as u32
    }

    pub fn triangle_count(&self) -> u32 {
        self.vertex_count() / 3
    }

    pub fn as_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.vertices)
    }

    /// 参数化网格：`point(u, v)` 给出 (位置, 法线)
    fn from_grid<F>(columns: u32, rows: u32, mut point: F) -> Self
    where
        F: FnMut(f32, f32) -> (Vec3, Vec3),
    {
        let columns = columns.max(1);
        let rows = rows.max(1);
        let mut vertices = Vec::with_capacity((columns * rows * 6) as usize);
        let mut vertex = |i: u32, j: u32| {
            let u = i as f32 / columns as f32;
            let v = j as f32 / rows as f32;
            let (position, normal) = point(u, v);
            Vertex::new(position, normal, Vec2::new(u, 1.0 - v))
        };
        for j in 0..rows {
            for i in 0..columns {
                let a = vertex(i, j);
                let b = vertex(i + 1, j);
                let c = vertex(i + 1, j + 1);
                let d = vertex(i, j + 1);
                vertices.extend_from_slice(&[a, d, b, b, d, c]);
            }
        }
        Self { vertices }
    }

    pub fn sphere(radius: f32, width_segments: u32, height_segments: u32) -> Self {
        Self::from_grid(width_segments.max(3), height_segments.max(2), |u, v| {
            let phi = u * TAU;
            let theta = v * PI;
            let normal = Vec3::new(-phi.cos() * theta.sin(), theta.cos(), phi.sin() * theta.sin());
            (normal * radius, normal)
        })
    }

    pub fn torus(radius: f32, tube: f32, radial_segments: u32, tubular_segments: u32) -> Self {
        Self::from_grid(tubular_segments.max(3), radial_segments.max(3), |u, v| {
            let around = u * TAU;
            // 环向取反，保持逆时针为正面
            let ring = -v * TAU;
            let center = Vec3::new(radius * around.cos(), radius * around.sin(), 0.0);
            let position = Vec3::new(
                (radius + tube * ring.cos()) * around.cos(),
                (radius + tube * ring.cos()) * around.sin(),
                tube * ring.sin(),
            );
            (position, (position - center).normalize_or_zero())
        })
    }

    /// XY 平面上的矩形，法线 +Z
    pub fn plane(width: f32, height: f32) -> Self {
        Self::from_grid(1, 1, |u, v| {
            (Vec3::new((u - 0.5) * width, (0.5 - v) * height, 0.0), Vec3::Z)
        })
    }

    pub fn cuboid(width: f32, height: f32, depth: f32) -> Self {
        let half = Vec3::new(width, height, depth) * 0.5;
        // (法线, 面内 u 轴, 面内 v 轴)
        let faces = [
            (Vec3::X, Vec3::NEG_Z, Vec3::Y),
            (Vec3::NEG_X, Vec3::Z, Vec3::Y),
            (Vec3::Y, Vec3::X, Vec3::NEG_Z),
            (Vec3::NEG_Y, Vec3::X, Vec3::Z),
            (Vec3::Z, Vec3::X, Vec3::Y),
            (Vec3::NEG_Z, Vec3::NEG_X, Vec3::Y),
        ];
        let mut vertices = Vec::with_capacity(36);
        for (normal, u_axis, v_axis) in faces {
            let corner = |u: f32, v: f32| {
                let position = (normal + u_axis * (u * 2.0 - 1.0) + v_axis * (1.0 - v * 2.0)) * half;
                Vertex::new(position, normal, Vec2::new(u, 1.0 - v))
            };
            let (a, b, c, d) = (corner(0.0, 0.0), corner(1.0, 0.0), corner(1.0, 1.0), corner(0.0, 1.0));
            vertices.extend_from_slice(&[a, d, b, b, d, c]);
        }
        Self { vertices }
    }
}

// ============================================================================
// 网格
// ============================================================================

const SHADOW_PROGRAM_KEY: &str = "mesh-shadow-depth";

const SHADOW_VERTEX: &str = r#"#version 450
layout(location = 0) in vec3 position;

layout(set = 0, binding = 0, std140) uniform ShadowUniforms {
    mat4 lightModelViewProjection;
};

void main() {
    gl_Position = lightModelViewProjection * vec4(position, 1.0);
}
"#;

const SHADOW_FRAGMENT: &str = "#version 450\nvoid main() {}\n";

fn shadow_program_descriptor() -> ProgramDescriptor {
    ProgramDescriptor {
        label: Some("Shadow Depth".to_string()),
        source: ProgramSource::Glsl {
            vertex: SHADOW_VERTEX.to_string(),
            fragment: SHADOW_FRAGMENT.to_string(),
        },
        vertex_layouts: vec![Geometry::layout()],
        bindings: vec![BindingKind::UniformBuffer],
        blend: BlendMode::Opaque,
        depth_test: true,
        depth_write: true,
        cull: CullMode::None,
    }
}

#[derive(Debug)]
struct MeshGpu {
    vertices: GpuBuffer,
    uniforms: GpuBuffer,
    program: GpuProgram,
    program_version: u64,
    /// 延迟模式下写 G-Buffer 的程序（材质不支持时为 `None`）
    gbuffer_program: Option<GpuProgram>,
    shadow: Option<(GpuBuffer, GpuProgram)>,
}

/// 网格：几何体 + 着色器材质 + 变换
#[derive(Debug)]
pub struct Mesh {
    pub geometry: Geometry,
    pub material: ShaderMaterial,
    pub transform: Mat4,
    pub cast_shadow: bool,
    pub visible: bool,
    gpu: Option<MeshGpu>,
}

impl Mesh {
    pub fn new(geometry: Geometry, material: ShaderMaterial) -> Self {
        Self {
            geometry,
            material,
            transform: Mat4::IDENTITY,
            cast_shadow: false,
            visible: true,
            gpu: None,
        }
    }

    pub fn with_transform(mut self, transform: Mat4) -> Self {
        self.transform = transform;
        self
    }

    pub fn with_shadow(mut self, cast_shadow: bool) -> Self {
        self.cast_shadow = cast_shadow;
        self
    }

    /// 已创建 GPU 资源
    pub fn is_uploaded(&self) -> bool {
        self.gpu.is_some()
    }

    fn ensure_gpu(&mut self, gpu: &mut GpuContext) -> RenderResult<&mut MeshGpu> {
        let version = self.material.program_version();
        let stale = self.gpu.as_ref().map(|g| g.program_version != version);

        match (self.gpu.take(), stale) {
            (Some(existing), Some(false)) => self.gpu = Some(existing),
            (existing, _) => {
                let material = &self.material;
                let program = gpu.program(&material.program_key(), || {
                    material.program_descriptor(vec![Geometry::layout()])
                })?;
                let uniforms = gpu.create_buffer(
                    &format!("{} uniforms", material.name()),
                    material.layout().size(),
                    BufferUsage::UNIFORM,
                )?;
                let vertices = match existing {
                    Some(previous) => previous.vertices,
                    None => gpu.create_buffer_init(
                        &format!("{} vertices", material.name()),
                        BufferUsage::VERTEX,
                        self.geometry.as_bytes(),
                    )?,
                };
                if stale.is_some() {
                    tracing::debug!(target: "chronos::scene", material = material.name(), "mesh program rebuilt");
                }
                self.gpu = Some(MeshGpu {
                    vertices,
                    uniforms,
                    program,
                    program_version: version,
                    gbuffer_program: None,
                    shadow: None,
                });
            }
        }
        self.gpu
            .as_mut()
            .ok_or_else(|| RenderError::InvalidState("mesh resources missing".to_string()))
    }
}

impl Drawable for Mesh {
    fn label(&self) -> String {
        format!("mesh:{}", self.material.name())
    }

    fn prepare(&mut self, gpu: &mut GpuContext, view: &ViewState) -> RenderResult<()> {
        if !self.visible || self.geometry.vertex_count() == 0 {
            return Ok(());
        }
        let builtins = view.builtins(self.transform);
        let data = self.material.layout().pack(&builtins, self.material.uniforms());
        let gbuffer_key = format!("{}#gbuffer", self.material.program_key());
        let wants_gbuffer = view.deferred && !self.material.transparent;
        let gbuffer_desc = if wants_gbuffer {
            self.material.gbuffer_descriptor(vec![Geometry::layout()])
        } else {
            None
        };
        let cast_shadow = self.cast_shadow;
        let transform = self.transform;

        let mesh = self.ensure_gpu(gpu)?;
        gpu.write_buffer(&mesh.uniforms, 0, &data)?;

        mesh.gbuffer_program = match gbuffer_desc {
            Some(desc) => Some(gpu.program(&gbuffer_key, move || desc)?),
            None => None,
        };

        match (cast_shadow, view.shadow_view_projection) {
            (true, Some(light_view_projection)) => {
                let matrix = light_view_projection * transform;
                if mesh.shadow.is_none() {
                    let buffer = gpu.create_buffer("shadow uniforms", 64, BufferUsage::UNIFORM)?;
                    let program = gpu.program(SHADOW_PROGRAM_KEY, shadow_program_descriptor)?;
                    mesh.shadow = Some((buffer, program));
                }
                if let Some((buffer, _)) = &mesh.shadow {
                    gpu.write_buffer(buffer, 0, bytemuck::bytes_of(&matrix.to_cols_array()))?;
                }
            }
            _ => mesh.shadow = None,
        }
        Ok(())
    }

    fn encode(&self, phase: DrawPhase, out: &mut Vec<RenderCommand>) {
        let Some(mesh) = self.gpu.as_ref().filter(|_| self.visible) else {
            return;
        };
        let draw = |program: &GpuProgram, uniforms: &GpuBuffer| RenderCommand::Draw {
            program: program.handle(),
            vertex_buffers: vec![mesh.vertices.handle()],
            bindings: vec![BindingResource::Buffer(uniforms.handle())],
            vertex_count: self.geometry.vertex_count(),
            instance_count: 1,
            topology: Topology::TriangleList,
        };
        let command = match phase {
            DrawPhase::ShadowCaster => mesh
                .shadow
                .as_ref()
                .map(|(buffer, program)| draw(program, buffer)),
            DrawPhase::Geometry => mesh
                .gbuffer_program
                .as_ref()
                .map(|program| draw(program, &mesh.uniforms)),
            // 已写入 G-Buffer 的网格不再前向绘制
            DrawPhase::Opaque if !self.material.transparent && mesh.gbuffer_program.is_none() => {
                Some(draw(&mesh.program, &mesh.uniforms))
            }
            DrawPhase::Transparent if self.material.transparent => Some(draw(&mesh.program, &mesh.uniforms)),
            _ => None,
        };
        out.extend(command);
    }

    fn is_transparent(&self) -> bool {
        self.material.transparent
    }

    fn casts_shadow(&self) -> bool {
        self.cast_shadow
    }

    fn release(&mut self) {
        self.gpu = None;
    }
}

// ============================================================================
// 场景
// ============================================================================

/// 场景内对象的标识
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DrawableId(u64);

struct SceneEntry {
    id: DrawableId,
    drawable: Box<dyn Drawable>,
}

/// 场景
#[derive(Default)]
pub struct Scene {
    entries: Vec<SceneEntry>,
    next_id: u64,
}

impl Scene {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add<D: Drawable + 'static>(&mut self, drawable: D) -> DrawableId {
        let id = DrawableId(self.next_id);
        self.next_id += 1;
        self.entries.push(SceneEntry {
            id,
            drawable: Box::new(drawable),
        });
        id
    }

    /// 添加共享对象，返回的 `Rc` 可在帧回调中更新
    pub fn add_shared<D: Drawable + 'static>(&mut self, drawable: D) -> (DrawableId, Rc<RefCell<D>>) {
        let shared = Rc::new(RefCell::new(drawable));
        let id = self.add(Rc::clone(&shared));
        (id, shared)
    }

    /// 移除并释放对象
    pub fn remove(&mut self, id: DrawableId) -> bool {
        match self.entries.iter().position(|entry| entry.id == id) {
            Some(index) => {
                let mut entry = self.entries.remove(index);
                entry.drawable.release();
                true
            }
            None => false,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn has_shadow_casters(&self) -> bool {
        self.entries.iter().any(|entry| entry.drawable.casts_shadow())
    }

    /// 准备所有对象，返回失败数量
    ///
    /// 单个对象失败只记录日志，不影响其他对象。
    pub fn prepare(&mut self, gpu: &mut GpuContext, view: &ViewState) -> usize {
        let mut failures = 0;
        for entry in &mut self.entries {
            if let Err(error) = entry.drawable.prepare(gpu, view) {
                failures += 1;
                tracing::warn!(
                    target: "chronos::scene",
                    drawable = %entry.drawable.label(),
                    %error,
                    "failed to prepare drawable"
                );
            }
        }
        failures
    }

    pub fn encode_compute(&self, out: &mut Vec<RenderCommand>) {
        for entry in &self.entries {
            entry.drawable.encode_compute(out);
        }
    }

    pub fn encode(&self, phase: DrawPhase, out: &mut Vec<RenderCommand>) {
        for entry in &self.entries {
            entry.drawable.encode(phase, out);
        }
    }

    /// 释放全部对象的 GPU 资源并清空场景
    pub fn dispose(&mut self) {
        for entry in &mut self.entries {
            entry.drawable.release();
        }
        let count = self.entries.len();
        self.entries.clear();
        if count > 0 {
            tracing::debug!(target: "chronos::scene", count, "scene disposed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::backend::{BackendEvent, NullBackend};
    use crate::shaders::material::ShaderConfig;

    fn material(transparent: bool) -> ShaderMaterial {
        ShaderMaterial::new(ShaderConfig {
            name: "flat".to_string(),
            fragment_shader: "#include <varyings>\nlayout(location = 0) out vec4 fragColor;\nvoid main() { fragColor = vec4(vNormal, 1.0); }".to_string(),
            transparent,
            ..ShaderConfig::default()
        })
        .unwrap()
    }

    fn draws(commands: &[RenderCommand]) -> usize {
        commands
            .iter()
            .filter(|c| matches!(c, RenderCommand::Draw { .. }))
            .count()
    }

    #[test]
    fn test_geometry_generators() {
        assert_eq!(Geometry::plane(1.0, 1.0).vertex_count(), 6);
        assert_eq!(Geometry::cuboid(1.0, 1.0, 1.0).triangle_count(), 12);
        let sphere = Geometry::sphere(2.0, 8, 6);
        assert_eq!(sphere.triangle_count(), 8 * 6 * 2);
        for vertex in sphere.vertices() {
            let length = Vec3::from_array(vertex.position).length();
            assert!((length - 2.0).abs() < 1e-4);
        }
        for vertex in Geometry::cuboid(2.0, 4.0, 6.0).vertices() {
            let p = Vec3::from_array(vertex.position).abs();
            assert!(p.x <= 1.0 + 1e-5 && p.y <= 2.0 + 1e-5 && p.z <= 3.0 + 1e-5);
        }
        assert_eq!(Geometry::layout().stride, 32);
    }

    #[test]
    fn test_mesh_encodes_by_phase() {
        let mut gpu = GpuContext::new(Box::new(NullBackend::new()));
        let mut mesh = Mesh::new(Geometry::cuboid(1.0, 1.0, 1.0), material(false)).with_shadow(true);

        let view = ViewState {
            shadow_view_projection: Some(Mat4::IDENTITY),
            ..ViewState::default()
        };
        mesh.prepare(&mut gpu, &view).unwrap();

        let mut out = Vec::new();
        mesh.encode(DrawPhase::ShadowCaster, &mut out);
        mesh.encode(DrawPhase::Geometry, &mut out);
        mesh.encode(DrawPhase::Transparent, &mut out);
        assert_eq!(draws(&out), 1);

        out.clear();
        mesh.encode(DrawPhase::Opaque, &mut out);
        assert_eq!(draws(&out), 1);
        assert_eq!(out[0].triangle_count(), 12);
    }

    #[test]
    fn test_deferred_mesh_moves_to_geometry_phase() {
        let mut gpu = GpuContext::new(Box::new(NullBackend::new()));
        let mut mesh = Mesh::new(Geometry::plane(1.0, 1.0), material(false));
        let view = ViewState {
            deferred: true,
            ..ViewState::default()
        };
        mesh.prepare(&mut gpu, &view).unwrap();

        let mut geometry = Vec::new();
        mesh.encode(DrawPhase::Geometry, &mut geometry);
        let mut opaque = Vec::new();
        mesh.encode(DrawPhase::Opaque, &mut opaque);
        assert_eq!(draws(&geometry), 1);
        assert!(opaque.is_empty());
    }

    #[test]
    fn test_structural_change_rebuilds_program() {
        let mut gpu = GpuContext::new(Box::new(NullBackend::new()));
        let mut mesh = Mesh::new(Geometry::plane(1.0, 1.0), material(false));
        let view = ViewState::default();
        mesh.prepare(&mut gpu, &view).unwrap();
        let memory = gpu.memory_info();

        // 值更新不重建
        mesh.prepare(&mut gpu, &view).unwrap();
        assert_eq!(gpu.memory_info(), memory);

        mesh.material
            .declare_uniform("uGlow", crate::shaders::uniforms::UniformValue::Float(1.0))
            .unwrap();
        mesh.prepare(&mut gpu, &view).unwrap();
        gpu.collect_garbage();
        assert_eq!(gpu.memory_info().programs, 1);
        assert_eq!(gpu.memory_info().buffers, memory.buffers);
    }

    #[test]
    fn test_scene_remove_releases() {
        let backend = NullBackend::new();
        let recording = backend.recording();
        let mut gpu = GpuContext::new(Box::new(backend));
        let mut scene = Scene::new();
        let id = scene.add(Mesh::new(Geometry::plane(1.0, 1.0), material(true)));
        assert_eq!(scene.prepare(&mut gpu, &ViewState::default()), 0);

        let mut out = Vec::new();
        scene.encode(DrawPhase::Transparent, &mut out);
        assert_eq!(draws(&out), 1);

        assert!(scene.remove(id));
        assert!(!scene.remove(id));
        gpu.collect_garbage();
        let destroyed = recording
            .borrow()
            .events()
            .iter()
            .filter(|e| matches!(e, BackendEvent::DestroyBuffer(_)))
            .count();
        assert_eq!(destroyed, 2);
    }

    #[test]
    fn test_busy_shared_drawable_is_skipped() {
        let mut gpu = GpuContext::new(Box::new(NullBackend::new()));
        let mut scene = Scene::new();
        let (_, shared) = scene.add_shared(Mesh::new(Geometry::plane(1.0, 1.0), material(false)));

        let guard = shared.borrow_mut();
        assert_eq!(scene.prepare(&mut gpu, &ViewState::default()), 1);
        drop(guard);
        assert_eq!(scene.prepare(&mut gpu, &ViewState::default()), 0);
        assert!(shared.borrow().is_uploaded());
    }
}
