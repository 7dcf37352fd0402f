//! 渲染后端抽象
//!
//! 提供渲染后端 trait 定义，引擎只通过它访问 GPU。
//!
//! ## 设计目标
//!
//! - 统一 WebGL2 / WebGPU 两种 API 的接口
//! - 命令以扁平列表每帧提交一次
//! - 易于测试（`NullBackend` 记录所有资源生命周期事件）

use crate::core::error::{RenderError, RenderResult};
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

/// 缓冲区描述符
#[derive(Debug, Clone)]
pub struct BufferDescriptor {
    /// 标签
    pub label: Option<String>,
    /// 大小（字节）
    pub size: u64,
    /// 用途
    pub usage: BufferUsage,
}

/// 缓冲区用途
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferUsage(pub u32);

impl BufferUsage {
    pub const VERTEX: Self = Self(1);
    pub const INDEX: Self = Self(2);
    pub const UNIFORM: Self = Self(4);
    pub const STORAGE: Self = Self(8);
    pub const COPY_SRC: Self = Self(16);
    pub const COPY_DST: Self = Self(32);

    pub fn contains(&self, other: Self) -> bool {
        (self.0 & other.0) == other.0
    }
}

impl std::ops::BitOr for BufferUsage {
    type Output = Self;
    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

/// 纹理描述符
#[derive(Debug, Clone)]
pub struct TextureDescriptor {
    /// 标签
    pub label: Option<String>,
    /// 宽度
    pub width: u32,
    /// 高度
    pub height: u32,
    /// 格式
    pub format: TextureFormat,
    /// 用途
    pub usage: TextureUsage,
}

/// 纹理格式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextureFormat {
    Rgba8Unorm,
    Rgba16Float,
    Rgba32Float,
    Depth32Float,
}

impl TextureFormat {
    /// 每像素字节数
    pub fn bytes_per_pixel(&self) -> u64 {
        match self {
            TextureFormat::Rgba8Unorm | TextureFormat::Depth32Float => 4,
            TextureFormat::Rgba16Float => 8,
            TextureFormat::Rgba32Float => 16,
        }
    }

    pub fn is_depth(&self) -> bool {
        matches!(self, TextureFormat::Depth32Float)
    }
}

/// 纹理用途
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextureUsage(pub u32);

impl TextureUsage {
    pub const COPY_SRC: Self = Self(1);
    pub const COPY_DST: Self = Self(2);
    pub const TEXTURE_BINDING: Self = Self(4);
    pub const RENDER_ATTACHMENT: Self = Self(16);

    pub fn contains(&self, other: Self) -> bool {
        (self.0 & other.0) == other.0
    }
}

impl std::ops::BitOr for TextureUsage {
    type Output = Self;
    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

/// 着色器程序源码
#[derive(Debug, Clone, PartialEq)]
pub enum ProgramSource {
    /// GLSL 450 顶点/片元对（WebGL 路径，材质工厂产出）
    Glsl { vertex: String, fragment: String },
    /// WGSL 渲染程序
    Wgsl {
        source: String,
        vertex_entry: String,
        fragment_entry: String,
    },
    /// WGSL 计算程序
    Compute { source: String, entry_point: String },
}

impl ProgramSource {
    pub fn is_compute(&self) -> bool {
        matches!(self, ProgramSource::Compute { .. })
    }
}

/// 顶点属性格式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VertexFormat {
    Float32,
    Float32x2,
    Float32x3,
    Float32x4,
}

impl VertexFormat {
    pub fn size(&self) -> u64 {
        match self {
            VertexFormat::Float32 => 4,
            VertexFormat::Float32x2 => 8,
            VertexFormat::Float32x3 => 12,
            VertexFormat::Float32x4 => 16,
        }
    }
}

/// 顶点步进模式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StepMode {
    Vertex,
    Instance,
}

/// 顶点属性
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VertexAttribute {
    pub location: u32,
    pub offset: u64,
    pub format: VertexFormat,
}

/// 顶点缓冲区布局（每个槽位一个）
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct VertexLayout {
    pub stride: u64,
    pub step_mode: StepMode,
    pub attributes: Vec<VertexAttribute>,
}

impl VertexLayout {
    /// 紧密排列的属性，位置从 `first_location` 开始
    pub fn packed(step_mode: StepMode, first_location: u32, formats: &[VertexFormat]) -> Self {
        let mut offset = 0;
        let attributes = formats
            .iter()
            .enumerate()
            .map(|(i, format)| {
                let attribute = VertexAttribute {
                    location: first_location + i as u32,
                    offset,
                    format: *format,
                };
                offset += format.size();
                attribute
            })
            .collect();
        Self {
            stride: offset,
            step_mode,
            attributes,
        }
    }
}

/// 绑定槽类型
///
/// 所有绑定位于 group 0，按声明顺序分配 binding 编号；
/// `SampledTexture` / `DepthTexture` 占用两个连续编号（纹理 + 采样器）。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BindingKind {
    UniformBuffer,
    StorageBuffer { read_only: bool },
    SampledTexture,
    /// 深度纹理 + 比较采样器（阴影贴图）
    DepthTexture,
}

/// 混合模式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum BlendMode {
    #[default]
    Opaque,
    Alpha,
    Additive,
    Multiply,
    Screen,
}

/// 面剔除
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CullMode {
    #[default]
    Back,
    Front,
    None,
}

/// 程序描述符
#[derive(Debug, Clone)]
pub struct ProgramDescriptor {
    pub label: Option<String>,
    pub source: ProgramSource,
    pub vertex_layouts: Vec<VertexLayout>,
    pub bindings: Vec<BindingKind>,
    pub blend: BlendMode,
    pub depth_test: bool,
    pub depth_write: bool,
    pub cull: CullMode,
}

impl ProgramDescriptor {
    /// 计算程序描述符
    pub fn compute(label: &str, source: &str, entry_point: &str, bindings: Vec<BindingKind>) -> Self {
        Self {
            label: Some(label.to_string()),
            source: ProgramSource::Compute {
                source: source.to_string(),
                entry_point: entry_point.to_string(),
            },
            vertex_layouts: Vec::new(),
            bindings,
            blend: BlendMode::Opaque,
            depth_test: false,
            depth_write: false,
            cull: CullMode::None,
        }
    }
}

/// 抽象缓冲区句柄
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BufferHandle(pub u64);

/// 抽象纹理句柄
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TextureHandle(pub u64);

/// 抽象程序句柄
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ProgramHandle(pub u64);

/// 绑定资源
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BindingResource {
    Buffer(BufferHandle),
    Texture(TextureHandle),
}

/// 渲染目标
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RenderTarget {
    /// 后端自身的主输出（画布）
    Surface,
    Texture(TextureHandle),
}

/// 图元拓扑
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Topology {
    #[default]
    TriangleList,
    LineList,
    PointList,
}

/// 渲染命令
#[derive(Debug, Clone, PartialEq)]
pub enum RenderCommand {
    /// 计算调度
    Dispatch {
        program: ProgramHandle,
        bindings: Vec<BindingResource>,
        workgroups: [u32; 3],
    },
    /// 开始渲染通道
    BeginRenderPass {
        label: String,
        color: Vec<RenderTarget>,
        depth: Option<RenderTarget>,
        clear_color: Option<[f32; 4]>,
        clear_depth: bool,
    },
    /// 绘制
    Draw {
        program: ProgramHandle,
        vertex_buffers: Vec<BufferHandle>,
        bindings: Vec<BindingResource>,
        vertex_count: u32,
        instance_count: u32,
        topology: Topology,
    },
    /// 结束渲染通道
    EndRenderPass,
}

impl RenderCommand {
    /// 该绘制命令产生的三角形数
    pub fn triangle_count(&self) -> u64 {
        match self {
            RenderCommand::Draw {
                vertex_count,
                instance_count,
                topology: Topology::TriangleList,
                ..
            } => (*vertex_count as u64 / 3) * *instance_count as u64,
            _ => 0,
        }
    }
}

/// 渲染计数器（每个指标窗口重置一次）
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RenderCounters {
    pub draw_calls: u64,
    pub triangles: u64,
    pub points: u64,
    pub dispatches: u64,
}

impl RenderCounters {
    pub fn record(&mut self, command: &RenderCommand) {
        match command {
            RenderCommand::Draw {
                vertex_count,
                instance_count,
                topology,
                ..
            } => {
                self.draw_calls += 1;
                self.triangles += command.triangle_count();
                if *topology == Topology::PointList {
                    self.points += *vertex_count as u64 * *instance_count as u64;
                }
            }
            RenderCommand::Dispatch { .. } => self.dispatches += 1,
            _ => {}
        }
    }
}

/// 存活资源统计
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MemoryInfo {
    pub buffers: u32,
    pub textures: u32,
    pub programs: u32,
    /// 缓冲区与纹理占用的字节数
    pub bytes: u64,
}

/// 后端能力
#[derive(Debug, Clone)]
pub struct BackendCapabilities {
    /// 最大纹理尺寸
    pub max_texture_size: u32,
    /// 最大缓冲区大小
    pub max_buffer_size: u64,
    /// 是否支持计算着色器
    pub compute_shaders: bool,
    /// 最大绑定组数
    pub max_bind_groups: u32,
    /// 适配器名称
    pub adapter_name: String,
    /// 已启用的特性名
    pub features: Vec<String>,
}

impl Default for BackendCapabilities {
    fn default() -> Self {
        Self {
            max_texture_size: 8192,
            max_buffer_size: 256 * 1024 * 1024,
            compute_shaders: true,
            max_bind_groups: 4,
            adapter_name: "null".to_string(),
            features: Vec::new(),
        }
    }
}

/// 渲染后端 Trait
///
/// 定义渲染后端需要实现的接口。后端只在渲染线程上使用。
///
/// # 示例
///
/// ```ignore
/// struct MyBackend { ... }
///
/// impl RenderBackend for MyBackend {
///     fn create_buffer(&mut self, desc: &BufferDescriptor) -> RenderResult<BufferHandle> { ... }
///     fn submit(&mut self, commands: &[RenderCommand]) -> RenderResult<()> { ... }
///     ...
/// }
/// ```
pub trait RenderBackend {
    /// 创建缓冲区
    fn create_buffer(&mut self, desc: &BufferDescriptor) -> RenderResult<BufferHandle>;

    /// 销毁缓冲区
    fn destroy_buffer(&mut self, buffer: BufferHandle);

    /// 写入缓冲区数据
    fn write_buffer(&mut self, buffer: BufferHandle, offset: u64, data: &[u8]) -> RenderResult<()>;

    /// 创建纹理
    fn create_texture(&mut self, desc: &TextureDescriptor) -> RenderResult<TextureHandle>;

    /// 销毁纹理
    fn destroy_texture(&mut self, texture: TextureHandle);

    /// 创建着色器程序
    fn create_program(&mut self, desc: &ProgramDescriptor) -> RenderResult<ProgramHandle>;

    /// 销毁着色器程序
    fn destroy_program(&mut self, program: ProgramHandle);

    /// 提交一帧的渲染命令
    fn submit(&mut self, commands: &[RenderCommand]) -> RenderResult<()>;

    /// 调整主输出尺寸（物理像素）
    fn resize(&mut self, width: u32, height: u32);

    /// 自上次重置以来的计数器
    fn counters(&self) -> RenderCounters;

    /// 重置计数器
    fn reset_counters(&mut self);

    /// 存活资源统计
    fn memory_info(&self) -> MemoryInfo;

    /// 获取后端能力
    fn capabilities(&self) -> BackendCapabilities;

    /// 强制丢失上下文（释放所有 GPU 资源）
    fn lose_context(&mut self);

    /// 上下文是否已丢失
    fn is_lost(&self) -> bool;

    /// 获取后端名称
    fn name(&self) -> &str;
}

/// 后端事件（`NullBackend` 记录）
#[derive(Debug, Clone, PartialEq)]
pub enum BackendEvent {
    CreateBuffer { handle: BufferHandle, size: u64 },
    DestroyBuffer(BufferHandle),
    CreateTexture {
        handle: TextureHandle,
        width: u32,
        height: u32,
        label: Option<String>,
    },
    DestroyTexture(TextureHandle),
    CreateProgram {
        handle: ProgramHandle,
        label: Option<String>,
    },
    DestroyProgram(ProgramHandle),
    Submit(Vec<RenderCommand>),
    Resize { width: u32, height: u32 },
    ContextLost,
}

/// `NullBackend` 的共享记录
#[derive(Debug, Default)]
pub struct Recording {
    events: Vec<BackendEvent>,
    buffers: HashMap<BufferHandle, Vec<u8>>,
    textures: HashMap<TextureHandle, TextureDescriptor>,
    programs: HashMap<ProgramHandle, ProgramDescriptor>,
}

impl Recording {
    /// 全部事件
    pub fn events(&self) -> &[BackendEvent] {
        &self.events
    }

    /// 清空事件（保留存活资源）
    pub fn clear_events(&mut self) {
        self.events.clear();
    }

    /// 缓冲区当前内容
    pub fn buffer_data(&self, handle: BufferHandle) -> Option<&[u8]> {
        self.buffers.get(&handle).map(Vec::as_slice)
    }

    /// 纹理描述符
    pub fn texture(&self, handle: TextureHandle) -> Option<&TextureDescriptor> {
        self.textures.get(&handle)
    }

    /// 程序描述符
    pub fn program(&self, handle: ProgramHandle) -> Option<&ProgramDescriptor> {
        self.programs.get(&handle)
    }

    /// 存活纹理（按句柄排序）
    pub fn live_textures(&self) -> Vec<TextureHandle> {
        let mut handles: Vec<_> = self.textures.keys().copied().collect();
        handles.sort();
        handles
    }

    /// 已提交的帧
    pub fn submissions(&self) -> Vec<&[RenderCommand]> {
        self.events
            .iter()
            .filter_map(|event| match event {
                BackendEvent::Submit(commands) => Some(commands.as_slice()),
                _ => None,
            })
            .collect()
    }

    /// 某纹理被销毁的次数
    pub fn destroy_count(&self, handle: TextureHandle) -> usize {
        self.events
            .iter()
            .filter(|event| matches!(event, BackendEvent::DestroyTexture(h) if *h == handle))
            .count()
    }
}

/// 空后端实现（用于测试）
///
/// 不触碰 GPU，但完整跟踪资源、计数器与提交顺序。
pub struct NullBackend {
    recording: Rc<RefCell<Recording>>,
    capabilities: BackendCapabilities,
    counters: RenderCounters,
    next_id: u64,
    lost: bool,
}

impl Default for NullBackend {
    fn default() -> Self {
        Self::with_capabilities(BackendCapabilities::default())
    }
}

impl NullBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capabilities(capabilities: BackendCapabilities) -> Self {
        Self {
            recording: Rc::new(RefCell::new(Recording::default())),
            capabilities,
            counters: RenderCounters::default(),
            next_id: 1,
            lost: false,
        }
    }

    /// 不支持计算着色器的后端（模拟 WebGL2 设备）
    pub fn without_compute() -> Self {
        Self::with_capabilities(BackendCapabilities {
            compute_shaders: false,
            ..BackendCapabilities::default()
        })
    }

    /// 共享记录，后端被移交给引擎后依然可读
    pub fn recording(&self) -> Rc<RefCell<Recording>> {
        Rc::clone(&self.recording)
    }

    fn next_id(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    fn ensure_alive(&self) -> RenderResult<()> {
        if self.lost {
            Err(RenderError::ContextLost)
        } else {
            Ok(())
        }
    }

    fn push(&self, event: BackendEvent) {
        self.recording.borrow_mut().events.push(event);
    }
}

impl RenderBackend for NullBackend {
    fn create_buffer(&mut self, desc: &BufferDescriptor) -> RenderResult<BufferHandle> {
        self.ensure_alive()?;
        let handle = BufferHandle(self.next_id());
        {
            let mut recording = self.recording.borrow_mut();
            recording.buffers.insert(handle, vec![0; desc.size as usize]);
        }
        self.push(BackendEvent::CreateBuffer {
            handle,
            size: desc.size,
        });
        Ok(handle)
    }

    fn destroy_buffer(&mut self, buffer: BufferHandle) {
        let removed = self.recording.borrow_mut().buffers.remove(&buffer).is_some();
        if removed {
            self.push(BackendEvent::DestroyBuffer(buffer));
        }
    }

    fn write_buffer(&mut self, buffer: BufferHandle, offset: u64, data: &[u8]) -> RenderResult<()> {
        self.ensure_alive()?;
        let mut recording = self.recording.borrow_mut();
        let contents = recording
            .buffers
            .get_mut(&buffer)
            .ok_or_else(|| RenderError::UnknownResource(format!("buffer {}", buffer.0)))?;
        let start = offset as usize;
        let end = start + data.len();
        if end > contents.len() {
            return Err(RenderError::InvalidState(format!(
                "write of {} bytes at {} overflows buffer {} ({} bytes)",
                data.len(),
                offset,
                buffer.0,
                contents.len()
            )));
        }
        contents[start..end].copy_from_slice(data);
        Ok(())
    }

    fn create_texture(&mut self, desc: &TextureDescriptor) -> RenderResult<TextureHandle> {
        self.ensure_alive()?;
        if desc.width > self.capabilities.max_texture_size
            || desc.height > self.capabilities.max_texture_size
        {
            return Err(RenderError::InvalidState(format!(
                "texture {}x{} exceeds max size {}",
                desc.width, desc.height, self.capabilities.max_texture_size
            )));
        }
        let handle = TextureHandle(self.next_id());
        self.recording
            .borrow_mut()
            .textures
            .insert(handle, desc.clone());
        self.push(BackendEvent::CreateTexture {
            handle,
            width: desc.width,
            height: desc.height,
            label: desc.label.clone(),
        });
        Ok(handle)
    }

    fn destroy_texture(&mut self, texture: TextureHandle) {
        let removed = self.recording.borrow_mut().textures.remove(&texture).is_some();
        if removed {
            self.push(BackendEvent::DestroyTexture(texture));
        }
    }

    fn create_program(&mut self, desc: &ProgramDescriptor) -> RenderResult<ProgramHandle> {
        self.ensure_alive()?;
        if desc.source.is_compute() && !self.capabilities.compute_shaders {
            return Err(RenderError::MissingFeature("compute shaders".to_string()));
        }
        let handle = ProgramHandle(self.next_id());
        self.recording
            .borrow_mut()
            .programs
            .insert(handle, desc.clone());
        self.push(BackendEvent::CreateProgram {
            handle,
            label: desc.label.clone(),
        });
        Ok(handle)
    }

    fn destroy_program(&mut self, program: ProgramHandle) {
        let removed = self.recording.borrow_mut().programs.remove(&program).is_some();
        if removed {
            self.push(BackendEvent::DestroyProgram(program));
        }
    }

    fn submit(&mut self, commands: &[RenderCommand]) -> RenderResult<()> {
        self.ensure_alive()?;
        {
            let recording = self.recording.borrow();
            for command in commands {
                let program = match command {
                    RenderCommand::Draw { program, .. } | RenderCommand::Dispatch { program, .. } => {
                        Some(program)
                    }
                    _ => None,
                };
                if let Some(program) = program {
                    if !recording.programs.contains_key(program) {
                        return Err(RenderError::UnknownResource(format!("program {}", program.0)));
                    }
                }
            }
        }
        for command in commands {
            self.counters.record(command);
        }
        self.push(BackendEvent::Submit(commands.to_vec()));
        Ok(())
    }

    fn resize(&mut self, width: u32, height: u32) {
        self.push(BackendEvent::Resize { width, height });
    }

    fn counters(&self) -> RenderCounters {
        self.counters
    }

    fn reset_counters(&mut self) {
        self.counters = RenderCounters::default();
    }

    fn memory_info(&self) -> MemoryInfo {
        let recording = self.recording.borrow();
        let buffer_bytes: u64 = recording.buffers.values().map(|b| b.len() as u64).sum();
        let texture_bytes: u64 = recording
            .textures
            .values()
            .map(|t| t.width as u64 * t.height as u64 * t.format.bytes_per_pixel())
            .sum();
        MemoryInfo {
            buffers: recording.buffers.len() as u32,
            textures: recording.textures.len() as u32,
            programs: recording.programs.len() as u32,
            bytes: buffer_bytes + texture_bytes,
        }
    }

    fn capabilities(&self) -> BackendCapabilities {
        self.capabilities.clone()
    }

    fn lose_context(&mut self) {
        if self.lost {
            return;
        }
        self.lost = true;
        {
            let mut recording = self.recording.borrow_mut();
            recording.buffers.clear();
            recording.textures.clear();
            recording.programs.clear();
        }
        self.push(BackendEvent::ContextLost);
    }

    fn is_lost(&self) -> bool {
        self.lost
    }

    fn name(&self) -> &str {
        "null"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn texture_desc(size: u32) -> TextureDescriptor {
        TextureDescriptor {
            label: Some("test".to_string()),
            width: size,
            height: size,
            format: TextureFormat::Rgba8Unorm,
            usage: TextureUsage::TEXTURE_BINDING | TextureUsage::RENDER_ATTACHMENT,
        }
    }

    #[test]
    fn test_buffer_usage_bitor() {
        let usage = BufferUsage::VERTEX | BufferUsage::COPY_DST;
        assert!(usage.contains(BufferUsage::VERTEX));
        assert!(usage.contains(BufferUsage::COPY_DST));
        assert!(!usage.contains(BufferUsage::UNIFORM));
    }

    #[test]
    fn test_packed_layout() {
        let layout = VertexLayout::packed(
            StepMode::Instance,
            2,
            &[VertexFormat::Float32x3, VertexFormat::Float32],
        );
        assert_eq!(layout.stride, 16);
        assert_eq!(layout.attributes[1].location, 3);
        assert_eq!(layout.attributes[1].offset, 12);
    }

    #[test]
    fn test_null_backend_records_lifecycle() {
        let mut backend = NullBackend::new();
        let recording = backend.recording();

        let buffer = backend
            .create_buffer(&BufferDescriptor {
                label: None,
                size: 16,
                usage: BufferUsage::UNIFORM | BufferUsage::COPY_DST,
            })
            .unwrap();
        backend.write_buffer(buffer, 4, &[1, 2, 3, 4]).unwrap();
        assert_eq!(&recording.borrow().buffer_data(buffer).unwrap()[4..8], &[1, 2, 3, 4]);

        let texture = backend.create_texture(&texture_desc(256)).unwrap();
        assert_eq!(backend.memory_info().textures, 1);
        assert_eq!(backend.memory_info().bytes, 16 + 256 * 256 * 4);

        backend.destroy_texture(texture);
        backend.destroy_texture(texture);
        assert_eq!(recording.borrow().destroy_count(texture), 1);
        assert_eq!(backend.name(), "null");
    }

    #[test]
    fn test_write_overflow_rejected() {
        let mut backend = NullBackend::new();
        let buffer = backend
            .create_buffer(&BufferDescriptor {
                label: None,
                size: 4,
                usage: BufferUsage::UNIFORM,
            })
            .unwrap();
        assert!(backend.write_buffer(buffer, 2, &[0; 4]).is_err());
    }

    #[test]
    fn test_counters_from_submit() {
        let mut backend = NullBackend::new();
        let program = backend
            .create_program(&ProgramDescriptor {
                label: None,
                source: ProgramSource::Glsl {
                    vertex: String::new(),
                    fragment: String::new(),
                },
                vertex_layouts: Vec::new(),
                bindings: Vec::new(),
                blend: BlendMode::Opaque,
                depth_test: true,
                depth_write: true,
                cull: CullMode::Back,
            })
            .unwrap();
        let draw = RenderCommand::Draw {
            program,
            vertex_buffers: Vec::new(),
            bindings: Vec::new(),
            vertex_count: 6,
            instance_count: 10,
            topology: Topology::TriangleList,
        };
        backend.submit(&[draw.clone(), draw]).unwrap();
        assert_eq!(backend.counters().draw_calls, 2);
        assert_eq!(backend.counters().triangles, 40);
        backend.reset_counters();
        assert_eq!(backend.counters(), RenderCounters::default());
    }

    #[test]
    fn test_compute_rejected_without_support() {
        let mut backend = NullBackend::without_compute();
        let result = backend.create_program(&ProgramDescriptor::compute(
            "particles",
            "",
            "main",
            vec![BindingKind::UniformBuffer],
        ));
        assert!(matches!(result, Err(RenderError::MissingFeature(_))));
    }

    #[test]
    fn test_lost_context_rejects_work() {
        let mut backend = NullBackend::new();
        backend.create_texture(&texture_desc(8)).unwrap();
        backend.lose_context();
        backend.lose_context();
        assert!(backend.is_lost());
        assert_eq!(backend.memory_info(), MemoryInfo::default());
        assert!(matches!(
            backend.create_texture(&texture_desc(8)),
            Err(RenderError::ContextLost)
        ));
        let lost_events = backend
            .recording()
            .borrow()
            .events()
            .iter()
            .filter(|e| **e == BackendEvent::ContextLost)
            .count();
        assert_eq!(lost_events, 1);
    }
}
