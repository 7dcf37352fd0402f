//! wgpu 渲染后端
//!
//! 同一份实现覆盖两种模式：
//! - `BackendKind::WebGl` - GL 后端 + WebGL2 降级限制，无计算着色器
//! - `BackendKind::WebGpu` - 浏览器 WebGPU / 原生主后端，要求计算着色器
//!
//! 渲染输出是离屏颜色 + 深度目标（`RenderTarget::Surface`）。
//! GLSL 450 程序经 naga 的 GLSL 前端编译，WGSL 程序直接编译；
//! 渲染管线按 (程序, 附件格式) 在第一次使用时创建并缓存。

use super::backend::{
    BackendCapabilities, BindingKind, BindingResource, BlendMode, BufferDescriptor, BufferHandle, BufferUsage,
    CullMode, MemoryInfo, ProgramDescriptor, ProgramHandle, ProgramSource, RenderBackend, RenderCommand,
    RenderCounters, RenderTarget, StepMode, TextureDescriptor, TextureFormat, TextureHandle, TextureUsage,
    Topology, VertexFormat,
};
use crate::config::PowerPreference;
use crate::core::error::{RenderError, RenderResult};
use std::borrow::Cow;
use std::collections::HashMap;

const SURFACE_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8Unorm;
const SURFACE_DEPTH_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth32Float;

/// 后端模式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BackendKind {
    WebGl,
    WebGpu,
}

impl BackendKind {
    pub fn name(&self) -> &'static str {
        match self {
            BackendKind::WebGl => "webgl",
            BackendKind::WebGpu => "webgpu",
        }
    }

    pub(crate) fn backends(&self) -> wgpu::Backends {
        match self {
            BackendKind::WebGl => wgpu::Backends::GL,
            #[cfg(target_arch = "wasm32")]
            BackendKind::WebGpu => wgpu::Backends::BROWSER_WEBGPU,
            #[cfg(not(target_arch = "wasm32"))]
            BackendKind::WebGpu => wgpu::Backends::PRIMARY,
        }
    }
}

/// 后端创建参数
#[derive(Debug, Clone, Copy)]
pub struct WgpuBackendOptions {
    pub kind: BackendKind,
    pub power_preference: PowerPreference,
    /// 初始输出尺寸（物理像素）
    pub width: u32,
    pub height: u32,
}

fn map_texture_format(format: TextureFormat) -> wgpu::TextureFormat {
    match format {
        TextureFormat::Rgba8Unorm => wgpu::TextureFormat::Rgba8Unorm,
        TextureFormat::Rgba16Float => wgpu::TextureFormat::Rgba16Float,
        TextureFormat::Rgba32Float => wgpu::TextureFormat::Rgba32Float,
        TextureFormat::Depth32Float => wgpu::TextureFormat::Depth32Float,
    }
}

fn map_texture_usage(usage: TextureUsage) -> wgpu::TextureUsages {
    let mut mapped = wgpu::TextureUsages::empty();
    let pairs = [
        (TextureUsage::COPY_SRC, wgpu::TextureUsages::COPY_SRC),
        (TextureUsage::COPY_DST, wgpu::TextureUsages::COPY_DST),
        (TextureUsage::TEXTURE_BINDING, wgpu::TextureUsages::TEXTURE_BINDING),
        (TextureUsage::RENDER_ATTACHMENT, wgpu::TextureUsages::RENDER_ATTACHMENT),
    ];
    for (ours, theirs) in pairs {
        if usage.contains(ours) {
            mapped |= theirs;
        }
    }
    mapped
}

fn map_buffer_usage(usage: BufferUsage) -> wgpu::BufferUsages {
    let mut mapped = wgpu::BufferUsages::empty();
    let pairs = [
        (BufferUsage::VERTEX, wgpu::BufferUsages::VERTEX),
        (BufferUsage::INDEX, wgpu::BufferUsages::INDEX),
        (BufferUsage::UNIFORM, wgpu::BufferUsages::UNIFORM),
        (BufferUsage::STORAGE, wgpu::BufferUsages::STORAGE),
        (BufferUsage::COPY_SRC, wgpu::BufferUsages::COPY_SRC),
        (BufferUsage::COPY_DST, wgpu::BufferUsages::COPY_DST),
    ];
    for (ours, theirs) in pairs {
        if usage.contains(ours) {
            mapped |= theirs;
        }
    }
    mapped
}

fn map_vertex_format(format: VertexFormat) -> wgpu::VertexFormat {
    match format {
        VertexFormat::Float32 => wgpu::VertexFormat::Float32,
        VertexFormat::Float32x2 => wgpu::VertexFormat::Float32x2,
        VertexFormat::Float32x3 => wgpu::VertexFormat::Float32x3,
        VertexFormat::Float32x4 => wgpu::VertexFormat::Float32x4,
    }
}

fn map_blend(blend: BlendMode) -> Option<wgpu::BlendState> {
    let component = |src, dst| wgpu::BlendComponent {
        src_factor: src,
        dst_factor: dst,
        operation: wgpu::BlendOperation::Add,
    };
    use wgpu::BlendFactor as F;
    match blend {
        BlendMode::Opaque => None,
        BlendMode::Alpha => Some(wgpu::BlendState::ALPHA_BLENDING),
        BlendMode::Additive => Some(wgpu::BlendState {
            color: component(F::SrcAlpha, F::One),
            alpha: component(F::One, F::One),
        }),
        BlendMode::Multiply => Some(wgpu::BlendState {
            color: component(F::Zero, F::Src),
            alpha: component(F::Zero, F::SrcAlpha),
        }),
        BlendMode::Screen => Some(wgpu::BlendState {
            color: component(F::One, F::OneMinusSrc),
            alpha: component(F::One, F::OneMinusSrcAlpha),
        }),
    }
}

fn map_cull(cull: CullMode) -> Option<wgpu::Face> {
    match cull {
        CullMode::Back => Some(wgpu::Face::Back),
        CullMode::Front => Some(wgpu::Face::Front),
        CullMode::None => None,
    }
}

fn map_topology(topology: Topology) -> wgpu::PrimitiveTopology {
    match topology {
        Topology::TriangleList => wgpu::PrimitiveTopology::TriangleList,
        Topology::LineList => wgpu::PrimitiveTopology::LineList,
        Topology::PointList => wgpu::PrimitiveTopology::PointList,
    }
}

/// 在验证错误作用域内执行 `build`
#[cfg(not(target_arch = "wasm32"))]
fn validated<T>(device: &wgpu::Device, build: impl FnOnce() -> T) -> Result<T, String> {
    device.push_error_scope(wgpu::ErrorFilter::Validation);
    let value = build();
    match pollster::block_on(device.pop_error_scope()) {
        Some(error) => Err(error.to_string()),
        None => Ok(value),
    }
}

/// 浏览器中无法阻塞等待作用域结果，错误由设备的未捕获错误回调上报
#[cfg(target_arch = "wasm32")]
fn validated<T>(device: &wgpu::Device, build: impl FnOnce() -> T) -> Result<T, String> {
    device.push_error_scope(wgpu::ErrorFilter::Validation);
    let value = build();
    drop(device.pop_error_scope());
    Ok(value)
}

#[derive(Debug)]
struct BufferEntry {
    buffer: wgpu::Buffer,
    size: u64,
}

#[derive(Debug)]
struct TextureEntry {
    _texture: wgpu::Texture,
    view: wgpu::TextureView,
    format: wgpu::TextureFormat,
    bytes: u64,
}

/// 渲染通道的附件格式
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
struct PassFormats {
    color: Vec<wgpu::TextureFormat>,
    depth: Option<wgpu::TextureFormat>,
}

/// 渲染管线缓存键
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct PipelineKey {
    formats: PassFormats,
    topology: Topology,
}

#[derive(Debug)]
enum Modules {
    Glsl {
        vertex: wgpu::ShaderModule,
        fragment: wgpu::ShaderModule,
    },
    Wgsl {
        module: wgpu::ShaderModule,
        vertex_entry: String,
        fragment_entry: String,
    },
    Compute {
        module: wgpu::ShaderModule,
        entry_point: String,
    },
}

#[derive(Debug)]
struct ProgramEntry {
    desc: ProgramDescriptor,
    modules: Modules,
    bind_group_layout: wgpu::BindGroupLayout,
    pipeline_layout: wgpu::PipelineLayout,
    render_pipelines: HashMap<PipelineKey, wgpu::RenderPipeline>,
    compute_pipeline: Option<wgpu::ComputePipeline>,
}

#[derive(Debug)]
struct Surface {
    _color: wgpu::Texture,
    color_view: wgpu::TextureView,
    _depth: wgpu::Texture,
    depth_view: wgpu::TextureView,
    width: u32,
    height: u32,
}

impl Surface {
    fn new(device: &wgpu::Device, width: u32, height: u32) -> Self {
        let (width, height) = (width.max(1), height.max(1));
        let create = |label: &str, format: wgpu::TextureFormat| {
            device.create_texture(&wgpu::TextureDescriptor {
                label: Some(label),
                size: wgpu::Extent3d {
                    width,
                    height,
                    depth_or_array_layers: 1,
                },
                mip_level_count: 1,
                sample_count: 1,
                dimension: wgpu::TextureDimension::D2,
                format,
                usage: wgpu::TextureUsages::RENDER_ATTACHMENT
                    | wgpu::TextureUsages::TEXTURE_BINDING
                    | wgpu::TextureUsages::COPY_SRC,
                view_formats: &[],
            })
        };
        let color = create("Surface Color", SURFACE_FORMAT);
        let depth = create("Surface Depth", SURFACE_DEPTH_FORMAT);
        Self {
            color_view: color.create_view(&wgpu::TextureViewDescriptor::default()),
            depth_view: depth.create_view(&wgpu::TextureViewDescriptor::default()),
            _color: color,
            _depth: depth,
            width,
            height,
        }
    }
}

/// 基于 wgpu 的渲染后端
pub struct WgpuBackend {
    kind: BackendKind,
    device: wgpu::Device,
    queue: wgpu::Queue,
    adapter_info: wgpu::AdapterInfo,
    limits: wgpu::Limits,
    compute: bool,
    surface: Surface,
    sampler: wgpu::Sampler,
    comparison_sampler: wgpu::Sampler,
    buffers: HashMap<BufferHandle, BufferEntry>,
    textures: HashMap<TextureHandle, TextureEntry>,
    programs: HashMap<ProgramHandle, ProgramEntry>,
    counters: RenderCounters,
    next_id: u64,
    lost: bool,
}

impl WgpuBackend {
    /// 请求适配器与设备
    ///
    /// WebGPU 模式在适配器缺失、设备请求失败或不支持计算着色器时返回错误，
    /// 由调用方回退到 WebGL。
    pub async fn new(options: WgpuBackendOptions) -> RenderResult<Self> {
        let instance = wgpu::Instance::new(wgpu::InstanceDescriptor {
            backends: options.kind.backends(),
            ..Default::default()
        });
        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: options.power_preference.into(),
                compatible_surface: None,
                force_fallback_adapter: false,
            })
            .await
            .ok_or(RenderError::NoAdapter)?;

        let downlevel = adapter.get_downlevel_capabilities();
        let compute = options.kind == BackendKind::WebGpu
            && downlevel.flags.contains(wgpu::DownlevelFlags::COMPUTE_SHADERS);
        if options.kind == BackendKind::WebGpu && !compute {
            return Err(RenderError::MissingFeature("compute shaders".to_string()));
        }

        let base_limits = match options.kind {
            BackendKind::WebGl => wgpu::Limits::downlevel_webgl2_defaults(),
            BackendKind::WebGpu => wgpu::Limits::downlevel_defaults(),
        };
        let required_limits = base_limits.using_resolution(adapter.limits());
        let (device, queue) = adapter
            .request_device(
                &wgpu::DeviceDescriptor {
                    label: Some("Chronos Device"),
                    required_features: wgpu::Features::empty(),
                    required_limits: required_limits.clone(),
                },
                None,
            )
            .await
            .map_err(|e| RenderError::DeviceRequest(e.to_string()))?;

        let adapter_info = adapter.get_info();
        tracing::info!(
            target: "chronos::backend",
            kind = options.kind.name(),
            adapter = %adapter_info.name,
            backend = ?adapter_info.backend,
            compute,
            "wgpu device ready"
        );

        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("Linear Sampler"),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            address_mode_w: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            mipmap_filter: wgpu::FilterMode::Nearest,
            ..Default::default()
        });
        let comparison_sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("Shadow Sampler"),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            address_mode_w: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            compare: Some(wgpu::CompareFunction::LessEqual),
            ..Default::default()
        });
        let surface = Surface::new(&device, options.width, options.height);

        Ok(Self {
            kind: options.kind,
            device,
            queue,
            adapter_info,
            limits: required_limits,
            compute,
            surface,
            sampler,
            comparison_sampler,
            buffers: HashMap::new(),
            textures: HashMap::new(),
            programs: HashMap::new(),
            counters: RenderCounters::default(),
            next_id: 1,
            lost: false,
        })
    }

    /// 阻塞版本（原生平台）
    #[cfg(not(target_arch = "wasm32"))]
    pub fn new_blocking(options: WgpuBackendOptions) -> RenderResult<Self> {
        pollster::block_on(Self::new(options))
    }

    pub fn kind(&self) -> BackendKind {
        self.kind
    }

    pub fn device(&self) -> &wgpu::Device {
        &self.device
    }

    /// 离屏主输出，供宿主拷贝或呈现
    pub fn surface_view(&self) -> &wgpu::TextureView {
        &self.surface.color_view
    }

    pub fn surface_size(&self) -> (u32, u32) {
        (self.surface.width, self.surface.height)
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

    fn shader_module(&self, label: &str, source: wgpu::ShaderSource<'_>) -> RenderResult<wgpu::ShaderModule> {
        validated(&self.device, || {
            self.device.create_shader_module(wgpu::ShaderModuleDescriptor {
                label: Some(label),
                source,
            })
        })
        .map_err(|e| RenderError::ShaderCompilation(format!("{label}: {e}")))
    }

    fn glsl_module(&self, label: &str, source: &str, stage: wgpu::naga::ShaderStage) -> RenderResult<wgpu::ShaderModule> {
        self.shader_module(
            label,
            wgpu::ShaderSource::Glsl {
                shader: Cow::Owned(source.to_string()),
                stage,
                defines: Default::default(),
            },
        )
    }

    fn bind_group_layout(&self, desc: &ProgramDescriptor) -> wgpu::BindGroupLayout {
        let visibility = if desc.source.is_compute() {
            wgpu::ShaderStages::COMPUTE
        } else {
            wgpu::ShaderStages::VERTEX_FRAGMENT
        };
        let mut entries = Vec::new();
        let mut binding = 0;
        for kind in &desc.bindings {
            let mut push = |ty| {
                entries.push(wgpu::BindGroupLayoutEntry {
                    binding,
                    visibility,
                    ty,
                    count: None,
                });
                binding += 1;
            };
            match kind {
                BindingKind::UniformBuffer => push(wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: false,
                    min_binding_size: None,
                }),
                BindingKind::StorageBuffer { read_only } => push(wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Storage { read_only: *read_only },
                    has_dynamic_offset: false,
                    min_binding_size: None,
                }),
                BindingKind::SampledTexture => {
                    push(wgpu::BindingType::Texture {
                        sample_type: wgpu::TextureSampleType::Float { filterable: true },
                        view_dimension: wgpu::TextureViewDimension::D2,
                        multisampled: false,
                    });
                    push(wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering));
                }
                BindingKind::DepthTexture => {
                    push(wgpu::BindingType::Texture {
                        sample_type: wgpu::TextureSampleType::Depth,
                        view_dimension: wgpu::TextureViewDimension::D2,
                        multisampled: false,
                    });
                    push(wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Comparison));
                }
            }
        }
        self.device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: desc.label.as_deref(),
            entries: &entries,
        })
    }

    fn target_format(&self, target: RenderTarget, depth: bool) -> RenderResult<wgpu::TextureFormat> {
        match target {
            RenderTarget::Surface if depth => Ok(SURFACE_DEPTH_FORMAT),
            RenderTarget::Surface => Ok(SURFACE_FORMAT),
            RenderTarget::Texture(handle) => self
                .textures
                .get(&handle)
                .map(|entry| entry.format)
                .ok_or_else(|| RenderError::UnknownResource(format!("texture {}", handle.0))),
        }
    }

    fn target_view(&self, target: RenderTarget, depth: bool) -> RenderResult<&wgpu::TextureView> {
        match target {
            RenderTarget::Surface if depth => Ok(&self.surface.depth_view),
            RenderTarget::Surface => Ok(&self.surface.color_view),
            RenderTarget::Texture(handle) => self
                .textures
                .get(&handle)
                .map(|entry| &entry.view)
                .ok_or_else(|| RenderError::UnknownResource(format!("texture {}", handle.0))),
        }
    }

    fn ensure_render_pipeline(&mut self, program: ProgramHandle, key: &PipelineKey) -> RenderResult<()> {
        let device = &self.device;
        let entry = self
            .programs
            .get_mut(&program)
            .ok_or_else(|| RenderError::UnknownResource(format!("program {}", program.0)))?;
        if entry.render_pipelines.contains_key(key) {
            return Ok(());
        }
        let (vertex, vertex_entry, fragment, fragment_entry) = match &entry.modules {
            Modules::Glsl { vertex, fragment } => (vertex, "main", fragment, "main"),
            Modules::Wgsl {
                module,
                vertex_entry,
                fragment_entry,
            } => (module, vertex_entry.as_str(), module, fragment_entry.as_str()),
            Modules::Compute { .. } => {
                return Err(RenderError::InvalidState(format!("program {} is not a render program", program.0)));
            }
        };
        let formats = &key.formats;

        let desc = &entry.desc;
        let attributes: Vec<Vec<wgpu::VertexAttribute>> = desc
            .vertex_layouts
            .iter()
            .map(|layout| {
                layout
                    .attributes
                    .iter()
                    .map(|attribute| wgpu::VertexAttribute {
                        format: map_vertex_format(attribute.format),
                        offset: attribute.offset,
                        shader_location: attribute.location,
                    })
                    .collect()
            })
            .collect();
        let buffers: Vec<wgpu::VertexBufferLayout> = desc
            .vertex_layouts
            .iter()
            .zip(&attributes)
            .map(|(layout, attributes)| wgpu::VertexBufferLayout {
                array_stride: layout.stride,
                step_mode: match layout.step_mode {
                    StepMode::Vertex => wgpu::VertexStepMode::Vertex,
                    StepMode::Instance => wgpu::VertexStepMode::Instance,
                },
                attributes,
            })
            .collect();
        let blend = map_blend(desc.blend);
        let targets: Vec<Option<wgpu::ColorTargetState>> = formats
            .color
            .iter()
            .map(|format| {
                Some(wgpu::ColorTargetState {
                    format: *format,
                    blend,
                    write_mask: wgpu::ColorWrites::ALL,
                })
            })
            .collect();
        let depth_stencil = formats.depth.map(|format| wgpu::DepthStencilState {
            format,
            depth_write_enabled: desc.depth_write,
            depth_compare: if desc.depth_test {
                wgpu::CompareFunction::LessEqual
            } else {
                wgpu::CompareFunction::Always
            },
            stencil: wgpu::StencilState::default(),
            bias: wgpu::DepthBiasState::default(),
        });

        let pipeline = validated(device, || {
            device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                label: desc.label.as_deref(),
                layout: Some(&entry.pipeline_layout),
                vertex: wgpu::VertexState {
                    module: vertex,
                    entry_point: vertex_entry,
                    compilation_options: wgpu::PipelineCompilationOptions::default(),
                    buffers: &buffers,
                },
                fragment: Some(wgpu::FragmentState {
                    module: fragment,
                    entry_point: fragment_entry,
                    compilation_options: wgpu::PipelineCompilationOptions::default(),
                    targets: &targets,
                }),
                primitive: wgpu::PrimitiveState {
                    topology: map_topology(key.topology),
                    front_face: wgpu::FrontFace::Ccw,
                    cull_mode: map_cull(desc.cull),
                    ..Default::default()
                },
                depth_stencil,
                multisample: wgpu::MultisampleState::default(),
                multiview: None,
            })
        })
        .map_err(|e| RenderError::PipelineCreation(format!("{:?}: {e}", desc.label)))?;

        tracing::debug!(target: "chronos::backend", program = program.0, ?key, "render pipeline created");
        entry.render_pipelines.insert(key.clone(), pipeline);
        Ok(())
    }

    fn ensure_compute_pipeline(&mut self, program: ProgramHandle) -> RenderResult<()> {
        let device = &self.device;
        let entry = self
            .programs
            .get_mut(&program)
            .ok_or_else(|| RenderError::UnknownResource(format!("program {}", program.0)))?;
        if entry.compute_pipeline.is_some() {
            return Ok(());
        }
        let Modules::Compute { module, entry_point } = &entry.modules else {
            return Err(RenderError::InvalidState(format!("program {} is not a compute program", program.0)));
        };
        let pipeline = validated(device, || {
            device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
                label: entry.desc.label.as_deref(),
                layout: Some(&entry.pipeline_layout),
                module,
                entry_point,
                compilation_options: wgpu::PipelineCompilationOptions::default(),
            })
        })
        .map_err(|e| RenderError::PipelineCreation(format!("{:?}: {e}", entry.desc.label)))?;
        entry.compute_pipeline = Some(pipeline);
        Ok(())
    }

    fn create_bind_group(&self, program: ProgramHandle, resources: &[BindingResource]) -> RenderResult<wgpu::BindGroup> {
        let entry = self
            .programs
            .get(&program)
            .ok_or_else(|| RenderError::UnknownResource(format!("program {}", program.0)))?;
        if entry.desc.bindings.len() != resources.len() {
            return Err(RenderError::InvalidState(format!(
                "program {:?} expects {} bindings, got {}",
                entry.desc.label,
                entry.desc.bindings.len(),
                resources.len()
            )));
        }

        let mut entries = Vec::new();
        let mut binding = 0;
        for (kind, resource) in entry.desc.bindings.iter().zip(resources) {
            match (kind, resource) {
                (BindingKind::UniformBuffer | BindingKind::StorageBuffer { .. }, BindingResource::Buffer(handle)) => {
                    let buffer = self
                        .buffers
                        .get(handle)
                        .ok_or_else(|| RenderError::UnknownResource(format!("buffer {}", handle.0)))?;
                    entries.push(wgpu::BindGroupEntry {
                        binding,
                        resource: buffer.buffer.as_entire_binding(),
                    });
                    binding += 1;
                }
                (BindingKind::SampledTexture | BindingKind::DepthTexture, BindingResource::Texture(handle)) => {
                    let texture = self
                        .textures
                        .get(handle)
                        .ok_or_else(|| RenderError::UnknownResource(format!("texture {}", handle.0)))?;
                    let sampler = if *kind == BindingKind::DepthTexture {
                        &self.comparison_sampler
                    } else {
                        &self.sampler
                    };
                    entries.push(wgpu::BindGroupEntry {
                        binding,
                        resource: wgpu::BindingResource::TextureView(&texture.view),
                    });
                    entries.push(wgpu::BindGroupEntry {
                        binding: binding + 1,
                        resource: wgpu::BindingResource::Sampler(sampler),
                    });
                    binding += 2;
                }
                (kind, resource) => {
                    return Err(RenderError::InvalidState(format!(
                        "binding {binding} expects {kind:?}, got {resource:?}"
                    )));
                }
            }
        }
        Ok(self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: entry.desc.label.as_deref(),
            layout: &entry.bind_group_layout,
            entries: &entries,
        }))
    }

    /// 为每条命令准备管线与绑定组（绘制/调度命令对应 `Some`）
    fn prepare_commands(&mut self, commands: &[RenderCommand]) -> RenderResult<Vec<Option<wgpu::BindGroup>>> {
        let mut formats = PassFormats::default();
        let mut bind_groups = Vec::with_capacity(commands.len());
        for command in commands {
            let bind_group = match command {
                RenderCommand::BeginRenderPass { color, depth, .. } => {
                    formats = PassFormats {
                        color: color
                            .iter()
                            .map(|target| self.target_format(*target, false))
                            .collect::<RenderResult<_>>()?,
                        depth: depth.map(|target| self.target_format(target, true)).transpose()?,
                    };
                    None
                }
                RenderCommand::Draw {
                    program,
                    bindings,
                    topology,
                    ..
                } => {
                    let key = PipelineKey {
                        formats: formats.clone(),
                        topology: *topology,
                    };
                    self.ensure_render_pipeline(*program, &key)?;
                    Some(self.create_bind_group(*program, bindings)?)
                }
                RenderCommand::Dispatch { program, bindings, .. } => {
                    self.ensure_compute_pipeline(*program)?;
                    Some(self.create_bind_group(*program, bindings)?)
                }
                RenderCommand::EndRenderPass => None,
            };
            bind_groups.push(bind_group);
        }
        Ok(bind_groups)
    }

    fn encode_render_pass(
        &self,
        encoder: &mut wgpu::CommandEncoder,
        commands: &[RenderCommand],
        bind_groups: &[Option<wgpu::BindGroup>],
    ) -> RenderResult<()> {
        let Some(RenderCommand::BeginRenderPass {
            label,
            color,
            depth,
            clear_color,
            clear_depth,
        }) = commands.first()
        else {
            return Ok(());
        };
        let color_load = match clear_color {
            Some([r, g, b, a]) => wgpu::LoadOp::Clear(wgpu::Color {
                r: *r as f64,
                g: *g as f64,
                b: *b as f64,
                a: *a as f64,
            }),
            None => wgpu::LoadOp::Load,
        };
        let color_attachments: Vec<Option<wgpu::RenderPassColorAttachment>> = color
            .iter()
            .map(|target| {
                Ok(Some(wgpu::RenderPassColorAttachment {
                    view: self.target_view(*target, false)?,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: color_load,
                        store: wgpu::StoreOp::Store,
                    },
                }))
            })
            .collect::<RenderResult<_>>()?;
        let depth_attachment = match depth {
            Some(target) => Some(wgpu::RenderPassDepthStencilAttachment {
                view: self.target_view(*target, true)?,
                depth_ops: Some(wgpu::Operations {
                    load: if *clear_depth {
                        wgpu::LoadOp::Clear(1.0)
                    } else {
                        wgpu::LoadOp::Load
                    },
                    store: wgpu::StoreOp::Store,
                }),
                stencil_ops: None,
            }),
            None => None,
        };

        let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some(label),
            color_attachments: &color_attachments,
            depth_stencil_attachment: depth_attachment,
            timestamp_writes: None,
            occlusion_query_set: None,
        });
        let formats = PassFormats {
            color: color
                .iter()
                .map(|target| self.target_format(*target, false))
                .collect::<RenderResult<_>>()?,
            depth: depth.map(|target| self.target_format(target, true)).transpose()?,
        };

        for (command, bind_group) in commands.iter().zip(bind_groups).skip(1) {
            let RenderCommand::Draw {
                program,
                vertex_buffers,
                vertex_count,
                instance_count,
                topology,
                ..
            } = command
            else {
                continue;
            };
            let key = PipelineKey {
                formats: formats.clone(),
                topology: *topology,
            };
            let pipeline = self
                .programs
                .get(program)
                .and_then(|entry| entry.render_pipelines.get(&key))
                .ok_or_else(|| RenderError::UnknownResource(format!("pipeline for program {}", program.0)))?;
            pass.set_pipeline(pipeline);
            if let Some(bind_group) = bind_group {
                pass.set_bind_group(0, bind_group, &[]);
            }
            for (slot, handle) in vertex_buffers.iter().enumerate() {
                let buffer = self
                    .buffers
                    .get(handle)
                    .ok_or_else(|| RenderError::UnknownResource(format!("buffer {}", handle.0)))?;
                pass.set_vertex_buffer(slot as u32, buffer.buffer.slice(..));
            }
            pass.draw(0..*vertex_count, 0..*instance_count);
        }
        Ok(())
    }
}

impl RenderBackend for WgpuBackend {
    fn create_buffer(&mut self, desc: &BufferDescriptor) -> RenderResult<BufferHandle> {
        self.ensure_alive()?;
        // wgpu 要求写入长度按 4 字节对齐
        let size = desc.size.max(4).div_ceil(wgpu::COPY_BUFFER_ALIGNMENT) * wgpu::COPY_BUFFER_ALIGNMENT;
        let buffer = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: desc.label.as_deref(),
            size,
            usage: map_buffer_usage(desc.usage) | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let handle = BufferHandle(self.next_id());
        self.buffers.insert(handle, BufferEntry { buffer, size });
        Ok(handle)
    }

    fn destroy_buffer(&mut self, buffer: BufferHandle) {
        if let Some(entry) = self.buffers.remove(&buffer) {
            entry.buffer.destroy();
        }
    }

    fn write_buffer(&mut self, buffer: BufferHandle, offset: u64, data: &[u8]) -> RenderResult<()> {
        self.ensure_alive()?;
        let entry = self
            .buffers
            .get(&buffer)
            .ok_or_else(|| RenderError::UnknownResource(format!("buffer {}", buffer.0)))?;
        if offset + data.len() as u64 > entry.size {
            return Err(RenderError::InvalidState(format!(
                "write of {} bytes at {} overflows buffer {} ({} bytes)",
                data.len(),
                offset,
                buffer.0,
                entry.size
            )));
        }
        let aligned = data.len() as u64 % wgpu::COPY_BUFFER_ALIGNMENT == 0;
        if aligned {
            self.queue.write_buffer(&entry.buffer, offset, data);
        } else {
            let mut padded = data.to_vec();
            padded.resize(data.len().div_ceil(4) * 4, 0);
            self.queue.write_buffer(&entry.buffer, offset, &padded);
        }
        Ok(())
    }

    fn create_texture(&mut self, desc: &TextureDescriptor) -> RenderResult<TextureHandle> {
        self.ensure_alive()?;
        let max = self.limits.max_texture_dimension_2d;
        if desc.width > max || desc.height > max {
            return Err(RenderError::InvalidState(format!(
                "texture {}x{} exceeds max size {}",
                desc.width, desc.height, max
            )));
        }
        let format = map_texture_format(desc.format);
        let texture = self.device.create_texture(&wgpu::TextureDescriptor {
            label: desc.label.as_deref(),
            size: wgpu::Extent3d {
                width: desc.width.max(1),
                height: desc.height.max(1),
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format,
            usage: map_texture_usage(desc.usage),
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        let handle = TextureHandle(self.next_id());
        self.textures.insert(
            handle,
            TextureEntry {
                _texture: texture,
                view,
                format,
                bytes: desc.width as u64 * desc.height as u64 * desc.format.bytes_per_pixel(),
            },
        );
        Ok(handle)
    }

    fn destroy_texture(&mut self, texture: TextureHandle) {
        if let Some(entry) = self.textures.remove(&texture) {
            entry._texture.destroy();
        }
    }

    fn create_program(&mut self, desc: &ProgramDescriptor) -> RenderResult<ProgramHandle> {
        self.ensure_alive()?;
        let label = desc.label.clone().unwrap_or_else(|| "program".to_string());
        let modules = match &desc.source {
            ProgramSource::Glsl { vertex, fragment } => Modules::Glsl {
                vertex: self.glsl_module(&format!("{label} (vertex)"), vertex, wgpu::naga::ShaderStage::Vertex)?,
                fragment: self.glsl_module(
                    &format!("{label} (fragment)"),
                    fragment,
                    wgpu::naga::ShaderStage::Fragment,
                )?,
            },
            ProgramSource::Wgsl {
                source,
                vertex_entry,
                fragment_entry,
            } => Modules::Wgsl {
                module: self.shader_module(&label, wgpu::ShaderSource::Wgsl(Cow::Owned(source.clone())))?,
                vertex_entry: vertex_entry.clone(),
                fragment_entry: fragment_entry.clone(),
            },
            ProgramSource::Compute { source, entry_point } => {
                if !self.compute {
                    return Err(RenderError::MissingFeature("compute shaders".to_string()));
                }
                Modules::Compute {
                    module: self.shader_module(&label, wgpu::ShaderSource::Wgsl(Cow::Owned(source.clone())))?,
                    entry_point: entry_point.clone(),
                }
            }
        };
        let bind_group_layout = self.bind_group_layout(desc);
        let pipeline_layout = self.device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some(&label),
            bind_group_layouts: &[&bind_group_layout],
            push_constant_ranges: &[],
        });
        let handle = ProgramHandle(self.next_id());
        self.programs.insert(
            handle,
            ProgramEntry {
                desc: desc.clone(),
                modules,
                bind_group_layout,
                pipeline_layout,
                render_pipelines: HashMap::new(),
                compute_pipeline: None,
            },
        );
        tracing::debug!(target: "chronos::backend", program = handle.0, %label, "program compiled");
        Ok(handle)
    }

    fn destroy_program(&mut self, program: ProgramHandle) {
        self.programs.remove(&program);
    }

    fn submit(&mut self, commands: &[RenderCommand]) -> RenderResult<()> {
        self.ensure_alive()?;
        let bind_groups = self.prepare_commands(commands)?;
        let mut encoder = self.device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("Frame Encoder"),
        });

        let mut index = 0;
        while index < commands.len() {
            match &commands[index] {
                RenderCommand::Dispatch {
                    program, workgroups, ..
                } => {
                    let pipeline = self
                        .programs
                        .get(program)
                        .and_then(|entry| entry.compute_pipeline.as_ref())
                        .ok_or_else(|| RenderError::UnknownResource(format!("pipeline for program {}", program.0)))?;
                    let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                        label: Some("Compute Pass"),
                        timestamp_writes: None,
                    });
                    pass.set_pipeline(pipeline);
                    if let Some(bind_group) = &bind_groups[index] {
                        pass.set_bind_group(0, bind_group, &[]);
                    }
                    let [x, y, z] = *workgroups;
                    pass.dispatch_workgroups(x, y, z);
                    index += 1;
                }
                RenderCommand::BeginRenderPass { .. } => {
                    let end = commands[index..]
                        .iter()
                        .position(|command| matches!(command, RenderCommand::EndRenderPass))
                        .map(|offset| index + offset)
                        .unwrap_or(commands.len());
                    self.encode_render_pass(&mut encoder, &commands[index..end], &bind_groups[index..end])?;
                    index = end + 1;
                }
                RenderCommand::Draw { .. } => {
                    tracing::warn!(target: "chronos::backend", "draw outside of a render pass skipped");
                    index += 1;
                }
                RenderCommand::EndRenderPass => index += 1,
            }
        }

        self.queue.submit(std::iter::once(encoder.finish()));
        for command in commands {
            self.counters.record(command);
        }
        Ok(())
    }

    fn resize(&mut self, width: u32, height: u32) {
        if self.lost || (width.max(1), height.max(1)) == self.surface_size() {
            return;
        }
        self.surface = Surface::new(&self.device, width, height);
    }

    fn counters(&self) -> RenderCounters {
        self.counters
    }

    fn reset_counters(&mut self) {
        self.counters = RenderCounters::default();
    }

    fn memory_info(&self) -> MemoryInfo {
        let buffer_bytes: u64 = self.buffers.values().map(|entry| entry.size).sum();
        let texture_bytes: u64 = self.textures.values().map(|entry| entry.bytes).sum();
        MemoryInfo {
            buffers: self.buffers.len() as u32,
            textures: self.textures.len() as u32,
            programs: self.programs.len() as u32,
            bytes: buffer_bytes + texture_bytes,
        }
    }

    fn capabilities(&self) -> BackendCapabilities {
        let mut features: Vec<String> = self
            .device
            .features()
            .iter_names()
            .map(|(name, _)| name.to_ascii_lowercase())
            .collect();
        if self.compute {
            features.push("compute-shaders".to_string());
        }
        BackendCapabilities {
            max_texture_size: self.limits.max_texture_dimension_2d,
            max_buffer_size: self.limits.max_buffer_size,
            compute_shaders: self.compute,
            max_bind_groups: self.limits.max_bind_groups,
            adapter_name: self.adapter_info.name.clone(),
            features,
        }
    }

    fn lose_context(&mut self) {
        if self.lost {
            return;
        }
        self.lost = true;
        self.programs.clear();
        self.textures.clear();
        self.buffers.clear();
        self.device.destroy();
        tracing::info!(target: "chronos::backend", kind = self.kind.name(), "GPU context released");
    }

    fn is_lost(&self) -> bool {
        self.lost
    }

    fn name(&self) -> &str {
        self.kind.name()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blend_mapping() {
        assert!(map_blend(BlendMode::Opaque).is_none());
        assert_eq!(map_blend(BlendMode::Alpha), Some(wgpu::BlendState::ALPHA_BLENDING));
        let additive = map_blend(BlendMode::Additive).unwrap();
        assert_eq!(additive.color.dst_factor, wgpu::BlendFactor::One);
        let screen = map_blend(BlendMode::Screen).unwrap();
        assert_eq!(screen.color.dst_factor, wgpu::BlendFactor::OneMinusSrc);
    }

    #[test]
    fn test_usage_mapping() {
        let usage = map_buffer_usage(BufferUsage::STORAGE | BufferUsage::VERTEX);
        assert!(usage.contains(wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::VERTEX));
        assert!(!usage.contains(wgpu::BufferUsages::UNIFORM));

        let usage = map_texture_usage(TextureUsage::RENDER_ATTACHMENT | TextureUsage::TEXTURE_BINDING);
        assert!(usage.contains(wgpu::TextureUsages::RENDER_ATTACHMENT));
        assert!(!usage.contains(wgpu::TextureUsages::COPY_SRC));
    }

    #[test]
    fn test_kind_names() {
        assert_eq!(BackendKind::WebGl.name(), "webgl");
        assert!(!BackendKind::WebGpu.backends().is_empty());
        assert_eq!(map_texture_format(TextureFormat::Depth32Float), wgpu::TextureFormat::Depth32Float);
    }
}
