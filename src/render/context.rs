//! GPU 上下文与 RAII 资源
//!
//! `GpuContext` 独占渲染后端。它分发的 `GpuBuffer` / `GpuTexture` / `GpuProgram`
//! 在 drop 时把句柄放入释放队列，由 `collect_garbage()` 统一销毁。
//! 上下文丢失后队列中的句柄被直接丢弃（资源已随上下文一并释放）。

use super::backend::{
    BackendCapabilities, BufferDescriptor, BufferHandle, BufferUsage, MemoryInfo,
    ProgramDescriptor, ProgramHandle, RenderBackend, RenderCommand, RenderCounters,
    TextureDescriptor, TextureHandle,
};
use crate::core::error::RenderResult;
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::{Rc, Weak};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Release {
    Buffer(BufferHandle),
    Texture(TextureHandle),
    Program(ProgramHandle),
}

type ReleaseQueue = Rc<RefCell<Vec<Release>>>;

fn enqueue(queue: &Weak<RefCell<Vec<Release>>>, release: Release) {
    if let Some(queue) = queue.upgrade() {
        queue.borrow_mut().push(release);
    }
}

/// GPU 缓冲区（drop 时释放）
#[derive(Debug)]
pub struct GpuBuffer {
    handle: BufferHandle,
    size: u64,
    queue: Weak<RefCell<Vec<Release>>>,
}

impl GpuBuffer {
    pub fn handle(&self) -> BufferHandle {
        self.handle
    }

    pub fn size(&self) -> u64 {
        self.size
    }
}

impl Drop for GpuBuffer {
    fn drop(&mut self) {
        enqueue(&self.queue, Release::Buffer(self.handle));
    }
}

/// GPU 纹理（drop 时释放）
#[derive(Debug)]
pub struct GpuTexture {
    handle: TextureHandle,
    width: u32,
    height: u32,
    queue: Weak<RefCell<Vec<Release>>>,
}

impl GpuTexture {
    pub fn handle(&self) -> TextureHandle {
        self.handle
    }

    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }
}

impl Drop for GpuTexture {
    fn drop(&mut self) {
        enqueue(&self.queue, Release::Texture(self.handle));
    }
}

#[derive(Debug)]
struct ProgramSlot {
    handle: ProgramHandle,
    queue: Weak<RefCell<Vec<Release>>>,
}

impl Drop for ProgramSlot {
    fn drop(&mut self) {
        enqueue(&self.queue, Release::Program(self.handle));
    }
}

/// 着色器程序（可共享；最后一个引用 drop 时释放）
#[derive(Debug, Clone)]
pub struct GpuProgram(Rc<ProgramSlot>);

impl GpuProgram {
    pub fn handle(&self) -> ProgramHandle {
        self.0.handle
    }
}

/// GPU 上下文
pub struct GpuContext {
    backend: Box<dyn RenderBackend>,
    releases: ReleaseQueue,
    programs: HashMap<String, GpuProgram>,
}

impl GpuContext {
    pub fn new(backend: Box<dyn RenderBackend>) -> Self {
        tracing::debug!(target: "chronos::render", backend = backend.name(), "GPU context created");
        Self {
            backend,
            releases: Rc::new(RefCell::new(Vec::new())),
            programs: HashMap::new(),
        }
    }

    /// 创建缓冲区
    pub fn create_buffer(&mut self, label: &str, size: u64, usage: BufferUsage) -> RenderResult<GpuBuffer> {
        let handle = self.backend.create_buffer(&BufferDescriptor {
            label: Some(label.to_string()),
            size,
            usage: usage | BufferUsage::COPY_DST,
        })?;
        Ok(GpuBuffer {
            handle,
            size,
            queue: Rc::downgrade(&self.releases),
        })
    }

    /// 创建缓冲区并写入初始数据
    pub fn create_buffer_init(&mut self, label: &str, usage: BufferUsage, data: &[u8]) -> RenderResult<GpuBuffer> {
        let buffer = self.create_buffer(label, data.len() as u64, usage)?;
        self.backend.write_buffer(buffer.handle, 0, data)?;
        Ok(buffer)
    }

    pub fn write_buffer(&mut self, buffer: &GpuBuffer, offset: u64, data: &[u8]) -> RenderResult<()> {
        self.backend.write_buffer(buffer.handle, offset, data)
    }

    /// 创建纹理
    pub fn create_texture(&mut self, desc: &TextureDescriptor) -> RenderResult<GpuTexture> {
        let handle = self.backend.create_texture(desc)?;
        Ok(GpuTexture {
            handle,
            width: desc.width,
            height: desc.height,
            queue: Rc::downgrade(&self.releases),
        })
    }

    /// 创建未缓存的程序
    pub fn create_program(&mut self, desc: &ProgramDescriptor) -> RenderResult<GpuProgram> {
        let handle = self.backend.create_program(desc)?;
        Ok(GpuProgram(Rc::new(ProgramSlot {
            handle,
            queue: Rc::downgrade(&self.releases),
        })))
    }

    /// 按键获取缓存的程序，未命中时构建
    pub fn program<F>(&mut self, key: &str, build: F) -> RenderResult<GpuProgram>
    where
        F: FnOnce() -> ProgramDescriptor,
    {
        if let Some(program) = self.programs.get(key) {
            return Ok(program.clone());
        }
        let program = self.create_program(&build())?;
        self.programs.insert(key.to_string(), program.clone());
        Ok(program)
    }

    pub fn submit(&mut self, commands: &[RenderCommand]) -> RenderResult<()> {
        self.backend.submit(commands)
    }

    pub fn resize(&mut self, width: u32, height: u32) {
        self.backend.resize(width, height);
    }

    /// 销毁所有已释放的资源，返回销毁数量
    ///
    /// 缓存中没有外部引用的程序也在此时释放。
    pub fn collect_garbage(&mut self) -> usize {
        self.programs
            .retain(|_, program| Rc::strong_count(&program.0) > 1);

        let pending: Vec<Release> = std::mem::take(&mut *self.releases.borrow_mut());
        if self.backend.is_lost() {
            return 0;
        }
        for release in &pending {
            match *release {
                Release::Buffer(handle) => self.backend.destroy_buffer(handle),
                Release::Texture(handle) => self.backend.destroy_texture(handle),
                Release::Program(handle) => self.backend.destroy_program(handle),
            }
        }
        if !pending.is_empty() {
            tracing::trace!(target: "chronos::render", count = pending.len(), "released GPU resources");
        }
        pending.len()
    }

    /// 等待销毁的资源数量
    pub fn pending_releases(&self) -> usize {
        self.releases.borrow().len()
    }

    /// 缓存中的程序数量
    pub fn cached_programs(&self) -> usize {
        self.programs.len()
    }

    pub fn counters(&self) -> RenderCounters {
        self.backend.counters()
    }

    pub fn reset_counters(&mut self) {
        self.backend.reset_counters();
    }

    pub fn memory_info(&self) -> MemoryInfo {
        self.backend.memory_info()
    }

    pub fn capabilities(&self) -> BackendCapabilities {
        self.backend.capabilities()
    }

    /// 强制丢失上下文
    pub fn lose_context(&mut self) {
        self.programs.clear();
        self.releases.borrow_mut().clear();
        self.backend.lose_context();
    }

    pub fn is_lost(&self) -> bool {
        self.backend.is_lost()
    }

    pub fn backend_name(&self) -> &str {
        self.backend.name()
    }
}
