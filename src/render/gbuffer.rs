//! 延迟渲染 G-Buffer
//!
//! 位置、法线、反照率、深度四个目标作为一个整体创建、调整尺寸和释放。

use super::backend::{TextureDescriptor, TextureFormat, TextureHandle, TextureUsage};
use super::context::{GpuContext, GpuTexture};
use crate::core::error::RenderResult;

/// G-Buffer 纹理
///
/// 四个目标同时创建、同时调整尺寸、同时释放，不会出现部分存活的状态。
#[derive(Debug)]
pub struct GBuffer {
    /// 位置 (RGB = 世界坐标, A = 线性深度)
    position: GpuTexture,
    /// 法线 (RGB = 法线, A = 粗糙度)
    normal: GpuTexture,
    /// 反照率 (RGB = 反照率, A = 金属度)
    albedo: GpuTexture,
    /// 深度缓冲
    depth: GpuTexture,
    width: u32,
    height: u32,
}

impl GBuffer {
    pub fn new(gpu: &mut GpuContext, width: u32, height: u32) -> RenderResult<Self> {
        let width = width.max(1);
        let height = height.max(1);
        let usage = TextureUsage::RENDER_ATTACHMENT | TextureUsage::TEXTURE_BINDING;
        let mut target = |label: &str, format: TextureFormat| {
            gpu.create_texture(&TextureDescriptor {
                label: Some(label.to_string()),
                width,
                height,
                format,
                usage,
            })
        };

        // 任一创建失败时，已创建的纹理随 `?` 一起 drop
        let position = target("G-Buffer Position", TextureFormat::Rgba16Float)?;
        let normal = target("G-Buffer Normal", TextureFormat::Rgba16Float)?;
        let albedo = target("G-Buffer Albedo", TextureFormat::Rgba8Unorm)?;
        let depth = target("G-Buffer Depth", TextureFormat::Depth32Float)?;

        Ok(Self {
            position,
            normal,
            albedo,
            depth,
            width,
            height,
        })
    }

    /// 整体替换为新尺寸；失败时保留旧的四个目标
    pub fn resize(&mut self, gpu: &mut GpuContext, width: u32, height: u32) -> RenderResult<()> {
        if (width.max(1), height.max(1)) == (self.width, self.height) {
            return Ok(());
        }
        *self = GBuffer::new(gpu, width, height)?;
        Ok(())
    }

    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// 颜色目标（位置、法线、反照率）
    pub fn color_targets(&self) -> [TextureHandle; 3] {
        [
            self.position.handle(),
            self.normal.handle(),
            self.albedo.handle(),
        ]
    }

    pub fn depth_target(&self) -> TextureHandle {
        self.depth.handle()
    }

    pub fn handles(&self) -> [TextureHandle; 4] {
        let [position, normal, albedo] = self.color_targets();
        [position, normal, albedo, self.depth_target()]
    }
}
