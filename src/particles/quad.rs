//! 粒子的实例化绘制
//!
//! 每个粒子是一个面向相机的四边形：槽位 0 为单位四边形，
//! 槽位 1 为逐实例数据（位置 3 起）。三种粒子策略共用片元着色器与这里的绘制批次。

use crate::render::backend::{BindingResource, BufferUsage, RenderCommand, Topology, VertexLayout};
use crate::render::context::{GpuBuffer, GpuContext, GpuProgram};
use crate::render::scene::{Geometry, ViewState};
use crate::core::error::RenderResult;
use crate::shaders::material::ShaderMaterial;
use glam::Mat4;

/// 圆形软边缘的粒子片元（顶点阶段输出 vColor / vAlpha / vUv）
pub const PARTICLE_FRAGMENT: &str = r#"
layout(location = 0) in vec3 vColor;
layout(location = 1) in float vAlpha;
layout(location = 2) in vec2 vUv;

layout(location = 0) out vec4 fragColor;

void main() {
    float dist = length(vUv - 0.5) * 2.0;
    float alpha = (1.0 - smoothstep(0.0, 1.0, dist)) * vAlpha;
    if (alpha < 0.01) {
        discard;
    }
    fragColor = vec4(vColor, alpha);
}
"#;

/// 视图空间中展开四边形，`worldSize` 为边长
pub const BILLBOARD: &str = r#"
vec4 billboard(vec3 center, float worldSize) {
    vec4 mvPosition = viewMatrix * modelMatrix * vec4(center, 1.0);
    mvPosition.xy += position.xy * worldSize;
    return projectionMatrix * mvPosition;
}
"#;

/// 粒子尺寸到世界单位的比例
pub const SIZE_SCALE: f32 = 10.0;

/// 一个粒子系统的绘制资源
#[derive(Debug)]
pub(crate) struct QuadBatch {
    quad: GpuBuffer,
    uniforms: GpuBuffer,
    program: GpuProgram,
    program_key: String,
}

impl QuadBatch {
    /// 创建或在材质结构变化时重建
    pub(crate) fn ensure<'a>(
        slot: &'a mut Option<QuadBatch>,
        gpu: &mut GpuContext,
        material: &ShaderMaterial,
        instance_layout: &VertexLayout,
    ) -> RenderResult<&'a mut QuadBatch> {
        let key = material.program_key();
        let batch = match slot.take() {
            Some(batch) if batch.program_key == key => batch,
            previous => {
                let layouts = vec![Geometry::layout(), instance_layout.clone()];
                let program = gpu.program(&key, || material.program_descriptor(layouts))?;
                let uniforms = gpu.create_buffer(
                    &format!("{} uniforms", material.name()),
                    material.layout().size(),
                    BufferUsage::UNIFORM,
                )?;
                let quad = match previous {
                    Some(previous) => previous.quad,
                    None => gpu.create_buffer_init(
                        "particle quad",
                        BufferUsage::VERTEX,
                        Geometry::plane(1.0, 1.0).as_bytes(),
                    )?,
                };
                QuadBatch {
                    quad,
                    uniforms,
                    program,
                    program_key: key,
                }
            }
        };
        Ok(slot.insert(batch))
    }

    pub(crate) fn write_uniforms(
        &self,
        gpu: &mut GpuContext,
        material: &ShaderMaterial,
        view: &ViewState,
    ) -> RenderResult<()> {
        let data = material.layout().pack(&view.builtins(Mat4::IDENTITY), material.uniforms());
        gpu.write_buffer(&self.uniforms, 0, &data)
    }

    pub(crate) fn draw(&self, instances: &GpuBuffer, instance_count: u32) -> RenderCommand {
        RenderCommand::Draw {
            program: self.program.handle(),
            vertex_buffers: vec![self.quad.handle(), instances.handle()],
            bindings: vec![BindingResource::Buffer(self.uniforms.handle())],
            vertex_count: 6,
            instance_count,
            topology: Topology::TriangleList,
        }
    }
}
