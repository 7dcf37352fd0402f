//! 后处理合成器
//!
//! 每个启用的效果是一个全屏通道，在两个合成目标之间来回交替，
//! 最后一个通道写入主输出。效果顺序固定：
//! Bloom → 色差 → 暗角 → 胶片噪点 → 色调映射 → FXAA。
//!
//! # 示例
//!
//! ```ignore
//! let mut composer = PostProcessComposer::new(PostProcessPreset::Cinematic.config());
//! composer.resize(&mut gpu, 1920, 1080)?;
//! composer.prepare(&mut gpu, time)?;
//! composer.encode(&mut commands);
//! ```

use super::backend::{
    BindingKind, BindingResource, BlendMode, BufferUsage, CullMode, ProgramDescriptor, ProgramSource,
    RenderCommand, RenderTarget, TextureDescriptor, TextureFormat, TextureHandle, TextureUsage, Topology,
};
use super::context::{GpuBuffer, GpuContext, GpuProgram, GpuTexture};
use crate::core::error::RenderResult;
use crate::impl_default;
use bytemuck::{Pod, Zeroable};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// 全屏三角形顶点程序（不需要顶点缓冲区，`vertex_count = 3`）
pub const FULLSCREEN_VERTEX: &str = r#"#version 450
layout(location = 0) out vec2 vUv;

void main() {
    vec2 corner = vec2(float((gl_VertexIndex << 1) & 2), float(gl_VertexIndex & 2));
    vUv = vec2(corner.x, 1.0 - corner.y);
    gl_Position = vec4(corner * 2.0 - 1.0, 0.0, 1.0);
}
"#;

const EFFECT_HEADER: &str = r#"#version 450
layout(location = 0) in vec2 vUv;
layout(location = 0) out vec4 fragColor;

layout(set = 0, binding = 0, std140) uniform EffectUniforms {
    vec4 params;
    vec2 resolution;
    float time;
    float padding;
};
layout(set = 0, binding = 1) uniform texture2D inputTexture;
layout(set = 0, binding = 2) uniform sampler inputSampler;

vec4 sampleInput(vec2 uv) {
    return texture(sampler2D(inputTexture, inputSampler), uv);
}

float luminance(vec3 color) {
    return dot(color, vec3(0.2126, 0.7152, 0.0722));
}
"#;

// params = (intensity, threshold, smoothing, radius)
const BLOOM_MAIN: &str = r#"
void main() {
    vec4 base = sampleInput(vUv);
    vec2 texel = params.w / resolution;
    vec3 glow = vec3(0.0);
    float total = 0.0;
    for (int x = -2; x <= 2; x++) {
        for (int y = -2; y <= 2; y++) {
            vec2 offset = vec2(float(x), float(y));
            vec3 tap = sampleInput(vUv + offset * texel).rgb;
            float bright = smoothstep(params.y - params.z, params.y + params.z, luminance(tap));
            float weight = exp(-dot(offset, offset) * 0.25);
            glow += tap * bright * weight;
            total += weight;
        }
    }
    fragColor = vec4(base.rgb + glow / total * params.x, base.a);
}
"#;

// params.x = offset
const CHROMATIC_MAIN: &str = r#"
void main() {
    vec2 direction = vUv - 0.5;
    vec4 center = sampleInput(vUv);
    float r = sampleInput(vUv + direction * params.x).r;
    float b = sampleInput(vUv - direction * params.x).b;
    fragColor = vec4(r, center.g, b, center.a);
}
"#;

// params = (offset, darkness)
const VIGNETTE_MAIN: &str = r#"
void main() {
    vec4 color = sampleInput(vUv);
    vec2 uv = (vUv - 0.5) * vec2(params.x + 1.0);
    fragColor = vec4(mix(color.rgb, vec3(1.0 - params.y), clamp(dot(uv, uv), 0.0, 1.0) * params.y), color.a);
}
"#;

// params.x = intensity
const NOISE_MAIN: &str = r#"
float grain(vec2 p) {
    return fract(sin(dot(p, vec2(12.9898, 78.233))) * 43758.5453);
}

void main() {
    vec4 color = sampleInput(vUv);
    float n = grain(vUv * resolution + fract(time) * 100.0) - 0.5;
    fragColor = vec4(color.rgb + n * params.x, color.a);
}
"#;

// params.x = exposure
const TONE_MAPPING_MAIN: &str = r#"
vec3 aces(vec3 x) {
    return clamp((x * (2.51 * x + 0.03)) / (x * (2.43 * x + 0.59) + 0.14), 0.0, 1.0);
}

void main() {
    vec4 color = sampleInput(vUv);
    fragColor = vec4(aces(color.rgb * params.x), color.a);
}
"#;

const FXAA_MAIN: &str = r#"
void main() {
    vec2 texel = 1.0 / resolution;
    vec4 center = sampleInput(vUv);
    float lumaM = luminance(center.rgb);
    float lumaNW = luminance(sampleInput(vUv + vec2(-1.0, -1.0) * texel).rgb);
    float lumaNE = luminance(sampleInput(vUv + vec2(1.0, -1.0) * texel).rgb);
    float lumaSW = luminance(sampleInput(vUv + vec2(-1.0, 1.0) * texel).rgb);
    float lumaSE = luminance(sampleInput(vUv + vec2(1.0, 1.0) * texel).rgb);

    float lumaMin = min(lumaM, min(min(lumaNW, lumaNE), min(lumaSW, lumaSE)));
    float lumaMax = max(lumaM, max(max(lumaNW, lumaNE), max(lumaSW, lumaSE)));
    if (lumaMax - lumaMin < max(0.0312, lumaMax * 0.125)) {
        fragColor = center;
        return;
    }

    vec2 dir = vec2(-((lumaNW + lumaNE) - (lumaSW + lumaSE)), (lumaNW + lumaSW) - (lumaNE + lumaSE));
    float reduce = max((lumaNW + lumaNE + lumaSW + lumaSE) * 0.03125, 0.0078125);
    float scale = 1.0 / (min(abs(dir.x), abs(dir.y)) + reduce);
    dir = clamp(dir * scale, vec2(-8.0), vec2(8.0)) * texel;

    vec3 a = 0.5 * (sampleInput(vUv - dir / 6.0).rgb + sampleInput(vUv + dir / 6.0).rgb);
    vec3 b = a * 0.5 + 0.25 * (sampleInput(vUv - dir * 0.5).rgb + sampleInput(vUv + dir * 0.5).rgb);
    float lumaB = luminance(b);
    if (lumaB < lumaMin || lumaB > lumaMax) {
        b = a;
    }
    fragColor = vec4(b, center.a);
}
"#;

/// Bloom 参数
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BloomSettings {
    pub enabled: bool,
    pub intensity: f32,
    /// 亮度阈值
    pub threshold: f32,
    /// 阈值两侧的平滑宽度
    pub smoothing: f32,
    /// 采样间距（像素）
    pub radius: f32,
}

impl_default!(BloomSettings {
    enabled: true,
    intensity: 0.5,
    threshold: 0.8,
    smoothing: 0.3,
    radius: 1.0,
});

/// 色差
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChromaticAberrationSettings {
    pub enabled: bool,
    pub offset: f32,
}

impl_default!(ChromaticAberrationSettings {
    enabled: false,
    offset: 0.001,
});

/// 暗角
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VignetteSettings {
    pub enabled: bool,
    pub offset: f32,
    pub darkness: f32,
}

impl_default!(VignetteSettings {
    enabled: true,
    offset: 0.3,
    darkness: 0.4,
});

/// 胶片噪点
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NoiseSettings {
    pub enabled: bool,
    pub intensity: f32,
}

impl_default!(NoiseSettings {
    enabled: false,
    intensity: 0.03,
});

/// 后处理配置
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PostProcessConfig {
    /// 总开关
    pub enabled: bool,
    pub bloom: BloomSettings,
    pub chromatic_aberration: ChromaticAberrationSettings,
    pub vignette: VignetteSettings,
    pub noise: NoiseSettings,
    /// ACES 色调映射
    pub tone_mapping: bool,
    /// 曝光值
    pub exposure: f32,
    pub fxaa: bool,
}

impl_default!(PostProcessConfig {
    enabled: true,
    bloom: BloomSettings::default(),
    chromatic_aberration: ChromaticAberrationSettings::default(),
    vignette: VignetteSettings::default(),
    noise: NoiseSettings::default(),
    tone_mapping: true,
    exposure: 1.0,
    fxaa: true,
});

impl PostProcessConfig {
    /// 按固定顺序列出启用的效果
    pub fn effects(&self) -> Vec<Effect> {
        if !self.enabled {
            return Vec::new();
        }
        let candidates = [
            (self.bloom.enabled, Effect::Bloom),
            (self.chromatic_aberration.enabled, Effect::ChromaticAberration),
            (self.vignette.enabled, Effect::Vignette),
            (self.noise.enabled, Effect::Noise),
            (self.tone_mapping, Effect::ToneMapping),
            (self.fxaa, Effect::Fxaa),
        ];
        candidates
            .into_iter()
            .filter_map(|(enabled, effect)| enabled.then_some(effect))
            .collect()
    }

    fn params(&self, effect: Effect) -> [f32; 4] {
        match effect {
            Effect::Bloom => [
                self.bloom.intensity,
                self.bloom.threshold,
                self.bloom.smoothing,
                self.bloom.radius,
            ],
            Effect::ChromaticAberration => [self.chromatic_aberration.offset, 0.0, 0.0, 0.0],
            Effect::Vignette => [self.vignette.offset, self.vignette.darkness, 0.0, 0.0],
            Effect::Noise => [self.noise.intensity, 0.0, 0.0, 0.0],
            Effect::ToneMapping => [self.exposure, 0.0, 0.0, 0.0],
            Effect::Fxaa => [0.0; 4],
        }
    }
}

/// 单个全屏效果
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Effect {
    Bloom,
    ChromaticAberration,
    Vignette,
    Noise,
    ToneMapping,
    Fxaa,
}

impl Effect {
    pub fn key(&self) -> &'static str {
        match self {
            Effect::Bloom => "postprocess-bloom",
            Effect::ChromaticAberration => "postprocess-chromatic",
            Effect::Vignette => "postprocess-vignette",
            Effect::Noise => "postprocess-noise",
            Effect::ToneMapping => "postprocess-tonemap",
            Effect::Fxaa => "postprocess-fxaa",
        }
    }

    fn main_source(&self) -> &'static str {
        match self {
            Effect::Bloom => BLOOM_MAIN,
            Effect::ChromaticAberration => CHROMATIC_MAIN,
            Effect::Vignette => VIGNETTE_MAIN,
            Effect::Noise => NOISE_MAIN,
            Effect::ToneMapping => TONE_MAPPING_MAIN,
            Effect::Fxaa => FXAA_MAIN,
        }
    }

    fn descriptor(&self) -> ProgramDescriptor {
        ProgramDescriptor {
            label: Some(self.key().to_string()),
            source: ProgramSource::Glsl {
                vertex: FULLSCREEN_VERTEX.to_string(),
                fragment: format!("{EFFECT_HEADER}{}", self.main_source()),
            },
            vertex_layouts: Vec::new(),
            bindings: vec![BindingKind::UniformBuffer, BindingKind::SampledTexture],
            blend: BlendMode::Opaque,
            depth_test: false,
            depth_write: false,
            cull: CullMode::None,
        }
    }
}

/// 命名后处理预设
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PostProcessPreset {
    Minimal,
    Cinematic,
    Cyberpunk,
    Dreamy,
    Performance,
}

impl PostProcessPreset {
    pub const ALL: [PostProcessPreset; 5] = [
        PostProcessPreset::Minimal,
        PostProcessPreset::Cinematic,
        PostProcessPreset::Cyberpunk,
        PostProcessPreset::Dreamy,
        PostProcessPreset::Performance,
    ];

    pub fn key(&self) -> &'static str {
        match self {
            PostProcessPreset::Minimal => "minimal",
            PostProcessPreset::Cinematic => "cinematic",
            PostProcessPreset::Cyberpunk => "cyberpunk",
            PostProcessPreset::Dreamy => "dreamy",
            PostProcessPreset::Performance => "performance",
        }
    }

    pub fn config(&self) -> PostProcessConfig {
        let base = PostProcessConfig::default();
        match self {
            PostProcessPreset::Minimal => PostProcessConfig {
                bloom: BloomSettings {
                    intensity: 0.3,
                    threshold: 0.9,
                    ..base.bloom
                },
                vignette: VignetteSettings {
                    enabled: false,
                    ..base.vignette
                },
                ..base
            },
            PostProcessPreset::Cinematic => PostProcessConfig {
                bloom: BloomSettings {
                    intensity: 0.6,
                    ..base.bloom
                },
                vignette: VignetteSettings {
                    darkness: 0.6,
                    ..base.vignette
                },
                noise: NoiseSettings {
                    enabled: true,
                    ..base.noise
                },
                ..base
            },
            PostProcessPreset::Cyberpunk => PostProcessConfig {
                bloom: BloomSettings {
                    intensity: 1.2,
                    threshold: 0.6,
                    radius: 1.5,
                    ..base.bloom
                },
                chromatic_aberration: ChromaticAberrationSettings {
                    enabled: true,
                    offset: 0.003,
                },
                vignette: VignetteSettings {
                    darkness: 0.5,
                    ..base.vignette
                },
                noise: NoiseSettings {
                    enabled: true,
                    intensity: 0.05,
                },
                exposure: 1.1,
                ..base
            },
            PostProcessPreset::Dreamy => PostProcessConfig {
                bloom: BloomSettings {
                    intensity: 1.0,
                    threshold: 0.5,
                    smoothing: 0.6,
                    radius: 2.0,
                    ..base.bloom
                },
                vignette: VignetteSettings {
                    offset: 0.5,
                    darkness: 0.3,
                    ..base.vignette
                },
                exposure: 1.2,
                ..base
            },
            PostProcessPreset::Performance => PostProcessConfig {
                bloom: BloomSettings {
                    enabled: false,
                    ..base.bloom
                },
                vignette: VignetteSettings {
                    enabled: false,
                    ..base.vignette
                },
                fxaa: false,
                ..base
            },
        }
    }
}

impl fmt::Display for PostProcessPreset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

impl FromStr for PostProcessPreset {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        PostProcessPreset::ALL
            .into_iter()
            .find(|preset| preset.key().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("unknown post-processing preset `{s}`"))
    }
}

/// 效果通道 uniform 块（std140，32 字节）
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct EffectUniforms {
    pub params: [f32; 4],
    pub resolution: [f32; 2],
    pub time: f32,
    _padding: f32,
}

#[derive(Debug)]
struct EffectPass {
    effect: Effect,
    program: GpuProgram,
    uniforms: GpuBuffer,
}

#[derive(Debug)]
struct Targets {
    color: [GpuTexture; 2],
    depth: GpuTexture,
}

/// 后处理合成器
///
/// 场景先渲染到 `scene_color()` / `scene_depth()`，再由 `encode` 逐效果处理，
/// 最后一个通道写入主输出。
#[derive(Debug)]
pub struct PostProcessComposer {
    config: PostProcessConfig,
    targets: Option<Targets>,
    size: (u32, u32),
    passes: Vec<EffectPass>,
    passes_dirty: bool,
}

impl PostProcessComposer {
    pub fn new(config: PostProcessConfig) -> Self {
        Self {
            config,
            targets: None,
            size: (0, 0),
            passes: Vec::new(),
            passes_dirty: true,
        }
    }

    pub fn config(&self) -> &PostProcessConfig {
        &self.config
    }

    /// 替换配置；通道在下一次 `prepare` 时重建
    pub fn set_config(&mut self, config: PostProcessConfig) {
        if self.config != config {
            self.config = config;
            self.passes_dirty = true;
        }
    }

    /// 是否有效果需要执行
    pub fn is_active(&self) -> bool {
        !self.config.effects().is_empty()
    }

    pub fn pass_count(&self) -> usize {
        self.passes.len()
    }

    pub fn size(&self) -> (u32, u32) {
        self.size
    }

    /// 重建两个合成目标与深度目标（渲染像素）
    pub fn resize(&mut self, gpu: &mut GpuContext, width: u32, height: u32) -> RenderResult<()> {
        let (width, height) = (width.max(1), height.max(1));
        if self.targets.is_some() && self.size == (width, height) {
            return Ok(());
        }
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
        let targets = Targets {
            color: [
                target("Composer Read", TextureFormat::Rgba16Float)?,
                target("Composer Write", TextureFormat::Rgba16Float)?,
            ],
            depth: target("Composer Depth", TextureFormat::Depth32Float)?,
        };
        self.targets = Some(targets);
        self.size = (width, height);
        tracing::debug!(target: "chronos::postprocess", width, height, "composer targets resized");
        Ok(())
    }

    /// 场景颜色目标（尚未 `resize` 时为 `None`）
    pub fn scene_color(&self) -> Option<TextureHandle> {
        self.targets.as_ref().map(|t| t.color[0].handle())
    }

    pub fn scene_depth(&self) -> Option<TextureHandle> {
        self.targets.as_ref().map(|t| t.depth.handle())
    }

    /// 按需重建效果通道并写入本帧 uniform
    pub fn prepare(&mut self, gpu: &mut GpuContext, time: f32) -> RenderResult<()> {
        if self.passes_dirty {
            let mut passes = Vec::new();
            for effect in self.config.effects() {
                let program = gpu.program(effect.key(), || effect.descriptor())?;
                let uniforms = gpu.create_buffer(
                    effect.key(),
                    std::mem::size_of::<EffectUniforms>() as u64,
                    BufferUsage::UNIFORM,
                )?;
                passes.push(EffectPass {
                    effect,
                    program,
                    uniforms,
                });
            }
            self.passes = passes;
            self.passes_dirty = false;
            tracing::debug!(target: "chronos::postprocess", passes = self.passes.len(), "post-processing chain rebuilt");
        }
        let resolution = [self.size.0 as f32, self.size.1 as f32];
        for pass in &self.passes {
            let uniforms = EffectUniforms {
                params: self.config.params(pass.effect),
                resolution,
                time,
                _padding: 0.0,
            };
            gpu.write_buffer(&pass.uniforms, 0, bytemuck::bytes_of(&uniforms))?;
        }
        Ok(())
    }

    /// 编码全部效果通道，最后一个写入主输出
    pub fn encode(&self, out: &mut Vec<RenderCommand>) {
        let Some(targets) = &self.targets else {
            return;
        };
        let last = self.passes.len().saturating_sub(1);
        for (index, pass) in self.passes.iter().enumerate() {
            let source = targets.color[index % 2].handle();
            let destination = if index == last {
                RenderTarget::Surface
            } else {
                RenderTarget::Texture(targets.color[(index + 1) % 2].handle())
            };
            out.push(RenderCommand::BeginRenderPass {
                label: pass.effect.key().to_string(),
                color: vec![destination],
                depth: None,
                clear_color: None,
                clear_depth: false,
            });
            out.push(RenderCommand::Draw {
                program: pass.program.handle(),
                vertex_buffers: Vec::new(),
                bindings: vec![
                    BindingResource::Buffer(pass.uniforms.handle()),
                    BindingResource::Texture(source),
                ],
                vertex_count: 3,
                instance_count: 1,
                topology: Topology::TriangleList,
            });
            out.push(RenderCommand::EndRenderPass);
        }
    }

    /// 释放全部目标与通道
    pub fn dispose(&mut self) {
        self.passes.clear();
        self.targets = None;
        self.size = (0, 0);
        self.passes_dirty = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::backend::NullBackend;

    #[test]
    fn test_default_values() {
        let config = PostProcessConfig::default();
        assert_eq!(config.bloom.intensity, 0.5);
        assert_eq!(config.bloom.threshold, 0.8);
        assert_eq!(config.chromatic_aberration.offset, 0.001);
        assert_eq!(config.vignette.darkness, 0.4);
        assert_eq!(config.noise.intensity, 0.03);
        assert_eq!(
            config.effects(),
            vec![Effect::Bloom, Effect::Vignette, Effect::ToneMapping, Effect::Fxaa]
        );
        assert_eq!(std::mem::size_of::<EffectUniforms>(), 32);
    }

    #[test]
    fn test_presets_parse() {
        for preset in PostProcessPreset::ALL {
            assert_eq!(preset.key().parse::<PostProcessPreset>(), Ok(preset));
        }
        assert!("vaporwave".parse::<PostProcessPreset>().is_err());
        assert!(PostProcessPreset::Cyberpunk.config().chromatic_aberration.enabled);
        assert_eq!(
            PostProcessPreset::Performance.config().effects(),
            vec![Effect::ToneMapping]
        );
    }

    #[test]
    fn test_disabled_config_has_no_effects() {
        let config = PostProcessConfig {
            enabled: false,
            ..PostProcessConfig::default()
        };
        assert!(config.effects().is_empty());
        assert!(!PostProcessComposer::new(config).is_active());
    }

    #[test]
    fn test_ping_pong_ends_on_surface() {
        let mut gpu = GpuContext::new(Box::new(NullBackend::new()));
        let mut composer = PostProcessComposer::new(PostProcessConfig::default());
        composer.resize(&mut gpu, 320, 180).unwrap();
        composer.prepare(&mut gpu, 0.5).unwrap();
        assert_eq!(composer.pass_count(), 4);

        let mut out = Vec::new();
        composer.encode(&mut out);
        let targets: Vec<RenderTarget> = out
            .iter()
            .filter_map(|command| match command {
                RenderCommand::BeginRenderPass { color, .. } => color.first().copied(),
                _ => None,
            })
            .collect();
        assert_eq!(targets.len(), 4);
        assert_eq!(targets.last(), Some(&RenderTarget::Surface));
        assert_ne!(targets[0], targets[1]);
        assert_eq!(targets[0], targets[2]);
        let first_source = out.iter().find_map(|command| match command {
            RenderCommand::Draw { bindings, .. } => bindings.get(1).copied(),
            _ => None,
        });
        assert_eq!(
            first_source,
            composer.scene_color().map(BindingResource::Texture)
        );
    }

    #[test]
    fn test_resize_replaces_targets() {
        let backend = NullBackend::new();
        let recording = backend.recording();
        let mut gpu = GpuContext::new(Box::new(backend));
        let mut composer = PostProcessComposer::new(PostProcessConfig::default());
        composer.resize(&mut gpu, 100, 100).unwrap();
        let old = composer.scene_color().unwrap();
        composer.resize(&mut gpu, 100, 100).unwrap();
        assert_eq!(composer.scene_color(), Some(old));

        composer.resize(&mut gpu, 200, 50).unwrap();
        gpu.collect_garbage();
        assert_eq!(recording.borrow().destroy_count(old), 1);
        assert_eq!(composer.size(), (200, 50));

        composer.dispose();
        gpu.collect_garbage();
        assert!(recording.borrow().live_textures().is_empty());
    }
}
