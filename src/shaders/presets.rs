//! 着色器预设
//!
//! 预设是命名的配置条目而不是子类：选择预设返回同一个 `ShaderMaterial` 类型，
//! 只是源码和 uniform 不同。

use super::material::{ShaderConfig, ShaderMaterial, Side};
use super::uniforms::UniformValue;
use crate::core::error::{ShaderError, ShaderResult};
use crate::render::backend::BlendMode;
use glam::{Vec2, Vec3};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// 着色器预设
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShaderPreset {
    Holographic,
    Plasma,
    GradientFlow,
    Glass,
    NoiseDistortion,
    WireframeGlow,
    DataStream,
}

impl ShaderPreset {
    pub const ALL: [ShaderPreset; 7] = [
        ShaderPreset::Holographic,
        ShaderPreset::Plasma,
        ShaderPreset::GradientFlow,
        ShaderPreset::Glass,
        ShaderPreset::NoiseDistortion,
        ShaderPreset::WireframeGlow,
        ShaderPreset::DataStream,
    ];

    pub fn key(&self) -> &'static str {
        match self {
            ShaderPreset::Holographic => "holographic",
            ShaderPreset::Plasma => "plasma",
            ShaderPreset::GradientFlow => "gradientFlow",
            ShaderPreset::Glass => "glass",
            ShaderPreset::NoiseDistortion => "noiseDistortion",
            ShaderPreset::WireframeGlow => "wireframeGlow",
            ShaderPreset::DataStream => "dataStream",
        }
    }

    /// 预设的完整配置（默认 uniform）
    pub fn config(&self) -> ShaderConfig {
        let base = ShaderConfig {
            name: self.key().to_string(),
            ..ShaderConfig::default()
        };
        match self {
            ShaderPreset::Holographic => ShaderConfig {
                fragment_shader: HOLOGRAPHIC_FRAGMENT.to_string(),
                transparent: true,
                depth_write: false,
                blending: BlendMode::Additive,
                side: Side::Double,
                ..base
            }
            .with_uniform("uTime", 0.0f32)
            .with_uniform("uHoloIntensity", 1.0f32)
            .with_uniform("uScanlineSpeed", 2.0f32)
            .with_uniform("uRainbowScale", 2.0f32),

            ShaderPreset::Plasma => ShaderConfig {
                fragment_shader: PLASMA_FRAGMENT.to_string(),
                ..base
            }
            .with_uniform("uTime", 0.0f32)
            .with_uniform("uSpeed", 1.0f32)
            .with_uniform("uScale", 3.0f32)
            .with_uniform("uColor1", Vec3::new(0.545, 0.0, 1.0))
            .with_uniform("uColor2", Vec3::new(1.0, 0.078, 0.576))
            .with_uniform("uColor3", Vec3::new(0.024, 0.714, 0.831)),

            ShaderPreset::GradientFlow => ShaderConfig {
                fragment_shader: GRADIENT_FLOW_FRAGMENT.to_string(),
                ..base
            }
            .with_uniform("uTime", 0.0f32)
            .with_uniform("uSpeed", 0.3f32)
            .with_uniform("uColorA", Vec3::new(0.063, 0.0, 0.188))
            .with_uniform("uColorB", Vec3::new(0.545, 0.0, 1.0))
            .with_uniform("uColorC", Vec3::new(1.0, 0.843, 0.0))
            .with_uniform("uDirection", Vec2::new(1.0, 0.5)),

            ShaderPreset::Glass => ShaderConfig {
                fragment_shader: GLASS_FRAGMENT.to_string(),
                transparent: true,
                depth_write: false,
                blending: BlendMode::Alpha,
                ..base
            }
            .with_uniform("uTime", 0.0f32)
            .with_uniform("uIOR", 1.5f32)
            .with_uniform("uThickness", 0.5f32)
            .with_uniform("uRoughness", 0.1f32)
            .with_uniform("uTint", Vec3::new(0.9, 0.95, 1.0))
            .with_uniform("uTransmission", 0.9f32)
            .with_uniform("uChromaticAberration", 0.02f32),

            ShaderPreset::NoiseDistortion => ShaderConfig {
                vertex_shader: NOISE_DISTORTION_VERTEX.to_string(),
                fragment_shader: NOISE_DISTORTION_FRAGMENT.to_string(),
                ..base
            }
            .with_uniform("uTime", 0.0f32)
            .with_uniform("uDistortion", 0.3f32)
            .with_uniform("uFrequency", 1.5f32)
            .with_uniform("uColor", Vec3::new(0.545, 0.0, 1.0)),

            ShaderPreset::WireframeGlow => ShaderConfig {
                fragment_shader: WIREFRAME_GLOW_FRAGMENT.to_string(),
                transparent: true,
                depth_write: false,
                blending: BlendMode::Additive,
                side: Side::Double,
                ..base
            }
            .with_uniform("uTime", 0.0f32)
            .with_uniform("uColor", Vec3::new(0.024, 0.714, 0.831))
            .with_uniform("uGlowIntensity", 1.5f32)
            .with_uniform("uLineWidth", 0.03f32)
            .with_uniform("uGridScale", 10.0f32),

            ShaderPreset::DataStream => ShaderConfig {
                fragment_shader: DATA_STREAM_FRAGMENT.to_string(),
                transparent: true,
                depth_write: false,
                blending: BlendMode::Additive,
                ..base
            }
            .with_uniform("uTime", 0.0f32)
            .with_uniform("uSpeed", 1.0f32)
            .with_uniform("uDensity", 30.0f32)
            .with_uniform("uColor", Vec3::new(0.0, 1.0, 0.6)),
        }
    }
}

impl fmt::Display for ShaderPreset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

impl FromStr for ShaderPreset {
    type Err = ShaderError;

    /// 接受 `gradientFlow`、`gradient-flow`、`gradient_flow` 等写法
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized: String = s
            .chars()
            .filter(|c| *c != '-' && *c != '_')
            .flat_map(char::to_lowercase)
            .collect();
        ShaderPreset::ALL
            .into_iter()
            .find(|preset| preset.key().to_ascii_lowercase() == normalized)
            .ok_or_else(|| ShaderError::UnknownPreset(s.to_string()))
    }
}

/// 按预设创建材质，`overrides` 中的键覆盖默认值
///
/// 覆盖已声明的 uniform 时类型必须一致；未声明的键作为新 uniform 加入。
pub fn create_preset_material(
    preset: ShaderPreset,
    overrides: &BTreeMap<String, UniformValue>,
) -> ShaderResult<ShaderMaterial> {
    let mut config = preset.config();
    for (name, value) in overrides {
        if let Some(default) = config.uniforms.get(name) {
            if default.uniform_type() != value.uniform_type() {
                return Err(ShaderError::TypeMismatch {
                    name: name.clone(),
                    expected: default.uniform_type().name(),
                    actual: value.uniform_type().name(),
                });
            }
        }
        config.uniforms.insert(name.clone(), *value);
    }
    ShaderMaterial::new(config)
}

/// 按字符串键创建材质
pub fn create_preset_material_by_key(
    key: &str,
    overrides: &BTreeMap<String, UniformValue>,
) -> ShaderResult<ShaderMaterial> {
    create_preset_material(key.parse()?, overrides)
}

const HOLOGRAPHIC_FRAGMENT: &str = r#"
#include <varyings>
#include <noise>
#include <color>
#include <lighting>
#include <effects>

layout(location = 0) out vec4 fragColor;

void main() {
    vec3 N = normalize(vNormal);
    vec3 V = normalize(cameraPosition - vWorldPosition);
    float NdotV = dot(N, V);
    float angle = acos(clamp(abs(NdotV), 0.0, 1.0));

    float phase = angle * uRainbowScale + uTime * 0.2;
    phase += (vUv.x + vUv.y) * 2.0;
    phase += fbm(vUv * 10.0 + uTime * 0.1) * 0.5;
    vec3 color = rainbow(phase) * uHoloIntensity;

    float rim = fresnel(N, V, 3.0);
    color += CHRONOS_VIOLET * rim;
    color *= 0.8 + scanline(vWorldPosition.y, uTime, uScanlineSpeed, 50.0) * 0.2;

    if (glitch(vUv, uTime) > 0.5) {
        color = CHRONOS_PLASMA;
    }

    float edge = 1.0 - smoothstep(0.0, 0.3, abs(NdotV));
    color += CHRONOS_GOLD * edge * 0.3;

    float alpha = (0.6 + rim * 0.4) * uHoloIntensity;
    fragColor = vec4(color, alpha);
}
"#;

const PLASMA_FRAGMENT: &str = r#"
#include <varyings>

layout(location = 0) out vec4 fragColor;

void main() {
    vec2 p = vUv * uScale;
    float t = uTime * uSpeed;
    float v = sin(p.x + t);
    v += sin((p.y + t) * 0.5);
    v += sin((p.x + p.y + t) * 0.5);
    vec2 c = p + vec2(sin(t / 3.0), cos(t / 2.0)) * uScale * 0.5;
    v += sin(sqrt(c.x * c.x + c.y * c.y + 1.0) + t);
    v *= 0.5;

    vec3 color = mix(uColor1, uColor2, sin(v * 3.14159) * 0.5 + 0.5);
    color = mix(color, uColor3, cos(v * 3.14159 + t) * 0.5 + 0.5);
    fragColor = vec4(color, 1.0);
}
"#;

const GRADIENT_FLOW_FRAGMENT: &str = r#"
#include <varyings>
#include <noise>

layout(location = 0) out vec4 fragColor;

void main() {
    vec2 dir = normalize(uDirection);
    float t = uTime * uSpeed;
    float flow = dot(vUv, dir) + fbm(vUv * 3.0 + vec2(t)) * 0.35 + t * 0.1;
    float f = fract(flow);
    vec3 low = mix(uColorA, uColorB, smoothstep(0.0, 0.5, f));
    vec3 high = mix(uColorB, uColorC, smoothstep(0.5, 1.0, f));
    vec3 color = mix(low, high, step(0.5, f));
    fragColor = vec4(color, 1.0);
}
"#;

const GLASS_FRAGMENT: &str = r#"
#include <varyings>
#include <lighting>

layout(location = 0) out vec4 fragColor;

void main() {
    vec3 N = normalize(vNormal);
    vec3 V = normalize(cameraPosition - vWorldPosition);
    float cosTheta = clamp(dot(N, V), 0.0, 1.0);

    float f0 = pow((uIOR - 1.0) / (uIOR + 1.0), 2.0);
    float reflectance = schlick(cosTheta, f0);

    vec3 refracted = refract(-V, N, 1.0 / uIOR);
    float dispersion = uChromaticAberration * uThickness;
    vec3 spectrum = vec3(
        0.5 + 0.5 * refracted.x + dispersion,
        0.5 + 0.5 * refracted.y,
        0.5 + 0.5 * refracted.z - dispersion
    );

    vec3 transmitted = uTint * mix(vec3(1.0), spectrum, 0.25 + uRoughness * 0.5);
    vec3 reflected = vec3(0.95, 0.97, 1.0) * (reflectance + fresnel(N, V, 5.0) * 0.5);
    vec3 color = mix(reflected, transmitted, uTransmission * (1.0 - reflectance));

    float alpha = clamp(1.0 - uTransmission + reflectance + uThickness * 0.2, 0.05, 1.0);
    fragColor = vec4(color, alpha);
}
"#;

const NOISE_DISTORTION_VERTEX: &str = r#"
#include <noise>

layout(location = 0) out vec3 vPosition;
layout(location = 1) out vec3 vNormal;
layout(location = 2) out vec3 vWorldPosition;
layout(location = 3) out vec2 vUv;
layout(location = 4) out vec3 vViewPosition;
layout(location = 5) out float vDisplacement;

void main() {
    vUv = uv;
    float n = fbm3(position * uFrequency + vec3(uTime * 0.2));
    vDisplacement = n;
    vec3 displaced = position + normal * n * uDistortion;
    vPosition = displaced;
    vNormal = normalize(normalMatrix * normal);
    vec4 worldPosition = modelMatrix * vec4(displaced, 1.0);
    vWorldPosition = worldPosition.xyz;
    vec4 mvPosition = viewMatrix * worldPosition;
    vViewPosition = -mvPosition.xyz;
    gl_Position = projectionMatrix * mvPosition;
}
"#;

const NOISE_DISTORTION_FRAGMENT: &str = r#"
#include <varyings>
#include <lighting>

layout(location = 5) in float vDisplacement;
layout(location = 0) out vec4 fragColor;

void main() {
    vec3 N = normalize(vNormal);
    vec3 V = normalize(cameraPosition - vWorldPosition);
    vec3 color = uColor * (0.6 + vDisplacement * 0.8);
    color += rimLight(N, V, vec3(1.0), 2.5) * 0.4;
    fragColor = vec4(color, 1.0);
}
"#;

const WIREFRAME_GLOW_FRAGMENT: &str = r#"
#include <varyings>
#include <lighting>

layout(location = 0) out vec4 fragColor;

void main() {
    vec2 grid = abs(fract(vUv * uGridScale - 0.5) - 0.5);
    float line = 1.0 - smoothstep(0.0, uLineWidth, min(grid.x, grid.y));
    float pulse = 0.75 + 0.25 * sin(uTime * 2.0 + vWorldPosition.y * 3.0);

    vec3 N = normalize(vNormal);
    vec3 V = normalize(cameraPosition - vWorldPosition);
    vec3 color = uColor * (line * uGlowIntensity * pulse + fresnel(N, V, 2.0) * 0.3);
    fragColor = vec4(color, clamp(line + 0.1, 0.0, 1.0));
}
"#;

const DATA_STREAM_FRAGMENT: &str = r#"
#include <varyings>
#include <noise>

layout(location = 0) out vec4 fragColor;

void main() {
    float column = floor(vUv.x * uDensity);
    float speed = 0.5 + hash(vec2(column, 0.0)) * uSpeed;
    float y = fract(vUv.y + uTime * speed * 0.2 + hash(vec2(column, 1.0)));
    float cell = floor(y * uDensity);
    float glyph = step(0.5, hash(vec2(column, cell + floor(uTime * 8.0))));
    float trail = pow(y, 3.0);
    float intensity = glyph * trail;
    fragColor = vec4(uColor * intensity, intensity);
}
"#;
