//! GLSL 函数库
//!
//! 纯文本片段，无副作用。着色器源码中用 `#include <name>` 引用，
//! 由 [`compose`] 展开（每个片段在一个程序中只展开一次）。

use crate::core::error::{ShaderError, ShaderResult};
use std::collections::HashSet;

/// 命名 GLSL 片段
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShaderChunk {
    pub name: &'static str,
    pub source: &'static str,
}

/// 噪声：hash、值噪声、梯度噪声、FBM
pub const NOISE: ShaderChunk = ShaderChunk {
    name: "noise",
    source: r#"
float hash(vec2 p) {
    return fract(sin(dot(p, vec2(127.1, 311.7))) * 43758.5453);
}

float hash13(vec3 p) {
    return fract(sin(dot(p, vec3(127.1, 311.7, 74.7))) * 43758.5453123);
}

vec3 hash33(vec3 p) {
    p = vec3(
        dot(p, vec3(127.1, 311.7, 74.7)),
        dot(p, vec3(269.5, 183.3, 246.1)),
        dot(p, vec3(113.5, 271.9, 124.6))
    );
    return -1.0 + 2.0 * fract(sin(p) * 43758.5453123);
}

float noise(vec2 p) {
    vec2 i = floor(p);
    vec2 f = fract(p);
    f = f * f * (3.0 - 2.0 * f);
    float a = hash(i);
    float b = hash(i + vec2(1.0, 0.0));
    float c = hash(i + vec2(0.0, 1.0));
    float d = hash(i + vec2(1.0, 1.0));
    return mix(mix(a, b, f.x), mix(c, d, f.x), f.y);
}

float gradientNoise(vec3 p) {
    vec3 i = floor(p);
    vec3 f = fract(p);
    vec3 u = f * f * f * (f * (f * 6.0 - 15.0) + 10.0);
    return mix(
        mix(
            mix(dot(hash33(i + vec3(0.0, 0.0, 0.0)), f - vec3(0.0, 0.0, 0.0)),
                dot(hash33(i + vec3(1.0, 0.0, 0.0)), f - vec3(1.0, 0.0, 0.0)), u.x),
            mix(dot(hash33(i + vec3(0.0, 1.0, 0.0)), f - vec3(0.0, 1.0, 0.0)),
                dot(hash33(i + vec3(1.0, 1.0, 0.0)), f - vec3(1.0, 1.0, 0.0)), u.x), u.y),
        mix(
            mix(dot(hash33(i + vec3(0.0, 0.0, 1.0)), f - vec3(0.0, 0.0, 1.0)),
                dot(hash33(i + vec3(1.0, 0.0, 1.0)), f - vec3(1.0, 0.0, 1.0)), u.x),
            mix(dot(hash33(i + vec3(0.0, 1.0, 1.0)), f - vec3(0.0, 1.0, 1.0)),
                dot(hash33(i + vec3(1.0, 1.0, 1.0)), f - vec3(1.0, 1.0, 1.0)), u.x), u.y),
        u.z);
}

float fbm(vec2 p) {
    float value = 0.0;
    float amplitude = 0.5;
    for (int i = 0; i < 5; i++) {
        value += amplitude * noise(p);
        p *= 2.0;
        amplitude *= 0.5;
    }
    return value;
}

float fbm3(vec3 p) {
    float value = 0.0;
    float amplitude = 0.5;
    float total = 0.0;
    for (int i = 0; i < 4; i++) {
        value += amplitude * gradientNoise(p);
        total += amplitude;
        p *= 2.0;
        amplitude *= 0.5;
    }
    return value / total;
}
"#,
};

/// 颜色：HSL 转换、余弦调色板、品牌彩虹
pub const COLOR: ShaderChunk = ShaderChunk {
    name: "color",
    source: r#"
const vec3 CHRONOS_VIOLET = vec3(0.545, 0.0, 1.0);
const vec3 CHRONOS_GOLD = vec3(1.0, 0.843, 0.0);
const vec3 CHRONOS_PLASMA = vec3(1.0, 0.078, 0.576);
const vec3 CHRONOS_CYAN = vec3(0.024, 0.714, 0.831);

vec3 hsl2rgb(vec3 c) {
    vec3 rgb = clamp(abs(mod(c.x * 6.0 + vec3(0.0, 4.0, 2.0), 6.0) - 3.0) - 1.0, 0.0, 1.0);
    return c.z + c.y * (rgb - 0.5) * (1.0 - abs(2.0 * c.z - 1.0));
}

vec3 palette(float t, vec3 a, vec3 b, vec3 c, vec3 d) {
    return a + b * cos(6.28318 * (c * t + d));
}

vec3 rainbow(float t) {
    t = fract(t) * 4.0;
    float f = fract(t);
    f = f * f * (3.0 - 2.0 * f);
    if (t < 1.0) {
        return mix(vec3(0.0), CHRONOS_VIOLET, f);
    }
    if (t < 2.0) {
        return mix(CHRONOS_VIOLET, CHRONOS_GOLD, f);
    }
    if (t < 3.0) {
        return mix(CHRONOS_GOLD, CHRONOS_PLASMA, f);
    }
    return mix(CHRONOS_PLASMA, CHRONOS_VIOLET, f);
}

float luminance(vec3 color) {
    return dot(color, vec3(0.2126, 0.7152, 0.0722));
}
"#,
};

/// 光照：菲涅尔、Blinn-Phong、边缘光
pub const LIGHTING: ShaderChunk = ShaderChunk {
    name: "lighting",
    source: r#"
float fresnel(vec3 normal, vec3 viewDir, float power) {
    return pow(1.0 - clamp(abs(dot(normal, viewDir)), 0.0, 1.0), power);
}

float schlick(float cosTheta, float f0) {
    return f0 + (1.0 - f0) * pow(1.0 - cosTheta, 5.0);
}

vec3 blinnPhong(vec3 normal, vec3 viewDir, vec3 lightDir, vec3 lightColor, float shininess) {
    float diffuse = max(dot(normal, lightDir), 0.0);
    vec3 halfway = normalize(lightDir + viewDir);
    float specular = pow(max(dot(normal, halfway), 0.0), shininess);
    return lightColor * (diffuse + specular);
}

vec3 rimLight(vec3 normal, vec3 viewDir, vec3 color, float power) {
    return color * fresnel(normal, viewDir, power);
}
"#,
};

/// 效果：扫描线、故障、暗角、颗粒
pub const EFFECTS: ShaderChunk = ShaderChunk {
    name: "effects",
    source: r#"
float scanline(float y, float time, float speed, float density) {
    float s = sin((y + time * speed) * density);
    return smoothstep(0.3, 0.7, s * 0.5 + 0.5);
}

float glitch(vec2 uv, float time) {
    float n = fract(sin(dot(vec2(floor(uv.y * 100.0), floor(time * 10.0)), vec2(127.1, 311.7))) * 43758.5453);
    return step(0.98, n);
}

float vignette(vec2 uv, float offset, float darkness) {
    vec2 centered = (uv - vec2(0.5)) * vec2(offset);
    return clamp(1.0 - dot(centered, centered) * darkness, 0.0, 1.0);
}

float grain(vec2 uv, float time) {
    return fract(sin(dot(uv + vec2(time), vec2(12.9898, 78.233))) * 43758.5453) - 0.5;
}
"#,
};

/// 顶点变换：旋转、波动、扭曲
pub const VERTEX: ShaderChunk = ShaderChunk {
    name: "vertex",
    source: r#"
mat2 rotate2d(float angle) {
    float s = sin(angle);
    float c = cos(angle);
    return mat2(c, -s, s, c);
}

vec3 waveDisplace(vec3 position, vec3 normal, float time, float amplitude, float frequency) {
    float wave = sin(position.x * frequency + time) * cos(position.y * frequency + time * 0.7);
    return position + normal * wave * amplitude;
}

vec3 twist(vec3 position, float amount) {
    vec2 xz = rotate2d(position.y * amount) * position.xz;
    return vec3(xz.x, position.y, xz.y);
}
"#,
};

/// 片元阶段的标准插值变量（与 [`STANDARD_VERTEX`] 对应）
pub const VARYINGS: ShaderChunk = ShaderChunk {
    name: "varyings",
    source: r#"
layout(location = 0) in vec3 vPosition;
layout(location = 1) in vec3 vNormal;
layout(location = 2) in vec3 vWorldPosition;
layout(location = 3) in vec2 vUv;
layout(location = 4) in vec3 vViewPosition;
"#,
};

/// 全部片段
pub const CHUNKS: [ShaderChunk; 6] = [NOISE, COLOR, LIGHTING, EFFECTS, VERTEX, VARYINGS];

/// 标准顶点程序：输出世界坐标、法线、UV
pub const STANDARD_VERTEX: &str = r#"
layout(location = 0) out vec3 vPosition;
layout(location = 1) out vec3 vNormal;
layout(location = 2) out vec3 vWorldPosition;
layout(location = 3) out vec2 vUv;
layout(location = 4) out vec3 vViewPosition;

void main() {
    vUv = uv;
    vNormal = normalize(normalMatrix * normal);
    vPosition = position;
    vec4 worldPosition = modelMatrix * vec4(position, 1.0);
    vWorldPosition = worldPosition.xyz;
    vec4 mvPosition = viewMatrix * worldPosition;
    vViewPosition = -mvPosition.xyz;
    gl_Position = projectionMatrix * mvPosition;
}
"#;

pub fn chunk(name: &str) -> Option<ShaderChunk> {
    CHUNKS.iter().copied().find(|chunk| chunk.name == name)
}

fn include_target(line: &str) -> Option<&str> {
    let rest = line.trim().strip_prefix("#include")?;
    let rest = rest.trim();
    rest.strip_prefix('<')
        .and_then(|r| r.strip_suffix('>'))
        .or_else(|| rest.strip_prefix('"').and_then(|r| r.strip_suffix('"')))
        .map(str::trim)
}

/// 展开 `#include <chunk>` 指令
pub fn compose(source: &str) -> ShaderResult<String> {
    let mut included = HashSet::new();
    let mut out = String::with_capacity(source.len());
    expand(source, &mut included, &mut out)?;
    Ok(out)
}

fn expand(source: &str, included: &mut HashSet<&'static str>, out: &mut String) -> ShaderResult<()> {
    for line in source.lines() {
        match include_target(line) {
            Some(name) => {
                let chunk = chunk(name).ok_or_else(|| {
                    ShaderError::InvalidSource(format!("unknown shader chunk `{name}`"))
                })?;
                if included.insert(chunk.name) {
                    expand(chunk.source, included, out)?;
                }
            }
            None => {
                out.push_str(line);
                out.push('\n');
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compose_expands_once() {
        let source = "#include <noise>\n#include <noise>\nvoid main() {}\n";
        let composed = compose(source).unwrap();
        assert_eq!(composed.matches("float fbm(vec2 p)").count(), 1);
        assert!(composed.ends_with("void main() {}\n"));
    }

    #[test]
    fn test_compose_accepts_quoted_include() {
        let composed = compose("  #include \"lighting\"").unwrap();
        assert!(composed.contains("float fresnel("));
    }

    #[test]
    fn test_unknown_chunk_rejected() {
        assert!(matches!(
            compose("#include <nope>"),
            Err(ShaderError::InvalidSource(_))
        ));
    }

    #[test]
    fn test_chunks_are_unique() {
        let names: HashSet<_> = CHUNKS.iter().map(|c| c.name).collect();
        assert_eq!(names.len(), CHUNKS.len());
    }
}
