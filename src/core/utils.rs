//! 核心工具函数
//!
//! 颜色解析与着色器同款的标量插值函数，供粒子、环境预设和测试共用。

use glam::Vec3;

/// 解析 `#rrggbb` / `#rgb` 十六进制颜色为线性 0..1 分量
///
/// # 示例
///
/// ```rust
/// use chronos_render::core::utils::parse_hex_color;
///
/// let violet = parse_hex_color("#8b5cf6").unwrap();
/// assert!((violet.z - 246.0 / 255.0).abs() < 1e-6);
/// assert!(parse_hex_color("violet").is_none());
/// ```
pub fn parse_hex_color(hex: &str) -> Option<Vec3> {
    let digits = hex.trim().strip_prefix('#')?;
    if !digits.chars().all(|c| c.is_ascii_hexdigit()) {
        return None;
    }
    let channel = |s: &str| u8::from_str_radix(s, 16).ok().map(|v| v as f32 / 255.0);
    match digits.len() {
        6 => Some(Vec3::new(
            channel(&digits[0..2])?,
            channel(&digits[2..4])?,
            channel(&digits[4..6])?,
        )),
        3 => {
            let short = |i: usize| channel(&digits[i..i + 1].repeat(2));
            Some(Vec3::new(short(0)?, short(1)?, short(2)?))
        }
        _ => None,
    }
}

/// 与 GLSL `smoothstep` 相同
///
/// # 示例
///
/// ```rust
/// use chronos_render::core::utils::smoothstep;
///
/// assert_eq!(smoothstep(0.0, 1.0, 0.5), 0.5);
/// assert_eq!(smoothstep(0.0, 1.0, 2.0), 1.0);
/// ```
pub fn smoothstep(edge0: f32, edge1: f32, x: f32) -> f32 {
    let t = ((x - edge0) / (edge1 - edge0)).clamp(0.0, 1.0);
    t * t * (3.0 - 2.0 * t)
}

/// 线性插值
pub fn lerp(a: f32, b: f32, t: f32) -> f32 {
    a + (b - a) * t
}

/// 与着色器 `fract(sin(n) * 43758.5453123)` 相同的哈希
pub fn hash(n: f32) -> f32 {
    let v = n.sin() * 43758.547;
    v - v.floor()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_hex_color() {
        assert_eq!(parse_hex_color("#ffffff"), Some(Vec3::ONE));
        assert_eq!(parse_hex_color("#fff"), Some(Vec3::ONE));
        assert_eq!(parse_hex_color("#000"), Some(Vec3::ZERO));
        let cyan = parse_hex_color(" #06b6d4 ").unwrap();
        assert!((cyan.y - 182.0 / 255.0).abs() < 1e-6);
        assert!(parse_hex_color("ffffff").is_none());
        assert!(parse_hex_color("#ff").is_none());
        assert!(parse_hex_color("#gg0000").is_none());
    }

    #[test]
    fn test_hash_in_unit_range() {
        for i in 0..1000 {
            let h = hash(i as f32 * 0.37);
            assert!((0.0..1.0).contains(&h));
        }
    }

    #[test]
    fn test_smoothstep_edges() {
        assert_eq!(smoothstep(0.0, 0.1, -1.0), 0.0);
        assert_eq!(smoothstep(0.8, 1.0, 1.0), 1.0);
        assert!((lerp(2.0, 4.0, 0.25) - 2.5).abs() < 1e-6);
    }
}
