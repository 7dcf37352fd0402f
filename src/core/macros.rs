//! 核心宏定义
//!
//! 配置结构体和预设表大量使用字段默认值，统一用宏生成 `Default` 实现。

/// 为结构体实现Default trait的宏
///
/// 使用示例:
/// ```rust
/// use chronos_render::impl_default;
///
/// struct BloomSettings {
///     intensity: f32,
///     label: String,
/// }
///
/// impl_default!(BloomSettings {
///     intensity: 0.5,
///     label: String::new(),
/// });
/// ```
#[macro_export]
macro_rules! impl_default {
    ($struct_name:ident {
        $($field:ident: $value:expr),* $(,)?
    }) => {
        impl Default for $struct_name {
            fn default() -> Self {
                Self {
                    $($field: $value),*
                }
            }
        }
    };
}

#[cfg(test)]
mod tests {
    struct Window {
        width: u32,
        title: String,
    }

    impl_default!(Window {
        width: 1280,
        title: "chronos".to_string(),
    });

    #[test]
    fn test_impl_default() {
        let w = Window::default();
        assert_eq!(w.width, 1280);
        assert_eq!(w.title, "chronos");
    }
}
