//! 统一错误处理模块
//!
//! 提供渲染引擎范围内的统一错误类型定义
//!
//! ## 错误分类
//!
//! - **能力缺失**: WebGPU 适配器/设备不可用，通过能力对象或 `false` 返回，不走错误通道
//! - **上下文丢失**: GPU 上下文丢失后当前后端实例失效，必须 `dispose()` 后重新 `initialize()`
//! - **配置不匹配**: 写入未声明的 uniform，静默忽略
//! - **缓冲区越界**: 粒子缓冲区按 `count` 预分配，运行时不存在越界失败

use thiserror::Error;

/// 引擎核心错误类型
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Initialization error: {0}")]
    Init(String),

    #[error("Render error: {0}")]
    Render(#[from] RenderError),

    #[error("Shader error: {0}")]
    Shader(#[from] ShaderError),

    #[error("Particle error: {0}")]
    Particle(#[from] ParticleError),

    #[error("Config error: {0}")]
    Config(#[from] crate::config::ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// 渲染系统错误
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RenderError {
    #[error("Failed to request adapter: no compatible GPU found")]
    NoAdapter,

    #[error("Failed to request device: {0}")]
    DeviceRequest(String),

    #[error("Required feature not available: {0}")]
    MissingFeature(String),

    #[error("Failed to create shader: {0}")]
    ShaderCompilation(String),

    #[error("Failed to create pipeline: {0}")]
    PipelineCreation(String),

    #[error("Unknown resource handle: {0}")]
    UnknownResource(String),

    #[error("GPU context lost")]
    ContextLost,

    #[error("Engine not initialized")]
    NotInitialized,

    #[error("Invalid render state: {0}")]
    InvalidState(String),
}

/// 着色器/材质错误
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ShaderError {
    #[error("Unknown shader preset: {0}")]
    UnknownPreset(String),

    #[error("Uniform `{name}` expects {expected}, got {actual}")]
    TypeMismatch {
        name: String,
        expected: &'static str,
        actual: &'static str,
    },

    #[error("Invalid shader source: {0}")]
    InvalidSource(String),
}

/// 粒子系统错误
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ParticleError {
    #[error("Particle count must be greater than zero")]
    EmptyArena,

    #[error("Invalid range for {field}: [{min}, {max}]")]
    InvalidRange { field: &'static str, min: f32, max: f32 },

    #[error("Invalid particle color: {0}")]
    InvalidColor(String),

    #[error("Unknown particle preset: {0}")]
    UnknownPreset(String),

    #[error("Particle index {index} out of bounds (count {count})")]
    IndexOutOfBounds { index: usize, count: usize },
}

/// 帧回调错误（只影响该回调本身）
#[derive(Error, Debug, Clone, PartialEq)]
#[error("Frame callback failed: {0}")]
pub struct CallbackError(pub String);

impl CallbackError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// 引擎结果类型别名
pub type EngineResult<T> = Result<T, EngineError>;
pub type RenderResult<T> = Result<T, RenderError>;
pub type ShaderResult<T> = Result<T, ShaderError>;
pub type ParticleResult<T> = Result<T, ParticleError>;
