//! 核心模块
//!
//! 包含引擎的基础设施：
//! - `error` - 错误类型定义
//! - `logging` - tracing 日志初始化
//! - `macros` - 通用宏
//! - `utils` - 颜色解析与插值工具

pub mod error;
pub mod logging;
#[macro_use]
pub mod macros;
pub mod utils;

// 重新导出错误类型
pub use error::{
    CallbackError, EngineError, EngineResult, ParticleError, ParticleResult, RenderError, RenderResult,
    ShaderError, ShaderResult,
};
pub use logging::init_logging;
