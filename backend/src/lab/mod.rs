//! Lab 模块：按名称解析插件、读取描述、以 SSE 流式执行

mod builtin;
mod executor;
mod handlers;
pub mod registry;
pub mod types;

pub use builtin::register_builtin_modules;
pub use handlers::*;
pub use registry::LabRegistry;
pub use types::*;
