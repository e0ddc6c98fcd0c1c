//! 请求处理方式的演示端点：按方法分支、按方法路由、异步并发、SSE

mod handlers;

pub use handlers::*;
