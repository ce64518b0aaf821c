//! 运行模式
//!
//! - server：HTTP 服务（默认）
//! - backlog：补齐历史事件的嵌入
//! - seed：写入演示数据

pub mod backlog;
pub mod seed;
#[cfg(feature = "server")]
pub mod server;

pub use backlog::{BacklogReport, run_backlog};
pub use seed::run_seed;
#[cfg(feature = "server")]
pub use server::run_server;
