//! 共享 KV 存储
//!
//! 限流计数器和聚合缓存都放在这里，由调用方注入，测试中可替换为内存实现。

pub mod memory;
pub mod redis;
pub mod traits;

use std::sync::Arc;

use tracing::{info, warn};

use crate::config::{StoreConfig, StoreType};
use crate::errors::Result;

pub use memory::MemoryStore;
pub use redis::RedisStore;
pub use traits::{SharedStore, WindowDecision, WindowRequest};

/// 按配置创建共享存储
pub async fn create_store(config: &StoreConfig) -> Result<Arc<dyn SharedStore>> {
    match config.store_type {
        StoreType::Redis => {
            let store = RedisStore::new(&config.redis, config.timeout_ms)?;
            if let Err(e) = store.ping().await {
                // 不阻止启动：限流按失败策略处理，缓存退化为直读
                warn!(
                    "Redis at {} is not reachable yet: {}. Continuing with degraded store.",
                    config.redis.url, e
                );
            } else {
                info!("Shared store connected: redis");
            }
            Ok(Arc::new(store))
        }
        StoreType::Memory => {
            warn!(
                "Using in-process memory store. Rate limits and cache are not shared \
                 across instances; do not use in multi-node deployments."
            );
            Ok(Arc::new(MemoryStore::new()))
        }
    }
}
