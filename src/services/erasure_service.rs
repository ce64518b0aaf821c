//! 按访客指纹擦除数据

use std::sync::Arc;

use tracing::{error, warn};

use crate::cache::AggregateCache;
use crate::errors::{PrivalyticsError, Result};
use crate::storage::SeaOrmStorage;
use crate::utils::is_fingerprint;

pub struct ErasureService {
    storage: Arc<SeaOrmStorage>,
    cache: Arc<AggregateCache>,
}

impl ErasureService {
    pub fn new(storage: Arc<SeaOrmStorage>, cache: Arc<AggregateCache>) -> Self {
        Self { storage, cache }
    }

    /// 删除该指纹的全部事件及嵌入，返回删除的事件数。
    ///
    /// 删除后总会使聚合缓存失效，失败时重试一次；仍失败则返回错误，
    /// 调用方重试整个请求即可（第二次删除数为 0，但会再次失效缓存）。
    pub async fn erase(&self, visitor_hash: &str) -> Result<u64> {
        if !is_fingerprint(visitor_hash) {
            return Err(PrivalyticsError::validation(
                "fingerprint must be 64 lowercase hex characters",
            ));
        }

        let deleted = self.storage.delete_by_fingerprint(visitor_hash).await?;

        if let Err(e) = self.cache.invalidate_all().await {
            warn!("Failed to invalidate aggregate cache after erasure, retrying: {}", e);
            self.cache.invalidate_all().await.inspect_err(|e| {
                error!(
                    "Erased {} events but cached aggregates are still stale: {}",
                    deleted, e
                );
            })?;
        }
        Ok(deleted)
    }
}
