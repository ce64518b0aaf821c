//! 聚合结果的读穿缓存
//!
//! 所有条目共用一个代际计数器 `analytics:generation`。失效只需 INCR，
//! 读取时一次 MGET 取回代际和条目，代际不一致即视为未命中。
//! 缓存读取失败一律按未命中处理，不向调用方暴露错误。

use std::sync::Arc;

use serde::{Deserialize, Serialize, de::DeserializeOwned};
use tracing::{debug, trace, warn};

use crate::errors::Result;
use crate::kv::SharedStore;
use crate::utils::TimeRange;

const GENERATION_KEY: &str = "analytics:generation";

#[derive(Debug)]
pub enum CacheLookup<T> {
    Hit(T),
    /// `generation` 为本次读取观察到的代际，回填时必须带上；
    /// 读取失败时为 None，此时不回填
    Miss { generation: Option<u64> },
}

#[derive(Serialize, Deserialize)]
struct Envelope<T> {
    generation: u64,
    value: T,
}

pub struct AggregateCache {
    store: Arc<dyn SharedStore>,
    ttl_secs: u64,
}

impl AggregateCache {
    pub fn new(store: Arc<dyn SharedStore>, ttl_secs: u64) -> Self {
        Self {
            store,
            ttl_secs: ttl_secs.max(1),
        }
    }

    fn entry_key(range: &TimeRange) -> String {
        format!("analytics:range:{}", range.cache_token())
    }

    pub async fn get<T: DeserializeOwned>(&self, range: &TimeRange) -> CacheLookup<T> {
        let keys = [GENERATION_KEY.to_string(), Self::entry_key(range)];
        let values = match self.store.get_many(&keys).await {
            Ok(values) => values,
            Err(e) => {
                warn!("Aggregate cache read failed, treating as miss: {}", e);
                return CacheLookup::Miss { generation: None };
            }
        };

        let generation = match values.first().cloned().flatten() {
            Some(raw) => match raw.parse::<u64>() {
                Ok(g) => g,
                Err(_) => {
                    warn!("Aggregate cache generation '{}' is not a number", raw);
                    return CacheLookup::Miss { generation: None };
                }
            },
            None => 0,
        };

        let Some(raw) = values.get(1).cloned().flatten() else {
            trace!("Aggregate cache miss: {}", range.cache_token());
            return CacheLookup::Miss {
                generation: Some(generation),
            };
        };

        match serde_json::from_str::<Envelope<T>>(&raw) {
            Ok(envelope) if envelope.generation == generation => {
                trace!("Aggregate cache hit: {}", range.cache_token());
                CacheLookup::Hit(envelope.value)
            }
            Ok(envelope) => {
                debug!(
                    "Aggregate cache entry stale (generation {} != {})",
                    envelope.generation, generation
                );
                CacheLookup::Miss {
                    generation: Some(generation),
                }
            }
            Err(e) => {
                warn!("Failed to deserialize cached aggregate: {}", e);
                CacheLookup::Miss {
                    generation: Some(generation),
                }
            }
        }
    }

    /// 回填缓存，`generation` 取自计算前的那次 `get`
    pub async fn put<T: Serialize>(&self, range: &TimeRange, generation: u64, value: &T) {
        let payload = match serde_json::to_string(&Envelope { generation, value }) {
            Ok(p) => p,
            Err(e) => {
                warn!("Failed to serialize aggregate for cache: {}", e);
                return;
            }
        };

        if let Err(e) = self
            .store
            .set_ex(&Self::entry_key(range), &payload, self.ttl_secs)
            .await
        {
            warn!("Aggregate cache write failed: {}", e);
        }
    }

    /// 使所有缓存条目失效
    pub async fn invalidate_all(&self) -> Result<()> {
        let generation = self.store.incr(GENERATION_KEY).await?;
        debug!("Aggregate cache invalidated, generation now {}", generation);
        Ok(())
    }
}
