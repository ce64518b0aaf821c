use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use tracing::{debug, warn};

use crate::config::{FailurePolicy, LimiterQuota, RateLimitConfig};
use crate::kv::{SharedStore, WindowRequest};

/// 限流判定结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Admission {
    pub allowed: bool,
    /// 被拒绝时建议的重试间隔（秒），至少为 1；放行时为 0
    pub retry_after_seconds: u64,
}

impl Admission {
    fn allow() -> Self {
        Self {
            allowed: true,
            retry_after_seconds: 0,
        }
    }
}

/// 单个限流器（一个配额类别）
///
/// 使用两个相邻固定窗口近似滑动窗口：
/// `estimate = floor(prev * (1 - elapsed / window)) + current`
pub struct RateLimiter {
    store: Arc<dyn SharedStore>,
    class: &'static str,
    limit: u64,
    window_ms: u64,
    failure_policy: FailurePolicy,
}

impl RateLimiter {
    pub fn new(
        store: Arc<dyn SharedStore>,
        class: &'static str,
        quota: &LimiterQuota,
        failure_policy: FailurePolicy,
    ) -> Self {
        Self {
            store,
            class,
            limit: quota.limit,
            window_ms: quota.window_secs.max(1) * 1000,
            failure_policy,
        }
    }

    pub fn class(&self) -> &'static str {
        self.class
    }

    pub async fn admit(&self, key: &str) -> Admission {
        let now_ms = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0);
        self.admit_at(key, now_ms).await
    }

    /// 以给定时刻（Unix 毫秒）判定，便于测试窗口滚动
    pub async fn admit_at(&self, key: &str, now_ms: u64) -> Admission {
        let window_index = now_ms / self.window_ms;
        let elapsed_in_window = now_ms % self.window_ms;
        let previous_weight = 1.0 - elapsed_in_window as f64 / self.window_ms as f64;

        let request = WindowRequest {
            current_key: self.counter_key(key, window_index),
            previous_key: self.counter_key(key, window_index.saturating_sub(1)),
            limit: self.limit,
            previous_weight: if window_index == 0 { 0.0 } else { previous_weight },
            ttl_ms: self.window_ms * 2,
        };

        match self.store.sliding_window(&request).await {
            Ok(decision) if decision.allowed => Admission::allow(),
            Ok(decision) => {
                let remaining_ms = self.window_ms - elapsed_in_window;
                let retry_after_seconds = remaining_ms.div_ceil(1000).max(1);
                debug!(
                    "Rate limit [{}] rejected key {} (estimate {}/{}), retry after {}s",
                    self.class, key, decision.estimate, self.limit, retry_after_seconds
                );
                Admission {
                    allowed: false,
                    retry_after_seconds,
                }
            }
            Err(e) => match self.failure_policy {
                FailurePolicy::Open => {
                    warn!(
                        "Rate limit [{}] store unavailable, admitting request: {}",
                        self.class, e
                    );
                    Admission::allow()
                }
                FailurePolicy::Closed => {
                    warn!(
                        "Rate limit [{}] store unavailable, rejecting request: {}",
                        self.class, e
                    );
                    Admission {
                        allowed: false,
                        retry_after_seconds: (self.window_ms / 1000).max(1),
                    }
                }
            },
        }
    }

    fn counter_key(&self, key: &str, window_index: u64) -> String {
        format!("ratelimit:{}:{}:{}", self.class, key, window_index)
    }
}

/// 写入（/api/track）与读取（聚合、问答）两个独立的限流器
pub struct RateLimiters {
    pub ingest: RateLimiter,
    pub read: RateLimiter,
}

impl RateLimiters {
    pub fn from_config(store: Arc<dyn SharedStore>, config: &RateLimitConfig) -> Self {
        Self {
            ingest: RateLimiter::new(
                store.clone(),
                "ingest",
                &config.ingest,
                config.failure_policy,
            ),
            read: RateLimiter::new(store, "read", &config.read, config.failure_policy),
        }
    }
}
