//! 进程内共享存储（开发与测试）

use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::Mutex;

use super::traits::{SharedStore, WindowDecision, WindowRequest, window_estimate};
use crate::errors::{PrivalyticsError, Result};

#[derive(Debug, Clone)]
struct Entry {
    value: String,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.is_none_or(|at| at > now)
    }
}

#[derive(Default)]
pub struct MemoryStore {
    entries: DashMap<String, Entry>,
    /// 串行化读改写操作（incr / sliding_window）
    write_lock: Mutex<()>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn live_value(&self, key: &str, now: Instant) -> Option<String> {
        let value = self
            .entries
            .get(key)
            .filter(|e| e.is_live(now))
            .map(|e| e.value.clone());
        if value.is_none() {
            self.entries.remove_if(key, |_, e| !e.is_live(now));
        }
        value
    }

    fn counter(&self, key: &str, now: Instant) -> Result<u64> {
        match self.live_value(key, now) {
            Some(v) => v
                .parse::<u64>()
                .map_err(|_| PrivalyticsError::store_operation(format!("Key '{}' is not a counter", key))),
            None => Ok(0),
        }
    }

    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.entries.iter().filter(|e| e.is_live(now)).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl SharedStore for MemoryStore {
    fn backend_name(&self) -> &'static str {
        "memory"
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.live_value(key, Instant::now()))
    }

    async fn get_many(&self, keys: &[String]) -> Result<Vec<Option<String>>> {
        let now = Instant::now();
        Ok(keys.iter().map(|k| self.live_value(k, now)).collect())
    }

    async fn set_ex(&self, key: &str, value: &str, ttl_secs: u64) -> Result<()> {
        self.entries.insert(
            key.to_string(),
            Entry {
                value: value.to_string(),
                expires_at: Some(Instant::now() + Duration::from_secs(ttl_secs)),
            },
        );
        Ok(())
    }

    async fn incr(&self, key: &str) -> Result<i64> {
        let _guard = self.write_lock.lock();
        let now = Instant::now();
        let next = self.counter(key, now)? + 1;
        let expires_at = self.entries.get(key).and_then(|e| e.expires_at);
        self.entries.insert(
            key.to_string(),
            Entry {
                value: next.to_string(),
                expires_at,
            },
        );
        Ok(next as i64)
    }

    async fn sliding_window(&self, request: &WindowRequest) -> Result<WindowDecision> {
        let _guard = self.write_lock.lock();
        let now = Instant::now();
        let current = self.counter(&request.current_key, now)?;
        let previous = self.counter(&request.previous_key, now)?;

        let estimate = window_estimate(previous, current, request.previous_weight);
        if estimate >= request.limit {
            return Ok(WindowDecision {
                allowed: false,
                estimate,
            });
        }

        let expires_at = if current == 0 {
            Some(now + Duration::from_millis(request.ttl_ms))
        } else {
            self.entries
                .get(&request.current_key)
                .and_then(|e| e.expires_at)
        };
        self.entries.insert(
            request.current_key.clone(),
            Entry {
                value: (current + 1).to_string(),
                expires_at,
            },
        );

        Ok(WindowDecision {
            allowed: true,
            estimate: estimate + 1,
        })
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }
}
