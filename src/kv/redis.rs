use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use redis::{AsyncCommands, Script, aio::MultiplexedConnection};
use tokio::sync::RwLock;
use tracing::{debug, error};

use super::traits::{SharedStore, WindowDecision, WindowRequest};
use crate::config::RedisConfig;
use crate::errors::{PrivalyticsError, Result};

/// KEYS[1] 当前窗口，KEYS[2] 上一窗口；ARGV: limit, weight, ttl_ms
const SLIDING_WINDOW_SCRIPT: &str = r#"
local current = tonumber(redis.call('GET', KEYS[1]) or '0')
local previous = tonumber(redis.call('GET', KEYS[2]) or '0')
local limit = tonumber(ARGV[1])
local weight = tonumber(ARGV[2])
local estimate = math.floor(previous * weight) + current
if estimate >= limit then
  return {0, estimate}
end
current = redis.call('INCR', KEYS[1])
if current == 1 then
  redis.call('PEXPIRE', KEYS[1], ARGV[3])
end
return {1, estimate + 1}
"#;

pub struct RedisStore {
    client: redis::Client,
    /// 持久化连接，使用 RwLock 保护
    connection: Arc<RwLock<Option<MultiplexedConnection>>>,
    key_prefix: String,
    timeout: Duration,
    window_script: Script,
}

impl RedisStore {
    pub fn new(config: &RedisConfig, timeout_ms: u64) -> Result<Self> {
        let client = redis::Client::open(config.url.clone()).map_err(|e| {
            PrivalyticsError::store_connection(format!(
                "Invalid Redis URL '{}': {}",
                config.url, e
            ))
        })?;

        debug!(
            "RedisStore created with prefix: '{}', timeout: {}ms",
            config.key_prefix, timeout_ms
        );

        Ok(Self {
            client,
            connection: Arc::new(RwLock::new(None)),
            key_prefix: config.key_prefix.clone(),
            timeout: Duration::from_millis(timeout_ms.max(1)),
            window_script: Script::new(SLIDING_WINDOW_SCRIPT),
        })
    }

    /// 获取或建立持久连接
    async fn get_connection(&self) -> Result<MultiplexedConnection> {
        {
            let conn_guard = self.connection.read().await;
            if let Some(ref conn) = *conn_guard {
                return Ok(conn.clone());
            }
        }

        let mut conn_guard = self.connection.write().await;

        // 双重检查，避免竞态条件
        if let Some(ref conn) = *conn_guard {
            return Ok(conn.clone());
        }

        let new_conn = tokio::time::timeout(
            self.timeout,
            self.client.get_multiplexed_async_connection(),
        )
        .await
        .map_err(|_| PrivalyticsError::store_connection("Timed out connecting to Redis"))??;
        *conn_guard = Some(new_conn.clone());
        debug!("Redis connection established and cached");

        Ok(new_conn)
    }

    /// 重置连接（在连接错误时调用）
    async fn reset_connection(&self) {
        let mut conn_guard = self.connection.write().await;
        *conn_guard = None;
        debug!("Redis connection reset due to error");
    }

    fn make_key(&self, key: &str) -> String {
        format!("{}{}", self.key_prefix, key)
    }

    /// 带超时执行一次命令，连接类错误会重置缓存的连接
    async fn run<T, F, Fut>(&self, op: &str, f: F) -> Result<T>
    where
        F: FnOnce(MultiplexedConnection) -> Fut,
        Fut: std::future::Future<Output = redis::RedisResult<T>>,
    {
        let conn = match self.get_connection().await {
            Ok(c) => c,
            Err(e) => {
                error!("Failed to get Redis connection: {}", e);
                self.reset_connection().await;
                return Err(e);
            }
        };

        match tokio::time::timeout(self.timeout, f(conn)).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => {
                error!("Redis {} failed: {}", op, e);
                let err = PrivalyticsError::from(e);
                if err.is_transient() {
                    self.reset_connection().await;
                }
                Err(err)
            }
            Err(_) => {
                error!("Redis {} timed out after {:?}", op, self.timeout);
                self.reset_connection().await;
                Err(PrivalyticsError::store_connection(format!(
                    "Redis {} timed out",
                    op
                )))
            }
        }
    }
}

#[async_trait]
impl SharedStore for RedisStore {
    fn backend_name(&self) -> &'static str {
        "redis"
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        let key = self.make_key(key);
        self.run("GET", |mut conn| async move { conn.get(key).await })
            .await
    }

    async fn get_many(&self, keys: &[String]) -> Result<Vec<Option<String>>> {
        if keys.is_empty() {
            return Ok(Vec::new());
        }
        let keys: Vec<String> = keys.iter().map(|k| self.make_key(k)).collect();
        self.run("MGET", |mut conn| async move {
            redis::cmd("MGET").arg(&keys).query_async(&mut conn).await
        })
        .await
    }

    async fn set_ex(&self, key: &str, value: &str, ttl_secs: u64) -> Result<()> {
        let key = self.make_key(key);
        let value = value.to_string();
        self.run("SET EX", |mut conn| async move {
            conn.set_ex::<_, _, ()>(key, value, ttl_secs.max(1)).await
        })
        .await
    }

    async fn incr(&self, key: &str) -> Result<i64> {
        let key = self.make_key(key);
        self.run("INCR", |mut conn| async move { conn.incr(key, 1i64).await })
            .await
    }

    async fn sliding_window(&self, request: &WindowRequest) -> Result<WindowDecision> {
        let current_key = self.make_key(&request.current_key);
        let previous_key = self.make_key(&request.previous_key);
        let script = &self.window_script;
        let reply: Vec<i64> = self
            .run("sliding window", |mut conn| async move {
                script
                    .key(current_key)
                    .key(previous_key)
                    .arg(request.limit)
                    .arg(request.previous_weight.clamp(0.0, 1.0))
                    .arg(request.ttl_ms)
                    .invoke_async(&mut conn)
                    .await
            })
            .await?;

        match reply.as_slice() {
            [allowed, estimate] => Ok(WindowDecision {
                allowed: *allowed == 1,
                estimate: (*estimate).max(0) as u64,
            }),
            other => Err(PrivalyticsError::store_operation(format!(
                "Unexpected sliding window reply: {:?}",
                other
            ))),
        }
    }

    async fn ping(&self) -> Result<()> {
        let pong: String = self
            .run("PING", |mut conn| async move {
                redis::cmd("PING").query_async(&mut conn).await
            })
            .await?;
        debug!("Redis ping: {}", pong);
        Ok(())
    }
}
