//! SeaORM storage backend
//!
//! 事件库：pages / events / event_embeddings，支持 SQLite、MySQL/MariaDB
//! 与 PostgreSQL。

mod connection;
mod converters;
mod embeddings;
mod events;
mod pages;

use std::future::Future;
use std::time::Duration;

use moka::sync::Cache;
use sea_orm::{DatabaseConnection, DbErr};
use tracing::warn;

use crate::errors::{PrivalyticsError, Result};
use crate::storage::models::Page;
use crate::utils::retry::{self, RetryConfig};

pub use connection::{connect_generic, connect_sqlite, run_migrations};
pub use converters::{model_to_event, model_to_page};

/// 单次查询返回的最大事件数
pub const MAX_QUERY_ROWS: u64 = 1000;

/// 从数据库 URL 推断数据库类型
pub fn infer_backend_from_url(database_url: &str) -> Result<String> {
    if database_url.starts_with("sqlite:")
        || database_url.ends_with(".db")
        || database_url.ends_with(".sqlite")
    {
        Ok("sqlite".to_string())
    } else if database_url.starts_with("mysql://") || database_url.starts_with("mariadb://") {
        Ok("mysql".to_string())
    } else if database_url.starts_with("postgres://") || database_url.starts_with("postgresql://") {
        Ok("postgres".to_string())
    } else {
        Err(PrivalyticsError::database_config(format!(
            "Cannot infer database type from URL: {}. Supported: sqlite://, mysql://, mariadb://, postgres://",
            database_url
        )))
    }
}

/// SeaORM-based storage backend
#[derive(Clone)]
pub struct SeaOrmStorage {
    db: DatabaseConnection,
    backend_name: String,
    /// url -> Page，页面创建后只会回填标题
    page_cache: Cache<String, Page>,
    retry_config: RetryConfig,
    /// 单次数据库调用的超时
    op_timeout_ms: u64,
}

impl SeaOrmStorage {
    pub async fn new(database_url: &str, backend_name: &str) -> Result<Self> {
        if database_url.is_empty() {
            return Err(PrivalyticsError::database_config(
                "database_url is not set".to_string(),
            ));
        }

        let config = crate::config::get_config();
        let retry_config = RetryConfig::from_database_config(&config.database);

        let db = if backend_name == "sqlite" {
            connect_sqlite(database_url, &config.database).await?
        } else {
            connect_generic(database_url, backend_name, &config.database).await?
        };

        let storage = SeaOrmStorage {
            db,
            backend_name: backend_name.to_string(),
            page_cache: Cache::builder()
                .time_to_live(Duration::from_secs(300))
                .max_capacity(10_000)
                .build(),
            retry_config,
            op_timeout_ms: config.database.timeout.max(1).saturating_mul(1000),
        };

        run_migrations(&storage.db).await?;

        warn!(
            "{} Storage initialized.",
            storage.backend_name.to_uppercase()
        );
        Ok(storage)
    }

    pub fn backend_name(&self) -> &str {
        &self.backend_name
    }

    pub fn get_db(&self) -> &DatabaseConnection {
        &self.db
    }

    pub async fn ping(&self) -> Result<()> {
        bounded("ping", self.op_timeout_ms, connection::ping(&self.db)).await
    }

    /// 幂等的单条读写：带重试，每次尝试独立超时
    async fn run<T, F, Fut>(&self, operation: &str, op: F) -> std::result::Result<T, DbErr>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = std::result::Result<T, DbErr>>,
    {
        retry::with_retry_timeout(operation, self.retry_config, self.op_timeout_ms, op).await
    }

    /// 事务与分页扫描：不重试，整体超时
    async fn bounded<T, Fut>(&self, operation: &str, fut: Fut) -> Result<T>
    where
        Fut: Future<Output = Result<T>>,
    {
        bounded(operation, self.op_timeout_ms, fut).await
    }
}

/// 超时后放弃 `fut`；未提交的事务随之回滚
pub(crate) async fn bounded<T, Fut>(operation: &str, timeout_ms: u64, fut: Fut) -> Result<T>
where
    Fut: Future<Output = Result<T>>,
{
    match tokio::time::timeout(Duration::from_millis(timeout_ms), fut).await {
        Ok(result) => result,
        Err(_) => Err(PrivalyticsError::database_connection(format!(
            "Database operation '{}' timed out after {}ms",
            operation, timeout_ms
        ))),
    }
}
