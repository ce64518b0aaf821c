//! 集成测试共用的构件：临时 SQLite、内存共享存储、假模型
#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Once};

use async_trait::async_trait;
use parking_lot::Mutex;
use tempfile::TempDir;

use privalytics::config::init_config;
use privalytics::embeddings::{ChatModel, EmbeddingModel};
use privalytics::errors::{PrivalyticsError, Result};
use privalytics::kv::{MemoryStore, SharedStore, WindowDecision, WindowRequest};
use privalytics::storage::{
    Event, EventKind, Metadata, NewEvent, Page, SeaOrmStorage,
};

pub const DIMENSIONS: usize = 8;

// 确保 config 只初始化一次
static INIT: Once = Once::new();

pub fn init_test_config() {
    INIT.call_once(|| {
        init_config();
    });
}

/// 创建临时 SQLite 数据库的存储实例
pub async fn create_temp_storage() -> (Arc<SeaOrmStorage>, TempDir) {
    init_test_config();

    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let db_path = temp_dir.path().join("test.db");
    let db_url = format!("sqlite://{}?mode=rwc", db_path.display());

    let storage = SeaOrmStorage::new(&db_url, "sqlite")
        .await
        .expect("Failed to create storage");

    (Arc::new(storage), temp_dir)
}

pub async fn insert_event(
    storage: &SeaOrmStorage,
    url: &str,
    kind: EventKind,
    visitor_hash: &str,
    consent: bool,
) -> (Page, Event) {
    let page = storage
        .create_page_if_absent(url, Some("Test Page"))
        .await
        .expect("Failed to create page");
    let event = storage
        .record_event(NewEvent {
            page_id: page.id.clone(),
            kind,
            visitor_hash: visitor_hash.to_string(),
            user_agent: "test-agent".to_string(),
            metadata: Metadata::new(),
            consent_given: consent,
        })
        .await
        .expect("Failed to record event");
    (page, event)
}

/// 词袋式确定性向量：相同文本得到相同向量，共享词越多越相似
pub fn bag_of_words(text: &str) -> Vec<f32> {
    let mut vector = vec![0.0f32; DIMENSIONS];
    for word in text
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
    {
        let bucket = word
            .to_lowercase()
            .bytes()
            .fold(0usize, |acc, b| acc.wrapping_mul(31).wrapping_add(b as usize))
            % DIMENSIONS;
        vector[bucket] += 1.0;
    }
    vector
}

pub struct FakeEmbedder {
    pub calls: AtomicUsize,
    pub fail: AtomicBool,
    /// 非 None 时返回该维度的向量
    pub wrong_dimensions: Option<usize>,
    /// 文本包含该片段时返回永久错误
    pub reject_containing: Option<String>,
}

impl FakeEmbedder {
    pub fn new() -> Self {
        Self {
            calls: AtomicUsize::new(0),
            fail: AtomicBool::new(false),
            wrong_dimensions: None,
            reject_containing: None,
        }
    }

    pub fn rejecting(fragment: &str) -> Self {
        Self {
            reject_containing: Some(fragment.to_string()),
            ..Self::new()
        }
    }

    pub fn with_wrong_dimensions(dimensions: usize) -> Self {
        Self {
            wrong_dimensions: Some(dimensions),
            ..Self::new()
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EmbeddingModel for FakeEmbedder {
    fn model_name(&self) -> &str {
        "fake-embedder"
    }

    fn dimensions(&self) -> usize {
        DIMENSIONS
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail.load(Ordering::SeqCst) {
            return Err(PrivalyticsError::dependency_transient("embedding quota exceeded"));
        }
        if let Some(fragment) = &self.reject_containing
            && text.contains(fragment.as_str())
        {
            return Err(PrivalyticsError::dependency_permanent("invalid input"));
        }
        if let Some(dimensions) = self.wrong_dimensions {
            return Ok(vec![1.0; dimensions]);
        }
        Ok(bag_of_words(text))
    }
}

pub struct FakeChat {
    pub last_system: Mutex<Option<String>>,
    pub last_user: Mutex<Option<String>>,
    pub fail: AtomicBool,
}

impl FakeChat {
    pub fn new() -> Self {
        Self {
            last_system: Mutex::new(None),
            last_user: Mutex::new(None),
            fail: AtomicBool::new(false),
        }
    }
}

#[async_trait]
impl ChatModel for FakeChat {
    fn model_name(&self) -> &str {
        "fake-chat"
    }

    async fn complete(&self, system_prompt: &str, user_content: &str) -> Result<String> {
        *self.last_system.lock() = Some(system_prompt.to_string());
        *self.last_user.lock() = Some(user_content.to_string());
        if self.fail.load(Ordering::SeqCst) {
            return Err(PrivalyticsError::dependency_transient("upstream 503"));
        }
        Ok("The pricing page is the busiest.".to_string())
    }
}

/// 所有操作都失败的共享存储
pub struct FailingStore;

#[async_trait]
impl SharedStore for FailingStore {
    fn backend_name(&self) -> &'static str {
        "failing"
    }

    async fn get(&self, _key: &str) -> Result<Option<String>> {
        Err(PrivalyticsError::store_connection("connection refused"))
    }

    async fn get_many(&self, _keys: &[String]) -> Result<Vec<Option<String>>> {
        Err(PrivalyticsError::store_connection("connection refused"))
    }

    async fn set_ex(&self, _key: &str, _value: &str, _ttl_secs: u64) -> Result<()> {
        Err(PrivalyticsError::store_connection("connection refused"))
    }

    async fn incr(&self, _key: &str) -> Result<i64> {
        Err(PrivalyticsError::store_connection("connection refused"))
    }

    async fn sliding_window(&self, _request: &WindowRequest) -> Result<WindowDecision> {
        Err(PrivalyticsError::store_connection("connection refused"))
    }

    async fn ping(&self) -> Result<()> {
        Err(PrivalyticsError::store_connection("connection refused"))
    }
}

/// 内存存储；`fail_next_incr(n)` 之后的 n 次 INCR 失败
pub struct FlakyIncrStore {
    inner: MemoryStore,
    incr_failures: AtomicUsize,
}

impl FlakyIncrStore {
    pub fn new() -> Self {
        Self {
            inner: MemoryStore::new(),
            incr_failures: AtomicUsize::new(0),
        }
    }

    pub fn fail_next_incr(&self, n: usize) {
        self.incr_failures.store(n, Ordering::SeqCst);
    }
}

#[async_trait]
impl SharedStore for FlakyIncrStore {
    fn backend_name(&self) -> &'static str {
        "flaky"
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        self.inner.get(key).await
    }

    async fn get_many(&self, keys: &[String]) -> Result<Vec<Option<String>>> {
        self.inner.get_many(keys).await
    }

    async fn set_ex(&self, key: &str, value: &str, ttl_secs: u64) -> Result<()> {
        self.inner.set_ex(key, value, ttl_secs).await
    }

    async fn incr(&self, key: &str) -> Result<i64> {
        let failing = self
            .incr_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(PrivalyticsError::store_connection("connection reset"));
        }
        self.inner.incr(key).await
    }

    async fn sliding_window(&self, request: &WindowRequest) -> Result<WindowDecision> {
        self.inner.sliding_window(request).await
    }

    async fn ping(&self) -> Result<()> {
        self.inner.ping().await
    }
}
