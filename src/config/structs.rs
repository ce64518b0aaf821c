use serde::{Deserialize, Serialize};
use strum::{AsRefStr, EnumString};

/// 静态配置（从 TOML 加载，启动时使用）
///
/// 包含：
/// - server: 监听地址、端口、worker 数量
/// - database: 事件库连接与重试
/// - store: 共享 KV 存储（限流计数器、聚合缓存）
/// - cache / rate_limit: 聚合缓存 TTL 与两个限流器
/// - embeddings / insight: 外部模型调用
/// - auth / privacy / cors / logging
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct StaticConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
    #[serde(default)]
    pub embeddings: EmbeddingsConfig,
    #[serde(default)]
    pub insight: InsightConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub privacy: PrivacyConfig,
    #[serde(default)]
    pub cors: CorsConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl StaticConfig {
    /// 从 TOML 文件和环境变量加载配置
    ///
    /// 优先级：ENV > TOML > 默认值
    /// ENV 前缀：PV，分隔符：__
    /// 示例：PV__SERVER__PORT=9999
    pub fn load(path: &str) -> Self {
        match Self::try_load(path) {
            Ok(config) => {
                if std::path::Path::new(path).exists() {
                    eprintln!("[INFO] Configuration loaded from: {}", path);
                }
                config
            }
            Err(e) => {
                eprintln!("[ERROR] Failed to load config: {}", e);
                Self::default()
            }
        }
    }

    pub fn try_load(path: &str) -> Result<Self, config::ConfigError> {
        use config::{Config, Environment, File};

        Config::builder()
            // 1. TOML 文件（可选）
            .add_source(File::with_name(path).required(false))
            // 2. 环境变量覆盖
            .add_source(
                Environment::with_prefix("PV")
                    .separator("__")
                    .list_separator(",")
                    .with_list_parse_key("privacy.address_headers")
                    .with_list_parse_key("cors.allowed_origins")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize::<StaticConfig>()
    }

    /// 生成示例 TOML 配置文件
    pub fn generate_sample_config() -> String {
        toml::to_string_pretty(&Self::default())
            .unwrap_or_else(|e| format!("Error generating sample config: {}", e))
    }

    /// 保存配置到 TOML 文件
    pub fn save_to_file<P: AsRef<std::path::Path>>(
        &self,
        path: P,
    ) -> Result<(), Box<dyn std::error::Error>> {
        let content = toml::to_string_pretty(self)?;

        if let Some(parent) = path.as_ref().parent()
            && !parent.as_os_str().is_empty()
            && !parent.exists()
        {
            std::fs::create_dir_all(parent)?;
        }

        std::fs::write(path, content)?;
        Ok(())
    }
}

/// 服务器配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_server_host")]
    pub host: String,
    #[serde(default = "default_server_port")]
    pub port: u16,
    #[serde(default = "default_cpu_count")]
    pub cpu_count: usize,
    /// 请求体上限（字节）
    #[serde(default = "default_payload_limit")]
    pub payload_limit: usize,
}

/// 数据库连接配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_database_url")]
    pub database_url: String,
    #[serde(default = "default_database_pool_size")]
    pub pool_size: u32,
    #[serde(default = "default_database_timeout")]
    pub timeout: u64,
    #[serde(default = "default_retry_count")]
    pub retry_count: u32,
    #[serde(default = "default_retry_base_delay_ms")]
    pub retry_base_delay_ms: u64,
    #[serde(default = "default_retry_max_delay_ms")]
    pub retry_max_delay_ms: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, AsRefStr, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum StoreType {
    Redis,
    /// 仅限单进程开发和测试
    Memory,
}

/// 共享 KV 存储配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(rename = "type")]
    #[serde(default = "default_store_type")]
    pub store_type: StoreType,
    #[serde(default)]
    pub redis: RedisConfig,
    /// 单次调用超时
    #[serde(default = "default_store_timeout_ms")]
    pub timeout_ms: u64,
}

/// Redis 配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedisConfig {
    #[serde(default = "default_redis_url")]
    pub url: String,
    #[serde(default = "default_redis_key_prefix")]
    pub key_prefix: String,
}

/// 聚合缓存配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    #[serde(default = "default_cache_ttl")]
    pub ttl_secs: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, AsRefStr, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum FailurePolicy {
    /// 计数器存储不可用时放行
    Open,
    /// 计数器存储不可用时拒绝
    Closed,
}

/// 单个限流器的配额
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimiterQuota {
    pub limit: u64,
    pub window_secs: u64,
}

/// 限流配置（写入与读取两个独立的限流器）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    #[serde(default = "default_failure_policy")]
    pub failure_policy: FailurePolicy,
    #[serde(default = "default_ingest_quota")]
    pub ingest: LimiterQuota,
    #[serde(default = "default_read_quota")]
    pub read: LimiterQuota,
}

/// 嵌入模型配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingsConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_api_base")]
    pub api_base: String,
    /// 为空时禁用嵌入与问答
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_embedding_model")]
    pub model: String,
    #[serde(default = "default_embedding_dimensions")]
    pub dimensions: usize,
    #[serde(default = "default_embedding_timeout")]
    pub timeout_secs: u64,
    #[serde(default = "default_embedding_retries")]
    pub max_retries: u32,
    /// 每次触发最多处理的待嵌入事件数
    #[serde(default = "default_drain_batch_size")]
    pub drain_batch_size: u64,
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
    #[serde(default = "default_embedding_workers")]
    pub workers: usize,
}

impl EmbeddingsConfig {
    pub fn is_active(&self) -> bool {
        self.enabled && !self.api_key.trim().is_empty()
    }
}

/// 问答服务配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InsightConfig {
    #[serde(default = "default_chat_model")]
    pub chat_model: String,
    #[serde(default = "default_max_context")]
    pub max_context: usize,
    #[serde(default = "default_insight_timeout")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_question_chars")]
    pub max_question_chars: usize,
}

/// 身份校验配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    /// 为空时启动时随机生成（重启后已签发的 token 失效）
    #[serde(default)]
    pub jwt_secret: String,
    #[serde(default = "default_admin_role")]
    pub admin_role: String,
    #[serde(default = "default_token_minutes")]
    pub token_minutes: u64,
}

/// 隐私相关配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrivacyConfig {
    /// 按优先级读取客户端地址的请求头
    #[serde(default = "default_address_headers")]
    pub address_headers: Vec<String>,
    #[serde(default = "default_max_metadata_bytes")]
    pub max_metadata_bytes: usize,
}

/// CORS 配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorsConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_allowed_origins")]
    pub allowed_origins: Vec<String>,
    #[serde(default = "default_cors_max_age")]
    pub max_age: usize,
}

/// 日志配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default = "default_log_format")]
    pub format: String,
    #[serde(default)]
    pub file: Option<String>,
    #[serde(default = "default_max_backups")]
    pub max_backups: u32,
    #[serde(default = "default_true")]
    pub enable_rotation: bool,
}

// ============================================================
// Default value functions for static config
// ============================================================

fn default_true() -> bool {
    true
}

fn default_server_host() -> String {
    "127.0.0.1".to_string()
}

fn default_server_port() -> u16 {
    8080
}

fn default_cpu_count() -> usize {
    num_cpus::get()
}

fn default_payload_limit() -> usize {
    64 * 1024
}

fn default_database_url() -> String {
    "sqlite://privalytics.db?mode=rwc".to_string()
}

fn default_database_pool_size() -> u32 {
    10
}

fn default_database_timeout() -> u64 {
    30
}

fn default_retry_count() -> u32 {
    3
}

fn default_retry_base_delay_ms() -> u64 {
    100
}

fn default_retry_max_delay_ms() -> u64 {
    2000
}

fn default_store_type() -> StoreType {
    StoreType::Redis
}

fn default_store_timeout_ms() -> u64 {
    500
}

fn default_redis_url() -> String {
    "redis://127.0.0.1:6379/".to_string()
}

fn default_redis_key_prefix() -> String {
    "privalytics:".to_string()
}

fn default_cache_ttl() -> u64 {
    300
}

fn default_failure_policy() -> FailurePolicy {
    FailurePolicy::Open
}

fn default_ingest_quota() -> LimiterQuota {
    LimiterQuota {
        limit: 60,
        window_secs: 60,
    }
}

fn default_read_quota() -> LimiterQuota {
    LimiterQuota {
        limit: 100,
        window_secs: 60,
    }
}

fn default_api_base() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_embedding_model() -> String {
    "text-embedding-ada-002".to_string()
}

fn default_embedding_dimensions() -> usize {
    1536
}

fn default_embedding_timeout() -> u64 {
    15
}

fn default_embedding_retries() -> u32 {
    2
}

fn default_drain_batch_size() -> u64 {
    10
}

fn default_queue_capacity() -> usize {
    64
}

fn default_embedding_workers() -> usize {
    1
}

fn default_chat_model() -> String {
    "gpt-5".to_string()
}

fn default_max_context() -> usize {
    20
}

fn default_insight_timeout() -> u64 {
    60
}

fn default_max_question_chars() -> usize {
    500
}

fn default_admin_role() -> String {
    "admin".to_string()
}

fn default_token_minutes() -> u64 {
    60
}

fn default_address_headers() -> Vec<String> {
    vec!["x-forwarded-for".to_string(), "x-real-ip".to_string()]
}

fn default_max_metadata_bytes() -> usize {
    8 * 1024
}

fn default_allowed_origins() -> Vec<String> {
    vec!["*".to_string()]
}

fn default_cors_max_age() -> usize {
    3600
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "text".to_string()
}

fn default_max_backups() -> u32 {
    5
}

// ============================================================
// Default implementations
// ============================================================

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_server_host(),
            port: default_server_port(),
            cpu_count: default_cpu_count(),
            payload_limit: default_payload_limit(),
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            database_url: default_database_url(),
            pool_size: default_database_pool_size(),
            timeout: default_database_timeout(),
            retry_count: default_retry_count(),
            retry_base_delay_ms: default_retry_base_delay_ms(),
            retry_max_delay_ms: default_retry_max_delay_ms(),
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            store_type: default_store_type(),
            redis: RedisConfig::default(),
            timeout_ms: default_store_timeout_ms(),
        }
    }
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            url: default_redis_url(),
            key_prefix: default_redis_key_prefix(),
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_secs: default_cache_ttl(),
        }
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            failure_policy: default_failure_policy(),
            ingest: default_ingest_quota(),
            read: default_read_quota(),
        }
    }
}

impl Default for EmbeddingsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            api_base: default_api_base(),
            api_key: String::new(),
            model: default_embedding_model(),
            dimensions: default_embedding_dimensions(),
            timeout_secs: default_embedding_timeout(),
            max_retries: default_embedding_retries(),
            drain_batch_size: default_drain_batch_size(),
            queue_capacity: default_queue_capacity(),
            workers: default_embedding_workers(),
        }
    }
}

impl Default for InsightConfig {
    fn default() -> Self {
        Self {
            chat_model: default_chat_model(),
            max_context: default_max_context(),
            timeout_secs: default_insight_timeout(),
            max_question_chars: default_max_question_chars(),
        }
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            jwt_secret: String::new(),
            admin_role: default_admin_role(),
            token_minutes: default_token_minutes(),
        }
    }
}

impl Default for PrivacyConfig {
    fn default() -> Self {
        Self {
            address_headers: default_address_headers(),
            max_metadata_bytes: default_max_metadata_bytes(),
        }
    }
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            allowed_origins: default_allowed_origins(),
            max_age: default_cors_max_age(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
            file: None,
            max_backups: default_max_backups(),
            enable_rotation: true,
        }
    }
}
