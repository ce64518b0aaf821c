use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{debug, info, warn};

use crate::api::jwt::{JwtService, get_jwt_service};
use crate::cache::AggregateCache;
use crate::config::{StaticConfig, get_config};
use crate::embeddings::{
    ChatModel, DisabledModel, EmbeddingModel, EmbeddingPipeline, EmbeddingWorker, OpenAiClient,
};
use crate::index::SimilarityIndex;
use crate::kv::{self, SharedStore};
use crate::ratelimit::RateLimiters;
use crate::services::{AnalyticsService, ErasureService, IngestService, InsightService};
use crate::storage::{SeaOrmStorage, StorageFactory};

/// 外部模型
#[derive(Clone)]
pub struct Models {
    pub embedder: Arc<dyn EmbeddingModel>,
    pub chat: Arc<dyn ChatModel>,
    /// 为 false 时不启动后台嵌入任务
    pub active: bool,
}

impl Models {
    /// 按配置创建模型客户端；未配置 API key 时返回占位实现
    pub fn from_config(config: &StaticConfig) -> Result<Self> {
        if !config.embeddings.is_active() {
            warn!("Embeddings API key not configured; semantic search and answers are disabled");
            let disabled = Arc::new(DisabledModel {
                dimensions: config.embeddings.dimensions,
            });
            return Ok(Self {
                embedder: disabled.clone(),
                chat: disabled,
                active: false,
            });
        }

        let client = Arc::new(
            OpenAiClient::new(&config.embeddings, &config.insight)
                .context("Failed to create model client")?,
        );
        info!(
            "Model client ready: embeddings={}, chat={}",
            config.embeddings.model, config.insight.chat_model
        );
        Ok(Self {
            embedder: client.clone(),
            chat: client,
            active: true,
        })
    }
}

/// 请求处理所需的全部组件
#[derive(Clone)]
pub struct AppContext {
    pub storage: Arc<SeaOrmStorage>,
    pub store: Arc<dyn SharedStore>,
    pub limiters: Arc<RateLimiters>,
    pub cache: Arc<AggregateCache>,
    pub pipeline: Arc<EmbeddingPipeline>,
    pub worker: Arc<EmbeddingWorker>,
    pub ingest: Arc<IngestService>,
    pub analytics: Arc<AnalyticsService>,
    pub insight: Arc<InsightService>,
    pub erasure: Arc<ErasureService>,
    pub jwt: Arc<JwtService>,
    pub payload_limit: usize,
}

impl AppContext {
    /// 组装组件。模型可用时在当前 tokio 运行时上启动嵌入任务
    pub fn assemble(
        config: &StaticConfig,
        storage: Arc<SeaOrmStorage>,
        store: Arc<dyn SharedStore>,
        models: Models,
        jwt: Arc<JwtService>,
    ) -> Self {
        let index: Arc<dyn SimilarityIndex> = storage.clone();
        let limiters = Arc::new(RateLimiters::from_config(store.clone(), &config.rate_limit));
        let cache = Arc::new(AggregateCache::new(store.clone(), config.cache.ttl_secs));
        let pipeline = Arc::new(EmbeddingPipeline::new(
            storage.clone(),
            index.clone(),
            models.embedder.clone(),
        ));

        let worker = if models.active {
            Arc::new(EmbeddingWorker::start(
                pipeline.clone(),
                config.embeddings.workers,
                config.embeddings.queue_capacity,
                config.embeddings.drain_batch_size,
            ))
        } else {
            Arc::new(EmbeddingWorker::disabled())
        };

        let ingest = Arc::new(IngestService::new(
            storage.clone(),
            cache.clone(),
            worker.clone(),
            config.privacy.max_metadata_bytes,
        ));
        let analytics = Arc::new(AnalyticsService::new(storage.clone(), cache.clone()));
        let insight = Arc::new(
            InsightService::new(
                storage.clone(),
                index,
                models.embedder,
                models.chat,
                worker.clone(),
            )
            .with_limits(config.insight.max_context, config.insight.max_question_chars),
        );
        let erasure = Arc::new(ErasureService::new(storage.clone(), cache.clone()));

        Self {
            storage,
            store,
            limiters,
            cache,
            pipeline,
            worker,
            ingest,
            analytics,
            insight,
            erasure,
            jwt,
            payload_limit: config.server.payload_limit,
        }
    }
}

/// 安装 rustls 加密后端，重复调用无害
pub fn install_crypto_provider() {
    if rustls::crypto::ring::default_provider()
        .install_default()
        .is_err()
    {
        debug!("rustls crypto provider already installed");
    }
}

/// 准备服务器启动的上下文
pub async fn prepare_server_startup() -> Result<AppContext> {
    let start_time = std::time::Instant::now();
    debug!("Starting pre-startup processing...");

    install_crypto_provider();
    let config = get_config();

    let storage = StorageFactory::create()
        .await
        .context("Failed to create storage backend")?;
    info!("Using storage backend: {}", storage.backend_name());

    let store = kv::create_store(&config.store)
        .await
        .context("Failed to create shared store")?;

    let models = Models::from_config(&config)?;
    let context = AppContext::assemble(&config, storage, store, models, get_jwt_service());

    info!(
        "Startup completed in {} ms",
        start_time.elapsed().as_millis()
    );
    Ok(context)
}
