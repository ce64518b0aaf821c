//! 事件写入
//!
//! 顺序：校验 -> 指纹 -> 页面 -> 事件 -> 缓存失效 -> 触发嵌入。
//! 缓存失效与嵌入都不影响写入结果。

use std::sync::Arc;

use serde::Deserialize;
use tracing::{debug, warn};

use crate::cache::AggregateCache;
use crate::embeddings::EmbeddingWorker;
use crate::errors::{PrivalyticsError, Result};
use crate::storage::{Event, EventKind, Metadata, NewEvent, SeaOrmStorage};
use crate::utils::fingerprint;

const MAX_URL_LEN: usize = 2048;
const MAX_TITLE_LEN: usize = 512;

/// 追踪请求体
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackRequest {
    pub page: String,
    #[serde(rename = "type")]
    pub kind: EventKind,
    #[serde(default)]
    pub metadata: Option<Metadata>,
    #[serde(default)]
    pub consent_given: bool,
    #[serde(default)]
    pub title: Option<String>,
}

pub struct IngestService {
    storage: Arc<SeaOrmStorage>,
    cache: Arc<AggregateCache>,
    worker: Arc<EmbeddingWorker>,
    max_metadata_bytes: usize,
}

impl IngestService {
    pub fn new(
        storage: Arc<SeaOrmStorage>,
        cache: Arc<AggregateCache>,
        worker: Arc<EmbeddingWorker>,
        max_metadata_bytes: usize,
    ) -> Self {
        Self {
            storage,
            cache,
            worker,
            max_metadata_bytes,
        }
    }

    fn validate(&self, request: &TrackRequest) -> Result<()> {
        let page = request.page.trim();
        if page.is_empty() || page.len() > MAX_URL_LEN {
            return Err(PrivalyticsError::validation("page must be a URL"));
        }
        url::Url::parse(page).map_err(|e| {
            PrivalyticsError::validation(format!("page '{}' is not a valid URL: {}", page, e))
        })?;

        if let Some(title) = &request.title
            && title.len() > MAX_TITLE_LEN
        {
            return Err(PrivalyticsError::validation("title is too long"));
        }

        if let Some(metadata) = &request.metadata {
            let size = serde_json::to_vec(metadata)?.len();
            if size > self.max_metadata_bytes {
                return Err(PrivalyticsError::validation(format!(
                    "metadata is {} bytes, limit is {}",
                    size, self.max_metadata_bytes
                )));
            }
        }
        Ok(())
    }

    /// 记录一次访客行为
    pub async fn track(
        &self,
        request: TrackRequest,
        client_address: &str,
        user_agent: &str,
    ) -> Result<Event> {
        self.validate(&request)?;

        let visitor_hash = fingerprint(client_address, user_agent);
        let title = request
            .title
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty());
        let page = self
            .storage
            .create_page_if_absent(request.page.trim(), title)
            .await?;

        let event = self
            .storage
            .record_event(NewEvent {
                page_id: page.id,
                kind: request.kind,
                visitor_hash,
                user_agent: user_agent.to_string(),
                metadata: request.metadata.unwrap_or_default(),
                consent_given: request.consent_given,
            })
            .await?;

        if let Err(e) = self.cache.invalidate_all().await {
            // 条目仍会在 TTL 后过期
            warn!(
                "Failed to invalidate aggregate cache after event {}: {}",
                event.id, e
            );
        }

        if event.consent_given {
            self.worker.trigger();
        } else {
            debug!("Event {} recorded without consent, not scheduled for embedding", event.id);
        }

        debug!("Tracked {} event {}", event.kind, event.id);
        Ok(event)
    }
}
