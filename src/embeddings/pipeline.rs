//! 事件嵌入流水线
//!
//! 仅处理已同意的事件；已有嵌入的事件直接跳过，不会调用模型。

use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use super::EmbeddingModel;
use crate::errors::{PrivalyticsError, Result};
use crate::index::SimilarityIndex;
use crate::storage::{EventWithPage, SeaOrmStorage};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmbedOutcome {
    Embedded,
    /// 已存在嵌入（含并发写入者胜出的情况）
    AlreadyEmbedded,
    /// 事件不存在或未同意
    NotEligible,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct DrainReport {
    pub attempted: u64,
    pub embedded: u64,
    pub skipped: u64,
    pub failed: u64,
    pub elapsed: Duration,
}

impl DrainReport {
    pub fn merge(&mut self, other: &DrainReport) {
        self.attempted += other.attempted;
        self.embedded += other.embedded;
        self.skipped += other.skipped;
        self.failed += other.failed;
        self.elapsed += other.elapsed;
    }
}

/// 事件的文本摘要，用于嵌入和检索上下文
pub fn summarize_event(record: &EventWithPage) -> String {
    let page = if record.page.title.trim().is_empty() {
        &record.page.url
    } else {
        &record.page.title
    };
    let metadata =
        serde_json::to_string(&record.event.metadata).unwrap_or_else(|_| "{}".to_string());
    format!(
        "Event type: {}, Page: {}, Timestamp: {}, Metadata: {}",
        record.event.kind,
        page,
        record.event.timestamp.to_rfc3339(),
        metadata
    )
}

pub struct EmbeddingPipeline {
    storage: Arc<SeaOrmStorage>,
    index: Arc<dyn SimilarityIndex>,
    model: Arc<dyn EmbeddingModel>,
}

impl EmbeddingPipeline {
    pub fn new(
        storage: Arc<SeaOrmStorage>,
        index: Arc<dyn SimilarityIndex>,
        model: Arc<dyn EmbeddingModel>,
    ) -> Self {
        Self {
            storage,
            index,
            model,
        }
    }

    pub async fn embed_event(&self, event_id: &str) -> Result<EmbedOutcome> {
        match self.storage.find_event(event_id).await? {
            Some(record) => self.embed_record(&record).await,
            None => Ok(EmbedOutcome::NotEligible),
        }
    }

    /// 嵌入单个事件；失败会记到事件上，使其在待嵌入队列中后移
    pub async fn embed_record(&self, record: &EventWithPage) -> Result<EmbedOutcome> {
        let result = self.try_embed(record).await;
        if let Err(ref e) = result
            && let Err(record_err) = self.storage.record_embedding_failure(&record.event.id).await
        {
            warn!(
                "Failed to record embedding failure for event {} ({}): {}",
                record.event.id, e, record_err
            );
        }
        result
    }

    async fn try_embed(&self, record: &EventWithPage) -> Result<EmbedOutcome> {
        if !record.event.consent_given {
            return Ok(EmbedOutcome::NotEligible);
        }
        if self.index.contains(&record.event.id).await? {
            return Ok(EmbedOutcome::AlreadyEmbedded);
        }

        let summary = summarize_event(record);
        let vector = self.model.embed(&summary).await?;
        let expected = self.model.dimensions();
        if vector.len() != expected {
            return Err(PrivalyticsError::dependency_permanent(format!(
                "Embedding model {} returned {} dimensions, expected {}",
                self.model.model_name(),
                vector.len(),
                expected
            )));
        }

        if self.index.upsert(&record.event.id, &vector, &summary).await? {
            debug!("Embedded event {}", record.event.id);
            Ok(EmbedOutcome::Embedded)
        } else {
            Ok(EmbedOutcome::AlreadyEmbedded)
        }
    }

    /// 处理至多 `limit` 个待嵌入事件；单个失败只计数不中断
    pub async fn drain(&self, limit: u64) -> Result<DrainReport> {
        let started = Instant::now();
        let pending = self.storage.pending_embedding_events(limit).await?;
        let mut report = DrainReport::default();

        for record in &pending {
            report.attempted += 1;
            match self.embed_record(record).await {
                Ok(EmbedOutcome::Embedded) => report.embedded += 1,
                Ok(_) => report.skipped += 1,
                Err(e) => {
                    report.failed += 1;
                    warn!("Failed to embed event {}: {}", record.event.id, e);
                }
            }
        }

        report.elapsed = started.elapsed();
        Ok(report)
    }
}
