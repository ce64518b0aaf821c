//! 补齐历史事件的嵌入
//!
//! 与请求路径触发的批处理互不影响：写入幂等，重叠执行只会跳过。

use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result, bail};
use tracing::{info, warn};

use crate::config::get_config;
use crate::embeddings::{EmbedOutcome, EmbeddingPipeline};
use crate::index::SimilarityIndex;
use crate::runtime::lifetime::Models;
use crate::storage::{EmbeddingCoverage, SeaOrmStorage, StorageFactory};

const PROGRESS_EVERY: u64 = 10;

#[derive(Debug, Clone, Default)]
pub struct BacklogReport {
    pub processed: u64,
    pub embedded: u64,
    pub skipped: u64,
    pub errors: u64,
    pub elapsed: Duration,
    /// 成功嵌入的平均耗时
    pub average_latency: Duration,
    pub coverage: Option<EmbeddingCoverage>,
}

impl BacklogReport {
    pub fn success_rate(&self) -> f64 {
        if self.processed == 0 {
            return 100.0;
        }
        (self.processed - self.errors) as f64 * 100.0 / self.processed as f64
    }

    pub fn render(&self) -> String {
        let mut out = format!(
            "Embedding backlog report\n\
             ========================\n\
             - Processed: {}\n\
             - Embedded: {}\n\
             - Skipped: {}\n\
             - Errors: {}\n\
             - Success rate: {:.2}%\n\
             - Average embedding time: {:.2}ms\n\
             - Total processing time: {}ms",
            self.processed,
            self.embedded,
            self.skipped,
            self.errors,
            self.success_rate(),
            self.average_latency.as_secs_f64() * 1000.0,
            self.elapsed.as_millis()
        );
        if let Some(coverage) = &self.coverage {
            out.push_str(&format!(
                "\n- Consented events: {}\n- Events with embeddings: {}\n- Coverage: {:.2}%",
                coverage.consented_events,
                coverage.embedded_events,
                coverage.ratio() * 100.0
            ));
        }
        out
    }
}

/// 逐批处理待嵌入事件，直到没有待处理事件、达到 `limit`，或一批里已没有
/// 本轮未尝试过的事件。每个事件本轮至多尝试一次
pub async fn drain_backlog(
    storage: &SeaOrmStorage,
    pipeline: &EmbeddingPipeline,
    batch_size: u64,
    limit: Option<u64>,
) -> Result<BacklogReport> {
    let started = Instant::now();
    let batch_size = batch_size.max(1);
    let mut report = BacklogReport::default();
    let mut embed_time = Duration::ZERO;
    let mut failed: HashSet<String> = HashSet::new();

    loop {
        let remaining = limit.map(|l| l.saturating_sub(report.processed));
        if remaining == Some(0) {
            break;
        }
        let take = remaining.map_or(batch_size, |r| r.min(batch_size));

        let pending = storage
            .pending_embedding_events(take)
            .await
            .context("Failed to load pending events")?;
        if pending.is_empty() {
            break;
        }

        let mut fresh = 0u64;
        for record in &pending {
            if failed.contains(&record.event.id) {
                continue;
            }
            fresh += 1;
            let attempt = Instant::now();
            match pipeline.embed_record(record).await {
                Ok(EmbedOutcome::Embedded) => {
                    report.embedded += 1;
                    embed_time += attempt.elapsed();
                }
                Ok(_) => report.skipped += 1,
                Err(e) => {
                    report.errors += 1;
                    failed.insert(record.event.id.clone());
                    warn!("Failed to create embedding for event {}: {}", record.event.id, e);
                }
            }
            report.processed += 1;
            if report.processed % PROGRESS_EVERY == 0 {
                info!(
                    "Processed {} events ({} embedded, {} errors)",
                    report.processed, report.embedded, report.errors
                );
            }
        }

        // 失败的事件排在队尾，整批都失败过说明已无新事件可试
        if fresh == 0 {
            if !failed.is_empty() {
                warn!(
                    "{} events failed to embed in this run; rerun later to retry",
                    failed.len()
                );
            }
            break;
        }
    }

    report.elapsed = started.elapsed();
    if report.embedded > 0 {
        report.average_latency = embed_time / report.embedded as u32;
    }
    report.coverage = match storage.embedding_coverage().await {
        Ok(c) => Some(c),
        Err(e) => {
            warn!("Failed to compute embedding coverage: {}", e);
            None
        }
    };
    Ok(report)
}

pub async fn run_backlog(batch_size: Option<u64>, limit: Option<u64>) -> Result<()> {
    crate::runtime::lifetime::startup::install_crypto_provider();
    let config = get_config();

    let models = Models::from_config(&config)?;
    if !models.active {
        bail!("Embeddings are not configured; set embeddings.api_key (PV__EMBEDDINGS__API_KEY)");
    }

    let storage = StorageFactory::create()
        .await
        .context("Failed to create storage backend")?;
    let index: Arc<dyn SimilarityIndex> = storage.clone();
    let pipeline = EmbeddingPipeline::new(storage.clone(), index, models.embedder);

    let batch_size = batch_size.unwrap_or(config.embeddings.drain_batch_size.max(1) * 10);
    info!("Starting embedding backlog drain (batch size {})", batch_size);

    let report = drain_backlog(&storage, &pipeline, batch_size, limit).await?;
    info!(
        "Embedding generation complete. Processed: {}, Errors: {}",
        report.processed, report.errors
    );
    println!("{}", report.render());
    Ok(())
}
