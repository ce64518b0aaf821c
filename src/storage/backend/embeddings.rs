//! event_embeddings 表：待嵌入队列、向量写入与暴力余弦检索

use async_trait::async_trait;
use chrono::Utc;
use sea_orm::{
    ActiveValue::Set, ColumnTrait, DbErr, EntityTrait, ExprTrait, PaginatorTrait, QueryFilter,
    QueryOrder, QuerySelect, SqlErr,
    sea_query::{Expr, OnConflict, Query},
};
use tracing::{debug, warn};

use super::SeaOrmStorage;
use crate::embeddings::{TopK, decode_vector, encode_vector};
use crate::errors::{PrivalyticsError, Result};
use crate::index::SimilarityIndex;
use crate::storage::models::{EmbeddingCoverage, EventWithPage, ScoredSummary};
use migration::entities::{event, event_embedding};

/// 检索时每页读取的向量行数
const SCAN_PAGE_SIZE: u64 = 512;

impl SeaOrmStorage {
    /// 已同意但尚无嵌入的事件。失败次数少的优先，同次数按最近失败时间、
    /// 事件时间排序，反复失败的事件不会挡住新事件
    pub async fn pending_embedding_events(&self, limit: u64) -> Result<Vec<EventWithPage>> {
        if limit == 0 {
            return Ok(Vec::new());
        }

        let db = &self.db;
        let models = self
            .run("pending_embedding_events", || async {
                event::Entity::find()
                    .filter(event::Column::ConsentGiven.eq(true))
                    .filter(
                        event::Column::Id.not_in_subquery(
                            Query::select()
                                .column(event_embedding::Column::EventId)
                                .from(event_embedding::Entity)
                                .to_owned(),
                        ),
                    )
                    .order_by_asc(event::Column::EmbedAttempts)
                    .order_by_asc(event::Column::EmbedFailedAt)
                    .order_by_asc(event::Column::Timestamp)
                    .order_by_asc(event::Column::Id)
                    .limit(limit)
                    .all(db)
                    .await
            })
            .await?;

        self.attach_pages(models).await
    }

    /// 记录一次嵌入失败
    pub async fn record_embedding_failure(&self, event_id: &str) -> Result<()> {
        let db = &self.db;
        let now = Utc::now();
        self.run("record_embedding_failure", || async {
            event::Entity::update_many()
                .col_expr(
                    event::Column::EmbedAttempts,
                    Expr::col(event::Column::EmbedAttempts).add(1),
                )
                .col_expr(event::Column::EmbedFailedAt, Expr::value(now))
                .filter(event::Column::Id.eq(event_id))
                .exec(db)
                .await
        })
        .await?;
        Ok(())
    }

    /// 事件累计的嵌入失败次数；事件不存在时为 None
    pub async fn embedding_attempts(&self, event_id: &str) -> Result<Option<u32>> {
        let db = &self.db;
        let attempts: Option<i32> = self
            .run("embedding_attempts", || async {
                event::Entity::find_by_id(event_id.to_string())
                    .select_only()
                    .column(event::Column::EmbedAttempts)
                    .into_tuple()
                    .one(db)
                    .await
            })
            .await?;
        Ok(attempts.map(|a| std::cmp::Ord::max(a, 0) as u32))
    }

    pub async fn embedding_coverage(&self) -> Result<EmbeddingCoverage> {
        let db = &self.db;
        let consented_events = self
            .run("count_consented_events", || async {
                event::Entity::find()
                    .filter(event::Column::ConsentGiven.eq(true))
                    .count(db)
                    .await
            })
            .await?;
        let embedded_events = self.embedding_count().await?;

        Ok(EmbeddingCoverage {
            consented_events,
            embedded_events,
        })
    }

    pub async fn embedding_count(&self) -> Result<u64> {
        let db = &self.db;
        Ok(self
            .run("embedding_count", || async {
                event_embedding::Entity::find().count(db).await
            })
            .await?)
    }
}

#[async_trait]
impl SimilarityIndex for SeaOrmStorage {
    async fn upsert(&self, event_id: &str, vector: &[f32], summary: &str) -> Result<bool> {
        let active = event_embedding::ActiveModel {
            id: Set(uuid::Uuid::new_v4().to_string()),
            event_id: Set(event_id.to_string()),
            embedding: Set(encode_vector(vector)),
            dimensions: Set(vector.len() as i32),
            summary_text: Set(summary.to_string()),
            created_at: Set(Utc::now()),
        };
        let db = &self.db;

        let result = self.run("upsert_embedding", || async {
            event_embedding::Entity::insert(active.clone())
                .on_conflict(
                    OnConflict::column(event_embedding::Column::EventId)
                        .do_nothing()
                        .to_owned(),
                )
                .exec_without_returning(db)
                .await
        })
        .await;

        match result {
            Ok(rows) => Ok(rows > 0),
            Err(DbErr::RecordNotInserted) => Ok(false),
            Err(e) => match e.sql_err() {
                Some(SqlErr::UniqueConstraintViolation(_)) => Ok(false),
                // 事件在嵌入期间被擦除
                Some(SqlErr::ForeignKeyConstraintViolation(_)) => {
                    debug!("Event {} vanished before its embedding was stored", event_id);
                    Ok(false)
                }
                _ => Err(PrivalyticsError::database_operation(format!(
                    "Failed to store embedding for event {}: {}",
                    event_id, e
                ))),
            },
        }
    }

    async fn contains(&self, event_id: &str) -> Result<bool> {
        let db = &self.db;
        let count = self
            .run("contains_embedding", || async {
                event_embedding::Entity::find()
                    .filter(event_embedding::Column::EventId.eq(event_id))
                    .count(db)
                    .await
            })
            .await?;
        Ok(count > 0)
    }

    async fn nearest(&self, query: &[f32], k: usize) -> Result<Vec<ScoredSummary>> {
        if k == 0 || query.is_empty() {
            return Ok(Vec::new());
        }
        self.bounded("nearest", self.scan_nearest(query, k)).await
    }
}

impl SeaOrmStorage {
    /// 分页扫描同维度的全部向量，保留得分最高的 k 个
    async fn scan_nearest(&self, query: &[f32], k: usize) -> Result<Vec<ScoredSummary>> {
        let mut top = TopK::new(k);
        let mut pages = event_embedding::Entity::find()
            .select_only()
            .column(event_embedding::Column::EventId)
            .column(event_embedding::Column::Embedding)
            .column(event_embedding::Column::SummaryText)
            .filter(event_embedding::Column::Dimensions.eq(query.len() as i32))
            .order_by_asc(event_embedding::Column::Id)
            .into_tuple::<(String, Vec<u8>, String)>()
            .paginate(&self.db, SCAN_PAGE_SIZE);

        while let Some(rows) = pages.fetch_and_next().await? {
            for (event_id, blob, summary) in rows {
                let vector = match decode_vector(&blob) {
                    Ok(v) => v,
                    Err(e) => {
                        warn!("Skipping corrupt embedding for event {}: {}", event_id, e);
                        continue;
                    }
                };
                let score = crate::embeddings::cosine_similarity(query, &vector);
                top.push(score, (event_id, summary));
            }
        }

        Ok(top
            .into_sorted()
            .into_iter()
            .map(|((event_id, summary), score)| ScoredSummary {
                event_id,
                summary,
                score,
            })
            .collect())
    }
}
