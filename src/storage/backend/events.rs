//! 事件写入、查询与按指纹擦除

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use sea_orm::{
    ColumnTrait, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder, QuerySelect,
    TransactionTrait, sea_query::OnConflict,
};
use tracing::{info, warn};

use super::converters::{model_to_event, model_to_page, new_event_to_active_model};
use super::{MAX_QUERY_ROWS, SeaOrmStorage};
use crate::errors::{PrivalyticsError, Result};
use crate::storage::models::{Event, EventWithPage, NewEvent};
use crate::utils::TimeRange;
use migration::entities::{event, event_embedding, page};

/// IN 列表分块，避免超出 SQLite 参数上限
const ID_CHUNK: usize = 500;

impl SeaOrmStorage {
    /// 写入事件。重试使用同一个 id，重复写入不会产生两行
    pub async fn record_event(&self, new_event: NewEvent) -> Result<Event> {
        self.record_event_at(new_event, Utc::now()).await
    }

    /// 以指定时间写入事件（演示数据、导入）
    pub async fn record_event_at(
        &self,
        new_event: NewEvent,
        timestamp: DateTime<Utc>,
    ) -> Result<Event> {
        let id = uuid::Uuid::new_v4().to_string();
        let active = new_event_to_active_model(&id, &new_event, timestamp)?;
        let db = &self.db;

        self.run(&format!("record_event({})", id), || async {
            event::Entity::insert(active.clone())
                .on_conflict(OnConflict::column(event::Column::Id).do_nothing().to_owned())
                .exec_without_returning(db)
                .await
                .or_else(|e| match e {
                    sea_orm::DbErr::RecordNotInserted => Ok(0),
                    other => Err(other),
                })
        })
        .await?;

        Ok(Event {
            id,
            page_id: new_event.page_id,
            kind: new_event.kind,
            visitor_hash: new_event.visitor_hash,
            user_agent: new_event.user_agent,
            metadata: new_event.metadata,
            consent_given: new_event.consent_given,
            timestamp,
        })
    }

    pub async fn find_event(&self, event_id: &str) -> Result<Option<EventWithPage>> {
        let db = &self.db;
        let Some(model) = self
            .run("find_event", || async {
                event::Entity::find_by_id(event_id.to_string()).one(db).await
            })
            .await?
        else {
            return Ok(None);
        };
        Ok(self.attach_pages(vec![model]).await?.into_iter().next())
    }

    /// 时间范围内的事件，按时间倒序，最多 1000 条
    pub async fn query_events(
        &self,
        range: &TimeRange,
        consent_only: bool,
    ) -> Result<Vec<EventWithPage>> {
        self.query_events_limited(range, consent_only, MAX_QUERY_ROWS)
            .await
    }

    /// 最近的已同意事件
    pub async fn recent_events(&self, limit: u64) -> Result<Vec<EventWithPage>> {
        self.query_events_limited(&TimeRange::unbounded(), true, limit.min(MAX_QUERY_ROWS))
            .await
    }

    async fn query_events_limited(
        &self,
        range: &TimeRange,
        consent_only: bool,
        limit: u64,
    ) -> Result<Vec<EventWithPage>> {
        let db = &self.db;
        let models = self.run("query_events", || async {
            let mut query = event::Entity::find();
            if consent_only {
                query = query.filter(event::Column::ConsentGiven.eq(true));
            }
            if let Some(start) = range.start {
                query = query.filter(event::Column::Timestamp.gte(start));
            }
            if let Some(end) = range.end {
                query = query.filter(event::Column::Timestamp.lte(end));
            }
            query
                .order_by_desc(event::Column::Timestamp)
                .order_by_desc(event::Column::Id)
                .limit(limit)
                .all(db)
                .await
        })
        .await?;

        self.attach_pages(models).await
    }

    /// 删除某指纹的全部事件及其嵌入（单事务，全有或全无），返回删除的事件数
    pub async fn delete_by_fingerprint(&self, visitor_hash: &str) -> Result<u64> {
        let deleted = self
            .bounded("delete_by_fingerprint", self.erase_in_transaction(visitor_hash))
            .await?;
        if deleted > 0 {
            info!("Erased {} events for one visitor fingerprint", deleted);
        }
        Ok(deleted)
    }

    async fn erase_in_transaction(&self, visitor_hash: &str) -> Result<u64> {
        let txn = self.db.begin().await.map_err(|e| {
            PrivalyticsError::database_operation(format!("Failed to begin transaction: {}", e))
        })?;

        let ids: Vec<String> = event::Entity::find()
            .select_only()
            .column(event::Column::Id)
            .filter(event::Column::VisitorHash.eq(visitor_hash))
            .into_tuple()
            .all(&txn)
            .await?;

        if ids.is_empty() {
            txn.commit().await?;
            return Ok(0);
        }

        for chunk in ids.chunks(ID_CHUNK) {
            event_embedding::Entity::delete_many()
                .filter(event_embedding::Column::EventId.is_in(chunk.iter().cloned()))
                .exec(&txn)
                .await?;
        }

        let deleted = event::Entity::delete_many()
            .filter(event::Column::VisitorHash.eq(visitor_hash))
            .exec(&txn)
            .await?
            .rows_affected;

        txn.commit().await.map_err(|e| {
            PrivalyticsError::database_operation(format!("Failed to commit erasure: {}", e))
        })?;
        Ok(deleted)
    }

    pub async fn count_events_by_fingerprint(&self, visitor_hash: &str) -> Result<u64> {
        let db = &self.db;
        Ok(self
            .run("count_events_by_fingerprint", || async {
                event::Entity::find()
                    .filter(event::Column::VisitorHash.eq(visitor_hash))
                    .count(db)
                    .await
            })
            .await?)
    }

    /// 为事件附加页面信息
    pub(super) async fn attach_pages(
        &self,
        models: Vec<event::Model>,
    ) -> Result<Vec<EventWithPage>> {
        if models.is_empty() {
            return Ok(Vec::new());
        }

        let page_ids: Vec<String> = models
            .iter()
            .map(|m| m.page_id.clone())
            .collect::<HashSet<_>>()
            .into_iter()
            .collect();

        let db = &self.db;
        let mut pages = HashMap::with_capacity(page_ids.len());
        for chunk in page_ids.chunks(ID_CHUNK) {
            let rows = self
                .run("attach_pages", || async {
                    page::Entity::find()
                        .filter(page::Column::Id.is_in(chunk.iter().cloned()))
                        .all(db)
                        .await
                })
                .await?;
            for row in rows {
                pages.insert(row.id.clone(), model_to_page(row));
            }
        }

        let mut result = Vec::with_capacity(models.len());
        for model in models {
            let Some(page) = pages.get(&model.page_id).cloned() else {
                warn!("Event {} references missing page {}", model.id, model.page_id);
                continue;
            };
            match model_to_event(model) {
                Ok(event) => result.push(EventWithPage { event, page }),
                Err(e) => warn!("Skipping unreadable event: {}", e),
            }
        }
        Ok(result)
    }
}
