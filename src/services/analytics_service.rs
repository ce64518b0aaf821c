//! 聚合查询
//!
//! 仅统计已同意的事件。结果按时间范围缓存，写入事件时全局失效。

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::cache::{AggregateCache, CacheLookup};
use crate::errors::Result;
use crate::storage::{EventKind, EventWithPage, Metadata, Page, SeaOrmStorage};
use crate::utils::TimeRange;

pub const RECENT_EVENTS_LIMIT: usize = 50;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageStat {
    pub url: String,
    pub title: String,
    pub views: u64,
    pub clicks: u64,
}

/// 对外展示的事件
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventView {
    pub id: String,
    pub page_id: String,
    pub event_type: EventKind,
    pub visitor_hash: String,
    pub user_agent: String,
    pub metadata: Metadata,
    pub consent_given: bool,
    pub timestamp: DateTime<Utc>,
    pub page: Page,
}

impl From<EventWithPage> for EventView {
    fn from(record: EventWithPage) -> Self {
        let EventWithPage { event, page } = record;
        Self {
            id: event.id,
            page_id: event.page_id,
            event_type: event.kind,
            visitor_hash: event.visitor_hash,
            user_agent: event.user_agent,
            metadata: event.metadata,
            consent_given: event.consent_given,
            timestamp: event.timestamp,
            page,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Aggregate {
    pub total_views: u64,
    pub unique_visitors: u64,
    pub total_events: u64,
    pub page_stats: Vec<PageStat>,
    pub recent_events: Vec<EventView>,
}

impl Aggregate {
    /// `records` 须按时间倒序
    pub fn compute(records: Vec<EventWithPage>) -> Self {
        let total_events = records.len() as u64;
        let mut total_views = 0;
        let mut visitors = HashSet::new();
        // 按首次出现顺序输出页面
        let mut order: Vec<String> = Vec::new();
        let mut stats: HashMap<String, PageStat> = HashMap::new();

        for record in &records {
            visitors.insert(record.event.visitor_hash.as_str());
            let stat = stats.entry(record.page.url.clone()).or_insert_with(|| {
                order.push(record.page.url.clone());
                PageStat {
                    url: record.page.url.clone(),
                    title: record.page.title.clone(),
                    views: 0,
                    clicks: 0,
                }
            });
            match record.event.kind {
                EventKind::Pageview => {
                    stat.views += 1;
                    total_views += 1;
                }
                EventKind::Click => stat.clicks += 1,
                EventKind::FormSubmit => {}
            }
        }
        let unique_visitors = visitors.len() as u64;

        let page_stats = order
            .into_iter()
            .filter_map(|url| stats.remove(&url))
            .collect();
        let recent_events = records
            .into_iter()
            .take(RECENT_EVENTS_LIMIT)
            .map(EventView::from)
            .collect();

        Self {
            total_views,
            unique_visitors,
            total_events,
            page_stats,
            recent_events,
        }
    }
}

pub struct AnalyticsService {
    storage: Arc<SeaOrmStorage>,
    cache: Arc<AggregateCache>,
}

impl AnalyticsService {
    pub fn new(storage: Arc<SeaOrmStorage>, cache: Arc<AggregateCache>) -> Self {
        Self { storage, cache }
    }

    /// 读穿缓存：命中直接返回，未命中则计算并按读取时的代际回填
    pub async fn aggregate(&self, range: &TimeRange) -> Result<Aggregate> {
        let generation = match self.cache.get::<Aggregate>(range).await {
            CacheLookup::Hit(aggregate) => return Ok(aggregate),
            CacheLookup::Miss { generation } => generation,
        };

        let records = self.storage.query_events(range, true).await?;
        let aggregate = Aggregate::compute(records);
        debug!(
            "Computed aggregate for {}: {} events",
            range.cache_token(),
            aggregate.total_events
        );

        if let Some(generation) = generation {
            self.cache.put(range, generation, &aggregate).await;
        }
        Ok(aggregate)
    }
}
