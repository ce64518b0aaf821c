//! 业务服务层
//!
//! HTTP 处理器与 CLI 共用的业务逻辑，处理器只负责协议转换。

mod analytics_service;
mod erasure_service;
mod ingest_service;
mod insight_service;

pub use analytics_service::{Aggregate, AnalyticsService, EventView, PageStat, RECENT_EVENTS_LIMIT};
pub use erasure_service::ErasureService;
pub use ingest_service::{IngestService, TrackRequest};
pub use insight_service::{
    FALLBACK_CONTEXT_LIMIT, Insight, InsightService, SYSTEM_PROMPT, compose_user_content,
};
