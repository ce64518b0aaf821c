use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use strum::{AsRefStr, EnumString};

/// 事件类型
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, AsRefStr, EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum EventKind {
    Pageview,
    Click,
    FormSubmit,
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_ref())
    }
}

/// 事件元数据：键唯一，仅用于展示
pub type Metadata = Map<String, Value>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Page {
    pub id: String,
    pub url: String,
    pub title: String,
    pub created_at: DateTime<Utc>,
}

impl Page {
    /// 标题是否仍是创建时回退的 URL
    pub fn has_default_title(&self) -> bool {
        self.title == self.url
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub id: String,
    pub page_id: String,
    pub kind: EventKind,
    pub visitor_hash: String,
    pub user_agent: String,
    pub metadata: Metadata,
    pub consent_given: bool,
    pub timestamp: DateTime<Utc>,
}

/// 写入事件所需字段
#[derive(Debug, Clone)]
pub struct NewEvent {
    pub page_id: String,
    pub kind: EventKind,
    pub visitor_hash: String,
    pub user_agent: String,
    pub metadata: Metadata,
    pub consent_given: bool,
}

/// 事件连同其所属页面
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventWithPage {
    pub event: Event,
    pub page: Page,
}

/// 相似度检索结果
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoredSummary {
    pub event_id: String,
    pub summary: String,
    pub score: f32,
}

/// 嵌入覆盖率统计
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct EmbeddingCoverage {
    pub consented_events: u64,
    pub embedded_events: u64,
}

impl EmbeddingCoverage {
    pub fn ratio(&self) -> f64 {
        if self.consented_events == 0 {
            return 1.0;
        }
        self.embedded_events as f64 / self.consented_events as f64
    }
}
