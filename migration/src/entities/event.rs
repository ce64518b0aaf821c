//! Tracked event entity

use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq)]
#[sea_orm(table_name = "events")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    pub page_id: String,
    /// pageview | click | form_submit
    pub event_type: String,
    /// SHA-256 visitor fingerprint (hex)
    pub visitor_hash: String,
    #[sea_orm(column_type = "Text")]
    pub user_agent: String,
    /// Serialized JSON object, display only
    #[sea_orm(column_type = "Text", nullable)]
    pub metadata: Option<String>,
    pub consent_given: bool,
    pub timestamp: DateTimeUtc,
    /// 嵌入失败次数
    pub embed_attempts: i32,
    pub embed_failed_at: Option<DateTimeUtc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
