//! Event summary embedding entity

use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "event_embeddings")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    #[sea_orm(unique)]
    pub event_id: String,
    /// Little-endian f32 vector
    #[sea_orm(column_type = "Blob")]
    pub embedding: Vec<u8>,
    pub dimensions: i32,
    #[sea_orm(column_type = "Text")]
    pub summary_text: String,
    pub created_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
