//! 初始表结构
//!
//! - pages：页面维度表（url 唯一）
//! - events：事件日志，引用 pages
//! - event_embeddings：事件摘要向量，每个事件至多一行，随事件级联删除

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Pages::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Pages::Id)
                            .string_len(36)
                            .not_null()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(Pages::Url)
                            .string_len(2048)
                            .not_null()
                            .unique_key(),
                    )
                    .col(ColumnDef::new(Pages::Title).text().not_null())
                    .col(
                        ColumnDef::new(Pages::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(Events::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Events::Id)
                            .string_len(36)
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Events::PageId).string_len(36).not_null())
                    .col(ColumnDef::new(Events::EventType).string_len(32).not_null())
                    .col(ColumnDef::new(Events::VisitorHash).string_len(64).not_null())
                    .col(ColumnDef::new(Events::UserAgent).text().not_null())
                    .col(ColumnDef::new(Events::Metadata).text().null())
                    .col(
                        ColumnDef::new(Events::ConsentGiven)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(
                        ColumnDef::new(Events::Timestamp)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_events_page_id")
                            .from(Events::Table, Events::PageId)
                            .to(Pages::Table, Pages::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        // 时间范围查询
        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_events_timestamp")
                    .table(Events::Table)
                    .col(Events::Timestamp)
                    .to_owned(),
            )
            .await?;

        // 擦除请求按指纹删除
        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_events_visitor_hash")
                    .table(Events::Table)
                    .col(Events::VisitorHash)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_events_consent_time")
                    .table(Events::Table)
                    .col(Events::ConsentGiven)
                    .col(Events::Timestamp)
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(EventEmbeddings::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(EventEmbeddings::Id)
                            .string_len(36)
                            .not_null()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(EventEmbeddings::EventId)
                            .string_len(36)
                            .not_null()
                            .unique_key(),
                    )
                    .col(ColumnDef::new(EventEmbeddings::Embedding).blob().not_null())
                    .col(
                        ColumnDef::new(EventEmbeddings::Dimensions)
                            .integer()
                            .not_null(),
                    )
                    .col(ColumnDef::new(EventEmbeddings::SummaryText).text().not_null())
                    .col(
                        ColumnDef::new(EventEmbeddings::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_event_embeddings_event_id")
                            .from(EventEmbeddings::Table, EventEmbeddings::EventId)
                            .to(Events::Table, Events::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(EventEmbeddings::Table).to_owned())
            .await?;

        manager
            .drop_index(Index::drop().name("idx_events_consent_time").to_owned())
            .await?;
        manager
            .drop_index(Index::drop().name("idx_events_visitor_hash").to_owned())
            .await?;
        manager
            .drop_index(Index::drop().name("idx_events_timestamp").to_owned())
            .await?;

        manager
            .drop_table(Table::drop().table(Events::Table).to_owned())
            .await?;

        manager
            .drop_table(Table::drop().table(Pages::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum Pages {
    #[sea_orm(iden = "pages")]
    Table,
    Id,
    Url,
    Title,
    CreatedAt,
}

#[derive(DeriveIden)]
enum Events {
    #[sea_orm(iden = "events")]
    Table,
    Id,
    PageId,
    EventType,
    VisitorHash,
    UserAgent,
    Metadata,
    ConsentGiven,
    Timestamp,
}

#[derive(DeriveIden)]
enum EventEmbeddings {
    #[sea_orm(iden = "event_embeddings")]
    Table,
    Id,
    EventId,
    Embedding,
    Dimensions,
    SummaryText,
    CreatedAt,
}
