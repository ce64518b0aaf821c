//! 页面维度表
//!
//! 页面在第一次出现事件时创建，之后只允许把回退为 URL 的标题补成真实标题。
//! 并发创建依赖 url 唯一约束：冲突方不插入，随后重新读取胜出的那一行。

use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, DbErr, EntityTrait, IntoActiveModel,
    QueryFilter, sea_query::OnConflict,
};
use tracing::{debug, info};

use super::SeaOrmStorage;
use super::converters::model_to_page;
use crate::errors::{PrivalyticsError, Result};
use crate::storage::models::Page;
use migration::entities::page;

impl SeaOrmStorage {
    /// 按 URL 幂等地创建页面；`title` 缺省时使用 URL
    pub async fn create_page_if_absent(&self, url: &str, title: Option<&str>) -> Result<Page> {
        let title = title.map(str::trim).filter(|t| !t.is_empty());

        if let Some(cached) = self.page_cache.get(url) {
            return self.backfill_title(cached, title).await;
        }

        if let Some(existing) = self.find_page_by_url(url).await? {
            return self.backfill_title(existing, title).await;
        }

        let db = &self.db;
        let candidate = page::ActiveModel {
            id: Set(uuid::Uuid::new_v4().to_string()),
            url: Set(url.to_string()),
            title: Set(title.unwrap_or(url).to_string()),
            created_at: Set(Utc::now()),
        };

        let inserted = self.run("create_page", || async {
            match page::Entity::insert(candidate.clone())
                .on_conflict(
                    OnConflict::column(page::Column::Url)
                        .do_nothing()
                        .to_owned(),
                )
                .exec_without_returning(db)
                .await
            {
                Ok(rows) => Ok(rows),
                Err(DbErr::RecordNotInserted) => Ok(0),
                Err(e) => Err(e),
            }
        })
        .await?;

        if inserted > 0 {
            info!("Page created: {}", url);
        } else {
            debug!("Page {} created concurrently, re-reading", url);
        }

        let stored = self.find_page_by_url(url).await?.ok_or_else(|| {
            PrivalyticsError::database_operation(format!("Page {} missing after insert", url))
        })?;
        self.backfill_title(stored, title).await
    }

    pub async fn find_page_by_url(&self, url: &str) -> Result<Option<Page>> {
        let db = &self.db;
        let found = self
            .run("find_page_by_url", || async {
                page::Entity::find()
                    .filter(page::Column::Url.eq(url))
                    .one(db)
                    .await
            })
            .await?
            .map(model_to_page);

        if let Some(ref page) = found {
            self.page_cache.insert(page.url.clone(), page.clone());
        }
        Ok(found)
    }

    /// 仅当现有标题是 URL 回退值且调用方给出了真实标题时更新
    async fn backfill_title(&self, page: Page, title: Option<&str>) -> Result<Page> {
        let Some(title) = title else {
            return Ok(page);
        };
        if !page.has_default_title() || title == page.url {
            return Ok(page);
        }

        let model = page::Model {
            id: page.id.clone(),
            url: page.url.clone(),
            title: page.title.clone(),
            created_at: page.created_at,
        };
        let mut active = model.into_active_model();
        active.title = Set(title.to_string());
        let db = &self.db;
        let updated = model_to_page(
            self.run("backfill_title", || {
                let active = active.clone();
                async move { active.update(db).await }
            })
            .await?,
        );

        debug!("Page title backfilled: {}", updated.url);
        self.page_cache.insert(updated.url.clone(), updated.clone());
        Ok(updated)
    }
}
