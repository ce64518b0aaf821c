//! 相似度索引
//!
//! 每个事件至多一个向量，先写入者胜出。`nearest` 按余弦相似度降序返回。

use async_trait::async_trait;

use crate::errors::Result;
use crate::storage::ScoredSummary;

#[async_trait]
pub trait SimilarityIndex: Send + Sync {
    /// 写入事件向量；已存在时不做任何修改并返回 false
    async fn upsert(&self, event_id: &str, vector: &[f32], summary: &str) -> Result<bool>;

    async fn contains(&self, event_id: &str) -> Result<bool>;

    /// 返回与查询向量最相近的 k 条摘要；索引为空时返回空列表
    async fn nearest(&self, query: &[f32], k: usize) -> Result<Vec<ScoredSummary>>;
}
