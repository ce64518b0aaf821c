//! 嵌入生成
//!
//! - `EmbeddingModel` / `ChatModel`：外部模型接口
//! - `OpenAiClient`：OpenAI 兼容 HTTP 实现
//! - `EmbeddingPipeline`：事件 -> 摘要 -> 向量 -> 索引
//! - `EmbeddingWorker`：有界触发队列，后台批量处理

pub mod openai;
pub mod pipeline;
pub mod vector;
pub mod worker;

use async_trait::async_trait;

use crate::errors::{PrivalyticsError, Result};

pub use openai::OpenAiClient;
pub use pipeline::{DrainReport, EmbedOutcome, EmbeddingPipeline, summarize_event};
pub use vector::{TopK, cosine_similarity, decode_vector, encode_vector};
pub use worker::{EmbeddingWorker, WorkerStats};

#[async_trait]
pub trait EmbeddingModel: Send + Sync {
    fn model_name(&self) -> &str;

    /// 输出向量维度
    fn dimensions(&self) -> usize;

    async fn embed(&self, text: &str) -> Result<Vec<f32>>;
}

#[async_trait]
pub trait ChatModel: Send + Sync {
    fn model_name(&self) -> &str;

    async fn complete(&self, system_prompt: &str, user_content: &str) -> Result<String>;
}

/// 未配置 API key 时使用的占位实现
pub struct DisabledModel {
    pub dimensions: usize,
}

#[async_trait]
impl EmbeddingModel for DisabledModel {
    fn model_name(&self) -> &str {
        "disabled"
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
        Err(PrivalyticsError::dependency_permanent(
            "Embedding model is not configured",
        ))
    }
}

#[async_trait]
impl ChatModel for DisabledModel {
    fn model_name(&self) -> &str {
        "disabled"
    }

    async fn complete(&self, _system_prompt: &str, _user_content: &str) -> Result<String> {
        Err(PrivalyticsError::generation("Chat model is not configured"))
    }
}
