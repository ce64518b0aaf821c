//! 自然语言问答
//!
//! 嵌入问题 -> 相似检索（索引为空时退回最近事件）-> 组装上下文 -> 生成回答

use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, warn};

use crate::embeddings::{ChatModel, EmbeddingModel, EmbeddingWorker};
use crate::errors::{PrivalyticsError, Result};
use crate::index::SimilarityIndex;
use crate::storage::{EventWithPage, SeaOrmStorage};

pub const SYSTEM_PROMPT: &str = "You are an analytics assistant. Answer questions about website analytics based on the provided event data. Be concise and cite specific data points.";

/// 退回最近事件时取的条数
pub const FALLBACK_CONTEXT_LIMIT: u64 = 20;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Insight {
    pub answer: String,
    pub context_used: usize,
    pub used_vector_search: bool,
}

pub fn compose_user_content(question: &str, context: &[String]) -> String {
    format!("Context:\n{}\n\nQuestion: {}", context.join("\n\n"), question)
}

fn describe_recent(record: &EventWithPage) -> String {
    format!(
        "Event: {} on {} ({}) at {}",
        record.event.kind,
        record.page.url,
        record.page.title,
        record.event.timestamp.to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
    )
}

pub struct InsightService {
    storage: Arc<SeaOrmStorage>,
    index: Arc<dyn SimilarityIndex>,
    embedder: Arc<dyn EmbeddingModel>,
    chat: Arc<dyn ChatModel>,
    worker: Arc<EmbeddingWorker>,
    max_context: usize,
    max_question_chars: usize,
}

impl InsightService {
    pub fn new(
        storage: Arc<SeaOrmStorage>,
        index: Arc<dyn SimilarityIndex>,
        embedder: Arc<dyn EmbeddingModel>,
        chat: Arc<dyn ChatModel>,
        worker: Arc<EmbeddingWorker>,
    ) -> Self {
        Self {
            storage,
            index,
            embedder,
            chat,
            worker,
            max_context: 20,
            max_question_chars: 500,
        }
    }

    pub fn with_limits(mut self, max_context: usize, max_question_chars: usize) -> Self {
        self.max_context = max_context.max(1);
        self.max_question_chars = max_question_chars.max(1);
        self
    }

    fn validate<'a>(&self, question: &'a str) -> Result<&'a str> {
        let question = question.trim();
        let chars = question.chars().count();
        if chars == 0 {
            return Err(PrivalyticsError::validation("question must not be empty"));
        }
        if chars > self.max_question_chars {
            return Err(PrivalyticsError::validation(format!(
                "question must be at most {} characters",
                self.max_question_chars
            )));
        }
        Ok(question)
    }

    /// 检索上下文，返回 (上下文, 是否使用了相似检索)
    async fn retrieve(&self, question: &str) -> Result<(Vec<String>, bool)> {
        match self.embedder.embed(question).await {
            Ok(vector) => {
                let hits = self.index.nearest(&vector, self.max_context).await?;
                if !hits.is_empty() {
                    debug!("Retrieved {} similar events", hits.len());
                    return Ok((hits.into_iter().map(|h| h.summary).collect(), true));
                }
                debug!("Similarity index is empty, using recent events");
            }
            Err(e) => {
                warn!("Failed to embed question, using recent events: {}", e);
            }
        }

        let limit = FALLBACK_CONTEXT_LIMIT.min(self.max_context as u64);
        let recent = self.storage.recent_events(limit).await?;
        Ok((recent.iter().map(describe_recent).collect(), false))
    }

    pub async fn answer(&self, question: &str) -> Result<Insight> {
        let question = self.validate(question)?;

        // 顺带推进嵌入积压，不等待
        self.worker.trigger();

        let (context, used_vector_search) = self.retrieve(question).await?;
        let user_content = compose_user_content(question, &context);

        let answer = self
            .chat
            .complete(SYSTEM_PROMPT, &user_content)
            .await
            .map_err(|e| match e {
                PrivalyticsError::Generation(_) => e,
                other => PrivalyticsError::generation(other.to_string()),
            })?;

        Ok(Insight {
            answer,
            context_used: context.len(),
            used_vector_search,
        })
    }
}
