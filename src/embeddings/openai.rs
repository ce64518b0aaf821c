//! OpenAI 兼容的 embeddings / chat completions 客户端
//!
//! 请求 future 被丢弃时连接随之关闭，客户端断开会中止出站调用。

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{ChatModel, EmbeddingModel};
use crate::config::{EmbeddingsConfig, InsightConfig};
use crate::errors::{PrivalyticsError, Result};
use crate::utils::retry::{self, RetryConfig};

/// 模型返回空内容时的回答
pub const EMPTY_ANSWER: &str = "I couldn't generate a response.";

pub struct OpenAiClient {
    client: Client,
    api_base: String,
    api_key: String,
    embedding_model: String,
    dimensions: usize,
    chat_model: String,
    embed_timeout: Duration,
    chat_timeout: Duration,
    embed_retry: RetryConfig,
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a str,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatReply,
}

#[derive(Deserialize)]
struct ChatReply {
    #[serde(default)]
    content: Option<String>,
}

impl OpenAiClient {
    pub fn new(embeddings: &EmbeddingsConfig, insight: &InsightConfig) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| {
                PrivalyticsError::config(format!("Failed to build HTTP client: {}", e))
            })?;

        Ok(Self {
            client,
            api_base: embeddings.api_base.trim_end_matches('/').to_string(),
            api_key: embeddings.api_key.clone(),
            embedding_model: embeddings.model.clone(),
            dimensions: embeddings.dimensions,
            chat_model: insight.chat_model.clone(),
            embed_timeout: Duration::from_secs(embeddings.timeout_secs.max(1)),
            chat_timeout: Duration::from_secs(insight.timeout_secs.max(1)),
            embed_retry: RetryConfig {
                max_retries: embeddings.max_retries,
                base_delay_ms: 250,
                max_delay_ms: 4000,
            },
        })
    }

    async fn post_json<Req: Serialize, Resp: for<'de> Deserialize<'de>>(
        &self,
        path: &str,
        body: &Req,
        timeout: Duration,
    ) -> Result<Resp> {
        let response = self
            .client
            .post(format!("{}{}", self.api_base, path))
            .timeout(timeout)
            .bearer_auth(&self.api_key)
            .json(body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            let detail: String = detail.chars().take(300).collect();
            return Err(classify_status(status, path, &detail));
        }

        response.json::<Resp>().await.map_err(|e| {
            PrivalyticsError::dependency_permanent(format!("Malformed response from {}: {}", path, e))
        })
    }
}

/// 429 与 5xx 视为暂时性错误，其余 4xx 为永久性错误
pub fn classify_status(status: StatusCode, path: &str, detail: &str) -> PrivalyticsError {
    let message = format!("{} returned {}: {}", path, status.as_u16(), detail);
    if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
        PrivalyticsError::dependency_transient(message)
    } else {
        PrivalyticsError::dependency_permanent(message)
    }
}

#[async_trait]
impl EmbeddingModel for OpenAiClient {
    fn model_name(&self) -> &str {
        &self.embedding_model
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        if text.trim().is_empty() {
            return Err(PrivalyticsError::dependency_permanent(
                "Cannot embed empty text",
            ));
        }

        let request = EmbeddingRequest {
            model: &self.embedding_model,
            input: text,
        };

        let response: EmbeddingResponse = retry::with_retry("embed", self.embed_retry, || {
            self.post_json("/embeddings", &request, self.embed_timeout)
        })
        .await?;

        let embedding = response
            .data
            .into_iter()
            .next()
            .map(|d| d.embedding)
            .ok_or_else(|| {
                PrivalyticsError::dependency_permanent("Embedding response contained no data")
            })?;

        debug!(
            "Embedded {} chars into {} dimensions",
            text.len(),
            embedding.len()
        );
        Ok(embedding)
    }
}

#[async_trait]
impl ChatModel for OpenAiClient {
    fn model_name(&self) -> &str {
        &self.chat_model
    }

    async fn complete(&self, system_prompt: &str, user_content: &str) -> Result<String> {
        let request = ChatRequest {
            model: &self.chat_model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: system_prompt,
                },
                ChatMessage {
                    role: "user",
                    content: user_content,
                },
            ],
        };

        let response: ChatResponse = self
            .post_json("/chat/completions", &request, self.chat_timeout)
            .await
            .map_err(|e| PrivalyticsError::generation(e.message().to_string()))?;

        Ok(response
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty())
            .unwrap_or_else(|| EMPTY_ANSWER.to_string()))
    }
}
