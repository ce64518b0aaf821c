//! 自然语言问答（需要身份）

use actix_web::{HttpRequest, HttpResponse, web};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;

use super::helpers::{enforce_rate_limit, error_response};
use crate::api::middleware::Caller;
use crate::errors::PrivalyticsError;
use crate::ratelimit::RateLimiters;
use crate::services::InsightService;

#[derive(Debug, Deserialize)]
struct ChatRequest {
    question: String,
}

fn chat_error(err: &PrivalyticsError) -> HttpResponse {
    let message = match err {
        PrivalyticsError::Validation(msg) => msg.as_str(),
        PrivalyticsError::Unauthorized(_) | PrivalyticsError::RateLimited { .. } => err.message(),
        _ => "Failed to process question",
    };
    error_response(err, json!({ "error": message }))
}

/// POST /api/chat
///
/// 客户端断开时 handler future 被丢弃，进行中的模型调用随之取消
pub async fn ask(
    req: HttpRequest,
    caller: Option<Caller>,
    body: web::Bytes,
    limiters: web::Data<Arc<RateLimiters>>,
    insight: web::Data<Arc<InsightService>>,
) -> HttpResponse {
    if caller.is_none() {
        return chat_error(&PrivalyticsError::unauthorized("Unauthorized"));
    }
    if let Err(e) = enforce_rate_limit(&limiters.read, &req).await {
        return chat_error(&e);
    }

    let request: ChatRequest = match serde_json::from_slice(&body) {
        Ok(r) => r,
        Err(_) => return chat_error(&PrivalyticsError::validation("Invalid request")),
    };

    match insight.answer(&request.question).await {
        Ok(insight) => HttpResponse::Ok().json(insight),
        Err(e) => chat_error(&e),
    }
}
