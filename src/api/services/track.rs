//! 事件追踪与同意确认（无需身份）

use actix_web::http::header::USER_AGENT;
use actix_web::{HttpRequest, HttpResponse, Responder, web};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tracing::trace;

use super::helpers::{enforce_rate_limit, error_response};
use crate::errors::PrivalyticsError;
use crate::ratelimit::RateLimiters;
use crate::services::{IngestService, TrackRequest};
use crate::utils::client_address_from_request;

const INVALID_REQUEST: &str = "Invalid request";

fn track_error(err: &PrivalyticsError) -> HttpResponse {
    let message = match err {
        PrivalyticsError::Validation(_) => INVALID_REQUEST,
        other => super::helpers::public_message(other),
    };
    error_response(err, json!({ "success": false, "error": message }))
}

/// POST /api/track
pub async fn track_event(
    req: HttpRequest,
    body: web::Bytes,
    limiters: web::Data<Arc<RateLimiters>>,
    ingest: web::Data<Arc<IngestService>>,
) -> impl Responder {
    // 先限流，再解析请求体
    if let Err(e) = enforce_rate_limit(&limiters.ingest, &req).await {
        return track_error(&e);
    }

    let request: TrackRequest = match serde_json::from_slice(&body) {
        Ok(r) => r,
        Err(e) => {
            trace!("Rejected track body: {}", e);
            return track_error(&PrivalyticsError::validation(e.to_string()));
        }
    };

    let address = client_address_from_request(&req);
    let user_agent = req
        .headers()
        .get(USER_AGENT)
        .and_then(|h| h.to_str().ok())
        .unwrap_or("");

    match ingest.track(request, &address, user_agent).await {
        Ok(event) => HttpResponse::Ok().json(json!({ "success": true, "eventId": event.id })),
        Err(e) => track_error(&e),
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "lowercase")]
enum ConsentAction {
    Grant,
    Revoke,
}

#[derive(Debug, Deserialize)]
struct ConsentRequest {
    action: ConsentAction,
}

/// POST /api/consent
///
/// 同意状态保存在客户端，服务端只做确认
pub async fn record_consent(body: web::Bytes) -> impl Responder {
    match serde_json::from_slice::<ConsentRequest>(&body) {
        Ok(request) => HttpResponse::Ok().json(json!({
            "success": true,
            "consent": matches!(request.action, ConsentAction::Grant),
        })),
        Err(_) => HttpResponse::BadRequest().json(json!({
            "success": false,
            "error": INVALID_REQUEST,
        })),
    }
}
