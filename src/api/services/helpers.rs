//! API 帮助函数

use actix_web::http::StatusCode;
use actix_web::http::header::{CONTENT_TYPE, RETRY_AFTER};
use actix_web::{HttpRequest, HttpResponse, ResponseError};
use serde_json::json;
use tracing::{debug, error};

use crate::errors::PrivalyticsError;
use crate::ratelimit::RateLimiter;
use crate::utils::client_address_from_request;

impl ResponseError for PrivalyticsError {
    fn status_code(&self) -> StatusCode {
        StatusCode::from_u16(self.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
    }

    fn error_response(&self) -> HttpResponse {
        error_response(self, json!({ "error": public_message(self) }))
    }
}

/// 对外暴露的错误信息，内部错误不泄露细节
pub fn public_message(err: &PrivalyticsError) -> &str {
    match err {
        PrivalyticsError::Validation(_)
        | PrivalyticsError::Unauthorized(_)
        | PrivalyticsError::Forbidden(_)
        | PrivalyticsError::RateLimited { .. }
        | PrivalyticsError::NotFound(_) => err.message(),
        PrivalyticsError::DependencyTransient(_)
        | PrivalyticsError::DatabaseConnection(_)
        | PrivalyticsError::StoreConnection(_) => "Service temporarily unavailable",
        _ => "Internal server error",
    }
}

/// 按错误类型构建响应；429 附带 Retry-After
pub fn error_response(err: &PrivalyticsError, body: serde_json::Value) -> HttpResponse {
    let status = err.status_code();
    if status.is_server_error() {
        error!("Request failed: {}", err);
    } else {
        debug!("Request rejected: {}", err);
    }

    let mut builder = HttpResponse::build(status);
    builder.insert_header((CONTENT_TYPE, "application/json; charset=utf-8"));
    if let PrivalyticsError::RateLimited { retry_after, .. } = err {
        builder.insert_header((RETRY_AFTER, retry_after.to_string()));
    }
    builder.json(body)
}

/// 按客户端地址限流
pub async fn enforce_rate_limit(
    limiter: &RateLimiter,
    req: &HttpRequest,
) -> Result<(), PrivalyticsError> {
    let address = client_address_from_request(req);
    let admission = limiter.admit(&address).await;
    if admission.allowed {
        Ok(())
    } else {
        debug!("{} limiter rejected {}", limiter.class(), address);
        Err(PrivalyticsError::rate_limited(admission.retry_after_seconds))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rate_limited_response_has_retry_after() {
        let err = PrivalyticsError::rate_limited(42);
        let response = err.error_response();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(
            response.headers().get(RETRY_AFTER).unwrap().to_str().unwrap(),
            "42"
        );
    }

    #[test]
    fn test_internal_details_are_hidden() {
        let err = PrivalyticsError::database_operation("UNIQUE constraint failed: pages.url");
        assert_eq!(public_message(&err), "Internal server error");
        assert_eq!(err.error_response().status(), StatusCode::INTERNAL_SERVER_ERROR);

        let err = PrivalyticsError::validation("question must not be empty");
        assert_eq!(public_message(&err), "question must not be empty");
    }
}
