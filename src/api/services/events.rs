//! 聚合查询与数据擦除（需要身份）

use actix_web::{HttpRequest, HttpResponse, web};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tracing::{error, info};

use super::helpers::{enforce_rate_limit, error_response};
use crate::api::middleware::Caller;
use crate::errors::PrivalyticsError;
use crate::ratelimit::RateLimiters;
use crate::services::{AnalyticsService, ErasureService};
use crate::utils::TimeRange;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventsQuery {
    pub start_date: Option<String>,
    pub end_date: Option<String>,
}

/// GET /api/events?startDate&endDate
pub async fn get_events(
    req: HttpRequest,
    _caller: Caller,
    query: web::Query<EventsQuery>,
    limiters: web::Data<Arc<RateLimiters>>,
    analytics: web::Data<Arc<AnalyticsService>>,
) -> Result<HttpResponse, PrivalyticsError> {
    enforce_rate_limit(&limiters.read, &req).await?;

    let range = TimeRange::parse(query.start_date.as_deref(), query.end_date.as_deref())?;
    let aggregate = analytics.aggregate(&range).await?;
    Ok(HttpResponse::Ok().json(aggregate))
}

/// DELETE /api/users/{fingerprint}/delete
pub async fn erase_visitor(
    caller: Option<Caller>,
    path: web::Path<String>,
    erasure: web::Data<Arc<ErasureService>>,
) -> HttpResponse {
    // 未登录同样返回 403
    let caller = match caller {
        Some(caller) => caller,
        None => {
            return error_response(
                &PrivalyticsError::forbidden("Forbidden"),
                json!({ "error": "Forbidden" }),
            );
        }
    };
    if let Err(e) = caller.require_role(&crate::config::get_config().auth.admin_role) {
        let message = e.message().to_string();
        return error_response(&e, json!({ "error": message }));
    }

    let fingerprint = path.into_inner();
    match erasure.erase(&fingerprint).await {
        Ok(count) => {
            info!("Caller {} erased {} events", caller.subject, count);
            HttpResponse::Ok().json(json!({ "deleted": true, "count": count }))
        }
        Err(e @ PrivalyticsError::Validation(_)) => {
            let message = e.message().to_string();
            error_response(&e, json!({ "error": message }))
        }
        Err(e @ (PrivalyticsError::StoreConnection(_) | PrivalyticsError::StoreOperation(_))) => {
            // 数据已删除，但缓存仍可能展示旧聚合；重试请求会再次失效缓存
            error_response(
                &e,
                json!({
                    "error": "Data deleted but cached analytics could not be refreshed; retry the request"
                }),
            )
        }
        Err(e) => {
            // 擦除在单个事务内完成，失败即未删除任何数据
            error!("Erasure failed: {}", e);
            HttpResponse::InternalServerError().json(json!({ "error": "Failed to delete data" }))
        }
    }
}
