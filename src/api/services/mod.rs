//! HTTP 端点
//!
//! - POST   /api/track                       事件追踪（ingest 限流）
//! - POST   /api/consent                     同意确认
//! - GET    /api/events                      聚合查询（需身份，read 限流）
//! - POST   /api/chat                        问答（需身份，read 限流）
//! - DELETE /api/users/{fingerprint}/delete  擦除（需 admin）
//! - GET    /api/health                      健康检查

pub mod chat;
pub mod events;
pub mod health;
pub mod helpers;
pub mod track;

use actix_web::web;

pub use helpers::{enforce_rate_limit, error_response, public_message};

/// `/api` 路由
pub fn api_routes() -> actix_web::Scope {
    web::scope("/api")
        .route("/track", web::post().to(track::track_event))
        .route("/consent", web::post().to(track::record_consent))
        .route("/events", web::get().to(events::get_events))
        .route("/chat", web::post().to(chat::ask))
        .route(
            "/users/{fingerprint}/delete",
            web::delete().to(events::erase_visitor),
        )
        .route("/health", web::get().to(health::health_check))
        .route("/health", web::head().to(health::health_check))
}
