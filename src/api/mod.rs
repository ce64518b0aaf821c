//! HTTP 接口层
//!
//! - `jwt`：调用方 token
//! - `middleware`：身份解析、请求日志
//! - `services`：各端点处理器

pub mod jwt;
pub mod middleware;
pub mod services;

use actix_web::web;

use crate::runtime::lifetime::AppContext;
use middleware::CallerAuth;

/// 注册 `/api` 路由及其依赖，服务器与测试共用
pub fn configure_api(context: AppContext) -> impl Fn(&mut web::ServiceConfig) + Clone {
    move |cfg: &mut web::ServiceConfig| {
        cfg.app_data(web::Data::new(context.storage.clone()))
            .app_data(web::Data::new(context.limiters.clone()))
            .app_data(web::Data::new(context.worker.clone()))
            .app_data(web::Data::new(context.ingest.clone()))
            .app_data(web::Data::new(context.analytics.clone()))
            .app_data(web::Data::new(context.insight.clone()))
            .app_data(web::Data::new(context.erasure.clone()))
            .app_data(web::PayloadConfig::new(context.payload_limit))
            .service(
                services::api_routes().wrap(CallerAuth::new(context.jwt.clone())),
            );
    }
}
