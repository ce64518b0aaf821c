//! Server mode

use actix_cors::Cors;
use actix_web::{
    App, HttpServer,
    middleware::{Compress, DefaultHeaders},
};
use anyhow::{Context, Result};
use tracing::{error, warn};

use crate::api::configure_api;
use crate::api::middleware::TimingMiddleware;
use crate::config::{CorsConfig, get_config};
use crate::runtime::lifetime::{self, shutdown};

/// Build CORS middleware from configuration
fn build_cors_middleware(cors_config: &CorsConfig) -> Cors {
    // 未启用时使用浏览器默认的同源策略
    if !cors_config.enabled {
        return Cors::default();
    }

    let mut cors = Cors::default()
        .allowed_methods(vec!["GET", "POST", "DELETE", "OPTIONS"])
        .allowed_headers(vec![
            actix_web::http::header::CONTENT_TYPE,
            actix_web::http::header::AUTHORIZATION,
            actix_web::http::header::ACCEPT,
        ])
        .max_age(cors_config.max_age);

    if cors_config.allowed_origins.iter().any(|o| o == "*") {
        cors = cors.allow_any_origin();
    } else {
        for origin in &cors_config.allowed_origins {
            cors = cors.allowed_origin(origin);
        }
    }
    cors
}

/// Run the HTTP server
///
/// **Note**: Logging system must be initialized before calling this function
pub async fn run_server() -> Result<()> {
    let context = lifetime::prepare_server_startup().await.map_err(|e| {
        error!("Server startup failed: {}", e);
        e
    })?;

    let config = get_config();
    let cors_config = config.cors.clone();
    if cors_config.enabled && cors_config.allowed_origins.is_empty() {
        warn!("CORS enabled but allowed_origins is empty; no cross-origin requests will be allowed");
    }

    let cpu_count = config.server.cpu_count.clamp(1, 32);
    let bind_address = format!("{}:{}", config.server.host, config.server.port);

    let app_context = context.clone();
    let server = HttpServer::new(move || {
        App::new()
            .wrap(TimingMiddleware)
            .wrap(build_cors_middleware(&cors_config))
            .wrap(Compress::default())
            .wrap(DefaultHeaders::new().add(("Cache-Control", "no-store")))
            .configure(configure_api(app_context.clone()))
    })
    .keep_alive(std::time::Duration::from_secs(30))
    .client_request_timeout(std::time::Duration::from_millis(5000))
    .workers(cpu_count)
    .disable_signals()
    .bind(&bind_address)
    .with_context(|| format!("Failed to bind {}", bind_address))?
    .run();

    warn!("Starting server at http://{} with {} workers", bind_address, cpu_count);

    let handle = server.handle();
    actix_web::rt::spawn(async move {
        shutdown::wait_for_signal().await;
        handle.stop(true).await;
    });

    server.await?;
    shutdown::perform_shutdown_tasks(&context).await;
    Ok(())
}
