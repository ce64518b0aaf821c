use actix_web::{HttpResponse, Responder, web};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, trace};

use crate::embeddings::EmbeddingWorker;
use crate::storage::SeaOrmStorage;

const HEALTH_TIMEOUT: Duration = Duration::from_secs(5);

/// GET /api/health
///
/// 只检查数据库；嵌入队列计数器附带返回，便于观察积压
pub async fn health_check(
    storage: web::Data<Arc<SeaOrmStorage>>,
    worker: web::Data<Arc<EmbeddingWorker>>,
) -> impl Responder {
    trace!("Received health check request");
    let timestamp = chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true);

    let db_ok = match tokio::time::timeout(HEALTH_TIMEOUT, storage.ping()).await {
        Ok(Ok(())) => true,
        Ok(Err(e)) => {
            error!("Database health check failed: {}", e);
            false
        }
        Err(_) => {
            error!("Database health check timed out");
            false
        }
    };

    if db_ok {
        HttpResponse::Ok().json(json!({
            "status": "ok",
            "db": true,
            "timestamp": timestamp,
            "embeddings": worker.stats(),
        }))
    } else {
        HttpResponse::InternalServerError().json(json!({
            "status": "error",
            "db": false,
            "timestamp": timestamp,
        }))
    }
}
