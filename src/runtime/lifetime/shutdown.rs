use std::time::Duration;
use tokio::signal;
use tokio::time::timeout;
use tracing::{error, info, warn};

use super::AppContext;

/// 等待后台嵌入任务结束的最长时间（秒）
const TASK_TIMEOUT_SECS: u64 = 30;

/// 等待 Ctrl+C
pub async fn wait_for_signal() {
    match signal::ctrl_c().await {
        Ok(()) => info!("Shutdown signal received"),
        Err(e) => warn!(
            "Failed to listen for Ctrl+C: {}. Proceeding with shutdown anyway.",
            e
        ),
    }
}

/// HTTP 服务停止后调用：关闭嵌入队列并等待进行中的批次，然后关闭连接池
pub async fn perform_shutdown_tasks(context: &AppContext) {
    match timeout(
        Duration::from_secs(TASK_TIMEOUT_SECS),
        context.worker.shutdown(),
    )
    .await
    {
        Ok(()) => info!("Embedding worker drained"),
        Err(_) => error!(
            "Embedding worker did not stop within {} seconds",
            TASK_TIMEOUT_SECS
        ),
    }

    if let Err(e) = context.storage.get_db().clone().close().await {
        warn!("Failed to close database pool: {}", e);
    }
    info!("Shutdown complete");
}
