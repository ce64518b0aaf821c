//! 后台嵌入任务
//!
//! 请求路径只调用 `trigger()`：向有界队列投递一个信号，队列满时丢弃，
//! 永不阻塞请求。后台 worker 每收到一个信号就处理一批待嵌入事件。

use std::sync::{
    Arc,
    atomic::{AtomicU64, Ordering},
};

use parking_lot::Mutex as SyncMutex;
use serde::Serialize;
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

use super::EmbeddingPipeline;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkerStats {
    pub triggers: u64,
    pub dropped_triggers: u64,
    pub embedded: u64,
    pub skipped: u64,
    pub failed: u64,
}

#[derive(Default)]
struct Counters {
    triggers: AtomicU64,
    dropped_triggers: AtomicU64,
    embedded: AtomicU64,
    skipped: AtomicU64,
    failed: AtomicU64,
}

impl Counters {
    fn snapshot(&self) -> WorkerStats {
        WorkerStats {
            triggers: self.triggers.load(Ordering::Relaxed),
            dropped_triggers: self.dropped_triggers.load(Ordering::Relaxed),
            embedded: self.embedded.load(Ordering::Relaxed),
            skipped: self.skipped.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
        }
    }
}

pub struct EmbeddingWorker {
    /// None 表示未启用或已关闭
    sender: SyncMutex<Option<mpsc::Sender<()>>>,
    handles: SyncMutex<Vec<JoinHandle<()>>>,
    counters: Arc<Counters>,
}

impl EmbeddingWorker {
    /// 启动 `workers` 个后台任务，共享一个容量为 `capacity` 的触发队列
    pub fn start(
        pipeline: Arc<EmbeddingPipeline>,
        workers: usize,
        capacity: usize,
        batch_size: u64,
    ) -> Self {
        let (tx, rx) = mpsc::channel::<()>(capacity.max(1));
        let rx = Arc::new(Mutex::new(rx));
        let counters = Arc::new(Counters::default());
        let workers = workers.max(1);

        let mut handles = Vec::with_capacity(workers);
        for worker_id in 0..workers {
            let rx = Arc::clone(&rx);
            let pipeline = Arc::clone(&pipeline);
            let counters = Arc::clone(&counters);
            handles.push(tokio::spawn(async move {
                loop {
                    // 持锁仅限于取信号
                    let signal = { rx.lock().await.recv().await };
                    if signal.is_none() {
                        break;
                    }

                    match pipeline.drain(batch_size).await {
                        Ok(report) => {
                            counters
                                .embedded
                                .fetch_add(report.embedded, Ordering::Relaxed);
                            counters
                                .skipped
                                .fetch_add(report.skipped, Ordering::Relaxed);
                            counters.failed.fetch_add(report.failed, Ordering::Relaxed);
                            if report.attempted > 0 {
                                debug!(
                                    "Embedding worker {}: embedded {}, skipped {}, failed {} in {:?}",
                                    worker_id,
                                    report.embedded,
                                    report.skipped,
                                    report.failed,
                                    report.elapsed
                                );
                            }
                        }
                        Err(e) => {
                            counters.failed.fetch_add(1, Ordering::Relaxed);
                            warn!("Embedding worker {}: drain failed: {}", worker_id, e);
                        }
                    }
                }
                trace!("Embedding worker {} stopped", worker_id);
            }));
        }

        info!(
            "Embedding worker started ({} task(s), queue capacity {}, batch size {})",
            workers, capacity, batch_size
        );

        Self {
            sender: SyncMutex::new(Some(tx)),
            handles: SyncMutex::new(handles),
            counters,
        }
    }

    /// 不启动任何任务，`trigger()` 为空操作
    pub fn disabled() -> Self {
        Self {
            sender: SyncMutex::new(None),
            handles: SyncMutex::new(Vec::new()),
            counters: Arc::new(Counters::default()),
        }
    }

    pub fn is_running(&self) -> bool {
        self.sender.lock().is_some()
    }

    /// 请求一次后台处理，立即返回
    pub fn trigger(&self) {
        let guard = self.sender.lock();
        let Some(sender) = guard.as_ref() else {
            return;
        };
        match sender.try_send(()) {
            Ok(()) => {
                self.counters.triggers.fetch_add(1, Ordering::Relaxed);
            }
            Err(mpsc::error::TrySendError::Full(())) => {
                // 队列中已有足够的待处理信号
                self.counters
                    .dropped_triggers
                    .fetch_add(1, Ordering::Relaxed);
                trace!("Embedding trigger dropped, queue full");
            }
            Err(mpsc::error::TrySendError::Closed(())) => {
                trace!("Embedding trigger ignored, worker closed");
            }
        }
    }

    pub fn stats(&self) -> WorkerStats {
        self.counters.snapshot()
    }

    /// 关闭队列并等待已排队的信号处理完
    pub async fn shutdown(&self) {
        let sender = self.sender.lock().take();
        if sender.is_none() {
            return;
        }
        drop(sender);

        let handles: Vec<JoinHandle<()>> = std::mem::take(&mut *self.handles.lock());
        for handle in handles {
            if let Err(e) = handle.await {
                warn!("Embedding worker task ended abnormally: {}", e);
            }
        }
        info!("Embedding worker stopped: {:?}", self.stats());
    }
}
