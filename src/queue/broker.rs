//! Queue broker and worker pool.
//!
//! The broker seam is a trait so the in-memory channel can be swapped for
//! a real backend later; `BROKER_URL` / `RESULT_BACKEND` are already
//! carried in config for that purpose.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinHandle;
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::{Error, Result};

use super::store::TaskStore;
use super::task::{Task, TaskRecord};
use super::worker::{execute_task, WorkerContext};

#[async_trait]
pub trait Broker: Send + Sync {
    /// Persist the queued record and hand the task to the worker pool.
    async fn submit(&self, task: Task) -> Result<Uuid>;
}

/// FIFO in-process broker backed by an unbounded channel. Each submitted
/// task is delivered to exactly one worker.
pub struct InMemoryBroker {
    tx: mpsc::UnboundedSender<Task>,
    store: Arc<dyn TaskStore>,
}

impl InMemoryBroker {
    pub fn new(store: Arc<dyn TaskStore>) -> (Self, mpsc::UnboundedReceiver<Task>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx, store }, rx)
    }
}

#[async_trait]
impl Broker for InMemoryBroker {
    async fn submit(&self, task: Task) -> Result<Uuid> {
        let task_id = task.id;
        self.store.insert(TaskRecord::queued(&task)).await;
        self.tx
            .send(task)
            .map_err(|_| Error::Queue("worker pool is not running".into()))?;
        Ok(task_id)
    }
}

/// Pool of parallel executors: one dispatcher draining the channel in
/// FIFO order, a semaphore bounding in-flight tasks.
pub struct WorkerPool {
    handle: JoinHandle<()>,
}

impl WorkerPool {
    pub fn spawn(
        mut rx: mpsc::UnboundedReceiver<Task>,
        store: Arc<dyn TaskStore>,
        ctx: Arc<WorkerContext>,
        workers: usize,
    ) -> Self {
        let workers = workers.max(1);
        info!(workers, "starting worker pool");
        let semaphore = Arc::new(Semaphore::new(workers));

        let handle = tokio::spawn(async move {
            while let Some(task) = rx.recv().await {
                let permit = match Arc::clone(&semaphore).acquire_owned().await {
                    Ok(permit) => permit,
                    Err(_) => {
                        warn!("worker semaphore closed; dropping queue");
                        break;
                    }
                };
                let store = Arc::clone(&store);
                let ctx = Arc::clone(&ctx);
                tokio::spawn(async move {
                    execute_task(task, store, ctx).await;
                    drop(permit);
                });
            }
            info!("worker pool channel closed");
        });

        Self { handle }
    }

    pub fn abort(&self) {
        self.handle.abort();
    }
}
