//! Task-state store: concurrent map of task records with monotonic state
//! transitions and bounded retention of terminal results.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::RwLock;
use tracing::warn;
use uuid::Uuid;

use super::task::{TaskRecord, TaskState};

#[async_trait]
pub trait TaskStore: Send + Sync {
    async fn insert(&self, record: TaskRecord);

    /// Apply a bare state transition. Returns false when the transition
    /// would violate monotonicity or the id is unknown.
    async fn transition(&self, task_id: Uuid, state: TaskState) -> bool;

    /// Terminal success with the handler's result map.
    async fn complete(&self, task_id: Uuid, result: Value) -> bool;

    /// Terminal failure with a descriptive `info` string.
    async fn fail(&self, task_id: Uuid, info: String) -> bool;

    async fn lookup(&self, task_id: &Uuid) -> Option<TaskRecord>;

    /// Block until the task reaches a terminal state, or `timeout` elapses
    /// (`None`). Used by the synchronous download path.
    async fn wait_terminal(&self, task_id: Uuid, timeout: Duration) -> Option<TaskRecord> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if let Some(record) = self.lookup(&task_id).await {
                if record.state.is_terminal() {
                    return Some(record);
                }
            }
            if tokio::time::Instant::now() >= deadline {
                return None;
            }
            tokio::time::sleep(Duration::from_millis(250)).await;
        }
    }
}

struct StoreInner {
    records: HashMap<Uuid, TaskRecord>,
    order: VecDeque<Uuid>,
}

/// In-memory store. Results are retained until the retention cap forces
/// the oldest terminal records out.
pub struct MemoryTaskStore {
    inner: Arc<RwLock<StoreInner>>,
    max_results: usize,
}

impl MemoryTaskStore {
    pub fn new(max_results: usize) -> Self {
        Self {
            inner: Arc::new(RwLock::new(StoreInner {
                records: HashMap::new(),
                order: VecDeque::new(),
            })),
            max_results: max_results.max(1),
        }
    }

    fn prune(inner: &mut StoreInner, max_results: usize) {
        while inner.records.len() > max_results {
            // oldest-first, but never drop a record still in flight
            let Some(pos) = inner
                .order
                .iter()
                .position(|id| {
                    inner
                        .records
                        .get(id)
                        .map(|r| r.state.is_terminal())
                        .unwrap_or(true)
                })
            else {
                break;
            };
            if let Some(id) = inner.order.remove(pos) {
                inner.records.remove(&id);
            }
        }
    }

    async fn finish(&self, task_id: Uuid, state: TaskState, result: Option<Value>, info: Option<String>) -> bool {
        let mut inner = self.inner.write().await;
        let Some(record) = inner.records.get_mut(&task_id) else {
            warn!(%task_id, "finish for unknown task");
            return false;
        };
        if !record.state.can_transition_to(state) {
            warn!(%task_id, from = record.state.as_str(), to = state.as_str(), "rejected state transition");
            return false;
        }
        record.state = state;
        record.result = result;
        record.info = info;
        record.updated_at = chrono::Utc::now();
        true
    }
}

impl Default for MemoryTaskStore {
    fn default() -> Self {
        Self::new(1000)
    }
}

#[async_trait]
impl TaskStore for MemoryTaskStore {
    async fn insert(&self, record: TaskRecord) {
        let mut inner = self.inner.write().await;
        inner.order.push_back(record.task_id);
        inner.records.insert(record.task_id, record);
        Self::prune(&mut inner, self.max_results);
    }

    async fn transition(&self, task_id: Uuid, state: TaskState) -> bool {
        let mut inner = self.inner.write().await;
        let Some(record) = inner.records.get_mut(&task_id) else {
            warn!(%task_id, "transition for unknown task");
            return false;
        };
        if !record.state.can_transition_to(state) {
            warn!(%task_id, from = record.state.as_str(), to = state.as_str(), "rejected state transition");
            return false;
        }
        record.state = state;
        record.updated_at = chrono::Utc::now();
        true
    }

    async fn complete(&self, task_id: Uuid, result: Value) -> bool {
        self.finish(task_id, TaskState::Succeeded, Some(result), None)
            .await
    }

    async fn fail(&self, task_id: Uuid, info: String) -> bool {
        self.finish(task_id, TaskState::Failed, None, Some(info))
            .await
    }

    async fn lookup(&self, task_id: &Uuid) -> Option<TaskRecord> {
        self.inner.read().await.records.get(task_id).cloned()
    }
}
