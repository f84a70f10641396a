//! Durable queue, task-state store and worker pool.

pub mod broker;
pub mod store;
pub mod task;
pub mod worker;

pub use broker::{Broker, InMemoryBroker, WorkerPool};
pub use store::{MemoryTaskStore, TaskStore};
pub use task::{Task, TaskRecord, TaskSpec, TaskState};
pub use worker::WorkerContext;
