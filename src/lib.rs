//! # AMC-RS: WordPress Site-Management Control Plane
//!
//! This library implements a remote maintenance control plane for
//! WordPress hosts: an HTTP API accepts high-level operations (backups,
//! updates with rollback, provisioning, resets, freshness checks), a
//! durable in-process queue hands them to a worker pool, and the workers
//! drive the remote side over SSH/SFTP or the site's custom REST update
//! endpoints.

pub mod config;
pub mod error;
pub mod handlers;
pub mod http;
pub mod logging;
pub mod queue;
pub mod registry;
pub mod reporter;
pub mod site;
pub mod ssh;
pub mod wp;

pub use config::AmcConfig;
pub use error::{Error, Result, SshError};
pub use registry::SiteRegistry;
pub use site::SiteRecord;

// Task orchestration exports
pub use queue::{
    Broker, InMemoryBroker, MemoryTaskStore, Task, TaskRecord, TaskSpec, TaskState, TaskStore,
    WorkerContext, WorkerPool,
};

// WordPress update driver exports
pub use wp::{coerce_status, select_outdated_plugins, StatusView, UpdaterConfig, WpUpdater};
