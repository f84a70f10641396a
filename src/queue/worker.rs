//! Task execution: one worker invocation per task, with state transitions
//! recorded in the store and an optional completion report.

use std::sync::Arc;

use serde_json::{json, Value};
use tracing::{info, warn};

use crate::config::AmcConfig;
use crate::error::{Error, Result};
use crate::handlers;
use crate::reporter::Reporter;
use crate::ssh::connection::SshTimeouts;
use crate::ssh::{credentials, SshSession};
use crate::wp::tasks as wp_tasks;
use crate::wp::WpUpdater;

use super::store::TaskStore;
use super::task::{Task, TaskSpec, TaskState};

/// Everything a worker needs beyond the task itself.
pub struct WorkerContext {
    pub http: reqwest::Client,
    pub updater: WpUpdater,
    pub reporter: Arc<Reporter>,
    pub config: Arc<AmcConfig>,
}

/// Drive one task to a terminal state. Transport and handler errors become
/// `failed` with a descriptive info string; handler result maps become
/// `succeeded` even when they carry `ok=false`.
pub async fn execute_task(task: Task, store: Arc<dyn TaskStore>, ctx: Arc<WorkerContext>) {
    let task_id = task.id;
    let kind = task.spec.kind();
    store.transition(task_id, TaskState::InProgress).await;
    if let Some(site) = &task.site {
        info!(%task_id, kind, site = %site.safe_summary(), "task started");
    } else {
        info!(%task_id, kind, "task started");
    }

    match run_task(&task, &ctx).await {
        Ok(mut result) => {
            if let Some(to) = task.report_email.as_deref() {
                let subject = format!(
                    "[{}] Task {} completed",
                    ctx.config.server.app_name, kind
                );
                if let Err(e) = ctx.reporter.send_report(to, &subject, &result).await {
                    // email failures annotate the result, never the task
                    warn!(%task_id, error = %e, "report email failed");
                    result = json!({"_original": result, "_email_error": e.to_string()});
                }
            }
            info!(%task_id, kind, "task succeeded");
            store.complete(task_id, result).await;
        }
        Err(e) => {
            warn!(%task_id, kind, error = %e, "task failed");
            store.fail(task_id, e.to_string()).await;
        }
    }
}

async fn run_task(task: &Task, ctx: &WorkerContext) -> Result<Value> {
    if task.spec.needs_ssh() {
        return run_remote_task(task, ctx).await;
    }

    match &task.spec {
        TaskSpec::Healthcheck(args) => handlers::probes::healthcheck(&ctx.http, args).await,
        TaskSpec::SslExpiry { domain } => handlers::probes::ssl_expiry(domain).await,
        TaskSpec::DomainSslCollect { domain } => {
            Ok(handlers::probes::domain_ssl_collect(&ctx.http, domain).await)
        }
        TaskSpec::WpOutdatedFetch(args) => {
            Ok(wp_tasks::wp_outdated_fetch_task(&ctx.http, args).await)
        }
        TaskSpec::WpUpdatePlugins(args) => {
            Ok(wp_tasks::wp_update_plugins_task(&ctx.updater, args).await)
        }
        TaskSpec::WpUpdateCore(args) => wp_tasks::wp_update_core_task(&ctx.updater, args).await,
        TaskSpec::WpUpdateAll(args) => wp_tasks::wp_update_all_task(&ctx.updater, args).await,
        _ => Err(Error::Task(format!(
            "{} is not a local task",
            task.spec.kind()
        ))),
    }
}

/// Open a scoped SSH session on a blocking thread and run the handler
/// there. The credential guard drops inside the closure, so temp key
/// files are removed on every exit path, panics included.
async fn run_remote_task(task: &Task, ctx: &WorkerContext) -> Result<Value> {
    let site = task
        .site
        .clone()
        .ok_or_else(|| Error::InvalidRequest("remote task without a site record".into()))?;
    let spec = task.spec.clone();
    let remote = ctx.config.remote.clone();
    let timeouts = SshTimeouts::from_remote_config(&remote);

    tokio::task::spawn_blocking(move || -> Result<Value> {
        let credential = credentials::materialize(&site)?;
        let session = SshSession::connect(&site, &credential, timeouts)?;
        handlers::run_remote(&session, &spec, &remote)
    })
    .await
    .map_err(|e| Error::Task(format!("worker thread failed: {e}")))?
}
