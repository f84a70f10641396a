//! Task model: one enqueued unit of remote work, its argument records and
//! its state machine.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::site::SiteRecord;

/// HTTP Basic credentials for the WordPress custom endpoints.
#[derive(Clone, Deserialize)]
pub struct BasicAuth {
    pub username: String,
    pub password: String,
}

#[derive(Clone, Deserialize)]
pub struct ProvisionArgs {
    pub domain: String,
    #[serde(default = "default_wp_path")]
    pub wp_path: String,
    pub site_title: String,
    pub admin_user: String,
    pub admin_pass: String,
    pub admin_email: String,
    pub db_name: String,
    pub db_user: String,
    pub db_pass: String,
    #[serde(default = "default_php_version")]
    pub php_version: String,
    #[serde(default = "default_wp_version")]
    pub wp_version: String,
    #[serde(default)]
    pub letsencrypt_email: String,
    #[serde(default = "default_true")]
    pub noninteractive: bool,
}

#[derive(Clone, Deserialize)]
pub struct ResetArgs {
    // accepted for API compatibility; the script ignores both
    pub wp_path: Option<String>,
    pub domain: Option<String>,
    #[serde(default = "default_true")]
    pub purge_stack: bool,
    #[serde(default = "default_true")]
    pub reset_ufw: bool,
    #[serde(default = "default_true")]
    pub force: bool,
    pub report_path: Option<String>,
}

impl Default for ResetArgs {
    fn default() -> Self {
        Self {
            wp_path: None,
            domain: None,
            purge_stack: true,
            reset_ufw: true,
            force: true,
            report_path: None,
        }
    }
}

#[derive(Clone, Deserialize)]
pub struct HealthcheckArgs {
    pub url: String,
    pub keyword: Option<String>,
    #[serde(default)]
    pub screenshot: bool,
    #[serde(default = "default_screenshot_path")]
    pub out_path: String,
}

#[derive(Clone, Deserialize)]
pub struct OutdatedFetchArgs {
    pub url: String,
    pub headers: Option<HashMap<String, String>>,
    /// `user:pass`, works with WP application passwords
    pub basic_auth: Option<String>,
    #[serde(default = "default_fetch_timeout", alias = "timeout")]
    pub timeout_secs: u64,
}

#[derive(Clone, Deserialize)]
pub struct PluginUpdateArgs {
    pub base_url: String,
    /// Human names, slugs or `plugin_file`s; empty + auto select -> all outdated
    pub plugins: Option<Vec<String>>,
    #[serde(default = "default_true")]
    pub auto_select_outdated: bool,
    pub blocklist: Option<Vec<String>>,
    pub headers: Option<HashMap<String, String>>,
    pub auth: Option<BasicAuth>,
}

#[derive(Clone, Deserialize)]
pub struct CoreUpdateArgs {
    pub base_url: String,
    #[serde(default = "default_true")]
    pub precheck: bool,
    pub headers: Option<HashMap<String, String>>,
    pub auth: Option<BasicAuth>,
}

#[derive(Clone, Deserialize)]
pub struct UpdateAllArgs {
    pub base_url: String,
    #[serde(default = "default_true")]
    pub include_plugins: bool,
    #[serde(default = "default_true")]
    pub include_core: bool,
    #[serde(default = "default_true")]
    pub precheck_core: bool,
    pub blocklist: Option<Vec<String>>,
    pub headers: Option<HashMap<String, String>>,
    pub auth: Option<BasicAuth>,
}

fn default_wp_path() -> String {
    crate::site::DEFAULT_WP_PATH.to_string()
}

fn default_php_version() -> String {
    "8.1".to_string()
}

fn default_wp_version() -> String {
    "latest".to_string()
}

fn default_screenshot_path() -> String {
    "/tmp/site.png".to_string()
}

fn default_fetch_timeout() -> u64 {
    15
}

fn default_true() -> bool {
    true
}

/// One operation per handler. Variants carry their full argument record so
/// a worker needs nothing beyond the task itself.
#[derive(Clone)]
pub enum TaskSpec {
    WpStatus {
        wp_path: String,
    },
    BackupSite {
        wp_path: String,
        db_name: String,
        db_user: String,
        db_pass: String,
        out_dir: String,
    },
    BackupDb {
        db_name: String,
        db_user: String,
        db_pass: String,
        out_dir: String,
    },
    BackupContent {
        wp_path: String,
        out_dir: String,
    },
    UpdateWithRollback {
        wp_path: String,
        db_name: String,
        db_user: String,
        db_pass: String,
        out_dir: String,
    },
    ProvisionWp(ProvisionArgs),
    WpReset(ResetArgs),
    Healthcheck(HealthcheckArgs),
    SslExpiry {
        domain: String,
    },
    DomainSslCollect {
        domain: String,
    },
    WpOutdatedFetch(OutdatedFetchArgs),
    WpUpdatePlugins(PluginUpdateArgs),
    WpUpdateCore(CoreUpdateArgs),
    WpUpdateAll(UpdateAllArgs),
}

impl TaskSpec {
    /// Handler name, stable across the HTTP surface and task records.
    pub fn kind(&self) -> &'static str {
        match self {
            TaskSpec::WpStatus { .. } => "wp_status",
            TaskSpec::BackupSite { .. } => "backup_site",
            TaskSpec::BackupDb { .. } => "backup_db",
            TaskSpec::BackupContent { .. } => "backup_wp_content",
            TaskSpec::UpdateWithRollback { .. } => "update_with_rollback",
            TaskSpec::ProvisionWp(_) => "provision_wp_sh",
            TaskSpec::WpReset(_) => "wp_reset_sh",
            TaskSpec::Healthcheck(_) => "healthcheck",
            TaskSpec::SslExpiry { .. } => "ssl_expiry",
            TaskSpec::DomainSslCollect { .. } => "domain_ssl_collect",
            TaskSpec::WpOutdatedFetch(_) => "wp_outdated_fetch",
            TaskSpec::WpUpdatePlugins(_) => "wp_update_plugins",
            TaskSpec::WpUpdateCore(_) => "wp_update_core",
            TaskSpec::WpUpdateAll(_) => "wp_update_all",
        }
    }

    /// Whether the worker opens an SSH session for this task. Probe and
    /// driver tasks run entirely from the worker host.
    pub fn needs_ssh(&self) -> bool {
        matches!(
            self,
            TaskSpec::WpStatus { .. }
                | TaskSpec::BackupSite { .. }
                | TaskSpec::BackupDb { .. }
                | TaskSpec::BackupContent { .. }
                | TaskSpec::UpdateWithRollback { .. }
                | TaskSpec::ProvisionWp(_)
                | TaskSpec::WpReset(_)
        )
    }
}

/// An enqueued task. Not `Debug`: specs and site records carry secrets;
/// log the id and `spec.kind()` instead.
#[derive(Clone)]
pub struct Task {
    pub id: Uuid,
    pub spec: TaskSpec,
    pub site: Option<SiteRecord>,
    pub report_email: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Task {
    pub fn new(spec: TaskSpec, site: Option<SiteRecord>, report_email: Option<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            spec,
            site,
            report_email,
            created_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
    Queued,
    InProgress,
    Succeeded,
    Failed,
}

impl TaskState {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskState::Queued => "queued",
            TaskState::InProgress => "in_progress",
            TaskState::Succeeded => "succeeded",
            TaskState::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskState::Succeeded | TaskState::Failed)
    }

    /// Transitions are monotonic: queued -> in_progress -> terminal.
    pub fn can_transition_to(&self, next: TaskState) -> bool {
        matches!(
            (self, next),
            (TaskState::Queued, TaskState::InProgress)
                | (TaskState::InProgress, TaskState::Succeeded)
                | (TaskState::InProgress, TaskState::Failed)
        )
    }
}

/// Stored view of a task, readable by any HTTP caller.
#[derive(Debug, Clone, Serialize)]
pub struct TaskRecord {
    pub task_id: Uuid,
    pub kind: String,
    pub state: TaskState,
    pub result: Option<Value>,
    pub info: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TaskRecord {
    pub fn queued(task: &Task) -> Self {
        Self {
            task_id: task.id,
            kind: task.spec.kind().to_string(),
            state: TaskState::Queued,
            result: None,
            info: None,
            created_at: task.created_at,
            updated_at: task.created_at,
        }
    }
}
