//! Request and response bodies for the HTTP surface.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::queue::task::{
    CoreUpdateArgs, HealthcheckArgs, OutdatedFetchArgs, PluginUpdateArgs, ProvisionArgs,
    ResetArgs, UpdateAllArgs,
};
use crate::site::SiteRecord;

#[derive(Deserialize)]
pub struct SslCheckRequest {
    pub domain: String,
}

/// `{req, site}` envelope used by the endpoints that pair handler options
/// with a site record.
#[derive(Deserialize)]
pub struct SslCheckBody {
    pub req: SslCheckRequest,
    pub site: SiteRecord,
}

#[derive(Deserialize)]
pub struct HealthcheckBody {
    pub req: HealthcheckArgs,
    pub site: SiteRecord,
}

#[derive(Deserialize)]
pub struct WpResetBody {
    #[serde(default)]
    pub req: ResetArgs,
    pub site: SiteRecord,
}

#[derive(Deserialize, Default)]
pub struct BackupOptions {
    pub out_dir: Option<String>,
    /// Stream the artefact back instead of the usual async poll
    #[serde(default)]
    pub download: bool,
    pub filename: Option<String>,
    pub wait_timeout: Option<u64>,
}

#[derive(Deserialize)]
pub struct BackupBody {
    #[serde(default)]
    pub req: BackupOptions,
    pub site: SiteRecord,
}

#[derive(Deserialize)]
pub struct WpInstallRequest {
    #[serde(flatten)]
    pub args: ProvisionArgs,
    pub report_email: Option<String>,
}

#[derive(Deserialize)]
pub struct DomainSslCollectRequest {
    pub domain: String,
    pub report_email: Option<String>,
}

#[derive(Deserialize)]
pub struct WpOutdatedFetchRequest {
    #[serde(flatten)]
    pub args: OutdatedFetchArgs,
    pub report_email: Option<String>,
}

#[derive(Deserialize)]
pub struct WpUpdatePluginsRequest {
    #[serde(flatten)]
    pub args: PluginUpdateArgs,
    pub report_email: Option<String>,
}

#[derive(Deserialize)]
pub struct WpUpdateCoreRequest {
    #[serde(flatten)]
    pub args: CoreUpdateArgs,
    pub report_email: Option<String>,
}

#[derive(Deserialize)]
pub struct WpUpdateAllRequest {
    #[serde(flatten)]
    pub args: UpdateAllArgs,
    pub report_email: Option<String>,
}

#[derive(Serialize)]
pub struct TaskEnqueueResponse {
    pub task_id: Uuid,
    pub status: &'static str,
}

impl TaskEnqueueResponse {
    pub fn queued(task_id: Uuid) -> Self {
        Self {
            task_id,
            status: "queued",
        }
    }
}

#[derive(Serialize)]
pub struct SiteIdResponse {
    pub site_id: Uuid,
    pub verified: bool,
}

#[derive(Serialize)]
pub struct TaskResultResponse {
    pub task_id: Uuid,
    pub state: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub info: Option<String>,
}
