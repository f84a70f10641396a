//! HTTP endpoint handlers: request validation, `user=root` normalisation,
//! enqueueing, task lookup and the synchronous download path.

use std::io::Seek;

use axum::body::Body;
use axum::extract::{Path, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::{json, Value};
use tokio_util::io::ReaderStream;
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::Error;
use crate::queue::task::{Task, TaskSpec, TaskState};
use crate::site::SiteRecord;
use crate::ssh::connection::SshTimeouts;
use crate::ssh::{credentials, SshSession};

use super::requests::*;
use super::AppState;

type ApiError = (StatusCode, Json<Value>);
type ApiResult<T> = std::result::Result<T, ApiError>;

fn detail(status: StatusCode, message: impl Into<String>) -> ApiError {
    (status, Json(json!({"detail": message.into()})))
}

/// Validate + normalise an incoming site record. Every enqueued site runs
/// as `root` regardless of caller input.
fn prepare_site(site: &SiteRecord) -> ApiResult<SiteRecord> {
    site.validate()
        .map_err(|e| detail(StatusCode::BAD_REQUEST, e.to_string()))?;
    Ok(site.normalized())
}

fn database_of(site: &SiteRecord) -> ApiResult<(String, String, String)> {
    site.database()
        .map_err(|e| detail(StatusCode::BAD_REQUEST, e.to_string()))
}

async fn enqueue(
    state: &AppState,
    spec: TaskSpec,
    site: Option<SiteRecord>,
    report_email: Option<String>,
) -> ApiResult<Json<TaskEnqueueResponse>> {
    let task = Task::new(spec, site, report_email);
    let task_id = state
        .broker
        .submit(task)
        .await
        .map_err(|e| detail(StatusCode::SERVICE_UNAVAILABLE, e.to_string()))?;
    Ok(Json(TaskEnqueueResponse::queued(task_id)))
}

/// Destructive endpoints require the configured reset token, supplied as
/// `X-Reset-Token` or a bearer `Authorization` header. No configured token
/// hard-fails with 503 so the endpoint is never accidentally open.
fn require_reset_token(state: &AppState, headers: &HeaderMap) -> ApiResult<()> {
    let Some(expected) = state.config.server.reset_token.as_deref() else {
        return Err(detail(
            StatusCode::SERVICE_UNAVAILABLE,
            "RESET_TOKEN not configured",
        ));
    };
    let supplied = headers
        .get("x-reset-token")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
        .or_else(|| extract_bearer(headers));
    if supplied.as_deref() != Some(expected) {
        return Err(detail(
            StatusCode::UNAUTHORIZED,
            "Invalid or missing reset token",
        ));
    }
    Ok(())
}

fn extract_bearer(headers: &HeaderMap) -> Option<String> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.split_once(' ')?;
    if scheme.eq_ignore_ascii_case("bearer") {
        Some(token.trim().to_string())
    } else {
        None
    }
}

// ---------- service ----------

pub async fn root(State(state): State<AppState>) -> Json<Value> {
    Json(json!({"ok": true, "service": state.config.server.app_name}))
}

// ---------- sessions ----------

pub async fn ssh_login(
    State(state): State<AppState>,
    Json(conn): Json<SiteRecord>,
) -> ApiResult<Json<SiteIdResponse>> {
    let site = prepare_site(&conn)?;
    let timeouts = SshTimeouts::from_remote_config(&state.config.remote);

    let probe_site = site.clone();
    let probe = tokio::task::spawn_blocking(move || -> crate::error::Result<Value> {
        let credential = credentials::materialize(&probe_site)?;
        let session = SshSession::connect(&probe_site, &credential, timeouts)?;
        Ok(session.verify()?)
    })
    .await
    .map_err(|e| detail(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;

    match probe {
        Ok(check) if check["ok"] == json!(true) => {
            let site_id = state.registry.insert(site).await;
            info!(%site_id, "SSH session verified");
            Ok(Json(SiteIdResponse {
                site_id,
                verified: true,
            }))
        }
        Ok(_) => Err((
            StatusCode::BAD_REQUEST,
            Json(json!({"ok": false, "detail": "SSH verification failed"})),
        )),
        Err(e) => {
            warn!(error = %e, "SSH verification failed");
            Err((
                StatusCode::BAD_REQUEST,
                Json(json!({"ok": false, "detail": "SSH verification failed"})),
            ))
        }
    }
}

pub async fn get_site(
    State(state): State<AppState>,
    Path(site_id): Path<Uuid>,
) -> ApiResult<Json<Value>> {
    let session = state
        .registry
        .get(&site_id)
        .await
        .ok_or_else(|| detail(StatusCode::NOT_FOUND, "Unknown site_id"))?;
    let mut summary = session.site.safe_summary();
    summary["site_id"] = json!(site_id);
    Ok(Json(summary))
}

// ---------- task lookup ----------

pub async fn get_task(
    State(state): State<AppState>,
    Path(task_id): Path<Uuid>,
) -> ApiResult<Json<TaskResultResponse>> {
    let record = state
        .store
        .lookup(&task_id)
        .await
        .ok_or_else(|| detail(StatusCode::NOT_FOUND, "Unknown task_id"))?;
    let (result, info) = match record.state {
        TaskState::Succeeded => (record.result, None),
        TaskState::Failed => (None, record.info),
        _ => (None, None),
    };
    Ok(Json(TaskResultResponse {
        task_id,
        state: record.state.as_str(),
        result,
        info,
    }))
}

// ---------- remote task submission ----------

pub async fn trigger_backup(
    State(state): State<AppState>,
    Json(site): Json<SiteRecord>,
) -> ApiResult<Json<TaskEnqueueResponse>> {
    let site = prepare_site(&site)?;
    let (db_name, db_user, db_pass) = database_of(&site)?;
    let spec = TaskSpec::BackupSite {
        wp_path: site.wp_path.clone(),
        db_name,
        db_user,
        db_pass,
        out_dir: state.config.remote.backup_dir.clone(),
    };
    enqueue(&state, spec, Some(site), None).await
}

pub async fn trigger_wp_status(
    State(state): State<AppState>,
    Json(site): Json<SiteRecord>,
) -> ApiResult<Json<TaskEnqueueResponse>> {
    let site = prepare_site(&site)?;
    let spec = TaskSpec::WpStatus {
        wp_path: site.wp_path.clone(),
    };
    enqueue(&state, spec, Some(site), None).await
}

pub async fn trigger_update(
    State(state): State<AppState>,
    Json(site): Json<SiteRecord>,
) -> ApiResult<Json<TaskEnqueueResponse>> {
    let site = prepare_site(&site)?;
    let (db_name, db_user, db_pass) = database_of(&site)?;
    let spec = TaskSpec::UpdateWithRollback {
        wp_path: site.wp_path.clone(),
        db_name,
        db_user,
        db_pass,
        out_dir: state.config.remote.backup_dir.clone(),
    };
    enqueue(&state, spec, Some(site), None).await
}

pub async fn trigger_ssl_expiry(
    State(state): State<AppState>,
    Json(body): Json<SslCheckBody>,
) -> ApiResult<Json<TaskEnqueueResponse>> {
    let site = prepare_site(&body.site)?;
    let spec = TaskSpec::SslExpiry {
        domain: body.req.domain,
    };
    enqueue(&state, spec, Some(site), None).await
}

pub async fn trigger_healthcheck(
    State(state): State<AppState>,
    Json(body): Json<HealthcheckBody>,
) -> ApiResult<Json<TaskEnqueueResponse>> {
    let site = prepare_site(&body.site)?;
    enqueue(&state, TaskSpec::Healthcheck(body.req), Some(site), None).await
}

pub async fn trigger_wp_install(
    State(state): State<AppState>,
    Path(site_id): Path<Uuid>,
    Json(req): Json<WpInstallRequest>,
) -> ApiResult<Json<TaskEnqueueResponse>> {
    let session = state
        .registry
        .get(&site_id)
        .await
        .ok_or_else(|| detail(StatusCode::NOT_FOUND, "Unknown site_id"))?;
    let site = session.site.normalized();
    enqueue(
        &state,
        TaskSpec::ProvisionWp(req.args),
        Some(site),
        req.report_email,
    )
    .await
}

pub async fn trigger_wp_reset(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<WpResetBody>,
) -> ApiResult<Json<TaskEnqueueResponse>> {
    require_reset_token(&state, &headers)?;
    let site = prepare_site(&body.site)?;
    info!(site = %site.safe_summary(), "droplet reset requested");
    enqueue(&state, TaskSpec::WpReset(body.req), Some(site), None).await
}

// ---------- local task submission ----------

pub async fn trigger_domain_ssl_collect(
    State(state): State<AppState>,
    Json(req): Json<DomainSslCollectRequest>,
) -> ApiResult<Json<TaskEnqueueResponse>> {
    let spec = TaskSpec::DomainSslCollect { domain: req.domain };
    enqueue(&state, spec, None, req.report_email).await
}

pub async fn trigger_wp_outdated_fetch(
    State(state): State<AppState>,
    Json(req): Json<WpOutdatedFetchRequest>,
) -> ApiResult<Json<TaskEnqueueResponse>> {
    enqueue(
        &state,
        TaskSpec::WpOutdatedFetch(req.args),
        None,
        req.report_email,
    )
    .await
}

pub async fn trigger_wp_update_plugins(
    State(state): State<AppState>,
    Json(req): Json<WpUpdatePluginsRequest>,
) -> ApiResult<Json<TaskEnqueueResponse>> {
    enqueue(
        &state,
        TaskSpec::WpUpdatePlugins(req.args),
        None,
        req.report_email,
    )
    .await
}

pub async fn trigger_wp_update_core(
    State(state): State<AppState>,
    Json(req): Json<WpUpdateCoreRequest>,
) -> ApiResult<Json<TaskEnqueueResponse>> {
    enqueue(
        &state,
        TaskSpec::WpUpdateCore(req.args),
        None,
        req.report_email,
    )
    .await
}

pub async fn trigger_wp_update_all(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<WpUpdateAllRequest>,
) -> ApiResult<Json<TaskEnqueueResponse>> {
    // updating everything in one shot is gated like the reset
    require_reset_token(&state, &headers)?;
    enqueue(
        &state,
        TaskSpec::WpUpdateAll(req.args),
        None,
        req.report_email,
    )
    .await
}

// ---------- backups with the synchronous download path ----------

pub async fn trigger_backup_db(
    State(state): State<AppState>,
    Json(body): Json<BackupBody>,
) -> ApiResult<Response> {
    let site = prepare_site(&body.site)?;
    let (db_name, db_user, db_pass) = database_of(&site)?;
    let out_dir = body
        .req
        .out_dir
        .clone()
        .unwrap_or_else(|| state.config.remote.backup_dir.clone());
    let spec = TaskSpec::BackupDb {
        db_name,
        db_user,
        db_pass,
        out_dir,
    };

    let response = enqueue(&state, spec, Some(site.clone()), None).await?;
    if !body.req.download {
        return Ok(response.into_response());
    }
    stream_artefact(
        &state,
        response.0.task_id,
        site,
        &body.req,
        "db_dump",
        "database.sql.gz",
    )
    .await
}

pub async fn trigger_backup_content(
    State(state): State<AppState>,
    Json(body): Json<BackupBody>,
) -> ApiResult<Response> {
    let site = prepare_site(&body.site)?;
    let out_dir = body
        .req
        .out_dir
        .clone()
        .unwrap_or_else(|| state.config.remote.backup_dir.clone());
    let spec = TaskSpec::BackupContent {
        wp_path: site.wp_path.clone(),
        out_dir,
    };

    let response = enqueue(&state, spec, Some(site.clone()), None).await?;
    if !body.req.download {
        return Ok(response.into_response());
    }
    stream_artefact(
        &state,
        response.0.task_id,
        site,
        &body.req,
        "content_tar",
        "wp-content.tar.gz",
    )
    .await
}

/// Wait for the backup to finish, then fetch the artefact over a fresh
/// SSH session and stream it back.
async fn stream_artefact(
    state: &AppState,
    task_id: Uuid,
    site: SiteRecord,
    options: &BackupOptions,
    result_key: &str,
    fallback_name: &str,
) -> ApiResult<Response> {
    let wait = std::time::Duration::from_secs(
        options
            .wait_timeout
            .unwrap_or(state.config.driver.download_wait_secs),
    );

    let Some(record) = state.store.wait_terminal(task_id, wait).await else {
        let live_state = state
            .store
            .lookup(&task_id)
            .await
            .map(|r| r.state)
            .unwrap_or(TaskState::Queued);
        return Err((
            StatusCode::GATEWAY_TIMEOUT,
            Json(json!({
                "task_id": task_id,
                "state": live_state.as_str(),
                "error": format!("task did not finish within {}s", wait.as_secs()),
            })),
        ));
    };
    if record.state != TaskState::Succeeded {
        return Err((
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({
                "task_id": task_id,
                "state": record.state.as_str(),
                "error": record.info,
            })),
        ));
    }

    let result = record.result.unwrap_or(Value::Null);
    let Some(remote_path) = result.get(result_key).and_then(Value::as_str) else {
        return Err((
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({
                "task_id": task_id,
                "state": record.state.as_str(),
                "error": format!("no {result_key} path returned"),
                "result": result,
            })),
        ));
    };
    let remote_path = remote_path.to_string();

    let download_name = options
        .filename
        .clone()
        .or_else(|| {
            remote_path
                .rsplit('/')
                .next()
                .filter(|name| !name.is_empty())
                .map(str::to_string)
        })
        .unwrap_or_else(|| fallback_name.to_string());

    // an anonymous temp file vanishes with its handle, however this
    // request ends
    let timeouts = SshTimeouts::from_remote_config(&state.config.remote);
    let fetch_path = remote_path.clone();
    let file = tokio::task::spawn_blocking(move || -> Result<std::fs::File, Error> {
        let credential = credentials::materialize(&site)?;
        let session = SshSession::connect(&site, &credential, timeouts)?;
        let mut file = tempfile::tempfile()?;
        session.download_to(&fetch_path, &mut file)?;
        file.rewind()?;
        Ok(file)
    })
    .await
    .map_err(|e| detail(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?
    .map_err(|e| {
        warn!(%task_id, error = %e, "artefact download failed");
        detail(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
    })?;

    let stream = ReaderStream::new(tokio::fs::File::from_std(file));
    let response = Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "application/gzip")
        .header(
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"{download_name}\""),
        )
        .body(Body::from_stream(stream))
        .map_err(|e| detail(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;
    Ok(response)
}
