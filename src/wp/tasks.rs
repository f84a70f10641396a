//! Driver task orchestration: the worker-side entry points for the
//! REST-driven update operations.
//!
//! Status-read failures and exhausted ladders become structured
//! `ok=false` results rather than task failures — the operator needs the
//! attempt trace either way. Only a core-update POST that never reaches
//! the site fails the task outright.

use std::time::Duration;

use chrono::Utc;
use serde_json::{json, Value};
use tracing::info;

use crate::queue::task::{CoreUpdateArgs, OutdatedFetchArgs, PluginUpdateArgs, UpdateAllArgs};

use super::outdated::fetch_outdated;
use super::status::{
    coerce_status, is_plugin_file, normalize_selection, select_outdated_plugins,
};
use super::updater::WpUpdater;

/// `wp_outdated_fetch` task body.
pub async fn wp_outdated_fetch_task(
    client: &reqwest::Client,
    args: &OutdatedFetchArgs,
) -> Value {
    match fetch_outdated(
        client,
        &args.url,
        args.headers.as_ref(),
        args.basic_auth.as_deref(),
        Duration::from_secs(args.timeout_secs),
    )
    .await
    {
        Ok(result) => result,
        Err(e) => json!({"ok": false, "url": args.url, "error": e.to_string()}),
    }
}

/// `wp_update_plugins` task body: decide the selection, run the ladder,
/// summarise.
pub async fn wp_update_plugins_task(updater: &WpUpdater, args: &PluginUpdateArgs) -> Value {
    let mut selected: Vec<String> = args.plugins.clone().unwrap_or_default();
    let explicit = !selected.is_empty();

    // status is needed to auto-select, or to normalise human tokens
    let need_status_for_normalize = explicit && selected.iter().any(|s| !is_plugin_file(s));
    let need_status = (args.auto_select_outdated && !explicit) || need_status_for_normalize;

    let status = if need_status {
        match updater
            .fetch_status(&args.base_url, args.auth.as_ref(), args.headers.as_ref())
            .await
        {
            Ok(status) => Some(status),
            Err(e) => {
                return json!({
                    "ok": false,
                    "url": args.base_url,
                    "error": format!("Status fetch failed: {e}"),
                })
            }
        }
    } else {
        None
    };

    if args.auto_select_outdated && !explicit {
        let view = coerce_status(status.as_ref().unwrap_or(&Value::Null));
        selected = select_outdated_plugins(&view, args.blocklist.as_deref());
    } else if explicit {
        let view = coerce_status(status.as_ref().unwrap_or(&Value::Null));
        selected = normalize_selection(&selected, &view);
        if let Some(blocklist) = &args.blocklist {
            selected.retain(|file| !blocklist.contains(file));
        }
    }

    let mut out = json!({
        "ok": true,
        "url": args.base_url,
        "plugins": {"selected": selected.clone(), "skipped": false, "result": null},
    });
    if let Some(status) = &status {
        out["status_snapshot"] = status.clone();
    }

    if selected.is_empty() {
        out["plugins"]["skipped"] = json!(true);
        return out;
    }

    let update = updater
        .update_plugins(&args.base_url, &selected, args.auth.as_ref(), args.headers.as_ref())
        .await;
    out["ok"] = json!(update.get("ok").and_then(Value::as_bool).unwrap_or(false));
    out["plugins"]["result"] = update;

    log_per_plugin(&out);
    out
}

/// `wp_update_core` task body with the optional freshness precheck.
/// A failed update POST is a transport error and fails the task.
pub async fn wp_update_core_task(
    updater: &WpUpdater,
    args: &CoreUpdateArgs,
) -> crate::error::Result<Value> {
    let mut status = None;
    if args.precheck {
        match updater
            .fetch_status(&args.base_url, args.auth.as_ref(), args.headers.as_ref())
            .await
        {
            Ok(body) => {
                let core = coerce_status(&body).core;
                if !core.update_available {
                    let current = core.current_version.clone();
                    let latest = core.latest_version.clone().or_else(|| current.clone());
                    return Ok(json!({
                        "ok": true,
                        "skipped": true,
                        "reason": "core is already up-to-date",
                        "current": current,
                        "latest": latest,
                        "status_snapshot": body,
                    }));
                }
                status = Some(body);
            }
            Err(e) => {
                return Ok(json!({
                    "ok": false,
                    "url": args.base_url,
                    "error": format!("Status fetch failed: {e}"),
                }))
            }
        }
    }

    let mut result = updater
        .update_core(&args.base_url, args.auth.as_ref(), args.headers.as_ref())
        .await?;
    if let Some(status) = status {
        result["status_snapshot"] = status;
    }
    Ok(result)
}

/// `wp_update_all` task body: one status read, then plugins and core with
/// their prechecks, combined into a single envelope.
pub async fn wp_update_all_task(
    updater: &WpUpdater,
    args: &UpdateAllArgs,
) -> crate::error::Result<Value> {
    let mut result = json!({
        "ok": false,
        "url": args.base_url,
        "plugins": {"selected": [], "skipped": false, "result": null},
        "core": {"skipped": false, "result": null},
        "ran_at": Utc::now().to_rfc3339(),
    });

    let status = match updater
        .fetch_status(&args.base_url, args.auth.as_ref(), args.headers.as_ref())
        .await
    {
        Ok(status) => status,
        Err(e) => {
            return Ok(json!({
                "ok": false,
                "url": args.base_url,
                "error": format!("Status fetch failed: {e}"),
            }))
        }
    };
    result["status_snapshot"] = status.clone();
    let view = coerce_status(&status);

    let mut plugins_ok = true;
    if args.include_plugins {
        let selected = select_outdated_plugins(&view, args.blocklist.as_deref());
        result["plugins"]["selected"] = json!(selected.clone());
        if selected.is_empty() {
            result["plugins"]["skipped"] = json!(true);
        } else {
            let update = updater
                .update_plugins(&args.base_url, &selected, args.auth.as_ref(), args.headers.as_ref())
                .await;
            plugins_ok = update.get("ok").and_then(Value::as_bool).unwrap_or(false);
            result["plugins"]["result"] = update;
        }
    }

    let mut core_ok = true;
    if args.include_core {
        let core = &view.core;
        if args.precheck_core && !core.update_available {
            let current = core.current_version.clone();
            let latest = core.latest_version.clone().or_else(|| current.clone());
            result["core"] = json!({
                "skipped": true,
                "reason": "core already up to date",
                "current": current,
                "latest": latest,
                "result": null,
            });
        } else {
            let update = updater
                .update_core(&args.base_url, args.auth.as_ref(), args.headers.as_ref())
                .await?;
            core_ok = update.get("ok").and_then(Value::as_bool).unwrap_or(false);
            result["core"]["result"] = update;
        }
    }

    result["ok"] = json!(plugins_ok && core_ok);
    Ok(result)
}

/// Per-plugin outcome summary for the worker log.
fn log_per_plugin(out: &Value) {
    let per_plugin = out
        .pointer("/plugins/result/result/per_plugin")
        .and_then(Value::as_array);
    let Some(per_plugin) = per_plugin else {
        return;
    };
    let updated: Vec<&str> = per_plugin
        .iter()
        .filter(|e| e.get("updated").and_then(Value::as_bool) == Some(true))
        .filter_map(|e| e.get("plugin_file").and_then(Value::as_str))
        .collect();
    let stale: Vec<&str> = per_plugin
        .iter()
        .filter(|e| e.get("updated").and_then(Value::as_bool) == Some(false))
        .filter_map(|e| e.get("plugin_file").and_then(Value::as_str))
        .collect();
    if !updated.is_empty() {
        info!(?updated, "plugins updated via fallback");
    }
    if !stale.is_empty() {
        info!(?stale, "plugins still stale after update ladder");
    }
}
