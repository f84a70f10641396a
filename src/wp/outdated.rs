//! Outdated-component fetch against the custom status endpoint.

use std::collections::HashMap;
use std::time::Duration;

use reqwest::Client;
use serde_json::{json, Value};
use url::Url;

use crate::error::{Error, Result};

use super::status::{coerce_status, PluginRow, StatusView, ThemeRow};

pub const STATUS_ROUTE: &str = "/wp-json/custom/v1/status";

/// Rewrite bare URLs to the status route; an explicit `/wp-json/...` path
/// is left intact.
pub fn ensure_status_route(raw: &str) -> Result<String> {
    let mut parsed = Url::parse(raw)
        .map_err(|e| Error::InvalidRequest(format!("invalid url {raw}: {e}")))?;
    if matches!(parsed.path(), "" | "/" | "/wp-json" | "/wp-json/") {
        parsed.set_path(STATUS_ROUTE);
    }
    Ok(parsed.to_string())
}

/// Fetch the status body and summarise outdated plugins, themes and core.
///
/// Transport errors propagate (the task layer wraps them); non-JSON bodies
/// become a structured `ok=false` result since a misconfigured site is a
/// finding, not a crash.
pub async fn fetch_outdated(
    client: &Client,
    raw_url: &str,
    headers: Option<&HashMap<String, String>>,
    basic_auth: Option<&str>,
    timeout: Duration,
) -> Result<Value> {
    let final_url = ensure_status_route(raw_url)?;

    let mut request = client
        .get(&final_url)
        .timeout(timeout)
        .header("Accept", "application/json, */*;q=0.8");
    if let Some(headers) = headers {
        for (key, value) in headers {
            request = request.header(key, value);
        }
    }
    if let Some(auth) = basic_auth {
        let (user, pass) = auth
            .split_once(':')
            .ok_or_else(|| Error::InvalidRequest("basic_auth must be user:pass".into()))?;
        request = request.basic_auth(user, Some(pass));
    }

    let response = request.send().await?;
    let status_code = response.status().as_u16();
    let content_type = response
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
        .to_lowercase();
    let body = response.text().await.unwrap_or_default();

    // only parse bodies that look like JSON
    let trimmed = body.trim_start_matches('\u{feff}').trim_start();
    let is_json = content_type.contains("application/json")
        || trimmed.starts_with('{')
        || trimmed.starts_with('[');
    if !is_json {
        return Ok(json!({
            "ok": false,
            "status_code": status_code,
            "url": final_url,
            "error": "Response is not JSON",
            "content_type": if content_type.is_empty() { "unknown".to_string() } else { content_type },
            "body_preview": preview(&body, 200),
        }));
    }

    let data: Value = match serde_json::from_str(trimmed.trim_end()) {
        Ok(data) => data,
        Err(e) => {
            return Ok(json!({
                "ok": false,
                "status_code": status_code,
                "url": final_url,
                "error": format!("Invalid JSON: {e}"),
                "content_type": content_type,
                "body_preview": preview(&body, 200),
            }))
        }
    };

    let view = coerce_status(&data);
    Ok(json!({
        "ok": true,
        "status_code": status_code,
        "url": final_url,
        "summary": summarize(&view),
        "raw": data,
    }))
}

/// Projection consumed by operators and the report emails.
pub fn summarize(view: &StatusView) -> Value {
    let plugins_outdated: Vec<Value> = view
        .plugins
        .iter()
        .filter(|row| row.update_available)
        .map(plugin_summary)
        .collect();
    let themes_outdated: Vec<Value> = view
        .themes
        .iter()
        .filter(|row| row.update_available)
        .map(theme_summary)
        .collect();

    json!({
        "plugins_outdated": plugins_outdated,
        "themes_outdated": themes_outdated,
        "core_update_available": view.core.update_available,
        "core_current": view.core.current_version,
        "core_latest": view.core.latest_version,
        "php_version": view.php_mysql.as_ref().and_then(|env| env.php_version.clone()),
        "mysql_version": view.php_mysql.as_ref().and_then(|env| env.mysql_version.clone()),
    })
}

fn plugin_summary(row: &PluginRow) -> Value {
    json!({
        "name": row.name,
        "active": row.active,
        "current": row.version,
        "latest": row.latest_version,
    })
}

fn theme_summary(row: &ThemeRow) -> Value {
    json!({
        "name": row.name,
        "active": row.active,
        "current": row.version,
        "latest": row.latest_version,
    })
}

fn preview(body: &str, limit: usize) -> String {
    body.chars().take(limit).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn bare_urls_get_the_status_route() {
        assert_eq!(
            ensure_status_route("https://example.com").unwrap(),
            "https://example.com/wp-json/custom/v1/status"
        );
        assert_eq!(
            ensure_status_route("https://example.com/").unwrap(),
            "https://example.com/wp-json/custom/v1/status"
        );
        assert_eq!(
            ensure_status_route("https://example.com/wp-json").unwrap(),
            "https://example.com/wp-json/custom/v1/status"
        );
    }

    #[test]
    fn explicit_paths_are_left_intact() {
        assert_eq!(
            ensure_status_route("https://example.com/wp-json/site/v1/status").unwrap(),
            "https://example.com/wp-json/site/v1/status"
        );
        assert_eq!(
            ensure_status_route("https://example.com/health").unwrap(),
            "https://example.com/health"
        );
    }

    #[test]
    fn summary_projects_outdated_rows_only() {
        let view = coerce_status(&json!({
            "plugins": [
                {"name": "Hello Dolly", "plugin_file": "hello.php", "version": "1.7.2",
                 "latest_version": "1.7.3", "update_available": true, "active": false},
                {"name": "Fresh", "plugin_file": "fresh/fresh.php", "version": "2.0",
                 "latest_version": "2.0", "update_available": false, "active": true}
            ],
            "themes": [],
            "core": {"current_version": "6.5.2", "latest_version": "6.6", "update_available": true},
            "php_mysql": {"php_version": "8.1.0", "mysql_version": "8.0.30"}
        }));

        let summary = summarize(&view);
        assert_eq!(
            summary["plugins_outdated"],
            json!([{"name": "Hello Dolly", "current": "1.7.2", "latest": "1.7.3", "active": false}])
        );
        assert_eq!(summary["core_update_available"], json!(true));
        assert_eq!(summary["core_current"], json!("6.5.2"));
        assert_eq!(summary["php_version"], json!("8.1.0"));
    }
}
