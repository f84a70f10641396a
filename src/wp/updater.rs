//! HTTP client for the WordPress custom update endpoints.
//!
//! Plugin updates run a fallback ladder: one batch form POST, then a batch
//! JSON POST, then per-plugin form/JSON POSTs for anything still stale.
//! After each rung the driver sleeps a settle interval and re-reads status
//! to verify version bumps instead of trusting response bodies.

use std::collections::HashMap;
use std::time::Duration;

use reqwest::Client;
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::queue::task::BasicAuth;

use super::status::{coerce_status, looks_updated, plugin_versions_map};

/// How much of a response body is kept in attempt logs.
const BODY_PREVIEW: usize = 800;

#[derive(Debug, Clone)]
pub struct UpdaterConfig {
    pub status_timeout: Duration,
    pub update_timeout: Duration,
    pub settle: Duration,
}

impl Default for UpdaterConfig {
    fn default() -> Self {
        Self {
            status_timeout: Duration::from_secs(30),
            update_timeout: Duration::from_secs(600),
            settle: Duration::from_secs(1),
        }
    }
}

impl UpdaterConfig {
    pub fn from_driver_config(driver: &crate::config::DriverConfig) -> Self {
        Self {
            status_timeout: Duration::from_secs(driver.status_timeout_secs),
            update_timeout: Duration::from_secs(driver.update_timeout_secs),
            settle: Duration::from_millis(driver.settle_millis),
        }
    }
}

#[derive(Clone)]
pub struct WpUpdater {
    client: Client,
    config: UpdaterConfig,
}

struct Endpoints {
    status: String,
    plugins: String,
    core: String,
}

fn endpoints(base_url: &str) -> Endpoints {
    let base = base_url.trim_end_matches('/');
    Endpoints {
        status: format!("{base}/wp-json/custom/v1/status"),
        plugins: format!("{base}/wp-json/custom/v1/update-plugins"),
        core: format!("{base}/wp-json/custom/v1/update-core"),
    }
}

impl WpUpdater {
    pub fn new(client: Client, config: UpdaterConfig) -> Self {
        Self { client, config }
    }

    /// Read the raw status body. Errors here are transport errors; the
    /// task layer decides whether they fail the task or become a
    /// structured `ok=false` result.
    pub async fn fetch_status(
        &self,
        base_url: &str,
        auth: Option<&BasicAuth>,
        headers: Option<&HashMap<String, String>>,
    ) -> Result<Value> {
        let url = endpoints(base_url).status;
        let mut request = self
            .client
            .get(&url)
            .timeout(self.config.status_timeout);
        if let Some(auth) = auth {
            request = request.basic_auth(&auth.username, Some(&auth.password));
        }
        request = apply_headers(request, headers);

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(Error::Task(format!(
                "status endpoint returned {status} for {url}"
            )));
        }
        Ok(response.json().await?)
    }

    /// Trigger a core update. The response may not be JSON; it is carried
    /// verbatim (bounded) either way. Transport failures propagate and
    /// fail the task.
    pub async fn update_core(
        &self,
        base_url: &str,
        auth: Option<&BasicAuth>,
        headers: Option<&HashMap<String, String>>,
    ) -> Result<Value> {
        let url = endpoints(base_url).core;
        let mut request = self.client.post(&url).timeout(self.config.update_timeout);
        if let Some(auth) = auth {
            request = request.basic_auth(&auth.username, Some(&auth.password));
        }
        request = apply_headers(request, headers);

        let response = request.send().await?;
        let status_code = response.status().as_u16();
        let ok = response.status().is_success();
        let body = response.text().await.unwrap_or_default();
        let data = serde_json::from_str::<Value>(&body)
            .unwrap_or_else(|_| json!({"raw": preview(&body, 1000)}));
        Ok(json!({"ok": ok, "status_code": status_code, "url": url, "response": data}))
    }

    /// Drive the update ladder for `plugins` and verify each one against
    /// re-read status. Semantic failures (ladder exhausted, nothing
    /// verified) come back as `ok=false` with the full attempt log.
    pub async fn update_plugins(
        &self,
        base_url: &str,
        plugins: &[String],
        auth: Option<&BasicAuth>,
        headers: Option<&HashMap<String, String>>,
    ) -> Value {
        if plugins.is_empty() {
            return json!({"ok": false, "error": "No plugins provided"});
        }

        let url = endpoints(base_url).plugins;
        let mode = if plugins.len() == 1 { "single" } else { "bulk" };

        let before = match self.fetch_status(base_url, auth, headers).await {
            Ok(status) => status,
            Err(e) => {
                return json!({
                    "ok": false,
                    "url": base_url,
                    "error": format!("Status (before) fetch failed: {e}"),
                })
            }
        };
        let before_map = plugin_versions_map(&coerce_status(&before));

        let mut attempts: Vec<Value> = Vec::new();
        let mut last_ok;

        // 1) batch form body, the shape the site plugin understands best
        match self
            .post_plugins(&url, plugins, mode, PostBody::Form, auth, headers)
            .await
        {
            Ok(attempt) => {
                last_ok = attempt.ok;
                attempts.push(attempt.into_log("batch_form"));
            }
            Err(e) => {
                last_ok = false;
                attempts.push(json!({"mode": "batch_form_exc", "error": e.to_string()}));
            }
        }

        // 2) batch JSON body
        if !last_ok {
            match self
                .post_plugins(&url, plugins, mode, PostBody::Json, auth, headers)
                .await
            {
                Ok(attempt) => {
                    attempts.push(attempt.into_log("batch_json"));
                }
                Err(e) => {
                    attempts.push(json!({"mode": "batch_json_exc", "error": e.to_string()}));
                }
            }
        }

        tokio::time::sleep(self.config.settle).await;

        let after_batch = self.fetch_status(base_url, auth, headers).await.ok();
        let after_batch_map = after_batch
            .as_ref()
            .map(|status| plugin_versions_map(&coerce_status(status)))
            .unwrap_or_default();

        let needs_fix: Vec<&String> = if after_batch_map.is_empty() {
            plugins.iter().collect()
        } else {
            plugins
                .iter()
                .filter(|pf| !looks_updated(&before_map, &after_batch_map, pf))
                .collect()
        };

        // 3) per-plugin fallback for anything that did not move
        let mut per_plugin: Vec<Value> = Vec::new();
        for plugin_file in needs_fix {
            debug!(plugin = %plugin_file, "per-plugin fallback");
            let form = self
                .post_plugins(&url, std::slice::from_ref(plugin_file), mode, PostBody::Form, auth, headers)
                .await;
            let form_log = attempt_log(&form);
            let form_ok = matches!(&form, Ok(a) if a.ok);

            let json_log = if form_ok {
                json!({"ok": null, "status": null, "body": null})
            } else {
                let json_attempt = self
                    .post_plugins(&url, std::slice::from_ref(plugin_file), mode, PostBody::Json, auth, headers)
                    .await;
                attempt_log(&json_attempt)
            };

            tokio::time::sleep(self.config.settle).await;
            let updated = match self.fetch_status(base_url, auth, headers).await {
                Ok(post) => {
                    let post_map = plugin_versions_map(&coerce_status(&post));
                    looks_updated(&before_map, &post_map, plugin_file)
                }
                Err(e) => {
                    warn!(plugin = %plugin_file, error = %e, "post-update status fetch failed");
                    false
                }
            };

            per_plugin.push(json!({
                "plugin_file": plugin_file,
                "form": form_log,
                "json": json_log,
                "updated": updated,
            }));
        }

        let overall_updated = if per_plugin.is_empty() {
            !after_batch_map.is_empty()
                && plugins
                    .iter()
                    .all(|pf| looks_updated(&before_map, &after_batch_map, pf))
        } else {
            per_plugin
                .iter()
                .all(|entry| entry.get("updated").and_then(Value::as_bool).unwrap_or(false))
        };

        let mut result = json!({
            "ok": overall_updated,
            "url": url,
            "request_plugins": plugins,
            "mode": mode,
            "result": {
                "batch": attempts,
                "per_plugin": per_plugin,
            }
        });
        if let Some(post_status) = after_batch {
            result["post_status"] = post_status;
        }
        result
    }

    async fn post_plugins(
        &self,
        url: &str,
        plugins: &[String],
        mode: &str,
        body: PostBody,
        auth: Option<&BasicAuth>,
        headers: Option<&HashMap<String, String>>,
    ) -> Result<Attempt> {
        let mut request = self.client.post(url).timeout(self.config.update_timeout);
        if let Some(auth) = auth {
            request = request.basic_auth(&auth.username, Some(&auth.password));
        }
        request = apply_headers(request, headers);
        request = match body {
            PostBody::Form => request.form(&[
                ("plugins", plugins.join(",")),
                ("mode", mode.to_string()),
            ]),
            PostBody::Json => request.json(&json!({"plugins": plugins, "mode": mode})),
        };

        let response = request.send().await?;
        let status = response.status().as_u16();
        let ok = response.status().is_success();
        let body = response.text().await.unwrap_or_default();
        Ok(Attempt {
            ok,
            status,
            body: preview(&body, BODY_PREVIEW),
        })
    }
}

#[derive(Clone, Copy)]
enum PostBody {
    Form,
    Json,
}

struct Attempt {
    ok: bool,
    status: u16,
    body: String,
}

impl Attempt {
    fn into_log(self, mode: &str) -> Value {
        json!({"mode": mode, "status": self.status, "ok": self.ok, "body": self.body})
    }
}

fn attempt_log(attempt: &Result<Attempt>) -> Value {
    match attempt {
        Ok(a) => json!({"ok": a.ok, "status": a.status, "body": a.body}),
        Err(e) => json!({"ok": false, "status": null, "body": format!("exception: {e}")}),
    }
}

fn apply_headers(
    mut request: reqwest::RequestBuilder,
    headers: Option<&HashMap<String, String>>,
) -> reqwest::RequestBuilder {
    if let Some(headers) = headers {
        for (key, value) in headers {
            request = request.header(key, value);
        }
    }
    request
}

fn preview(body: &str, limit: usize) -> String {
    body.chars().take(limit).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoints_strip_trailing_slash() {
        let e = endpoints("https://example.com/");
        assert_eq!(e.status, "https://example.com/wp-json/custom/v1/status");
        assert_eq!(
            e.plugins,
            "https://example.com/wp-json/custom/v1/update-plugins"
        );
        assert_eq!(e.core, "https://example.com/wp-json/custom/v1/update-core");
    }

    #[test]
    fn preview_bounds_body() {
        let body = "x".repeat(2000);
        assert_eq!(preview(&body, 800).len(), 800);
        assert_eq!(preview("short", 800), "short");
    }
}
