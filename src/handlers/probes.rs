//! Probe handlers running from the worker host: HTTP healthcheck with an
//! optional screenshot, SSL certificate expiry via the local openssl
//! binary, and the combined RDAP + SSL domain report.

use std::process::Stdio;
use std::time::Duration;

use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use serde_json::{json, Value};
use shell_words::quote;
use tokio::process::Command;
use tracing::debug;

use crate::error::{Error, Result};
use crate::queue::task::HealthcheckArgs;

const PROBE_TIMEOUT: Duration = Duration::from_secs(30);
const SSL_TIMEOUT: Duration = Duration::from_secs(10);
const RDAP_TIMEOUT: Duration = Duration::from_secs(10);
const BODY_LIMIT: usize = 2000;

/// HTTP probe: status code, first 2000 bytes of body, optional keyword
/// check and optional screenshot.
pub async fn healthcheck(client: &reqwest::Client, args: &HealthcheckArgs) -> Result<Value> {
    let response = client
        .get(&args.url)
        .timeout(PROBE_TIMEOUT)
        .send()
        .await?;
    let status = response.status().as_u16();
    let body: String = response
        .text()
        .await
        .unwrap_or_default()
        .chars()
        .take(BODY_LIMIT)
        .collect();

    let keyword_present = args.keyword.as_deref().map(|k| body.contains(k));
    let ok = status == 200 && keyword_present.unwrap_or(true);

    let mut result = json!({"url": args.url, "status": status, "ok": ok});
    if keyword_present.is_some() {
        result["keyword_present"] = json!(keyword_present);
    }
    if args.screenshot {
        result["screenshot"] = take_screenshot(&args.url, &args.out_path).await;
    }
    Ok(result)
}

/// wkhtmltoimage first, then headless Chrome/Chromium.
pub async fn take_screenshot(url: &str, out_path: &str) -> Value {
    let parent = std::path::Path::new(out_path)
        .parent()
        .map(|p| p.display().to_string())
        .filter(|p| !p.is_empty())
        .unwrap_or_else(|| "/tmp".to_string());
    let _ = shell(&format!("mkdir -p {}", quote(&parent))).await;

    if tool_exists("wkhtmltoimage").await {
        let cmd = format!(
            "wkhtmltoimage --format png --width 1366 --height 0 {} {}",
            quote(url),
            quote(out_path)
        );
        if let Ok(true) = shell(&cmd).await {
            return json!({"ok": true, "path": out_path, "tool": "wkhtmltoimage", "error": null});
        }
    }

    for chrome in ["google-chrome", "google-chrome-stable", "chromium-browser"] {
        if !tool_exists(chrome).await {
            continue;
        }
        let cmd = format!(
            "{chrome} --headless --disable-gpu --hide-scrollbars \
             --window-size=1366,768 --screenshot={} {}",
            quote(out_path),
            quote(url)
        );
        if let Ok(true) = shell(&cmd).await {
            return json!({"ok": true, "path": out_path, "tool": chrome, "error": null});
        }
        // some builds always write screenshot.png into the cwd
        if std::path::Path::new("screenshot.png").exists() {
            match std::fs::rename("screenshot.png", out_path) {
                Ok(()) => {
                    return json!({"ok": true, "path": out_path, "tool": chrome, "error": null})
                }
                Err(e) => {
                    return json!({
                        "ok": false,
                        "path": out_path,
                        "tool": chrome,
                        "error": format!("move_failed: {e}"),
                    })
                }
            }
        }
    }

    json!({
        "ok": false,
        "path": out_path,
        "tool": null,
        "error": "No screenshot tool found (install wkhtmltoimage or Chrome/Chromium headless).",
    })
}

async fn tool_exists(tool: &str) -> bool {
    shell(&format!("command -v {}", quote(tool)))
        .await
        .unwrap_or(false)
}

async fn shell(cmd: &str) -> std::io::Result<bool> {
    let status = Command::new("sh")
        .arg("-c")
        .arg(cmd)
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .await?;
    Ok(status.success())
}

/// `ssl_expiry` task body: certificate end date for `domain:443`.
pub async fn ssl_expiry(domain: &str) -> Result<Value> {
    let (not_after, raw) = probe_ssl_expiry(domain)
        .await
        .map_err(Error::Task)?;
    let days_left = (not_after - Utc::now()).num_days();
    Ok(json!({"domain": domain, "not_after": raw, "days_left": days_left}))
}

/// Read the peer certificate's notAfter via the local openssl binary, the
/// same pipeline an operator would run by hand. Failures come back as
/// `SSL error: ...` strings.
pub async fn probe_ssl_expiry(domain: &str) -> std::result::Result<(DateTime<Utc>, String), String> {
    let cmd = format!(
        "echo | openssl s_client -servername {d} -connect {d}:443 2>/dev/null \
         | openssl x509 -noout -enddate",
        d = quote(domain)
    );
    let output = tokio::time::timeout(
        SSL_TIMEOUT,
        Command::new("sh").arg("-c").arg(&cmd).output(),
    )
    .await
    .map_err(|_| format!("SSL error: probe timed out after {}s", SSL_TIMEOUT.as_secs()))?
    .map_err(|e| format!("SSL error: {e}"))?;

    let stdout = String::from_utf8_lossy(&output.stdout);
    let raw = stdout
        .trim()
        .rsplit_once('=')
        .map(|(_, end)| end.trim().to_string())
        .unwrap_or_default();
    if raw.is_empty() {
        return Err(format!(
            "SSL error: no certificate end date for {domain}"
        ));
    }
    let not_after = parse_cert_end_date(&raw)
        .ok_or_else(|| format!("SSL error: unrecognized notAfter '{raw}'"))?;
    Ok((not_after, raw))
}

/// `Oct 24 22:14:28 2025 GMT`, day possibly space-padded.
pub fn parse_cert_end_date(raw: &str) -> Option<DateTime<Utc>> {
    let fields: Vec<&str> = raw.split_whitespace().collect();
    if fields.len() < 4 {
        return None;
    }
    let compact = format!("{} {} {} {}", fields[0], fields[1], fields[2], fields[3]);
    let naive = NaiveDateTime::parse_from_str(&compact, "%b %d %H:%M:%S %Y").ok()?;
    Some(Utc.from_utc_datetime(&naive))
}

/// `domain_ssl_collect` task body: RDAP domain expiry + SSL expiry,
/// combined into one report. Each probe fails independently; the task
/// itself always succeeds with the structured outcome.
pub async fn domain_ssl_collect(client: &reqwest::Client, domain: &str) -> Value {
    let whois = match probe_domain_expiry(client, domain).await {
        Ok(expiry) => json!({
            "ok": true,
            "expiration_readable": expiry.format("%Y-%m-%d %H:%M:%S").to_string(),
            "expiration": expiry.to_rfc3339(),
            "days_left": (expiry - Utc::now()).num_days(),
        }),
        Err(error) => json!({"ok": false, "error": error}),
    };

    let ssl = match probe_ssl_expiry(domain).await {
        Ok((not_after, _raw)) => json!({
            "ok": true,
            "not_after_readable": not_after.format("%Y-%m-%d %H:%M:%S").to_string(),
            "not_after": not_after.to_rfc3339(),
            "days_left": (not_after - Utc::now()).num_days(),
        }),
        Err(error) => json!({"ok": false, "error": error}),
    };

    let ok = whois["ok"].as_bool().unwrap_or(false) && ssl["ok"].as_bool().unwrap_or(false);
    json!({
        "domain": domain.to_lowercase(),
        "whois": whois,
        "ssl": ssl,
        "ok": ok,
        "checked_at": Utc::now().to_rfc3339(),
    })
}

/// RDAP query; the first event whose action names an expiration carries
/// the date. Failures come back as `WHOIS error: ...` strings.
pub async fn probe_domain_expiry(
    client: &reqwest::Client,
    domain: &str,
) -> std::result::Result<DateTime<Utc>, String> {
    let url = format!("https://rdap.org/domain/{domain}");
    let response = client
        .get(&url)
        .header("User-Agent", "nh-amc/1.0")
        .timeout(RDAP_TIMEOUT)
        .send()
        .await
        .map_err(|e| format!("WHOIS error: RDAP request failed ({e})"))?;
    if !response.status().is_success() {
        return Err(format!(
            "WHOIS error: RDAP request failed ({})",
            response.status()
        ));
    }
    let data: Value = response
        .json()
        .await
        .map_err(|e| format!("WHOIS error: RDAP request failed ({e})"))?;

    let events = data.get("events").and_then(Value::as_array);
    let expiry = events
        .into_iter()
        .flatten()
        .filter(|event| {
            matches!(
                event.get("eventAction").and_then(Value::as_str),
                Some("expiration" | "expires" | "expiry")
            )
        })
        .filter_map(|event| event.get("eventDate").and_then(Value::as_str))
        .find_map(parse_loose_date);

    debug!(%domain, found = expiry.is_some(), "RDAP expiration lookup");
    expiry.ok_or_else(|| "WHOIS error: RDAP had no expiration event".to_string())
}

/// ISO-8601 first, then the date-only formats registries drift into.
pub fn parse_loose_date(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = DateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%z") {
        return Some(dt.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%d", "%d-%b-%Y"] {
        if let Ok(date) = NaiveDate::parse_from_str(raw, format) {
            let naive = date.and_hms_opt(0, 0, 0)?;
            return Some(Utc.from_utc_datetime(&naive));
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cert_end_date_parses_openssl_output() {
        let dt = parse_cert_end_date("Oct 24 22:14:28 2025 GMT").unwrap();
        assert_eq!(dt.format("%Y-%m-%d %H:%M:%S").to_string(), "2025-10-24 22:14:28");

        // space-padded single-digit day
        let dt = parse_cert_end_date("Oct  4 08:00:00 2026 GMT").unwrap();
        assert_eq!(dt.format("%Y-%m-%d").to_string(), "2026-10-04");

        assert!(parse_cert_end_date("garbage").is_none());
        assert!(parse_cert_end_date("").is_none());
    }

    #[test]
    fn loose_dates_parse() {
        assert!(parse_loose_date("2026-02-10T00:00:00Z").is_some());
        assert!(parse_loose_date("2026-02-10T00:00:00+00:00").is_some());
        assert_eq!(
            parse_loose_date("2026-02-10")
                .unwrap()
                .format("%Y-%m-%d %H:%M:%S")
                .to_string(),
            "2026-02-10 00:00:00"
        );
        assert!(parse_loose_date("10-Feb-2026").is_some());
        assert!(parse_loose_date("next tuesday").is_none());
    }
}
