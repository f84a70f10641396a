//! Configuration for the AMC control plane.
//!
//! Settings are layered: built-in defaults, then an optional TOML file,
//! then `AMC_`-prefixed environment variables, then the handful of plain
//! environment names the deployment scripts already export (`BROKER_URL`,
//! `SMTP_HOST`, `RESET_TOKEN`, ...).

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{Error, Result};

#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct AmcConfig {
    pub server: ServerConfig,
    pub queue: QueueConfig,
    pub smtp: SmtpConfig,
    pub remote: RemoteConfig,
    pub driver: DriverConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    pub app_name: String,
    pub bind_addr: String,
    /// CORS origin list; `["*"]` allows any origin
    pub cors_allow_origins: Vec<String>,
    /// Bearer token gating destructive endpoints; absent -> 503
    pub reset_token: Option<String>,
    pub log_level: Option<String>,
    /// Log directory; unset disables the rolling file layer
    pub log_dir: Option<PathBuf>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            app_name: "NH AMC".to_string(),
            bind_addr: "0.0.0.0:8000".to_string(),
            cors_allow_origins: vec!["*".to_string()],
            reset_token: None,
            log_level: Some("info".to_string()),
            log_dir: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct QueueConfig {
    /// Worker pool size; 0 -> number of CPUs
    pub workers: usize,
    /// Terminal task records retained for lookup
    pub max_results: usize,
    /// Carried for a broker-backed queue implementation; the in-memory
    /// broker only logs these at startup
    pub broker_url: Option<String>,
    pub result_backend: Option<String>,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            workers: 0,
            max_results: 1000,
            broker_url: None,
            result_backend: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub user: Option<String>,
    pub pass: Option<String>,
    pub from: String,
    pub starttls: bool,
}

impl Default for SmtpConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 25,
            user: None,
            pass: None,
            from: "no-reply@example.com".to_string(),
            starttls: false,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RemoteConfig {
    /// Directory holding `wp_provision.sh` / `wp_reset.sh`
    pub scripts_dir: PathBuf,
    /// Default remote directory for backup artefacts
    pub backup_dir: String,
    pub connect_timeout_secs: u64,
    /// Per remote command timeout
    pub command_timeout_secs: u64,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            scripts_dir: PathBuf::from("./scripts"),
            backup_dir: "/tmp/backups".to_string(),
            connect_timeout_secs: 30,
            command_timeout_secs: 600,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DriverConfig {
    pub status_timeout_secs: u64,
    /// Plugin/core update POSTs can take a while
    pub update_timeout_secs: u64,
    /// Pause between ladder steps before re-reading status
    pub settle_millis: u64,
    /// Default wait for the synchronous download path
    pub download_wait_secs: u64,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            status_timeout_secs: 30,
            update_timeout_secs: 600,
            settle_millis: 1000,
            download_wait_secs: 600,
        }
    }
}

impl AmcConfig {
    /// Load configuration: defaults, optional file, environment overrides.
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        let mut settings = config::Config::builder();

        let defaults = AmcConfig::default();
        settings = settings.add_source(
            config::Config::try_from(&defaults)
                .map_err(|e| Error::Config(e.to_string()))?,
        );

        let candidates: Vec<PathBuf> = match config_path {
            Some(path) => vec![path.clone()],
            None => vec![
                PathBuf::from("amc-config.toml"),
                PathBuf::from("config.toml"),
                PathBuf::from("config/amc.toml"),
            ],
        };
        for path in &candidates {
            if path.exists() {
                info!(path = %path.display(), "Loading config file");
                settings = settings.add_source(config::File::from(path.clone()));
                break;
            }
        }

        settings = settings.add_source(
            config::Environment::with_prefix("AMC")
                .separator("__")
                .try_parsing(true),
        );

        let mut config: AmcConfig = settings
            .build()
            .and_then(|c| c.try_deserialize())
            .map_err(|e| Error::Config(e.to_string()))?;

        config.apply_plain_env();
        Ok(config)
    }

    /// Overrides for the un-prefixed environment names the original
    /// deployments already use.
    fn apply_plain_env(&mut self) {
        if let Ok(addr) = std::env::var("BIND_ADDR") {
            self.server.bind_addr = addr;
        }
        if let Ok(token) = std::env::var("RESET_TOKEN") {
            if !token.is_empty() {
                self.server.reset_token = Some(token);
            }
        }
        if let Ok(origins) = std::env::var("CORS_ALLOW_ORIGINS") {
            self.server.cors_allow_origins = parse_cors_origins(&origins);
        }
        if let Ok(url) = std::env::var("BROKER_URL") {
            self.queue.broker_url = Some(url);
        }
        if let Ok(url) = std::env::var("RESULT_BACKEND") {
            self.queue.result_backend = Some(url);
        }
        if let Ok(host) = std::env::var("SMTP_HOST") {
            self.smtp.host = host;
        }
        if let Ok(port) = std::env::var("SMTP_PORT") {
            if let Ok(port) = port.parse() {
                self.smtp.port = port;
            }
        }
        if let Ok(user) = std::env::var("SMTP_USER") {
            self.smtp.user = Some(user);
        }
        if let Ok(pass) = std::env::var("SMTP_PASS") {
            self.smtp.pass = Some(pass);
        }
        if let Ok(from) = std::env::var("SMTP_FROM") {
            self.smtp.from = from;
        }
        if let Ok(starttls) = std::env::var("SMTP_STARTTLS") {
            self.smtp.starttls = matches!(
                starttls.trim().to_ascii_lowercase().as_str(),
                "1" | "true" | "yes" | "on"
            );
        }
    }

    /// Effective worker pool size.
    pub fn worker_count(&self) -> usize {
        if self.queue.workers == 0 {
            num_cpus::get()
        } else {
            self.queue.workers
        }
    }
}

/// Parse `CORS_ALLOW_ORIGINS`: `*`, or a comma-separated origin list.
pub fn parse_cors_origins(raw: &str) -> Vec<String> {
    let raw = raw.trim();
    if raw.is_empty() || raw == "*" {
        return vec!["*".to_string()];
    }
    raw.split(',')
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let config = AmcConfig::default();
        assert_eq!(config.server.bind_addr, "0.0.0.0:8000");
        assert_eq!(config.server.cors_allow_origins, vec!["*"]);
        assert!(config.server.reset_token.is_none());
        assert_eq!(config.remote.backup_dir, "/tmp/backups");
        assert_eq!(config.driver.settle_millis, 1000);
        assert!(config.worker_count() >= 1);
    }

    #[test]
    fn cors_star_and_list() {
        assert_eq!(parse_cors_origins("*"), vec!["*"]);
        assert_eq!(parse_cors_origins(""), vec!["*"]);
        assert_eq!(
            parse_cors_origins("https://a.com, https://b.com ,"),
            vec!["https://a.com", "https://b.com"]
        );
    }

    #[test]
    fn plain_env_overrides() {
        // Env vars are process-global; touch only names unused elsewhere.
        std::env::set_var("SMTP_STARTTLS", "true");
        std::env::set_var("SMTP_PORT", "587");

        let mut config = AmcConfig::default();
        config.apply_plain_env();
        assert!(config.smtp.starttls);
        assert_eq!(config.smtp.port, 587);

        std::env::remove_var("SMTP_STARTTLS");
        std::env::remove_var("SMTP_PORT");
    }
}
