//! Site records: the normalised connection + database descriptor for a
//! single WordPress host.

use std::fmt;

use serde::Deserialize;
use serde_json::{json, Value};

use crate::error::{Error, Result};

pub const DEFAULT_SSH_PORT: u16 = 22;
pub const DEFAULT_WP_PATH: &str = "/var/www/html";

/// Connection + install context for one managed host.
///
/// Exactly one of `key_filename`, `private_key_pem` or `password` must be
/// present. The record is immutable per request; enqueued copies always
/// carry `user == "root"` (see [`SiteRecord::normalized`]).
#[derive(Clone, Deserialize)]
pub struct SiteRecord {
    pub host: String,
    #[serde(default = "default_user")]
    pub user: String,
    #[serde(default = "default_port")]
    pub port: u16,
    pub key_filename: Option<String>,
    pub private_key_pem: Option<String>,
    pub password: Option<String>,
    pub sudo_password: Option<String>,
    #[serde(default = "default_wp_path")]
    pub wp_path: String,
    pub db_name: Option<String>,
    pub db_user: Option<String>,
    pub db_pass: Option<String>,
}

fn default_user() -> String {
    "root".to_string()
}

fn default_port() -> u16 {
    DEFAULT_SSH_PORT
}

fn default_wp_path() -> String {
    DEFAULT_WP_PATH.to_string()
}

impl SiteRecord {
    /// Validate the invariants every enqueued record must satisfy: a
    /// non-empty host and at least one credential form.
    pub fn validate(&self) -> Result<()> {
        if self.host.trim().is_empty() {
            return Err(Error::InvalidRequest("site.host is required".into()));
        }
        if self.key_filename.is_none()
            && self.private_key_pem.is_none()
            && self.password.is_none()
        {
            return Err(Error::InvalidRequest(
                "one of key_filename, private_key_pem or password is required".into(),
            ));
        }
        Ok(())
    }

    /// Copy of the record as it is enqueued: the user is forced to `root`
    /// and the sudo password falls back to the login password.
    pub fn normalized(&self) -> SiteRecord {
        let mut site = self.clone();
        site.user = "root".to_string();
        if site.sudo_password.is_none() {
            site.sudo_password = site.password.clone();
        }
        site
    }

    /// Effective sudo password: the explicit one, else the login password.
    pub fn effective_sudo_password(&self) -> Option<&str> {
        self.sudo_password
            .as_deref()
            .or(self.password.as_deref())
    }

    /// Non-secret projection, safe for logs and the `/sites/{id}` endpoint.
    pub fn safe_summary(&self) -> Value {
        json!({
            "host": self.host,
            "user": self.user,
            "port": self.port,
            "wp_path": self.wp_path,
        })
    }

    /// Database context, required by the backup and rollback handlers.
    pub fn database(&self) -> Result<(String, String, String)> {
        match (&self.db_name, &self.db_user, &self.db_pass) {
            (Some(name), Some(user), Some(pass)) => {
                Ok((name.clone(), user.clone(), pass.clone()))
            }
            _ => Err(Error::InvalidRequest(
                "site.db_name, site.db_user and site.db_pass are required".into(),
            )),
        }
    }
}

// Secrets must never leak through Debug output or task payload dumps.
impl fmt::Debug for SiteRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SiteRecord")
            .field("host", &self.host)
            .field("user", &self.user)
            .field("port", &self.port)
            .field("key_filename", &self.key_filename.as_deref().map(|_| "***"))
            .field(
                "private_key_pem",
                &self.private_key_pem.as_deref().map(|_| "***"),
            )
            .field("password", &self.password.as_deref().map(|_| "***"))
            .field(
                "sudo_password",
                &self.sudo_password.as_deref().map(|_| "***"),
            )
            .field("wp_path", &self.wp_path)
            .field("db_name", &self.db_name)
            .field("db_user", &self.db_user)
            .field("db_pass", &self.db_pass.as_deref().map(|_| "***"))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn password_site() -> SiteRecord {
        SiteRecord {
            host: "wp1.example.com".to_string(),
            user: "deploy".to_string(),
            port: 22,
            key_filename: None,
            private_key_pem: None,
            password: Some("hunter2".to_string()),
            sudo_password: None,
            wp_path: "/var/www/html".to_string(),
            db_name: Some("wp_db".to_string()),
            db_user: Some("wp_user".to_string()),
            db_pass: Some("wp_pass".to_string()),
        }
    }

    #[test]
    fn normalized_forces_root_and_sudo_fallback() {
        let site = password_site().normalized();
        assert_eq!(site.user, "root");
        assert_eq!(site.sudo_password.as_deref(), Some("hunter2"));
    }

    #[test]
    fn normalized_keeps_explicit_sudo_password() {
        let mut site = password_site();
        site.sudo_password = Some("other".to_string());
        let site = site.normalized();
        assert_eq!(site.effective_sudo_password(), Some("other"));
    }

    #[test]
    fn validate_requires_host_and_credential() {
        let mut site = password_site();
        site.host = "  ".to_string();
        assert!(site.validate().is_err());

        let mut site = password_site();
        site.password = None;
        assert!(site.validate().is_err());

        assert!(password_site().validate().is_ok());
    }

    #[test]
    fn debug_redacts_secrets() {
        let site = password_site();
        let dump = format!("{:?}", site);
        assert!(!dump.contains("hunter2"));
        assert!(!dump.contains("wp_pass"));
        assert!(dump.contains("wp1.example.com"));
    }

    #[test]
    fn safe_summary_has_no_secret_fields() {
        let summary = site_summary_keys(&password_site());
        assert_eq!(summary, vec!["host", "port", "user", "wp_path"]);
    }

    fn site_summary_keys(site: &SiteRecord) -> Vec<String> {
        let mut keys: Vec<String> = site
            .safe_summary()
            .as_object()
            .unwrap()
            .keys()
            .cloned()
            .collect();
        keys.sort();
        keys
    }
}
