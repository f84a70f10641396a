//! In-memory session registry: opaque id -> verified site record.
//!
//! Entries are created only after a successful SSH probe and live until
//! explicit removal or process exit. No eviction policy.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::site::SiteRecord;

#[derive(Debug, Clone)]
pub struct SiteSession {
    pub site_id: Uuid,
    pub site: SiteRecord,
    pub verified_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default)]
pub struct SiteRegistry {
    sessions: Arc<RwLock<HashMap<Uuid, SiteSession>>>,
}

impl SiteRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a verified site and return its opaque id.
    pub async fn insert(&self, site: SiteRecord) -> Uuid {
        let site_id = Uuid::new_v4();
        let session = SiteSession {
            site_id,
            site,
            verified_at: Utc::now(),
        };
        self.sessions.write().await.insert(site_id, session);
        site_id
    }

    pub async fn get(&self, site_id: &Uuid) -> Option<SiteSession> {
        self.sessions.read().await.get(site_id).cloned()
    }

    pub async fn remove(&self, site_id: &Uuid) -> bool {
        self.sessions.write().await.remove(site_id).is_some()
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn site() -> SiteRecord {
        SiteRecord {
            host: "wp1.example.com".to_string(),
            user: "root".to_string(),
            port: 22,
            key_filename: None,
            private_key_pem: None,
            password: Some("pw".to_string()),
            sudo_password: None,
            wp_path: "/var/www/html".to_string(),
            db_name: None,
            db_user: None,
            db_pass: None,
        }
    }

    #[tokio::test]
    async fn insert_and_get() {
        let registry = SiteRegistry::new();
        let id = registry.insert(site()).await;

        let session = registry.get(&id).await.expect("session present");
        assert_eq!(session.site_id, id);
        assert_eq!(session.site.host, "wp1.example.com");
    }

    #[tokio::test]
    async fn unknown_id_is_none() {
        let registry = SiteRegistry::new();
        assert!(registry.get(&Uuid::new_v4()).await.is_none());
    }

    #[tokio::test]
    async fn remove_evicts() {
        let registry = SiteRegistry::new();
        let id = registry.insert(site()).await;
        assert!(registry.remove(&id).await);
        assert!(registry.get(&id).await.is_none());
        assert!(registry.is_empty().await);
    }
}
