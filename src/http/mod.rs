//! HTTP submitter: router, shared state and the CORS layer.

pub mod handlers;
pub mod requests;

use std::sync::Arc;

use axum::http::{HeaderValue, Method};
use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::warn;

use crate::config::AmcConfig;
use crate::queue::{Broker, TaskStore};
use crate::registry::SiteRegistry;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AmcConfig>,
    pub registry: SiteRegistry,
    pub broker: Arc<dyn Broker>,
    pub store: Arc<dyn TaskStore>,
}

/// Build the full API router.
pub fn build_router(state: AppState) -> Router {
    let cors = cors_layer(&state.config);
    Router::new()
        .route("/", get(handlers::root))
        .route("/ssh/login", post(handlers::ssh_login))
        .route("/sites/{site_id}", get(handlers::get_site))
        .route("/tasks/backup", post(handlers::trigger_backup))
        .route("/tasks/backup/db", post(handlers::trigger_backup_db))
        .route("/tasks/backup/content", post(handlers::trigger_backup_content))
        .route("/tasks/wp-status", post(handlers::trigger_wp_status))
        .route("/tasks/update", post(handlers::trigger_update))
        .route("/tasks/ssl-expiry", post(handlers::trigger_ssl_expiry))
        .route("/tasks/healthcheck", post(handlers::trigger_healthcheck))
        .route("/tasks/wp-install/{site_id}", post(handlers::trigger_wp_install))
        .route("/tasks/wp-reset", post(handlers::trigger_wp_reset))
        .route(
            "/tasks/domain-ssl-collect",
            post(handlers::trigger_domain_ssl_collect),
        )
        .route(
            "/tasks/wp-outdated-fetch",
            post(handlers::trigger_wp_outdated_fetch),
        )
        .route(
            "/tasks/wp-update/plugins",
            post(handlers::trigger_wp_update_plugins),
        )
        .route("/tasks/wp-update/core", post(handlers::trigger_wp_update_core))
        .route("/tasks/wp-update/all", post(handlers::trigger_wp_update_all))
        .route("/tasks/{task_id}", get(handlers::get_task))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

fn cors_layer(config: &AmcConfig) -> CorsLayer {
    let origins = &config.server.cors_allow_origins;
    if origins.iter().any(|origin| origin == "*") {
        return CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any);
    }

    let parsed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match origin.parse::<HeaderValue>() {
            Ok(value) => Some(value),
            Err(_) => {
                warn!(%origin, "ignoring unparseable CORS origin");
                None
            }
        })
        .collect();
    CorsLayer::new()
        .allow_origin(AllowOrigin::list(parsed))
        .allow_methods([Method::GET, Method::POST])
        .allow_headers(Any)
}
