//! AMC-RS binary entry point.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tokio::net::TcpListener;
use tracing::info;

use amc_rs::config::AmcConfig;
use amc_rs::http::{build_router, AppState};
use amc_rs::logging::{init_logging, LogConfig};
use amc_rs::queue::{InMemoryBroker, MemoryTaskStore, WorkerContext, WorkerPool};
use amc_rs::registry::SiteRegistry;
use amc_rs::reporter::Reporter;
use amc_rs::wp::{UpdaterConfig, WpUpdater};

#[derive(Parser)]
#[command(name = "amc-rs", about = "WordPress site-management control plane", version)]
struct Cli {
    /// Config file path (defaults to probing amc-config.toml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the bind address
    #[arg(long, env = "BIND_ADDR")]
    bind: Option<String>,

    /// Override the worker pool size
    #[arg(long)]
    workers: Option<usize>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = AmcConfig::load(cli.config.as_ref()).context("loading configuration")?;
    if let Some(bind) = cli.bind {
        config.server.bind_addr = bind;
    }
    if let Some(workers) = cli.workers {
        config.queue.workers = workers;
    }

    let _log_guard = init_logging(&LogConfig::from_server_config(&config.server))?;
    info!(app = %config.server.app_name, "starting control plane");
    if let Some(broker_url) = &config.queue.broker_url {
        // carried for a broker-backed queue; the in-memory queue ignores it
        info!(%broker_url, "external broker configured but not in use");
    }
    if config.server.reset_token.is_none() {
        info!("RESET_TOKEN not configured; destructive endpoints respond 503");
    }

    let config = Arc::new(config);
    let http = reqwest::Client::builder()
        .user_agent("amc-rs/0.3")
        .build()
        .context("building HTTP client")?;
    let updater = WpUpdater::new(
        http.clone(),
        UpdaterConfig::from_driver_config(&config.driver),
    );
    let reporter = Arc::new(Reporter::new(&config.smtp));

    let store = Arc::new(MemoryTaskStore::new(config.queue.max_results));
    let (broker, rx) = InMemoryBroker::new(store.clone());
    let ctx = Arc::new(WorkerContext {
        http,
        updater,
        reporter,
        config: Arc::clone(&config),
    });
    let _pool = WorkerPool::spawn(rx, store.clone(), ctx, config.worker_count());

    let state = AppState {
        config: Arc::clone(&config),
        registry: SiteRegistry::new(),
        broker: Arc::new(broker),
        store,
    };
    let router = build_router(state);

    let listener = TcpListener::bind(&config.server.bind_addr)
        .await
        .with_context(|| format!("binding {}", config.server.bind_addr))?;
    info!(addr = %config.server.bind_addr, "listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("serving HTTP")?;

    Ok(())
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    info!("shutdown signal received");
}
