/// Server setup and initialization
///
/// Wires together the workflow service, the scheduler loop and the HTTP routes,
/// and owns process-level concerns: logging and graceful shutdown.

use crate::{
    api::{create_api_routes, AppState},
    capability::Capabilities,
    config::Config,
    service::WorkflowService,
};
use anyhow::Result;
use axum::{routing::get, Router};
use std::sync::Arc;
use tokio::{net::TcpListener, task::JoinHandle};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

/// Create the main Axum application with all routes
///
/// Starts the scheduler loop with the given collaborators; the loop runs until
/// `token` is cancelled. Returns the router and the loop's join handle.
pub fn create_app(
    config: &Config,
    capabilities: Capabilities,
    token: CancellationToken,
) -> Result<(Router, JoinHandle<()>)> {
    tracing::info!("📁 Ensuring results directory exists: {}", config.export.results_dir.display());
    std::fs::create_dir_all(&config.export.results_dir).map_err(|e| {
        anyhow::anyhow!(
            "Failed to create results directory {}: {}",
            config.export.results_dir.display(),
            e
        )
    })?;

    tracing::info!("⚙️ Starting workflow service");
    let (service, scheduler) = WorkflowService::start(config, capabilities, token);
    let state = AppState {
        service: Arc::new(service),
    };

    tracing::info!("📡 Creating HTTP router with all endpoints");
    let app = Router::new()
        .route("/healthz", get(health_check))
        .merge(create_api_routes(state));

    tracing::info!("✅ Application initialized successfully");
    Ok((app, scheduler))
}

/// Start the HTTP server with the given configuration
///
/// Runs until Ctrl-C, then stops accepting requests and stops the scheduler
/// loop. Jobs already running are left to finish on their own tasks.
pub async fn start_server(config: Config) -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .with_thread_ids(true)
        .with_level(true)
        .init();

    tracing::info!("Starting slidequeue server...");

    let token = CancellationToken::new();
    let capabilities = Capabilities::from_config(&config);
    let (app, scheduler) = create_app(&config, capabilities, token.clone())?;

    let bind_addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = TcpListener::bind(&bind_addr).await?;

    tracing::info!("Server listening on http://{}", bind_addr);

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal(token.clone()))
        .await?;

    token.cancel();
    if let Err(e) = scheduler.await {
        tracing::error!("❌ Scheduler loop ended abnormally: {}", e);
    }

    tracing::info!("👋 Server stopped");
    Ok(())
}

/// Resolve on Ctrl-C or when the token is cancelled elsewhere
async fn shutdown_signal(token: CancellationToken) {
    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            if let Err(e) = result {
                tracing::error!("❌ Failed to listen for shutdown signal: {}", e);
            }
            tracing::info!("🛑 Shutdown signal received");
            token.cancel();
        }
        _ = token.cancelled() => {}
    }
}

async fn health_check() -> &'static str {
    "ok"
}
