/// slidequeue server entry point
///
/// Loads configuration from the environment and serves:
/// - Workflow API at /workflows/*
/// - Job API at /jobs/*
/// - Health check at /healthz

use slidequeue::{config::Config, server::start_server};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Defaults to 0.0.0.0:3004, overridable through SLIDEQUEUE_* variables
    let config = Config::default();

    start_server(config).await?;

    Ok(())
}
