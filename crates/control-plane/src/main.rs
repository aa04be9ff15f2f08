//! Control plane server binary.

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::net::TcpListener;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use control_plane::builds::{BuildService, CommandBuilder, FsLogDriver, LogDriver};
use control_plane::{AppState, Config, LogFormat, MemoryStore, Store};
use node_runtime::EnvInitializer;

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::parse();
    init_tracing(&config);

    if config.lambdalabs_api_key.is_none() {
        warn!("No LAMBDALABS_API_KEY configured - LambdaLabs requests will fail");
    }

    let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
    let initializer = Arc::new(EnvInitializer::new(config.provider_config()));
    let log_driver: Arc<dyn LogDriver> = Arc::new(FsLogDriver::new(&config.build_log_dir));

    let mut builds = BuildService::new(Arc::clone(&store), Arc::clone(&log_driver));
    match config.build_command() {
        Some((program, args)) => {
            info!(builder = %config.builder_name, program = %program, "Registered command builder");
            builds = builds.with_builder(Arc::new(CommandBuilder::new(
                config.builder_name.clone(),
                program,
                args,
                config.build_work_dir.clone(),
            )));
        }
        None => warn!("No BUILDER_COMMAND configured - build requests will be rejected"),
    }

    let state = Arc::new(AppState::new(store, initializer, log_driver).with_builds(builds));

    let listener = TcpListener::bind(config.listen_addr)
        .await
        .with_context(|| format!("Failed to bind to {}", config.listen_addr))?;

    control_plane::serve(listener, state, shutdown_signal())
        .await
        .context("Server error")?;

    info!("Control plane stopped");
    Ok(())
}

fn init_tracing(config: &Config) {
    let default_level = if config.verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    match config.log_format {
        LogFormat::Json => tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init(),
        LogFormat::Text => tracing_subscriber::fmt().with_env_filter(filter).init(),
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
