//! `relay-bridged` -- the process entry point that wires a [`relay_bridge::Bridge`]
//! and one [`relay_spawner::Spawner`] per project together. It is a thin
//! binary, not a designed CLI surface: load config, load the project set,
//! connect, run until asked to stop, shut down cleanly.

mod projects;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use relay_bridge::{Bridge, BridgeOptions};
use relay_core::config::Config;
use relay_spawner::{Spawner, SpawnerOptions};
use tracing::{info, warn};

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

/// `relay-bridged` connects every configured project to the message relay
/// and supervises the workers spawned in each one.
#[derive(Parser)]
#[command(name = "relay-bridged", version, about)]
struct Args {
    /// Path to the project list TOML file. Defaults to
    /// `~/.relay-bridge/projects.toml`.
    #[arg(long)]
    projects: Option<PathBuf>,

    /// Path to the operational config file. Overrides `RELAY_BRIDGE_CONFIG`.
    #[arg(long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => Config::load_from(path.clone()),
        None => Config::load(),
    }
    .unwrap_or_else(|e| {
        eprintln!("failed to load config, using defaults: {e}");
        Config::default()
    });

    relay_telemetry::logging::init_logging("relay-bridged", &config.general.log_level);

    info!(version = env!("CARGO_PKG_VERSION"), pid = std::process::id(), "relay-bridged starting");

    let projects_path = args.projects.clone().unwrap_or_else(projects::default_path);
    let project_configs = projects::load(&projects_path)
        .with_context(|| format!("failed to load projects from {}", projects_path.display()))?;

    if project_configs.is_empty() {
        warn!(path = %projects_path.display(), "no projects configured, bridge will have nothing to connect to");
    }

    let (bridge, mut events) = Bridge::new(BridgeOptions::from(&config.bridge));
    let bridge = Arc::new(bridge);

    let spawners: Vec<(String, Arc<Spawner>)> = project_configs
        .iter()
        .map(|project| {
            let spawner = Spawner::with_options(project, SpawnerOptions::from(&config.spawner))
                .with_context(|| format!("failed to initialize spawner for project {}", project.id))?;
            Ok::<_, anyhow::Error>((project.id.clone(), Arc::new(spawner)))
        })
        .collect::<Result<_>>()?;

    bridge.connect(project_configs).await.context("failed to connect to any configured project")?;

    let events_task = tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            info!(?event, "bridge event");
        }
    });

    shutdown_signal().await;
    info!("shutdown requested, disconnecting");

    bridge.disconnect().await;
    for (project_id, spawner) in &spawners {
        info!(project_id, "releasing workers");
        spawner.release_all().await;
    }
    events_task.abort();

    info!("relay-bridged stopped");
    Ok(())
}

#[cfg(unix)]
async fn shutdown_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigterm = signal(SignalKind::terminate()).expect("failed to install SIGTERM handler");
    let mut sigint = signal(SignalKind::interrupt()).expect("failed to install SIGINT handler");

    tokio::select! {
        _ = sigterm.recv() => {}
        _ = sigint.recv() => {}
    }
}

#[cfg(not(unix))]
async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}
