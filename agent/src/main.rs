//! hybridsync agent
//!
//! Runs the sync engine against a local SQLite file and a PostgREST
//! remote, with an admin HTTP endpoint for status and manual syncs.
//!
//! Usage:
//!   hybridsync-agent --db app.db run --http-port 4002
//!   hybridsync-agent --db app.db sync
//!   hybridsync-agent --db app.db status

use std::{fs, path::PathBuf, sync::Arc};
use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use hybridsync_agent::build_router;
use hybridsync_store::LocalStore;
use hybridsync_sync::{MemoryRemote, PostgrestClient, RemoteClient, RemoteConfig, SyncConfig, SyncCoordinator};
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[derive(Parser, Debug)]
#[command(name = "hybridsync-agent")]
#[command(about = "Offline-first sync agent for a local SQLite store")]
struct Args {
    /// Path to the local database
    #[arg(long, default_value = "hybridsync.db")]
    db: PathBuf,

    /// Remote base URL
    #[arg(long, env = "HYBRIDSYNC_REMOTE_URL")]
    remote_url: Option<String>,

    /// Remote API key
    #[arg(long, env = "HYBRIDSYNC_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// JSON file with sync settings
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Use an in-process remote instead of the network (local demos)
    #[arg(long)]
    memory_remote: bool,

    /// Enable verbose debug logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the background workers and the admin endpoint
    Run {
        /// HTTP port for the admin endpoint
        #[arg(long, default_value = "4002")]
        http_port: u16,
    },
    /// Run one full sync and exit
    Sync,
    /// Print the local sync status as JSON
    Status,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let filter = if args.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .init();

    let config = load_config(args.config.as_ref())?;
    let remote = build_remote(&args)?;
    let store = LocalStore::open(&args.db)
        .with_context(|| format!("Failed to open local store at {}", args.db.display()))?;
    let coordinator = Arc::new(SyncCoordinator::new(store, remote, config));

    match args.command.unwrap_or(Command::Run { http_port: 4002 }) {
        Command::Run { http_port } => run(coordinator, http_port).await,
        Command::Sync => {
            let success = coordinator.force_full_sync().await;
            print_status(&coordinator).await?;
            if !success {
                bail!("Sync did not complete; pending changes stay queued");
            }
            Ok(())
        }
        Command::Status => print_status(&coordinator).await,
    }
}

async fn run(coordinator: Arc<SyncCoordinator>, http_port: u16) -> Result<()> {
    info!("hybridsync agent starting...");
    let mode = coordinator.connect().await;
    info!("Initial sync mode: {:?}", mode);
    coordinator.start().await;

    let app = build_router(coordinator.clone());
    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", http_port))
        .await
        .with_context(|| format!("Failed to bind HTTP port {}", http_port))?;
    info!("Admin endpoint listening on port {}", http_port);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server failed")?;

    coordinator.stop().await;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Could not listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown requested");
}

async fn print_status(coordinator: &SyncCoordinator) -> Result<()> {
    let status = coordinator.status().await?;
    println!("{}", serde_json::to_string_pretty(&status)?);
    Ok(())
}

fn load_config(path: Option<&PathBuf>) -> Result<SyncConfig> {
    let Some(path) = path else {
        return Ok(SyncConfig::default());
    };
    let raw = fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))?;
    SyncConfig::from_json(&raw).with_context(|| format!("Invalid sync config in {}", path.display()))
}

fn build_remote(args: &Args) -> Result<Arc<dyn RemoteClient>> {
    if args.memory_remote {
        warn!("Using the in-process remote; nothing leaves this machine");
        return Ok(Arc::new(MemoryRemote::new()));
    }
    let (Some(url), Some(key)) = (&args.remote_url, &args.api_key) else {
        bail!("--remote-url and --api-key (or HYBRIDSYNC_REMOTE_URL / HYBRIDSYNC_API_KEY) are required");
    };
    let client = PostgrestClient::new(RemoteConfig::new(url.clone(), key.clone()))?;
    Ok(Arc::new(client))
}
