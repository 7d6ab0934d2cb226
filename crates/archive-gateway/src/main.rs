use std::net::SocketAddr;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tokio::sync::{mpsc, watch};
use tracing::{error, info, warn};

use archive_core::config::ArchiveConfig;
use archive_core::error::ArchiveError;
use archive_gateway::app;
use archive_tasks::{Schedule, SchedulerEngine};

/// Personal-archive retrieval engine host process.
#[derive(Debug, Parser)]
#[command(name = "archive-gateway")]
struct Cli {
    /// Path to the TOML config file (defaults to ~/.archive/archive.toml,
    /// overridable via ARCHIVE_CONFIG).
    #[arg(long, global = true)]
    config: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run the HTTP gateway (default if no subcommand is given).
    Serve,
    /// Open every store once so its schema is created, then exit.
    Migrate,
    /// Restore every setting to its built-in default and exit.
    ResetSettings {
        /// Restrict the reset to one category; omit to reset everything.
        #[arg(long)]
        category: Option<String>,
    },
}

fn load_config(path: Option<&str>) -> ArchiveConfig {
    ArchiveConfig::load(path).unwrap_or_else(|e| {
        warn!("config load failed ({e}), using defaults");
        ArchiveConfig::default()
    })
}

fn exit_code_for(err: &ArchiveError) -> ExitCode {
    match err {
        ArchiveError::ExternalUnavailable(_) => ExitCode::from(3),
        _ => ExitCode::from(1),
    }
}

async fn run_serve(config: ArchiveConfig) -> Result<(), ArchiveError> {
    let bind = config.gateway.bind.clone();
    let port = config.gateway.port;

    let host = app::AppHost::build(config).await?;
    let router = app::build_router(host.clone());

    let (fired_tx, mut fired_rx) = mpsc::channel(64);
    let scheduler_conn = rusqlite::Connection::open(&host.config.database.tasks_path)
        .map_err(|e| ArchiveError::ExternalUnavailable(format!("scheduler db: {e}")))?;
    let scheduler = SchedulerEngine::new(scheduler_conn, Some(fired_tx))
        .map_err(|e| ArchiveError::Internal(e.to_string()))?;

    // One interval sync job per registered plugin (spec §4.6 step 4);
    // a plugin already carrying jobs from a previous run keeps them.
    for summary in host.plugins.summaries() {
        let existing = scheduler
            .list_jobs()
            .map_err(|e| ArchiveError::Internal(e.to_string()))?;
        if existing.iter().any(|j| j.action == summary.name) {
            continue;
        }
        if let Err(e) = scheduler.add_job(
            &format!("{}-sync", summary.name),
            Schedule::Interval { every_secs: 300 },
            &summary.name,
        ) {
            warn!(plugin = %summary.name, error = %e, "failed to register scheduled sync job");
        }
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let engine_handle = tokio::spawn(scheduler.run(shutdown_rx));

    let sync_plugins = host.plugins.clone();
    let sync_handle = tokio::spawn(async move {
        while let Some(job) = fired_rx.recv().await {
            let Some(plugin) = sync_plugins.get(&job.action) else {
                warn!(action = %job.action, "scheduled job fired for unknown plugin");
                continue;
            };
            match plugin.scheduled_sync().await {
                Ok(count) => info!(plugin = %job.action, ingested = count, "scheduled sync completed"),
                Err(e) => warn!(plugin = %job.action, error = %e, "scheduled sync failed"),
            }
        }
    });

    let addr: SocketAddr = format!("{bind}:{port}")
        .parse()
        .map_err(|e| ArchiveError::InvalidInput(format!("gateway.bind/gateway.port: {e}")))?;
    info!("archive gateway listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| ArchiveError::ExternalUnavailable(format!("bind {addr}: {e}")))?;
    axum::serve(listener, router)
        .await
        .map_err(|e| ArchiveError::Internal(e.to_string()))?;

    let _ = shutdown_tx.send(true);
    let _ = engine_handle.await;
    sync_handle.abort();
    host.shutdown().await;

    Ok(())
}

fn run_migrate(config: ArchiveConfig) -> Result<(), ArchiveError> {
    archive_settings::SettingsStore::open(&config.database.settings_path)?.seed_boot()?;
    archive_identity::IdentityStore::open(&config.database.identity_path)?;
    let tasks_conn = rusqlite::Connection::open(&config.database.tasks_path)
        .map_err(|e| ArchiveError::ExternalUnavailable(format!("tasks db: {e}")))?;
    archive_tasks::SchedulerEngine::new(tasks_conn, None)
        .map_err(|e| ArchiveError::Internal(e.to_string()))?;
    info!("schema migrations complete");
    Ok(())
}

fn run_reset_settings(config: ArchiveConfig, category: Option<&str>) -> Result<(), ArchiveError> {
    let settings = archive_settings::SettingsStore::open(&config.database.settings_path)?;
    settings.reset_defaults(category)?;
    info!(category = ?category, "settings reset to defaults");
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "archive_gateway=info,tower_http=debug".into()),
        )
        .init();

    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref());

    let result = match cli.command {
        Command::Serve => run_serve(config).await,
        Command::Migrate => run_migrate(config),
        Command::ResetSettings { category } => run_reset_settings(config, category.as_deref()),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e}");
            exit_code_for(&e)
        }
    }
}
