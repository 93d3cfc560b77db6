//! SaveContext server entry point.

use clap::Parser;
use scs::cli::{Cli, Commands};
use scs::config::CompactionConfig;
use scs::embeddings::EmbeddingPipeline;
use scs::error::Error;
use scs::install::{setup_skill, setup_statusline, SkillOptions};
use scs::server::{serve_stdio, SaveContextServer};
use scs::storage::SqliteStorage;
use scs::sync::{CredentialStore, SyncClient, SyncQueue, SyncWorker};
use std::process::ExitCode;
use std::sync::Arc;
use tokio::sync::{watch, Mutex};
use tracing::info;

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let runtime = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("Error: failed to start runtime: {e}");
            return ExitCode::from(1);
        }
    };

    match runtime.block_on(run(&cli)) {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            if let Some(hint) = e.hint() {
                eprintln!("Error: {e}\n  Hint: {hint}");
            } else {
                eprintln!("Error: {e}");
            }
            ExitCode::from(e.exit_code())
        }
    }
}

/// Logs go to stderr; stdout carries the RPC stream.
fn init_tracing(verbose: u8) {
    use tracing_subscriber::EnvFilter;

    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else {
        match verbose {
            0 => EnvFilter::new("warn"),
            1 => EnvFilter::new("scs=info"),
            2 => EnvFilter::new("scs=debug"),
            _ => EnvFilter::new("scs=trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .without_time()
        .init();
}

async fn run(cli: &Cli) -> Result<u8, Error> {
    // Installer flags run and exit
    if cli.setup_statusline {
        setup_statusline()?;
        return Ok(0);
    }

    if cli.setup_skill {
        setup_skill(&SkillOptions {
            tool: cli.tool.clone(),
            path: cli.path.clone(),
            sync: cli.sync,
        })?;
        return Ok(0);
    }

    match cli.command {
        Some(Commands::Embeddings { ref action }) => {
            scs::cli::embeddings_cmd::execute(action.clone(), cli.db.as_ref()).await
        }
        Some(Commands::Serve) | None => serve(cli).await,
    }
}

/// Bring up the full server: storage, embedding pipeline, sync worker,
/// optional dashboard API, then MCP over stdio.
async fn serve(cli: &Cli) -> Result<u8, Error> {
    let db_path = scs::config::resolve_db_path(cli.db.as_deref())?;
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let storage = Arc::new(Mutex::new(SqliteStorage::open(&db_path)?));
    info!(db = %db_path.display(), "Store open");

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // Embedding pipeline: detect provider, reconcile dimensions,
    // backfill in the background
    let pipeline = EmbeddingPipeline::new(Arc::clone(&storage), shutdown_rx.clone());
    pipeline.initialize().await?;

    // Sync worker: durable queue + remote client when configured
    let queue = SyncQueue::load(scs::config::sync_queue_path()?);
    let client = SyncClient::from_config();
    if client.is_some() {
        info!("Remote sync configured");
    }
    let credentials = CredentialStore::open(scs::config::credentials_path()?);
    let sync = Arc::new(SyncWorker::new(queue, client, credentials));
    tokio::spawn(Arc::clone(&sync).run(shutdown_rx.clone()));

    let server = SaveContextServer::new(
        Arc::clone(&storage),
        pipeline,
        sync,
        CompactionConfig::from_env(),
    );

    // Optional dashboard API
    if let Some(port) = cli.http {
        let web_storage = Arc::clone(&storage);
        tokio::spawn(async move {
            if let Err(e) = scs::web::serve(web_storage, port).await {
                tracing::error!(error = %e, "Dashboard API failed");
            }
        });
    }

    serve_stdio(server)
        .await
        .map_err(|e| Error::Other(format!("server error: {e}")))?;

    let _ = shutdown_tx.send(true);
    Ok(0)
}
