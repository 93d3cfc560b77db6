//! `embeddings` subcommand: pipeline management.
//!
//! Exit codes follow the installer contract: 0 success, 1 error,
//! 2 user-cancelled.

use crate::cli::EmbeddingsAction;
use crate::config::{backup_path, resolve_db_path};
use crate::embeddings::types::{huggingface_models, model2vec_models, ollama_models};
use crate::embeddings::{
    create_provider_by_type, detect_available_providers, get_embedding_settings,
    reset_embedding_settings, save_embedding_settings, EmbeddingPipeline, EmbeddingProviderType,
    EmbeddingSettings,
};
use crate::error::{Error, Result};
use crate::storage::SqliteStorage;
use colored::Colorize;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::{watch, Mutex};

/// Exit code for user-cancelled operations.
pub const EXIT_CANCELLED: u8 = 2;

/// Run an embeddings action. Returns the process exit code.
///
/// # Errors
///
/// Returns an error for storage or configuration failures; cancellation
/// is a code, not an error.
pub async fn execute(action: EmbeddingsAction, db: Option<&PathBuf>) -> Result<u8> {
    match action {
        EmbeddingsAction::Status => status(db).await,
        EmbeddingsAction::Backfill => backfill(db).await,
        EmbeddingsAction::Providers => providers().await,
        EmbeddingsAction::Models => {
            models();
            Ok(0)
        }
        EmbeddingsAction::Reset { yes } => reset(db, yes),
        EmbeddingsAction::Config {
            provider,
            clear_provider,
            token,
            model,
            endpoint,
            reset,
            yes,
        } => {
            config(
                db,
                provider.as_deref(),
                clear_provider,
                token,
                model,
                endpoint,
                reset,
                yes,
            )
            .await
        }
    }
}

fn open_storage(db: Option<&PathBuf>) -> Result<SqliteStorage> {
    let path = resolve_db_path(db.map(PathBuf::as_path))?;
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    SqliteStorage::open(&path)
}

async fn status(db: Option<&PathBuf>) -> Result<u8> {
    let storage = open_storage(db)?;
    let stats = storage.vector_stats(None)?;
    let dimensions = storage.stored_vector_dim()?;

    println!("{}", "Embedding status".bold());
    println!("  embedded (ok): {}", stats.ok);
    println!("  pending:       {}", stats.pending);
    println!("  errored:       {}", stats.error);
    println!("  not embedded:  {}", stats.none);
    println!("  chunks stored: {}", stats.chunks);
    match dimensions {
        Some(d) => println!("  dimensions:    {d}"),
        None => println!("  dimensions:    (none recorded)"),
    }

    if let Ok(Some(settings)) = get_embedding_settings() {
        if let Some(provider) = settings.provider {
            println!("  provider:      {provider} (configured)");
        }
    }

    Ok(0)
}

async fn backfill(db: Option<&PathBuf>) -> Result<u8> {
    let storage = Arc::new(Mutex::new(open_storage(db)?));
    let (_tx, rx) = watch::channel(false);
    let pipeline = EmbeddingPipeline::new(Arc::clone(&storage), rx);

    pipeline.initialize().await?;

    if pipeline.provider().read().await.is_none() {
        eprintln!("{}", "No embedding provider available.".yellow());
        eprintln!("Install Ollama with an embedding model, or run `sc-server embeddings config`.");
        return Ok(1);
    }

    // Run the backfill to completion in the foreground
    pipeline.backfill().await;

    let stats = storage.lock().await.vector_stats(None)?;
    println!(
        "Backfill complete: {} embedded, {} errored, {} remaining",
        stats.ok, stats.error, stats.none
    );
    Ok(0)
}

async fn providers() -> Result<u8> {
    println!("Detecting providers...");
    let detection = detect_available_providers().await;

    if detection.available.is_empty() {
        println!("{}", "No providers reachable.".yellow());
        println!("  ollama:      install from https://ollama.com, then `ollama pull nomic-embed-text`");
        println!("  huggingface: set HF_TOKEN");
        println!("  model2vec:   bundled; downloads its model on first use");
        return Ok(0);
    }

    for name in &detection.available {
        let marker = if Some(name) == detection.recommended.as_ref() {
            " (recommended)"
        } else {
            ""
        };
        println!("  {} {name}{marker}", "✓".green());
    }
    Ok(0)
}

fn models() {
    println!("{}", "ollama".bold());
    for config in [
        ollama_models::nomic_embed_text(),
        ollama_models::mxbai_embed_large(),
        ollama_models::all_minilm(),
    ] {
        println!("  {} ({}d, {} chars)", config.name, config.dimensions, config.max_chars);
    }

    println!("{}", "huggingface".bold());
    for config in [
        huggingface_models::all_minilm_l6_v2(),
        huggingface_models::all_mpnet_base_v2(),
    ] {
        println!("  {} ({}d, {} chars)", config.name, config.dimensions, config.max_chars);
    }

    println!("{}", "model2vec".bold());
    for config in [model2vec_models::potion_base_8m(), model2vec_models::potion_base_32m()] {
        println!("  {} ({}d, {} chars)", config.name, config.dimensions, config.max_chars);
    }
}

fn reset(db: Option<&PathBuf>, yes: bool) -> Result<u8> {
    let storage = open_storage(db)?;
    let stats = storage.vector_stats(None)?;

    if stats.chunks == 0 {
        println!("No embeddings stored; nothing to reset.");
        return Ok(0);
    }

    if !yes && !confirm(&format!("Delete {} stored chunk(s)?", stats.chunks))? {
        println!("Cancelled.");
        return Ok(EXIT_CANCELLED);
    }

    storage.conn().execute("DELETE FROM embedding_chunks", [])?;
    storage.conn().execute(
        "UPDATE context_items SET embedding_status = 'none', embedding_provider = NULL,
             embedding_model = NULL, chunk_count = 0, embedded_at = NULL",
        [],
    )?;

    println!("Embeddings cleared; items will backfill on next server start.");
    Ok(0)
}

#[allow(clippy::too_many_arguments, clippy::fn_params_excessive_bools)]
async fn config(
    db: Option<&PathBuf>,
    provider: Option<&str>,
    clear_provider: bool,
    token: Option<String>,
    model: Option<String>,
    endpoint: Option<String>,
    reset: bool,
    yes: bool,
) -> Result<u8> {
    if reset {
        reset_embedding_settings()?;
        println!("Embedding settings removed; auto-detection is back in effect.");
        return Ok(0);
    }

    // No arguments: show the current settings
    if provider.is_none() && !clear_provider && token.is_none() && model.is_none() && endpoint.is_none()
    {
        match get_embedding_settings()? {
            Some(settings) => println!("{}", serde_json::to_string_pretty(&settings)?),
            None => println!("No embedding settings configured (auto-detect)."),
        }
        return Ok(0);
    }

    let new_provider: Option<EmbeddingProviderType> = match provider {
        Some(raw) => Some(
            raw.parse()
                .map_err(|e: String| Error::InvalidArgument(e))?,
        ),
        None => None,
    };

    // A provider change with stored embeddings drops the vector table;
    // confirm and take a database backup first.
    if let Some(new_provider) = new_provider {
        let storage = open_storage(db)?;
        let stats = storage.vector_stats(None)?;

        let boxed = create_provider_by_type(new_provider).await.ok_or_else(|| {
            Error::Embedding(format!("provider '{new_provider}' is not reachable"))
        })?;
        let info = boxed.info();

        let dim_changes = storage
            .stored_vector_dim()?
            .is_some_and(|current| current != info.dimensions);

        if stats.chunks > 0 && dim_changes {
            println!(
                "Switching to {} ({}d) drops {} stored chunk(s); every item re-embeds on next start.",
                info.name, info.dimensions, stats.chunks
            );
            if !yes && !confirm("Continue?")? {
                println!("Cancelled.");
                return Ok(EXIT_CANCELLED);
            }

            let backup = backup_path()?;
            storage.backup_to(&backup)?;
            println!("{} {}", "backup".green(), backup.display());

            let mut storage = storage;
            storage.ensure_vector_dim(info.dimensions, &info.name)?;
        }
    }

    let settings = EmbeddingSettings {
        enabled: None,
        provider: if clear_provider { None } else { new_provider },
        hf_token: token,
        hf_model: match new_provider {
            Some(EmbeddingProviderType::Huggingface) => model.clone(),
            _ => None,
        },
        hf_endpoint: match new_provider {
            Some(EmbeddingProviderType::Huggingface) => endpoint.clone(),
            _ => None,
        },
        ollama_endpoint: match new_provider {
            Some(EmbeddingProviderType::Ollama) | None => endpoint,
            _ => None,
        },
        ollama_model: match new_provider {
            Some(EmbeddingProviderType::Ollama) | None => model.clone(),
            _ => None,
        },
        model2vec_model: match new_provider {
            Some(EmbeddingProviderType::Model2vec) => model,
            _ => None,
        },
    };

    if clear_provider {
        // Merge-friendly clear: rewrite the whole settings block
        let mut current = get_embedding_settings()?.unwrap_or_default();
        current.provider = None;
        reset_embedding_settings()?;
        save_embedding_settings(&current)?;
    } else {
        save_embedding_settings(&settings)?;
    }

    println!("Embedding settings saved.");
    Ok(0)
}

/// Ask a yes/no question on the terminal.
fn confirm(question: &str) -> Result<bool> {
    print!("{question} [y/N] ");
    std::io::stdout().flush()?;

    let mut answer = String::new();
    std::io::stdin().read_line(&mut answer)?;
    let answer = answer.trim().to_lowercase();
    Ok(answer == "y" || answer == "yes")
}
