//! CLI front-end for the batch tagging engine.
//!
//! Stands in for the GUI collaborator described in spec.md §6: loads
//! persisted settings, walks the given paths for audio files, and drives a
//! [`BatchProcessor`] over them, printing progress to stderr and a final
//! JSON summary to stdout.

use audiotag_common::config::AppSettings;
use audiotag_common::logging::Logger;
use audiotag_core::orchestrator::BatchProcessor;
use audiotag_core::types::{AudioFormat, ProcessingStatus};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;
use walkdir::WalkDir;

#[derive(Parser, Debug)]
#[command(name = "audiotag", about = "Bulk audio fingerprinting, tagging, and renaming")]
struct Cli {
    /// Files or directories to process; directories are walked recursively.
    #[arg(required = true)]
    paths: Vec<PathBuf>,

    /// Use the persistent (SQLite) cache instead of settings.json's default.
    #[arg(long)]
    persistent_cache: bool,

    /// Clear all cached fingerprint/metadata/lyrics entries before running.
    #[arg(long)]
    clear_cache: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let subscriber = FmtSubscriber::builder().with_max_level(Level::INFO).finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let cli = Cli::parse();
    let mut settings = AppSettings::load().await?;
    if cli.persistent_cache {
        settings.use_persistent_cache = true;
    }

    let logger = Arc::new(Logger::new(audiotag_common::config::log_dir()));

    let files = collect_audio_files(&cli.paths);
    info!(count = files.len(), "discovered audio files");
    if files.is_empty() {
        println!("no audio files found under the given paths");
        return Ok(());
    }

    let processor = if settings.use_persistent_cache {
        BatchProcessor::new_persistent(settings).await?
    } else {
        BatchProcessor::new(settings)
    };

    if cli.clear_cache {
        processor.clear_cache().await?;
        info!("cache cleared");
    }

    let processor = Arc::new(processor);
    let on_progress = Arc::new(|snapshot: audiotag_core::types::ProgressSnapshot| {
        let eta = snapshot
            .estimated_time_remaining_seconds
            .map(|s| format!("{s}s"))
            .unwrap_or_else(|| "?".to_string());
        eprintln!(
            "[{}/{}] ok={} err={} skip={} eta={}",
            snapshot.processed_files,
            snapshot.total_files,
            snapshot.success_count,
            snapshot.error_count,
            snapshot.skipped_count,
            eta
        );
    });
    let on_file_complete = {
        let logger = logger.clone();
        Arc::new(move |result: &audiotag_core::types::ProcessingResult| {
            let logger = logger.clone();
            let file_path = result.original_path.to_string_lossy().into_owned();
            let status = result.status.clone();
            let failed_step = result.failed_step.clone();
            let error = result.error.clone();
            tokio::spawn(async move {
                let builder = Logger::builder().file_path(file_path);
                match status {
                    ProcessingStatus::Completed => {
                        logger.info(builder, "completed").await;
                    }
                    ProcessingStatus::Skipped => {
                        let reason = error.unwrap_or_else(|| "skipped".to_string());
                        logger.info(builder, reason).await;
                    }
                    ProcessingStatus::Error => {
                        let mut builder = builder;
                        if let Some(step) = failed_step {
                            builder = builder.step(step);
                        }
                        let message = error.unwrap_or_else(|| "unknown error".to_string());
                        logger.warn(builder, message).await;
                    }
                }
            });
        })
    };

    let results = processor.process(files, on_progress, on_file_complete).await;
    processor.close().await;

    let completed = results.iter().filter(|r| r.status == ProcessingStatus::Completed).count();
    let errored = results.iter().filter(|r| r.status == ProcessingStatus::Error).count();
    let skipped = results.iter().filter(|r| r.status == ProcessingStatus::Skipped).count();
    logger
        .info(
            Logger::builder(),
            format!("batch finished: completed={completed} errored={errored} skipped={skipped}"),
        )
        .await;
    println!("completed={completed} errored={errored} skipped={skipped}");

    Ok(())
}

/// Expands the CLI's path arguments into a flat, sorted list of audio
/// files: directories are walked recursively, individual files are taken
/// as-is regardless of extension (the reader step rejects unsupported
/// ones per file rather than silently skipping them here).
fn collect_audio_files(paths: &[PathBuf]) -> Vec<PathBuf> {
    let mut files = Vec::new();
    for path in paths {
        if path.is_dir() {
            for entry in WalkDir::new(path).into_iter().filter_map(|e| e.ok()) {
                if !entry.file_type().is_file() {
                    continue;
                }
                let is_audio = entry
                    .path()
                    .extension()
                    .and_then(|e| e.to_str())
                    .map(AudioFormat::from_extension)
                    .is_some_and(|f| f.is_some());
                if is_audio {
                    files.push(entry.into_path());
                }
            }
        } else {
            files.push(path.clone());
        }
    }
    files.sort();
    files
}
