//! Batch Processor (spec.md §4.7): owns the worker pool, the shared
//! limiters/caches, and the progress/cancellation surface exposed to the
//! GUI collaborator.

use crate::art::ArtCascade;
use crate::cache::{CacheBundle, CacheStats};
use crate::fingerprint::FingerprintEngine;
use crate::lyrics::{GeniusClient, LyricsCascade};
use crate::metadata::{MetadataCascade, SpotifyClient};
use crate::pipeline::{self, PipelineDeps};
use crate::tagwriter::{LoftyTagWriter, TagWriter};
use crate::types::{ProcessingResult, ProcessingStatus, ProgressSnapshot};
use audiotag_common::config::AppSettings;
use audiotag_common::error::Result;
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::info;

pub type ProgressCallback = Arc<dyn Fn(ProgressSnapshot) + Send + Sync>;
pub type FileCompleteCallback = Arc<dyn Fn(&ProcessingResult) + Send + Sync>;

#[derive(Default)]
struct Counters {
    processed: AtomicUsize,
    success: AtomicUsize,
    error: AtomicUsize,
    skipped: AtomicUsize,
}

struct BatchState {
    total_files: usize,
    start: Instant,
    next_index: AtomicUsize,
    current_files: Mutex<HashSet<PathBuf>>,
    counters: Counters,
    cancel: CancellationToken,
}

/// Constructed once per run; `cancel()` can be called from any task that
/// holds a reference while `process()` is still in flight (spec.md §4.7's
/// cooperative cancellation: the flag is observed only at worker-loop
/// boundaries, so the in-flight file is always allowed to finish).
pub struct BatchProcessor {
    deps: Arc<PipelineDeps>,
    concurrency: usize,
    cancel: Mutex<CancellationToken>,
}

impl BatchProcessor {
    /// Synchronous constructor for the in-memory cache backend. Use
    /// [`new_persistent`](Self::new_persistent) when
    /// `settings.use_persistent_cache` is true.
    pub fn new(settings: AppSettings) -> Self {
        Self::with_caches(settings, CacheBundle::in_memory())
    }

    pub async fn new_persistent(settings: AppSettings) -> Result<Self> {
        let caches = if settings.use_persistent_cache {
            CacheBundle::persistent(&audiotag_common::config::cache_db_path()).await?
        } else {
            CacheBundle::in_memory()
        };
        Ok(Self::with_caches(settings, caches))
    }

    fn with_caches(settings: AppSettings, caches: CacheBundle) -> Self {
        let concurrency = settings.concurrency.clamp(1, 10) as usize;
        let use_persistent = settings.use_persistent_cache;

        let spotify = if settings.use_spotify {
            match (&settings.spotify_client_id, &settings.spotify_client_secret) {
                (Some(id), Some(secret)) => Some(SpotifyClient::new(id.clone(), secret.clone())),
                _ => None,
            }
        } else {
            None
        };
        let genius = if settings.use_genius {
            settings.genius_access_token.clone().map(GeniusClient::new)
        } else {
            None
        };

        let deps = PipelineDeps {
            fingerprint_engine: FingerprintEngine::new(settings.acoustid_api_key.clone(), use_persistent),
            metadata_cascade: MetadataCascade::new(spotify),
            art_cascade: ArtCascade::new(),
            lyrics_cascade: LyricsCascade::new(genius),
            tag_writer: Arc::new(LoftyTagWriter) as Arc<dyn TagWriter>,
            caches,
            settings,
        };

        Self {
            deps: Arc::new(deps),
            concurrency,
            cancel: Mutex::new(CancellationToken::new()),
        }
    }

    pub async fn cache_stats(&self) -> Result<CacheStats> {
        self.deps.caches.stats().await
    }

    pub async fn clear_cache(&self) -> Result<()> {
        self.deps.caches.clear_all().await
    }

    pub async fn close(&self) {
        self.deps.caches.close().await
    }

    /// Requests cancellation of whichever `process()` call is currently
    /// in flight. A no-op if none is running.
    pub fn cancel(&self) {
        self.cancel.lock().unwrap().cancel();
    }

    /// Runs the batch: spawns `min(concurrency, paths.len())` workers,
    /// each pulling the next unclaimed index until none remain or
    /// cancellation is observed. Results preserve input order regardless
    /// of completion order.
    pub async fn process(
        &self,
        paths: Vec<PathBuf>,
        on_progress: ProgressCallback,
        on_file_complete: FileCompleteCallback,
    ) -> Vec<ProcessingResult> {
        let total_files = paths.len();
        let fresh_token = CancellationToken::new();
        *self.cancel.lock().unwrap() = fresh_token.clone();

        let state = Arc::new(BatchState {
            total_files,
            start: Instant::now(),
            next_index: AtomicUsize::new(0),
            current_files: Mutex::new(HashSet::new()),
            counters: Counters::default(),
            cancel: fresh_token,
        });

        let paths = Arc::new(paths);
        let results: Arc<Mutex<Vec<Option<ProcessingResult>>>> =
            Arc::new(Mutex::new((0..total_files).map(|_| None).collect()));

        emit_progress(&state, &on_progress, None);

        let worker_count = self.concurrency.min(total_files.max(1));
        let mut handles = Vec::with_capacity(worker_count);
        for _ in 0..worker_count {
            let deps = self.deps.clone();
            let state = state.clone();
            let paths = paths.clone();
            let results = results.clone();
            let on_progress = on_progress.clone();
            let on_file_complete = on_file_complete.clone();

            handles.push(tokio::spawn(async move {
                loop {
                    if state.cancel.is_cancelled() {
                        break;
                    }
                    let index = state.next_index.fetch_add(1, Ordering::SeqCst);
                    if index >= paths.len() {
                        break;
                    }
                    let path = paths[index].clone();

                    state.current_files.lock().unwrap().insert(path.clone());
                    emit_progress(&state, &on_progress, Some(path.clone()));

                    let result = pipeline::run(&path, &deps, |_stage| {}).await;

                    match result.status {
                        ProcessingStatus::Completed => {
                            state.counters.success.fetch_add(1, Ordering::SeqCst);
                        }
                        ProcessingStatus::Skipped => {
                            state.counters.skipped.fetch_add(1, Ordering::SeqCst);
                        }
                        ProcessingStatus::Error => {
                            state.counters.error.fetch_add(1, Ordering::SeqCst);
                        }
                    }
                    state.counters.processed.fetch_add(1, Ordering::SeqCst);

                    on_file_complete(&result);
                    results.lock().unwrap()[index] = Some(result);

                    state.current_files.lock().unwrap().remove(&path);
                    emit_progress(&state, &on_progress, None);
                }
            }));
        }

        for handle in handles {
            let _ = handle.await;
        }

        let final_results = synthesize_results(results.lock().unwrap().drain(..).collect(), &paths);

        emit_progress(&state, &on_progress, None);
        info!(total = total_files, "batch processing finished");
        final_results
    }
}

/// Fills any index a worker never reached (cancelled mid-batch) with a
/// synthesised `skipped("Processing cancelled")` entry, preserving input
/// order (spec.md §4.7, §8 "Cancellation quiescence").
fn synthesize_results(slots: Vec<Option<ProcessingResult>>, paths: &[PathBuf]) -> Vec<ProcessingResult> {
    slots
        .into_iter()
        .enumerate()
        .map(|(i, maybe)| {
            maybe.unwrap_or_else(|| ProcessingResult::skipped(paths[i].clone(), "Processing cancelled"))
        })
        .collect()
}

fn emit_progress(state: &BatchState, on_progress: &ProgressCallback, current_file: Option<PathBuf>) {
    let processed = state.counters.processed.load(Ordering::SeqCst);
    let success = state.counters.success.load(Ordering::SeqCst);
    let error = state.counters.error.load(Ordering::SeqCst);
    let skipped = state.counters.skipped.load(Ordering::SeqCst);

    let eta = if processed == 0 {
        None
    } else {
        let elapsed = state.start.elapsed().as_secs_f64();
        let remaining = state.total_files.saturating_sub(processed);
        Some((elapsed / processed as f64 * remaining as f64).round() as u64)
    };

    on_progress(ProgressSnapshot {
        total_files: state.total_files,
        processed_files: processed,
        success_count: success,
        error_count: error,
        skipped_count: skipped,
        current_file,
        estimated_time_remaining_seconds: eta,
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex as StdMutex;

    #[test]
    fn eta_is_null_before_any_file_processed() {
        let state = BatchState {
            total_files: 10,
            start: Instant::now(),
            next_index: AtomicUsize::new(0),
            current_files: Mutex::new(HashSet::new()),
            counters: Counters::default(),
            cancel: CancellationToken::new(),
        };
        let captured: Arc<StdMutex<Option<Option<u64>>>> = Arc::new(StdMutex::new(None));
        let sink = captured.clone();
        let callback: ProgressCallback = Arc::new(move |snapshot: ProgressSnapshot| {
            *sink.lock().unwrap() = Some(snapshot.estimated_time_remaining_seconds);
        });
        emit_progress(&state, &callback, None);
        assert_eq!(captured.lock().unwrap().unwrap(), None);
    }

    /// spec.md §8 "Order preservation": `process(paths)[i].originalPath == paths[i]`,
    /// even when a worker finished file 2 before file 0.
    #[test]
    fn synthesize_results_preserves_input_order_despite_out_of_order_completion() {
        let paths = vec![PathBuf::from("a.mp3"), PathBuf::from("b.mp3"), PathBuf::from("c.mp3")];
        let slots = vec![
            None,
            Some(ProcessingResult::skipped(paths[1].clone(), "no metadata found")),
            Some(ProcessingResult::error(paths[2].clone(), "writing_tags", "disk full")),
        ];
        let results = synthesize_results(slots, &paths);
        assert_eq!(results.len(), 3);
        for (result, path) in results.iter().zip(&paths) {
            assert_eq!(&result.original_path, path);
        }
        assert_eq!(results[2].status, ProcessingStatus::Error);
    }

    /// spec.md §8 "Cancellation quiescence": indices no worker claimed
    /// materialise as `skipped("Processing cancelled")`.
    #[test]
    fn synthesize_results_fills_unclaimed_indices_as_cancelled() {
        let paths = vec![PathBuf::from("a.mp3"), PathBuf::from("b.mp3")];
        let slots = vec![Some(ProcessingResult::completed(
            paths[0].clone(),
            None,
            crate::types::AudioFileMetadata {
                file_path: paths[0].clone(),
                format: crate::types::AudioFormat::Mp3,
                file_size: 10,
                duration: 1.0,
                title: None,
                artist: None,
                album: None,
                year: None,
                genre: Vec::new(),
                track_number: None,
                disc_number: None,
                album_artist: None,
                lyrics: None,
            },
            crate::types::CanonicalMetadata::default(),
        )), None];

        let results = synthesize_results(slots, &paths);
        assert_eq!(results[0].status, ProcessingStatus::Completed);
        assert_eq!(results[1].status, ProcessingStatus::Skipped);
        assert_eq!(results[1].error.as_deref(), Some("Processing cancelled"));
        assert!(results[1].failed_step.is_none());
    }

    /// `BatchProcessor::cancel()` must mutate the same token the in-flight
    /// `process()` call observes, not a disconnected one.
    #[test]
    fn cancel_sets_the_token_stored_on_the_processor() {
        let cancel = Mutex::new(CancellationToken::new());
        {
            let guard = cancel.lock().unwrap();
            assert!(!guard.is_cancelled());
        }
        cancel.lock().unwrap().cancel();
        assert!(cancel.lock().unwrap().is_cancelled());
    }
}
