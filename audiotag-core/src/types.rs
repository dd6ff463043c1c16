//! Core data model (spec.md §3).

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AudioFormat {
    Mp3,
    Flac,
    M4a,
    Wav,
    Ogg,
    Wma,
}

impl AudioFormat {
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "mp3" => Some(Self::Mp3),
            "flac" => Some(Self::Flac),
            "m4a" => Some(Self::M4a),
            "wav" => Some(Self::Wav),
            "ogg" => Some(Self::Ogg),
            "wma" => Some(Self::Wma),
            _ => None,
        }
    }
}

/// What was read from the file on disk. Immutable once produced.
#[derive(Debug, Clone)]
pub struct AudioFileMetadata {
    pub file_path: PathBuf,
    pub format: AudioFormat,
    pub file_size: u64,
    pub duration: f64,
    pub title: Option<String>,
    pub artist: Option<String>,
    pub album: Option<String>,
    pub year: Option<u32>,
    pub genre: Vec<String>,
    pub track_number: Option<u32>,
    pub disc_number: Option<u32>,
    pub album_artist: Option<String>,
    pub lyrics: Option<String>,
}

/// A single AcoustID match. A fingerprint lookup produces an ordered list
/// of these, sorted by `score` descending (ties keep original API order).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FingerprintResult {
    pub recording_ids: Vec<String>,
    pub score: f64,
}

/// Post-resolution, source-agnostic metadata record consumed by the tag writer.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CanonicalMetadata {
    pub recording_id: String,
    pub release_id: Option<String>,
    pub title: String,
    pub artist: String,
    pub featured_artists: Vec<String>,
    pub album: Option<String>,
    pub year: Option<u32>,
    pub genres: Vec<String>,
    /// Artwork URL captured by the metadata cascade (iTunes/Spotify), fed
    /// into the album-art cascade's last-resort generic-URL step.
    pub artwork_url: Option<String>,
}

#[derive(Debug, Clone)]
pub struct AlbumArt {
    pub bytes: Vec<u8>,
    pub mime_type: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessingStatus {
    Completed,
    Skipped,
    Error,
}

#[derive(Debug, Clone)]
pub struct ProcessingResult {
    pub original_path: PathBuf,
    pub new_path: Option<PathBuf>,
    pub status: ProcessingStatus,
    pub error: Option<String>,
    pub failed_step: Option<String>,
    pub original_metadata: Option<AudioFileMetadata>,
    pub corrected_metadata: Option<CanonicalMetadata>,
}

impl ProcessingResult {
    pub fn completed(
        original_path: PathBuf,
        new_path: Option<PathBuf>,
        original_metadata: AudioFileMetadata,
        corrected_metadata: CanonicalMetadata,
    ) -> Self {
        Self {
            original_path,
            new_path,
            status: ProcessingStatus::Completed,
            error: None,
            failed_step: None,
            original_metadata: Some(original_metadata),
            corrected_metadata: Some(corrected_metadata),
        }
    }

    pub fn skipped(original_path: PathBuf, reason: impl Into<String>) -> Self {
        Self {
            original_path,
            new_path: None,
            status: ProcessingStatus::Skipped,
            error: Some(reason.into()),
            failed_step: None,
            original_metadata: None,
            corrected_metadata: None,
        }
    }

    pub fn error(original_path: PathBuf, failed_step: &str, message: impl Into<String>) -> Self {
        Self {
            original_path,
            new_path: None,
            status: ProcessingStatus::Error,
            error: Some(message.into()),
            failed_step: Some(failed_step.to_string()),
            original_metadata: None,
            corrected_metadata: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// spec.md §3 invariant: `status = error` ⇒ `failedStep` and `error`
    /// both set, no rename happened.
    #[test]
    fn error_result_always_carries_failed_step() {
        let result = ProcessingResult::error(PathBuf::from("a.mp3"), "fetching_metadata", "boom");
        assert_eq!(result.status, ProcessingStatus::Error);
        assert_eq!(result.failed_step.as_deref(), Some("fetching_metadata"));
        assert!(result.error.is_some());
        assert!(result.new_path.is_none());
    }

    /// spec.md §3 invariant: `status = skipped` never carries a `failedStep`.
    #[test]
    fn skipped_result_never_carries_failed_step() {
        let result = ProcessingResult::skipped(PathBuf::from("a.mp3"), "no metadata found");
        assert_eq!(result.status, ProcessingStatus::Skipped);
        assert!(result.failed_step.is_none());
        assert_eq!(result.error.as_deref(), Some("no metadata found"));
    }

    /// spec.md §3 invariant: `status = completed` ⇒ `failedStep = ∅`.
    #[test]
    fn completed_result_never_carries_failed_step_or_error() {
        let original = AudioFileMetadata {
            file_path: PathBuf::from("a.mp3"),
            format: AudioFormat::Mp3,
            file_size: 100,
            duration: 180.0,
            title: None,
            artist: None,
            album: None,
            year: None,
            genre: Vec::new(),
            track_number: None,
            disc_number: None,
            album_artist: None,
            lyrics: None,
        };
        let corrected = CanonicalMetadata::default();
        let result = ProcessingResult::completed(PathBuf::from("a.mp3"), None, original, corrected);
        assert_eq!(result.status, ProcessingStatus::Completed);
        assert!(result.failed_step.is_none());
        assert!(result.error.is_none());
    }
}

#[derive(Debug, Clone, Default)]
pub struct ProgressSnapshot {
    pub total_files: usize,
    pub processed_files: usize,
    pub success_count: usize,
    pub error_count: usize,
    pub skipped_count: usize,
    pub current_file: Option<PathBuf>,
    pub estimated_time_remaining_seconds: Option<u64>,
}
