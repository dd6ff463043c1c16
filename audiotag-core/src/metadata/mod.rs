//! Metadata cascade (spec.md §4.4): MusicBrainz → Spotify → iTunes.

mod itunes;
mod musicbrainz;
mod spotify;

pub use itunes::ItunesClient;
pub use musicbrainz::MusicBrainzClient;
pub use spotify::SpotifyClient;

use crate::cache::CacheBundle;
use crate::types::{CanonicalMetadata, FingerprintResult};
use audiotag_common::error::Result;
use once_cell::sync::Lazy;
use regex::Regex;

static DOWNLOAD_SITE_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b[a-z0-9-]+\.(com|net|org|info|biz|fm|tv)\b").unwrap()
});

static FILENAME_DOMAIN_PREFIX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^[a-z0-9-]+\.[a-z]{2,4}\s*-\s*").unwrap()
});

pub struct MetadataCascade {
    musicbrainz: MusicBrainzClient,
    spotify: Option<SpotifyClient>,
    itunes: ItunesClient,
}

impl MetadataCascade {
    pub fn new(spotify: Option<SpotifyClient>) -> Self {
        Self {
            musicbrainz: MusicBrainzClient::new(),
            spotify,
            itunes: ItunesClient::new(),
        }
    }

    /// Runs the full cascade. `embedded_title`/`embedded_artist` come from
    /// the file's existing tags; `file_stem` is the filename without
    /// extension, used as a last-resort search term source.
    pub async fn resolve(
        &self,
        fingerprints: &[FingerprintResult],
        embedded_title: Option<&str>,
        embedded_artist: Option<&str>,
        file_stem: &str,
        caches: &CacheBundle,
    ) -> Result<Option<CanonicalMetadata>> {
        let recording_ids: Vec<String> = fingerprints
            .iter()
            .flat_map(|r| r.recording_ids.clone())
            .collect();

        if !recording_ids.is_empty() {
            if let Some(found) = self.musicbrainz.resolve(&recording_ids, caches).await? {
                return Ok(Some(found));
            }
        }

        let (title, artist) = search_terms(embedded_title, embedded_artist, file_stem);
        if title.is_empty() {
            return Ok(None);
        }

        if let Some(spotify) = &self.spotify {
            if let Some(found) = spotify.search_track(&title, &artist).await? {
                return Ok(Some(found));
            }
        }

        if is_legitimate_search_term(&title) {
            if let Some(found) = self.itunes.search_track(&title, &artist).await? {
                return Ok(Some(found));
            }
        }

        Ok(None)
    }
}

/// Derives (title, artist) search terms: embedded tags when legitimate,
/// else the filename with a leading "domain.tld - " prefix stripped.
fn search_terms(
    embedded_title: Option<&str>,
    embedded_artist: Option<&str>,
    file_stem: &str,
) -> (String, String) {
    if let Some(title) = embedded_title {
        if is_legitimate_search_term(title) {
            return (title.to_string(), embedded_artist.unwrap_or_default().to_string());
        }
    }

    let cleaned = FILENAME_DOMAIN_PREFIX.replace(file_stem, "").into_owned();
    (cleaned, embedded_artist.unwrap_or_default().to_string())
}

/// spec.md §4.4: "legitimate" means ≥2 chars and not a download-site
/// domain pattern match.
fn is_legitimate_search_term(candidate: &str) -> bool {
    candidate.trim().chars().count() >= 2 && !DOWNLOAD_SITE_PATTERN.is_match(candidate)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_short_or_domain_like_titles() {
        assert!(!is_legitimate_search_term("a"));
        assert!(!is_legitimate_search_term("downloadsite.com - Track"));
        assert!(is_legitimate_search_term("Bohemian Rhapsody"));
    }

    #[test]
    fn strips_leading_domain_prefix_from_filename() {
        let (title, _) = search_terms(None, None, "musicsite.fm - Artist - Track Title");
        assert_eq!(title, "Artist - Track Title");
    }

    #[test]
    fn uses_embedded_title_when_legitimate() {
        let (title, artist) = search_terms(Some("Real Title"), Some("Real Artist"), "irrelevant.mp3");
        assert_eq!(title, "Real Title");
        assert_eq!(artist, "Real Artist");
    }

    /// No recording IDs and no usable search terms must short-circuit to
    /// `Ok(None)` without touching any of the three network clients —
    /// this is what drives the pipeline's `skipped("no metadata found")`
    /// branch (spec.md §4.4).
    #[tokio::test]
    async fn resolve_returns_none_without_recording_ids_or_search_terms() {
        let cascade = MetadataCascade::new(None);
        let caches = CacheBundle::in_memory();
        let result = cascade.resolve(&[], None, None, "", &caches).await.unwrap();
        assert!(result.is_none());
    }
}
