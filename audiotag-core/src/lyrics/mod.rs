//! Lyrics cascade (spec.md §4.6): LRCLIB → ChartLyrics → Genius, with a
//! shared text-cleanup pipeline and cache integration.

mod chartlyrics;
mod genius;
mod lrclib;

pub use chartlyrics::ChartLyricsClient;
pub use genius::GeniusClient;
pub use lrclib::LrclibClient;

use crate::cache::{lyrics_key, Cache, CacheBundle};
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::warn;

static URL_PATTERN: Lazy<Regex> = Lazy::new(|| Regex::new(r"https?://\S+").unwrap());
static COPYRIGHT_LINE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^.*(copyright|\(c\)|all rights reserved).*$").unwrap());
static PROVIDED_BY_LINE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)^.*lyrics provided by.*$").unwrap());
static ADVERTISEMENT_LINE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)^.*advertisement.*$").unwrap());
static SEPARATOR_LINE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[-=*_]{3,}$").unwrap());
static MULTI_BLANK_LINES: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n{3,}").unwrap());

pub struct LyricsCascade {
    lrclib: LrclibClient,
    chartlyrics: ChartLyricsClient,
    genius: Option<GeniusClient>,
}

impl LyricsCascade {
    pub fn new(genius: Option<GeniusClient>) -> Self {
        Self {
            lrclib: LrclibClient::new(),
            chartlyrics: ChartLyricsClient::new(),
            genius,
        }
    }

    /// Only called when `fetch_lyrics` is enabled and both fields are
    /// non-empty after trim; lyric fetching never fails the file, so
    /// every error is logged and swallowed into `None`.
    pub async fn resolve(&self, artist: &str, title: &str, caches: &CacheBundle) -> Option<String> {
        let artist = artist.trim();
        let title = title.trim();
        if artist.is_empty() || title.is_empty() {
            return None;
        }

        let key = lyrics_key(artist, title);
        match caches.lyrics.get(&key).await {
            Ok(Some(cached)) => return cached,
            Ok(None) => {}
            Err(e) => warn!(error = %e, "lyrics cache lookup failed"),
        }

        let result = self.fetch_uncached(artist, title).await;

        if let Err(e) = caches.lyrics.put(&key, result.clone()).await {
            warn!(error = %e, "failed to persist lyrics cache entry");
        }
        result
    }

    async fn fetch_uncached(&self, artist: &str, title: &str) -> Option<String> {
        if let Some(raw) = self.lrclib.exact(artist, title).await {
            return clean(&raw);
        }
        if let Some(raw) = self.lrclib.search(artist, title).await {
            return clean(&raw);
        }
        if let Some(raw) = self.chartlyrics.search(artist, title).await {
            return clean(&raw);
        }
        if let Some(genius) = &self.genius {
            match genius.search(artist, title).await {
                Ok(Some(raw)) => return clean(&raw),
                Ok(None) => {}
                Err(e) => warn!(error = %e, "genius lyrics lookup failed"),
            }
        }
        None
    }
}

/// Cleanup pipeline (spec.md §4.6): idempotent by construction — every
/// step either removes matter or normalises it to its own fixed point.
pub fn clean(raw: &str) -> Option<String> {
    let normalized = raw.replace("\r\n", "\n").replace('\r', "\n");

    let filtered: Vec<&str> = normalized
        .lines()
        .filter(|line| {
            !URL_PATTERN.is_match(line)
                && !COPYRIGHT_LINE.is_match(line)
                && !PROVIDED_BY_LINE.is_match(line)
                && !ADVERTISEMENT_LINE.is_match(line)
                && !SEPARATOR_LINE.is_match(line.trim())
        })
        .collect();

    let rejoined = filtered.join("\n");
    let collapsed = MULTI_BLANK_LINES.replace_all(&rejoined, "\n\n");

    let trimmed: String = collapsed
        .lines()
        .map(|l| l.trim_end())
        .collect::<Vec<_>>()
        .join("\n");
    let result = trimmed.trim().to_string();

    if result.is_empty() {
        None
    } else {
        Some(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_urls_and_credit_lines() {
        let raw = "Verse one\nhttps://example.com/lyrics\nLyrics provided by LyricFind\nVerse two";
        let cleaned = clean(raw).unwrap();
        assert!(!cleaned.contains("http"));
        assert!(!cleaned.to_lowercase().contains("provided by"));
        assert!(cleaned.contains("Verse one"));
        assert!(cleaned.contains("Verse two"));
    }

    #[test]
    fn collapses_multiple_blank_lines() {
        let raw = "Verse one\n\n\n\nVerse two";
        assert_eq!(clean(raw).unwrap(), "Verse one\n\nVerse two");
    }

    #[test]
    fn cleanup_is_idempotent() {
        let raw = "Copyright 2020 Someone\nVerse\n\n\n\nMore\nhttp://ads.example/x\n---\n";
        let once = clean(raw).unwrap();
        let twice = clean(&once).unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn all_filtered_content_yields_none() {
        let raw = "https://example.com\nCopyright 2020\n---";
        assert_eq!(clean(raw), None);
    }
}
