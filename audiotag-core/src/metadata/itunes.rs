//! iTunes Search API lookup (spec.md §4.4 step 3), the fallback with no
//! credential requirement.

use crate::limiter::IntervalLimiter;
use crate::types::CanonicalMetadata;
use audiotag_common::error::{Error, Result};
use serde::Deserialize;

const SEARCH_URL: &str = "https://itunes.apple.com/search";

#[derive(Debug, Deserialize)]
struct SearchResponse {
    results: Vec<ResultJson>,
}

#[derive(Debug, Deserialize)]
struct ResultJson {
    #[serde(rename = "trackName")]
    track_name: Option<String>,
    #[serde(rename = "artistName")]
    artist_name: Option<String>,
    #[serde(rename = "collectionName")]
    collection_name: Option<String>,
    #[serde(rename = "releaseDate")]
    release_date: Option<String>,
    #[serde(rename = "artworkUrl100")]
    artwork_url_100: Option<String>,
    #[serde(rename = "primaryGenreName")]
    primary_genre_name: Option<String>,
}

pub struct ItunesClient {
    http: reqwest::Client,
    limiter: IntervalLimiter,
}

impl ItunesClient {
    pub fn new() -> Self {
        Self {
            http: reqwest::Client::builder()
                .timeout(std::time::Duration::from_secs(15))
                .build()
                .expect("reqwest client builds"),
            // spec.md §4.1: 1500-3000ms interval; split the difference.
            limiter: IntervalLimiter::from_millis(2_000),
        }
    }

    pub async fn search_track(&self, title: &str, artist: &str) -> Result<Option<CanonicalMetadata>> {
        self.limiter.acquire().await?;

        let term = format!("{artist} {title}");
        let response = self
            .http
            .get(SEARCH_URL)
            .query(&[("term", term.as_str()), ("media", "music"), ("entity", "song"), ("limit", "5")])
            .send()
            .await
            .map_err(|e| Error::Api { service: "iTunes", status: None, message: e.to_string() })?;

        if !response.status().is_success() {
            return Err(Error::Api {
                service: "iTunes",
                status: Some(response.status().as_u16()),
                message: "search failed".to_string(),
            });
        }

        let body: SearchResponse = response.json().await.map_err(|e| Error::Api {
            service: "iTunes",
            status: None,
            message: format!("invalid search response: {e}"),
        })?;

        Ok(pick_best(body.results, title).map(map_result))
    }
}

impl Default for ItunesClient {
    fn default() -> Self {
        Self::new()
    }
}

/// Prefers an exact case-insensitive title match among the first 5 hits;
/// otherwise falls back to the first hit (spec.md §4.4 step 3).
fn pick_best(results: Vec<ResultJson>, wanted_title: &str) -> Option<ResultJson> {
    let wanted = wanted_title.to_lowercase();
    let mut iter = results.into_iter();
    let first = iter.next()?;

    if first
        .track_name
        .as_deref()
        .map(|t| t.to_lowercase() == wanted)
        .unwrap_or(false)
    {
        return Some(first);
    }

    let mut remaining = Vec::with_capacity(4);
    remaining.push(first);
    remaining.extend(iter.take(4));

    remaining
        .iter()
        .position(|r| r.track_name.as_deref().map(|t| t.to_lowercase() == wanted).unwrap_or(false))
        .map(|i| remaining.swap_remove(i))
        .or_else(|| remaining.into_iter().next())
}

fn map_result(result: ResultJson) -> CanonicalMetadata {
    let year = result
        .release_date
        .as_deref()
        .and_then(audiotag_common::time::year_from_date_str);

    CanonicalMetadata {
        recording_id: String::new(),
        release_id: None,
        title: result.track_name.unwrap_or_default(),
        artist: result.artist_name.unwrap_or_default(),
        featured_artists: Vec::new(),
        album: result.collection_name,
        year,
        genres: result.primary_genre_name.into_iter().collect(),
        artwork_url: result.artwork_url_100.map(|url| upscale_artwork(&url)),
    }
}

/// iTunes artwork URLs embed a resolution segment like `100x100bb.jpg`;
/// rewriting it is how every client gets full-size covers.
fn upscale_artwork(url: &str) -> String {
    url.replace("100x100bb", "600x600bb")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(track_name: &str) -> ResultJson {
        ResultJson {
            track_name: Some(track_name.to_string()),
            artist_name: Some("Artist".to_string()),
            collection_name: Some("Album".to_string()),
            release_date: Some("2020-01-01T00:00:00Z".to_string()),
            artwork_url_100: Some("https://example/100x100bb.jpg".to_string()),
            primary_genre_name: Some("Pop".to_string()),
        }
    }

    #[test]
    fn prefers_exact_case_insensitive_match_over_first_hit() {
        let results = vec![result("Different Song"), result("exact title"), result("Another")];
        let picked = pick_best(results, "Exact Title").unwrap();
        assert_eq!(picked.track_name.as_deref(), Some("exact title"));
    }

    #[test]
    fn falls_back_to_first_hit_when_no_exact_match() {
        let results = vec![result("Something Else"), result("Other")];
        let picked = pick_best(results, "Nonexistent").unwrap();
        assert_eq!(picked.track_name.as_deref(), Some("Something Else"));
    }

    #[test]
    fn upscales_100x100_artwork_url() {
        assert_eq!(
            upscale_artwork("https://example/100x100bb.jpg"),
            "https://example/600x600bb.jpg"
        );
    }
}
