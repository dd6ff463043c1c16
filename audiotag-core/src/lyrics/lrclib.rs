//! LRCLIB client (spec.md §4.6 steps 1-2).

use serde::Deserialize;
use std::time::Duration;

const BASE_URL: &str = "https://lrclib.net/api";

#[derive(Debug, Deserialize)]
struct GetResponse {
    #[serde(rename = "plainLyrics")]
    plain_lyrics: Option<String>,
    instrumental: Option<bool>,
}

#[derive(Debug, Deserialize)]
struct SearchHit {
    #[serde(rename = "trackName")]
    track_name: Option<String>,
    #[serde(rename = "artistName")]
    artist_name: Option<String>,
    #[serde(rename = "plainLyrics")]
    plain_lyrics: Option<String>,
    instrumental: Option<bool>,
}

pub struct LrclibClient {
    http: reqwest::Client,
}

impl LrclibClient {
    pub fn new() -> Self {
        Self {
            http: reqwest::Client::builder()
                .timeout(Duration::from_secs(15))
                .build()
                .expect("reqwest client builds"),
        }
    }

    /// Step 1: exact lookup. 404 means no entry, not an error.
    pub async fn exact(&self, artist: &str, title: &str) -> Option<String> {
        let response = self
            .http
            .get(format!("{BASE_URL}/get"))
            .query(&[("artist_name", artist), ("track_name", title)])
            .send()
            .await
            .ok()?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return None;
        }
        if !response.status().is_success() {
            return None;
        }
        let body: GetResponse = response.json().await.ok()?;
        if body.instrumental.unwrap_or(false) {
            return None;
        }
        body.plain_lyrics
    }

    /// Step 2: fuzzy search fallback.
    pub async fn search(&self, artist: &str, title: &str) -> Option<String> {
        let query = format!("{artist} {title}");
        let response = self
            .http
            .get(format!("{BASE_URL}/search"))
            .query(&[("q", query.as_str())])
            .send()
            .await
            .ok()?;
        if !response.status().is_success() {
            return None;
        }
        let hits: Vec<SearchHit> = response.json().await.ok()?;

        let artist_lower = artist.to_lowercase();
        let title_lower = title.to_lowercase();

        let valid: Vec<SearchHit> = hits
            .into_iter()
            .filter(|h| {
                !h.instrumental.unwrap_or(false)
                    && h.plain_lyrics.as_deref().is_some_and(|l| !l.is_empty())
            })
            .collect();

        let preferred_index = valid.iter().position(|h| {
            h.artist_name.as_deref().map(|a| a.to_lowercase().contains(&artist_lower)).unwrap_or(false)
                && h.track_name.as_deref().map(|t| t.to_lowercase().contains(&title_lower)).unwrap_or(false)
        });

        let chosen = match preferred_index {
            Some(i) => valid.into_iter().nth(i),
            None => valid.into_iter().next(),
        };
        chosen.and_then(|h| h.plain_lyrics)
    }
}

impl Default for LrclibClient {
    fn default() -> Self {
        Self::new()
    }
}
