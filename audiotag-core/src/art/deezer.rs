//! Deezer client (spec.md §4.5 step 2).

use crate::limiter::IntervalLimiter;
use crate::types::AlbumArt;
use serde::Deserialize;
use std::time::Duration;

const SEARCH_BASE: &str = "https://api.deezer.com";

#[derive(Debug, Deserialize)]
struct AlbumSearchResponse {
    data: Vec<AlbumHit>,
}

#[derive(Debug, Deserialize)]
struct AlbumHit {
    cover_xl: Option<String>,
    cover_big: Option<String>,
    cover_small: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TrackSearchResponse {
    data: Vec<TrackHit>,
}

#[derive(Debug, Deserialize)]
struct TrackHit {
    artist: ArtistHit,
    album: TrackAlbumHit,
}

#[derive(Debug, Deserialize)]
struct ArtistHit {
    name: String,
}

#[derive(Debug, Deserialize)]
struct TrackAlbumHit {
    cover_xl: Option<String>,
    cover_big: Option<String>,
    cover_small: Option<String>,
}

pub struct DeezerClient {
    http: reqwest::Client,
    limiter: IntervalLimiter,
}

impl DeezerClient {
    pub fn new() -> Self {
        Self {
            http: reqwest::Client::builder()
                .timeout(Duration::from_secs(15))
                .build()
                .expect("reqwest client builds"),
            limiter: IntervalLimiter::from_millis(300),
        }
    }

    pub async fn cover(&self, artist: &str, album: Option<&str>, title: &str) -> Option<AlbumArt> {
        if let Some(album) = album {
            if let Some(art) = self.search_album(artist, album).await {
                return Some(art);
            }
        }
        self.search_track(artist, title).await
    }

    async fn search_album(&self, artist: &str, album: &str) -> Option<AlbumArt> {
        self.limiter.acquire().await.ok()?;
        let query = format!("{artist} {album}");
        let url = format!("{SEARCH_BASE}/search/album");
        let response = self.http.get(&url).query(&[("q", query.as_str())]).send().await.ok()?;
        let body: AlbumSearchResponse = response.json().await.ok()?;
        let hit = body.data.into_iter().next()?;
        let url = best_cover_url(hit.cover_xl, hit.cover_big, hit.cover_small)?;
        download(&self.http, &url).await
    }

    async fn search_track(&self, artist: &str, title: &str) -> Option<AlbumArt> {
        self.limiter.acquire().await.ok()?;
        let query = format!("{artist} {title}");
        let url = format!("{SEARCH_BASE}/search");
        let response = self.http.get(&url).query(&[("q", query.as_str())]).send().await.ok()?;
        let body: TrackSearchResponse = response.json().await.ok()?;

        let artist_lower = normalize(artist);
        let hit = body
            .data
            .into_iter()
            .find(|t| fuzzy_artist_match(&normalize(&t.artist.name), &artist_lower))?;

        let url = best_cover_url(hit.album.cover_xl, hit.album.cover_big, hit.album.cover_small)?;
        download(&self.http, &url).await
    }
}

impl Default for DeezerClient {
    fn default() -> Self {
        Self::new()
    }
}

fn best_cover_url(xl: Option<String>, big: Option<String>, small: Option<String>) -> Option<String> {
    xl.or(big).or(small)
}

/// Lowercased, alphanumeric-only substring match either direction, used to
/// avoid grabbing a cover from an unrelated artist's track.
fn fuzzy_artist_match(a: &str, b: &str) -> bool {
    !a.is_empty() && !b.is_empty() && (a.contains(b) || b.contains(a))
}

fn normalize(s: &str) -> String {
    s.to_lowercase().chars().filter(|c| c.is_alphanumeric()).collect()
}

async fn download(http: &reqwest::Client, url: &str) -> Option<AlbumArt> {
    let response = http.get(url).send().await.ok()?;
    if !response.status().is_success() {
        return None;
    }
    let mime_type = response
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("image/jpeg")
        .to_string();
    let bytes = response.bytes().await.ok()?.to_vec();
    Some(AlbumArt { bytes, mime_type })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fuzzy_match_ignores_case_and_punctuation() {
        assert!(fuzzy_artist_match(&normalize("Guns N' Roses"), &normalize("guns n roses")));
        assert!(!fuzzy_artist_match(&normalize("Queen"), &normalize("Nirvana")));
    }

    #[test]
    fn best_cover_prefers_xl_then_big_then_small() {
        assert_eq!(
            best_cover_url(Some("xl".into()), Some("big".into()), Some("small".into())),
            Some("xl".into())
        );
        assert_eq!(best_cover_url(None, Some("big".into()), Some("small".into())), Some("big".into()));
        assert_eq!(best_cover_url(None, None, Some("small".into())), Some("small".into()));
        assert_eq!(best_cover_url(None, None, None), None);
    }
}
