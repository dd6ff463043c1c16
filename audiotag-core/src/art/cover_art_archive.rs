//! Cover Art Archive client (spec.md §4.5 steps 1 and 4).

use crate::limiter::IntervalLimiter;
use crate::types::AlbumArt;
use serde::Deserialize;
use std::time::Duration;

const CAA_BASE: &str = "https://coverartarchive.org";
const MUSICBRAINZ_SEARCH_URL: &str = "https://musicbrainz.org/ws/2/release";

pub struct CoverArtArchiveClient {
    http: reqwest::Client,
    /// Separate instance from the metadata cascade's MusicBrainz limiter
    /// (spec.md §4.1): this one only guards `find_release_id`'s release
    /// search, which shares MusicBrainz's rate limit but not its queue.
    musicbrainz_search_limiter: IntervalLimiter,
}

#[derive(Debug, Deserialize)]
struct ReleaseSearchResponse {
    releases: Vec<ReleaseHit>,
}

#[derive(Debug, Deserialize)]
struct ReleaseHit {
    id: String,
    score: u32,
    status: Option<String>,
    #[serde(rename = "release-group")]
    release_group: Option<ReleaseGroupHit>,
}

#[derive(Debug, Deserialize)]
struct ReleaseGroupHit {
    #[serde(rename = "primary-type")]
    primary_type: Option<String>,
}

impl CoverArtArchiveClient {
    pub fn new() -> Self {
        Self {
            http: reqwest::Client::builder()
                .timeout(Duration::from_secs(15))
                .user_agent("audiotag/0.1 (+https://example.invalid)")
                .build()
                .expect("reqwest client builds"),
            musicbrainz_search_limiter: IntervalLimiter::from_millis(1_100),
        }
    }

    /// Step 1: direct front-cover fetch for a known release id.
    pub async fn front_cover(&self, release_id: &str) -> Option<AlbumArt> {
        let url = format!("{CAA_BASE}/release/{release_id}/front");
        let response = self.http.get(&url).send().await.ok()?;
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

    /// Step 4: find a release id by searching MusicBrainz when none is
    /// already known, then feed it back into [`front_cover`](Self::front_cover).
    pub async fn find_release_id(&self, artist: &str, album: &str) -> Option<String> {
        self.musicbrainz_search_limiter.acquire().await.ok()?;
        let query = format!("artist:\"{artist}\" AND release:\"{album}\"");
        let url = format!("{MUSICBRAINZ_SEARCH_URL}?fmt=json&inc=release-groups&query={}", urlencode(&query));

        let response = self.http.get(&url).send().await.ok()?;
        if !response.status().is_success() {
            return None;
        }
        let body: ReleaseSearchResponse = response.json().await.ok()?;

        let candidates: Vec<&ReleaseHit> = body.releases.iter().filter(|r| r.score >= 80).collect();
        if candidates.is_empty() {
            return None;
        }

        // Official + Album, then Official + any, then any.
        fn rank(r: &ReleaseHit) -> u8 {
            let official = r.status.as_deref() == Some("Official");
            let album = r
                .release_group
                .as_ref()
                .and_then(|g| g.primary_type.as_deref())
                == Some("Album");
            match (official, album) {
                (true, true) => 0,
                (true, false) => 1,
                _ => 2,
            }
        }

        candidates
            .into_iter()
            .min_by_key(|r| rank(r))
            .map(|r| r.id.clone())
    }
}

impl Default for CoverArtArchiveClient {
    fn default() -> Self {
        Self::new()
    }
}

fn urlencode(s: &str) -> String {
    s.chars()
        .map(|c| match c {
            ' ' => "%20".to_string(),
            '"' => "%22".to_string(),
            ':' => "%3A".to_string(),
            c => c.to_string(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rank_prefers_official_album() {
        fn rank(official: bool, album: bool) -> u8 {
            match (official, album) {
                (true, true) => 0,
                (true, false) => 1,
                _ => 2,
            }
        }
        assert!(rank(true, true) < rank(true, false));
        assert!(rank(true, false) < rank(false, false));
    }
}
