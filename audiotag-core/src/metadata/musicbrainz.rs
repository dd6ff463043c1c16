//! MusicBrainz recording lookup (spec.md §4.4 step 1).

use crate::cache::{Cache, CacheBundle};
use crate::limiter::IntervalLimiter;
use crate::types::CanonicalMetadata;
use audiotag_common::error::{Error, Result};
use serde::Deserialize;
use std::time::Duration;

const MUSICBRAINZ_API_URL: &str = "https://musicbrainz.org/ws/2";
const MAX_ATTEMPTS: u32 = 3;

#[derive(Debug, Deserialize)]
struct RecordingJson {
    id: String,
    title: String,
    #[serde(rename = "artist-credit", default)]
    artist_credit: Vec<ArtistCreditJson>,
    #[serde(default)]
    releases: Vec<ReleaseJson>,
    #[serde(default)]
    tags: Vec<TagJson>,
}

#[derive(Debug, Deserialize)]
struct ArtistCreditJson {
    name: String,
    #[serde(default)]
    joinphrase: String,
}

#[derive(Debug, Deserialize, Clone)]
struct ReleaseJson {
    id: String,
    title: String,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    date: Option<String>,
    #[serde(rename = "release-group", default)]
    release_group: Option<ReleaseGroupJson>,
}

#[derive(Debug, Deserialize, Clone)]
struct ReleaseGroupJson {
    #[serde(rename = "primary-type", default)]
    primary_type: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TagJson {
    name: String,
    count: u32,
}

pub struct MusicBrainzClient {
    http: reqwest::Client,
    limiter: IntervalLimiter,
    genre_vote_threshold: u32,
}

impl MusicBrainzClient {
    pub fn new() -> Self {
        Self {
            http: reqwest::Client::builder()
                .user_agent("audiotag/0.1 (+https://example.invalid)")
                .timeout(std::time::Duration::from_secs(20))
                .build()
                .expect("reqwest client builds"),
            // MusicBrainz's documented limit: ~1 request/second, with headroom.
            limiter: IntervalLimiter::from_millis(1_100),
            genre_vote_threshold: 1,
        }
    }

    /// Looks up each candidate recording id in order; returns the first
    /// non-empty mapped result, caching per recording id along the way.
    pub async fn resolve(
        &self,
        recording_ids: &[String],
        caches: &CacheBundle,
    ) -> Result<Option<CanonicalMetadata>> {
        for recording_id in recording_ids {
            if let Some(cached) = caches.metadata.get(recording_id).await? {
                if cached.is_some() {
                    return Ok(cached);
                }
                continue;
            }

            let resolved = self.fetch_one(recording_id).await?;
            caches.metadata.put(recording_id, resolved.clone()).await?;
            if resolved.is_some() {
                return Ok(resolved);
            }
        }
        Ok(None)
    }

    async fn fetch_one(&self, recording_id: &str) -> Result<Option<CanonicalMetadata>> {
        let mut attempt = 0;
        let mut backoff = Duration::from_millis(250);

        loop {
            attempt += 1;
            self.limiter.acquire().await?;

            match self.fetch_once(recording_id).await {
                Ok(recording) => return Ok(recording),
                Err(RetryableError::Fatal(e)) => return Err(e),
                Err(RetryableError::RetryAfter(secs)) => {
                    self.limiter.handle_retry_after(secs).await;
                    if attempt >= MAX_ATTEMPTS {
                        return Err(Error::Api {
                            service: "MusicBrainz",
                            status: Some(429),
                            message: "rate limited after retries".to_string(),
                        });
                    }
                }
                Err(RetryableError::Transient(e)) => {
                    if attempt >= MAX_ATTEMPTS {
                        return Err(e);
                    }
                    tokio::time::sleep(backoff).await;
                    backoff *= 2;
                }
            }
        }
    }

    async fn fetch_once(
        &self,
        recording_id: &str,
    ) -> std::result::Result<Option<CanonicalMetadata>, RetryableError> {
        let url = format!(
            "{MUSICBRAINZ_API_URL}/recording/{recording_id}?fmt=json&inc=artist-credits+releases+release-groups+tags"
        );
        let response = self.http.get(&url).send().await.map_err(|e| {
            RetryableError::Transient(Error::Api {
                service: "MusicBrainz",
                status: None,
                message: e.to_string(),
            })
        })?;

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if status.as_u16() == 429 {
            let retry_after = response
                .headers()
                .get("Retry-After")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse().ok())
                .unwrap_or(1);
            return Err(RetryableError::RetryAfter(retry_after));
        }
        if status.is_server_error() {
            return Err(RetryableError::Transient(Error::Api {
                service: "MusicBrainz",
                status: Some(status.as_u16()),
                message: "server error".to_string(),
            }));
        }
        if !status.is_success() {
            return Err(RetryableError::Fatal(Error::Api {
                service: "MusicBrainz",
                status: Some(status.as_u16()),
                message: "lookup failed".to_string(),
            }));
        }

        let recording: RecordingJson = response.json().await.map_err(|e| {
            RetryableError::Fatal(Error::Api {
                service: "MusicBrainz",
                status: None,
                message: format!("invalid response: {e}"),
            })
        })?;

        Ok(Some(map_recording(recording, self.genre_vote_threshold)))
    }
}

enum RetryableError {
    Fatal(Error),
    Transient(Error),
    RetryAfter(u64),
}

impl Default for MusicBrainzClient {
    fn default() -> Self {
        Self::new()
    }
}

fn map_recording(recording: RecordingJson, genre_vote_threshold: u32) -> CanonicalMetadata {
    let (primary_artist, featured_artists) = split_artist_credit(&recording.artist_credit);
    let release = best_release(&recording.releases);

    let year = release
        .as_ref()
        .and_then(|r| r.date.as_deref())
        .and_then(audiotag_common::time::year_from_date_str);

    let mut genres: Vec<(String, u32)> = recording
        .tags
        .into_iter()
        .filter(|t| t.count >= genre_vote_threshold)
        .map(|t| (capitalize_words(&t.name), t.count))
        .collect();
    genres.sort_by(|a, b| b.1.cmp(&a.1));

    CanonicalMetadata {
        recording_id: recording.id,
        release_id: release.as_ref().map(|r| r.id.clone()),
        title: recording.title,
        artist: primary_artist,
        featured_artists,
        album: release.map(|r| r.title),
        year,
        genres: genres.into_iter().map(|(name, _)| name).collect(),
        artwork_url: None,
    }
}

/// Splits a MusicBrainz artist-credit list into (primary, featured),
/// treating a `joinphrase` that mentions "feat" as the boundary.
fn split_artist_credit(credits: &[ArtistCreditJson]) -> (String, Vec<String>) {
    let Some(first) = credits.first() else {
        return (String::new(), Vec::new());
    };

    let mut primary = first.name.clone();
    let mut featured = Vec::new();
    let mut in_featured = first.joinphrase.to_lowercase().contains("feat");

    for credit in credits.iter().skip(1) {
        if in_featured {
            featured.push(credit.name.clone());
        } else {
            primary.push_str(&credit.name);
        }
        in_featured = in_featured || credit.joinphrase.to_lowercase().contains("feat");
    }

    (primary, featured)
}

/// Release ordering from spec.md §4.4: Official > other, then
/// Album > EP/Single > other, then earliest date.
fn best_release(releases: &[ReleaseJson]) -> Option<ReleaseJson> {
    fn status_rank(r: &ReleaseJson) -> u8 {
        match r.status.as_deref() {
            Some("Official") => 0,
            _ => 1,
        }
    }
    fn type_rank(r: &ReleaseJson) -> u8 {
        match r
            .release_group
            .as_ref()
            .and_then(|g| g.primary_type.as_deref())
        {
            Some("Album") => 0,
            Some("EP") | Some("Single") => 1,
            _ => 2,
        }
    }

    releases
        .iter()
        .min_by(|a, b| {
            status_rank(a)
                .cmp(&status_rank(b))
                .then(type_rank(a).cmp(&type_rank(b)))
                .then(a.date.as_deref().unwrap_or("9999").cmp(b.date.as_deref().unwrap_or("9999")))
        })
        .cloned()
}

fn capitalize_words(s: &str) -> String {
    s.split_whitespace()
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_featured_artist_on_feat_joinphrase() {
        let credits = vec![
            ArtistCreditJson { name: "Daft Punk".to_string(), joinphrase: " feat. ".to_string() },
            ArtistCreditJson { name: "Pharrell Williams".to_string(), joinphrase: String::new() },
        ];
        let (primary, featured) = split_artist_credit(&credits);
        assert_eq!(primary, "Daft Punk");
        assert_eq!(featured, vec!["Pharrell Williams".to_string()]);
    }

    #[test]
    fn no_joinphrase_concatenates_into_primary() {
        let credits = vec![
            ArtistCreditJson { name: "Artist A".to_string(), joinphrase: " & ".to_string() },
            ArtistCreditJson { name: "Artist B".to_string(), joinphrase: String::new() },
        ];
        let (primary, featured) = split_artist_credit(&credits);
        assert_eq!(primary, "Artist A & Artist B");
        assert!(featured.is_empty());
    }

    #[test]
    fn best_release_prefers_official_album_earliest() {
        let releases = vec![
            ReleaseJson {
                id: "r1".into(),
                title: "Single Release".into(),
                status: Some("Official".to_string()),
                date: Some("2005-01-01".to_string()),
                release_group: Some(ReleaseGroupJson { primary_type: Some("Single".to_string()) }),
            },
            ReleaseJson {
                id: "r2".into(),
                title: "Album Release".into(),
                status: Some("Official".to_string()),
                date: Some("2003-06-15".to_string()),
                release_group: Some(ReleaseGroupJson { primary_type: Some("Album".to_string()) }),
            },
            ReleaseJson {
                id: "r3".into(),
                title: "Promo".into(),
                status: Some("Promotion".to_string()),
                date: Some("2001-01-01".to_string()),
                release_group: Some(ReleaseGroupJson { primary_type: Some("Album".to_string()) }),
            },
        ];
        let chosen = best_release(&releases).unwrap();
        assert_eq!(chosen.id, "r2");
    }

    #[test]
    fn genre_capitalisation_and_threshold_filter() {
        let recording = RecordingJson {
            id: "rec1".into(),
            title: "Song".into(),
            artist_credit: vec![ArtistCreditJson { name: "Artist".into(), joinphrase: String::new() }],
            releases: vec![],
            tags: vec![
                TagJson { name: "synth pop".into(), count: 5 },
                TagJson { name: "obscure".into(), count: 0 },
            ],
        };
        let mapped = map_recording(recording, 1);
        assert_eq!(mapped.genres, vec!["Synth Pop".to_string()]);
    }
}
