//! Spotify Web API client-credentials lookup (spec.md §4.4 step 2).
//!
//! Only the client-credentials flow is needed here (searching public
//! catalog metadata), so this talks to the REST API directly instead of
//! pulling in a full user-auth Spotify SDK.

use crate::limiter::IntervalLimiter;
use crate::types::CanonicalMetadata;
use audiotag_common::error::{Error, Result};
use serde::Deserialize;
use tokio::sync::Mutex;

const TOKEN_URL: &str = "https://accounts.spotify.com/api/token";
const SEARCH_URL: &str = "https://api.spotify.com/v1/search";

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: u64,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    tracks: Option<TracksPage>,
}

#[derive(Debug, Deserialize)]
struct TracksPage {
    items: Vec<TrackJson>,
}

#[derive(Debug, Deserialize)]
struct TrackJson {
    name: String,
    artists: Vec<ArtistJson>,
    album: AlbumJson,
}

#[derive(Debug, Deserialize)]
struct ArtistJson {
    name: String,
}

#[derive(Debug, Deserialize)]
struct AlbumJson {
    name: String,
    images: Vec<ImageJson>,
    release_date: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ImageJson {
    url: String,
}

struct TokenState {
    access_token: String,
    expires_at: std::time::Instant,
}

/// Holds the current client-credentials token and refreshes it lazily
/// when it has expired, so callers never see a stale-token 401.
pub struct SpotifyClient {
    http: reqwest::Client,
    client_id: String,
    client_secret: String,
    token: Mutex<Option<TokenState>>,
    limiter: IntervalLimiter,
}

impl SpotifyClient {
    pub fn new(client_id: String, client_secret: String) -> Self {
        Self {
            http: reqwest::Client::builder()
                .timeout(std::time::Duration::from_secs(15))
                .build()
                .expect("reqwest client builds"),
            client_id,
            client_secret,
            token: Mutex::new(None),
            limiter: IntervalLimiter::from_millis(334),
        }
    }

    async fn access_token(&self) -> Result<String> {
        let mut guard = self.token.lock().await;
        if let Some(state) = guard.as_ref() {
            if state.expires_at > std::time::Instant::now() {
                return Ok(state.access_token.clone());
            }
        }

        let response = self
            .http
            .post(TOKEN_URL)
            .form(&[("grant_type", "client_credentials")])
            .basic_auth(&self.client_id, Some(&self.client_secret))
            .send()
            .await
            .map_err(|e| Error::Api { service: "Spotify", status: None, message: e.to_string() })?;

        if !response.status().is_success() {
            return Err(Error::InvalidApiKey("Spotify"));
        }

        let token: TokenResponse = response.json().await.map_err(|e| Error::Api {
            service: "Spotify",
            status: None,
            message: format!("invalid token response: {e}"),
        })?;

        // Refresh a little early so a request never races an expiring token.
        let expires_at = std::time::Instant::now()
            + std::time::Duration::from_secs(token.expires_in.saturating_sub(30));
        *guard = Some(TokenState {
            access_token: token.access_token.clone(),
            expires_at,
        });
        Ok(token.access_token)
    }

    pub async fn search_track(&self, title: &str, artist: &str) -> Result<Option<CanonicalMetadata>> {
        let token = self.access_token().await?;
        self.limiter.acquire().await?;
        let query = format!("track:{title} artist:{artist}");

        let response = self
            .http
            .get(SEARCH_URL)
            .bearer_auth(token)
            .query(&[("q", query.as_str()), ("type", "track"), ("limit", "1")])
            .send()
            .await
            .map_err(|e| Error::Api { service: "Spotify", status: None, message: e.to_string() })?;

        if !response.status().is_success() {
            return Err(Error::Api {
                service: "Spotify",
                status: Some(response.status().as_u16()),
                message: "search failed".to_string(),
            });
        }

        let body: SearchResponse = response.json().await.map_err(|e| Error::Api {
            service: "Spotify",
            status: None,
            message: format!("invalid search response: {e}"),
        })?;

        let Some(track) = body.tracks.and_then(|p| p.items.into_iter().next()) else {
            return Ok(None);
        };

        let mut artists = track.artists.into_iter().map(|a| a.name);
        let primary = artists.next().unwrap_or_default();
        let featured_artists: Vec<String> = artists.collect();

        let artwork_url = track.album.images.into_iter().next().map(|i| i.url);
        let year = track
            .album
            .release_date
            .as_deref()
            .and_then(audiotag_common::time::year_from_date_str);

        Ok(Some(CanonicalMetadata {
            recording_id: String::new(),
            release_id: None,
            title: track.name,
            artist: primary,
            featured_artists,
            album: Some(track.album.name),
            year,
            genres: Vec::new(),
            artwork_url,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_artist_is_primary_rest_are_featured() {
        let artists = vec!["Main Act".to_string(), "Guest".to_string(), "Other Guest".to_string()];
        let mut it = artists.into_iter();
        let primary = it.next().unwrap();
        let featured: Vec<String> = it.collect();
        assert_eq!(primary, "Main Act");
        assert_eq!(featured, vec!["Guest".to_string(), "Other Guest".to_string()]);
    }
}
