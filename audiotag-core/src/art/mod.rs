//! Album-art cascade (spec.md §4.5).
//!
//! Dedup-keyed by `lower(artist):lower(album ?? title)`: concurrent
//! workers asking for the same key await one shared in-flight lookup
//! instead of repeating the whole cascade.

mod cover_art_archive;
mod deezer;
mod the_audio_db;

pub use cover_art_archive::CoverArtArchiveClient;
pub use deezer::DeezerClient;
pub use the_audio_db::TheAudioDbClient;

use crate::types::AlbumArt;
use futures::future::{BoxFuture, FutureExt, Shared};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

type InFlight = Shared<BoxFuture<'static, Option<AlbumArt>>>;

struct Inner {
    cover_art_archive: CoverArtArchiveClient,
    deezer: DeezerClient,
    the_audio_db: TheAudioDbClient,
    http: reqwest::Client,
    in_flight: Mutex<HashMap<String, InFlight>>,
}

#[derive(Clone)]
pub struct ArtCascade(Arc<Inner>);

pub struct ArtRequest<'a> {
    pub artist: &'a str,
    pub album: Option<&'a str>,
    pub title: &'a str,
    pub release_id: Option<&'a str>,
    pub artwork_url: Option<&'a str>,
}

impl ArtCascade {
    pub fn new() -> Self {
        Self(Arc::new(Inner {
            cover_art_archive: CoverArtArchiveClient::new(),
            deezer: DeezerClient::new(),
            the_audio_db: TheAudioDbClient::new(),
            http: reqwest::Client::builder()
                .timeout(Duration::from_secs(15))
                .build()
                .expect("reqwest client builds"),
            in_flight: Mutex::new(HashMap::new()),
        }))
    }

    pub async fn resolve(&self, request: ArtRequest<'_>) -> Option<AlbumArt> {
        let key = dedup_key(request.artist, request.album, request.title);

        let mut guard = self.0.in_flight.lock().await;
        if let Some(shared) = guard.get(&key) {
            let shared = shared.clone();
            drop(guard);
            return shared.await;
        }

        let cascade = self.clone();
        let artist = request.artist.to_string();
        let album = request.album.map(str::to_string);
        let title = request.title.to_string();
        let release_id = request.release_id.map(str::to_string);
        let artwork_url = request.artwork_url.map(str::to_string);

        let fut: BoxFuture<'static, Option<AlbumArt>> = async move {
            cascade
                .run_cascade(&artist, album.as_deref(), &title, release_id.as_deref(), artwork_url.as_deref())
                .await
        }
        .boxed();
        let shared: InFlight = fut.shared();
        guard.insert(key.clone(), shared.clone());
        drop(guard);

        // spec.md §5: in-flight entries persist for the batch's lifetime,
        // so a later sequential (non-overlapping) request for this key
        // reuses the cached result instead of re-running the cascade.
        shared.await
    }

    async fn run_cascade(
        &self,
        artist: &str,
        album: Option<&str>,
        title: &str,
        release_id: Option<&str>,
        artwork_url: Option<&str>,
    ) -> Option<AlbumArt> {
        // 1. Cover Art Archive direct.
        if let Some(release_id) = release_id {
            if let Some(art) = retry_once(|| self.0.cover_art_archive.front_cover(release_id)).await {
                return Some(art);
            }
        }

        // 2. Deezer.
        if !artist.is_empty() {
            if let Some(art) = retry_once(|| self.0.deezer.cover(artist, album, title)).await {
                return Some(art);
            }
        }

        // 3. TheAudioDB.
        if let (false, Some(album)) = (artist.is_empty(), album) {
            if let Some(art) = retry_once(|| self.0.the_audio_db.cover(artist, album)).await {
                return Some(art);
            }
        }

        // 4. Cover Art Archive two-step.
        if release_id.is_none() {
            if let Some(album) = album {
                if let Some(found_release_id) =
                    retry_once(|| self.0.cover_art_archive.find_release_id(artist, album)).await
                {
                    if let Some(art) =
                        retry_once(|| self.0.cover_art_archive.front_cover(&found_release_id)).await
                    {
                        return Some(art);
                    }
                }
            }
        }

        // 5. Generic URL captured during the metadata cascade.
        if let Some(url) = artwork_url {
            if let Some(art) = retry_once(|| download_generic(&self.0.http, url)).await {
                return Some(art);
            }
        }

        None
    }
}

impl Default for ArtCascade {
    fn default() -> Self {
        Self::new()
    }
}

/// Every HTTP step in the cascade is wrapped in one retry after a short
/// delay; the second failure is treated the same as a first-try miss.
async fn retry_once<F, Fut, T>(mut attempt: F) -> Option<T>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Option<T>>,
{
    if let Some(v) = attempt().await {
        return Some(v);
    }
    tokio::time::sleep(Duration::from_millis(300)).await;
    attempt().await
}

async fn download_generic(http: &reqwest::Client, url: &str) -> Option<AlbumArt> {
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

fn dedup_key(artist: &str, album: Option<&str>, title: &str) -> String {
    format!(
        "{}:{}",
        artist.to_lowercase(),
        album.unwrap_or(title).to_lowercase()
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dedup_key_falls_back_to_title_when_no_album() {
        assert_eq!(dedup_key("Queen", None, "Bohemian Rhapsody"), "queen:bohemian rhapsody");
        assert_eq!(dedup_key("Queen", Some("A Night at the Opera"), "Anything"), "queen:a night at the opera");
    }

    #[tokio::test]
    #[ignore] // requires network access
    async fn concurrent_resolves_for_same_key_share_one_cascade() {
        let cascade = ArtCascade::new();
        let a = cascade.clone();
        let b = cascade.clone();

        let (ra, rb) = tokio::join!(
            a.resolve(ArtRequest {
                artist: "Nonexistent Artist Xyz",
                album: Some("Nonexistent Album Xyz"),
                title: "Track",
                release_id: None,
                artwork_url: None,
            }),
            b.resolve(ArtRequest {
                artist: "Nonexistent Artist Xyz",
                album: Some("Nonexistent Album Xyz"),
                title: "Track",
                release_id: None,
                artwork_url: None,
            }),
        );
        assert_eq!(ra.is_none(), rb.is_none());
    }
}
