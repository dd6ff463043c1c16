//! TheAudioDB client (spec.md §4.5 step 3).

use crate::limiter::IntervalLimiter;
use crate::types::AlbumArt;
use serde::Deserialize;
use std::time::Duration;

const SEARCH_URL: &str = "https://www.theaudiodb.com/api/v1/json/2/searchalbum.php";

#[derive(Debug, Deserialize)]
struct SearchResponse {
    album: Option<Vec<AlbumHit>>,
}

#[derive(Debug, Deserialize)]
struct AlbumHit {
    #[serde(rename = "strAlbumThumb")]
    thumb: Option<String>,
}

pub struct TheAudioDbClient {
    http: reqwest::Client,
    limiter: IntervalLimiter,
}

impl TheAudioDbClient {
    pub fn new() -> Self {
        Self {
            http: reqwest::Client::builder()
                .timeout(Duration::from_secs(15))
                .build()
                .expect("reqwest client builds"),
            limiter: IntervalLimiter::from_millis(500),
        }
    }

    pub async fn cover(&self, artist: &str, album: &str) -> Option<AlbumArt> {
        self.limiter.acquire().await.ok()?;
        let response = self
            .http
            .get(SEARCH_URL)
            .query(&[("s", artist), ("a", album)])
            .send()
            .await
            .ok()?;
        if !response.status().is_success() {
            return None;
        }
        let body: SearchResponse = response.json().await.ok()?;
        let thumb_url = body.album?.into_iter().next()?.thumb?;
        download(&self.http, &thumb_url).await
    }
}

impl Default for TheAudioDbClient {
    fn default() -> Self {
        Self::new()
    }
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
