//! Genius client (spec.md §4.6 step 4): Search API plus page-scrape, since
//! Genius does not expose lyrics text through its public API.

use crate::limiter::IntervalLimiter;
use audiotag_common::error::{Error, Result};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use std::time::Duration;

const SEARCH_URL: &str = "https://api.genius.com/search";

static LYRICS_CONTAINER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(?s)<div[^>]*data-lyrics-container[^>]*>(.*?)</div>"#).unwrap());
static BR_TAG: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)<br\s*/?>").unwrap());
static ANY_TAG: Lazy<Regex> = Lazy::new(|| Regex::new(r"<[^>]+>").unwrap());

#[derive(Debug, Deserialize)]
struct SearchResponse {
    response: SearchResponseBody,
}

#[derive(Debug, Deserialize)]
struct SearchResponseBody {
    hits: Vec<SearchHit>,
}

#[derive(Debug, Deserialize)]
struct SearchHit {
    result: SearchResult,
}

#[derive(Debug, Deserialize)]
struct SearchResult {
    url: String,
}

pub struct GeniusClient {
    http: reqwest::Client,
    access_token: String,
    limiter: IntervalLimiter,
}

impl GeniusClient {
    pub fn new(access_token: String) -> Self {
        Self {
            http: reqwest::Client::builder()
                .timeout(Duration::from_secs(15))
                .build()
                .expect("reqwest client builds"),
            access_token,
            limiter: IntervalLimiter::from_millis(2_000),
        }
    }

    pub async fn search(&self, artist: &str, title: &str) -> Result<Option<String>> {
        self.limiter.acquire().await?;

        let query = format!("{artist} {title}");
        let response = self
            .http
            .get(SEARCH_URL)
            .bearer_auth(&self.access_token)
            .query(&[("q", query.as_str())])
            .send()
            .await
            .map_err(|e| Error::Api { service: "Genius", status: None, message: e.to_string() })?;

        match response.status().as_u16() {
            401 => return Err(Error::InvalidApiKey("Genius")),
            429 => {
                let retry_after = response
                    .headers()
                    .get("Retry-After")
                    .and_then(|v| v.to_str().ok())
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(1);
                self.limiter.handle_retry_after(retry_after).await;
                return Ok(None);
            }
            200 => {}
            _ => {
                return Err(Error::Api {
                    service: "Genius",
                    status: Some(response.status().as_u16()),
                    message: "search failed".to_string(),
                })
            }
        }

        let body: SearchResponse = response.json().await.map_err(|e| Error::Api {
            service: "Genius",
            status: None,
            message: format!("invalid search response: {e}"),
        })?;

        let Some(hit) = body.response.hits.into_iter().next() else {
            return Ok(None);
        };

        let page = self.http.get(&hit.result.url).send().await.map_err(|e| Error::Api {
            service: "Genius",
            status: None,
            message: e.to_string(),
        })?;
        let html = page.text().await.map_err(|e| Error::Api {
            service: "Genius",
            status: None,
            message: e.to_string(),
        })?;

        Ok(extract_lyrics(&html))
    }
}

/// Locates every `data-lyrics-container` div, converts `<br>` to newlines,
/// strips remaining tags, and decodes the standard HTML entities.
fn extract_lyrics(html: &str) -> Option<String> {
    let mut text = String::new();
    for capture in LYRICS_CONTAINER.captures_iter(html) {
        let inner = &capture[1];
        let with_newlines = BR_TAG.replace_all(inner, "\n");
        let stripped = ANY_TAG.replace_all(&with_newlines, "");
        text.push_str(&decode_entities(&stripped));
        text.push('\n');
    }
    if text.trim().is_empty() {
        None
    } else {
        Some(text)
    }
}

fn decode_entities(s: &str) -> String {
    s.replace("&amp;", "&")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#x27;", "'")
        .replace("&apos;", "'")
        .replace("&nbsp;", " ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_and_joins_multiple_lyrics_containers() {
        let html = r#"
            <div data-lyrics-container="true">Line one<br>Line two</div>
            <div data-lyrics-container="true">Line three</div>
        "#;
        let lyrics = extract_lyrics(html).unwrap();
        assert!(lyrics.contains("Line one"));
        assert!(lyrics.contains("Line two"));
        assert!(lyrics.contains("Line three"));
    }

    #[test]
    fn strips_inline_tags_and_decodes_entities() {
        let html = r#"<div data-lyrics-container="true"><a href="#">Rock &amp; Roll</a></div>"#;
        assert_eq!(extract_lyrics(html).unwrap().trim(), "Rock & Roll");
    }

    #[test]
    fn no_container_yields_none() {
        assert_eq!(extract_lyrics("<html><body>nothing here</body></html>"), None);
    }
}
