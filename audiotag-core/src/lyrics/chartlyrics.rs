//! ChartLyrics client (spec.md §4.6 step 3), a plain XML SOAP-style API.

use std::time::Duration;

const SEARCH_URL: &str = "http://api.chartlyrics.com/apiv1.asmx/SearchLyricDirect";

pub struct ChartLyricsClient {
    http: reqwest::Client,
}

impl ChartLyricsClient {
    pub fn new() -> Self {
        Self {
            http: reqwest::Client::builder()
                .timeout(Duration::from_secs(15))
                .build()
                .expect("reqwest client builds"),
        }
    }

    pub async fn search(&self, artist: &str, title: &str) -> Option<String> {
        let response = self
            .http
            .get(SEARCH_URL)
            .query(&[("artist", artist), ("song", title)])
            .send()
            .await
            .ok()?;
        if !response.status().is_success() {
            return None;
        }
        let body = response.text().await.ok()?;
        extract_lyric(&body)
    }
}

impl Default for ChartLyricsClient {
    fn default() -> Self {
        Self::new()
    }
}

/// ChartLyrics returns a flat XML document; pull out the `<Lyric>` element
/// without a full XML parser dependency.
fn extract_lyric(xml: &str) -> Option<String> {
    let start_tag = "<Lyric>";
    let end_tag = "</Lyric>";
    let start = xml.find(start_tag)? + start_tag.len();
    let end = xml[start..].find(end_tag)? + start;
    let raw = &xml[start..end];
    if raw.trim().is_empty() {
        None
    } else {
        Some(decode_xml_entities(raw))
    }
}

fn decode_xml_entities(s: &str) -> String {
    s.replace("&amp;", "&")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_lyric_element_from_xml_body() {
        let xml = "<GetLyricResult><Lyric>Verse one\nChorus</Lyric></GetLyricResult>";
        assert_eq!(extract_lyric(xml).as_deref(), Some("Verse one\nChorus"));
    }

    #[test]
    fn empty_lyric_element_yields_none() {
        let xml = "<GetLyricResult><Lyric></Lyric></GetLyricResult>";
        assert_eq!(extract_lyric(xml), None);
    }
}
