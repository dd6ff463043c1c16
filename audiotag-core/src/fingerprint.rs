//! Fingerprint engine (spec.md §4.3): wraps the external `fpcalc` binary
//! and the AcoustID lookup call.

use crate::cache::{Cache, CacheBundle};
use crate::limiter::IntervalLimiter;
use audiotag_common::error::{Error, Result};
use serde::Deserialize;
use sha2::{Digest, Sha256};
use std::path::Path;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tokio::process::Command;

const ACOUSTID_URL: &str = "https://api.acoustid.org/v2/lookup";
const DEFAULT_MIN_SCORE: f64 = 0.5;
const MAX_ATTEMPTS: u32 = 3;
const HASH_WINDOW_BYTES: u64 = 1024 * 1024;

#[derive(Debug, Deserialize)]
struct AcoustIdResponse {
    status: String,
    results: Option<Vec<AcoustIdResultJson>>,
    error: Option<AcoustIdErrorJson>,
}

#[derive(Debug, Deserialize)]
struct AcoustIdErrorJson {
    message: String,
}

#[derive(Debug, Deserialize)]
struct AcoustIdResultJson {
    score: f64,
    recordings: Option<Vec<AcoustIdRecordingJson>>,
}

#[derive(Debug, Deserialize)]
struct AcoustIdRecordingJson {
    id: String,
}

struct FpcalcOutput {
    duration_seconds: u64,
    fingerprint_token: String,
}

pub struct FingerprintEngine {
    http: reqwest::Client,
    limiter: IntervalLimiter,
    api_key: String,
    min_score: f64,
    use_persistent_path_hash: bool,
}

impl FingerprintEngine {
    pub fn new(api_key: String, use_persistent_path_hash: bool) -> Self {
        Self {
            http: reqwest::Client::builder()
                .timeout(Duration::from_secs(15))
                .build()
                .expect("reqwest client builds"),
            limiter: IntervalLimiter::from_millis(334),
            api_key,
            min_score: DEFAULT_MIN_SCORE,
            use_persistent_path_hash,
        }
    }

    pub fn with_min_score(mut self, min_score: f64) -> Self {
        self.min_score = min_score;
        self
    }

    /// Cache key per spec.md §3: canonical absolute path for the in-memory
    /// backend, or SHA-256 of the first+last 1 MiB for the persistent one
    /// (survives renames).
    pub async fn cache_key(&self, path: &Path) -> Result<String> {
        if !self.use_persistent_path_hash {
            return Ok(path
                .canonicalize()
                .unwrap_or_else(|_| path.to_path_buf())
                .to_string_lossy()
                .into_owned());
        }
        content_hash(path).await
    }

    pub async fn fingerprint(
        &self,
        path: &Path,
        caches: &CacheBundle,
    ) -> Result<Vec<crate::types::FingerprintResult>> {
        let key = self.cache_key(path).await?;
        if let Some(cached) = caches.fingerprints.get(&key).await? {
            return Ok(cached.unwrap_or_default());
        }

        let results = self.fingerprint_uncached(path).await?;
        caches
            .fingerprints
            .put(&key, Some(results.clone()))
            .await?;
        Ok(results)
    }

    async fn fingerprint_uncached(&self, path: &Path) -> Result<Vec<crate::types::FingerprintResult>> {
        let fpcalc = run_fpcalc(path).await?;

        self.limiter.acquire().await?;
        let response = self.lookup_with_retry(&fpcalc).await?;

        let mut results: Vec<crate::types::FingerprintResult> = response
            .results
            .unwrap_or_default()
            .into_iter()
            .filter(|r| r.score >= self.min_score)
            .map(|r| crate::types::FingerprintResult {
                score: r.score,
                recording_ids: r
                    .recordings
                    .unwrap_or_default()
                    .into_iter()
                    .map(|rec| rec.id)
                    .collect(),
            })
            .collect();

        // Stable sort preserves original API order among equal scores.
        results.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        Ok(results)
    }

    async fn lookup_with_retry(&self, fpcalc: &FpcalcOutput) -> Result<AcoustIdResponse> {
        let mut attempt = 0;
        let mut backoff = Duration::from_millis(250);

        loop {
            attempt += 1;
            match self.lookup_once(fpcalc).await {
                Ok(response) => return Ok(response),
                Err(RetryableError::Fatal(e)) => return Err(e),
                Err(RetryableError::RetryAfter(secs)) => {
                    self.limiter.handle_retry_after(secs).await;
                    if attempt >= MAX_ATTEMPTS {
                        return Err(Error::Api {
                            service: "AcoustID",
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

    async fn lookup_once(&self, fpcalc: &FpcalcOutput) -> std::result::Result<AcoustIdResponse, RetryableError> {
        let response = self
            .http
            .get(ACOUSTID_URL)
            .query(&[
                ("client", self.api_key.as_str()),
                ("meta", "recordings"),
                ("duration", &fpcalc.duration_seconds.to_string()),
                ("fingerprint", &fpcalc.fingerprint_token),
            ])
            .send()
            .await
            .map_err(|e| RetryableError::Transient(Error::Api {
                service: "AcoustID",
                status: None,
                message: e.to_string(),
            }))?;

        let status = response.status();
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
                service: "AcoustID",
                status: Some(status.as_u16()),
                message: "server error".to_string(),
            }));
        }
        if status.is_client_error() {
            return Err(RetryableError::Fatal(Error::Api {
                service: "AcoustID",
                status: Some(status.as_u16()),
                message: "client error".to_string(),
            }));
        }

        let body: AcoustIdResponse = response
            .json()
            .await
            .map_err(|e| RetryableError::Fatal(Error::Fingerprint(format!("invalid AcoustID response: {e}"))))?;

        if body.status != "ok" {
            let message = body.error.map(|e| e.message).unwrap_or_default();
            if message.to_lowercase().contains("api key") {
                return Err(RetryableError::Fatal(Error::InvalidApiKey("AcoustID")));
            }
            return Err(RetryableError::Fatal(Error::Api {
                service: "AcoustID",
                status: None,
                message,
            }));
        }

        Ok(body)
    }
}

enum RetryableError {
    Fatal(Error),
    Transient(Error),
    RetryAfter(u64),
}

async fn run_fpcalc(path: &Path) -> Result<FpcalcOutput> {
    let output = Command::new("fpcalc")
        .arg(path)
        .arg("-json")
        .output()
        .await
        .map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                Error::Fingerprint(
                    "fpcalc not found; install chromaprint (e.g. `apt install libchromaprint-tools` \
                     or `brew install chromaprint`)".to_string(),
                )
            } else {
                Error::Fingerprint(format!("failed to run fpcalc: {e}"))
            }
        })?;

    if !output.status.success() || output.stdout.is_empty() {
        return Err(Error::Fingerprint(
            "fpcalc produced no output (corrupt file or unsupported format)".to_string(),
        ));
    }

    #[derive(Deserialize)]
    struct Raw {
        duration: f64,
        fingerprint: String,
    }

    let raw: Raw = serde_json::from_slice(&output.stdout)
        .map_err(|e| Error::Fingerprint(format!("could not parse fpcalc output: {e}")))?;

    Ok(FpcalcOutput {
        duration_seconds: raw.duration.round() as u64,
        fingerprint_token: raw.fingerprint,
    })
}

/// SHA-256 over the first 1 MiB concatenated with the last 1 MiB of the
/// file content: a fast identity that survives filename changes.
async fn content_hash(path: &Path) -> Result<String> {
    let mut file = tokio::fs::File::open(path).await?;
    let len = file.metadata().await?.len();

    let mut hasher = Sha256::new();
    let mut head = vec![0u8; HASH_WINDOW_BYTES.min(len) as usize];
    file.read_exact(&mut head).await?;
    hasher.update(&head);

    if len > HASH_WINDOW_BYTES {
        let tail_start = len.saturating_sub(HASH_WINDOW_BYTES);
        file.seek(std::io::SeekFrom::Start(tail_start)).await?;
        let mut tail = vec![0u8; (len - tail_start) as usize];
        file.read_exact(&mut tail).await?;
        hasher.update(&tail);
    }

    Ok(hex::encode(hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn fpcalc_enoent_reports_install_hint() {
        let tmp = tempfile::NamedTempFile::new().unwrap();
        // fpcalc is not on PATH in the test sandbox, so this exercises the
        // ENOENT branch deterministically.
        let err = run_fpcalc(tmp.path()).await.unwrap_err();
        assert!(matches!(err, Error::Fingerprint(ref m) if m.contains("install")));
    }

    #[tokio::test]
    async fn content_hash_is_stable_for_same_bytes() {
        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        std::io::Write::write_all(&mut tmp, &vec![7u8; 2048]).unwrap();
        let a = content_hash(tmp.path()).await.unwrap();
        let b = content_hash(tmp.path()).await.unwrap();
        assert_eq!(a, b);
    }
}
