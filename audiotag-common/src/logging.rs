//! Structured logger: tracing to the console, plus a rotating file sink and
//! an in-memory ring buffer the UI collaborator can filter/export (spec.md §7).

use crate::error::Result;
use chrono::Utc;
use std::collections::VecDeque;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tokio::io::AsyncWriteExt;

const MAX_LOG_FILE_BYTES: u64 = 10 * 1024 * 1024;
const RING_BUFFER_CAPACITY: usize = 10_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Level {
    Warn,
    Info,
    Debug,
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Level::Warn => "WARN",
            Level::Info => "INFO",
            Level::Debug => "DEBUG",
        })
    }
}

/// A single structured entry as recorded in the ring buffer / log file.
#[derive(Debug, Clone)]
pub struct LogEntry {
    pub timestamp: chrono::DateTime<Utc>,
    pub level: Level,
    pub category: Option<String>,
    pub message: String,
    pub file_path: Option<String>,
    pub step: Option<String>,
    pub cause: Option<String>,
}

impl fmt::Display for LogEntry {
    /// `[ISO-8601] LEVEL [Category]? message [| filePath: …] [| step: …] [| cause: …]`
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.timestamp.to_rfc3339(), self.level)?;
        if let Some(category) = &self.category {
            write!(f, " [{category}]")?;
        }
        write!(f, " {}", self.message)?;
        if let Some(path) = &self.file_path {
            write!(f, " | filePath: {path}")?;
        }
        if let Some(step) = &self.step {
            write!(f, " | step: {step}")?;
        }
        if let Some(cause) = &self.cause {
            write!(f, " | cause: {cause}")?;
        }
        Ok(())
    }
}

/// Builder for a log entry; `.emit(logger)` writes it out.
#[derive(Default)]
pub struct LogEntryBuilder {
    category: Option<String>,
    file_path: Option<String>,
    step: Option<String>,
    cause: Option<String>,
}

impl LogEntryBuilder {
    pub fn category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    pub fn file_path(mut self, path: impl Into<String>) -> Self {
        self.file_path = Some(path.into());
        self
    }

    pub fn step(mut self, step: impl Into<String>) -> Self {
        self.step = Some(step.into());
        self
    }

    pub fn cause(mut self, cause: impl Into<String>) -> Self {
        self.cause = Some(cause.into());
        self
    }

    fn build(self, level: Level, message: String) -> LogEntry {
        LogEntry {
            timestamp: Utc::now(),
            level,
            category: self.category,
            message,
            file_path: self.file_path,
            step: self.step,
            cause: self.cause,
        }
    }
}

struct FileSink {
    dir: PathBuf,
    current_path: PathBuf,
    file: Option<tokio::fs::File>,
}

/// Process-wide structured logger, threaded as an explicit dependency
/// (not a global singleton) per the Design Notes.
pub struct Logger {
    ring: Mutex<VecDeque<LogEntry>>,
    sink: tokio::sync::Mutex<FileSink>,
}

impl Logger {
    pub fn new(log_dir: PathBuf) -> Self {
        Self {
            ring: Mutex::new(VecDeque::with_capacity(RING_BUFFER_CAPACITY)),
            sink: tokio::sync::Mutex::new(FileSink {
                dir: log_dir,
                current_path: PathBuf::new(),
                file: None,
            }),
        }
    }

    pub fn builder() -> LogEntryBuilder {
        LogEntryBuilder::default()
    }

    pub async fn warn(&self, builder: LogEntryBuilder, message: impl Into<String>) {
        self.log(builder.build(Level::Warn, message.into())).await
    }

    pub async fn info(&self, builder: LogEntryBuilder, message: impl Into<String>) {
        self.log(builder.build(Level::Info, message.into())).await
    }

    pub async fn debug(&self, builder: LogEntryBuilder, message: impl Into<String>) {
        self.log(builder.build(Level::Debug, message.into())).await
    }

    async fn log(&self, entry: LogEntry) {
        match entry.level {
            Level::Warn => tracing::warn!("{}", entry),
            Level::Info => tracing::info!("{}", entry),
            Level::Debug => tracing::debug!("{}", entry),
        }

        {
            let mut ring = self.ring.lock().unwrap();
            if ring.len() == RING_BUFFER_CAPACITY {
                ring.pop_front();
            }
            ring.push_back(entry.clone());
        }

        if let Err(err) = self.write_to_file(&entry).await {
            tracing::warn!("failed to write log entry to file: {err}");
        }
    }

    async fn write_to_file(&self, entry: &LogEntry) -> Result<()> {
        let mut sink = self.sink.lock().await;
        let today_path = sink.dir.join(format!("{}.log", Utc::now().format("%Y-%m-%d")));

        if sink.file.is_none() || sink.current_path != today_path {
            tokio::fs::create_dir_all(&sink.dir).await?;
            let file = tokio::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(&today_path)
                .await?;
            sink.file = Some(file);
            sink.current_path = today_path.clone();
        }

        rotate_if_needed(&sink.current_path).await?;

        let file = sink.file.as_mut().expect("file sink just populated");
        file.write_all(format!("{entry}\n").as_bytes()).await?;
        file.flush().await?;
        Ok(())
    }

    /// Entries matching all of the given (optional) filters, most recent last.
    pub fn filter(
        &self,
        level: Option<Level>,
        category: Option<&str>,
        file_path_substring: Option<&str>,
    ) -> Vec<LogEntry> {
        self.ring
            .lock()
            .unwrap()
            .iter()
            .filter(|e| level.map_or(true, |l| e.level == l))
            .filter(|e| {
                category.map_or(true, |c| e.category.as_deref() == Some(c))
            })
            .filter(|e| {
                file_path_substring.map_or(true, |needle| {
                    e.file_path.as_deref().is_some_and(|p| p.contains(needle))
                })
            })
            .cloned()
            .collect()
    }

    /// Export the full in-memory buffer to a user-chosen path.
    pub async fn export(&self, path: &Path) -> Result<()> {
        let lines: Vec<String> = self
            .ring
            .lock()
            .unwrap()
            .iter()
            .map(|e| e.to_string())
            .collect();
        tokio::fs::write(path, lines.join("\n")).await?;
        Ok(())
    }
}

/// Renames `path` to `path.N.log` if it has grown past the rotation
/// threshold, picking the next free `N`, then lets the caller reopen fresh.
async fn rotate_if_needed(path: &Path) -> Result<()> {
    let Ok(metadata) = tokio::fs::metadata(path).await else {
        return Ok(());
    };
    if metadata.len() < MAX_LOG_FILE_BYTES {
        return Ok(());
    }

    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("log")
        .to_string();
    let parent = path.parent().unwrap_or_else(|| Path::new("."));

    let mut n = 1u32;
    loop {
        let candidate = parent.join(format!("{stem}.{n}.log"));
        if !candidate.exists() {
            tokio::fs::rename(path, &candidate).await?;
            break;
        }
        n += 1;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn filters_by_level_and_path() {
        let dir = tempfile::tempdir().unwrap();
        let logger = Logger::new(dir.path().to_path_buf());

        logger
            .warn(
                Logger::builder().category("lyrics").file_path("/m/a.mp3"),
                "lyrics fetch failed",
            )
            .await;
        logger
            .info(Logger::builder().file_path("/m/b.mp3"), "completed")
            .await;

        let warns = logger.filter(Some(Level::Warn), None, None);
        assert_eq!(warns.len(), 1);
        assert_eq!(warns[0].message, "lyrics fetch failed");

        let for_b = logger.filter(None, None, Some("b.mp3"));
        assert_eq!(for_b.len(), 1);
    }

    #[tokio::test]
    async fn writes_formatted_line_to_file() {
        let dir = tempfile::tempdir().unwrap();
        let logger = Logger::new(dir.path().to_path_buf());
        logger
            .info(
                Logger::builder().step("writing_tags").file_path("/m/a.mp3"),
                "wrote tags",
            )
            .await;

        let today = Utc::now().format("%Y-%m-%d");
        let contents = tokio::fs::read_to_string(dir.path().join(format!("{today}.log")))
            .await
            .unwrap();
        assert!(contents.contains("wrote tags"));
        assert!(contents.contains("filePath: /m/a.mp3"));
        assert!(contents.contains("step: writing_tags"));
    }
}
