//! # audiotag-common
//!
//! Shared primitives used by the batch tagging engine:
//! - the pipeline-wide error taxonomy
//! - platform directory resolution and `AppSettings` persistence
//! - the structured, file-rotating logger
//! - a WAL-journaled SQLite pool helper for the persistent caches
//! - small time-parsing helpers

pub mod config;
pub mod db;
pub mod error;
pub mod logging;
pub mod time;

pub use error::{Error, Result};
