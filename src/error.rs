// src/error.rs
//! Error taxonomy for one feed run.
//!
//! `FetchError`, `PersistenceError` and `ConfigError` are fatal and surface through
//! `RunError`. `TranslationError` never aborts a run: it is recorded per
//! (item, language) and the item is admitted without that translation.

use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("request to {url} failed: {source}")]
    Http {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("{url} answered with HTTP {status}")]
    Status { url: String, status: u16 },

    #[error("listing at {url} could not be parsed: {reason}")]
    Parse { url: String, reason: String },

    #[error("page {url} not available")]
    Missing { url: String },
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum TranslationError {
    #[error("translation transport error: {0}")]
    Transport(String),

    #[error("translation backend answered with HTTP {0}")]
    Status(u16),

    #[error("translation backend returned an empty result")]
    Empty,

    #[error("translation response malformed: {0}")]
    Malformed(String),

    #[error("translation task did not finish: {0}")]
    Aborted(String),
}

impl TranslationError {
    /// Whether a retry has a chance of succeeding.
    pub fn is_transient(&self) -> bool {
        match self {
            TranslationError::Transport(_) => true,
            TranslationError::Status(code) => *code == 429 || *code >= 500,
            TranslationError::Empty
            | TranslationError::Malformed(_)
            | TranslationError::Aborted(_) => false,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PersistenceError {
    #[error("reading {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{path} is not a valid feed state: {source}")]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("{path} has state version {found}, expected {expected}")]
    Version {
        path: PathBuf,
        found: u32,
        expected: u32,
    },

    #[error("writing {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("encoding feed state: {0}")]
    Encode(#[source] serde_json::Error),
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("reading config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("parsing config {path}: {source}")]
    Toml {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("{key} has invalid value {value:?}: {reason}")]
    Invalid {
        key: &'static str,
        value: String,
        reason: &'static str,
    },
}

/// Fatal outcome of a run. Anything here means no artifact was published.
#[derive(Debug, thiserror::Error)]
pub enum RunError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Persistence(#[from] PersistenceError),

    #[error("building feed document: {0}")]
    Render(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_classification() {
        assert!(TranslationError::Transport("timeout".into()).is_transient());
        assert!(TranslationError::Status(503).is_transient());
        assert!(TranslationError::Status(429).is_transient());
        assert!(!TranslationError::Status(400).is_transient());
        assert!(!TranslationError::Empty.is_transient());
        assert!(!TranslationError::Malformed("x".into()).is_transient());
        assert!(!TranslationError::Aborted("panicked".into()).is_transient());
    }
}
