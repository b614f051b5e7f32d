// src/ingest/types.rs
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashSet;

use crate::error::FetchError;

/// A paper as scraped in the current run, before reconciliation.
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize, PartialEq, Eq)]
pub struct Candidate {
    pub id: String, // e.g. "2510.12345"
    pub title: String,
    pub abstract_original: String, // empty when the detail page was not fetched
    pub summary: Option<String>,
    pub institution: Option<String>,
    pub authors: Vec<String>,
    pub link: String,
    pub arxiv_abs: Option<String>,
    pub arxiv_pdf: Option<String>,
    pub published_at: Option<DateTime<Utc>>,
}

#[async_trait]
pub trait SourceProvider: Send + Sync {
    /// Current listing. `known` holds ids already stored; providers may skip
    /// detail work for those since stored core fields never change.
    async fn fetch_latest(&self, known: &HashSet<String>) -> Result<Vec<Candidate>, FetchError>;
    fn name(&self) -> &'static str;
}

/// Raw page access used by HTML providers.
#[async_trait]
pub trait PageSource: Send + Sync {
    async fn get(&self, url: &str) -> Result<String, FetchError>;
}
