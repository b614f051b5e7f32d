// src/item.rs
//! Paper records: the immutable core scraped once, plus the translation maps that
//! are only ever filled in.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::ingest::types::Candidate;

/// Translatable text fields of an item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Field {
    Abstract,
    Summary,
}

impl Field {
    pub const ALL: [Field; 2] = [Field::Abstract, Field::Summary];

    pub fn as_str(self) -> &'static str {
        match self {
            Field::Abstract => "abstract",
            Field::Summary => "summary",
        }
    }
}

impl std::fmt::Display for Field {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One paper admitted to the feed state.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Item {
    pub id: String,
    pub title: String,
    pub abstract_original: String,
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default)]
    pub institution: Option<String>,
    #[serde(default)]
    pub authors: Vec<String>,
    pub link: String,
    #[serde(default)]
    pub arxiv_abs: Option<String>,
    #[serde(default)]
    pub arxiv_pdf: Option<String>,
    /// Source date; display only, never used for ordering.
    #[serde(default)]
    pub published_at: Option<DateTime<Utc>>,
    /// Admission time. Set once.
    pub first_seen_at: DateTime<Utc>,
    /// language tag -> translated abstract
    #[serde(default)]
    pub abstract_translations: BTreeMap<String, String>,
    /// language tag -> translated AI summary
    #[serde(default)]
    pub summary_translations: BTreeMap<String, String>,
}

impl Item {
    /// Turn a fresh candidate into a stored item admitted at `now`.
    pub fn admit(c: Candidate, now: DateTime<Utc>) -> Self {
        Self {
            id: c.id,
            title: c.title,
            abstract_original: c.abstract_original,
            summary: c.summary,
            institution: c.institution,
            authors: c.authors,
            link: c.link,
            arxiv_abs: c.arxiv_abs,
            arxiv_pdf: c.arxiv_pdf,
            published_at: c.published_at,
            first_seen_at: now,
            abstract_translations: BTreeMap::new(),
            summary_translations: BTreeMap::new(),
        }
    }

    /// Source text of `field`, if there is anything to translate.
    pub fn source_text(&self, field: Field) -> Option<&str> {
        let text = match field {
            Field::Abstract => self.abstract_original.as_str(),
            Field::Summary => self.summary.as_deref().unwrap_or_default(),
        };
        Some(text).filter(|t| !t.trim().is_empty())
    }

    pub fn translations(&self, field: Field) -> &BTreeMap<String, String> {
        match field {
            Field::Abstract => &self.abstract_translations,
            Field::Summary => &self.summary_translations,
        }
    }

    fn translations_mut(&mut self, field: Field) -> &mut BTreeMap<String, String> {
        match field {
            Field::Abstract => &mut self.abstract_translations,
            Field::Summary => &mut self.summary_translations,
        }
    }

    /// Requested languages with no translation of `field` yet, in request order.
    pub fn missing_languages<'a>(&self, field: Field, languages: &'a [String]) -> Vec<&'a str> {
        let have = self.translations(field);
        languages
            .iter()
            .map(String::as_str)
            .filter(|l| !have.contains_key(*l))
            .collect()
    }

    /// Adds a translation unless one is already present. Returns whether it was added.
    pub fn add_translation(&mut self, field: Field, lang: &str, text: String) -> bool {
        let map = self.translations_mut(field);
        if map.contains_key(lang) {
            return false;
        }
        map.insert(lang.to_string(), text);
        true
    }
}

impl Candidate {
    /// True when the source now reports different core content for a stored id.
    pub fn drifted_from(&self, stored: &Item) -> bool {
        self.title != stored.title
            || (!self.abstract_original.is_empty()
                && self.abstract_original != stored.abstract_original)
    }
}
