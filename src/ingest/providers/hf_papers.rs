// src/ingest/providers/hf_papers.rs
//! Hugging Face daily papers: listing page + one detail page per unseen paper.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use crate::error::FetchError;
use crate::ingest::normalize_text;
use crate::ingest::types::{Candidate, PageSource, SourceProvider};

const MAX_AUTHORS: usize = 5;

static RE_ARTICLE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?is)<article\b[^>]*>(.*?)</article>").unwrap());
static RE_TITLE_LINK: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?is)<h3\b[^>]*>.*?<a\b[^>]*href="(/papers/[^"]+)"[^>]*>(.*?)</a>"#).unwrap()
});
static RE_SPAN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(?is)<span\b[^>]*class="([^"]*)"[^>]*>(.*?)</span>"#).unwrap());
static RE_SUMMARY: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?is)<div[^>]*class="[^"]*pb-8 pr-4 md:pr-16[^"]*"[^>]*>(.*?)</div>"#).unwrap()
});
static RE_ABSTRACT_H2: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)<h2[^>]*>\s*Abstract\s*</h2>").unwrap());
static RE_PARAGRAPH: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?is)<p\b[^>]*>(.*?)</p>").unwrap());
static RE_AUTHORS: Lazy<Regex> = Lazy::new(|| Regex::new(r#"(?s)"authors":\s*\[(.*?)\]"#).unwrap());
static RE_NAME: Lazy<Regex> = Lazy::new(|| Regex::new(r#""name":\s*"([^"]+)""#).unwrap());
static RE_PUBLISHED: Lazy<Regex> = Lazy::new(|| Regex::new(r#""publishedAt":\s*"([^"]+)""#).unwrap());
static RE_ARXIV_ID: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d{4}\.\d{4,5}$").unwrap());

/// One `<article>` of the listing page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListingEntry {
    pub id: String,
    pub title: String,
    pub link: String,
    pub institution: Option<String>,
}

/// Fields taken from a paper's detail page.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PaperDetails {
    pub summary: Option<String>,
    pub abstract_full: String,
    pub authors: Vec<String>,
    pub published_at: Option<DateTime<Utc>>,
}

/// Parse the listing into entries, in page order. `origin` is e.g. `https://huggingface.co`.
pub fn parse_listing(html: &str, origin: &str) -> Vec<ListingEntry> {
    let mut out = Vec::new();
    for art in RE_ARTICLE.captures_iter(html) {
        let body = &art[1];
        let Some(tl) = RE_TITLE_LINK.captures(body) else {
            continue;
        };
        let href = &tl[1];
        let title = normalize_text(&tl[2]);
        let Some(id) = paper_id_from_href(href) else {
            continue;
        };
        if title.is_empty() {
            continue;
        }

        // Institution span lives outside the <h3>.
        let heading = tl.get(0).map(|m| m.range()).unwrap_or(0..0);
        let outside = format!("{}{}", &body[..heading.start], &body[heading.end..]);
        let institution = RE_SPAN
            .captures_iter(&outside)
            .find(|c| c[1].contains("truncate") && c[1].contains("font-medium"))
            .map(|c| normalize_text(&c[2]))
            .filter(|s| !s.is_empty() && s != "·" && s != ".");

        out.push(ListingEntry {
            link: format!("{origin}/papers/{id}"),
            id,
            title,
            institution,
        });
    }
    out
}

/// `/papers/2510.12345?x` -> `2510.12345`
pub fn paper_id_from_href(href: &str) -> Option<String> {
    let rest = href.strip_prefix("/papers/")?;
    let id = rest.split(['?', '#', '/']).next().unwrap_or_default().trim();
    if id.is_empty() {
        None
    } else {
        Some(id.to_string())
    }
}

/// Extract summary, full abstract, authors and publish date from a detail page.
///
/// A page with neither an abstract nor a summary is a parse error: admitting it would
/// freeze an empty core into the store.
pub fn parse_details(html: &str, url: &str) -> Result<PaperDetails, FetchError> {
    let summary = RE_SUMMARY
        .captures(html)
        .map(|c| normalize_text(&c[1]))
        .filter(|s| !s.is_empty());

    let abstract_full = RE_ABSTRACT_H2
        .find(html)
        .and_then(|h2| {
            let rest = &html[h2.end()..];
            let section = match rest.find("<h2") {
                Some(end) => &rest[..end],
                None => rest,
            };
            // First paragraph is the AI summary teaser; the abstract is the second.
            RE_PARAGRAPH.captures_iter(section).nth(1).map(|c| {
                let text = normalize_text(&c[1]);
                text.strip_prefix("AI-generated summary")
                    .map(|s| s.trim_start().to_string())
                    .unwrap_or(text)
            })
        })
        .filter(|s| !s.is_empty())
        .or_else(|| summary.clone())
        .ok_or_else(|| FetchError::Parse {
            url: url.to_string(),
            reason: "detail page has no abstract or summary".to_string(),
        })?;

    let decoded = html.replace("&quot;", "\"");
    let authors = RE_AUTHORS
        .captures(&decoded)
        .map(|c| {
            RE_NAME
                .captures_iter(&c[1])
                .map(|n| n[1].trim().to_string())
                .filter(|n| !n.is_empty())
                .take(MAX_AUTHORS)
                .collect()
        })
        .unwrap_or_default();

    let published_at = RE_PUBLISHED
        .captures(&decoded)
        .and_then(|c| DateTime::parse_from_rfc3339(&c[1]).ok())
        .map(|d| d.with_timezone(&Utc));

    Ok(PaperDetails {
        summary,
        abstract_full,
        authors,
        published_at,
    })
}

/// arXiv abs/pdf links for arXiv-style ids.
pub fn arxiv_links(id: &str) -> (Option<String>, Option<String>) {
    if RE_ARXIV_ID.is_match(id) {
        (
            Some(format!("https://arxiv.org/abs/{id}")),
            Some(format!("https://arxiv.org/pdf/{id}.pdf")),
        )
    } else {
        (None, None)
    }
}

fn candidate_from(entry: ListingEntry, details: Option<PaperDetails>) -> Candidate {
    let (arxiv_abs, arxiv_pdf) = arxiv_links(&entry.id);
    let d = details.unwrap_or_default();
    Candidate {
        id: entry.id,
        title: entry.title,
        abstract_original: d.abstract_full,
        summary: d.summary,
        institution: entry.institution,
        authors: d.authors,
        link: entry.link,
        arxiv_abs,
        arxiv_pdf,
        published_at: d.published_at,
    }
}

pub struct HfPapersProvider {
    base_url: String,
    origin: String,
    pages: Arc<dyn PageSource>,
    max_papers: usize,
    max_workers: usize,
}

impl HfPapersProvider {
    pub fn new(base_url: &str, pages: Arc<dyn PageSource>) -> Self {
        let origin = reqwest::Url::parse(base_url)
            .map(|u| u.origin().ascii_serialization())
            .unwrap_or_else(|_| "https://huggingface.co".to_string());
        Self {
            base_url: base_url.to_string(),
            origin,
            pages,
            max_papers: 100,
            max_workers: 5,
        }
    }

    pub fn with_max_papers(mut self, n: usize) -> Self {
        self.max_papers = n.max(1);
        self
    }

    pub fn with_max_workers(mut self, n: usize) -> Self {
        self.max_workers = n.max(1);
        self
    }
}

#[async_trait]
impl SourceProvider for HfPapersProvider {
    async fn fetch_latest(&self, known: &HashSet<String>) -> Result<Vec<Candidate>, FetchError> {
        let html = self.pages.get(&self.base_url).await?;
        let mut entries = parse_listing(&html, &self.origin);
        if entries.is_empty() {
            return Err(FetchError::Parse {
                url: self.base_url.clone(),
                reason: "no paper entries found".to_string(),
            });
        }
        entries.truncate(self.max_papers);

        let sem = Arc::new(Semaphore::new(self.max_workers));
        let mut tasks = JoinSet::new();
        let mut slots: Vec<Option<Candidate>> = vec![None; entries.len()];

        for (idx, entry) in entries.into_iter().enumerate() {
            if known.contains(&entry.id) {
                tracing::debug!(id = %entry.id, "known paper, skipping detail page");
                slots[idx] = Some(candidate_from(entry, None));
                continue;
            }
            let pages = Arc::clone(&self.pages);
            let sem = Arc::clone(&sem);
            tasks.spawn(async move {
                let _permit = sem.acquire_owned().await;
                let res = match pages.get(&entry.link).await {
                    Ok(html) => parse_details(&html, &entry.link),
                    Err(e) => Err(e),
                };
                (idx, entry, res)
            });
        }

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((idx, entry, Ok(details))) => {
                    slots[idx] = Some(candidate_from(entry, Some(details)));
                }
                Ok((_, entry, Err(e))) => {
                    tracing::warn!(id = %entry.id, error = %e, "detail page failed; paper deferred to next run");
                }
                Err(e) => {
                    tracing::warn!(error = %e, "detail task aborted");
                }
            }
        }

        Ok(slots.into_iter().flatten().collect())
    }

    fn name(&self) -> &'static str {
        "HuggingFacePapers"
    }
}
