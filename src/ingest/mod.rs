// src/ingest/mod.rs
pub mod pages;
pub mod providers;
pub mod types;

use crate::error::FetchError;
use crate::ingest::types::{Candidate, SourceProvider};
use metrics::{counter, describe_counter, describe_histogram, histogram};
use once_cell::sync::OnceCell;
use std::collections::HashSet;

/// One-time metrics registration (so series show up in the exposition).
fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("feed_candidates_total", "Candidates returned by the source.");
        describe_counter!("fetch_errors_total", "Listing fetch/parse failures.");
        describe_histogram!("fetch_duration_ms", "Listing fetch time in milliseconds.");
    });
}

/// Normalize a scraped HTML fragment: strip tags, decode entities, fold whitespace.
pub fn normalize_text(s: &str) -> String {
    // 1) Strip HTML tags (before decoding, so `&lt;` in prose survives)
    static RE_TAGS: OnceCell<regex::Regex> = OnceCell::new();
    let re_tags = RE_TAGS.get_or_init(|| regex::Regex::new(r"(?is)</?[a-z!][^>]*>").unwrap());
    let out = re_tags.replace_all(s, "");

    // 2) HTML entity decode
    let out = html_escape::decode_html_entities(&out).to_string();

    // 3) Collapse whitespace (incl. NBSP)
    static RE_WS: OnceCell<regex::Regex> = OnceCell::new();
    let re_ws = RE_WS.get_or_init(|| regex::Regex::new(r"\s+").unwrap());
    re_ws.replace_all(&out, " ").trim().to_string()
}

/// Drop repeated ids inside one listing; first occurrence wins.
pub fn dedup_candidates(raw: Vec<Candidate>) -> (Vec<Candidate>, usize) {
    let mut seen: HashSet<String> = HashSet::with_capacity(raw.len());
    let mut keep = Vec::with_capacity(raw.len());
    let mut dropped = 0usize;
    for c in raw {
        if seen.insert(c.id.clone()) {
            keep.push(c);
        } else {
            dropped += 1;
        }
    }
    (keep, dropped)
}

/// Fetch the listing once. Any provider error is fatal for the run.
pub async fn run_once(
    provider: &dyn SourceProvider,
    known: &HashSet<String>,
) -> Result<Vec<Candidate>, FetchError> {
    ensure_metrics_described();

    let t0 = std::time::Instant::now();
    let raw = match provider.fetch_latest(known).await {
        Ok(v) => v,
        Err(e) => {
            tracing::error!(error = %e, provider = provider.name(), "listing fetch failed");
            counter!("fetch_errors_total").increment(1);
            return Err(e);
        }
    };
    histogram!("fetch_duration_ms").record(t0.elapsed().as_secs_f64() * 1_000.0);

    let (kept, dup) = dedup_candidates(raw);
    counter!("feed_candidates_total").increment(kept.len() as u64);
    tracing::info!(
        target: "ingest",
        provider = provider.name(),
        candidates = kept.len(),
        duplicates = dup,
        "listing fetched"
    );
    Ok(kept)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_text_strips_tags_and_folds_ws() {
        let s = "  <p>Hello,&nbsp;&nbsp; <b>world</b></p>\n ";
        assert_eq!(normalize_text(s), "Hello, world");
    }

    #[test]
    fn escaped_angle_brackets_survive_as_text() {
        assert_eq!(normalize_text("a &lt;b&gt; c"), "a <b> c");
    }

    #[test]
    fn dedup_keeps_first_occurrence() {
        let mk = |id: &str, title: &str| Candidate {
            id: id.into(),
            title: title.into(),
            ..Candidate::default()
        };
        let (kept, dup) = dedup_candidates(vec![mk("a", "first"), mk("b", "b"), mk("a", "second")]);
        assert_eq!(dup, 1);
        assert_eq!(kept.len(), 2);
        assert_eq!(kept[0].title, "first");
    }
}
