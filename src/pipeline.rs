// src/pipeline.rs
//! One complete run: load state, fetch, reconcile, render, persist.
//!
//! Fatal errors return before anything is written. The store is persisted before the
//! feed document, so a failed store write leaves the published feed untouched.

use chrono::{DateTime, Utc};
use metrics::{describe_gauge, gauge};
use once_cell::sync::OnceCell;
use std::collections::HashSet;
use std::time::{Duration, Instant};

use crate::config::FeedConfig;
use crate::error::RunError;
use crate::feed;
use crate::ingest::{self, types::SourceProvider};
use crate::reconcile;
use crate::store;
use crate::translate::{DynTranslator, Enricher, TranslationCache, TranslationFailure};

fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_gauge!("feed_last_run_ts", "Unix time of the last successful run.");
    });
}

/// What a run did, for the closing log line and for callers.
#[derive(Debug, Default)]
pub struct RunSummary {
    /// Items in the rendered document.
    pub rendered: usize,
    pub admitted: Vec<String>,
    pub evicted: Vec<String>,
    pub translated: usize,
    pub cache_hits: usize,
    pub translation_failures: Vec<TranslationFailure>,
    /// Size of the written document in bytes.
    pub bytes: usize,
    pub elapsed: Duration,
}

pub async fn run(
    config: &FeedConfig,
    provider: &dyn SourceProvider,
    translator: DynTranslator,
    now: DateTime<Utc>,
) -> Result<RunSummary, RunError> {
    ensure_metrics_described();
    let t0 = Instant::now();

    let existing = store::load(&config.state_file)?;
    let known: HashSet<String> = existing.iter().map(|i| i.id.clone()).collect();

    let candidates = ingest::run_once(provider, &known).await?;

    let mut enricher = Enricher::new(translator, TranslationCache::from_items(&existing))
        .with_policy(config.retry_policy())
        .with_max_workers(config.max_workers);

    let outcome = reconcile::reconcile(
        existing,
        candidates,
        &mut enricher,
        &config.target_languages,
        now,
        config.max_items,
    )
    .await;

    let xml = feed::render(&outcome.items, &config.feed_meta(), now)?;

    store::save(&config.state_file, &outcome.items, now)?;
    store::write_atomic(&config.output_path, xml.as_bytes())?;
    tracing::info!(path = %config.output_path.display(), bytes = xml.len(), "feed written");

    gauge!("feed_last_run_ts").set(now.timestamp() as f64);

    let summary = RunSummary {
        rendered: outcome.items.len(),
        admitted: outcome.admitted,
        evicted: outcome.evicted,
        translated: outcome.enrich.translated,
        cache_hits: outcome.enrich.cache_hits,
        translation_failures: outcome.enrich.failures,
        bytes: xml.len(),
        elapsed: t0.elapsed(),
    };
    log_summary(&summary);
    Ok(summary)
}

fn log_summary(s: &RunSummary) {
    for f in &s.translation_failures {
        tracing::warn!(id = %f.item_id, field = %f.field, lang = %f.lang, error = %f.error, "left untranslated this run");
    }
    tracing::info!(
        target: "pipeline",
        rendered = s.rendered,
        admitted = s.admitted.len(),
        evicted = s.evicted.len(),
        translated = s.translated,
        cache_hits = s.cache_hits,
        translation_failures = s.translation_failures.len(),
        bytes = s.bytes,
        elapsed_ms = s.elapsed.as_millis() as u64,
        "run complete"
    );
}
