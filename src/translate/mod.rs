// src/translate/mod.rs
//! Translation backend abstraction, retry, the in-run translation index and the
//! enricher that fills missing abstract and summary translations with bounded
//! concurrency.

pub mod google;

use async_trait::async_trait;
use metrics::{counter, describe_counter};
use once_cell::sync::OnceCell;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use crate::error::TranslationError;
use crate::item::{Field, Item};

// ------------------------------------------------------------
// Public surface
// ------------------------------------------------------------

/// Text-in/text-out translation backend.
#[async_trait]
pub trait Translator: Send + Sync {
    async fn translate(&self, text: &str, lang: &str) -> Result<String, TranslationError>;
    /// Backend name for diagnostics.
    fn name(&self) -> &'static str;
}

pub type DynTranslator = Arc<dyn Translator>;

/// An (item, field, language) triple that ended without a translation.
#[derive(Debug, Clone)]
pub struct TranslationFailure {
    pub item_id: String,
    pub field: Field,
    pub lang: String,
    pub error: TranslationError,
}

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base: Duration::from_millis(500),
        }
    }
}

impl RetryPolicy {
    fn delay(&self, attempt: u32) -> Duration {
        self.base.saturating_mul(1u32 << (attempt.saturating_sub(1)).min(10))
    }
}

fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!(
            "translation_requests_total",
            "Backend translation calls, retries included."
        );
        describe_counter!(
            "translation_failures_total",
            "(item, field, language) triples left untranslated."
        );
        describe_counter!(
            "translation_cache_hits_total",
            "Translations copied from another stored copy of the same paper."
        );
    });
}

/// Call the backend, retrying transient errors with exponential backoff.
pub async fn translate_with_retry(
    translator: &dyn Translator,
    text: &str,
    lang: &str,
    policy: RetryPolicy,
) -> Result<String, TranslationError> {
    let max = policy.max_attempts.max(1);
    let mut attempt: u32 = 0;
    loop {
        attempt += 1;
        counter!("translation_requests_total").increment(1);
        match translator.translate(text, lang).await {
            Ok(out) if !out.trim().is_empty() => return Ok(out),
            Ok(_) => return Err(TranslationError::Empty),
            Err(e) if e.is_transient() && attempt < max => {
                tracing::warn!(lang, attempt, max, error = %e, "translation attempt failed, retrying");
                tokio::time::sleep(policy.delay(attempt)).await;
            }
            Err(e) => return Err(e),
        }
    }
}

// ------------------------------------------------------------
// Cache
// ------------------------------------------------------------

type CacheKey = (String, Field, String);

/// In-run index of (item id, field, language) -> translated text.
///
/// Seeded from every loaded item, so when a store holds the same id twice the copy
/// that survives the merge can pick up translations only the other copy carries.
/// Fresh backend results are added as they arrive.
#[derive(Debug, Default)]
pub struct TranslationCache {
    entries: HashMap<CacheKey, String>,
}

impl TranslationCache {
    pub fn from_items(items: &[Item]) -> Self {
        let mut cache = Self::default();
        for it in items {
            for field in Field::ALL {
                for (lang, text) in it.translations(field) {
                    cache.insert(&it.id, field, lang, text.clone());
                }
            }
        }
        cache
    }

    pub fn get(&self, id: &str, field: Field, lang: &str) -> Option<&str> {
        self.entries
            .get(&(id.to_string(), field, lang.to_string()))
            .map(String::as_str)
    }

    pub fn insert(&mut self, id: &str, field: Field, lang: &str, text: String) {
        self.entries.insert((id.to_string(), field, lang.to_string()), text);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

// ------------------------------------------------------------
// Enricher
// ------------------------------------------------------------

#[derive(Debug, Default)]
pub struct EnrichReport {
    pub translated: usize,
    pub cache_hits: usize,
    pub failures: Vec<TranslationFailure>,
}

impl EnrichReport {
    pub fn absorb(&mut self, other: EnrichReport) {
        self.translated += other.translated;
        self.cache_hits += other.cache_hits;
        self.failures.extend(other.failures);
    }
}

pub struct Enricher {
    translator: DynTranslator,
    policy: RetryPolicy,
    max_workers: usize,
    cache: TranslationCache,
}

impl Enricher {
    pub fn new(translator: DynTranslator, cache: TranslationCache) -> Self {
        Self {
            translator,
            policy: RetryPolicy::default(),
            max_workers: 5,
            cache,
        }
    }

    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_max_workers(mut self, n: usize) -> Self {
        self.max_workers = n.max(1);
        self
    }

    pub fn cache(&self) -> &TranslationCache {
        &self.cache
    }

    /// Fill every requested language missing on `item`.
    pub async fn ensure_translated(
        &mut self,
        item: Item,
        languages: &[String],
    ) -> (Item, Vec<TranslationFailure>) {
        let mut one = [item];
        let report = self.enrich(&mut one, languages).await;
        let [item] = one;
        (item, report.failures)
    }

    /// Fill missing translations on all `items`. Backend calls run concurrently, at
    /// most `max_workers` at a time; results are applied after every call finished.
    pub async fn enrich(&mut self, items: &mut [Item], languages: &[String]) -> EnrichReport {
        ensure_metrics_described();
        let mut report = EnrichReport::default();

        // (item index, field, lang) triples that need the backend
        let mut jobs: Vec<(usize, Field, String)> = Vec::new();
        for (idx, item) in items.iter_mut().enumerate() {
            for field in Field::ALL {
                if item.source_text(field).is_none() {
                    continue;
                }
                let missing: Vec<String> = item
                    .missing_languages(field, languages)
                    .into_iter()
                    .map(str::to_string)
                    .collect();
                for lang in missing {
                    if let Some(hit) = self.cache.get(&item.id, field, &lang) {
                        item.add_translation(field, &lang, hit.to_string());
                        report.cache_hits += 1;
                        tracing::debug!(id = %item.id, %field, lang = %lang, "translation cache hit");
                    } else {
                        jobs.push((idx, field, lang));
                    }
                }
            }
        }
        counter!("translation_cache_hits_total").increment(report.cache_hits as u64);

        if jobs.is_empty() {
            return report;
        }

        let mut pending: BTreeSet<(usize, Field, String)> = jobs.iter().cloned().collect();
        let sem = Arc::new(Semaphore::new(self.max_workers));
        let mut set = JoinSet::new();
        for (idx, field, lang) in jobs {
            let translator = Arc::clone(&self.translator);
            let sem = Arc::clone(&sem);
            let text = items[idx].source_text(field).unwrap_or_default().to_string();
            let policy = self.policy;
            set.spawn(async move {
                let _permit = sem.acquire_owned().await;
                let res = translate_with_retry(translator.as_ref(), &text, &lang, policy).await;
                (idx, field, lang, res)
            });
        }

        let mut done: Vec<(usize, Field, String, Result<String, TranslationError>)> =
            Vec::new();
        let mut abort_reason = String::from("task cancelled");
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok((idx, field, lang, res)) => {
                    pending.remove(&(idx, field, lang.clone()));
                    done.push((idx, field, lang, res));
                }
                Err(e) => {
                    tracing::warn!(error = %e, "translation task aborted");
                    abort_reason = e.to_string();
                }
            }
        }
        // Jobs whose task never returned still count as failures.
        for (idx, field, lang) in pending {
            done.push((idx, field, lang, Err(TranslationError::Aborted(abort_reason.clone()))));
        }
        // Deterministic application order regardless of completion order.
        done.sort_by(|a, b| (a.0, a.1, &a.2).cmp(&(b.0, b.1, &b.2)));

        for (idx, field, lang, res) in done {
            let id = items[idx].id.clone();
            match res {
                Ok(text) => {
                    self.cache.insert(&id, field, &lang, text.clone());
                    items[idx].add_translation(field, &lang, text);
                    report.translated += 1;
                }
                Err(error) => {
                    tracing::warn!(id = %id, %field, lang = %lang, error = %error, "translation failed; item kept without it");
                    counter!("translation_failures_total").increment(1);
                    report.failures.push(TranslationFailure {
                        item_id: id,
                        field,
                        lang,
                        error,
                    });
                }
            }
        }
        report
    }
}

// ------------------------------------------------------------
// Test double
// ------------------------------------------------------------

/// Deterministic backend: answers `"[lang] text"`, can fail chosen languages or
/// texts and count calls.
#[derive(Default)]
pub struct MockTranslator {
    fail_langs: HashSet<String>,
    fail_texts: Vec<String>,
    transient_failures: AtomicUsize,
    calls: AtomicUsize,
}

impl MockTranslator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every call for these languages fails with a non-transient error.
    pub fn failing_for(langs: &[&str]) -> Self {
        Self {
            fail_langs: langs.iter().map(|s| s.to_string()).collect(),
            ..Self::default()
        }
    }

    /// Every call whose text contains one of `needles` fails with a non-transient error.
    pub fn failing_on_text(needles: &[&str]) -> Self {
        Self {
            fail_texts: needles.iter().map(|s| s.to_string()).collect(),
            ..Self::default()
        }
    }

    /// The first `n` calls fail with a transport error.
    pub fn flaky(n: usize) -> Self {
        Self {
            transient_failures: AtomicUsize::new(n),
            ..Self::default()
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Translator for MockTranslator {
    async fn translate(&self, text: &str, lang: &str) -> Result<String, TranslationError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let left = self
            .transient_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
        if left.is_ok() {
            return Err(TranslationError::Transport("simulated timeout".into()));
        }
        if self.fail_langs.contains(lang) || self.fail_texts.iter().any(|n| text.contains(n.as_str())) {
            return Err(TranslationError::Status(400));
        }
        Ok(format!("[{lang}] {text}"))
    }

    fn name(&self) -> &'static str {
        "mock"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use crate::ingest::types::Candidate;

    fn item(id: &str) -> Item {
        let now = Utc.with_ymd_and_hms(2025, 10, 1, 8, 0, 0).unwrap();
        Item::admit(
            Candidate {
                id: id.into(),
                title: id.into(),
                abstract_original: format!("abstract of {id}"),
                link: format!("https://huggingface.co/papers/{id}"),
                ..Candidate::default()
            },
            now,
        )
    }

    fn fast() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 3,
            base: Duration::from_millis(1),
        }
    }

    fn langs(v: &[&str]) -> Vec<String> {
        v.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn fills_all_missing_languages() {
        let mock = Arc::new(MockTranslator::new());
        let mut enricher = Enricher::new(mock.clone(), TranslationCache::default()).with_policy(fast());
        let (it, failures) = enricher.ensure_translated(item("a"), &langs(&["zh-CN", "ja"])).await;
        assert!(failures.is_empty());
        assert_eq!(it.abstract_translations["zh-CN"], "[zh-CN] abstract of a");
        assert_eq!(it.abstract_translations["ja"], "[ja] abstract of a");
        assert_eq!(mock.calls(), 2);
    }

    #[tokio::test]
    async fn present_translations_are_not_requested_again() {
        let mock = Arc::new(MockTranslator::new());
        let mut enricher = Enricher::new(mock.clone(), TranslationCache::default()).with_policy(fast());
        let mut it = item("a");
        it.add_translation(Field::Abstract, "zh-CN", "cached".into());
        let (it, _) = enricher.ensure_translated(it, &langs(&["zh-CN"])).await;
        assert_eq!(it.abstract_translations["zh-CN"], "cached");
        assert_eq!(mock.calls(), 0);
    }

    #[tokio::test]
    async fn cache_serves_without_backend_call() {
        let mock = Arc::new(MockTranslator::new());
        let mut cache = TranslationCache::default();
        cache.insert("a", Field::Abstract, "ja", "from cache".into());
        let mut enricher = Enricher::new(mock.clone(), cache).with_policy(fast());
        let mut items = vec![item("a")];
        let report = enricher.enrich(&mut items, &langs(&["ja"])).await;
        assert_eq!(report.cache_hits, 1);
        assert_eq!(items[0].abstract_translations["ja"], "from cache");
        assert_eq!(mock.calls(), 0);
    }

    #[tokio::test]
    async fn failed_language_is_left_absent() {
        let mock = Arc::new(MockTranslator::failing_for(&["ja"]));
        let mut enricher = Enricher::new(mock, TranslationCache::default()).with_policy(fast());
        let (it, failures) = enricher.ensure_translated(item("a"), &langs(&["zh-CN", "ja"])).await;
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].lang, "ja");
        assert_eq!(failures[0].field, Field::Abstract);
        assert!(it.abstract_translations.contains_key("zh-CN"));
        assert!(!it.abstract_translations.contains_key("ja"));
    }

    #[tokio::test]
    async fn transient_errors_are_retried() {
        let mock = MockTranslator::flaky(2);
        let out = translate_with_retry(&mock, "hi", "ja", fast()).await.unwrap();
        assert_eq!(out, "[ja] hi");
        assert_eq!(mock.calls(), 3);
    }

    #[tokio::test]
    async fn retries_are_bounded() {
        let mock = MockTranslator::flaky(10);
        let err = translate_with_retry(&mock, "hi", "ja", fast()).await.unwrap_err();
        assert!(matches!(err, TranslationError::Transport(_)));
        assert_eq!(mock.calls(), 3);
    }

    #[tokio::test]
    async fn non_transient_errors_fail_fast() {
        let mock = MockTranslator::failing_for(&["ja"]);
        let _ = translate_with_retry(&mock, "hi", "ja", fast()).await;
        assert_eq!(mock.calls(), 1);
    }

    #[tokio::test]
    async fn empty_abstract_is_not_sent() {
        let mock = Arc::new(MockTranslator::new());
        let mut enricher = Enricher::new(mock.clone(), TranslationCache::default());
        let mut it = item("a");
        it.abstract_original = "   ".into();
        let (it, failures) = enricher.ensure_translated(it, &langs(&["ja"])).await;
        assert!(failures.is_empty());
        assert!(it.abstract_translations.is_empty());
        assert_eq!(mock.calls(), 0);
    }

    #[tokio::test]
    async fn summary_is_translated_alongside_abstract() {
        let mock = Arc::new(MockTranslator::new());
        let mut enricher = Enricher::new(mock.clone(), TranslationCache::default()).with_policy(fast());
        let mut it = item("a");
        it.summary = Some("short teaser".into());
        let (it, failures) = enricher.ensure_translated(it, &langs(&["zh-CN"])).await;
        assert!(failures.is_empty());
        assert_eq!(it.abstract_translations["zh-CN"], "[zh-CN] abstract of a");
        assert_eq!(it.summary_translations["zh-CN"], "[zh-CN] short teaser");
        assert_eq!(mock.calls(), 2);
    }

    #[tokio::test]
    async fn summary_failure_leaves_abstract_translation_intact() {
        let mock = Arc::new(MockTranslator::failing_on_text(&["teaser"]));
        let mut enricher = Enricher::new(mock, TranslationCache::default()).with_policy(fast());
        let mut it = item("a");
        it.summary = Some("short teaser".into());
        let (it, failures) = enricher.ensure_translated(it, &langs(&["zh-CN"])).await;
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].field, Field::Summary);
        assert!(it.abstract_translations.contains_key("zh-CN"));
        assert!(it.summary_translations.is_empty());
    }

    struct PanickingTranslator;

    #[async_trait]
    impl Translator for PanickingTranslator {
        async fn translate(&self, _text: &str, lang: &str) -> Result<String, TranslationError> {
            if lang == "ja" {
                panic!("backend blew up");
            }
            Ok(format!("[{lang}] ok"))
        }

        fn name(&self) -> &'static str {
            "panicking"
        }
    }

    #[tokio::test]
    async fn aborted_task_is_reported_as_failure() {
        let mut enricher = Enricher::new(Arc::new(PanickingTranslator), TranslationCache::default())
            .with_policy(fast());
        let mut items = vec![item("a")];
        let report = enricher.enrich(&mut items, &langs(&["zh-CN", "ja"])).await;
        assert_eq!(report.translated, 1);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].item_id, "a");
        assert_eq!(report.failures[0].lang, "ja");
        assert!(matches!(report.failures[0].error, TranslationError::Aborted(_)));
        assert!(!items[0].abstract_translations.contains_key("ja"));
    }

    #[test]
    fn cache_is_seeded_from_every_stored_copy() {
        let mut a = item("a");
        a.add_translation(Field::Summary, "ja", "summary ja".into());
        let mut other = item("a");
        other.add_translation(Field::Abstract, "zh-CN", "abstract zh".into());
        let cache = TranslationCache::from_items(&[a, other]);
        assert_eq!(cache.len(), 2);
        assert_eq!(cache.get("a", Field::Summary, "ja"), Some("summary ja"));
        assert_eq!(cache.get("a", Field::Abstract, "zh-CN"), Some("abstract zh"));
        assert_eq!(cache.get("a", Field::Abstract, "ja"), None);
    }
}
