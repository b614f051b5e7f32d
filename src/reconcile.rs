// src/reconcile.rs
//! # Reconciliation Engine
//! Folds one run's candidates into the stored feed: dedup by id, first-write-wins on
//! core fields, translations filled in, newest-admitted first, capped at `n_max`.
//!
//! Enrichment runs to completion first; the merge/sort/truncate pass (`merge`) is a
//! single pure step over the complete set.

use chrono::{DateTime, Utc};
use metrics::{counter, describe_counter, describe_gauge, gauge};
use once_cell::sync::OnceCell;
use std::collections::{HashMap, HashSet};

use crate::ingest::types::Candidate;
use crate::item::Item;
use crate::translate::{EnrichReport, Enricher};

fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("feed_admitted_total", "Items admitted to the feed state.");
        describe_counter!("feed_evicted_total", "Items evicted by the size cap.");
        describe_gauge!("feed_store_items", "Items in the feed state after the last run.");
    });
}

/// Result of the pure merge step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Merged {
    /// New authoritative store, newest first, at most `n_max` long.
    pub items: Vec<Item>,
    pub evicted: Vec<Item>,
    /// Repeated ids found in the old store and collapsed.
    pub collapsed: usize,
}

/// Merge admitted items into the existing store.
///
/// `admitted` must be in fetch order; items with equal `first_seen_at` keep that
/// order, and admitted items sort ahead of stored ones with the same timestamp.
pub fn merge(existing: Vec<Item>, admitted: Vec<Item>, n_max: usize) -> Merged {
    let mut all = admitted;
    all.extend(existing);

    // Stable: ties keep their relative order.
    all.sort_by(|a, b| b.first_seen_at.cmp(&a.first_seen_at));

    let mut seen: HashSet<String> = HashSet::with_capacity(all.len());
    let mut items = Vec::with_capacity(all.len());
    let mut collapsed = 0usize;
    for it in all {
        if seen.insert(it.id.clone()) {
            items.push(it);
        } else {
            collapsed += 1;
        }
    }

    let evicted = if items.len() > n_max {
        items.split_off(n_max)
    } else {
        Vec::new()
    };

    Merged {
        items,
        evicted,
        collapsed,
    }
}

/// Position of the copy `merge` keeps for every stored id: the newest `first_seen_at`,
/// earliest position on ties.
fn survivor_index(existing: &[Item]) -> HashMap<String, usize> {
    let mut index: HashMap<String, usize> = HashMap::with_capacity(existing.len());
    for (i, it) in existing.iter().enumerate() {
        index
            .entry(it.id.clone())
            .and_modify(|j| {
                if it.first_seen_at > existing[*j].first_seen_at {
                    *j = i;
                }
            })
            .or_insert(i);
    }
    index
}

/// Admission timestamp for this run: `now`, but never older than the newest stored
/// item, so admission order and `first_seen_at` order cannot disagree.
pub fn admission_time(existing: &[Item], now: DateTime<Utc>) -> DateTime<Utc> {
    match existing.iter().map(|i| i.first_seen_at).max() {
        Some(newest) if newest > now => {
            tracing::warn!(%now, %newest, "clock is behind stored state; admitting at newest stored time");
            newest
        }
        _ => now,
    }
}

#[derive(Debug, Default)]
pub struct Outcome {
    pub items: Vec<Item>,
    pub admitted: Vec<String>,
    pub evicted: Vec<String>,
    pub known: usize,
    pub enrich: EnrichReport,
}

/// One full reconciliation pass: partition, enrich, admit, merge, truncate.
pub async fn reconcile(
    existing: Vec<Item>,
    candidates: Vec<Candidate>,
    enricher: &mut Enricher,
    languages: &[String],
    now: DateTime<Utc>,
    n_max: usize,
) -> Outcome {
    ensure_metrics_described();
    let mut existing = existing;

    // 1) Partition on id. Repeats inside one fetch: first wins.
    let index = survivor_index(&existing);

    let mut fresh: Vec<Candidate> = Vec::new();
    let mut known_idx: Vec<usize> = Vec::new();
    let mut seen: HashSet<String> = HashSet::new();
    for c in candidates {
        if !seen.insert(c.id.clone()) {
            continue;
        }
        match index.get(&c.id) {
            Some(&i) => {
                if c.drifted_from(&existing[i]) {
                    tracing::debug!(id = %c.id, "source content changed for stored paper; keeping first version");
                }
                known_idx.push(i);
            }
            None => fresh.push(c),
        }
    }

    // 2 + 3) Enrich known items still missing languages, and the new ones, in one batch.
    let admit_at = admission_time(&existing, now);
    let mut batch: Vec<Item> = known_idx.iter().map(|&i| existing[i].clone()).collect();
    let n_known = batch.len();
    batch.extend(fresh.into_iter().map(|c| Item::admit(c, admit_at)));

    let report = enricher.enrich(&mut batch, languages).await;

    let admitted = batch.split_off(n_known);
    for (i, refreshed) in known_idx.iter().zip(batch) {
        existing[*i] = refreshed;
    }

    // 4-6) Merge, order, truncate.
    let admitted_ids: Vec<String> = admitted.iter().map(|i| i.id.clone()).collect();
    let merged = merge(existing, admitted, n_max);
    if merged.collapsed > 0 {
        tracing::warn!(collapsed = merged.collapsed, "duplicate ids in stored state collapsed");
    }

    counter!("feed_admitted_total").increment(admitted_ids.len() as u64);
    counter!("feed_evicted_total").increment(merged.evicted.len() as u64);
    gauge!("feed_store_items").set(merged.items.len() as f64);

    tracing::info!(
        target: "reconcile",
        admitted = admitted_ids.len(),
        known = n_known,
        evicted = merged.evicted.len(),
        stored = merged.items.len(),
        "reconciled"
    );

    Outcome {
        items: merged.items,
        evicted: merged.evicted.into_iter().map(|i| i.id).collect(),
        admitted: admitted_ids,
        known: n_known,
        enrich: report,
    }
}
