use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::info;

use crate::rules::RuleSet;

/// Per-rule match counters shared by all workers.
///
/// The only operations are an atomic increment and a snapshot; the
/// underlying map is never handed out.
#[derive(Debug, Default)]
pub struct StatsAggregator {
    counters: DashMap<String, AtomicU64>,
}

impl StatsAggregator {
    /// Creates an empty aggregator
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an aggregator with a zeroed counter for every rule, so
    /// recording a match never needs to insert.
    pub fn for_rules(rules: &RuleSet) -> Self {
        let counters = DashMap::with_capacity(rules.len());
        for id in rules.rule_ids() {
            counters.insert(id.to_string(), AtomicU64::new(0));
        }
        Self { counters }
    }

    /// Counts one match for `rule_id`
    pub fn record_match(&self, rule_id: &str) {
        if let Some(counter) = self.counters.get(rule_id) {
            counter.fetch_add(1, Ordering::Relaxed);
            return;
        }
        self.counters
            .entry(rule_id.to_string())
            .or_insert_with(|| AtomicU64::new(0))
            .fetch_add(1, Ordering::Relaxed);
    }

    /// Copies the current counts, leaving out rules that never fired.
    ///
    /// Exact once every writer has finished.
    pub fn snapshot(&self) -> RuleStats {
        let counts = self
            .counters
            .iter()
            .filter_map(|entry| {
                let count = entry.value().load(Ordering::Relaxed);
                (count > 0).then(|| (entry.key().clone(), count))
            })
            .collect();
        RuleStats { counts }
    }
}

/// Immutable per-rule match counts
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RuleStats {
    counts: BTreeMap<String, u64>,
}

impl RuleStats {
    pub fn get(&self, rule_id: &str) -> Option<u64> {
        self.counts.get(rule_id).copied()
    }

    /// Counts in rule id order
    pub fn iter(&self) -> impl Iterator<Item = (&str, u64)> {
        self.counts.iter().map(|(id, count)| (id.as_str(), *count))
    }

    pub fn len(&self) -> usize {
        self.counts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    /// Sum over all rules. A candidate hitting several rules counts once
    /// per rule.
    pub fn total(&self) -> u64 {
        self.counts.values().sum()
    }

    /// Most frequent rule first, ties broken by rule id
    pub fn ranked(&self) -> Vec<(&str, u64)> {
        let mut ranked: Vec<_> = self.iter().collect();
        ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));
        ranked
    }

    /// Logs the ranked counts
    pub fn log_stats(&self) {
        for (rule, count) in self.ranked() {
            info!("Rule {}: {} matches", rule, count);
        }
    }
}

impl FromIterator<(String, u64)> for RuleStats {
    fn from_iter<T: IntoIterator<Item = (String, u64)>>(iter: T) -> Self {
        let mut counts = BTreeMap::new();
        for (id, count) in iter {
            if count > 0 {
                *counts.entry(id).or_insert(0) += count;
            }
        }
        Self { counts }
    }
}
