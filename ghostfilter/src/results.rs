use serde::Serialize;
use std::time::Duration;

use crate::stats::RuleStats;

/// Final state of one pipeline run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PipelineResult {
    /// Candidates classified by the workers
    pub processed: u64,
    /// Candidates found sensitive
    pub matched: u64,
    /// Sensitive candidates accepted by the sink
    pub written: u64,
    /// Per-rule match counts, rules that never fired left out
    #[serde(rename = "rules")]
    pub stats: RuleStats,
    /// Wall time of the run
    #[serde(skip)]
    pub elapsed: Duration,
}

impl PipelineResult {
    /// True when every sensitive candidate reached the sink
    pub fn is_complete(&self) -> bool {
        self.written == self.matched
    }
}
