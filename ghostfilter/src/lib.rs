pub mod config;
pub mod defaults;
pub mod errors;
pub mod filter;
pub mod results;
pub mod rules;
pub mod sink;
pub mod stats;

pub use config::{CliOverrides, FilterConfig, OutputFormat};
pub use errors::{FilterError, FilterResult, Stage};
pub use filter::{classify, run, PipelineFailure, PipelineOptions, Verdict};
pub use results::PipelineResult;
pub use rules::{Rule, RuleKind, RuleSet};
pub use sink::{JsonSink, LineSink, ResultSink};
pub use stats::{RuleStats, StatsAggregator};
