//! Error types shared by rule construction, configuration loading and the
//! filtering pipeline.
//!
//! Only two places can fail: building a [`RuleSet`](crate::rules::RuleSet)
//! from configuration, and the I/O boundary of a pipeline run (reading the
//! input, writing the sink, writing the report). Classification and
//! statistics are total and never produce an error. An empty result set is
//! a successful run, so there is no "nothing found" variant.
use std::fmt;
use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Result type for filtering operations
pub type FilterResult<T> = Result<T, FilterError>;

/// The part of a run that hit an I/O failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    /// Reading candidate lines from the input
    Producer,
    /// Starting the worker threads
    Workers,
    /// Writing matched candidates to the result sink
    Collector,
    /// Writing the statistics report
    Report,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Producer => "producer",
            Stage::Workers => "workers",
            Stage::Collector => "collector",
            Stage::Report => "report",
        };
        f.write_str(name)
    }
}

/// Errors that can occur while configuring or running a filter
#[derive(Error, Debug)]
pub enum FilterError {
    #[error("Invalid regex pattern '{pattern}': {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },
    #[error("Invalid rule: {0}")]
    InvalidRule(String),
    #[error("Configuration error: {0}")]
    Settings(#[from] config::ConfigError),
    #[error("Input file does not exist: {0}")]
    FileNotFound(PathBuf),
    #[error("IO error in {stage}: {source}")]
    Io {
        stage: Stage,
        #[source]
        source: io::Error,
    },
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl FilterError {
    pub fn invalid_pattern(pattern: impl Into<String>, source: regex::Error) -> Self {
        Self::InvalidPattern {
            pattern: pattern.into(),
            source,
        }
    }

    pub fn invalid_rule(msg: impl Into<String>) -> Self {
        Self::InvalidRule(msg.into())
    }

    pub fn file_not_found(path: impl Into<PathBuf>) -> Self {
        Self::FileNotFound(path.into())
    }

    pub fn io(stage: Stage, source: io::Error) -> Self {
        Self::Io { stage, source }
    }

    /// True for errors raised before any candidate is processed because the
    /// rule set or settings are unusable.
    pub fn is_config_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidPattern { .. } | Self::InvalidRule(_) | Self::Settings(_)
        )
    }

    /// The pipeline stage an I/O error was detected in, if any
    pub fn stage(&self) -> Option<Stage> {
        match self {
            Self::Io { stage, .. } => Some(*stage),
            _ => None,
        }
    }
}
