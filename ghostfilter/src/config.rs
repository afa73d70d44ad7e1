use config::{Config as ConfigBuilder, File};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::defaults::{
    owned, DEFAULT_EXCLUDED_EXTENSIONS, DEFAULT_KEYWORDS, DEFAULT_REGEX_PATTERNS,
};
use crate::errors::FilterResult;
use crate::filter::{PipelineOptions, DEFAULT_QUEUE_CAPACITY};
use crate::rules::RuleSet;

/// Encoding of the matched URL list or of the statistics report
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", try_from = "String")]
pub enum OutputFormat {
    /// One entry per line (`rule: count` for statistics)
    Text,
    /// Indented JSON
    Json,
}

impl OutputFormat {
    /// `.json` files get JSON, everything else plain text
    pub fn infer(path: &Path) -> Self {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("json") => OutputFormat::Json,
            _ => OutputFormat::Text,
        }
    }
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "text" | "txt" => Ok(OutputFormat::Text),
            "json" => Ok(OutputFormat::Json),
            other => Err(format!(
                "unknown output format '{}', expected text or json",
                other
            )),
        }
    }
}

impl TryFrom<String> for OutputFormat {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutputFormat::Text => f.write_str("text"),
            OutputFormat::Json => f.write_str("json"),
        }
    }
}

/// Settings for one filtering run.
///
/// Loaded from YAML, in increasing order of precedence:
/// 1. `$CONFIG_DIR/ghostfilter/config.yaml`
/// 2. `.ghostfilter.yaml` in the current directory
/// 3. a file passed with `--config`
///
/// Command-line flags are applied last through [`FilterConfig::merge_with_cli`].
///
/// ```yaml
/// keywords: ["admin", "token"]
/// regex_patterns: ['(?i)/api\b']
/// excluded_extensions: ["png", "css"]
/// input_path: "urls.txt"
/// output_path: "filtered_urls.json"
/// stats_path: "stats.txt"
/// thread_count: 8
/// queue_capacity: 100
/// log_level: "info"
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterConfig {
    /// Case-insensitive substrings that mark a URL as sensitive
    #[serde(default = "default_keywords")]
    pub keywords: Vec<String>,

    /// Regular expressions, compiled case-insensitive
    #[serde(default = "default_regex_patterns")]
    pub regex_patterns: Vec<String>,

    /// Extensions that are never reported (e.g. "png", ".css")
    #[serde(default = "default_excluded_extensions")]
    pub excluded_extensions: Vec<String>,

    /// File with one URL per line
    #[serde(default = "default_input_path")]
    pub input_path: PathBuf,

    /// Where sensitive URLs are written
    #[serde(default = "default_output_path")]
    pub output_path: PathBuf,

    /// Inferred from `output_path` when unset
    #[serde(default)]
    pub output_format: Option<OutputFormat>,

    /// Optional per-rule statistics report
    #[serde(default)]
    pub stats_path: Option<PathBuf>,

    /// Inferred from `stats_path` when unset
    #[serde(default)]
    pub stats_format: Option<OutputFormat>,

    /// Number of worker threads
    /// Defaults to number of CPU cores if not specified
    #[serde(default = "default_thread_count")]
    pub thread_count: NonZeroUsize,

    /// Bound of the candidate and result queues
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,

    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_keywords() -> Vec<String> {
    owned(DEFAULT_KEYWORDS)
}

fn default_regex_patterns() -> Vec<String> {
    owned(DEFAULT_REGEX_PATTERNS)
}

fn default_excluded_extensions() -> Vec<String> {
    owned(DEFAULT_EXCLUDED_EXTENSIONS)
}

fn default_input_path() -> PathBuf {
    PathBuf::from("urls.txt")
}

fn default_output_path() -> PathBuf {
    PathBuf::from("filtered_urls.json")
}

fn default_thread_count() -> NonZeroUsize {
    NonZeroUsize::new(num_cpus::get()).unwrap_or(NonZeroUsize::MIN)
}

fn default_queue_capacity() -> usize {
    DEFAULT_QUEUE_CAPACITY
}

fn default_log_level() -> String {
    "warn".to_string()
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            keywords: default_keywords(),
            regex_patterns: default_regex_patterns(),
            excluded_extensions: default_excluded_extensions(),
            input_path: default_input_path(),
            output_path: default_output_path(),
            output_format: None,
            stats_path: None,
            stats_format: None,
            thread_count: default_thread_count(),
            queue_capacity: default_queue_capacity(),
            log_level: default_log_level(),
        }
    }
}

/// Values given on the command line. `None` and empty lists leave the
/// configured value alone.
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub input_path: Option<PathBuf>,
    pub output_path: Option<PathBuf>,
    pub output_format: Option<OutputFormat>,
    pub stats_path: Option<PathBuf>,
    pub stats_format: Option<OutputFormat>,
    pub thread_count: Option<NonZeroUsize>,
    pub queue_capacity: Option<usize>,
    pub log_level: Option<String>,
    /// Appended to the configured keywords
    pub keywords: Vec<String>,
    /// Appended to the configured regex patterns
    pub regex_patterns: Vec<String>,
    /// Appended to the configured excluded extensions
    pub excluded_extensions: Vec<String>,
    /// Use only the rules given on the command line
    pub replace_rules: bool,
}

impl FilterConfig {
    /// Loads configuration from the default locations
    pub fn load() -> FilterResult<Self> {
        Self::load_from(None)
    }

    /// Loads the default locations, then `config_path`, which must exist
    pub fn load_from(config_path: Option<&Path>) -> FilterResult<Self> {
        let mut builder = ConfigBuilder::builder();

        let optional_files = [
            dirs::config_dir().map(|p| p.join("ghostfilter/config.yaml")),
            Some(PathBuf::from(".ghostfilter.yaml")),
        ];
        for path in optional_files.iter().flatten() {
            if path.exists() {
                builder = builder.add_source(File::from(path.as_path()));
            }
        }

        if let Some(path) = config_path {
            builder = builder.add_source(File::from(path));
        }

        Ok(builder.build()?.try_deserialize()?)
    }

    /// Applies command-line values on top of the loaded configuration
    pub fn merge_with_cli(mut self, cli: CliOverrides) -> Self {
        if cli.replace_rules {
            self.keywords = cli.keywords;
            self.regex_patterns = cli.regex_patterns;
            self.excluded_extensions = cli.excluded_extensions;
        } else {
            self.keywords.extend(cli.keywords);
            self.regex_patterns.extend(cli.regex_patterns);
            self.excluded_extensions.extend(cli.excluded_extensions);
        }

        if let Some(path) = cli.input_path {
            self.input_path = path;
        }
        if let Some(path) = cli.output_path {
            self.output_path = path;
        }
        if cli.output_format.is_some() {
            self.output_format = cli.output_format;
        }
        if cli.stats_path.is_some() {
            self.stats_path = cli.stats_path;
        }
        if cli.stats_format.is_some() {
            self.stats_format = cli.stats_format;
        }
        if let Some(threads) = cli.thread_count {
            self.thread_count = threads;
        }
        if let Some(capacity) = cli.queue_capacity {
            self.queue_capacity = capacity;
        }
        if let Some(level) = cli.log_level {
            self.log_level = level;
        }
        self
    }

    /// Format of the matched URL list
    pub fn output_format(&self) -> OutputFormat {
        self.output_format
            .unwrap_or_else(|| OutputFormat::infer(&self.output_path))
    }

    /// Format of the statistics report
    pub fn stats_format(&self) -> OutputFormat {
        match (self.stats_format, &self.stats_path) {
            (Some(format), _) => format,
            (None, Some(path)) => OutputFormat::infer(path),
            (None, None) => OutputFormat::Text,
        }
    }

    /// Compiles the configured rules
    pub fn rule_set(&self) -> FilterResult<RuleSet> {
        RuleSet::build(
            &self.keywords,
            &self.regex_patterns,
            &self.excluded_extensions,
        )
    }

    /// Renders the effective settings in the same YAML layout `load_from` reads
    pub fn to_yaml(&self) -> FilterResult<String> {
        Ok(serde_yaml::to_string(self)?)
    }

    pub fn pipeline_options(&self) -> PipelineOptions {
        PipelineOptions {
            workers: self.thread_count,
            queue_capacity: self.queue_capacity,
        }
    }
}
