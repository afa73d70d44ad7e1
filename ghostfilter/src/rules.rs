use regex::{Regex, RegexBuilder};
use std::collections::{BTreeSet, HashSet};
use tracing::debug;

use crate::defaults::{DEFAULT_EXCLUDED_EXTENSIONS, DEFAULT_KEYWORDS, DEFAULT_REGEX_PATTERNS};
use crate::errors::{FilterError, FilterResult};

/// How a rule matches a candidate
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleKind {
    Substring,
    Regex,
}

#[derive(Debug, Clone)]
enum Matcher {
    /// Lower-cased keyword, compared against the lower-cased candidate
    Substring(String),
    /// Compiled once, case-insensitive
    Regex(Regex),
}

/// A single keyword or regular expression, identified by its literal text
#[derive(Debug, Clone)]
pub struct Rule {
    id: String,
    matcher: Matcher,
}

impl Rule {
    fn substring(literal: &str, lowered: String) -> Self {
        Self {
            id: literal.to_string(),
            matcher: Matcher::Substring(lowered),
        }
    }

    fn regex(source: &str) -> FilterResult<Self> {
        let regex = RegexBuilder::new(source)
            .case_insensitive(true)
            .build()
            .map_err(|e| FilterError::invalid_pattern(source, e))?;
        Ok(Self {
            id: source.to_string(),
            matcher: Matcher::Regex(regex),
        })
    }

    /// The keyword or the regex source exactly as configured
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn kind(&self) -> RuleKind {
        match self.matcher {
            Matcher::Substring(_) => RuleKind::Substring,
            Matcher::Regex(_) => RuleKind::Regex,
        }
    }

    /// Tests the rule. Keywords look at `lowered`, regexes at `raw`.
    pub(crate) fn is_match(&self, raw: &str, lowered: &str) -> bool {
        match &self.matcher {
            Matcher::Substring(keyword) => lowered.contains(keyword.as_str()),
            Matcher::Regex(regex) => regex.is_match(raw),
        }
    }
}

/// Immutable classification rules for one run.
///
/// Shared by reference between all workers; it holds no interior
/// mutability, so concurrent reads need no synchronization.
#[derive(Debug, Clone)]
pub struct RuleSet {
    substrings: Vec<Rule>,
    regexes: Vec<Rule>,
    excluded_extensions: BTreeSet<String>,
}

impl RuleSet {
    /// Builds a rule set, compiling every regex exactly once.
    ///
    /// Fails on the first regex that does not compile, on an empty keyword,
    /// on a regex whose source equals a keyword and on an extension that is
    /// empty once its leading dots are removed. Keywords that differ only in
    /// case or surrounding whitespace are kept once, under the first
    /// spelling. Duplicate patterns are kept once.
    pub fn build<K, R, E>(
        keywords: K,
        regex_patterns: R,
        excluded_extensions: E,
    ) -> FilterResult<Self>
    where
        K: IntoIterator,
        K::Item: AsRef<str>,
        R: IntoIterator,
        R::Item: AsRef<str>,
        E: IntoIterator,
        E::Item: AsRef<str>,
    {
        let mut seen = HashSet::new();
        let mut substrings = Vec::new();
        for keyword in keywords {
            let literal = keyword.as_ref();
            let lowered = literal.trim().to_lowercase();
            if lowered.is_empty() {
                return Err(FilterError::invalid_rule(
                    "keyword must not be empty, it would match every candidate",
                ));
            }
            if seen.insert(lowered.clone()) {
                substrings.push(Rule::substring(literal, lowered));
            }
        }

        // Rule ids key the statistics, so a regex may not reuse a keyword's id
        let keyword_ids: HashSet<&str> = substrings.iter().map(Rule::id).collect();
        let mut seen = HashSet::new();
        let mut regexes = Vec::new();
        for pattern in regex_patterns {
            let pattern = pattern.as_ref();
            if keyword_ids.contains(pattern) {
                return Err(FilterError::invalid_rule(format!(
                    "'{}' is configured both as a keyword and as a regex",
                    pattern
                )));
            }
            if seen.insert(pattern.to_string()) {
                regexes.push(Rule::regex(pattern)?);
            }
        }

        let mut excluded = BTreeSet::new();
        for ext in excluded_extensions {
            let raw = ext.as_ref();
            let normalized = raw.trim().trim_start_matches('.').to_lowercase();
            if normalized.is_empty() {
                return Err(FilterError::invalid_rule(format!(
                    "excluded extension '{}' is empty",
                    raw
                )));
            }
            excluded.insert(normalized);
        }

        debug!(
            "Built rule set: {} keywords, {} regexes, {} excluded extensions",
            substrings.len(),
            regexes.len(),
            excluded.len()
        );

        Ok(Self {
            substrings,
            regexes,
            excluded_extensions: excluded,
        })
    }

    /// The built-in keyword, regex and extension tables
    pub fn from_defaults() -> FilterResult<Self> {
        Self::build(
            DEFAULT_KEYWORDS,
            DEFAULT_REGEX_PATTERNS,
            DEFAULT_EXCLUDED_EXTENSIONS,
        )
    }

    pub fn substring_rules(&self) -> &[Rule] {
        &self.substrings
    }

    pub fn regex_rules(&self) -> &[Rule] {
        &self.regexes
    }

    /// Normalized extensions: lower-case, no leading dot
    pub fn excluded_extensions(&self) -> impl Iterator<Item = &str> {
        self.excluded_extensions.iter().map(String::as_str)
    }

    /// Every rule identifier, keywords first, in declaration order
    pub fn rule_ids(&self) -> impl Iterator<Item = &str> {
        self.substrings
            .iter()
            .chain(self.regexes.iter())
            .map(Rule::id)
    }

    /// Number of keyword and regex rules
    pub fn len(&self) -> usize {
        self.substrings.len() + self.regexes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// True when `lowered` ends with `.ext` for an excluded extension
    pub(crate) fn is_excluded(&self, lowered: &str) -> bool {
        self.excluded_extensions.iter().any(|ext| {
            lowered.len() > ext.len()
                && lowered.ends_with(ext.as_str())
                && lowered.as_bytes()[lowered.len() - ext.len() - 1] == b'.'
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const NONE: [&str; 0] = [];

    #[test]
    fn test_keywords_are_deduplicated_by_normalized_form() {
        let rules = RuleSet::build(["Admin", " admin ", "LOGIN"], NONE, NONE).unwrap();
        let ids: Vec<_> = rules.rule_ids().collect();
        assert_eq!(ids, vec!["Admin", "LOGIN"]);
        assert!(rules
            .substring_rules()
            .iter()
            .all(|r| r.kind() == RuleKind::Substring));
    }

    #[test]
    fn test_regex_compiled_case_insensitive() {
        let rules = RuleSet::build(NONE, [r"/api\b"], NONE).unwrap();
        let rule = &rules.regex_rules()[0];
        assert_eq!(rule.id(), r"/api\b");
        assert_eq!(rule.kind(), RuleKind::Regex);
        assert!(rule.is_match("/API/v1", "/api/v1"));
    }

    #[test]
    fn test_invalid_regex_fails_fast() {
        let err = RuleSet::build(["admin"], [r"/ok\b", "(unclosed"], NONE).unwrap_err();
        match err {
            FilterError::InvalidPattern { pattern, .. } => assert_eq!(pattern, "(unclosed"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_keyword_id_keeps_configured_spelling() {
        let rules = RuleSet::build(["Admin"], NONE, NONE).unwrap();
        let rule = &rules.substring_rules()[0];
        assert_eq!(rule.id(), "Admin");
        assert!(rule.is_match("/ADMIN/panel", "/admin/panel"));
    }

    #[test]
    fn test_keyword_and_regex_with_same_text_rejected() {
        let err = RuleSet::build(["admin"], ["admin"], NONE).unwrap_err();
        assert!(matches!(err, FilterError::InvalidRule(_)));
        assert!(err.to_string().contains("both as a keyword and as a regex"));

        // Different spellings are different rules
        let rules = RuleSet::build(["Admin"], ["admin"], NONE).unwrap();
        assert_eq!(rules.len(), 2);
    }

    #[test]
    fn test_empty_keyword_rejected() {
        let err = RuleSet::build(["admin", "  "], NONE, NONE).unwrap_err();
        assert!(err.is_config_error());
    }

    #[test]
    fn test_extensions_normalized() {
        let rules = RuleSet::build(NONE, NONE, [".PNG", "css", "..Tar.Gz"]).unwrap();
        let exts: Vec<_> = rules.excluded_extensions().collect();
        assert_eq!(exts, vec!["css", "png", "tar.gz"]);

        assert!(rules.is_excluded("/logo.png"));
        assert!(rules.is_excluded("/dump.tar.gz"));
        assert!(!rules.is_excluded("/pngs"));
        assert!(!rules.is_excluded("/imagepng"));
        assert!(!rules.is_excluded("png"));
    }

    #[test]
    fn test_empty_extension_rejected() {
        assert!(RuleSet::build(NONE, NONE, ["."]).is_err());
    }

    #[test]
    fn test_defaults_build() {
        let rules = RuleSet::from_defaults().unwrap();
        assert_eq!(rules.substring_rules().len(), DEFAULT_KEYWORDS.len());
        assert_eq!(rules.regex_rules().len(), DEFAULT_REGEX_PATTERNS.len());
        assert!(!rules.is_empty());
    }
}
