use tracing::trace;

use crate::rules::RuleSet;

/// Outcome of classifying one candidate
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Verdict<'r> {
    matched: Vec<&'r str>,
    excluded: bool,
}

impl<'r> Verdict<'r> {
    fn excluded() -> Self {
        Self {
            matched: Vec::new(),
            excluded: true,
        }
    }

    /// True when at least one keyword or regex rule fired
    pub fn is_sensitive(&self) -> bool {
        !self.matched.is_empty()
    }

    /// True when an excluded extension vetoed the candidate
    pub fn is_excluded(&self) -> bool {
        self.excluded
    }

    /// Identifiers of every rule that fired, keywords first
    pub fn matched(&self) -> &[&'r str] {
        &self.matched
    }
}

/// Classifies a candidate against the rule set.
///
/// An excluded extension wins over every keyword and regex: the candidate
/// is not sensitive and contributes nothing to the statistics. Otherwise
/// each keyword is searched in the lower-cased candidate and each regex is
/// run against the candidate as given.
pub fn classify<'r>(candidate: &str, rules: &'r RuleSet) -> Verdict<'r> {
    let lowered = candidate.to_lowercase();

    if rules.is_excluded(&lowered) {
        trace!("Excluded by extension: {}", candidate);
        return Verdict::excluded();
    }

    let matched = rules
        .substring_rules()
        .iter()
        .chain(rules.regex_rules())
        .filter(|rule| rule.is_match(candidate, &lowered))
        .map(|rule| rule.id())
        .collect();

    Verdict {
        matched,
        excluded: false,
    }
}
