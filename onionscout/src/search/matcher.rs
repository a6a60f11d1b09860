use regex::{Regex, RegexSet};
use tracing::{debug, warn};

use crate::errors::{VanityError, VanityResult};

const PATTERN_DELIMITER: char = ',';

/// A compiled pattern along with the text it was compiled from
#[derive(Debug, Clone)]
pub struct Pattern {
    source: String,
    regex: Regex,
}

impl Pattern {
    /// Compiles a single pattern
    pub fn new(source: impl Into<String>) -> VanityResult<Self> {
        let source = source.into();
        let regex =
            Regex::new(&source).map_err(|e| VanityError::invalid_pattern(source.clone(), e))?;
        Ok(Self { source, regex })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn is_match(&self, address: &str) -> bool {
        self.regex.is_match(address)
    }
}

/// Splits a delimited pattern argument into individual pattern strings.
/// Entries are trimmed and empty entries are dropped.
pub fn split_patterns(raw: &str) -> Vec<String> {
    raw.split(PATTERN_DELIMITER)
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(str::to_string)
        .collect()
}

/// The set of patterns an address is tested against.
///
/// An address matches the set when any pattern finds a match anywhere in it.
/// Patterns that need to pin a position do so themselves with `^` or `$`.
#[derive(Debug, Clone)]
pub struct PatternSet {
    patterns: Vec<Pattern>,
    set: RegexSet,
}

impl PatternSet {
    /// Compiles every pattern independently. Invalid patterns are skipped with
    /// a warning; the set only fails to build when nothing valid is left.
    pub fn compile<I, S>(raw_patterns: I) -> VanityResult<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut patterns = Vec::new();
        for raw in raw_patterns {
            match Pattern::new(raw.as_ref()) {
                Ok(pattern) => patterns.push(pattern),
                Err(e) => warn!("Skipping pattern: {}", e),
            }
        }

        if patterns.is_empty() {
            return Err(VanityError::NoValidPatterns);
        }

        let set = RegexSet::new(patterns.iter().map(|p| p.source.as_str()))
            .map_err(|e| VanityError::invalid_pattern(patterns_label(&patterns), e))?;
        debug!("Compiled {} patterns", patterns.len());

        Ok(Self { patterns, set })
    }

    /// Whether at least one pattern matches the address
    pub fn matches(&self, address: &str) -> bool {
        self.set.is_match(address)
    }

    /// Every pattern that matches the address, in the order they were given
    pub fn matching_patterns(&self, address: &str) -> Vec<&Pattern> {
        self.set
            .matches(address)
            .into_iter()
            .map(|i| &self.patterns[i])
            .collect()
    }

    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Pattern> {
        self.patterns.iter()
    }

    pub fn sources(&self) -> Vec<&str> {
        self.patterns.iter().map(Pattern::source).collect()
    }
}

fn patterns_label(patterns: &[Pattern]) -> String {
    patterns
        .iter()
        .map(Pattern::source)
        .collect::<Vec<_>>()
        .join(",")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_anchored_prefix() {
        let set = PatternSet::compile(["^abc"]).unwrap();
        assert!(set.matches("abcxyz"));
        assert!(!set.matches("xyzabc"));
    }

    #[test]
    fn test_unanchored_search() {
        let set = PatternSet::compile(["abc"]).unwrap();
        assert!(set.matches("xyzabc"));
        assert!(set.matches("abcxyz"));
        assert!(!set.matches("xyzxyz"));
    }

    #[test]
    fn test_any_pattern_matches() {
        let set = PatternSet::compile(["^foo", "bar$"]).unwrap();
        assert!(set.matches("fooxyz"));
        assert!(set.matches("xyzbar"));
        assert!(!set.matches("xyzfoo"));

        let hits: Vec<&str> = set
            .matching_patterns("foobar")
            .into_iter()
            .map(Pattern::source)
            .collect();
        assert_eq!(hits, vec!["^foo", "bar$"]);
    }

    #[test]
    fn test_invalid_pattern_is_skipped() {
        let set = PatternSet::compile(["(abc", "^xyz"]).unwrap();
        assert_eq!(set.len(), 1);
        assert_eq!(set.sources(), vec!["^xyz"]);
        assert!(set.matches("xyz123"));
    }

    #[test]
    fn test_all_invalid_patterns() {
        let result = PatternSet::compile(["(abc", "[z-a]"]);
        assert!(matches!(result, Err(VanityError::NoValidPatterns)));

        let result = PatternSet::compile(Vec::<String>::new());
        assert!(matches!(result, Err(VanityError::NoValidPatterns)));
    }

    #[test]
    fn test_single_pattern_error() {
        let err = Pattern::new("(abc").unwrap_err();
        assert!(matches!(err, VanityError::InvalidPattern { .. }));
        assert!(err.to_string().starts_with("Invalid pattern '(abc'"));
    }

    #[test]
    fn test_split_patterns() {
        assert_eq!(split_patterns("^abc,def$"), vec!["^abc", "def$"]);
        assert_eq!(split_patterns(" ^abc , ,xyz,"), vec!["^abc", "xyz"]);
        assert!(split_patterns(",,").is_empty());
    }
}
