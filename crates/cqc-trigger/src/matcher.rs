//! Literal-or-regex value matcher
//!
//! A matcher is built once when a filter is configured. Regex patterns are
//! compiled at that point, so a bad pattern is a configuration error and
//! `matches()` itself can never fail.

use cqc_core::moniker_of;
use regex::Regex;

use crate::error::{FilterError, FilterResult};

/// One filter operand, compiled for comparison
#[derive(Debug, Clone, Default)]
pub struct ValueMatcher {
    pattern: String,
    regex: Option<Regex>,
}

impl ValueMatcher {
    /// Exact, case-sensitive comparison against `pattern`
    pub fn literal(pattern: impl Into<String>) -> Self {
        Self {
            pattern: pattern.into(),
            regex: None,
        }
    }

    /// Build a matcher, compiling `pattern` as a full-match regex if asked
    ///
    /// An empty pattern is never compiled; the regex request is dropped and
    /// the matcher behaves as a literal empty value.
    pub fn new(pattern: impl Into<String>, is_regex: bool) -> FilterResult<Self> {
        let pattern = pattern.into();
        if !is_regex || pattern.is_empty() {
            return Ok(Self::literal(pattern));
        }

        let regex = Regex::new(&format!("^(?:{pattern})$")).map_err(|source| {
            FilterError::InvalidRegex {
                pattern: pattern.clone(),
                source,
            }
        })?;

        Ok(Self {
            pattern,
            regex: Some(regex),
        })
    }

    /// The configured pattern text
    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    /// Is the pattern compiled as a regex
    pub fn is_regex(&self) -> bool {
        self.regex.is_some()
    }

    /// Is the pattern empty
    pub fn is_empty(&self) -> bool {
        self.pattern.is_empty()
    }

    /// Compare a candidate string
    ///
    /// With `empty_matches_any`, an empty pattern matches everything.
    pub fn matches(&self, candidate: &str, empty_matches_any: bool) -> bool {
        if empty_matches_any && self.pattern.is_empty() {
            return true;
        }
        match &self.regex {
            Some(re) => re.is_match(candidate),
            None => self.pattern == candidate,
        }
    }

    /// Compare only the moniker part of a `moniker.field` source
    pub fn matches_moniker(&self, source: &str, empty_matches_any: bool) -> bool {
        self.matches(moniker_of(source), empty_matches_any)
    }
}

impl PartialEq for ValueMatcher {
    fn eq(&self, other: &Self) -> bool {
        self.pattern == other.pattern && self.is_regex() == other.is_regex()
    }
}

impl Eq for ValueMatcher {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_literal_is_exact_and_case_sensitive() {
        let m = ValueMatcher::literal("Kitchen");
        assert!(m.matches("Kitchen", false));
        assert!(!m.matches("kitchen", false));
        assert!(!m.matches("Kitchen2", false));
    }

    #[test]
    fn test_empty_pattern() {
        let m = ValueMatcher::literal("");
        assert!(m.matches("anything", true));
        assert!(!m.matches("anything", false));
        assert!(m.matches("", false));
    }

    #[test]
    fn test_regex_is_full_match() {
        let m = ValueMatcher::new("Light[0-9]+", true).unwrap();
        assert!(m.is_regex());
        assert!(m.matches("Light12", false));
        assert!(!m.matches("MyLight12", false));
        assert!(!m.matches("Light12x", false));
    }

    #[test]
    fn test_regex_alternation_is_anchored() {
        let m = ValueMatcher::new("on|off", true).unwrap();
        assert!(m.matches("on", false));
        assert!(m.matches("off", false));
        assert!(!m.matches("onx", false));
        assert!(!m.matches("xoff", false));
    }

    #[test]
    fn test_empty_regex_is_dropped() {
        let m = ValueMatcher::new("", true).unwrap();
        assert!(!m.is_regex());
        assert!(m.matches("whatever", true));
    }

    #[test]
    fn test_bad_regex_fails_at_build() {
        let err = ValueMatcher::new("Light[", true).unwrap_err();
        assert!(matches!(err, FilterError::InvalidRegex { .. }));
    }

    #[test]
    fn test_moniker_reduction() {
        let m = ValueMatcher::literal("LivingRoomLight");
        assert!(m.matches_moniker("LivingRoomLight.Switch", false));
        assert!(m.matches_moniker("LivingRoomLight", false));
        assert!(!m.matches("LivingRoomLight.Switch", false));
    }
}
