//! Path matching logic.
//!
//! # Responsibilities
//! - Match a path against a prefix (case-sensitive)
//! - Combine prefixes with OR semantics
//!
//! # Design Decisions
//! - Path matching is case-sensitive, plain `starts_with`
//! - Empty prefix set never matches
//! - No regex to guarantee O(n) matching

/// Trait for matching request paths against conditions.
pub trait Matcher: Send + Sync + std::fmt::Debug {
    /// Returns true if the path matches this condition.
    fn matches(&self, path: &str) -> bool;
}

/// Matches the request path prefix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathPrefixMatcher {
    prefix: String,
}

impl PathPrefixMatcher {
    /// Create a new path prefix matcher.
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }
}

impl Matcher for PathPrefixMatcher {
    fn matches(&self, path: &str) -> bool {
        path.starts_with(&self.prefix)
    }
}

/// Matches when any of its prefixes match, checked in configuration order.
#[derive(Debug, Clone, Default)]
pub struct AnyPrefixMatcher {
    matchers: Vec<PathPrefixMatcher>,
}

impl AnyPrefixMatcher {
    pub fn new<I, S>(prefixes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            matchers: prefixes.into_iter().map(PathPrefixMatcher::new).collect(),
        }
    }

    pub fn prefixes(&self) -> impl Iterator<Item = &str> {
        self.matchers.iter().map(PathPrefixMatcher::prefix)
    }
}

impl Matcher for AnyPrefixMatcher {
    fn matches(&self, path: &str) -> bool {
        self.matchers.iter().any(|m| m.matches(path))
    }
}
