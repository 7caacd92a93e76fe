//! Name patterns for catalog searches: globs or regular expressions

use super::glob::GlobPattern;
use super::CatalogError;
use regex::{Regex, RegexBuilder};
use std::fmt;

/// A compiled name pattern.
///
/// Globs match the whole name. Regexes match anywhere in the name unless
/// anchored with `^` and `$`.
#[derive(Debug, Clone)]
pub enum NamePattern {
    Glob(GlobPattern),
    Regex(Regex),
}

impl NamePattern {
    /// Compile a regular expression
    pub fn regex(pattern: &str) -> Result<Self, CatalogError> {
        Self::regex_with_case(pattern, true)
    }

    pub fn regex_with_case(pattern: &str, case_sensitive: bool) -> Result<Self, CatalogError> {
        RegexBuilder::new(pattern)
            .case_insensitive(!case_sensitive)
            .build()
            .map(NamePattern::Regex)
            .map_err(|e| CatalogError::InvalidPattern(e.to_string()))
    }

    pub fn matches(&self, name: &str) -> bool {
        match self {
            NamePattern::Glob(glob) => glob.matches(name),
            NamePattern::Regex(regex) => regex.is_match(name),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            NamePattern::Glob(glob) => glob.as_str(),
            NamePattern::Regex(regex) => regex.as_str(),
        }
    }
}

impl From<GlobPattern> for NamePattern {
    fn from(glob: GlobPattern) -> Self {
        NamePattern::Glob(glob)
    }
}

impl From<Regex> for NamePattern {
    fn from(regex: Regex) -> Self {
        NamePattern::Regex(regex)
    }
}

impl From<&str> for NamePattern {
    fn from(pattern: &str) -> Self {
        NamePattern::Glob(GlobPattern::new(pattern))
    }
}

impl fmt::Display for NamePattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NamePattern::Glob(glob) => write!(f, "{}", glob),
            NamePattern::Regex(regex) => write!(f, "/{}/", regex.as_str()),
        }
    }
}
