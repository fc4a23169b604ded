//! Exclusion of source paths from backup.
//!
//! Patterns are regular expressions searched (unanchored) anywhere in the full
//! source path, not matched against single path segments. A literal pattern is
//! escaped first so metacharacters such as `.` only match themselves.

use crate::backup::result_error::error::Error;
use crate::backup::result_error::result::Result;

use derive_more::Display;
use regex::Regex;
use serde::de::Visitor;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use std::fmt::{Debug, Formatter};
use std::path::Path;
use std::result;

/// A compiled exclusion pattern
///
/// Deserializes from a plain string and fails on invalid regular expressions,
/// so a bad pattern stops the config from loading instead of failing later.
#[derive(Clone, Debug, Display)]
pub struct ExclusionPattern {
    regex: Regex,
}

impl ExclusionPattern {
    pub fn new<S: AsRef<str>>(pattern: S) -> Result<Self> {
        let pattern = pattern.as_ref();
        Regex::new(pattern)
            .map(|regex| Self { regex })
            .map_err(|source| Error::MalformedExclusionPattern {
                pattern: pattern.to_string(),
                source,
            })
    }

    pub fn literal<S: AsRef<str>>(text: S) -> Result<Self> {
        Self::new(regex::escape(text.as_ref()))
    }

    pub fn as_str(&self) -> &str {
        self.regex.as_str()
    }

    pub fn is_match<P: AsRef<Path>>(&self, path: P) -> bool {
        self.regex.is_match(&path.as_ref().to_string_lossy())
    }
}

impl PartialEq for ExclusionPattern {
    fn eq(&self, other: &Self) -> bool {
        self.as_str() == other.as_str()
    }
}

impl Eq for ExclusionPattern {}

impl Serialize for ExclusionPattern {
    fn serialize<S: Serializer>(&self, serializer: S) -> result::Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

struct ExclusionPatternVisitor;

impl Visitor<'_> for ExclusionPatternVisitor {
    type Value = ExclusionPattern;

    fn expecting(&self, formatter: &mut Formatter) -> std::fmt::Result {
        formatter.write_str("a regular expression")
    }

    fn visit_str<E>(self, v: &str) -> result::Result<Self::Value, E>
    where
        E: serde::de::Error,
    {
        ExclusionPattern::new(v).map_err(serde::de::Error::custom)
    }
}

impl<'de> Deserialize<'de> for ExclusionPattern {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> result::Result<Self, D::Error> {
        deserializer.deserialize_str(ExclusionPatternVisitor)
    }
}

/// Immutable set of exclusion patterns shared read-only by all workers
#[derive(Clone, Debug, Default)]
pub struct ExclusionFilter {
    patterns: Vec<ExclusionPattern>,
}

impl ExclusionFilter {
    pub fn new<I: IntoIterator<Item = ExclusionPattern>>(patterns: I) -> Self {
        Self {
            patterns: patterns.into_iter().collect(),
        }
    }

    /// Compiles raw pattern strings, failing on the first malformed one
    pub fn from_patterns<I, S>(patterns: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        patterns
            .into_iter()
            .map(ExclusionPattern::new)
            .collect::<Result<Vec<_>>>()
            .map(Self::new)
    }

    pub fn patterns(&self) -> &[ExclusionPattern] {
        &self.patterns
    }

    pub fn should_exclude<P: AsRef<Path>>(&self, path: P) -> bool {
        let path = path.as_ref();
        self.patterns.iter().any(|pattern| pattern.is_match(path))
    }
}
