//! Detection patterns: the per-language rules the scanner runs
//!
//! A pattern describes one comment syntax for one language: how a block
//! starts, how it ends, optionally how a block that opens and closes on the
//! same line looks, and whether the block spans lines between the markers
//! (`multiline`) or is a run of consecutive prefixed lines (`///` style).

use std::fmt;
use std::ops::Range;
use std::sync::Arc;

use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::preview::{self, PreviewExtractor};

/// Errors raised while building a pattern from user-supplied rules
#[derive(Debug, Error)]
pub enum PatternError {
    #[error("pattern for '{language}' has an invalid {field} expression: {source}")]
    InvalidRegex {
        language: String,
        field: &'static str,
        #[source]
        source: regex::Error,
    },

    #[error("pattern language must not be empty")]
    EmptyLanguage,
}

/// Comment-syntax family a pattern belongs to
///
/// Selects marker stripping for previews and the fallback label used when a
/// block has no text. Languages sharing a syntax share a family, so adding a
/// language never needs a new preview branch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SyntaxFamily {
    /// `"""..."""` / `'''...'''` docstrings
    TripleQuote,
    /// `/** ... */` doc comments
    #[default]
    BlockComment,
    /// Consecutive `///` or `//!` lines
    LinePrefix,
}

impl SyntaxFamily {
    pub fn extractor(self) -> &'static dyn PreviewExtractor {
        match self {
            SyntaxFamily::TripleQuote => &preview::TripleQuoteExtractor,
            SyntaxFamily::BlockComment => &preview::BlockCommentExtractor,
            SyntaxFamily::LinePrefix => &preview::LinePrefixExtractor,
        }
    }
}

/// Closure form of a matcher: returns the byte range of the match in `line`
pub type MatchFn = dyn Fn(&str) -> Option<Range<usize>> + Send + Sync;

/// A rule recognizing a marker on a single line
#[derive(Clone)]
pub enum Matcher {
    Regex(Regex),
    Custom(Arc<MatchFn>),
}

impl Matcher {
    pub fn regex(language: &str, field: &'static str, expr: &str) -> Result<Self, PatternError> {
        Regex::new(expr)
            .map(Matcher::Regex)
            .map_err(|source| PatternError::InvalidRegex {
                language: language.to_string(),
                field,
                source,
            })
    }

    pub fn custom(f: impl Fn(&str) -> Option<Range<usize>> + Send + Sync + 'static) -> Self {
        Matcher::Custom(Arc::new(f))
    }

    /// Byte range of the first match in `line`, if any
    pub fn find(&self, line: &str) -> Option<Range<usize>> {
        match self {
            Matcher::Regex(re) => re.find(line).map(|m| m.range()),
            Matcher::Custom(f) => f(line),
        }
    }

    pub fn is_match(&self, line: &str) -> bool {
        match self {
            Matcher::Regex(re) => re.is_match(line),
            Matcher::Custom(f) => f(line).is_some(),
        }
    }

    /// Source expression for regex matchers, `None` for closures
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Matcher::Regex(re) => Some(re.as_str()),
            Matcher::Custom(_) => None,
        }
    }
}

impl fmt::Debug for Matcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Matcher::Regex(re) => f.debug_tuple("Regex").field(&re.as_str()).finish(),
            Matcher::Custom(_) => f.write_str("Custom(<fn>)"),
        }
    }
}

/// One comment syntax for one language
#[derive(Debug, Clone)]
pub struct DetectionPattern {
    pub name: String,
    pub language: String,
    pub start: Matcher,
    pub end: Matcher,
    pub single_line: Option<Matcher>,
    pub multiline: bool,
    pub family: SyntaxFamily,
}

impl DetectionPattern {
    /// Builds a multiline pattern from regular expressions
    pub fn block(
        language: &str,
        family: SyntaxFamily,
        start: &str,
        end: &str,
        single_line: Option<&str>,
    ) -> Result<Self, PatternError> {
        if language.trim().is_empty() {
            return Err(PatternError::EmptyLanguage);
        }

        Ok(Self {
            name: format!("{}-{:?}", language, family),
            language: language.to_string(),
            start: Matcher::regex(language, "start", start)?,
            end: Matcher::regex(language, "end", end)?,
            single_line: single_line
                .map(|expr| Matcher::regex(language, "singleLine", expr))
                .transpose()?,
            multiline: true,
            family,
        })
    }

    /// Builds a per-line pattern: every line of the block matches `prefix`
    pub fn per_line(language: &str, family: SyntaxFamily, prefix: &str) -> Result<Self, PatternError> {
        if language.trim().is_empty() {
            return Err(PatternError::EmptyLanguage);
        }

        let start = Matcher::regex(language, "start", prefix)?;
        Ok(Self {
            name: format!("{}-{:?}", language, family),
            language: language.to_string(),
            end: start.clone(),
            start,
            single_line: None,
            multiline: false,
            family,
        })
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Same rules registered under another language
    pub fn for_language(&self, language: &str) -> Self {
        let mut pattern = self.clone();
        pattern.language = language.to_string();
        pattern
    }
}

/// User-facing description of a custom pattern, as it arrives from settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PatternSpec {
    pub language: String,
    #[serde(default)]
    pub name: Option<String>,
    pub start: String,
    pub end: String,
    #[serde(default)]
    pub single_line: Option<String>,
    #[serde(default = "default_multiline")]
    pub multiline: bool,
    #[serde(default)]
    pub family: SyntaxFamily,
}

fn default_multiline() -> bool {
    true
}

impl PatternSpec {
    /// Compiles the spec, failing on any invalid expression
    pub fn compile(&self) -> Result<DetectionPattern, PatternError> {
        if self.language.trim().is_empty() {
            return Err(PatternError::EmptyLanguage);
        }

        let language = self.language.as_str();
        let pattern = DetectionPattern {
            name: self
                .name
                .clone()
                .unwrap_or_else(|| format!("{}-custom", language)),
            language: language.to_string(),
            start: Matcher::regex(language, "start", &self.start)?,
            end: Matcher::regex(language, "end", &self.end)?,
            single_line: self
                .single_line
                .as_deref()
                .map(|expr| Matcher::regex(language, "singleLine", expr))
                .transpose()?,
            multiline: self.multiline,
            family: self.family,
        };

        Ok(pattern)
    }
}
