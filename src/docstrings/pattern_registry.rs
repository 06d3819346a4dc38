//! Registry mapping language identifiers to their detection patterns
//!
//! Patterns are kept per language in registration order, which is also the
//! order the detector runs them in. Registration is pure data insertion:
//! nothing is validated or de-duplicated here, duplicate hits are removed
//! after scanning.

use std::sync::Arc;

use rustc_hash::FxHashMap;
use tracing::{debug, trace};

use super::builtin::builtin_patterns;
use super::pattern::DetectionPattern;

/// Per-language ordered pattern lists
///
/// The registry is a plain value: callers construct it, hand it to a
/// [`DocstringDetector`](super::DocstringDetector), and clone it when they
/// need a modified copy. Patterns are shared between clones.
///
/// # Example
///
/// ```rust,ignore
/// let mut registry = PatternRegistry::with_builtins();
/// registry.register(spec.compile()?);
/// assert!(registry.is_supported("lua"));
/// ```
#[derive(Debug, Clone, Default)]
pub struct PatternRegistry {
    patterns: FxHashMap<String, Vec<Arc<DetectionPattern>>>,
}

impl PatternRegistry {
    /// Creates an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a registry with the built-in language patterns
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();

        for pattern in builtin_patterns() {
            registry.register_shared(pattern.clone());
        }

        debug!(
            "Initialized pattern registry with {} built-in patterns for {} languages",
            registry.pattern_count(),
            registry.patterns.len()
        );

        registry
    }

    /// Appends a pattern to its language's list
    pub fn register(&mut self, pattern: DetectionPattern) {
        self.register_shared(Arc::new(pattern));
    }

    /// Appends an already shared pattern
    pub fn register_shared(&mut self, pattern: Arc<DetectionPattern>) {
        trace!("Registering pattern '{}' for '{}'", pattern.name, pattern.language);

        let list = self.patterns.entry(pattern.language.clone()).or_default();
        list.push(pattern);
    }

    /// Appends several patterns under `language`
    ///
    /// Patterns declared for a different language are re-tagged so lookups
    /// and detected blocks report `language`.
    pub fn register_all(&mut self, language: &str, patterns: impl IntoIterator<Item = DetectionPattern>) {
        for pattern in patterns {
            let pattern = if pattern.language == language {
                pattern
            } else {
                pattern.for_language(language)
            };
            self.register(pattern);
        }

        debug!(
            "Language '{}' now has {} patterns",
            language,
            self.lookup(language).len()
        );
    }

    /// Patterns for `language` in registration order (empty if unsupported)
    pub fn lookup(&self, language: &str) -> &[Arc<DetectionPattern>] {
        self.patterns
            .get(language)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Languages with at least one pattern, sorted
    pub fn supported_languages(&self) -> Vec<String> {
        let mut languages: Vec<String> = self
            .patterns
            .iter()
            .filter(|(_, list)| !list.is_empty())
            .map(|(language, _)| language.clone())
            .collect();
        languages.sort();
        languages
    }

    pub fn is_supported(&self, language: &str) -> bool {
        !self.lookup(language).is_empty()
    }

    /// Total number of registered patterns across languages
    pub fn pattern_count(&self) -> usize {
        self.patterns.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.pattern_count() == 0
    }
}
