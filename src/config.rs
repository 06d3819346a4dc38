//! Server settings
//!
//! Settings arrive as JSON through LSP `initializationOptions` and
//! `workspace/didChangeConfiguration`. Clients may send the bare object or
//! nest it under a `"docstrings"` key. Every field is optional.

use std::time::Duration;

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::docstrings::{DEFAULT_MAX_PREVIEW_LENGTH, DetectionPattern, PatternError, PatternSpec};

/// Key under which clients may nest the settings object
pub const SETTINGS_SECTION: &str = "docstrings";

pub const MIN_PREVIEW_LENGTH: usize = 4;
pub const MAX_PREVIEW_LENGTH: usize = 500;

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("malformed settings: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("maxPreviewLength must be between 4 and 500, got {0}")]
    PreviewLength(usize),

    #[error("{field} must be greater than zero")]
    ZeroDuration { field: &'static str },

    #[error("custom pattern #{index}: {source}")]
    CustomPattern {
        index: usize,
        #[source]
        source: PatternError,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DocstringSettings {
    pub max_preview_length: usize,
    /// Attach previews to folding ranges as collapsed text
    pub show_preview: bool,
    pub enable_hover: bool,
    /// Per-language switch; languages not listed are enabled
    pub enabled_languages: FxHashMap<String, bool>,
    pub custom_patterns: Vec<PatternSpec>,
    pub cache_ttl_secs: u64,
    pub cache_cleanup_interval_secs: u64,
}

impl Default for DocstringSettings {
    fn default() -> Self {
        Self {
            max_preview_length: DEFAULT_MAX_PREVIEW_LENGTH,
            show_preview: true,
            enable_hover: true,
            enabled_languages: FxHashMap::default(),
            custom_patterns: Vec::new(),
            cache_ttl_secs: 300,
            cache_cleanup_interval_secs: 30,
        }
    }
}

impl DocstringSettings {
    /// Parses and validates settings from a JSON value
    ///
    /// `null` yields the defaults.
    pub fn from_value(value: &Value) -> Result<Self, SettingsError> {
        let value = match value {
            Value::Null => return Ok(Self::default()),
            Value::Object(map) => map.get(SETTINGS_SECTION).unwrap_or(value),
            other => other,
        };

        let settings: Self = serde_json::from_value(value.clone())?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<(), SettingsError> {
        if !(MIN_PREVIEW_LENGTH..=MAX_PREVIEW_LENGTH).contains(&self.max_preview_length) {
            return Err(SettingsError::PreviewLength(self.max_preview_length));
        }
        if self.cache_ttl_secs == 0 {
            return Err(SettingsError::ZeroDuration { field: "cacheTtlSecs" });
        }
        if self.cache_cleanup_interval_secs == 0 {
            return Err(SettingsError::ZeroDuration {
                field: "cacheCleanupIntervalSecs",
            });
        }
        self.compile_custom_patterns()?;
        Ok(())
    }

    /// Compiles `customPatterns` in declaration order
    pub fn compile_custom_patterns(&self) -> Result<Vec<DetectionPattern>, SettingsError> {
        self.custom_patterns
            .iter()
            .enumerate()
            .map(|(index, spec)| {
                spec.compile()
                    .map_err(|source| SettingsError::CustomPattern { index, source })
            })
            .collect()
    }

    pub fn is_language_enabled(&self, language: &str) -> bool {
        self.enabled_languages.get(language).copied().unwrap_or(true)
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }

    pub fn cache_cleanup_interval(&self) -> Duration {
        Duration::from_secs(self.cache_cleanup_interval_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_defaults() {
        let settings = DocstringSettings::default();
        assert_eq!(settings.max_preview_length, 60);
        assert!(settings.show_preview);
        assert!(settings.enable_hover);
        assert_eq!(settings.cache_ttl(), Duration::from_secs(300));
        assert_eq!(settings.cache_cleanup_interval(), Duration::from_secs(30));
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_null_yields_defaults() {
        let settings = DocstringSettings::from_value(&Value::Null).unwrap();
        assert_eq!(settings, DocstringSettings::default());
    }

    #[test]
    fn test_partial_object_keeps_other_defaults() {
        let settings = DocstringSettings::from_value(&json!({ "maxPreviewLength": 40 })).unwrap();
        assert_eq!(settings.max_preview_length, 40);
        assert!(settings.show_preview);
    }

    #[test]
    fn test_nested_under_section() {
        let settings = DocstringSettings::from_value(&json!({
            "docstrings": {
                "showPreview": false,
                "enabledLanguages": { "python": false }
            }
        }))
        .unwrap();

        assert!(!settings.show_preview);
        assert!(!settings.is_language_enabled("python"));
        assert!(settings.is_language_enabled("rust"));
    }

    #[test]
    fn test_preview_length_bounds() {
        let err = DocstringSettings::from_value(&json!({ "maxPreviewLength": 2 })).unwrap_err();
        assert!(matches!(err, SettingsError::PreviewLength(2)));

        let err = DocstringSettings::from_value(&json!({ "maxPreviewLength": 501 })).unwrap_err();
        assert!(matches!(err, SettingsError::PreviewLength(501)));
    }

    #[test]
    fn test_zero_ttl_rejected() {
        let err = DocstringSettings::from_value(&json!({ "cacheTtlSecs": 0 })).unwrap_err();
        assert!(matches!(err, SettingsError::ZeroDuration { field: "cacheTtlSecs" }));
    }

    #[test]
    fn test_wrong_type_is_malformed() {
        let err = DocstringSettings::from_value(&json!({ "showPreview": "yes" })).unwrap_err();
        assert!(matches!(err, SettingsError::Malformed(_)));
    }

    #[test]
    fn test_custom_patterns_compile() {
        let settings = DocstringSettings::from_value(&json!({
            "customPatterns": [
                { "language": "lua", "start": "^\\s*--\\[\\[", "end": "\\]\\]" },
                { "language": "elixir", "name": "moduledoc", "start": "^\\s*@moduledoc\\s+\"\"\"", "end": "\"\"\"", "family": "tripleQuote" }
            ]
        }))
        .unwrap();

        let patterns = settings.compile_custom_patterns().unwrap();
        assert_eq!(patterns.len(), 2);
        assert_eq!(patterns[0].name, "lua-custom");
        assert_eq!(patterns[1].name, "moduledoc");
    }

    #[test]
    fn test_invalid_custom_pattern_reports_index() {
        let err = DocstringSettings::from_value(&json!({
            "customPatterns": [
                { "language": "lua", "start": "--", "end": "--" },
                { "language": "lua", "start": "(", "end": "x" }
            ]
        }))
        .unwrap_err();

        assert!(matches!(err, SettingsError::CustomPattern { index: 1, .. }));
    }
}
