//! Caching for detection results and derived LSP payloads

pub mod ttl_cache;

pub use ttl_cache::{CacheStats, DEFAULT_CLEANUP_INTERVAL, DEFAULT_TTL, TtlCache};

/// Key for per-document cached results
///
/// Unique per (document, revision, language): a new version or a language
/// change never hits a stale entry.
pub fn cache_key(uri: &str, version: i32, language: &str) -> String {
    format!("{uri}#v{version}#{language}")
}
