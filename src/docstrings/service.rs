//! Service facade over registry, settings, cache and detection worker
//!
//! [`DocstringService`] is what the LSP layer holds. It resolves a document
//! snapshot to its documentation blocks, serving repeated requests for the
//! same revision from a TTL cache and coalescing concurrent requests for the
//! same revision into one detection.
//!
//! # Consistency
//!
//! The pattern registry is replaced wholesale (copy-on-write) on every
//! change and the detection cache is cleared with it. A generation counter
//! keeps detections started against an older registry from writing their
//! results into the fresh cache.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use futures::future::{BoxFuture, FutureExt, Shared};
use once_cell::sync::OnceCell;
use parking_lot::RwLock;
use tracing::{debug, info, trace, warn};

use super::async_detection::{DetectionWorkerHandle, spawn_detection_worker};
use super::block::DocumentationBlock;
use super::cancellation::CancellationToken;
use super::detector::{Detection, DocstringDetector};
use super::pattern::DetectionPattern;
use super::pattern_registry::PatternRegistry;
use crate::cache::{CacheStats, TtlCache, cache_key};
use crate::config::{DocstringSettings, SettingsError};

/// Cached detection results keyed by [`cache_key`]
pub type DetectionCache = TtlCache<String, Arc<Vec<DocumentationBlock>>>;

/// Document state handed to the engine
#[derive(Debug, Clone)]
pub struct DocumentSnapshot {
    pub uri: String,
    pub version: i32,
    pub language_id: String,
    pub text: Arc<str>,
}

impl DocumentSnapshot {
    pub fn new(
        uri: impl Into<String>,
        version: i32,
        language_id: impl Into<String>,
        text: impl Into<Arc<str>>,
    ) -> Self {
        Self {
            uri: uri.into(),
            version,
            language_id: language_id.into(),
            text: text.into(),
        }
    }

    pub fn cache_key(&self) -> String {
        cache_key(&self.uri, self.version, &self.language_id)
    }
}

#[derive(Debug, Clone)]
struct Outcome {
    blocks: Arc<Vec<DocumentationBlock>>,
    cancelled: bool,
}

type SharedDetection = Shared<BoxFuture<'static, Outcome>>;

/// Removes an in-flight entry when its awaiting request finishes or is dropped
struct InFlightGuard<'a> {
    in_flight: &'a DashMap<String, SharedDetection>,
    key: &'a str,
    future: &'a SharedDetection,
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.in_flight
            .remove_if(self.key, |_, current| current.ptr_eq(self.future));
    }
}

pub struct DocstringService {
    /// Registry as injected plus programmatic registrations
    base_registry: RwLock<PatternRegistry>,
    /// `base_registry` plus custom patterns from settings
    registry: RwLock<Arc<PatternRegistry>>,
    settings: RwLock<Arc<DocstringSettings>>,
    cache: RwLock<Arc<DetectionCache>>,
    in_flight: DashMap<String, SharedDetection>,
    generation: Arc<AtomicU64>,
    worker: OnceCell<DetectionWorkerHandle>,
}

impl DocstringService {
    /// Creates a service over `registry` with default settings
    pub fn new(registry: PatternRegistry) -> Self {
        let settings = DocstringSettings::default();
        let cache = DetectionCache::with_ttl(settings.cache_ttl(), settings.cache_cleanup_interval());

        Self {
            registry: RwLock::new(Arc::new(registry.clone())),
            base_registry: RwLock::new(registry),
            settings: RwLock::new(Arc::new(settings)),
            cache: RwLock::new(Arc::new(cache)),
            in_flight: DashMap::new(),
            generation: Arc::new(AtomicU64::new(0)),
            worker: OnceCell::new(),
        }
    }

    /// Creates a service over the built-in patterns
    pub fn with_builtins() -> Self {
        Self::new(PatternRegistry::with_builtins())
    }

    /// Detects documentation blocks on the detection worker
    ///
    /// Cached results are returned directly. Concurrent calls for the same
    /// revision share one detection; if the shared detection was cut short by
    /// another caller's token, this caller re-runs it under its own token.
    /// Results of cancelled detections are returned but never cached.
    pub async fn detect(&self, snapshot: &DocumentSnapshot, cancel: &CancellationToken) -> Arc<Vec<DocumentationBlock>> {
        if !self.settings().is_language_enabled(&snapshot.language_id) {
            trace!("Language '{}' disabled; skipping {}", snapshot.language_id, snapshot.uri);
            return Arc::default();
        }

        let key = snapshot.cache_key();
        if let Some(blocks) = self.cache().get(&key) {
            trace!("Detection cache hit for {}", key);
            return blocks;
        }

        self.evict_older_in_flight(&snapshot.uri, &key);
        let (future, joined) = match self.in_flight.entry(key.clone()) {
            Entry::Occupied(entry) => (entry.get().clone(), true),
            Entry::Vacant(entry) => {
                let future = self.start_detection(key.clone(), snapshot, cancel.clone());
                entry.insert(future.clone());
                (future, false)
            }
        };
        if joined {
            debug!("Joining in-flight detection for {}", key);
        }

        let guard = InFlightGuard {
            in_flight: &self.in_flight,
            key: &key,
            future: &future,
        };
        let outcome = future.clone().await;
        drop(guard);

        if outcome.cancelled && joined && !cancel.is_cancelled() {
            debug!("Shared detection for {} was cancelled; re-running", key);
            let outcome = self.start_detection(key, snapshot, cancel.clone()).await;
            return outcome.blocks;
        }

        outcome.blocks
    }

    /// Detects documentation blocks on the calling thread
    pub fn detect_now(&self, snapshot: &DocumentSnapshot, cancel: &CancellationToken) -> Arc<Vec<DocumentationBlock>> {
        if !self.settings().is_language_enabled(&snapshot.language_id) {
            return Arc::default();
        }

        let key = snapshot.cache_key();
        let cache = self.cache();
        if let Some(blocks) = cache.get(&key) {
            return blocks;
        }

        let generation = self.generation.load(Ordering::Acquire);
        let detection = self.detector().run(&snapshot.text, &snapshot.language_id, cancel);
        let blocks = Arc::new(detection.blocks);

        if !detection.cancelled && self.generation.load(Ordering::Acquire) == generation {
            cache.set(key, blocks.clone());
            cache.cleanup_if_due();
        }

        blocks
    }

    /// Registers one pattern; clears the detection cache
    pub fn register_pattern(&self, pattern: DetectionPattern) {
        self.register_patterns(std::iter::once(pattern));
    }

    /// Registers several patterns in order; clears the detection cache
    pub fn register_patterns(&self, patterns: impl IntoIterator<Item = DetectionPattern>) {
        let patterns: Vec<Arc<DetectionPattern>> = patterns.into_iter().map(Arc::new).collect();
        if patterns.is_empty() {
            return;
        }

        {
            let mut base = self.base_registry.write();
            let mut registry = self.registry.write();
            let mut effective = PatternRegistry::clone(&registry);

            for pattern in patterns {
                base.register_shared(pattern.clone());
                effective.register_shared(pattern);
            }
            *registry = Arc::new(effective);
        }

        self.invalidate();
    }

    /// Patterns currently registered for `language`
    pub fn get_patterns(&self, language: &str) -> Vec<Arc<DetectionPattern>> {
        self.registry.read().lookup(language).to_vec()
    }

    /// Languages with patterns that are not disabled in settings, sorted
    pub fn supported_languages(&self) -> Vec<String> {
        let settings = self.settings();
        self.registry
            .read()
            .supported_languages()
            .into_iter()
            .filter(|language| settings.is_language_enabled(language))
            .collect()
    }

    pub fn is_language_supported(&self, language: &str) -> bool {
        self.registry.read().is_supported(language) && self.settings().is_language_enabled(language)
    }

    pub fn clear_cache(&self) {
        self.invalidate();
        debug!("Detection cache cleared");
    }

    /// Drops cached results and pending detections for every revision of `uri`
    ///
    /// Returns the number of cached results removed.
    pub fn invalidate_document(&self, uri: &str) -> usize {
        let prefix = format!("{uri}#");
        self.in_flight.retain(|key, _| !key.starts_with(&prefix));
        self.cache().remove_where(|key| key.starts_with(&prefix))
    }

    /// Removes expired cache entries, returning how many were removed
    pub fn cleanup_cache(&self) -> usize {
        self.cache().cleanup()
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache().stats()
    }

    pub fn settings(&self) -> Arc<DocstringSettings> {
        self.settings.read().clone()
    }

    /// Validates and applies settings
    ///
    /// Custom patterns are layered over the base registry, replacing those
    /// of any previous settings. On error nothing changes.
    pub fn apply_settings(&self, settings: DocstringSettings) -> Result<(), SettingsError> {
        settings.validate()?;
        let custom = settings.compile_custom_patterns()?;
        let custom_count = custom.len();

        {
            let base = self.base_registry.read();
            let mut effective = base.clone();
            for pattern in custom {
                effective.register(pattern);
            }
            *self.registry.write() = Arc::new(effective);
        }

        let previous = self.settings();
        if previous.cache_ttl() != settings.cache_ttl()
            || previous.cache_cleanup_interval() != settings.cache_cleanup_interval()
        {
            *self.cache.write() = Arc::new(DetectionCache::with_ttl(
                settings.cache_ttl(),
                settings.cache_cleanup_interval(),
            ));
        }
        *self.settings.write() = Arc::new(settings);

        self.invalidate();
        info!("Applied docstring settings ({} custom patterns)", custom_count);
        Ok(())
    }

    /// Forgets pending detections for other revisions of `uri`
    fn evict_older_in_flight(&self, uri: &str, key: &str) {
        let prefix = format!("{uri}#");
        self.in_flight
            .retain(|pending, _| pending == key || !pending.starts_with(&prefix));
    }

    fn invalidate(&self) {
        self.generation.fetch_add(1, Ordering::AcqRel);
        self.in_flight.clear();
        self.cache().clear();
    }

    fn cache(&self) -> Arc<DetectionCache> {
        self.cache.read().clone()
    }

    fn detector(&self) -> Arc<DocstringDetector> {
        let registry = self.registry.read().clone();
        Arc::new(DocstringDetector::new(registry).with_max_preview_length(self.settings().max_preview_length))
    }

    fn worker(&self) -> &DetectionWorkerHandle {
        self.worker.get_or_init(spawn_detection_worker)
    }

    fn start_detection(&self, key: String, snapshot: &DocumentSnapshot, cancel: CancellationToken) -> SharedDetection {
        let detector = self.detector();
        let cache = self.cache();
        let generation = self.generation.clone();
        let started_at = generation.load(Ordering::Acquire);
        let text = snapshot.text.clone();
        let language = snapshot.language_id.clone();
        let rx = self
            .worker()
            .detect(key.clone(), text.clone(), language.clone(), detector.clone(), cancel.clone());

        async move {
            let detection = match rx.await {
                Ok(result) => Detection {
                    blocks: result.blocks,
                    cancelled: result.cancelled,
                },
                Err(_) => {
                    warn!("Detection worker unavailable; detecting {} inline", key);
                    detector.run(&text, &language, &cancel)
                }
            };

            let outcome = Outcome {
                blocks: Arc::new(detection.blocks),
                cancelled: detection.cancelled,
            };
            if !outcome.cancelled && generation.load(Ordering::Acquire) == started_at {
                cache.set(key, outcome.blocks.clone());
                cache.cleanup_if_due();
            }
            outcome
        }
        .boxed()
        .shared()
    }
}

impl Default for DocstringService {
    fn default() -> Self {
        Self::with_builtins()
    }
}
