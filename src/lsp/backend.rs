//! LSP backend serving documentation folding ranges and hovers
//!
//! Documents are kept as ropes and updated incrementally. Detection goes
//! through [`DocstringService`]. Every request against the same document
//! revision shares one cancellation token, and an edit cancels the token of
//! the revision it replaces.

mod handlers;
mod state;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use dashmap::DashMap;
use parking_lot::RwLock;
use serde_json::{Value, json};
use tower_lsp::Client;
use tower_lsp::jsonrpc;
use tower_lsp::lsp_types::{FoldingRange, MessageType, Url};
use tracing::{debug, info, trace, warn};

use crate::config::{DocstringSettings, SettingsError};
use crate::docstrings::{CancellationToken, DocstringService, DocumentSnapshot, DocumentationBlock};
use crate::lsp::commands::Command;
use crate::lsp::document::LspDocument;
use crate::lsp::folding::{FoldingCache, folding_ranges};

pub use state::DocstringBackend;
use state::DetectionTicket;

impl DocstringBackend {
    /// Creates a backend over the built-in patterns
    pub fn new(client: Client) -> Self {
        Self::with_service(client, Arc::new(DocstringService::with_builtins()))
    }

    pub fn with_service(client: Client, service: Arc<DocstringService>) -> Self {
        let settings = service.settings();
        let (shutdown_tx, _) = tokio::sync::broadcast::channel::<()>(1);

        Self {
            client,
            service,
            documents: Arc::new(DashMap::new()),
            detection_cancel: Arc::new(DashMap::new()),
            folding_cache: Arc::new(RwLock::new(Arc::new(FoldingCache::with_ttl(
                settings.cache_ttl(),
                settings.cache_cleanup_interval(),
            )))),
            shutdown_tx: Arc::new(shutdown_tx),
            cleanup_started: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn service(&self) -> &Arc<DocstringService> {
        &self.service
    }

    /// Spawns the periodic cache sweep, once per backend
    fn spawn_cache_cleanup(&self) {
        if self.cleanup_started.swap(true, Ordering::AcqRel) {
            return;
        }

        let backend = self.clone();
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        tokio::spawn(async move {
            loop {
                let interval = backend.service.settings().cache_cleanup_interval();

                tokio::select! {
                    _ = tokio::time::sleep(interval) => {
                        let detections = backend.service.cleanup_cache();
                        let folds = backend.folding_cache().cleanup();
                        if detections + folds > 0 {
                            debug!("Cache sweep removed {} detections and {} folding entries", detections, folds);
                        }
                    }
                    _ = shutdown_rx.recv() => {
                        info!("Cache cleanup received shutdown signal, exiting gracefully");
                        break;
                    }
                }
            }
            debug!("Cache cleanup task terminated");
        });
    }

    pub(super) fn folding_cache(&self) -> Arc<FoldingCache> {
        self.folding_cache.read().clone()
    }

    pub(super) fn document(&self, uri: &Url) -> Option<Arc<LspDocument>> {
        self.documents.get(uri).map(|entry| entry.value().clone())
    }

    /// Token for detections against `version` of `uri`
    ///
    /// Requests for the same revision share a token. A newer revision
    /// cancels and replaces the older token.
    fn detection_token(&self, uri: &Url, version: i32) -> CancellationToken {
        let mut entry = self.detection_cancel.entry(uri.clone()).or_insert_with(|| DetectionTicket {
            version,
            token: CancellationToken::new(),
        });

        if entry.version < version {
            entry.token.cancel();
            *entry = DetectionTicket {
                version,
                token: CancellationToken::new(),
            };
        }
        entry.token.clone()
    }

    /// Cancels any detection running for `uri`
    pub(super) fn cancel_detection(&self, uri: &Url) {
        if let Some((_, ticket)) = self.detection_cancel.remove(uri) {
            ticket.token.cancel();
            trace!("Cancelled detection for {} v{}", uri, ticket.version);
        }
    }

    async fn detect_snapshot(&self, uri: &Url, snapshot: &DocumentSnapshot) -> (Arc<Vec<DocumentationBlock>>, bool) {
        let cancel = self.detection_token(uri, snapshot.version);
        let blocks = self.service.detect(snapshot, &cancel).await;
        (blocks, cancel.is_cancelled())
    }

    /// Detected blocks for the current revision of an open document
    ///
    /// The flag is true if the revision was superseded while detecting.
    pub(super) async fn blocks_for(&self, uri: &Url) -> Option<(DocumentSnapshot, Arc<Vec<DocumentationBlock>>, bool)> {
        let snapshot = self.document(uri)?.snapshot().await;
        let (blocks, cancelled) = self.detect_snapshot(uri, &snapshot).await;
        Some((snapshot, blocks, cancelled))
    }

    /// Folding ranges for the current revision of an open document
    pub(super) async fn folding_ranges_for(&self, uri: &Url) -> Option<Arc<Vec<FoldingRange>>> {
        let snapshot = self.document(uri)?.snapshot().await;
        let key = snapshot.cache_key();

        let cache = self.folding_cache();
        if let Some(ranges) = cache.get(&key) {
            trace!("Folding cache hit for {}", key);
            return Some(ranges);
        }

        let (blocks, cancelled) = self.detect_snapshot(uri, &snapshot).await;
        let ranges = Arc::new(folding_ranges(&blocks, self.service.settings().show_preview));

        if !cancelled {
            cache.set(key, ranges.clone());
            cache.cleanup_if_due();
        }
        Some(ranges)
    }

    pub(super) fn clear_caches(&self) {
        self.service.clear_cache();
        self.folding_cache().clear();
    }

    /// Parses and applies client settings, keeping the previous ones on error
    pub(super) fn apply_settings_value(&self, value: &Value) -> Result<(), SettingsError> {
        let settings = DocstringSettings::from_value(value)?;
        let ttl = settings.cache_ttl();
        let interval = settings.cache_cleanup_interval();

        self.service.apply_settings(settings)?;
        *self.folding_cache.write() = Arc::new(FoldingCache::with_ttl(ttl, interval));
        Ok(())
    }

    /// Applies settings and reports failures to the user
    pub(super) async fn update_settings(&self, value: &Value) {
        if let Err(e) = self.apply_settings_value(value) {
            warn!("Ignoring invalid docstring settings: {}", e);
            self.client
                .show_message(MessageType::WARNING, format!("Docstring settings ignored: {e}"))
                .await;
        }
    }

    pub(super) async fn execute(&self, command: Command) -> jsonrpc::Result<Option<Value>> {
        match command {
            Command::ClearCache => {
                self.clear_caches();
                info!("Caches cleared on request");
                Ok(None)
            }
            Command::CacheStats => {
                let stats = self.service.cache_stats();
                Ok(Some(json!({
                    "size": stats.size,
                    "hits": stats.hits,
                    "misses": stats.misses,
                    "foldingSize": self.folding_cache().len(),
                })))
            }
            Command::SupportedLanguages => Ok(Some(json!(self.service.supported_languages()))),
            Command::ListBlocks(uri) => {
                let Some((_, blocks, _)) = self.blocks_for(&uri).await else {
                    return Err(jsonrpc::Error::invalid_params(format!("document not open: {uri}")));
                };

                let mut blocks: Vec<&DocumentationBlock> = blocks.iter().collect();
                blocks.sort_by_key(|b| (b.start_line, b.start_column, b.end_line));
                serde_json::to_value(blocks)
                    .map(Some)
                    .map_err(|_| jsonrpc::Error::internal_error())
            }
        }
    }
}
