//! Backend state management
//!
//! This module defines the DocstringBackend struct, which holds the open
//! documents, the detection service and the LSP-level caches.

use std::sync::Arc;
use std::sync::atomic::AtomicBool;

use dashmap::DashMap;
use parking_lot::RwLock;
use tower_lsp::Client;
use tower_lsp::lsp_types::Url;

use crate::docstrings::{CancellationToken, DocstringService};
use crate::lsp::document::LspDocument;
use crate::lsp::folding::FoldingCache;

/// Cancellation token of the detection running for one document revision
#[derive(Debug, Clone)]
pub(super) struct DetectionTicket {
    pub(super) version: i32,
    pub(super) token: CancellationToken,
}

/// The docstring language server backend
#[derive(Clone)]
pub struct DocstringBackend {
    pub(super) client: Client,
    pub(super) service: Arc<DocstringService>,
    pub(super) documents: Arc<DashMap<Url, Arc<LspDocument>>>,
    /// Per-document token shared by every request against the current revision
    pub(super) detection_cancel: Arc<DashMap<Url, DetectionTicket>>,
    pub(super) folding_cache: Arc<RwLock<Arc<FoldingCache>>>,
    pub(super) shutdown_tx: Arc<tokio::sync::broadcast::Sender<()>>,
    pub(super) cleanup_started: Arc<AtomicBool>,
}

impl std::fmt::Debug for DocstringBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DocstringBackend")
            .field("documents", &self.documents.len())
            .field("languages", &self.service.supported_languages().len())
            .finish()
    }
}
