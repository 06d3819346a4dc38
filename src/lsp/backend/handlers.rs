//! LSP protocol handler implementations
//!
//! This module contains the `tower_lsp::LanguageServer` implementation for
//! the docstring backend:
//! - Lifecycle handlers (initialize, initialized, shutdown)
//! - Document lifecycle (did_open, did_change, did_close)
//! - Features (folding_range, hover, execute_command)
//! - Configuration (did_change_configuration)

use std::sync::Arc;

use serde_json::Value;
use tower_lsp::jsonrpc::Result as LspResult;
use tower_lsp::lsp_types::{
    DidChangeConfigurationParams, DidChangeTextDocumentParams, DidCloseTextDocumentParams,
    DidOpenTextDocumentParams, ExecuteCommandOptions, ExecuteCommandParams, FoldingRange,
    FoldingRangeParams, FoldingRangeProviderCapability, Hover, HoverParams, HoverProviderCapability,
    InitializeParams, InitializeResult, InitializedParams, ServerCapabilities, ServerInfo,
    TextDocumentSyncCapability, TextDocumentSyncKind,
};
use tower_lsp::{LanguageServer, jsonrpc};
use tracing::{debug, info, warn};

use super::state::DocstringBackend;
use crate::lsp::commands::{Command, command_names};
use crate::lsp::document::LspDocument;
use crate::lsp::hover::{block_at, hover_for_block};

#[tower_lsp::async_trait]
impl LanguageServer for DocstringBackend {
    async fn initialize(&self, params: InitializeParams) -> LspResult<InitializeResult> {
        info!(
            "Received initialize from {}",
            params
                .client_info
                .as_ref()
                .map(|c| c.name.as_str())
                .unwrap_or("unknown client")
        );

        if let Some(options) = params.initialization_options.as_ref() {
            if let Err(e) = self.apply_settings_value(options) {
                warn!("Invalid initialization options, using defaults: {}", e);
            }
        }

        Ok(InitializeResult {
            capabilities: ServerCapabilities {
                text_document_sync: Some(TextDocumentSyncCapability::Kind(TextDocumentSyncKind::INCREMENTAL)),
                folding_range_provider: Some(FoldingRangeProviderCapability::Simple(true)),
                hover_provider: Some(HoverProviderCapability::Simple(true)),
                execute_command_provider: Some(ExecuteCommandOptions {
                    commands: command_names(),
                    work_done_progress_options: Default::default(),
                }),
                ..Default::default()
            },
            server_info: Some(ServerInfo {
                name: env!("CARGO_PKG_NAME").to_string(),
                version: Some(env!("CARGO_PKG_VERSION").to_string()),
            }),
        })
    }

    async fn initialized(&self, _: InitializedParams) {
        info!(
            "Docstring server initialized ({} languages)",
            self.service.supported_languages().len()
        );
        self.spawn_cache_cleanup();
    }

    async fn shutdown(&self) -> LspResult<()> {
        info!("Received shutdown request");

        let _ = self.shutdown_tx.send(());
        for entry in self.detection_cancel.iter() {
            entry.token.cancel();
        }

        Ok(())
    }

    async fn did_open(&self, params: DidOpenTextDocumentParams) {
        let item = params.text_document;
        debug!(
            "Opening document: URI={}, language={}, version={}",
            item.uri, item.language_id, item.version
        );

        let document = LspDocument::new(item.uri.clone(), item.language_id, &item.text, item.version);
        self.cancel_detection(&item.uri);
        self.documents.insert(item.uri, Arc::new(document));
    }

    async fn did_change(&self, params: DidChangeTextDocumentParams) {
        let uri = params.text_document.uri;
        let version = params.text_document.version;

        let Some(document) = self.document(&uri) else {
            warn!("Change for unknown document: {}", uri);
            return;
        };

        self.cancel_detection(&uri);
        match document.apply(&params.content_changes, version).await {
            Ok(version) => debug!("Updated document: URI={}, version={}", uri, version),
            Err(e) => warn!("Ignoring change for {}: {}", uri, e),
        }
    }

    async fn did_close(&self, params: DidCloseTextDocumentParams) {
        let uri = params.text_document.uri;

        self.cancel_detection(&uri);
        if self.documents.remove(&uri).is_none() {
            warn!("Closed document not found: {}", uri);
        }

        let prefix = format!("{uri}#");
        let detections = self.service.invalidate_document(uri.as_str());
        let folds = self.folding_cache().remove_where(|key| key.starts_with(&prefix));
        debug!(
            "Closed document: {} (dropped {} cached detections, {} folding entries)",
            uri, detections, folds
        );
    }

    async fn did_change_configuration(&self, params: DidChangeConfigurationParams) {
        info!("Received configuration change");
        self.update_settings(&params.settings).await;
    }

    async fn folding_range(&self, params: FoldingRangeParams) -> LspResult<Option<Vec<FoldingRange>>> {
        let uri = params.text_document.uri;
        Ok(self
            .folding_ranges_for(&uri)
            .await
            .map(|ranges| ranges.as_ref().clone()))
    }

    async fn hover(&self, params: HoverParams) -> LspResult<Option<Hover>> {
        if !self.service.settings().enable_hover {
            return Ok(None);
        }

        let uri = params.text_document_position_params.text_document.uri;
        let position = params.text_document_position_params.position;

        let Some((snapshot, blocks, _)) = self.blocks_for(&uri).await else {
            return Ok(None);
        };

        Ok(block_at(&blocks, position).map(|block| {
            let patterns = self.service.get_patterns(&snapshot.language_id);
            hover_for_block(block, &patterns)
        }))
    }

    async fn execute_command(&self, params: ExecuteCommandParams) -> LspResult<Option<Value>> {
        debug!("Executing command {}", params.command);

        let command = Command::parse(&params.command, &params.arguments)
            .map_err(|e| jsonrpc::Error::invalid_params(e.to_string()))?;
        self.execute(command).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tower_lsp::LspService;
    use tower_lsp::lsp_types::{
        FoldingRangeKind, HoverContents, Position, Range, TextDocumentContentChangeEvent,
        TextDocumentIdentifier, TextDocumentItem, TextDocumentPositionParams, Url,
        VersionedTextDocumentIdentifier,
    };

    use crate::lsp::commands::{CACHE_STATS, CLEAR_CACHE, LIST_BLOCKS, SUPPORTED_LANGUAGES};

    fn uri() -> Url {
        Url::parse("file:///work/example.py").unwrap()
    }

    const SOURCE: &str = "def f():\n    \"\"\"\n    Compute things.\n    \"\"\"\n    return 1\n";

    async fn open(backend: &DocstringBackend, text: &str) {
        backend
            .did_open(DidOpenTextDocumentParams {
                text_document: TextDocumentItem {
                    uri: uri(),
                    language_id: "python".to_string(),
                    version: 1,
                    text: text.to_string(),
                },
            })
            .await;
    }

    async fn folding(backend: &DocstringBackend) -> Vec<FoldingRange> {
        backend
            .folding_range(FoldingRangeParams {
                text_document: TextDocumentIdentifier { uri: uri() },
                work_done_progress_params: Default::default(),
                partial_result_params: Default::default(),
            })
            .await
            .unwrap()
            .unwrap_or_default()
    }

    async fn command(backend: &DocstringBackend, name: &str, arguments: Vec<Value>) -> LspResult<Option<Value>> {
        backend
            .execute_command(ExecuteCommandParams {
                command: name.to_string(),
                arguments,
                work_done_progress_params: Default::default(),
            })
            .await
    }

    #[tokio::test]
    async fn test_initialize_advertises_capabilities() {
        let (service, _socket) = LspService::new(DocstringBackend::new);
        let result = service.inner().initialize(InitializeParams::default()).await.unwrap();

        let capabilities = result.capabilities;
        assert!(capabilities.folding_range_provider.is_some());
        assert!(capabilities.hover_provider.is_some());
        assert_eq!(capabilities.execute_command_provider.unwrap().commands.len(), 4);
    }

    #[tokio::test]
    async fn test_initialization_options_applied() {
        let (service, _socket) = LspService::new(DocstringBackend::new);
        let backend = service.inner();
        let params = InitializeParams {
            initialization_options: Some(json!({ "docstrings": { "showPreview": false } })),
            ..Default::default()
        };
        backend.initialize(params).await.unwrap();

        assert!(!backend.service.settings().show_preview);
        open(backend, SOURCE).await;
        assert!(folding(backend).await[0].collapsed_text.is_none());
    }

    #[tokio::test]
    async fn test_folding_range_for_docstring() {
        let (service, _socket) = LspService::new(DocstringBackend::new);
        let backend = service.inner();
        open(backend, SOURCE).await;

        let ranges = folding(backend).await;
        assert_eq!(ranges.len(), 1);
        assert_eq!((ranges[0].start_line, ranges[0].end_line), (1, 3));
        assert_eq!(ranges[0].kind, Some(FoldingRangeKind::Comment));
        assert_eq!(ranges[0].collapsed_text.as_deref(), Some("Compute things."));
        assert_eq!(backend.folding_cache().len(), 1);
    }

    #[tokio::test]
    async fn test_folding_follows_incremental_edits() {
        let (service, _socket) = LspService::new(DocstringBackend::new);
        let backend = service.inner();
        open(backend, "def f():\n    return 1\n").await;
        assert!(folding(backend).await.is_empty());

        backend
            .did_change(DidChangeTextDocumentParams {
                text_document: VersionedTextDocumentIdentifier { uri: uri(), version: 2 },
                content_changes: vec![TextDocumentContentChangeEvent {
                    range: Some(Range {
                        start: Position { line: 1, character: 0 },
                        end: Position { line: 1, character: 0 },
                    }),
                    range_length: None,
                    text: "    '''\n    Added later.\n    '''\n".to_string(),
                }],
            })
            .await;

        let ranges = folding(backend).await;
        assert_eq!(ranges.len(), 1);
        assert_eq!(ranges[0].collapsed_text.as_deref(), Some("Added later."));
    }

    #[tokio::test]
    async fn test_hover_inside_block() {
        let (service, _socket) = LspService::new(DocstringBackend::new);
        let backend = service.inner();
        open(backend, SOURCE).await;

        let hover_at = |line, character| HoverParams {
            text_document_position_params: TextDocumentPositionParams {
                text_document: TextDocumentIdentifier { uri: uri() },
                position: Position { line, character },
            },
            work_done_progress_params: Default::default(),
        };

        let hover = backend.hover(hover_at(2, 6)).await.unwrap().unwrap();
        match hover.contents {
            HoverContents::Markup(markup) => assert_eq!(markup.value, "Compute things."),
            other => panic!("unexpected hover contents: {other:?}"),
        }

        assert!(backend.hover(hover_at(4, 6)).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_commands() {
        let (service, _socket) = LspService::new(DocstringBackend::new);
        let backend = service.inner();
        open(backend, SOURCE).await;
        folding(backend).await;

        let stats = command(backend, CACHE_STATS, vec![]).await.unwrap().unwrap();
        assert_eq!(stats["size"], 1);
        assert_eq!(stats["foldingSize"], 1);

        let languages = command(backend, SUPPORTED_LANGUAGES, vec![]).await.unwrap().unwrap();
        assert!(languages.as_array().unwrap().contains(&json!("python")));

        let blocks = command(backend, LIST_BLOCKS, vec![json!(uri().as_str())]).await.unwrap().unwrap();
        assert_eq!(blocks[0]["startLine"], 1);
        assert_eq!(blocks[0]["preview"], "Compute things.");

        assert_eq!(command(backend, CLEAR_CACHE, vec![]).await.unwrap(), None);
        let stats = command(backend, CACHE_STATS, vec![]).await.unwrap().unwrap();
        assert_eq!(stats["size"], 0);
        assert_eq!(stats["foldingSize"], 0);
    }

    #[tokio::test]
    async fn test_list_blocks_for_unknown_document_fails() {
        let (service, _socket) = LspService::new(DocstringBackend::new);
        let result = command(service.inner(), LIST_BLOCKS, vec![json!("file:///missing.py")]).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_close_drops_document_and_cache() {
        let (service, _socket) = LspService::new(DocstringBackend::new);
        let backend = service.inner();
        open(backend, SOURCE).await;
        folding(backend).await;

        backend
            .did_close(DidCloseTextDocumentParams {
                text_document: TextDocumentIdentifier { uri: uri() },
            })
            .await;

        assert!(backend.documents.is_empty());
        assert!(backend.folding_cache().is_empty());
        assert_eq!(backend.service.cache_stats().size, 0);
    }
}
