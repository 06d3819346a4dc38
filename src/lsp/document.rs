use ropey::Rope;
use thiserror::Error;
use tokio::sync::RwLock;
use tower_lsp::lsp_types::{Position, TextDocumentContentChangeEvent, Url};

use crate::docstrings::DocumentSnapshot;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DocumentError {
    #[error("version {version} not newer than {current}")]
    StaleVersion { version: i32, current: i32 },
}

/// Mutable state of an open document
#[derive(Debug)]
pub struct LspDocumentState {
    pub text: Rope,
    pub version: i32,
}

/// An open text document
#[derive(Debug)]
pub struct LspDocument {
    pub uri: Url,
    pub language_id: String,
    pub state: RwLock<LspDocumentState>,
}

/// Converts an LSP position to a char index in the rope
///
/// A character past the end of its line clamps to the end of that line,
/// before the line ending.
fn position_to_char_offset(position: &Position, text: &Rope) -> usize {
    let line = position.line as usize;
    if line >= text.len_lines() {
        return text.len_chars();
    }

    let line_start = text.line_to_char(line);
    let line_slice = text.line(line);
    let ending = line_slice
        .chars_at(line_slice.len_chars())
        .reversed()
        .take_while(|c| matches!(c, '\n' | '\r'))
        .count();
    line_start + (position.character as usize).min(line_slice.len_chars() - ending)
}

impl LspDocumentState {
    /// Applies content changes in order if `version` is newer than the current one
    pub fn apply(
        &mut self,
        changes: &[TextDocumentContentChangeEvent],
        version: i32,
    ) -> Result<(), DocumentError> {
        if version <= self.version {
            return Err(DocumentError::StaleVersion {
                version,
                current: self.version,
            });
        }

        for change in changes {
            if let Some(range) = change.range {
                let start = position_to_char_offset(&range.start, &self.text);
                let end = position_to_char_offset(&range.end, &self.text).max(start);
                self.text.remove(start..end);
                self.text.insert(start, &change.text);
            } else {
                self.text = Rope::from_str(&change.text);
            }
        }
        self.version = version;
        Ok(())
    }
}

impl LspDocument {
    pub fn new(uri: Url, language_id: impl Into<String>, text: &str, version: i32) -> Self {
        Self {
            uri,
            language_id: language_id.into(),
            state: RwLock::new(LspDocumentState {
                text: Rope::from_str(text),
                version,
            }),
        }
    }

    /// Returns the current text of the document as a string.
    pub async fn text(&self) -> String {
        self.state.read().await.text.to_string()
    }

    /// Returns the current version of the document.
    pub async fn version(&self) -> i32 {
        self.state.read().await.version
    }

    /// Applies changes to the document, returning the new version.
    pub async fn apply(
        &self,
        changes: &[TextDocumentContentChangeEvent],
        version: i32,
    ) -> Result<i32, DocumentError> {
        let mut state = self.state.write().await;
        state.apply(changes, version)?;
        Ok(state.version)
    }

    /// Consistent view of uri, version, language and text for detection
    pub async fn snapshot(&self) -> DocumentSnapshot {
        let state = self.state.read().await;
        DocumentSnapshot::new(
            self.uri.as_str(),
            state.version,
            self.language_id.as_str(),
            state.text.to_string(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tower_lsp::lsp_types::Range;

    fn create_test_document(text: &str) -> LspDocument {
        LspDocument::new(Url::parse("file:///test.py").unwrap(), "python", text, 0)
    }

    fn edit(start: (u32, u32), end: (u32, u32), text: &str) -> TextDocumentContentChangeEvent {
        TextDocumentContentChangeEvent {
            range: Some(Range {
                start: Position { line: start.0, character: start.1 },
                end: Position { line: end.0, character: end.1 },
            }),
            range_length: None,
            text: text.to_string(),
        }
    }

    #[tokio::test]
    async fn test_apply_full_change() {
        let doc = create_test_document("initial text");
        let changes = vec![TextDocumentContentChangeEvent {
            range: None,
            range_length: None,
            text: "new text".to_string(),
        }];

        assert_eq!(doc.apply(&changes, 1).await, Ok(1));
        assert_eq!(doc.text().await, "new text");
    }

    #[tokio::test]
    async fn test_apply_incremental_change() {
        let doc = create_test_document("hello world");
        doc.apply(&[edit((0, 6), (0, 11), "there")], 1).await.unwrap();
        assert_eq!(doc.text().await, "hello there");
    }

    #[tokio::test]
    async fn test_apply_multiline_edit() {
        let doc = create_test_document("def f():\n    pass\n");
        doc.apply(&[edit((1, 0), (1, 0), "    \"\"\"Doc\"\"\"\n")], 1)
            .await
            .unwrap();
        assert_eq!(doc.text().await, "def f():\n    \"\"\"Doc\"\"\"\n    pass\n");
    }

    #[tokio::test]
    async fn test_apply_sequential_changes_in_one_batch() {
        let doc = create_test_document("hello world");
        let changes = vec![edit((0, 6), (0, 11), "rust"), edit((0, 0), (0, 5), "hi")];
        doc.apply(&changes, 1).await.unwrap();
        assert_eq!(doc.text().await, "hi rust");
    }

    #[tokio::test]
    async fn test_stale_version_rejected() {
        let doc = create_test_document("text");
        doc.apply(&[edit((0, 0), (0, 0), "a")], 2).await.unwrap();

        let err = doc.apply(&[edit((0, 0), (0, 0), "b")], 2).await.unwrap_err();
        assert_eq!(err, DocumentError::StaleVersion { version: 2, current: 2 });
        assert_eq!(doc.text().await, "atext");
    }

    #[tokio::test]
    async fn test_out_of_range_positions_clamp() {
        let doc = create_test_document("ab\ncd");
        doc.apply(&[edit((1, 99), (7, 0), "!")], 1).await.unwrap();
        assert_eq!(doc.text().await, "ab\ncd!");
    }

    #[tokio::test]
    async fn test_past_end_of_line_stays_on_that_line() {
        let doc = create_test_document("ab\ncd\n");
        doc.apply(&[edit((0, 99), (0, 99), "!")], 1).await.unwrap();
        assert_eq!(doc.text().await, "ab!\ncd\n");

        let doc = create_test_document("ab\r\ncd");
        doc.apply(&[edit((0, 10), (0, 10), "?")], 1).await.unwrap();
        assert_eq!(doc.text().await, "ab?\r\ncd");
    }

    #[tokio::test]
    async fn test_snapshot() {
        let doc = create_test_document("x = 1");
        let snapshot = doc.snapshot().await;
        assert_eq!(snapshot.uri, "file:///test.py");
        assert_eq!(snapshot.version, 0);
        assert_eq!(snapshot.language_id, "python");
        assert_eq!(&*snapshot.text, "x = 1");
    }
}
