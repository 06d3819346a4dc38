//! Hover content for documentation blocks

use std::sync::Arc;

use tower_lsp::lsp_types::{Hover, HoverContents, MarkupContent, MarkupKind, Position, Range};

use crate::docstrings::{DetectionPattern, DocumentationBlock, SyntaxFamily, strip_content};

/// Innermost block containing `position`
///
/// Overlapping blocks can be reported by different patterns; the one
/// spanning the fewest lines wins.
pub fn block_at(blocks: &[DocumentationBlock], position: Position) -> Option<&DocumentationBlock> {
    let line = position.line as usize;
    let character = position.character as usize;

    blocks
        .iter()
        .filter(|block| {
            block.contains_line(line)
                && (line != block.start_line || character >= block.start_column)
                && (line != block.end_line || character <= block.end_column)
        })
        .min_by_key(|block| (block.line_count(), block.start_line))
}

/// Syntax family of the pattern whose start marker opens `block`
fn family_of(block: &DocumentationBlock, patterns: &[Arc<DetectionPattern>]) -> SyntaxFamily {
    let first_line = block.raw_content.lines().next().unwrap_or_default();
    patterns
        .iter()
        .find(|pattern| pattern.start.is_match(first_line))
        .map(|pattern| pattern.family)
        .unwrap_or_default()
}

/// Markdown hover showing the block content without comment markers
pub fn hover_for_block(block: &DocumentationBlock, patterns: &[Arc<DetectionPattern>]) -> Hover {
    let content = strip_content(family_of(block, patterns).extractor(), &block.raw_content);
    let value = if content.trim().is_empty() {
        block.preview.clone()
    } else {
        content
    };

    Hover {
        contents: HoverContents::Markup(MarkupContent {
            kind: MarkupKind::Markdown,
            value,
        }),
        range: Some(Range {
            start: Position {
                line: block.start_line as u32,
                character: block.start_column as u32,
            },
            end: Position {
                line: block.end_line as u32,
                character: block.end_column as u32,
            },
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::docstrings::{CancellationToken, DocstringDetector, PatternRegistry};

    fn detect(text: &str, language: &str) -> (Vec<DocumentationBlock>, Vec<Arc<DetectionPattern>>) {
        let registry = Arc::new(PatternRegistry::with_builtins());
        let patterns = registry.lookup(language).to_vec();
        let blocks = DocstringDetector::new(registry).detect(text, language, &CancellationToken::new());
        (blocks, patterns)
    }

    fn markdown(hover: &Hover) -> &str {
        match &hover.contents {
            HoverContents::Markup(markup) => &markup.value,
            other => panic!("unexpected hover contents: {other:?}"),
        }
    }

    #[test]
    fn test_block_at_respects_columns() {
        let (blocks, _) = detect("x = 1  # \"\"\"\n    \"\"\"Doc\"\"\"", "python");
        assert_eq!(blocks.len(), 1);

        assert!(block_at(&blocks, Position { line: 1, character: 2 }).is_none());
        assert!(block_at(&blocks, Position { line: 1, character: 5 }).is_some());
        assert!(block_at(&blocks, Position { line: 0, character: 0 }).is_none());
    }

    #[test]
    fn test_hover_strips_block_comment_markers() {
        let (blocks, patterns) = detect("/**\n * Adds two numbers.\n * @param a first\n */", "java");
        let block = block_at(&blocks, Position { line: 1, character: 3 }).unwrap();
        let hover = hover_for_block(block, &patterns);

        assert_eq!(markdown(&hover), "Adds two numbers.\n@param a first");
        assert_eq!(hover.range.unwrap().end, Position { line: 3, character: 3 });
    }

    #[test]
    fn test_hover_omits_code_after_close() {
        let (blocks, patterns) = detect("/**\n * Creates a widget.\n */ Widget create();", "java");
        assert_eq!(markdown(&hover_for_block(&blocks[0], &patterns)), "Creates a widget.");

        let (blocks, patterns) = detect("def f():\n    \"\"\"Doc\"\"\" # trailing", "python");
        assert_eq!(markdown(&hover_for_block(&blocks[0], &patterns)), "Doc");
    }

    #[test]
    fn test_hover_strips_line_prefix() {
        let (blocks, patterns) = detect("/// First\n/// Second\nfn f() {}", "rust");
        let hover = hover_for_block(&blocks[0], &patterns);
        assert_eq!(markdown(&hover), "First\nSecond");
    }

    #[test]
    fn test_empty_block_falls_back_to_preview() {
        let (blocks, patterns) = detect("\"\"\"\n\"\"\"", "python");
        let hover = hover_for_block(&blocks[0], &patterns);
        assert_eq!(markdown(&hover), "Docstring");
    }
}
