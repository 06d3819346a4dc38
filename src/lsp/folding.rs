//! Documentation blocks as LSP folding ranges

use std::sync::Arc;

use tower_lsp::lsp_types::{FoldingRange, FoldingRangeKind};

use crate::cache::TtlCache;
use crate::docstrings::DocumentationBlock;

/// Folding ranges keyed like the detection cache
pub type FoldingCache = TtlCache<String, Arc<Vec<FoldingRange>>>;

/// Converts multi-line blocks to comment folding ranges, sorted by position
///
/// Single-line blocks have nothing to fold and are skipped. With
/// `show_preview` the block preview becomes the range's collapsed text.
pub fn folding_ranges(blocks: &[DocumentationBlock], show_preview: bool) -> Vec<FoldingRange> {
    let mut foldable: Vec<&DocumentationBlock> = blocks.iter().filter(|b| !b.is_single_line).collect();
    foldable.sort_by_key(|b| (b.start_line, b.start_column, b.end_line));

    foldable
        .into_iter()
        .map(|block| FoldingRange {
            start_line: block.start_line as u32,
            start_character: Some(block.start_column as u32),
            end_line: block.end_line as u32,
            end_character: Some(block.end_column as u32),
            kind: Some(FoldingRangeKind::Comment),
            collapsed_text: show_preview.then(|| block.preview.clone()),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn block(start_line: usize, end_line: usize, preview: &str) -> DocumentationBlock {
        DocumentationBlock {
            start_line,
            start_column: 4,
            end_line,
            end_column: 7,
            raw_content: "\n".repeat(end_line - start_line),
            preview: preview.to_string(),
            language: "python".to_string(),
            is_single_line: start_line == end_line,
        }
    }

    #[test]
    fn test_single_line_blocks_skipped() {
        let ranges = folding_ranges(&[block(0, 0, "a"), block(2, 5, "b")], true);
        assert_eq!(ranges.len(), 1);
        assert_eq!((ranges[0].start_line, ranges[0].end_line), (2, 5));
        assert_eq!(ranges[0].kind, Some(FoldingRangeKind::Comment));
        assert_eq!(ranges[0].collapsed_text.as_deref(), Some("b"));
    }

    #[test]
    fn test_sorted_by_start_line() {
        let ranges = folding_ranges(&[block(10, 12, "late"), block(1, 3, "early")], false);
        let starts: Vec<u32> = ranges.iter().map(|r| r.start_line).collect();
        assert_eq!(starts, vec![1, 10]);
        assert!(ranges.iter().all(|r| r.collapsed_text.is_none()));
    }
}
