//! Output records of the detection engine

use serde::{Deserialize, Serialize};

/// A detected documentation block
///
/// Coordinates are 0-based and inclusive of both boundary lines. Columns are
/// counted in characters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentationBlock {
    pub start_line: usize,
    pub start_column: usize,
    pub end_line: usize,
    pub end_column: usize,
    /// Source lines `start_line..=end_line`, joined with `\n`
    pub raw_content: String,
    pub preview: String,
    pub language: String,
    pub is_single_line: bool,
}

impl DocumentationBlock {
    /// Position tuple used for duplicate elimination
    pub fn position_key(&self) -> (usize, usize, usize, usize) {
        (self.start_line, self.start_column, self.end_line, self.end_column)
    }

    pub fn line_count(&self) -> usize {
        self.end_line - self.start_line + 1
    }

    /// Whether `line` falls inside the block
    pub fn contains_line(&self, line: usize) -> bool {
        self.start_line <= line && line <= self.end_line
    }
}
