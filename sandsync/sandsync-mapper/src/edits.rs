//! Byte-level source edits and line/column conversion.
//!
//! Edits are collected against the original text and spliced in reverse
//! byte order, so earlier offsets stay valid while later ones are applied.
//! Text outside the edited ranges is preserved byte for byte.

use sandsync_core::{Position, Result, SyncError, TagRange};
use tree_sitter::Node;

/// Edit operation to be applied to source code
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceEdit {
    pub start_byte: usize,
    pub end_byte: usize,
    pub new_text: String,
}

impl SourceEdit {
    pub fn insert(at: usize, text: impl Into<String>) -> Self {
        Self {
            start_byte: at,
            end_byte: at,
            new_text: text.into(),
        }
    }

    pub fn replace(start_byte: usize, end_byte: usize, text: impl Into<String>) -> Self {
        Self {
            start_byte,
            end_byte,
            new_text: text.into(),
        }
    }
}

/// Apply edits to `source`, returning the new text.
///
/// Fails if two edits overlap or an offset does not fall on a character boundary.
pub fn apply_edits(source: &str, edits: &[SourceEdit]) -> Result<String> {
    let mut sorted: Vec<&SourceEdit> = edits.iter().collect();
    sorted.sort_by(|a, b| b.start_byte.cmp(&a.start_byte).then(b.end_byte.cmp(&a.end_byte)));

    let mut new_source = source.to_string();
    let mut lower_bound = source.len() + 1;

    for edit in sorted {
        if edit.start_byte > edit.end_byte || edit.end_byte > source.len() {
            return Err(SyncError::mapping(format!(
                "Edit range {}..{} is outside the source",
                edit.start_byte, edit.end_byte
            )));
        }
        if edit.end_byte > lower_bound {
            return Err(SyncError::mapping(format!(
                "Overlapping edits at byte {}",
                edit.start_byte
            )));
        }
        if !source.is_char_boundary(edit.start_byte) || !source.is_char_boundary(edit.end_byte) {
            return Err(SyncError::mapping(format!(
                "Edit at byte {} splits a character",
                edit.start_byte
            )));
        }

        new_source.replace_range(edit.start_byte..edit.end_byte, &edit.new_text);
        lower_bound = edit.start_byte;
    }

    Ok(new_source)
}

/// Line start offsets of a text, for position to byte conversion.
pub struct LineIndex {
    line_starts: Vec<usize>,
    len: usize,
}

impl LineIndex {
    pub fn new(source: &str) -> Self {
        let mut line_starts = vec![0];
        line_starts.extend(
            source
                .bytes()
                .enumerate()
                .filter(|(_, b)| *b == b'\n')
                .map(|(i, _)| i + 1),
        );
        Self {
            line_starts,
            len: source.len(),
        }
    }

    /// Convert a position (line, column) to a byte offset.
    ///
    /// Returns `None` when the line does not exist or the column runs past its end.
    pub fn byte_offset(&self, pos: Position) -> Option<usize> {
        let start = *self.line_starts.get(pos.line)?;
        let end = self
            .line_starts
            .get(pos.line + 1)
            .map(|next| next - 1)
            .unwrap_or(self.len);
        let offset = start + pos.column;
        (offset <= end).then_some(offset)
    }
}

/// Position of a node's start in the mapper's coordinate system.
pub fn node_start(node: &Node<'_>) -> Position {
    let point = node.start_position();
    Position::new(point.row, point.column)
}

/// Position of a node's end in the mapper's coordinate system.
pub fn node_end(node: &Node<'_>) -> Position {
    let point = node.end_position();
    Position::new(point.row, point.column)
}

pub fn tag_range(node: &Node<'_>) -> TagRange {
    TagRange {
        start: node_start(node),
        end: node_end(node),
    }
}

/// Slice of `content` between two positions.
pub fn slice_between<'a>(content: &'a str, start: Position, end: Position) -> Option<&'a str> {
    let index = LineIndex::new(content);
    let start = index.byte_offset(start)?;
    let end = index.byte_offset(end)?;
    if start > end {
        return None;
    }
    content.get(start..end)
}
