//! Error types shared by the Glue and FXOM layers.

use thiserror::Error;

/// A line/column location in markup source (both 1-based).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TextPosition {
    pub line: usize,
    pub column: usize,
}

impl TextPosition {
    /// Locate a byte offset within `source`.
    pub fn at_offset(source: &str, offset: usize) -> Self {
        let offset = offset.min(source.len());
        let before = &source[..offset];
        let line = before.matches('\n').count() + 1;
        let column = match before.rfind('\n') {
            Some(nl) => before[nl + 1..].chars().count() + 1,
            None => before.chars().count() + 1,
        };
        Self { line, column }
    }
}

/// Markup or object-graph load failure. Nothing is partially applied.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message} at line {}, column {}", .position.line, .position.column)]
pub struct ParseError {
    pub message: String,
    pub position: TextPosition,
}

impl ParseError {
    pub fn new(message: impl Into<String>, position: TextPosition) -> Self {
        Self {
            message: message.into(),
            position,
        }
    }
}

/// Violation of a structural invariant of the Glue or FXOM tree.
///
/// These indicate a programming error in the caller; mutation methods raise
/// them before touching either tree.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StructureError {
    #[error("node is already attached to a parent")]
    AlreadyAttached,
    #[error("node is not attached to a parent")]
    NotAttached,
    #[error("structural edit outside of a begin_update/end_update bracket")]
    NotUpdating,
    #[error("expected a {expected} node")]
    WrongKind { expected: &'static str },
    #[error("index {index} out of range (len {len})")]
    IndexOutOfRange { index: usize, len: usize },
    #[error("unknown node handle")]
    UnknownNode,
    #[error("instance already has a property named `{0}`")]
    DuplicateProperty(String),
    #[error("inconsistent tree: {0}")]
    Inconsistent(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn position_counts_lines_and_columns() {
        let src = "<a>\n  <b/>\n</a>";
        let offset = src.find("<b").unwrap();
        assert_eq!(
            TextPosition::at_offset(src, offset),
            TextPosition { line: 2, column: 3 }
        );
    }

    #[test]
    fn parse_error_display_includes_location() {
        let err = ParseError::new("unexpected end tag", TextPosition { line: 3, column: 7 });
        assert_eq!(err.to_string(), "unexpected end tag at line 3, column 7");
    }
}
