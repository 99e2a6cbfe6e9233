//! Save pipeline: parse → import sync → emit.
//!
//! Single idempotent entry point used when a document is written back to
//! disk. Everything the author wrote survives; only the import header and,
//! when compressing, whitespace runs change.

use crate::error::ParseError;
use crate::fxom::FxomDocument;
use crate::imports::sync_imports;
use crate::metadata::Metadata;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

// ─── Config ───────────────────────────────────────────────────────────────

/// Configuration for `format_document`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FormatConfig {
    /// Drop whitespace-only text and indentation. Default: **false**.
    pub compress: bool,

    /// Rewrite the `<?import?>` header to match the classes in use.
    /// Default: **true**.
    pub sync_imports: bool,
}

impl Default for FormatConfig {
    fn default() -> Self {
        Self {
            compress: false,
            sync_imports: true,
        }
    }
}

// ─── Pipeline ─────────────────────────────────────────────────────────────

/// Parse an FXML document, apply the configured passes, and re-emit it.
///
/// The output is idempotent: `format_document(format_document(s, c), c) == format_document(s, c)`.
///
/// # Errors
/// Returns the parse or load error if the input is not a valid document.
pub fn format_document(
    text: &str,
    config: &FormatConfig,
    metadata: Arc<dyn Metadata>,
) -> Result<String, ParseError> {
    let mut doc = FxomDocument::parse(text, metadata)?;
    if config.sync_imports {
        sync_imports(&mut doc);
    }
    Ok(doc.serialize(config.compress))
}

/// Serialize an already loaded document with the configured passes. The
/// import pass edits `doc` directly and publishes no revision.
pub fn format_loaded(doc: &mut FxomDocument, config: &FormatConfig) -> String {
    if config.sync_imports {
        sync_imports(doc);
    }
    doc.serialize(config.compress)
}

// ─── Tests ────────────────────────────────────────────────────────────────
