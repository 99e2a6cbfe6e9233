pub mod collect;
pub mod emitter;
pub mod error;
pub mod format;
pub mod fxom;
pub mod glue;
pub mod imports;
pub mod lint;
pub mod live;
pub mod loader;
pub mod metadata;
pub mod name;
pub mod parser;

pub use collect::{Collect, Collector};
pub use emitter::serialize;
pub use error::{ParseError, StructureError, TextPosition};
pub use format::{FormatConfig, format_document, format_loaded};
pub use fxom::{DocumentEvent, FxomDocument, ObjectId, PropertyId};
pub use glue::{GlueConfig, GlueDocument, GlueId};
pub use lint::{LintDiagnostic, LintSeverity, lint_document};
pub use live::{LiveError, LiveHandle, LiveObjectFactory, MirrorFactory};
pub use metadata::{Accessory, IntrinsicKind, Metadata, MetadataRegistry};
pub use name::Name;
pub use parser::parse_glue;
