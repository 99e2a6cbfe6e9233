//! Editor session: one open document with its selection and undo history.
//!
//! The session owns the authoritative object graph. Every user edit goes
//! through a job executed here, so the document, the selection and the
//! undo stack never disagree. Text comes in through `from_text` or
//! `reload_text` and goes out through `save_text`.

use crate::commands::JobManager;
use crate::drop_target::{DropTarget, make_drop_job};
use crate::job::{Job, JobContext, JobError};
use crate::selection::{Selection, SelectionEvent};
use fxml_core::{
    DocumentEvent, FormatConfig, FxomDocument, GlueConfig, LintDiagnostic, LiveObjectFactory,
    Metadata, Name, ObjectId, ParseError, format_loaded, lint_document,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Session options.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EditorConfig {
    /// Undo history depth. Default: **100**.
    pub undo_depth: usize,
    /// Indentation of inserted elements.
    pub glue: GlueConfig,
    /// Passes applied by `save_text`.
    pub format: FormatConfig,
}

impl Default for EditorConfig {
    fn default() -> Self {
        Self {
            undo_depth: 100,
            glue: GlueConfig::default(),
            format: FormatConfig::default(),
        }
    }
}

pub struct EditorSession {
    document: FxomDocument,
    selection: Selection,
    jobs: JobManager,
    config: EditorConfig,
}

impl EditorSession {
    /// A session over an empty document.
    pub fn new(metadata: Arc<dyn Metadata>, config: EditorConfig) -> Self {
        let mut document = FxomDocument::new(metadata);
        document.set_glue_config(config.glue.clone());
        Self {
            document,
            selection: Selection::new(),
            jobs: JobManager::new(config.undo_depth),
            config,
        }
    }

    /// Load a session from FXML source text.
    pub fn from_text(
        text: &str,
        metadata: Arc<dyn Metadata>,
        config: EditorConfig,
    ) -> Result<Self, ParseError> {
        let mut document = FxomDocument::parse(text, metadata)?;
        document.set_glue_config(config.glue.clone());
        Ok(Self {
            document,
            selection: Selection::new(),
            jobs: JobManager::new(config.undo_depth),
            config,
        })
    }

    /// Replace the document with freshly parsed text. History and selection
    /// are dropped; on error the session is unchanged.
    pub fn reload_text(&mut self, text: &str) -> Result<(), ParseError> {
        let mut document = FxomDocument::parse(text, self.document.metadata_handle())?;
        document.set_glue_config(self.config.glue.clone());
        self.document = document;
        self.selection.clear();
        self.jobs.clear();
        log::debug!("session: reloaded {} bytes", text.len());
        Ok(())
    }

    pub fn document(&self) -> &FxomDocument {
        &self.document
    }

    /// Direct access for object creation. Structural edits belong in jobs.
    pub fn document_mut(&mut self) -> &mut FxomDocument {
        &mut self.document
    }

    pub fn selection(&self) -> &Selection {
        &self.selection
    }

    /// Selection changes made here are not recorded in the undo history.
    pub fn selection_mut(&mut self) -> &mut Selection {
        &mut self.selection
    }

    pub fn jobs(&self) -> &JobManager {
        &self.jobs
    }

    pub fn config(&self) -> &EditorConfig {
        &self.config
    }

    // ─── Editing ─────────────────────────────────────────────────────────

    /// Execute a job and record it for undo.
    pub fn execute(&mut self, job: Job) -> Result<(), JobError> {
        let mut ctx = JobContext::new(&mut self.document, &mut self.selection);
        self.jobs.execute(job, &mut ctx)
    }

    pub fn undo(&mut self) -> Result<Option<String>, JobError> {
        let mut ctx = JobContext::new(&mut self.document, &mut self.selection);
        let description = self.jobs.undo(&mut ctx)?;
        self.selection.prune(&self.document);
        Ok(description)
    }

    pub fn redo(&mut self) -> Result<Option<String>, JobError> {
        let mut ctx = JobContext::new(&mut self.document, &mut self.selection);
        let description = self.jobs.redo(&mut ctx)?;
        self.selection.prune(&self.document);
        Ok(description)
    }

    /// Drop `dragged` on `target`. Returns `false` when the drop is not
    /// accepted.
    pub fn drop_objects(
        &mut self,
        target: &DropTarget,
        dragged: &[ObjectId],
    ) -> Result<bool, JobError> {
        let Some(job) = make_drop_job(&self.document, target, dragged) else {
            return Ok(false);
        };
        self.execute(job)?;
        Ok(true)
    }

    pub fn delete_selection(&mut self) -> Result<(), JobError> {
        self.execute(Job::delete_selection())
    }

    /// Set or clear a text property of `object`.
    pub fn set_property(
        &mut self,
        object: ObjectId,
        name: &str,
        value: Option<&str>,
    ) -> Result<(), JobError> {
        self.execute(Job::modify_object(
            object,
            Name::intern(name),
            value.map(str::to_string),
        ))
    }

    pub fn set_fx_id(&mut self, object: ObjectId, fx_id: Option<&str>) -> Result<(), JobError> {
        self.execute(Job::set_fx_id(object, fx_id.map(str::to_string)))
    }

    // ─── Output ──────────────────────────────────────────────────────────

    /// Text to write back to disk, after the configured format passes.
    ///
    /// The import header is rewritten in place on the document, outside any
    /// job: it is not recorded for undo, publishes no revision, and stays
    /// rewritten after the call.
    pub fn save_text(&mut self) -> String {
        format_loaded(&mut self.document, &self.config.format)
    }

    pub fn lint(&self) -> Vec<LintDiagnostic> {
        lint_document(&self.document)
    }

    pub fn take_document_events(&mut self) -> Vec<DocumentEvent> {
        self.document.take_events()
    }

    pub fn take_selection_events(&mut self) -> Vec<SelectionEvent> {
        self.selection.take_events()
    }

    /// Start mirroring the document into live objects.
    pub fn attach_live_factory(&mut self, factory: Box<dyn LiveObjectFactory>) {
        let placeholder = FxomDocument::new(self.document.metadata_handle());
        let document = std::mem::replace(&mut self.document, placeholder);
        self.document = document.with_live_factory(factory);
    }
}
