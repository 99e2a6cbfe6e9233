//! Jobs: undoable edits of a document and its selection.
//!
//! A job is checked with `is_executable`, run once with `execute`, and then
//! alternates between `undo` and `redo`. Primitive jobs make one FXOM edit
//! and remember what they need to reverse it exactly. Composite jobs decide
//! their sub-jobs at execute time, from the document as it is then, and
//! replay them afterwards. Batch jobs run a list the caller assembled.
//!
//! When a sub-job fails, the sub-jobs that already ran are undone in
//! reverse order and the parent job stays `Idle`.

use crate::mask::HierarchyMask;
use crate::selection::{Selection, SelectionGroup};
use fxml_core::fxom::{PropertyRemoval, TextRestore};
use fxml_core::{FxomDocument, Name, ObjectId, PropertyId, StructureError};
use thiserror::Error;

const DEFINE: &str = "fx:define";

// ─── State and errors ────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    Idle,
    Executed,
    Undone,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum JobError {
    #[error("job is not executable")]
    NotExecutable,
    #[error("cannot {action} a job in state {state:?}")]
    InvalidState {
        action: &'static str,
        state: JobState,
    },
    #[error(transparent)]
    Structure(#[from] StructureError),
}

/// What a job works on.
pub struct JobContext<'a> {
    pub document: &'a mut FxomDocument,
    pub selection: &'a mut Selection,
}

impl<'a> JobContext<'a> {
    pub fn new(document: &'a mut FxomDocument, selection: &'a mut Selection) -> Self {
        Self {
            document,
            selection,
        }
    }
}

// ─── Jobs ────────────────────────────────────────────────────────────────

/// The closed set of jobs. Fields named `previous`, `removed`, `moved`,
/// `removal` and `restore` are undo records filled in on execution;
/// `jobs` of a composite is empty until it executes.
#[derive(Debug)]
pub enum JobKind {
    AddPropertyValue {
        property: PropertyId,
        index: usize,
        object: ObjectId,
    },
    RemovePropertyValue {
        object: ObjectId,
        removed: Option<(PropertyId, usize)>,
    },
    /// Move `object` in front of `before`, or to the end.
    ReIndexObject {
        object: ObjectId,
        before: Option<ObjectId>,
        moved: Option<(usize, usize)>,
    },
    AddProperty {
        instance: ObjectId,
        property: PropertyId,
        removal: Option<PropertyRemoval>,
    },
    RemoveProperty {
        property: PropertyId,
        removal: Option<PropertyRemoval>,
    },
    ModifyValue {
        property: PropertyId,
        value: String,
        restore: Option<TextRestore>,
    },
    SetFxId {
        object: ObjectId,
        fx_id: Option<String>,
        previous: Option<String>,
    },
    SetDocumentRoot {
        root: Option<ObjectId>,
        previous: Option<ObjectId>,
    },
    UpdateSelection {
        group: Option<SelectionGroup>,
        previous: Option<SelectionGroup>,
    },
    RemoveObject {
        object: ObjectId,
        jobs: Vec<Job>,
    },
    InsertAsAccessory {
        target: ObjectId,
        accessory: Name,
        object: ObjectId,
        before: Option<ObjectId>,
        jobs: Vec<Job>,
    },
    /// Set (`Some`) or clear (`None`) a text property.
    ModifyObject {
        object: ObjectId,
        property: Name,
        value: Option<String>,
        jobs: Vec<Job>,
    },
    DeleteSelection {
        jobs: Vec<Job>,
    },
    Batch {
        jobs: Vec<Job>,
        description: String,
        document_bracket: bool,
        selection_bracket: bool,
    },
}

#[derive(Debug)]
pub struct Job {
    kind: JobKind,
    state: JobState,
}

impl From<JobKind> for Job {
    fn from(kind: JobKind) -> Self {
        Self {
            kind,
            state: JobState::Idle,
        }
    }
}

// ─── Constructors ────────────────────────────────────────────────────────

impl Job {
    pub fn add_property_value(property: PropertyId, index: usize, object: ObjectId) -> Self {
        JobKind::AddPropertyValue {
            property,
            index,
            object,
        }
        .into()
    }

    pub fn remove_property_value(object: ObjectId) -> Self {
        JobKind::RemovePropertyValue {
            object,
            removed: None,
        }
        .into()
    }

    pub fn reindex_object(object: ObjectId, before: Option<ObjectId>) -> Self {
        JobKind::ReIndexObject {
            object,
            before,
            moved: None,
        }
        .into()
    }

    pub fn add_property(instance: ObjectId, property: PropertyId) -> Self {
        JobKind::AddProperty {
            instance,
            property,
            removal: None,
        }
        .into()
    }

    pub fn remove_property(property: PropertyId) -> Self {
        JobKind::RemoveProperty {
            property,
            removal: None,
        }
        .into()
    }

    pub fn modify_value(property: PropertyId, value: impl Into<String>) -> Self {
        JobKind::ModifyValue {
            property,
            value: value.into(),
            restore: None,
        }
        .into()
    }

    pub fn set_fx_id(object: ObjectId, fx_id: Option<String>) -> Self {
        JobKind::SetFxId {
            object,
            fx_id,
            previous: None,
        }
        .into()
    }

    pub fn set_document_root(root: Option<ObjectId>) -> Self {
        JobKind::SetDocumentRoot {
            root,
            previous: None,
        }
        .into()
    }

    pub fn update_selection(group: Option<SelectionGroup>) -> Self {
        JobKind::UpdateSelection {
            group,
            previous: None,
        }
        .into()
    }

    pub fn remove_object(object: ObjectId) -> Self {
        JobKind::RemoveObject {
            object,
            jobs: Vec::new(),
        }
        .into()
    }

    pub fn insert_as_accessory(
        target: ObjectId,
        accessory: Name,
        object: ObjectId,
        before: Option<ObjectId>,
    ) -> Self {
        JobKind::InsertAsAccessory {
            target,
            accessory,
            object,
            before,
            jobs: Vec::new(),
        }
        .into()
    }

    pub fn modify_object(object: ObjectId, property: Name, value: Option<String>) -> Self {
        JobKind::ModifyObject {
            object,
            property,
            value,
            jobs: Vec::new(),
        }
        .into()
    }

    pub fn delete_selection() -> Self {
        JobKind::DeleteSelection { jobs: Vec::new() }.into()
    }

    /// A batch bracketing both document and selection updates.
    pub fn batch(jobs: Vec<Job>, description: impl Into<String>) -> Self {
        JobKind::Batch {
            jobs,
            description: description.into(),
            document_bracket: true,
            selection_bracket: true,
        }
        .into()
    }

    /// Choose which update brackets a batch opens. No effect on other jobs.
    pub fn with_brackets(mut self, document: bool, selection: bool) -> Self {
        if let JobKind::Batch {
            document_bracket,
            selection_bracket,
            ..
        } = &mut self.kind
        {
            *document_bracket = document;
            *selection_bracket = selection;
        }
        self
    }
}

// ─── Queries ─────────────────────────────────────────────────────────────

impl Job {
    pub fn kind(&self) -> &JobKind {
        &self.kind
    }

    pub fn state(&self) -> JobState {
        self.state
    }

    /// Sub-jobs of a composite or batch; empty for primitives and for
    /// composites that have not executed.
    pub fn sub_jobs(&self) -> &[Job] {
        match &self.kind {
            JobKind::RemoveObject { jobs, .. }
            | JobKind::InsertAsAccessory { jobs, .. }
            | JobKind::ModifyObject { jobs, .. }
            | JobKind::DeleteSelection { jobs }
            | JobKind::Batch { jobs, .. } => jobs,
            _ => &[],
        }
    }

    pub fn name(&self) -> &'static str {
        match &self.kind {
            JobKind::AddPropertyValue { .. } => "AddPropertyValue",
            JobKind::RemovePropertyValue { .. } => "RemovePropertyValue",
            JobKind::ReIndexObject { .. } => "ReIndexObject",
            JobKind::AddProperty { .. } => "AddProperty",
            JobKind::RemoveProperty { .. } => "RemoveProperty",
            JobKind::ModifyValue { .. } => "ModifyValue",
            JobKind::SetFxId { .. } => "SetFxId",
            JobKind::SetDocumentRoot { .. } => "SetDocumentRoot",
            JobKind::UpdateSelection { .. } => "UpdateSelection",
            JobKind::RemoveObject { .. } => "RemoveObject",
            JobKind::InsertAsAccessory { .. } => "InsertAsAccessory",
            JobKind::ModifyObject { .. } => "ModifyObject",
            JobKind::DeleteSelection { .. } => "DeleteSelection",
            JobKind::Batch { .. } => "Batch",
        }
    }

    /// Text for an undo/redo menu entry.
    pub fn description(&self, doc: &FxomDocument) -> String {
        match &self.kind {
            JobKind::AddPropertyValue { object, .. } => format!("Add {}", label(doc, *object)),
            JobKind::RemovePropertyValue { object, .. } => {
                format!("Remove {}", label(doc, *object))
            }
            JobKind::ReIndexObject { object, .. } => format!("Move {}", label(doc, *object)),
            JobKind::AddProperty { property, .. } => {
                format!("Add property `{}`", doc.property_name(*property))
            }
            JobKind::RemoveProperty { property, .. } => {
                format!("Remove property `{}`", doc.property_name(*property))
            }
            JobKind::ModifyValue { property, .. } => {
                format!("Set `{}`", doc.property_name(*property))
            }
            JobKind::SetFxId { .. } => "Set fx:id".to_string(),
            JobKind::SetDocumentRoot { .. } => "Set document root".to_string(),
            JobKind::UpdateSelection { .. } => "Select".to_string(),
            JobKind::RemoveObject { object, .. } => format!("Delete {}", label(doc, *object)),
            JobKind::InsertAsAccessory {
                object, accessory, ..
            } => format!("Insert {} into `{accessory}`", label(doc, *object)),
            JobKind::ModifyObject {
                property,
                value: Some(_),
                ..
            } => format!("Set `{property}`"),
            JobKind::ModifyObject { property, .. } => format!("Clear `{property}`"),
            JobKind::DeleteSelection { .. } => "Delete".to_string(),
            JobKind::Batch { description, .. } => description.clone(),
        }
    }

    /// Guard evaluated before the first execution.
    pub fn is_executable(&self, ctx: &JobContext<'_>) -> bool {
        let doc: &FxomDocument = &*ctx.document;
        match &self.kind {
            JobKind::AddPropertyValue {
                property,
                index,
                object,
            } => {
                doc.contains_property(*property)
                    && doc.is_collection(*property)
                    && *index <= doc.values(*property).len()
                    && is_detached(doc, *object)
                    && doc
                        .parent_instance(*property)
                        .is_none_or(|owner| !is_self_or_descendant(doc, owner, *object))
            }
            JobKind::RemovePropertyValue { object, .. } => {
                doc.contains_object(*object) && doc.parent_property(*object).is_some()
            }
            JobKind::ReIndexObject { object, before, .. } => {
                doc.contains_object(*object)
                    && doc.parent_property(*object).is_some_and(|property| {
                        before.is_none_or(|b| {
                            b != *object
                                && doc.contains_object(b)
                                && doc.parent_property(b) == Some(property)
                        })
                    })
            }
            JobKind::AddProperty {
                instance, property, ..
            } => {
                doc.contains_object(*instance)
                    && doc.class_name(*instance).is_some()
                    && doc.contains_property(*property)
                    && doc.parent_instance(*property).is_none()
                    && doc
                        .find_property(*instance, doc.property_name(*property))
                        .is_none()
            }
            JobKind::RemoveProperty { property, .. } => {
                doc.contains_property(*property) && doc.parent_instance(*property).is_some()
            }
            JobKind::ModifyValue { property, .. } => {
                doc.contains_property(*property) && doc.text_value(*property).is_some()
            }
            JobKind::SetFxId { object, .. } => doc.contains_object(*object),
            JobKind::SetDocumentRoot { root, .. } => {
                doc.root() != *root && root.is_none_or(|r| is_detached(doc, r))
            }
            JobKind::UpdateSelection { .. } => true,
            JobKind::RemoveObject { object, .. } => {
                doc.contains_object(*object)
                    && (doc.parent_property(*object).is_some() || doc.root() == Some(*object))
            }
            JobKind::InsertAsAccessory {
                target,
                accessory,
                object,
                ..
            } => can_insert(doc, *target, *accessory, *object),
            JobKind::ModifyObject {
                object,
                property,
                value,
                ..
            } => {
                doc.contains_object(*object)
                    && doc.class_name(*object).is_some()
                    && match doc.find_property(*object, *property) {
                        Some(existing) => doc
                            .text_value(existing)
                            .is_some_and(|current| value.as_deref() != Some(current)),
                        None => value.is_some(),
                    }
            }
            JobKind::DeleteSelection { .. } => !deletable(doc, &*ctx.selection).is_empty(),
            JobKind::Batch { jobs, .. } => !jobs.is_empty(),
        }
    }
}

fn label(doc: &FxomDocument, object: ObjectId) -> String {
    match (doc.class_name(object), doc.intrinsic_kind(object)) {
        (Some(class), _) => class.to_string(),
        (None, Some(kind)) => kind.tag().to_string(),
        (None, None) => "object".to_string(),
    }
}

fn is_detached(doc: &FxomDocument, object: ObjectId) -> bool {
    doc.contains_object(object)
        && doc.parent_property(object).is_none()
        && doc.root() != Some(object)
}

/// `object` is `candidate` or one of its ancestors.
fn is_self_or_descendant(doc: &FxomDocument, object: ObjectId, candidate: ObjectId) -> bool {
    object == candidate || doc.is_descendant_of(object, candidate)
}

fn can_insert(doc: &FxomDocument, target: ObjectId, accessory: Name, object: ObjectId) -> bool {
    if !doc.contains_object(target)
        || !is_detached(doc, object)
        || is_self_or_descendant(doc, target, object)
    {
        return false;
    }
    let mask = HierarchyMask::new(doc, target);
    if mask.class().is_none() {
        return false;
    }
    let existing = doc.find_property(target, accessory);
    if existing.is_some_and(|p| !doc.is_collection(p)) {
        return false;
    }
    match mask.accessory(accessory) {
        Some(declared) => mask.has_room(&declared) && mask.is_accepting(&declared, object),
        None => existing.is_some() || accessory.as_str() == DEFINE,
    }
}

/// Selected objects that can be removed: attached, and not inside another
/// selected object.
fn deletable(doc: &FxomDocument, selection: &Selection) -> Vec<ObjectId> {
    selection
        .objects()
        .iter()
        .copied()
        .filter(|o| doc.contains_object(*o) && doc.is_attached(*o))
        .filter(|o| {
            doc.parent_object(*o)
                .is_none_or(|parent| selection.lookup_selected_ancestor(doc, parent).is_none())
        })
        .collect()
}

// ─── Execution ───────────────────────────────────────────────────────────

impl Job {
    pub fn execute(&mut self, ctx: &mut JobContext<'_>) -> Result<(), JobError> {
        if self.state != JobState::Idle {
            return Err(JobError::InvalidState {
                action: "execute",
                state: self.state,
            });
        }
        if !self.is_executable(ctx) {
            log::warn!("job: {} rejected", self.name());
            return Err(JobError::NotExecutable);
        }
        self.run(ctx)?;
        self.state = JobState::Executed;
        log::debug!("job: executed {}", self.name());
        Ok(())
    }

    pub fn undo(&mut self, ctx: &mut JobContext<'_>) -> Result<(), JobError> {
        if self.state != JobState::Executed {
            return Err(JobError::InvalidState {
                action: "undo",
                state: self.state,
            });
        }
        self.revert(ctx).inspect_err(|err| {
            log::error!("job: undo of {} failed: {err}", self.name());
        })?;
        self.state = JobState::Undone;
        log::debug!("job: undid {}", self.name());
        Ok(())
    }

    pub fn redo(&mut self, ctx: &mut JobContext<'_>) -> Result<(), JobError> {
        if self.state != JobState::Undone {
            return Err(JobError::InvalidState {
                action: "redo",
                state: self.state,
            });
        }
        self.replay(ctx).inspect_err(|err| {
            log::error!("job: redo of {} failed: {err}", self.name());
        })?;
        self.state = JobState::Executed;
        log::debug!("job: redid {}", self.name());
        Ok(())
    }

    /// Back to a never-executed job, after a rolled back parent.
    fn reset(&mut self) {
        self.state = JobState::Idle;
        match &mut self.kind {
            JobKind::RemoveObject { jobs, .. }
            | JobKind::InsertAsAccessory { jobs, .. }
            | JobKind::ModifyObject { jobs, .. }
            | JobKind::DeleteSelection { jobs } => jobs.clear(),
            JobKind::Batch { jobs, .. } => jobs.iter_mut().for_each(Job::reset),
            _ => {}
        }
    }

    fn run(&mut self, ctx: &mut JobContext<'_>) -> Result<(), JobError> {
        match &mut self.kind {
            JobKind::AddPropertyValue {
                property,
                index,
                object,
            } => edit(ctx.document, |d| d.add_value(*property, *index, *object)),
            JobKind::RemovePropertyValue { object, removed } => {
                *removed = Some(edit(ctx.document, |d| d.remove_value(*object))?);
                Ok(())
            }
            JobKind::ReIndexObject {
                object,
                before,
                moved,
            } => {
                let doc: &FxomDocument = &*ctx.document;
                let property = doc
                    .parent_property(*object)
                    .ok_or(StructureError::NotAttached)?;
                let old = doc
                    .index_in_parent_property(*object)
                    .ok_or(StructureError::NotAttached)?;
                let last = doc.values(property).len().saturating_sub(1);
                let target = match before.and_then(|b| doc.index_in_parent_property(b)) {
                    Some(b) if b > old => b - 1,
                    Some(b) => b,
                    None => last,
                };
                edit(ctx.document, |d| d.move_value(*object, target))?;
                *moved = Some((old, target));
                Ok(())
            }
            JobKind::AddProperty {
                instance, property, ..
            } => edit(ctx.document, |d| d.add_property(*instance, *property)),
            JobKind::RemoveProperty { property, removal } => {
                *removal = Some(edit(ctx.document, |d| d.remove_property(*property))?);
                Ok(())
            }
            JobKind::ModifyValue {
                property,
                value,
                restore,
            } => {
                *restore = Some(edit(ctx.document, |d| d.set_text_value(*property, value.as_str()))?);
                Ok(())
            }
            JobKind::SetFxId {
                object,
                fx_id,
                previous,
            } => {
                *previous = edit(ctx.document, |d| d.set_fx_id(*object, fx_id.as_deref()))?;
                Ok(())
            }
            JobKind::SetDocumentRoot { root, previous } => {
                *previous = edit(ctx.document, |d| d.set_root(*root))?;
                Ok(())
            }
            JobKind::UpdateSelection { group, previous } => {
                *previous = ctx.selection.group().cloned();
                ctx.selection.select(group.clone());
                Ok(())
            }
            JobKind::RemoveObject { object, jobs } => {
                let planned = plan_remove_object(ctx.document, *object);
                *jobs = run_planned(ctx, planned)?;
                Ok(())
            }
            JobKind::InsertAsAccessory {
                target,
                accessory,
                object,
                before,
                jobs,
            } => {
                let planned = plan_insert(ctx.document, *target, *accessory, *object, *before);
                *jobs = run_planned(ctx, planned)?;
                Ok(())
            }
            JobKind::ModifyObject {
                object,
                property,
                value,
                jobs,
            } => {
                let planned = plan_modify_object(ctx.document, *object, *property, value.as_deref());
                *jobs = run_planned(ctx, planned)?;
                Ok(())
            }
            JobKind::DeleteSelection { jobs } => {
                let mut planned = vec![Job::update_selection(None)];
                planned.extend(
                    deletable(ctx.document, ctx.selection)
                        .into_iter()
                        .map(Job::remove_object),
                );
                *jobs = run_planned(ctx, planned)?;
                Ok(())
            }
            JobKind::Batch {
                jobs,
                document_bracket,
                selection_bracket,
                ..
            } => bracketed(ctx, *document_bracket, *selection_bracket, |ctx| {
                execute_all(jobs, ctx)
            }),
        }
    }

    fn revert(&mut self, ctx: &mut JobContext<'_>) -> Result<(), JobError> {
        match &mut self.kind {
            JobKind::AddPropertyValue { object, .. } => {
                edit(ctx.document, |d| d.remove_value(*object).map(drop))
            }
            JobKind::RemovePropertyValue { object, removed } => {
                let (property, index) = removed.ok_or_else(missing_record)?;
                edit(ctx.document, |d| d.add_value(property, index, *object))
            }
            JobKind::ReIndexObject { object, moved, .. } => {
                let (old, _) = moved.ok_or_else(missing_record)?;
                edit(ctx.document, |d| d.move_value(*object, old).map(drop))
            }
            JobKind::AddProperty {
                property, removal, ..
            } => {
                *removal = Some(edit(ctx.document, |d| d.remove_property(*property))?);
                Ok(())
            }
            JobKind::RemoveProperty { property, removal } => {
                let record = removal.as_ref().ok_or_else(missing_record)?;
                edit(ctx.document, |d| d.restore_property(*property, record))
            }
            JobKind::ModifyValue {
                property, restore, ..
            } => swap_text(ctx.document, *property, restore),
            JobKind::SetFxId {
                object, previous, ..
            } => edit(ctx.document, |d| {
                d.set_fx_id(*object, previous.as_deref()).map(drop)
            }),
            JobKind::SetDocumentRoot { previous, .. } => {
                edit(ctx.document, |d| d.set_root(*previous).map(drop))
            }
            JobKind::UpdateSelection { previous, .. } => {
                ctx.selection.select(previous.clone());
                Ok(())
            }
            JobKind::RemoveObject { jobs, .. }
            | JobKind::InsertAsAccessory { jobs, .. }
            | JobKind::ModifyObject { jobs, .. }
            | JobKind::DeleteSelection { jobs } => {
                bracketed(ctx, true, true, |ctx| undo_all(jobs, ctx))
            }
            JobKind::Batch {
                jobs,
                document_bracket,
                selection_bracket,
                ..
            } => bracketed(ctx, *document_bracket, *selection_bracket, |ctx| {
                undo_all(jobs, ctx)
            }),
        }
    }

    fn replay(&mut self, ctx: &mut JobContext<'_>) -> Result<(), JobError> {
        match &mut self.kind {
            JobKind::AddPropertyValue {
                property,
                index,
                object,
            } => edit(ctx.document, |d| d.add_value(*property, *index, *object)),
            JobKind::RemovePropertyValue { object, removed } => {
                *removed = Some(edit(ctx.document, |d| d.remove_value(*object))?);
                Ok(())
            }
            JobKind::ReIndexObject { object, moved, .. } => {
                let (_, target) = moved.ok_or_else(missing_record)?;
                edit(ctx.document, |d| d.move_value(*object, target).map(drop))
            }
            JobKind::AddProperty {
                property, removal, ..
            } => {
                let record = removal.as_ref().ok_or_else(missing_record)?;
                edit(ctx.document, |d| d.restore_property(*property, record))
            }
            JobKind::RemoveProperty { property, removal } => {
                *removal = Some(edit(ctx.document, |d| d.remove_property(*property))?);
                Ok(())
            }
            JobKind::ModifyValue {
                property, restore, ..
            } => swap_text(ctx.document, *property, restore),
            JobKind::SetFxId { object, fx_id, .. } => {
                edit(ctx.document, |d| d.set_fx_id(*object, fx_id.as_deref()).map(drop))
            }
            JobKind::SetDocumentRoot { root, .. } => {
                edit(ctx.document, |d| d.set_root(*root).map(drop))
            }
            JobKind::UpdateSelection { group, .. } => {
                ctx.selection.select(group.clone());
                Ok(())
            }
            JobKind::RemoveObject { jobs, .. }
            | JobKind::InsertAsAccessory { jobs, .. }
            | JobKind::ModifyObject { jobs, .. }
            | JobKind::DeleteSelection { jobs } => {
                bracketed(ctx, true, true, |ctx| redo_all(jobs, ctx))
            }
            JobKind::Batch {
                jobs,
                document_bracket,
                selection_bracket,
                ..
            } => bracketed(ctx, *document_bracket, *selection_bracket, |ctx| {
                redo_all(jobs, ctx)
            }),
        }
    }
}

fn missing_record() -> JobError {
    JobError::Structure(StructureError::Inconsistent("job has no undo record".into()))
}

/// Run one FXOM edit inside its own update bracket.
fn edit<T>(
    doc: &mut FxomDocument,
    f: impl FnOnce(&mut FxomDocument) -> Result<T, StructureError>,
) -> Result<T, JobError> {
    doc.begin_update();
    let result = f(doc);
    doc.end_update();
    Ok(result?)
}

/// Apply a stored text record, keeping its inverse for the way back.
fn swap_text(
    doc: &mut FxomDocument,
    property: PropertyId,
    restore: &mut Option<TextRestore>,
) -> Result<(), JobError> {
    let record = restore.clone().ok_or_else(missing_record)?;
    *restore = Some(edit(doc, |d| d.restore_text_value(property, record))?);
    Ok(())
}

fn bracketed<'a, T>(
    ctx: &mut JobContext<'a>,
    document: bool,
    selection: bool,
    f: impl FnOnce(&mut JobContext<'a>) -> Result<T, JobError>,
) -> Result<T, JobError> {
    if document {
        ctx.document.begin_update();
    }
    if selection {
        ctx.selection.begin_update();
    }
    let result = f(ctx);
    if selection {
        ctx.selection.end_update();
    }
    if document {
        ctx.document.end_update();
    }
    result
}

/// Execute in order; on failure undo what ran, in reverse, and reset it.
fn execute_all(jobs: &mut [Job], ctx: &mut JobContext<'_>) -> Result<(), JobError> {
    for i in 0..jobs.len() {
        if let Err(err) = jobs[i].execute(ctx) {
            log::warn!("job: {} failed, rolling back {i} sub-jobs: {err}", jobs[i].name());
            for done in jobs[..i].iter_mut().rev() {
                if let Err(undo_err) = done.undo(ctx) {
                    log::error!("job: rollback of {} failed: {undo_err}", done.name());
                }
            }
            jobs.iter_mut().for_each(Job::reset);
            return Err(err);
        }
    }
    Ok(())
}

/// Undo sub-jobs last to first. On failure the ones already undone are
/// redone, leaving the composite executed.
fn undo_all(jobs: &mut [Job], ctx: &mut JobContext<'_>) -> Result<(), JobError> {
    for i in (0..jobs.len()).rev() {
        if let Err(err) = jobs[i].undo(ctx) {
            log::warn!(
                "job: undo of {} failed, redoing {} sub-jobs",
                jobs[i].name(),
                jobs.len() - i - 1
            );
            for undone in &mut jobs[i + 1..] {
                if let Err(redo_err) = undone.redo(ctx) {
                    log::error!("job: rollback of {} failed: {redo_err}", undone.name());
                }
            }
            return Err(err);
        }
    }
    Ok(())
}

/// Redo sub-jobs first to last. On failure the ones already redone are
/// undone again, leaving the composite undone.
fn redo_all(jobs: &mut [Job], ctx: &mut JobContext<'_>) -> Result<(), JobError> {
    for i in 0..jobs.len() {
        if let Err(err) = jobs[i].redo(ctx) {
            log::warn!("job: redo of {} failed, undoing {i} sub-jobs", jobs[i].name());
            for redone in jobs[..i].iter_mut().rev() {
                if let Err(undo_err) = redone.undo(ctx) {
                    log::error!("job: rollback of {} failed: {undo_err}", redone.name());
                }
            }
            return Err(err);
        }
    }
    Ok(())
}

/// Execute sub-jobs of a composite under one bracket. On success the
/// executed list is kept for undo and redo.
fn run_planned(ctx: &mut JobContext<'_>, mut planned: Vec<Job>) -> Result<Vec<Job>, JobError> {
    bracketed(ctx, true, true, |ctx| execute_all(&mut planned, ctx))?;
    Ok(planned)
}

// ─── Composite planning ──────────────────────────────────────────────────

fn plan_remove_object(doc: &FxomDocument, object: ObjectId) -> Vec<Job> {
    if doc.root() == Some(object) {
        return vec![Job::set_document_root(None)];
    }
    let Some(property) = doc.parent_property(object) else {
        return Vec::new();
    };
    let mut jobs = vec![Job::remove_property_value(object)];
    if doc.values(property).len() == 1 {
        jobs.push(Job::remove_property(property));
    }
    jobs
}

/// Plan the insertion of `object` into `accessory` of `target`. A missing
/// property is created here, detached, and attached by an `AddProperty`
/// sub-job. When a later sub-job fails the rollback detaches it again; it
/// then stays in the arena unreferenced, like a created object whose drop was
/// refused.
fn plan_insert(
    doc: &mut FxomDocument,
    target: ObjectId,
    accessory: Name,
    object: ObjectId,
    before: Option<ObjectId>,
) -> Vec<Job> {
    let mut jobs = Vec::new();
    let property = match doc.find_property(target, accessory) {
        Some(existing) => existing,
        None => {
            let is_main = HierarchyMask::new(doc, target)
                .main_accessory()
                .is_some_and(|main| main.name == accessory);
            let created = if is_main {
                doc.create_default_property(accessory)
            } else {
                doc.create_collection_property(accessory)
            };
            jobs.push(Job::add_property(target, created));
            created
        }
    };
    let index = before
        .filter(|b| doc.parent_property(*b) == Some(property))
        .and_then(|b| doc.index_in_parent_property(b))
        .unwrap_or(doc.values(property).len());
    jobs.push(Job::add_property_value(property, index, object));
    jobs
}

fn plan_modify_object(
    doc: &mut FxomDocument,
    object: ObjectId,
    name: Name,
    value: Option<&str>,
) -> Vec<Job> {
    match (doc.find_property(object, name), value) {
        (Some(property), Some(value)) => vec![Job::modify_value(property, value)],
        (Some(property), None) => vec![Job::remove_property(property)],
        (None, Some(value)) => {
            let property = doc.create_text_property(name, value);
            vec![Job::add_property(object, property)]
        }
        (None, None) => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::selection::ObjectGroup;
    use fxml_core::{DocumentEvent, MetadataRegistry};
    use pretty_assertions::assert_eq;

    const FORM: &str = "<VBox spacing=\"4\">\n    <Label text=\"Name\"/>\n    <Button text=\"OK\"/>\n</VBox>";

    fn n(s: &str) -> Name {
        Name::intern(s)
    }

    fn load(text: &str) -> (FxomDocument, Selection) {
        let doc = FxomDocument::parse(text, MetadataRegistry::builtin()).unwrap();
        (doc, Selection::new())
    }

    fn children(doc: &FxomDocument) -> PropertyId {
        doc.find_property(doc.root().unwrap(), n("children")).unwrap()
    }

    /// Execute, check the text, undo back to the source, redo forward again.
    fn round_trip(source: &str, job: &mut Job, doc: &mut FxomDocument, sel: &mut Selection, expected: &str) {
        let mut ctx = JobContext::new(doc, sel);
        job.execute(&mut ctx).unwrap();
        assert_eq!(ctx.document.serialize(false), expected);
        job.undo(&mut ctx).unwrap();
        assert_eq!(ctx.document.serialize(false), source);
        job.redo(&mut ctx).unwrap();
        assert_eq!(ctx.document.serialize(false), expected);
        ctx.document.check_consistency().unwrap();
    }

    #[test]
    fn state_machine() {
        let (mut doc, mut sel) = load(FORM);
        let label = doc.values(children(&doc))[0];
        let mut job = Job::remove_property_value(label);
        let mut ctx = JobContext::new(&mut doc, &mut sel);
        assert_eq!(job.state(), JobState::Idle);
        assert!(matches!(
            job.undo(&mut ctx),
            Err(JobError::InvalidState { action: "undo", .. })
        ));
        job.execute(&mut ctx).unwrap();
        assert_eq!(job.state(), JobState::Executed);
        assert!(matches!(job.execute(&mut ctx), Err(JobError::InvalidState { .. })));
        assert!(matches!(job.redo(&mut ctx), Err(JobError::InvalidState { .. })));
        job.undo(&mut ctx).unwrap();
        assert_eq!(job.state(), JobState::Undone);
    }

    #[test]
    fn guard_blocks_execution() {
        let (mut doc, mut sel) = load(FORM);
        let root = doc.root().unwrap();
        let label = doc.values(children(&doc))[0];
        let mut ctx = JobContext::new(&mut doc, &mut sel);

        let mut attached = Job::add_property_value(children(ctx.document), 0, label);
        assert!(!attached.is_executable(&ctx));
        assert_eq!(attached.execute(&mut ctx), Err(JobError::NotExecutable));
        assert_eq!(attached.state(), JobState::Idle);

        let mut same = Job::modify_object(root, n("spacing"), Some("4".into()));
        assert_eq!(same.execute(&mut ctx), Err(JobError::NotExecutable));
        let mut nothing = Job::delete_selection();
        assert_eq!(nothing.execute(&mut ctx), Err(JobError::NotExecutable));
        assert_eq!(ctx.document.revision(), 0);
    }

    #[test]
    fn add_and_remove_values() {
        let (mut doc, mut sel) = load(FORM);
        let property = children(&doc);
        let check = doc.create_instance(n("CheckBox"));
        let mut job = Job::add_property_value(property, 1, check);
        round_trip(
            FORM,
            &mut job,
            &mut doc,
            &mut sel,
            "<VBox spacing=\"4\">\n    <Label text=\"Name\"/>\n    <CheckBox/>\n    <Button text=\"OK\"/>\n</VBox>",
        );

        let (mut doc, mut sel) = load(FORM);
        let button = doc.values(children(&doc))[1];
        let mut job = Job::remove_property_value(button);
        round_trip(
            FORM,
            &mut job,
            &mut doc,
            &mut sel,
            "<VBox spacing=\"4\">\n    <Label text=\"Name\"/>\n</VBox>",
        );
    }

    #[test]
    fn reindex_moves_before_sibling_or_to_end() {
        let source = "<HBox>\n    <Label/>\n    <Button/>\n    <CheckBox/>\n</HBox>";
        let (mut doc, mut sel) = load(source);
        let values = doc.values(children(&doc)).to_vec();
        let mut job = Job::reindex_object(values[0], Some(values[2]));
        round_trip(
            source,
            &mut job,
            &mut doc,
            &mut sel,
            "<HBox>\n    <Button/>\n    <Label/>\n    <CheckBox/>\n</HBox>",
        );

        let (mut doc, mut sel) = load(source);
        let values = doc.values(children(&doc)).to_vec();
        let mut job = Job::reindex_object(values[0], None);
        round_trip(
            source,
            &mut job,
            &mut doc,
            &mut sel,
            "<HBox>\n    <Button/>\n    <CheckBox/>\n    <Label/>\n</HBox>",
        );
    }

    #[test]
    fn modify_object_creates_modifies_and_removes() {
        let (mut doc, mut sel) = load(FORM);
        let root = doc.root().unwrap();
        let mut set = Job::modify_object(root, n("spacing"), Some("8".into()));
        round_trip(
            FORM,
            &mut set,
            &mut doc,
            &mut sel,
            &FORM.replace("spacing=\"4\"", "spacing=\"8\""),
        );
        assert_eq!(set.sub_jobs()[0].name(), "ModifyValue");

        let (mut doc, mut sel) = load(FORM);
        let root = doc.root().unwrap();
        let mut clear = Job::modify_object(root, n("spacing"), None);
        round_trip(FORM, &mut clear, &mut doc, &mut sel, &FORM.replace(" spacing=\"4\"", ""));

        let (mut doc, mut sel) = load(FORM);
        let root = doc.root().unwrap();
        let mut add = Job::modify_object(root, n("alignment"), Some("CENTER".into()));
        round_trip(
            FORM,
            &mut add,
            &mut doc,
            &mut sel,
            &FORM.replace("spacing=\"4\"", "spacing=\"4\" alignment=\"CENTER\""),
        );
    }

    #[test]
    fn text_element_value_restores_exactly() {
        let source = "<Label>\n    <text><![CDATA[a < b]]></text>\n</Label>";
        let (mut doc, mut sel) = load(source);
        let root = doc.root().unwrap();
        let mut job = Job::modify_object(root, n("text"), Some("plain".into()));
        round_trip(
            source,
            &mut job,
            &mut doc,
            &mut sel,
            "<Label>\n    <text>plain</text>\n</Label>",
        );
    }

    #[test]
    fn fx_id_and_root() {
        let (mut doc, mut sel) = load(FORM);
        let root = doc.root().unwrap();
        let mut job = Job::set_fx_id(root, Some("form".into()));
        round_trip(
            FORM,
            &mut job,
            &mut doc,
            &mut sel,
            &FORM.replace("<VBox ", "<VBox fx:id=\"form\" "),
        );

        let (mut doc, mut sel) = load(FORM);
        let pane = doc.create_instance(n("StackPane"));
        let mut job = Job::set_document_root(Some(pane));
        round_trip(FORM, &mut job, &mut doc, &mut sel, "<StackPane/>");
        assert!(doc.is_attached(pane));
    }

    #[test]
    fn remove_object_drops_emptied_property() {
        let source = "<BorderPane>\n    <center>\n        <Label/>\n    </center>\n</BorderPane>";
        let (mut doc, mut sel) = load(source);
        let root = doc.root().unwrap();
        let center = doc.find_property(root, n("center")).unwrap();
        let label = doc.values(center)[0];
        let mut job = Job::remove_object(label);
        round_trip(source, &mut job, &mut doc, &mut sel, "<BorderPane/>");
        let names: Vec<_> = job.sub_jobs().iter().map(Job::name).collect();
        assert_eq!(names, ["RemovePropertyValue", "RemoveProperty"]);
    }

    #[test]
    fn remove_root_clears_document() {
        let (mut doc, mut sel) = load(FORM);
        let root = doc.root().unwrap();
        let mut job = Job::remove_object(root);
        round_trip(FORM, &mut job, &mut doc, &mut sel, "");
        assert_eq!(doc.root(), None);
        assert!(!doc.is_attached(root));
    }

    #[test]
    fn insert_as_accessory_creates_missing_property() {
        let source = "<BorderPane/>";
        let (mut doc, mut sel) = load(source);
        let root = doc.root().unwrap();
        let label = doc.create_instance(n("Label"));
        let mut job = Job::insert_as_accessory(root, n("center"), label, None);
        round_trip(
            source,
            &mut job,
            &mut doc,
            &mut sel,
            "<BorderPane>\n    <center>\n        <Label/>\n    </center>\n</BorderPane>",
        );

        let (mut doc, mut sel) = load("<Pane/>");
        let root = doc.root().unwrap();
        let button = doc.create_instance(n("Button"));
        let mut job = Job::insert_as_accessory(root, n("children"), button, None);
        round_trip("<Pane/>", &mut job, &mut doc, &mut sel, "<Pane>\n    <Button/>\n</Pane>");
    }

    #[test]
    fn insert_as_accessory_guards() {
        let source = "<BorderPane>\n    <center>\n        <Label/>\n    </center>\n</BorderPane>";
        let (mut doc, mut sel) = load(source);
        let root = doc.root().unwrap();
        let button = doc.create_instance(n("Button"));
        let insets = doc.create_instance(n("Insets"));
        let ctx = JobContext::new(&mut doc, &mut sel);
        assert!(!Job::insert_as_accessory(root, n("center"), button, None).is_executable(&ctx));
        assert!(!Job::insert_as_accessory(root, n("left"), insets, None).is_executable(&ctx));
        assert!(!Job::insert_as_accessory(root, n("nowhere"), button, None).is_executable(&ctx));
        assert!(Job::insert_as_accessory(root, n("left"), button, None).is_executable(&ctx));
        assert!(Job::insert_as_accessory(root, n("padding"), insets, None).is_executable(&ctx));
    }

    #[test]
    fn delete_selection_removes_and_clears() {
        let (mut doc, mut sel) = load(FORM);
        let values = doc.values(children(&doc)).to_vec();
        let root = doc.root().unwrap();
        sel.select(Some(SelectionGroup::Objects(ObjectGroup::new(
            [values[0], values[1]],
            values[1],
        ))));
        let before = sel.group().cloned();
        let mut job = Job::delete_selection();
        round_trip(FORM, &mut job, &mut doc, &mut sel, "<VBox spacing=\"4\"/>");
        assert!(sel.is_empty());
        assert!(doc.find_property(root, n("children")).is_none());

        let mut ctx = JobContext::new(&mut doc, &mut sel);
        job.undo(&mut ctx).unwrap();
        assert_eq!(ctx.selection.group().cloned(), before);
    }

    #[test]
    fn batch_brackets_revisions() {
        let (mut doc, mut sel) = load(FORM);
        let values = doc.values(children(&doc)).to_vec();
        let root = doc.root().unwrap();
        let mut job = Job::batch(
            vec![
                Job::reindex_object(values[1], Some(values[0])),
                Job::modify_object(root, n("spacing"), Some("2".into())),
                Job::update_selection(Some(SelectionGroup::Objects(ObjectGroup::single(
                    values[1],
                )))),
            ],
            "Rearrange",
        );
        let mut ctx = JobContext::new(&mut doc, &mut sel);
        job.execute(&mut ctx).unwrap();
        assert_eq!(ctx.document.revision(), 1);
        assert_eq!(ctx.selection.revision(), 1);
        assert_eq!(
            ctx.document.take_events(),
            [DocumentEvent::SceneGraphChanged { revision: 1 }]
        );
        assert_eq!(job.description(ctx.document), "Rearrange");

        job.undo(&mut ctx).unwrap();
        assert_eq!(ctx.document.revision(), 2);
        assert_eq!(ctx.selection.revision(), 2);
        assert_eq!(ctx.document.serialize(false), FORM);
    }

    #[test]
    fn failed_batch_rolls_back() {
        let (mut doc, mut sel) = load(FORM);
        let values = doc.values(children(&doc)).to_vec();
        let root = doc.root().unwrap();
        let mut job = Job::batch(
            vec![
                Job::modify_object(root, n("spacing"), Some("2".into())),
                Job::remove_property_value(values[0]),
                Job::remove_property_value(values[0]),
            ],
            "Broken",
        );
        let mut ctx = JobContext::new(&mut doc, &mut sel);
        assert_eq!(job.execute(&mut ctx), Err(JobError::NotExecutable));
        assert_eq!(job.state(), JobState::Idle);
        assert_eq!(ctx.document.serialize(false), FORM);
        assert!(job.sub_jobs().iter().all(|j| j.state() == JobState::Idle));

        let mut empty = Job::batch(Vec::new(), "Nothing");
        assert!(!empty.is_executable(&ctx));
        assert_eq!(empty.execute(&mut ctx), Err(JobError::NotExecutable));
    }

    #[test]
    fn rolled_back_insert_detaches_planned_property() {
        let source = "<BorderPane/>";
        let (mut doc, mut sel) = load(source);
        let root = doc.root().unwrap();
        let label = doc.create_instance(n("Label"));
        let stray = doc.create_instance(n("Button"));
        let mut job = Job::batch(
            vec![
                Job::insert_as_accessory(root, n("center"), label, None),
                Job::remove_property_value(stray),
            ],
            "Broken",
        );
        let mut ctx = JobContext::new(&mut doc, &mut sel);
        assert_eq!(job.execute(&mut ctx), Err(JobError::NotExecutable));
        assert!(ctx.document.properties(root).is_empty());
        assert_eq!(ctx.document.parent_property(label), None);
        assert_eq!(ctx.document.serialize(false), source);
        ctx.document.check_consistency().unwrap();
    }

    #[test]
    fn failed_undo_leaves_batch_executed() {
        let (mut doc, mut sel) = load(FORM);
        let property = children(&doc);
        let button = doc.values(property)[1];
        let root = doc.root().unwrap();
        let mut job = Job::batch(
            vec![
                Job::remove_property_value(button),
                Job::modify_object(root, n("spacing"), Some("2".into())),
            ],
            "Edit",
        );
        let mut ctx = JobContext::new(&mut doc, &mut sel);
        job.execute(&mut ctx).unwrap();

        // Put the button back behind the job's back so its undo cannot.
        ctx.document.begin_update();
        ctx.document.add_value(property, 1, button).unwrap();
        ctx.document.end_update();
        let edited = ctx.document.serialize(false);

        assert!(job.undo(&mut ctx).is_err());
        assert_eq!(job.state(), JobState::Executed);
        assert!(job.sub_jobs().iter().all(|j| j.state() == JobState::Executed));
        assert_eq!(ctx.document.text_property(root, n("spacing")), Some("2"));
        assert_eq!(ctx.document.serialize(false), edited);
    }
}
