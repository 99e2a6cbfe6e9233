//! Integration tests: drop-target resolution and drop jobs (fxml-editor).
//!
//! Resolves accessories on loaded layouts, executes the resulting batch
//! jobs, and checks that undo puts every object back where it was.

use fxml_core::collect::ObjectsWithFxId;
use fxml_core::{FxomDocument, MetadataRegistry, Name, ObjectId};
use fxml_editor::{
    DropTarget, EditorConfig, EditorSession, Job, JobContext, Selection, accepts_drop,
    make_drop_job, resolve_accessory,
};
use pretty_assertions::assert_eq;

const SETTINGS: &str = include_str!("fixtures/settings.fxml");

fn n(s: &str) -> Name {
    Name::intern(s)
}

fn load(text: &str) -> FxomDocument {
    FxomDocument::parse(text, MetadataRegistry::builtin()).unwrap()
}

fn by_id(doc: &FxomDocument, id: &str) -> ObjectId {
    doc.collect(ObjectsWithFxId)
        .find(|(name, _)| name == id)
        .map(|(_, object)| object)
        .unwrap()
}

fn ids(doc: &FxomDocument, objects: &[ObjectId]) -> Vec<String> {
    objects
        .iter()
        .map(|o| doc.fx_id(*o).unwrap_or_default().to_string())
        .collect()
}

// ─── Single-slot containers ──────────────────────────────────────────────

#[test]
fn drop_into_empty_single_slot_attaches_at_index_zero() {
    let mut doc = load("<ScrollPane/>");
    let root = doc.root().unwrap();
    let label = doc.create_instance(n("Label"));

    let mut job = make_drop_job(&doc, &DropTarget::container(root), &[label]).unwrap();
    let mut sel = Selection::new();
    let mut ctx = JobContext::new(&mut doc, &mut sel);
    job.execute(&mut ctx).unwrap();

    let content = ctx.document.find_property(root, n("content")).unwrap();
    assert_eq!(ctx.document.values(content), [label]);
    assert_eq!(ctx.document.index_in_parent_property(label), Some(0));
    assert_eq!(
        ctx.document.serialize(false),
        "<ScrollPane>\n    <Label/>\n</ScrollPane>"
    );

    job.undo(&mut ctx).unwrap();
    assert_eq!(ctx.document.find_property(root, n("content")), None);
    assert_eq!(ctx.document.parent_property(label), None);
    assert_eq!(ctx.document.serialize(false), "<ScrollPane/>");
}

#[test]
fn two_objects_never_fit_a_single_slot() {
    let mut doc = load(SETTINGS);
    let root = doc.root().unwrap();
    let a = doc.create_instance(n("Label"));
    let b = doc.create_instance(n("Label"));
    assert!(resolve_accessory(&doc, root, Some(n("left")), &[a, b]).is_none());
    assert!(resolve_accessory(&doc, root, None, &[a, b]).is_none());
    let drop = DropTarget::Container {
        target: root,
        accessory: Some(n("left")),
        before: None,
    };
    assert!(make_drop_job(&doc, &drop, &[a, b]).is_none());
}

#[test]
fn occupied_slots_are_skipped_in_declared_order() {
    let mut doc = load(SETTINGS);
    let root = doc.root().unwrap();
    let label = doc.create_instance(n("Label"));
    let resolved = resolve_accessory(&doc, root, None, &[label]).unwrap();
    assert_eq!(resolved.name, n("left"));

    let mut job = make_drop_job(&doc, &DropTarget::container(root), &[label]).unwrap();
    let mut sel = Selection::new();
    let mut ctx = JobContext::new(&mut doc, &mut sel);
    job.execute(&mut ctx).unwrap();
    let left = ctx.document.parent_property(label).unwrap();
    assert_eq!(ctx.document.property_name(left), n("left"));
    assert_eq!(
        ctx.document.text_property(label, n("BorderPane.alignment")),
        Some("CENTER")
    );

    job.undo(&mut ctx).unwrap();
    assert_eq!(ctx.document.serialize(false), SETTINGS);
}

// ─── Collections ─────────────────────────────────────────────────────────

#[test]
fn drop_at_own_position_is_rejected() {
    let doc = load(SETTINGS);
    let numbers = by_id(&doc, "numbers");
    let path = by_id(&doc, "path");
    let vbox = doc.parent_object(numbers).unwrap();
    assert_eq!(doc.index_in_parent_property(numbers), Some(1));

    for before in [Some(numbers), Some(path)] {
        let drop = DropTarget::Container {
            target: vbox,
            accessory: None,
            before,
        };
        assert!(!accepts_drop(&doc, &drop, &[numbers]));
        assert!(make_drop_job(&doc, &drop, &[numbers]).is_none());
    }
    assert!(!accepts_drop(&doc, &DropTarget::container(vbox), &[path]));
    assert!(accepts_drop(&doc, &DropTarget::container(vbox), &[numbers]));
}

#[test]
fn multi_object_reorder_keeps_drag_order() {
    let mut doc = load(SETTINGS);
    let autosave = by_id(&doc, "autosave");
    let numbers = by_id(&doc, "numbers");
    let path = by_id(&doc, "path");
    let vbox = doc.parent_object(path).unwrap();
    let drop = DropTarget::Container {
        target: vbox,
        accessory: None,
        before: Some(numbers),
    };

    let mut job = make_drop_job(&doc, &drop, &[path, autosave]).unwrap();
    assert!(job.sub_jobs().iter().all(|j| matches!(
        j.name(),
        "ReIndexObject" | "UpdateSelection"
    )));
    let mut sel = Selection::new();
    let mut ctx = JobContext::new(&mut doc, &mut sel);
    job.execute(&mut ctx).unwrap();
    let children = ctx.document.parent_property(path).unwrap();
    assert_eq!(
        ids(ctx.document, ctx.document.values(children)),
        ["path", "autosave", "numbers"]
    );
    assert_eq!(ctx.selection.objects(), [path, autosave]);

    job.undo(&mut ctx).unwrap();
    assert_eq!(ctx.document.serialize(false), SETTINGS);
}

#[test]
fn container_cannot_be_dropped_into_itself() {
    let doc = load(SETTINGS);
    let root = doc.root().unwrap();
    let path = by_id(&doc, "path");
    let vbox = doc.parent_object(path).unwrap();
    assert!(!accepts_drop(&doc, &DropTarget::container(vbox), &[vbox]));
    assert!(!accepts_drop(&doc, &DropTarget::container(vbox), &[root]));
    assert!(!accepts_drop(&doc, &DropTarget::Root, &[path]));
}

// ─── Through the session ─────────────────────────────────────────────────

#[test]
fn inserted_child_gets_its_own_indented_line() {
    let mut session =
        EditorSession::from_text("<Pane/>", MetadataRegistry::builtin(), EditorConfig::default())
            .unwrap();
    let root = session.document().root().unwrap();
    let button = session.document_mut().create_instance(n("Button"));
    assert!(session.drop_objects(&DropTarget::container(root), &[button]).unwrap());
    assert_eq!(
        session.document().serialize(false),
        "<Pane>\n    <Button/>\n</Pane>"
    );

    session.undo().unwrap();
    assert_eq!(session.document().serialize(false), "<Pane/>");
    assert!(!session.drop_objects(&DropTarget::container(root), &[]).unwrap());
}

#[test]
fn session_drop_moves_object_between_containers() {
    let mut session =
        EditorSession::from_text(SETTINGS, MetadataRegistry::builtin(), EditorConfig::default())
            .unwrap();
    let save = by_id(session.document(), "save");
    let path = by_id(session.document(), "path");
    let vbox = session.document().parent_object(path).unwrap();
    let drop = DropTarget::Container {
        target: vbox,
        accessory: Some(n("children")),
        before: Some(path),
    };
    assert!(session.drop_objects(&drop, &[save]).unwrap());
    assert_eq!(session.document().parent_object(save), Some(vbox));
    assert_eq!(session.document().next_sibling(save), Some(path));
    assert_eq!(session.jobs().undo_description(), Some("Drop"));

    session.undo().unwrap();
    assert_eq!(session.document().serialize(false), SETTINGS);
    let job = Job::delete_selection();
    assert!(session.execute(job).is_err());
}
