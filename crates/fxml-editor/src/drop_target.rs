//! Drop-target resolution: where dragged objects land and the job that
//! puts them there.

use crate::job::Job;
use crate::mask::HierarchyMask;
use crate::selection::{ObjectGroup, SelectionGroup};
use fxml_core::metadata::Accessory;
use fxml_core::{FxomDocument, Name, ObjectId};

/// Where a drag ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropTarget {
    /// The document itself, when it has no root yet.
    Root,
    /// An accessory of a container. Without an explicit accessory the
    /// container picks one; `before` is the sibling to insert in front of.
    Container {
        target: ObjectId,
        accessory: Option<Name>,
        before: Option<ObjectId>,
    },
}

impl DropTarget {
    pub fn container(target: ObjectId) -> Self {
        DropTarget::Container {
            target,
            accessory: None,
            before: None,
        }
    }
}

/// Pick the accessory of `target` that receives `dragged`.
///
/// Tried in order: the explicit accessory, the main accessory, then every
/// declared accessory with room that accepts all dragged objects.
pub fn resolve_accessory(
    doc: &FxomDocument,
    target: ObjectId,
    accessory: Option<Name>,
    dragged: &[ObjectId],
) -> Option<Accessory> {
    if dragged.is_empty() {
        return None;
    }
    let mask = HierarchyMask::new(doc, target);
    let multi = dragged.len() > 1;
    // A single slot takes one object, and only while empty.
    let fits = |a: &Accessory| a.collection || (!multi && mask.value_count(a) == 0);

    if let Some(name) = accessory {
        let declared = mask.accessory(name)?;
        return (mask.is_accepting_all(&declared, dragged) && fits(&declared)).then_some(declared);
    }

    if let Some(main) = mask.main_accessory()
        && mask.is_accepting_all(&main, dragged)
        && fits(&main)
    {
        return Some(main);
    }

    mask.accessories()
        .into_iter()
        .find(|a| fits(a) && mask.is_accepting_all(a, dragged))
}

/// Whether `dragged` may be dropped on `drop`.
pub fn accepts_drop(doc: &FxomDocument, drop: &DropTarget, dragged: &[ObjectId]) -> bool {
    if dragged.is_empty() || dragged.iter().any(|o| !doc.contains_object(*o)) {
        return false;
    }
    match *drop {
        DropTarget::Root => doc.root().is_none() && dragged.len() == 1,
        DropTarget::Container {
            target,
            accessory,
            before,
        } => {
            if !doc.contains_object(target)
                || dragged
                    .iter()
                    .any(|o| *o == target || doc.is_descendant_of(target, *o))
            {
                return false;
            }
            let Some(resolved) = resolve_accessory(doc, target, accessory, dragged) else {
                return false;
            };
            if let [object] = dragged
                && in_accessory(doc, *object, target, resolved.name)
                && (before == Some(*object) || before == doc.next_sibling(*object))
            {
                log::trace!("drop: {object:?} is already at the drop position");
                return false;
            }
            true
        }
    }
}

fn in_accessory(doc: &FxomDocument, object: ObjectId, target: ObjectId, accessory: Name) -> bool {
    doc.parent_object(object) == Some(target)
        && doc
            .parent_property(object)
            .is_some_and(|p| doc.property_name(p) == accessory)
}

/// Build the batch job performing the drop, or `None` if it is not
/// accepted.
pub fn make_drop_job(doc: &FxomDocument, drop: &DropTarget, dragged: &[ObjectId]) -> Option<Job> {
    if !accepts_drop(doc, drop, dragged) {
        return None;
    }
    let first = *dragged.first()?;
    let select = Job::update_selection(Some(SelectionGroup::Objects(ObjectGroup::new(
        dragged.iter().copied(),
        first,
    ))));

    match *drop {
        DropTarget::Root => {
            let mut jobs = Vec::new();
            if doc.parent_property(first).is_some() {
                jobs.push(Job::remove_object(first));
            }
            jobs.push(Job::set_document_root(Some(first)));
            jobs.push(select);
            Some(Job::batch(jobs, "Set root"))
        }
        DropTarget::Container {
            target,
            accessory,
            before,
        } => {
            let resolved = resolve_accessory(doc, target, accessory, dragged)?;

            // Dragged objects leave their slots, so anchor on the first
            // sibling that stays.
            let mut anchor = before.filter(|b| in_accessory(doc, *b, target, resolved.name));
            while let Some(b) = anchor
                && dragged.contains(&b)
            {
                anchor = doc.next_sibling(b);
            }

            let mut jobs = Vec::new();
            let reorder = dragged
                .iter()
                .all(|o| in_accessory(doc, *o, target, resolved.name));
            if reorder {
                jobs.extend(dragged.iter().map(|o| Job::reindex_object(*o, anchor)));
            } else {
                for object in dragged {
                    if doc.parent_property(*object).is_some() || doc.root() == Some(*object) {
                        jobs.push(Job::remove_object(*object));
                    }
                    jobs.push(Job::insert_as_accessory(target, resolved.name, *object, anchor));
                    for (name, value) in &resolved.defaults {
                        if doc.text_property(*object, *name) != Some(value.as_str()) {
                            jobs.push(Job::modify_object(*object, *name, Some(value.clone())));
                        }
                    }
                }
            }
            jobs.push(select);
            log::debug!(
                "drop: {} object(s) into `{}` ({} jobs)",
                dragged.len(),
                resolved.name,
                jobs.len()
            );
            Some(Job::batch(jobs, if reorder { "Move" } else { "Drop" }))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::{JobContext, JobState};
    use crate::selection::Selection;
    use fxml_core::MetadataRegistry;
    use pretty_assertions::assert_eq;

    fn n(s: &str) -> Name {
        Name::intern(s)
    }

    fn load(text: &str) -> FxomDocument {
        FxomDocument::parse(text, MetadataRegistry::builtin()).unwrap()
    }

    #[test]
    fn main_accessory_wins_over_declared_order() {
        let mut doc = load("<TitledPane/>");
        let root = doc.root().unwrap();
        let label = doc.create_instance(n("Label"));
        let resolved = resolve_accessory(&doc, root, None, &[label]).unwrap();
        assert_eq!(resolved.name, n("content"));

        let font = doc.create_instance(n("Font"));
        let resolved = resolve_accessory(&doc, root, None, &[font]).unwrap();
        assert_eq!(resolved.name, n("font"));
    }

    #[test]
    fn full_single_slot_falls_through_to_next_accessory() {
        let mut doc = load("<BorderPane>\n    <top>\n        <Label/>\n    </top>\n</BorderPane>");
        let root = doc.root().unwrap();
        let button = doc.create_instance(n("Button"));
        let resolved = resolve_accessory(&doc, root, None, &[button]).unwrap();
        assert_eq!(resolved.name, n("left"));
        assert!(resolve_accessory(&doc, root, Some(n("top")), &[button]).is_none());
    }

    #[test]
    fn multi_drag_needs_a_collection() {
        let mut doc = load("<ScrollPane/>");
        let root = doc.root().unwrap();
        let a = doc.create_instance(n("Label"));
        let b = doc.create_instance(n("Label"));
        assert!(resolve_accessory(&doc, root, Some(n("content")), &[a, b]).is_none());
        assert!(resolve_accessory(&doc, root, None, &[a, b]).is_none());
        assert!(resolve_accessory(&doc, root, None, &[a]).is_some());
    }

    #[test]
    fn no_drop_into_self_or_descendant() {
        let doc = load("<VBox>\n    <HBox>\n        <Label/>\n    </HBox>\n</VBox>");
        let root = doc.root().unwrap();
        let hbox = doc.values(doc.find_property(root, n("children")).unwrap())[0];
        let label = doc.values(doc.find_property(hbox, n("children")).unwrap())[0];
        assert!(!accepts_drop(&doc, &DropTarget::container(hbox), &[hbox]));
        assert!(!accepts_drop(&doc, &DropTarget::container(label), &[root]));
        assert!(!accepts_drop(&doc, &DropTarget::container(hbox), &[root]));
        assert!(accepts_drop(&doc, &DropTarget::container(root), &[label]));
        assert!(!accepts_drop(&doc, &DropTarget::container(root), &[]));
    }

    #[test]
    fn root_target_needs_empty_document() {
        let mut doc = FxomDocument::new(MetadataRegistry::builtin());
        let pane = doc.create_instance(n("Pane"));
        let other = doc.create_instance(n("Pane"));
        assert!(!accepts_drop(&doc, &DropTarget::Root, &[pane, other]));

        let mut job = make_drop_job(&doc, &DropTarget::Root, &[pane]).unwrap();
        let mut sel = Selection::new();
        let mut ctx = JobContext::new(&mut doc, &mut sel);
        job.execute(&mut ctx).unwrap();
        assert_eq!(ctx.document.root(), Some(pane));
        assert_eq!(ctx.selection.objects(), [pane]);
        assert!(!accepts_drop(ctx.document, &DropTarget::Root, &[other]));

        job.undo(&mut ctx).unwrap();
        assert_eq!(ctx.document.root(), None);
        assert!(ctx.selection.is_empty());
    }

    #[test]
    fn reorder_within_accessory_is_a_pure_move() {
        let source = "<HBox>\n    <Label/>\n    <Button/>\n    <CheckBox/>\n</HBox>";
        let mut doc = load(source);
        let root = doc.root().unwrap();
        let values = doc.values(doc.find_property(root, n("children")).unwrap()).to_vec();
        let drop = DropTarget::Container {
            target: root,
            accessory: None,
            before: Some(values[0]),
        };
        let mut job = make_drop_job(&doc, &drop, &[values[2]]).unwrap();
        let names: Vec<_> = job.sub_jobs().iter().map(Job::name).collect();
        assert_eq!(names, ["ReIndexObject", "UpdateSelection"]);

        let mut sel = Selection::new();
        let mut ctx = JobContext::new(&mut doc, &mut sel);
        job.execute(&mut ctx).unwrap();
        assert_eq!(
            ctx.document.serialize(false),
            "<HBox>\n    <CheckBox/>\n    <Label/>\n    <Button/>\n</HBox>"
        );
        job.undo(&mut ctx).unwrap();
        assert_eq!(ctx.document.serialize(false), source);
        assert_eq!(job.state(), JobState::Undone);
    }

    #[test]
    fn moving_across_containers_applies_accessory_defaults() {
        let source = "<VBox>\n    <BorderPane/>\n    <Label/>\n</VBox>";
        let mut doc = load(source);
        let root = doc.root().unwrap();
        let values = doc.values(doc.find_property(root, n("children")).unwrap()).to_vec();
        let (pane, label) = (values[0], values[1]);
        let drop = DropTarget::Container {
            target: pane,
            accessory: Some(n("bottom")),
            before: None,
        };
        let mut job = make_drop_job(&doc, &drop, &[label]).unwrap();
        let names: Vec<_> = job.sub_jobs().iter().map(Job::name).collect();
        assert_eq!(
            names,
            ["RemoveObject", "InsertAsAccessory", "ModifyObject", "UpdateSelection"]
        );

        let mut sel = Selection::new();
        let mut ctx = JobContext::new(&mut doc, &mut sel);
        job.execute(&mut ctx).unwrap();
        assert_eq!(ctx.document.parent_object(label), Some(pane));
        assert_eq!(
            ctx.document.text_property(label, n("BorderPane.alignment")),
            Some("CENTER")
        );
        ctx.document.check_consistency().unwrap();

        job.undo(&mut ctx).unwrap();
        assert_eq!(ctx.document.serialize(false), source);
        assert_eq!(ctx.document.text_property(label, n("BorderPane.alignment")), None);
    }
}
