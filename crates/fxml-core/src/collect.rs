//! Lazy collectors over the object graph.
//!
//! `FxomDocument::collect` walks the attached tree depth-first (pre-order)
//! and asks a `Collector` what to yield for each object. Values come in
//! property order, and properties in object order: attributes, then property
//! elements, then the default property, wherever its elements sit in the
//! text. The walk is lazy and restartable by cloning.

use crate::fxom::{FxomDocument, ObjectId};
use crate::metadata::IntrinsicKind;
use crate::name::Name;
use std::collections::VecDeque;

/// Decides what a walk yields for each object. Must not depend on walk state.
pub trait Collector {
    type Item;

    fn visit(&self, doc: &FxomDocument, object: ObjectId, out: &mut Vec<Self::Item>);
}

/// Iterator returned by `FxomDocument::collect`.
pub struct Collect<'d, C: Collector> {
    doc: &'d FxomDocument,
    collector: C,
    stack: Vec<ObjectId>,
    buffer: VecDeque<C::Item>,
}

impl<'d, C: Collector> Collect<'d, C> {
    pub(crate) fn new(doc: &'d FxomDocument, collector: C) -> Self {
        Self {
            doc,
            collector,
            stack: doc.root().into_iter().collect(),
            buffer: VecDeque::new(),
        }
    }
}

impl<C> Clone for Collect<'_, C>
where
    C: Collector + Clone,
    C::Item: Clone,
{
    fn clone(&self) -> Self {
        Self {
            doc: self.doc,
            collector: self.collector.clone(),
            stack: self.stack.clone(),
            buffer: self.buffer.clone(),
        }
    }
}

impl<C: Collector> Iterator for Collect<'_, C> {
    type Item = C::Item;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(item) = self.buffer.pop_front() {
                return Some(item);
            }
            let object = self.stack.pop()?;
            for property in self.doc.properties(object).iter().rev() {
                self.stack
                    .extend(self.doc.values(*property).iter().rev().copied());
            }
            let mut found = Vec::new();
            self.collector.visit(self.doc, object, &mut found);
            self.buffer.extend(found);
        }
    }
}

// ─── Built-in collectors ─────────────────────────────────────────────────

/// Class of every instance (repeats included).
#[derive(Debug, Clone, Copy, Default)]
pub struct DeclaredClasses;

impl Collector for DeclaredClasses {
    type Item = Name;

    fn visit(&self, doc: &FxomDocument, object: ObjectId, out: &mut Vec<Name>) {
        out.extend(doc.class_name(object));
    }
}

/// Every `fx:id` value.
#[derive(Debug, Clone, Copy, Default)]
pub struct FxIds;

impl Collector for FxIds {
    type Item = String;

    fn visit(&self, doc: &FxomDocument, object: ObjectId, out: &mut Vec<String>) {
        out.extend(doc.fx_id(object).map(str::to_string));
    }
}

/// Objects carrying an `fx:id`, with the id.
#[derive(Debug, Clone, Copy, Default)]
pub struct ObjectsWithFxId;

impl Collector for ObjectsWithFxId {
    type Item = (String, ObjectId);

    fn visit(&self, doc: &FxomDocument, object: ObjectId, out: &mut Vec<(String, ObjectId)>) {
        if let Some(id) = doc.fx_id(object) {
            out.push((id.to_string(), object));
        }
    }
}

/// Text property values that are plain literals: not `$variable`,
/// `@location`, `%resource` or `#handler` expressions.
#[derive(Debug, Clone, Copy, Default)]
pub struct StringLiterals;

pub fn is_literal_value(value: &str) -> bool {
    !matches!(value.chars().next(), Some('$' | '@' | '%' | '#'))
        || value.starts_with("$$")
        || value.starts_with("@@")
        || value.starts_with("%%")
}

impl Collector for StringLiterals {
    type Item = String;

    fn visit(&self, doc: &FxomDocument, object: ObjectId, out: &mut Vec<String>) {
        for property in doc.properties(object) {
            if let Some(value) = doc.text_value(*property)
                && is_literal_value(value)
            {
                out.push(value.to_string());
            }
        }
    }
}

/// Instances whose class is assignable to the given one.
#[derive(Debug, Clone, Copy)]
pub struct ObjectsOfClass(pub Name);

impl Collector for ObjectsOfClass {
    type Item = ObjectId;

    fn visit(&self, doc: &FxomDocument, object: ObjectId, out: &mut Vec<ObjectId>) {
        if let Some(class) = doc.class_name(object)
            && doc.metadata().is_assignable(class, self.0)
        {
            out.push(object);
        }
    }
}

/// Places that refer to an `fx:id`: `fx:reference`/`fx:copy` sources and
/// `$id` text values.
#[derive(Debug, Clone, Copy, Default)]
pub struct References;

impl Collector for References {
    type Item = (ObjectId, String);

    fn visit(&self, doc: &FxomDocument, object: ObjectId, out: &mut Vec<(ObjectId, String)>) {
        match doc.intrinsic_kind(object) {
            Some(IntrinsicKind::Reference | IntrinsicKind::Copy) => {
                if let Some(source) = doc.intrinsic_source(object) {
                    out.push((object, source.to_string()));
                }
            }
            Some(IntrinsicKind::Include) => {}
            None => {
                for property in doc.properties(object) {
                    if let Some(value) = doc.text_value(*property)
                        && let Some(target) = value.strip_prefix('$')
                        && !target.starts_with(['$', '{'])
                    {
                        out.push((object, target.to_string()));
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::MetadataRegistry;
    use pretty_assertions::assert_eq;

    const FORM: &str = r##"<VBox xmlns:fx="http://javafx.com/fxml/1" fx:id="form">
    <Label fx:id="title" text="Name" labelFor="$field"/>
    <HBox>
        <TextField fx:id="field" promptText="%prompt"/>
        <Button text="Save" onAction="#save"/>
    </HBox>
    <fx:reference source="title"/>
</VBox>"##;

    fn form() -> FxomDocument {
        FxomDocument::parse(FORM, MetadataRegistry::builtin()).unwrap()
    }

    #[test]
    fn walk_is_depth_first_pre_order() {
        let doc = form();
        let classes: Vec<String> = doc.collect(DeclaredClasses).map(|n| n.to_string()).collect();
        assert_eq!(classes, ["VBox", "Label", "HBox", "TextField", "Button"]);
    }

    #[test]
    fn default_property_is_walked_last() {
        let text = "<TitledPane>\n    <Label fx:id=\"body\"/>\n    <graphic>\n        <Button fx:id=\"icon\"/>\n    </graphic>\n</TitledPane>";
        let doc = FxomDocument::parse(text, MetadataRegistry::builtin()).unwrap();
        let ids: Vec<String> = doc.collect(FxIds).collect();
        assert_eq!(ids, ["icon", "body"]);
    }

    #[test]
    fn fx_ids_and_objects() {
        let doc = form();
        let ids: Vec<String> = doc.collect(FxIds).collect();
        assert_eq!(ids, ["form", "title", "field"]);
        let (id, object) = doc.collect(ObjectsWithFxId).nth(2).unwrap();
        assert_eq!(id, "field");
        assert_eq!(doc.class_name(object), Some(Name::intern("TextField")));
    }

    #[test]
    fn literals_skip_expressions() {
        let doc = form();
        let literals: Vec<String> = doc.collect(StringLiterals).collect();
        assert_eq!(literals, ["Name", "Save"]);
    }

    #[test]
    fn objects_of_class_use_assignability() {
        let doc = form();
        let panes = doc.collect(ObjectsOfClass(Name::intern("Pane"))).count();
        assert_eq!(panes, 2);
        let controls = doc.collect(ObjectsOfClass(Name::intern("Control"))).count();
        assert_eq!(controls, 3);
    }

    #[test]
    fn references_from_intrinsics_and_expressions() {
        let doc = form();
        let targets: Vec<String> = doc.collect(References).map(|(_, t)| t).collect();
        assert_eq!(targets, ["field", "title"]);
    }

    #[test]
    fn collection_is_restartable() {
        let doc = form();
        let walk = doc.collect(FxIds);
        let first: Vec<_> = walk.clone().collect();
        let second: Vec<_> = walk.collect();
        assert_eq!(first, second);
    }

    #[test]
    fn empty_document_yields_nothing() {
        let doc = FxomDocument::new(MetadataRegistry::builtin());
        assert_eq!(doc.collect(DeclaredClasses).count(), 0);
    }
}
