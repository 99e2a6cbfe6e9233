//! Hierarchy mask: accessory-level view of one container object.
//!
//! Joins what the metadata declares for the object's class with what the
//! document currently holds, so that drop resolution and outline views can
//! ask "which slot, how full, does it accept this" in one place.

use fxml_core::metadata::Accessory;
use fxml_core::{FxomDocument, Name, ObjectId, PropertyId};

pub struct HierarchyMask<'d> {
    doc: &'d FxomDocument,
    object: ObjectId,
}

impl<'d> HierarchyMask<'d> {
    pub fn new(doc: &'d FxomDocument, object: ObjectId) -> Self {
        Self { doc, object }
    }

    pub fn object(&self) -> ObjectId {
        self.object
    }

    /// `None` for intrinsics.
    pub fn class(&self) -> Option<Name> {
        self.doc.class_name(self.object)
    }

    /// Accessories in declaration order, superclass accessories first.
    pub fn accessories(&self) -> Vec<Accessory> {
        self.class()
            .map(|class| self.doc.metadata().accessories(class))
            .unwrap_or_default()
    }

    pub fn main_accessory(&self) -> Option<Accessory> {
        self.doc.metadata().main_accessory(self.class()?)
    }

    pub fn accessory(&self, name: Name) -> Option<Accessory> {
        self.doc.metadata().accessory(self.class()?, name)
    }

    /// Property currently backing the accessory, if any.
    pub fn property(&self, accessory: &Accessory) -> Option<PropertyId> {
        self.doc
            .find_property(self.object, accessory.name)
            .filter(|p| self.doc.is_collection(*p))
    }

    /// Objects held by the accessory, in document order.
    pub fn sub_components(&self, accessory: &Accessory) -> &'d [ObjectId] {
        match self.property(accessory) {
            Some(property) => self.doc.values(property),
            None => &[],
        }
    }

    pub fn value_count(&self, accessory: &Accessory) -> usize {
        self.sub_components(accessory).len()
    }

    /// A collection always has room; a single slot only while empty.
    pub fn has_room(&self, accessory: &Accessory) -> bool {
        accessory.collection || self.value_count(accessory) == 0
    }

    /// Whether `object` may be placed in the accessory. Intrinsics resolve
    /// their type only at load time and are accepted everywhere.
    pub fn is_accepting(&self, accessory: &Accessory, object: ObjectId) -> bool {
        match self.doc.class_name(object) {
            Some(class) => self.doc.metadata().is_assignable(class, accessory.accepted),
            None => true,
        }
    }

    pub fn is_accepting_all(&self, accessory: &Accessory, objects: &[ObjectId]) -> bool {
        objects.iter().all(|o| self.is_accepting(accessory, *o))
    }

    /// Whether the object can hold children at all.
    pub fn is_container(&self) -> bool {
        !self.accessories().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fxml_core::MetadataRegistry;
    use pretty_assertions::assert_eq;

    fn n(s: &str) -> Name {
        Name::intern(s)
    }

    const LAYOUT: &str = r#"<BorderPane>
    <center>
        <Label text="Body"/>
    </center>
    <top>
        <fx:reference source="bar"/>
    </top>
</BorderPane>"#;

    #[test]
    fn border_pane_slots() {
        let doc = FxomDocument::parse(LAYOUT, MetadataRegistry::builtin()).unwrap();
        let root = doc.root().unwrap();
        let mask = HierarchyMask::new(&doc, root);
        let names: Vec<String> = mask.accessories().iter().map(|a| a.name.to_string()).collect();
        assert_eq!(
            names,
            ["styleClass", "padding", "top", "left", "center", "right", "bottom"]
        );
        assert!(mask.main_accessory().is_none());
        assert!(mask.is_container());

        let center = mask.accessory(n("center")).unwrap();
        assert_eq!(mask.value_count(&center), 1);
        assert!(!mask.has_room(&center));
        let left = mask.accessory(n("left")).unwrap();
        assert!(mask.has_room(&left));
        assert!(mask.sub_components(&left).is_empty());

        let label = mask.sub_components(&center)[0];
        let reference = mask.sub_components(&mask.accessory(n("top")).unwrap())[0];
        assert!(mask.is_accepting(&left, label));
        assert!(mask.is_accepting(&left, reference));
        let padding = mask.accessory(n("padding")).unwrap();
        assert!(!mask.is_accepting(&padding, label));
    }

    #[test]
    fn intrinsics_have_no_accessories() {
        let doc = FxomDocument::parse(LAYOUT, MetadataRegistry::builtin()).unwrap();
        let root = doc.root().unwrap();
        let center = doc.find_property(root, n("center")).unwrap();
        let top = doc.find_property(root, n("top")).unwrap();

        let label = HierarchyMask::new(&doc, doc.values(center)[0]);
        assert_eq!(label.class(), Some(n("Label")));
        let reference = HierarchyMask::new(&doc, doc.values(top)[0]);
        assert_eq!(reference.class(), None);
        assert!(!reference.is_container());
        assert!(reference.main_accessory().is_none());
    }
}
