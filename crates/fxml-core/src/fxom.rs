//! FXOM: the semantic object graph over a Glue document.
//!
//! Objects and properties share one `StableDiGraph` arena. Edges point from
//! an instance to its properties and from a collection property to its
//! values; parents are found by walking the single incoming edge, the same
//! way the Glue layer does. Ordered lists live in the node weights.
//!
//! Every structural edit touches both trees at once, so the FXOM parent
//! links and the Glue child lists never disagree. Edits must happen inside
//! a `begin_update` / `end_update` bracket; the outermost close bumps the
//! scene graph revision, publishes a `DocumentEvent` and flushes pending
//! live-object updates.

use crate::collect::{Collect, Collector};
use crate::emitter;
use crate::error::StructureError;
use crate::glue::{GlueAux, GlueConfig, GlueDocument, GlueId};
use crate::live::{LiveError, LiveHandle, LiveObjectFactory};
use crate::metadata::{IntrinsicKind, Metadata};
use crate::name::Name;
use petgraph::Direction;
use petgraph::graph::NodeIndex;
use petgraph::stable_graph::StableDiGraph;
use std::fmt;
use std::sync::Arc;

/// Attribute naming an object for references and controllers.
pub const FX_ID: &str = "fx:id";

/// Attribute of `fx:include`, `fx:reference` and `fx:copy`.
pub const SOURCE_ATTR: &str = "source";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectId(NodeIndex);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PropertyId(NodeIndex);

// ─── Nodes ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub enum ObjectKind {
    Instance {
        class: Name,
        properties: Vec<PropertyId>,
        live: Option<LiveHandle>,
    },
    Intrinsic {
        kind: IntrinsicKind,
    },
}

#[derive(Debug, Clone)]
pub struct FxomObject {
    /// Element this object was read from or is written to.
    pub glue: GlueId,
    pub kind: ObjectKind,
}

/// Where a text property keeps its value in markup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextStorage {
    /// `text="OK"` on the owning instance.
    Attribute,
    /// `<text>OK</text>` inside the owning instance.
    Element(GlueId),
}

#[derive(Debug, Clone)]
pub enum PropertyKind {
    /// Ordered child objects. `glue` is the property element, or a
    /// synthetic element for the default property.
    Collection { glue: GlueId, values: Vec<ObjectId> },
    Text { value: String, storage: TextStorage },
}

#[derive(Debug, Clone)]
pub struct FxomProperty {
    pub name: Name,
    pub kind: PropertyKind,
}

#[derive(Debug, Clone)]
pub(crate) enum FxomNode {
    Object(FxomObject),
    Property(FxomProperty),
}

/// Published once per outermost update bracket.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentEvent {
    SceneGraphChanged { revision: u64 },
}

/// Everything needed to put a removed property back where it was.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropertyRemoval {
    pub instance: ObjectId,
    pub index: usize,
    slot: GlueSlot,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum GlueSlot {
    Attribute(usize),
    Child(usize),
}

/// Inverse of a text change; feed it to `restore_text_value`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextRestore {
    value: String,
    content: Option<Vec<GlueAux>>,
}

impl TextRestore {
    pub fn value(&self) -> &str {
        &self.value
    }
}

enum Backing {
    Attribute(String),
    Element(GlueId),
}

#[derive(Debug)]
enum LiveUpdate {
    SetValue {
        object: ObjectId,
        property: Name,
        value: String,
    },
    ClearValue {
        object: ObjectId,
        property: Name,
    },
    InsertChild {
        parent: ObjectId,
        property: Name,
        index: usize,
        child: ObjectId,
    },
    RemoveChild {
        parent: ObjectId,
        property: Name,
        index: usize,
    },
    Instantiate(ObjectId),
}

// ─── Document ────────────────────────────────────────────────────────────

pub struct FxomDocument {
    pub(crate) glue: GlueDocument,
    pub(crate) graph: StableDiGraph<FxomNode, ()>,
    pub(crate) root: Option<ObjectId>,
    metadata: Arc<dyn Metadata>,
    factory: Option<Box<dyn LiveObjectFactory>>,
    update_depth: usize,
    revision: u64,
    events: Vec<DocumentEvent>,
    pending_live: Vec<LiveUpdate>,
    live_errors: Vec<LiveError>,
}

impl fmt::Debug for FxomDocument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FxomDocument")
            .field("root", &self.root)
            .field("nodes", &self.graph.node_count())
            .field("revision", &self.revision)
            .field("live", &self.factory.is_some())
            .finish_non_exhaustive()
    }
}

impl FxomDocument {
    /// An empty document: no root, nothing in the header.
    pub fn new(metadata: Arc<dyn Metadata>) -> Self {
        Self::with_glue(GlueDocument::new(), metadata)
    }

    pub(crate) fn with_glue(glue: GlueDocument, metadata: Arc<dyn Metadata>) -> Self {
        Self {
            glue,
            graph: StableDiGraph::new(),
            root: None,
            metadata,
            factory: None,
            update_depth: 0,
            revision: 0,
            events: Vec::new(),
            pending_live: Vec::new(),
            live_errors: Vec::new(),
        }
    }

    /// Attach a live-object factory and instantiate the current tree.
    pub fn with_live_factory(mut self, factory: Box<dyn LiveObjectFactory>) -> Self {
        self.factory = Some(factory);
        if let Some(root) = self.root {
            self.pending_live.push(LiveUpdate::Instantiate(root));
            self.flush_live();
        }
        self
    }

    pub fn glue(&self) -> &GlueDocument {
        &self.glue
    }

    pub fn set_glue_config(&mut self, config: GlueConfig) {
        self.glue.config = config;
    }

    /// Replace the top-level auxiliaries before the root element.
    pub fn set_header(&mut self, header: Vec<GlueAux>) {
        self.glue.set_header(header);
    }

    pub fn metadata(&self) -> &dyn Metadata {
        self.metadata.as_ref()
    }

    pub fn metadata_handle(&self) -> Arc<dyn Metadata> {
        Arc::clone(&self.metadata)
    }

    pub fn serialize(&self, compress: bool) -> String {
        emitter::serialize(&self.glue, compress)
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// Drain the events published since the last call.
    pub fn take_events(&mut self) -> Vec<DocumentEvent> {
        std::mem::take(&mut self.events)
    }

    /// Live-object failures of the last flush.
    pub fn live_errors(&self) -> &[LiveError] {
        &self.live_errors
    }

    pub fn collect<C: Collector>(&self, collector: C) -> Collect<'_, C> {
        Collect::new(self, collector)
    }

    // ─── Node access ─────────────────────────────────────────────────────

    pub fn root(&self) -> Option<ObjectId> {
        self.root
    }

    pub fn contains_object(&self, id: ObjectId) -> bool {
        matches!(self.graph.node_weight(id.0), Some(FxomNode::Object(_)))
    }

    pub fn contains_property(&self, id: PropertyId) -> bool {
        matches!(self.graph.node_weight(id.0), Some(FxomNode::Property(_)))
    }

    /// Panics on a handle from another document, like slice indexing.
    pub fn object(&self, id: ObjectId) -> &FxomObject {
        match &self.graph[id.0] {
            FxomNode::Object(object) => object,
            FxomNode::Property(_) => unreachable!("object handle names a property"),
        }
    }

    fn object_mut(&mut self, id: ObjectId) -> &mut FxomObject {
        match &mut self.graph[id.0] {
            FxomNode::Object(object) => object,
            FxomNode::Property(_) => unreachable!("object handle names a property"),
        }
    }

    pub fn property(&self, id: PropertyId) -> &FxomProperty {
        match &self.graph[id.0] {
            FxomNode::Property(property) => property,
            FxomNode::Object(_) => unreachable!("property handle names an object"),
        }
    }

    fn property_mut(&mut self, id: PropertyId) -> &mut FxomProperty {
        match &mut self.graph[id.0] {
            FxomNode::Property(property) => property,
            FxomNode::Object(_) => unreachable!("property handle names an object"),
        }
    }

    pub(crate) fn insert_object_node(&mut self, object: FxomObject) -> ObjectId {
        ObjectId(self.graph.add_node(FxomNode::Object(object)))
    }

    pub(crate) fn insert_property_node(&mut self, property: FxomProperty) -> PropertyId {
        PropertyId(self.graph.add_node(FxomNode::Property(property)))
    }

    /// Loader support: record an already-ordered containment edge.
    pub(crate) fn link_loaded_property(&mut self, instance: ObjectId, property: PropertyId) {
        self.graph.add_edge(instance.0, property.0, ());
        if let ObjectKind::Instance { properties, .. } = &mut self.object_mut(instance).kind {
            properties.push(property);
        }
    }

    pub(crate) fn link_loaded_value(&mut self, property: PropertyId, value: ObjectId) {
        self.graph.add_edge(property.0, value.0, ());
    }

    // ─── Queries ─────────────────────────────────────────────────────────

    /// `None` for intrinsics.
    pub fn class_name(&self, id: ObjectId) -> Option<Name> {
        match &self.object(id).kind {
            ObjectKind::Instance { class, .. } => Some(*class),
            ObjectKind::Intrinsic { .. } => None,
        }
    }

    pub fn intrinsic_kind(&self, id: ObjectId) -> Option<IntrinsicKind> {
        match &self.object(id).kind {
            ObjectKind::Intrinsic { kind } => Some(*kind),
            ObjectKind::Instance { .. } => None,
        }
    }

    pub fn intrinsic_source(&self, id: ObjectId) -> Option<&str> {
        self.intrinsic_kind(id)?;
        self.glue.element(self.object(id).glue).attribute(SOURCE_ATTR)
    }

    pub fn fx_id(&self, id: ObjectId) -> Option<&str> {
        self.glue.element(self.object(id).glue).attribute(FX_ID)
    }

    pub fn live_handle(&self, id: ObjectId) -> Option<LiveHandle> {
        match &self.object(id).kind {
            ObjectKind::Instance { live, .. } => *live,
            ObjectKind::Intrinsic { .. } => None,
        }
    }

    /// Properties of an instance in order; empty for intrinsics.
    pub fn properties(&self, id: ObjectId) -> &[PropertyId] {
        match &self.object(id).kind {
            ObjectKind::Instance { properties, .. } => properties,
            ObjectKind::Intrinsic { .. } => &[],
        }
    }

    pub fn find_property(&self, id: ObjectId, name: Name) -> Option<PropertyId> {
        self.properties(id)
            .iter()
            .copied()
            .find(|p| self.property(*p).name == name)
    }

    pub fn property_name(&self, id: PropertyId) -> Name {
        self.property(id).name
    }

    /// Values of a collection property; empty for text properties.
    pub fn values(&self, id: PropertyId) -> &[ObjectId] {
        match &self.property(id).kind {
            PropertyKind::Collection { values, .. } => values,
            PropertyKind::Text { .. } => &[],
        }
    }

    pub fn is_collection(&self, id: PropertyId) -> bool {
        matches!(self.property(id).kind, PropertyKind::Collection { .. })
    }

    pub fn text_value(&self, id: PropertyId) -> Option<&str> {
        match &self.property(id).kind {
            PropertyKind::Text { value, .. } => Some(value),
            PropertyKind::Collection { .. } => None,
        }
    }

    /// Value of the text property `name` on `object`.
    pub fn text_property(&self, object: ObjectId, name: Name) -> Option<&str> {
        self.text_value(self.find_property(object, name)?)
    }

    /// Backed by a synthetic element rather than a property element.
    pub fn is_default_property(&self, id: PropertyId) -> bool {
        match &self.property(id).kind {
            PropertyKind::Collection { glue, .. } => self.glue.element(*glue).is_synthetic(),
            PropertyKind::Text { .. } => false,
        }
    }

    pub fn parent_property(&self, id: ObjectId) -> Option<PropertyId> {
        self.graph
            .neighbors_directed(id.0, Direction::Incoming)
            .next()
            .map(PropertyId)
    }

    pub fn parent_instance(&self, id: PropertyId) -> Option<ObjectId> {
        self.graph
            .neighbors_directed(id.0, Direction::Incoming)
            .next()
            .map(ObjectId)
    }

    pub fn parent_object(&self, id: ObjectId) -> Option<ObjectId> {
        self.parent_instance(self.parent_property(id)?)
    }

    pub fn index_in_parent_property(&self, id: ObjectId) -> Option<usize> {
        let property = self.parent_property(id)?;
        self.values(property).iter().position(|v| *v == id)
    }

    pub fn next_sibling(&self, id: ObjectId) -> Option<ObjectId> {
        let property = self.parent_property(id)?;
        let index = self.index_in_parent_property(id)?;
        self.values(property).get(index + 1).copied()
    }

    pub fn previous_sibling(&self, id: ObjectId) -> Option<ObjectId> {
        let property = self.parent_property(id)?;
        let index = self.index_in_parent_property(id)?;
        index
            .checked_sub(1)
            .and_then(|i| self.values(property).get(i).copied())
    }

    /// Strictly below `ancestor`.
    pub fn is_descendant_of(&self, id: ObjectId, ancestor: ObjectId) -> bool {
        let mut current = id;
        while let Some(parent) = self.parent_object(current) {
            if parent == ancestor {
                return true;
            }
            current = parent;
        }
        false
    }

    /// Reachable from the root.
    pub fn is_attached(&self, id: ObjectId) -> bool {
        let mut current = id;
        while let Some(parent) = self.parent_object(current) {
            current = parent;
        }
        self.root == Some(current)
    }

    fn backing(&self, id: PropertyId) -> Backing {
        match &self.property(id).kind {
            PropertyKind::Collection { glue, .. } => Backing::Element(*glue),
            PropertyKind::Text {
                storage: TextStorage::Element(glue),
                ..
            } => Backing::Element(*glue),
            PropertyKind::Text {
                value,
                storage: TextStorage::Attribute,
            } => Backing::Attribute(value.clone()),
        }
    }

    // ─── Creation ────────────────────────────────────────────────────────

    /// A detached instance written as `<Class/>`.
    pub fn create_instance(&mut self, class: Name) -> ObjectId {
        let glue = self.glue.create_element(class.as_str());
        self.insert_object_node(FxomObject {
            glue,
            kind: ObjectKind::Instance {
                class: class.simple(),
                properties: Vec::new(),
                live: None,
            },
        })
    }

    /// A detached `fx:include`, `fx:reference` or `fx:copy`.
    pub fn create_intrinsic(&mut self, kind: IntrinsicKind, source: &str) -> ObjectId {
        let glue = self.glue.create_element(kind.tag());
        self.glue.set_attribute(glue, SOURCE_ATTR, source);
        self.insert_object_node(FxomObject {
            glue,
            kind: ObjectKind::Intrinsic { kind },
        })
    }

    /// A detached collection property written as a property element.
    pub fn create_collection_property(&mut self, name: Name) -> PropertyId {
        let glue = self.glue.create_element(name.as_str());
        self.insert_property_node(FxomProperty {
            name,
            kind: PropertyKind::Collection {
                glue,
                values: Vec::new(),
            },
        })
    }

    /// A detached default property: its values are written directly inside
    /// the owning instance.
    pub fn create_default_property(&mut self, name: Name) -> PropertyId {
        let glue = self.glue.create_synthetic(name.as_str());
        self.insert_property_node(FxomProperty {
            name,
            kind: PropertyKind::Collection {
                glue,
                values: Vec::new(),
            },
        })
    }

    /// A detached text property written as an attribute.
    pub fn create_text_property(&mut self, name: Name, value: &str) -> PropertyId {
        self.insert_property_node(FxomProperty {
            name,
            kind: PropertyKind::Text {
                value: value.to_string(),
                storage: TextStorage::Attribute,
            },
        })
    }

    // ─── Update bracket ──────────────────────────────────────────────────

    pub fn begin_update(&mut self) {
        self.update_depth += 1;
    }

    pub fn end_update(&mut self) {
        if self.update_depth == 0 {
            log::warn!("fxom: end_update without matching begin_update");
            return;
        }
        self.update_depth -= 1;
        if self.update_depth == 0 {
            self.flush_live();
            self.revision += 1;
            self.events.push(DocumentEvent::SceneGraphChanged {
                revision: self.revision,
            });
            log::debug!("fxom: scene graph revision {}", self.revision);
        }
    }

    pub fn is_updating(&self) -> bool {
        self.update_depth > 0
    }

    fn ensure_updating(&self) -> Result<(), StructureError> {
        if self.update_depth == 0 {
            return Err(StructureError::NotUpdating);
        }
        Ok(())
    }

    fn ensure_object(&self, id: ObjectId) -> Result<(), StructureError> {
        if self.contains_object(id) {
            Ok(())
        } else {
            Err(StructureError::UnknownNode)
        }
    }

    fn ensure_property(&self, id: PropertyId) -> Result<(), StructureError> {
        if self.contains_property(id) {
            Ok(())
        } else {
            Err(StructureError::UnknownNode)
        }
    }

    fn ensure_detached(&self, id: ObjectId) -> Result<(), StructureError> {
        if self.parent_property(id).is_some() || self.root == Some(id) {
            return Err(StructureError::AlreadyAttached);
        }
        Ok(())
    }

    // ─── Mutations ───────────────────────────────────────────────────────

    /// Insert a detached object into a collection property at `index`.
    pub fn add_value(
        &mut self,
        property: PropertyId,
        index: usize,
        object: ObjectId,
    ) -> Result<(), StructureError> {
        self.ensure_updating()?;
        self.ensure_property(property)?;
        self.ensure_object(object)?;
        self.ensure_detached(object)?;
        let (backing, len) = match &self.property(property).kind {
            PropertyKind::Collection { glue, values } => (*glue, values.len()),
            PropertyKind::Text { .. } => {
                return Err(StructureError::WrongKind {
                    expected: "collection property",
                });
            }
        };
        if index > len {
            return Err(StructureError::IndexOutOfRange { index, len });
        }
        if let Some(owner) = self.parent_instance(property)
            && (owner == object || self.is_descendant_of(owner, object))
        {
            return Err(StructureError::Inconsistent(
                "cannot insert an object inside itself".into(),
            ));
        }

        let element = self.object(object).glue;
        self.glue.insert_child(backing, index, element)?;
        self.graph.add_edge(property.0, object.0, ());
        if let PropertyKind::Collection { values, .. } = &mut self.property_mut(property).kind {
            values.insert(index, object);
        }
        self.queue_insert(property, index, object);
        log::trace!("fxom: added value at {index} of `{}`", self.property_name(property));
        Ok(())
    }

    /// Detach an object from its parent property. Returns the property and
    /// the index it had.
    pub fn remove_value(&mut self, object: ObjectId) -> Result<(PropertyId, usize), StructureError> {
        self.ensure_updating()?;
        self.ensure_object(object)?;
        let property = self.parent_property(object).ok_or(StructureError::NotAttached)?;
        let Some(index) = self.index_in_parent_property(object) else {
            debug_assert!(false, "value missing from its parent property");
            return Err(StructureError::Inconsistent(
                "value missing from its parent property".into(),
            ));
        };

        self.queue_remove(property, index);
        let element = self.object(object).glue;
        self.glue.remove_child(element)?;
        if let Some(edge) = self.graph.find_edge(property.0, object.0) {
            self.graph.remove_edge(edge);
        }
        if let PropertyKind::Collection { values, .. } = &mut self.property_mut(property).kind {
            values.remove(index);
        }
        log::trace!("fxom: removed value {index} of `{}`", self.property_name(property));
        Ok((property, index))
    }

    /// Move an object to `index` within its own property. Returns the index
    /// it had.
    pub fn move_value(&mut self, object: ObjectId, index: usize) -> Result<usize, StructureError> {
        self.ensure_updating()?;
        self.ensure_object(object)?;
        let property = self.parent_property(object).ok_or(StructureError::NotAttached)?;
        let old = self
            .index_in_parent_property(object)
            .ok_or_else(|| StructureError::Inconsistent("value missing from its parent".into()))?;
        let len = self.values(property).len();
        if index >= len {
            return Err(StructureError::IndexOutOfRange { index, len });
        }
        if index == old {
            return Ok(old);
        }
        let PropertyKind::Collection { glue: backing, .. } = self.property(property).kind else {
            return Err(StructureError::WrongKind {
                expected: "collection property",
            });
        };

        self.queue_remove(property, old);
        let element = self.object(object).glue;
        self.glue.remove_child(element)?;
        self.glue.insert_child(backing, index, element)?;
        if let PropertyKind::Collection { values, .. } = &mut self.property_mut(property).kind {
            values.remove(old);
            values.insert(index, object);
        }
        self.queue_insert(property, index, object);
        Ok(old)
    }

    /// Attach a detached property at the end of an instance's properties.
    pub fn add_property(&mut self, instance: ObjectId, property: PropertyId) -> Result<(), StructureError> {
        self.ensure_updating()?;
        self.ensure_object(instance)?;
        self.ensure_property(property)?;
        let index = self.properties(instance).len();
        let host = self.object(instance).glue;
        let slot = match self.backing(property) {
            Backing::Attribute(_) => GlueSlot::Attribute(self.glue.element(host).attributes().len()),
            Backing::Element(_) => GlueSlot::Child(self.glue.children(host).len()),
        };
        self.attach_property(instance, property, index, slot)
    }

    /// Detach a property from its instance, remembering where it was.
    pub fn remove_property(&mut self, property: PropertyId) -> Result<PropertyRemoval, StructureError> {
        self.ensure_updating()?;
        self.ensure_property(property)?;
        let instance = self.parent_instance(property).ok_or(StructureError::NotAttached)?;
        let name = self.property_name(property);
        let index = self
            .properties(instance)
            .iter()
            .position(|p| *p == property)
            .ok_or_else(|| StructureError::Inconsistent("property missing from its instance".into()))?;
        let host = self.object(instance).glue;

        if self.live_handle(instance).is_some() {
            let updates: Vec<LiveUpdate> = match &self.property(property).kind {
                PropertyKind::Text { .. } => vec![LiveUpdate::ClearValue {
                    object: instance,
                    property: name,
                }],
                PropertyKind::Collection { values, .. } => (0..self.live_index(values, values.len()))
                    .rev()
                    .map(|index| LiveUpdate::RemoveChild {
                        parent: instance,
                        property: name,
                        index,
                    })
                    .collect(),
            };
            for update in updates {
                self.queue_live(update);
            }
        }

        let slot = match self.backing(property) {
            Backing::Attribute(_) => {
                let (position, _) = self
                    .glue
                    .remove_attribute(host, name.as_str())
                    .ok_or_else(|| StructureError::Inconsistent(format!("attribute `{name}` missing")))?;
                GlueSlot::Attribute(position)
            }
            Backing::Element(element) => GlueSlot::Child(self.glue.remove_child(element)?.1),
        };
        if let Some(edge) = self.graph.find_edge(instance.0, property.0) {
            self.graph.remove_edge(edge);
        }
        if let ObjectKind::Instance { properties, .. } = &mut self.object_mut(instance).kind {
            properties.remove(index);
        }
        log::trace!("fxom: removed property `{name}`");
        Ok(PropertyRemoval {
            instance,
            index,
            slot,
        })
    }

    /// Undo of `remove_property`: re-attach at the recorded positions.
    pub fn restore_property(
        &mut self,
        property: PropertyId,
        removal: &PropertyRemoval,
    ) -> Result<(), StructureError> {
        self.ensure_updating()?;
        self.ensure_object(removal.instance)?;
        self.ensure_property(property)?;
        self.attach_property(removal.instance, property, removal.index, removal.slot)
    }

    fn attach_property(
        &mut self,
        instance: ObjectId,
        property: PropertyId,
        index: usize,
        slot: GlueSlot,
    ) -> Result<(), StructureError> {
        let ObjectKind::Instance { properties, .. } = &self.object(instance).kind else {
            return Err(StructureError::WrongKind { expected: "instance" });
        };
        if index > properties.len() {
            return Err(StructureError::IndexOutOfRange {
                index,
                len: properties.len(),
            });
        }
        if self.parent_instance(property).is_some() {
            return Err(StructureError::AlreadyAttached);
        }
        let name = self.property_name(property);
        if self.find_property(instance, name).is_some() {
            return Err(StructureError::DuplicateProperty(name.to_string()));
        }
        if let PropertyKind::Collection { values, .. } = &self.property(property).kind
            && values
                .iter()
                .any(|v| *v == instance || self.is_descendant_of(instance, *v))
        {
            return Err(StructureError::Inconsistent(
                "cannot insert an object inside itself".into(),
            ));
        }

        let host = self.object(instance).glue;
        match (self.backing(property), slot) {
            (Backing::Attribute(value), GlueSlot::Attribute(position)) => {
                if self.glue.element(host).attribute(name.as_str()).is_some() {
                    return Err(StructureError::DuplicateProperty(name.to_string()));
                }
                self.glue.insert_attribute_at(host, position, name.as_str(), &value);
            }
            (Backing::Element(element), GlueSlot::Child(position)) => {
                self.glue.insert_child(host, position, element)?;
            }
            _ => {
                return Err(StructureError::Inconsistent(
                    "property storage does not match its removal record".into(),
                ));
            }
        }

        self.graph.add_edge(instance.0, property.0, ());
        if let ObjectKind::Instance { properties, .. } = &mut self.object_mut(instance).kind {
            properties.insert(index, property);
        }

        if self.live_handle(instance).is_some() {
            let updates: Vec<LiveUpdate> = match &self.property(property).kind {
                PropertyKind::Text { value, .. } => vec![LiveUpdate::SetValue {
                    object: instance,
                    property: name,
                    value: value.clone(),
                }],
                PropertyKind::Collection { values, .. } => values
                    .iter()
                    .filter(|v| self.class_name(**v).is_some())
                    .enumerate()
                    .map(|(index, child)| LiveUpdate::InsertChild {
                        parent: instance,
                        property: name,
                        index,
                        child: *child,
                    })
                    .collect(),
            };
            for update in updates {
                self.queue_live(update);
            }
        }
        log::trace!("fxom: attached property `{name}` at {index}");
        Ok(())
    }

    /// Change the value of a text property.
    pub fn set_text_value(&mut self, property: PropertyId, value: &str) -> Result<TextRestore, StructureError> {
        self.apply_text(property, value.to_string(), None)
    }

    /// Put back a value captured by `set_text_value`, formatting included.
    /// Returns the inverse again, for redo.
    pub fn restore_text_value(
        &mut self,
        property: PropertyId,
        restore: TextRestore,
    ) -> Result<TextRestore, StructureError> {
        self.apply_text(property, restore.value, restore.content)
    }

    fn apply_text(
        &mut self,
        property: PropertyId,
        value: String,
        content: Option<Vec<GlueAux>>,
    ) -> Result<TextRestore, StructureError> {
        self.ensure_updating()?;
        self.ensure_property(property)?;
        let name = self.property_name(property);
        let (old, storage) = match &self.property(property).kind {
            PropertyKind::Text { value, storage } => (value.clone(), *storage),
            PropertyKind::Collection { .. } => {
                return Err(StructureError::WrongKind {
                    expected: "text property",
                });
            }
        };
        let owner = self.parent_instance(property);

        let old_content = match storage {
            TextStorage::Attribute => {
                if let Some(owner) = owner {
                    let host = self.object(owner).glue;
                    self.glue.set_attribute(host, name.as_str(), &value);
                }
                None
            }
            TextStorage::Element(element) => Some(match content {
                Some(content) => self.glue.replace_content(element, content),
                None => self.glue.set_content_text(element, &value),
            }),
        };

        if let Some(owner) = owner
            && self.live_handle(owner).is_some()
        {
            self.queue_live(LiveUpdate::SetValue {
                object: owner,
                property: name,
                value: value.clone(),
            });
        }
        if let PropertyKind::Text { value: current, .. } = &mut self.property_mut(property).kind {
            *current = value;
        }
        Ok(TextRestore {
            value: old,
            content: old_content,
        })
    }

    /// Set or clear (`None`) the `fx:id` of an object. Returns the old value.
    pub fn set_fx_id(&mut self, object: ObjectId, fx_id: Option<&str>) -> Result<Option<String>, StructureError> {
        self.ensure_updating()?;
        self.ensure_object(object)?;
        let glue = self.object(object).glue;
        Ok(match fx_id {
            Some(value) => self.glue.set_attribute(glue, FX_ID, value),
            None => self.glue.remove_attribute(glue, FX_ID).map(|(_, value)| value),
        })
    }

    /// Replace the root object. Returns the previous root.
    pub fn set_root(&mut self, root: Option<ObjectId>) -> Result<Option<ObjectId>, StructureError> {
        self.ensure_updating()?;
        if let Some(object) = root {
            self.ensure_object(object)?;
            self.ensure_detached(object)?;
        }
        let element = root.map(|object| self.object(object).glue);
        self.glue.set_main_element(element)?;
        let previous = std::mem::replace(&mut self.root, root);
        if let Some(object) = root {
            self.queue_live(LiveUpdate::Instantiate(object));
        }
        log::debug!("fxom: root replaced");
        Ok(previous)
    }

    // ─── Live objects ────────────────────────────────────────────────────

    fn queue_live(&mut self, update: LiveUpdate) {
        if self.factory.is_some() {
            self.pending_live.push(update);
        }
    }

    /// Position among the values that have live counterparts.
    fn live_index(&self, values: &[ObjectId], index: usize) -> usize {
        values[..index.min(values.len())]
            .iter()
            .filter(|v| self.class_name(**v).is_some())
            .count()
    }

    fn queue_insert(&mut self, property: PropertyId, index: usize, child: ObjectId) {
        let Some(parent) = self.parent_instance(property) else {
            return;
        };
        if self.live_handle(parent).is_none() || self.class_name(child).is_none() {
            return;
        }
        let live_index = self.live_index(self.values(property), index);
        let name = self.property_name(property);
        self.queue_live(LiveUpdate::InsertChild {
            parent,
            property: name,
            index: live_index,
            child,
        });
    }

    fn queue_remove(&mut self, property: PropertyId, index: usize) {
        let Some(parent) = self.parent_instance(property) else {
            return;
        };
        let values = self.values(property);
        let is_instance = values.get(index).is_some_and(|v| self.class_name(*v).is_some());
        if self.live_handle(parent).is_none() || !is_instance {
            return;
        }
        let live_index = self.live_index(values, index);
        let name = self.property_name(property);
        self.queue_live(LiveUpdate::RemoveChild {
            parent,
            property: name,
            index: live_index,
        });
    }

    fn flush_live(&mut self) {
        let updates = std::mem::take(&mut self.pending_live);
        let Some(mut factory) = self.factory.take() else {
            return;
        };
        self.live_errors.clear();
        for update in updates {
            log::trace!("fxom: live {update:?}");
            if let Err(err) = self.apply_live(factory.as_mut(), update) {
                log::warn!("fxom: live update failed: {err}");
                self.live_errors.push(err);
            }
        }
        self.factory = Some(factory);
    }

    fn apply_live(
        &mut self,
        factory: &mut dyn LiveObjectFactory,
        update: LiveUpdate,
    ) -> Result<(), LiveError> {
        match update {
            LiveUpdate::SetValue {
                object,
                property,
                value,
            } => {
                if let Some(handle) = self.live_handle(object) {
                    factory.set_value(handle, property, &value)?;
                }
            }
            LiveUpdate::ClearValue { object, property } => {
                if let Some(handle) = self.live_handle(object) {
                    factory.clear_value(handle, property)?;
                }
            }
            LiveUpdate::InsertChild {
                parent,
                property,
                index,
                child,
            } => {
                if let Some(handle) = self.live_handle(parent)
                    && let Some(child) = self.ensure_live(factory, child)?
                {
                    factory.insert_child(handle, property, index, child)?;
                }
            }
            LiveUpdate::RemoveChild {
                parent,
                property,
                index,
            } => {
                if let Some(handle) = self.live_handle(parent) {
                    factory.remove_child(handle, property, index)?;
                }
            }
            LiveUpdate::Instantiate(object) => {
                self.ensure_live(factory, object)?;
            }
        }
        Ok(())
    }

    /// Live counterpart of `object`, built on demand with its whole subtree.
    fn ensure_live(
        &mut self,
        factory: &mut dyn LiveObjectFactory,
        object: ObjectId,
    ) -> Result<Option<LiveHandle>, LiveError> {
        let (class, properties) = match &self.object(object).kind {
            ObjectKind::Instance {
                live: Some(handle), ..
            } => return Ok(Some(*handle)),
            ObjectKind::Instance {
                class, properties, ..
            } => (*class, properties.clone()),
            ObjectKind::Intrinsic { .. } => return Ok(None),
        };

        let handle = factory.instantiate(class)?;
        if let ObjectKind::Instance { live, .. } = &mut self.object_mut(object).kind {
            *live = Some(handle);
        }
        for property in properties {
            let name = self.property_name(property);
            match self.property(property).kind.clone() {
                PropertyKind::Text { value, .. } => factory.set_value(handle, name, &value)?,
                PropertyKind::Collection { values, .. } => {
                    let mut index = 0;
                    for value in values {
                        if let Some(child) = self.ensure_live(factory, value)? {
                            factory.insert_child(handle, name, index, child)?;
                            index += 1;
                        }
                    }
                }
            }
        }
        log::trace!("fxom: instantiated live `{class}`");
        Ok(Some(handle))
    }

    // ─── Invariants ──────────────────────────────────────────────────────

    /// Verify that the object graph and the Glue tree agree.
    pub fn check_consistency(&self) -> Result<(), StructureError> {
        self.glue.check_consistency()?;
        let fail = |message: String| Err(StructureError::Inconsistent(message));

        for index in self.graph.node_indices() {
            let incoming: Vec<_> = self
                .graph
                .neighbors_directed(index, Direction::Incoming)
                .collect();
            if incoming.len() > 1 {
                return fail(format!("node {index:?} has {} parents", incoming.len()));
            }
            let outgoing = self.graph.neighbors_directed(index, Direction::Outgoing).count();
            match &self.graph[index] {
                FxomNode::Object(object) => {
                    if let Some(parent) = incoming.first()
                        && !matches!(self.graph[*parent], FxomNode::Property(_))
                    {
                        return fail("object parented by an object".into());
                    }
                    let expected = match &object.kind {
                        ObjectKind::Instance { properties, .. } => properties.len(),
                        ObjectKind::Intrinsic { .. } => 0,
                    };
                    if outgoing != expected {
                        return fail(format!("object lists {expected} properties, has {outgoing} edges"));
                    }
                    for property in self.properties(ObjectId(index)) {
                        if self.parent_instance(*property) != Some(ObjectId(index)) {
                            return fail("property points at another instance".into());
                        }
                    }
                }
                FxomNode::Property(property) => {
                    let owner = incoming.first().map(|i| ObjectId(*i));
                    if let Some(owner) = owner
                        && !matches!(self.graph[owner.0], FxomNode::Object(_))
                    {
                        return fail("property parented by a property".into());
                    }
                    let host = owner.map(|o| self.object(o).glue);
                    match &property.kind {
                        PropertyKind::Collection { glue, values } => {
                            if outgoing != values.len() {
                                return fail(format!("`{}` lists {} values, has {outgoing} edges", property.name, values.len()));
                            }
                            let glue_children: Vec<GlueId> =
                                values.iter().map(|v| self.object(*v).glue).collect();
                            if self.glue.children(*glue) != glue_children.as_slice() {
                                return fail(format!("`{}` value order differs from markup", property.name));
                            }
                            if let Some(host) = host
                                && self.glue.parent(*glue) != Some(host)
                            {
                                return fail(format!("`{}` element is not inside its instance", property.name));
                            }
                        }
                        PropertyKind::Text { value, storage } => match (storage, host) {
                            (TextStorage::Attribute, Some(host)) => {
                                if self.glue.element(host).attribute(property.name.as_str()) != Some(value.as_str()) {
                                    return fail(format!("attribute `{}` differs from its property", property.name));
                                }
                            }
                            (TextStorage::Element(element), Some(host)) => {
                                if self.glue.parent(*element) != Some(host) {
                                    return fail(format!("`{}` element is not inside its instance", property.name));
                                }
                            }
                            (_, None) => {}
                        },
                    }
                }
            }
        }

        if let Some(root) = self.root {
            if self.parent_property(root).is_some() {
                return fail("root has a parent".into());
            }
            if self.glue.main_element() != Some(self.object(root).glue) {
                return fail("root is not the main element".into());
            }
        } else if self.glue.main_element().is_some() {
            return fail("main element without a root object".into());
        }
        Ok(())
    }
}
