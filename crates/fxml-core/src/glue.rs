//! Glue layer: the token-preserving markup tree.
//!
//! Elements live in an arena and are addressed by `GlueId`. Parent → child
//! containment is stored twice on purpose: graph edges answer "who is my
//! parent", the ordered `children` list answers "in which order". Every edit
//! goes through `GlueDocument` so the two never disagree.
//!
//! Everything that is not an element (whitespace runs, comments, processing
//! instructions) is a `GlueAux` hanging off the element it precedes (`front`),
//! the element it fills (`content`), or the element it closes (`tail`).

use crate::error::{StructureError, TextPosition};
use petgraph::Direction;
use petgraph::graph::NodeIndex;
use petgraph::stable_graph::StableDiGraph;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

/// Tag prefix of elements that exist only in the object graph. The emitter
/// skips their tags and writes their children in place.
pub const SYNTHETIC_PREFIX: &str = "fxom-synthetic:";

/// Tag of boxed literal elements.
pub const LITERAL_TAG: &str = "Object";

/// Attribute holding the value of a boxed literal element.
pub const LITERAL_VALUE_ATTR: &str = "fxom:literal";

/// Handle of an element in a `GlueDocument`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GlueId(pub(crate) NodeIndex);

// ─── Nodes ───────────────────────────────────────────────────────────────

/// A non-element node, kept only to reproduce the source formatting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GlueAux {
    /// Raw character data as it appeared in the source (entities and CDATA
    /// sections are not decoded).
    Characters(String),
    /// `<!--text-->`
    Comment(String),
    /// `<?target data?>`
    Instruction { target: String, data: String },
}

impl GlueAux {
    pub fn is_whitespace(&self) -> bool {
        matches!(self, GlueAux::Characters(s) if s.chars().all(char::is_whitespace))
    }

    fn starts_line(&self) -> bool {
        matches!(self, GlueAux::Characters(s) if s.starts_with('\n') || s.starts_with("\r\n"))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GlueAttribute {
    pub name: String,
    /// Decoded value; escaping is applied by the emitter.
    pub value: String,
}

#[derive(Debug, Clone)]
pub struct GlueElement {
    pub tag: String,
    attributes: SmallVec<[GlueAttribute; 4]>,
    children: Vec<GlueId>,
    /// Auxiliaries between the previous sibling (or the parent's start tag)
    /// and this element's start tag.
    pub front: Vec<GlueAux>,
    /// Inline auxiliaries of an element without child elements.
    pub content: Vec<GlueAux>,
    /// Auxiliaries between the last child element and the end tag.
    pub tail: Vec<GlueAux>,
    /// Source location of the start tag, for parsed elements.
    pub position: Option<TextPosition>,
    /// Created programmatically and never inserted yet.
    fresh: bool,
    /// `tail` was seeded by an insertion rather than read from source.
    tail_seeded: bool,
    /// Inline content handed to the first child inserted, kept to give it
    /// back when that child leaves again.
    moved_content: Option<MovedContent>,
}

/// Inline content displaced by a first child: `lead` auxiliaries now open the
/// front of `recipient`, the original list is kept verbatim.
#[derive(Debug, Clone)]
struct MovedContent {
    recipient: GlueId,
    lead: usize,
    original: Vec<GlueAux>,
}

impl GlueElement {
    fn new(tag: &str, fresh: bool) -> Self {
        Self {
            tag: tag.to_string(),
            attributes: SmallVec::new(),
            children: Vec::new(),
            front: Vec::new(),
            content: Vec::new(),
            tail: Vec::new(),
            position: None,
            fresh,
            tail_seeded: false,
            moved_content: None,
        }
    }

    pub fn attributes(&self) -> &[GlueAttribute] {
        &self.attributes
    }

    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|a| a.name == name)
            .map(|a| a.value.as_str())
    }

    pub fn children(&self) -> &[GlueId] {
        &self.children
    }

    pub fn is_synthetic(&self) -> bool {
        self.tag.starts_with(SYNTHETIC_PREFIX)
    }

    pub fn is_literal(&self) -> bool {
        self.tag == LITERAL_TAG && self.attribute(LITERAL_VALUE_ATTR).is_some()
    }
}

/// One entry of the document's top-level sequence.
#[derive(Debug, Clone)]
pub enum TopLevel {
    Aux(GlueAux),
    Main(GlueId),
}

/// Formatting options for programmatic edits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GlueConfig {
    /// Indentation unit used when a fresh element is inserted.
    pub indent: String,
}

impl Default for GlueConfig {
    fn default() -> Self {
        Self {
            indent: "    ".to_string(),
        }
    }
}

// ─── Document ────────────────────────────────────────────────────────────

/// A markup document: top-level auxiliaries plus at most one main element.
#[derive(Debug, Clone, Default)]
pub struct GlueDocument {
    graph: StableDiGraph<GlueElement, ()>,
    nodes: Vec<TopLevel>,
    /// Where the main element sat before it was detached.
    main_slot: Option<usize>,
    pub config: GlueConfig,
}

impl GlueDocument {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_config(config: GlueConfig) -> Self {
        Self {
            config,
            ..Self::default()
        }
    }

    // ─── Creation ────────────────────────────────────────────────────────

    /// Create a detached element. It is indented on first insertion.
    pub fn create_element(&mut self, tag: &str) -> GlueId {
        GlueId(self.graph.add_node(GlueElement::new(tag, true)))
    }

    /// Create a detached synthetic wrapper (elided on save).
    pub fn create_synthetic(&mut self, name: &str) -> GlueId {
        let tag = format!("{SYNTHETIC_PREFIX}{name}");
        GlueId(self.graph.add_node(GlueElement::new(&tag, true)))
    }

    /// Create a detached boxed literal, emitted as bare text.
    pub fn create_literal(&mut self, value: &str) -> GlueId {
        let mut element = GlueElement::new(LITERAL_TAG, true);
        element.attributes.push(GlueAttribute {
            name: LITERAL_VALUE_ATTR.to_string(),
            value: value.to_string(),
        });
        GlueId(self.graph.add_node(element))
    }

    /// Parser entry point: elements read from text are never re-indented.
    pub(crate) fn add_parsed_element(
        &mut self,
        tag: &str,
        attributes: SmallVec<[GlueAttribute; 4]>,
        front: Vec<GlueAux>,
        position: TextPosition,
    ) -> GlueId {
        let mut element = GlueElement::new(tag, false);
        element.attributes = attributes;
        element.front = front;
        element.position = Some(position);
        GlueId(self.graph.add_node(element))
    }

    pub(crate) fn push_top_level(&mut self, node: TopLevel) {
        self.nodes.push(node);
    }

    /// Append a child during parsing, bypassing the seeding rules.
    pub(crate) fn link_parsed_child(&mut self, parent: GlueId, child: GlueId) {
        self.graph.add_edge(parent.0, child.0, ());
        self.graph[parent.0].children.push(child);
    }

    /// Move `children` of `parent` into a new synthetic element placed where
    /// the first of them was. Loader support: formatting is left untouched.
    pub(crate) fn wrap_in_synthetic(
        &mut self,
        parent: GlueId,
        children: &[GlueId],
        name: &str,
    ) -> Result<GlueId, StructureError> {
        let first = children.first().ok_or(StructureError::NotAttached)?;
        let slot = self.index_in_parent(*first).ok_or(StructureError::NotAttached)?;
        let tag = format!("{SYNTHETIC_PREFIX}{name}");
        let wrapper = GlueId(self.graph.add_node(GlueElement::new(&tag, false)));
        for child in children {
            if self.parent(*child) != Some(parent) {
                return Err(StructureError::NotAttached);
            }
            if let Some(edge) = self.graph.find_edge(parent.0, child.0) {
                self.graph.remove_edge(edge);
            }
            self.graph[parent.0].children.retain(|c| c != child);
            self.link_parsed_child(wrapper, *child);
        }
        self.graph.add_edge(parent.0, wrapper.0, ());
        self.graph[parent.0].children.insert(slot, wrapper);
        Ok(wrapper)
    }

    // ─── Access ──────────────────────────────────────────────────────────

    pub fn contains(&self, id: GlueId) -> bool {
        self.graph.contains_node(id.0)
    }

    /// Panics on a handle from another document, like slice indexing.
    pub fn element(&self, id: GlueId) -> &GlueElement {
        &self.graph[id.0]
    }

    pub fn element_mut(&mut self, id: GlueId) -> &mut GlueElement {
        &mut self.graph[id.0]
    }

    pub fn top_level(&self) -> &[TopLevel] {
        &self.nodes
    }

    pub fn main_element(&self) -> Option<GlueId> {
        self.nodes.iter().find_map(|n| match n {
            TopLevel::Main(id) => Some(*id),
            TopLevel::Aux(_) => None,
        })
    }

    fn main_index(&self) -> Option<usize> {
        self.nodes.iter().position(|n| matches!(n, TopLevel::Main(_)))
    }

    /// Top-level auxiliaries before the main element (all of them when there
    /// is no main element).
    pub fn header(&self) -> impl Iterator<Item = &GlueAux> {
        let end = self.main_index().unwrap_or(self.nodes.len());
        self.nodes[..end].iter().filter_map(|n| match n {
            TopLevel::Aux(aux) => Some(aux),
            TopLevel::Main(_) => None,
        })
    }

    /// Top-level auxiliaries after the main element.
    pub fn footer(&self) -> impl Iterator<Item = &GlueAux> {
        let start = self.main_index().map_or(self.nodes.len(), |i| i + 1);
        self.nodes[start..].iter().filter_map(|n| match n {
            TopLevel::Aux(aux) => Some(aux),
            TopLevel::Main(_) => None,
        })
    }

    /// Replace every top-level auxiliary before the main element.
    pub fn set_header(&mut self, header: Vec<GlueAux>) {
        let end = self.main_index().unwrap_or(self.nodes.len());
        let mut nodes: Vec<TopLevel> = header.into_iter().map(TopLevel::Aux).collect();
        nodes.extend(self.nodes.drain(end..));
        self.nodes = nodes;
        self.main_slot = None;
    }

    /// Install (or remove, with `None`) the main element. Returns the previous one.
    pub fn set_main_element(
        &mut self,
        element: Option<GlueId>,
    ) -> Result<Option<GlueId>, StructureError> {
        if let Some(id) = element {
            if !self.contains(id) {
                return Err(StructureError::UnknownNode);
            }
            if self.parent(id).is_some() || self.main_element() == Some(id) {
                return Err(StructureError::AlreadyAttached);
            }
        }
        let previous = self.main_element();
        match (self.main_index(), element) {
            (Some(index), Some(id)) => self.nodes[index] = TopLevel::Main(id),
            (Some(index), None) => {
                self.nodes.remove(index);
                self.main_slot = Some(index);
            }
            (None, Some(id)) => {
                let slot = self
                    .main_slot
                    .take()
                    .filter(|s| *s <= self.nodes.len())
                    .unwrap_or(self.nodes.len());
                self.nodes.insert(slot, TopLevel::Main(id));
            }
            (None, None) => {}
        }
        Ok(previous)
    }

    pub fn parent(&self, id: GlueId) -> Option<GlueId> {
        self.graph
            .neighbors_directed(id.0, Direction::Incoming)
            .next()
            .map(GlueId)
    }

    pub fn children(&self, id: GlueId) -> &[GlueId] {
        &self.graph[id.0].children
    }

    pub fn index_in_parent(&self, id: GlueId) -> Option<usize> {
        let parent = self.parent(id)?;
        self.children(parent).iter().position(|c| *c == id)
    }

    /// Attached to the main element, directly or through ancestors.
    pub fn is_attached(&self, id: GlueId) -> bool {
        let mut current = id;
        while let Some(parent) = self.parent(current) {
            current = parent;
        }
        self.main_element() == Some(current)
    }

    /// Whether the emitter writes anything for this element's children.
    pub fn has_emitted_children(&self, id: GlueId) -> bool {
        self.children(id).iter().any(|child| {
            !self.element(*child).is_synthetic() || self.has_emitted_children(*child)
        })
    }

    /// Closest ancestor (or self) that is not synthetic.
    fn emitting_element(&self, id: GlueId) -> GlueId {
        let mut current = id;
        while self.element(current).is_synthetic() {
            match self.parent(current) {
                Some(parent) => current = parent,
                None => break,
            }
        }
        current
    }

    /// Indentation of an element: whitespace after the last line break of
    /// its front (or of the one it is emitted through).
    pub fn indent_of(&self, id: GlueId) -> String {
        let id = self.emitting_element(id);
        let front = &self.element(id).front;
        for aux in front.iter().rev() {
            if let GlueAux::Characters(text) = aux {
                if let Some(nl) = text.rfind('\n') {
                    return text[nl + 1..]
                        .chars()
                        .take_while(|c| *c == ' ' || *c == '\t')
                        .collect();
                }
            }
        }
        String::new()
    }

    // ─── Structure edits ─────────────────────────────────────────────────

    /// Insert a detached element as the `index`-th child of `parent`.
    ///
    /// A fresh element gets a line break plus indentation as its front. When
    /// `parent` has nothing emitted yet and an empty tail, a child starting a
    /// new line seeds the tail so the end tag lands on its own line. The seed
    /// is withdrawn once the last emitted child is removed again.
    pub fn insert_child(
        &mut self,
        parent: GlueId,
        index: usize,
        child: GlueId,
    ) -> Result<(), StructureError> {
        if !self.contains(parent) || !self.contains(child) {
            return Err(StructureError::UnknownNode);
        }
        if self.parent(child).is_some() || self.main_element() == Some(child) {
            return Err(StructureError::AlreadyAttached);
        }
        if parent == child || self.is_ancestor(child, parent) {
            return Err(StructureError::Inconsistent(
                "cannot insert an element inside itself".into(),
            ));
        }
        let len = self.children(parent).len();
        if index > len {
            return Err(StructureError::IndexOutOfRange { index, len });
        }

        let host = self.emitting_element(parent);
        let host_indent = self.indent_of(host);
        if self.graph[child.0].fresh {
            let element = &mut self.graph[child.0];
            element.fresh = false;
            if element.front.is_empty() && !element.is_synthetic() && !element.is_literal() {
                element.front = vec![GlueAux::Characters(format!(
                    "\n{host_indent}{}",
                    self.config.indent
                ))];
            }
        }

        let starts_line = self
            .first_emitted_front(child)
            .is_some_and(GlueAux::starts_line);
        let first_emitted = !self.has_emitted_children(host);
        if first_emitted {
            self.move_content_to_child(host, child);
        }
        if starts_line && first_emitted && self.graph[host.0].tail.is_empty() {
            let element = &mut self.graph[host.0];
            element.tail = vec![GlueAux::Characters(format!("\n{host_indent}"))];
            element.tail_seeded = true;
        }

        self.graph.add_edge(parent.0, child.0, ());
        self.graph[parent.0].children.insert(index, child);
        log::trace!("glue: inserted <{}> at {index}", self.element(child).tag);
        Ok(())
    }

    /// Detach `child` from its parent. Returns the parent and the index it had.
    pub fn remove_child(&mut self, child: GlueId) -> Result<(GlueId, usize), StructureError> {
        let parent = self.parent(child).ok_or(StructureError::NotAttached)?;
        let index = self
            .index_in_parent(child)
            .ok_or_else(|| StructureError::Inconsistent("child missing from parent list".into()))?;
        if let Some(edge) = self.graph.find_edge(parent.0, child.0) {
            self.graph.remove_edge(edge);
        }
        self.graph[parent.0].children.remove(index);

        let host = self.emitting_element(parent);
        if !self.has_emitted_children(host) {
            self.restore_moved_content(host, child);
        }
        if self.graph[host.0].tail_seeded && !self.has_emitted_children(host) {
            let element = &mut self.graph[host.0];
            element.tail.clear();
            element.tail_seeded = false;
        }
        log::trace!("glue: removed <{}> from {index}", self.element(child).tag);
        Ok((parent, index))
    }

    /// Hand the host's inline comments and instructions to the first element
    /// written for `child`, since content is only emitted while the host has
    /// no children. Whitespace after the last of them becomes the host tail.
    /// Text content is left alone.
    fn move_content_to_child(&mut self, host: GlueId, child: GlueId) {
        let content = &self.graph[host.0].content;
        if content
            .iter()
            .any(|aux| matches!(aux, GlueAux::Characters(_)) && !aux.is_whitespace())
        {
            return;
        }
        let Some(last) = content.iter().rposition(|aux| !aux.is_whitespace()) else {
            return;
        };
        let Some(recipient) = self.first_emitted_element(child) else {
            return;
        };
        let original = std::mem::take(&mut self.graph[host.0].content);
        let lead = last + 1;
        let trail = original[lead..].to_vec();

        let front = &mut self.graph[recipient.0].front;
        front.splice(0..0, original[..lead].iter().cloned());

        let element = &mut self.graph[host.0];
        if !trail.is_empty() && element.tail.is_empty() {
            element.tail = trail;
            element.tail_seeded = true;
        }
        element.moved_content = Some(MovedContent {
            recipient,
            lead,
            original,
        });
    }

    /// Undo `move_content_to_child` once the element that received the
    /// content is removed and the host is empty again.
    fn restore_moved_content(&mut self, host: GlueId, child: GlueId) {
        let Some(recipient) = self.first_emitted_element(child) else {
            return;
        };
        let matches = self.graph[host.0]
            .moved_content
            .as_ref()
            .is_some_and(|moved| moved.recipient == recipient);
        if !matches {
            return;
        }
        let Some(moved) = self.graph[host.0].moved_content.take() else {
            return;
        };
        let front = &mut self.graph[recipient.0].front;
        front.drain(..moved.lead.min(front.len()));
        self.graph[host.0].content = moved.original;
    }

    /// First non-synthetic element the emitter would write for `id`.
    fn first_emitted_element(&self, id: GlueId) -> Option<GlueId> {
        let element = self.element(id);
        if element.is_synthetic() {
            element
                .children
                .iter()
                .find_map(|c| self.first_emitted_element(*c))
        } else {
            Some(id)
        }
    }

    /// Front of the first element the emitter would write for `id`.
    fn first_emitted_front(&self, id: GlueId) -> Option<&GlueAux> {
        let element = self.element(id);
        if element.is_synthetic() {
            element
                .children
                .iter()
                .find_map(|c| self.first_emitted_front(*c))
        } else {
            element.front.first()
        }
    }

    fn is_ancestor(&self, ancestor: GlueId, of: GlueId) -> bool {
        let mut current = of;
        while let Some(parent) = self.parent(current) {
            if parent == ancestor {
                return true;
            }
            current = parent;
        }
        false
    }

    // ─── Attributes ──────────────────────────────────────────────────────

    /// Set an attribute in place, or append it. Returns the previous value.
    pub fn set_attribute(&mut self, id: GlueId, name: &str, value: &str) -> Option<String> {
        let attributes = &mut self.graph[id.0].attributes;
        if let Some(existing) = attributes.iter_mut().find(|a| a.name == name) {
            return Some(std::mem::replace(&mut existing.value, value.to_string()));
        }
        attributes.push(GlueAttribute {
            name: name.to_string(),
            value: value.to_string(),
        });
        None
    }

    /// Remove an attribute. Returns its position and value.
    pub fn remove_attribute(&mut self, id: GlueId, name: &str) -> Option<(usize, String)> {
        let attributes = &mut self.graph[id.0].attributes;
        let position = attributes.iter().position(|a| a.name == name)?;
        let removed = attributes.remove(position);
        Some((position, removed.value))
    }

    /// Re-insert an attribute at a known position (undo of `remove_attribute`).
    pub fn insert_attribute_at(&mut self, id: GlueId, position: usize, name: &str, value: &str) {
        let attributes = &mut self.graph[id.0].attributes;
        let position = position.min(attributes.len());
        attributes.insert(
            position,
            GlueAttribute {
                name: name.to_string(),
                value: value.to_string(),
            },
        );
    }

    // ─── Content ─────────────────────────────────────────────────────────

    /// Replace the inline content with an escaped text run. Returns the old content.
    pub fn set_content_text(&mut self, id: GlueId, text: &str) -> Vec<GlueAux> {
        let replacement = if text.is_empty() {
            Vec::new()
        } else {
            vec![GlueAux::Characters(escape_text(text))]
        };
        self.replace_content(id, replacement)
    }

    pub fn replace_content(&mut self, id: GlueId, content: Vec<GlueAux>) -> Vec<GlueAux> {
        std::mem::replace(&mut self.graph[id.0].content, content)
    }

    /// Decoded text of the inline content (comments and instructions skipped).
    pub fn text_content(&self, id: GlueId) -> String {
        let element = self.element(id);
        if element.is_literal() {
            return element
                .attribute(LITERAL_VALUE_ATTR)
                .unwrap_or_default()
                .to_string();
        }
        element
            .content
            .iter()
            .filter_map(|aux| match aux {
                GlueAux::Characters(raw) => Some(unescape(raw)),
                _ => None,
            })
            .collect()
    }

    // ─── Invariants ──────────────────────────────────────────────────────

    /// Verify that graph edges and ordered child lists agree.
    pub fn check_consistency(&self) -> Result<(), StructureError> {
        for idx in self.graph.node_indices() {
            let id = GlueId(idx);
            let element = &self.graph[idx];
            let incoming = self.graph.neighbors_directed(idx, Direction::Incoming).count();
            if incoming > 1 {
                return Err(StructureError::Inconsistent(format!(
                    "<{}> has {incoming} parents",
                    element.tag
                )));
            }
            let outgoing = self.graph.neighbors_directed(idx, Direction::Outgoing).count();
            if outgoing != element.children.len() {
                return Err(StructureError::Inconsistent(format!(
                    "<{}> lists {} children but has {outgoing} edges",
                    element.tag,
                    element.children.len()
                )));
            }
            for child in &element.children {
                if self.parent(*child) != Some(id) {
                    return Err(StructureError::Inconsistent(format!(
                        "child of <{}> points elsewhere",
                        element.tag
                    )));
                }
            }
        }
        if let Some(main) = self.main_element()
            && self.parent(main).is_some()
        {
            return Err(StructureError::Inconsistent("main element has a parent".into()));
        }
        Ok(())
    }
}

// ─── Escaping ────────────────────────────────────────────────────────────

pub fn escape_text(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            _ => out.push(c),
        }
    }
    out
}

pub fn escape_attribute(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\n' => out.push_str("&#10;"),
            '\t' => out.push_str("&#9;"),
            _ => out.push(c),
        }
    }
    out
}

/// Decode entity references and unwrap CDATA sections.
pub fn unescape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut rest = raw;
    while !rest.is_empty() {
        if let Some(after) = rest.strip_prefix("<![CDATA[") {
            let end = after.find("]]>").unwrap_or(after.len());
            out.push_str(&after[..end]);
            rest = after.get(end + 3..).unwrap_or("");
            continue;
        }
        if rest.starts_with('&')
            && let Some(semi) = rest.find(';')
            && let Some(decoded) = decode_entity(&rest[1..semi])
        {
            out.push(decoded);
            rest = &rest[semi + 1..];
            continue;
        }
        let mut chars = rest.chars();
        if let Some(c) = chars.next() {
            out.push(c);
        }
        rest = chars.as_str();
    }
    out
}

fn decode_entity(entity: &str) -> Option<char> {
    match entity {
        "lt" => Some('<'),
        "gt" => Some('>'),
        "amp" => Some('&'),
        "quot" => Some('"'),
        "apos" => Some('\''),
        _ => {
            let code = if let Some(hex) = entity.strip_prefix("#x") {
                u32::from_str_radix(hex, 16).ok()?
            } else {
                entity.strip_prefix('#')?.parse().ok()?
            };
            char::from_u32(code)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc_with_root(tag: &str) -> (GlueDocument, GlueId) {
        let mut doc = GlueDocument::new();
        let root = doc.create_element(tag);
        doc.set_main_element(Some(root)).unwrap();
        (doc, root)
    }

    #[test]
    fn insert_and_remove_keep_edges_and_lists_in_sync() {
        let (mut doc, root) = doc_with_root("VBox");
        let a = doc.create_element("Button");
        let b = doc.create_element("Label");
        doc.insert_child(root, 0, a).unwrap();
        doc.insert_child(root, 0, b).unwrap();
        assert_eq!(doc.children(root), &[b, a]);
        assert_eq!(doc.parent(a), Some(root));
        doc.check_consistency().unwrap();

        assert_eq!(doc.remove_child(b).unwrap(), (root, 0));
        assert_eq!(doc.parent(b), None);
        assert_eq!(doc.children(root), &[a]);
        doc.check_consistency().unwrap();
    }

    #[test]
    fn attached_element_cannot_be_inserted_twice() {
        let (mut doc, root) = doc_with_root("VBox");
        let a = doc.create_element("Button");
        doc.insert_child(root, 0, a).unwrap();
        assert_eq!(
            doc.insert_child(root, 0, a),
            Err(StructureError::AlreadyAttached)
        );
    }

    #[test]
    fn element_cannot_contain_itself() {
        let mut doc = GlueDocument::new();
        let a = doc.create_element("VBox");
        let b = doc.create_element("HBox");
        doc.insert_child(a, 0, b).unwrap();
        assert!(doc.insert_child(b, 0, a).is_err());
    }

    #[test]
    fn fresh_child_seeds_front_and_parent_tail() {
        let (mut doc, root) = doc_with_root("Pane");
        let child = doc.create_element("Button");
        doc.insert_child(root, 0, child).unwrap();
        assert_eq!(
            doc.element(child).front,
            vec![GlueAux::Characters("\n    ".into())]
        );
        assert_eq!(doc.element(root).tail, vec![GlueAux::Characters("\n".into())]);

        doc.remove_child(child).unwrap();
        assert!(doc.element(root).tail.is_empty(), "seeded tail is withdrawn");
    }

    #[test]
    fn inline_comment_moves_to_first_child_and_back() {
        let (mut doc, root) = doc_with_root("VBox");
        let content = vec![
            GlueAux::Characters("\n    ".into()),
            GlueAux::Comment(" keep ".into()),
            GlueAux::Characters("\n".into()),
        ];
        doc.element_mut(root).content = content.clone();
        let child = doc.create_element("Button");
        doc.insert_child(root, 0, child).unwrap();
        assert!(doc.element(root).content.is_empty());
        assert_eq!(
            doc.element(child).front,
            vec![
                GlueAux::Characters("\n    ".into()),
                GlueAux::Comment(" keep ".into()),
                GlueAux::Characters("\n    ".into()),
            ]
        );
        assert_eq!(doc.element(root).tail, vec![GlueAux::Characters("\n".into())]);

        doc.remove_child(child).unwrap();
        assert_eq!(doc.element(root).content, content);
        assert!(doc.element(root).tail.is_empty());
        assert_eq!(
            doc.element(child).front,
            vec![GlueAux::Characters("\n    ".into())]
        );
    }

    #[test]
    fn attribute_removal_restores_position() {
        let (mut doc, root) = doc_with_root("Button");
        doc.set_attribute(root, "a", "1");
        doc.set_attribute(root, "b", "2");
        doc.set_attribute(root, "c", "3");
        let (pos, value) = doc.remove_attribute(root, "b").unwrap();
        assert_eq!((pos, value.as_str()), (1, "2"));
        doc.insert_attribute_at(root, pos, "b", &value);
        let names: Vec<_> = doc.element(root).attributes().iter().map(|a| a.name.as_str()).collect();
        assert_eq!(names, ["a", "b", "c"]);
    }

    #[test]
    fn set_attribute_replaces_in_place() {
        let (mut doc, root) = doc_with_root("Button");
        doc.set_attribute(root, "text", "old");
        doc.set_attribute(root, "id", "x");
        assert_eq!(doc.set_attribute(root, "text", "new"), Some("old".into()));
        assert_eq!(doc.element(root).attributes()[0].value, "new");
    }

    #[test]
    fn main_element_slot_is_remembered() {
        let mut doc = GlueDocument::new();
        doc.push_top_level(TopLevel::Aux(GlueAux::Comment(" head ".into())));
        let root = doc.create_element("Pane");
        doc.set_main_element(Some(root)).unwrap();
        doc.push_top_level(TopLevel::Aux(GlueAux::Comment(" foot ".into())));

        assert_eq!(doc.set_main_element(None).unwrap(), Some(root));
        assert_eq!(doc.main_element(), None);
        doc.set_main_element(Some(root)).unwrap();
        assert_eq!(doc.header().count(), 1);
        assert_eq!(doc.footer().count(), 1);
    }

    #[test]
    fn unescape_decodes_entities_and_cdata() {
        assert_eq!(unescape("a &lt;b&gt; &amp; &#65;&#x42;"), "a <b> & AB");
        assert_eq!(unescape("<![CDATA[<raw>]]>!"), "<raw>!");
        assert_eq!(unescape("&unknown; stays"), "&unknown; stays");
    }

    #[test]
    fn wrapping_keeps_order_and_slot() {
        let (mut doc, root) = doc_with_root("VBox");
        let a = doc.create_element("padding");
        let b = doc.create_element("Button");
        let c = doc.create_element("Label");
        for (i, id) in [a, b, c].into_iter().enumerate() {
            doc.insert_child(root, i, id).unwrap();
        }
        let wrapper = doc.wrap_in_synthetic(root, &[b, c], "children").unwrap();
        assert_eq!(doc.children(root), &[a, wrapper]);
        assert_eq!(doc.children(wrapper), &[b, c]);
        assert!(doc.element(wrapper).is_synthetic());
        doc.check_consistency().unwrap();
    }

    #[test]
    fn synthetic_children_count_as_emitted() {
        let (mut doc, root) = doc_with_root("Pane");
        let wrapper = doc.create_synthetic("children");
        doc.insert_child(root, 0, wrapper).unwrap();
        assert!(!doc.has_emitted_children(root));
        let button = doc.create_element("Button");
        doc.insert_child(wrapper, 0, button).unwrap();
        assert!(doc.has_emitted_children(root));
        assert_eq!(doc.element(root).tail, vec![GlueAux::Characters("\n".into())]);
    }
}
