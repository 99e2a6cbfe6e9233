//! Selection model.
//!
//! A selection is either a group of objects (with one designated hit
//! object) or a set of rows/columns of one grid container. Changes bump a
//! revision once per externally visible change; inside an update bracket
//! they are coalesced into a single bump when the outermost bracket closes.

use fxml_core::live::LiveHandle;
use fxml_core::{FxomDocument, Name, ObjectId};
use std::collections::BTreeSet;

// ─── Groups ──────────────────────────────────────────────────────────────

/// Ordered set of selected objects.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectGroup {
    items: Vec<ObjectId>,
    hit: ObjectId,
    /// Live sub-node under the pointer when the hit object was picked.
    hit_node: Option<LiveHandle>,
}

impl ObjectGroup {
    /// A group of `items` with `hit` as the designated object. `hit` is
    /// added when missing; duplicates are dropped keeping first occurrence.
    pub fn new(items: impl IntoIterator<Item = ObjectId>, hit: ObjectId) -> Self {
        let mut ordered = Vec::new();
        for item in items {
            if !ordered.contains(&item) {
                ordered.push(item);
            }
        }
        if !ordered.contains(&hit) {
            ordered.push(hit);
        }
        Self {
            items: ordered,
            hit,
            hit_node: None,
        }
    }

    pub fn single(object: ObjectId) -> Self {
        Self::new([object], object)
    }

    pub fn with_hit_node(mut self, node: LiveHandle) -> Self {
        self.hit_node = Some(node);
        self
    }

    pub fn items(&self) -> &[ObjectId] {
        &self.items
    }

    pub fn hit(&self) -> ObjectId {
        self.hit
    }

    pub fn hit_node(&self) -> Option<LiveHandle> {
        self.hit_node
    }

    pub fn contains(&self, object: ObjectId) -> bool {
        self.items.contains(&object)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GridAxis {
    Row,
    Column,
}

impl GridAxis {
    fn constraints(self) -> &'static str {
        match self {
            GridAxis::Row => "rowConstraints",
            GridAxis::Column => "columnConstraints",
        }
    }

    fn index_property(self) -> &'static str {
        match self {
            GridAxis::Row => "GridPane.rowIndex",
            GridAxis::Column => "GridPane.columnIndex",
        }
    }
}

/// Rows or columns of one grid container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GridGroup {
    pub grid: ObjectId,
    pub axis: GridAxis,
    pub indices: BTreeSet<usize>,
}

impl GridGroup {
    pub fn new(grid: ObjectId, axis: GridAxis, indices: impl IntoIterator<Item = usize>) -> Self {
        Self {
            grid,
            axis,
            indices: indices.into_iter().collect(),
        }
    }
}

/// What is selected. "Nothing" is `Option::None` at the use sites.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SelectionGroup {
    Objects(ObjectGroup),
    Grid(GridGroup),
}

/// Number of rows or columns a grid currently spans: the larger of its
/// constraint count and the highest child index plus one.
pub fn grid_size(doc: &FxomDocument, grid: ObjectId, axis: GridAxis) -> usize {
    let declared = doc
        .find_property(grid, Name::intern(axis.constraints()))
        .map_or(0, |p| doc.values(p).len());
    let used = doc
        .find_property(grid, Name::intern("children"))
        .map(|p| doc.values(p))
        .unwrap_or_default()
        .iter()
        .map(|child| {
            doc.text_property(*child, Name::intern(axis.index_property()))
                .and_then(|v| v.trim().parse::<usize>().ok())
                .unwrap_or(0)
                + 1
        })
        .max()
        .unwrap_or(0);
    declared.max(used)
}

// ─── Selection ───────────────────────────────────────────────────────────

/// Published once per observed change, after the outermost bracket.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectionEvent {
    Changed { revision: u64 },
}

#[derive(Debug, Default)]
pub struct Selection {
    group: Option<SelectionGroup>,
    revision: u64,
    update_depth: usize,
    dirty: bool,
    events: Vec<SelectionEvent>,
}

impl Selection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn group(&self) -> Option<&SelectionGroup> {
        self.group.as_ref()
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn is_empty(&self) -> bool {
        self.group.is_none()
    }

    /// Selected objects in selection order; empty for grid groups.
    pub fn objects(&self) -> &[ObjectId] {
        match &self.group {
            Some(SelectionGroup::Objects(group)) => group.items(),
            _ => &[],
        }
    }

    pub fn take_events(&mut self) -> Vec<SelectionEvent> {
        std::mem::take(&mut self.events)
    }

    // ─── Bracket ─────────────────────────────────────────────────────────

    pub fn begin_update(&mut self) {
        self.update_depth += 1;
    }

    pub fn end_update(&mut self) {
        if self.update_depth == 0 {
            log::warn!("selection: end_update without matching begin_update");
            return;
        }
        self.update_depth -= 1;
        if self.update_depth == 0 && self.dirty {
            self.publish();
        }
    }

    pub fn is_updating(&self) -> bool {
        self.update_depth > 0
    }

    fn changed(&mut self) {
        if self.update_depth > 0 {
            self.dirty = true;
        } else {
            self.publish();
        }
    }

    fn publish(&mut self) {
        self.dirty = false;
        self.revision += 1;
        self.events.push(SelectionEvent::Changed {
            revision: self.revision,
        });
        log::debug!("selection: revision {}", self.revision);
    }

    // ─── Changes ─────────────────────────────────────────────────────────

    /// Replace the selection. Returns the previous group. Selecting what is
    /// already selected is not a change.
    pub fn select(&mut self, group: Option<SelectionGroup>) -> Option<SelectionGroup> {
        if self.group == group {
            return group;
        }
        let previous = std::mem::replace(&mut self.group, group);
        self.changed();
        previous
    }

    pub fn select_object(&mut self, object: ObjectId) {
        self.select(Some(SelectionGroup::Objects(ObjectGroup::single(object))));
    }

    pub fn clear(&mut self) {
        self.select(None);
    }

    /// Add `object` to an object group or take it out. Taking out the last
    /// member clears the selection.
    pub fn toggle(&mut self, object: ObjectId) {
        let next = match &self.group {
            Some(SelectionGroup::Objects(group)) if group.contains(object) => {
                let rest: Vec<ObjectId> =
                    group.items().iter().copied().filter(|o| *o != object).collect();
                let hit = if group.hit() == object {
                    rest.last().copied()
                } else {
                    Some(group.hit())
                };
                hit.map(|hit| SelectionGroup::Objects(ObjectGroup::new(rest, hit)))
            }
            Some(SelectionGroup::Objects(group)) => {
                let items = group.items().iter().copied().chain([object]);
                Some(SelectionGroup::Objects(ObjectGroup::new(items, object)))
            }
            _ => Some(SelectionGroup::Objects(ObjectGroup::single(object))),
        };
        self.select(next);
    }

    /// Move to the next sibling of the hit object, or the next row/column.
    /// Returns whether the selection moved.
    pub fn select_next(&mut self, doc: &FxomDocument) -> bool {
        let next = match &self.group {
            Some(SelectionGroup::Objects(group)) => doc
                .next_sibling(group.hit())
                .map(|o| SelectionGroup::Objects(ObjectGroup::single(o))),
            Some(SelectionGroup::Grid(grid)) => grid
                .indices
                .last()
                .map(|i| i + 1)
                .filter(|i| *i < grid_size(doc, grid.grid, grid.axis))
                .map(|i| SelectionGroup::Grid(GridGroup::new(grid.grid, grid.axis, [i]))),
            None => None,
        };
        self.move_to(next)
    }

    pub fn select_previous(&mut self, doc: &FxomDocument) -> bool {
        let previous = match &self.group {
            Some(SelectionGroup::Objects(group)) => doc
                .previous_sibling(group.hit())
                .map(|o| SelectionGroup::Objects(ObjectGroup::single(o))),
            Some(SelectionGroup::Grid(grid)) => grid
                .indices
                .first()
                .and_then(|i| i.checked_sub(1))
                .map(|i| SelectionGroup::Grid(GridGroup::new(grid.grid, grid.axis, [i]))),
            None => None,
        };
        self.move_to(previous)
    }

    fn move_to(&mut self, group: Option<SelectionGroup>) -> bool {
        match group {
            Some(group) => {
                self.select(Some(group));
                true
            }
            None => false,
        }
    }

    /// Drop objects that are no longer part of the document.
    pub fn prune(&mut self, doc: &FxomDocument) {
        let next = match &self.group {
            Some(SelectionGroup::Objects(group)) => {
                let attached: Vec<ObjectId> = group
                    .items()
                    .iter()
                    .copied()
                    .filter(|o| doc.contains_object(*o) && doc.is_attached(*o))
                    .collect();
                if attached.len() == group.items().len() {
                    return;
                }
                let hit = if attached.contains(&group.hit()) {
                    Some(group.hit())
                } else {
                    attached.last().copied()
                };
                hit.map(|hit| SelectionGroup::Objects(ObjectGroup::new(attached, hit)))
            }
            Some(SelectionGroup::Grid(grid)) => {
                if doc.contains_object(grid.grid) && doc.is_attached(grid.grid) {
                    return;
                }
                None
            }
            None => return,
        };
        log::trace!("selection: pruned detached objects");
        self.select(next);
    }

    // ─── Queries ─────────────────────────────────────────────────────────

    pub fn is_selected(&self, object: ObjectId) -> bool {
        matches!(&self.group, Some(SelectionGroup::Objects(group)) if group.contains(object))
    }

    /// `object` itself or its closest selected ancestor.
    pub fn lookup_selected_ancestor(&self, doc: &FxomDocument, object: ObjectId) -> Option<ObjectId> {
        let mut current = Some(object);
        while let Some(candidate) = current {
            if self.is_selected(candidate) {
                return Some(candidate);
            }
            current = doc.parent_object(candidate);
        }
        None
    }

    /// Common parent of every selected object. `None` when the root is
    /// selected or the parents differ. A grid group answers its grid.
    pub fn ancestor(&self, doc: &FxomDocument) -> Option<ObjectId> {
        match self.group.as_ref()? {
            SelectionGroup::Objects(group) => {
                let mut parents = group.items().iter().map(|o| doc.parent_object(*o));
                let first = parents.next()??;
                parents.all(|p| p == Some(first)).then_some(first)
            }
            SelectionGroup::Grid(grid) => Some(grid.grid),
        }
    }
}
