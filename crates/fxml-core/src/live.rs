//! Live-object seam.
//!
//! An instance in the object graph may mirror a constructed object owned by
//! the host (a real scene graph node, for example). The document talks to
//! the host through `LiveObjectFactory`; failures stay on the live side and
//! never undo a document edit.

use crate::name::Name;
use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::rc::Rc;
use thiserror::Error;

/// Opaque handle of a live object, issued by the factory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LiveHandle(pub u64);

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LiveError {
    #[error("cannot instantiate `{0}`")]
    Instantiation(String),
    #[error("cannot apply `{property}`: {reason}")]
    Property { property: String, reason: String },
    #[error("unknown live object {0:?}")]
    UnknownHandle(LiveHandle),
}

/// Builds and updates live objects on behalf of the document.
pub trait LiveObjectFactory {
    fn instantiate(&mut self, class: Name) -> Result<LiveHandle, LiveError>;

    fn set_value(&mut self, object: LiveHandle, property: Name, value: &str)
    -> Result<(), LiveError>;

    fn clear_value(&mut self, object: LiveHandle, property: Name) -> Result<(), LiveError>;

    fn insert_child(
        &mut self,
        parent: LiveHandle,
        property: Name,
        index: usize,
        child: LiveHandle,
    ) -> Result<(), LiveError>;

    fn remove_child(
        &mut self,
        parent: LiveHandle,
        property: Name,
        index: usize,
    ) -> Result<(), LiveError>;
}

// ─── Mirror ──────────────────────────────────────────────────────────────

/// One object of the in-memory mirror.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MirrorObject {
    pub class: String,
    pub values: BTreeMap<String, String>,
    pub children: BTreeMap<String, Vec<LiveHandle>>,
}

#[derive(Debug, Default)]
struct MirrorState {
    next: u64,
    objects: HashMap<LiveHandle, MirrorObject>,
    rejected: HashSet<Name>,
}

/// Factory that mirrors the document into plain in-memory objects.
///
/// Clones share state, so a caller can keep one to inspect the mirror while
/// the document owns the other.
#[derive(Debug, Clone, Default)]
pub struct MirrorFactory {
    state: Rc<RefCell<MirrorState>>,
}

impl MirrorFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `instantiate` fail for `class`.
    pub fn reject_class(&self, class: Name) {
        self.state.borrow_mut().rejected.insert(class);
    }

    pub fn object(&self, handle: LiveHandle) -> Option<MirrorObject> {
        self.state.borrow().objects.get(&handle).cloned()
    }

    pub fn object_count(&self) -> usize {
        self.state.borrow().objects.len()
    }

    /// Indented outline of the subtree at `handle`, one object per line.
    pub fn outline(&self, handle: LiveHandle) -> String {
        let state = self.state.borrow();
        let mut out = String::new();
        outline_into(&state, handle, 0, &mut out);
        out
    }
}

fn outline_into(state: &MirrorState, handle: LiveHandle, depth: usize, out: &mut String) {
    let Some(object) = state.objects.get(&handle) else {
        return;
    };
    out.push_str(&"  ".repeat(depth));
    out.push_str(&object.class);
    for (name, value) in &object.values {
        out.push_str(&format!(" {name}={value}"));
    }
    out.push('\n');
    for children in object.children.values() {
        for child in children {
            outline_into(state, *child, depth + 1, out);
        }
    }
}

impl LiveObjectFactory for MirrorFactory {
    fn instantiate(&mut self, class: Name) -> Result<LiveHandle, LiveError> {
        let mut state = self.state.borrow_mut();
        if state.rejected.contains(&class) {
            return Err(LiveError::Instantiation(class.to_string()));
        }
        state.next += 1;
        let handle = LiveHandle(state.next);
        state.objects.insert(
            handle,
            MirrorObject {
                class: class.to_string(),
                ..MirrorObject::default()
            },
        );
        Ok(handle)
    }

    fn set_value(&mut self, object: LiveHandle, property: Name, value: &str) -> Result<(), LiveError> {
        let mut state = self.state.borrow_mut();
        let target = state
            .objects
            .get_mut(&object)
            .ok_or(LiveError::UnknownHandle(object))?;
        target.values.insert(property.to_string(), value.to_string());
        Ok(())
    }

    fn clear_value(&mut self, object: LiveHandle, property: Name) -> Result<(), LiveError> {
        let mut state = self.state.borrow_mut();
        let target = state
            .objects
            .get_mut(&object)
            .ok_or(LiveError::UnknownHandle(object))?;
        target.values.remove(property.as_str());
        Ok(())
    }

    fn insert_child(
        &mut self,
        parent: LiveHandle,
        property: Name,
        index: usize,
        child: LiveHandle,
    ) -> Result<(), LiveError> {
        let mut state = self.state.borrow_mut();
        if !state.objects.contains_key(&child) {
            return Err(LiveError::UnknownHandle(child));
        }
        let target = state
            .objects
            .get_mut(&parent)
            .ok_or(LiveError::UnknownHandle(parent))?;
        let list = target.children.entry(property.to_string()).or_default();
        if index > list.len() {
            return Err(LiveError::Property {
                property: property.to_string(),
                reason: format!("index {index} past end {}", list.len()),
            });
        }
        list.insert(index, child);
        Ok(())
    }

    fn remove_child(&mut self, parent: LiveHandle, property: Name, index: usize) -> Result<(), LiveError> {
        let mut state = self.state.borrow_mut();
        let target = state
            .objects
            .get_mut(&parent)
            .ok_or(LiveError::UnknownHandle(parent))?;
        let list = target
            .children
            .get_mut(property.as_str())
            .filter(|list| index < list.len())
            .ok_or_else(|| LiveError::Property {
                property: property.to_string(),
                reason: format!("no child at {index}"),
            })?;
        list.remove(index);
        if list.is_empty() {
            target.children.remove(property.as_str());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mirror_builds_tree() {
        let mut factory = MirrorFactory::new();
        let view = factory.clone();
        let pane = factory.instantiate(Name::intern("Pane")).unwrap();
        let button = factory.instantiate(Name::intern("Button")).unwrap();
        factory
            .set_value(button, Name::intern("text"), "OK")
            .unwrap();
        factory
            .insert_child(pane, Name::intern("children"), 0, button)
            .unwrap();
        assert_eq!(view.outline(pane), "Pane\n  Button text=OK\n");

        factory
            .remove_child(pane, Name::intern("children"), 0)
            .unwrap();
        assert_eq!(view.outline(pane), "Pane\n");
    }

    #[test]
    fn rejected_class_fails_to_instantiate() {
        let mut factory = MirrorFactory::new();
        factory.reject_class(Name::intern("WebView"));
        assert_eq!(
            factory.instantiate(Name::intern("WebView")),
            Err(LiveError::Instantiation("WebView".into()))
        );
    }

    #[test]
    fn removing_missing_child_is_an_error() {
        let mut factory = MirrorFactory::new();
        let pane = factory.instantiate(Name::intern("Pane")).unwrap();
        assert!(
            factory
                .remove_child(pane, Name::intern("children"), 0)
                .is_err()
        );
    }
}
