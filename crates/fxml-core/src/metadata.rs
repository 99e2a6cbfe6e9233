//! Class metadata: element classification, accessories and assignability.
//!
//! The object graph only asks a handful of questions about classes. They are
//! answered through the `Metadata` trait; `MetadataRegistry` answers them from
//! a JSON descriptor, and `MetadataRegistry::builtin()` ships one covering
//! the common JavaFX containers and controls.

use crate::name::Name;
use serde::Deserialize;
use smallvec::SmallVec;
use std::collections::HashMap;
use std::sync::{Arc, LazyLock};
use thiserror::Error;

/// The `fx:` intrinsics that stand for an object without being an instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IntrinsicKind {
    Include,
    Reference,
    Copy,
}

impl IntrinsicKind {
    pub fn tag(self) -> &'static str {
        match self {
            IntrinsicKind::Include => "fx:include",
            IntrinsicKind::Reference => "fx:reference",
            IntrinsicKind::Copy => "fx:copy",
        }
    }
}

/// What a markup element stands for in the object graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElementKind {
    /// An object of the class named by the tag.
    Instance,
    /// `fx:root`, typed by its `type` attribute.
    RootInstance,
    /// A property element (`<children>`, `<GridPane.margin>`).
    Property,
    /// `fx:define`, a collection of objects outside the scene.
    Define,
    Intrinsic(IntrinsicKind),
}

/// Syntactic FXML classification of a tag.
pub fn classify_tag(tag: &str) -> ElementKind {
    match tag {
        "fx:include" => ElementKind::Intrinsic(IntrinsicKind::Include),
        "fx:reference" => ElementKind::Intrinsic(IntrinsicKind::Reference),
        "fx:copy" => ElementKind::Intrinsic(IntrinsicKind::Copy),
        "fx:define" => ElementKind::Define,
        "fx:root" => ElementKind::RootInstance,
        _ => {
            let last = tag.rsplit('.').next().unwrap_or(tag);
            if last.chars().next().is_some_and(char::is_lowercase) {
                ElementKind::Property
            } else {
                ElementKind::Instance
            }
        }
    }
}

/// A named slot on a container accepting zero, one or many children.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Accessory {
    pub name: Name,
    /// Class every child must be assignable to.
    pub accepted: Name,
    /// Holds many children (`children`) rather than one (`center`).
    pub collection: bool,
    /// Text properties set on a child dropped into this slot.
    pub defaults: SmallVec<[(Name, String); 1]>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValueProperty {
    pub name: Name,
    pub default: Option<String>,
}

/// Read-only class information, shared between documents.
pub trait Metadata: Send + Sync {
    fn classify(&self, tag: &str) -> ElementKind {
        classify_tag(tag)
    }

    fn knows_class(&self, class: Name) -> bool;

    /// `Button` → `javafx.scene.control.Button`.
    fn qualified_name(&self, class: Name) -> Option<String>;

    /// Accessories in declaration order, superclass accessories first.
    fn accessories(&self, class: Name) -> Vec<Accessory>;

    fn main_accessory(&self, class: Name) -> Option<Accessory>;

    /// Whether an object of `class` may be placed where `target` is expected.
    fn is_assignable(&self, class: Name, target: Name) -> bool;

    fn value_properties(&self, class: Name) -> Vec<ValueProperty>;

    fn accessory(&self, class: Name, name: Name) -> Option<Accessory> {
        self.accessories(class).into_iter().find(|a| a.name == name)
    }
}

// ─── Registry ────────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum MetadataError {
    #[error("invalid metadata descriptor: {0}")]
    Json(#[from] serde_json::Error),
    #[error("class `{class}` extends unknown class `{superclass}`")]
    UnknownSuperclass { class: String, superclass: String },
    #[error("class `{0}` is declared twice")]
    DuplicateClass(String),
    #[error("inheritance cycle through `{0}`")]
    Cycle(String),
}

#[derive(Debug, Deserialize)]
struct Descriptor {
    classes: Vec<ClassDescriptor>,
}

#[derive(Debug, Deserialize)]
struct ClassDescriptor {
    name: String,
    #[serde(default)]
    package: Option<String>,
    #[serde(default, rename = "super")]
    superclass: Option<String>,
    #[serde(default)]
    accessories: Vec<AccessoryDescriptor>,
    #[serde(default)]
    properties: Vec<PropertyDescriptor>,
}

#[derive(Debug, Deserialize)]
struct AccessoryDescriptor {
    name: String,
    accepts: String,
    #[serde(default)]
    collection: bool,
    #[serde(default)]
    main: bool,
    #[serde(default)]
    defaults: HashMap<String, String>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum PropertyDescriptor {
    Name(String),
    WithDefault { name: String, default: String },
}

#[derive(Debug, Clone)]
struct ClassEntry {
    qualified: String,
    superclass: Option<Name>,
    /// Flattened: inherited accessories first.
    accessories: Vec<Accessory>,
    main: Option<Name>,
    properties: Vec<ValueProperty>,
}

/// Metadata loaded from a JSON descriptor with inheritance flattened.
#[derive(Debug, Clone, Default)]
pub struct MetadataRegistry {
    classes: HashMap<Name, ClassEntry>,
}

static BUILTIN: LazyLock<Arc<MetadataRegistry>> = LazyLock::new(|| {
    let registry = MetadataRegistry::from_json(include_str!("../data/builtin_metadata.json"))
        .unwrap_or_else(|e| {
            log::error!("built-in metadata rejected: {e}");
            MetadataRegistry::default()
        });
    Arc::new(registry)
});

impl MetadataRegistry {
    /// The shared registry for the stock JavaFX classes.
    pub fn builtin() -> Arc<MetadataRegistry> {
        Arc::clone(&BUILTIN)
    }

    /// Build a registry from a descriptor:
    /// `{"classes": [{"name", "package", "super", "accessories", "properties"}]}`.
    pub fn from_json(text: &str) -> Result<Self, MetadataError> {
        let descriptor: Descriptor = serde_json::from_str(text)?;
        let mut declared: HashMap<Name, ClassDescriptor> = HashMap::new();
        let mut order = Vec::new();
        for class in descriptor.classes {
            let name = Name::intern(&class.name);
            if declared.contains_key(&name) {
                return Err(MetadataError::DuplicateClass(class.name));
            }
            order.push(name);
            declared.insert(name, class);
        }

        let mut registry = MetadataRegistry::default();
        for name in order {
            registry.flatten(name, &declared, &mut Vec::new())?;
        }
        log::debug!("metadata: {} classes registered", registry.classes.len());
        Ok(registry)
    }

    fn flatten(
        &mut self,
        name: Name,
        declared: &HashMap<Name, ClassDescriptor>,
        visiting: &mut Vec<Name>,
    ) -> Result<(), MetadataError> {
        if self.classes.contains_key(&name) {
            return Ok(());
        }
        if visiting.contains(&name) {
            return Err(MetadataError::Cycle(name.to_string()));
        }
        let Some(class) = declared.get(&name) else {
            return Ok(());
        };

        let mut entry = ClassEntry {
            qualified: match &class.package {
                Some(package) => format!("{package}.{}", class.name),
                None => class.name.clone(),
            },
            superclass: None,
            accessories: Vec::new(),
            main: None,
            properties: Vec::new(),
        };

        if let Some(superclass) = &class.superclass {
            let super_name = Name::intern(superclass);
            if !declared.contains_key(&super_name) {
                return Err(MetadataError::UnknownSuperclass {
                    class: class.name.clone(),
                    superclass: superclass.clone(),
                });
            }
            visiting.push(name);
            self.flatten(super_name, declared, visiting)?;
            visiting.pop();
            if let Some(parent) = self.classes.get(&super_name) {
                entry.accessories = parent.accessories.clone();
                entry.main = parent.main;
                entry.properties = parent.properties.clone();
            }
            entry.superclass = Some(super_name);
        }

        for accessory in &class.accessories {
            let accessory_name = Name::intern(&accessory.name);
            let mut defaults: Vec<(Name, String)> = accessory
                .defaults
                .iter()
                .map(|(k, v)| (Name::intern(k), v.clone()))
                .collect();
            defaults.sort();
            entry.accessories.retain(|a| a.name != accessory_name);
            entry.accessories.push(Accessory {
                name: accessory_name,
                accepted: Name::intern(&accessory.accepts),
                collection: accessory.collection,
                defaults: defaults.into_iter().collect(),
            });
            if accessory.main {
                entry.main = Some(accessory_name);
            }
        }

        for property in &class.properties {
            let (name, default) = match property {
                PropertyDescriptor::Name(name) => (name, None),
                PropertyDescriptor::WithDefault { name, default } => (name, Some(default.clone())),
            };
            let name = Name::intern(name);
            entry.properties.retain(|p| p.name != name);
            entry.properties.push(ValueProperty { name, default });
        }

        self.classes.insert(name, entry);
        Ok(())
    }

    /// Direct superclass, if declared.
    pub fn superclass(&self, class: Name) -> Option<Name> {
        self.classes.get(&class)?.superclass
    }

    pub fn class_count(&self) -> usize {
        self.classes.len()
    }
}

impl Metadata for MetadataRegistry {
    fn knows_class(&self, class: Name) -> bool {
        self.classes.contains_key(&class)
    }

    fn qualified_name(&self, class: Name) -> Option<String> {
        self.classes.get(&class).map(|c| c.qualified.clone())
    }

    fn accessories(&self, class: Name) -> Vec<Accessory> {
        self.classes
            .get(&class)
            .map(|c| c.accessories.clone())
            .unwrap_or_default()
    }

    fn main_accessory(&self, class: Name) -> Option<Accessory> {
        let entry = self.classes.get(&class)?;
        let main = entry.main?;
        entry.accessories.iter().find(|a| a.name == main).cloned()
    }

    fn is_assignable(&self, class: Name, target: Name) -> bool {
        if class == target || target.as_str() == "Object" {
            return true;
        }
        let mut current = self.superclass(class);
        while let Some(name) = current {
            if name == target {
                return true;
            }
            current = self.superclass(name);
        }
        false
    }

    fn value_properties(&self, class: Name) -> Vec<ValueProperty> {
        self.classes
            .get(&class)
            .map(|c| c.properties.clone())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn n(s: &str) -> Name {
        Name::intern(s)
    }

    #[test]
    fn classify_follows_fxml_syntax() {
        assert_eq!(classify_tag("Button"), ElementKind::Instance);
        assert_eq!(classify_tag("javafx.scene.control.Button"), ElementKind::Instance);
        assert_eq!(classify_tag("children"), ElementKind::Property);
        assert_eq!(classify_tag("GridPane.margin"), ElementKind::Property);
        assert_eq!(classify_tag("fx:define"), ElementKind::Define);
        assert_eq!(classify_tag("fx:root"), ElementKind::RootInstance);
        assert_eq!(
            classify_tag("fx:reference"),
            ElementKind::Intrinsic(IntrinsicKind::Reference)
        );
    }

    #[test]
    fn builtin_registry_loads() {
        let registry = MetadataRegistry::builtin();
        assert!(registry.class_count() > 20);
        assert!(registry.knows_class(n("Button")));
        assert_eq!(
            registry.qualified_name(n("Button")).as_deref(),
            Some("javafx.scene.control.Button")
        );
    }

    #[test]
    fn accessories_inherit_superclass_first() {
        let registry = MetadataRegistry::builtin();
        let vbox: Vec<_> = registry
            .accessories(n("VBox"))
            .into_iter()
            .map(|a| a.name.to_string())
            .collect();
        let children = vbox.iter().position(|a| a == "children").unwrap();
        let padding = vbox.iter().position(|a| a == "padding").unwrap();
        assert!(padding < children, "Region accessories come before Pane's: {vbox:?}");
        assert_eq!(registry.main_accessory(n("VBox")).unwrap().name, n("children"));
    }

    #[test]
    fn border_pane_slots_in_declared_order() {
        let registry = MetadataRegistry::builtin();
        let names: Vec<_> = registry
            .accessories(n("BorderPane"))
            .into_iter()
            .filter(|a| !a.collection)
            .map(|a| a.name.to_string())
            .filter(|a| a != "padding")
            .collect();
        assert_eq!(names, ["top", "left", "center", "right", "bottom"]);
        assert!(registry.main_accessory(n("BorderPane")).is_none());
        let center = registry.accessory(n("BorderPane"), n("center")).unwrap();
        assert_eq!(
            center.defaults.as_slice(),
            &[(n("BorderPane.alignment"), "CENTER".to_string())]
        );
    }

    #[test]
    fn assignability_walks_superclasses() {
        let registry = MetadataRegistry::builtin();
        assert!(registry.is_assignable(n("Button"), n("Node")));
        assert!(registry.is_assignable(n("Tab"), n("Tab")));
        assert!(!registry.is_assignable(n("Tab"), n("Node")));
        assert!(registry.is_assignable(n("Insets"), n("Object")));
    }

    #[test]
    fn rejects_unknown_superclass_and_cycles() {
        let err = MetadataRegistry::from_json(r#"{"classes":[{"name":"A","super":"B"}]}"#)
            .unwrap_err();
        assert!(matches!(err, MetadataError::UnknownSuperclass { .. }));
        let err = MetadataRegistry::from_json(
            r#"{"classes":[{"name":"A","super":"B"},{"name":"B","super":"A"}]}"#,
        )
        .unwrap_err();
        assert!(matches!(err, MetadataError::Cycle(_)));
    }

    #[test]
    fn value_properties_with_defaults() {
        let registry = MetadataRegistry::from_json(
            r#"{"classes":[
                {"name":"Base","properties":["id"]},
                {"name":"Leaf","super":"Base","properties":[{"name":"text","default":""}]}
            ]}"#,
        )
        .unwrap();
        let props = registry.value_properties(n("Leaf"));
        assert_eq!(props.len(), 2);
        assert_eq!(props[0].name, n("id"));
        assert_eq!(props[1].default.as_deref(), Some(""));
    }
}
