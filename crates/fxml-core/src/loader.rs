//! Loader: GlueDocument → FxomDocument.
//!
//! One Glue element becomes one FXOM node. Elements are classified through
//! `Metadata::classify`; instance children written directly inside an
//! instance are gathered into its default property, which gets a synthetic
//! Glue element wrapped around them.

use crate::error::{ParseError, StructureError};
use crate::fxom::{
    FxomDocument, FxomObject, FxomProperty, ObjectId, ObjectKind, PropertyId, PropertyKind,
    TextStorage,
};
use crate::glue::{GlueDocument, GlueId};
use crate::metadata::{ElementKind, Metadata};
use crate::name::Name;
use crate::parser::parse_glue;
use std::sync::Arc;

impl FxomDocument {
    /// Parse markup text and build the object graph over it.
    pub fn parse(text: &str, metadata: Arc<dyn Metadata>) -> Result<Self, ParseError> {
        Self::from_glue(parse_glue(text)?, metadata)
    }

    pub fn from_glue(glue: GlueDocument, metadata: Arc<dyn Metadata>) -> Result<Self, ParseError> {
        let main = glue.main_element();
        let mut loader = Loader {
            doc: FxomDocument::with_glue(glue, Arc::clone(&metadata)),
            metadata,
        };
        if let Some(main) = main {
            let root = loader.load_object(main)?;
            loader.doc.root = Some(root);
        }
        log::debug!("fxom: loaded {} nodes", loader.doc.graph.node_count());
        Ok(loader.doc)
    }
}

struct Loader {
    doc: FxomDocument,
    metadata: Arc<dyn Metadata>,
}

/// Attributes that are markup plumbing rather than properties.
fn is_property_attribute(name: &str) -> bool {
    !(name == "xmlns" || name.starts_with("xmlns:") || name.starts_with("fx:"))
}

impl Loader {
    fn error_at(&self, element: GlueId, message: impl Into<String>) -> ParseError {
        let position = self.doc.glue.element(element).position.unwrap_or_default();
        ParseError::new(message, position)
    }

    fn structure_error(&self, element: GlueId, err: StructureError) -> ParseError {
        self.error_at(element, err.to_string())
    }

    fn load_object(&mut self, element: GlueId) -> Result<ObjectId, ParseError> {
        let tag = self.doc.glue.element(element).tag.clone();
        match self.metadata.classify(&tag) {
            ElementKind::Intrinsic(kind) => Ok(self.doc.insert_object_node(FxomObject {
                glue: element,
                kind: ObjectKind::Intrinsic { kind },
            })),
            ElementKind::Instance => self.load_instance(element, Name::intern(&tag).simple()),
            ElementKind::RootInstance => {
                let class = self
                    .doc
                    .glue
                    .element(element)
                    .attribute("type")
                    .map(|t| Name::intern(t).simple())
                    .ok_or_else(|| self.error_at(element, "fx:root without a `type` attribute"))?;
                self.load_instance(element, class)
            }
            ElementKind::Property | ElementKind::Define => Err(self.error_at(
                element,
                format!("property element <{tag}> where an object is expected"),
            )),
        }
    }

    fn load_instance(&mut self, element: GlueId, class: Name) -> Result<ObjectId, ParseError> {
        if !self.metadata.knows_class(class) {
            return Err(self.error_at(element, format!("unknown class `{class}`")));
        }
        let object = self.doc.insert_object_node(FxomObject {
            glue: element,
            kind: ObjectKind::Instance {
                class,
                properties: Vec::new(),
                live: None,
            },
        });

        let attributes: Vec<(Name, String)> = self
            .doc
            .glue
            .element(element)
            .attributes()
            .iter()
            .filter(|a| is_property_attribute(&a.name))
            .map(|a| (Name::intern(&a.name), a.value.clone()))
            .collect();
        for (name, value) in attributes {
            let property = self.doc.insert_property_node(FxomProperty {
                name,
                kind: PropertyKind::Text {
                    value,
                    storage: TextStorage::Attribute,
                },
            });
            self.doc.link_loaded_property(object, property);
        }

        let mut direct = Vec::new();
        for child in self.doc.glue.children(element).to_vec() {
            let tag = self.doc.glue.element(child).tag.clone();
            let kind = self.metadata.classify(&tag);
            if !matches!(kind, ElementKind::Property | ElementKind::Define) {
                direct.push(child);
                continue;
            }
            let name = Name::intern(&tag);
            if self.doc.find_property(object, name).is_some() {
                return Err(self.error_at(child, format!("duplicate property `{name}`")));
            }
            let property =
                self.load_property_element(class, child, name, kind == ElementKind::Define)?;
            self.doc.link_loaded_property(object, property);
        }

        if !direct.is_empty() {
            let accessory = self.metadata.main_accessory(class).ok_or_else(|| {
                self.error_at(direct[0], format!("`{class}` has no default property"))
            })?;
            if self.doc.find_property(object, accessory.name).is_some() {
                return Err(self.error_at(
                    direct[0],
                    format!("duplicate property `{}`", accessory.name),
                ));
            }
            let wrapper = self
                .doc
                .glue
                .wrap_in_synthetic(element, &direct, accessory.name.as_str())
                .map_err(|e| self.structure_error(element, e))?;
            let property = self.load_collection(accessory.name, wrapper, &direct)?;
            self.doc.link_loaded_property(object, property);
        }

        log::trace!("fxom: loaded `{class}`");
        Ok(object)
    }

    fn load_property_element(
        &mut self,
        class: Name,
        element: GlueId,
        name: Name,
        define: bool,
    ) -> Result<PropertyId, ParseError> {
        let children = self.doc.glue.children(element).to_vec();
        let declared_collection = self
            .metadata
            .accessory(class, name)
            .is_some_and(|a| a.collection);
        if define || !children.is_empty() || declared_collection {
            self.load_collection(name, element, &children)
        } else {
            let value = self.doc.glue.text_content(element);
            Ok(self.doc.insert_property_node(FxomProperty {
                name,
                kind: PropertyKind::Text {
                    value,
                    storage: TextStorage::Element(element),
                },
            }))
        }
    }

    fn load_collection(
        &mut self,
        name: Name,
        element: GlueId,
        children: &[GlueId],
    ) -> Result<PropertyId, ParseError> {
        let values = children
            .iter()
            .map(|child| self.load_object(*child))
            .collect::<Result<Vec<_>, _>>()?;
        let property = self.doc.insert_property_node(FxomProperty {
            name,
            kind: PropertyKind::Collection {
                glue: element,
                values: values.clone(),
            },
        });
        for value in values {
            self.doc.link_loaded_value(property, value);
        }
        Ok(property)
    }
}
