//! Lint diagnostics for FXML documents.
//!
//! Reports structural issues without modifying the document.

use crate::collect::{ObjectsWithFxId, References};
use crate::fxom::{FxomDocument, ObjectId};
use crate::name::Name;
use std::collections::{HashMap, HashSet};

// ─── Diagnostic types ────────────────────────────────────────────────────

/// Severity of a lint finding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LintSeverity {
    /// Should be fixed: likely a mistake.
    Warning,
    /// Informational: may be intended.
    Info,
}

/// A single lint diagnostic for an object.
#[derive(Debug, Clone)]
pub struct LintDiagnostic {
    /// The object this diagnostic refers to.
    pub object: ObjectId,
    /// Human-readable message.
    pub message: String,
    pub severity: LintSeverity,
    /// Short rule identifier (e.g. "duplicate-fx-id").
    pub rule: &'static str,
}

// ─── Public API ──────────────────────────────────────────────────────────

/// Run all lint rules over the document and return diagnostics.
#[must_use]
pub fn lint_document(doc: &FxomDocument) -> Vec<LintDiagnostic> {
    let mut diags = Vec::new();
    lint_duplicate_fx_ids(doc, &mut diags);
    lint_unresolved_references(doc, &mut diags);
    lint_unknown_properties(doc, &mut diags);
    diags
}

// ─── Rules ───────────────────────────────────────────────────────────────

/// Warn on every object after the first that reuses an `fx:id`.
fn lint_duplicate_fx_ids(doc: &FxomDocument, diags: &mut Vec<LintDiagnostic>) {
    let mut seen: HashMap<String, ObjectId> = HashMap::new();
    for (id, object) in doc.collect(ObjectsWithFxId) {
        if seen.contains_key(&id) {
            diags.push(LintDiagnostic {
                object,
                message: format!("`fx:id=\"{id}\"` is already used by another object."),
                severity: LintSeverity::Warning,
                rule: "duplicate-fx-id",
            });
        } else {
            seen.insert(id, object);
        }
    }
}

/// Warn when a reference names an `fx:id` that no object declares.
fn lint_unresolved_references(doc: &FxomDocument, diags: &mut Vec<LintDiagnostic>) {
    let declared: HashSet<String> = doc.collect(ObjectsWithFxId).map(|(id, _)| id).collect();
    for (object, target) in doc.collect(References) {
        let base = target.split('.').next().unwrap_or(&target);
        if !declared.contains(base) {
            diags.push(LintDiagnostic {
                object,
                message: format!("Reference to `{target}`, but no object has `fx:id=\"{base}\"`."),
                severity: LintSeverity::Warning,
                rule: "unresolved-reference",
            });
        }
    }
}

/// Info when an attribute is neither a known property nor a static or
/// event-handler property of the class.
fn lint_unknown_properties(doc: &FxomDocument, diags: &mut Vec<LintDiagnostic>) {
    let metadata = doc.metadata();
    let Some(root) = doc.root() else {
        return;
    };
    let mut stack = vec![root];
    while let Some(object) = stack.pop() {
        let properties = doc.properties(object);
        for property in properties.iter().rev() {
            stack.extend(doc.values(*property).iter().rev());
        }
        let Some(class) = doc.class_name(object) else {
            continue;
        };
        let known: HashSet<Name> = metadata
            .value_properties(class)
            .into_iter()
            .map(|p| p.name)
            .chain(metadata.accessories(class).into_iter().map(|a| a.name))
            .collect();
        for property in properties {
            let name = doc.property_name(*property);
            if doc.is_collection(*property)
                || known.contains(&name)
                || name.is_static_property()
                || is_event_handler(name.as_str())
            {
                continue;
            }
            diags.push(LintDiagnostic {
                object,
                message: format!("`{class}` has no property `{name}`."),
                severity: LintSeverity::Info,
                rule: "unknown-property",
            });
        }
    }
}

fn is_event_handler(name: &str) -> bool {
    name.strip_prefix("on")
        .and_then(|rest| rest.chars().next())
        .is_some_and(char::is_uppercase)
}

// ─── Tests ───────────────────────────────────────────────────────────────
