//! Emitter: GlueDocument → markup text.
//!
//! Untouched regions come out exactly as they were read: every whitespace
//! run, comment and instruction is an auxiliary node written back verbatim.
//! Only tag internals are normalized (attribute order, quoting, spacing).

use crate::glue::*;

/// Serialize a Glue document. With `compress`, whitespace-only character
/// runs are dropped everywhere.
#[must_use]
pub fn serialize(doc: &GlueDocument, compress: bool) -> String {
    let mut out = String::with_capacity(1024);
    for node in doc.top_level() {
        match node {
            TopLevel::Aux(aux) => emit_aux(&mut out, aux, compress),
            TopLevel::Main(id) => emit_element(&mut out, doc, *id, compress),
        }
    }
    out
}

fn emit_aux(out: &mut String, aux: &GlueAux, compress: bool) {
    match aux {
        GlueAux::Characters(raw) => {
            if !(compress && aux.is_whitespace()) {
                out.push_str(raw);
            }
        }
        GlueAux::Comment(text) => {
            out.push_str("<!--");
            out.push_str(text);
            out.push_str("-->");
        }
        GlueAux::Instruction { target, data } => {
            out.push_str("<?");
            out.push_str(target);
            if !data.is_empty() {
                out.push(' ');
                out.push_str(data);
            }
            out.push_str("?>");
        }
    }
}

fn emit_auxes(out: &mut String, auxes: &[GlueAux], compress: bool) {
    for aux in auxes {
        emit_aux(out, aux, compress);
    }
}

fn emit_children(out: &mut String, doc: &GlueDocument, id: GlueId, compress: bool) {
    for child in doc.children(id) {
        let element = doc.element(*child);
        if !element.is_synthetic() {
            emit_auxes(out, &element.front, compress);
        }
        emit_element(out, doc, *child, compress);
    }
}

fn emit_element(out: &mut String, doc: &GlueDocument, id: GlueId, compress: bool) {
    let element = doc.element(id);

    if element.is_synthetic() {
        emit_children(out, doc, id, compress);
        return;
    }
    if element.is_literal() {
        let value = element.attribute(LITERAL_VALUE_ATTR).unwrap_or_default();
        out.push_str(&escape_text(value));
        return;
    }

    out.push('<');
    out.push_str(&element.tag);
    for attr in sorted_attributes(element) {
        out.push(' ');
        out.push_str(&attr.name);
        out.push_str("=\"");
        out.push_str(&escape_attribute(&attr.value));
        out.push('"');
    }

    if doc.has_emitted_children(id) {
        out.push('>');
        emit_children(out, doc, id, compress);
        emit_auxes(out, &element.tail, compress);
    } else {
        let has_content = element
            .content
            .iter()
            .any(|aux| !(compress && aux.is_whitespace()));
        if !has_content {
            out.push_str("/>");
            return;
        }
        out.push('>');
        emit_auxes(out, &element.content, compress);
    }
    out.push_str("</");
    out.push_str(&element.tag);
    out.push('>');
}

/// Attributes in save order: namespace declarations, `fx:id`, other `fx:`
/// attributes, then the rest. `Color` puts its channels first. Ties keep
/// insertion order.
pub fn sorted_attributes(element: &GlueElement) -> Vec<&GlueAttribute> {
    let is_color = element.tag.rsplit('.').next() == Some("Color");
    let mut attrs: Vec<&GlueAttribute> = element.attributes().iter().collect();
    attrs.sort_by_key(|a| attribute_rank(&a.name, is_color));
    attrs
}

fn attribute_rank(name: &str, is_color: bool) -> u8 {
    if name == "xmlns" || name.starts_with("xmlns:") {
        return 0;
    }
    if name == "fx:id" {
        return 1;
    }
    if name.starts_with("fx:") {
        return 2;
    }
    if is_color {
        match name {
            "red" => return 3,
            "green" => return 4,
            "blue" => return 5,
            "opacity" => return 6,
            _ => {}
        }
    }
    7
}
