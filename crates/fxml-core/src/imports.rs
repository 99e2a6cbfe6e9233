//! `<?import?>` bookkeeping for the document header.

use crate::collect::DeclaredClasses;
use crate::fxom::FxomDocument;
use crate::glue::GlueAux;
use std::collections::BTreeSet;

const IMPORT: &str = "import";

/// Fully qualified names of every class the document instantiates.
/// Classes the metadata cannot qualify are skipped.
pub fn required_imports(doc: &FxomDocument) -> BTreeSet<String> {
    doc.collect(DeclaredClasses)
        .filter_map(|class| doc.metadata().qualified_name(class))
        .filter(|qualified| !qualified.starts_with("java.lang."))
        .collect()
}

/// Imports currently in the header, in order.
pub fn current_imports(doc: &FxomDocument) -> Vec<String> {
    doc.glue()
        .header()
        .filter_map(|aux| match aux {
            GlueAux::Instruction { target, data } if target == IMPORT => {
                Some(data.trim().to_string())
            }
            _ => None,
        })
        .collect()
}

fn covers(import: &str, qualified: &str) -> bool {
    match import.strip_suffix(".*") {
        Some(package) => qualified
            .strip_prefix(package)
            .and_then(|rest| rest.strip_prefix('.'))
            .is_some_and(|simple| !simple.contains('.')),
        None => import == qualified,
    }
}

/// Rewrite the header so it imports exactly the classes in use, sorted.
///
/// The XML declaration and any other header comments or instructions are
/// kept. A header that already covers every class with no unused import is
/// left untouched. Returns whether the header changed.
pub fn sync_imports(doc: &mut FxomDocument) -> bool {
    let required = required_imports(doc);
    let current = current_imports(doc);
    let all_covered = required
        .iter()
        .all(|q| current.iter().any(|i| covers(i, q)));
    let none_unused = current
        .iter()
        .all(|i| required.iter().any(|q| covers(i, q)));
    if all_covered && none_unused {
        return false;
    }

    let mut declaration = None;
    let mut kept = Vec::new();
    for aux in doc.glue().header() {
        match aux {
            GlueAux::Instruction { target, .. } if target == "xml" => {
                declaration = Some(aux.clone());
            }
            GlueAux::Instruction { target, .. } if target == IMPORT => {}
            GlueAux::Characters(_) if aux.is_whitespace() => {}
            other => kept.push(other.clone()),
        }
    }

    let mut header = Vec::new();
    if let Some(declaration) = declaration {
        header.push(declaration);
        header.push(GlueAux::Characters("\n\n".into()));
    }
    for qualified in &required {
        header.push(GlueAux::Instruction {
            target: IMPORT.into(),
            data: qualified.clone(),
        });
        header.push(GlueAux::Characters("\n".into()));
    }
    if !required.is_empty() {
        header.push(GlueAux::Characters("\n".into()));
    }
    for aux in kept {
        header.push(aux);
        header.push(GlueAux::Characters("\n".into()));
    }
    log::debug!("imports: rewrote header with {} imports", required.len());
    doc.set_header(header);
    true
}
