//! Name lookup and redeclaration linking for the lite front end.
//!
//! Lookup is by spelling only. A use resolves to every declaration in the
//! file introducing that name, narrowed to class members after `.` and `->`.
//! Over-approximating keeps more code alive, never less.

use std::collections::{HashMap, HashSet};

use super::parser::{is_keyword, Span};
use super::preprocessor::PpToken;
use crate::frontend::ast::{Decl, DeclId, DeclKind, RefKind, Reference, TemplateKind, TranslationUnit};

pub type NameTable = HashMap<String, Vec<DeclId>>;

/// Declarations a name can resolve to.
pub fn name_table(unit: &TranslationUnit) -> NameTable {
    let mut table = NameTable::new();
    for decl in unit.decls() {
        if !is_lookup_target(decl) {
            continue;
        }
        for name in decl.names() {
            table.entry(name.to_string()).or_default().push(decl.id);
        }
    }
    table
}

fn is_lookup_target(decl: &Decl) -> bool {
    decl.kind.is_semantic()
        && !matches!(
            decl.kind,
            DeclKind::Friend | DeclKind::StaticAssert | DeclKind::ExplicitInstantiation
        )
}

/// Kinds that can be redeclared, grouped so that `typedef` and `using`
/// aliases of one name land together.
fn redeclaration_group(kind: DeclKind) -> Option<&'static str> {
    match kind {
        DeclKind::Record => Some("record"),
        DeclKind::Enum => Some("enum"),
        DeclKind::Function => Some("function"),
        DeclKind::Variable => Some("variable"),
        DeclKind::Typedef | DeclKind::TypeAlias => Some("typedef"),
        DeclKind::NamespaceAlias => Some("nsalias"),
        _ => None,
    }
}

/// Enclosing scope path including the declarator's own qualifier.
fn scope_path(unit: &TranslationUnit, decl: &Decl) -> String {
    let mut parts = Vec::new();
    let mut scope = decl.parent;
    while let Some(sid) = scope {
        let s = unit.decl(sid);
        match s.kind {
            DeclKind::LinkageSpec => {}
            DeclKind::Namespace if s.name.is_empty() => parts.push("(anonymous)".to_string()),
            _ => parts.push(s.name.clone()),
        }
        scope = s.parent;
    }
    parts.reverse();
    parts.extend(decl.qualifier.iter().cloned());
    parts.join("::")
}

/// Chain every declaration to the previous declaration of the same entity.
pub fn link_redeclarations(unit: &mut TranslationUnit) {
    let mut last: HashMap<String, DeclId> = HashMap::new();
    let mut links: Vec<(DeclId, DeclId)> = Vec::new();

    for decl in unit.decls() {
        let Some(group) = redeclaration_group(decl.kind) else {
            continue;
        };
        if decl.name.is_empty() {
            continue;
        }
        // Primary templates and their out-of-line members share a key.
        let key = format!(
            "{group}|{}|{}|{}|{}",
            scope_path(unit, decl),
            decl.name,
            decl.template.is_specialization(),
            decl.signature.as_deref().unwrap_or_default()
        );
        if let Some(prev) = last.insert(key, decl.id) {
            links.push((decl.id, prev));
        }
    }

    for (id, prev) in links {
        unit.decl_mut(id).previous = Some(prev);
    }
}

/// Point explicit and partial specializations at their primary template.
pub fn link_specializations(unit: &mut TranslationUnit) {
    let mut primaries: HashMap<String, DeclId> = HashMap::new();
    for decl in unit.decls() {
        if decl.template != TemplateKind::Primary {
            continue;
        }
        if let Some(group) = redeclaration_group(decl.kind) {
            let key = format!("{group}|{}|{}", scope_path(unit, decl), decl.name);
            primaries.entry(key).or_insert(decl.id);
        }
    }

    let mut links = Vec::new();
    for decl in unit.decls() {
        if !decl.template.is_specialization() {
            continue;
        }
        if let Some(group) = redeclaration_group(decl.kind) {
            let key = format!("{group}|{}|{}", scope_path(unit, decl), decl.name);
            if let Some(primary) = primaries.get(&key) {
                links.push((decl.id, *primary));
            }
        }
    }
    for (id, primary) in links {
        unit.decl_mut(id).specialization_of = Some(primary);
    }
}

fn is_member(unit: &TranslationUnit, id: DeclId) -> bool {
    let decl = unit.decl(id);
    !decl.qualifier.is_empty() || decl.parent.is_some_and(|p| unit.decl(p).kind == DeclKind::Record)
}

/// References made by the tokens in `spans`.
pub fn resolve_spans(
    unit: &TranslationUnit,
    toks: &[PpToken],
    spans: &[Span],
    declarators: &HashSet<usize>,
    names: &NameTable,
) -> Vec<Reference> {
    let mut refs = Vec::new();
    for &(from, to) in spans {
        for i in from..to.min(toks.len()) {
            let tok = &toks[i];
            for name in &tok.expansion {
                if let Some(targets) = names.get(name) {
                    refs.push(Reference {
                        name: name.clone(),
                        range: tok.token.range,
                        kind: RefKind::Macro,
                        targets: targets.clone(),
                    });
                }
            }
            if let Some(suffix) = tok.token.ud_suffix() {
                let spells_operator = i.checked_sub(1).is_some_and(|p| toks[p].token.is("operator"));
                let name = format!("operator\"\"{suffix}");
                if let Some(targets) = names.get(&name).filter(|_| !spells_operator) {
                    refs.push(Reference {
                        name,
                        range: tok.token.range,
                        kind: RefKind::Name,
                        targets: targets.clone(),
                    });
                }
                continue;
            }
            if !tok.token.is_ident() || is_keyword(&tok.token.text) || declarators.contains(&i) {
                continue;
            }
            let Some(candidates) = names.get(&tok.token.text) else {
                continue;
            };
            let kind = match i.checked_sub(1).map(|p| toks[p].token.text.as_str()) {
                Some("." | "->") => RefKind::Member,
                Some("::") => RefKind::Qualified,
                _ => RefKind::Name,
            };
            let targets: Vec<DeclId> = match kind {
                RefKind::Member => candidates.iter().copied().filter(|c| is_member(unit, *c)).collect(),
                _ => candidates.clone(),
            };
            if targets.is_empty() {
                continue;
            }
            refs.push(Reference {
                name: tok.token.text.clone(),
                range: tok.token.range,
                kind,
                targets,
            });
        }
    }
    refs
}

/// Link declarations and attach resolved references to every declaration.
pub fn analyze(
    unit: &mut TranslationUnit,
    toks: &[PpToken],
    own_tokens: &HashMap<DeclId, Vec<Span>>,
    declarators: &HashSet<usize>,
    names: &NameTable,
) {
    link_redeclarations(unit);
    link_specializations(unit);
    let mut resolved: Vec<(DeclId, Vec<Reference>)> = own_tokens
        .iter()
        .map(|(id, spans)| (*id, resolve_spans(unit, toks, spans, declarators, names)))
        .collect();
    resolved.sort_by_key(|(id, _)| *id);
    for (id, refs) in resolved {
        unit.decl_mut(id).references = refs;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_redeclaration_group_merges_aliases() {
        assert_eq!(redeclaration_group(DeclKind::Typedef), redeclaration_group(DeclKind::TypeAlias));
        assert_eq!(redeclaration_group(DeclKind::Namespace), None);
        assert_eq!(redeclaration_group(DeclKind::Field), None);
    }
}
