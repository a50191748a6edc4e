//! The dispatcher.
//!
//! Applies the solver's substitution to every typed node, fuses the default
//! `@cst` into unspecified qualifier sets, narrows overloaded identifiers to
//! the declaration the solution selected, and reports the ambiguities that
//! survive.

use aven_common::{codes, Diagnostic};
use aven_parser::{FunKind, NodeArena, NodeId, NodeKind, Qualifiers};
use aven_solver::{
    QualType, Solution, SubstitutionTable, TypeId, TypeInterner, TypeKey, TypeTable,
};
use rustc_hash::FxHashMap;

pub fn dispatch_module(
    arena: &mut NodeArena,
    interner: &TypeInterner,
    types: &mut TypeTable,
    solution: &Solution,
    root: NodeId,
) -> Vec<Diagnostic> {
    let file = match &arena.get(root).kind {
        NodeKind::Module(m) => m.name.clone(),
        _ => String::from("<module>"),
    };
    let module = arena.get(root).module;

    let mut subst = SubstitutionTable::new();
    subst.install(&solution.substitutions);

    let mut diagnostics = Vec::new();
    let module_nodes: Vec<NodeId> = arena
        .ids()
        .filter(|&id| arena.get(id).module == module)
        .collect();

    // Finalize every typed node.
    for &node in &module_nodes {
        if let Some(qual) = types.get(node) {
            let ty = subst.reify(interner, qual.ty);
            let quals = if qual.quals.is_empty() {
                Qualifiers::CST
            } else {
                qual.quals
            };
            types.set(node, QualType::new(quals, ty));
        }
    }

    // Narrow overloaded identifiers to the chosen declaration.
    for &node in &module_nodes {
        let NodeKind::Ident(ident) = &arena.get(node).kind else {
            continue;
        };
        let span = arena.get(node).span;
        let candidates = ident.referred_decls.clone();
        let spec_keys: Vec<String> = ident.spec_args.iter().map(|(k, _)| k.clone()).collect();
        let name = ident.name.clone();
        if candidates.is_empty() {
            continue;
        }
        let Some(ident_ty) = types.get(node).map(|q| q.ty) else {
            continue;
        };

        let chosen = if candidates.len() == 1 {
            candidates.clone()
        } else {
            let matching: Vec<NodeId> = candidates
                .iter()
                .copied()
                .filter(|&decl| {
                    types
                        .get(decl)
                        .map(|q| decl_matches(arena, interner, decl, q.ty, ident_ty))
                        .unwrap_or(false)
                })
                .collect();
            match matching.len() {
                0 => candidates.clone(), // an error was reported during solving
                1 => matching,
                _ => {
                    diagnostics.push(Diagnostic::error(
                        file.clone(),
                        span,
                        format!("ambiguous use of '{name}'"),
                        codes::AMBIGUOUS_FUNCTION_USE,
                    ));
                    vec![matching[0]]
                }
            }
        };

        // Specialization keys that do not name a placeholder of the chosen
        // declaration are superfluous.
        if let Some(&decl) = chosen.first() {
            let placeholders: Vec<String> = placeholder_names(arena, decl);
            for key in &spec_keys {
                if !placeholders.iter().any(|p| p == key) {
                    diagnostics.push(Diagnostic::warning(
                        file.clone(),
                        span,
                        format!("superfluous specialization argument '{key}'"),
                        codes::SUPERFLUOUS_SPECIALIZATION_ARGUMENT,
                    ));
                }
            }
        }

        if let NodeKind::Ident(ident) = &mut arena.get_mut(node).kind {
            ident.referred_decls = chosen;
        }
    }

    diagnostics
}

fn placeholder_names(arena: &NodeArena, decl: NodeId) -> Vec<String> {
    let placeholders = match &arena.get(decl).kind {
        NodeKind::Nominal(n) => n.placeholders.clone(),
        NodeKind::Fun(f) => f.placeholders.clone(),
        _ => Vec::new(),
    };
    placeholders
        .into_iter()
        .filter_map(|ph| arena.get(ph).name().map(str::to_string))
        .collect()
}

/// Does the finalized identifier type select this declaration?
///
/// Methods also match on their bound (self-applied) type, since an implicit
/// member reference carries the inner type.
fn decl_matches(
    arena: &NodeArena,
    interner: &TypeInterner,
    decl: NodeId,
    decl_ty: TypeId,
    ident_ty: TypeId,
) -> bool {
    let mut bindings = FxHashMap::default();
    if type_matches(interner, decl_ty, ident_ty, &mut bindings) {
        return true;
    }
    let method_like = matches!(
        &arena.get(decl).kind,
        NodeKind::Fun(f) if matches!(f.kind, FunKind::Method | FunKind::Destructor)
    );
    if method_like {
        if let TypeKey::Fun { dom, codom, .. } = interner.lookup(decl_ty) {
            if dom.len() == 1 {
                let mut bindings = FxHashMap::default();
                return type_matches(interner, codom.ty, ident_ty, &mut bindings);
            }
        }
    }
    false
}

/// Structural match of a declaration's type against a finalized type, with
/// the declaration's placeholders acting as consistently-bound wildcards
/// (the `BoundGeneric` bindings substitution) and unsolved variables on the
/// identifier side matching anything.
fn type_matches(
    interner: &TypeInterner,
    decl_ty: TypeId,
    ident_ty: TypeId,
    bindings: &mut FxHashMap<NodeId, TypeId>,
) -> bool {
    if decl_ty == ident_ty {
        return true;
    }
    match interner.lookup(decl_ty) {
        TypeKey::Placeholder(ph) => match bindings.get(&ph) {
            Some(&bound) => bound == ident_ty,
            None => {
                bindings.insert(ph, ident_ty);
                true
            }
        },
        _ => {
            if interner.is_var(ident_ty) || ident_ty == TypeId::ERROR {
                return true;
            }
            match (interner.lookup(decl_ty), interner.lookup(ident_ty)) {
                (
                    TypeKey::Fun {
                        dom: dom_d,
                        codom: codom_d,
                        ..
                    },
                    TypeKey::Fun {
                        dom: dom_i,
                        codom: codom_i,
                        ..
                    },
                ) => {
                    dom_d.len() == dom_i.len()
                        && dom_d
                            .iter()
                            .zip(dom_i.iter())
                            .all(|(d, i)| {
                                type_matches(interner, d.qual.ty, i.qual.ty, bindings)
                            })
                        && type_matches(interner, codom_d.ty, codom_i.ty, bindings)
                }
                (
                    TypeKey::BoundGeneric {
                        base: base_d,
                        bindings: bind_d,
                    },
                    TypeKey::BoundGeneric {
                        base: base_i,
                        bindings: bind_i,
                    },
                ) => {
                    base_d == base_i
                        && bind_d.len() == bind_i.len()
                        && bind_d
                            .iter()
                            .zip(bind_i.iter())
                            .all(|((ph_d, v_d), (ph_i, v_i))| {
                                ph_d == ph_i && type_matches(interner, *v_d, *v_i, bindings)
                            })
                }
                (TypeKey::Kind(d), TypeKey::Kind(i)) => type_matches(interner, d, i, bindings),
                _ => false,
            }
        }
    }
}
