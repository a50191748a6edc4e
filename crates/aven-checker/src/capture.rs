//! Capture analysis.
//!
//! A post-dispatch pass that computes, for each function, the set of outer
//! declarations its body references. Functions that capture nothing are
//! hoistable; references to them are subtracted from their users' capture
//! sets. Two capture shapes are rejected: captures of module-level bindings
//! and captures of method-local state. Members reached through the implicit
//! `self` are not captures.

use aven_common::{codes, Diagnostic};
use aven_parser::{NodeArena, NodeId, NodeKind};
use rustc_hash::{FxHashMap, FxHashSet};

pub fn analyze_module(arena: &NodeArena, root: NodeId) -> Vec<Diagnostic> {
    let file = match &arena.get(root).kind {
        NodeKind::Module(m) => m.name.clone(),
        _ => String::from("<module>"),
    };
    let module = arena.get(root).module;

    // Collect every function (and lambda) of the module with a body.
    let funs: Vec<NodeId> = arena
        .ids()
        .filter(|&id| {
            arena.get(id).module == module
                && match &arena.get(id).kind {
                    NodeKind::Fun(f) => f.body.is_some(),
                    NodeKind::Lambda(_) => true,
                    _ => false,
                }
        })
        .collect();

    // References to declarations whose context strictly encloses the
    // function. The referencing identifier is kept for reporting.
    let mut captures: FxHashMap<NodeId, Vec<(NodeId, NodeId)>> = FxHashMap::default();
    for &fun in &funs {
        let body = match &arena.get(fun).kind {
            NodeKind::Fun(f) => f.body,
            NodeKind::Lambda(l) => Some(l.body),
            _ => None,
        };
        let mut found = Vec::new();
        if let Some(body) = body {
            collect_captures(arena, fun, body, &mut found);
        }
        captures.insert(fun, found);
    }

    // Subtract references to hoistable functions: a function whose only
    // outer references are other hoistable functions needs no environment.
    // Greatest fixed point, so mutually recursive environment-free
    // functions stay hoistable.
    let mut hoistable: FxHashSet<NodeId> = captures.keys().copied().collect();
    loop {
        let mut changed = false;
        for (&fun, caps) in &captures {
            if !hoistable.contains(&fun) {
                continue;
            }
            let clean = caps.iter().all(|&(decl, _)| {
                matches!(arena.get(decl).kind, NodeKind::Fun(_))
                    && (hoistable.contains(&decl) || !captures.contains_key(&decl))
            });
            if !clean {
                hoistable.remove(&fun);
                changed = true;
            }
        }
        if !changed {
            break;
        }
    }
    let known_decls: FxHashSet<NodeId> = captures.keys().copied().collect();
    for caps in captures.values_mut() {
        caps.retain(|&(decl, _)| {
            !(matches!(arena.get(decl).kind, NodeKind::Fun(_))
                && (hoistable.contains(&decl) || !known_decls.contains(&decl)))
        });
    }

    let mut diagnostics = Vec::new();
    for caps in captures.values() {
        for &(decl, ident) in caps {
            let span = arena.get(ident).span;
            let name = arena.get(decl).name().unwrap_or("<anonymous>").to_string();
            let decl_ctx = arena.get(decl).decl_ctx;
            let top_level = decl_ctx
                .map(|ctx| matches!(arena.get(ctx).kind, NodeKind::Module(_)))
                .unwrap_or(false);
            if top_level {
                diagnostics.push(Diagnostic::error(
                    file.clone(),
                    span,
                    format!("function cannot capture the top-level binding '{name}'"),
                    codes::ILLEGAL_TOP_LEVEL_CAPTURE,
                ));
            } else if in_method(arena, decl) {
                diagnostics.push(Diagnostic::error(
                    file.clone(),
                    span,
                    format!("'{name}' cannot be captured inside a method"),
                    codes::ILLEGAL_CAPTURE_IN_METHOD,
                ));
            }
        }
    }
    diagnostics
}

/// Walk a function body, recording references to declarations declared in a
/// strictly enclosing context. Nested functions are walked too: their own
/// captures are also captures of the outer function when they reach past it.
fn collect_captures(
    arena: &NodeArena,
    fun: NodeId,
    node: NodeId,
    found: &mut Vec<(NodeId, NodeId)>,
) {
    if let NodeKind::Ident(ident) = &arena.get(node).kind {
        if ident.referred_decls.len() == 1 {
            let decl = ident.referred_decls[0];
            if is_captured(arena, fun, decl) {
                found.push((decl, node));
            }
        }
    }
    for child in children(arena, node) {
        collect_captures(arena, fun, child, found);
    }
}

fn is_captured(arena: &NodeArena, fun: NodeId, decl: NodeId) -> bool {
    let referencable = matches!(
        &arena.get(decl).kind,
        NodeKind::Prop(_) | NodeKind::Param(_) | NodeKind::Fun(_)
    );
    if !referencable || decl == fun {
        return false;
    }
    // Members reached through the implicit `self` (a type-declaration
    // context) are not captures, and neither is `self` itself.
    if arena.get(decl).name() == Some("self") {
        return false;
    }
    let Some(decl_ctx) = arena.get(decl).decl_ctx else {
        return false;
    };
    if arena.get(decl_ctx).is_type_decl()
        || matches!(arena.get(decl_ctx).kind, NodeKind::Extension(_))
    {
        return false;
    }
    arena.strictly_encloses(decl_ctx, fun)
}

fn children(arena: &NodeArena, node: NodeId) -> Vec<NodeId> {
    match &arena.get(node).kind {
        NodeKind::Prop(p) => p.initializer.into_iter().collect(),
        NodeKind::Fun(f) => f.body.into_iter().collect(),
        NodeKind::Lambda(l) => vec![l.body],
        NodeKind::Brace(b) => b.stmts.clone(),
        NodeKind::Binding(b) => vec![b.lvalue, b.rvalue],
        NodeKind::Return(r) => r.value.into_iter().collect(),
        NodeKind::If(i) => {
            let mut c = vec![i.condition, i.then_body];
            c.extend(i.else_body);
            c
        }
        NodeKind::While(w) => vec![w.condition, w.body],
        NodeKind::Select(s) => vec![s.owner],
        NodeKind::ImplicitSelect(_) => Vec::new(),
        NodeKind::Infix(i) => vec![i.lhs, i.rhs],
        NodeKind::Prefix(p) => vec![p.operand],
        NodeKind::Call(c) => {
            let mut children = vec![c.callee];
            children.extend(c.args.iter().copied());
            children
        }
        NodeKind::CallArg(a) => vec![a.value],
        NodeKind::Cast(c) => vec![c.operand],
        NodeKind::SubtypeTest(t) => vec![t.operand],
        NodeKind::Paren(p) => vec![p.inner],
        NodeKind::ArrayLit(a) => a.elements.clone(),
        NodeKind::SetLit(s) => s.elements.clone(),
        NodeKind::MapLit(m) => m.entries.iter().flat_map(|&(k, v)| [k, v]).collect(),
        _ => Vec::new(),
    }
}

fn in_method(arena: &NodeArena, decl: NodeId) -> bool {
    let mut current = arena.get(decl).decl_ctx;
    while let Some(ctx) = current {
        if let NodeKind::Fun(f) = &arena.get(ctx).kind {
            if matches!(
                f.kind,
                aven_parser::FunKind::Method
                    | aven_parser::FunKind::Constructor
                    | aven_parser::FunKind::Destructor
            ) {
                return true;
            }
        }
        current = arena.get(ctx).decl_ctx;
    }
    false
}
