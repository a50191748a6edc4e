//! Synthesis of the `builtin` module.
//!
//! Built-in types and their operator members are ordinary AST declarations
//! assembled directly into the arena, so the binder, realizer, and solver
//! treat them exactly like user code. Operator members are methods whose
//! bodies the code generator provides elsewhere.

use aven_common::Span;
use aven_parser::{
    BuiltinTypeDecl, FunDecl, FunKind, IdentSign, ModuleDecl, ModuleId, Node, NodeArena, NodeId,
    NodeKind, ParamDecl, QualSign, Qualifiers,
};

pub const BUILTIN_TYPE_NAMES: &[&str] = &["Anything", "Nothing", "Bool", "Int", "Float", "String"];

struct Builder<'a> {
    arena: &'a mut NodeArena,
    module: ModuleId,
}

impl<'a> Builder<'a> {
    fn node(&mut self, decl_ctx: Option<NodeId>, kind: NodeKind) -> NodeId {
        self.arena.alloc(Node {
            span: Span::dummy(),
            module: self.module,
            decl_ctx,
            kind,
        })
    }

    fn sign(&mut self, ctx: NodeId, name: &str) -> NodeId {
        let ident = self.node(
            Some(ctx),
            NodeKind::IdentSign(IdentSign {
                name: name.to_string(),
                spec_args: Vec::new(),
                referred_decl: None,
            }),
        );
        self.node(
            Some(ctx),
            NodeKind::QualSign(QualSign {
                quals: Qualifiers::empty(),
                sign: Some(ident),
            }),
        )
    }

    /// A builtin operator method `name(rhs: Param) -> Ret` (or niladic for
    /// prefix operators).
    fn method(&mut self, type_ctx: NodeId, name: &str, params: &[&str], ret: &str) -> NodeId {
        let fun = self.node(
            Some(type_ctx),
            NodeKind::Fun(FunDecl {
                name: name.to_string(),
                kind: FunKind::Method,
                mutating: false,
                placeholders: Vec::new(),
                params: Vec::new(),
                codom: None,
                body: None,
                self_decl: None,
            }),
        );
        let mut param_ids = Vec::new();
        for &param_ty in params {
            let sign = self.sign(fun, param_ty);
            param_ids.push(self.node(
                Some(fun),
                NodeKind::Param(ParamDecl {
                    label: None,
                    name: String::from("rhs"),
                    sign: Some(sign),
                    default: None,
                }),
            ));
        }
        let codom = self.sign(fun, ret);
        if let NodeKind::Fun(f) = &mut self.arena.get_mut(fun).kind {
            f.params = param_ids;
            f.codom = Some(codom);
        }
        fun
    }
}

/// Build the `builtin` module and return its root node.
pub fn synthesize(arena: &mut NodeArena, module: ModuleId) -> NodeId {
    let root = arena.alloc(Node {
        span: Span::dummy(),
        module,
        decl_ctx: None,
        kind: NodeKind::Module(ModuleDecl {
            name: String::from("builtin"),
            stmts: Vec::new(),
        }),
    });
    let mut b = Builder { arena, module };

    let mut stmts = Vec::new();
    for &name in BUILTIN_TYPE_NAMES {
        let decl = b.node(
            Some(root),
            NodeKind::BuiltinType(BuiltinTypeDecl {
                name: name.to_string(),
                members: Vec::new(),
            }),
        );
        let members = match name {
            "Int" => int_like_members(&mut b, decl, "Int"),
            "Float" => int_like_members(&mut b, decl, "Float"),
            "Bool" => bool_members(&mut b, decl),
            "String" => string_members(&mut b, decl),
            _ => Vec::new(),
        };
        if let NodeKind::BuiltinType(t) = &mut b.arena.get_mut(decl).kind {
            t.members = members;
        }
        stmts.push(decl);
    }

    if let NodeKind::Module(m) = &mut arena.get_mut(root).kind {
        m.stmts = stmts;
    }
    root
}

fn int_like_members(b: &mut Builder<'_>, decl: NodeId, name: &str) -> Vec<NodeId> {
    let mut members = Vec::new();
    for op in ["+", "-", "*", "/", "%"] {
        members.push(b.method(decl, op, &[name], name));
    }
    for op in ["<", "<=", ">", ">=", "==", "!="] {
        members.push(b.method(decl, op, &[name], "Bool"));
    }
    // Prefix negation and identity.
    members.push(b.method(decl, "-", &[], name));
    members.push(b.method(decl, "+", &[], name));
    members
}

fn bool_members(b: &mut Builder<'_>, decl: NodeId) -> Vec<NodeId> {
    let mut members = Vec::new();
    for op in ["==", "!=", "&&", "||"] {
        members.push(b.method(decl, op, &["Bool"], "Bool"));
    }
    members.push(b.method(decl, "!", &[], "Bool"));
    members
}

fn string_members(b: &mut Builder<'_>, decl: NodeId) -> Vec<NodeId> {
    let mut members = Vec::new();
    members.push(b.method(decl, "+", &["String"], "String"));
    for op in ["==", "!="] {
        members.push(b.method(decl, op, &["String"], "Bool"));
    }
    members
}
