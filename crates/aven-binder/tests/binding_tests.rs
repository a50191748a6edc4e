use aven_binder::{MemberTables, ModuleIdent, ModuleTable, NameBinder};
use aven_common::{codes, Diagnostic, Span};
use aven_parser::{
    BuiltinTypeDecl, ModuleDecl, Node, NodeArena, NodeId, NodeKind, Parser,
};

const BUILTIN_TYPE_NAMES: &[&str] = &["Anything", "Nothing", "Bool", "Int", "Float", "String"];

/// Build an empty `builtin` module with the well-known type declarations.
fn synthesize_builtin(arena: &mut NodeArena, modules: &mut ModuleTable) -> NodeId {
    let (_, module_id) = modules.create(ModuleIdent::Builtin);
    let root = arena.alloc(Node {
        span: Span::dummy(),
        module: module_id,
        decl_ctx: None,
        kind: NodeKind::Module(ModuleDecl {
            name: String::from("builtin"),
            stmts: Vec::new(),
        }),
    });
    let mut stmts = Vec::new();
    for name in BUILTIN_TYPE_NAMES {
        stmts.push(arena.alloc(Node {
            span: Span::dummy(),
            module: module_id,
            decl_ctx: Some(root),
            kind: NodeKind::BuiltinType(BuiltinTypeDecl {
                name: (*name).to_string(),
                members: Vec::new(),
            }),
        }));
    }
    if let NodeKind::Module(m) = &mut arena.get_mut(root).kind {
        m.stmts = stmts;
    }
    modules.set_root(module_id, root);
    root
}

struct Bound {
    arena: NodeArena,
    root: NodeId,
    diags: Vec<Diagnostic>,
}

fn bind(src: &str) -> Bound {
    let mut arena = NodeArena::new();
    let mut modules = ModuleTable::new();
    let members = MemberTables::new();
    let builtin_root = synthesize_builtin(&mut arena, &mut modules);

    let (_, module_id) = modules.create(ModuleIdent::Local(String::from("main")));
    let (root, parse_diags) = Parser::parse_module(&mut arena, module_id, "main", src);
    assert!(parse_diags.is_empty(), "parse diagnostics: {parse_diags:?}");
    modules.set_root(module_id, root);

    let diags = NameBinder::bind_module(&mut arena, &modules, &members, builtin_root, None, root);
    Bound { arena, root, diags }
}

fn find_props<'a>(bound: &'a Bound, name: &str) -> Vec<NodeId> {
    bound
        .arena
        .ids()
        .filter(|&id| {
            matches!(&bound.arena.get(id).kind, NodeKind::Prop(p) if p.name == name)
        })
        .collect()
}

fn ident_refs(bound: &Bound, id: NodeId) -> Vec<NodeId> {
    match &bound.arena.get(id).kind {
        NodeKind::Ident(i) => i.referred_decls.clone(),
        other => panic!("expected identifier, got {other:?}"),
    }
}

#[test]
fn initializer_shadowing_refers_to_outer_binding() {
    let bound = bind("let x <- 0\nfun f() { let x <- x }");
    assert!(bound.diags.is_empty(), "{:?}", bound.diags);

    let props = find_props(&bound, "x");
    assert_eq!(props.len(), 2);
    let (outer, inner) = if bound.arena.get(props[0]).decl_ctx == Some(bound.root) {
        (props[0], props[1])
    } else {
        (props[1], props[0])
    };

    let NodeKind::Prop(inner_prop) = &bound.arena.get(inner).kind else {
        panic!()
    };
    let refs = ident_refs(&bound, inner_prop.initializer.unwrap());
    assert_eq!(refs, vec![outer]);
}

#[test]
fn unbound_identifier_reports_and_leaves_empty() {
    let bound = bind("let x <- y");
    assert_eq!(bound.diags.len(), 1);
    assert_eq!(bound.diags[0].code, codes::UNBOUND_IDENTIFIER);

    let NodeKind::Prop(prop) = &bound.arena.get(find_props(&bound, "x")[0]).kind else {
        panic!()
    };
    assert!(ident_refs(&bound, prop.initializer.unwrap()).is_empty());
}

#[test]
fn duplicate_non_overloadable_declaration() {
    let bound = bind("let x <- 0\nlet x <- 1");
    assert_eq!(bound.diags.len(), 1);
    assert_eq!(bound.diags[0].code, codes::DUPLICATE_DECLARATION);
    assert_eq!(bound.diags[0].related.len(), 1);
}

#[test]
fn function_overloads_coexist() {
    let bound = bind("fun f(x: Int) -> Int { return <- x }\nfun f(x: Float) -> Float { return <- x }");
    assert!(bound.diags.is_empty(), "{:?}", bound.diags);
}

#[test]
fn mixed_kind_redeclaration_is_illegal() {
    let bound = bind("let f <- 0\nfun f() { }");
    assert_eq!(bound.diags.len(), 1);
    assert_eq!(bound.diags[0].code, codes::ILLEGAL_REDECLARATION);
}

#[test]
fn overload_candidates_accumulate_across_scopes() {
    let bound = bind(
        "fun g(x: Int) -> Int { return <- x }\n\
         fun h() {\n\
           fun g(x: Float) -> Float { return <- x }\n\
           g(1)\n\
         }",
    );
    assert!(bound.diags.is_empty(), "{:?}", bound.diags);

    // Find the `g` identifier in the call inside `h`.
    let call_ident = bound
        .arena
        .ids()
        .find(|&id| {
            matches!(&bound.arena.get(id).kind, NodeKind::Ident(i) if i.name == "g")
                && bound.arena.get(id).decl_ctx != Some(bound.root)
        })
        .expect("call identifier");
    let refs = ident_refs(&bound, call_ident);
    assert_eq!(refs.len(), 2, "both overloads should be candidates");
}

#[test]
fn builtin_type_names_resolve_through_fallback() {
    let bound = bind("let x: Int <- 0");
    assert!(bound.diags.is_empty(), "{:?}", bound.diags);

    let sign = bound
        .arena
        .ids()
        .find(|&id| matches!(&bound.arena.get(id).kind, NodeKind::IdentSign(s) if s.name == "Int"))
        .unwrap();
    let NodeKind::IdentSign(sign) = &bound.arena.get(sign).kind else {
        panic!()
    };
    let decl = sign.referred_decl.expect("resolved");
    assert!(matches!(
        &bound.arena.get(decl).kind,
        NodeKind::BuiltinType(b) if b.name == "Int"
    ));
}

#[test]
fn self_resolves_to_the_enclosing_type() {
    let bound = bind("struct S { fun g() -> Self { } }");
    assert!(bound.diags.is_empty(), "{:?}", bound.diags);

    let struct_id = bound
        .arena
        .ids()
        .find(|&id| matches!(&bound.arena.get(id).kind, NodeKind::Nominal(n) if n.name == "S"))
        .unwrap();
    let sign = bound
        .arena
        .ids()
        .find(|&id| {
            matches!(&bound.arena.get(id).kind, NodeKind::IdentSign(s) if s.name == "Self")
        })
        .unwrap();
    let NodeKind::IdentSign(sign) = &bound.arena.get(sign).kind else {
        panic!()
    };
    assert_eq!(sign.referred_decl, Some(struct_id));
}

#[test]
fn self_value_binds_to_synthetic_declaration() {
    let bound = bind("struct S { let v: Int <- 0\nfun g() -> Int { return <- self } }");
    assert!(bound.diags.is_empty(), "{:?}", bound.diags);

    let self_ident = bound
        .arena
        .ids()
        .find(|&id| matches!(&bound.arena.get(id).kind, NodeKind::Ident(i) if i.name == "self"))
        .unwrap();
    let refs = ident_refs(&bound, self_ident);
    assert_eq!(refs.len(), 1);
    assert!(matches!(
        &bound.arena.get(refs[0]).kind,
        NodeKind::Param(p) if p.name == "self"
    ));
}

#[test]
fn members_visible_inside_type_body() {
    let bound = bind("struct S { let v: Int <- 0\nfun g() -> Int { return <- v } }");
    assert!(bound.diags.is_empty(), "{:?}", bound.diags);

    let v_use = bound
        .arena
        .ids()
        .filter(|&id| matches!(&bound.arena.get(id).kind, NodeKind::Ident(i) if i.name == "v"))
        .last()
        .unwrap();
    let refs = ident_refs(&bound, v_use);
    assert_eq!(refs.len(), 1);
    assert!(matches!(&bound.arena.get(refs[0]).kind, NodeKind::Prop(_)));
}

#[test]
fn extension_members_fold_into_lookup() {
    let bound = bind(
        "struct P { }\n\
         extension P { fun size() -> Int { return <- 0 } }\n\
         struct Q { fun probe(p: P) { } }",
    );
    assert!(bound.diags.is_empty(), "{:?}", bound.diags);
}

#[test]
fn nested_type_signature_resolves_member_type() {
    let bound = bind("struct A { struct B { } }\nlet x: A::B <- 0");
    assert!(bound.diags.is_empty(), "{:?}", bound.diags);

    let b_sign = bound
        .arena
        .ids()
        .find(|&id| matches!(&bound.arena.get(id).kind, NodeKind::IdentSign(s) if s.name == "B"))
        .unwrap();
    let NodeKind::IdentSign(sign) = &bound.arena.get(b_sign).kind else {
        panic!()
    };
    let decl = sign.referred_decl.expect("resolved nested type");
    assert!(matches!(
        &bound.arena.get(decl).kind,
        NodeKind::Nominal(n) if n.name == "B"
    ));
}

#[test]
fn missing_nested_type_reports() {
    let bound = bind("struct A { }\nlet x: A::B <- 0");
    assert_eq!(bound.diags.len(), 1);
    assert_eq!(bound.diags[0].code, codes::NON_EXISTING_NESTED_TYPE);
}

#[test]
fn peer_parameter_defaults_refer_outward() {
    let bound = bind("let b <- 0\nfun f(a: Int := b, b: Int := 1) { }");
    assert!(bound.diags.is_empty(), "{:?}", bound.diags);

    let module_b = find_props(&bound, "b")[0];
    // The default of `a` mentions `b`; peer parameters are declared at the
    // same time, so it refers to the module-level binding.
    let b_use = bound
        .arena
        .ids()
        .find(|&id| matches!(&bound.arena.get(id).kind, NodeKind::Ident(i) if i.name == "b"))
        .unwrap();
    assert_eq!(ident_refs(&bound, b_use), vec![module_b]);
}
