use aven_parser::{
    BindingOp, FunKind, ModuleId, NodeArena, NodeId, NodeKind, NominalKind, Parser, Qualifiers,
};

fn parse(src: &str) -> (NodeArena, NodeId, Vec<aven_common::Diagnostic>) {
    let mut arena = NodeArena::new();
    let (root, diags) = Parser::parse_module(&mut arena, ModuleId(0), "test", src);
    (arena, root, diags)
}

fn module_stmts(arena: &NodeArena, root: NodeId) -> Vec<NodeId> {
    match &arena.get(root).kind {
        NodeKind::Module(m) => m.stmts.clone(),
        other => panic!("expected module, got {other:?}"),
    }
}

#[test]
fn let_binding_with_annotation() {
    let (arena, root, diags) = parse("let x: Int <- 1");
    assert!(diags.is_empty(), "{diags:?}");
    let stmts = module_stmts(&arena, root);
    assert_eq!(stmts.len(), 1);
    let NodeKind::Prop(prop) = &arena.get(stmts[0]).kind else {
        panic!("expected property declaration");
    };
    assert_eq!(prop.name, "x");
    assert!(!prop.mutable);
    assert_eq!(prop.op, Some(BindingOp::Move));
    let sign = prop.sign.expect("annotation");
    let NodeKind::QualSign(qual) = &arena.get(sign).kind else {
        panic!("expected qualified signature");
    };
    assert_eq!(qual.quals, Qualifiers::empty());
    let NodeKind::IdentSign(ident) = &arena.get(qual.sign.unwrap()).kind else {
        panic!("expected identifier signature");
    };
    assert_eq!(ident.name, "Int");
    // The initializer literal's declaration context is the module.
    let init = prop.initializer.unwrap();
    assert_eq!(arena.get(init).decl_ctx, Some(root));
}

#[test]
fn qualified_signature() {
    let (arena, root, diags) = parse("var y: @mut Int := 0");
    assert!(diags.is_empty(), "{diags:?}");
    let stmts = module_stmts(&arena, root);
    let NodeKind::Prop(prop) = &arena.get(stmts[0]).kind else {
        panic!()
    };
    assert!(prop.mutable);
    assert_eq!(prop.op, Some(BindingOp::Copy));
    let NodeKind::QualSign(qual) = &arena.get(prop.sign.unwrap()).kind else {
        panic!()
    };
    assert_eq!(qual.quals, Qualifiers::MUT);
}

#[test]
fn function_declaration_shape() {
    let (arena, root, diags) = parse("fun id<T>(x: T) -> T { return <- x }");
    assert!(diags.is_empty(), "{diags:?}");
    let stmts = module_stmts(&arena, root);
    let fun_id = stmts[0];
    let NodeKind::Fun(fun) = &arena.get(fun_id).kind else {
        panic!()
    };
    assert_eq!(fun.name, "id");
    assert_eq!(fun.kind, FunKind::Regular);
    assert_eq!(fun.placeholders.len(), 1);
    assert_eq!(fun.params.len(), 1);
    assert!(fun.codom.is_some());
    let body = fun.body.unwrap();

    // Contexts: placeholder and parameter live in the function, the
    // return statement in the body's brace.
    assert_eq!(arena.get(fun.placeholders[0]).decl_ctx, Some(fun_id));
    assert_eq!(arena.get(fun.params[0]).decl_ctx, Some(fun_id));
    let NodeKind::Brace(brace) = &arena.get(body).kind else {
        panic!()
    };
    let NodeKind::Return(ret) = &arena.get(brace.stmts[0]).kind else {
        panic!()
    };
    assert_eq!(ret.op, Some(BindingOp::Move));
    assert_eq!(arena.get(brace.stmts[0]).decl_ctx, Some(body));
}

#[test]
fn operator_function_names() {
    let (arena, root, diags) = parse("struct V { fun + (rhs: V) -> V { } }");
    assert!(diags.is_empty(), "{diags:?}");
    let stmts = module_stmts(&arena, root);
    let NodeKind::Nominal(nominal) = &arena.get(stmts[0]).kind else {
        panic!()
    };
    assert_eq!(nominal.kind, NominalKind::Struct);
    let NodeKind::Fun(fun) = &arena.get(nominal.members[0]).kind else {
        panic!()
    };
    assert_eq!(fun.name, "+");
    assert_eq!(fun.kind, FunKind::Method);
}

#[test]
fn constructor_and_destructor_kinds() {
    let (arena, root, diags) =
        parse("struct S { fun new() { } fun del() { } mutating fun bump() { } }");
    assert!(diags.is_empty(), "{diags:?}");
    let stmts = module_stmts(&arena, root);
    let NodeKind::Nominal(nominal) = &arena.get(stmts[0]).kind else {
        panic!()
    };
    let kinds: Vec<FunKind> = nominal
        .members
        .iter()
        .map(|&m| match &arena.get(m).kind {
            NodeKind::Fun(f) => f.kind,
            other => panic!("unexpected member {other:?}"),
        })
        .collect();
    assert_eq!(
        kinds,
        vec![FunKind::Constructor, FunKind::Destructor, FunKind::Method]
    );
    let NodeKind::Fun(bump) = &arena.get(nominal.members[2]).kind else {
        panic!()
    };
    assert!(bump.mutating);
}

#[test]
fn specialization_arguments_on_identifiers() {
    let (arena, root, diags) = parse("let b <- Box<T = Int>(v <- 0)");
    assert!(diags.is_empty(), "{diags:?}");
    let stmts = module_stmts(&arena, root);
    let NodeKind::Prop(prop) = &arena.get(stmts[0]).kind else {
        panic!()
    };
    let NodeKind::Call(call) = &arena.get(prop.initializer.unwrap()).kind else {
        panic!("expected call")
    };
    let NodeKind::Ident(callee) = &arena.get(call.callee).kind else {
        panic!("expected identifier callee")
    };
    assert_eq!(callee.name, "Box");
    assert_eq!(callee.spec_args.len(), 1);
    assert_eq!(callee.spec_args[0].0, "T");
    let NodeKind::CallArg(arg) = &arena.get(call.args[0]).kind else {
        panic!()
    };
    assert_eq!(arg.label.as_deref(), Some("v"));
    assert_eq!(arg.op, Some(BindingOp::Move));
}

#[test]
fn specialization_does_not_shadow_comparison() {
    let (arena, root, diags) = parse("let c <- a < b");
    assert!(diags.is_empty(), "{diags:?}");
    let stmts = module_stmts(&arena, root);
    let NodeKind::Prop(prop) = &arena.get(stmts[0]).kind else {
        panic!()
    };
    let NodeKind::Infix(infix) = &arena.get(prop.initializer.unwrap()).kind else {
        panic!("expected infix comparison")
    };
    let NodeKind::Ident(op) = &arena.get(infix.op).kind else {
        panic!()
    };
    assert_eq!(op.name, "<");
}

#[test]
fn precedence_and_identity_operators() {
    let (arena, root, diags) = parse("let r <- a + b * c === d");
    assert!(diags.is_empty(), "{diags:?}");
    let stmts = module_stmts(&arena, root);
    let NodeKind::Prop(prop) = &arena.get(stmts[0]).kind else {
        panic!()
    };
    // `===` binds loosest: (a + (b * c)) === d
    let NodeKind::Infix(outer) = &arena.get(prop.initializer.unwrap()).kind else {
        panic!()
    };
    let NodeKind::Ident(op) = &arena.get(outer.op).kind else {
        panic!()
    };
    assert_eq!(op.name, "===");
    let NodeKind::Infix(add) = &arena.get(outer.lhs).kind else {
        panic!()
    };
    let NodeKind::Ident(add_op) = &arena.get(add.op).kind else {
        panic!()
    };
    assert_eq!(add_op.name, "+");
    let NodeKind::Infix(mul) = &arena.get(add.rhs).kind else {
        panic!()
    };
    let NodeKind::Ident(mul_op) = &arena.get(mul.op).kind else {
        panic!()
    };
    assert_eq!(mul_op.name, "*");
}

#[test]
fn select_and_call_chain() {
    let (arena, root, diags) = parse("s.g()");
    assert!(diags.is_empty(), "{diags:?}");
    let stmts = module_stmts(&arena, root);
    let NodeKind::Call(call) = &arena.get(stmts[0]).kind else {
        panic!("expected call statement")
    };
    let NodeKind::Select(select) = &arena.get(call.callee).kind else {
        panic!("expected select callee")
    };
    let NodeKind::Ident(owner) = &arena.get(select.owner).kind else {
        panic!()
    };
    assert_eq!(owner.name, "s");
    let NodeKind::Ident(ownee) = &arena.get(select.ownee).kind else {
        panic!()
    };
    assert_eq!(ownee.name, "g");
}

#[test]
fn extension_and_interface() {
    let (arena, root, diags) = parse(
        "interface Showable { fun show() -> String }\n\
         extension Point { fun show() -> String { return <- \"p\" } }",
    );
    assert!(diags.is_empty(), "{diags:?}");
    let stmts = module_stmts(&arena, root);
    let NodeKind::Nominal(iface) = &arena.get(stmts[0]).kind else {
        panic!()
    };
    assert_eq!(iface.kind, NominalKind::Interface);
    let NodeKind::Fun(show) = &arena.get(iface.members[0]).kind else {
        panic!()
    };
    assert!(show.body.is_none());
    let NodeKind::Extension(ext) = &arena.get(stmts[1]).kind else {
        panic!()
    };
    let NodeKind::IdentSign(extended) = &arena.get(ext.extended).kind else {
        panic!()
    };
    assert_eq!(extended.name, "Point");
}

#[test]
fn nested_type_signature() {
    let (arena, root, diags) = parse("let x: A::B <- y");
    assert!(diags.is_empty(), "{diags:?}");
    let stmts = module_stmts(&arena, root);
    let NodeKind::Prop(prop) = &arena.get(stmts[0]).kind else {
        panic!()
    };
    let NodeKind::QualSign(qual) = &arena.get(prop.sign.unwrap()).kind else {
        panic!()
    };
    let NodeKind::NestedIdentSign(nested) = &arena.get(qual.sign.unwrap()).kind else {
        panic!("expected nested identifier signature")
    };
    let NodeKind::IdentSign(owner) = &arena.get(nested.owner).kind else {
        panic!()
    };
    assert_eq!(owner.name, "A");
}

#[test]
fn function_signature_type() {
    let (arena, root, diags) = parse("let f: (x: Int) -> Int <- g");
    assert!(diags.is_empty(), "{diags:?}");
    let stmts = module_stmts(&arena, root);
    let NodeKind::Prop(prop) = &arena.get(stmts[0]).kind else {
        panic!()
    };
    let NodeKind::QualSign(qual) = &arena.get(prop.sign.unwrap()).kind else {
        panic!()
    };
    let NodeKind::FunSign(fun) = &arena.get(qual.sign.unwrap()).kind else {
        panic!("expected function signature")
    };
    assert_eq!(fun.params.len(), 1);
    let NodeKind::ParamSign(param) = &arena.get(fun.params[0]).kind else {
        panic!()
    };
    assert_eq!(param.label.as_deref(), Some("x"));
}

#[test]
fn if_else_chain_and_while() {
    let (arena, root, diags) = parse(
        "if a { b := 1 } else if c { } else { }\nwhile d { }",
    );
    assert!(diags.is_empty(), "{diags:?}");
    let stmts = module_stmts(&arena, root);
    let NodeKind::If(if_stmt) = &arena.get(stmts[0]).kind else {
        panic!()
    };
    let NodeKind::If(_) = &arena.get(if_stmt.else_body.unwrap()).kind else {
        panic!("expected else-if")
    };
    let NodeKind::While(_) = &arena.get(stmts[1]).kind else {
        panic!()
    };
}

#[test]
fn collection_literals() {
    let (arena, root, diags) = parse("let a <- [1, 2]\nlet s <- {1, 2}\nlet m <- {1: 2}");
    assert!(diags.is_empty(), "{diags:?}");
    let stmts = module_stmts(&arena, root);
    let inits: Vec<NodeId> = stmts
        .iter()
        .map(|&s| match &arena.get(s).kind {
            NodeKind::Prop(p) => p.initializer.unwrap(),
            _ => panic!(),
        })
        .collect();
    assert!(matches!(arena.get(inits[0]).kind, NodeKind::ArrayLit(_)));
    assert!(matches!(arena.get(inits[1]).kind, NodeKind::SetLit(_)));
    assert!(matches!(arena.get(inits[2]).kind, NodeKind::MapLit(_)));
}

#[test]
fn lambda_expression() {
    let (arena, root, diags) = parse("let f <- fun (x: Int) -> Int { return <- x }");
    assert!(diags.is_empty(), "{diags:?}");
    let stmts = module_stmts(&arena, root);
    let NodeKind::Prop(prop) = &arena.get(stmts[0]).kind else {
        panic!()
    };
    let lambda_id = prop.initializer.unwrap();
    let NodeKind::Lambda(lambda) = &arena.get(lambda_id).kind else {
        panic!("expected lambda")
    };
    assert_eq!(lambda.params.len(), 1);
    assert_eq!(arena.get(lambda.params[0]).decl_ctx, Some(lambda_id));
}

#[test]
fn casts_and_subtype_test() {
    let (arena, root, diags) = parse("let a <- x as Int\nlet b <- x as! Int\nlet c <- x is Int");
    assert!(diags.is_empty(), "{diags:?}");
    let stmts = module_stmts(&arena, root);
    let get_init = |i: usize| match &arena.get(stmts[i]).kind {
        NodeKind::Prop(p) => p.initializer.unwrap(),
        _ => panic!(),
    };
    let NodeKind::Cast(safe) = &arena.get(get_init(0)).kind else {
        panic!()
    };
    assert!(!safe.forced);
    let NodeKind::Cast(forced) = &arena.get(get_init(1)).kind else {
        panic!()
    };
    assert!(forced.forced);
    assert!(matches!(
        arena.get(get_init(2)).kind,
        NodeKind::SubtypeTest(_)
    ));
}

#[test]
fn error_recovery_keeps_parsing() {
    let (arena, root, diags) = parse("let x <- @\nlet y <- 2");
    assert!(!diags.is_empty());
    let stmts = module_stmts(&arena, root);
    // Both declarations survive; the first one's initializer is invalid.
    assert_eq!(stmts.len(), 2);
    let NodeKind::Prop(second) = &arena.get(stmts[1]).kind else {
        panic!()
    };
    assert_eq!(second.name, "y");
}
