//! End-to-end pipeline tests: source text in, diagnostics and finalized
//! types out.

use aven_binder::ModuleIdent;
use aven_checker::{CompilerContext, StringLoader};
use aven_common::codes;
use aven_parser::{NodeId, NodeKind};

struct Checked {
    ctx: CompilerContext,
    root: NodeId,
}

fn check(src: &str) -> Checked {
    let mut loader = StringLoader::new();
    loader.insert("main", src);
    let mut ctx = CompilerContext::new();
    let module = ctx
        .load_module(ModuleIdent::Local(String::from("main")), &loader)
        .expect("module loads");
    let root = ctx.modules.entry(module).root.expect("module parses");
    Checked { ctx, root }
}

impl Checked {
    fn error_codes(&self) -> Vec<u32> {
        self.ctx
            .diagnostics
            .iter()
            .filter(|d| d.is_error())
            .map(|d| d.code)
            .collect()
    }

    fn warning_codes(&self) -> Vec<u32> {
        self.ctx
            .diagnostics
            .iter()
            .filter(|d| !d.is_error())
            .map(|d| d.code)
            .collect()
    }

    fn assert_clean(&self) {
        assert!(
            self.ctx.diagnostics.is_empty(),
            "unexpected diagnostics: {:?}",
            self.ctx.diagnostics
        );
    }

    /// The finalized, rendered type of the top-level property `name`.
    fn prop_type(&self, name: &str) -> String {
        let module = self.ctx.arena.get(self.root).module;
        let prop = self
            .ctx
            .arena
            .ids()
            .find(|&id| {
                self.ctx.arena.get(id).module == module
                    && matches!(&self.ctx.arena.get(id).kind, NodeKind::Prop(p) if p.name == name)
            })
            .unwrap_or_else(|| panic!("no property '{name}'"));
        self.ctx
            .display_type_of(prop)
            .unwrap_or_else(|| panic!("'{name}' has no type"))
    }
}

// ---------------------------------------------------------------------------
// End-to-end scenarios
// ---------------------------------------------------------------------------

#[test]
fn simple_let_binding() {
    let checked = check("let x: Int <- 1");
    checked.assert_clean();
    assert_eq!(checked.prop_type("x"), "@cst Int");
}

#[test]
fn unannotated_binding_is_inferred() {
    let checked = check("let x <- 1\nvar y <- 1.5\nlet s <- \"hi\"\nlet b <- true");
    checked.assert_clean();
    assert_eq!(checked.prop_type("x"), "@cst Int");
    assert_eq!(checked.prop_type("y"), "@mut Float");
    assert_eq!(checked.prop_type("s"), "@cst String");
    assert_eq!(checked.prop_type("b"), "@cst Bool");
}

#[test]
fn overloaded_call_dispatches_on_argument_type() {
    let checked = check(
        "fun f(x: Int) -> Int { return <- x }\n\
         fun f(x: Float) -> Float { return <- x }\n\
         let a <- f(1)\n\
         let b <- f(1.5)",
    );
    checked.assert_clean();
    assert_eq!(checked.prop_type("a"), "@cst Int");
    assert_eq!(checked.prop_type("b"), "@cst Float");

    // Each call-site identifier was narrowed to a single overload, and the
    // two calls chose different ones.
    let module = checked.ctx.arena.get(checked.root).module;
    let chosen: Vec<NodeId> = checked
        .ctx
        .arena
        .ids()
        .filter(|&id| {
            checked.ctx.arena.get(id).module == module
                && matches!(
                    &checked.ctx.arena.get(id).kind,
                    NodeKind::Ident(i) if i.name == "f"
                )
        })
        .map(|id| match &checked.ctx.arena.get(id).kind {
            NodeKind::Ident(i) => {
                assert_eq!(i.referred_decls.len(), 1, "overload not narrowed");
                i.referred_decls[0]
            }
            _ => unreachable!(),
        })
        .collect();
    assert_eq!(chosen.len(), 2);
    assert_ne!(chosen[0], chosen[1]);
}

#[test]
fn generic_identity_on_a_nominal_type() {
    let checked = check(
        "fun id<T>(x: T) -> T { return <- x }\n\
         struct Box<T> { let v: T }\n\
         let b <- Box<T = Int>(v <- 0)\n\
         let r <- id(b)",
    );
    checked.assert_clean();
    assert_eq!(checked.prop_type("b"), "@cst Box<T = Int>");
    assert_eq!(checked.prop_type("r"), "@cst Box<T = Int>");
}

#[test]
fn select_on_method() {
    let checked = check(
        "struct S { fun g() -> Int { return <- 0 } }\n\
         let s <- S()\n\
         let r <- s.g()",
    );
    checked.assert_clean();
    assert_eq!(checked.prop_type("s"), "@cst S");
    assert_eq!(checked.prop_type("r"), "@cst Int");
}

#[test]
fn equally_applicable_overloads_are_ambiguous() {
    let checked = check(
        "fun f(x: Int) -> Int { return <- x }\n\
         fun f(x: Int) -> Float { return <- 1.5 }\n\
         let a <- f(1)",
    );
    let errors = checked.error_codes();
    assert!(
        errors.contains(&codes::AMBIGUOUS_CONSTRAINT),
        "expected an ambiguous constraint, got {errors:?}"
    );
    assert!(
        errors.contains(&codes::AMBIGUOUS_FUNCTION_USE),
        "expected an ambiguous function use, got {errors:?}"
    );
}

#[test]
fn unbound_identifier_in_initializer() {
    let checked = check("let x <- y");
    assert_eq!(checked.error_codes(), vec![codes::UNBOUND_IDENTIFIER]);
}

// ---------------------------------------------------------------------------
// Operators
// ---------------------------------------------------------------------------

#[test]
fn operator_desugars_to_a_member_of_the_left_operand() {
    let checked = check("let a <- 1 + 2\nlet c <- 1 < 2\nlet n <- -1");
    checked.assert_clean();
    assert_eq!(checked.prop_type("a"), "@cst Int");
    assert_eq!(checked.prop_type("c"), "@cst Bool");
    assert_eq!(checked.prop_type("n"), "@cst Int");
}

#[test]
fn mismatched_operand_types_do_not_type() {
    let checked = check("let bad <- 1 + 1.5");
    assert!(
        checked.error_codes().contains(&codes::INCOMPATIBLE_TYPES),
        "expected incompatible types, got {:?}",
        checked.ctx.diagnostics
    );
}

#[test]
fn string_concatenation() {
    let checked = check("let s <- \"a\" + \"b\"");
    checked.assert_clean();
    assert_eq!(checked.prop_type("s"), "@cst String");
}

#[test]
fn reference_identity_types_bool_regardless_of_operands() {
    let checked = check("let t <- 1 === 1.5\nlet u <- \"a\" !== true");
    checked.assert_clean();
    assert_eq!(checked.prop_type("t"), "@cst Bool");
    assert_eq!(checked.prop_type("u"), "@cst Bool");
}

#[test]
fn logical_operators_on_bool() {
    let checked = check("let t <- true && false || !true");
    checked.assert_clean();
    assert_eq!(checked.prop_type("t"), "@cst Bool");
}

// ---------------------------------------------------------------------------
// Generics
// ---------------------------------------------------------------------------

#[test]
fn generic_call_infers_the_placeholder() {
    let checked = check("fun id<T>(x: T) -> T { return <- x }\nlet a <- id(1)");
    checked.assert_clean();
    assert_eq!(checked.prop_type("a"), "@cst Int");
}

#[test]
fn explicit_specialization_that_contradicts_the_argument_fails() {
    let checked = check("fun id<T>(x: T) -> T { return <- x }\nlet a <- id<T = Float>(1)");
    assert!(
        checked.error_codes().contains(&codes::INCOMPATIBLE_TYPES),
        "expected incompatible types, got {:?}",
        checked.ctx.diagnostics
    );
}

#[test]
fn superfluous_specialization_key_warns() {
    let checked = check(
        "struct Box<T> { let v: T }\n\
         let b <- Box<T = Int, U = Int>(v <- 1)",
    );
    assert!(checked.error_codes().is_empty(), "{:?}", checked.ctx.diagnostics);
    assert!(checked
        .warning_codes()
        .contains(&codes::SUPERFLUOUS_SPECIALIZATION_ARGUMENT));
}

// ---------------------------------------------------------------------------
// Conformance
// ---------------------------------------------------------------------------

#[test]
fn conforming_argument_passes_an_interface_parameter() {
    let checked = check(
        "interface I { }\n\
         struct S: I { }\n\
         fun f(x: I) -> I { return <- x }\n\
         let a <- f(S())",
    );
    checked.assert_clean();
    assert_eq!(checked.prop_type("a"), "@cst I");
}

#[test]
fn non_conforming_argument_is_rejected() {
    let checked = check(
        "interface I { }\n\
         struct S { }\n\
         fun f(x: I) { }\n\
         f(S())",
    );
    assert!(
        checked.error_codes().contains(&codes::INCOMPATIBLE_TYPES),
        "expected incompatible types, got {:?}",
        checked.ctx.diagnostics
    );
}

// ---------------------------------------------------------------------------
// Bindings and statements
// ---------------------------------------------------------------------------

#[test]
fn reassigning_an_immutable_binding_is_illegal() {
    let checked = check("let x <- 1\nx &- 2");
    assert!(checked
        .error_codes()
        .contains(&codes::ILLEGAL_REASSIGNMENT));
}

#[test]
fn reassigning_a_mutable_binding_is_fine() {
    let checked = check("var x <- 1\nx := 2\nx &- 3");
    checked.assert_clean();
}

#[test]
fn literal_lvalues_are_invalid() {
    let checked = check("1 := 2");
    assert!(checked.error_codes().contains(&codes::INVALID_LVALUE));
}

#[test]
fn conditions_must_be_bool() {
    let good = check("var i <- 0\nwhile i < 3 { i := i + 1 }\nif true { } else { }");
    good.assert_clean();

    let bad = check("if 1 { }");
    assert!(bad.error_codes().contains(&codes::INCOMPATIBLE_TYPES));
}

#[test]
fn member_property_assignment_through_self() {
    let checked = check(
        "struct Counter {\n\
           var count: Int <- 0\n\
           mutating fun bump() { self.count := self.count + 1 }\n\
         }",
    );
    checked.assert_clean();
}

// ---------------------------------------------------------------------------
// Casts and literals
// ---------------------------------------------------------------------------

#[test]
fn casts_and_subtype_tests() {
    let checked = check(
        "let a <- 1 as Anything\n\
         let b <- 1 as! Float\n\
         let c <- 1 is Float",
    );
    checked.assert_clean();
    assert_eq!(checked.prop_type("a"), "@cst Anything");
    assert_eq!(checked.prop_type("b"), "@cst Float");
    assert_eq!(checked.prop_type("c"), "@cst Bool");
}

#[test]
fn collection_literals_use_the_standard_generics() {
    let checked = check(
        "let xs <- [1, 2]\n\
         let ss <- {\"a\", \"b\"}\n\
         let m <- {1: \"one\"}",
    );
    checked.assert_clean();
    assert_eq!(checked.prop_type("xs"), "@cst Array<Element = Int>");
    assert_eq!(checked.prop_type("ss"), "@cst Set<Element = String>");
    assert_eq!(checked.prop_type("m"), "@cst Map<Key = Int, Value = String>");
}

#[test]
fn stdlib_print_accepts_anything() {
    let checked = check("fun shout() { print(\"hello\") }\nshout()");
    checked.assert_clean();
}

// ---------------------------------------------------------------------------
// Extensions
// ---------------------------------------------------------------------------

#[test]
fn extension_members_participate_in_member_lookup() {
    let checked = check(
        "struct P { }\n\
         extension P { fun size() -> Int { return <- 1 } }\n\
         let p <- P()\n\
         let n <- p.size()",
    );
    checked.assert_clean();
    assert_eq!(checked.prop_type("n"), "@cst Int");
}

#[test]
fn lambda_types_flow_through_bindings() {
    let checked = check(
        "fun apply(f: (x: Int) -> Int) -> Int { return <- f(1) }\n\
         let r <- apply(fun (x: Int) -> Int { return <- x + 1 })",
    );
    checked.assert_clean();
    assert_eq!(checked.prop_type("r"), "@cst Int");
}
