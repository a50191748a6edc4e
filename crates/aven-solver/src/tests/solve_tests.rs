use crate::constraint::{Choice, ConstraintKind, IdGen, Location};
use crate::intern::TypeInterner;
use crate::solve::{Solution, Solver, SolverContext};
use crate::tables::{ConformanceTable, TypeTable};
use crate::types::{ParamType, QualType, TypeId};
use aven_binder::{MemberTables, ModuleTable};
use aven_common::codes;
use aven_parser::{NodeArena, NodeId};
use rustc_hash::FxHashMap;

struct Fixture {
    arena: NodeArena,
    modules: ModuleTable,
    members: MemberTables,
    interner: TypeInterner,
    types: TypeTable,
    conformances: ConformanceTable,
    builtin_decls: FxHashMap<TypeId, NodeId>,
}

impl Fixture {
    fn new() -> Self {
        Fixture {
            arena: NodeArena::new(),
            modules: ModuleTable::new(),
            members: MemberTables::new(),
            interner: TypeInterner::new(),
            types: TypeTable::new(),
            conformances: ConformanceTable::new(),
            builtin_decls: FxHashMap::default(),
        }
    }

    fn ctx(&self) -> SolverContext<'_> {
        SolverContext {
            arena: &self.arena,
            modules: &self.modules,
            members: &self.members,
            interner: &self.interner,
            types: &self.types,
            conformances: &self.conformances,
            builtin_decls: &self.builtin_decls,
        }
    }
}

fn loc() -> Location {
    Location::new(NodeId(0))
}

fn solve_one(fixture: &Fixture, kinds: Vec<ConstraintKind>) -> Solution {
    let mut ids = IdGen::new();
    let constraints = kinds.into_iter().map(|k| ids.make(k, loc())).collect();
    let ctx = fixture.ctx();
    Solver::solve(&ctx, constraints, ids)
}

#[test]
fn equality_binds_variables() {
    let fixture = Fixture::new();
    let v = fixture.interner.fresh_var();
    let var = fixture.interner.var_id(v).unwrap();

    let solution = solve_one(&fixture, vec![ConstraintKind::Equality { t: v, u: TypeId::INT }]);
    assert!(solution.errors.is_empty());
    assert_eq!(solution.weight, 0);
    assert_eq!(solution.substitutions.get(&var), Some(&TypeId::INT));
}

#[test]
fn incompatible_ground_types_report_with_penalty() {
    let fixture = Fixture::new();
    let solution = solve_one(
        &fixture,
        vec![ConstraintKind::Equality {
            t: TypeId::INT,
            u: TypeId::FLOAT,
        }],
    );
    assert_eq!(solution.errors.len(), 1);
    assert_eq!(solution.errors[0].code, codes::INCOMPATIBLE_TYPES);
    assert!(solution.weight > 0);
}

#[test]
fn error_type_is_lenient() {
    let fixture = Fixture::new();
    let solution = solve_one(
        &fixture,
        vec![ConstraintKind::Equality {
            t: TypeId::ERROR,
            u: TypeId::FLOAT,
        }],
    );
    assert!(solution.errors.is_empty());
}

#[test]
fn function_decomposition_reports_label_mismatch_and_continues() {
    let fixture = Fixture::new();
    let interner = &fixture.interner;
    let v = interner.fresh_var();
    let f1 = interner.fun_type(
        Vec::new(),
        vec![ParamType::new(Some("a".into()), QualType::bare(TypeId::INT))],
        QualType::bare(v),
    );
    let f2 = interner.fun_type(
        Vec::new(),
        vec![ParamType::new(Some("b".into()), QualType::bare(TypeId::INT))],
        QualType::bare(TypeId::BOOL),
    );

    let solution = solve_one(&fixture, vec![ConstraintKind::Equality { t: f1, u: f2 }]);
    assert_eq!(solution.errors.len(), 1);
    assert_eq!(solution.errors[0].code, codes::INCORRECT_PARAMETER_LABEL);
    // The codomain equality still ran.
    let var = interner.var_id(v).unwrap();
    assert_eq!(solution.substitutions.get(&var), Some(&TypeId::BOOL));
}

#[test]
fn unlabeled_parameters_match_any_label() {
    let fixture = Fixture::new();
    let interner = &fixture.interner;
    let f1 = interner.fun_type(
        Vec::new(),
        vec![ParamType::unlabeled(QualType::bare(TypeId::INT))],
        QualType::bare(TypeId::INT),
    );
    let f2 = interner.fun_type(
        Vec::new(),
        vec![ParamType::new(Some("x".into()), QualType::bare(TypeId::INT))],
        QualType::bare(TypeId::INT),
    );
    let solution = solve_one(&fixture, vec![ConstraintKind::Equality { t: f1, u: f2 }]);
    assert!(solution.errors.is_empty(), "{:?}", solution.errors);
}

#[test]
fn conformance_to_anything_succeeds() {
    let fixture = Fixture::new();
    let solution = solve_one(
        &fixture,
        vec![ConstraintKind::Conformance {
            t: TypeId::INT,
            u: TypeId::ANYTHING,
        }],
    );
    assert!(solution.errors.is_empty());
}

#[test]
fn conformance_with_unknown_supertype_prefers_the_exact_type() {
    let fixture = Fixture::new();
    let v = fixture.interner.fresh_var();
    let var = fixture.interner.var_id(v).unwrap();
    let solution = solve_one(
        &fixture,
        vec![ConstraintKind::Conformance {
            t: TypeId::INT,
            u: v,
        }],
    );
    assert!(solution.errors.is_empty(), "{:?}", solution.errors);
    assert_eq!(solution.weight, 0);
    assert_eq!(solution.substitutions.get(&var), Some(&TypeId::INT));
}

#[test]
fn conformance_registry_is_consulted() {
    let mut fixture = Fixture::new();
    let iface = fixture.interner.interface_type(NodeId(1), &[]);
    let good = fixture.interner.struct_type(NodeId(2), &[]);
    let bad = fixture.interner.struct_type(NodeId(3), &[]);
    fixture.conformances.add(good, iface);

    let ok = solve_one(&fixture, vec![ConstraintKind::Conformance { t: good, u: iface }]);
    assert!(ok.errors.is_empty());

    let err = solve_one(&fixture, vec![ConstraintKind::Conformance { t: bad, u: iface }]);
    assert_eq!(err.errors.len(), 1);
    assert_eq!(err.errors[0].code, codes::INCOMPATIBLE_TYPES);
}

#[test]
fn stalled_constraints_become_irreducible() {
    let fixture = Fixture::new();
    let v1 = fixture.interner.fresh_var();
    let v2 = fixture.interner.fresh_var();
    let solution = solve_one(&fixture, vec![ConstraintKind::Conformance { t: v1, u: v2 }]);
    assert_eq!(solution.errors.len(), 1);
    assert_eq!(solution.errors[0].code, codes::IRREDUCIBLE_CONSTRAINT);
    assert!(solution.weight >= 1000);
}

#[test]
fn branch_and_bound_returns_the_minimum_weight_solution() {
    let fixture = Fixture::new();
    let v = fixture.interner.fresh_var();
    let var = fixture.interner.var_id(v).unwrap();

    let mut ids = IdGen::new();
    let cheap = Choice {
        constraints: vec![ids.make(ConstraintKind::Equality { t: v, u: TypeId::INT }, loc())],
        weight: 0,
    };
    let dear = Choice {
        constraints: vec![ids.make(
            ConstraintKind::Equality {
                t: v,
                u: TypeId::FLOAT,
            },
            loc(),
        )],
        weight: 1,
    };
    let disjunction = ids.make(
        ConstraintKind::Disjunction {
            choices: vec![dear, cheap],
        },
        loc(),
    );
    let ctx = fixture.ctx();
    let solution = Solver::solve(&ctx, vec![disjunction], ids);
    assert!(solution.errors.is_empty());
    assert_eq!(solution.weight, 0);
    assert_eq!(solution.substitutions.get(&var), Some(&TypeId::INT));
}

#[test]
fn tied_solutions_that_disagree_are_ambiguous() {
    let fixture = Fixture::new();
    let v = fixture.interner.fresh_var();
    let var = fixture.interner.var_id(v).unwrap();

    let mut ids = IdGen::new();
    let a = Choice {
        constraints: vec![ids.make(ConstraintKind::Equality { t: v, u: TypeId::INT }, loc())],
        weight: 0,
    };
    let b = Choice {
        constraints: vec![ids.make(
            ConstraintKind::Equality {
                t: v,
                u: TypeId::FLOAT,
            },
            loc(),
        )],
        weight: 0,
    };
    let disjunction = ids.make(ConstraintKind::Disjunction { choices: vec![a, b] }, loc());
    let ctx = fixture.ctx();
    let solution = Solver::solve(&ctx, vec![disjunction], ids);
    assert_eq!(solution.errors.len(), 1);
    assert_eq!(solution.errors[0].code, codes::AMBIGUOUS_CONSTRAINT);
    // The disagreeing binding is dropped from the combined substitution.
    assert_eq!(solution.substitutions.get(&var), None);
}

#[test]
fn tied_identical_solutions_are_not_ambiguous() {
    let fixture = Fixture::new();
    let v = fixture.interner.fresh_var();

    let mut ids = IdGen::new();
    let a = Choice {
        constraints: vec![ids.make(ConstraintKind::Equality { t: v, u: TypeId::INT }, loc())],
        weight: 0,
    };
    let b = Choice {
        constraints: vec![ids.make(ConstraintKind::Equality { t: v, u: TypeId::INT }, loc())],
        weight: 0,
    };
    let disjunction = ids.make(ConstraintKind::Disjunction { choices: vec![a, b] }, loc());
    let ctx = fixture.ctx();
    let solution = Solver::solve(&ctx, vec![disjunction], ids);
    assert!(solution.errors.is_empty());
}

#[test]
fn specialization_applies_bound_generic_bindings() {
    let fixture = Fixture::new();
    let interner = &fixture.interner;
    let ph_decl = NodeId(50);
    let ph = interner.placeholder(ph_decl);
    let generic = interner.fun_type(
        vec![ph_decl],
        vec![ParamType::new(Some("x".into()), QualType::bare(ph))],
        QualType::bare(ph),
    );
    let bound = interner.bound_generic(generic, vec![(ph, TypeId::INT)]);

    let arg = interner.fresh_var();
    let ret = interner.fresh_var();
    let call = interner.fun_type(
        Vec::new(),
        vec![ParamType::unlabeled(QualType::bare(arg))],
        QualType::bare(ret),
    );

    let solution = solve_one(
        &fixture,
        vec![ConstraintKind::Specialization { t: call, u: bound }],
    );
    assert!(solution.errors.is_empty(), "{:?}", solution.errors);
    let arg_var = interner.var_id(arg).unwrap();
    let ret_var = interner.var_id(ret).unwrap();
    assert_eq!(solution.substitutions.get(&arg_var), Some(&TypeId::INT));
    assert_eq!(solution.substitutions.get(&ret_var), Some(&TypeId::INT));
}

#[test]
fn type_member_resolves_nested_type_declarations() {
    use aven_common::Span;
    use aven_parser::{ModuleDecl, ModuleId, NominalDecl, NominalKind, Node, NodeKind};

    let mut fixture = Fixture::new();
    let (_, module_id) = fixture.modules.create(aven_binder::ModuleIdent::Local("m".into()));

    let node = |decl_ctx, kind| Node {
        span: Span::dummy(),
        module: ModuleId(0),
        decl_ctx,
        kind,
    };
    let root = fixture.arena.alloc(node(
        None,
        NodeKind::Module(ModuleDecl {
            name: "m".into(),
            stmts: Vec::new(),
        }),
    ));
    let outer = fixture.arena.alloc(node(
        Some(root),
        NodeKind::Nominal(NominalDecl {
            kind: NominalKind::Struct,
            name: "A".into(),
            placeholders: Vec::new(),
            conformances: Vec::new(),
            members: Vec::new(),
        }),
    ));
    let nested = fixture.arena.alloc(node(
        Some(outer),
        NodeKind::Nominal(NominalDecl {
            kind: NominalKind::Struct,
            name: "B".into(),
            placeholders: Vec::new(),
            conformances: Vec::new(),
            members: Vec::new(),
        }),
    ));
    if let NodeKind::Module(m) = &mut fixture.arena.get_mut(root).kind {
        m.stmts.push(outer);
    }
    if let NodeKind::Nominal(n) = &mut fixture.arena.get_mut(outer).kind {
        n.members.push(nested);
    }
    fixture.modules.set_root(module_id, root);

    let outer_ty = fixture.interner.struct_type(outer, &[]);
    let nested_ty = fixture.interner.struct_type(nested, &[]);
    fixture
        .types
        .set(nested, crate::types::QualType::cst(nested_ty));

    let v = fixture.interner.fresh_var();
    let var = fixture.interner.var_id(v).unwrap();
    let solution = solve_one(
        &fixture,
        vec![ConstraintKind::TypeMember {
            t: v,
            owner: outer_ty,
            member: String::from("B"),
        }],
    );
    assert!(solution.errors.is_empty(), "{:?}", solution.errors);
    assert_eq!(solution.substitutions.get(&var), Some(&nested_ty));
}

#[test]
fn specialization_on_a_non_function_fails() {
    let fixture = Fixture::new();
    let call = fixture.interner.fun_type(
        Vec::new(),
        Vec::new(),
        QualType::bare(fixture.interner.fresh_var()),
    );
    let solution = solve_one(
        &fixture,
        vec![ConstraintKind::Specialization {
            t: call,
            u: TypeId::INT,
        }],
    );
    assert_eq!(solution.errors.len(), 1);
    assert_eq!(solution.errors[0].code, codes::INCOMPATIBLE_TYPES);
}
