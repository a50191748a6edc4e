use crate::intern::TypeInterner;
use crate::subst::SubstitutionTable;
use crate::types::{ParamType, QualType, TypeFlags, TypeId};

#[test]
fn get_walks_variable_chains_to_a_fixed_point() {
    let interner = TypeInterner::new();
    let v0 = interner.fresh_var();
    let v1 = interner.fresh_var();
    let mut subst = SubstitutionTable::new();
    subst.set(v1, interner.var_id(v0).unwrap());
    subst.set(TypeId::INT, interner.var_id(v1).unwrap());

    assert_eq!(subst.get(&interner, v0), TypeId::INT);
    assert_eq!(subst.get(&interner, v1), TypeId::INT);
    // A free variable walks to itself.
    let free = interner.fresh_var();
    assert_eq!(subst.get(&interner, free), free);
}

#[test]
fn reify_substitutes_deeply() {
    let interner = TypeInterner::new();
    let v = interner.fresh_var();
    let fun = interner.fun_type(
        Vec::new(),
        vec![ParamType::unlabeled(QualType::bare(v))],
        QualType::bare(v),
    );
    let mut subst = SubstitutionTable::new();
    subst.set(TypeId::INT, interner.var_id(v).unwrap());

    let reified = subst.reify(&interner, fun);
    let expected = interner.fun_type(
        Vec::new(),
        vec![ParamType::unlabeled(QualType::bare(TypeId::INT))],
        QualType::bare(TypeId::INT),
    );
    assert_eq!(reified, expected);
    assert!(!interner.flags(reified).contains(TypeFlags::HAS_VAR));
}

#[test]
fn canonized_is_idempotent() {
    let interner = TypeInterner::new();
    let v0 = interner.fresh_var();
    let v1 = interner.fresh_var();
    let v2 = interner.fresh_var();
    let mut subst = SubstitutionTable::new();
    subst.set(v1, interner.var_id(v0).unwrap());
    subst.set(v2, interner.var_id(v1).unwrap());
    subst.set(TypeId::FLOAT, interner.var_id(v2).unwrap());

    let canonized = subst.canonized(&interner);
    // Every binding is fully walked.
    for (_, ty) in &canonized {
        assert!(!interner.flags(*ty).contains(TypeFlags::HAS_VAR));
    }

    // Re-canonizing an installed canonical table changes nothing.
    let mut second = SubstitutionTable::new();
    second.install(&canonized);
    assert_eq!(second.canonized(&interner), canonized);
}

#[test]
fn no_binding_contains_its_own_variable_after_walking() {
    // Occurs-check absence for well-typed inputs: a solved system's
    // canonized bindings never mention the bound variable.
    let interner = TypeInterner::new();
    let v0 = interner.fresh_var();
    let v1 = interner.fresh_var();
    let fun = interner.fun_type(
        Vec::new(),
        vec![ParamType::unlabeled(QualType::bare(v1))],
        QualType::bare(TypeId::BOOL),
    );
    let mut subst = SubstitutionTable::new();
    subst.set(fun, interner.var_id(v0).unwrap());
    subst.set(TypeId::STRING, interner.var_id(v1).unwrap());

    let canonized = subst.canonized(&interner);
    for (var, ty) in canonized {
        let reified_again = {
            let mut t = SubstitutionTable::new();
            t.set(ty, var);
            t.reify(&interner, ty)
        };
        assert_eq!(reified_again, ty, "binding for ${} is not ground-stable", var.0);
    }
}
