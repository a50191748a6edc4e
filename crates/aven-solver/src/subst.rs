//! The substitution table.
//!
//! A partial map from inference variables to types. Disjunction branches
//! clone the table (the copy-on-write discipline of the solver): a branch
//! that fails simply drops its clone, the winning branch's table becomes the
//! parent's.

use crate::intern::TypeInterner;
use crate::types::{ParamType, TyVarId, TypeFlags, TypeId, TypeKey};
use rustc_hash::FxHashMap;

#[derive(Debug, Clone, Default)]
pub struct SubstitutionTable {
    map: FxHashMap<TyVarId, TypeId>,
}

impl SubstitutionTable {
    pub fn new() -> Self {
        SubstitutionTable::default()
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Walk variables to a fixed point: follow bindings until a non-variable
    /// type or a free variable is reached.
    pub fn get(&self, interner: &TypeInterner, ty: TypeId) -> TypeId {
        let mut current = ty;
        // The chain cannot revisit a variable on well-formed tables; guard
        // against pathological input with a step bound.
        let mut steps = 0usize;
        while let TypeKey::Var(v) = interner.lookup(current) {
            match self.map.get(&v) {
                Some(&next) => current = next,
                None => break,
            }
            steps += 1;
            if steps > self.map.len() {
                break;
            }
        }
        current
    }

    /// Bind `var` to `ty`. A pre-existing disagreeing binding is a solver
    /// bug.
    pub fn set(&mut self, ty: TypeId, var: TyVarId) {
        if let Some(&existing) = self.map.get(&var) {
            debug_assert_eq!(
                existing, ty,
                "rebinding ${} to a different type",
                var.0
            );
            return;
        }
        self.map.insert(var, ty);
    }

    pub fn binding(&self, var: TyVarId) -> Option<TypeId> {
        self.map.get(&var).copied()
    }

    /// Apply the table deeply: every bound variable inside `ty` is replaced
    /// by its walked binding.
    pub fn reify(&self, interner: &TypeInterner, ty: TypeId) -> TypeId {
        let walked = self.get(interner, ty);
        if !interner.flags(walked).contains(TypeFlags::HAS_VAR) {
            return walked;
        }
        match interner.lookup(walked) {
            TypeKey::Var(_) => walked,
            TypeKey::Fun {
                placeholders,
                dom,
                codom,
            } => {
                let dom = dom
                    .into_iter()
                    .map(|param| ParamType {
                        label: param.label,
                        qual: param.qual.with_ty(self.reify(interner, param.qual.ty)),
                    })
                    .collect();
                let codom = codom.with_ty(self.reify(interner, codom.ty));
                interner.fun_type(placeholders, dom, codom)
            }
            TypeKey::BoundGeneric { base, bindings } => {
                let bindings = bindings
                    .into_iter()
                    .map(|(ph, value)| (ph, self.reify(interner, value)))
                    .collect();
                interner.bound_generic(self.reify(interner, base), bindings)
            }
            TypeKey::Kind(inner) => interner.kind(self.reify(interner, inner)),
            _ => walked,
        }
    }

    /// Materialize the fixed point for every bound variable.
    pub fn canonized(&self, interner: &TypeInterner) -> FxHashMap<TyVarId, TypeId> {
        self.map
            .keys()
            .map(|&var| (var, self.reify(interner, interner.var_type(var))))
            .collect()
    }

    /// Adopt every binding of `other` (a child branch's table).
    pub fn adopt(&mut self, other: SubstitutionTable) {
        self.map = other.map;
    }

    /// Install canonized bindings, e.g. the agreed part of tied disjunction
    /// branches.
    pub fn install(&mut self, bindings: &FxHashMap<TyVarId, TypeId>) {
        for (&var, &ty) in bindings {
            self.map.insert(var, ty);
        }
    }
}
