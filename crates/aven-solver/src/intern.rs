//! Hash-consed type storage.
//!
//! The interner owns every constructible type and guarantees that
//! structurally equal types share one [`TypeId`]. It also issues fresh
//! inference variables (strictly increasing ids) and records, per nominal
//! declaration, the generic parameters a use site must open.
//!
//! Interior mutability keeps the intern methods usable behind a shared
//! reference, as the solver interns types mid-solve; the compiler is
//! single-threaded by contract.

use crate::types::{BuiltinKind, ParamType, QualType, TyVarId, TypeFlags, TypeId, TypeKey};
use aven_parser::{NodeArena, NodeId, Qualifiers};
use rustc_hash::{FxHashMap, FxHashSet};
use std::cell::RefCell;

#[derive(Debug, Default)]
struct Inner {
    keys: Vec<TypeKey>,
    flags: Vec<TypeFlags>,
    map: FxHashMap<TypeKey, TypeId>,
    next_var: u32,
    /// Generic parameter declarations of each nominal type declaration.
    nominal_placeholders: FxHashMap<NodeId, Vec<NodeId>>,
}

#[derive(Debug)]
pub struct TypeInterner {
    inner: RefCell<Inner>,
}

impl Default for TypeInterner {
    fn default() -> Self {
        TypeInterner::new()
    }
}

impl TypeInterner {
    pub fn new() -> Self {
        let interner = TypeInterner {
            inner: RefCell::new(Inner::default()),
        };
        // Pre-register the well-known types in `TypeId` constant order.
        for kind in [
            BuiltinKind::Anything,
            BuiltinKind::Nothing,
            BuiltinKind::Bool,
            BuiltinKind::Int,
            BuiltinKind::Float,
            BuiltinKind::String,
            BuiltinKind::Assignment,
        ] {
            interner.intern(TypeKey::Builtin(kind));
        }
        interner.intern(TypeKey::Error);
        debug_assert_eq!(interner.lookup(TypeId::ERROR), TypeKey::Error);
        interner
    }

    fn intern(&self, key: TypeKey) -> TypeId {
        if let Some(&id) = self.inner.borrow().map.get(&key) {
            return id;
        }
        let flags = self.flags_for(&key);
        let mut inner = self.inner.borrow_mut();
        let id = TypeId(inner.keys.len() as u32);
        inner.keys.push(key.clone());
        inner.flags.push(flags);
        inner.map.insert(key, id);
        id
    }

    fn flags_for(&self, key: &TypeKey) -> TypeFlags {
        match key {
            TypeKey::Var(_) => TypeFlags::HAS_VAR,
            TypeKey::Placeholder(_) => TypeFlags::HAS_PLACEHOLDER,
            TypeKey::Builtin(_) | TypeKey::Error => TypeFlags::empty(),
            TypeKey::Fun {
                placeholders,
                dom,
                codom,
            } => {
                let mut flags = self.flags(codom.ty);
                for param in dom {
                    flags |= self.flags(param.qual.ty);
                }
                if !placeholders.is_empty() {
                    flags |= TypeFlags::HAS_PLACEHOLDER | TypeFlags::CAN_BE_OPENED;
                }
                flags
            }
            TypeKey::Interface(decl) | TypeKey::Struct(decl) | TypeKey::Union(decl) => {
                let openable = self
                    .inner
                    .borrow()
                    .nominal_placeholders
                    .get(decl)
                    .is_some_and(|p| !p.is_empty());
                if openable {
                    TypeFlags::CAN_BE_OPENED
                } else {
                    TypeFlags::empty()
                }
            }
            TypeKey::BoundGeneric { base, bindings } => {
                let mut flags = self.flags(*base) - TypeFlags::CAN_BE_OPENED;
                for (_, value) in bindings {
                    flags |= self.flags(*value);
                }
                if !self.open_placeholders_of(key).is_empty() {
                    flags |= TypeFlags::CAN_BE_OPENED;
                }
                flags
            }
            TypeKey::Kind(inner) => self.flags(*inner),
        }
    }

    pub fn lookup(&self, id: TypeId) -> TypeKey {
        self.inner.borrow().keys[id.0 as usize].clone()
    }

    pub fn flags(&self, id: TypeId) -> TypeFlags {
        self.inner.borrow().flags[id.0 as usize]
    }

    pub fn len(&self) -> usize {
        self.inner.borrow().keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.borrow().keys.is_empty()
    }

    // -----------------------------------------------------------------------
    // Constructors
    // -----------------------------------------------------------------------

    /// A fresh inference variable; ids are strictly increasing.
    pub fn fresh_var(&self) -> TypeId {
        let var = {
            let mut inner = self.inner.borrow_mut();
            let v = inner.next_var;
            inner.next_var += 1;
            TyVarId(v)
        };
        self.intern(TypeKey::Var(var))
    }

    pub fn var_id(&self, id: TypeId) -> Option<TyVarId> {
        match self.lookup(id) {
            TypeKey::Var(v) => Some(v),
            _ => None,
        }
    }

    /// The interned type of an already-issued variable.
    pub fn var_type(&self, var: TyVarId) -> TypeId {
        self.intern(TypeKey::Var(var))
    }

    pub fn is_var(&self, id: TypeId) -> bool {
        matches!(self.lookup(id), TypeKey::Var(_))
    }

    pub fn placeholder(&self, decl: NodeId) -> TypeId {
        self.intern(TypeKey::Placeholder(decl))
    }

    pub fn fun_type(
        &self,
        placeholders: Vec<NodeId>,
        dom: Vec<ParamType>,
        codom: QualType,
    ) -> TypeId {
        self.intern(TypeKey::Fun {
            placeholders,
            dom,
            codom,
        })
    }

    /// Intern a nominal type, registering its generic parameters for later
    /// opening.
    pub fn struct_type(&self, decl: NodeId, placeholders: &[NodeId]) -> TypeId {
        self.register_placeholders(decl, placeholders);
        self.intern(TypeKey::Struct(decl))
    }

    pub fn union_type(&self, decl: NodeId, placeholders: &[NodeId]) -> TypeId {
        self.register_placeholders(decl, placeholders);
        self.intern(TypeKey::Union(decl))
    }

    pub fn interface_type(&self, decl: NodeId, placeholders: &[NodeId]) -> TypeId {
        self.register_placeholders(decl, placeholders);
        self.intern(TypeKey::Interface(decl))
    }

    fn register_placeholders(&self, decl: NodeId, placeholders: &[NodeId]) {
        self.inner
            .borrow_mut()
            .nominal_placeholders
            .entry(decl)
            .or_insert_with(|| placeholders.to_vec());
    }

    pub fn placeholders_of_decl(&self, decl: NodeId) -> Vec<NodeId> {
        self.inner
            .borrow()
            .nominal_placeholders
            .get(&decl)
            .cloned()
            .unwrap_or_default()
    }

    /// A specialization snapshot. Bindings are normalized (sorted by
    /// placeholder id); an empty binding map is the base itself, and binding
    /// an already-bound generic merges, newer bindings winning.
    pub fn bound_generic(&self, base: TypeId, bindings: Vec<(TypeId, TypeId)>) -> TypeId {
        if bindings.is_empty() {
            return base;
        }
        let (base, mut merged) = match self.lookup(base) {
            TypeKey::BoundGeneric {
                base: inner_base,
                bindings: inner_bindings,
            } => (inner_base, inner_bindings),
            _ => (base, Vec::new()),
        };
        for (ph, value) in bindings {
            match merged.iter_mut().find(|(p, _)| *p == ph) {
                Some(slot) => slot.1 = value,
                None => merged.push((ph, value)),
            }
        }
        merged.sort_by_key(|(ph, _)| *ph);
        self.intern(TypeKey::BoundGeneric {
            base,
            bindings: merged,
        })
    }

    /// The metatype of `of`, for types used as values.
    pub fn kind(&self, of: TypeId) -> TypeId {
        self.intern(TypeKey::Kind(of))
    }

    // -----------------------------------------------------------------------
    // Opening and substitution
    // -----------------------------------------------------------------------

    /// Placeholder declarations a use site of `ty` must still bind.
    pub fn open_placeholders(&self, ty: TypeId) -> Vec<NodeId> {
        let key = self.lookup(ty);
        self.open_placeholders_of(&key)
    }

    fn open_placeholders_of(&self, key: &TypeKey) -> Vec<NodeId> {
        match key {
            TypeKey::Fun { placeholders, .. } => placeholders.clone(),
            TypeKey::Struct(decl) | TypeKey::Union(decl) | TypeKey::Interface(decl) => {
                self.placeholders_of_decl(*decl)
            }
            TypeKey::BoundGeneric { base, bindings } => {
                let bound: FxHashSet<NodeId> = bindings
                    .iter()
                    .filter_map(|(ph, _)| match self.lookup(*ph) {
                        TypeKey::Placeholder(decl) => Some(decl),
                        _ => None,
                    })
                    .collect();
                self.open_placeholders(*base)
                    .into_iter()
                    .filter(|decl| !bound.contains(decl))
                    .collect()
            }
            TypeKey::Kind(inner) => self.open_placeholders(*inner),
            _ => Vec::new(),
        }
    }

    /// Every placeholder declaration mentioned anywhere inside `ty`.
    pub fn placeholders_in(&self, ty: TypeId) -> FxHashSet<NodeId> {
        let mut acc = FxHashSet::default();
        self.collect_placeholders(ty, &mut acc);
        acc
    }

    fn collect_placeholders(&self, ty: TypeId, acc: &mut FxHashSet<NodeId>) {
        if !self
            .flags(ty)
            .intersects(TypeFlags::HAS_PLACEHOLDER | TypeFlags::CAN_BE_OPENED)
        {
            return;
        }
        match self.lookup(ty) {
            TypeKey::Placeholder(decl) => {
                acc.insert(decl);
            }
            TypeKey::Fun {
                placeholders,
                dom,
                codom,
            } => {
                acc.extend(placeholders);
                for param in dom {
                    self.collect_placeholders(param.qual.ty, acc);
                }
                self.collect_placeholders(codom.ty, acc);
            }
            TypeKey::Struct(decl) | TypeKey::Union(decl) | TypeKey::Interface(decl) => {
                acc.extend(self.placeholders_of_decl(decl));
            }
            TypeKey::BoundGeneric { base, bindings } => {
                self.collect_placeholders(base, acc);
                for (_, value) in bindings {
                    self.collect_placeholders(value, acc);
                }
            }
            TypeKey::Kind(inner) => self.collect_placeholders(inner, acc),
            _ => {}
        }
    }

    /// Replace placeholders by the mapped types, never mutating the
    /// original. Qualifiers of the surrounding slots are preserved.
    pub fn substitute(&self, ty: TypeId, mapping: &FxHashMap<NodeId, TypeId>) -> TypeId {
        if mapping.is_empty()
            || !self
                .flags(ty)
                .intersects(TypeFlags::HAS_PLACEHOLDER | TypeFlags::CAN_BE_OPENED)
        {
            return ty;
        }
        match self.lookup(ty) {
            TypeKey::Placeholder(decl) => mapping.get(&decl).copied().unwrap_or(ty),
            TypeKey::Fun {
                placeholders,
                dom,
                codom,
            } => {
                let remaining: Vec<NodeId> = placeholders
                    .into_iter()
                    .filter(|decl| !mapping.contains_key(decl))
                    .collect();
                let dom = dom
                    .into_iter()
                    .map(|param| ParamType {
                        label: param.label,
                        qual: param.qual.with_ty(self.substitute(param.qual.ty, mapping)),
                    })
                    .collect();
                let codom = codom.with_ty(self.substitute(codom.ty, mapping));
                self.fun_type(remaining, dom, codom)
            }
            TypeKey::BoundGeneric { base, bindings } => {
                let bindings = bindings
                    .into_iter()
                    .map(|(ph, value)| (ph, self.substitute(value, mapping)))
                    .collect();
                self.bound_generic(base, bindings)
            }
            TypeKey::Kind(inner) => self.kind(self.substitute(inner, mapping)),
            _ => ty,
        }
    }

    /// Open `ty` for a use site: bind its unbound placeholders with the
    /// explicit arguments, a fresh variable apiece otherwise. Nominal types
    /// are wrapped in a `BoundGeneric`; function types substitute through.
    ///
    /// Returns the opened type and the number of placeholders that received
    /// a fresh variable (the disjunction weight of the use).
    pub fn open(
        &self,
        ty: TypeId,
        explicit: &FxHashMap<NodeId, TypeId>,
    ) -> (TypeId, u32) {
        let open = self.open_placeholders(ty);
        if open.is_empty() {
            return (ty, 0);
        }
        let mut mapping = FxHashMap::default();
        let mut fresh = 0u32;
        for decl in &open {
            match explicit.get(decl) {
                Some(&value) => {
                    mapping.insert(*decl, value);
                }
                None => {
                    mapping.insert(*decl, self.fresh_var());
                    fresh += 1;
                }
            }
        }
        let opened = match self.lookup(ty) {
            TypeKey::Fun { .. } => self.substitute(ty, &mapping),
            TypeKey::Struct(_) | TypeKey::Union(_) | TypeKey::Interface(_) => {
                let bindings = open
                    .iter()
                    .map(|&decl| (self.placeholder(decl), mapping[&decl]))
                    .collect();
                self.bound_generic(ty, bindings)
            }
            TypeKey::BoundGeneric { .. } => {
                let bindings = open
                    .iter()
                    .map(|&decl| (self.placeholder(decl), mapping[&decl]))
                    .collect();
                let substituted = self.substitute(ty, &mapping);
                self.bound_generic(substituted, bindings)
            }
            TypeKey::Kind(inner) => {
                let (opened_inner, _) = self.open(inner, explicit);
                self.kind(opened_inner)
            }
            _ => ty,
        };
        (opened, fresh)
    }

    // -----------------------------------------------------------------------
    // Display
    // -----------------------------------------------------------------------

    pub fn display(&self, arena: &NodeArena, ty: TypeId) -> String {
        match self.lookup(ty) {
            TypeKey::Var(v) => format!("${}", v.0),
            TypeKey::Placeholder(decl) => arena
                .get(decl)
                .name()
                .unwrap_or("<placeholder>")
                .to_string(),
            TypeKey::Builtin(kind) => kind.name().to_string(),
            TypeKey::Fun {
                placeholders,
                dom,
                codom,
            } => {
                let mut out = String::new();
                if !placeholders.is_empty() {
                    out.push('<');
                    for (i, decl) in placeholders.iter().enumerate() {
                        if i > 0 {
                            out.push_str(", ");
                        }
                        out.push_str(arena.get(*decl).name().unwrap_or("_"));
                    }
                    out.push('>');
                }
                out.push('(');
                for (i, param) in dom.iter().enumerate() {
                    if i > 0 {
                        out.push_str(", ");
                    }
                    if let Some(label) = &param.label {
                        out.push_str(label);
                        out.push_str(": ");
                    }
                    out.push_str(&self.display_qual(arena, &param.qual));
                }
                out.push_str(") -> ");
                out.push_str(&self.display_qual(arena, &codom));
                out
            }
            TypeKey::Interface(decl) | TypeKey::Struct(decl) | TypeKey::Union(decl) => arena
                .get(decl)
                .name()
                .unwrap_or("<type>")
                .to_string(),
            TypeKey::BoundGeneric { base, bindings } => {
                let mut out = self.display(arena, base);
                out.push('<');
                for (i, (ph, value)) in bindings.iter().enumerate() {
                    if i > 0 {
                        out.push_str(", ");
                    }
                    out.push_str(&self.display(arena, *ph));
                    out.push_str(" = ");
                    out.push_str(&self.display(arena, *value));
                }
                out.push('>');
                out
            }
            TypeKey::Kind(inner) => format!("{}.Kind", self.display(arena, inner)),
            TypeKey::Error => String::from("<error>"),
        }
    }

    pub fn display_qual(&self, arena: &NodeArena, qual: &QualType) -> String {
        let mut out = String::new();
        if qual.quals.contains(Qualifiers::CST) {
            out.push_str("@cst ");
        }
        if qual.quals.contains(Qualifiers::MUT) {
            out.push_str("@mut ");
        }
        out.push_str(&self.display(arena, qual.ty));
        out
    }
}
