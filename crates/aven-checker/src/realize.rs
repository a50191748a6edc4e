//! The type realizer.
//!
//! Materializes a semantic type for every declaration and type signature.
//! Idempotent: nodes that already have a type are left untouched, so
//! signatures may realize the declarations they refer to on demand
//! (cyclic nominal graphs terminate because a nominal's own type is
//! recorded before its members are visited).

use aven_common::{codes, Diagnostic};
use aven_parser::{
    FunKind, NodeArena, NodeId, NodeKind, NominalKind, Qualifiers,
};
use aven_solver::{ConformanceTable, ParamType, QualType, TypeId, TypeInterner, TypeTable};
use rustc_hash::FxHashMap;
use tracing::trace;

pub fn realize_module(
    arena: &NodeArena,
    interner: &TypeInterner,
    types: &mut TypeTable,
    conformances: &mut ConformanceTable,
    root: NodeId,
) -> Vec<Diagnostic> {
    let file = match &arena.get(root).kind {
        NodeKind::Module(m) => m.name.clone(),
        _ => String::from("<module>"),
    };
    let mut realizer = Realizer {
        arena,
        interner,
        types,
        conformances,
        file,
        diagnostics: Vec::new(),
    };
    realizer.visit(root);
    realizer.diagnostics
}

struct Realizer<'a> {
    arena: &'a NodeArena,
    interner: &'a TypeInterner,
    types: &'a mut TypeTable,
    conformances: &'a mut ConformanceTable,
    file: String,
    diagnostics: Vec<Diagnostic>,
}

impl<'a> Realizer<'a> {
    /// Walk the tree realizing every declaration and signature on the way.
    fn visit(&mut self, id: NodeId) {
        match self.arena.get(id).kind.clone() {
            NodeKind::Module(m) => {
                for stmt in m.stmts {
                    self.visit(stmt);
                }
            }
            NodeKind::Prop(_) => {
                self.realize_prop(id);
                if let NodeKind::Prop(p) = &self.arena.get(id).kind {
                    if let Some(init) = p.initializer {
                        self.visit(init);
                    }
                }
            }
            NodeKind::Fun(f) => {
                self.realize_fun(id);
                for param in &f.params {
                    let default = match &self.arena.get(*param).kind {
                        NodeKind::Param(p) => p.default,
                        _ => None,
                    };
                    if let Some(default) = default {
                        self.visit(default);
                    }
                }
                if let Some(body) = f.body {
                    self.visit(body);
                }
            }
            NodeKind::Nominal(n) => {
                self.realize_nominal(id);
                for member in n.members {
                    self.visit(member);
                }
            }
            NodeKind::Extension(e) => {
                for member in e.members {
                    self.visit(member);
                }
            }
            NodeKind::BuiltinType(b) => {
                self.realize_builtin(id);
                for member in b.members {
                    self.visit(member);
                }
            }
            NodeKind::Brace(b) => {
                for stmt in b.stmts {
                    self.visit(stmt);
                }
            }
            NodeKind::Binding(b) => {
                self.visit(b.lvalue);
                self.visit(b.rvalue);
            }
            NodeKind::Return(r) => {
                if let Some(value) = r.value {
                    self.visit(value);
                }
            }
            NodeKind::If(i) => {
                self.visit(i.condition);
                self.visit(i.then_body);
                if let Some(else_body) = i.else_body {
                    self.visit(else_body);
                }
            }
            NodeKind::While(w) => {
                self.visit(w.condition);
                self.visit(w.body);
            }
            NodeKind::Ident(ident) => {
                for (_, sign) in ident.spec_args {
                    self.realize_sign(sign);
                }
            }
            NodeKind::Select(s) => {
                self.visit(s.owner);
            }
            NodeKind::ImplicitSelect(_) => {}
            NodeKind::Infix(i) => {
                self.visit(i.lhs);
                self.visit(i.rhs);
            }
            NodeKind::Prefix(p) => self.visit(p.operand),
            NodeKind::Call(c) => {
                self.visit(c.callee);
                for arg in c.args {
                    self.visit(arg);
                }
            }
            NodeKind::CallArg(a) => self.visit(a.value),
            NodeKind::Lambda(_) => {
                self.realize_lambda(id);
                if let NodeKind::Lambda(l) = &self.arena.get(id).kind {
                    let body = l.body;
                    self.visit(body);
                }
            }
            NodeKind::Cast(c) => {
                self.visit(c.operand);
                self.realize_sign(c.sign);
            }
            NodeKind::SubtypeTest(t) => {
                self.visit(t.operand);
                self.realize_sign(t.sign);
            }
            NodeKind::Paren(p) => self.visit(p.inner),
            NodeKind::ArrayLit(a) => {
                for element in a.elements {
                    self.visit(element);
                }
            }
            NodeKind::SetLit(s) => {
                for element in s.elements {
                    self.visit(element);
                }
            }
            NodeKind::MapLit(m) => {
                for (key, value) in m.entries {
                    self.visit(key);
                    self.visit(value);
                }
            }
            NodeKind::QualSign(_)
            | NodeKind::IdentSign(_)
            | NodeKind::NestedIdentSign(_)
            | NodeKind::ImplicitNestedIdentSign(_)
            | NodeKind::FunSign(_)
            | NodeKind::ParamSign(_)
            | NodeKind::InvalidSign => {
                self.realize_sign(id);
            }
            NodeKind::GenericParam(_) => {
                self.realize_generic_param(id);
            }
            NodeKind::Param(_) => {
                self.realize_param(id);
            }
            NodeKind::NullLit
            | NodeKind::BoolLit(_)
            | NodeKind::IntLit(_)
            | NodeKind::FloatLit(_)
            | NodeKind::StringLit(_)
            | NodeKind::InvalidExpr => {}
        }
    }

    // -----------------------------------------------------------------------
    // Declarations
    // -----------------------------------------------------------------------

    fn realize_generic_param(&mut self, id: NodeId) {
        if self.types.contains(id) {
            return;
        }
        let ph = self.interner.placeholder(id);
        self.types.set(id, QualType::bare(ph));
    }

    fn realize_builtin(&mut self, id: NodeId) {
        if self.types.contains(id) {
            return;
        }
        let NodeKind::BuiltinType(b) = &self.arena.get(id).kind else {
            return;
        };
        let ty = match b.name.as_str() {
            "Anything" => TypeId::ANYTHING,
            "Nothing" => TypeId::NOTHING,
            "Bool" => TypeId::BOOL,
            "Int" => TypeId::INT,
            "Float" => TypeId::FLOAT,
            "String" => TypeId::STRING,
            _ => TypeId::ERROR,
        };
        self.types.set(id, QualType::cst(ty));
    }

    fn realize_nominal(&mut self, id: NodeId) {
        if self.types.contains(id) {
            return;
        }
        let NodeKind::Nominal(n) = self.arena.get(id).kind.clone() else {
            return;
        };
        let ty = match n.kind {
            NominalKind::Struct => self.interner.struct_type(id, &n.placeholders),
            NominalKind::Union => self.interner.union_type(id, &n.placeholders),
            NominalKind::Interface => self.interner.interface_type(id, &n.placeholders),
        };
        self.types.set(id, QualType::cst(ty));
        trace!(name = n.name, "realized nominal type");

        for ph in &n.placeholders {
            self.realize_generic_param(*ph);
        }
        for conf in &n.conformances {
            let iface = self.realize_ident_sign(*conf);
            if iface != TypeId::ERROR {
                self.conformances.add(ty, iface);
            }
        }
    }

    fn realize_prop(&mut self, id: NodeId) {
        if self.types.contains(id) {
            return;
        }
        let NodeKind::Prop(p) = self.arena.get(id).kind.clone() else {
            return;
        };
        let default_quals = if p.mutable {
            Qualifiers::MUT
        } else {
            Qualifiers::CST
        };
        let qual = match p.sign {
            Some(sign) => {
                let realized = self.realize_sign(sign);
                let quals = if realized.quals.is_empty() {
                    default_quals
                } else {
                    realized.quals
                };
                QualType::new(quals, realized.ty)
            }
            None => QualType::new(default_quals, self.interner.fresh_var()),
        };
        self.types.set(id, qual);
    }

    fn realize_param(&mut self, id: NodeId) -> QualType {
        if let Some(existing) = self.types.get(id) {
            return existing;
        }
        let NodeKind::Param(p) = self.arena.get(id).kind.clone() else {
            return QualType::cst(TypeId::ERROR);
        };
        let qual = match p.sign {
            Some(sign) => {
                let realized = self.realize_sign(sign);
                let quals = if realized.quals.is_empty() {
                    Qualifiers::CST
                } else {
                    realized.quals
                };
                QualType::new(quals, realized.ty)
            }
            None => QualType::cst(self.interner.fresh_var()),
        };
        self.types.set(id, qual);
        qual
    }

    /// The canonical `Self` type of a nominal declaration: the bare type for
    /// monomorphic ones, a `BoundGeneric` closing each placeholder over
    /// itself for generics.
    fn self_type(&mut self, type_decl: NodeId) -> TypeId {
        self.realize_type_decl(type_decl);
        let base = self
            .types
            .get(type_decl)
            .map(|q| q.ty)
            .unwrap_or(TypeId::ERROR);
        let placeholders = self.interner.placeholders_of_decl(type_decl);
        if placeholders.is_empty() {
            return base;
        }
        let bindings = placeholders
            .iter()
            .map(|&ph| {
                let ph_ty = self.interner.placeholder(ph);
                (ph_ty, ph_ty)
            })
            .collect();
        self.interner.bound_generic(base, bindings)
    }

    fn realize_type_decl(&mut self, decl: NodeId) {
        match &self.arena.get(decl).kind {
            NodeKind::Nominal(_) => self.realize_nominal(decl),
            NodeKind::BuiltinType(_) => self.realize_builtin(decl),
            NodeKind::GenericParam(_) => self.realize_generic_param(decl),
            _ => {}
        }
    }

    /// The type declaration a member belongs to. Walks through extension
    /// contexts to the extended declaration.
    fn owning_type_decl(&self, id: NodeId) -> Option<NodeId> {
        let mut current = self.arena.get(id).decl_ctx;
        while let Some(ctx) = current {
            match &self.arena.get(ctx).kind {
                NodeKind::Nominal(_) | NodeKind::BuiltinType(_) => return Some(ctx),
                NodeKind::Extension(e) => {
                    return match &self.arena.get(e.extended).kind {
                        NodeKind::IdentSign(s) => s.referred_decl,
                        _ => None,
                    };
                }
                _ => {}
            }
            current = self.arena.get(ctx).decl_ctx;
        }
        None
    }

    fn realize_fun(&mut self, id: NodeId) {
        if self.types.contains(id) {
            return;
        }
        let NodeKind::Fun(f) = self.arena.get(id).kind.clone() else {
            return;
        };
        for ph in &f.placeholders {
            self.realize_generic_param(*ph);
        }

        let mut dom = Vec::new();
        for &param in &f.params {
            let qual = self.realize_param(param);
            let label = match &self.arena.get(param).kind {
                NodeKind::Param(p) => p.label.clone().or_else(|| Some(p.name.clone())),
                _ => None,
            };
            dom.push(ParamType::new(label, qual));
        }

        let codom = match f.codom {
            Some(sign) => self.realize_sign(sign),
            None => QualType::bare(TypeId::NOTHING),
        };

        let fun_ty = match f.kind {
            FunKind::Regular => self.interner.fun_type(f.placeholders.clone(), dom, codom),
            FunKind::Constructor => {
                let type_decl = self.owning_type_decl(id);
                let self_ty = type_decl
                    .map(|d| self.self_type(d))
                    .unwrap_or(TypeId::ERROR);
                let quals = if f.mutating {
                    Qualifiers::MUT
                } else {
                    Qualifiers::CST
                };
                // A constructor's body initializes the instance it builds.
                if let Some(self_decl) = f.self_decl {
                    self.types
                        .set(self_decl, QualType::new(Qualifiers::MUT, self_ty));
                }
                self.interner
                    .fun_type(f.placeholders.clone(), dom, QualType::new(quals, self_ty))
            }
            FunKind::Method | FunKind::Destructor => {
                let type_decl = self.owning_type_decl(id);
                let self_ty = type_decl
                    .map(|d| self.self_type(d))
                    .unwrap_or(TypeId::ERROR);
                let self_quals = if f.mutating {
                    Qualifiers::MUT
                } else {
                    Qualifiers::CST
                };
                let inner = match f.kind {
                    FunKind::Destructor => self.interner.fun_type(
                        Vec::new(),
                        Vec::new(),
                        QualType::bare(TypeId::NOTHING),
                    ),
                    _ => self.interner.fun_type(Vec::new(), dom, codom),
                };
                if let Some(self_decl) = f.self_decl {
                    self.types
                        .set(self_decl, QualType::new(self_quals, self_ty));
                }
                self.interner.fun_type(
                    f.placeholders.clone(),
                    vec![ParamType::unlabeled(QualType::new(self_quals, self_ty))],
                    QualType::bare(inner),
                )
            }
        };
        self.types.set(id, QualType::cst(fun_ty));
    }

    fn realize_lambda(&mut self, id: NodeId) {
        if self.types.contains(id) {
            return;
        }
        let NodeKind::Lambda(l) = self.arena.get(id).kind.clone() else {
            return;
        };
        let mut dom = Vec::new();
        for &param in &l.params {
            let qual = self.realize_param(param);
            let label = match &self.arena.get(param).kind {
                NodeKind::Param(p) => p.label.clone().or_else(|| Some(p.name.clone())),
                _ => None,
            };
            dom.push(ParamType::new(label, qual));
        }
        let codom = match l.codom {
            Some(sign) => self.realize_sign(sign),
            // Unlike named functions, a lambda's codomain is inferred from
            // its returns when unannotated.
            None => QualType::bare(self.interner.fresh_var()),
        };
        let fun_ty = self.interner.fun_type(Vec::new(), dom, codom);
        self.types.set(id, QualType::bare(fun_ty));
    }

    // -----------------------------------------------------------------------
    // Signatures
    // -----------------------------------------------------------------------

    fn realize_sign(&mut self, id: NodeId) -> QualType {
        if let Some(existing) = self.types.get(id) {
            return existing;
        }
        let qual = match self.arena.get(id).kind.clone() {
            NodeKind::QualSign(q) => {
                let inner = match q.sign {
                    Some(sign) => self.realize_sign(sign).ty,
                    None => TypeId::ERROR,
                };
                QualType::new(q.quals, inner)
            }
            NodeKind::IdentSign(_) => QualType::bare(self.realize_ident_sign(id)),
            NodeKind::NestedIdentSign(n) => {
                QualType::bare(self.realize_ident_sign(n.ownee))
            }
            NodeKind::ImplicitNestedIdentSign(n) => {
                QualType::bare(self.realize_ident_sign(n.ownee))
            }
            NodeKind::FunSign(f) => {
                let mut dom = Vec::new();
                for &param in &f.params {
                    let NodeKind::ParamSign(p) = self.arena.get(param).kind.clone() else {
                        continue;
                    };
                    let qual = self.realize_sign(p.sign);
                    let param_ty = ParamType::new(p.label, qual);
                    self.types.set(param, qual);
                    dom.push(param_ty);
                }
                let codom = self.realize_sign(f.codom);
                QualType::bare(self.interner.fun_type(Vec::new(), dom, codom))
            }
            _ => QualType::bare(TypeId::ERROR),
        };
        self.types.set(id, qual);
        qual
    }

    /// Realize an identifier signature to a bare type, opening generic
    /// references with their explicit specialization arguments or fresh
    /// variables.
    fn realize_ident_sign(&mut self, id: NodeId) -> TypeId {
        if let Some(existing) = self.types.get(id) {
            return existing.ty;
        }
        let NodeKind::IdentSign(sign) = self.arena.get(id).kind.clone() else {
            return TypeId::ERROR;
        };
        let Some(decl) = sign.referred_decl else {
            // The binder already reported this identifier.
            self.types.set(id, QualType::bare(TypeId::ERROR));
            return TypeId::ERROR;
        };
        self.realize_type_decl(decl);
        let base = self
            .types
            .get(decl)
            .map(|q| q.ty)
            .unwrap_or(TypeId::ERROR);

        let placeholders = self.interner.placeholders_of_decl(decl);
        if placeholders.is_empty() {
            // Superfluous specialization arguments on a monomorphic type.
            for (key, arg_sign) in &sign.spec_args {
                self.realize_sign(*arg_sign);
                self.warn_superfluous_key(id, key);
            }
            self.types.set(id, QualType::bare(base));
            return base;
        }

        // Inside the declared type itself, a bare reference is the canonical
        // self type, not a fresh opening.
        if sign.spec_args.is_empty() && self.is_enclosing_type(id, decl) {
            let self_ty = self.self_type(decl);
            self.types.set(id, QualType::bare(self_ty));
            return self_ty;
        }

        let mut explicit: FxHashMap<NodeId, TypeId> = FxHashMap::default();
        for (key, arg_sign) in &sign.spec_args {
            let arg_ty = self.realize_sign(*arg_sign).ty;
            let target = placeholders
                .iter()
                .copied()
                .find(|&ph| self.arena.get(ph).name() == Some(key.as_str()));
            match target {
                Some(ph) => {
                    explicit.insert(ph, arg_ty);
                }
                None => self.warn_superfluous_key(id, key),
            }
        }

        let bindings = placeholders
            .iter()
            .map(|&ph| {
                let ph_ty = self.interner.placeholder(ph);
                let value = explicit
                    .get(&ph)
                    .copied()
                    .unwrap_or_else(|| self.interner.fresh_var());
                (ph_ty, value)
            })
            .collect();
        let ty = self.interner.bound_generic(base, bindings);
        self.types.set(id, QualType::bare(ty));
        ty
    }

    fn is_enclosing_type(&self, node: NodeId, decl: NodeId) -> bool {
        let mut current = self.arena.get(node).decl_ctx;
        while let Some(ctx) = current {
            if ctx == decl {
                return true;
            }
            // An extension body is inside the type it extends.
            if let NodeKind::Extension(e) = &self.arena.get(ctx).kind {
                if let NodeKind::IdentSign(s) = &self.arena.get(e.extended).kind {
                    if s.referred_decl == Some(decl) {
                        return true;
                    }
                }
            }
            current = self.arena.get(ctx).decl_ctx;
        }
        false
    }

    fn warn_superfluous_key(&mut self, sign: NodeId, key: &str) {
        let span = self.arena.get(sign).span;
        self.diagnostics.push(Diagnostic::warning(
            self.file.clone(),
            span,
            format!("superfluous specialization argument '{key}'"),
            codes::SUPERFLUOUS_SPECIALIZATION_ARGUMENT,
        ));
    }
}
