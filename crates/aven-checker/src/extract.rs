//! The constraint extractor.
//!
//! Walks the realized AST and emits the typing constraints the solver
//! reduces. Every expression receives its own (possibly fresh-variable)
//! type before the constraints tying it to other types are emitted.

use crate::context::CollectionTypes;
use aven_common::{codes, Diagnostic};
use aven_parser::{
    BindingOp, FunKind, NodeArena, NodeId, NodeKind,
};
use aven_solver::{
    Choice, Constraint, ConstraintKind, IdGen, Location, ParamType, PathComponent, QualType,
    TypeId, TypeInterner, TypeTable,
};
use rustc_hash::FxHashMap;
use tracing::trace;

pub struct Extraction {
    pub constraints: Vec<Constraint>,
    pub ids: IdGen,
    pub diagnostics: Vec<Diagnostic>,
}

pub fn extract_module(
    arena: &NodeArena,
    interner: &TypeInterner,
    types: &mut TypeTable,
    collections: &CollectionTypes,
    root: NodeId,
) -> Extraction {
    let file = match &arena.get(root).kind {
        NodeKind::Module(m) => m.name.clone(),
        _ => String::from("<module>"),
    };
    let mut extractor = Extractor {
        arena,
        interner,
        types,
        collections,
        file,
        ids: IdGen::new(),
        constraints: Vec::new(),
        diagnostics: Vec::new(),
        codomains: Vec::new(),
    };
    extractor.visit(root);
    Extraction {
        constraints: extractor.constraints,
        ids: extractor.ids,
        diagnostics: extractor.diagnostics,
    }
}

struct Extractor<'a> {
    arena: &'a NodeArena,
    interner: &'a TypeInterner,
    types: &'a mut TypeTable,
    collections: &'a CollectionTypes,
    file: String,
    ids: IdGen,
    constraints: Vec<Constraint>,
    diagnostics: Vec<Diagnostic>,
    /// Codomain types of the enclosing functions, innermost last.
    codomains: Vec<TypeId>,
}

impl<'a> Extractor<'a> {
    fn emit(&mut self, kind: ConstraintKind, loc: Location) {
        let constraint = self.ids.make(kind, loc);
        self.constraints.push(constraint);
    }

    fn diagnostic(&mut self, node: NodeId, message: String, code: u32) {
        let span = self.arena.get(node).span;
        self.diagnostics
            .push(Diagnostic::error(self.file.clone(), span, message, code));
    }

    // -----------------------------------------------------------------------
    // Statements and declarations
    // -----------------------------------------------------------------------

    fn visit(&mut self, id: NodeId) {
        match self.arena.get(id).kind.clone() {
            NodeKind::Module(m) => {
                for stmt in m.stmts {
                    self.visit(stmt);
                }
            }
            NodeKind::Prop(p) => {
                if let Some(init) = p.initializer {
                    let init_ty = self.visit_expr(init);
                    let prop_ty = self
                        .types
                        .get(id)
                        .map(|q| q.ty)
                        .unwrap_or(TypeId::ERROR);
                    let loc = Location::new(id).appending(PathComponent::Initializer);
                    if p.sign.is_some() {
                        self.emit(
                            ConstraintKind::Conformance {
                                t: init_ty,
                                u: prop_ty,
                            },
                            loc,
                        );
                    } else {
                        self.emit(
                            ConstraintKind::Equality {
                                t: init_ty,
                                u: prop_ty,
                            },
                            loc,
                        );
                    }
                }
            }
            NodeKind::Fun(f) => {
                for &param in &f.params {
                    let default = match &self.arena.get(param).kind {
                        NodeKind::Param(p) => p.default,
                        _ => None,
                    };
                    if let Some(default) = default {
                        let default_ty = self.visit_expr(default);
                        let param_ty = self
                            .types
                            .get(param)
                            .map(|q| q.ty)
                            .unwrap_or(TypeId::ERROR);
                        let annotated = matches!(
                            &self.arena.get(param).kind,
                            NodeKind::Param(p) if p.sign.is_some()
                        );
                        let loc = Location::new(param).appending(PathComponent::Initializer);
                        if annotated {
                            self.emit(
                                ConstraintKind::Conformance {
                                    t: default_ty,
                                    u: param_ty,
                                },
                                loc,
                            );
                        } else {
                            self.emit(
                                ConstraintKind::Equality {
                                    t: default_ty,
                                    u: param_ty,
                                },
                                loc,
                            );
                        }
                    }
                }
                if let Some(body) = f.body {
                    let codom = self.fun_codomain(id, f.kind);
                    self.codomains.push(codom);
                    self.visit(body);
                    self.codomains.pop();
                }
            }
            NodeKind::Nominal(n) => {
                for member in n.members {
                    self.visit(member);
                }
            }
            NodeKind::Extension(e) => {
                for member in e.members {
                    self.visit(member);
                }
            }
            NodeKind::BuiltinType(_) => {}
            NodeKind::Brace(b) => {
                for stmt in b.stmts {
                    self.visit_stmt(stmt);
                }
            }
            other => {
                // Module-level expression statements.
                let _ = other;
                self.visit_stmt(id);
            }
        }
    }

    fn visit_stmt(&mut self, id: NodeId) {
        match self.arena.get(id).kind.clone() {
            NodeKind::Binding(b) => self.visit_binding(id, &b),
            NodeKind::Return(r) => {
                if let Some(value) = r.value {
                    let value_ty = self.visit_expr(value);
                    let codom = self.codomains.last().copied().unwrap_or(TypeId::NOTHING);
                    self.emit(
                        ConstraintKind::Conformance {
                            t: value_ty,
                            u: codom,
                        },
                        Location::new(id).appending(PathComponent::Return),
                    );
                }
            }
            NodeKind::If(i) => {
                let cond_ty = self.visit_expr(i.condition);
                self.emit(
                    ConstraintKind::Equality {
                        t: cond_ty,
                        u: TypeId::BOOL,
                    },
                    Location::new(id).appending(PathComponent::Condition),
                );
                self.visit(i.then_body);
                if let Some(else_body) = i.else_body {
                    self.visit_stmt(else_body);
                }
            }
            NodeKind::While(w) => {
                let cond_ty = self.visit_expr(w.condition);
                self.emit(
                    ConstraintKind::Equality {
                        t: cond_ty,
                        u: TypeId::BOOL,
                    },
                    Location::new(id).appending(PathComponent::Condition),
                );
                self.visit(w.body);
            }
            NodeKind::Prop(_) | NodeKind::Fun(_) | NodeKind::Nominal(_) | NodeKind::Extension(_) => {
                self.visit(id)
            }
            NodeKind::Brace(_) => self.visit(id),
            _ => {
                self.visit_expr(id);
            }
        }
    }

    fn visit_binding(&mut self, id: NodeId, binding: &aven_parser::BindingStmt) {
        self.check_lvalue(binding.lvalue, binding.op);
        let lvalue_ty = self.visit_expr(binding.lvalue);
        let rvalue_ty = self.visit_expr(binding.rvalue);
        self.emit(
            ConstraintKind::Conformance {
                t: rvalue_ty,
                u: lvalue_ty,
            },
            Location::new(id).appending(PathComponent::Binding),
        );
        // Binding statements are typed by the well-known assignment type.
        self.types.set(id, QualType::bare(TypeId::ASSIGNMENT));
    }

    /// Reassignment legality is syntactic: an lvalue must be an identifier
    /// or a member select, and rebinding an immutable binding is an error.
    fn check_lvalue(&mut self, lvalue: NodeId, op: BindingOp) {
        match &self.arena.get(lvalue).kind {
            NodeKind::Ident(ident) => {
                if ident.referred_decls.len() == 1 {
                    let decl = ident.referred_decls[0];
                    let immutable = match &self.arena.get(decl).kind {
                        NodeKind::Prop(p) => !p.mutable,
                        NodeKind::Param(_) => true,
                        _ => false,
                    };
                    if immutable {
                        self.diagnostic(
                            lvalue,
                            format!(
                                "cannot reassign '{}' with '{}': the binding is immutable",
                                ident.name,
                                op.symbol()
                            ),
                            codes::ILLEGAL_REASSIGNMENT,
                        );
                    }
                }
            }
            NodeKind::Select(_) | NodeKind::ImplicitSelect(_) => {}
            NodeKind::Paren(p) => self.check_lvalue(p.inner, op),
            _ => {
                self.diagnostic(
                    lvalue,
                    "expression cannot appear on the left of a binding operator".to_string(),
                    codes::INVALID_LVALUE,
                );
            }
        }
    }

    fn fun_codomain(&self, fun: NodeId, kind: FunKind) -> TypeId {
        let Some(fun_ty) = self.types.get(fun).map(|q| q.ty) else {
            return TypeId::ERROR;
        };
        let codom_of = |ty: TypeId| match self.interner.lookup(ty) {
            aven_solver::TypeKey::Fun { codom, .. } => codom.ty,
            _ => TypeId::ERROR,
        };
        match kind {
            FunKind::Regular | FunKind::Constructor => codom_of(fun_ty),
            FunKind::Method | FunKind::Destructor => codom_of(codom_of(fun_ty)),
        }
    }

    // -----------------------------------------------------------------------
    // Expressions
    // -----------------------------------------------------------------------

    fn visit_expr(&mut self, id: NodeId) -> TypeId {
        let ty = match self.arena.get(id).kind.clone() {
            NodeKind::BoolLit(_) => TypeId::BOOL,
            NodeKind::IntLit(_) => TypeId::INT,
            NodeKind::FloatLit(_) => TypeId::FLOAT,
            NodeKind::StringLit(_) => TypeId::STRING,
            // `null` is the bottom type: it conforms to every binding.
            NodeKind::NullLit => TypeId::NOTHING,
            NodeKind::Ident(_) => self.visit_ident(id),
            NodeKind::Select(s) => {
                let owner_ty = self.visit_expr(s.owner);
                let member = match &self.arena.get(s.ownee).kind {
                    NodeKind::Ident(i) => i.name.clone(),
                    _ => String::from("<error>"),
                };
                let ownee_ty = self.interner.fresh_var();
                self.types.set(s.ownee, QualType::bare(ownee_ty));
                self.emit(
                    ConstraintKind::ValueMember {
                        t: ownee_ty,
                        owner: owner_ty,
                        member,
                    },
                    Location::new(id).appending(PathComponent::Select),
                );
                ownee_ty
            }
            NodeKind::ImplicitSelect(s) => {
                let member = match &self.arena.get(s.ownee).kind {
                    NodeKind::Ident(i) => i.name.clone(),
                    _ => String::from("<error>"),
                };
                let ownee_ty = self.interner.fresh_var();
                self.types.set(s.ownee, QualType::bare(ownee_ty));
                self.emit(
                    ConstraintKind::ValueMember {
                        t: ownee_ty,
                        owner: ownee_ty,
                        member,
                    },
                    Location::new(id).appending(PathComponent::Select),
                );
                ownee_ty
            }
            NodeKind::Infix(i) => self.visit_infix(id, &i),
            NodeKind::Prefix(p) => {
                let operand_ty = self.visit_expr(p.operand);
                let op_name = match &self.arena.get(p.op).kind {
                    NodeKind::Ident(ident) => ident.name.clone(),
                    _ => String::from("<error>"),
                };
                let result = self.interner.fresh_var();
                let op_ty = self
                    .interner
                    .fun_type(Vec::new(), Vec::new(), QualType::bare(result));
                self.types.set(p.op, QualType::bare(op_ty));
                self.emit(
                    ConstraintKind::ValueMember {
                        t: op_ty,
                        owner: operand_ty,
                        member: op_name,
                    },
                    Location::new(id).appending(PathComponent::PrefixOp),
                );
                result
            }
            NodeKind::Call(c) => self.visit_call(id, &c),
            NodeKind::CallArg(a) => {
                let value_ty = self.visit_expr(a.value);
                self.types.set(id, QualType::bare(value_ty));
                value_ty
            }
            NodeKind::Lambda(l) => {
                let lambda_ty = self
                    .types
                    .get(id)
                    .map(|q| q.ty)
                    .unwrap_or(TypeId::ERROR);
                let codom = match self.interner.lookup(lambda_ty) {
                    aven_solver::TypeKey::Fun { codom, .. } => codom.ty,
                    _ => TypeId::ERROR,
                };
                self.codomains.push(codom);
                self.visit(l.body);
                self.codomains.pop();
                lambda_ty
            }
            NodeKind::Cast(c) => {
                let operand_ty = self.visit_expr(c.operand);
                let target = self
                    .types
                    .get(c.sign)
                    .map(|q| q.ty)
                    .unwrap_or(TypeId::ERROR);
                if !c.forced {
                    self.emit(
                        ConstraintKind::Conformance {
                            t: operand_ty,
                            u: target,
                        },
                        Location::new(id),
                    );
                }
                target
            }
            NodeKind::SubtypeTest(t) => {
                self.visit_expr(t.operand);
                TypeId::BOOL
            }
            NodeKind::Paren(p) => self.visit_expr(p.inner),
            NodeKind::ArrayLit(a) => {
                let element = self.interner.fresh_var();
                for &elem in &a.elements {
                    let elem_ty = self.visit_expr(elem);
                    self.emit(
                        ConstraintKind::Conformance {
                            t: elem_ty,
                            u: element,
                        },
                        Location::new(elem),
                    );
                }
                self.collection_type(self.collections.array.map(|(b, p)| (b, vec![p])), &[element])
            }
            NodeKind::SetLit(s) => {
                let element = self.interner.fresh_var();
                for &elem in &s.elements {
                    let elem_ty = self.visit_expr(elem);
                    self.emit(
                        ConstraintKind::Conformance {
                            t: elem_ty,
                            u: element,
                        },
                        Location::new(elem),
                    );
                }
                self.collection_type(self.collections.set.map(|(b, p)| (b, vec![p])), &[element])
            }
            NodeKind::MapLit(m) => {
                let key_ty = self.interner.fresh_var();
                let value_ty = self.interner.fresh_var();
                for &(key, value) in &m.entries {
                    let k = self.visit_expr(key);
                    let v = self.visit_expr(value);
                    self.emit(
                        ConstraintKind::Conformance { t: k, u: key_ty },
                        Location::new(key),
                    );
                    self.emit(
                        ConstraintKind::Conformance { t: v, u: value_ty },
                        Location::new(value),
                    );
                }
                self.collection_type(
                    self.collections.map.map(|(b, k, v)| (b, vec![k, v])),
                    &[key_ty, value_ty],
                )
            }
            NodeKind::InvalidExpr => TypeId::ERROR,
            _ => TypeId::ERROR,
        };
        self.types.set(id, QualType::bare(ty));
        ty
    }

    fn collection_type(
        &self,
        shape: Option<(TypeId, Vec<NodeId>)>,
        args: &[TypeId],
    ) -> TypeId {
        let Some((base, placeholders)) = shape else {
            return TypeId::ERROR;
        };
        let bindings = placeholders
            .iter()
            .zip(args.iter())
            .map(|(&ph, &arg)| (self.interner.placeholder(ph), arg))
            .collect();
        self.interner.bound_generic(base, bindings)
    }

    fn visit_infix(&mut self, id: NodeId, infix: &aven_parser::InfixExpr) -> TypeId {
        let op_name = match &self.arena.get(infix.op).kind {
            NodeKind::Ident(ident) => ident.name.clone(),
            _ => String::from("<error>"),
        };
        let lhs_ty = self.visit_expr(infix.lhs);
        let rhs_ty = self.visit_expr(infix.rhs);

        // Reference identity compares any two values and never constrains
        // its operands.
        if op_name == "===" || op_name == "!==" {
            let op_ty = self.interner.fun_type(
                Vec::new(),
                vec![
                    ParamType::unlabeled(QualType::bare(TypeId::ANYTHING)),
                    ParamType::unlabeled(QualType::bare(TypeId::ANYTHING)),
                ],
                QualType::bare(TypeId::BOOL),
            );
            self.types.set(infix.op, QualType::bare(op_ty));
            return TypeId::BOOL;
        }

        // Any other operator is a method of the left operand.
        let rhs_param = self.interner.fresh_var();
        let result = self.interner.fresh_var();
        let op_ty = self.interner.fun_type(
            Vec::new(),
            vec![ParamType::unlabeled(QualType::bare(rhs_param))],
            QualType::bare(result),
        );
        self.types.set(infix.op, QualType::bare(op_ty));
        self.emit(
            ConstraintKind::Conformance {
                t: rhs_ty,
                u: rhs_param,
            },
            Location::new(id).appending(PathComponent::InfixRhs),
        );
        self.emit(
            ConstraintKind::ValueMember {
                t: op_ty,
                owner: lhs_ty,
                member: op_name,
            },
            Location::new(id).appending(PathComponent::InfixOp),
        );
        result
    }

    fn visit_call(&mut self, id: NodeId, call: &aven_parser::CallExpr) -> TypeId {
        let callee_ty = self.visit_expr(call.callee);
        let mut dom = Vec::new();
        for (i, &arg) in call.args.iter().enumerate() {
            let (label, value) = match &self.arena.get(arg).kind {
                NodeKind::CallArg(a) => (a.label.clone(), a.value),
                _ => (None, arg),
            };
            let arg_ty = self.visit_expr(value);
            self.types.set(arg, QualType::bare(arg_ty));
            let slot = self.interner.fresh_var();
            dom.push(ParamType::new(label, QualType::bare(slot)));
            self.emit(
                ConstraintKind::Conformance {
                    t: arg_ty,
                    u: slot,
                },
                Location::new(id).appending(PathComponent::Parameter(i)),
            );
        }
        let result = self.interner.fresh_var();
        let call_ty = self
            .interner
            .fun_type(Vec::new(), dom, QualType::bare(result));
        self.emit(
            ConstraintKind::Specialization {
                t: call_ty,
                u: callee_ty,
            },
            Location::new(id).appending(PathComponent::Call),
        );
        result
    }

    /// An identifier's type is a fresh variable constrained by a disjunction
    /// with one choice per candidate declaration.
    fn visit_ident(&mut self, id: NodeId) -> TypeId {
        let NodeKind::Ident(ident) = self.arena.get(id).kind.clone() else {
            return TypeId::ERROR;
        };
        if ident.referred_decls.is_empty() {
            // Unbound; already reported by the binder.
            return TypeId::ERROR;
        }
        let ident_ty = self.interner.fresh_var();
        let loc = Location::new(id).appending(PathComponent::Identifier);

        let mut choices: Vec<Choice> = Vec::new();
        for &decl in &ident.referred_decls {
            let Some(decl_qual) = self.types.get(decl) else {
                continue;
            };
            let explicit = self.explicit_spec_args(&ident, decl);

            if self.arena.get(decl).is_type_decl() {
                let (opened, fresh) = self.interner.open(decl_qual.ty, &explicit);
                let kind_ty = self.interner.kind(opened);
                // Constructor interpretation first, to prefer it.
                choices.push(Choice {
                    constraints: vec![self.ids.make(
                        ConstraintKind::ValueMember {
                            t: ident_ty,
                            owner: kind_ty,
                            member: String::from("new"),
                        },
                        loc.clone(),
                    )],
                    weight: fresh,
                });
                choices.push(Choice {
                    constraints: vec![self.ids.make(
                        ConstraintKind::Equality {
                            t: ident_ty,
                            u: kind_ty,
                        },
                        loc.clone(),
                    )],
                    weight: fresh,
                });
                continue;
            }

            let (opened, fresh) = self.interner.open(decl_qual.ty, &explicit);
            // A method referred to through the implicit `self` exposes its
            // bound type; the self parameter is the enclosing type itself.
            let target = if self.implicit_self_reference(id, decl) {
                match self.interner.lookup(opened) {
                    aven_solver::TypeKey::Fun { dom, codom, .. } if dom.len() == 1 => codom.ty,
                    _ => opened,
                }
            } else {
                opened
            };
            choices.push(Choice {
                constraints: vec![self.ids.make(
                    ConstraintKind::Equality {
                        t: ident_ty,
                        u: target,
                    },
                    loc.clone(),
                )],
                weight: fresh,
            });
        }

        match choices.len() {
            0 => return TypeId::ERROR,
            1 if choices[0].weight == 0 => {
                let only = choices.pop().expect("one choice");
                self.constraints.extend(only.constraints);
            }
            _ => {
                trace!(name = ident.name, count = choices.len(), "identifier disjunction");
                self.emit(ConstraintKind::Disjunction { choices }, loc);
            }
        }
        ident_ty
    }

    /// True when `decl` is a method (or destructor) of a type enclosing the
    /// identifier, reached without an explicit owner.
    fn implicit_self_reference(&self, ident: NodeId, decl: NodeId) -> bool {
        let method_like = matches!(
            &self.arena.get(decl).kind,
            NodeKind::Fun(f) if matches!(f.kind, FunKind::Method | FunKind::Destructor)
        );
        if !method_like {
            return false;
        }
        match (self.owning_type_decl(decl), self.owning_type_decl(ident)) {
            (Some(owner), Some(site)) => owner == site,
            _ => false,
        }
    }

    /// The type declaration a node belongs to, walking through extensions to
    /// the extended declaration.
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

    /// Match use-site specialization arguments to the declaration's
    /// placeholders by name. Unknown keys are diagnosed at dispatch.
    fn explicit_spec_args(
        &mut self,
        ident: &aven_parser::IdentExpr,
        decl: NodeId,
    ) -> FxHashMap<NodeId, TypeId> {
        let mut explicit = FxHashMap::default();
        if ident.spec_args.is_empty() {
            return explicit;
        }
        let placeholders: Vec<NodeId> = match &self.arena.get(decl).kind {
            NodeKind::Nominal(n) => n.placeholders.clone(),
            NodeKind::Fun(f) => f.placeholders.clone(),
            _ => Vec::new(),
        };
        for (key, sign) in &ident.spec_args {
            let Some(arg_ty) = self.types.get(*sign).map(|q| q.ty) else {
                continue;
            };
            if let Some(&ph) = placeholders
                .iter()
                .find(|&&ph| self.arena.get(ph).name() == Some(key.as_str()))
            {
                explicit.insert(ph, arg_ty);
            }
        }
        explicit
    }
}
