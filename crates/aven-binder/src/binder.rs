//! The name binder pass.
//!
//! Walks one module's AST and fills `referred_decls` on identifier
//! expressions and `referred_decl` on identifier signatures. Value
//! identifiers may denote several declarations (function overloads); type
//! identifiers must denote exactly one type declaration.

use crate::members::MemberTables;
use crate::modules::ModuleTable;
use aven_common::{codes, Diagnostic, Span};
use aven_parser::{
    FunKind, Node, NodeArena, NodeId, NodeKind, ParamDecl,
};
use rustc_hash::{FxHashMap, FxHashSet};
use smallvec::{smallvec, SmallVec};
use tracing::debug;

type Candidates = SmallVec<[NodeId; 2]>;

pub struct NameBinder<'a> {
    arena: &'a mut NodeArena,
    modules: &'a ModuleTable,
    members: &'a MemberTables,
    /// Root of the `builtin` module, for the built-in type name fallback.
    builtin_root: NodeId,
    /// Root of the `stdlib` module; its top-level declarations are globally
    /// visible.
    stdlib_root: Option<NodeId>,
    file: String,
    diagnostics: Vec<Diagnostic>,
    /// Declarations whose initializer or default value is currently being
    /// bound; excluded from their own lookups so `let x <- x` refers to the
    /// outer `x`. Peer parameters of one function are marked together.
    being_declared: FxHashSet<NodeId>,
}

impl<'a> NameBinder<'a> {
    /// Bind every identifier in `module_root`, reporting name diagnostics.
    pub fn bind_module(
        arena: &'a mut NodeArena,
        modules: &'a ModuleTable,
        members: &'a MemberTables,
        builtin_root: NodeId,
        stdlib_root: Option<NodeId>,
        module_root: NodeId,
    ) -> Vec<Diagnostic> {
        let file = match &arena.get(module_root).kind {
            NodeKind::Module(m) => m.name.clone(),
            _ => String::from("<module>"),
        };
        let mut binder = NameBinder {
            arena,
            modules,
            members,
            builtin_root,
            stdlib_root,
            file,
            diagnostics: Vec::new(),
            being_declared: FxHashSet::default(),
        };
        binder.install_default_constructors(module_root);
        binder.install_self_decls(module_root);
        binder.bind_extension_headers(module_root);
        binder.visit(module_root);
        binder.diagnostics
    }

    /// Synthesize a memberwise `new` for every struct that does not declare
    /// one: one parameter per stored property, labeled by its name.
    fn install_default_constructors(&mut self, module_root: NodeId) {
        let module = self.arena.get(module_root).module;
        let structs: Vec<NodeId> = self
            .arena
            .ids()
            .filter(|&id| {
                let node = self.arena.get(id);
                if node.module != module {
                    return false;
                }
                match &node.kind {
                    NodeKind::Nominal(n) => {
                        n.kind == aven_parser::NominalKind::Struct
                            && !n.members.iter().any(|&m| {
                                matches!(
                                    &self.arena.get(m).kind,
                                    NodeKind::Fun(f) if f.name == "new"
                                )
                            })
                    }
                    _ => false,
                }
            })
            .collect();

        for nominal in structs {
            let props: Vec<(String, Option<NodeId>)> = match &self.arena.get(nominal).kind {
                NodeKind::Nominal(n) => n
                    .members
                    .iter()
                    .filter_map(|&m| match &self.arena.get(m).kind {
                        NodeKind::Prop(p) => Some((p.name.clone(), p.sign)),
                        _ => None,
                    })
                    .collect(),
                _ => continue,
            };
            let span = self.arena.get(nominal).span;
            let fun = self.arena.alloc(Node {
                span,
                module,
                decl_ctx: Some(nominal),
                kind: NodeKind::Fun(aven_parser::FunDecl {
                    name: String::from("new"),
                    kind: FunKind::Constructor,
                    mutating: false,
                    placeholders: Vec::new(),
                    params: Vec::new(),
                    codom: None,
                    body: None,
                    self_decl: None,
                }),
            });
            let params: Vec<NodeId> = props
                .into_iter()
                .map(|(name, sign)| {
                    self.arena.alloc(Node {
                        span,
                        module,
                        decl_ctx: Some(fun),
                        kind: NodeKind::Param(ParamDecl {
                            label: None,
                            name,
                            sign,
                            default: None,
                        }),
                    })
                })
                .collect();
            if let NodeKind::Fun(f) = &mut self.arena.get_mut(fun).kind {
                f.params = params;
            }
            if let NodeKind::Nominal(n) = &mut self.arena.get_mut(nominal).kind {
                n.members.push(fun);
            }
        }
    }

    // -----------------------------------------------------------------------
    // Preparation
    // -----------------------------------------------------------------------

    /// Allocate the synthetic `self` declaration of every method,
    /// constructor, and destructor, so that `self` references bind. The type
    /// realizer assigns its qualified type later.
    fn install_self_decls(&mut self, node: NodeId) {
        let funs: Vec<NodeId> = self
            .arena
            .ids()
            .filter(|&id| {
                self.arena.get(id).module == self.arena.get(node).module
                    && matches!(
                        &self.arena.get(id).kind,
                        NodeKind::Fun(f) if f.kind != FunKind::Regular && f.self_decl.is_none()
                    )
            })
            .collect();
        for fun in funs {
            let module = self.arena.get(fun).module;
            let self_decl = self.arena.alloc(Node {
                span: Span::dummy(),
                module,
                decl_ctx: Some(fun),
                kind: NodeKind::Param(ParamDecl {
                    label: None,
                    name: String::from("self"),
                    sign: None,
                    default: None,
                }),
            });
            if let NodeKind::Fun(f) = &mut self.arena.get_mut(fun).kind {
                f.self_decl = Some(self_decl);
            }
        }
    }

    /// Resolve the extended type of every top-level extension before the main
    /// walk, so member tables built during this module's binding see them.
    fn bind_extension_headers(&mut self, module_root: NodeId) {
        let stmts = match &self.arena.get(module_root).kind {
            NodeKind::Module(m) => m.stmts.clone(),
            _ => return,
        };
        for stmt in stmts {
            if let NodeKind::Extension(ext) = &self.arena.get(stmt).kind {
                let extended = ext.extended;
                self.bind_ident_sign(extended);
            }
        }
    }

    // -----------------------------------------------------------------------
    // Tree walk
    // -----------------------------------------------------------------------

    fn visit(&mut self, id: NodeId) {
        let kind = self.arena.get(id).kind.clone();
        match kind {
            NodeKind::Module(m) => {
                self.check_duplicates(id);
                for stmt in m.stmts {
                    self.visit(stmt);
                }
            }
            NodeKind::Prop(p) => {
                if let Some(sign) = p.sign {
                    self.visit(sign);
                }
                if let Some(init) = p.initializer {
                    self.being_declared.insert(id);
                    self.visit(init);
                    self.being_declared.remove(&id);
                }
            }
            NodeKind::Fun(f) => {
                self.check_duplicates(id);
                for &param in &f.params {
                    let sign = match &self.arena.get(param).kind {
                        NodeKind::Param(p) => p.sign,
                        _ => None,
                    };
                    if let Some(sign) = sign {
                        self.visit(sign);
                    }
                }
                // Parameters of one function are declared at the same time:
                // all of them shadow outer bindings inside any default value.
                let defaults: Vec<NodeId> = f
                    .params
                    .iter()
                    .filter_map(|&param| match &self.arena.get(param).kind {
                        NodeKind::Param(p) => p.default,
                        _ => None,
                    })
                    .collect();
                if !defaults.is_empty() {
                    for &param in &f.params {
                        self.being_declared.insert(param);
                    }
                    for default in defaults {
                        self.visit(default);
                    }
                    for &param in &f.params {
                        self.being_declared.remove(&param);
                    }
                }
                if let Some(codom) = f.codom {
                    self.visit(codom);
                }
                if let Some(body) = f.body {
                    self.visit(body);
                }
            }
            NodeKind::Param(_) | NodeKind::GenericParam(_) => {}
            NodeKind::Nominal(n) => {
                self.check_duplicates(id);
                for conf in n.conformances {
                    self.bind_ident_sign(conf);
                }
                for member in n.members {
                    self.visit(member);
                }
            }
            NodeKind::Extension(e) => {
                self.check_duplicates(id);
                // The header was bound up front.
                for member in e.members {
                    self.visit(member);
                }
            }
            NodeKind::BuiltinType(b) => {
                for member in b.members {
                    self.visit(member);
                }
            }
            NodeKind::Brace(b) => {
                self.check_duplicates(id);
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
                for (_, sign) in &ident.spec_args {
                    self.visit(*sign);
                }
                self.bind_ident_expr(id, &ident.name);
            }
            NodeKind::Select(s) => {
                // The ownee is not bound lexically; it resolves through the
                // owner's type during constraint solving.
                self.visit(s.owner);
                let args: Vec<NodeId> = match &self.arena.get(s.ownee).kind {
                    NodeKind::Ident(ident) => {
                        ident.spec_args.iter().map(|(_, sign)| *sign).collect()
                    }
                    _ => Vec::new(),
                };
                for arg in args {
                    self.visit(arg);
                }
            }
            NodeKind::ImplicitSelect(s) => {
                let _ = s;
            }
            NodeKind::Infix(i) => {
                // The operator identifier resolves as a member of the LHS
                // type during solving, not lexically.
                self.visit(i.lhs);
                self.visit(i.rhs);
            }
            NodeKind::Prefix(p) => {
                self.visit(p.operand);
            }
            NodeKind::Call(c) => {
                self.visit(c.callee);
                for arg in c.args {
                    self.visit(arg);
                }
            }
            NodeKind::CallArg(a) => {
                self.visit(a.value);
            }
            NodeKind::Lambda(l) => {
                self.check_duplicates(id);
                for &param in &l.params {
                    let sign = match &self.arena.get(param).kind {
                        NodeKind::Param(p) => p.sign,
                        _ => None,
                    };
                    if let Some(sign) = sign {
                        self.visit(sign);
                    }
                }
                if let Some(codom) = l.codom {
                    self.visit(codom);
                }
                self.visit(l.body);
            }
            NodeKind::Cast(c) => {
                self.visit(c.operand);
                self.visit(c.sign);
            }
            NodeKind::SubtypeTest(t) => {
                self.visit(t.operand);
                self.visit(t.sign);
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
            NodeKind::QualSign(q) => {
                if let Some(sign) = q.sign {
                    self.visit(sign);
                }
            }
            NodeKind::IdentSign(_) => self.bind_ident_sign(id),
            NodeKind::NestedIdentSign(_) => self.bind_nested_sign(id),
            NodeKind::ImplicitNestedIdentSign(_) => self.bind_implicit_nested_sign(id),
            NodeKind::FunSign(f) => {
                for param in f.params {
                    self.visit(param);
                }
                self.visit(f.codom);
            }
            NodeKind::ParamSign(p) => self.visit(p.sign),
            NodeKind::NullLit
            | NodeKind::BoolLit(_)
            | NodeKind::IntLit(_)
            | NodeKind::FloatLit(_)
            | NodeKind::StringLit(_)
            | NodeKind::InvalidExpr
            | NodeKind::InvalidSign => {}
        }
    }

    // -----------------------------------------------------------------------
    // Identifier binding
    // -----------------------------------------------------------------------

    fn bind_ident_expr(&mut self, id: NodeId, name: &str) {
        let Some(ctx) = self.arena.get(id).decl_ctx else {
            return;
        };
        let candidates = self.lookup(ctx, name);
        debug!(name, count = candidates.len(), "bound identifier");
        if candidates.is_empty() {
            let span = self.arena.get(id).span;
            self.error(span, format!("unbound identifier '{name}'"), codes::UNBOUND_IDENTIFIER);
        }
        if let NodeKind::Ident(ident) = &mut self.arena.get_mut(id).kind {
            ident.referred_decls = candidates.to_vec();
        }
    }

    fn bind_ident_sign(&mut self, id: NodeId) {
        let node = self.arena.get(id);
        let NodeKind::IdentSign(sign) = &node.kind else {
            // Error recovery may leave an invalid signature here.
            return;
        };
        let name = sign.name.clone();
        let spec_args: Vec<NodeId> = sign.spec_args.iter().map(|(_, s)| *s).collect();
        let span = node.span;
        let Some(ctx) = node.decl_ctx else {
            return;
        };
        for arg in spec_args {
            self.visit(arg);
        }

        let candidates = self.lookup(ctx, &name);
        let resolved = self.expect_unique_type_decl(&name, span, candidates);
        if let NodeKind::IdentSign(sign) = &mut self.arena.get_mut(id).kind {
            sign.referred_decl = resolved;
        }
    }

    fn bind_nested_sign(&mut self, id: NodeId) {
        let NodeKind::NestedIdentSign(nested) = self.arena.get(id).kind.clone() else {
            return;
        };
        self.visit(nested.owner);
        let owner_decl = match &self.arena.get(nested.owner).kind {
            NodeKind::IdentSign(s) => s.referred_decl,
            NodeKind::NestedIdentSign(_) => self.resolved_sign_decl(nested.owner),
            _ => None,
        };
        self.bind_sign_member(nested.ownee, owner_decl);
    }

    fn bind_implicit_nested_sign(&mut self, id: NodeId) {
        let NodeKind::ImplicitNestedIdentSign(nested) = self.arena.get(id).kind.clone() else {
            return;
        };
        let owner = self.arena.enclosing_type_decl(id);
        if owner.is_none() {
            let span = self.arena.get(id).span;
            self.error(
                span,
                "'::' requires an enclosing type declaration",
                codes::INVALID_TYPE_IDENTIFIER,
            );
        }
        self.bind_sign_member(nested.ownee, owner);
    }

    /// Resolve the ownee of a (possibly implicit) nested signature inside the
    /// member table of `owner_decl`.
    fn bind_sign_member(&mut self, ownee: NodeId, owner_decl: Option<NodeId>) {
        let NodeKind::IdentSign(sign) = self.arena.get(ownee).kind.clone() else {
            return;
        };
        for (_, arg) in &sign.spec_args {
            self.visit(*arg);
        }
        let Some(owner_decl) = owner_decl else {
            return;
        };
        if !self.arena.get(owner_decl).is_type_decl() {
            let span = self.arena.get(ownee).span;
            self.error(
                span,
                format!("'{}' cannot own a nested type", self.decl_name(owner_decl)),
                codes::INVALID_TYPE_IDENTIFIER,
            );
            return;
        }

        let candidates =
            self.members
                .lookup(self.arena, self.modules, owner_decl, &sign.name);
        let types: Candidates = candidates
            .into_iter()
            .filter(|&d| self.is_type_declaration(d))
            .collect();
        if types.is_empty() {
            let span = self.arena.get(ownee).span;
            self.error(
                span,
                format!(
                    "type '{}' has no nested type named '{}'",
                    self.decl_name(owner_decl),
                    sign.name
                ),
                codes::NON_EXISTING_NESTED_TYPE,
            );
            return;
        }
        let span = self.arena.get(ownee).span;
        let resolved = self.expect_unique_type_decl(&sign.name, span, types);
        if let NodeKind::IdentSign(sign) = &mut self.arena.get_mut(ownee).kind {
            sign.referred_decl = resolved;
        }
    }

    fn resolved_sign_decl(&self, sign: NodeId) -> Option<NodeId> {
        match &self.arena.get(sign).kind {
            NodeKind::IdentSign(s) => s.referred_decl,
            NodeKind::NestedIdentSign(n) => self.resolved_sign_decl(n.ownee),
            NodeKind::ImplicitNestedIdentSign(n) => self.resolved_sign_decl(n.ownee),
            _ => None,
        }
    }

    fn expect_unique_type_decl(
        &mut self,
        name: &str,
        span: Span,
        candidates: Candidates,
    ) -> Option<NodeId> {
        if candidates.is_empty() {
            self.error(span, format!("unbound identifier '{name}'"), codes::UNBOUND_IDENTIFIER);
            return None;
        }
        let types: Candidates = candidates
            .iter()
            .copied()
            .filter(|&d| self.is_type_declaration(d))
            .collect();
        if types.len() == 1 {
            return Some(types[0]);
        }
        self.error(
            span,
            format!("'{name}' is not a type identifier"),
            codes::INVALID_TYPE_IDENTIFIER,
        );
        None
    }

    fn is_type_declaration(&self, decl: NodeId) -> bool {
        matches!(
            self.arena.get(decl).kind,
            NodeKind::Nominal(_) | NodeKind::BuiltinType(_) | NodeKind::GenericParam(_)
        )
    }

    fn decl_name(&self, decl: NodeId) -> String {
        self.arena
            .get(decl)
            .name()
            .unwrap_or("<anonymous>")
            .to_string()
    }

    // -----------------------------------------------------------------------
    // Lookup
    // -----------------------------------------------------------------------

    /// Walk outward from `from_ctx`, accumulating candidate declarations for
    /// `name`. The first non-overloadable match wins alone; overloadable
    /// matches accumulate across scopes.
    fn lookup(&self, from_ctx: NodeId, name: &str) -> Candidates {
        let mut matches: Candidates = smallvec![];
        let mut current = Some(from_ctx);

        while let Some(ctx) = current {
            match &self.arena.get(ctx).kind {
                NodeKind::Nominal(_) | NodeKind::BuiltinType(_) => {
                    if name == "Self" {
                        if matches.is_empty() {
                            return smallvec![ctx];
                        }
                        return matches;
                    }
                    // Own placeholders, then the member table (which folds in
                    // extensions from every loaded module).
                    let mut scoped: Candidates = smallvec![];
                    if let NodeKind::Nominal(n) = &self.arena.get(ctx).kind {
                        for &ph in &n.placeholders {
                            if self.arena.get(ph).name() == Some(name) {
                                scoped.push(ph);
                            }
                        }
                    }
                    scoped.extend(self.members.lookup(self.arena, self.modules, ctx, name));
                    if let Some(found) = self.fold_scope(&mut matches, scoped) {
                        return found;
                    }
                    // Continue with the enclosing type context if any, else
                    // jump directly to the enclosing module.
                    current = match self.arena.enclosing_type_decl(ctx) {
                        Some(outer) => Some(outer),
                        None => Some(self.arena.module_of(ctx)),
                    };
                }
                NodeKind::Extension(ext) => {
                    // The extension's own members, then lookup inside the
                    // extended type's declaration.
                    let mut scoped: Candidates = smallvec![];
                    for &member in &ext.members {
                        if self.arena.get(member).name() == Some(name)
                            && !self.being_declared.contains(&member)
                        {
                            scoped.push(member);
                        }
                    }
                    let extended = match &self.arena.get(ext.extended).kind {
                        NodeKind::IdentSign(s) => s.referred_decl,
                        _ => None,
                    };
                    if let Some(extended) = extended {
                        if name == "Self" {
                            if matches.is_empty() {
                                return smallvec![extended];
                            }
                            return matches;
                        }
                        scoped.extend(self.members.lookup(
                            self.arena,
                            self.modules,
                            extended,
                            name,
                        ));
                    }
                    if let Some(found) = self.fold_scope(&mut matches, scoped) {
                        return found;
                    }
                    current = self.arena.get(ctx).decl_ctx;
                }
                _ => {
                    let mut scoped: Candidates = smallvec![];
                    for decl in self.arena.declarations_in(ctx) {
                        if self.arena.get(decl).name() == Some(name)
                            && !self.being_declared.contains(&decl)
                        {
                            scoped.push(decl);
                        }
                    }
                    if let Some(found) = self.fold_scope(&mut matches, scoped) {
                        return found;
                    }
                    current = self.arena.get(ctx).decl_ctx;
                }
            }
        }

        if matches.is_empty() {
            if let Some(builtin) = self.builtin_type_named(name) {
                return smallvec![builtin];
            }
            // The standard module's top-level declarations are globally
            // visible.
            if let Some(stdlib_root) = self.stdlib_root {
                let mut scoped: Candidates = smallvec![];
                if let NodeKind::Module(m) = &self.arena.get(stdlib_root).kind {
                    for &decl in &m.stmts {
                        if self.arena.get(decl).name() == Some(name) {
                            scoped.push(decl);
                        }
                    }
                }
                if let Some(found) = self.fold_scope(&mut matches, scoped) {
                    return found;
                }
            }
        }
        matches
    }

    /// Fold one scope's matches into the accumulated candidate set. Returns
    /// `Some(final)` when the lookup must stop here.
    fn fold_scope(&self, matches: &mut Candidates, scoped: Candidates) -> Option<Candidates> {
        for decl in scoped {
            if self.being_declared.contains(&decl) {
                continue;
            }
            if !self.arena.get(decl).is_overloadable() {
                if matches.is_empty() {
                    return Some(smallvec![decl]);
                }
                // Overloads found in inner scopes shadow a non-overloadable
                // outer declaration.
                return Some(matches.clone());
            }
            matches.push(decl);
        }
        None
    }

    fn builtin_type_named(&self, name: &str) -> Option<NodeId> {
        let NodeKind::Module(m) = &self.arena.get(self.builtin_root).kind else {
            return None;
        };
        m.stmts
            .iter()
            .copied()
            .find(|&d| {
                matches!(&self.arena.get(d).kind, NodeKind::BuiltinType(b) if b.name == name)
            })
    }

    // -----------------------------------------------------------------------
    // Duplicate declarations
    // -----------------------------------------------------------------------

    /// Report duplicate and illegally redeclared names in one context.
    fn check_duplicates(&mut self, ctx: NodeId) {
        let decls = self.arena.declarations_in(ctx);
        let mut first_by_name: FxHashMap<String, NodeId> = FxHashMap::default();
        for decl in decls {
            let Some(name) = self.arena.get(decl).name().map(str::to_string) else {
                continue;
            };
            match first_by_name.get(&name) {
                None => {
                    first_by_name.insert(name, decl);
                }
                Some(&first) => {
                    let first_overloadable = self.arena.get(first).is_overloadable();
                    let decl_overloadable = self.arena.get(decl).is_overloadable();
                    if first_overloadable && decl_overloadable {
                        continue; // overloads coexist
                    }
                    let span = self.arena.get(decl).span;
                    let first_span = self.arena.get(first).span;
                    let diag = if first_overloadable != decl_overloadable {
                        Diagnostic::error(
                            self.file.clone(),
                            span,
                            format!("'{name}' cannot be redeclared as a different kind of declaration"),
                            codes::ILLEGAL_REDECLARATION,
                        )
                    } else {
                        Diagnostic::error(
                            self.file.clone(),
                            span,
                            format!("duplicate declaration of '{name}'"),
                            codes::DUPLICATE_DECLARATION,
                        )
                    };
                    self.diagnostics
                        .push(diag.with_related(self.file.clone(), first_span, "previously declared here"));
                }
            }
        }
    }

    fn error(&mut self, span: Span, message: impl Into<String>, code: u32) {
        self.diagnostics
            .push(Diagnostic::error(self.file.clone(), span, message, code));
    }
}
