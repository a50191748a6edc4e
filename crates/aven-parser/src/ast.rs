//! AST node definitions.
//!
//! Nodes live in a [`NodeArena`] and are identified by [`NodeId`]. The kind
//! payload is one discriminated union over four families: declarations,
//! statements, expressions, and type signatures. Capability queries
//! (`is_declaration`, `is_decl_context`, …) are methods over the kind rather
//! than separate node classes.

use aven_common::Span;
use serde::Serialize;

/// Index of a node in the [`NodeArena`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct NodeId(pub u32);

/// Index of a loaded module in the module table.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct ModuleId(pub u32);

/// One of the three binding disciplines.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BindingOp {
    /// `:=`
    Copy,
    /// `&-`
    Reference,
    /// `<-`
    Move,
}

impl BindingOp {
    pub fn symbol(self) -> &'static str {
        match self {
            BindingOp::Copy => ":=",
            BindingOp::Reference => "&-",
            BindingOp::Move => "<-",
        }
    }
}

/// Kind of a function declaration.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FunKind {
    Regular,
    Method,
    Constructor,
    Destructor,
}

/// Kind of a nominal type declaration.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NominalKind {
    Struct,
    Union,
    Interface,
}

impl NominalKind {
    pub fn keyword(self) -> &'static str {
        match self {
            NominalKind::Struct => "struct",
            NominalKind::Union => "union",
            NominalKind::Interface => "interface",
        }
    }
}

bitflags::bitflags! {
    /// Qualifiers on a type signature or binding.
    ///
    /// The empty set on a signature means "unspecified, to be inferred";
    /// realization defaults an unspecified declaration to `CST`.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
    pub struct Qualifiers: u8 {
        const CST = 1 << 0;
        const MUT = 1 << 1;
    }
}

// ---------------------------------------------------------------------------
// Declarations
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct ModuleDecl {
    pub name: String,
    pub stmts: Vec<NodeId>,
}

/// `let`/`var` property declaration, at module, type, or local scope.
#[derive(Debug, Clone)]
pub struct PropDecl {
    pub name: String,
    /// `var` if true, `let` otherwise.
    pub mutable: bool,
    pub sign: Option<NodeId>,
    pub op: Option<BindingOp>,
    pub initializer: Option<NodeId>,
}

#[derive(Debug, Clone)]
pub struct FunDecl {
    pub name: String,
    pub kind: FunKind,
    pub mutating: bool,
    pub placeholders: Vec<NodeId>,
    pub params: Vec<NodeId>,
    pub codom: Option<NodeId>,
    pub body: Option<NodeId>,
    /// Synthetic `self` declaration installed by the type realizer for
    /// methods, constructors, and destructors.
    pub self_decl: Option<NodeId>,
}

#[derive(Debug, Clone)]
pub struct ParamDecl {
    /// Explicit argument label; parameters without one are labeled by name.
    pub label: Option<String>,
    pub name: String,
    pub sign: Option<NodeId>,
    pub default: Option<NodeId>,
}

#[derive(Debug, Clone)]
pub struct GenericParamDecl {
    pub name: String,
}

#[derive(Debug, Clone)]
pub struct NominalDecl {
    pub kind: NominalKind,
    pub name: String,
    pub placeholders: Vec<NodeId>,
    /// Identifier signatures of the interfaces this type declares it
    /// conforms to.
    pub conformances: Vec<NodeId>,
    pub members: Vec<NodeId>,
}

#[derive(Debug, Clone)]
pub struct ExtensionDecl {
    /// Identifier signature naming the extended type.
    pub extended: NodeId,
    pub members: Vec<NodeId>,
}

/// A built-in type declaration, synthesized into the `builtin` module.
#[derive(Debug, Clone)]
pub struct BuiltinTypeDecl {
    pub name: String,
    pub members: Vec<NodeId>,
}

// ---------------------------------------------------------------------------
// Statements
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct BraceStmt {
    pub stmts: Vec<NodeId>,
}

/// `lvalue op rvalue`.
#[derive(Debug, Clone)]
pub struct BindingStmt {
    pub op: BindingOp,
    pub lvalue: NodeId,
    pub rvalue: NodeId,
}

#[derive(Debug, Clone)]
pub struct ReturnStmt {
    pub op: Option<BindingOp>,
    pub value: Option<NodeId>,
}

#[derive(Debug, Clone)]
pub struct IfStmt {
    pub condition: NodeId,
    pub then_body: NodeId,
    pub else_body: Option<NodeId>,
}

#[derive(Debug, Clone)]
pub struct WhileStmt {
    pub condition: NodeId,
    pub body: NodeId,
}

// ---------------------------------------------------------------------------
// Expressions
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct IdentExpr {
    pub name: String,
    /// Use-site specialization arguments `<T = Int, …>` in source order.
    pub spec_args: Vec<(String, NodeId)>,
    /// Candidate declarations, filled by the name binder. Empty iff an
    /// unbound-identifier error was reported.
    pub referred_decls: Vec<NodeId>,
}

#[derive(Debug, Clone)]
pub struct SelectExpr {
    pub owner: NodeId,
    /// Identifier expression for the selected member.
    pub ownee: NodeId,
}

#[derive(Debug, Clone)]
pub struct ImplicitSelectExpr {
    pub ownee: NodeId,
}

#[derive(Debug, Clone)]
pub struct InfixExpr {
    /// Identifier expression for the operator.
    pub op: NodeId,
    pub lhs: NodeId,
    pub rhs: NodeId,
}

#[derive(Debug, Clone)]
pub struct PrefixExpr {
    pub op: NodeId,
    pub operand: NodeId,
}

#[derive(Debug, Clone)]
pub struct CallExpr {
    pub callee: NodeId,
    pub args: Vec<NodeId>,
}

#[derive(Debug, Clone)]
pub struct CallArgExpr {
    pub label: Option<String>,
    pub op: Option<BindingOp>,
    pub value: NodeId,
}

#[derive(Debug, Clone)]
pub struct LambdaExpr {
    pub params: Vec<NodeId>,
    pub codom: Option<NodeId>,
    pub body: NodeId,
}

#[derive(Debug, Clone)]
pub struct CastExpr {
    pub operand: NodeId,
    pub sign: NodeId,
    /// `as!` if true, `as` otherwise.
    pub forced: bool,
}

#[derive(Debug, Clone)]
pub struct SubtypeTestExpr {
    pub operand: NodeId,
    pub sign: NodeId,
}

#[derive(Debug, Clone)]
pub struct ParenExpr {
    pub inner: NodeId,
}

#[derive(Debug, Clone)]
pub struct ArrayLitExpr {
    pub elements: Vec<NodeId>,
}

#[derive(Debug, Clone)]
pub struct SetLitExpr {
    pub elements: Vec<NodeId>,
}

#[derive(Debug, Clone)]
pub struct MapLitExpr {
    pub entries: Vec<(NodeId, NodeId)>,
}

// ---------------------------------------------------------------------------
// Type signatures
// ---------------------------------------------------------------------------

/// Qualifier set plus bare signature. Annotations always parse to this.
#[derive(Debug, Clone)]
pub struct QualSign {
    pub quals: Qualifiers,
    pub sign: Option<NodeId>,
}

#[derive(Debug, Clone)]
pub struct IdentSign {
    pub name: String,
    pub spec_args: Vec<(String, NodeId)>,
    /// Unique type declaration, filled by the name binder.
    pub referred_decl: Option<NodeId>,
}

/// `A::B`
#[derive(Debug, Clone)]
pub struct NestedIdentSign {
    pub owner: NodeId,
    pub ownee: NodeId,
}

/// `::B`
#[derive(Debug, Clone)]
pub struct ImplicitNestedIdentSign {
    pub ownee: NodeId,
}

#[derive(Debug, Clone)]
pub struct FunSign {
    pub params: Vec<NodeId>,
    pub codom: NodeId,
}

#[derive(Debug, Clone)]
pub struct ParamSign {
    pub label: Option<String>,
    pub sign: NodeId,
}

// ---------------------------------------------------------------------------
// Node
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub enum NodeKind {
    // Declarations
    Module(ModuleDecl),
    Prop(PropDecl),
    Fun(FunDecl),
    Param(ParamDecl),
    GenericParam(GenericParamDecl),
    Nominal(NominalDecl),
    Extension(ExtensionDecl),
    BuiltinType(BuiltinTypeDecl),

    // Statements
    Brace(BraceStmt),
    Binding(BindingStmt),
    Return(ReturnStmt),
    If(IfStmt),
    While(WhileStmt),

    // Expressions
    NullLit,
    BoolLit(bool),
    IntLit(i64),
    FloatLit(f64),
    StringLit(String),
    Ident(IdentExpr),
    Select(SelectExpr),
    ImplicitSelect(ImplicitSelectExpr),
    Infix(InfixExpr),
    Prefix(PrefixExpr),
    Call(CallExpr),
    CallArg(CallArgExpr),
    Lambda(LambdaExpr),
    Cast(CastExpr),
    SubtypeTest(SubtypeTestExpr),
    Paren(ParenExpr),
    ArrayLit(ArrayLitExpr),
    SetLit(SetLitExpr),
    MapLit(MapLitExpr),
    InvalidExpr,

    // Type signatures
    QualSign(QualSign),
    IdentSign(IdentSign),
    NestedIdentSign(NestedIdentSign),
    ImplicitNestedIdentSign(ImplicitNestedIdentSign),
    FunSign(FunSign),
    ParamSign(ParamSign),
    InvalidSign,
}

#[derive(Debug, Clone)]
pub struct Node {
    pub span: Span,
    pub module: ModuleId,
    /// Innermost enclosing declaration context; `None` only for module
    /// nodes.
    pub decl_ctx: Option<NodeId>,
    pub kind: NodeKind,
}

impl Node {
    pub fn is_declaration(&self) -> bool {
        matches!(
            self.kind,
            NodeKind::Module(_)
                | NodeKind::Prop(_)
                | NodeKind::Fun(_)
                | NodeKind::Param(_)
                | NodeKind::GenericParam(_)
                | NodeKind::Nominal(_)
                | NodeKind::Extension(_)
                | NodeKind::BuiltinType(_)
        )
    }

    pub fn is_decl_context(&self) -> bool {
        matches!(
            self.kind,
            NodeKind::Module(_)
                | NodeKind::Fun(_)
                | NodeKind::Lambda(_)
                | NodeKind::Nominal(_)
                | NodeKind::Extension(_)
                | NodeKind::BuiltinType(_)
                | NodeKind::Brace(_)
        )
    }

    /// Nominal and built-in type declarations own member lookup tables.
    pub fn is_type_decl(&self) -> bool {
        matches!(self.kind, NodeKind::Nominal(_) | NodeKind::BuiltinType(_))
    }

    /// Only function declarations may share a name within one context.
    pub fn is_overloadable(&self) -> bool {
        matches!(self.kind, NodeKind::Fun(_))
    }

    /// The declared name, for named declarations.
    pub fn name(&self) -> Option<&str> {
        match &self.kind {
            NodeKind::Module(d) => Some(&d.name),
            NodeKind::Prop(d) => Some(&d.name),
            NodeKind::Fun(d) => Some(&d.name),
            NodeKind::Param(d) => Some(&d.name),
            NodeKind::GenericParam(d) => Some(&d.name),
            NodeKind::Nominal(d) => Some(&d.name),
            NodeKind::BuiltinType(d) => Some(&d.name),
            _ => None,
        }
    }
}

/// Owning storage for every AST node of a compiler invocation.
#[derive(Debug, Default)]
pub struct NodeArena {
    nodes: Vec<Node>,
}

impl NodeArena {
    pub fn new() -> Self {
        NodeArena { nodes: Vec::new() }
    }

    pub fn alloc(&mut self, node: Node) -> NodeId {
        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(node);
        id
    }

    pub fn get(&self, id: NodeId) -> &Node {
        &self.nodes[id.0 as usize]
    }

    pub fn get_mut(&mut self, id: NodeId) -> &mut Node {
        &mut self.nodes[id.0 as usize]
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn ids(&self) -> impl Iterator<Item = NodeId> {
        (0..self.nodes.len() as u32).map(NodeId)
    }

    /// The ordered list of declarations a context holds directly.
    ///
    /// For functions this is placeholders, the synthetic `self` (once
    /// installed), then parameters; locals declared in the body belong to
    /// the body's brace context.
    pub fn declarations_in(&self, ctx: NodeId) -> Vec<NodeId> {
        match &self.get(ctx).kind {
            NodeKind::Module(d) => d
                .stmts
                .iter()
                .copied()
                .filter(|&id| self.get(id).is_declaration())
                .collect(),
            NodeKind::Fun(d) => {
                let mut decls = d.placeholders.clone();
                if let Some(s) = d.self_decl {
                    decls.push(s);
                }
                decls.extend(d.params.iter().copied());
                decls
            }
            NodeKind::Lambda(d) => d.params.clone(),
            NodeKind::Nominal(d) => {
                let mut decls = d.placeholders.clone();
                decls.extend(d.members.iter().copied());
                decls
            }
            NodeKind::Extension(d) => d.members.clone(),
            NodeKind::BuiltinType(d) => d.members.clone(),
            NodeKind::Brace(d) => d
                .stmts
                .iter()
                .copied()
                .filter(|&id| self.get(id).is_declaration())
                .collect(),
            _ => Vec::new(),
        }
    }

    /// Walk `decl_ctx` pointers from `id` to the module node.
    pub fn module_of(&self, id: NodeId) -> NodeId {
        let mut current = id;
        while let Some(parent) = self.get(current).decl_ctx {
            current = parent;
        }
        current
    }

    /// The innermost enclosing function declaration (or lambda), if any.
    pub fn enclosing_fun(&self, id: NodeId) -> Option<NodeId> {
        let mut current = self.get(id).decl_ctx;
        while let Some(ctx) = current {
            if matches!(self.get(ctx).kind, NodeKind::Fun(_) | NodeKind::Lambda(_)) {
                return Some(ctx);
            }
            current = self.get(ctx).decl_ctx;
        }
        None
    }

    /// The innermost enclosing nominal (or built-in) type declaration.
    pub fn enclosing_type_decl(&self, id: NodeId) -> Option<NodeId> {
        let mut current = self.get(id).decl_ctx;
        while let Some(ctx) = current {
            if self.get(ctx).is_type_decl() {
                return Some(ctx);
            }
            current = self.get(ctx).decl_ctx;
        }
        None
    }

    /// True if `outer` strictly encloses `inner` in the context chain.
    pub fn strictly_encloses(&self, outer: NodeId, inner: NodeId) -> bool {
        let mut current = self.get(inner).decl_ctx;
        while let Some(ctx) = current {
            if ctx == outer {
                return true;
            }
            current = self.get(ctx).decl_ctx;
        }
        false
    }
}
