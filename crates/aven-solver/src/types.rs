//! The semantic type lattice.
//!
//! A [`TypeId`] is an index into the interner. [`TypeKey`] is the structural
//! key a type is hash-consed under; two structurally equal keys always yield
//! the same `TypeId`.

use aven_parser::{NodeId, Qualifiers};

/// Inference variable identifier; strictly increasing per invocation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TyVarId(pub u32);

/// Handle of an interned type.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TypeId(pub u32);

impl TypeId {
    /// Well-known types, pre-registered by the interner in this order.
    pub const ANYTHING: TypeId = TypeId(0);
    pub const NOTHING: TypeId = TypeId(1);
    pub const BOOL: TypeId = TypeId(2);
    pub const INT: TypeId = TypeId(3);
    pub const FLOAT: TypeId = TypeId(4);
    pub const STRING: TypeId = TypeId(5);
    /// The type given to binding statements.
    pub const ASSIGNMENT: TypeId = TypeId(6);
    /// Error marker for local recovery.
    pub const ERROR: TypeId = TypeId(7);
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BuiltinKind {
    Anything,
    Nothing,
    Bool,
    Int,
    Float,
    String,
    Assignment,
}

impl BuiltinKind {
    pub fn name(self) -> &'static str {
        match self {
            BuiltinKind::Anything => "Anything",
            BuiltinKind::Nothing => "Nothing",
            BuiltinKind::Bool => "Bool",
            BuiltinKind::Int => "Int",
            BuiltinKind::Float => "Float",
            BuiltinKind::String => "String",
            BuiltinKind::Assignment => "Assignment",
        }
    }
}

/// A bare type together with its qualifiers.
///
/// The empty qualifier set means "unspecified"; declarations default it to
/// `@cst` at realization time.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct QualType {
    pub quals: Qualifiers,
    pub ty: TypeId,
}

impl QualType {
    pub fn new(quals: Qualifiers, ty: TypeId) -> Self {
        QualType { quals, ty }
    }

    /// Unspecified qualifiers.
    pub fn bare(ty: TypeId) -> Self {
        QualType {
            quals: Qualifiers::empty(),
            ty,
        }
    }

    pub fn cst(ty: TypeId) -> Self {
        QualType {
            quals: Qualifiers::CST,
            ty,
        }
    }

    pub fn with_ty(self, ty: TypeId) -> Self {
        QualType { ty, ..self }
    }
}

/// One parameter of a function type.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ParamType {
    pub label: Option<String>,
    pub qual: QualType,
}

impl ParamType {
    pub fn new(label: Option<String>, qual: QualType) -> Self {
        ParamType { label, qual }
    }

    pub fn unlabeled(qual: QualType) -> Self {
        ParamType { label: None, qual }
    }
}

/// Structural key of an interned type.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum TypeKey {
    /// Inference variable.
    Var(TyVarId),
    /// Reference to a generic parameter declaration.
    Placeholder(NodeId),
    Builtin(BuiltinKind),
    Fun {
        /// Unbound generic parameter declarations of the function.
        placeholders: Vec<NodeId>,
        dom: Vec<ParamType>,
        codom: QualType,
    },
    Interface(NodeId),
    Struct(NodeId),
    Union(NodeId),
    /// A specialization snapshot: `base` with `bindings` from placeholder
    /// types to bound bare types, sorted by placeholder id.
    BoundGeneric {
        base: TypeId,
        bindings: Vec<(TypeId, TypeId)>,
    },
    /// The metatype of a type, used when a type appears as a value.
    Kind(TypeId),
    Error,
}

bitflags::bitflags! {
    /// Facts about a type computed once at interning time.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
    pub struct TypeFlags: u8 {
        /// The type contains at least one inference variable.
        const HAS_VAR = 1 << 0;
        /// The type contains at least one generic placeholder.
        const HAS_PLACEHOLDER = 1 << 1;
        /// The type has unbound placeholders a use site must open.
        const CAN_BE_OPENED = 1 << 2;
    }
}
