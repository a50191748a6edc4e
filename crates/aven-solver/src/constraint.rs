//! Typing constraints.
//!
//! Constraints are produced by the extractor, refined by the solver, and
//! carry `(anchor, path)` locations so a failure can be resolved back to the
//! most specific sub-node before rendering.

use crate::types::TypeId;
use aven_parser::{NodeArena, NodeId, NodeKind};

pub const PRIORITY_EQUALITY: u32 = 500;
pub const PRIORITY_CONFORMANCE: u32 = 400;
pub const PRIORITY_SPECIALIZATION: u32 = 300;
pub const PRIORITY_MEMBER: u32 = 200;
pub const PRIORITY_DISJUNCTION: u32 = 0;

/// One step from a location's anchor node toward a sub-node.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PathComponent {
    Call,
    Codomain,
    InfixOp,
    InfixRhs,
    Binding,
    PrefixOp,
    Parameter(usize),
    Return,
    Select,
    Initializer,
    Condition,
    Identifier,
}

/// Where a constraint came from: an anchor node and a path of refinements.
#[derive(Clone, Debug)]
pub struct Location {
    pub anchor: NodeId,
    pub path: Vec<PathComponent>,
}

impl Location {
    pub fn new(anchor: NodeId) -> Self {
        Location {
            anchor,
            path: Vec::new(),
        }
    }

    pub fn appending(&self, component: PathComponent) -> Self {
        let mut path = self.path.clone();
        path.push(component);
        Location {
            anchor: self.anchor,
            path,
        }
    }

    /// Resolve the path to the most specific sub-node it denotes. Steps that
    /// do not fit the node shape stop the walk; the result is always a valid
    /// node.
    pub fn resolve(&self, arena: &NodeArena) -> NodeId {
        let mut current = self.anchor;
        for component in &self.path {
            let next = step(arena, current, *component);
            match next {
                Some(node) => current = node,
                None => break,
            }
        }
        current
    }
}

fn step(arena: &NodeArena, node: NodeId, component: PathComponent) -> Option<NodeId> {
    match (component, &arena.get(node).kind) {
        (PathComponent::Call, NodeKind::Call(c)) => Some(c.callee),
        (PathComponent::Codomain, NodeKind::Fun(f)) => f.codom,
        (PathComponent::Codomain, NodeKind::Lambda(l)) => l.codom,
        (PathComponent::InfixOp, NodeKind::Infix(i)) => Some(i.op),
        (PathComponent::InfixRhs, NodeKind::Infix(i)) => Some(i.rhs),
        (PathComponent::Binding, NodeKind::Binding(b)) => Some(b.rvalue),
        (PathComponent::PrefixOp, NodeKind::Prefix(p)) => Some(p.op),
        (PathComponent::Parameter(i), NodeKind::Call(c)) => c.args.get(i).copied(),
        (PathComponent::Parameter(i), NodeKind::Fun(f)) => f.params.get(i).copied(),
        (PathComponent::Return, NodeKind::Return(r)) => r.value,
        (PathComponent::Select, NodeKind::Select(s)) => Some(s.ownee),
        (PathComponent::Select, NodeKind::ImplicitSelect(s)) => Some(s.ownee),
        (PathComponent::Initializer, NodeKind::Prop(p)) => p.initializer,
        (PathComponent::Initializer, NodeKind::Param(p)) => p.default,
        (PathComponent::Condition, NodeKind::If(i)) => Some(i.condition),
        (PathComponent::Condition, NodeKind::While(w)) => Some(w.condition),
        (PathComponent::Identifier, _) => Some(node),
        _ => None,
    }
}

/// One alternative of a disjunction: a small conjunction of constraints and
/// the penalty for choosing it.
#[derive(Clone, Debug)]
pub struct Choice {
    pub constraints: Vec<Constraint>,
    pub weight: u32,
}

#[derive(Clone, Debug)]
pub enum ConstraintKind {
    /// `T ~= U`
    Equality { t: TypeId, u: TypeId },
    /// `T <= U`
    Conformance { t: TypeId, u: TypeId },
    /// `T <s U`: `t` is the call-site function type, `u` the callee type.
    Specialization { t: TypeId, u: TypeId },
    /// `T ~= U.name`
    ValueMember {
        t: TypeId,
        owner: TypeId,
        member: String,
    },
    /// `T ~= U::name`
    TypeMember {
        t: TypeId,
        owner: TypeId,
        member: String,
    },
    Disjunction { choices: Vec<Choice> },
}

#[derive(Clone, Debug)]
pub struct Constraint {
    pub id: u32,
    pub kind: ConstraintKind,
    pub loc: Location,
}

impl Constraint {
    pub fn priority(&self) -> u32 {
        match &self.kind {
            ConstraintKind::Equality { .. } => PRIORITY_EQUALITY,
            ConstraintKind::Conformance { .. } => PRIORITY_CONFORMANCE,
            ConstraintKind::Specialization { .. } => PRIORITY_SPECIALIZATION,
            ConstraintKind::ValueMember { .. } | ConstraintKind::TypeMember { .. } => {
                PRIORITY_MEMBER
            }
            ConstraintKind::Disjunction { .. } => PRIORITY_DISJUNCTION,
        }
    }
}

/// Issues unique constraint ids across the extractor and the solver.
#[derive(Debug, Default)]
pub struct IdGen {
    next: u32,
}

impl IdGen {
    pub fn new() -> Self {
        IdGen::default()
    }

    pub fn starting_at(next: u32) -> Self {
        IdGen { next }
    }

    pub fn make(&mut self, kind: ConstraintKind, loc: Location) -> Constraint {
        let id = self.next;
        self.next += 1;
        Constraint { id, kind, loc }
    }

    pub fn next_id(&self) -> u32 {
        self.next
    }
}
