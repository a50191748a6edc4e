//! Types, constraints, and the constraint solver for the Aven compiler.
//!
//! Every type of a compiler invocation is hash-consed by the
//! [`TypeInterner`]: structurally equal types share one [`TypeId`], so type
//! equality is index equality and the solver can skip work on ground types
//! using the flags computed at interning time.

pub mod constraint;
pub mod intern;
pub mod solve;
pub mod subst;
pub mod tables;
pub mod types;

#[cfg(test)]
mod tests;

pub use constraint::{
    Choice, Constraint, ConstraintKind, IdGen, Location, PathComponent, PRIORITY_CONFORMANCE,
    PRIORITY_DISJUNCTION, PRIORITY_EQUALITY, PRIORITY_MEMBER, PRIORITY_SPECIALIZATION,
};
pub use intern::TypeInterner;
pub use solve::{Solution, Solver, SolverContext, SolverError};
pub use subst::SubstitutionTable;
pub use tables::{ConformanceTable, TypeTable};
pub use types::{BuiltinKind, ParamType, QualType, TyVarId, TypeFlags, TypeId, TypeKey};
