//! Name binding for the Aven compiler.
//!
//! This crate owns the module table, the per-type member lookup tables, and
//! the name binder pass that links every identifier to the set of
//! declarations it may denote.

pub mod binder;
pub mod members;
pub mod modules;

pub use binder::NameBinder;
pub use members::MemberTables;
pub use modules::{ModuleEntry, ModuleIdent, ModuleTable};
