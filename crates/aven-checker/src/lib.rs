//! Semantic analysis pipeline for the Aven compiler.
//!
//! [`CompilerContext`] owns the shared state of one invocation (arena,
//! module table, interner, realized types). [`CompilerContext::load_module`]
//! runs the pipeline over a module: parse, name binding, type realization,
//! type checking (constraint extraction, solving, dispatch), and capture
//! analysis. Semantic problems accumulate as diagnostics; only unlocatable
//! source is a caller-visible error.

pub mod builtin;
pub mod capture;
pub mod check;
pub mod context;
pub mod dispatch;
pub mod extract;
pub mod realize;

pub use context::{CompilerContext, LoadError, ModuleLoader, StringLoader};
