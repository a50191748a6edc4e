//! Arena AST and parser for Aven.
//!
//! All modules of one compiler invocation share a single [`NodeArena`];
//! nodes refer to each other through [`NodeId`] handles, so cyclic
//! declaration graphs (a struct whose members mention the struct) need no
//! ownership gymnastics. Every node knows its owning module and its
//! innermost enclosing declaration context.

pub mod ast;
pub mod parser;

pub use ast::*;
pub use parser::Parser;
