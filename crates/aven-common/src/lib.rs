//! Common types shared by every phase of the Aven compiler: source spans and
//! diagnostics.

pub mod diagnostics;
pub mod span;

pub use diagnostics::{codes, Diagnostic, DiagnosticCategory, RelatedInfo};
pub use span::{LineMap, Span};
