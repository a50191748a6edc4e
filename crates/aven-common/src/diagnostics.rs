//! Diagnostics accumulated by the compiler passes.
//!
//! Semantic problems never abort a pass (the pipeline keeps running on error
//! markers); they are recorded as [`Diagnostic`]s with a stable numeric code
//! and the span of the most specific node the problem resolves to.

use crate::span::Span;
use serde::Serialize;

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize)]
pub enum DiagnosticCategory {
    Error,
    Warning,
}

/// A secondary location attached to a diagnostic, e.g. the previous
/// declaration in a duplicate-declaration report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RelatedInfo {
    pub file: String,
    pub span: Span,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Diagnostic {
    pub category: DiagnosticCategory,
    pub code: u32,
    pub file: String,
    pub span: Span,
    pub message: String,
    pub related: Vec<RelatedInfo>,
}

impl Diagnostic {
    pub fn error(file: impl Into<String>, span: Span, message: impl Into<String>, code: u32) -> Self {
        Diagnostic {
            category: DiagnosticCategory::Error,
            code,
            file: file.into(),
            span,
            message: message.into(),
            related: Vec::new(),
        }
    }

    pub fn warning(
        file: impl Into<String>,
        span: Span,
        message: impl Into<String>,
        code: u32,
    ) -> Self {
        Diagnostic {
            category: DiagnosticCategory::Warning,
            code,
            file: file.into(),
            span,
            message: message.into(),
            related: Vec::new(),
        }
    }

    pub fn with_related(mut self, file: impl Into<String>, span: Span, message: impl Into<String>) -> Self {
        self.related.push(RelatedInfo {
            file: file.into(),
            span,
            message: message.into(),
        });
        self
    }

    pub fn is_error(&self) -> bool {
        self.category == DiagnosticCategory::Error
    }
}

/// Stable diagnostic codes.
///
/// Grouped by the pass that emits them; codes are part of the tool's output
/// contract and must not be renumbered.
pub mod codes {
    // Scanner
    pub const UNEXPECTED_CHARACTER: u32 = 101;
    pub const UNTERMINATED_STRING: u32 = 102;

    // Parser
    pub const UNEXPECTED_TOKEN: u32 = 201;
    pub const EXPECTED_EXPRESSION: u32 = 202;
    pub const EXPECTED_TYPE_SIGNATURE: u32 = 203;
    pub const EXPECTED_DECLARATION: u32 = 204;

    // Name binder
    pub const UNBOUND_IDENTIFIER: u32 = 301;
    pub const INVALID_TYPE_IDENTIFIER: u32 = 302;
    pub const NON_EXISTING_NESTED_TYPE: u32 = 303;
    pub const DUPLICATE_DECLARATION: u32 = 304;
    pub const ILLEGAL_REDECLARATION: u32 = 305;

    // Constraint extraction
    pub const ILLEGAL_REASSIGNMENT: u32 = 401;
    pub const INVALID_LVALUE: u32 = 402;

    // Constraint solving
    pub const INCOMPATIBLE_TYPES: u32 = 501;
    pub const INCORRECT_PARAMETER_LABEL: u32 = 502;
    pub const NO_SUCH_VALUE_MEMBER: u32 = 503;
    pub const AMBIGUOUS_CONSTRAINT: u32 = 504;
    pub const IRREDUCIBLE_CONSTRAINT: u32 = 505;

    // Dispatch
    pub const AMBIGUOUS_FUNCTION_USE: u32 = 601;
    pub const SUPERFLUOUS_SPECIALIZATION_ARGUMENT: u32 = 602;

    // Capture analysis
    pub const ILLEGAL_TOP_LEVEL_CAPTURE: u32 = 701;
    pub const ILLEGAL_CAPTURE_IN_METHOD: u32 = 702;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn related_info_accumulates() {
        let diag = Diagnostic::error("m.aven", Span::new(0, 3), "duplicate declaration of 'x'", codes::DUPLICATE_DECLARATION)
            .with_related("m.aven", Span::new(10, 13), "previously declared here");
        assert!(diag.is_error());
        assert_eq!(diag.related.len(), 1);
        assert_eq!(diag.related[0].span, Span::new(10, 13));
    }
}
