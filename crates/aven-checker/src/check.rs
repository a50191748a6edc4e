//! The type checker: constraint extraction, solving, and dispatch for one
//! module.

use crate::context::CompilerContext;
use crate::{dispatch, extract};
use aven_common::Diagnostic;
use aven_parser::{NodeId, NodeKind};
use aven_solver::{Solver, SolverContext, SolverError};
use tracing::{debug, span, Level};

pub fn check_module(ctx: &mut CompilerContext, root: NodeId) -> Vec<Diagnostic> {
    let file = match &ctx.arena.get(root).kind {
        NodeKind::Module(m) => m.name.clone(),
        _ => String::from("<module>"),
    };
    let _span = span!(Level::DEBUG, "check_module", module = %file).entered();

    let extraction = extract::extract_module(
        &ctx.arena,
        &ctx.interner,
        &mut ctx.types,
        &ctx.collections,
        root,
    );
    let mut diagnostics = extraction.diagnostics;
    debug!(count = extraction.constraints.len(), "extracted constraints");

    let solution = {
        let solver_ctx = SolverContext {
            arena: &ctx.arena,
            modules: &ctx.modules,
            members: &ctx.members,
            interner: &ctx.interner,
            types: &ctx.types,
            conformances: &ctx.conformances,
            builtin_decls: &ctx.builtin_decls,
        };
        Solver::solve(&solver_ctx, extraction.constraints, extraction.ids)
    };
    debug!(
        weight = solution.weight,
        errors = solution.errors.len(),
        "solved constraint system"
    );

    for error in &solution.errors {
        diagnostics.push(render_solver_error(ctx, &file, error));
    }

    let dispatch_diags =
        dispatch::dispatch_module(&mut ctx.arena, &ctx.interner, &mut ctx.types, &solution, root);
    diagnostics.extend(dispatch_diags);
    diagnostics
}

/// Resolve a solver error's `(anchor, path)` location to the most specific
/// node and render it as a diagnostic.
fn render_solver_error(ctx: &CompilerContext, file: &str, error: &SolverError) -> Diagnostic {
    let node = error.loc.resolve(&ctx.arena);
    let span = ctx.arena.get(node).span;
    Diagnostic::error(file, span, error.message.clone(), error.code)
}
