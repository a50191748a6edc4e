//! The constraint solver.
//!
//! A depth-first, branch-and-bound reduction of the constraint set to a
//! substitution. Constraints are processed highest-priority first;
//! decomposition products go to the front of the queue, deferred constraints
//! to the back. A deferral that reproduces an already-seen queue snapshot
//! means the system stalled: every remaining constraint is reported
//! irreducible.
//!
//! Disjunctions clone the solver state (substitution included) per choice
//! and solve the remaining system under each; the cheapest branch wins,
//! tied branches that disagree on a variable are an ambiguity.

use crate::constraint::{Choice, Constraint, ConstraintKind, IdGen, Location, PathComponent};
use crate::intern::TypeInterner;
use crate::subst::SubstitutionTable;
use crate::tables::{ConformanceTable, TypeTable};
use crate::types::{TyVarId, TypeId, TypeKey};
use aven_binder::{MemberTables, ModuleTable};
use aven_common::codes;
use aven_parser::{FunKind, NodeArena, NodeId, NodeKind};
use rustc_hash::{FxHashMap, FxHashSet};
use std::collections::VecDeque;
use tracing::{debug, trace};

/// Penalty added for every reported type error.
const ERROR_PENALTY: u32 = 100;
/// Penalty per constraint declared irreducible.
const IRREDUCIBLE_PENALTY: u32 = 1000;

/// Read-only world the solver reduces against.
pub struct SolverContext<'a> {
    pub arena: &'a NodeArena,
    pub modules: &'a ModuleTable,
    pub members: &'a MemberTables,
    pub interner: &'a TypeInterner,
    pub types: &'a TypeTable,
    pub conformances: &'a ConformanceTable,
    /// Built-in type ids to their declaration nodes, for member lookup.
    pub builtin_decls: &'a FxHashMap<TypeId, NodeId>,
}

#[derive(Debug, Clone)]
pub struct SolverError {
    pub code: u32,
    pub loc: Location,
    pub message: String,
}

#[derive(Debug, Default)]
pub struct Solution {
    pub substitutions: FxHashMap<TyVarId, TypeId>,
    pub weight: u32,
    pub errors: Vec<SolverError>,
}

pub struct Solver<'a> {
    ctx: &'a SolverContext<'a>,
    queue: VecDeque<Constraint>,
    subst: SubstitutionTable,
    ids: IdGen,
    weight: u32,
    errors: Vec<SolverError>,
    /// Queue snapshots seen at deferral time; a repeat means a stall.
    seen: FxHashSet<Vec<u32>>,
}

impl<'a> Solver<'a> {
    /// Solve a constraint system from scratch.
    pub fn solve(ctx: &'a SolverContext<'a>, constraints: Vec<Constraint>, ids: IdGen) -> Solution {
        let solver = Solver::prepare(ctx, constraints, ids, SubstitutionTable::new(), 0);
        solver
            .run(u32::MAX)
            .expect("the top-level solve cannot be pruned")
    }

    fn prepare(
        ctx: &'a SolverContext<'a>,
        mut constraints: Vec<Constraint>,
        ids: IdGen,
        subst: SubstitutionTable,
        weight: u32,
    ) -> Self {
        // Highest priority first; stable, so ties keep insertion order.
        constraints.sort_by_key(|c| std::cmp::Reverse(c.priority()));
        Solver {
            ctx,
            queue: constraints.into(),
            subst,
            ids,
            weight,
            errors: Vec::new(),
            seen: FxHashSet::default(),
        }
    }

    /// Reduce until the queue is empty. Returns `None` when the accumulated
    /// weight exceeds `best` (branch-and-bound prune; ties survive).
    fn run(mut self, best: u32) -> Option<Solution> {
        loop {
            if self.weight > best {
                trace!(weight = self.weight, best, "branch pruned");
                return None;
            }
            let Some(constraint) = self.queue.pop_front() else {
                break;
            };
            match constraint.kind.clone() {
                ConstraintKind::Equality { t, u } => self.solve_equality(t, u, &constraint.loc),
                ConstraintKind::Conformance { t, u } => self.solve_conformance(constraint, t, u),
                ConstraintKind::Specialization { t, u } => {
                    self.solve_specialization(constraint, t, u)
                }
                ConstraintKind::ValueMember { t, owner, member } => {
                    self.solve_value_member(constraint, t, owner, &member)
                }
                ConstraintKind::TypeMember { t, owner, member } => {
                    self.solve_type_member(constraint, t, owner, &member)
                }
                ConstraintKind::Disjunction { choices } => {
                    return self.solve_disjunction(constraint.loc, choices, best);
                }
            }
        }
        Some(Solution {
            substitutions: self.subst.canonized(self.ctx.interner),
            weight: self.weight,
            errors: self.errors,
        })
    }

    // -----------------------------------------------------------------------
    // Queue plumbing
    // -----------------------------------------------------------------------

    fn push_front(&mut self, kind: ConstraintKind, loc: Location) {
        let constraint = self.ids.make(kind, loc);
        self.queue.push_front(constraint);
    }

    fn push_back(&mut self, kind: ConstraintKind, loc: Location) {
        let constraint = self.ids.make(kind, loc);
        self.queue.push_back(constraint);
    }

    /// Re-insert a constraint that cannot make progress yet. If the queue
    /// has been in exactly this configuration before, the whole system is
    /// stalled and every remaining constraint becomes irreducible.
    fn defer(&mut self, constraint: Constraint) {
        self.queue.push_back(constraint);
        let mut snapshot: Vec<u32> = self.queue.iter().map(|c| c.id).collect();
        snapshot.sort_unstable();
        if !self.seen.insert(snapshot) {
            debug!("constraint system stalled");
            let stalled: Vec<Constraint> = self.queue.drain(..).collect();
            for c in stalled {
                self.error(
                    codes::IRREDUCIBLE_CONSTRAINT,
                    c.loc.clone(),
                    "type constraint is irreducible".to_string(),
                    IRREDUCIBLE_PENALTY,
                );
            }
        }
    }

    fn error(&mut self, code: u32, loc: Location, message: String, penalty: u32) {
        self.weight += penalty;
        self.errors.push(SolverError { code, loc, message });
    }

    fn display(&self, ty: TypeId) -> String {
        self.ctx.interner.display(self.ctx.arena, ty)
    }

    // -----------------------------------------------------------------------
    // Equality
    // -----------------------------------------------------------------------

    fn solve_equality(&mut self, t: TypeId, u: TypeId, loc: &Location) {
        let interner = self.ctx.interner;
        let t = self.subst.get(interner, t);
        let u = self.subst.get(interner, u);
        if t == u || t == TypeId::ERROR || u == TypeId::ERROR {
            return;
        }
        if let Some(var) = interner.var_id(t) {
            self.subst.set(u, var);
            return;
        }
        if let Some(var) = interner.var_id(u) {
            self.subst.set(t, var);
            return;
        }

        match (interner.lookup(t), interner.lookup(u)) {
            (
                TypeKey::Fun {
                    dom: dom_t,
                    codom: codom_t,
                    ..
                },
                TypeKey::Fun {
                    dom: dom_u,
                    codom: codom_u,
                    ..
                },
            ) => {
                if dom_t.len() != dom_u.len() {
                    self.incompatible(t, u, loc);
                    return;
                }
                for (i, (pt, pu)) in dom_t.iter().zip(dom_u.iter()).enumerate() {
                    let param_loc = loc.appending(PathComponent::Parameter(i));
                    if let (Some(lt), Some(lu)) = (&pt.label, &pu.label) {
                        if lt != lu {
                            self.error(
                                codes::INCORRECT_PARAMETER_LABEL,
                                param_loc.clone(),
                                format!("incorrect parameter label '{lt}', expected '{lu}'"),
                                ERROR_PENALTY,
                            );
                        }
                    }
                    if !pt.qual.quals.is_empty()
                        && !pu.qual.quals.is_empty()
                        && pt.qual.quals != pu.qual.quals
                    {
                        self.error(
                            codes::INCOMPATIBLE_TYPES,
                            param_loc.clone(),
                            "mismatched type qualifiers".to_string(),
                            ERROR_PENALTY,
                        );
                    }
                    self.push_front(
                        ConstraintKind::Equality {
                            t: pt.qual.ty,
                            u: pu.qual.ty,
                        },
                        param_loc,
                    );
                }
                self.push_front(
                    ConstraintKind::Equality {
                        t: codom_t.ty,
                        u: codom_u.ty,
                    },
                    loc.appending(PathComponent::Codomain),
                );
            }
            (
                TypeKey::BoundGeneric {
                    base: base_t,
                    bindings: bindings_t,
                },
                TypeKey::BoundGeneric {
                    base: base_u,
                    bindings: bindings_u,
                },
            ) => {
                let keys_t: Vec<TypeId> = bindings_t.iter().map(|(ph, _)| *ph).collect();
                let keys_u: Vec<TypeId> = bindings_u.iter().map(|(ph, _)| *ph).collect();
                if keys_t != keys_u {
                    self.incompatible(t, u, loc);
                    return;
                }
                for ((_, vt), (_, vu)) in bindings_t.iter().zip(bindings_u.iter()) {
                    self.push_front(
                        ConstraintKind::Equality { t: *vt, u: *vu },
                        loc.clone(),
                    );
                }
                self.push_front(
                    ConstraintKind::Equality {
                        t: base_t,
                        u: base_u,
                    },
                    loc.clone(),
                );
            }
            (TypeKey::Kind(inner_t), TypeKey::Kind(inner_u)) => {
                self.push_front(
                    ConstraintKind::Equality {
                        t: inner_t,
                        u: inner_u,
                    },
                    loc.clone(),
                );
            }
            _ => self.incompatible(t, u, loc),
        }
    }

    fn incompatible(&mut self, t: TypeId, u: TypeId, loc: &Location) {
        let message = format!(
            "incompatible types '{}' and '{}'",
            self.display(t),
            self.display(u)
        );
        self.error(codes::INCOMPATIBLE_TYPES, loc.clone(), message, ERROR_PENALTY);
    }

    // -----------------------------------------------------------------------
    // Conformance
    // -----------------------------------------------------------------------

    fn solve_conformance(&mut self, constraint: Constraint, t: TypeId, u: TypeId) {
        let interner = self.ctx.interner;
        let t = self.subst.get(interner, t);
        let u = self.subst.get(interner, u);
        let loc = constraint.loc.clone();

        if t == TypeId::ERROR || u == TypeId::ERROR {
            return;
        }

        let t_unknown = interner.is_var(t);
        let u_unknown = interner.is_var(u);

        if t_unknown && u_unknown {
            self.defer(constraint);
            return;
        }
        if t_unknown && u == TypeId::ANYTHING {
            self.defer(constraint);
            return;
        }
        if t_unknown {
            // T could be exactly U, or any type conforming to it.
            let mut choices = vec![self.choice(
                ConstraintKind::Equality { t, u },
                loc.clone(),
                1,
            )];
            for v in self.ctx.conformances.types_conforming(interner, u) {
                choices.push(self.choice(
                    ConstraintKind::Equality { t, u: v },
                    loc.clone(),
                    1,
                ));
            }
            self.push_back(ConstraintKind::Disjunction { choices }, loc);
            return;
        }
        if u_unknown {
            if t == TypeId::ANYTHING {
                if let Some(var) = interner.var_id(u) {
                    self.subst.set(TypeId::ANYTHING, var);
                }
                return;
            }
            // U is a supertype of T: exactly T, one of the interfaces T
            // conforms to, or Anything.
            let mut choices = vec![self.choice(ConstraintKind::Equality { t: u, u: t }, loc.clone(), 0)];
            for v in self.ctx.conformances.supertypes(interner, t) {
                choices.push(self.choice(ConstraintKind::Equality { t: u, u: v }, loc.clone(), 1));
            }
            choices.push(self.choice(
                ConstraintKind::Equality {
                    t: u,
                    u: TypeId::ANYTHING,
                },
                loc.clone(),
                1,
            ));
            self.push_back(ConstraintKind::Disjunction { choices }, loc);
            return;
        }

        if t == u || u == TypeId::ANYTHING || t == TypeId::NOTHING {
            return;
        }

        if let (
            TypeKey::Fun {
                dom: dom_t,
                codom: codom_t,
                ..
            },
            TypeKey::Fun {
                dom: dom_u,
                codom: codom_u,
                ..
            },
        ) = (interner.lookup(t), interner.lookup(u))
        {
            if dom_t.len() != dom_u.len() {
                self.incompatible(t, u, &loc);
                return;
            }
            for (i, (pt, pu)) in dom_t.iter().zip(dom_u.iter()).enumerate() {
                let param_loc = loc.appending(PathComponent::Parameter(i));
                if let (Some(lt), Some(lu)) = (&pt.label, &pu.label) {
                    if lt != lu {
                        self.error(
                            codes::INCORRECT_PARAMETER_LABEL,
                            param_loc.clone(),
                            format!("incorrect parameter label '{lt}', expected '{lu}'"),
                            ERROR_PENALTY,
                        );
                    }
                }
                self.push_front(
                    ConstraintKind::Conformance {
                        t: pt.qual.ty,
                        u: pu.qual.ty,
                    },
                    param_loc,
                );
            }
            self.push_front(
                ConstraintKind::Conformance {
                    t: codom_t.ty,
                    u: codom_u.ty,
                },
                loc.appending(PathComponent::Codomain),
            );
            return;
        }

        if self.ctx.conformances.conforms(interner, t, u) {
            return;
        }
        let message = format!(
            "type '{}' does not conform to '{}'",
            self.display(t),
            self.display(u)
        );
        self.error(codes::INCOMPATIBLE_TYPES, loc, message, ERROR_PENALTY);
    }

    fn choice(&mut self, kind: ConstraintKind, loc: Location, weight: u32) -> Choice {
        Choice {
            constraints: vec![self.ids.make(kind, loc)],
            weight,
        }
    }

    // -----------------------------------------------------------------------
    // Specialization
    // -----------------------------------------------------------------------

    fn solve_specialization(&mut self, constraint: Constraint, t: TypeId, u: TypeId) {
        let interner = self.ctx.interner;
        let t = self.subst.get(interner, t);
        let u = self.subst.get(interner, u);
        let loc = constraint.loc.clone();

        if u == TypeId::ERROR || t == TypeId::ERROR {
            return;
        }
        if interner.is_var(u) {
            self.defer(constraint);
            return;
        }
        match interner.lookup(u) {
            TypeKey::Fun { .. } => {
                self.push_front(ConstraintKind::Equality { t, u }, loc);
            }
            TypeKey::BoundGeneric { base, bindings } => {
                if !matches!(interner.lookup(base), TypeKey::Fun { .. }) {
                    let message =
                        format!("cannot call a value of type '{}'", self.display(u));
                    self.error(codes::INCOMPATIBLE_TYPES, loc, message, ERROR_PENALTY);
                    return;
                }
                let mapping = binding_mapping(interner, &bindings);
                let specialized = interner.substitute(base, &mapping);
                self.push_front(
                    ConstraintKind::Equality {
                        t,
                        u: specialized,
                    },
                    loc,
                );
            }
            _ => {
                let message = format!("cannot call a value of type '{}'", self.display(u));
                self.error(codes::INCOMPATIBLE_TYPES, loc, message, ERROR_PENALTY);
            }
        }
    }

    // -----------------------------------------------------------------------
    // Members
    // -----------------------------------------------------------------------

    fn solve_value_member(&mut self, constraint: Constraint, t: TypeId, owner: TypeId, member: &str) {
        let interner = self.ctx.interner;
        let owner_ty = self.subst.get(interner, owner);
        let loc = constraint.loc.clone();

        if interner.is_var(owner_ty) {
            self.defer(constraint);
            return;
        }
        if owner_ty == TypeId::ERROR {
            self.push_front(
                ConstraintKind::Equality {
                    t,
                    u: TypeId::ERROR,
                },
                loc,
            );
            return;
        }

        let Some((decl, bindings, instance)) = self.owner_decl(owner_ty) else {
            self.no_such_member(t, owner_ty, member, loc);
            return;
        };
        let candidates =
            self.ctx
                .members
                .lookup(self.ctx.arena, self.ctx.modules, decl, member);
        if candidates.is_empty() {
            self.no_such_member(t, owner_ty, member, loc);
            return;
        }

        let mapping = binding_mapping(interner, &bindings);
        let mut choices = Vec::new();
        for cand in candidates {
            let Some(cand_qual) = self.ctx.types.get(cand) else {
                continue;
            };
            // Close the owner's bindings over the member type, then open
            // whatever the member itself still leaves generic.
            let bound = interner.substitute(cand_qual.ty, &mapping);
            let (opened, _) = interner.open(bound, &FxHashMap::default());

            let method_like = matches!(
                &self.ctx.arena.get(cand).kind,
                NodeKind::Fun(f) if matches!(f.kind, FunKind::Method | FunKind::Destructor)
            );
            let mut constraints = Vec::new();
            let mut bound_to = opened;
            if instance && method_like {
                // Apply the explicit `self` currying step: the member's type
                // at an instance access is the bound member type.
                if let TypeKey::Fun { dom, codom, .. } = interner.lookup(opened) {
                    if dom.len() == 1 {
                        constraints.push(self.ids.make(
                            ConstraintKind::Conformance {
                                t: owner_ty,
                                u: dom[0].qual.ty,
                            },
                            loc.clone(),
                        ));
                        bound_to = codom.ty;
                    }
                }
            }
            constraints.push(self.ids.make(
                ConstraintKind::Equality { t, u: bound_to },
                loc.clone(),
            ));
            choices.push(Choice {
                constraints,
                weight: 0,
            });
        }

        if choices.is_empty() {
            self.no_such_member(t, owner_ty, member, loc);
        } else if choices.len() == 1 {
            for c in choices.into_iter().next().into_iter().flat_map(|c| c.constraints) {
                self.queue.push_front(c);
            }
        } else {
            self.push_back(ConstraintKind::Disjunction { choices }, loc);
        }
    }

    fn solve_type_member(&mut self, constraint: Constraint, t: TypeId, owner: TypeId, member: &str) {
        let interner = self.ctx.interner;
        let owner_ty = self.subst.get(interner, owner);
        let loc = constraint.loc.clone();

        if interner.is_var(owner_ty) {
            self.defer(constraint);
            return;
        }
        let Some((decl, _, _)) = self.owner_decl(owner_ty) else {
            self.no_such_member(t, owner_ty, member, loc);
            return;
        };
        let candidates =
            self.ctx
                .members
                .lookup(self.ctx.arena, self.ctx.modules, decl, member);
        let types: Vec<TypeId> = candidates
            .into_iter()
            .filter(|&d| self.ctx.arena.get(d).is_type_decl())
            .filter_map(|d| self.ctx.types.get(d).map(|q| q.ty))
            .collect();
        match types.as_slice() {
            [] => self.no_such_member(t, owner_ty, member, loc),
            [single] => self.push_front(ConstraintKind::Equality { t, u: *single }, loc),
            many => {
                let choices = many
                    .iter()
                    .map(|&u| self.choice(ConstraintKind::Equality { t, u }, loc.clone(), 0))
                    .collect();
                self.push_back(ConstraintKind::Disjunction { choices }, loc);
            }
        }
    }

    fn no_such_member(&mut self, t: TypeId, owner: TypeId, member: &str, loc: Location) {
        let message = format!(
            "type '{}' has no member '{member}'",
            self.display(owner)
        );
        self.error(codes::NO_SUCH_VALUE_MEMBER, loc.clone(), message, ERROR_PENALTY);
        // Keep the system flowing on the error marker.
        self.push_front(
            ConstraintKind::Equality {
                t,
                u: TypeId::ERROR,
            },
            loc,
        );
    }

    /// Decompose an owner type into (declaration, generic bindings,
    /// is-instance-access).
    fn owner_decl(&self, ty: TypeId) -> Option<(NodeId, Vec<(TypeId, TypeId)>, bool)> {
        match self.ctx.interner.lookup(ty) {
            TypeKey::Struct(decl) | TypeKey::Union(decl) | TypeKey::Interface(decl) => {
                Some((decl, Vec::new(), true))
            }
            TypeKey::Builtin(_) => self
                .ctx
                .builtin_decls
                .get(&ty)
                .map(|&decl| (decl, Vec::new(), true)),
            TypeKey::BoundGeneric { base, bindings } => {
                let (decl, _, instance) = self.owner_decl(base)?;
                Some((decl, bindings, instance))
            }
            TypeKey::Kind(inner) => {
                let (decl, bindings, _) = self.owner_decl(inner)?;
                Some((decl, bindings, false))
            }
            _ => None,
        }
    }

    // -----------------------------------------------------------------------
    // Disjunctions
    // -----------------------------------------------------------------------

    fn solve_disjunction(
        mut self,
        loc: Location,
        choices: Vec<Choice>,
        best: u32,
    ) -> Option<Solution> {
        let max_choice_weight = choices.iter().map(|c| c.weight).max().unwrap_or(0);
        let mut best_known = best;
        let mut candidates: Vec<Solution> = Vec::new();

        for choice in choices {
            let mut constraints: Vec<Constraint> = self.queue.iter().cloned().collect();
            constraints.extend(choice.constraints);
            let child = Solver {
                ctx: self.ctx,
                queue: {
                    let mut child_constraints = constraints;
                    child_constraints.sort_by_key(|c| std::cmp::Reverse(c.priority()));
                    child_constraints.into()
                },
                subst: self.subst.clone(),
                ids: IdGen::starting_at(self.ids.next_id()),
                weight: self.weight + choice.weight,
                errors: Vec::new(),
                seen: FxHashSet::default(),
            };
            if let Some(solution) = child.run(best_known) {
                if solution.weight < best_known {
                    best_known = solution.weight;
                }
                candidates.push(solution);
            }
        }

        if candidates.is_empty() {
            // Every branch exceeded the bound; the caller's other choices win.
            return None;
        }

        let min_weight = candidates.iter().map(|s| s.weight).min().unwrap_or(0);
        let mut cheapest: Vec<Solution> = candidates
            .into_iter()
            .filter(|s| s.weight == min_weight)
            .collect();
        // Identical substitutions are the same solution reached twice.
        let mut distinct: Vec<Solution> = Vec::new();
        for candidate in cheapest.drain(..) {
            if !distinct
                .iter()
                .any(|other| other.substitutions == candidate.substitutions)
            {
                distinct.push(candidate);
            }
        }

        if distinct.len() == 1 {
            let winner = distinct.pop().expect("one solution");
            let mut errors = self.errors;
            errors.extend(winner.errors);
            return Some(Solution {
                substitutions: winner.substitutions,
                weight: winner.weight,
                errors,
            });
        }

        // Equal-weight solutions that disagree: report the ambiguity and
        // continue with the bindings every solution agrees on.
        debug!(count = distinct.len(), "ambiguous disjunction");
        let mut errors = self.errors;
        errors.extend(distinct[0].errors.clone());
        errors.push(SolverError {
            code: codes::AMBIGUOUS_CONSTRAINT,
            loc,
            message: "ambiguous use; several interpretations type-check equally well".to_string(),
        });
        let combined = combined_substitutions(&distinct);
        Some(Solution {
            substitutions: combined,
            weight: min_weight + max_choice_weight,
            errors,
        })
    }
}

/// Bindings shared (and agreed upon) by every tied solution.
fn combined_substitutions(solutions: &[Solution]) -> FxHashMap<TyVarId, TypeId> {
    let first = &solutions[0].substitutions;
    first
        .iter()
        .filter(|(var, ty)| {
            solutions[1..]
                .iter()
                .all(|s| s.substitutions.get(var) == Some(ty))
        })
        .map(|(&var, &ty)| (var, ty))
        .collect()
}

/// Turn a `BoundGeneric` binding list into a placeholder-declaration map.
fn binding_mapping(
    interner: &TypeInterner,
    bindings: &[(TypeId, TypeId)],
) -> FxHashMap<NodeId, TypeId> {
    bindings
        .iter()
        .filter_map(|&(ph, value)| match interner.lookup(ph) {
            TypeKey::Placeholder(decl) => Some((decl, value)),
            _ => None,
        })
        .collect()
}
