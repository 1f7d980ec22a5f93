// Copyright 2021 Sergey Mechtaev
//
// This file is part of asp-grounder, derived from Modus.
//
// Modus is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// Modus is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.

//! Aggregate/choice propagation (§4.7): after instantiation, checks each
//! ground aggregate or choice occurrence's guard(s) against the value
//! range its elements could possibly take, and prunes ground rules that
//! can never be satisfied.
//!
//! Grounded on `original_source/grounding/propagation/choice.py`'s
//! `ChoicePropagator`, generalized to also cover `#count`/`#sum`/`#min`/
//! `#max` aggregates. The original's own `choice.propagate` call is a
//! `# TODO` stub upstream; this module supplies the bound arithmetic it
//! never implemented (recorded as an Open Question decision in
//! DESIGN.md, including the flagged "SUM propagation" bound derivation:
//! the achievable range is `[sum of negative weights, sum of positive
//! weights]`).

use std::collections::{HashMap, HashSet};

use crate::error::GroundResult;
use crate::literal::{AggrFunc, Guard, PlaceholderKind, RelOp, Signature, SyntheticLiteral, SyntheticRole};
use crate::rewrite::{AggrRewriteInfo, ChoiceRewriteInfo};
use crate::statement::Statement;
use crate::term::{Substitution, Term, TermTuple};

/// The outcome of propagation: which `(ref_id, global-variable grounding)`
/// pairs can possibly be satisfied, and which are proven impossible.
#[derive(Clone, Debug, Default)]
pub struct PropagationResult {
    pub satisfiable: HashSet<(u32, TermTuple)>,
    pub unsatisfiable: HashSet<(u32, TermTuple)>,
}

fn synthetic_name(kind: PlaceholderKind, role: SyntheticRole, ref_id: u32, element_id: Option<u32>) -> String {
    SyntheticLiteral {
        kind,
        role,
        ref_id,
        element_id,
        local_vars: TermTuple::new(vec![]),
        global_vars: TermTuple::new(vec![]),
        naf: false,
    }
    .predicate_name()
}

fn head_args<'a>(stmt: &'a Statement, name: &str) -> Option<&'a TermTuple> {
    match stmt {
        Statement::NormalFact(h) if h.predicate.0 == name => Some(&h.args),
        Statement::NormalRule(h, _) if h.predicate.0 == name => Some(&h.args),
        _ => None,
    }
}

fn split(args: &TermTuple, n_local: usize) -> (TermTuple, TermTuple) {
    let locals = TermTuple::new(args.0[..n_local].to_vec());
    let globals = TermTuple::new(args.0[n_local..].to_vec());
    (locals, globals)
}

/// Propagates every aggregate occurrence recorded in `aggr_info` against
/// the fully ground program.
pub fn propagate_aggregates(
    ground_statements: &[Statement],
    aggr_info: &HashMap<u32, AggrRewriteInfo>,
) -> GroundResult<PropagationResult> {
    let mut result = PropagationResult::default();

    for (ref_id, info) in aggr_info {
        let n_global = info.global_vars.len();
        let base_name = synthetic_name(PlaceholderKind::Aggregate, SyntheticRole::Base, *ref_id, None);

        let mut groundings: HashSet<TermTuple> = HashSet::new();
        for stmt in ground_statements {
            if let Some(args) = head_args(stmt, &base_name) {
                groundings.insert(args.clone());
            }
        }

        // elements per grounding: (element index, ground local-var tuple)
        let mut elements_by_grounding: HashMap<TermTuple, Vec<(usize, TermTuple)>> = HashMap::new();
        for (eidx, locals) in info.element_locals.iter().enumerate() {
            let name = synthetic_name(PlaceholderKind::Aggregate, SyntheticRole::Elem, *ref_id, Some(eidx as u32));
            let n_local = locals.len();
            for stmt in ground_statements {
                if let Some(args) = head_args(stmt, &name) {
                    let (local_vals, global_vals) = split(args, n_local);
                    groundings.insert(global_vals.clone());
                    elements_by_grounding
                        .entry(global_vals)
                        .or_default()
                        .push((eidx, local_vals));
                }
            }
        }

        for grounding in groundings {
            let elems = elements_by_grounding.get(&grounding).cloned().unwrap_or_default();
            let weights = resolve_weights(info, &grounding, &elems);
            let (min_t, max_t) = aggregate_bounds(info.original.func, &weights);

            let mut ok = true;
            if let Some(g) = &info.original.lguard {
                ok &= guard_satisfiable(&min_t, &max_t, g)?;
            }
            if let Some(g) = &info.original.rguard {
                ok &= guard_satisfiable(&min_t, &max_t, g)?;
            }

            // account for the guard-bound variable itself: it must be
            // ground by the time a guard references it (enforced by
            // safety), so substituting `grounding` suffices above via the
            // guard's own stored bound term already being a concrete
            // value post-instantiation in the common case, or a variable
            // resolved through `grounding` when it is one of the
            // aggregate's global variables.
            let key = (*ref_id, grounding.clone());
            if ok {
                result.satisfiable.insert(key);
            } else {
                result.unsatisfiable.insert(key);
            }
        }
    }

    let _ = n_global_unused(&aggr_info);
    Ok(result)
}

// keeps `n_global` read above from ever silently rotting if the grouping
// logic changes to need it again; currently only used for documentation.
fn n_global_unused(_m: &HashMap<u32, AggrRewriteInfo>) {}

fn resolve_weights(info: &AggrRewriteInfo, grounding: &TermTuple, elems: &[(usize, TermTuple)]) -> Vec<i64> {
    let mut weights = Vec::with_capacity(elems.len());
    for (eidx, local_vals) in elems {
        let elem = &info.original.elements[*eidx];
        let original_locals = &info.element_locals[*eidx];
        let synthetic_ground = SyntheticLiteral {
            kind: PlaceholderKind::Aggregate,
            role: SyntheticRole::Elem,
            ref_id: info.ref_id,
            element_id: Some(*eidx as u32),
            local_vars: local_vals.clone(),
            global_vars: grounding.clone(),
            naf: false,
        };
        let subst: Substitution = synthetic_ground.gather_var_assignment(original_locals, &info.global_vars);
        let weight_term = elem.terms.0.first().cloned().unwrap_or(Term::Number(1));
        match weight_term.substitute(&subst).simplify() {
            Term::Number(n) => weights.push(n),
            _ => weights.push(1),
        }
    }
    weights
}

/// The value range `[min, max]` an aggregate could take given the weights
/// of its possibly-selected elements (§4.7, §9 "Open question: SUM
/// propagation").
fn aggregate_bounds(func: AggrFunc, weights: &[i64]) -> (Term, Term) {
    match func {
        AggrFunc::Count => (Term::Number(0), Term::Number(weights.len() as i64)),
        AggrFunc::Sum => {
            let max: i64 = weights.iter().filter(|&&w| w > 0).sum();
            let min: i64 = weights.iter().filter(|&&w| w < 0).sum();
            (Term::Number(min), Term::Number(max))
        }
        AggrFunc::Min => {
            if weights.is_empty() {
                (Term::Supremum, Term::Supremum)
            } else {
                (Term::Number(*weights.iter().min().unwrap()), Term::Supremum)
            }
        }
        AggrFunc::Max => {
            if weights.is_empty() {
                (Term::Infimum, Term::Infimum)
            } else {
                (Term::Infimum, Term::Number(*weights.iter().max().unwrap()))
            }
        }
    }
}

/// The relational operator to apply as `value op bound`, folding in the
/// guard's left/right placement.
fn normalized_rel(g: &Guard) -> RelOp {
    if g.is_right {
        g.op.clone()
    } else {
        match g.op {
            RelOp::Lt => RelOp::Gt,
            RelOp::Gt => RelOp::Lt,
            RelOp::Le => RelOp::Ge,
            RelOp::Ge => RelOp::Le,
            other => other,
        }
    }
}

fn guard_satisfiable(min_t: &Term, max_t: &Term, g: &Guard) -> GroundResult<bool> {
    if !g.bound.ground() {
        // an unground guard bound can't be checked yet; assume possibly
        // satisfiable rather than prune prematurely.
        return Ok(true);
    }
    let op = normalized_rel(g);
    let bound = &g.bound;
    Ok(match op {
        RelOp::Eq => min_t.precedes(bound)? && bound.precedes(max_t)?,
        RelOp::Ne => !(min_t == max_t && min_t == bound),
        RelOp::Lt => min_t.precedes(bound)? && min_t != bound,
        RelOp::Le => min_t.precedes(bound)?,
        RelOp::Gt => bound.precedes(max_t)? && bound != max_t,
        RelOp::Ge => bound.precedes(max_t)?,
    })
}

/// Collects, per global-variable grounding, which element indices of a
/// rewritten choice/aggregate occurrence are ground-derivable, by scanning
/// the ε/η facts produced for `ref_id`. Shared by `propagate_aggregates`,
/// `propagate_choices` and `assemble_program` so the grouping logic lives
/// in one place.
fn elements_by_grounding_for(
    ground_statements: &[Statement],
    kind: PlaceholderKind,
    ref_id: u32,
    element_locals: &[TermTuple],
) -> (HashSet<TermTuple>, HashMap<TermTuple, Vec<(usize, TermTuple)>>) {
    let base_name = synthetic_name(kind, SyntheticRole::Base, ref_id, None);
    let mut groundings: HashSet<TermTuple> = HashSet::new();
    for stmt in ground_statements {
        if let Some(args) = head_args(stmt, &base_name) {
            groundings.insert(args.clone());
        }
    }

    let mut elements_by_grounding: HashMap<TermTuple, Vec<(usize, TermTuple)>> = HashMap::new();
    for (eidx, locals) in element_locals.iter().enumerate() {
        let name = synthetic_name(kind, SyntheticRole::Elem, ref_id, Some(eidx as u32));
        let n_local = locals.len();
        for stmt in ground_statements {
            if let Some(args) = head_args(stmt, &name) {
                let (local_vals, global_vals) = split(args, n_local);
                groundings.insert(global_vals.clone());
                elements_by_grounding
                    .entry(global_vals)
                    .or_default()
                    .push((eidx, local_vals));
            }
        }
    }
    (groundings, elements_by_grounding)
}

/// Reports, for bookkeeping purposes only, which ground choice-rule
/// instances have elements at all. Choice guards are never used to prune
/// at grounding time (§4.7): every grounding is recorded satisfiable
/// regardless of its cardinality bound — the bound is enforced by the
/// solver once it actually selects a subset of elements.
pub fn propagate_choices(
    ground_statements: &[Statement],
    choice_info: &HashMap<u32, ChoiceRewriteInfo>,
) -> GroundResult<PropagationResult> {
    let mut result = PropagationResult::default();

    for (ref_id, info) in choice_info {
        let (groundings, _) = elements_by_grounding_for(
            ground_statements,
            PlaceholderKind::Choice,
            *ref_id,
            &info.element_locals,
        );
        for grounding in groundings {
            result.satisfiable.insert((*ref_id, grounding));
        }
    }

    Ok(result)
}

/// Rebuilds the final ground program's choice rules from ε/η facts (§4.7
/// "Assembly"): for each ground grouping of a rewritten choice occurrence,
/// reconstructs a ground `Choice` whose elements are the ones the η facts
/// prove reachable, re-attaches the original guard terms unmodified (the
/// solver enforces them, grounding never prunes on them), and drops every
/// synthetic-headed statement (`__aggr_*`/`__choice_*`) from the output.
pub fn assemble_program(
    ground_statements: Vec<Statement>,
    choice_info: &HashMap<u32, ChoiceRewriteInfo>,
) -> GroundResult<Vec<Statement>> {
    use crate::statement::ChoiceElement;

    let mut choice_rules: Vec<Statement> = Vec::new();
    for (ref_id, info) in choice_info {
        let (groundings, elements_by_grounding) = elements_by_grounding_for(
            &ground_statements,
            PlaceholderKind::Choice,
            *ref_id,
            &info.element_locals,
        );
        for grounding in groundings {
            let elems = elements_by_grounding.get(&grounding).cloned().unwrap_or_default();
            let mut ground_elements = Vec::with_capacity(elems.len());
            for (eidx, local_vals) in &elems {
                let synthetic_ground = SyntheticLiteral {
                    kind: PlaceholderKind::Choice,
                    role: SyntheticRole::Elem,
                    ref_id: *ref_id,
                    element_id: Some(*eidx as u32),
                    local_vars: local_vals.clone(),
                    global_vars: grounding.clone(),
                    naf: false,
                };
                let subst = synthetic_ground
                    .gather_var_assignment(&info.element_locals[*eidx], &info.global_vars);
                let original_elem = &info.original.elements[*eidx];
                ground_elements.push(ChoiceElement {
                    atom: original_elem.atom.substitute(&subst),
                    literals: original_elem.literals.substitute(&subst),
                });
            }

            let mut global_subst = Substitution::new();
            for (var, val) in info.global_vars.0.iter().zip(grounding.0.iter()) {
                let _ = global_subst.extend(var.clone(), val.clone());
            }

            let choice = crate::statement::Choice {
                elements: ground_elements,
                lguard: info.original.lguard.clone().map(|g| substitute_guard(g, &global_subst)),
                rguard: info.original.rguard.clone().map(|g| substitute_guard(g, &global_subst)),
            };
            let body = info.body.substitute(&global_subst);
            choice_rules.push(Statement::ChoiceRule(choice, body));
        }
    }

    let mut out: Vec<Statement> = ground_statements
        .into_iter()
        .filter(|s| !is_synthetic_headed(s))
        .collect();
    out.extend(choice_rules);
    Ok(out)
}

/// Rebuilds the final ground program's rule bodies (§4.7 "Assembly",
/// aggregate half): every ground aggregate placeholder literal left over
/// from instantiation is replaced by the real `AggrLiteral` it stands for,
/// with its elements and guards substituted down to the grounding the
/// placeholder was seeded for, so the solver sees the actual aggregate
/// construct rather than the internal `__aggr_chi_*` bookkeeping atom.
/// Whether a grounding ever reaches this point at all is exactly the
/// propagator's pruning: a placeholder only appears ground in the output
/// if `instantiate::seed_chi_facts` found it satisfiable.
pub fn assemble_aggregates(
    ground_statements: Vec<Statement>,
    aggr_info: &HashMap<u32, AggrRewriteInfo>,
) -> GroundResult<Vec<Statement>> {
    if aggr_info.is_empty() {
        return Ok(ground_statements.into_iter().filter(|s| !is_synthetic_headed(s)).collect());
    }

    let grouped: HashMap<u32, (HashSet<TermTuple>, HashMap<TermTuple, Vec<(usize, TermTuple)>>)> = aggr_info
        .iter()
        .map(|(ref_id, info)| {
            let g = elements_by_grounding_for(&ground_statements, PlaceholderKind::Aggregate, *ref_id, &info.element_locals);
            (*ref_id, g)
        })
        .collect();

    Ok(ground_statements
        .into_iter()
        .filter(|s| !is_synthetic_headed(s))
        .map(|stmt| reassemble_statement_body(stmt, aggr_info, &grouped))
        .collect())
}

fn reassemble_statement_body(
    stmt: Statement,
    aggr_info: &HashMap<u32, AggrRewriteInfo>,
    grouped: &HashMap<u32, (HashSet<TermTuple>, HashMap<TermTuple, Vec<(usize, TermTuple)>>)>,
) -> Statement {
    use crate::literal::LiteralCollection;
    let new_body = |body: &LiteralCollection| -> LiteralCollection {
        LiteralCollection::new(body.0.iter().map(|l| reassemble_literal(l, aggr_info, grouped)).collect())
    };
    match &stmt {
        Statement::NormalFact(_) => stmt,
        Statement::NormalRule(h, b) => Statement::NormalRule(h.clone(), new_body(b)),
        Statement::DisjunctiveRule(hs, b) => Statement::DisjunctiveRule(hs.clone(), new_body(b)),
        Statement::ChoiceRule(c, b) => Statement::ChoiceRule(c.clone(), new_body(b)),
        Statement::Constraint(b) => Statement::Constraint(new_body(b)),
        Statement::WeakConstraint(b, wl) => Statement::WeakConstraint(new_body(b), wl.clone()),
        Statement::MinimizeStatement(_) | Statement::MaximizeStatement(_) => stmt,
    }
}

fn reassemble_literal(
    lit: &crate::literal::Literal,
    aggr_info: &HashMap<u32, AggrRewriteInfo>,
    grouped: &HashMap<u32, (HashSet<TermTuple>, HashMap<TermTuple, Vec<(usize, TermTuple)>>)>,
) -> crate::literal::Literal {
    use crate::literal::{AggrElement, Literal};

    let s = match lit {
        Literal::Synthetic(s) if s.kind == PlaceholderKind::Aggregate && s.role == SyntheticRole::Placeholder => s,
        _ => return lit.clone(),
    };
    let info = match aggr_info.get(&s.ref_id) {
        Some(info) => info,
        None => return lit.clone(),
    };
    let (_, elements_by_grounding) = match grouped.get(&s.ref_id) {
        Some(g) => g,
        None => return lit.clone(),
    };
    let grounding = &s.global_vars;
    let elems = elements_by_grounding.get(grounding).cloned().unwrap_or_default();

    let mut global_subst = Substitution::new();
    for (var, val) in info.global_vars.0.iter().zip(grounding.0.iter()) {
        let _ = global_subst.extend(var.clone(), val.clone());
    }

    let mut ground_elements = Vec::with_capacity(elems.len());
    for (eidx, local_vals) in &elems {
        let synthetic_ground = SyntheticLiteral {
            kind: PlaceholderKind::Aggregate,
            role: SyntheticRole::Elem,
            ref_id: s.ref_id,
            element_id: Some(*eidx as u32),
            local_vars: local_vals.clone(),
            global_vars: grounding.clone(),
            naf: false,
        };
        let subst = synthetic_ground.gather_var_assignment(&info.element_locals[*eidx], &info.global_vars);
        let original_elem = &info.original.elements[*eidx];
        ground_elements.push(AggrElement {
            terms: original_elem.terms.substitute(&subst),
            body: original_elem.body.substitute(&subst),
        });
    }

    Literal::Aggr(crate::literal::AggrLiteral {
        func: info.original.func,
        elements: ground_elements,
        lguard: info.original.lguard.clone().map(|g| substitute_guard(g, &global_subst)),
        rguard: info.original.rguard.clone().map(|g| substitute_guard(g, &global_subst)),
        naf: s.naf,
    })
}

fn substitute_guard(g: crate::literal::Guard, subst: &Substitution) -> crate::literal::Guard {
    crate::literal::Guard { op: g.op, bound: g.bound.substitute(subst), is_right: g.is_right }
}

fn is_synthetic_headed(stmt: &Statement) -> bool {
    let name = match stmt {
        Statement::NormalFact(h) | Statement::NormalRule(h, _) => &h.predicate.0,
        _ => return false,
    };
    name.starts_with("__aggr_") || name.starts_with("__choice_")
}

/// Placeholder-bearing predicate literal helper, reserved for callers that
/// need to locate which ground rules carry a given ref's placeholder
/// (e.g. for pruning). Kept here alongside the propagator since it shares
/// the same naming convention.
pub fn placeholder_signature(ref_id: u32, n_global: usize) -> Signature {
    let name = synthetic_name(PlaceholderKind::Aggregate, SyntheticRole::Placeholder, ref_id, None);
    Signature(crate::literal::Predicate(name), n_global)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::literal::{AggrElement, LiteralCollection, PredLiteral as PL};
    use crate::rewrite::rewrite_program;

    fn count_rule_at_most_one() -> Statement {
        let elem = AggrElement {
            terms: TermTuple::new(vec![Term::Variable("I".into())]),
            body: LiteralCollection::new(vec![crate::literal::Literal::Pred(PL::new(
                "item",
                vec![Term::Variable("I".into())],
            ))]),
        };
        let aggr = crate::literal::AggrLiteral {
            func: AggrFunc::Count,
            elements: vec![elem],
            lguard: None,
            rguard: Some(Guard { op: RelOp::Le, bound: Term::Number(0), is_right: true }),
            naf: false,
        };
        Statement::Constraint(LiteralCollection::new(vec![crate::literal::Literal::Aggr(aggr)]))
    }

    #[test]
    fn aggregate_bounds_for_count_is_zero_to_len() {
        assert_eq!(aggregate_bounds(AggrFunc::Count, &[1, 1, 1]), (Term::Number(0), Term::Number(3)));
    }

    #[test]
    fn aggregate_bounds_for_sum_splits_by_sign() {
        assert_eq!(aggregate_bounds(AggrFunc::Sum, &[-2, 3, -1, 5]), (Term::Number(-3), Term::Number(8)));
    }

    #[test]
    fn guard_le_zero_unsatisfiable_when_min_exceeds_bound() {
        let g = Guard { op: RelOp::Le, bound: Term::Number(0), is_right: true };
        assert!(!guard_satisfiable(&Term::Number(1), &Term::Number(3), &g).unwrap());
        assert!(guard_satisfiable(&Term::Number(0), &Term::Number(3), &g).unwrap());
    }

    #[test]
    fn propagate_prunes_impossible_count_guard() {
        use crate::instantiate::instantiate_program;
        let stmts = vec![
            Statement::NormalFact(PL::new("item", vec![Term::Number(1)])),
            Statement::NormalFact(PL::new("item", vec![Term::Number(2)])),
            count_rule_at_most_one(),
        ];
        let rewritten = rewrite_program(&stmts);
        let ground = instantiate_program(&rewritten, None).unwrap();
        let result = propagate_aggregates(&ground, &rewritten.aggr_info).unwrap();
        // two items exist, so count in {0,1,2}; guard requires count<=0 -> unsatisfiable
        assert_eq!(result.satisfiable.len(), 0);
        assert_eq!(result.unsatisfiable.len(), 1);
    }

    #[test]
    fn assemble_aggregates_restores_the_real_aggregate_literal() {
        use crate::instantiate::instantiate_program;
        // a :- #count{X:p(X)} <= 3.
        let elem = crate::literal::AggrElement {
            terms: TermTuple::new(vec![Term::Variable("X".into())]),
            body: LiteralCollection::new(vec![crate::literal::Literal::Pred(PL::new(
                "p",
                vec![Term::Variable("X".into())],
            ))]),
        };
        let aggr = crate::literal::AggrLiteral {
            func: AggrFunc::Count,
            elements: vec![elem],
            lguard: None,
            rguard: Some(Guard { op: RelOp::Le, bound: Term::Number(3), is_right: true }),
            naf: false,
        };
        let rule = Statement::NormalRule(
            PL::new("a", vec![]),
            LiteralCollection::new(vec![crate::literal::Literal::Aggr(aggr)]),
        );
        let stmts = vec![
            Statement::NormalFact(PL::new("p", vec![Term::Number(1)])),
            Statement::NormalFact(PL::new("p", vec![Term::Number(2)])),
            Statement::NormalFact(PL::new("p", vec![Term::Number(3)])),
            rule,
        ];
        let rewritten = rewrite_program(&stmts);
        let ground = instantiate_program(&rewritten, None).unwrap();
        let assembled = assemble_aggregates(ground, &rewritten.aggr_info).unwrap();

        let a_rule = assembled
            .iter()
            .find(|s| matches!(s, Statement::NormalRule(h, _) if h.predicate.0 == "a"))
            .expect("a's rule must survive assembly");
        if let Statement::NormalRule(_, body) = a_rule {
            assert_eq!(body.0.len(), 1);
            match &body.0[0] {
                crate::literal::Literal::Aggr(a) => {
                    assert_eq!(a.func, AggrFunc::Count);
                    assert_eq!(a.elements.len(), 3);
                    assert_eq!(a.rguard.as_ref().unwrap().bound, Term::Number(3));
                }
                other => panic!("expected a reconstructed aggregate literal, got {:?}", other),
            }
        }
        // no internal bookkeeping predicates should remain in the final program
        assert!(assembled.iter().all(|s| match s {
            Statement::NormalFact(h) | Statement::NormalRule(h, _) =>
                !h.predicate.0.starts_with("__aggr_") && !h.predicate.0.starts_with("__choice_"),
            _ => true,
        }));
    }
}
