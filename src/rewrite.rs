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

//! Aggregate/choice rewriting (§4.4): replaces every aggregate occurrence
//! in a rule body with a synthetic placeholder literal and emits the ε
//! (base) and η (element) rules that compute it; records the same
//! bookkeeping for choice rules so `propagate.rs` can later check their
//! cardinality guards.
//!
//! Grounded on `original_source/src/aspy/program/statements/special.py`'s
//! `AggrLiteral.rewrite`/`from_scratch` pattern and
//! `original_source/src/aspy/program/statements/choice.py`'s analogous
//! element-splitting constructor. No direct teacher analogue exists: Modus
//! has no aggregates, so the shape of the generated rules follows the
//! spec directly rather than a line-by-line port.

use std::collections::{HashMap, HashSet};

use crate::literal::{
    AggrLiteral, Literal, LiteralCollection, PlaceholderKind, SyntheticLiteral, SyntheticRole,
};
use crate::statement::{Choice, Statement};
use crate::term::{fresh_id, Term, TermTuple};

/// Everything the propagator needs to later re-derive and check one
/// rewritten aggregate occurrence.
#[derive(Clone, Debug)]
pub struct AggrRewriteInfo {
    pub original: AggrLiteral,
    pub ref_id: u32,
    pub global_vars: TermTuple,
    /// The (variable, not yet ground) local-variable tuple recorded for
    /// each element at rewrite time, in element order — lets the
    /// propagator rebuild `gather_var_assignment` once elements are
    /// ground.
    pub element_locals: Vec<TermTuple>,
}

/// Same, for a rewritten choice rule's cardinality guard.
#[derive(Clone, Debug)]
pub struct ChoiceRewriteInfo {
    pub original: Choice,
    pub ref_id: u32,
    pub global_vars: TermTuple,
    pub element_locals: Vec<TermTuple>,
    /// The rule's non-choice body, kept so assembly can re-attach it to
    /// the reconstructed `ChoiceRule` (the original statement itself is
    /// dropped from `statements`, never directly instantiated).
    pub body: LiteralCollection,
}

#[derive(Clone, Debug, Default)]
pub struct RewriteOutput {
    /// Every statement after rewriting: original rules with aggregate
    /// occurrences replaced by placeholders, plus the generated ε/η rules,
    /// in the order they were produced. Choice rules are dropped entirely
    /// here — they are reconstructed from ε/η facts during assembly.
    pub statements: Vec<Statement>,
    /// Synthetic rules that exist only to tell the dependency graph that
    /// an aggregate's owning rule depends on its base/element predicates;
    /// never handed to the instantiation engine for execution.
    pub graph_hints: Vec<Statement>,
    pub aggr_info: HashMap<u32, AggrRewriteInfo>,
    pub choice_info: HashMap<u32, ChoiceRewriteInfo>,
}

/// Rewrites an entire program (§4.4). Idempotent on a program without
/// aggregates or choice rules.
pub fn rewrite_program(statements: &[Statement]) -> RewriteOutput {
    let mut out = RewriteOutput::default();
    for stmt in statements {
        if let Some(rewritten) = rewrite_statement(stmt, &mut out) {
            out.statements.push(rewritten);
        }
    }
    out
}

fn rewrite_statement(stmt: &Statement, out: &mut RewriteOutput) -> Option<Statement> {
    if let Statement::ChoiceRule(choice, body) = stmt {
        rewrite_choice_guard(choice, body, &stmt.global_vars(), out);
        // element-local variables are never bound by the rule's own body
        // substitution, so a choice rule can't be handed to the
        // instantiation engine as-is; it is dropped here and rebuilt from
        // the ε/η facts during assembly instead.
        return None;
    }

    let body = stmt.body();
    if !body.contains_aggregates() {
        return Some(stmt.clone());
    }

    let global_vars = stmt.global_vars();
    let mut new_body_literals = Vec::with_capacity(body.0.len());
    for (i, lit) in body.0.iter().enumerate() {
        if let Literal::Aggr(a) = lit {
            let placeholder = rewrite_aggregate(a, &global_vars, &body, i, out);
            new_body_literals.push(Literal::Synthetic(placeholder));
        } else {
            new_body_literals.push(lit.clone());
        }
    }
    Some(rebuild_with_body(stmt, LiteralCollection::new(new_body_literals)))
}

pub(crate) fn rebuild_with_body(stmt: &Statement, new_body: LiteralCollection) -> Statement {
    match stmt {
        Statement::NormalFact(h) => Statement::NormalFact(h.clone()),
        Statement::NormalRule(h, _) => Statement::NormalRule(h.clone(), new_body),
        Statement::DisjunctiveRule(hs, _) => Statement::DisjunctiveRule(hs.clone(), new_body),
        Statement::ChoiceRule(c, _) => Statement::ChoiceRule(c.clone(), new_body),
        Statement::Constraint(_) => Statement::Constraint(new_body),
        Statement::WeakConstraint(_, wl) => Statement::WeakConstraint(new_body, wl.clone()),
        Statement::MinimizeStatement(e) => Statement::MinimizeStatement(e.clone()),
        Statement::MaximizeStatement(e) => Statement::MaximizeStatement(e.clone()),
    }
}

fn sorted_vars(vars: HashSet<Term>) -> TermTuple {
    let mut v: Vec<Term> = vars.into_iter().collect();
    v.sort_by_key(|t| format!("{:?}", t));
    TermTuple::new(v)
}

/// Rewrites one aggregate occurrence at `at_index` in `whole_body`,
/// returning the placeholder literal that replaces it and pushing the ε
/// rule plus one η rule per element into `out`.
fn rewrite_aggregate(
    a: &AggrLiteral,
    stmt_global_vars: &HashSet<Term>,
    whole_body: &LiteralCollection,
    at_index: usize,
    out: &mut RewriteOutput,
) -> SyntheticLiteral {
    let ref_id = fresh_id();

    let all_vars = a.vars(false);
    let gvars_set: HashSet<Term> = all_vars.intersection(stmt_global_vars).cloned().collect();
    let global_vars = sorted_vars(gvars_set.clone());

    // the rest of the rule's body: re-included in every generated rule so
    // each one stays independently safe, matching the spec's requirement
    // that ε/η rules are ordinary safe normal rules on their own.
    let context_body: Vec<Literal> = whole_body
        .0
        .iter()
        .enumerate()
        .filter(|(i, _)| *i != at_index)
        .map(|(_, l)| l.clone())
        .collect();

    let placeholder = SyntheticLiteral {
        kind: PlaceholderKind::Aggregate,
        role: SyntheticRole::Placeholder,
        ref_id,
        element_id: None,
        local_vars: TermTuple::new(vec![]),
        global_vars: global_vars.clone(),
        naf: a.naf,
    };

    let base_head = SyntheticLiteral {
        kind: PlaceholderKind::Aggregate,
        role: SyntheticRole::Base,
        ref_id,
        element_id: None,
        local_vars: TermTuple::new(vec![]),
        global_vars: global_vars.clone(),
        naf: false,
    };
    out.statements.push(Statement::NormalRule(
        base_head.as_pred_literal(),
        LiteralCollection::new(context_body.clone()),
    ));
    // the dependency graph needs an edge from the base/element predicates
    // to the placeholder so the owning rule's stratum always comes after
    // the ε/η rules that feed it; these hint rules are never executed by
    // the instantiation engine, only consulted for stratification.
    out.graph_hints.push(Statement::NormalRule(
        placeholder.as_pred_literal(),
        LiteralCollection::new(vec![Literal::Pred(base_head.as_pred_literal())]),
    ));

    let mut element_locals = Vec::with_capacity(a.elements.len());
    for (eidx, elem) in a.elements.iter().enumerate() {
        let elem_vars = elem.vars();
        let local_vars = sorted_vars(elem_vars.difference(&gvars_set).cloned().collect());
        element_locals.push(local_vars.clone());
        let elem_head = SyntheticLiteral {
            kind: PlaceholderKind::Aggregate,
            role: SyntheticRole::Elem,
            ref_id,
            element_id: Some(eidx as u32),
            local_vars,
            global_vars: global_vars.clone(),
            naf: false,
        };
        let mut elem_body = elem.body.0.clone();
        elem_body.extend(context_body.clone());
        out.statements.push(Statement::NormalRule(
            elem_head.as_pred_literal(),
            LiteralCollection::new(elem_body),
        ));
        out.graph_hints.push(Statement::NormalRule(
            placeholder.as_pred_literal(),
            LiteralCollection::new(vec![Literal::Pred(elem_head.as_pred_literal())]),
        ));
    }

    out.aggr_info.insert(
        ref_id,
        AggrRewriteInfo {
            original: a.clone(),
            ref_id,
            global_vars,
            element_locals,
        },
    );

    placeholder
}

/// Splits a choice rule's elements into ε/η bookkeeping rules so
/// `propagate.rs` can check `lguard <= count(selected) <= rguard` after
/// instantiation, mirroring `ChoicePropagator` in
/// `original_source/propagation/choice.py`.
fn rewrite_choice_guard(
    choice: &Choice,
    body: &LiteralCollection,
    stmt_global_vars: &HashSet<Term>,
    out: &mut RewriteOutput,
) {
    // base/elem rules are always emitted, guard or not: they are what lets
    // the assembly step enumerate which ground atoms each choice element
    // ranges over, independent of whether there is a cardinality bound to
    // check (§4.7 — choice guards are never used to prune at grounding
    // time, only recorded for the solver).
    let ref_id = fresh_id();
    let all_vars = choice.vars(false);
    let gvars_set: HashSet<Term> = all_vars.intersection(stmt_global_vars).cloned().collect();
    let global_vars = sorted_vars(gvars_set.clone());

    let base_head = SyntheticLiteral {
        kind: PlaceholderKind::Choice,
        role: SyntheticRole::Base,
        ref_id,
        element_id: None,
        local_vars: TermTuple::new(vec![]),
        global_vars: global_vars.clone(),
        naf: false,
    };
    out.statements.push(Statement::NormalRule(
        base_head.as_pred_literal(),
        body.clone(),
    ));

    let mut element_locals = Vec::with_capacity(choice.elements.len());
    for (eidx, elem) in choice.elements.iter().enumerate() {
        let elem_vars = elem.vars();
        let local_vars = sorted_vars(elem_vars.difference(&gvars_set).cloned().collect());
        element_locals.push(local_vars.clone());
        let elem_head = SyntheticLiteral {
            kind: PlaceholderKind::Choice,
            role: SyntheticRole::Elem,
            ref_id,
            element_id: Some(eidx as u32),
            local_vars,
            global_vars: global_vars.clone(),
            naf: false,
        };
        let mut elem_body = elem.literals.0.clone();
        elem_body.extend(body.0.clone());
        out.statements.push(Statement::NormalRule(
            elem_head.as_pred_literal(),
            LiteralCollection::new(elem_body),
        ));
    }

    out.choice_info.insert(
        ref_id,
        ChoiceRewriteInfo {
            original: choice.clone(),
            ref_id,
            global_vars,
            element_locals,
            body: body.clone(),
        },
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::literal::{AggrElement, AggrFunc, Guard, PredLiteral, RelOp};

    fn count_rule() -> Statement {
        // n(X, N) :- box(X), N = #count{ I : item(X, I) }.
        let elem = AggrElement {
            terms: TermTuple::new(vec![Term::Variable("I".into())]),
            body: LiteralCollection::new(vec![Literal::Pred(PredLiteral::new(
                "item",
                vec![Term::Variable("X".into()), Term::Variable("I".into())],
            ))]),
        };
        let aggr = AggrLiteral {
            func: AggrFunc::Count,
            elements: vec![elem],
            lguard: None,
            rguard: Some(Guard {
                op: RelOp::Eq,
                bound: Term::Variable("N".into()),
                is_right: true,
            }),
            naf: false,
        };
        Statement::NormalRule(
            PredLiteral::new("n", vec![Term::Variable("X".into()), Term::Variable("N".into())]),
            LiteralCollection::new(vec![
                Literal::Pred(PredLiteral::new("box", vec![Term::Variable("X".into())])),
                Literal::Aggr(aggr),
            ]),
        )
    }

    #[test]
    fn aggregate_occurrence_is_replaced_by_a_placeholder() {
        let mut out = RewriteOutput::default();
        let rewritten = rewrite_statement(&count_rule(), &mut out).unwrap();
        let body = rewritten.body();
        assert!(!body.contains_aggregates());
        assert!(body.0.iter().any(|l| matches!(l, Literal::Synthetic(s) if s.role == SyntheticRole::Placeholder)));
    }

    #[test]
    fn aggregate_rewrite_emits_base_and_one_element_rule() {
        let mut out = RewriteOutput::default();
        let _ = rewrite_statement(&count_rule(), &mut out);
        assert_eq!(out.statements.len(), 2);
        assert_eq!(out.aggr_info.len(), 1);
        // one graph hint per base/element rule, tying each to the placeholder
        assert_eq!(out.graph_hints.len(), 2);
    }

    #[test]
    fn aggregate_global_vars_include_guard_variable_and_shared_x() {
        let mut out = RewriteOutput::default();
        let _ = rewrite_statement(&count_rule(), &mut out);
        let info = out.aggr_info.values().next().unwrap();
        assert!(info.global_vars.0.contains(&Term::Variable("N".into())));
        assert!(info.global_vars.0.contains(&Term::Variable("X".into())));
        // the element's local iteration variable I must stay local, not global
        assert!(!info.global_vars.0.contains(&Term::Variable("I".into())));
    }

    #[test]
    fn rule_without_aggregates_is_untouched() {
        let mut out = RewriteOutput::default();
        let plain = Statement::NormalFact(PredLiteral::new("p", vec![Term::Number(1)]));
        let rewritten = rewrite_statement(&plain, &mut out).unwrap();
        assert_eq!(rewritten, plain);
        assert!(out.statements.is_empty());
    }

    #[test]
    fn choice_rule_is_dropped_but_emits_bookkeeping() {
        use crate::statement::ChoiceElement;
        let elem = ChoiceElement {
            atom: PredLiteral::new("sel", vec![Term::Variable("X".into())]),
            literals: LiteralCollection::new(vec![]),
        };
        let choice = Choice {
            elements: vec![elem],
            lguard: Some(Guard { op: RelOp::Le, bound: Term::Number(1), is_right: false }),
            rguard: Some(Guard { op: RelOp::Le, bound: Term::Number(2), is_right: true }),
        };
        let body = LiteralCollection::new(vec![Literal::Pred(PredLiteral::new(
            "cand",
            vec![Term::Variable("X".into())],
        ))]);
        let stmt = Statement::ChoiceRule(choice, body);
        let mut out = RewriteOutput::default();
        let rewritten = rewrite_statement(&stmt, &mut out);
        assert!(rewritten.is_none());
        assert_eq!(out.choice_info.len(), 1);
        // one base rule + one element rule
        assert_eq!(out.statements.len(), 2);
    }

    #[test]
    fn choice_rule_without_guard_still_emits_bookkeeping() {
        use crate::statement::ChoiceElement;
        let elem = ChoiceElement {
            atom: PredLiteral::new("sel", vec![Term::Variable("X".into())]),
            literals: LiteralCollection::new(vec![]),
        };
        let choice = Choice { elements: vec![elem], lguard: None, rguard: None };
        let body = LiteralCollection::new(vec![Literal::Pred(PredLiteral::new(
            "cand",
            vec![Term::Variable("X".into())],
        ))]);
        let stmt = Statement::ChoiceRule(choice, body);
        let mut out = RewriteOutput::default();
        let rewritten = rewrite_statement(&stmt, &mut out);
        assert!(rewritten.is_none());
        assert_eq!(out.choice_info.len(), 1);
        assert_eq!(out.statements.len(), 2);
    }
}
