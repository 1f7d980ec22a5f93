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

//! The instantiation engine (§4.6): resolves each rule's body against the
//! ground facts derived so far, stratum by stratum, producing the final
//! ground program.
//!
//! Grounded on the teacher's SLD-resolution shape in `sld.rs`
//! (`select`/`resolve`/the per-goal fixpoint loop), generalized from
//! Datalog-style single-substitution resolution to ASP-Core-2's
//! naf/built-in/synthetic-literal mix. `not` literals are never evaluated
//! for truth during grounding — only their arguments are required to be
//! ground by the time they're selected — because deciding NAF truth is the
//! solver's job; evaluating it here would be unsound for any component
//! with recursion through negation (§9).

use std::collections::{HashMap, HashSet};

use crate::depgraph::build_instantiation_sequence;
use crate::error::{GroundError, GroundResult};
use crate::literal::{Literal, PredLiteral, RelOp, Signature};
use crate::propagate::{placeholder_signature, propagate_aggregates};
use crate::rewrite::RewriteOutput;
use crate::statement::{Statement, VariableTable};
use crate::term::{Substitution, Term, TermTuple};

type FactTable = HashMap<Signature, HashSet<TermTuple>>;

fn is_chi_hint(stmt: &Statement) -> bool {
    matches!(stmt, Statement::NormalRule(h, _) if h.predicate.0.starts_with("__aggr_chi_"))
}

/// Runs the full instantiation engine over an already rewritten program
/// (aggregates/choices split by `rewrite::rewrite_program`). `cancel`, if
/// given, is polled once per stratum-fixpoint iteration (§5): a non-async
/// cooperative cancellation point rather than a runtime dependency.
///
/// `rewritten.graph_hints` never gets executed directly — it only exists so
/// the dependency graph places an aggregate's ε/η rules in an earlier
/// stratum than the rule consuming its placeholder. Whichever stratum a
/// hint lands in is exactly where this function seeds the placeholder's
/// facts by calling `propagate::propagate_aggregates` over everything
/// derived so far.
pub fn instantiate_program(
    rewritten: &RewriteOutput,
    cancel: Option<&dyn Fn() -> bool>,
) -> GroundResult<Vec<Statement>> {
    let purified: Vec<Statement> = rewritten
        .statements
        .iter()
        .map(|s| {
            let mut vt = VariableTable::new();
            s.replace_arith(&mut vt)
        })
        .collect();

    for s in &purified {
        if !s.safe() {
            return Err(GroundError::UnsafeStatement {
                statement: s.to_string(),
                detail: "a global variable is not proven safe by the rule's body".to_string(),
            });
        }
    }

    let mut combined = purified.clone();
    combined.extend(rewritten.graph_hints.iter().cloned());

    let sequence = build_instantiation_sequence(&combined);
    let mut facts: FactTable = HashMap::new();
    let mut output = Vec::new();
    let mut produced: HashSet<Statement> = HashSet::new();

    for stmts in &sequence.statements_by_stratum {
        let real: Vec<Statement> = stmts.iter().filter(|s| !is_chi_hint(s)).cloned().collect();
        run_stratum(&real, &mut facts, &mut output, &mut produced, cancel)?;
        // cheap to recompute every stratum since it is derived entirely
        // from `output`'s accumulated base/element facts, which only grow.
        seed_chi_facts(&output, &rewritten.aggr_info, &mut facts)?;
    }

    Ok(output)
}

/// Inserts a fact for every `(ref_id, grounding)` pair that propagation
/// proves satisfiable, under the placeholder predicate's signature, so
/// later strata can resolve the placeholder literal like any other
/// positive body literal.
fn seed_chi_facts(
    output: &[Statement],
    aggr_info: &HashMap<u32, crate::rewrite::AggrRewriteInfo>,
    facts: &mut FactTable,
) -> GroundResult<()> {
    if aggr_info.is_empty() {
        return Ok(());
    }
    let result = propagate_aggregates(output, aggr_info)?;
    for (ref_id, grounding) in result.satisfiable {
        let info = &aggr_info[&ref_id];
        let sig = placeholder_signature(ref_id, info.global_vars.len());
        facts.entry(sig).or_default().insert(grounding);
    }
    Ok(())
}

/// Runs one stratum to a fixpoint: every rule in it is re-resolved against
/// the current fact table until a full pass adds nothing new.
///
/// This is a naive (not semi-naive) fixpoint: every round re-derives every
/// already-known consequence along with any new ones. Simpler to read and
/// to get right than tracking per-round deltas, at the cost of redundant
/// work on large strata.
fn run_stratum(
    stmts: &[Statement],
    facts: &mut FactTable,
    output: &mut Vec<Statement>,
    produced: &mut HashSet<Statement>,
    cancel: Option<&dyn Fn() -> bool>,
) -> GroundResult<()> {
    loop {
        if let Some(c) = cancel {
            if c() {
                return Err(GroundError::Cancelled);
            }
        }
        let mut changed = false;
        for stmt in stmts {
            for (ground_stmt, new_facts) in ground_statement(stmt, facts)? {
                if produced.insert(ground_stmt.clone()) {
                    changed = true;
                    output.push(ground_stmt);
                }
                for (sig, args) in new_facts {
                    if facts.entry(sig).or_default().insert(args) {
                        changed = true;
                    }
                }
            }
        }
        if !changed {
            return Ok(());
        }
    }
}

/// Grounds every instance of `stmt` derivable from `facts`, returning each
/// ground statement paired with the head facts it newly contributes.
fn ground_statement(
    stmt: &Statement,
    facts: &FactTable,
) -> GroundResult<Vec<(Statement, Vec<(Signature, TermTuple)>)>> {
    if stmt.contains_aggregates() {
        return Err(GroundError::AggregateInBody {
            statement: stmt.to_string(),
        });
    }

    let body = stmt.body();
    let substitutions = resolve_body(&body.0, facts, stmt)?;

    let mut out = Vec::with_capacity(substitutions.len());
    for subst in substitutions {
        let grounded = stmt.substitute(&subst);
        if !grounded.ground() {
            return Err(GroundError::InternalInvariant {
                detail: format!("statement not fully ground after resolution: {}", grounded),
            });
        }
        let new_facts = head_facts(&grounded);
        out.push((grounded, new_facts));
    }
    Ok(out)
}

fn head_facts(stmt: &Statement) -> Vec<(Signature, TermTuple)> {
    match stmt {
        Statement::NormalFact(h) => vec![(h.signature(), h.args.clone())],
        Statement::NormalRule(h, _) => vec![(h.signature(), h.args.clone())],
        Statement::DisjunctiveRule(hs, _) => hs.iter().map(|h| (h.signature(), h.args.clone())).collect(),
        Statement::ChoiceRule(c, _) => c
            .elements
            .iter()
            .map(|e| (e.atom.signature(), e.atom.args.clone()))
            .collect(),
        Statement::Constraint(_)
        | Statement::WeakConstraint(_, _)
        | Statement::MinimizeStatement(_)
        | Statement::MaximizeStatement(_) => Vec::new(),
    }
}

/// Resolves a rule body against `facts`, returning every ground
/// substitution that satisfies it. Literals are processed in a selection
/// order computed once per rule (§4.6, mirroring `sld::select`): a literal
/// is selected only once every variable it needs is already bound by an
/// earlier selection.
fn resolve_body(
    literals: &[Literal],
    facts: &FactTable,
    owning_stmt: &Statement,
) -> GroundResult<Vec<Substitution>> {
    let order = select_order(literals).map_err(|_| GroundError::UnsafeRule {
        statement: owning_stmt.to_string(),
    })?;

    let mut frontier = vec![Substitution::new()];
    for idx in order {
        let lit = &literals[idx];
        let mut next_frontier = Vec::new();
        for subst in &frontier {
            let grounded_lit = lit.substitute(subst);
            match &grounded_lit {
                Literal::Pred(p) if !p.naf => {
                    next_frontier.extend(match_positive(p, facts, subst));
                }
                Literal::Synthetic(s) => {
                    let p = s.as_pred_literal();
                    next_frontier.extend(match_positive(&p, facts, subst));
                }
                Literal::Pred(p) => {
                    // p.naf == true here
                    if !grounded_lit.ground() {
                        return Err(GroundError::InternalInvariant {
                            detail: format!("naf literal not ground after selection: {}", p),
                        });
                    }
                    next_frontier.push(subst.clone());
                }
                Literal::Builtin(b) => {
                    if b.ground() {
                        if b.eval() == Some(true) {
                            next_frontier.push(subst.clone());
                        }
                    } else if let Some(s2) = try_bind_builtin(b, subst) {
                        next_frontier.push(s2);
                    } else {
                        return Err(GroundError::InternalInvariant {
                            detail: format!("built-in literal not ground after selection: {}", b),
                        });
                    }
                }
                Literal::Aggr(_) => {
                    return Err(GroundError::AggregateInBody {
                        statement: owning_stmt.to_string(),
                    });
                }
            }
        }
        frontier = next_frontier;
        if frontier.is_empty() {
            break;
        }
    }
    Ok(frontier)
}

fn match_positive(p: &PredLiteral, facts: &FactTable, subst: &Substitution) -> Vec<Substitution> {
    let sig = p.signature();
    let mut out = Vec::new();
    if let Some(candidates) = facts.get(&sig) {
        for cand_args in candidates {
            let candidate = PredLiteral {
                predicate: p.predicate.clone(),
                args: cand_args.clone(),
                neg: p.neg,
                naf: false,
            };
            if let Some(m) = p.try_match(&candidate) {
                if let Ok(composed) = subst.compose_extend(&m) {
                    out.push(composed);
                }
            }
        }
    }
    out
}

/// Binds the free side of an equality built-in whose other side is already
/// ground (§4.2's "pure assignment" shape produced by `replace_arith`).
fn try_bind_builtin(b: &crate::literal::BuiltinLiteral, subst: &Substitution) -> Option<Substitution> {
    if b.op != RelOp::Eq {
        return None;
    }
    let lhs_is_var = matches!(b.lhs, Term::Variable(_) | Term::AnonVariable(_) | Term::ArithVariable(_, _));
    let rhs_is_var = matches!(b.rhs, Term::Variable(_) | Term::AnonVariable(_) | Term::ArithVariable(_, _));

    if lhs_is_var && b.rhs.ground() && !b.rhs.vars(false).contains(&b.lhs) {
        let mut s = subst.clone();
        s.extend(b.lhs.clone(), b.rhs.simplify()).ok()?;
        Some(s)
    } else if rhs_is_var && b.lhs.ground() && !b.lhs.vars(false).contains(&b.rhs) {
        let mut s = subst.clone();
        s.extend(b.rhs.clone(), b.lhs.simplify()).ok()?;
        Some(s)
    } else {
        None
    }
}

fn select_order(literals: &[Literal]) -> Result<Vec<usize>, ()> {
    let mut bound: HashSet<Term> = HashSet::new();
    let mut remaining: Vec<usize> = (0..literals.len()).collect();
    let mut order = Vec::with_capacity(literals.len());

    while !remaining.is_empty() {
        let pick = remaining.iter().position(|&i| is_resolvable(&literals[i], &bound));
        match pick {
            Some(pos) => {
                let idx = remaining.remove(pos);
                bound.extend(resolvable_binds(&literals[idx], &bound));
                order.push(idx);
            }
            None => return Err(()),
        }
    }
    Ok(order)
}

fn is_resolvable(lit: &Literal, bound: &HashSet<Term>) -> bool {
    match lit {
        Literal::Pred(p) if !p.naf => true,
        Literal::Synthetic(_) => true,
        Literal::Pred(p) => p.vars(false).iter().all(|v| bound.contains(v)),
        Literal::Builtin(b) => {
            let unbound = b.vars().iter().filter(|v| !bound.contains(*v)).count();
            unbound == 0 || (unbound == 1 && b.op == RelOp::Eq)
        }
        Literal::Aggr(_) => false,
    }
}

fn resolvable_binds(lit: &Literal, bound: &HashSet<Term>) -> HashSet<Term> {
    match lit {
        Literal::Pred(p) if !p.naf => p.vars(false),
        Literal::Synthetic(s) => s.vars(false),
        Literal::Builtin(b) => b.vars().difference(bound).cloned().collect(),
        _ => HashSet::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::literal::LiteralCollection;
    use crate::statement::op2arith;
    use crate::term::ArithOp;

    fn fact(name: &str, n: i64) -> Statement {
        Statement::NormalFact(PredLiteral::new(name, vec![Term::Number(n)]))
    }

    fn ground_all(stmts: &[Statement], cancel: Option<&dyn Fn() -> bool>) -> GroundResult<Vec<Statement>> {
        let rewritten = crate::rewrite::rewrite_program(stmts);
        instantiate_program(&rewritten, cancel)
    }

    #[test]
    fn grounds_a_simple_rule_over_two_facts() {
        let stmts = vec![
            fact("p", 1),
            fact("p", 2),
            Statement::NormalRule(
                PredLiteral::new("q", vec![Term::Variable("X".into())]),
                LiteralCollection::new(vec![Literal::Pred(PredLiteral::new(
                    "p",
                    vec![Term::Variable("X".into())],
                ))]),
            ),
        ];
        let ground = ground_all(&stmts, None).unwrap();
        let qs: Vec<_> = ground
            .iter()
            .filter(|s| matches!(s, Statement::NormalFact(h) | Statement::NormalRule(h, _) if h.predicate.0 == "q"))
            .collect();
        assert_eq!(qs.len(), 2);
    }

    #[test]
    fn naf_literal_is_retained_ground_not_evaluated() {
        let mut naf = PredLiteral::new("r", vec![Term::Variable("X".into())]);
        naf.naf = true;
        let stmts = vec![
            fact("p", 1),
            Statement::NormalRule(
                PredLiteral::new("q", vec![Term::Variable("X".into())]),
                LiteralCollection::new(vec![
                    Literal::Pred(PredLiteral::new("p", vec![Term::Variable("X".into())])),
                    Literal::Pred(naf),
                ]),
            ),
        ];
        let ground = ground_all(&stmts, None).unwrap();
        let q_rule = ground
            .iter()
            .find(|s| matches!(s, Statement::NormalRule(h, _) if h.predicate.0 == "q"))
            .unwrap();
        if let Statement::NormalRule(_, body) = q_rule {
            assert!(body.0.iter().any(|l| matches!(l, Literal::Pred(p) if p.naf)));
        } else {
            panic!("expected a normal rule");
        }
    }

    #[test]
    fn builtin_equality_binds_free_variable() {
        let stmts = vec![
            fact("p", 1),
            Statement::NormalRule(
                PredLiteral::new("double", vec![Term::Variable("Y".into())]),
                LiteralCollection::new(vec![
                    Literal::Pred(PredLiteral::new("p", vec![Term::Variable("X".into())])),
                    crate::literal::op2rel(
                        RelOp::Eq,
                        Term::Variable("Y".into()),
                        op2arith(ArithOp::Mul, Term::Variable("X".into()), Term::Number(2)),
                    ),
                ]),
            ),
        ];
        let ground = ground_all(&stmts, None).unwrap();
        let has_double_2 = ground.iter().any(|s| match s {
            Statement::NormalFact(h) | Statement::NormalRule(h, _) => {
                h.predicate.0 == "double" && h.args.0 == vec![Term::Number(2)]
            }
            _ => false,
        });
        assert!(has_double_2);
    }

    #[test]
    fn unsafe_rule_is_rejected() {
        let mut naf = PredLiteral::new("p", vec![Term::Variable("X".into())]);
        naf.naf = true;
        let stmts = vec![Statement::NormalRule(
            PredLiteral::new("q", vec![Term::Variable("X".into())]),
            LiteralCollection::new(vec![Literal::Pred(naf)]),
        )];
        assert!(ground_all(&stmts, None).is_err());
    }

    #[test]
    fn cancellation_is_observed() {
        let stmts = vec![fact("p", 1)];
        let cancel = || true;
        let result = ground_all(&stmts, Some(&cancel));
        assert!(matches!(result, Err(GroundError::Cancelled)));
    }
}
