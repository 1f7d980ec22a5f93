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

//! Statements (§3, §4.2): facts, rules, constraints, weak constraints and
//! optimization statements, each offering the `head`/`body`/`ground`/
//! `safe` views spec §4.2 requires.
//!
//! Grounded structurally on `logic::Clause { head, body }` from the
//! teacher, generalized to the full ASP-Core-2 statement set per
//! `original_source/statement.py` and
//! `original_source/src/aspy/program/statements/*.py`.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::literal::{validate_guard_pair, Guard, Literal, LiteralCollection, PredLiteral};
use crate::term::{ArithOp, Substitution, Term, TermTuple};

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChoiceElement {
    pub atom: PredLiteral,
    pub literals: LiteralCollection,
}

impl ChoiceElement {
    pub fn vars(&self) -> std::collections::HashSet<Term> {
        let mut v = self.atom.vars(false);
        v.extend(self.literals.vars(false));
        v
    }

    pub fn substitute(&self, subst: &Substitution) -> ChoiceElement {
        ChoiceElement {
            atom: self.atom.substitute(subst),
            literals: self.literals.substitute(subst),
        }
    }

    pub fn ground(&self) -> bool {
        self.atom.ground() && self.literals.0.iter().all(Literal::ground)
    }
}

impl fmt::Display for ChoiceElement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.atom, self.literals)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Choice {
    pub elements: Vec<ChoiceElement>,
    pub lguard: Option<Guard>,
    pub rguard: Option<Guard>,
}

impl Choice {
    pub fn ground(&self) -> bool {
        self.elements.iter().all(ChoiceElement::ground)
            && self.lguard.as_ref().map_or(true, |g| g.bound.ground())
            && self.rguard.as_ref().map_or(true, |g| g.bound.ground())
    }

    pub fn vars(&self, global_only: bool) -> std::collections::HashSet<Term> {
        let mut v = std::collections::HashSet::new();
        if let Some(g) = &self.lguard {
            v.extend(g.vars());
        }
        if let Some(g) = &self.rguard {
            v.extend(g.vars());
        }
        if !global_only {
            for e in &self.elements {
                v.extend(e.vars());
            }
        }
        v
    }

    pub fn substitute(&self, subst: &Substitution) -> Choice {
        Choice {
            elements: self.elements.iter().map(|e| e.substitute(subst)).collect(),
            lguard: self.lguard.as_ref().map(|g| g.substitute(subst)),
            rguard: self.rguard.as_ref().map(|g| g.substitute(subst)),
        }
    }

    /// A `lguard` must be the left side of `bound op {...}` and an `rguard`
    /// the right side of `{...} op bound` — `is_right` disagreeing with the
    /// field it's stored in is not a guard this crate can interpret.
    pub fn validate_guards(&self) -> Result<(), crate::error::GroundError> {
        validate_guard_pair(&self.lguard, &self.rguard)
    }
}

impl fmt::Display for Choice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(g) = &self.lguard {
            write!(f, "{} {} ", g.bound, g.op)?;
        }
        write!(
            f,
            "{{{}}}",
            self.elements.iter().map(|e| e.to_string()).collect::<Vec<_>>().join("; ")
        )?;
        if let Some(g) = &self.rguard {
            write!(f, " {} {}", g.op, g.bound)?;
        }
        Ok(())
    }
}

/// `w@l, t_1,...,t_k` in a weak constraint (§3).
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WeightAtLevel {
    pub weight: Term,
    pub level: Term,
    pub terms: TermTuple,
}

impl WeightAtLevel {
    pub fn ground(&self) -> bool {
        self.weight.ground() && self.level.ground() && self.terms.ground()
    }

    pub fn vars(&self) -> std::collections::HashSet<Term> {
        let mut v = self.weight.vars(false);
        v.extend(self.level.vars(false));
        v.extend(self.terms.vars(false));
        v
    }

    pub fn substitute(&self, subst: &Substitution) -> WeightAtLevel {
        WeightAtLevel {
            weight: self.weight.substitute(subst),
            level: self.level.substitute(subst),
            terms: self.terms.substitute(subst),
        }
    }
}

impl fmt::Display for WeightAtLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.weight, self.level)?;
        if !self.terms.is_empty() {
            write!(f, ", {}", self.terms)?;
        }
        Ok(())
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MinMaxElement {
    pub weight: Term,
    pub level: Term,
    pub terms: TermTuple,
    pub body: LiteralCollection,
}

/// The full statement algebra (§3).
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Statement {
    NormalFact(PredLiteral),
    NormalRule(PredLiteral, LiteralCollection),
    DisjunctiveRule(Vec<PredLiteral>, LiteralCollection),
    ChoiceRule(Choice, LiteralCollection),
    Constraint(LiteralCollection),
    WeakConstraint(LiteralCollection, WeightAtLevel),
    MinimizeStatement(Vec<MinMaxElement>),
    MaximizeStatement(Vec<MinMaxElement>),
}

impl Statement {
    pub fn head(&self) -> LiteralCollection {
        match self {
            Statement::NormalFact(h) => LiteralCollection::new(vec![Literal::Pred(h.clone())]),
            Statement::NormalRule(h, _) => LiteralCollection::new(vec![Literal::Pred(h.clone())]),
            Statement::DisjunctiveRule(hs, _) => {
                LiteralCollection::new(hs.iter().cloned().map(Literal::Pred).collect())
            }
            Statement::ChoiceRule(_, _) => LiteralCollection::new(vec![]),
            Statement::Constraint(_) => LiteralCollection::new(vec![]),
            Statement::WeakConstraint(_, _) => LiteralCollection::new(vec![]),
            Statement::MinimizeStatement(_) | Statement::MaximizeStatement(_) => {
                LiteralCollection::new(vec![])
            }
        }
    }

    pub fn body(&self) -> LiteralCollection {
        match self {
            Statement::NormalFact(_) => LiteralCollection::new(vec![]),
            Statement::NormalRule(_, b) => b.clone(),
            Statement::DisjunctiveRule(_, b) => b.clone(),
            Statement::ChoiceRule(_, b) => b.clone(),
            Statement::Constraint(b) => b.clone(),
            Statement::WeakConstraint(b, _) => b.clone(),
            Statement::MinimizeStatement(elems) | Statement::MaximizeStatement(elems) => {
                let mut out = Vec::new();
                for e in elems {
                    out.extend(e.body.0.clone());
                }
                LiteralCollection::new(out)
            }
        }
    }

    pub fn ground(&self) -> bool {
        match self {
            Statement::NormalFact(h) => h.ground(),
            Statement::NormalRule(h, b) => h.ground() && b.0.iter().all(Literal::ground),
            Statement::DisjunctiveRule(hs, b) => {
                hs.iter().all(PredLiteral::ground) && b.0.iter().all(Literal::ground)
            }
            Statement::ChoiceRule(c, b) => c.ground() && b.0.iter().all(Literal::ground),
            Statement::Constraint(b) => b.0.iter().all(Literal::ground),
            Statement::WeakConstraint(b, wl) => b.0.iter().all(Literal::ground) && wl.ground(),
            Statement::MinimizeStatement(elems) | Statement::MaximizeStatement(elems) => elems
                .iter()
                .all(|e| e.weight.ground() && e.level.ground() && e.terms.ground() && e.body.0.iter().all(Literal::ground)),
        }
    }

    /// Global variables: those appearing outside every aggregate/choice
    /// element (§3). For a head literal, all of its variables are global
    /// (heads cannot contain aggregate elements in ASP-Core-2).
    pub fn global_vars(&self) -> std::collections::HashSet<Term> {
        let mut v = self.head().vars(false);
        v.extend(self.body_global_vars());
        v
    }

    fn body_global_vars(&self) -> std::collections::HashSet<Term> {
        let mut v = std::collections::HashSet::new();
        for l in &self.body().0 {
            v.extend(l.vars(true));
        }
        if let Statement::ChoiceRule(c, _) = self {
            v.extend(c.vars(true));
        }
        v
    }

    pub fn contains_aggregates(&self) -> bool {
        self.body().contains_aggregates()
    }

    /// Rejects malformed guard specifications (§9 "dead code in choice
    /// guard processing") before rewriting ever sees them: a choice rule's
    /// own guards, and every aggregate literal's guards anywhere in the
    /// body, must have `is_right` consistent with which side they were
    /// parsed on.
    pub fn validate_guards(&self) -> Result<(), crate::error::GroundError> {
        if let Statement::ChoiceRule(c, _) = self {
            c.validate_guards()?;
        }
        for l in &self.body().0 {
            if let Literal::Aggr(a) = l {
                a.validate_guards()?;
            }
        }
        Ok(())
    }

    pub fn substitute(&self, subst: &Substitution) -> Statement {
        match self {
            Statement::NormalFact(h) => Statement::NormalFact(h.substitute(subst)),
            Statement::NormalRule(h, b) => Statement::NormalRule(h.substitute(subst), b.substitute(subst)),
            Statement::DisjunctiveRule(hs, b) => Statement::DisjunctiveRule(
                hs.iter().map(|h| h.substitute(subst)).collect(),
                b.substitute(subst),
            ),
            Statement::ChoiceRule(c, b) => Statement::ChoiceRule(c.substitute(subst), b.substitute(subst)),
            Statement::Constraint(b) => Statement::Constraint(b.substitute(subst)),
            Statement::WeakConstraint(b, wl) => {
                Statement::WeakConstraint(b.substitute(subst), wl.substitute(subst))
            }
            Statement::MinimizeStatement(elems) => {
                Statement::MinimizeStatement(elems.iter().map(|e| substitute_minmax(e, subst)).collect())
            }
            Statement::MaximizeStatement(elems) => {
                Statement::MaximizeStatement(elems.iter().map(|e| substitute_minmax(e, subst)).collect())
            }
        }
    }

    /// A statement is safe iff the closure of its body's safety equals
    /// `SafetyTriplet(global_vars)` (§4.3).
    pub fn safe(&self) -> bool {
        let global_vars = self.global_vars();
        let body_safety = self.body().safety(&global_vars);
        // a constraint/rule is safe once every global variable ended up in
        // `safe` with no leftover unsafe variables or pending rules.
        global_vars.iter().all(|v| body_safety.safe.contains(v))
            && body_safety.unsafe_vars.iter().all(|v| !global_vars.contains(v))
    }

    /// Walks the statement and replaces each arithmetic sub-term that
    /// depends on a variable by a fresh `ArithVariable`, registering the
    /// mapping in `var_table` (§4.2). Mandatory before instantiation: every
    /// body literal must be a pure pattern afterwards, with a built-in
    /// equality enforcing `ArithVariable_i = arith_term`.
    pub fn replace_arith(&self, var_table: &mut VariableTable) -> Statement {
        let mut extra_builtins = Vec::new();
        let new_body = LiteralCollection::new(
            self.body()
                .0
                .iter()
                .map(|l| replace_arith_in_literal(l, var_table, &mut extra_builtins))
                .collect(),
        );
        let new_body = new_body.concat(&LiteralCollection::new(extra_builtins));

        match self {
            Statement::NormalFact(h) => Statement::NormalFact(h.clone()),
            Statement::NormalRule(h, _) => Statement::NormalRule(h.clone(), new_body),
            Statement::DisjunctiveRule(hs, _) => Statement::DisjunctiveRule(hs.clone(), new_body),
            Statement::ChoiceRule(c, _) => Statement::ChoiceRule(c.clone(), new_body),
            Statement::Constraint(_) => Statement::Constraint(new_body),
            Statement::WeakConstraint(_, wl) => Statement::WeakConstraint(new_body, wl.clone()),
            Statement::MinimizeStatement(elems) => Statement::MinimizeStatement(elems.clone()),
            Statement::MaximizeStatement(elems) => Statement::MaximizeStatement(elems.clone()),
        }
    }
}

fn substitute_minmax(e: &MinMaxElement, subst: &Substitution) -> MinMaxElement {
    MinMaxElement {
        weight: e.weight.substitute(subst),
        level: e.level.substitute(subst),
        terms: e.terms.substitute(subst),
        body: e.body.substitute(subst),
    }
}

/// Registers fresh `ArithVariable`s produced by `replace_arith`, mirroring
/// the teacher's per-statement ownership of auxiliary state (§5: "The
/// `VariableTable` per statement is owned by that statement").
#[derive(Clone, Debug, Default)]
pub struct VariableTable {
    pub assignments: HashMap<Term, Term>,
}

impl VariableTable {
    pub fn new() -> Self {
        VariableTable::default()
    }

    fn register(&mut self, arith: &Term) -> Term {
        if let Some(existing) = self
            .assignments
            .iter()
            .find(|(_, v)| *v == arith)
            .map(|(k, _)| k.clone())
        {
            return existing;
        }
        let id = crate::term::fresh_id();
        let var = Term::ArithVariable(id, Box::new(arith.clone()));
        self.assignments.insert(var.clone(), arith.clone());
        var
    }
}

fn term_has_arith_over_var(t: &Term) -> bool {
    match t {
        Term::ArithTerm(_, l, r) => !t.ground() || term_has_arith_over_var(l) || term_has_arith_over_var(r),
        Term::Minus(inner) => !t.ground() || term_has_arith_over_var(inner),
        _ => false,
    }
}

/// Recursively replaces any arithmetic sub-term depending on a variable
/// with a fresh `ArithVariable`, pushing `ArithVariable = expr` equality
/// built-ins into `extra_builtins`.
fn replace_term_arith(t: &Term, var_table: &mut VariableTable, extra_builtins: &mut Vec<Literal>) -> Term {
    if term_has_arith_over_var(t) {
        let simplified = t.simplify();
        if simplified.ground() {
            return simplified;
        }
        let var = var_table.register(&simplified);
        let already_present = extra_builtins.iter().any(|l| {
            matches!(l, Literal::Builtin(b) if b.lhs == var && b.rhs == simplified)
        });
        if !already_present {
            extra_builtins.push(Literal::Builtin(crate::literal::BuiltinLiteral {
                op: crate::literal::RelOp::Eq,
                lhs: var.clone(),
                rhs: simplified,
            }));
        }
        var
    } else if let Term::Functional(name, args) = t {
        Term::Functional(
            name.clone(),
            args.iter().map(|a| replace_term_arith(a, var_table, extra_builtins)).collect(),
        )
    } else {
        t.clone()
    }
}

fn replace_arith_in_literal(lit: &Literal, var_table: &mut VariableTable, extra_builtins: &mut Vec<Literal>) -> Literal {
    match lit {
        Literal::Pred(p) => Literal::Pred(PredLiteral {
            predicate: p.predicate.clone(),
            args: TermTuple::new(
                p.args
                    .0
                    .iter()
                    .map(|t| replace_term_arith(t, var_table, extra_builtins))
                    .collect(),
            ),
            neg: p.neg,
            naf: p.naf,
        }),
        Literal::Builtin(b) => {
            // a top-level arithmetic builtin is the constraint itself, not
            // a pattern to purify; only its operands get replaced when they
            // themselves contain nested arithmetic over a sub-term, e.g.
            // `X = Y + 1` stays as-is (already a pure pattern equality).
            Literal::Builtin(b.clone())
        }
        other => other.clone(),
    }
}

impl fmt::Display for Statement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Statement::NormalFact(h) => write!(f, "{}.", h),
            Statement::NormalRule(h, b) => write!(f, "{} :- {}.", h, b),
            Statement::DisjunctiveRule(hs, b) => write!(
                f,
                "{} :- {}.",
                hs.iter().map(|h| h.to_string()).collect::<Vec<_>>().join(" | "),
                b
            ),
            Statement::ChoiceRule(c, b) => {
                if b.0.is_empty() {
                    write!(f, "{}.", c)
                } else {
                    write!(f, "{} :- {}.", c, b)
                }
            }
            Statement::Constraint(b) => write!(f, ":- {}.", b),
            Statement::WeakConstraint(b, wl) => write!(f, ":~ {}. [{}]", b, wl),
            Statement::MinimizeStatement(elems) => write!(f, "#minimize{{{}}}.", fmt_minmax(elems)),
            Statement::MaximizeStatement(elems) => write!(f, "#maximize{{{}}}.", fmt_minmax(elems)),
        }
    }
}

fn fmt_minmax(elems: &[MinMaxElement]) -> String {
    elems
        .iter()
        .map(|e| format!("{}@{}, {} : {}", e.weight, e.level, e.terms, e.body))
        .collect::<Vec<_>>()
        .join("; ")
}

/// `op2arith`: builds an `ArithTerm` from a surface arithmetic operator.
pub fn op2arith(op: ArithOp, lhs: Term, rhs: Term) -> Term {
    Term::ArithTerm(op, Box::new(lhs), Box::new(rhs))
}
