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

//! Safety characterization (§4.3): decides whether a rule can be grounded.
//!
//! No direct teacher analogue exists (Datalog has no aggregate safety), so
//! this module follows spec §4.3 and
//! `original_source/src/tests/program/test_safety_characterization.py`
//! directly.

use std::collections::HashSet;

use crate::literal::Literal;
use crate::term::Term;

/// "`depender` becomes safe once every `dependee` is safe."
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct SafetyRule {
    pub depender: Term,
    pub dependees: Vec<Term>,
}

impl SafetyRule {
    pub fn new(depender: Term, dependees: HashSet<Term>) -> Self {
        let mut dependees: Vec<Term> = dependees.into_iter().collect();
        dependees.sort_by_key(|t| format!("{:?}", t));
        SafetyRule { depender, dependees }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub struct SafetyTriplet {
    pub safe: HashSet<Term>,
    pub unsafe_vars: HashSet<Term>,
    pub rules: Vec<SafetyRule>,
}

impl SafetyTriplet {
    pub fn empty() -> Self {
        SafetyTriplet::default()
    }

    /// `SafetyTriplet(global_vars)`: every variable in `vars` is safe and
    /// there are no pending rules — the target shape a safe rule's body
    /// must reduce to under closure.
    pub fn of_safe(vars: &HashSet<Term>) -> Self {
        SafetyTriplet {
            safe: vars.clone(),
            unsafe_vars: HashSet::new(),
            rules: Vec::new(),
        }
    }

    pub fn safe_vars(vars: HashSet<Term>) -> Self {
        SafetyTriplet {
            safe: vars,
            unsafe_vars: HashSet::new(),
            rules: Vec::new(),
        }
    }

    pub fn unsafe_vars(vars: HashSet<Term>) -> Self {
        SafetyTriplet {
            safe: HashSet::new(),
            unsafe_vars: vars,
            rules: Vec::new(),
        }
    }

    pub fn rule(depender: Term, dependees: HashSet<Term>) -> Self {
        let mut unsafe_vars = HashSet::new();
        unsafe_vars.insert(depender.clone());
        SafetyTriplet {
            safe: HashSet::new(),
            unsafe_vars,
            rules: vec![SafetyRule::new(depender, dependees)],
        }
    }

    fn merge(triplets: &[SafetyTriplet]) -> SafetyTriplet {
        let mut safe = HashSet::new();
        let mut unsafe_vars = HashSet::new();
        let mut rules = Vec::new();
        for t in triplets {
            safe.extend(t.safe.iter().cloned());
            unsafe_vars.extend(t.unsafe_vars.iter().cloned());
            rules.extend(t.rules.iter().cloned());
        }
        // anything proven safe by one contributor is safe overall, even if
        // another contributor listed it as unsafe (e.g. appears both in a
        // positive literal and inside a `not`).
        unsafe_vars.retain(|v| !safe.contains(v));
        rules.retain(|r| !safe.contains(&r.depender));
        SafetyTriplet { safe, unsafe_vars, rules }
    }

    /// Moves every variable whose rule dependees are fully safe into
    /// `safe`, dropping it from `unsafe` and `rules`.
    pub fn normalize(&self) -> SafetyTriplet {
        let mut safe = self.safe.clone();
        let mut unsafe_vars = self.unsafe_vars.clone();
        let mut rules = self.rules.clone();

        loop {
            let mut newly_safe = Vec::new();
            for r in &rules {
                if r.dependees.iter().all(|d| safe.contains(d)) {
                    newly_safe.push(r.depender.clone());
                }
            }
            if newly_safe.is_empty() {
                break;
            }
            for v in &newly_safe {
                safe.insert(v.clone());
                unsafe_vars.remove(v);
            }
            rules.retain(|r| !safe.contains(&r.depender));
        }

        SafetyTriplet { safe, unsafe_vars, rules }
    }

    /// Merges then repeatedly normalizes until fixed point (§4.3).
    pub fn closure(triplets: &[SafetyTriplet]) -> SafetyTriplet {
        let merged = SafetyTriplet::merge(triplets);
        let mut current = merged.normalize();
        loop {
            let next = current.normalize();
            if next == current {
                return current;
            }
            current = next;
        }
    }
}

/// Per-literal safety contribution (§4.3): positive predicate literals make
/// all of their variables safe; NAF literals contribute nothing (their
/// variables stay unsafe unless proven safe elsewhere in the body);
/// `=` propagates safety from one side to the other when exactly one side
/// is a bare variable not occurring on the other side; other built-ins and
/// ordinary comparisons never introduce new safety; aggregate literals
/// recursively fold their elements' body safety (local variables are
/// always safely bound within their own element) together with any
/// equality-style guard propagation, and synthetic placeholder/ε/η head
/// atoms behave like ordinary positive literals over their `terms`.
pub fn literal_safety(lit: &Literal, _global_vars: &HashSet<Term>) -> SafetyTriplet {
    match lit {
        Literal::Pred(p) => {
            if p.naf {
                SafetyTriplet::unsafe_vars(p.vars(false))
            } else {
                SafetyTriplet::safe_vars(p.vars(false))
            }
        }
        Literal::Builtin(b) => {
            use crate::literal::RelOp;
            if b.op == RelOp::Eq {
                let lhs_vars = b.lhs.vars(false);
                let rhs_vars = b.rhs.vars(false);
                let lhs_is_bare_var = matches!(b.lhs, Term::Variable(_) | Term::AnonVariable(_));
                let rhs_is_bare_var = matches!(b.rhs, Term::Variable(_) | Term::AnonVariable(_));

                if lhs_is_bare_var && !rhs_vars.contains(&b.lhs) {
                    SafetyTriplet::rule(b.lhs.clone(), rhs_vars)
                } else if rhs_is_bare_var && !lhs_vars.contains(&b.rhs) {
                    SafetyTriplet::rule(b.rhs.clone(), lhs_vars)
                } else {
                    let mut all = lhs_vars;
                    all.extend(rhs_vars);
                    SafetyTriplet::unsafe_vars(all)
                }
            } else {
                SafetyTriplet::unsafe_vars(b.vars())
            }
        }
        Literal::Aggr(a) => {
            let mut contributions = Vec::new();
            for e in &a.elements {
                let element_vars: HashSet<Term> = e.vars();
                contributions.push(e.body.safety(&element_vars));
            }
            if let Some(g) = &a.lguard {
                contributions.push(guard_safety(g, &a.elements));
            }
            if let Some(g) = &a.rguard {
                contributions.push(guard_safety(g, &a.elements));
            }
            SafetyTriplet::closure(&contributions)
        }
        Literal::Synthetic(s) => SafetyTriplet::safe_vars(s.vars(false)),
    }
}

fn guard_safety(g: &crate::literal::Guard, _elements: &[crate::literal::AggrElement]) -> SafetyTriplet {
    use crate::literal::RelOp;
    if g.op == RelOp::Eq {
        if let Term::Variable(_) | Term::AnonVariable(_) = g.bound {
            // aggregate value side grounds the guard variable once the
            // aggregate itself is evaluated.
            return SafetyTriplet::safe_vars(g.vars());
        }
    }
    SafetyTriplet::unsafe_vars(g.vars())
}
