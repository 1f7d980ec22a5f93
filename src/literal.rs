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

//! Literals: predicate atoms, built-ins, aggregates/choices and the
//! synthetic ε/η placeholder atoms produced by the rewriter (§3, §4.1).

use std::collections::HashSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::safety::SafetyTriplet;
use crate::term::{Substitution, Term, TermTuple};

/// A predicate symbol, following the teacher's `Predicate(String)` newtype
/// in `logic.rs`.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Predicate(pub String);

impl From<&str> for Predicate {
    fn from(s: &str) -> Self {
        Predicate(s.to_owned())
    }
}

impl fmt::Display for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// `(predicate, arity)`, the unit dependency-graph nodes and selection
/// indices are keyed by.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Signature(pub Predicate, pub usize);

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.0, self.1)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RelOp {
    Eq,
    Ne,
    Lt,
    Gt,
    Le,
    Ge,
}

impl RelOp {
    pub fn eval(&self, ord: std::cmp::Ordering) -> bool {
        use std::cmp::Ordering::*;
        match (self, ord) {
            (RelOp::Eq, Equal) => true,
            (RelOp::Ne, Equal) => false,
            (RelOp::Ne, _) => true,
            (RelOp::Lt, Less) => true,
            (RelOp::Gt, Greater) => true,
            (RelOp::Le, Less) | (RelOp::Le, Equal) => true,
            (RelOp::Ge, Greater) | (RelOp::Ge, Equal) => true,
            _ => false,
        }
    }
}

impl fmt::Display for RelOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RelOp::Eq => "=",
            RelOp::Ne => "!=",
            RelOp::Lt => "<",
            RelOp::Gt => ">",
            RelOp::Le => "<=",
            RelOp::Ge => ">=",
        };
        write!(f, "{}", s)
    }
}

/// `op2rel`: builds a `BuiltinLiteral` for a relational operator (§4.1).
pub fn op2rel(op: RelOp, lhs: Term, rhs: Term) -> Literal {
    Literal::Builtin(BuiltinLiteral { op, lhs, rhs })
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AggrFunc {
    Count,
    Sum,
    Min,
    Max,
}

impl AggrFunc {
    /// The aggregate's identity/base value used by the base (ε) rule (§4.4).
    pub fn base(&self) -> Term {
        match self {
            AggrFunc::Count | AggrFunc::Sum => Term::Number(0),
            AggrFunc::Min => Term::Supremum,
            AggrFunc::Max => Term::Infimum,
        }
    }

    pub fn is_monotone(&self) -> bool {
        // None of COUNT/SUM/MIN/MAX are monotone with respect to negation
        // in general (adding elements can both raise and lower a guard's
        // satisfiability), so all contribute to both pos_occ and neg_occ.
        false
    }
}

impl fmt::Display for AggrFunc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            AggrFunc::Count => "#count",
            AggrFunc::Sum => "#sum",
            AggrFunc::Min => "#min",
            AggrFunc::Max => "#max",
        };
        write!(f, "{}", s)
    }
}

/// `op2aggr`: maps a surface aggregate keyword to its `AggrFunc`.
pub fn op2aggr(name: &str) -> Option<AggrFunc> {
    match name {
        "#count" => Some(AggrFunc::Count),
        "#sum" => Some(AggrFunc::Sum),
        "#min" => Some(AggrFunc::Min),
        "#max" => Some(AggrFunc::Max),
        _ => None,
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Guard {
    pub op: RelOp,
    pub bound: Term,
    /// `true` if this is a right guard (`... op bound`), `false` if left
    /// (`bound op ...`).
    pub is_right: bool,
}

impl Guard {
    pub fn substitute(&self, subst: &Substitution) -> Guard {
        Guard {
            op: self.op.clone(),
            bound: self.bound.substitute(subst),
            is_right: self.is_right,
        }
    }

    pub fn vars(&self) -> HashSet<Term> {
        self.bound.vars(false)
    }
}

/// Shared by `Choice::validate_guards` and `AggrLiteral::validate_guards`:
/// a guard stored as `lguard` must carry `is_right == false`, and one
/// stored as `rguard` must carry `is_right == true`. The surface grammar
/// can never produce anything else; a mismatch means a guard was built by
/// hand (or synthesized) with the wrong side recorded.
pub(crate) fn validate_guard_pair(
    lguard: &Option<Guard>,
    rguard: &Option<Guard>,
) -> Result<(), crate::error::GroundError> {
    if let Some(g) = lguard {
        if g.is_right {
            return Err(crate::error::GroundError::InvalidGuards {
                detail: "left guard recorded with is_right set".to_string(),
            });
        }
    }
    if let Some(g) = rguard {
        if !g.is_right {
            return Err(crate::error::GroundError::InvalidGuards {
                detail: "right guard recorded with is_right unset".to_string(),
            });
        }
    }
    Ok(())
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BuiltinLiteral {
    pub op: RelOp,
    pub lhs: Term,
    pub rhs: Term,
}

impl BuiltinLiteral {
    pub fn vars(&self) -> HashSet<Term> {
        let mut v = self.lhs.vars(false);
        v.extend(self.rhs.vars(false));
        v
    }

    pub fn ground(&self) -> bool {
        self.lhs.ground() && self.rhs.ground()
    }

    pub fn substitute(&self, subst: &Substitution) -> BuiltinLiteral {
        BuiltinLiteral {
            op: self.op.clone(),
            lhs: self.lhs.substitute(subst),
            rhs: self.rhs.substitute(subst),
        }
    }

    /// Evaluates a ground built-in relation. `None` if either side is not
    /// ground (callers should only invoke this once both sides are bound).
    pub fn eval(&self) -> Option<bool> {
        if !self.ground() {
            return None;
        }
        self.lhs
            .precedes(&self.rhs)
            .ok()
            .map(|le| self.op.eval(cmp_ground(&self.lhs, &self.rhs, le)))
    }
}

fn cmp_ground(a: &Term, b: &Term, a_le_b: bool) -> std::cmp::Ordering {
    if a == b {
        std::cmp::Ordering::Equal
    } else if a_le_b {
        std::cmp::Ordering::Less
    } else {
        std::cmp::Ordering::Greater
    }
}

impl fmt::Display for BuiltinLiteral {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.lhs, self.op, self.rhs)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PredLiteral {
    pub predicate: Predicate,
    pub args: TermTuple,
    /// Classical ("strong") negation, `-p(X)`.
    pub neg: bool,
    /// Negation as failure, `not p(X)`.
    pub naf: bool,
}

impl PredLiteral {
    pub fn new(name: &str, args: Vec<Term>) -> Self {
        PredLiteral {
            predicate: Predicate(name.to_owned()),
            args: TermTuple::new(args),
            neg: false,
            naf: false,
        }
    }

    pub fn signature(&self) -> Signature {
        Signature(self.predicate.clone(), self.args.len())
    }

    pub fn ground(&self) -> bool {
        self.args.ground()
    }

    pub fn vars(&self, global_only: bool) -> HashSet<Term> {
        self.args.vars(global_only)
    }

    pub fn substitute(&self, subst: &Substitution) -> PredLiteral {
        PredLiteral {
            predicate: self.predicate.clone(),
            args: self.args.substitute(subst),
            neg: self.neg,
            naf: self.naf,
        }
    }

    /// Matches this literal's args against a (typically ground) candidate
    /// literal's args positionally, ignoring naf/neg (callers filter by
    /// polarity beforehand, per §4.6).
    pub fn try_match(&self, candidate: &PredLiteral) -> Option<Substitution> {
        if self.predicate != candidate.predicate || self.args.len() != candidate.args.len() {
            return None;
        }
        let mut result = Substitution::new();
        for (p, c) in self.args.0.iter().zip(candidate.args.0.iter()) {
            let partial = p.substitute(&result);
            let m = partial.try_match(c)?;
            result = result.compose_extend(&m).ok()?;
        }
        Some(result)
    }
}

impl fmt::Display for PredLiteral {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.naf {
            write!(f, "not ")?;
        }
        if self.neg {
            write!(f, "-")?;
        }
        if self.args.is_empty() {
            write!(f, "{}", self.predicate)
        } else {
            write!(f, "{}({})", self.predicate, self.args)
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AggrElement {
    pub terms: TermTuple,
    pub body: LiteralCollection,
}

impl AggrElement {
    pub fn vars(&self) -> HashSet<Term> {
        let mut v = self.terms.vars(false);
        for l in &self.body.0 {
            v.extend(l.vars(false));
        }
        v
    }

    pub fn substitute(&self, subst: &Substitution) -> AggrElement {
        AggrElement {
            terms: self.terms.substitute(subst),
            body: self.body.substitute(subst),
        }
    }

    pub fn ground(&self) -> bool {
        self.terms.ground() && self.body.0.iter().all(Literal::ground)
    }
}

impl fmt::Display for AggrElement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} : {}",
            self.terms,
            self.body.0.iter().map(|l| l.to_string()).collect::<Vec<_>>().join(", ")
        )
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AggrLiteral {
    pub func: AggrFunc,
    pub elements: Vec<AggrElement>,
    pub lguard: Option<Guard>,
    pub rguard: Option<Guard>,
    pub naf: bool,
}

impl AggrLiteral {
    pub fn vars(&self, global_only: bool) -> HashSet<Term> {
        // the aggregate's own global-level vars are the guard vars plus,
        // when global_only, nothing from inside elements (those are local
        // by construction, per §3's definition of local/global variables).
        let mut v = HashSet::new();
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

    pub fn ground(&self) -> bool {
        self.elements.iter().all(AggrElement::ground)
            && self.lguard.as_ref().map_or(true, |g| g.bound.ground())
            && self.rguard.as_ref().map_or(true, |g| g.bound.ground())
    }

    pub fn validate_guards(&self) -> Result<(), crate::error::GroundError> {
        validate_guard_pair(&self.lguard, &self.rguard)
    }

    pub fn substitute(&self, subst: &Substitution) -> AggrLiteral {
        AggrLiteral {
            func: self.func,
            elements: self.elements.iter().map(|e| e.substitute(subst)).collect(),
            lguard: self.lguard.as_ref().map(|g| g.substitute(subst)),
            rguard: self.rguard.as_ref().map(|g| g.substitute(subst)),
            naf: self.naf,
        }
    }

    /// positive body occurrences contributed by this aggregate: the union
    /// of each element's body's positive occurrences (§4.5).
    pub fn pos_occ(&self) -> Vec<PredLiteral> {
        self.elements
            .iter()
            .flat_map(|e| e.body.pos_occ())
            .collect()
    }

    /// negative occurrences: the union across elements, unless the
    /// aggregate function is monotone (in which case empty), per §4.5.
    pub fn neg_occ(&self) -> Vec<PredLiteral> {
        if self.func.is_monotone() {
            Vec::new()
        } else {
            self.elements.iter().flat_map(|e| e.body.neg_occ()).collect()
        }
    }
}

impl fmt::Display for AggrLiteral {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.naf {
            write!(f, "not ")?;
        }
        if let Some(g) = &self.lguard {
            write!(f, "{} {} ", g.bound, g.op)?;
        }
        write!(
            f,
            "{}{{{}}}",
            self.func,
            self.elements.iter().map(|e| e.to_string()).collect::<Vec<_>>().join("; ")
        )?;
        if let Some(g) = &self.rguard {
            write!(f, " {} {}", g.op, g.bound)?;
        }
        Ok(())
    }
}

/// Identifies one ε/η rewrite target: an aggregate or choice occurrence
/// inside a particular rule, assigned a fresh `ref_id` by the rewriter
/// (§4.4).
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RefId(pub u32);

/// Base-position kind for synthetic literals: aggregate or choice.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PlaceholderKind {
    Aggregate,
    Choice,
}

/// Shared shape of the six synthetic literal families from §3:
/// `ChoicePlaceholder`, `AggrPlaceholder`, `AggrBaseLiteral`,
/// `AggrElemLiteral`, `ChoiceBaseLiteral`, `ChoiceElemLiteral`.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SyntheticLiteral {
    pub kind: PlaceholderKind,
    pub role: SyntheticRole,
    pub ref_id: u32,
    pub element_id: Option<u32>,
    pub local_vars: TermTuple,
    pub global_vars: TermTuple,
    /// Negation carried over from the original aggregate (`not #count{...}`).
    /// Only meaningful for `role == Placeholder`; base/elem heads are never
    /// negated.
    pub naf: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SyntheticRole {
    /// `AggrPlaceholder` / `ChoicePlaceholder`: stands in for the original
    /// aggregate/choice at its position in the rewritten rule body.
    Placeholder,
    /// `AggrBaseLiteral` / `ChoiceBaseLiteral`: head of the ε (base) rule.
    Base,
    /// `AggrElemLiteral` / `ChoiceElemLiteral`: head of one η (element) rule.
    Elem,
}

impl SyntheticLiteral {
    /// `terms = local_vars ++ global_vars`, fixed at rewrite time (§3
    /// invariant).
    pub fn terms(&self) -> TermTuple {
        self.local_vars.concat(&self.global_vars)
    }

    pub fn predicate_name(&self) -> String {
        let tag = match (self.kind, self.role) {
            (PlaceholderKind::Aggregate, SyntheticRole::Placeholder) => "aggr_chi",
            (PlaceholderKind::Aggregate, SyntheticRole::Base) => "aggr_base",
            (PlaceholderKind::Aggregate, SyntheticRole::Elem) => "aggr_elem",
            (PlaceholderKind::Choice, SyntheticRole::Placeholder) => "choice_chi",
            (PlaceholderKind::Choice, SyntheticRole::Base) => "choice_base",
            (PlaceholderKind::Choice, SyntheticRole::Elem) => "choice_elem",
        };
        match self.element_id {
            Some(eid) => format!("__{}_{}_{}", tag, self.ref_id, eid),
            None => format!("__{}_{}", tag, self.ref_id),
        }
    }

    pub fn vars(&self, global_only: bool) -> HashSet<Term> {
        if global_only {
            self.global_vars.vars(false)
        } else {
            self.terms().vars(false)
        }
    }

    pub fn ground(&self) -> bool {
        self.terms().ground()
    }

    pub fn substitute(&self, subst: &Substitution) -> SyntheticLiteral {
        SyntheticLiteral {
            kind: self.kind,
            role: self.role,
            ref_id: self.ref_id,
            element_id: self.element_id,
            local_vars: self.local_vars.substitute(subst),
            global_vars: self.global_vars.substitute(subst),
            naf: self.naf,
        }
    }

    /// Builds the substitution taking each placeholder position back to its
    /// local/global variable (§4.7's `gather_var_assignment`), used by the
    /// propagator to ground the original guards/elements.
    pub fn gather_var_assignment(&self, original_locals: &TermTuple, original_globals: &TermTuple) -> Substitution {
        let mut s = Substitution::new();
        for (orig, bound) in original_locals.0.iter().chain(original_globals.0.iter()).zip(
            self.local_vars.0.iter().chain(self.global_vars.0.iter()),
        ) {
            let _ = s.extend(orig.clone(), bound.clone());
        }
        s
    }

    /// Views this synthetic literal as an ordinary `PredLiteral` so it can
    /// sit in a rule's head position exactly like any other derived atom
    /// (§4.4: ε/η rules are plain normal rules once rewritten).
    pub fn as_pred_literal(&self) -> PredLiteral {
        PredLiteral {
            predicate: Predicate(self.predicate_name()),
            args: self.terms(),
            neg: false,
            naf: false,
        }
    }
}

impl fmt::Display for SyntheticLiteral {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.predicate_name(), self.terms())
    }
}

/// The full literal algebra (§3).
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Literal {
    Pred(PredLiteral),
    Builtin(BuiltinLiteral),
    Aggr(AggrLiteral),
    Synthetic(SyntheticLiteral),
}

impl Literal {
    pub fn ground(&self) -> bool {
        match self {
            Literal::Pred(p) => p.ground(),
            Literal::Builtin(b) => b.ground(),
            Literal::Aggr(a) => a.ground(),
            Literal::Synthetic(s) => s.ground(),
        }
    }

    pub fn vars(&self, global_only: bool) -> HashSet<Term> {
        match self {
            Literal::Pred(p) => p.vars(global_only),
            Literal::Builtin(b) => b.vars(),
            Literal::Aggr(a) => a.vars(global_only),
            Literal::Synthetic(s) => s.vars(global_only),
        }
    }

    pub fn substitute(&self, subst: &Substitution) -> Literal {
        match self {
            Literal::Pred(p) => Literal::Pred(p.substitute(subst)),
            Literal::Builtin(b) => Literal::Builtin(b.substitute(subst)),
            Literal::Aggr(a) => Literal::Aggr(a.substitute(subst)),
            Literal::Synthetic(s) => Literal::Synthetic(s.substitute(subst)),
        }
    }

    pub fn is_aggregate(&self) -> bool {
        matches!(self, Literal::Aggr(_))
    }

    pub fn is_naf(&self) -> bool {
        match self {
            Literal::Pred(p) => p.naf,
            Literal::Aggr(a) => a.naf,
            _ => false,
        }
    }

    /// §4.5: classical literals contribute themselves on the matching
    /// polarity, aggregates contribute their elements' occurrences. A
    /// rewritten aggregate's placeholder stands in for the aggregate at
    /// this point in the body, so it contributes itself (on the aggregate's
    /// original naf polarity) as an occurrence of its own synthetic `chi`
    /// predicate — this is what gives the dependency graph an edge from the
    /// placeholder's ε/η rules to the owning rule's head (§4.5, §4.6: the
    /// owning rule cannot be grounded until the aggregate's satisfiability
    /// is known). Built-ins contribute nothing on either side.
    pub fn pos_occ(&self) -> Vec<PredLiteral> {
        match self {
            Literal::Pred(p) if !p.naf => vec![p.clone()],
            Literal::Aggr(a) => a.pos_occ(),
            Literal::Synthetic(s) if s.role == SyntheticRole::Placeholder && !s.naf => {
                vec![s.as_pred_literal()]
            }
            _ => Vec::new(),
        }
    }

    pub fn neg_occ(&self) -> Vec<PredLiteral> {
        match self {
            Literal::Pred(p) if p.naf => vec![p.clone()],
            Literal::Aggr(a) => a.neg_occ(),
            Literal::Synthetic(s) if s.role == SyntheticRole::Placeholder && s.naf => {
                vec![s.as_pred_literal()]
            }
            _ => Vec::new(),
        }
    }
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Literal::Pred(p) => write!(f, "{}", p),
            Literal::Builtin(b) => write!(f, "{}", b),
            Literal::Aggr(a) => write!(f, "{}", a),
            Literal::Synthetic(s) => write!(f, "{}", s),
        }
    }
}

/// An ordered collection of literals with structural equality, lifting
/// `vars`/`substitute` pointwise (§3).
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub struct LiteralCollection(pub Vec<Literal>);

impl LiteralCollection {
    pub fn new(literals: Vec<Literal>) -> Self {
        LiteralCollection(literals)
    }

    pub fn vars(&self, global_only: bool) -> HashSet<Term> {
        let mut out = HashSet::new();
        for l in &self.0 {
            out.extend(l.vars(global_only));
        }
        out
    }

    pub fn substitute(&self, subst: &Substitution) -> LiteralCollection {
        LiteralCollection(self.0.iter().map(|l| l.substitute(subst)).collect())
    }

    pub fn pos_occ(&self) -> Vec<PredLiteral> {
        self.0.iter().flat_map(Literal::pos_occ).collect()
    }

    pub fn neg_occ(&self) -> Vec<PredLiteral> {
        self.0.iter().flat_map(Literal::neg_occ).collect()
    }

    pub fn contains_aggregates(&self) -> bool {
        self.0.iter().any(Literal::is_aggregate)
    }

    pub fn safety(&self, global_vars: &HashSet<Term>) -> SafetyTriplet {
        let mut acc = SafetyTriplet::empty();
        for l in &self.0 {
            acc = SafetyTriplet::closure(&[acc, crate::safety::literal_safety(l, global_vars)]);
        }
        acc
    }

    pub fn concat(&self, other: &LiteralCollection) -> LiteralCollection {
        let mut v = self.0.clone();
        v.extend(other.0.clone());
        LiteralCollection(v)
    }
}

impl fmt::Display for LiteralCollection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}",
            self.0.iter().map(|l| l.to_string()).collect::<Vec<_>>().join(", ")
        )
    }
}
