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

//! Error types produced by the grounder.
//!
//! Mirrors §7 of the specification: every fatal condition is a distinct
//! variant carrying the context needed to diagnose the offending input.
//! `SubstitutionConflict` is recovered locally within C6 and never escapes
//! as a top-level `GroundError`.

use codespan_reporting::diagnostic::{Diagnostic, Label};
use thiserror::Error;

/// An error surfaced by the (external) parser collaborator.
#[derive(Clone, PartialEq, Eq, Debug, Error)]
#[error("{message}")]
pub struct ParseError {
    pub message: String,
}

/// Raised when composing two substitutions would bind the same variable to
/// two different terms. Recovered locally by abandoning the branch; never
/// escapes the instantiation engine as a `GroundError`.
#[derive(Clone, PartialEq, Eq, Debug, Error)]
#[error("conflicting binding for variable during substitution composition")]
pub struct SubstitutionConflict;

/// Fatal errors that abort the current grounding run.
#[derive(Clone, PartialEq, Eq, Debug, Error)]
pub enum GroundError {
    #[error("parse error: {0}")]
    Parse(#[from] ParseError),

    #[error("rule is not safe: {statement}{detail}")]
    UnsafeStatement { statement: String, detail: String },

    #[error("'precedes' is undefined for non-ground terms: {term}")]
    UndefinedOrdering { term: String },

    #[error("malformed rewrite input for ref {ref_id}: {detail}")]
    InvalidRewrite { ref_id: u32, detail: String },

    #[error("internal invariant violated: {detail}")]
    InternalInvariant { detail: String },

    #[error("grounding cancelled")]
    Cancelled,

    #[error("unsupported construct: {detail}")]
    UnsupportedConstruct { detail: String },

    #[error("a rule reached the instantiation engine with an un-rewritten aggregate: {statement}")]
    AggregateInBody { statement: String },

    #[error("no safe selection order exists for rule: {statement}")]
    UnsafeRule { statement: String },

    #[error("invalid guard specification: {detail}")]
    InvalidGuards { detail: String },
}

impl GroundError {
    /// Builds a `codespan_reporting` diagnostic for this error, mirroring
    /// the way the teacher's `sld::select` constructs `Diagnostic::error()`
    /// with a `Label::primary` around the offending literal. Unlike the
    /// teacher, nothing downstream of parsing in this crate carries a
    /// source byte span (no `Term`/`Literal`/`Statement` tracks one), so
    /// the label's span is always `0..0`; what it does carry is the
    /// offending statement/literal's own rendered text as the label's
    /// message, so a caller that still has the original source can map it
    /// back to a real location.
    pub fn to_diagnostic(&self) -> Diagnostic<()> {
        Diagnostic::error()
            .with_message(self.to_string())
            .with_labels(vec![Label::primary((), 0..0).with_message(self.offending_text())])
    }

    fn offending_text(&self) -> String {
        match self {
            GroundError::Parse(e) => e.message.clone(),
            GroundError::UnsafeStatement { statement, .. } => statement.clone(),
            GroundError::UndefinedOrdering { term } => term.clone(),
            GroundError::InvalidRewrite { detail, .. } => detail.clone(),
            GroundError::InternalInvariant { detail } => detail.clone(),
            GroundError::Cancelled => String::new(),
            GroundError::UnsupportedConstruct { detail } => detail.clone(),
            GroundError::AggregateInBody { statement } => statement.clone(),
            GroundError::UnsafeRule { statement } => statement.clone(),
            GroundError::InvalidGuards { detail } => detail.clone(),
        }
    }
}

pub type GroundResult<T> = Result<T, GroundError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn diagnostic_label_carries_the_offending_text() {
        let err = GroundError::UnsafeStatement {
            statement: "p(X) :- not q(X).".to_string(),
            detail: " (X unsafe)".to_string(),
        };
        let diag = err.to_diagnostic();
        assert_eq!(diag.labels.len(), 1);
        assert_eq!(diag.labels[0].message, "p(X) :- not q(X).");
        assert_eq!(diag.labels[0].range, 0..0);
    }
}
