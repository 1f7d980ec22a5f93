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

//! A grounder for ASP-Core-2 logic programs: takes a non-ground program as
//! a `Vec<Statement>` and produces an equivalent ground program, ready to
//! hand to an answer-set solver.
//!
//! Parsing, solving, and I/O are external collaborators; this crate only
//! does the term/literal algebra, safety checking, aggregate/choice
//! rewriting, dependency-graph stratification, instantiation and
//! propagation steps in between.

pub mod depgraph;
pub mod error;
pub mod instantiate;
pub mod literal;
pub mod propagate;
pub mod rewrite;
pub mod safety;
pub mod statement;
pub mod term;
pub mod textparser;

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};

use error::{GroundError, GroundResult, ParseError};
use literal::LiteralCollection;
use statement::Statement;

static DEBUG_OVERRIDE: AtomicBool = AtomicBool::new(false);
static DEBUG_OVERRIDE_SET: AtomicBool = AtomicBool::new(false);

/// Whether the grounder runs extra consistency checks (e.g. re-verifying
/// `safe()` on every rewritten/ground statement), mirroring `aspy.debug()`
/// from the original implementation. Defaults to `cfg!(debug_assertions)`;
/// tests can force it either way with `set_debug_for_tests`.
pub fn debug() -> bool {
    if DEBUG_OVERRIDE_SET.load(Ordering::Relaxed) {
        DEBUG_OVERRIDE.load(Ordering::Relaxed)
    } else {
        cfg!(debug_assertions)
    }
}

/// Overrides the `debug()` flag for the remainder of the process, or until
/// called again. Test-only knob; never call this from library code.
pub fn set_debug_for_tests(value: bool) {
    DEBUG_OVERRIDE.store(value, Ordering::Relaxed);
    DEBUG_OVERRIDE_SET.store(true, Ordering::Relaxed);
}

/// A query goal trailing a program (`?- p(X).`), returned alongside the
/// parsed statements by a `Parser`. The grounder itself never evaluates
/// queries — that is the solver's job — so this type only exists to round
/// out the `Parser` contract.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Query(pub LiteralCollection);

/// Contract for an external ASP-Core-2 surface parser. The real grammar
/// (programs, disjunction, choice, aggregates, built-ins, arithmetic,
/// weak-constraint weight-at-level lists) is out of scope for this crate;
/// callers either hand `ground_program` a `Vec<Statement>` directly or
/// plug in their own `Parser` implementation.
pub trait Parser {
    fn parse_program(&self, src: &str) -> Result<(Vec<Statement>, Option<Query>), ParseError>;
}

/// A fully ground ASP-Core-2 program: every statement's terms are ground
/// and every aggregate/choice occurrence has been rewritten, propagated,
/// and reassembled.
#[derive(Clone, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct GroundProgram {
    pub statements: Vec<Statement>,
}

impl fmt::Display for GroundProgram {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for stmt in &self.statements {
            writeln!(f, "{}", stmt)?;
        }
        Ok(())
    }
}

/// Grounds a non-ground ASP-Core-2 program (§1–§9 of the component design):
/// rewrites aggregate/choice occurrences into synthetic ε/η rules (C4),
/// stratifies the resulting program by predicate dependency (C5), runs the
/// instantiation engine stratum by stratum (C6), and reassembles ground
/// choice rules and aggregate literals from the ε/η facts produced along
/// the way (C7).
///
/// `cancel`, if given, is polled cooperatively between fixpoint iterations;
/// returning `true` aborts the run with `GroundError::Cancelled`.
pub fn ground_program(
    statements: &[Statement],
    cancel: Option<&dyn Fn() -> bool>,
) -> GroundResult<GroundProgram> {
    for stmt in statements {
        stmt.validate_guards()?;
    }

    let rewritten = rewrite::rewrite_program(statements);
    let ground_statements = instantiate::instantiate_program(&rewritten, cancel)?;
    let with_choices = propagate::assemble_program(ground_statements, &rewritten.choice_info)?;
    let assembled = propagate::assemble_aggregates(with_choices, &rewritten.aggr_info)?;

    if debug() {
        for stmt in &assembled {
            if !stmt.ground() {
                return Err(GroundError::InternalInvariant {
                    detail: format!("assembled statement not fully ground: {}", stmt),
                });
            }
        }
    }

    Ok(GroundProgram { statements: assembled })
}
