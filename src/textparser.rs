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

//! A convenience ASP-Core-2-ish text parser, used only by this crate's own
//! tests to write ground-truth programs as surface syntax instead of
//! hand-built ASTs. Not a validated implementation of the full ASP-Core-2
//! grammar (no weak constraints, no disjunction, minimal choice-rule
//! support) — mirrors the shape of the teacher's own `logic::parser`
//! module (`ws`, `LocatedSpan`, `VerboseError`, small combinator
//! functions), scaled up to this crate's richer term/literal/statement
//! algebra.

use nom::branch::alt;
use nom::bytes::complete::{is_not, tag};
use nom::character::complete::{alphanumeric1, char, digit1, multispace0, one_of};
use nom::combinator::{map, opt, recognize, value};
use nom::error::VerboseError;
use nom::multi::{many0, many1, separated_list0, separated_list1};
use nom::sequence::{delimited, pair, preceded, terminated, tuple};
use nom_locate::LocatedSpan;

use crate::literal::{
    op2aggr, op2rel, AggrElement, AggrFunc, AggrLiteral, Guard, Literal, LiteralCollection,
    PredLiteral, RelOp,
};
use crate::statement::{op2arith, Statement};
use crate::term::{ArithOp, Term, TermTuple};

pub type Span<'a> = LocatedSpan<&'a str>;
pub type IResult<'a, O> = nom::IResult<Span<'a>, O, VerboseError<Span<'a>>>;

fn ws<'a, F: 'a, O>(mut inner: F) -> impl FnMut(Span<'a>) -> IResult<'a, O>
where
    F: FnMut(Span<'a>) -> IResult<'a, O>,
{
    move |i| delimited(multispace0, |s| inner(s), multispace0)(i)
}

fn variable_name(i: Span) -> IResult<Span> {
    recognize(pair(one_of("ABCDEFGHIJKLMNOPQRSTUVWXYZ"), many0(alt((alphanumeric1, tag("_"))))))(i)
}

fn symbolic_name(i: Span) -> IResult<Span> {
    recognize(pair(one_of("abcdefghijklmnopqrstuvwxyz"), many0(alt((alphanumeric1, tag("_"))))))(i)
}

fn signed_number(i: Span) -> IResult<i64> {
    map(recognize(pair(opt(char('-')), digit1)), |s: Span| {
        s.fragment().parse::<i64>().unwrap()
    })(i)
}

fn string_literal(i: Span) -> IResult<Term> {
    map(delimited(char('"'), is_not("\""), char('"')), |s: Span| {
        Term::Str(s.fragment().to_string())
    })(i)
}

fn anon_variable(i: Span) -> IResult<Term> {
    value(Term::AnonVariable(crate::term::fresh_id()), char('_'))(i)
}

/// `f(arg, arg, ...)` or a bare `f`/`X`/number/string primary term, with
/// no arithmetic — used as the operand of `arith_term` so `+`/`-` stay
/// left-associative at the top level.
fn primary_term(i: Span) -> IResult<Term> {
    alt((
        map(signed_number, Term::Number),
        string_literal,
        anon_variable,
        map(variable_name, |name: Span| Term::Variable(name.fragment().to_string())),
        map(
            pair(symbolic_name, opt(preceded(char('('), terminated(separated_list1(ws(char(',')), arith_term), char(')'))))),
            |(name, args)| match args {
                Some(args) => Term::Functional(name.fragment().to_string(), args),
                None => Term::SymbolicConstant(name.fragment().to_string()),
            },
        ),
        delimited(char('('), arith_term, char(')')),
    ))(i)
}

/// Tries `primary_term` first so a literal `-2` is consumed whole by
/// `signed_number` (as `Term::Number(-2)`); only a bare minus that
/// `signed_number` can't absorb (`-X`, `-(...)`) falls through to the
/// explicit unary-minus wrapper.
fn unary_term(i: Span) -> IResult<Term> {
    alt((
        primary_term,
        map(preceded(ws(char('-')), unary_term), |t| Term::Minus(Box::new(t))),
    ))(i)
}

fn mul_term(i: Span) -> IResult<Term> {
    let (i, first) = unary_term(i)?;
    let (i, rest) = many0(pair(ws(alt((char('*'), char('/')))), unary_term))(i)?;
    Ok((
        i,
        rest.into_iter().fold(first, |acc, (op, rhs)| {
            let arith = if op == '*' { ArithOp::Mul } else { ArithOp::Div };
            op2arith(arith, acc, rhs)
        }),
    ))
}

fn arith_term(i: Span) -> IResult<Term> {
    let (i, first) = mul_term(i)?;
    let (i, rest) = many0(pair(ws(alt((char('+'), char('-')))), mul_term))(i)?;
    Ok((
        i,
        rest.into_iter().fold(first, |acc, (op, rhs)| {
            let arith = if op == '+' { ArithOp::Add } else { ArithOp::Sub };
            op2arith(arith, acc, rhs)
        }),
    ))
}

pub fn term(i: Span) -> IResult<Term> {
    arith_term(i)
}

fn term_list(i: Span) -> IResult<Vec<Term>> {
    separated_list0(ws(char(',')), term)(i)
}

fn rel_op(i: Span) -> IResult<RelOp> {
    alt((
        value(RelOp::Le, tag("<=")),
        value(RelOp::Ge, tag(">=")),
        value(RelOp::Ne, tag("!=")),
        value(RelOp::Eq, tag("=")),
        value(RelOp::Lt, tag("<")),
        value(RelOp::Gt, tag(">")),
    ))(i)
}

/// A plain predicate atom: `name`, `name(args)`, optionally `- name(...)`
/// for classical negation. NAF (`not ...`) is parsed one level up, since it
/// only ever prefixes a body literal, never a head atom.
fn pred_atom(i: Span) -> IResult<PredLiteral> {
    map(
        tuple((
            opt(ws(char('-'))),
            symbolic_name,
            opt(delimited(char('('), term_list, char(')'))),
        )),
        |(neg, name, args)| {
            let mut p = PredLiteral::new(name.fragment(), args.unwrap_or_default());
            p.neg = neg.is_some();
            p
        },
    )(i)
}

fn guard(i: Span) -> IResult<(RelOp, Term)> {
    pair(rel_op, ws(term))(i)
}

fn aggr_element(i: Span) -> IResult<AggrElement> {
    map(
        pair(term_list, opt(preceded(ws(char(':')), separated_list0(ws(char(',')), body_literal)))),
        |(terms, body)| AggrElement { terms: TermTuple::new(terms), body: LiteralCollection::new(body.unwrap_or_default()) },
    )(i)
}

fn aggr_function(i: Span) -> IResult<AggrFunc> {
    map(
        recognize(pair(char('#'), alt((tag("count"), tag("sum"), tag("min"), tag("max"))))),
        |s: Span| op2aggr(s.fragment()).unwrap(),
    )(i)
}

/// `[term relop] #fn{ elem ; elem ; ... } [relop term]`
fn aggr_literal(i: Span) -> IResult<Literal> {
    let (i, lguard) = opt(pair(ws(term), rel_op))(i)?;
    let (i, func) = ws(aggr_function)(i)?;
    let (i, elements) = delimited(char('{'), separated_list0(ws(char(';')), aggr_element), char('}'))(i)?;
    let (i, rguard) = opt(guard)(i)?;
    let lguard = lguard.map(|(bound, op)| Guard { op, bound, is_right: false });
    let rguard = rguard.map(|(op, bound)| Guard { op, bound, is_right: true });
    Ok((
        i,
        Literal::Aggr(AggrLiteral { func, elements, lguard, rguard, naf: false }),
    ))
}

/// One body literal: `not pred`, a plain/negated predicate atom, a
/// built-in comparison, or an aggregate occurrence.
fn body_literal(i: Span) -> IResult<Literal> {
    alt((
        aggr_literal,
        map(preceded(ws(tag("not ")), pred_atom), |mut p| {
            p.naf = true;
            Literal::Pred(p)
        }),
        map(tuple((ws(term), rel_op, ws(term))), |(lhs, op, rhs)| op2rel(op, lhs, rhs)),
        map(pred_atom, Literal::Pred),
    ))(i)
}

fn body(i: Span) -> IResult<Vec<Literal>> {
    separated_list0(ws(char(',')), body_literal)(i)
}

fn fact_or_rule(i: Span) -> IResult<Statement> {
    map(
        tuple((ws(pred_atom), opt(preceded(ws(tag(":-")), body)), char('.'))),
        |(head, body, _)| match body {
            Some(b) => Statement::NormalRule(head, LiteralCollection::new(b)),
            None => Statement::NormalFact(head),
        },
    )(i)
}

fn constraint(i: Span) -> IResult<Statement> {
    map(tuple((ws(tag(":-")), body, char('.'))), |(_, b, _)| {
        Statement::Constraint(LiteralCollection::new(b))
    })(i)
}

fn statement(i: Span) -> IResult<Statement> {
    alt((constraint, fact_or_rule))(i)
}

/// Parses a whole program's worth of `.`-terminated statements.
pub fn parse_program(src: &str) -> Result<Vec<Statement>, String> {
    let input = Span::new(src);
    match many1(ws(statement))(input) {
        Ok((rest, stmts)) => {
            if rest.fragment().trim().is_empty() {
                Ok(stmts)
            } else {
                Err(format!("unconsumed input: {}", rest.fragment()))
            }
        }
        Err(e) => Err(format!("{}", e)),
    }
}

/// Implements `crate::Parser` over this convenience grammar. Never
/// produces a query (`?- ...` is not part of the supported surface
/// syntax); callers that need one supply their own `Parser`.
pub struct TextParser;

impl crate::Parser for TextParser {
    fn parse_program(&self, src: &str) -> Result<(Vec<Statement>, Option<crate::Query>), crate::error::ParseError> {
        parse_program(src)
            .map(|stmts| (stmts, None))
            .map_err(|message| crate::error::ParseError { message })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_a_simple_fact() {
        let stmts = parse_program("p(1).").unwrap();
        assert_eq!(stmts.len(), 1);
        assert!(matches!(&stmts[0], Statement::NormalFact(h) if h.predicate.0 == "p"));
    }

    #[test]
    fn parses_a_negative_number_literal_as_a_plain_number() {
        let stmts = parse_program("p(-2).").unwrap();
        match &stmts[0] {
            Statement::NormalFact(h) => assert_eq!(h.args.0, vec![Term::Number(-2)]),
            _ => panic!("expected a fact"),
        }
    }

    #[test]
    fn parses_a_rule_with_naf_and_builtin() {
        let stmts = parse_program("q(X) :- p(X), not r(X), X != 0.").unwrap();
        assert_eq!(stmts.len(), 1);
        if let Statement::NormalRule(_, body) = &stmts[0] {
            assert_eq!(body.0.len(), 3);
        } else {
            panic!("expected a rule");
        }
    }

    #[test]
    fn parses_a_count_aggregate_with_right_guard() {
        let stmts = parse_program("n(X) :- box(X), #count{ I : item(X, I) } = 1.").unwrap();
        if let Statement::NormalRule(_, body) = &stmts[0] {
            assert!(body.0.iter().any(|l| matches!(l, Literal::Aggr(_))));
        } else {
            panic!("expected a rule");
        }
    }

    #[test]
    fn parses_a_constraint() {
        let stmts = parse_program(":- p(1), not q(1).").unwrap();
        assert!(matches!(&stmts[0], Statement::Constraint(_)));
    }

    #[test]
    fn parses_multiple_statements() {
        let stmts = parse_program("p(1). p(2). q(X) :- p(X).").unwrap();
        assert_eq!(stmts.len(), 3);
    }
}
