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

//! Predicate dependency graph, SCC decomposition and the refined
//! instantiation sequence (§4.5).
//!
//! Grounded on `original_source/src/aspy/grounding/graphs/dependency_graph.py`;
//! SCC computation itself uses `petgraph::algo::tarjan_scc` rather than a
//! hand-rolled Tarjan implementation, the same "reach for the ecosystem
//! crate" choice the teacher makes for its own graph-shaped problems.

use std::collections::HashMap;

use petgraph::algo::tarjan_scc;
use petgraph::graph::{DiGraph, NodeIndex};

use crate::literal::{Literal, Signature};
use crate::statement::Statement;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EdgeKind {
    Positive,
    Negative,
}

/// The predicate dependency graph: an edge `p -> q` means a rule with head
/// predicate `q` has `p` occurring in its body (§4.5).
pub struct DependencyGraph {
    graph: DiGraph<Signature, EdgeKind>,
    index: HashMap<Signature, NodeIndex>,
}

fn node(
    graph: &mut DiGraph<Signature, EdgeKind>,
    index: &mut HashMap<Signature, NodeIndex>,
    sig: Signature,
) -> NodeIndex {
    if let Some(n) = index.get(&sig) {
        return *n;
    }
    let n = graph.add_node(sig.clone());
    index.insert(sig, n);
    n
}

impl DependencyGraph {
    pub fn build(statements: &[Statement]) -> Self {
        let mut graph = DiGraph::new();
        let mut index = HashMap::new();

        for stmt in statements {
            let head_sigs: Vec<Signature> = stmt
                .head()
                .0
                .iter()
                .filter_map(|l| match l {
                    Literal::Pred(p) => Some(p.signature()),
                    _ => None,
                })
                .collect();
            if head_sigs.is_empty() {
                // constraints/weak constraints/optimization statements have
                // no head predicate to register as a dependency target, but
                // their body predicates still need a node so they appear in
                // the stratification below.
                for p in stmt.body().pos_occ().into_iter().chain(stmt.body().neg_occ()) {
                    node(&mut graph, &mut index, p.signature());
                }
                continue;
            }

            let pos = stmt.body().pos_occ();
            let neg = stmt.body().neg_occ();
            for h in &head_sigs {
                let hn = node(&mut graph, &mut index, h.clone());
                for p in &pos {
                    let pn = node(&mut graph, &mut index, p.signature());
                    graph.add_edge(pn, hn, EdgeKind::Positive);
                }
                for n in &neg {
                    let nn = node(&mut graph, &mut index, n.signature());
                    graph.add_edge(nn, hn, EdgeKind::Negative);
                }
            }
        }

        DependencyGraph { graph, index }
    }

    pub fn contains(&self, sig: &Signature) -> bool {
        self.index.contains_key(sig)
    }

    /// Strongly connected components in source-to-sink (topological)
    /// order: a component only depends on components listed before it.
    pub fn sccs(&self) -> Vec<Vec<Signature>> {
        let mut components: Vec<Vec<Signature>> = tarjan_scc(&self.graph)
            .into_iter()
            .map(|comp| comp.into_iter().map(|n| self.graph[n].clone()).collect())
            .collect();
        // petgraph's tarjan_scc yields components in reverse topological
        // order; reverse to evaluate sources (facts with no dependencies)
        // first, matching the instantiation engine's expected sequence.
        components.reverse();
        components
    }

    /// True if any edge within `component` (including a self-loop) is
    /// negative — i.e. some predicate in the component depends on `not` of
    /// another (or itself) inside the same component. Such a component
    /// cannot be instantiated by a single monotone bottom-up fixpoint;
    /// `instantiate.rs` falls back to the refined (guess-and-check-free,
    /// but iterate-to-fixpoint) sequence for it.
    pub fn component_has_negative_edge(&self, component: &[Signature]) -> bool {
        let members: std::collections::HashSet<&Signature> = component.iter().collect();
        for edge in self.graph.edge_indices() {
            let (a, b) = self.graph.edge_endpoints(edge).unwrap();
            let kind = self.graph[edge];
            if kind == EdgeKind::Negative
                && members.contains(&self.graph[a])
                && members.contains(&self.graph[b])
            {
                return true;
            }
        }
        false
    }
}

/// A stratum groups one SCC's predicates with a flag recording whether it
/// needs the refined instantiation sequence (§4.5).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Stratum {
    pub predicates: Vec<Signature>,
    pub recursive: bool,
    pub has_negative_cycle: bool,
}

/// The statements assigned to each stratum, in dependency order, plus
/// statements with no head predicate (constraints, weak constraints,
/// optimization statements) attached to the stratum that contains the
/// last of their body predicates to become available.
#[derive(Clone, Debug)]
pub struct InstantiationSequence {
    pub strata: Vec<Stratum>,
    pub statements_by_stratum: Vec<Vec<Statement>>,
}

/// Builds the refined instantiation sequence (§4.5): statements grouped by
/// the SCC of their head predicate(s), in an order where every stratum's
/// dependencies have already been assigned to an earlier (or the same, for
/// `recursive` strata) stratum.
pub fn build_instantiation_sequence(statements: &[Statement]) -> InstantiationSequence {
    let depgraph = DependencyGraph::build(statements);
    let sccs = depgraph.sccs();

    let mut stratum_of: HashMap<Signature, usize> = HashMap::new();
    let mut strata = Vec::with_capacity(sccs.len());
    for (i, comp) in sccs.iter().enumerate() {
        for sig in comp {
            stratum_of.insert(sig.clone(), i);
        }
        let recursive = comp.len() > 1 || depgraph.component_has_negative_edge(comp);
        strata.push(Stratum {
            predicates: comp.clone(),
            recursive,
            has_negative_cycle: depgraph.component_has_negative_edge(comp),
        });
    }

    let mut statements_by_stratum: Vec<Vec<Statement>> = vec![Vec::new(); strata.len().max(1)];
    for stmt in statements {
        let head_sigs: Vec<Signature> = stmt
            .head()
            .0
            .iter()
            .filter_map(|l| match l {
                Literal::Pred(p) => Some(p.signature()),
                _ => None,
            })
            .collect();

        let target = if !head_sigs.is_empty() {
            head_sigs.iter().filter_map(|s| stratum_of.get(s)).max().copied()
        } else {
            let body_sigs: Vec<Signature> = stmt
                .body()
                .pos_occ()
                .into_iter()
                .chain(stmt.body().neg_occ())
                .map(|p| p.signature())
                .collect();
            body_sigs.iter().filter_map(|s| stratum_of.get(s)).max().copied()
        };

        match target {
            Some(idx) => statements_by_stratum[idx].push(stmt.clone()),
            None => {
                if statements_by_stratum.is_empty() {
                    statements_by_stratum.push(Vec::new());
                }
                statements_by_stratum[0].push(stmt.clone());
            }
        }
    }

    InstantiationSequence { strata, statements_by_stratum }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::literal::{LiteralCollection, PredLiteral};
    use crate::term::Term;

    fn fact(name: &str) -> Statement {
        Statement::NormalFact(PredLiteral::new(name, vec![]))
    }

    fn rule(head: &str, body_pos: &[&str]) -> Statement {
        let body = body_pos
            .iter()
            .map(|p| Literal::Pred(PredLiteral::new(p, vec![])))
            .collect();
        Statement::NormalRule(PredLiteral::new(head, vec![]), LiteralCollection::new(body))
    }

    #[test]
    fn linear_dependency_is_ordered_source_first() {
        // a. b :- a. c :- b.
        let stmts = vec![fact("a"), rule("b", &["a"]), rule("c", &["b"])];
        let seq = build_instantiation_sequence(&stmts);
        assert_eq!(seq.strata.len(), 3);
        assert!(!seq.strata[0].recursive);
        // a's stratum must come before b's, which must come before c's
        let pos = |name: &str| {
            seq.strata
                .iter()
                .position(|s| s.predicates.iter().any(|sig| sig.0 .0 == name))
                .unwrap()
        };
        assert!(pos("a") < pos("b"));
        assert!(pos("b") < pos("c"));
    }

    #[test]
    fn mutual_recursion_collapses_into_one_stratum() {
        // even :- odd. odd :- even.
        let stmts = vec![rule("even", &["odd"]), rule("odd", &["even"])];
        let seq = build_instantiation_sequence(&stmts);
        assert_eq!(seq.strata.len(), 1);
        assert!(seq.strata[0].recursive);
    }

    #[test]
    fn negative_self_loop_is_flagged() {
        let mut naf = PredLiteral::new("p", vec![Term::Number(1)]);
        naf.naf = true;
        let stmt = Statement::NormalRule(
            PredLiteral::new("p", vec![Term::Variable("X".into())]),
            LiteralCollection::new(vec![Literal::Pred(naf)]),
        );
        let seq = build_instantiation_sequence(&[stmt]);
        assert!(seq.strata[0].has_negative_cycle);
    }

    #[test]
    fn constraint_is_assigned_after_its_body_predicates() {
        let stmts = vec![fact("a"), rule("b", &["a"]), Statement::Constraint(LiteralCollection::new(vec![
            Literal::Pred(PredLiteral::new("b", vec![])),
        ]))];
        let seq = build_instantiation_sequence(&stmts);
        let b_idx = seq
            .strata
            .iter()
            .position(|s| s.predicates.iter().any(|sig| sig.0 .0 == "b"))
            .unwrap();
        assert!(seq.statements_by_stratum[b_idx]
            .iter()
            .any(|s| matches!(s, Statement::Constraint(_))));
    }
}
