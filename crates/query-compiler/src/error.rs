//! Compilation error taxonomy.
//!
//! Every error is fatal to the compilation; no partial plans are returned.
//! Variants carry the clause ids and variable names needed to locate the
//! offending source clause.

use query_parser::{Symbol, Var};
use std::fmt;

use crate::normalize::ClauseId;

#[derive(Debug, Clone, PartialEq)]
pub enum CompileError {
    /// Referenced attribute has no schema mapping.
    UnknownAttribute { attribute: Symbol },
    /// A clause referenced a variable never registered. Internal invariant
    /// violation: normalization registers every clause symbol up front.
    UnknownSymbol { symbol: Var },
    /// No single relation binds all find symbols.
    FindUnbound { symbols: Vec<Var> },
    /// Predicate operands are not bound inside exactly one relation.
    PredicateUnbound { symbols: Vec<Var>, candidates: usize },
    /// Aggregate arguments are not bound inside exactly one relation.
    AggregateUnbound { symbols: Vec<Var>, candidates: usize },
    /// A relation under a disjunction does not bind the projection.
    UnionIncompatible { projection: Vec<Var>, symbols: Vec<Var> },
    /// A negated relation reached a disjunction with no positive partner.
    UnboundNot { symbols: Vec<Var> },
    /// The deferred queue stabilized without emptying.
    UnintroducableClauses { clauses: Vec<ClauseId>, symbols: Vec<Var> },
    /// Tried to merge two existing union relations.
    UnionOfUnions { projection: Vec<Var> },
    /// Definitions of one rule disagree on the head variable list.
    RuleHeadMismatch {
        name: Symbol,
        expected: Vec<Var>,
        found: Vec<Var>,
    },
}

fn format_vars(vars: &[Var]) -> String {
    vars.iter()
        .map(|v| v.to_string())
        .collect::<Vec<_>>()
        .join(" ")
}

impl fmt::Display for CompileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CompileError::UnknownAttribute { attribute } => {
                write!(f, "unknown attribute :{}", attribute)
            }
            CompileError::UnknownSymbol { symbol } => {
                write!(f, "unknown symbol {}", symbol)
            }
            CompileError::FindUnbound { symbols } => {
                write!(
                    f,
                    "find spec contains unbound symbols: {}",
                    format_vars(symbols)
                )
            }
            CompileError::PredicateUnbound { symbols, candidates } => {
                write!(
                    f,
                    "predicate inputs must be bound in a single relation \
                     ({} relations bind {})",
                    candidates,
                    format_vars(symbols)
                )
            }
            CompileError::AggregateUnbound { symbols, candidates } => {
                write!(
                    f,
                    "aggregate arguments must be bound in a single relation \
                     ({} relations bind {})",
                    candidates,
                    format_vars(symbols)
                )
            }
            CompileError::UnionIncompatible { projection, symbols } => {
                write!(
                    f,
                    "union-incompatible relations; insert a projection \
                     (projection {} but relation binds {})",
                    format_vars(projection),
                    format_vars(symbols)
                )
            }
            CompileError::UnboundNot { symbols } => {
                write!(
                    f,
                    "Unbound not: negated relation over {} has no positive \
                     partner in its disjunction",
                    format_vars(symbols)
                )
            }
            CompileError::UnintroducableClauses { clauses, symbols } => {
                let ids = clauses
                    .iter()
                    .map(|id| format!("#{}", id))
                    .collect::<Vec<_>>()
                    .join(", ");
                write!(
                    f,
                    "un-introducable clauses: {} (unbound symbols: {})",
                    ids,
                    format_vars(symbols)
                )
            }
            CompileError::UnionOfUnions { projection } => {
                write!(
                    f,
                    "cannot merge two union relations (projection {})",
                    format_vars(projection)
                )
            }
            CompileError::RuleHeadMismatch {
                name,
                expected,
                found,
            } => {
                write!(
                    f,
                    "rule `{}` definitions disagree on head variables: \
                     expected ({}), found ({})",
                    name,
                    format_vars(expected),
                    format_vars(found)
                )
            }
        }
    }
}

impl std::error::Error for CompileError {}
