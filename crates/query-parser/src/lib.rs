//! Parser for the Datomic-flavored query language
//!
//! This crate lexes and parses the bracket syntax into an AST using the
//! Chumsky library. It recognizes two top-level forms:
//!
//! - **Queries**: `[:find ?t ?key :in ?bound :where [?op :assign/key ?key] ...]`
//! - **Rule sets**: `[[(reachable ?x ?y) [?x :edge ?y]] ...]`
//!
//! Where clauses cover data patterns, comparison predicates, rule
//! invocations, and the `and` / `or` / `or-join` / `not` connectives.
//! Malformed input is rejected with spanned diagnostics.
//!
//! # Example
//!
//! ```ignore
//! use query_parser::{parse_query, SrcId};
//!
//! let q = parse_query("[:find ?n :where [?p :person/name ?n]]", SrcId::empty())?;
//! ```

mod ast;
mod parser;
mod span;
mod token;

pub use ast::{
    AggregateFunc, Clause, ComparisonOp, FindElement, FnArg, Query, RuleDef, Symbol, Value, Var,
};
pub use parser::{parse_query, parse_rules, ParseError};
pub use span::{Span, SrcId};
pub use token::{LexError, Token};
