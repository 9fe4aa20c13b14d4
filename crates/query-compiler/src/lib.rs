//! Query compiler
//!
//! Compiles parsed queries and rule sets into relational dataflow plans
//! for an incremental executor. The pipeline runs in fixed stages, each
//! with an immutable output:
//!
//! ```text
//! AST (query-parser)
//!     ↓
//! [Normalize]   → tagged flat clauses + hoisted inputs
//!     ↓
//! [Reorder]     → binding producers ahead of consumers
//!     ↓
//! [Unify]       → one relation per connected clause set
//!     ↓
//! [Find/Rules]  → aggregation, projection, plan extraction
//!     ↓
//! Plan (query-plan)
//! ```
//!
//! Compilation is pure: no shared mutable state, deterministic output for
//! a given query and attribute registry. Independent compilations can run
//! in parallel against the same (read-only) registry.

mod error;
mod find;
mod normalize;
mod query;
mod reorder;
mod rules;
mod schema;
mod unify;

pub use error::CompileError;
pub use normalize::{
    normalize, root_tag, shared_context, ClauseBody, ClauseId, Method, Normalized,
    NormalizedClause, ScopeId, Tag, TagStep,
};
pub use query::{compile_query, CompiledQuery};
pub use reorder::reorder;
pub use rules::{compile_rules, CompiledRule};
pub use schema::AttributeMap;
pub use unify::{Relation, SymbolTable, UnificationContext};
