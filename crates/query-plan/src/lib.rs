//! Plan types for the incremental dataflow executor
//!
//! This crate defines the contract between the query compiler and the
//! dataflow executor: the `Plan` operator tree, tagged constants, and the
//! input map entries. It carries no compilation logic of its own.

mod plan;

pub use plan::{Aid, Eid, InputSource, Plan, PredicateOp, TaggedValue};
