//! End-to-end and property-based tests for the query compiler
//!
//! Scenario tests drive whole queries and rule sets through the compiler
//! and assert on the shape of the resulting plans; property tests explore
//! determinism and the structural plan invariants on generated queries.

#[cfg(test)]
mod properties;

#[cfg(test)]
mod scenarios;
