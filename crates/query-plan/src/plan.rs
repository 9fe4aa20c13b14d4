//! Relational dataflow plan tree.
//!
//! A `Plan` is the executable output of the query compiler: a tree of
//! relational operators over an entity/attribute/value store. Variables do
//! not appear in plans; every operand is either a resolved attribute id or
//! a tuple position assigned by the compiler's symbol table.
//!
//! The serialized form of these types is a contract with the downstream
//! executor. In particular the comparison operator names (`LT`, `LTE`,
//! `GT`, `GTE`, `EQ`, `NEQ`) must not be renamed.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Entity identifier, literal in queries.
pub type Eid = i64;

/// Attribute identifier, assigned by the schema registry.
pub type Aid = u32;

/// A constant tagged by its literal kind.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum TaggedValue {
    Number(i64),
    String(String),
    Bool(bool),
}

impl fmt::Display for TaggedValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaggedValue::Number(n) => write!(f, "{}", n),
            TaggedValue::String(s) => write!(f, "\"{}\"", s),
            TaggedValue::Bool(b) => write!(f, "{}", b),
        }
    }
}

/// Encoded comparison operator of a predicate node.
///
/// The variant names are the wire encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[allow(clippy::upper_case_acronyms)]
pub enum PredicateOp {
    LT,
    LTE,
    GT,
    GTE,
    EQ,
    NEQ,
}

impl PredicateOp {
    pub fn as_str(&self) -> &'static str {
        match self {
            PredicateOp::LT => "LT",
            PredicateOp::LTE => "LTE",
            PredicateOp::GT => "GT",
            PredicateOp::GTE => "GTE",
            PredicateOp::EQ => "EQ",
            PredicateOp::NEQ => "NEQ",
        }
    }
}

impl fmt::Display for PredicateOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A parameter supplied to a plan at execution time: either a constant
/// hoisted out of the query text, or an externally bound input identified
/// by its zero-based position in the query's `:in` clause.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum InputSource {
    Const(TaggedValue),
    Input(usize),
}

/// A node in the dataflow plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Plan {
    /// Values of one attribute of one known entity.
    Lookup { entity_id: Eid, attr_id: Aid, var_pos: usize },
    /// All attribute/value pairs of one known entity.
    Entity { entity_id: Eid, attr_pos: usize, val_pos: usize },
    /// All entity/value pairs carrying one attribute.
    HasAttr { entity_pos: usize, attr_id: Aid, val_pos: usize },
    /// Entities whose attribute has a known constant value.
    Filter {
        entity_pos: usize,
        attr_id: Aid,
        value: TaggedValue,
    },
    /// Equi-join of two sub-plans on a single position.
    Join {
        left: Box<Plan>,
        right: Box<Plan>,
        join_pos: usize,
    },
    /// Tuples of `left` with no match in `right` on the key positions.
    Antijoin {
        left: Box<Plan>,
        right: Box<Plan>,
        join_positions: Vec<usize>,
    },
    /// Disjunction: every child projected onto `positions`.
    Union { positions: Vec<usize>, children: Vec<Plan> },
    /// Project the child onto `positions`, in order.
    Project { child: Box<Plan>, positions: Vec<usize> },
    /// Aggregation over the child's bindings of `arg_positions`.
    Aggregate {
        name: String,
        child: Box<Plan>,
        arg_positions: Vec<usize>,
    },
    /// Comparison predicate constraining the child's tuples.
    PredExpr {
        op: PredicateOp,
        arg_positions: Vec<usize>,
        child: Box<Plan>,
    },
    /// Reference to a named rule, resolved by the executor.
    RuleExpr { name: String, arg_positions: Vec<usize> },
}

impl Plan {
    /// Positions this plan binds, determined symbolically.
    ///
    /// Used by tests to check plan-shape invariants (join keys resolvable,
    /// union children covering the union positions, and so on) without an
    /// executor.
    pub fn bound_positions(&self) -> BTreeSet<usize> {
        match self {
            Plan::Lookup { var_pos, .. } => [*var_pos].into(),
            Plan::Entity { attr_pos, val_pos, .. } => [*attr_pos, *val_pos].into(),
            Plan::HasAttr { entity_pos, val_pos, .. } => [*entity_pos, *val_pos].into(),
            Plan::Filter { entity_pos, .. } => [*entity_pos].into(),
            Plan::Join { left, right, .. } => {
                let mut bound = left.bound_positions();
                bound.extend(right.bound_positions());
                bound
            }
            // Antijoin passes the positive side through unchanged.
            Plan::Antijoin { left, .. } => left.bound_positions(),
            Plan::Union { positions, .. } => positions.iter().copied().collect(),
            Plan::Project { positions, .. } => positions.iter().copied().collect(),
            Plan::Aggregate { arg_positions, .. } => arg_positions.iter().copied().collect(),
            Plan::PredExpr { child, .. } => child.bound_positions(),
            Plan::RuleExpr { arg_positions, .. } => arg_positions.iter().copied().collect(),
        }
    }

    /// Pretty print the plan tree for debugging.
    pub fn pretty_print(&self, indent: usize) -> String {
        let prefix = "  ".repeat(indent);

        match self {
            Plan::Lookup {
                entity_id,
                attr_id,
                var_pos,
            } => format!("{prefix}Lookup(entity={entity_id}, attr={attr_id}, var={var_pos})"),
            Plan::Entity {
                entity_id,
                attr_pos,
                val_pos,
            } => format!("{prefix}Entity(entity={entity_id}, attr={attr_pos}, val={val_pos})"),
            Plan::HasAttr {
                entity_pos,
                attr_id,
                val_pos,
            } => format!("{prefix}HasAttr(entity={entity_pos}, attr={attr_id}, val={val_pos})"),
            Plan::Filter {
                entity_pos,
                attr_id,
                value,
            } => format!("{prefix}Filter(entity={entity_pos}, attr={attr_id}, value={value})"),
            Plan::Join {
                left,
                right,
                join_pos,
            } => {
                format!(
                    "{}Join(key={})\n{}\n{}",
                    prefix,
                    join_pos,
                    left.pretty_print(indent + 1),
                    right.pretty_print(indent + 1)
                )
            }
            Plan::Antijoin {
                left,
                right,
                join_positions,
            } => {
                format!(
                    "{}Antijoin(keys={:?})\n{}\n{}",
                    prefix,
                    join_positions,
                    left.pretty_print(indent + 1),
                    right.pretty_print(indent + 1)
                )
            }
            Plan::Union { positions, children } => {
                let mut result = format!("{prefix}Union(positions={positions:?})");
                for child in children {
                    result.push('\n');
                    result.push_str(&child.pretty_print(indent + 1));
                }
                result
            }
            Plan::Project { child, positions } => {
                format!(
                    "{}Project(positions={:?})\n{}",
                    prefix,
                    positions,
                    child.pretty_print(indent + 1)
                )
            }
            Plan::Aggregate {
                name,
                child,
                arg_positions,
            } => {
                format!(
                    "{}Aggregate({}, args={:?})\n{}",
                    prefix,
                    name,
                    arg_positions,
                    child.pretty_print(indent + 1)
                )
            }
            Plan::PredExpr {
                op,
                arg_positions,
                child,
            } => {
                format!(
                    "{}PredExpr({}, args={:?})\n{}",
                    prefix,
                    op,
                    arg_positions,
                    child.pretty_print(indent + 1)
                )
            }
            Plan::RuleExpr { name, arg_positions } => {
                format!("{prefix}RuleExpr({name}, args={arg_positions:?})")
            }
        }
    }
}
