//! Clause normalization.
//!
//! Walks the nested logical connectives of a `:where`, flattening every
//! clause into a tagged flat list. Each clause records the path of logical
//! scopes it sits in (its *tag*), the variables it mentions, whether it is
//! negated, and the variables that must be bound before it can be
//! introduced. Constant arguments of predicates and rule invocations are
//! hoisted into synthetic input variables so that downstream stages only
//! ever see variables in argument position.

use std::collections::BTreeSet;

use query_parser::{Clause, ComparisonOp, FnArg, Symbol, Value, Var};
use query_plan::{InputSource, TaggedValue};

pub type ClauseId = usize;
pub type ScopeId = usize;

/// How a logical scope combines the relations of its children.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Conjunction,
    Disjunction,
}

/// One step of a context tag: the scope's method, its id (unique within a
/// compilation), and, for `or-join`, the projection that must survive the
/// disjunction.
#[derive(Debug, Clone, PartialEq)]
pub struct TagStep {
    pub method: Method,
    pub scope: ScopeId,
    pub projection: Option<Vec<Var>>,
}

/// Ordered path from the root scope down to a clause's own scope.
pub type Tag = Vec<TagStep>;

pub const ROOT_SCOPE: ScopeId = 0;

pub fn root_tag() -> Tag {
    vec![TagStep {
        method: Method::Conjunction,
        scope: ROOT_SCOPE,
        projection: None,
    }]
}

/// Longest common prefix of two tags. Never empty for tags produced by the
/// normalizer: both start at the root scope.
pub fn shared_context(a: &Tag, b: &Tag) -> Tag {
    a.iter()
        .zip(b.iter())
        .take_while(|(x, y)| x.scope == y.scope && x.method == y.method)
        .map(|(x, _)| x.clone())
        .collect()
}

/// Payload of a normalized clause.
#[derive(Debug, Clone, PartialEq)]
pub enum ClauseBody {
    Lookup {
        entity: i64,
        attribute: Symbol,
        value: Var,
    },
    Entity {
        entity: i64,
        attribute: Var,
        value: Var,
    },
    HasAttr {
        entity: Var,
        attribute: Symbol,
        value: Var,
    },
    Filter {
        entity: Var,
        attribute: Symbol,
        value: Value,
    },
    /// Arguments are variables only; constants were hoisted.
    Pred { op: ComparisonOp, args: Vec<Var> },
    RuleApply { name: Symbol, args: Vec<Var> },
}

/// A flattened, tagged clause.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedClause {
    pub id: ClauseId,
    pub tag: Tag,
    pub body: ClauseBody,
    /// Variables the clause mentions, in first-occurrence order.
    pub symbols: Vec<Var>,
    pub negated: bool,
    /// Variables that must be bound before the clause can be introduced.
    pub deps: BTreeSet<Var>,
}

impl NormalizedClause {
    pub fn is_predicate(&self) -> bool {
        matches!(self.body, ClauseBody::Pred { .. })
    }
}

/// Output of normalization.
#[derive(Debug, Clone, Default)]
pub struct Normalized {
    /// Synthetic variables for hoisted constants, in hoisting order.
    pub inputs: Vec<(Var, InputSource)>,
    pub clauses: Vec<NormalizedClause>,
    /// Next free synthetic-input index; the find resolver continues the
    /// numbering when it hoists aggregate arguments.
    pub next_input: usize,
}

pub fn render_value(value: &Value) -> TaggedValue {
    match value {
        Value::Number(n) => TaggedValue::Number(*n),
        Value::String(s) => TaggedValue::String(s.clone()),
        Value::Bool(b) => TaggedValue::Bool(*b),
    }
}

pub fn synthetic_input(index: usize) -> Var {
    Var::new(format!("in_{}", index))
}

struct Normalizer {
    next_clause: ClauseId,
    next_scope: ScopeId,
    out: Normalized,
}

/// Flatten a `:where` clause list into tagged clauses and hoisted inputs.
pub fn normalize(clauses: &[Clause]) -> Normalized {
    let mut normalizer = Normalizer {
        next_clause: 0,
        next_scope: ROOT_SCOPE + 1,
        out: Normalized::default(),
    };
    normalizer.walk(clauses, &root_tag(), false);
    normalizer.out
}

impl Normalizer {
    fn fresh_scope(&mut self, method: Method, projection: Option<Vec<Var>>) -> TagStep {
        let scope = self.next_scope;
        self.next_scope += 1;
        TagStep {
            method,
            scope,
            projection,
        }
    }

    fn walk(&mut self, clauses: &[Clause], tag: &Tag, negated: bool) {
        for clause in clauses {
            match clause {
                Clause::And(inner) => {
                    let mut child = tag.clone();
                    child.push(self.fresh_scope(Method::Conjunction, None));
                    self.walk(inner, &child, negated);
                }
                Clause::Or(inner) => {
                    let mut child = tag.clone();
                    child.push(self.fresh_scope(Method::Disjunction, None));
                    self.walk(inner, &child, negated);
                }
                Clause::OrJoin { projection, clauses } => {
                    let mut child = tag.clone();
                    child.push(self.fresh_scope(Method::Disjunction, Some(projection.clone())));
                    self.walk(clauses, &child, negated);
                }
                Clause::Not(inner) => {
                    let mut child = tag.clone();
                    child.push(self.fresh_scope(Method::Conjunction, None));
                    self.walk(inner, &child, true);
                }
                Clause::Lookup {
                    entity,
                    attribute,
                    value,
                } => {
                    self.emit(
                        tag,
                        ClauseBody::Lookup {
                            entity: *entity,
                            attribute: *attribute,
                            value: *value,
                        },
                        vec![*value],
                        negated,
                    );
                }
                Clause::Entity {
                    entity,
                    attribute,
                    value,
                } => {
                    self.emit(
                        tag,
                        ClauseBody::Entity {
                            entity: *entity,
                            attribute: *attribute,
                            value: *value,
                        },
                        vec![*attribute, *value],
                        negated,
                    );
                }
                Clause::HasAttr {
                    entity,
                    attribute,
                    value,
                } => {
                    self.emit(
                        tag,
                        ClauseBody::HasAttr {
                            entity: *entity,
                            attribute: *attribute,
                            value: *value,
                        },
                        vec![*entity, *value],
                        negated,
                    );
                }
                Clause::Filter {
                    entity,
                    attribute,
                    value,
                } => {
                    self.emit(
                        tag,
                        ClauseBody::Filter {
                            entity: *entity,
                            attribute: *attribute,
                            value: value.clone(),
                        },
                        vec![*entity],
                        negated,
                    );
                }
                Clause::Pred { op, args } => {
                    let args = self.hoist_constants(args);
                    let symbols = dedup(&args);
                    self.emit(tag, ClauseBody::Pred { op: *op, args }, symbols, negated);
                }
                Clause::RuleApply { name, args } => {
                    let args = self.hoist_constants(args);
                    let symbols = dedup(&args);
                    self.emit(
                        tag,
                        ClauseBody::RuleApply { name: *name, args },
                        symbols,
                        negated,
                    );
                }
            }
        }
    }

    /// Replace constant arguments by fresh synthetic input variables.
    fn hoist_constants(&mut self, args: &[FnArg]) -> Vec<Var> {
        args.iter()
            .map(|arg| match arg {
                FnArg::Var(var) => *var,
                FnArg::Const(value) => {
                    let var = synthetic_input(self.out.next_input);
                    self.out.next_input += 1;
                    self.out
                        .inputs
                        .push((var, InputSource::Const(render_value(value))));
                    var
                }
            })
            .collect()
    }

    fn emit(&mut self, tag: &Tag, body: ClauseBody, symbols: Vec<Var>, negated: bool) {
        let symbols = dedup(&symbols);
        let deps: BTreeSet<Var> = if negated {
            // A negated clause introduces no new bindings.
            symbols.iter().copied().collect()
        } else {
            match &body {
                ClauseBody::Pred { .. } => symbols.iter().copied().collect(),
                // A positive rule invocation is introducible before its
                // arguments are bound; the executor feeds the rule's
                // bindings back.
                _ => BTreeSet::new(),
            }
        };
        let id = self.next_clause;
        self.next_clause += 1;
        self.out.clauses.push(NormalizedClause {
            id,
            tag: tag.clone(),
            body,
            symbols,
            negated,
            deps,
        });
    }
}

fn dedup(vars: &[Var]) -> Vec<Var> {
    let mut seen = Vec::new();
    for &var in vars {
        if !seen.contains(&var) {
            seen.push(var);
        }
    }
    seen
}
