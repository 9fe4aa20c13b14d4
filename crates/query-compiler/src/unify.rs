//! Relation unification.
//!
//! The unifier walks the ordered clause list and maintains a set of partial
//! *relations*, each covering some variables, tagged with the logical scope
//! that produced it. Clauses whose dependencies are not yet bound are
//! deferred and retried; a deferred queue that stops making progress is a
//! compile error.
//!
//! Combining two conflicting relations picks `Join`, `Antijoin`, or `Union`
//! from the terminal step of their most-specific shared context. Seeds
//! combine eagerly with conflicting relations of their own scope; relations
//! from different scopes are merged in a final consolidation pass, deepest
//! shared context first, so that every branch of a disjunction exists
//! before the disjunction is folded into its surroundings.

use std::collections::{BTreeSet, HashMap};

use query_parser::{ComparisonOp, Var};
use query_plan::{InputSource, Plan, PredicateOp, TaggedValue};

use crate::error::CompileError;
use crate::normalize::{
    render_value, shared_context, synthetic_input, ClauseBody, Method, NormalizedClause, Tag,
};
use crate::schema::AttributeMap;

/// A partial plan covering some variables.
#[derive(Debug, Clone, PartialEq)]
pub struct Relation {
    pub tag: Tag,
    /// Variables the plan binds, in order, free of duplicates.
    pub symbols: Vec<Var>,
    pub negated: bool,
    pub deps: BTreeSet<Var>,
    pub plan: Plan,
}

/// Ordered variable → position assignment. Positions are stable for the
/// lifetime of one compilation and identify variables inside plans.
#[derive(Debug, Clone, Default)]
pub struct SymbolTable {
    positions: HashMap<Var, usize>,
    ordered: Vec<Var>,
}

impl SymbolTable {
    pub fn register(&mut self, var: Var) -> usize {
        if let Some(&pos) = self.positions.get(&var) {
            return pos;
        }
        let pos = self.ordered.len();
        self.positions.insert(var, pos);
        self.ordered.push(var);
        pos
    }

    pub fn resolve(&self, var: Var) -> Result<usize, CompileError> {
        self.positions
            .get(&var)
            .copied()
            .ok_or(CompileError::UnknownSymbol { symbol: var })
    }

    pub fn resolve_all(&self, vars: &[Var]) -> Result<Vec<usize>, CompileError> {
        vars.iter().map(|&var| self.resolve(var)).collect()
    }
}

fn encode_op(op: ComparisonOp) -> PredicateOp {
    match op {
        ComparisonOp::LessThan => PredicateOp::LT,
        ComparisonOp::LessOrEqual => PredicateOp::LTE,
        ComparisonOp::GreaterThan => PredicateOp::GT,
        ComparisonOp::GreaterOrEqual => PredicateOp::GTE,
        ComparisonOp::Equal => PredicateOp::EQ,
        ComparisonOp::NotEqual => PredicateOp::NEQ,
    }
}

/// State threaded through one compilation.
#[derive(Debug)]
pub struct UnificationContext<'a> {
    pub(crate) symbols: SymbolTable,
    pub(crate) inputs: Vec<(Var, InputSource)>,
    attrs: &'a AttributeMap,
    pub(crate) relations: Vec<Relation>,
    next_input: usize,
}

impl<'a> UnificationContext<'a> {
    pub fn new(attrs: &'a AttributeMap) -> Self {
        UnificationContext {
            symbols: SymbolTable::default(),
            inputs: Vec::new(),
            attrs,
            relations: Vec::new(),
            next_input: 0,
        }
    }

    /// Register a variable without binding it (rule heads).
    pub fn register(&mut self, var: Var) -> usize {
        self.symbols.register(var)
    }

    /// Declare an externally supplied or hoisted input.
    pub fn declare_input(&mut self, var: Var, source: InputSource) {
        self.symbols.register(var);
        self.inputs.push((var, source));
    }

    /// Continue the synthetic-input numbering after normalization.
    pub fn set_next_input(&mut self, next: usize) {
        self.next_input = next;
    }

    /// Hoist one more constant (aggregate arguments, resolved late).
    pub(crate) fn fresh_input(&mut self, value: TaggedValue) -> Var {
        let var = synthetic_input(self.next_input);
        self.next_input += 1;
        self.declare_input(var, InputSource::Const(value));
        var
    }

    pub(crate) fn is_input(&self, var: Var) -> bool {
        self.inputs.iter().any(|(v, _)| *v == var)
    }

    fn is_bound(&self, var: Var) -> bool {
        self.is_input(var) || self.relations.iter().any(|rel| rel.symbols.contains(&var))
    }

    fn clause_ready(&self, clause: &NormalizedClause) -> bool {
        clause.deps.iter().all(|&var| self.is_bound(var))
    }

    /// Indices of relations binding every one of `vars`.
    pub(crate) fn covering(&self, vars: &[Var]) -> Vec<usize> {
        self.relations
            .iter()
            .enumerate()
            .filter(|(_, rel)| vars.iter().all(|v| rel.symbols.contains(v)))
            .map(|(idx, _)| idx)
            .collect()
    }

    /// Drive the whole clause list to a consolidated relation set.
    pub fn unify(&mut self, clauses: Vec<NormalizedClause>) -> Result<(), CompileError> {
        let mut queue = clauses;
        while !queue.is_empty() {
            let mut deferred = Vec::new();
            let mut progress = false;
            for clause in queue {
                if self.clause_ready(&clause) {
                    self.introduce(clause)?;
                    progress = true;
                } else {
                    deferred.push(clause);
                }
            }
            if !progress {
                let clauses: Vec<_> = deferred.iter().map(|c| c.id).collect();
                let symbols: BTreeSet<Var> = deferred
                    .iter()
                    .flat_map(|c| c.deps.iter().copied())
                    .filter(|&v| !self.is_bound(v))
                    .collect();
                return Err(CompileError::UnintroducableClauses {
                    clauses,
                    symbols: symbols.into_iter().collect(),
                });
            }
            queue = deferred;
        }
        self.consolidate()
    }

    fn introduce(&mut self, clause: NormalizedClause) -> Result<(), CompileError> {
        for &var in &clause.symbols {
            self.symbols.register(var);
        }
        if clause.is_predicate() {
            return self.attach_predicate(clause);
        }
        let seed = self.plan_clause(&clause)?;
        self.insert(seed)
    }

    /// Insert a seed relation, combining eagerly within its own scope.
    /// Cross-scope combination waits for consolidation so that disjunction
    /// branches stay separate until every branch exists.
    fn insert(&mut self, seed: Relation) -> Result<(), CompileError> {
        let (conflicting, free): (Vec<_>, Vec<_>) = std::mem::take(&mut self.relations)
            .into_iter()
            .partition(|rel| rel.tag == seed.tag && shares_symbol(rel, &seed));
        self.relations = free;
        let mut combined = seed;
        for rel in conflicting {
            combined = self.combine(combined, rel)?;
        }
        self.relations.push(combined);
        Ok(())
    }

    fn plan_clause(&mut self, clause: &NormalizedClause) -> Result<Relation, CompileError> {
        let plan = match &clause.body {
            ClauseBody::Lookup {
                entity,
                attribute,
                value,
            } => Plan::Lookup {
                entity_id: *entity,
                attr_id: self.attrs.resolve(*attribute)?,
                var_pos: self.symbols.resolve(*value)?,
            },
            ClauseBody::Entity {
                entity,
                attribute,
                value,
            } => Plan::Entity {
                entity_id: *entity,
                attr_pos: self.symbols.resolve(*attribute)?,
                val_pos: self.symbols.resolve(*value)?,
            },
            ClauseBody::HasAttr {
                entity,
                attribute,
                value,
            } => Plan::HasAttr {
                entity_pos: self.symbols.resolve(*entity)?,
                attr_id: self.attrs.resolve(*attribute)?,
                val_pos: self.symbols.resolve(*value)?,
            },
            ClauseBody::Filter {
                entity,
                attribute,
                value,
            } => Plan::Filter {
                entity_pos: self.symbols.resolve(*entity)?,
                attr_id: self.attrs.resolve(*attribute)?,
                value: render_value(value),
            },
            ClauseBody::RuleApply { name, args } => Plan::RuleExpr {
                name: name.to_string(),
                arg_positions: self.symbols.resolve_all(args)?,
            },
            ClauseBody::Pred { .. } => {
                unreachable!("predicates are attached, not planned")
            }
        };
        Ok(Relation {
            tag: clause.tag.clone(),
            symbols: clause.symbols.clone(),
            negated: clause.negated,
            deps: clause.deps.clone(),
            plan,
        })
    }

    /// Predicates produce no bindings: they attach to the unique relation
    /// that binds all their operands. Same scope wraps the relation in
    /// place; a predicate in a deeper scope (a bare predicate branch of an
    /// `or`) becomes its own relation over a copy of the target's plan.
    fn attach_predicate(&mut self, clause: NormalizedClause) -> Result<(), CompileError> {
        let (op, args) = match &clause.body {
            ClauseBody::Pred { op, args } => (encode_op(*op), args.clone()),
            other => unreachable!("attach_predicate on non-predicate {:?}", other),
        };
        let needed: Vec<Var> = clause
            .symbols
            .iter()
            .copied()
            .filter(|&v| !self.is_input(v))
            .collect();
        let arg_positions = self.symbols.resolve_all(&args)?;

        let candidates = self.predicate_targets(&clause.tag, &needed);
        if candidates.len() != 1 {
            return Err(CompileError::PredicateUnbound {
                symbols: needed,
                candidates: candidates.len(),
            });
        }
        let idx = candidates[0];

        if self.relations[idx].tag == clause.tag {
            let rel = &mut self.relations[idx];
            rel.plan = Plan::PredExpr {
                op,
                arg_positions,
                child: Box::new(rel.plan.clone()),
            };
            rel.deps.extend(needed);
            Ok(())
        } else {
            let child = Box::new(self.relations[idx].plan.clone());
            self.insert(Relation {
                tag: clause.tag,
                // Synthetic input variables are bound by the executor, not
                // by this relation; keeping them out lets sibling branches
                // with different hoisted constants still union.
                symbols: needed,
                negated: clause.negated,
                deps: clause.deps,
                plan: Plan::PredExpr {
                    op,
                    arg_positions,
                    child,
                },
            })
        }
    }

    /// Relations a predicate may attach to: those in the same or an
    /// enclosing/enclosed scope. Relations with the predicate's own tag
    /// under a disjunction are sibling alternatives, not targets.
    fn predicate_targets(&self, tag: &Tag, needed: &[Var]) -> Vec<usize> {
        self.relations
            .iter()
            .enumerate()
            .filter(|(_, rel)| {
                let shared = shared_context(tag, &rel.tag);
                let compatible = if shared.len() == tag.len() && shared.len() == rel.tag.len() {
                    tag.last().map(|step| step.method) == Some(Method::Conjunction)
                } else {
                    shared.len() == tag.len() || shared.len() == rel.tag.len()
                };
                compatible && needed.iter().all(|v| rel.symbols.contains(v))
            })
            .map(|(idx, _)| idx)
            .collect()
    }

    /// Merge conflicting relations across scopes until none remain,
    /// deepest shared context first. Relations sharing no variable are
    /// left alone; the find resolver decides whether that is an error.
    fn consolidate(&mut self) -> Result<(), CompileError> {
        loop {
            let mut best: Option<(usize, usize, usize)> = None;
            for i in 0..self.relations.len() {
                for j in (i + 1)..self.relations.len() {
                    if !shares_symbol(&self.relations[i], &self.relations[j]) {
                        continue;
                    }
                    let depth =
                        shared_context(&self.relations[i].tag, &self.relations[j].tag).len();
                    if best.map_or(true, |(d, _, _)| depth > d) {
                        best = Some((depth, i, j));
                    }
                }
            }
            let (i, j) = match best {
                Some((_, i, j)) => (i, j),
                None => return Ok(()),
            };
            let r2 = self.relations.remove(j);
            let r1 = self.relations.remove(i);
            let combined = self.combine(r1, r2)?;
            self.relations.push(combined);
        }
    }

    /// Combine two conflicting relations; the method comes from the
    /// terminal step of their most-specific shared context.
    fn combine(&self, r1: Relation, r2: Relation) -> Result<Relation, CompileError> {
        let shared_tag = shared_context(&r1.tag, &r2.tag);
        let method = shared_tag
            .last()
            .expect("tags share at least the root scope")
            .method;
        match method {
            Method::Conjunction => match (r1.negated, r2.negated) {
                (false, true) => self.antijoin(r1, r2, shared_tag),
                (true, false) => self.antijoin(r2, r1, shared_tag),
                // Both positive, or the conjoined body of a `not`.
                _ => self.join(r1, r2, shared_tag),
            },
            Method::Disjunction => {
                if r1.negated || r2.negated {
                    let negated = if r1.negated { &r1 } else { &r2 };
                    return Err(CompileError::UnboundNot {
                        symbols: negated.symbols.clone(),
                    });
                }
                self.union(r1, r2, shared_tag)
            }
        }
    }

    fn join(&self, r1: Relation, r2: Relation, tag: Tag) -> Result<Relation, CompileError> {
        // Single-key join: the first shared variable becomes the key, the
        // rest of both symbol lists carries over.
        let join_var = *r1
            .symbols
            .iter()
            .find(|v| r2.symbols.contains(v))
            .expect("joined relations share a variable");
        let mut symbols = vec![join_var];
        symbols.extend(r1.symbols.iter().copied().filter(|&v| v != join_var));
        symbols.extend(
            r2.symbols
                .iter()
                .copied()
                .filter(|v| !r1.symbols.contains(v)),
        );
        let negated = r1.negated && r2.negated;
        let mut deps = r1.deps;
        deps.extend(r2.deps);
        Ok(Relation {
            tag,
            symbols,
            negated,
            deps,
            plan: Plan::Join {
                left: Box::new(r1.plan),
                // Single-key equi-join; the executor only equates join_pos.
                join_pos: self.symbols.resolve(join_var)?,
                right: Box::new(r2.plan),
            },
        })
    }

    fn antijoin(&self, pos: Relation, neg: Relation, tag: Tag) -> Result<Relation, CompileError> {
        let shared: Vec<Var> = pos
            .symbols
            .iter()
            .copied()
            .filter(|v| neg.symbols.contains(v))
            .collect();
        let join_positions = self.symbols.resolve_all(&shared)?;
        let mut symbols = shared.clone();
        symbols.extend(pos.symbols.iter().copied().filter(|v| !shared.contains(v)));
        let mut deps = pos.deps;
        deps.extend(neg.deps);
        Ok(Relation {
            tag,
            symbols,
            negated: false,
            deps,
            plan: Plan::Antijoin {
                left: Box::new(pos.plan),
                right: Box::new(neg.plan),
                join_positions,
            },
        })
    }

    fn union(&self, r1: Relation, r2: Relation, tag: Tag) -> Result<Relation, CompileError> {
        let projection: Vec<Var> = tag
            .last()
            .and_then(|step| step.projection.clone())
            .unwrap_or_else(|| r1.symbols.clone());
        for rel in [&r1, &r2] {
            if !projection.iter().all(|v| rel.symbols.contains(v)) {
                return Err(CompileError::UnionIncompatible {
                    projection: projection.clone(),
                    symbols: rel.symbols.clone(),
                });
            }
        }
        let positions = self.symbols.resolve_all(&projection)?;
        let plan = match (
            union_children(&r1.plan, &positions),
            union_children(&r2.plan, &positions),
        ) {
            (Some(_), Some(_)) => {
                return Err(CompileError::UnionOfUnions { projection });
            }
            (Some(mut children), None) => {
                children.push(r2.plan);
                Plan::Union {
                    positions,
                    children,
                }
            }
            (None, Some(mut children)) => {
                children.push(r1.plan);
                Plan::Union {
                    positions,
                    children,
                }
            }
            (None, None) => Plan::Union {
                positions,
                children: vec![r1.plan, r2.plan],
            },
        };
        let mut deps = r1.deps;
        deps.extend(r2.deps);
        Ok(Relation {
            tag,
            symbols: projection,
            negated: false,
            deps,
            plan,
        })
    }
}

fn shares_symbol(a: &Relation, b: &Relation) -> bool {
    a.symbols.iter().any(|v| b.symbols.contains(v))
}

/// The children of an existing union keyed on exactly `positions`.
fn union_children(plan: &Plan, positions: &[usize]) -> Option<Vec<Plan>> {
    match plan {
        Plan::Union {
            positions: existing,
            children,
        } if existing == positions => Some(children.clone()),
        _ => None,
    }
}
