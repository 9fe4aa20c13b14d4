//! Rule compilation.
//!
//! Rule definitions are grouped by head; a rule with several definitions
//! becomes a disjunction of its bodies, projected onto the head variables.
//! Rules compile independently of one another: a rule invocation stays a
//! plan node and is resolved by the executor, which is what makes
//! recursive rules possible.

use query_parser::{Clause, RuleDef, Symbol, Var};
use query_plan::Plan;

use crate::error::CompileError;
use crate::normalize::normalize;
use crate::reorder::reorder;
use crate::schema::AttributeMap;
use crate::unify::UnificationContext;

/// Final output of compiling one rule head.
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledRule {
    pub name: Symbol,
    pub plan: Plan,
}

/// Compile a rule set, producing one plan per distinct rule head.
pub fn compile_rules(
    defs: &[RuleDef],
    attrs: &AttributeMap,
) -> Result<Vec<CompiledRule>, CompileError> {
    let mut groups: Vec<(Symbol, Vec<&RuleDef>)> = Vec::new();
    for def in defs {
        match groups.iter_mut().find(|(name, _)| *name == def.name) {
            Some((_, group)) => group.push(def),
            None => groups.push((def.name, vec![def])),
        }
    }

    let mut rules = Vec::new();
    for (name, group) in groups {
        let head = group[0].head.clone();
        for def in &group[1..] {
            if def.head != head {
                return Err(CompileError::RuleHeadMismatch {
                    name,
                    expected: head.clone(),
                    found: def.head.clone(),
                });
            }
        }

        let body = if group.len() == 1 {
            group[0].body.clone()
        } else {
            // Several definitions: a disjunction over the bodies, keyed on
            // the head variables.
            vec![Clause::OrJoin {
                projection: head.clone(),
                clauses: group
                    .iter()
                    .map(|def| Clause::And(def.body.clone()))
                    .collect(),
            }]
        };

        let plan = compile_rule_body(&head, &body, attrs)?;
        rules.push(CompiledRule { name, plan });
    }
    Ok(rules)
}

fn compile_rule_body(
    head: &[Var],
    body: &[Clause],
    attrs: &AttributeMap,
) -> Result<Plan, CompileError> {
    let mut ctx = UnificationContext::new(attrs);
    // Head variables take the first positions of the rule's tuple space.
    for &var in head {
        ctx.register(var);
    }

    let normalized = normalize(body);
    for (var, source) in normalized.inputs.clone() {
        ctx.declare_input(var, source);
    }
    ctx.set_next_input(normalized.next_input);
    ctx.unify(reorder(normalized.clauses))?;

    let candidates = ctx.covering(head);
    let relation = match candidates.first() {
        Some(&idx) => &ctx.relations[idx],
        None => {
            return Err(CompileError::FindUnbound {
                symbols: head.to_vec(),
            })
        }
    };
    let positions = ctx.symbols.resolve_all(head)?;
    Ok(Plan::Project {
        child: Box::new(relation.plan.clone()),
        positions,
    })
}
