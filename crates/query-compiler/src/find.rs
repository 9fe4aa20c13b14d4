//! Find-spec resolution.
//!
//! After unification the context holds one or more relations. Aggregates
//! in the `:find` list are folded onto the relation binding their
//! arguments, then the whole find symbol list is located inside a single
//! relation and projected out.

use query_parser::{FindElement, FnArg, Var};
use query_plan::Plan;

use crate::error::CompileError;
use crate::normalize::render_value;
use crate::unify::UnificationContext;

/// Resolve the `:find` specification against the unified relation set,
/// producing the query's final plan.
pub fn resolve_find(
    ctx: &mut UnificationContext,
    find: &[FindElement],
) -> Result<Plan, CompileError> {
    let mut find_symbols = Vec::new();

    for element in find {
        match element {
            FindElement::Var(var) => find_symbols.push(*var),
            FindElement::Aggregate { func, args } => {
                let vars: Vec<Var> = args
                    .iter()
                    .map(|arg| match arg {
                        FnArg::Var(var) => *var,
                        FnArg::Const(value) => ctx.fresh_input(render_value(value)),
                    })
                    .collect();
                apply_aggregate(ctx, func.name(), &vars)?;
                find_symbols.extend(vars);
            }
        }
    }

    let needed: Vec<Var> = find_symbols
        .iter()
        .copied()
        .filter(|&v| !ctx.is_input(v))
        .collect();
    let candidates = ctx.covering(&needed);
    let idx = match candidates.first() {
        Some(&idx) => idx,
        None => {
            return Err(CompileError::FindUnbound {
                symbols: unbound_report(ctx, &needed),
            })
        }
    };

    let relation = &ctx.relations[idx];
    if relation.symbols == find_symbols {
        Ok(relation.plan.clone())
    } else {
        let positions = ctx.symbols.resolve_all(&find_symbols)?;
        Ok(Plan::Project {
            child: Box::new(relation.plan.clone()),
            positions,
        })
    }
}

/// Replace the plan of the single relation binding the aggregate's
/// arguments with an aggregation node.
fn apply_aggregate(
    ctx: &mut UnificationContext,
    name: &str,
    vars: &[Var],
) -> Result<(), CompileError> {
    let needed: Vec<Var> = vars
        .iter()
        .copied()
        .filter(|&v| !ctx.is_input(v))
        .collect();
    let candidates = ctx.covering(&needed);
    if candidates.len() != 1 {
        return Err(CompileError::AggregateUnbound {
            symbols: needed,
            candidates: candidates.len(),
        });
    }
    let arg_positions = ctx.symbols.resolve_all(vars)?;
    let relation = &mut ctx.relations[candidates[0]];
    relation.plan = Plan::Aggregate {
        name: name.to_string(),
        child: Box::new(relation.plan.clone()),
        arg_positions,
    };
    Ok(())
}

/// Name the find symbols a user can act on: those bound by no relation at
/// all, or the whole set when they are scattered across relations.
fn unbound_report(ctx: &UnificationContext, needed: &[Var]) -> Vec<Var> {
    let nowhere: Vec<Var> = needed
        .iter()
        .copied()
        .filter(|v| !ctx.relations.iter().any(|rel| rel.symbols.contains(v)))
        .collect();
    if nowhere.is_empty() {
        needed.to_vec()
    } else {
        nowhere
    }
}
