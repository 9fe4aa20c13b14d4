//! Whole-query compilation: the pipeline entry point.

use query_parser::{Query, Var};
use query_plan::{InputSource, Plan};

use crate::error::CompileError;
use crate::find::resolve_find;
use crate::normalize::normalize;
use crate::reorder::reorder;
use crate::schema::AttributeMap;
use crate::unify::UnificationContext;

/// Final output of a query compilation: the plan plus the ordered input
/// map (externally bound variables first, then hoisted constants).
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledQuery {
    pub plan: Plan,
    pub inputs: Vec<(Var, InputSource)>,
}

/// Compile a query against an attribute registry.
///
/// The pipeline runs normalize → reorder → unify → find resolution; every
/// stage's output is immutable once produced, and the whole compilation is
/// deterministic for a given query and registry.
pub fn compile_query(query: &Query, attrs: &AttributeMap) -> Result<CompiledQuery, CompileError> {
    let mut ctx = UnificationContext::new(attrs);
    for (index, &var) in query.inputs.iter().enumerate() {
        ctx.declare_input(var, InputSource::Input(index));
    }

    let normalized = normalize(&query.clauses);
    for (var, source) in normalized.inputs.clone() {
        ctx.declare_input(var, source);
    }
    ctx.set_next_input(normalized.next_input);

    ctx.unify(reorder(normalized.clauses))?;
    let plan = resolve_find(&mut ctx, &query.find)?;

    Ok(CompiledQuery {
        plan,
        inputs: ctx.inputs,
    })
}
