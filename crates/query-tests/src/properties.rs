//! Property-based tests over generated queries.
//!
//! Queries are generated as join chains over a small fixed schema, with
//! optional comparisons and external inputs, then checked for determinism
//! and for the structural invariants every emitted plan must satisfy.

use proptest::prelude::*;
use query_compiler::{compile_query, normalize, reorder, AttributeMap};
use query_parser::{parse_query, SrcId};
use query_plan::{InputSource, Plan};
use std::collections::BTreeSet;

const ATTRS: &[&str] = &["a", "b", "c"];

fn schema() -> AttributeMap {
    let mut attrs = AttributeMap::new();
    for (idx, name) in ATTRS.iter().enumerate() {
        attrs.insert(name, idx as u32 + 1);
    }
    attrs
}

/// `[?v0 :a ?v1] [?v1 :b ?v2] ...` - a connected join chain.
fn chain_where(attr_picks: &[usize]) -> String {
    attr_picks
        .iter()
        .enumerate()
        .map(|(i, &attr)| format!("[?v{} :{} ?v{}]", i, ATTRS[attr], i + 1))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Check the structural invariants of a plan tree.
fn check_plan(plan: &Plan) {
    match plan {
        Plan::Join { left, right, join_pos } => {
            assert!(
                left.bound_positions().contains(join_pos),
                "join key must be bound on the left"
            );
            assert!(
                right.bound_positions().contains(join_pos),
                "join key must be bound on the right"
            );
            check_plan(left);
            check_plan(right);
        }
        Plan::Antijoin { left, right, join_positions } => {
            let bound = right.bound_positions();
            assert!(
                join_positions.iter().all(|p| bound.contains(p)),
                "antijoin keys must be bound on the negative side"
            );
            check_plan(left);
            check_plan(right);
        }
        Plan::Union { positions, children } => {
            let required: BTreeSet<usize> = positions.iter().copied().collect();
            for child in children {
                assert!(
                    child.bound_positions().is_superset(&required),
                    "every union child must bind the union positions"
                );
                check_plan(child);
            }
        }
        Plan::Project { child, positions } => {
            let bound = child.bound_positions();
            assert!(
                positions.iter().all(|p| bound.contains(p)),
                "projection positions must be bound by the child"
            );
            check_plan(child);
        }
        Plan::Aggregate { child, .. } | Plan::PredExpr { child, .. } => check_plan(child),
        _ => {}
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn compiled_chains_are_deterministic(picks in prop::collection::vec(0..ATTRS.len(), 1..6)) {
        let input = format!(
            "[:find ?v0 ?v{} :where {}]",
            picks.len(),
            chain_where(&picks)
        );
        let attrs = schema();
        let query = parse_query(&input, SrcId::empty()).unwrap();
        let first = compile_query(&query, &attrs).unwrap();
        let second = compile_query(&query, &attrs).unwrap();
        prop_assert_eq!(&first, &second);
        check_plan(&first.plan);
    }

    #[test]
    fn chains_with_comparisons_hoist_their_constants(
        picks in prop::collection::vec(0..ATTRS.len(), 2..5),
        limits in prop::collection::vec(0i64..1000, 0..3),
    ) {
        // Each comparison constrains the chain's last variable against a
        // constant, which must surface as one hoisted input each.
        let preds = limits
            .iter()
            .map(|limit| format!("[(< ?v{} {})]", picks.len(), limit))
            .collect::<Vec<_>>()
            .join(" ");
        let input = format!(
            "[:find ?v0 :where {} {}]",
            chain_where(&picks),
            preds
        );
        let attrs = schema();
        let query = parse_query(&input, SrcId::empty()).unwrap();
        let compiled = compile_query(&query, &attrs).unwrap();
        let constants = compiled
            .inputs
            .iter()
            .filter(|(_, source)| matches!(source, InputSource::Const(_)))
            .count();
        prop_assert_eq!(constants, limits.len());
        check_plan(&compiled.plan);
    }

    #[test]
    fn external_inputs_keep_declaration_order(
        picks in prop::collection::vec(0..ATTRS.len(), 1..4),
        extra_inputs in 1..3usize,
    ) {
        let in_vars = (0..extra_inputs)
            .map(|i| format!("?w{}", i))
            .collect::<Vec<_>>()
            .join(" ");
        let input = format!(
            "[:find ?v0 :in {} :where {}]",
            in_vars,
            chain_where(&picks)
        );
        let attrs = schema();
        let query = parse_query(&input, SrcId::empty()).unwrap();
        let compiled = compile_query(&query, &attrs).unwrap();
        for (index, (var, source)) in compiled.inputs.iter().enumerate() {
            prop_assert_eq!(var.name(), format!("w{}", index));
            prop_assert_eq!(source, &InputSource::Input(index));
        }
    }

    #[test]
    fn normalization_and_reordering_preserve_clauses(
        picks in prop::collection::vec(0..ATTRS.len(), 1..6),
    ) {
        let input = format!("[:find ?v0 :where {}]", chain_where(&picks));
        let query = parse_query(&input, SrcId::empty()).unwrap();

        let first = normalize(&query.clauses);
        let second = normalize(&query.clauses);
        prop_assert_eq!(&first.clauses, &second.clauses);

        let mut original: Vec<_> = first.clauses.iter().map(|c| c.id).collect();
        let mut reordered: Vec<_> = reorder(first.clauses.clone())
            .iter()
            .map(|c| c.id)
            .collect();
        original.sort_unstable();
        reordered.sort_unstable();
        prop_assert_eq!(original, reordered);
    }

    #[test]
    fn disjunctions_of_equal_shape_compile(
        attr_a in 0..ATTRS.len(),
        attr_b in 0..ATTRS.len(),
    ) {
        let input = format!(
            "[:find ?x :where (or [?x :{} 1] [?x :{} 2])]",
            ATTRS[attr_a], ATTRS[attr_b]
        );
        let attrs = schema();
        let query = parse_query(&input, SrcId::empty()).unwrap();
        let compiled = compile_query(&query, &attrs).unwrap();
        check_plan(&compiled.plan);
        let unions: usize = count_unions(&compiled.plan);
        prop_assert_eq!(unions, 1);
    }
}

fn count_unions(plan: &Plan) -> usize {
    match plan {
        Plan::Union { children, .. } => 1 + children.iter().map(count_unions).sum::<usize>(),
        Plan::Join { left, right, .. } | Plan::Antijoin { left, right, .. } => {
            count_unions(left) + count_unions(right)
        }
        Plan::Project { child, .. }
        | Plan::Aggregate { child, .. }
        | Plan::PredExpr { child, .. } => count_unions(child),
        _ => 0,
    }
}
