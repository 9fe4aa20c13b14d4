//! End-to-end compilation scenarios.
//!
//! Each test compiles a complete query or rule set against a small schema
//! and asserts on the shape of the emitted plan.

use query_compiler::{compile_query, compile_rules, AttributeMap, CompileError, CompiledQuery};
use query_parser::{parse_query, parse_rules, SrcId};
use query_plan::{Plan, PredicateOp};

fn schema() -> AttributeMap {
    let mut attrs = AttributeMap::new();
    attrs.insert("assign/time", 1);
    attrs.insert("assign/key", 2);
    attrs.insert("assign/value", 3);
    attrs.insert("time", 4);
    attrs.insert("node", 5);
    attrs.insert("edge", 6);
    attrs.insert("a", 7);
    attrs.insert("b", 8);
    attrs
}

fn compile(input: &str) -> CompiledQuery {
    let attrs = schema();
    let query = parse_query(input, SrcId::empty()).expect("query should parse");
    compile_query(&query, &attrs).expect("query should compile")
}

fn compile_err(input: &str) -> CompileError {
    let attrs = schema();
    let query = parse_query(input, SrcId::empty()).expect("query should parse");
    compile_query(&query, &attrs).expect_err("query should not compile")
}

/// Every node of a given variant in the plan tree.
fn collect<'a>(plan: &'a Plan, pred: &dyn Fn(&Plan) -> bool, out: &mut Vec<&'a Plan>) {
    if pred(plan) {
        out.push(plan);
    }
    match plan {
        Plan::Join { left, right, .. } | Plan::Antijoin { left, right, .. } => {
            collect(left, pred, out);
            collect(right, pred, out);
        }
        Plan::Union { children, .. } => {
            for child in children {
                collect(child, pred, out);
            }
        }
        Plan::Project { child, .. }
        | Plan::Aggregate { child, .. }
        | Plan::PredExpr { child, .. } => collect(child, pred, out),
        _ => {}
    }
}

fn find_all<'a>(plan: &'a Plan, pred: impl Fn(&Plan) -> bool) -> Vec<&'a Plan> {
    let mut out = Vec::new();
    collect(plan, &pred, &mut out);
    out
}

#[test]
fn scenario_equi_join_with_comparison() {
    // Two assignments to the same key, keeping the older one's time.
    let q = compile(
        "[:find ?t1 ?key :where \
           [?op :assign/key ?key] [?op :assign/time ?t1] \
           [?op2 :assign/key ?key] [?op2 :assign/time ?t2] \
           [(< ?t1 ?t2)]]",
    );

    let (project_positions, child) = match &q.plan {
        Plan::Project { positions, child } => (positions.clone(), child),
        other => panic!("Expected Project at the top, got {:?}", other),
    };
    assert_eq!(project_positions.len(), 2);

    let preds = find_all(child, |p| matches!(p, Plan::PredExpr { .. }));
    assert_eq!(preds.len(), 1, "exactly one comparison in the plan");
    match preds[0] {
        Plan::PredExpr { op, arg_positions, child } => {
            assert_eq!(*op, PredicateOp::LT);
            assert_eq!(arg_positions.len(), 2);
            // First comparison operand is ?t1, the first find element.
            assert_eq!(arg_positions[0], project_positions[0]);
            assert!(matches!(**child, Plan::Join { .. }));
        }
        other => panic!("Expected PredExpr, got {:?}", other),
    }
}

#[test]
fn scenario_negated_rule_invocation() {
    let q = compile(
        "[:find ?key ?val :where \
           [?op :assign/time ?t] [?op :assign/key ?key] [?op :assign/value ?val] \
           (not (older ?t ?key))]",
    );

    let antijoins = find_all(&q.plan, |p| matches!(p, Plan::Antijoin { .. }));
    assert_eq!(antijoins.len(), 1);
    match antijoins[0] {
        Plan::Antijoin { right, join_positions, .. } => {
            match &**right {
                Plan::RuleExpr { name, arg_positions } => {
                    assert_eq!(name, "older");
                    // The antijoin keys are exactly the invocation's arguments.
                    let mut keys = join_positions.clone();
                    let mut args = arg_positions.clone();
                    keys.sort_unstable();
                    args.sort_unstable();
                    assert_eq!(keys, args);
                }
                other => panic!("Expected RuleExpr, got {:?}", other),
            }
        }
        other => panic!("Expected Antijoin, got {:?}", other),
    }
}

#[test]
fn scenario_disjunction_of_comparisons() {
    let q = compile(
        "[:find ?t1 ?t2 :where \
           [?op :time ?t1] [?op :time ?t2] \
           (or [(< ?t1 ?t2)] [(< ?t2 ?t1)])]",
    );

    let project_positions = match &q.plan {
        Plan::Project { positions, .. } => positions.clone(),
        other => panic!("Expected Project at the top, got {:?}", other),
    };
    let unions = find_all(&q.plan, |p| matches!(p, Plan::Union { .. }));
    assert_eq!(unions.len(), 1);
    match unions[0] {
        Plan::Union { positions, children } => {
            // The union carries [?t1 ?t2], the same pair the query finds.
            assert_eq!(positions, &project_positions);
            assert_eq!(children.len(), 2);
            for child in children {
                assert!(matches!(child, Plan::PredExpr { .. }));
            }
        }
        other => panic!("Expected Union, got {:?}", other),
    }
}

#[test]
fn scenario_or_join_with_projection() {
    let q = compile("[:find ?x :where (or-join [?x] (and [?x :a ?y]) (and [?x :b ?z]))]");

    match &q.plan {
        Plan::Union { positions, children } => {
            assert_eq!(positions.len(), 1);
            assert_eq!(children.len(), 2);
            // Branches may bind variables outside the projection; they only
            // have to cover it.
            for child in children {
                assert!(child
                    .bound_positions()
                    .is_superset(&positions.iter().copied().collect()));
            }
        }
        other => panic!("Expected Union, got {:?}", other),
    }
}

#[test]
fn scenario_recursive_rule() {
    let attrs = schema();
    let defs = parse_rules(
        "[[(propagate ?x ?y) [?x :node ?y]]
          [(propagate ?x ?y) [?z :edge ?y] (propagate ?x ?z)]]",
        SrcId::empty(),
    )
    .expect("rules should parse");
    let rules = compile_rules(&defs, &attrs).expect("rules should compile");

    assert_eq!(rules.len(), 1);
    assert_eq!(rules[0].name.as_ref(), "propagate");
    match &rules[0].plan {
        Plan::Project { positions, child } => {
            // Head variables take the first positions.
            assert_eq!(positions, &vec![0, 1]);
            match &**child {
                Plan::Union { positions, children } => {
                    assert_eq!(positions, &vec![0, 1]);
                    assert_eq!(children.len(), 2);
                    let self_refs = find_all(&rules[0].plan, |p| {
                        matches!(p, Plan::RuleExpr { name, .. } if name == "propagate")
                    });
                    assert_eq!(self_refs.len(), 1);
                    match self_refs[0] {
                        Plan::RuleExpr { arg_positions, .. } => {
                            assert_eq!(arg_positions[0], 0);
                        }
                        other => panic!("Expected RuleExpr, got {:?}", other),
                    }
                }
                other => panic!("Expected Union, got {:?}", other),
            }
        }
        other => panic!("Expected Project, got {:?}", other),
    }
}

#[test]
fn scenario_minimum_aggregate() {
    let q = compile("[:find (min ?t) :where [?op :assign/time ?t]]");

    match &q.plan {
        Plan::Project { positions, child } => match &**child {
            Plan::Aggregate { name, child, arg_positions } => {
                assert_eq!(name, "min");
                assert_eq!(arg_positions, positions);
                match &**child {
                    Plan::HasAttr { attr_id, val_pos, .. } => {
                        assert_eq!(*attr_id, 1);
                        assert_eq!(val_pos, &positions[0]);
                    }
                    other => panic!("Expected HasAttr, got {:?}", other),
                }
            }
            other => panic!("Expected Aggregate, got {:?}", other),
        },
        other => panic!("Expected Project, got {:?}", other),
    }
}

// Boundary behaviors.

#[test]
fn boundary_empty_where_is_a_grammar_error() {
    assert!(parse_query("[:find ?x :where]", SrcId::empty()).is_err());
}

#[test]
fn boundary_find_symbol_without_any_clause() {
    match compile_err("[:find ?nope :where [?op :assign/key ?k]]") {
        CompileError::FindUnbound { symbols } => {
            assert_eq!(symbols.len(), 1);
            assert_eq!(symbols[0].name(), "nope");
        }
        other => panic!("Expected FindUnbound, got {:?}", other),
    }
}

#[test]
fn boundary_negation_without_positive_partner() {
    match compile_err("[:find ?v :where [?e :a ?v] (not [?w :b ?u])]") {
        CompileError::UnintroducableClauses { clauses, .. } => {
            assert_eq!(clauses.len(), 1);
        }
        other => panic!("Expected UnintroducableClauses, got {:?}", other),
    }
}

#[test]
fn boundary_predicate_operands_across_relations() {
    match compile_err("[:find ?y :where [?x :a ?y] [?u :b ?w] [(< ?y ?w)]]") {
        CompileError::PredicateUnbound { candidates, .. } => {
            assert_eq!(candidates, 0);
        }
        other => panic!("Expected PredicateUnbound, got {:?}", other),
    }
}

#[test]
fn plans_serialize_for_transport() {
    let q = compile(
        "[:find ?key :where [?op :assign/key ?key] [?op :assign/time ?t] [(< ?t 1700)]]",
    );
    let encoded = serde_json::to_string(&q.plan).expect("plan should serialize");
    assert!(encoded.contains("\"LT\""));
    let decoded: Plan = serde_json::from_str(&encoded).expect("plan should deserialize");
    assert_eq!(decoded, q.plan);
}
