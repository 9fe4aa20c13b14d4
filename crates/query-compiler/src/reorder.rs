//! Dependency-driven clause ordering.
//!
//! Clauses are sorted by their tag path so that a scope's clauses surface
//! before the clauses of its nested scopes, keeping sibling scopes in
//! declaration order (scope ids are allocated in walk order). Ties inside
//! one scope break on clause id, reversed; the tie-break carries no
//! semantic meaning beyond making evaluation order deterministic.

use std::cmp::Ordering;

use crate::normalize::{NormalizedClause, Tag};

fn compare_tags(a: &Tag, b: &Tag) -> Ordering {
    for (sa, sb) in a.iter().zip(b.iter()) {
        match sa.scope.cmp(&sb.scope) {
            Ordering::Equal => continue,
            other => return other,
        }
    }
    // One path is a prefix of the other; the shallower clause comes first.
    a.len().cmp(&b.len())
}

pub fn reorder(mut clauses: Vec<NormalizedClause>) -> Vec<NormalizedClause> {
    clauses.sort_by(|a, b| compare_tags(&a.tag, &b.tag).then_with(|| b.id.cmp(&a.id)));
    clauses
}
