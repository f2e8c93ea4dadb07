//! Analysis used in the display of aggregate profiles

use crate::duration::{self, Duration};
use std::collections::HashMap;
use trace_tree::{AggregateNodeRef, AggregateTree, Key};

/// Given a set of root nodes, compute the associated duration norm used to go
/// from absolute child durations to fractions of the root durations
///
/// Returns 0 when the roots did not last, so that all fractions are 0.
pub fn duration_norm<'a>(roots: impl Iterator<Item = AggregateNodeRef<'a>>) -> Duration {
    let root_duration = roots
        .map(|root| duration::from_ticks(root.inclusive_time()))
        .sum::<Duration>();
    if root_duration > 0.0 {
        1.0 / root_duration
    } else {
        0.0
    }
}

/// Every scope of an aggregate tree, excluding the root and thread nodes,
/// in depth-first order
pub fn all_scopes(tree: &AggregateTree) -> Vec<AggregateNodeRef<'_>> {
    let mut scopes = Vec::new();
    let mut stack = tree
        .root()
        .children()
        .rev()
        .flat_map(|thread| thread.children().rev())
        .collect::<Vec<_>>();
    while let Some(scope) = stack.pop() {
        scopes.push(scope);
        stack.extend(scope.children().rev());
    }
    scopes
}

/// Breakdown of exclusive duration by scope name, ordered by decreasing
/// duration
pub fn scope_name_breakdown(tree: &AggregateTree) -> Box<[(Key, Duration)]> {
    let mut profile = HashMap::<_, Duration>::new();
    for scope in all_scopes(tree) {
        *profile.entry(scope.key()).or_default() += duration::from_ticks(scope.exclusive_time());
    }
    let mut profile = profile.into_iter().collect::<Box<[_]>>();
    profile.sort_unstable_by(|(k1, d1), (k2, d2)| d2.total_cmp(d1).then_with(|| k1.cmp(k2)));
    profile
}

/// Extract the hottest nodes from an aggregate node iterator
///
/// - `duration` is the sorting criterion (can be inclusive_time(),
///   exclusive_time(), or a normalized version thereof for percentages)
/// - `threshold` is the duration threshold below which nodes are dropped
///
pub fn hottest_nodes<'tree>(
    nodes: impl Iterator<Item = AggregateNodeRef<'tree>>,
    mut duration: impl FnMut(&AggregateNodeRef) -> Duration,
    threshold: Duration,
) -> Box<[AggregateNodeRef<'tree>]> {
    let mut hottest = nodes
        .filter(|node| duration(node) >= threshold)
        .collect::<Box<[_]>>();
    hottest.sort_by(|n1, n2| duration(n2).total_cmp(&duration(n1)));
    hottest
}
