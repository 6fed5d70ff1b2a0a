//! Reachability-based reclamation of node records.
//!
//! Marking walks from the root node of every retained operation through the
//! aggregation engine, so only references that still win aggregation keep a
//! node alive. Sweeping drops every record of an unmarked node; chunks left
//! without records are released.

use std::time::Instant;

use rustc_hash::FxHashSet;
use serde::Serialize;
use tracing::info;

use crate::aggregate::{AggregateValue, ObjectView};
use crate::forest::Forest;
use crate::types::NodeKey;

/// Outcome of a collection.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct GcReport {
    /// Node keys whose records were dropped.
    pub reclaimed_node_count: usize,
    /// Chunks released because they lost every record.
    pub released_chunks: usize,
    /// Node keys still indexed afterwards.
    pub retained_node_count: usize,
}

/// Node keys reachable from `roots`.
pub fn mark<'a>(forest: &Forest, roots: impl IntoIterator<Item = &'a NodeKey>) -> FxHashSet<NodeKey> {
    let mut reachable: FxHashSet<NodeKey> = FxHashSet::default();
    let mut stack: Vec<NodeKey> = roots.into_iter().cloned().collect();
    while let Some(key) = stack.pop() {
        if !forest.contains(&key) || !reachable.insert(key.clone()) {
            continue;
        }
        let view = ObjectView::for_node(forest, &key);
        for field in view.field_keys() {
            push_edges(view.field(field), &mut stack);
        }
    }
    reachable
}

fn push_edges(value: AggregateValue<'_>, stack: &mut Vec<NodeKey>) {
    match value {
        AggregateValue::Object(view) => stack.extend(view.keys().iter().cloned()),
        AggregateValue::CompositeList(list) => {
            for item in &list {
                push_edges(item, stack);
            }
        }
        AggregateValue::Scalar(_)
        | AggregateValue::CompositeNull
        | AggregateValue::CompositeUndefined(_) => {}
    }
}

/// Marks from `roots` and sweeps everything else.
pub fn collect<'a>(forest: &mut Forest, roots: impl IntoIterator<Item = &'a NodeKey>) -> GcReport {
    let started = Instant::now();
    let reachable = mark(forest, roots);
    let outcome = forest.retain_nodes(&reachable);
    let report = GcReport {
        reclaimed_node_count: outcome.reclaimed.len(),
        released_chunks: outcome.released_chunks,
        retained_node_count: forest.node_count(),
    };
    info!(
        reclaimed = report.reclaimed_node_count,
        released_chunks = report.released_chunks,
        retained = report.retained_node_count,
        elapsed_ms = started.elapsed().as_millis() as u64,
        "forest.gc.completed"
    );
    report
}
