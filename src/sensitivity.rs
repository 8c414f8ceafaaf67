//! Sensitivity Engine (C6).
//!
//! For a chosen `target` variable, computes `sensitivity(v) = P(target=TRUE
//! | do(v=TRUE)) - P(target=TRUE | do(v=FALSE))` for every `v` that is an
//! ancestor of `target` (§4.6). Non-ancestors are skipped without running
//! an intervention pair on them, since their do() would have no effect.

use crate::error::KernelResult;
use crate::ids::NodeId;
use crate::sampling::{self, SamplingNode};
use crate::topo::HasParents;
use rayon::prelude::*;
use std::collections::{HashMap, HashSet, VecDeque};

/// One ancestor's sensitivity score, in the order reported to the caller.
#[derive(Debug, Clone)]
pub struct SensitivityResult {
    pub node: NodeId,
    pub sensitivity: f64,
}

/// Ancestors of `target` in `nodes` (via the parent relation), not
/// including `target` itself. Returned as a set; callers needing a stable
/// order should sort the result (§4.6: "ascending id").
fn ancestors_of<N: HasParents>(nodes: &[N], target: &NodeId) -> HashSet<NodeId> {
    let by_id: HashMap<&NodeId, &N> = nodes.iter().map(|n| (n.id(), n)).collect();
    let mut visited = HashSet::new();
    let mut queue = VecDeque::new();

    if let Some(node) = by_id.get(target) {
        for parent in node.parents() {
            if visited.insert(parent.clone()) {
                queue.push_back(parent.clone());
            }
        }
    }

    while let Some(current) = queue.pop_front() {
        if let Some(node) = by_id.get(&current) {
            for parent in node.parents() {
                if visited.insert(parent.clone()) {
                    queue.push_back(parent.clone());
                }
            }
        }
    }

    visited
}

/// Compute sensitivity scores for every ancestor of `target`, in ascending
/// id order. Ancestor intervention pairs run in parallel (rayon) since each
/// pair is an independent pair of sampling passes sharing only read-only
/// input (§4.6, §5 "parallelism").
pub fn compute_sensitivity<N: SamplingNode + Sync>(
    nodes: &[N],
    target: &NodeId,
    n_samples_per_side: u64,
) -> KernelResult<Vec<SensitivityResult>> {
    let mut ancestors: Vec<NodeId> = ancestors_of(nodes, target).into_iter().collect();
    ancestors.sort();

    ancestors
        .into_par_iter()
        .map(|node| {
            let (true_case, false_case) =
                sampling::run_intervention_pair(nodes, n_samples_per_side, &node)?;
            let sensitivity = true_case.get(target).unwrap_or(0.0) - false_case.get(target).unwrap_or(0.0);
            Ok(SensitivityResult { node, sensitivity })
        })
        .collect()
}
