//! Topological Scheduler (C4).
//!
//! Kahn's algorithm over the parent→child relation implied by each
//! variable's CPT parent set. Ties are broken by ascending id so the
//! resulting order — and therefore the probabilistic fingerprint and
//! sampling results derived from it — is reproducible (§4.4, property P7).

use crate::error::{KernelError, KernelResult};
use crate::ids::NodeId;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

/// A variable together with its parent set, as needed for scheduling.
pub trait HasParents {
    fn id(&self) -> &NodeId;
    fn parents(&self) -> &HashSet<NodeId>;
}

/// Produce a total order over `nodes` consistent with parent precedes child.
///
/// Errors with [`KernelError::DanglingParent`] if a CPT references a parent
/// outside the given node set, or [`KernelError::CycleDetected`] with the
/// residual (unemitted) set if the graph is not acyclic.
pub fn topological_sort<N: HasParents>(nodes: &[N]) -> KernelResult<Vec<NodeId>> {
    let ids: HashSet<NodeId> = nodes.iter().map(|n| n.id().clone()).collect();

    let mut in_degree: BTreeMap<NodeId, usize> =
        nodes.iter().map(|n| (n.id().clone(), 0)).collect();
    let mut children: HashMap<NodeId, Vec<NodeId>> = HashMap::new();

    for node in nodes {
        for parent in node.parents() {
            if !ids.contains(parent) {
                return Err(KernelError::DanglingParent(parent.clone()));
            }
            *in_degree.get_mut(node.id()).unwrap() += 1;
            children.entry(parent.clone()).or_default().push(node.id().clone());
        }
    }

    // BTreeSet keeps the ready queue in ascending id order at all times.
    let mut ready: BTreeSet<NodeId> = in_degree
        .iter()
        .filter(|(_, &deg)| deg == 0)
        .map(|(id, _)| id.clone())
        .collect();

    let mut order = Vec::with_capacity(nodes.len());
    while let Some(next) = ready.iter().next().cloned() {
        ready.remove(&next);
        order.push(next.clone());
        if let Some(kids) = children.get(&next) {
            for child in kids {
                let deg = in_degree.get_mut(child).unwrap();
                *deg -= 1;
                if *deg == 0 {
                    ready.insert(child.clone());
                }
            }
        }
    }

    if order.len() != nodes.len() {
        let residual: Vec<NodeId> = in_degree
            .into_iter()
            .filter(|(id, _)| !order.contains(id))
            .map(|(id, _)| id)
            .collect();
        return Err(KernelError::CycleDetected(residual));
    }

    Ok(order)
}
