//! Probabilistic fingerprint (§4.7, property P10).
//!
//! Hashes the sorted-by-id sequence of `(node_id, sorted_cpt_entries)` for a
//! variable set. Coordinates and titles never enter the hash, so layout or
//! rename edits do not invalidate the inference cache; any change to a
//! CPT's structure or probabilities does.

use crate::cpt::{CptEntry, ParentState};
use crate::ids::NodeId;
use crate::topo::HasParents;
use sha2::{Digest, Sha256};
use std::fmt::Write;

/// Anything the fingerprint needs to read off a variable: its id and its
/// rule-list CPT. Kept separate from [`crate::sampling::SamplingNode`]
/// since fingerprinting runs over the rule list, not the indexed form.
pub trait Fingerprintable: HasParents {
    fn cpt(&self) -> &[CptEntry];
}

/// Opaque cache key over the probabilistic content of a variable set.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Fingerprint(pub String);

impl std::fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Compute the fingerprint of a variable set (§4.7 "Cache").
#[must_use]
pub fn fingerprint<N: Fingerprintable>(nodes: &[N]) -> Fingerprint {
    let mut ids: Vec<&N> = nodes.iter().collect();
    ids.sort_by(|a, b| a.id().cmp(b.id()));

    let mut hasher = Sha256::new();
    for node in ids {
        hasher.update(node.id().as_str().as_bytes());
        hasher.update(b"|");
        for entry in canonical_entries(node.cpt()) {
            hasher.update(entry.as_bytes());
            hasher.update(b";");
        }
        hasher.update(b"\n");
    }
    Fingerprint(format!("{:x}", hasher.finalize()))
}

/// A fingerprint tagged with an intervention node, for the marginals cache
/// (§4.7: "key = fingerprint ± intervention tag").
#[must_use]
pub fn fingerprint_with_intervention<N: Fingerprintable>(
    nodes: &[N],
    intervention: Option<&NodeId>,
) -> Fingerprint {
    let base = fingerprint(nodes);
    match intervention {
        Some(id) => Fingerprint(format!("{}:do:{}", base.0, id.as_str())),
        None => base,
    }
}

/// A fingerprint tagged with a sensitivity target, per §4.7: "key =
/// fingerprint:target".
#[must_use]
pub fn fingerprint_for_target<N: Fingerprintable>(nodes: &[N], target: &NodeId) -> Fingerprint {
    let base = fingerprint(nodes);
    Fingerprint(format!("{}:{}", base.0, target.as_str()))
}

/// Entries in canonical, order-independent textual form, sorted so that
/// two variables with the same rule set in a different insertion order
/// hash identically.
fn canonical_entries(entries: &[CptEntry]) -> Vec<String> {
    let mut rendered: Vec<String> = entries
        .iter()
        .map(|entry| {
            let mut parts: Vec<(String, char)> = entry
                .parent_states
                .iter()
                .map(|(parent, state)| {
                    let c = match state {
                        ParentState::True => 'T',
                        ParentState::False => 'F',
                        ParentState::Any => '*',
                    };
                    (parent.as_str().to_string(), c)
                })
                .collect();
            parts.sort();

            let mut out = String::new();
            for (parent, c) in parts {
                let _ = write!(out, "{parent}={c},");
            }
            let _ = write!(out, "->{:.10}", entry.probability);
            out
        })
        .collect();
    rendered.sort();
    rendered
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::ModelId;
    use std::collections::HashSet;

    struct Node {
        id: NodeId,
        model_id: ModelId,
        title: String,
        x: f64,
        cpt: Vec<CptEntry>,
        parents: HashSet<NodeId>,
    }

    impl HasParents for Node {
        fn id(&self) -> &NodeId {
            &self.id
        }
        fn parents(&self) -> &HashSet<NodeId> {
            &self.parents
        }
    }

    impl Fingerprintable for Node {
        fn cpt(&self) -> &[CptEntry] {
            &self.cpt
        }
    }

    fn node(id: &str, title: &str, x: f64, p: f64) -> Node {
        Node {
            id: NodeId::from(id),
            model_id: ModelId::from("m"),
            title: title.to_string(),
            x,
            cpt: vec![CptEntry {
                parent_states: Default::default(),
                probability: p,
            }],
            parents: HashSet::new(),
        }
    }

    #[test]
    fn coordinate_and_title_changes_do_not_affect_fingerprint() {
        let a = vec![node("a", "Alpha", 10.0, 0.5)];
        let b = vec![node("a", "Renamed", 999.0, 0.5)];
        assert_eq!(fingerprint(&a), fingerprint(&b));
    }

    #[test]
    fn probability_change_flips_fingerprint() {
        let a = vec![node("a", "Alpha", 0.0, 0.5)];
        let b = vec![node("a", "Alpha", 0.0, 0.6)];
        assert_ne!(fingerprint(&a), fingerprint(&b));
    }

    #[test]
    fn intervention_tag_distinguishes_keys() {
        let nodes = vec![node("a", "Alpha", 0.0, 0.5)];
        let plain = fingerprint_with_intervention(&nodes, None);
        let with_do = fingerprint_with_intervention(&nodes, Some(&NodeId::from("a")));
        assert_ne!(plain, with_do);
    }

    #[test]
    fn entry_order_does_not_affect_fingerprint() {
        let a = NodeId::from("a");
        let b = NodeId::from("b");
        let entries_1 = vec![
            CptEntry {
                parent_states: [(a.clone(), ParentState::True)].into_iter().collect(),
                probability: 0.9,
            },
            CptEntry {
                parent_states: [(a.clone(), ParentState::False)].into_iter().collect(),
                probability: 0.1,
            },
        ];
        let mut entries_2 = entries_1.clone();
        entries_2.reverse();

        let node_1 = Node {
            id: b.clone(),
            model_id: ModelId::from("m"),
            title: "x".to_string(),
            x: 0.0,
            cpt: entries_1,
            parents: [a.clone()].into_iter().collect(),
        };
        let node_2 = Node {
            id: b,
            model_id: ModelId::from("m"),
            title: "x".to_string(),
            x: 0.0,
            cpt: entries_2,
            parents: [a].into_iter().collect(),
        };
        assert_eq!(fingerprint(&[node_1]), fingerprint(&[node_2]));
    }
}
