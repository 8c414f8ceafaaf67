//! Inference Service (C7).
//!
//! Stateless facade over C4–C6: builds the per-call indexed representation
//! from a snapshot of [`VariableRecord`]s, then serves `compute_marginals`,
//! `compute_marginals_with_intervention`, and `compute_sensitivity` behind
//! two bounded LRU caches keyed by the variable set's [`Fingerprint`]
//! (§4.7). Cancellation is a last-request-wins policy per conceptual slot
//! (§4.7 "Cancellation", §5): a result computed for a `request_id` that has
//! since been superseded is discarded rather than cached or returned.

use crate::config::InferenceConfig;
use crate::cpt::IndexedCpt;
use crate::error::KernelResult;
use crate::fingerprint::{self, Fingerprint, Fingerprintable};
use crate::ids::NodeId;
use crate::sampling::{self, Marginals, SamplingNode};
use crate::sensitivity::{self, SensitivityResult};
use crate::store::VariableRecord;
use crate::topo::HasParents;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet, VecDeque};

/// A read-only snapshot of one variable as the inference plane needs it:
/// its parent set, rule-list CPT (for fingerprinting), and precomputed
/// indexed CPT (for sampling). Built once per service call from a
/// [`VariableRecord`] snapshot (§5 "Ordering guarantees").
pub struct InferenceNode {
    id: NodeId,
    parents: HashSet<NodeId>,
    cpt: Vec<crate::cpt::CptEntry>,
    indexed: IndexedCpt,
}

impl InferenceNode {
    #[must_use]
    pub fn from_record(record: &VariableRecord) -> Self {
        let parents: HashSet<NodeId> = record
            .cpt
            .first()
            .map(|e| e.parent_states.keys().cloned().collect())
            .unwrap_or_default();
        InferenceNode {
            id: record.id.clone(),
            parents,
            cpt: record.cpt.clone(),
            indexed: IndexedCpt::build(&record.cpt),
        }
    }
}

impl HasParents for InferenceNode {
    fn id(&self) -> &NodeId {
        &self.id
    }
    fn parents(&self) -> &HashSet<NodeId> {
        &self.parents
    }
}

impl SamplingNode for InferenceNode {
    fn indexed_cpt(&self) -> &IndexedCpt {
        &self.indexed
    }
}

impl Fingerprintable for InferenceNode {
    fn cpt(&self) -> &[crate::cpt::CptEntry] {
        &self.cpt
    }
}

/// Build the immutable snapshot the inference plane operates over from a
/// set of store records (§5: "the caller is responsible for reading `V`
/// from the store consistently, then passing the immutable snapshot").
#[must_use]
pub fn snapshot(records: &[VariableRecord]) -> Vec<InferenceNode> {
    records.iter().map(InferenceNode::from_record).collect()
}

/// A small capacity-bounded LRU map, used for both the marginals and
/// sensitivity caches (§4.7: "Maximum 100 entries per cache, LRU eviction").
struct LruCache<V> {
    capacity: usize,
    order: VecDeque<Fingerprint>,
    entries: HashMap<Fingerprint, V>,
}

impl<V: Clone> LruCache<V> {
    fn new(capacity: usize) -> Self {
        LruCache {
            capacity: capacity.max(1),
            order: VecDeque::new(),
            entries: HashMap::new(),
        }
    }

    fn get(&mut self, key: &Fingerprint) -> Option<V> {
        if !self.entries.contains_key(key) {
            return None;
        }
        self.touch(key);
        self.entries.get(key).cloned()
    }

    fn insert(&mut self, key: Fingerprint, value: V) {
        if self.entries.insert(key.clone(), value).is_some() {
            self.touch(&key);
            return;
        }
        self.order.push_back(key);
        if self.order.len() > self.capacity {
            if let Some(evicted) = self.order.pop_front() {
                self.entries.remove(&evicted);
            }
        }
    }

    fn touch(&mut self, key: &Fingerprint) {
        if let Some(pos) = self.order.iter().position(|k| k == key) {
            let entry = self.order.remove(pos).unwrap();
            self.order.push_back(entry);
        }
    }
}

/// Last-request-wins cancellation tracker (§4.7, §5): one monotonically
/// increasing generation counter per conceptual slot.
#[derive(Default)]
struct RequestTracker {
    latest: Mutex<HashMap<String, String>>,
}

impl RequestTracker {
    fn register(&self, slot: &str, request_id: &str) {
        self.latest.lock().insert(slot.to_string(), request_id.to_string());
    }

    fn is_current(&self, slot: &str, request_id: &str) -> bool {
        self.latest
            .lock()
            .get(slot)
            .is_some_and(|latest| latest == request_id)
    }
}

/// The stateless facade an embedder holds for the lifetime of a process
/// (§4.7, §5). All reads are pure computation over the snapshot passed in;
/// the only mutable state is the two LRU caches and the cancellation map.
pub struct InferenceService {
    config: InferenceConfig,
    marginal_cache: Mutex<LruCache<Marginals>>,
    intervention_cache: Mutex<LruCache<(Marginals, Marginals)>>,
    sensitivity_cache: Mutex<LruCache<Vec<SensitivityResult>>>,
    tracker: RequestTracker,
}

impl InferenceService {
    #[must_use]
    pub fn new(config: InferenceConfig) -> Self {
        let marginal_cache = Mutex::new(LruCache::new(config.marginal_cache_entries));
        let intervention_cache = Mutex::new(LruCache::new(config.marginal_cache_entries));
        let sensitivity_cache = Mutex::new(LruCache::new(config.sensitivity_cache_entries));
        InferenceService {
            config,
            marginal_cache,
            intervention_cache,
            sensitivity_cache,
            tracker: RequestTracker::default(),
        }
    }

    /// `compute_marginals(V) -> Map<NodeId, probability>` (§4.7).
    ///
    /// Returns `Ok(None)` if a later `request_id` superseded this one
    /// before the computation finished (§4.7 "Cancellation") — the caller
    /// should simply drop the result.
    pub fn compute_marginals(
        &self,
        nodes: &[InferenceNode],
        request_id: &str,
    ) -> KernelResult<Option<Marginals>> {
        let key = fingerprint::fingerprint_with_intervention(nodes, None);
        if let Some(hit) = self.marginal_cache.lock().get(&key) {
            return Ok(Some(hit));
        }

        self.tracker.register("marginals", request_id);
        let result = sampling::run_pass(nodes, self.config.marginal_samples, None)?;

        if !self.tracker.is_current("marginals", request_id) {
            return Ok(None);
        }
        self.marginal_cache.lock().insert(key, result.clone());
        Ok(Some(result))
    }

    /// `compute_marginals_with_intervention(V, node_id) -> (true_case, false_case)` (§4.7).
    pub fn compute_marginals_with_intervention(
        &self,
        nodes: &[InferenceNode],
        node_id: &NodeId,
        request_id: &str,
    ) -> KernelResult<Option<(Marginals, Marginals)>> {
        let key = fingerprint::fingerprint_with_intervention(nodes, Some(node_id));
        if let Some(hit) = self.intervention_cache.lock().get(&key) {
            return Ok(Some(hit));
        }

        self.tracker.register("marginals", request_id);
        let (true_case, false_case) =
            sampling::run_intervention_pair(nodes, self.config.sensitivity_samples_per_side, node_id)?;

        if !self.tracker.is_current("marginals", request_id) {
            return Ok(None);
        }
        self.intervention_cache
            .lock()
            .insert(key, (true_case.clone(), false_case.clone()));
        Ok(Some((true_case, false_case)))
    }

    /// `compute_sensitivity(V, target) -> stream of (ancestor_id, sensitivity)` (§4.7).
    ///
    /// `on_result` is invoked once per ancestor, in ascending id order
    /// (§4.6), to let the caller forward progress before the whole set is
    /// ready. Returns `Ok(None)` on late-request cancellation, matching
    /// [`Self::compute_marginals`].
    pub fn compute_sensitivity(
        &self,
        nodes: &[InferenceNode],
        target: &NodeId,
        request_id: &str,
        mut on_result: impl FnMut(&SensitivityResult),
    ) -> KernelResult<Option<Vec<SensitivityResult>>> {
        let key = fingerprint::fingerprint_for_target(nodes, target);
        let slot = format!("sensitivity:{target}");

        if let Some(hit) = self.sensitivity_cache.lock().get(&key) {
            for result in &hit {
                on_result(result);
            }
            return Ok(Some(hit));
        }

        self.tracker.register(&slot, request_id);
        let results = sensitivity::compute_sensitivity(nodes, target, self.config.sensitivity_samples_per_side)?;

        if !self.tracker.is_current(&slot, request_id) {
            return Ok(None);
        }
        for result in &results {
            on_result(result);
        }
        self.sensitivity_cache.lock().insert(key, results.clone());
        Ok(Some(results))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cpt::{trivial_prior, CptEntry, ParentState};
    use crate::ids::ModelId;

    fn config() -> InferenceConfig {
        InferenceConfig {
            marginal_samples: 20_000,
            sensitivity_samples_per_side: 20_000,
            marginal_cache_entries: 2,
            sensitivity_cache_entries: 2,
            offload: false,
        }
    }

    fn root_record(id: &str, p: f64) -> VariableRecord {
        VariableRecord {
            id: NodeId::from(id),
            model_id: ModelId::from("m"),
            title: id.to_string(),
            description: None,
            x: 0.0,
            y: 0.0,
            cpt: vec![CptEntry {
                parent_states: Default::default(),
                probability: p,
            }],
            column_order: Some(vec![]),
            version: 0,
        }
    }

    fn chain_record(id: &str, parent: &str, p_t: f64, p_f: f64) -> VariableRecord {
        let parent_id = NodeId::from(parent);
        VariableRecord {
            id: NodeId::from(id),
            model_id: ModelId::from("m"),
            title: id.to_string(),
            description: None,
            x: 0.0,
            y: 0.0,
            cpt: vec![
                CptEntry {
                    parent_states: [(parent_id.clone(), ParentState::True)].into_iter().collect(),
                    probability: p_t,
                },
                CptEntry {
                    parent_states: [(parent_id, ParentState::False)].into_iter().collect(),
                    probability: p_f,
                },
            ],
            column_order: Some(vec![parent_id_clone(parent)]),
            version: 0,
        }
    }

    fn parent_id_clone(parent: &str) -> NodeId {
        NodeId::from(parent)
    }

    #[test]
    fn second_call_hits_cache() {
        let service = InferenceService::new(config());
        let nodes = snapshot(&[root_record("a", 0.6), chain_record("b", "a", 0.8, 0.2)]);

        let first = service.compute_marginals(&nodes, "req-1").unwrap().unwrap();
        let second = service.compute_marginals(&nodes, "req-2").unwrap().unwrap();
        assert!((first.get(&NodeId::from("b")).unwrap() - second.get(&NodeId::from("b")).unwrap()).abs() < f64::EPSILON);
    }

    #[test]
    fn unrelated_request_ids_do_not_collide_on_cache_miss() {
        let service = InferenceService::new(config());
        let nodes = snapshot(&[root_record("a", 0.5)]);
        let result = service.compute_marginals(&nodes, "req-1").unwrap();
        assert!(result.is_some());
    }

    #[test]
    fn sensitivity_streams_every_ancestor() {
        let service = InferenceService::new(config());
        let nodes = snapshot(&[root_record("a", 0.5), chain_record("b", "a", 0.8, 0.2)]);
        let mut streamed = Vec::new();
        let result = service
            .compute_sensitivity(&nodes, &NodeId::from("b"), "req-1", |r| streamed.push(r.node.clone()))
            .unwrap()
            .unwrap();
        assert_eq!(streamed, vec![NodeId::from("a")]);
        assert_eq!(result.len(), 1);
    }

    #[test]
    fn root_variable_has_no_prior_usable_as_trivial() {
        assert_eq!(trivial_prior().len(), 1);
    }
}
