//! Sampling engine performance benchmarks: marginal inference and
//! sensitivity analysis over chain networks of varying size.

use bayeskernel::cpt::{CptEntry, IndexedCpt, ParentState};
use bayeskernel::ids::NodeId;
use bayeskernel::sampling::{self, SamplingNode};
use bayeskernel::sensitivity;
use bayeskernel::topo::HasParents;
use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use std::collections::HashSet;

struct Node {
    id: NodeId,
    parents: HashSet<NodeId>,
    indexed: IndexedCpt,
}

impl HasParents for Node {
    fn id(&self) -> &NodeId {
        &self.id
    }
    fn parents(&self) -> &HashSet<NodeId> {
        &self.parents
    }
}

impl SamplingNode for Node {
    fn indexed_cpt(&self) -> &IndexedCpt {
        &self.indexed
    }
}

fn root(id: &str, p_true: f64) -> Node {
    let entries = vec![CptEntry {
        parent_states: Default::default(),
        probability: p_true,
    }];
    Node {
        id: NodeId::from(id),
        parents: HashSet::new(),
        indexed: IndexedCpt::build(&entries),
    }
}

fn chain_child(id: &str, parent: &str) -> Node {
    let parent_id = NodeId::from(parent);
    let entries = vec![
        CptEntry {
            parent_states: [(parent_id.clone(), ParentState::True)].into_iter().collect(),
            probability: 0.8,
        },
        CptEntry {
            parent_states: [(parent_id.clone(), ParentState::False)].into_iter().collect(),
            probability: 0.2,
        },
    ];
    Node {
        id: NodeId::from(id),
        parents: [parent_id].into_iter().collect(),
        indexed: IndexedCpt::build(&entries),
    }
}

/// A->B->C->...->N chain of `len` variables.
fn chain_network(len: usize) -> Vec<Node> {
    let mut nodes = vec![root("v0", 0.5)];
    for i in 1..len {
        nodes.push(chain_child(&format!("v{i}"), &format!("v{}", i - 1)));
    }
    nodes
}

fn bench_marginal_inference(c: &mut Criterion) {
    let mut group = c.benchmark_group("marginal_inference");
    for &len in &[5usize, 20, 50] {
        let nodes = chain_network(len);
        group.bench_with_input(BenchmarkId::from_parameter(len), &len, |b, _| {
            b.iter(|| sampling::run_pass(&nodes, 10_000, None).unwrap());
        });
    }
    group.finish();
}

fn bench_intervention_pair(c: &mut Criterion) {
    let mut group = c.benchmark_group("intervention_pair");
    for &len in &[5usize, 20, 50] {
        let nodes = chain_network(len);
        group.bench_with_input(BenchmarkId::from_parameter(len), &len, |b, _| {
            b.iter(|| sampling::run_intervention_pair(&nodes, 5_000, &NodeId::from("v0")).unwrap());
        });
    }
    group.finish();
}

fn bench_sensitivity(c: &mut Criterion) {
    let mut group = c.benchmark_group("sensitivity");
    for &len in &[5usize, 10, 20] {
        let nodes = chain_network(len);
        let target = NodeId::from(format!("v{}", len - 1));
        group.bench_with_input(BenchmarkId::from_parameter(len), &len, |b, _| {
            b.iter(|| sensitivity::compute_sensitivity(&nodes, &target, 5_000).unwrap());
        });
    }
    group.finish();
}

criterion_group!(benches, bench_marginal_inference, bench_intervention_pair, bench_sensitivity);
criterion_main!(benches);
