//! Integration tests exercising the full kernel pipeline: graph mutation
//! (C2) through a `Store`, snapshot into the inference plane (C7), and
//! verification of marginal/sensitivity results against known analytic
//! values for small networks.

use bayeskernel::auth::Principal;
use bayeskernel::config::InferenceConfig;
use bayeskernel::graph::{self, VariablePatch};
use bayeskernel::ids::NodeId;
use bayeskernel::inference_service::{self, InferenceService};
use bayeskernel::store::{InMemoryStore, Store};
use bayeskernel::KernelError;

// ============================================================================
// Test Helpers
// ============================================================================

fn alice() -> Principal {
    Principal {
        username: "alice".to_string(),
    }
}

fn service(samples: u64) -> InferenceService {
    InferenceService::new(InferenceConfig {
        marginal_samples: samples,
        sensitivity_samples_per_side: samples,
        marginal_cache_entries: 16,
        sensitivity_cache_entries: 16,
        offload: false,
    })
}

fn set_prior(store: &dyn Store, principal: &Principal, node: &NodeId, p: f64) {
    let patch = VariablePatch {
        cpt: Some(vec![bayeskernel::cpt::CptEntry {
            parent_states: Default::default(),
            probability: p,
        }]),
        ..Default::default()
    };
    graph::update_variable(store, principal, node, patch).unwrap();
}

fn set_cpt_one_parent(store: &dyn Store, principal: &Principal, node: &NodeId, parent: &NodeId, p_t: f64, p_f: f64) {
    use bayeskernel::cpt::{CptEntry, ParentState};
    graph::update_variable(
        store,
        principal,
        node,
        VariablePatch {
            cpt: Some(vec![
                CptEntry {
                    parent_states: [(parent.clone(), ParentState::True)].into_iter().collect(),
                    probability: p_t,
                },
                CptEntry {
                    parent_states: [(parent.clone(), ParentState::False)].into_iter().collect(),
                    probability: p_f,
                },
            ]),
            ..Default::default()
        },
    )
    .unwrap();
}

fn set_cpt_two_parents(
    store: &dyn Store,
    principal: &Principal,
    node: &NodeId,
    p_a: &NodeId,
    p_b: &NodeId,
    rows: [f64; 4],
) {
    use bayeskernel::cpt::{CptEntry, ParentState};
    let entries = vec![
        CptEntry {
            parent_states: [(p_a.clone(), ParentState::True), (p_b.clone(), ParentState::True)]
                .into_iter()
                .collect(),
            probability: rows[0],
        },
        CptEntry {
            parent_states: [(p_a.clone(), ParentState::True), (p_b.clone(), ParentState::False)]
                .into_iter()
                .collect(),
            probability: rows[1],
        },
        CptEntry {
            parent_states: [(p_a.clone(), ParentState::False), (p_b.clone(), ParentState::True)]
                .into_iter()
                .collect(),
            probability: rows[2],
        },
        CptEntry {
            parent_states: [(p_a.clone(), ParentState::False), (p_b.clone(), ParentState::False)]
                .into_iter()
                .collect(),
            probability: rows[3],
        },
    ];
    graph::update_variable(
        store,
        principal,
        node,
        VariablePatch {
            cpt: Some(entries),
            ..Default::default()
        },
    )
    .unwrap();
}

// ============================================================================
// Scenario 3 (spec §8): diamond network A->B, A->C, B∧C->D
// ============================================================================

#[test]
fn diamond_network_marginal_matches_analytic_value() {
    let store = InMemoryStore::new();
    let principal = alice();
    let model = graph::create_model(store.as_ref(), &principal, "diamond").unwrap();

    let a = graph::create_variable(store.as_ref(), &principal, &model, "A", None, 0.0, 0.0).unwrap();
    let b = graph::create_variable(store.as_ref(), &principal, &model, "B", None, 0.0, 0.0).unwrap();
    let c = graph::create_variable(store.as_ref(), &principal, &model, "C", None, 0.0, 0.0).unwrap();
    let d = graph::create_variable(store.as_ref(), &principal, &model, "D", None, 0.0, 0.0).unwrap();

    set_prior(store.as_ref(), &principal, &a, 0.6);
    graph::add_parent(store.as_ref(), &principal, &a, &b).unwrap();
    graph::add_parent(store.as_ref(), &principal, &a, &c).unwrap();
    set_cpt_one_parent(store.as_ref(), &principal, &b, &a, 0.8, 0.2);
    set_cpt_one_parent(store.as_ref(), &principal, &c, &a, 0.7, 0.3);

    graph::add_parent(store.as_ref(), &principal, &b, &d).unwrap();
    graph::add_parent(store.as_ref(), &principal, &c, &d).unwrap();
    // D = TRUE only when both B and C are TRUE.
    set_cpt_two_parents(store.as_ref(), &principal, &d, &b, &c, [1.0, 0.0, 0.0, 0.0]);

    let records = graph::load_model_variables(store.as_ref(), &principal, &model).unwrap();
    let nodes = inference_service::snapshot(&records);

    let svc = service(400_000);
    let marginals = svc.compute_marginals(&nodes, "req-1").unwrap().unwrap();

    // P(B) = 0.6*0.8 + 0.4*0.2 = 0.56; P(C) = 0.6*0.7 + 0.4*0.3 = 0.54.
    // B and C share the common cause A, so are not independent; verify the
    // single-variable marginals and that D is strictly below min(B, C).
    let p_b = marginals.get(&b).unwrap();
    let p_c = marginals.get(&c).unwrap();
    let p_d = marginals.get(&d).unwrap();
    assert!((p_b - 0.56).abs() < 0.01, "P(B) = {p_b}");
    assert!((p_c - 0.54).abs() < 0.01, "P(C) = {p_c}");
    assert!(p_d < p_b.min(p_c), "P(D) should be strictly below both parents");
}

// ============================================================================
// Scenario 4 (spec §8): cycle rejection leaves the graph unchanged
// ============================================================================

#[test]
fn cycle_attempt_across_three_variables_is_rejected_and_graph_is_unchanged() {
    let store = InMemoryStore::new();
    let principal = alice();
    let model = graph::create_model(store.as_ref(), &principal, "cycle").unwrap();

    let a = graph::create_variable(store.as_ref(), &principal, &model, "A", None, 0.0, 0.0).unwrap();
    let b = graph::create_variable(store.as_ref(), &principal, &model, "B", None, 0.0, 0.0).unwrap();
    let c = graph::create_variable(store.as_ref(), &principal, &model, "C", None, 0.0, 0.0).unwrap();

    graph::add_parent(store.as_ref(), &principal, &a, &b).unwrap();
    graph::add_parent(store.as_ref(), &principal, &b, &c).unwrap();

    let result = graph::add_parent(store.as_ref(), &principal, &c, &a);
    assert!(matches!(result, Err(KernelError::WouldCreateCycle { .. })));

    let records = graph::load_model_variables(store.as_ref(), &principal, &model).unwrap();
    let nodes = inference_service::snapshot(&records);
    let svc = service(10_000);
    // The network is still a valid DAG and still infers successfully.
    assert!(svc.compute_marginals(&nodes, "req-1").unwrap().is_some());
}

// ============================================================================
// Scenario 5 (spec §8): removing a parent with no safe fallback collapses
// the child to the trivial prior rather than leaving an invalid CPT.
// ============================================================================

#[test]
fn removing_last_parent_row_collapses_to_trivial_prior() {
    let store = InMemoryStore::new();
    let principal = alice();
    let model = graph::create_model(store.as_ref(), &principal, "collapse").unwrap();

    let a = graph::create_variable(store.as_ref(), &principal, &model, "A", None, 0.0, 0.0).unwrap();
    let b = graph::create_variable(store.as_ref(), &principal, &model, "B", None, 0.0, 0.0).unwrap();
    graph::add_parent(store.as_ref(), &principal, &a, &b).unwrap();

    graph::remove_parent(store.as_ref(), &principal, &a, &b).unwrap();

    let b_record = store.get_variable(&b).unwrap().unwrap();
    assert_eq!(b_record.cpt.len(), 1);
    assert!(b_record.cpt[0].parent_states.is_empty());
    assert!((b_record.cpt[0].probability - 0.5).abs() < f64::EPSILON);
}

// ============================================================================
// Scenario 6 (spec §8): sensitivity sign matches the direction of the CPT
// ============================================================================

#[test]
fn sensitivity_is_positive_for_a_positively_correlated_parent() {
    let store = InMemoryStore::new();
    let principal = alice();
    let model = graph::create_model(store.as_ref(), &principal, "sens").unwrap();

    let a = graph::create_variable(store.as_ref(), &principal, &model, "A", None, 0.0, 0.0).unwrap();
    let b = graph::create_variable(store.as_ref(), &principal, &model, "B", None, 0.0, 0.0).unwrap();
    graph::add_parent(store.as_ref(), &principal, &a, &b).unwrap();
    set_prior(store.as_ref(), &principal, &a, 0.5);

    use bayeskernel::cpt::{CptEntry, ParentState};
    graph::update_variable(
        store.as_ref(),
        &principal,
        &b,
        VariablePatch {
            cpt: Some(vec![
                CptEntry {
                    parent_states: [(a.clone(), ParentState::True)].into_iter().collect(),
                    probability: 0.8,
                },
                CptEntry {
                    parent_states: [(a.clone(), ParentState::False)].into_iter().collect(),
                    probability: 0.2,
                },
            ]),
            ..Default::default()
        },
    )
    .unwrap();

    let records = graph::load_model_variables(store.as_ref(), &principal, &model).unwrap();
    let nodes = inference_service::snapshot(&records);
    let svc = service(100_000);
    let mut seen = Vec::new();
    let result = svc
        .compute_sensitivity(&nodes, &b, "req-1", |r| seen.push((r.node.clone(), r.sensitivity)))
        .unwrap()
        .unwrap();

    assert_eq!(result.len(), 1);
    assert_eq!(result[0].node, a);
    assert!((result[0].sensitivity - 0.6).abs() < 0.02);
    assert_eq!(seen.len(), 1);
}

// ============================================================================
// Authorization boundary
// ============================================================================

#[test]
fn non_owner_cannot_read_private_models_variables() {
    let store = InMemoryStore::new();
    let principal = alice();
    let bob = Principal {
        username: "bob".to_string(),
    };
    let model = graph::create_model(store.as_ref(), &principal, "private").unwrap();
    graph::create_variable(store.as_ref(), &principal, &model, "A", None, 0.0, 0.0).unwrap();

    let result = graph::load_model_variables(store.as_ref(), &bob, &model);
    assert!(matches!(result, Err(KernelError::NotAuthorized)));
}
