//! Wire format types (§6).
//!
//! The on-wire variable record and the worker message envelope exchanged
//! across an inference-plane boundary (background thread, worker process,
//! or a WebSocket connection — the embedder's choice per §5).

use crate::cpt::{CptEntry, ParentState};
use crate::ids::{ModelId, NodeId};
use crate::sensitivity::SensitivityResult;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One CPT row on the wire. `null` in `parentStates` encodes `ANY` (§6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WireCptEntry {
    #[serde(rename = "parentStates")]
    pub parent_states: BTreeMap<NodeId, Option<bool>>,
    pub probability: f64,
}

impl From<&CptEntry> for WireCptEntry {
    fn from(entry: &CptEntry) -> Self {
        WireCptEntry {
            parent_states: entry
                .parent_states
                .iter()
                .map(|(id, state)| {
                    (
                        id.clone(),
                        match state {
                            ParentState::True => Some(true),
                            ParentState::False => Some(false),
                            ParentState::Any => None,
                        },
                    )
                })
                .collect(),
            probability: entry.probability,
        }
    }
}

impl From<&WireCptEntry> for CptEntry {
    fn from(entry: &WireCptEntry) -> Self {
        CptEntry {
            parent_states: entry
                .parent_states
                .iter()
                .map(|(id, value)| {
                    let state = match value {
                        Some(true) => ParentState::True,
                        Some(false) => ParentState::False,
                        None => ParentState::Any,
                    };
                    (id.clone(), state)
                })
                .collect(),
            probability: entry.probability,
        }
    }
}

/// The canonical on-wire variable record (§6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WireVariable {
    pub id: NodeId,
    #[serde(rename = "modelId")]
    pub model_id: ModelId,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub x: f64,
    pub y: f64,
    #[serde(rename = "cptEntries")]
    pub cpt_entries: Vec<WireCptEntry>,
    #[serde(rename = "columnOrder", default, skip_serializing_if = "Option::is_none")]
    pub column_order: Option<Vec<NodeId>>,
}

/// Worker protocol request envelope (§6 "Worker message protocol").
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum WorkerRequest {
    #[serde(rename = "COMPUTE_MARGINALS")]
    ComputeMarginals {
        #[serde(rename = "requestId")]
        request_id: String,
        nodes: Vec<WireVariable>,
        #[serde(rename = "interventionNodeId", default, skip_serializing_if = "Option::is_none")]
        intervention_node_id: Option<NodeId>,
    },
    #[serde(rename = "COMPUTE_SENSITIVITY")]
    ComputeSensitivity {
        #[serde(rename = "requestId")]
        request_id: String,
        nodes: Vec<WireVariable>,
        target: NodeId,
    },
}

/// Worker protocol response envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum WorkerResponse {
    #[serde(rename = "MARGINALS_RESULT")]
    MarginalsResult {
        #[serde(rename = "requestId")]
        request_id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        probabilities: Option<BTreeMap<NodeId, f64>>,
        #[serde(rename = "interventionResult", default, skip_serializing_if = "Option::is_none")]
        intervention_result: Option<InterventionResult>,
    },
    #[serde(rename = "SENSITIVITY_RESULT")]
    SensitivityResult {
        #[serde(rename = "requestId")]
        request_id: String,
        scores: Vec<WireSensitivity>,
    },
    #[serde(rename = "ERROR")]
    Error {
        #[serde(rename = "requestId")]
        request_id: String,
        error: String,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InterventionResult {
    #[serde(rename = "trueCase")]
    pub true_case: BTreeMap<NodeId, f64>,
    #[serde(rename = "falseCase")]
    pub false_case: BTreeMap<NodeId, f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WireSensitivity {
    pub node: NodeId,
    pub sensitivity: f64,
}

impl From<SensitivityResult> for WireSensitivity {
    fn from(result: SensitivityResult) -> Self {
        WireSensitivity {
            node: result.node,
            sensitivity: result.sensitivity,
        }
    }
}
