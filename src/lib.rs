//! # bayeskernel
//!
//! A boolean Bayesian network kernel: a causal graph of boolean variables,
//! each with a rule-list conditional probability table, queried by forward
//! ancestral Monte Carlo sampling.
//!
//! ## Pipeline
//!
//! ```text
//! Store (C3)
//!     ↓ read
//! VariableRecord snapshot
//!     ↓ graph mutation (C2) / topological order (C4)
//! InferenceNode snapshot (inference_service)
//!     ↓
//! [Sampling (C5)]         → Marginals, do() intervention pairs
//! [Sensitivity (C6)]      → per-ancestor causal effect on a target
//!     ↓
//! InferenceService (C7)   → cached, cancellation-aware facade
//!     ↓
//! protocol::wire          → worker message envelopes for an offload boundary
//! ```
//!
//! ## Usage
//!
//! ```rust,ignore
//! use bayeskernel::{auth::Principal, graph, store::InMemoryStore};
//!
//! let store = InMemoryStore::new();
//! let principal = Principal { username: "alice".to_string() };
//! let model = graph::create_model(store.as_ref(), &principal, "Weather")?;
//! let rain = graph::create_variable(store.as_ref(), &principal, &model, "Rain", None, 0.0, 0.0)?;
//! ```
//!
//! ## Module organization
//!
//! | Module | Purpose |
//! |--------|---------|
//! | `ids` | Opaque `NodeId`/`ModelId` identifiers |
//! | `error` | Structured error taxonomy (§7) |
//! | `cpt` | CPT rule representation, validation, indexed lookup (C1) |
//! | `store` | `Store` adapter trait and in-memory reference impl (C3) |
//! | `topo` | Deterministic topological sort (C4) |
//! | `graph` | Structural mutations preserving the DAG invariant (C2) |
//! | `auth` | Owner/public authorization and credential hashing |
//! | `config` | Hierarchical configuration (figment) |
//! | `sampling` | Forward ancestral Monte Carlo, `do()` interventions (C5) |
//! | `sensitivity` | Per-ancestor causal sensitivity (C6) |
//! | `fingerprint` | Probabilistic cache-key hashing (§4.7, P10) |
//! | `inference_service` | Cached, cancellation-aware facade (C7) |
//! | `protocol` | Worker message wire format (§6) |

pub mod auth;
pub mod config;
pub mod cpt;
pub mod error;
pub mod fingerprint;
pub mod graph;
pub mod ids;
pub mod inference_service;
pub mod protocol;
pub mod sampling;
pub mod sensitivity;
pub mod store;
pub mod topo;

pub use config::Config;
pub use error::{KernelError, KernelResult};
pub use ids::{ModelId, NodeId};
pub use inference_service::{InferenceNode, InferenceService};
