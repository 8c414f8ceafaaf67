//! Kernel error taxonomy.
//!
//! Mirrors the error kinds enumerated in the design doc's error-handling
//! section: authorization, lookup, validation, structural, inference, and
//! transient (store-level) failures. Every mutating and reading operation
//! in [`crate::graph`] and [`crate::inference_service`] returns
//! `Result<_, KernelError>`.

use crate::cpt::CptValidationError;
use crate::ids::{ModelId, NodeId};
use crate::store::StoreError;
use serde::{Deserialize, Serialize};

/// Top-level kernel error.
#[derive(Debug, Clone, Serialize, Deserialize, thiserror::Error)]
pub enum KernelError {
    // Authorization
    /// No principal was attached to the request.
    #[error("not authenticated")]
    NotAuthenticated,

    /// The principal does not own the model and the model is not public.
    #[error("not authorized")]
    NotAuthorized,

    // Lookup
    /// Referenced model does not exist.
    #[error("model not found: {0}")]
    ModelNotFound(ModelId),

    /// Referenced variable does not exist.
    #[error("variable not found: {0}")]
    VariableNotFound(NodeId),

    // Validation (CPT invariants, §3)
    /// CPT failed one of the §3 invariants.
    #[error("CPT validation failed: {0}")]
    Validation(#[from] CptValidationError),

    /// A referenced parent id does not exist or belongs to a different model.
    #[error("parent {parent} does not exist in model {model}")]
    UnknownParent { parent: NodeId, model: ModelId },

    /// A variable named itself as its own parent.
    #[error("variable {0} cannot be its own parent")]
    SelfParent(NodeId),

    // Structural
    /// Adding the proposed parent edge would create a cycle.
    #[error("adding parent {parent} to {child} would create a cycle")]
    WouldCreateCycle { parent: NodeId, child: NodeId },

    /// The graph is not acyclic; topological sort could not complete.
    #[error("cycle detected among: {0:?}")]
    CycleDetected(Vec<NodeId>),

    /// A CPT parent id is missing from the variable set passed to inference.
    #[error("dangling parent reference: {0}")]
    DanglingParent(NodeId),

    // Inference
    /// The variable set passed to inference was empty.
    #[error("empty network")]
    EmptyNetwork,

    /// No CPT entry (nor wildcard fallback) matched a sampled parent assignment.
    #[error("CPT lookup failed for variable {0}")]
    CptLookupFailed(NodeId),

    /// A parent's value was read before it was sampled; topological order was broken.
    #[error("sampling order broken: {0} read before assignment")]
    OrderBroken(NodeId),

    /// Requested sample count was zero or negative.
    #[error("sample count must be positive, got {0}")]
    NonPositiveSamples(i64),

    // Transient
    /// The store reported an optimistic-concurrency conflict; retryable.
    #[error("store conflict, retry: {0}")]
    StoreConflict(String),

    /// Configuration failed to load.
    #[error("configuration error: {0}")]
    Config(String),
}

pub type KernelResult<T> = Result<T, KernelError>;

impl From<figment::Error> for KernelError {
    fn from(e: figment::Error) -> Self {
        KernelError::Config(e.to_string())
    }
}

impl From<StoreError> for KernelError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::ModelNotFound(id) => KernelError::ModelNotFound(id),
            StoreError::VariableNotFound(id) => KernelError::VariableNotFound(id),
            StoreError::Conflict(msg) => KernelError::StoreConflict(msg),
        }
    }
}
