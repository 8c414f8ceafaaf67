//! Transport-level error codes (§6, §7).
//!
//! A thin named-code wrapper around [`crate::error::KernelError`] for
//! embedders that want a stable string to match on across a wire boundary
//! rather than depend on the Rust enum directly.

use crate::error::KernelError;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorCode {
    NotFound,
    NotAuthorized,
    ValidationFailed,
    WouldCreateCycle,
    CycleDetected,
    DanglingParent,
    CptLookupFailed,
    NonPositiveSamples,
    Transient,
}

impl From<&KernelError> for ErrorCode {
    fn from(error: &KernelError) -> Self {
        match error {
            KernelError::NotAuthenticated | KernelError::NotAuthorized => ErrorCode::NotAuthorized,
            KernelError::ModelNotFound(_) | KernelError::VariableNotFound(_) => ErrorCode::NotFound,
            KernelError::Validation(_) | KernelError::UnknownParent { .. } | KernelError::SelfParent(_) => {
                ErrorCode::ValidationFailed
            }
            KernelError::WouldCreateCycle { .. } => ErrorCode::WouldCreateCycle,
            KernelError::CycleDetected(_) => ErrorCode::CycleDetected,
            KernelError::DanglingParent(_) => ErrorCode::DanglingParent,
            KernelError::EmptyNetwork | KernelError::CptLookupFailed(_) | KernelError::OrderBroken(_) => {
                ErrorCode::CptLookupFailed
            }
            KernelError::NonPositiveSamples(_) => ErrorCode::NonPositiveSamples,
            KernelError::StoreConflict(_) | KernelError::Config(_) => ErrorCode::Transient,
        }
    }
}

/// A transport-ready error: the stable code plus the human detail.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WireError {
    pub code: ErrorCode,
    pub message: String,
}

impl From<&KernelError> for WireError {
    fn from(error: &KernelError) -> Self {
        WireError {
            code: error.into(),
            message: error.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::NodeId;

    #[test]
    fn cycle_error_maps_to_stable_code() {
        let error = KernelError::WouldCreateCycle {
            parent: NodeId::from("a"),
            child: NodeId::from("b"),
        };
        let wire: WireError = (&error).into();
        assert_eq!(wire.code, ErrorCode::WouldCreateCycle);
    }
}
