//! Authorization.
//!
//! The kernel's authorization model is narrower than the teacher's
//! role-based `auth.rs`: every mutating operation requires the caller to
//! own the containing model; every reading operation requires ownership
//! *or* the model being marked public (§4.2 "Authorization"). Where a
//! `Principal` comes from is out of scope for the kernel itself
//! (persistence/auth providers are a Non-goal per spec §1) — the demo REPL
//! binary supplies its own throwaway login, not this module.

use crate::error::{KernelError, KernelResult};
use crate::store::ModelRecord;

/// The authenticated caller of a kernel operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    pub username: String,
}

pub fn authorize_write(principal: &Principal, model: &ModelRecord) -> KernelResult<()> {
    if model.owner == principal.username {
        Ok(())
    } else {
        Err(KernelError::NotAuthorized)
    }
}

pub fn authorize_read(principal: &Principal, model: &ModelRecord) -> KernelResult<()> {
    if model.owner == principal.username || model.public {
        Ok(())
    } else {
        // Non-owners of a private model get the same error a missing model
        // would — existence of other users' models is never revealed.
        Err(KernelError::NotAuthorized)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn owned_model(owner: &str, public: bool) -> ModelRecord {
        ModelRecord {
            id: crate::ids::ModelId::from("m1"),
            owner: owner.to_string(),
            title: "t".to_string(),
            public,
            output_node: None,
            version: 0,
        }
    }

    #[test]
    fn owner_can_write() {
        let principal = Principal {
            username: "alice".to_string(),
        };
        assert!(authorize_write(&principal, &owned_model("alice", false)).is_ok());
    }

    #[test]
    fn non_owner_cannot_write_even_if_public() {
        let principal = Principal {
            username: "bob".to_string(),
        };
        assert!(authorize_write(&principal, &owned_model("alice", true)).is_err());
    }

    #[test]
    fn non_owner_can_read_public_model() {
        let principal = Principal {
            username: "bob".to_string(),
        };
        assert!(authorize_read(&principal, &owned_model("alice", true)).is_ok());
    }

    #[test]
    fn non_owner_cannot_read_private_model() {
        let principal = Principal {
            username: "bob".to_string(),
        };
        assert!(authorize_read(&principal, &owned_model("alice", false)).is_err());
    }
}
