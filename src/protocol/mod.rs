//! Worker message protocol (§6).
//!
//! The inference plane speaks the same request/response shape whether it
//! runs on a background thread, a separate process, or across a WebSocket
//! (the `bayeskernel-server` binary uses the last one). This module only
//! defines the wire contract; [`crate::inference_service`] implements it.

pub mod error;
pub mod wire;

pub use error::{ErrorCode, WireError};
pub use wire::{WireCptEntry, WireSensitivity, WireVariable, WorkerRequest, WorkerResponse};
