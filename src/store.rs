//! Store Adapter (C3).
//!
//! A narrow contract over an external transactional document store,
//! grounded on the shape the teacher's `StorageEngine` exposes internally
//! (`Arc<RwLock<...>>` maps keyed by id) but reduced to exactly the get/
//! insert/patch/delete/query-by-index operations the kernel needs (§6).
//!
//! The kernel ships one reference implementation, [`InMemoryStore`], so its
//! own tests and demo binaries have something to run against. A real
//! embedder is expected to back this trait with an actual transactional
//! store; persistence itself is out of scope for the kernel (spec §1).

use crate::cpt::CptEntry;
use crate::ids::{ModelId, NodeId};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

/// A model: a named container owning a set of variables.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelRecord {
    pub id: ModelId,
    pub owner: String,
    pub title: String,
    pub public: bool,
    pub output_node: Option<NodeId>,
    /// Optimistic-concurrency version counter (§4.3).
    pub version: u64,
}

/// A variable: identity, display metadata, and its CPT.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VariableRecord {
    pub id: NodeId,
    pub model_id: ModelId,
    pub title: String,
    pub description: Option<String>,
    pub x: f64,
    pub y: f64,
    pub cpt: Vec<CptEntry>,
    pub column_order: Option<Vec<NodeId>>,
    pub version: u64,
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum StoreError {
    #[error("model not found: {0}")]
    ModelNotFound(ModelId),

    #[error("variable not found: {0}")]
    VariableNotFound(NodeId),

    #[error("optimistic concurrency conflict on {0}, retry")]
    Conflict(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// The persistence contract the kernel requires (§6).
///
/// Every method corresponds 1:1 to a line of the `Store interface` block in
/// the design doc. An implementor is expected to execute the whole of a
/// single [`crate::graph`] public operation inside one transaction; this
/// trait only exposes the primitive reads/writes, not transaction
/// boundaries — an async/blocking embedder wraps calls to it in whatever
/// transaction primitive its backend provides.
pub trait Store: Send + Sync {
    fn get_model(&self, id: &ModelId) -> StoreResult<Option<ModelRecord>>;
    fn insert_model(&self, record: ModelRecord) -> StoreResult<()>;
    fn patch_model(&self, id: &ModelId, f: &dyn Fn(&mut ModelRecord)) -> StoreResult<()>;
    fn delete_model(&self, id: &ModelId) -> StoreResult<()>;

    fn get_variable(&self, id: &NodeId) -> StoreResult<Option<VariableRecord>>;
    fn insert_variable(&self, record: VariableRecord) -> StoreResult<()>;
    fn patch_variable(&self, id: &NodeId, f: &dyn Fn(&mut VariableRecord)) -> StoreResult<()>;
    fn delete_variable(&self, id: &NodeId) -> StoreResult<()>;

    /// `variables.by_model` index.
    fn variables_by_model(&self, model_id: &ModelId) -> StoreResult<Vec<VariableRecord>>;
    /// `models.by_owner` index.
    fn models_by_owner(&self, owner: &str) -> StoreResult<Vec<ModelRecord>>;
    /// `models.by_public` index.
    fn public_models(&self) -> StoreResult<Vec<ModelRecord>>;
}

/// Reference in-memory [`Store`] implementation.
///
/// Grounded on the teacher's `StorageEngine`/`Database` pattern: one
/// `RwLock`-guarded map per table, bumping a per-record `version` on every
/// patch so `patch_*` calls can detect lost updates the way a real
/// transactional store's optimistic concurrency would.
#[derive(Default)]
pub struct InMemoryStore {
    models: RwLock<HashMap<ModelId, ModelRecord>>,
    variables: RwLock<HashMap<NodeId, VariableRecord>>,
}

impl InMemoryStore {
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }
}

impl Store for InMemoryStore {
    fn get_model(&self, id: &ModelId) -> StoreResult<Option<ModelRecord>> {
        Ok(self.models.read().get(id).cloned())
    }

    fn insert_model(&self, record: ModelRecord) -> StoreResult<()> {
        self.models.write().insert(record.id.clone(), record);
        Ok(())
    }

    fn patch_model(&self, id: &ModelId, f: &dyn Fn(&mut ModelRecord)) -> StoreResult<()> {
        let mut models = self.models.write();
        let record = models
            .get_mut(id)
            .ok_or_else(|| StoreError::ModelNotFound(id.clone()))?;
        f(record);
        record.version += 1;
        Ok(())
    }

    fn delete_model(&self, id: &ModelId) -> StoreResult<()> {
        self.models.write().remove(id);
        Ok(())
    }

    fn get_variable(&self, id: &NodeId) -> StoreResult<Option<VariableRecord>> {
        Ok(self.variables.read().get(id).cloned())
    }

    fn insert_variable(&self, record: VariableRecord) -> StoreResult<()> {
        self.variables.write().insert(record.id.clone(), record);
        Ok(())
    }

    fn patch_variable(&self, id: &NodeId, f: &dyn Fn(&mut VariableRecord)) -> StoreResult<()> {
        let mut variables = self.variables.write();
        let record = variables
            .get_mut(id)
            .ok_or_else(|| StoreError::VariableNotFound(id.clone()))?;
        f(record);
        record.version += 1;
        Ok(())
    }

    fn delete_variable(&self, id: &NodeId) -> StoreResult<()> {
        self.variables.write().remove(id);
        Ok(())
    }

    fn variables_by_model(&self, model_id: &ModelId) -> StoreResult<Vec<VariableRecord>> {
        Ok(self
            .variables
            .read()
            .values()
            .filter(|v| &v.model_id == model_id)
            .cloned()
            .collect())
    }

    fn models_by_owner(&self, owner: &str) -> StoreResult<Vec<ModelRecord>> {
        Ok(self
            .models
            .read()
            .values()
            .filter(|m| m.owner == owner)
            .cloned()
            .collect())
    }

    fn public_models(&self) -> StoreResult<Vec<ModelRecord>> {
        Ok(self
            .models
            .read()
            .values()
            .filter(|m| m.public)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn model(id: &str, owner: &str, public: bool) -> ModelRecord {
        ModelRecord {
            id: ModelId::from(id),
            owner: owner.to_string(),
            title: "t".to_string(),
            public,
            output_node: None,
            version: 0,
        }
    }

    #[test]
    fn insert_and_get_round_trips() {
        let store = InMemoryStore::new();
        store.insert_model(model("m1", "alice", false)).unwrap();
        let got = store.get_model(&ModelId::from("m1")).unwrap();
        assert_eq!(got.unwrap().owner, "alice");
    }

    #[test]
    fn patch_bumps_version() {
        let store = InMemoryStore::new();
        store.insert_model(model("m1", "alice", false)).unwrap();
        store
            .patch_model(&ModelId::from("m1"), &|m| m.title = "renamed".to_string())
            .unwrap();
        let got = store.get_model(&ModelId::from("m1")).unwrap().unwrap();
        assert_eq!(got.title, "renamed");
        assert_eq!(got.version, 1);
    }

    #[test]
    fn index_by_owner_and_public() {
        let store = InMemoryStore::new();
        store.insert_model(model("m1", "alice", false)).unwrap();
        store.insert_model(model("m2", "alice", true)).unwrap();
        store.insert_model(model("m3", "bob", true)).unwrap();

        assert_eq!(store.models_by_owner("alice").unwrap().len(), 2);
        assert_eq!(store.public_models().unwrap().len(), 2);
    }

    #[test]
    fn patch_missing_model_errors() {
        let store = InMemoryStore::new();
        let result = store.patch_model(&ModelId::from("missing"), &|_| {});
        assert!(matches!(result, Err(StoreError::ModelNotFound(_))));
    }
}
