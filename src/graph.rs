//! Graph Model (C2).
//!
//! Public mutation operations on models and variables. Each runs against a
//! [`Store`] and enforces the §3 invariants plus acyclicity (§4.2) and
//! ownership authorization before committing.

use crate::auth::{authorize_read, authorize_write, Principal};
use crate::cpt::{self, trivial_prior, CptEntry};
use crate::error::{KernelError, KernelResult};
use crate::ids::{ModelId, NodeId};
use crate::store::{ModelRecord, Store, VariableRecord};
use std::collections::{HashSet, VecDeque};
use tracing::{debug, info, warn};

/// Patch to apply to a variable; any subset of fields may be set.
#[derive(Debug, Clone, Default)]
pub struct VariablePatch {
    pub title: Option<String>,
    pub description: Option<Option<String>>,
    pub x: Option<f64>,
    pub y: Option<f64>,
    pub cpt: Option<Vec<CptEntry>>,
}

/// Create a new model owned by `principal`.
pub fn create_model(store: &dyn Store, principal: &Principal, title: &str) -> KernelResult<ModelId> {
    let id = ModelId::new();
    store.insert_model(ModelRecord {
        id: id.clone(),
        owner: principal.username.clone(),
        title: title.to_string(),
        public: false,
        output_node: None,
        version: 0,
    })?;
    info!(model = %id, "model created");
    Ok(id)
}

/// Create a variable with the trivial prior `{∅ → 0.5}` (§3 "Lifecycle").
pub fn create_variable(
    store: &dyn Store,
    principal: &Principal,
    model_id: &ModelId,
    title: &str,
    desc: Option<String>,
    x: f64,
    y: f64,
) -> KernelResult<NodeId> {
    let model = load_model(store, model_id)?;
    authorize_write(principal, &model)?;

    let id = NodeId::new();
    store.insert_variable(VariableRecord {
        id: id.clone(),
        model_id: model_id.clone(),
        title: title.to_string(),
        description: desc,
        x,
        y,
        cpt: trivial_prior(),
        column_order: Some(Vec::new()),
        version: 0,
    })?;
    info!(variable = %id, model = %model_id, "variable created");
    Ok(id)
}

/// Apply a patch to a variable. When `patch.cpt` is set, runs full §4.2
/// validation: CPT invariants, self-parenthood, parent existence/model
/// membership, and a cycle check on newly-added parents only.
pub fn update_variable(
    store: &dyn Store,
    principal: &Principal,
    id: &NodeId,
    patch: VariablePatch,
) -> KernelResult<()> {
    let variable = load_variable(store, id)?;
    let model = load_model(store, &variable.model_id)?;
    authorize_write(principal, &model)?;

    if let Some(ref new_cpt) = patch.cpt {
        validate_cpt_patch(store, id, &variable, new_cpt)?;
    }

    store.patch_variable(id, &move |record: &mut VariableRecord| {
        if let Some(ref title) = patch.title {
            record.title = title.clone();
        }
        if let Some(ref desc) = patch.description {
            record.description = desc.clone();
        }
        if let Some(x) = patch.x {
            record.x = x;
        }
        if let Some(y) = patch.y {
            record.y = y;
        }
        if let Some(ref new_cpt) = patch.cpt {
            let parents: HashSet<NodeId> = new_cpt
                .first()
                .map(|e| e.parent_states.keys().cloned().collect())
                .unwrap_or_default();
            record.column_order =
                Some(cpt::sync_column_order(&parents, record.column_order.as_deref()));
            record.cpt = new_cpt.clone();
        }
    })?;

    debug!(variable = %id, "variable updated");
    Ok(())
}

fn validate_cpt_patch(
    store: &dyn Store,
    id: &NodeId,
    existing: &VariableRecord,
    new_cpt: &[CptEntry],
) -> KernelResult<()> {
    cpt::validate(new_cpt)?;

    let new_parents: HashSet<NodeId> = new_cpt
        .first()
        .map(|e| e.parent_states.keys().cloned().collect())
        .unwrap_or_default();

    if new_parents.contains(id) {
        return Err(KernelError::SelfParent(id.clone()));
    }

    let existing_parents: HashSet<NodeId> = existing
        .cpt
        .first()
        .map(|e| e.parent_states.keys().cloned().collect())
        .unwrap_or_default();

    for parent in &new_parents {
        let parent_record = load_variable(store, parent)?;
        if parent_record.model_id != existing.model_id {
            return Err(KernelError::UnknownParent {
                parent: parent.clone(),
                model: existing.model_id.clone(),
            });
        }

        // Only newly-added parents need a cycle check (design note: old
        // parents cannot suddenly create a cycle, and re-checking them on
        // every edit would be wasted work on dense edit sequences).
        if !existing_parents.contains(parent) && reaches(store, parent, id)? {
            return Err(KernelError::WouldCreateCycle {
                parent: parent.clone(),
                child: id.clone(),
            });
        }
    }

    Ok(())
}

/// Breadth-first search from `new_parent`, expanding to each visited node's
/// *own* parents (walking up the ancestor chain). If `child` is visited,
/// `child` is already an ancestor of `new_parent` — meaning a path
/// `child -> ... -> new_parent` already exists — so adding the edge
/// `new_parent -> child` would close a cycle.
fn reaches(store: &dyn Store, new_parent: &NodeId, child: &NodeId) -> KernelResult<bool> {
    let mut queue = VecDeque::new();
    let mut visited = HashSet::new();
    queue.push_back(new_parent.clone());
    visited.insert(new_parent.clone());

    while let Some(current) = queue.pop_front() {
        if &current == child {
            return Ok(true);
        }
        let record = load_variable(store, &current)?;
        let ancestors: HashSet<NodeId> = record
            .cpt
            .first()
            .map(|e| e.parent_states.keys().cloned().collect())
            .unwrap_or_default();
        for ancestor in ancestors {
            if visited.insert(ancestor.clone()) {
                queue.push_back(ancestor);
            }
        }
    }
    Ok(false)
}

/// Sugar over `update_variable`: add `parent_id` as a wildcard parent of `child_id`.
pub fn add_parent(
    store: &dyn Store,
    principal: &Principal,
    parent_id: &NodeId,
    child_id: &NodeId,
) -> KernelResult<()> {
    let child = load_variable(store, child_id)?;
    let new_cpt = cpt::add_parent(&child.cpt, parent_id);
    update_variable(
        store,
        principal,
        child_id,
        VariablePatch {
            cpt: Some(new_cpt),
            ..Default::default()
        },
    )
}

/// Sugar over `update_variable`: remove `parent_id` from `child_id`'s CPT.
/// Falls back to the trivial prior if dropping the parent breaks coverage
/// (same recovery path as [`remove_variable`]).
pub fn remove_parent(
    store: &dyn Store,
    principal: &Principal,
    parent_id: &NodeId,
    child_id: &NodeId,
) -> KernelResult<()> {
    let child = load_variable(store, child_id)?;
    let candidate = cpt::drop_parent(&child.cpt, parent_id);
    let new_cpt = if cpt::validate(&candidate).is_ok() {
        candidate
    } else {
        warn!(variable = %child_id, parent = %parent_id, "CPT invalid after parent removal, resetting to trivial prior");
        trivial_prior()
    };
    update_variable(
        store,
        principal,
        child_id,
        VariablePatch {
            cpt: Some(new_cpt),
            ..Default::default()
        },
    )
}

/// Remove a variable. For every sibling variable whose CPT references
/// `id`, delete it from that CPT and revalidate, falling back to the
/// trivial prior on failure (§4.2, property P6).
pub fn remove_variable(store: &dyn Store, principal: &Principal, id: &NodeId) -> KernelResult<()> {
    let variable = load_variable(store, id)?;
    let model = load_model(store, &variable.model_id)?;
    authorize_write(principal, &model)?;

    let siblings = store.variables_by_model(&variable.model_id)?;
    for sibling in &siblings {
        if sibling.id == *id {
            continue;
        }
        let references_id = sibling
            .cpt
            .first()
            .map(|e| e.parent_states.contains_key(id))
            .unwrap_or(false);
        if !references_id {
            continue;
        }

        let candidate = cpt::drop_parent(&sibling.cpt, id);
        let repaired = if cpt::validate(&candidate).is_ok() {
            candidate
        } else {
            warn!(variable = %sibling.id, removed_parent = %id, "CPT invalid after parent removal, resetting to trivial prior");
            trivial_prior()
        };
        let parents: HashSet<NodeId> = repaired
            .first()
            .map(|e| e.parent_states.keys().cloned().collect())
            .unwrap_or_default();
        let sibling_id = sibling.id.clone();
        store.patch_variable(&sibling_id, &move |record: &mut VariableRecord| {
            record.column_order =
                Some(cpt::sync_column_order(&parents, record.column_order.as_deref()));
            record.cpt = repaired.clone();
        })?;
    }

    if model.output_node.as_ref() == Some(id) {
        let model_id = variable.model_id.clone();
        store.patch_model(&model_id, &|record: &mut ModelRecord| {
            record.output_node = None;
        })?;
    }

    store.delete_variable(id)?;
    info!(variable = %id, "variable removed");
    Ok(())
}

/// Remove a model and all of its variables.
pub fn remove_model(store: &dyn Store, principal: &Principal, id: &ModelId) -> KernelResult<()> {
    let model = load_model(store, id)?;
    authorize_write(principal, &model)?;

    for variable in store.variables_by_model(id)? {
        store.delete_variable(&variable.id)?;
    }
    store.delete_model(id)?;
    info!(model = %id, "model removed");
    Ok(())
}

/// Load all variables of a model the caller may read.
pub fn load_model_variables(
    store: &dyn Store,
    principal: &Principal,
    model_id: &ModelId,
) -> KernelResult<Vec<VariableRecord>> {
    let model = load_model(store, model_id)?;
    authorize_read(principal, &model)?;
    Ok(store.variables_by_model(model_id)?)
}

fn load_model(store: &dyn Store, id: &ModelId) -> KernelResult<ModelRecord> {
    store
        .get_model(id)?
        .ok_or_else(|| KernelError::ModelNotFound(id.clone()))
}

fn load_variable(store: &dyn Store, id: &NodeId) -> KernelResult<VariableRecord> {
    store
        .get_variable(id)?
        .ok_or_else(|| KernelError::VariableNotFound(id.clone()))
}
