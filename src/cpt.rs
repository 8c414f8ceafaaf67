//! CPT Rule Table (C1).
//!
//! A conditional probability table is stored as a rule list with `ANY`
//! wildcards rather than a dense `2^|P|` table (design note in the
//! top-level design doc: "keep the rule form on the wire, precompute the
//! bit-packed indexed form on entry to the inference engine").

use crate::ids::NodeId;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};

/// A parent's required state in a CPT rule, or "don't care".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ParentState {
    True,
    False,
    Any,
}

impl ParentState {
    fn matches(self, value: bool) -> bool {
        match self {
            ParentState::True => value,
            ParentState::False => !value,
            ParentState::Any => true,
        }
    }

    fn is_any(self) -> bool {
        matches!(self, ParentState::Any)
    }
}

/// One row of a CPT: a parent-state pattern and the probability that the
/// variable is `TRUE` when the pattern matches.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CptEntry {
    pub parent_states: BTreeMap<NodeId, ParentState>,
    pub probability: f64,
}

impl CptEntry {
    fn specificity(&self) -> usize {
        self.parent_states
            .values()
            .filter(|s| !s.is_any())
            .count()
    }

    fn wildcard_count(&self) -> usize {
        self.parent_states.values().filter(|s| s.is_any()).count()
    }

    fn matches(&self, assignment: &HashMap<NodeId, bool>) -> bool {
        self.parent_states
            .iter()
            .all(|(parent, state)| match assignment.get(parent) {
                Some(&v) => state.matches(v),
                None => false,
            })
    }
}

/// The trivial prior every new variable and every parent-removal fallback
/// resets to: a single root entry at `P(X=TRUE) = 0.5`.
#[must_use]
pub fn trivial_prior() -> Vec<CptEntry> {
    vec![CptEntry {
        parent_states: BTreeMap::new(),
        probability: 0.5,
    }]
}

/// Per-entry cap on wildcard slots (§3 invariant 5): bounds validation's
/// expansion cost to `2^8 = 256` per entry.
pub const MAX_WILDCARDS_PER_ENTRY: usize = 8;

/// Hard ceiling on a variable's total (distinct) parent count, matching the
/// `u32` bit width `IndexedCpt` packs parent positions into — bit position
/// `MAX_PARENTS_PER_VARIABLE` would overflow a `1u32 << bit` shift.
pub const MAX_PARENTS_PER_VARIABLE: usize = 32;

#[derive(Debug, Clone, Serialize, Deserialize, thiserror::Error)]
pub enum CptValidationError {
    #[error("CPT must have at least one entry")]
    Empty,

    #[error("probability {value} for entry {index} is out of [0,1] or non-finite")]
    ProbOutOfRange { index: usize, value: f64 },

    #[error("entries do not share a single parent set")]
    InconsistentParents,

    #[error("root variable (no parents) must have exactly one entry")]
    RootMultiEntry,

    #[error("entry {index} has {count} wildcards, exceeding the cap of {MAX_WILDCARDS_PER_ENTRY}")]
    WildcardCap { index: usize, count: usize },

    #[error("variable has {count} parents, exceeding the {MAX_PARENTS_PER_VARIABLE}-parent bit-packing ceiling")]
    TooManyParents { count: usize },

    #[error("parent assignments not covered by any entry: {0:?}")]
    Uncovered(Vec<BTreeMap<NodeId, bool>>),

    #[error("parent assignments matched by more than one entry: {0:?}")]
    Conflict(Vec<BTreeMap<NodeId, bool>>),
}

/// Enforce §3 invariants 1–6 on a candidate entry list.
///
/// Coverage/non-conflict (invariant 4) is checked by full wildcard
/// expansion when `|P| <= MAX_WILDCARDS_PER_ENTRY` worth of total parents
/// keeps the expansion tractable (the wildcard cap on *entries* already
/// bounds this; with at most 8 wildcards per entry and entries sharing one
/// parent set, expansion per entry is at most 256 assignments).
pub fn validate(entries: &[CptEntry]) -> Result<(), CptValidationError> {
    if entries.is_empty() {
        return Err(CptValidationError::Empty);
    }

    let parent_set: HashSet<&NodeId> = entries[0].parent_states.keys().collect();
    for entry in entries {
        let keys: HashSet<&NodeId> = entry.parent_states.keys().collect();
        if keys != parent_set {
            return Err(CptValidationError::InconsistentParents);
        }
    }

    if parent_set.len() > MAX_PARENTS_PER_VARIABLE {
        return Err(CptValidationError::TooManyParents {
            count: parent_set.len(),
        });
    }

    if parent_set.is_empty() && entries.len() != 1 {
        return Err(CptValidationError::RootMultiEntry);
    }

    for (index, entry) in entries.iter().enumerate() {
        if !(0.0..=1.0).contains(&entry.probability) || !entry.probability.is_finite() {
            return Err(CptValidationError::ProbOutOfRange {
                index,
                value: entry.probability,
            });
        }
        let wildcards = entry.wildcard_count();
        if wildcards > MAX_WILDCARDS_PER_ENTRY {
            return Err(CptValidationError::WildcardCap {
                index,
                count: wildcards,
            });
        }
    }

    check_coverage(entries, &parent_set)
}

fn check_coverage(
    entries: &[CptEntry],
    parent_set: &HashSet<&NodeId>,
) -> Result<(), CptValidationError> {
    let parents: Vec<&NodeId> = parent_set.iter().copied().collect();
    let n = parents.len();
    // n is bounded in practice (validated networks keep |P| small for the
    // exhaustive check to be worthwhile); for larger parent sets we fall
    // back to the specificity-ranked cover check instead of expanding 2^n.
    if n <= 20 {
        check_coverage_by_expansion(entries, &parents)
    } else {
        check_coverage_by_specificity(entries, &parents)
    }
}

fn check_coverage_by_expansion(
    entries: &[CptEntry],
    parents: &[&NodeId],
) -> Result<(), CptValidationError> {
    let n = parents.len();
    let total = 1usize << n;
    let mut uncovered = Vec::new();
    let mut conflicts = Vec::new();

    for bits in 0..total {
        let assignment: HashMap<NodeId, bool> = parents
            .iter()
            .enumerate()
            .map(|(i, p)| ((*p).clone(), (bits >> i) & 1 == 1))
            .collect();

        let matches = entries.iter().filter(|e| e.matches(&assignment)).count();
        if matches == 0 {
            uncovered.push(assignment_as_map(&assignment));
        } else if matches > 1 {
            conflicts.push(assignment_as_map(&assignment));
        }
    }

    if !conflicts.is_empty() {
        return Err(CptValidationError::Conflict(conflicts));
    }
    if !uncovered.is_empty() {
        return Err(CptValidationError::Uncovered(uncovered));
    }
    Ok(())
}

fn assignment_as_map(assignment: &HashMap<NodeId, bool>) -> BTreeMap<NodeId, bool> {
    assignment.iter().map(|(k, v)| (k.clone(), *v)).collect()
}

/// Specificity-ranked cover check: for every entry, any *other* entry whose
/// pattern is a superset-or-equal of non-wildcard constraints and overlaps
/// in assignment space is a conflict; absence of overlap among all entries
/// combined with total coverage is checked by summing each entry's covered
/// fraction `2^{-specificity}` in `{0,1}`-weighted disjoint regions. This
/// path exists for `|P| > 20`, where exhaustive expansion is infeasible.
fn check_coverage_by_specificity(
    entries: &[CptEntry],
    parents: &[&NodeId],
) -> Result<(), CptValidationError> {
    // Disjointness: no two entries may overlap (share a satisfiable
    // assignment). Two entries overlap iff on every shared non-wildcard
    // parent they require the same value.
    for i in 0..entries.len() {
        for j in (i + 1)..entries.len() {
            if entries_overlap(&entries[i], &entries[j]) {
                return Err(CptValidationError::Conflict(vec![]));
            }
        }
    }

    // Coverage: total probability mass of the rule set over {T,F}^P must
    // equal 1 when no two rules overlap. Each entry with `k` wildcards
    // covers `2^k` of the `2^n` assignments.
    let n = parents.len();
    let covered: u128 = entries
        .iter()
        .map(|e| 1u128 << e.wildcard_count())
        .sum();
    if covered == 1u128 << n {
        Ok(())
    } else {
        Err(CptValidationError::Uncovered(vec![]))
    }
}

fn entries_overlap(a: &CptEntry, b: &CptEntry) -> bool {
    a.parent_states.iter().all(|(parent, a_state)| {
        match b.parent_states.get(parent) {
            Some(b_state) => compatible(*a_state, *b_state),
            None => true,
        }
    })
}

fn compatible(a: ParentState, b: ParentState) -> bool {
    matches!(
        (a, b),
        (ParentState::Any, _)
            | (_, ParentState::Any)
            | (ParentState::True, ParentState::True)
            | (ParentState::False, ParentState::False)
    )
}

/// Look up `P(X=TRUE | assignment)` using the specificity-max rule: the
/// matching entry with the most non-wildcard slots (guaranteed unique by
/// invariant 4).
#[must_use]
pub fn lookup(entries: &[CptEntry], assignment: &HashMap<NodeId, bool>) -> Option<f64> {
    entries
        .iter()
        .filter(|e| e.matches(assignment))
        .max_by_key(|e| e.specificity())
        .map(|e| e.probability)
}

/// Add a new parent to every entry as a wildcard; coverage is trivially
/// preserved since every existing assignment still matches with the new
/// slot set to `ANY`.
#[must_use]
pub fn add_parent(entries: &[CptEntry], parent_id: &NodeId) -> Vec<CptEntry> {
    entries
        .iter()
        .map(|e| {
            let mut parent_states = e.parent_states.clone();
            parent_states.insert(parent_id.clone(), ParentState::Any);
            CptEntry {
                parent_states,
                probability: e.probability,
            }
        })
        .collect()
}

/// Drop a parent from every entry. The caller must re-validate the result;
/// dropping a parent can merge previously-disjoint rows into conflicts.
#[must_use]
pub fn drop_parent(entries: &[CptEntry], parent_id: &NodeId) -> Vec<CptEntry> {
    entries
        .iter()
        .map(|e| {
            let mut parent_states = e.parent_states.clone();
            parent_states.remove(parent_id);
            CptEntry {
                parent_states,
                probability: e.probability,
            }
        })
        .collect()
}

/// Preserve display order for surviving parents, append new ones at the end.
#[must_use]
pub fn sync_column_order(parents: &HashSet<NodeId>, prior_order: Option<&[NodeId]>) -> Vec<NodeId> {
    let mut order = Vec::new();
    if let Some(prior) = prior_order {
        for id in prior {
            if parents.contains(id) {
                order.push(id.clone());
            }
        }
    }
    let mut remaining: Vec<&NodeId> = parents.iter().filter(|p| !order.contains(p)).collect();
    remaining.sort();
    order.extend(remaining.into_iter().cloned());
    order
}

/// One indexed CPT rule: `mask` has 1-bits on non-wildcard parents,
/// `pattern` has 1-bits on required-TRUE parents. Lookup picks the first
/// rule (in descending-specificity order) whose `(assignment & mask) ==
/// pattern`.
#[derive(Debug, Clone)]
pub struct IndexedRule {
    pub mask: u32,
    pub pattern: u32,
    pub specificity: u32,
    pub probability: f64,
}

/// Bit-packed form of a CPT consumed by the inference engine. Built once
/// per inference invocation per variable.
#[derive(Debug, Clone)]
pub struct IndexedCpt {
    /// Parent ids in bit-position order (bit `i` corresponds to `parents[i]`).
    pub parents: Vec<NodeId>,
    /// Rules sorted by descending specificity; a root variable's single
    /// entry becomes the sole (wildcard) rule with mask=0, pattern=0.
    pub rules: Vec<IndexedRule>,
}

impl IndexedCpt {
    /// Build the indexed form from the rule-list CPT, assigning parent bit
    /// positions in ascending id order for determinism.
    #[must_use]
    pub fn build(entries: &[CptEntry]) -> Self {
        let mut parents: Vec<NodeId> = entries
            .first()
            .map(|e| e.parent_states.keys().cloned().collect())
            .unwrap_or_default();
        parents.sort();

        let bit_of: HashMap<&NodeId, u32> = parents
            .iter()
            .enumerate()
            .map(|(i, p)| (p, i as u32))
            .collect();

        let mut rules: Vec<IndexedRule> = entries
            .iter()
            .map(|entry| {
                let mut mask = 0u32;
                let mut pattern = 0u32;
                for (parent, state) in &entry.parent_states {
                    if let Some(&bit) = bit_of.get(parent) {
                        match state {
                            ParentState::True => {
                                mask |= 1 << bit;
                                pattern |= 1 << bit;
                            }
                            ParentState::False => {
                                mask |= 1 << bit;
                            }
                            ParentState::Any => {}
                        }
                    }
                }
                IndexedRule {
                    mask,
                    pattern,
                    specificity: mask.count_ones(),
                    probability: entry.probability,
                }
            })
            .collect();

        rules.sort_by(|a, b| b.specificity.cmp(&a.specificity));

        IndexedCpt { parents, rules }
    }

    /// `P(X=TRUE | parents = assignment)` where `assignment` is a bit
    /// vector keyed the same way as `self.parents`.
    #[must_use]
    pub fn lookup(&self, assignment: u32) -> Option<f64> {
        self.rules
            .iter()
            .find(|r| (assignment & r.mask) == r.pattern)
            .map(|r| r.probability)
    }
}
