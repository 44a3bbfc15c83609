//! The mutable answer store: latest value per field and per cell, plus
//! production metadata and lifecycle, for one open production.
//!
//! The store is owned by its session and never shared across productions.
//! Every mutation path checks two invariants before writing:
//! - the key exists in the bound structure (stale keys are dropped, never
//!   stored)
//! - the lifecycle is still `InProcess` (editing is permanently closed
//!   once it is not)

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::warn;

use super::crdt::{Crdt, Lww};
use super::domain::{LifecycleState, MetadataPatch, ProductionMetadata};
use super::error::CoreError;
use super::identity::{CellKey, EditKey, FieldId};
use super::structure::Structure;
use super::time::Stamp;
use super::value::AnswerValue;

/// Serializable image of an answer store.
///
/// Doubles as the snapshot-loader wire format and as the read-only view
/// handed to the notification sink.
#[derive(Clone, Debug, PartialEq, Default, Serialize, Deserialize)]
pub struct AnswerSnapshot {
    #[serde(default)]
    pub fields: BTreeMap<FieldId, Lww<AnswerValue>>,
    #[serde(default)]
    pub cells: BTreeMap<CellKey, Lww<AnswerValue>>,
    #[serde(default)]
    pub metadata: ProductionMetadata,
    #[serde(default)]
    pub lifecycle: LifecycleState,
    #[serde(default)]
    pub lifecycle_updated: Option<Stamp>,
}

#[derive(Debug)]
pub struct AnswerStore {
    fields: BTreeMap<FieldId, Lww<AnswerValue>>,
    cells: BTreeMap<CellKey, Lww<AnswerValue>>,
    metadata: ProductionMetadata,
    lifecycle: LifecycleState,
    lifecycle_updated: Option<Stamp>,
}

impl AnswerStore {
    pub fn new() -> Self {
        Self {
            fields: BTreeMap::new(),
            cells: BTreeMap::new(),
            metadata: ProductionMetadata::default(),
            lifecycle: LifecycleState::InProcess,
            lifecycle_updated: None,
        }
    }

    /// Initialize from a loaded snapshot, dropping keys the structure does
    /// not know (stale ids from another structure version). Returns the
    /// number of dropped entries.
    pub fn from_snapshot(structure: &Structure, snapshot: AnswerSnapshot) -> (Self, usize) {
        let mut store = Self::new();
        store.metadata = snapshot.metadata;
        store.lifecycle = snapshot.lifecycle;
        store.lifecycle_updated = snapshot.lifecycle_updated;

        let mut dropped = 0usize;
        for (id, slot) in snapshot.fields {
            if structure.contains_field(&id) {
                store.fields.insert(id, slot);
            } else {
                warn!(field = %id, "snapshot field not in structure, dropped");
                dropped += 1;
            }
        }
        for (key, slot) in snapshot.cells {
            if structure.contains_cell(&key) {
                store.cells.insert(key, slot);
            } else {
                warn!(cell = %key, "snapshot cell not in structure, dropped");
                dropped += 1;
            }
        }
        (store, dropped)
    }

    /// Cheap read-only image for the notification sink, also usable to
    /// re-seed a store.
    pub fn snapshot(&self) -> AnswerSnapshot {
        AnswerSnapshot {
            fields: self.fields.clone(),
            cells: self.cells.clone(),
            metadata: self.metadata.clone(),
            lifecycle: self.lifecycle,
            lifecycle_updated: self.lifecycle_updated.clone(),
        }
    }

    pub fn fields(&self) -> &BTreeMap<FieldId, Lww<AnswerValue>> {
        &self.fields
    }

    pub fn cells(&self) -> &BTreeMap<CellKey, Lww<AnswerValue>> {
        &self.cells
    }

    pub fn field(&self, id: &FieldId) -> Option<&Lww<AnswerValue>> {
        self.fields.get(id)
    }

    pub fn cell(&self, key: &CellKey) -> Option<&Lww<AnswerValue>> {
        self.cells.get(key)
    }

    pub fn get(&self, key: &EditKey) -> Option<&Lww<AnswerValue>> {
        match key {
            EditKey::Field(id) => self.field(id),
            EditKey::Cell(cell) => self.cell(cell),
        }
    }

    pub fn metadata(&self) -> &ProductionMetadata {
        &self.metadata
    }

    pub fn lifecycle(&self) -> LifecycleState {
        self.lifecycle
    }

    pub fn lifecycle_updated(&self) -> Option<&Stamp> {
        self.lifecycle_updated.as_ref()
    }

    fn guard(&self, structure: &Structure, key: &EditKey) -> Result<(), CoreError> {
        if self.lifecycle.is_closed() {
            return Err(CoreError::ProductionClosed {
                state: self.lifecycle,
            });
        }
        let known = match key {
            EditKey::Field(id) => structure.contains_field(id),
            EditKey::Cell(cell) => structure.contains_cell(cell),
        };
        if !known {
            return Err(CoreError::StructureMismatch { key: key.clone() });
        }
        Ok(())
    }

    /// Write one answer slot. The slot's stored stamp never moves backward:
    /// the value is taken as given (the caller decides precedence) but the
    /// stamp is the max of stored and incoming.
    ///
    /// Returns whether the stored slot changed.
    pub fn set(
        &mut self,
        structure: &Structure,
        key: &EditKey,
        slot: Lww<AnswerValue>,
    ) -> Result<bool, CoreError> {
        self.guard(structure, key)?;
        Ok(self.set_unchecked(key, slot))
    }

    fn set_unchecked(&mut self, key: &EditKey, slot: Lww<AnswerValue>) -> bool {
        match key {
            EditKey::Field(id) => write_slot(&mut self.fields, id.clone(), slot),
            EditKey::Cell(cell) => write_slot(&mut self.cells, cell.clone(), slot),
        }
    }

    /// Restore a slot to a previous image (rollback after a failed
    /// persist). Bypasses the lifecycle guard: a rollback is a correction,
    /// not an edit, and must succeed even if the production closed while
    /// the request was in flight.
    pub fn restore(&mut self, key: &EditKey, slot: Option<Lww<AnswerValue>>) {
        match (key, slot) {
            (EditKey::Field(id), Some(slot)) => {
                self.fields.insert(id.clone(), slot);
            }
            (EditKey::Field(id), None) => {
                self.fields.remove(id);
            }
            (EditKey::Cell(cell), Some(slot)) => {
                self.cells.insert(cell.clone(), slot);
            }
            (EditKey::Cell(cell), None) => {
                self.cells.remove(cell);
            }
        }
    }

    /// Merge metadata. Refused once the production is closed.
    pub fn merge_metadata(
        &mut self,
        patch: &MetadataPatch,
        stamp: Stamp,
    ) -> Result<bool, CoreError> {
        if self.lifecycle.is_closed() {
            return Err(CoreError::ProductionClosed {
                state: self.lifecycle,
            });
        }
        Ok(self.metadata.merge(patch, stamp))
    }

    /// Restore metadata to a previous image (rollback path).
    pub fn restore_metadata(&mut self, metadata: ProductionMetadata) {
        self.metadata = metadata;
    }

    /// Monotonic lifecycle transition. Returns true when the state
    /// actually moved; an echo of the current state or any attempt to
    /// leave a closed state is a no-op.
    pub fn transition_lifecycle(&mut self, next: LifecycleState, stamp: Stamp) -> bool {
        if !self.lifecycle.can_transition_to(next) {
            return false;
        }
        self.lifecycle = next;
        self.lifecycle_updated = Some(stamp);
        true
    }

    /// LWW-merge a freshly loaded snapshot into this store (reconnect
    /// path). Slots named in `skip` are left untouched - those have a
    /// local optimistic value that must keep precedence. Unknown keys are
    /// dropped as in [`AnswerStore::from_snapshot`].
    ///
    /// Returns whether anything changed.
    pub fn merge_snapshot(
        &mut self,
        structure: &Structure,
        snapshot: AnswerSnapshot,
        skip: &std::collections::BTreeSet<EditKey>,
    ) -> bool {
        let mut changed = false;
        for (id, slot) in snapshot.fields {
            let key = EditKey::Field(id.clone());
            if skip.contains(&key) || !structure.contains_field(&id) {
                continue;
            }
            let merged = match self.fields.get(&id) {
                Some(existing) => existing.join(&slot),
                None => slot,
            };
            if self.fields.get(&id) != Some(&merged) {
                self.fields.insert(id, merged);
                changed = true;
            }
        }
        for (cell, slot) in snapshot.cells {
            let key = EditKey::Cell(cell.clone());
            if skip.contains(&key) || !structure.contains_cell(&cell) {
                continue;
            }
            let merged = match self.cells.get(&cell) {
                Some(existing) => existing.join(&slot),
                None => slot,
            };
            if self.cells.get(&cell) != Some(&merged) {
                self.cells.insert(cell, merged);
                changed = true;
            }
        }

        if !self.lifecycle.is_closed() && snapshot.lifecycle.is_closed() {
            self.lifecycle = snapshot.lifecycle;
            self.lifecycle_updated = snapshot.lifecycle_updated;
            changed = true;
        }
        let patch = MetadataPatch {
            lot: option_patch(snapshot.metadata.lot),
            manager: option_patch(snapshot.metadata.manager),
            observations: option_patch(snapshot.metadata.observations),
        };
        if let Some(stamp) = snapshot.metadata.updated
            && newer_metadata(&self.metadata, &stamp)
            && self.metadata.merge(&patch, stamp)
        {
            changed = true;
        }
        changed
    }
}

impl Default for AnswerStore {
    fn default() -> Self {
        Self::new()
    }
}

fn newer_metadata(current: &ProductionMetadata, incoming: &Stamp) -> bool {
    match &current.updated {
        Some(existing) => incoming > existing,
        None => true,
    }
}

fn option_patch(value: Option<String>) -> super::domain::Patch<String> {
    match value {
        Some(v) => super::domain::Patch::Set(v),
        None => super::domain::Patch::Keep,
    }
}

fn write_slot<K: Ord>(
    map: &mut BTreeMap<K, Lww<AnswerValue>>,
    key: K,
    mut slot: Lww<AnswerValue>,
) -> bool {
    match map.entry(key) {
        std::collections::btree_map::Entry::Vacant(v) => {
            v.insert(slot);
            true
        }
        std::collections::btree_map::Entry::Occupied(mut o) => {
            if slot.stamp < o.get().stamp {
                slot.stamp = o.get().stamp.clone();
            }
            if *o.get() == slot {
                false
            } else {
                o.insert(slot);
                true
            }
        }
    }
}
