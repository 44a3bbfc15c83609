//! Inbound message application under local-priority LWW.
//!
//! Precedence rule: a key with an outstanding local edit keeps displaying
//! the optimistic value; the inbound slot is handed back as a deferred
//! update for the coordinator to fold into its rollback base. Every other
//! key applies the inbound update as delivered.
//!
//! Failure policy: malformed or out-of-structure input is dropped and
//! counted, never raised - the channel must keep running.

use std::collections::BTreeSet;

use tracing::{debug, warn};

use super::answers::AnswerStore;
use super::crdt::Lww;
use super::error::CoreError;
use super::identity::{CellKey, EditKey, FieldId};
use super::structure::Structure;
use super::time::Stamp;
use super::value::AnswerValue;
use super::wire::InboundMessage;

/// Drop counters for the inbound path.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ApplyMetrics {
    /// Messages naming a field/cell absent from the loaded structure.
    pub structure_mismatch: u64,
    /// Frames that failed to decode.
    pub decode_error: u64,
    /// Field/cell/metadata updates dropped because the production closed.
    pub closed_drop: u64,
    /// Lifecycle messages that would violate the monotonic transition.
    pub stale_lifecycle: u64,
}

/// Inbound slot withheld because a local edit is outstanding for its key.
#[derive(Clone, Debug, PartialEq)]
pub struct DeferredUpdate {
    pub key: EditKey,
    pub slot: Lww<AnswerValue>,
}

/// What one message application changed.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ApplyOutcome {
    pub changed_fields: BTreeSet<FieldId>,
    pub changed_cells: BTreeSet<CellKey>,
    pub lifecycle_changed: bool,
    pub metadata_changed: bool,
    pub deferred: Vec<DeferredUpdate>,
}

impl ApplyOutcome {
    /// Whether the visible store changed (deferred slots do not show).
    pub fn changed(&self) -> bool {
        !self.changed_fields.is_empty()
            || !self.changed_cells.is_empty()
            || self.lifecycle_changed
            || self.metadata_changed
    }
}

/// Apply one decoded channel message to the store.
pub fn apply_message(
    structure: &Structure,
    answers: &mut AnswerStore,
    pending: &BTreeSet<EditKey>,
    metrics: &mut ApplyMetrics,
    msg: &InboundMessage,
) -> ApplyOutcome {
    let mut outcome = ApplyOutcome::default();
    match msg {
        InboundMessage::FieldUpdated {
            field_id,
            value,
            at,
            author,
        } => {
            let key = EditKey::Field(field_id.clone());
            let slot = Lww::new(value.clone(), Stamp::new((*at).into(), author.clone()));
            if apply_slot(structure, answers, pending, metrics, &mut outcome, key, slot) {
                outcome.changed_fields.insert(field_id.clone());
            }
        }
        InboundMessage::CellUpdated {
            table_id,
            row_id,
            column_id,
            value,
            at,
            author,
        } => {
            let cell = CellKey::new(table_id.clone(), row_id.clone(), column_id.clone());
            let key = EditKey::Cell(cell.clone());
            let slot = Lww::new(value.clone(), Stamp::new((*at).into(), author.clone()));
            if apply_slot(structure, answers, pending, metrics, &mut outcome, key, slot) {
                outcome.changed_cells.insert(cell);
            }
        }
        InboundMessage::LifecycleChanged { state, at, author } => {
            let stamp = Stamp::new((*at).into(), author.clone());
            if answers.transition_lifecycle(*state, stamp) {
                outcome.lifecycle_changed = true;
            } else if *state != answers.lifecycle() {
                // Echoes of the current state are harmless; anything else
                // would violate the monotonic transition.
                metrics.stale_lifecycle += 1;
                debug!(current = %answers.lifecycle(), incoming = %state, "stale lifecycle update dropped");
            }
        }
        InboundMessage::MetadataChanged { patch, at, author } => {
            let stamp = Stamp::new((*at).into(), author.clone());
            match answers.merge_metadata(patch, stamp) {
                Ok(changed) => outcome.metadata_changed = changed,
                Err(CoreError::ProductionClosed { .. }) => {
                    metrics.closed_drop += 1;
                }
                Err(err) => {
                    warn!(%err, "metadata update dropped");
                }
            }
        }
    }
    outcome
}

/// Apply one field/cell slot; returns whether the visible store changed.
fn apply_slot(
    structure: &Structure,
    answers: &mut AnswerStore,
    pending: &BTreeSet<EditKey>,
    metrics: &mut ApplyMetrics,
    outcome: &mut ApplyOutcome,
    key: EditKey,
    slot: Lww<AnswerValue>,
) -> bool {
    if answers.lifecycle().is_closed() {
        metrics.closed_drop += 1;
        return false;
    }
    if pending.contains(&key) {
        // Local edit outstanding: the optimistic value keeps displaying.
        outcome.deferred.push(DeferredUpdate { key, slot });
        return false;
    }
    match answers.set(structure, &key, slot) {
        Ok(changed) => changed,
        Err(CoreError::StructureMismatch { key }) => {
            metrics.structure_mismatch += 1;
            warn!(%key, "inbound update for unknown key dropped");
            false
        }
        Err(err) => {
            // transition_lifecycle guard raced: count as a closed drop.
            warn!(%err, "inbound update dropped");
            metrics.closed_drop += 1;
            false
        }
    }
}
