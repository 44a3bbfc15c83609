//! Optimistic edit coordinator.
//!
//! Explicit state machine per edit key:
//!
//! ```text
//! Idle -> (edit) -> PendingDebounce -> (timer) -> InFlight -> Idle
//!            ^            |  ^                       |
//!            |   (edit: restart timer)     (queued value: new cycle)
//! ```
//!
//! The machine is pure: inputs are `edit`, `debounce_fired`,
//! `persist_resolved` and friends; outputs are [`Effect`] values the
//! runtime turns into timers and persistence calls. Single-flight and
//! precedence hold by construction: a key in `InFlight` never emits a
//! second persist, and every key with a slot is reported as pending so the
//! applier defers inbound updates for it.

use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;

use tracing::debug;

use crate::core::{
    ActorId, AnswerStore, AnswerValue, Clock, CoreError, Crdt, DeferredUpdate, EditKey,
    LifecycleState, Lww, MetadataPatch, ProductionMetadata, Stamp, Structure,
};

use super::PersistError;

/// Instruction for the runtime.
#[derive(Clone, Debug, PartialEq)]
pub enum Effect {
    /// (Re)arm the debounce timer for this key. A newer seq supersedes
    /// any timer armed earlier for the same key.
    ArmTimer {
        key: EditKey,
        seq: u64,
        after: Duration,
    },
    /// Issue the persistence request for this key. At most one of these
    /// is outstanding per key at any time.
    PersistValue {
        key: EditKey,
        seq: u64,
        value: AnswerValue,
    },
    PersistMetadata {
        seq: u64,
        patch: MetadataPatch,
    },
    PersistLifecycle {
        seq: u64,
        state: LifecycleState,
    },
}

/// Result of resolving an in-flight request.
#[derive(Debug, Default)]
pub struct Resolution {
    pub effects: Vec<Effect>,
    /// Error to surface (exactly once per failed edit), if any.
    pub error: Option<PersistError>,
    /// Whether the store was mutated (rollback or queued re-apply).
    pub store_changed: bool,
}

#[derive(Debug)]
enum SlotState {
    PendingDebounce {
        slot: Lww<AnswerValue>,
        seq: u64,
    },
    InFlight {
        sent: Lww<AnswerValue>,
        seq: u64,
        queued: Option<AnswerValue>,
    },
}

#[derive(Debug)]
struct EditSlot {
    state: SlotState,
    /// Last known server truth for this key (rollback target). Updated
    /// from deferred inbound slots while the edit is outstanding.
    base: Option<Lww<AnswerValue>>,
}

#[derive(Debug)]
struct MetadataFlight {
    base: ProductionMetadata,
    sent: MetadataPatch,
    seq: u64,
    queued: Option<MetadataPatch>,
}

pub struct Coordinator {
    actor: ActorId,
    debounce: Duration,
    clock: Clock,
    slots: BTreeMap<EditKey, EditSlot>,
    metadata: Option<MetadataFlight>,
    lifecycle_in_flight: Option<u64>,
    next_seq: u64,
}

impl Coordinator {
    pub fn new(actor: ActorId, debounce: Duration) -> Self {
        Self {
            actor,
            debounce,
            clock: Clock::new(),
            slots: BTreeMap::new(),
            metadata: None,
            lifecycle_in_flight: None,
            next_seq: 0,
        }
    }

    pub fn actor(&self) -> &ActorId {
        &self.actor
    }

    /// Keys with an outstanding local edit (debouncing or in flight).
    pub fn pending_keys(&self) -> BTreeSet<EditKey> {
        self.slots.keys().cloned().collect()
    }

    /// Fold inbound stamps into the local clock so optimistic stamps stay
    /// ahead of everything observed on the channel.
    pub fn observe_remote(&mut self, remote: &crate::core::WriteStamp) {
        self.clock.receive(remote);
    }

    /// Fold deferred inbound slots into their rollback bases: if the
    /// pending edit later fails, the user falls back to the freshest
    /// server truth, not a stale one.
    pub fn fold_deferred(&mut self, deferred: Vec<DeferredUpdate>) {
        for update in deferred {
            if let Some(slot) = self.slots.get_mut(&update.key) {
                slot.base = Some(match slot.base.take() {
                    Some(base) => base.join(&update.slot),
                    None => update.slot,
                });
            }
        }
    }

    /// Same idea for metadata: an inbound patch accepted while a local
    /// metadata save is in flight must survive a later rollback, so it is
    /// folded into the flight's rollback base as well.
    pub fn fold_metadata(&mut self, patch: &MetadataPatch, stamp: Stamp) {
        if let Some(flight) = &mut self.metadata {
            flight.base.merge(patch, stamp);
        }
    }

    fn next_seq(&mut self) -> u64 {
        self.next_seq += 1;
        self.next_seq
    }

    fn stamp(&mut self) -> Stamp {
        Stamp::new(self.clock.tick(), self.actor.clone())
    }

    /// User keystroke: apply optimistically, then debounce or queue.
    pub fn edit(
        &mut self,
        structure: &Structure,
        answers: &mut AnswerStore,
        key: EditKey,
        value: AnswerValue,
    ) -> Result<Vec<Effect>, CoreError> {
        let stamp = self.stamp();
        let base = match self.slots.get(&key) {
            Some(slot) => slot.base.clone(),
            None => answers.get(&key).cloned(),
        };
        let optimistic = Lww::new(value.clone(), stamp);
        answers.set(structure, &key, optimistic.clone())?;

        let new_seq = self.next_seq();
        let debounce = self.debounce;
        match self.slots.get_mut(&key) {
            None => {
                self.slots.insert(
                    key.clone(),
                    EditSlot {
                        state: SlotState::PendingDebounce {
                            slot: optimistic,
                            seq: new_seq,
                        },
                        base,
                    },
                );
                Ok(vec![Effect::ArmTimer {
                    key,
                    seq: new_seq,
                    after: debounce,
                }])
            }
            Some(slot) => match &mut slot.state {
                SlotState::PendingDebounce { slot: value_slot, seq } => {
                    // Restart the window; only the last value before the
                    // timer fires is ever sent.
                    *value_slot = optimistic;
                    *seq = new_seq;
                    Ok(vec![Effect::ArmTimer {
                        key,
                        seq: new_seq,
                        after: debounce,
                    }])
                }
                SlotState::InFlight { queued, .. } => {
                    // Single-flight: queue, cycle on resolution.
                    *queued = Some(value);
                    Ok(Vec::new())
                }
            },
        }
    }

    /// Debounce timer fired. Stale (superseded) timers return nothing.
    pub fn debounce_fired(&mut self, key: &EditKey, seq: u64) -> Option<Effect> {
        let slot = self.slots.get_mut(key)?;
        match &slot.state {
            SlotState::PendingDebounce {
                slot: value_slot,
                seq: current,
            } if *current == seq => {
                let sent = value_slot.clone();
                let value = sent.value.clone();
                slot.state = SlotState::InFlight {
                    sent,
                    seq,
                    queued: None,
                };
                Some(Effect::PersistValue {
                    key: key.clone(),
                    seq,
                    value,
                })
            }
            _ => {
                debug!(%key, seq, "stale debounce timer ignored");
                None
            }
        }
    }

    /// In-flight persistence request resolved.
    pub fn persist_resolved(
        &mut self,
        structure: &Structure,
        answers: &mut AnswerStore,
        key: &EditKey,
        seq: u64,
        result: Result<(), PersistError>,
    ) -> Resolution {
        let mut resolution = Resolution::default();
        let Some(slot) = self.slots.get_mut(key) else {
            return resolution;
        };
        let SlotState::InFlight {
            sent,
            seq: current,
            queued,
        } = &mut slot.state
        else {
            return resolution;
        };
        if *current != seq {
            return resolution;
        }
        let sent = sent.clone();
        let queued = queued.take();

        match result {
            Ok(()) => {
                // The acknowledged value is now server truth.
                slot.base = Some(sent.clone());
                match queued {
                    Some(q) if q != sent.value => {
                        let new_seq = self.next_seq();
                        // Store already shows the queued value (applied at
                        // keystroke); just open a new debounce cycle.
                        let stamp = answers
                            .get(key)
                            .map(|s| s.stamp.clone())
                            .unwrap_or_else(|| sent.stamp.clone());
                        if let Some(slot) = self.slots.get_mut(key) {
                            slot.state = SlotState::PendingDebounce {
                                slot: Lww::new(q, stamp),
                                seq: new_seq,
                            };
                        }
                        resolution.effects.push(Effect::ArmTimer {
                            key: key.clone(),
                            seq: new_seq,
                            after: self.debounce,
                        });
                    }
                    _ => {
                        self.slots.remove(key);
                    }
                }
            }
            Err(err) => {
                // Roll back to the last known server truth and surface
                // the failure exactly once.
                let base = slot.base.clone();
                answers.restore(key, base);
                resolution.store_changed = true;
                resolution.error = Some(err);
                self.slots.remove(key);

                if let Some(q) = queued {
                    // The queued keystroke is an independent edit; replay
                    // it as a fresh optimistic cycle.
                    match self.edit(structure, answers, key.clone(), q) {
                        Ok(mut effects) => resolution.effects.append(&mut effects),
                        Err(err) => {
                            debug!(%key, %err, "queued edit dropped after rollback");
                        }
                    }
                }
            }
        }
        resolution
    }

    /// Metadata edit: optimistic merge, immediate single-flight persist.
    pub fn edit_metadata(
        &mut self,
        answers: &mut AnswerStore,
        patch: MetadataPatch,
    ) -> Result<Vec<Effect>, CoreError> {
        if patch.is_empty() {
            return Ok(Vec::new());
        }
        let base = match &self.metadata {
            Some(flight) => flight.base.clone(),
            None => answers.metadata().clone(),
        };
        let stamp = self.stamp();
        answers.merge_metadata(&patch, stamp)?;

        match &mut self.metadata {
            None => {
                let seq = self.next_seq();
                self.metadata = Some(MetadataFlight {
                    base,
                    sent: patch.clone(),
                    seq,
                    queued: None,
                });
                Ok(vec![Effect::PersistMetadata { seq, patch }])
            }
            Some(flight) => {
                match &mut flight.queued {
                    Some(queued) => queued.overlay(patch),
                    queued @ None => *queued = Some(patch),
                }
                Ok(Vec::new())
            }
        }
    }

    pub fn metadata_resolved(
        &mut self,
        answers: &mut AnswerStore,
        seq: u64,
        result: Result<(), PersistError>,
    ) -> Resolution {
        let mut resolution = Resolution::default();
        let Some(flight) = self.metadata.take() else {
            return resolution;
        };
        if flight.seq != seq {
            self.metadata = Some(flight);
            return resolution;
        }

        match result {
            Ok(()) => {
                if let Some(queued) = flight.queued {
                    // The acked patch becomes part of the next flight's
                    // rollback base, stamped with the store's last write
                    // (or a fresh local stamp if it has none).
                    let ack_stamp = match answers.metadata().updated.clone() {
                        Some(stamp) => stamp,
                        None => self.stamp(),
                    };
                    let mut base = flight.base;
                    base.merge(&flight.sent, ack_stamp);
                    let seq = self.next_seq();
                    resolution.effects.push(Effect::PersistMetadata {
                        seq,
                        patch: queued.clone(),
                    });
                    self.metadata = Some(MetadataFlight {
                        base,
                        sent: queued,
                        seq,
                        queued: None,
                    });
                }
            }
            Err(err) => {
                answers.restore_metadata(flight.base);
                resolution.store_changed = true;
                resolution.error = Some(err);
                if let Some(queued) = flight.queued {
                    match self.edit_metadata(answers, queued) {
                        Ok(mut effects) => resolution.effects.append(&mut effects),
                        Err(err) => debug!(%err, "queued metadata patch dropped after rollback"),
                    }
                }
            }
        }
        resolution
    }

    /// Lifecycle change request: bypasses debouncing, single request at a
    /// time. Returns `None` while a previous request is still in flight.
    pub fn request_state_change(
        &mut self,
        answers: &AnswerStore,
        state: LifecycleState,
    ) -> Result<Option<Effect>, CoreError> {
        if answers.lifecycle().is_closed() {
            return Err(CoreError::ProductionClosed {
                state: answers.lifecycle(),
            });
        }
        if self.lifecycle_in_flight.is_some() {
            debug!("lifecycle change already in flight");
            return Ok(None);
        }
        let seq = self.next_seq();
        self.lifecycle_in_flight = Some(seq);
        Ok(Some(Effect::PersistLifecycle { seq, state }))
    }

    /// On success the store transitions immediately (optimistic); the
    /// later inbound echo is a harmless no-op against the monotonic guard.
    pub fn lifecycle_resolved(
        &mut self,
        answers: &mut AnswerStore,
        seq: u64,
        state: LifecycleState,
        result: Result<(), PersistError>,
    ) -> Resolution {
        let mut resolution = Resolution::default();
        if self.lifecycle_in_flight != Some(seq) {
            return resolution;
        }
        self.lifecycle_in_flight = None;
        match result {
            Ok(()) => {
                let stamp = self.stamp();
                resolution.store_changed = answers.transition_lifecycle(state, stamp);
            }
            Err(err) => {
                resolution.error = Some(err);
            }
        }
        resolution
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::structure::fixtures::{cell, sample_structure};
    use crate::core::{FieldId, Patch, WriteStamp};

    const DEBOUNCE: Duration = Duration::from_millis(400);

    fn coordinator() -> Coordinator {
        Coordinator::new(ActorId::new("ana@example.com").unwrap(), DEBOUNCE)
    }

    fn fkey(id: &str) -> EditKey {
        EditKey::Field(FieldId::new(id).unwrap())
    }

    fn text(s: &str) -> AnswerValue {
        AnswerValue::Text(s.into())
    }

    fn arm_seq(effects: &[Effect]) -> u64 {
        match effects {
            [Effect::ArmTimer { seq, .. }] => *seq,
            other => panic!("expected single ArmTimer, got {other:?}"),
        }
    }

    #[test]
    fn three_rapid_edits_produce_one_persist_with_last_value() {
        let structure = sample_structure();
        let mut answers = AnswerStore::new();
        let mut coord = coordinator();
        let key = fkey("f1");

        let seq1 = arm_seq(&coord.edit(&structure, &mut answers, key.clone(), text("a")).unwrap());
        let seq2 = arm_seq(&coord.edit(&structure, &mut answers, key.clone(), text("ab")).unwrap());
        let seq3 = arm_seq(&coord.edit(&structure, &mut answers, key.clone(), text("abc")).unwrap());

        // Superseded timers are stale.
        assert!(coord.debounce_fired(&key, seq1).is_none());
        assert!(coord.debounce_fired(&key, seq2).is_none());

        let persist = coord.debounce_fired(&key, seq3).unwrap();
        assert_eq!(
            persist,
            Effect::PersistValue {
                key: key.clone(),
                seq: seq3,
                value: text("abc"),
            }
        );
        // And the store already shows the latest keystroke.
        assert_eq!(answers.get(&key).unwrap().value, text("abc"));
    }

    #[test]
    fn in_flight_edit_queues_instead_of_double_sending() {
        let structure = sample_structure();
        let mut answers = AnswerStore::new();
        let mut coord = coordinator();
        let key = EditKey::Cell(cell("t1", "r1", "c1"));

        let seq = arm_seq(
            &coord
                .edit(&structure, &mut answers, key.clone(), text("100"))
                .unwrap(),
        );
        coord.debounce_fired(&key, seq).unwrap();

        // Second edit while in flight: no new persist effect.
        let effects = coord
            .edit(&structure, &mut answers, key.clone(), text("120"))
            .unwrap();
        assert!(effects.is_empty());
        assert_eq!(answers.get(&key).unwrap().value, text("120"));

        // Resolution opens a fresh debounce cycle for the queued value.
        let resolution =
            coord.persist_resolved(&structure, &mut answers, &key, seq, Ok(()));
        assert!(resolution.error.is_none());
        let new_seq = arm_seq(&resolution.effects);
        let persist = coord.debounce_fired(&key, new_seq).unwrap();
        assert!(matches!(
            persist,
            Effect::PersistValue { value, .. } if value == text("120")
        ));
    }

    #[test]
    fn queued_value_equal_to_sent_ends_the_cycle() {
        let structure = sample_structure();
        let mut answers = AnswerStore::new();
        let mut coord = coordinator();
        let key = fkey("f1");

        let seq = arm_seq(&coord.edit(&structure, &mut answers, key.clone(), text("x")).unwrap());
        coord.debounce_fired(&key, seq).unwrap();
        coord
            .edit(&structure, &mut answers, key.clone(), text("x"))
            .unwrap();

        let resolution = coord.persist_resolved(&structure, &mut answers, &key, seq, Ok(()));
        assert!(resolution.effects.is_empty());
        assert!(coord.pending_keys().is_empty());
    }

    #[test]
    fn failure_rolls_back_and_surfaces_exactly_one_error() {
        let structure = sample_structure();
        let mut answers = AnswerStore::new();
        let mut coord = coordinator();
        let key = fkey("f1");

        // Pre-existing server value.
        answers
            .set(
                &structure,
                &key,
                Lww::new(
                    text("before"),
                    Stamp::new(WriteStamp::new(10, 0), ActorId::new("server").unwrap()),
                ),
            )
            .unwrap();

        let seq = arm_seq(
            &coord
                .edit(&structure, &mut answers, key.clone(), text("after"))
                .unwrap(),
        );
        coord.debounce_fired(&key, seq).unwrap();

        let resolution = coord.persist_resolved(
            &structure,
            &mut answers,
            &key,
            seq,
            Err(PersistError::new("boom")),
        );
        assert_eq!(resolution.error, Some(PersistError::new("boom")));
        assert!(resolution.store_changed);
        assert_eq!(answers.get(&key).unwrap().value, text("before"));
        assert!(coord.pending_keys().is_empty());

        // Only one surfaced error: a late duplicate resolution is ignored.
        let again = coord.persist_resolved(
            &structure,
            &mut answers,
            &key,
            seq,
            Err(PersistError::new("boom")),
        );
        assert!(again.error.is_none());
    }

    #[test]
    fn failure_on_fresh_key_removes_the_slot() {
        let structure = sample_structure();
        let mut answers = AnswerStore::new();
        let mut coord = coordinator();
        let key = fkey("f2");

        let seq = arm_seq(&coord.edit(&structure, &mut answers, key.clone(), text("v")).unwrap());
        coord.debounce_fired(&key, seq).unwrap();
        coord.persist_resolved(
            &structure,
            &mut answers,
            &key,
            seq,
            Err(PersistError::new("offline")),
        );
        // No pre-edit value existed, so the rollback removes the answer.
        assert!(answers.get(&key).is_none());
    }

    #[test]
    fn deferred_inbound_updates_refresh_the_rollback_base() {
        let structure = sample_structure();
        let mut answers = AnswerStore::new();
        let mut coord = coordinator();
        let key = fkey("f1");

        let seq = arm_seq(
            &coord
                .edit(&structure, &mut answers, key.clone(), text("local"))
                .unwrap(),
        );
        coord.debounce_fired(&key, seq).unwrap();

        // Remote write observed while our edit is in flight.
        coord.fold_deferred(vec![DeferredUpdate {
            key: key.clone(),
            slot: Lww::new(
                text("remote"),
                Stamp::new(WriteStamp::new(999, 0), ActorId::new("bruno").unwrap()),
            ),
        }]);

        let resolution = coord.persist_resolved(
            &structure,
            &mut answers,
            &key,
            seq,
            Err(PersistError::new("boom")),
        );
        assert!(resolution.error.is_some());
        // Rollback lands on the freshest server truth, not the pre-edit
        // value (which was absent).
        assert_eq!(answers.get(&key).unwrap().value, text("remote"));
    }

    #[test]
    fn edits_on_closed_production_are_rejected() {
        let structure = sample_structure();
        let mut answers = AnswerStore::new();
        let mut coord = coordinator();
        answers.transition_lifecycle(
            LifecycleState::Cancelled,
            Stamp::new(WriteStamp::new(5, 0), ActorId::new("ana").unwrap()),
        );

        let err = coord
            .edit(&structure, &mut answers, fkey("f1"), text("x"))
            .unwrap_err();
        assert!(matches!(err, CoreError::ProductionClosed { .. }));

        let err = coord
            .request_state_change(&answers, LifecycleState::Finished)
            .unwrap_err();
        assert!(matches!(err, CoreError::ProductionClosed { .. }));
    }

    #[test]
    fn lifecycle_change_is_immediate_and_optimistic() {
        let mut answers = AnswerStore::new();
        let mut coord = coordinator();

        let effect = coord
            .request_state_change(&answers, LifecycleState::Finished)
            .unwrap()
            .unwrap();
        let Effect::PersistLifecycle { seq, state } = effect else {
            panic!("expected lifecycle persist");
        };
        assert_eq!(state, LifecycleState::Finished);

        // Double request while in flight is swallowed.
        assert!(coord
            .request_state_change(&answers, LifecycleState::Finished)
            .unwrap()
            .is_none());

        let resolution = coord.lifecycle_resolved(&mut answers, seq, state, Ok(()));
        assert!(resolution.store_changed);
        assert_eq!(answers.lifecycle(), LifecycleState::Finished);
    }

    #[test]
    fn metadata_edits_are_single_flight_with_overlay() {
        let mut answers = AnswerStore::new();
        let mut coord = coordinator();

        let effects = coord
            .edit_metadata(
                &mut answers,
                MetadataPatch {
                    lot: Patch::Set("L-1".into()),
                    ..Default::default()
                },
            )
            .unwrap();
        let Effect::PersistMetadata { seq, .. } = &effects[0] else {
            panic!("expected metadata persist");
        };
        let seq = *seq;
        assert_eq!(answers.metadata().lot.as_deref(), Some("L-1"));

        // Two more patches while in flight collapse into one queued patch.
        coord
            .edit_metadata(
                &mut answers,
                MetadataPatch {
                    lot: Patch::Set("L-2".into()),
                    ..Default::default()
                },
            )
            .unwrap();
        let effects = coord
            .edit_metadata(
                &mut answers,
                MetadataPatch {
                    manager: Patch::Set("bruno".into()),
                    ..Default::default()
                },
            )
            .unwrap();
        assert!(effects.is_empty());

        let resolution = coord.metadata_resolved(&mut answers, seq, Ok(()));
        let [Effect::PersistMetadata { patch, .. }] = &resolution.effects[..] else {
            panic!("expected queued metadata persist");
        };
        assert_eq!(patch.lot, Patch::Set("L-2".into()));
        assert_eq!(patch.manager, Patch::Set("bruno".into()));
    }

    #[test]
    fn metadata_failure_rolls_back() {
        let mut answers = AnswerStore::new();
        let mut coord = coordinator();

        let effects = coord
            .edit_metadata(
                &mut answers,
                MetadataPatch {
                    lot: Patch::Set("L-1".into()),
                    ..Default::default()
                },
            )
            .unwrap();
        let Effect::PersistMetadata { seq, .. } = &effects[0] else {
            panic!("expected metadata persist");
        };

        let resolution =
            coord.metadata_resolved(&mut answers, *seq, Err(PersistError::new("boom")));
        assert!(resolution.error.is_some());
        assert_eq!(answers.metadata().lot, None);
    }

    #[test]
    fn metadata_rollback_keeps_concurrent_remote_fields() {
        let mut answers = AnswerStore::new();
        let mut coord = coordinator();

        let effects = coord
            .edit_metadata(
                &mut answers,
                MetadataPatch {
                    lot: Patch::Set("L-1".into()),
                    ..Default::default()
                },
            )
            .unwrap();
        let Effect::PersistMetadata { seq, .. } = &effects[0] else {
            panic!("expected metadata persist");
        };

        // A remote patch for an unrelated field lands while the save is
        // in flight: merged into the store and folded into the flight.
        let remote = MetadataPatch {
            manager: Patch::Set("bruno".into()),
            ..Default::default()
        };
        let remote_stamp = Stamp::new(
            WriteStamp::new(999, 0),
            ActorId::new("bruno@example.com").unwrap(),
        );
        answers.merge_metadata(&remote, remote_stamp.clone()).unwrap();
        coord.fold_metadata(&remote, remote_stamp);

        let resolution =
            coord.metadata_resolved(&mut answers, *seq, Err(PersistError::new("boom")));
        assert!(resolution.error.is_some());
        // The failed lot edit is gone, the remote manager write is not.
        assert_eq!(answers.metadata().lot, None);
        assert_eq!(answers.metadata().manager.as_deref(), Some("bruno"));
    }

    #[test]
    fn failed_queued_metadata_rolls_back_to_acked_base() {
        let mut answers = AnswerStore::new();
        let mut coord = coordinator();

        let effects = coord
            .edit_metadata(
                &mut answers,
                MetadataPatch {
                    lot: Patch::Set("L-1".into()),
                    ..Default::default()
                },
            )
            .unwrap();
        let Effect::PersistMetadata { seq, .. } = &effects[0] else {
            panic!("expected metadata persist");
        };
        let first_seq = *seq;

        coord
            .edit_metadata(
                &mut answers,
                MetadataPatch {
                    manager: Patch::Set("bruno".into()),
                    ..Default::default()
                },
            )
            .unwrap();

        let resolution = coord.metadata_resolved(&mut answers, first_seq, Ok(()));
        let [Effect::PersistMetadata { seq: queued_seq, .. }] = &resolution.effects[..] else {
            panic!("expected queued metadata persist");
        };

        // The queued save fails: the acked lot survives the rollback.
        let resolution =
            coord.metadata_resolved(&mut answers, *queued_seq, Err(PersistError::new("boom")));
        assert!(resolution.error.is_some());
        assert_eq!(answers.metadata().lot.as_deref(), Some("L-1"));
        assert_eq!(answers.metadata().manager, None);
    }

    #[test]
    fn local_stamps_stay_ahead_of_observed_remote_stamps() {
        let structure = sample_structure();
        let mut answers = AnswerStore::new();
        let mut coord = coordinator();
        let key = fkey("f1");

        let far_future = WriteStamp::new(u64::MAX / 2, 0);
        coord.observe_remote(&far_future);

        coord
            .edit(&structure, &mut answers, key.clone(), text("local"))
            .unwrap();
        assert!(answers.get(&key).unwrap().stamp.at > far_future);
    }
}
