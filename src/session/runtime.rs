//! Session runtime: one state thread per open production.
//!
//! Every mutation path - UI commands, debounce timers, inbound channel
//! frames, persistence resolutions - funnels through a single crossbeam
//! mailbox and is handled on one thread, so the answer store is never
//! touched concurrently. Blocking collaborator calls run on a separate
//! persistence worker that posts results back into the same mailbox.
//!
//! Teardown: closing the session breaks the state loop and drops the
//! mailbox. A persistence result that arrives afterwards has nowhere to
//! send to and is discarded, which realizes the "fire and forget"
//! semantics for in-flight requests against a torn-down store.

use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crossbeam::channel::{Receiver, RecvTimeoutError, Sender};
use tracing::{debug, info, warn};

use crate::core::{
    apply_message, decode, progress, ActorId, AnswerSnapshot, AnswerStore, AnswerValue,
    ApplyMetrics, CellKey, EditKey, FieldId, InboundMessage, LifecycleState, MetadataPatch,
    ProductionCode, Stamp, Structure,
};

use super::coordinator::{Coordinator, Effect, Resolution};
use super::{
    LoadError, PersistClient, PersistError, SessionError, SnapshotLoader, StateSink,
    StructureLoader,
};

#[derive(Clone, Debug)]
pub struct SessionConfig {
    pub production: ProductionCode,
    pub actor: ActorId,
    pub debounce: Duration,
}

enum Command {
    EditField { field: FieldId, value: AnswerValue },
    EditCell { cell: CellKey, value: AnswerValue },
    EditMetadata { patch: MetadataPatch },
    RequestStateChange { state: LifecycleState },
    Inbound { frame: Vec<u8> },
    Resync,
    Close,
}

enum Resolved {
    Value {
        key: EditKey,
        seq: u64,
        result: Result<(), PersistError>,
    },
    Metadata {
        seq: u64,
        result: Result<(), PersistError>,
    },
    Lifecycle {
        seq: u64,
        state: LifecycleState,
        result: Result<(), PersistError>,
    },
    Snapshot {
        result: Result<AnswerSnapshot, LoadError>,
    },
}

enum Msg {
    Command(Command),
    Resolved(Resolved),
}

enum Job {
    SaveField {
        field: FieldId,
        value: AnswerValue,
        seq: u64,
    },
    SaveCell {
        cell: CellKey,
        value: AnswerValue,
        seq: u64,
    },
    SaveMetadata {
        patch: MetadataPatch,
        seq: u64,
    },
    ChangeLifecycle {
        state: LifecycleState,
        seq: u64,
    },
    LoadSnapshot,
}

/// Handle to one open production session.
///
/// Cheap to pass around by reference; dropping it closes the session.
pub struct Session {
    tx: Sender<Msg>,
    structure: Arc<Structure>,
    state_thread: Option<JoinHandle<()>>,
}

impl Session {
    /// Load the structure and latest answers, then spawn the session
    /// threads. The structure is loaded once and immutable afterwards.
    pub fn open(
        config: SessionConfig,
        structures: &dyn StructureLoader,
        snapshots: impl SnapshotLoader,
        persist: impl PersistClient,
        sink: impl StateSink,
    ) -> Result<Session, SessionError> {
        let structure = Arc::new(structures.load_structure(&config.production)?);
        let snapshot = snapshots.load_latest(&config.production)?;
        let (answers, dropped) = AnswerStore::from_snapshot(&structure, snapshot);
        if dropped > 0 {
            warn!(
                production = %config.production,
                dropped,
                "snapshot contained answers for another structure version"
            );
        }

        let (msg_tx, msg_rx) = crossbeam::channel::unbounded::<Msg>();
        let (job_tx, job_rx) = crossbeam::channel::unbounded::<Job>();

        let worker = PersistWorker {
            production: config.production.clone(),
            actor: config.actor.clone(),
            persist,
            snapshots,
            results: msg_tx.clone(),
        };
        std::thread::spawn(move || worker.run(job_rx));

        let state = StateLoop {
            structure: structure.clone(),
            answers,
            coordinator: Coordinator::new(config.actor.clone(), config.debounce),
            metrics: ApplyMetrics::default(),
            sink,
            jobs: job_tx,
            timers: Vec::new(),
        };
        let state_thread = std::thread::spawn(move || state.run(msg_rx));

        info!(production = %config.production, "session opened");
        Ok(Session {
            tx: msg_tx,
            structure,
            state_thread: Some(state_thread),
        })
    }

    pub fn structure(&self) -> &Arc<Structure> {
        &self.structure
    }

    pub fn edit_field(&self, field: FieldId, value: AnswerValue) -> Result<(), SessionError> {
        self.send(Command::EditField { field, value })
    }

    pub fn edit_cell(&self, cell: CellKey, value: AnswerValue) -> Result<(), SessionError> {
        self.send(Command::EditCell { cell, value })
    }

    pub fn edit_metadata(&self, patch: MetadataPatch) -> Result<(), SessionError> {
        self.send(Command::EditMetadata { patch })
    }

    pub fn request_state_change(&self, state: LifecycleState) -> Result<(), SessionError> {
        self.send(Command::RequestStateChange { state })
    }

    /// Feed one raw frame from the realtime channel.
    pub fn handle_raw_message(&self, frame: &[u8]) -> Result<(), SessionError> {
        self.send(Command::Inbound {
            frame: frame.to_vec(),
        })
    }

    /// Reload the latest-answers snapshot and LWW-merge it in. The
    /// channel collaborator calls this after a reconnect.
    pub fn resync(&self) -> Result<(), SessionError> {
        self.send(Command::Resync)
    }

    /// Close the session: pending debounce timers are cancelled and
    /// in-flight requests become fire-and-forget.
    pub fn close(mut self) {
        let _ = self.tx.send(Msg::Command(Command::Close));
        if let Some(handle) = self.state_thread.take() {
            let _ = handle.join();
        }
    }

    fn send(&self, command: Command) -> Result<(), SessionError> {
        self.tx
            .send(Msg::Command(command))
            .map_err(|_| SessionError::Closed)
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        let _ = self.tx.send(Msg::Command(Command::Close));
        if let Some(handle) = self.state_thread.take() {
            let _ = handle.join();
        }
    }
}

/// Runs blocking collaborator calls off the state thread.
struct PersistWorker<P, S> {
    production: ProductionCode,
    actor: ActorId,
    persist: P,
    snapshots: S,
    results: Sender<Msg>,
}

impl<P: PersistClient, S: SnapshotLoader> PersistWorker<P, S> {
    fn run(self, jobs: Receiver<Job>) {
        while let Ok(job) = jobs.recv() {
            let resolved = self.execute(job);
            if self.results.send(Msg::Resolved(resolved)).is_err() {
                // Session torn down; late results are dropped.
                break;
            }
        }
    }

    fn execute(&self, job: Job) -> Resolved {
        match job {
            Job::SaveField { field, value, seq } => Resolved::Value {
                key: EditKey::Field(field.clone()),
                seq,
                result: self
                    .persist
                    .save_field(&self.production, &field, &value, &self.actor),
            },
            Job::SaveCell { cell, value, seq } => Resolved::Value {
                key: EditKey::Cell(cell.clone()),
                seq,
                result: self
                    .persist
                    .save_cell(&self.production, &cell, &value, &self.actor),
            },
            Job::SaveMetadata { patch, seq } => Resolved::Metadata {
                seq,
                result: self.persist.save_metadata(&self.production, &patch),
            },
            Job::ChangeLifecycle { state, seq } => Resolved::Lifecycle {
                seq,
                state,
                result: self
                    .persist
                    .change_lifecycle(&self.production, state, &self.actor),
            },
            Job::LoadSnapshot => Resolved::Snapshot {
                result: self.snapshots.load_latest(&self.production),
            },
        }
    }
}

struct StateLoop<K> {
    structure: Arc<Structure>,
    answers: AnswerStore,
    coordinator: Coordinator,
    metrics: ApplyMetrics,
    sink: K,
    jobs: Sender<Job>,
    /// Armed debounce deadlines. Superseded entries stay until they fire
    /// and are then ignored by seq.
    timers: Vec<(Instant, EditKey, u64)>,
}

impl<K: StateSink> StateLoop<K> {
    fn run(mut self, rx: Receiver<Msg>) {
        // Initial paint for the UI collaborator.
        self.notify();

        loop {
            let msg = match self.next_deadline() {
                Some(deadline) => {
                    let timeout = deadline.saturating_duration_since(Instant::now());
                    match rx.recv_timeout(timeout) {
                        Ok(msg) => Some(msg),
                        Err(RecvTimeoutError::Timeout) => None,
                        Err(RecvTimeoutError::Disconnected) => break,
                    }
                }
                None => match rx.recv() {
                    Ok(msg) => Some(msg),
                    Err(_) => break,
                },
            };

            match msg {
                Some(Msg::Command(Command::Close)) => break,
                Some(Msg::Command(command)) => self.handle_command(command),
                Some(Msg::Resolved(resolved)) => self.handle_resolved(resolved),
                None => {}
            }
            self.fire_due_timers();
        }
        debug!(
            structure_mismatch = self.metrics.structure_mismatch,
            decode_error = self.metrics.decode_error,
            closed_drop = self.metrics.closed_drop,
            stale_lifecycle = self.metrics.stale_lifecycle,
            "session state loop stopped"
        );
    }

    fn next_deadline(&self) -> Option<Instant> {
        self.timers.iter().map(|(at, _, _)| *at).min()
    }

    fn fire_due_timers(&mut self) {
        let now = Instant::now();
        let due: Vec<(EditKey, u64)> = {
            let mut due = Vec::new();
            self.timers.retain(|(at, key, seq)| {
                if *at <= now {
                    due.push((key.clone(), *seq));
                    false
                } else {
                    true
                }
            });
            due
        };
        for (key, seq) in due {
            if let Some(effect) = self.coordinator.debounce_fired(&key, seq) {
                self.apply_effect(effect);
            }
        }
    }

    fn handle_command(&mut self, command: Command) {
        match command {
            Command::EditField { field, value } => {
                self.local_edit(EditKey::Field(field), value);
            }
            Command::EditCell { cell, value } => {
                self.local_edit(EditKey::Cell(cell), value);
            }
            Command::EditMetadata { patch } => {
                match self.coordinator.edit_metadata(&mut self.answers, patch) {
                    Ok(effects) => {
                        self.apply_effects(effects);
                        self.notify();
                    }
                    Err(err) => self.sink.edit_rejected(&SessionError::Core(err)),
                }
            }
            Command::RequestStateChange { state } => {
                match self.coordinator.request_state_change(&self.answers, state) {
                    Ok(Some(effect)) => self.apply_effect(effect),
                    Ok(None) => {}
                    Err(err) => self.sink.edit_rejected(&SessionError::Core(err)),
                }
            }
            Command::Inbound { frame } => self.handle_inbound(&frame),
            Command::Resync => {
                if self.jobs.send(Job::LoadSnapshot).is_err() {
                    warn!("persistence worker gone, resync dropped");
                }
            }
            // Intercepted by the loop before dispatch.
            Command::Close => {}
        }
    }

    fn local_edit(&mut self, key: EditKey, value: AnswerValue) {
        match self
            .coordinator
            .edit(&self.structure, &mut self.answers, key, value)
        {
            Ok(effects) => {
                self.apply_effects(effects);
                self.notify();
            }
            Err(err) => self.sink.edit_rejected(&SessionError::Core(err)),
        }
    }

    fn handle_inbound(&mut self, frame: &[u8]) {
        let msg = match decode(frame) {
            Ok(msg) => msg,
            Err(err) => {
                self.metrics.decode_error += 1;
                warn!(%err, "inbound frame dropped");
                return;
            }
        };
        self.coordinator.observe_remote(&msg.at().into());
        let pending = self.coordinator.pending_keys();
        let outcome = apply_message(
            &self.structure,
            &mut self.answers,
            &pending,
            &mut self.metrics,
            &msg,
        );
        let changed = outcome.changed();
        self.coordinator.fold_deferred(outcome.deferred);
        if let InboundMessage::MetadataChanged { patch, at, author } = &msg {
            self.coordinator
                .fold_metadata(patch, Stamp::new((*at).into(), author.clone()));
        }
        if changed {
            self.notify();
        }
    }

    fn handle_resolved(&mut self, resolved: Resolved) {
        match resolved {
            Resolved::Value { key, seq, result } => {
                let resolution = self.coordinator.persist_resolved(
                    &self.structure,
                    &mut self.answers,
                    &key,
                    seq,
                    result,
                );
                self.finish_resolution(Some(key), resolution);
            }
            Resolved::Metadata { seq, result } => {
                let resolution = self
                    .coordinator
                    .metadata_resolved(&mut self.answers, seq, result);
                self.finish_resolution(None, resolution);
            }
            Resolved::Lifecycle { seq, state, result } => {
                let resolution =
                    self.coordinator
                        .lifecycle_resolved(&mut self.answers, seq, state, result);
                self.finish_resolution(None, resolution);
            }
            Resolved::Snapshot { result } => match result {
                Ok(snapshot) => {
                    let pending = self.coordinator.pending_keys();
                    if self
                        .answers
                        .merge_snapshot(&self.structure, snapshot, &pending)
                    {
                        self.notify();
                    }
                }
                Err(err) => warn!(%err, "snapshot reload failed"),
            },
        }
    }

    fn finish_resolution(&mut self, key: Option<EditKey>, resolution: Resolution) {
        if let Some(source) = resolution.error {
            let error = match key {
                Some(key) => SessionError::Persist { key, source },
                None => SessionError::PersistProduction { source },
            };
            self.sink.edit_rejected(&error);
        }
        self.apply_effects(resolution.effects);
        if resolution.store_changed {
            self.notify();
        }
    }

    fn apply_effects(&mut self, effects: Vec<Effect>) {
        for effect in effects {
            self.apply_effect(effect);
        }
    }

    fn apply_effect(&mut self, effect: Effect) {
        let job = match effect {
            Effect::ArmTimer { key, seq, after } => {
                self.timers.push((Instant::now() + after, key, seq));
                return;
            }
            Effect::PersistValue { key, seq, value } => match key {
                EditKey::Field(field) => Job::SaveField { field, value, seq },
                EditKey::Cell(cell) => Job::SaveCell { cell, value, seq },
            },
            Effect::PersistMetadata { seq, patch } => Job::SaveMetadata { patch, seq },
            Effect::PersistLifecycle { seq, state } => Job::ChangeLifecycle { state, seq },
        };
        if self.jobs.send(job).is_err() {
            warn!("persistence worker gone, request dropped");
        }
    }

    fn notify(&self) {
        let view = self.answers.snapshot();
        let progress = progress(&self.structure, &self.answers);
        self.sink.state_changed(&view, &progress);
    }
}
