//! Per-production session: collaborator ports, the optimistic edit
//! coordinator, and the runtime that serializes every mutation path onto
//! one thread.

pub mod coordinator;
pub mod runtime;

use thiserror::Error;

use crate::core::{
    ActorId, AnswerSnapshot, AnswerValue, CellKey, CoreError, EditKey, FieldId, LifecycleState,
    MetadataPatch, ProductionCode, Progress, Structure,
};
use crate::error::{Effect, Transience};

pub use coordinator::{Coordinator, Effect as EditEffect, Resolution};
pub use runtime::{Session, SessionConfig};

/// Persistence request failed (network/server). Retryable by the user
/// re-editing; the engine never auto-retries.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("persist failed: {reason}")]
pub struct PersistError {
    pub reason: String,
}

impl PersistError {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

/// Loader failure (structure or snapshot).
#[derive(Debug, Error, Clone)]
#[error("load failed for {production}: {reason}")]
pub struct LoadError {
    pub production: ProductionCode,
    pub reason: String,
}

/// Session capability errors.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SessionError {
    #[error(transparent)]
    Core(#[from] CoreError),

    #[error("persist failed for {key}: {source}")]
    Persist {
        key: EditKey,
        source: PersistError,
    },

    /// Metadata or lifecycle request failed; these are production-level
    /// and carry no edit key.
    #[error("persist failed for production-level change: {source}")]
    PersistProduction { source: PersistError },

    #[error(transparent)]
    Load(#[from] LoadError),

    #[error("session is closed")]
    Closed,
}

impl SessionError {
    pub fn transience(&self) -> Transience {
        match self {
            SessionError::Core(e) => e.transience(),
            SessionError::Persist { .. }
            | SessionError::PersistProduction { .. }
            | SessionError::Load(_) => Transience::Retryable,
            SessionError::Closed => Transience::Permanent,
        }
    }

    pub fn effect(&self) -> Effect {
        match self {
            SessionError::Core(e) => e.effect(),
            // A failed persist may or may not have landed server-side.
            SessionError::Persist { .. } | SessionError::PersistProduction { .. } => {
                Effect::Unknown
            }
            SessionError::Load(_) | SessionError::Closed => Effect::None,
        }
    }
}

/// Persistence collaborator. Calls block; the session runtime keeps them
/// off the state thread. The coordinator guarantees at most one
/// outstanding call per edit key, so each call is safe to issue once per
/// logical edit.
pub trait PersistClient: Send + 'static {
    fn save_field(
        &self,
        production: &ProductionCode,
        field: &FieldId,
        value: &AnswerValue,
        author: &ActorId,
    ) -> Result<(), PersistError>;

    fn save_cell(
        &self,
        production: &ProductionCode,
        cell: &CellKey,
        value: &AnswerValue,
        author: &ActorId,
    ) -> Result<(), PersistError>;

    fn save_metadata(
        &self,
        production: &ProductionCode,
        patch: &MetadataPatch,
    ) -> Result<(), PersistError>;

    fn change_lifecycle(
        &self,
        production: &ProductionCode,
        state: LifecycleState,
        author: &ActorId,
    ) -> Result<(), PersistError>;
}

/// Structure loader collaborator; called once per session open.
pub trait StructureLoader {
    fn load_structure(&self, production: &ProductionCode) -> Result<Structure, LoadError>;
}

/// Latest-answers loader; used at open and after a channel reconnect.
pub trait SnapshotLoader: Send + 'static {
    fn load_latest(&self, production: &ProductionCode) -> Result<AnswerSnapshot, LoadError>;
}

/// UI notification sink. Knows nothing about rendering.
pub trait StateSink: Send + 'static {
    /// Called after every accepted mutation.
    fn state_changed(&self, answers: &AnswerSnapshot, progress: &Progress);

    /// Called exactly once per failed or rejected edit.
    fn edit_rejected(&self, error: &SessionError);
}
