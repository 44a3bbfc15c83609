//! Core capability errors (parsing, validation, store invariants).
//!
//! These represent domain/refusal states, not library implementation
//! details. They are bounded and stable.

use thiserror::Error;

use crate::core::domain::LifecycleState;
use crate::core::identity::EditKey;
use crate::error::{Effect, Transience};

/// Invalid identifier.
#[derive(Debug, Error, Clone)]
#[non_exhaustive]
pub enum InvalidId {
    #[error("field id `{raw}` is invalid: {reason}")]
    Field { raw: String, reason: String },
    #[error("table id `{raw}` is invalid: {reason}")]
    Table { raw: String, reason: String },
    #[error("row id `{raw}` is invalid: {reason}")]
    Row { raw: String, reason: String },
    #[error("column id `{raw}` is invalid: {reason}")]
    Column { raw: String, reason: String },
    #[error("production code `{raw}` is invalid: {reason}")]
    Production { raw: String, reason: String },
    #[error("actor id `{raw}` is invalid: {reason}")]
    Actor { raw: String, reason: String },
}

/// Canonical error enum for the core capability.
#[derive(Debug, Error, Clone)]
#[non_exhaustive]
pub enum CoreError {
    #[error(transparent)]
    InvalidId(#[from] InvalidId),

    #[error("duplicate id `{id}` in structure")]
    DuplicateId { id: String },

    #[error("{key} is not part of the loaded structure")]
    StructureMismatch { key: EditKey },

    #[error("production is {state}, editing is closed")]
    ProductionClosed { state: LifecycleState },

    #[error("malformed channel message: {reason}")]
    ChannelDecode { reason: String },
}

impl CoreError {
    pub fn transience(&self) -> Transience {
        // Core errors are pure domain/input failures.
        Transience::Permanent
    }

    pub fn effect(&self) -> Effect {
        Effect::None
    }
}
