//! Crate-level error surface.
//!
//! Capability errors (`CoreError`, `SessionError`, `ConfigError`) stay
//! canonical; `Error` is a thin transparent wrapper for embedders that
//! want one type. Each error classifies its `Transience` and `Effect` so
//! a UI can decide between "fix your input" and "try again".

use thiserror::Error;

use crate::config::ConfigError;
use crate::core::CoreError;
use crate::session::SessionError;

/// Whether the same operation could succeed if repeated.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Transience {
    /// The inputs or the production state rule this out; retrying is
    /// pointless.
    Permanent,
    /// A retry may land (server hiccup, dropped connection). The engine
    /// never retries on its own; the user re-edits.
    Retryable,
    /// Cannot tell from here.
    Unknown,
}

impl Transience {
    pub fn is_retryable(self) -> bool {
        matches!(self, Transience::Retryable)
    }
}

/// How much state may already have changed when the error surfaced.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Effect {
    /// Nothing changed, locally or server-side.
    None,
    /// Something changed for sure.
    Some,
    /// The request may or may not have landed (a failed persist, for
    /// instance, can still have been applied server-side).
    Unknown,
}

impl Effect {
    pub fn as_str(self) -> &'static str {
        match self {
            Effect::None => "none",
            Effect::Some => "some",
            Effect::Unknown => "unknown",
        }
    }
}

#[derive(Error, Debug)]
#[non_exhaustive]
pub enum Error {
    #[error(transparent)]
    Core(#[from] CoreError),

    #[error(transparent)]
    Session(#[from] SessionError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl Error {
    pub fn transience(&self) -> Transience {
        match self {
            Error::Core(e) => e.transience(),
            Error::Session(e) => e.transience(),
            Error::Config(_) => Transience::Permanent,
        }
    }

    pub fn effect(&self) -> Effect {
        match self {
            Error::Core(e) => e.effect(),
            Error::Session(e) => e.effect(),
            Error::Config(_) => Effect::None,
        }
    }
}
