#![forbid(unsafe_code)]

pub mod config;
pub mod core;
pub mod error;
pub mod session;
pub mod telemetry;

pub use error::{Effect, Error, Transience};
pub type Result<T> = std::result::Result<T, Error>;

// Convenience re-exports; the canonical homes stay under core/session.
pub use crate::config::Config;
pub use crate::core::{
    apply_message, decode, locate, progress, ActorId, AnswerSnapshot, AnswerStore, AnswerValue,
    ApplyMetrics, ApplyOutcome, CellKey, Clock, ColumnId, CoreError, EditKey, FieldDef, FieldGroup,
    FieldId, FieldKind, InboundMessage, ItemKind, ItemLocation, ItemRef, LifecycleState, Lww,
    MetadataPatch, Patch, ProductionCode, ProductionMetadata, Progress, RowId, Section, Stamp,
    Structure, TableDef, TableId, WireStamp, WriteStamp,
};
pub use crate::session::{
    LoadError, PersistClient, PersistError, Session, SessionConfig, SessionError, SnapshotLoader,
    StateSink, StructureLoader,
};
