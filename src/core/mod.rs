//! Pure, deterministic state layer. No I/O, no channels, no clocks other
//! than the explicit [`Clock`] value the session feeds.
//!
//! Layering (leaves first):
//! - `identity`: id atoms (fields, tables, cells, productions, actors)
//! - `time`: write stamps and the monotonic local clock
//! - `value`: the typed answer union and the "answered" rule
//! - `crdt`: LWW register used for every per-key answer slot
//! - `structure`: immutable production schema, validated on construction
//! - `domain`: lifecycle states, metadata, three-way patches
//! - `answers`: the mutable per-production answer store
//! - `progress`: derived completion metrics
//! - `locate`: id -> structural location lookup
//! - `wire`: inbound channel message envelope
//! - `apply`: inbound message application under local-priority LWW

pub mod answers;
pub mod apply;
pub mod crdt;
pub mod domain;
pub mod error;
pub mod identity;
pub mod locate;
pub mod progress;
pub mod structure;
pub mod time;
pub mod value;
pub mod wire;

pub use answers::{AnswerSnapshot, AnswerStore};
pub use apply::{apply_message, ApplyMetrics, ApplyOutcome, DeferredUpdate};
pub use crdt::{Crdt, Lww};
pub use domain::{LifecycleState, MetadataPatch, Patch, ProductionMetadata};
pub use error::{CoreError, InvalidId};
pub use identity::{ActorId, CellKey, ColumnId, EditKey, FieldId, ProductionCode, RowId, TableId};
pub use locate::{locate, ItemKind, ItemLocation, ItemRef};
pub use progress::{progress, Progress};
pub use structure::{FieldDef, FieldGroup, FieldKind, Section, Structure, TableDef};
pub use time::{Clock, Stamp, WriteStamp};
pub use value::AnswerValue;
pub use wire::{decode, InboundMessage, WireStamp};
