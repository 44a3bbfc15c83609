//! Inbound channel message envelope.
//!
//! The realtime channel delivers JSON frames, ordered per connection but
//! not globally. Shapes are a closed tagged union validated here at the
//! boundary; anything malformed or unknown becomes a decode error the
//! applier counts and drops - never a panic, never a torn-down channel.

use serde::{Deserialize, Serialize};

use super::domain::{LifecycleState, MetadataPatch};
use super::error::CoreError;
use super::identity::{ActorId, ColumnId, FieldId, RowId, TableId};
use super::time::WriteStamp;
use super::value::AnswerValue;

/// Wire stamp encoded as [wall_ms, counter].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireStamp(pub u64, pub u32);

impl From<WireStamp> for WriteStamp {
    fn from(stamp: WireStamp) -> Self {
        WriteStamp::new(stamp.0, stamp.1)
    }
}

impl From<&WriteStamp> for WireStamp {
    fn from(stamp: &WriteStamp) -> Self {
        Self(stamp.wall_ms, stamp.counter)
    }
}

/// One message from the realtime channel.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InboundMessage {
    FieldUpdated {
        field_id: FieldId,
        value: AnswerValue,
        at: WireStamp,
        author: ActorId,
    },
    CellUpdated {
        table_id: TableId,
        row_id: RowId,
        column_id: ColumnId,
        value: AnswerValue,
        at: WireStamp,
        author: ActorId,
    },
    LifecycleChanged {
        state: LifecycleState,
        at: WireStamp,
        author: ActorId,
    },
    MetadataChanged {
        patch: MetadataPatch,
        at: WireStamp,
        author: ActorId,
    },
}

impl InboundMessage {
    /// Stamp carried by the message, for feeding the local clock.
    pub fn at(&self) -> WireStamp {
        match self {
            InboundMessage::FieldUpdated { at, .. }
            | InboundMessage::CellUpdated { at, .. }
            | InboundMessage::LifecycleChanged { at, .. }
            | InboundMessage::MetadataChanged { at, .. } => *at,
        }
    }
}

/// Decode one channel frame.
pub fn decode(bytes: &[u8]) -> Result<InboundMessage, CoreError> {
    serde_json::from_slice(bytes).map_err(|e| CoreError::ChannelDecode {
        reason: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::domain::Patch;

    #[test]
    fn decodes_field_update() {
        let frame = br#"{
            "type": "field_updated",
            "field_id": "f1",
            "value": {"kind": "number", "value": 7.5},
            "at": [1000, 2],
            "author": "ana@example.com"
        }"#;
        let msg = decode(frame).unwrap();
        assert_eq!(
            msg,
            InboundMessage::FieldUpdated {
                field_id: FieldId::new("f1").unwrap(),
                value: AnswerValue::Number(7.5),
                at: WireStamp(1000, 2),
                author: ActorId::new("ana@example.com").unwrap(),
            }
        );
    }

    #[test]
    fn decodes_cell_and_lifecycle_and_metadata() {
        let cell = br#"{
            "type": "cell_updated",
            "table_id": "t1", "row_id": "r1", "column_id": "c2",
            "value": {"kind": "text", "value": "ok"},
            "at": [5, 0],
            "author": "ana"
        }"#;
        assert!(matches!(
            decode(cell).unwrap(),
            InboundMessage::CellUpdated { .. }
        ));

        let lifecycle = br#"{
            "type": "lifecycle_changed",
            "state": "finished",
            "at": [6, 0],
            "author": "ana"
        }"#;
        assert!(matches!(
            decode(lifecycle).unwrap(),
            InboundMessage::LifecycleChanged {
                state: LifecycleState::Finished,
                ..
            }
        ));

        let metadata = br#"{
            "type": "metadata_changed",
            "patch": {"lot": "L-7", "manager": null},
            "at": [7, 0],
            "author": "ana"
        }"#;
        let InboundMessage::MetadataChanged { patch, .. } = decode(metadata).unwrap() else {
            panic!("expected metadata message");
        };
        assert_eq!(patch.lot, Patch::Set("L-7".into()));
        assert_eq!(patch.manager, Patch::Clear);
        assert!(patch.observations.is_keep());
    }

    #[test]
    fn unknown_tag_is_a_decode_error() {
        let frame = br#"{"type": "poked", "field_id": "f1"}"#;
        assert!(matches!(
            decode(frame),
            Err(CoreError::ChannelDecode { .. })
        ));
    }

    #[test]
    fn garbage_is_a_decode_error() {
        assert!(decode(b"not json at all").is_err());
        assert!(decode(br#"{"type": "field_updated"}"#).is_err());
    }
}
