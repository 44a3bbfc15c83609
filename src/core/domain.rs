//! Production lifecycle and metadata.

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use super::time::Stamp;

/// Lifecycle of one production. The transition out of `InProcess` is
/// one-way: every mutation path refuses afterwards and there is no path
/// back.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleState {
    InProcess,
    Finished,
    Cancelled,
}

impl LifecycleState {
    /// Monotonic transition rule: only InProcess -> Finished/Cancelled.
    pub fn can_transition_to(self, next: LifecycleState) -> bool {
        self == LifecycleState::InProcess && next != LifecycleState::InProcess
    }

    pub fn is_closed(self) -> bool {
        self != LifecycleState::InProcess
    }
}

impl Default for LifecycleState {
    fn default() -> Self {
        LifecycleState::InProcess
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            LifecycleState::InProcess => "in_process",
            LifecycleState::Finished => "finished",
            LifecycleState::Cancelled => "cancelled",
        };
        write!(f, "{s}")
    }
}

/// Three-way patch for nullable fields: keep, clear, set.
///
/// On the wire an absent field means keep, an explicit null means clear.
#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub enum Patch<T> {
    #[default]
    Keep,
    Clear,
    Set(T),
}

impl<T> Patch<T> {
    pub fn is_keep(&self) -> bool {
        matches!(self, Patch::Keep)
    }

    /// Resolve this patch against the current value.
    pub fn apply(&self, existing: Option<T>) -> Option<T>
    where
        T: Clone,
    {
        match self {
            Patch::Keep => existing,
            Patch::Clear => None,
            Patch::Set(value) => Some(value.clone()),
        }
    }
}

impl<T: Serialize> Serialize for Patch<T> {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match self {
            Patch::Keep => serializer.serialize_none(),
            Patch::Clear => serializer.serialize_none(),
            Patch::Set(value) => value.serialize(serializer),
        }
    }
}

impl<'de, T: Deserialize<'de>> Deserialize<'de> for Patch<T> {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(match Option::<T>::deserialize(deserializer)? {
            None => Patch::Clear,
            Some(value) => Patch::Set(value),
        })
    }
}

/// Partial metadata update. Absent fields keep their current value.
#[derive(Clone, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct MetadataPatch {
    #[serde(default, skip_serializing_if = "Patch::is_keep")]
    pub lot: Patch<String>,
    #[serde(default, skip_serializing_if = "Patch::is_keep")]
    pub manager: Patch<String>,
    #[serde(default, skip_serializing_if = "Patch::is_keep")]
    pub observations: Patch<String>,
}

impl MetadataPatch {
    pub fn is_empty(&self) -> bool {
        self.lot.is_keep() && self.manager.is_keep() && self.observations.is_keep()
    }

    /// Overlay `other` on top of this patch (used when a metadata save is
    /// queued behind an in-flight one).
    pub fn overlay(&mut self, other: MetadataPatch) {
        if !other.lot.is_keep() {
            self.lot = other.lot;
        }
        if !other.manager.is_keep() {
            self.manager = other.manager;
        }
        if !other.observations.is_keep() {
            self.observations = other.observations;
        }
    }
}

/// Production metadata with its last write stamp.
#[derive(Clone, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ProductionMetadata {
    pub lot: Option<String>,
    pub manager: Option<String>,
    pub observations: Option<String>,
    pub updated: Option<Stamp>,
}

impl ProductionMetadata {
    /// Merge only the provided fields. Returns false if nothing changed.
    pub fn merge(&mut self, patch: &MetadataPatch, stamp: Stamp) -> bool {
        let next = ProductionMetadata {
            lot: patch.lot.apply(self.lot.clone()),
            manager: patch.manager.apply(self.manager.clone()),
            observations: patch.observations.apply(self.observations.clone()),
            updated: self.updated.clone(),
        };
        if next.lot == self.lot
            && next.manager == self.manager
            && next.observations == self.observations
        {
            return false;
        }
        *self = ProductionMetadata {
            updated: Some(stamp),
            ..next
        };
        true
    }
}
