//! The merge primitive for answer slots.

use serde::{Deserialize, Serialize};

use super::time::Stamp;

/// A type with a deterministic, order-insensitive merge.
///
/// Properties:
/// - Commutative: join(a, b) == join(b, a)
/// - Associative: join(join(a, b), c) == join(a, join(b, c))
/// - Idempotent: join(a, a) == a
pub trait Crdt: Sized {
    /// Merge two states into a new state that includes information from both.
    fn join(&self, other: &Self) -> Self;
}

/// Last-Writer-Wins register.
///
/// One per answer slot: the value plus its (lastUpdatedAt, lastWriter)
/// stamp. Higher stamp wins; deterministic because the stamp includes
/// the writer for tiebreak.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Lww<T> {
    pub value: T,
    pub stamp: Stamp,
}

impl<T> Lww<T> {
    pub fn new(value: T, stamp: Stamp) -> Self {
        Self { value, stamp }
    }
}

impl<T: Clone> Crdt for Lww<T> {
    fn join(&self, other: &Self) -> Self {
        if self.stamp >= other.stamp {
            self.clone()
        } else {
            other.clone()
        }
    }
}

impl<T: PartialEq> PartialEq for Lww<T> {
    fn eq(&self, other: &Self) -> bool {
        self.value == other.value && self.stamp == other.stamp
    }
}

impl<T: Eq> Eq for Lww<T> {}

#[cfg(test)]
pub mod laws {
    use super::*;
    use std::fmt::Debug;

    /// verify merge laws: associativity, commutativity, idempotence.
    pub fn check_crdt_laws<T: Crdt + PartialEq + Clone + Debug>(a: T, b: T, c: T) {
        assert_eq!(a.join(&a), a, "idempotence failed for {a:?}");

        assert_eq!(
            a.join(&b),
            b.join(&a),
            "commutativity failed for {a:?} and {b:?}"
        );

        assert_eq!(
            a.join(&b).join(&c),
            a.join(&b.join(&c)),
            "associativity failed for {a:?}, {b:?}, {c:?}"
        );
    }
}
