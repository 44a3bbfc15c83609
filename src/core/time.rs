//! Time primitives for answer ordering.
//!
//! `WriteStamp` orders writes to one slot; `Stamp` adds attribution
//! (`lastWriter`) and a deterministic tiebreak. The `Clock` stamps local
//! optimistic edits so they always sort ahead of everything the session
//! has already observed from the channel.

use std::cmp::Ordering;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use super::identity::ActorId;

/// Write timestamp: (wall_ms, counter).
///
/// The counter disambiguates writes landing in the same millisecond.
/// !Copy intentional - forces explicit .clone() to think about ordering.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WriteStamp {
    pub wall_ms: u64,
    pub counter: u32,
}

impl WriteStamp {
    pub fn new(wall_ms: u64, counter: u32) -> Self {
        Self { wall_ms, counter }
    }
}

impl PartialOrd for WriteStamp {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for WriteStamp {
    fn cmp(&self, other: &Self) -> Ordering {
        self.wall_ms
            .cmp(&other.wall_ms)
            .then_with(|| self.counter.cmp(&other.counter))
    }
}

/// A write stamp plus who wrote it.
///
/// This is what the LWW register compares - the writer breaks ties so
/// every replica orders concurrent writes the same way - and it doubles
/// as the stored (lastUpdatedAt, lastWriter) pair of an answer slot.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stamp {
    pub at: WriteStamp,
    pub by: ActorId,
}

impl Stamp {
    pub fn new(at: WriteStamp, by: ActorId) -> Self {
        Self { at, by }
    }
}

impl PartialOrd for Stamp {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Stamp {
    fn cmp(&self, other: &Self) -> Ordering {
        self.at
            .cmp(&other.at)
            .then_with(|| self.by.cmp(&other.by))
    }
}

/// Monotonic stamper for local edits.
///
/// Combines wall clock time with a logical counter so stamps keep
/// increasing even when the wall clock stalls or jumps backward.
pub struct Clock {
    /// Last known wall time in milliseconds.
    wall_ms: u64,
    /// Logical counter for tie-breaking within same wall time.
    counter: u32,
}

impl Clock {
    pub fn new() -> Self {
        Self {
            wall_ms: Self::now_ms(),
            counter: 0,
        }
    }

    /// Generate a new WriteStamp, advancing the clock.
    ///
    /// The returned stamp is strictly greater than any previous stamp from
    /// this clock, and greater than any remote stamp fed to [`Clock::receive`].
    pub fn tick(&mut self) -> WriteStamp {
        let now = Self::now_ms();

        if now > self.wall_ms {
            self.wall_ms = now;
            self.counter = 0;
        } else {
            // Same millisecond or clock went backward - increment counter.
            self.counter += 1;
        }

        WriteStamp::new(self.wall_ms, self.counter)
    }

    /// Fold in a remote stamp so the next tick() produces a stamp > remote.
    ///
    /// Call this for every stamp observed on the inbound channel.
    pub fn receive(&mut self, remote: &WriteStamp) {
        if remote.wall_ms > self.wall_ms {
            self.wall_ms = remote.wall_ms;
            self.counter = remote.counter;
        } else if remote.wall_ms == self.wall_ms && remote.counter > self.counter {
            self.counter = remote.counter;
        }

        let now = Self::now_ms();
        if now > self.wall_ms {
            self.wall_ms = now;
            self.counter = 0;
        }
    }

    fn now_ms() -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as u64
    }
}

impl Default for Clock {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tick_is_monotonic() {
        let mut clock = Clock::new();
        let s1 = clock.tick();
        let s2 = clock.tick();
        let s3 = clock.tick();

        assert!(s2 > s1);
        assert!(s3 > s2);
    }

    #[test]
    fn receive_advances_clock_past_remote() {
        let mut clock = Clock::new();
        let local = clock.tick();

        let remote = WriteStamp::new(local.wall_ms + 10_000, 5);
        clock.receive(&remote);

        let after = clock.tick();
        assert!(after > remote);
    }

    #[test]
    fn receive_with_older_stamp_is_noop() {
        let mut clock = Clock::new();
        let s1 = clock.tick();
        let s2 = clock.tick();

        clock.receive(&WriteStamp::new(s1.wall_ms, s1.counter));

        let s3 = clock.tick();
        assert!(s3 > s2);
    }

    #[test]
    fn stamp_tiebreak_is_by_writer() {
        let at = WriteStamp::new(100, 0);
        let a = Stamp::new(at.clone(), ActorId::new("ana").unwrap());
        let b = Stamp::new(at, ActorId::new("bruno").unwrap());
        assert!(a < b);
    }
}
