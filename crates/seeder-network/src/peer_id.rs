//! Stable small-integer peer identifiers.
//!
//! The scheduler's queues, the in-flight set, and the ignore/ban
//! bookkeeping all reference peers by [`PeerId`] rather than by owning a
//! `PeerRecord` or an `Endpoint` directly — an arena-plus-stable-id pattern
//! that avoids a queue-holds-an-owning-handle cycle.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A small integer assigned to an endpoint the first time it's inserted
/// into the database. Ids are never reused, even after a peer is banned:
/// the counter in [`crate::db::ReputationDb`] only ever increases.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PeerId(pub u64);

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Monotonic allocator for [`PeerId`]s.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct PeerIdAllocator {
    next: u64,
}

impl PeerIdAllocator {
    pub fn new() -> Self {
        Self { next: 0 }
    }

    pub fn allocate(&mut self) -> PeerId {
        let id = PeerId(self.next);
        self.next += 1;
        id
    }

    /// Restores the allocator to continue after `highest`, used when
    /// reloading a snapshot so ids stay globally unique across restarts.
    pub fn restore(highest_seen: Option<PeerId>) -> Self {
        Self {
            next: highest_seen.map(|id| id.0 + 1).unwrap_or(0),
        }
    }
}
