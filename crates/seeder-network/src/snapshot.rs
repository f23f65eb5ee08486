//! The on-disk snapshot format for the reputation database.
//!
//! Versioned so a future format change can still read older files; bumping
//! `SNAPSHOT_VERSION` without a migration path is a breaking change and
//! should be called out in release notes.

use serde::{Deserialize, Serialize};

use crate::ban::BanMap;
use crate::peer_id::{PeerId, PeerIdAllocator};
use crate::record::PeerRecord;

pub const SNAPSHOT_VERSION: u32 = 1;

#[derive(Serialize, Deserialize)]
pub struct DbSnapshot {
    pub version: u32,
    pub allocator: PeerIdAllocator,
    pub records: Vec<(PeerId, PeerRecord)>,
    pub bans: BanMap,
}

#[derive(Debug, thiserror::Error)]
pub enum SnapshotError {
    #[error("snapshot io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("snapshot encode/decode error: {0}")]
    Codec(#[from] bincode::Error),
    #[error("snapshot version {found} is newer than supported version {supported}")]
    UnsupportedVersion { found: u32, supported: u32 },
}

impl DbSnapshot {
    pub fn encode(&self) -> Result<Vec<u8>, SnapshotError> {
        Ok(bincode::serialize(self)?)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, SnapshotError> {
        let snapshot: DbSnapshot = bincode::deserialize(bytes)?;
        if snapshot.version > SNAPSHOT_VERSION {
            return Err(SnapshotError::UnsupportedVersion {
                found: snapshot.version,
                supported: SNAPSHOT_VERSION,
            });
        }
        Ok(snapshot)
    }
}
