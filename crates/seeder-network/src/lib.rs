//! The reputation database: the shared mutable state behind the
//! peer-discovery seeder. Crawler, DNS, and dumper workers all read and
//! write through [`ReputationDb`]'s methods rather than touching a peer's
//! bookkeeping directly.

pub mod ban;
pub mod clock;
pub mod config;
pub mod db;
pub mod peer_id;
pub mod prober;
pub mod queue;
pub mod record;
pub mod snapshot;

pub use ban::BanMap;
pub use clock::{Clock, FakeClock, SystemClock};
pub use config::DbConfig;
pub use db::{AddrReport, NetFilter, ReputationDb, Stats};
pub use peer_id::{PeerId, PeerIdAllocator};
pub use prober::{BanReason, Prober, ProbeResult, TcpProber, TcpProberConfig};
pub use queue::{next_due_time, Scheduler};
pub use record::{ConnectionState, PeerRecord, WindowStat, WindowStats};
pub use snapshot::{DbSnapshot, SnapshotError, SNAPSHOT_VERSION};
