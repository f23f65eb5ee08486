//! Tunable parameters for the probe scheduler and ban/ignore policy.

use serde::{Deserialize, Serialize};

/// Scheduling and reputation thresholds. Defaults follow the long-standing
/// conventions of Bitcoin/Litecoin-family DNS seeders: a fixed ban window
/// and the well-established "is this peer good" gating constants; see
/// `DESIGN.md` for the open questions these resolve.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct DbConfig {
    /// Minimum protocol version a peer must report to ever be considered good.
    pub required_version: i64,
    /// Minimum reported block height, overridable via `--minheight`.
    pub min_height: i32,

    /// Base backoff after a single failure, in seconds.
    pub retry_interval: i64,
    /// Cap on the exponential backoff after repeated failures.
    pub max_retry: i64,
    /// Recheck interval after a successful probe.
    pub success_interval: i64,
    /// Consecutive failures (with no success ever) before a peer is
    /// dropped into the ignore state rather than retried.
    pub max_consecutive_failures: u32,
    /// How long a peer stays ignored once it crosses that threshold.
    pub ignore_window: i64,

    /// How long a protocol-violation ban lasts. Default matches the
    /// `BAN_WINDOW` constant used by comparable peer-store implementations
    /// in this codebase family.
    pub ban_duration: i64,

    /// How long a dequeued-but-unreturned peer may stay in-flight before
    /// the watchdog returns it to the due queue.
    pub in_flight_timeout: i64,

    /// Jitter fraction applied to computed due-times, to avoid thundering
    /// herds of simultaneously-due peers.
    pub jitter_fraction: f64,
}

impl Default for DbConfig {
    fn default() -> Self {
        DbConfig {
            required_version: 70001,
            min_height: 0,
            retry_interval: 600,
            max_retry: 86_400,
            success_interval: 1_800,
            max_consecutive_failures: 10,
            ignore_window: 10_800,
            ban_duration: 10_800,
            in_flight_timeout: 120,
            jitter_fraction: 0.1,
        }
    }
}
