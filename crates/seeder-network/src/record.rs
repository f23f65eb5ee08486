//! A single known peer's bookkeeping: identity, handshake metadata, and the
//! five windowed uptime estimators that decide whether it's "good".

use serde::{Deserialize, Serialize};

use seeder_chain::{Endpoint, ServiceFlags};

/// One exponentially-decayed reliability window.
///
/// `reliability` and `count` both decay by the same factor
/// `f = exp(-dt/tau)` on every update: `reliability` tracks the weighted
/// average outcome, `count` tracks decayed evidence volume so a peer that
/// was probed many times long ago doesn't stay "good" forever on stale
/// samples.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct WindowStat {
    /// The window's time constant, in seconds (`tau`).
    pub weight: f64,
    pub count: f64,
    pub reliability: f64,
}

impl WindowStat {
    pub fn new(weight_seconds: f64) -> Self {
        WindowStat {
            weight: weight_seconds,
            count: 0.0,
            reliability: 0.0,
        }
    }

    /// Applies one probe outcome, `dt` seconds after the previous update.
    pub fn update(&mut self, good: bool, dt: f64) {
        let dt = dt.max(0.0);
        let f = (-dt / self.weight).exp();
        self.reliability = self.reliability * f + if good { 1.0 - f } else { 0.0 };
        self.count = self.count * f + 1.0;
    }

    pub fn is_good(&self, min_count: f64, min_reliability: f64) -> bool {
        self.count >= min_count && self.reliability >= min_reliability
    }
}

/// The five uptime windows tracked per peer, in the order the human dump
/// file reports them: 2h, 8h, 1d, 7d, 30d.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct WindowStats {
    pub hours_2: WindowStat,
    pub hours_8: WindowStat,
    pub days_1: WindowStat,
    pub days_7: WindowStat,
    pub days_30: WindowStat,
}

impl Default for WindowStats {
    fn default() -> Self {
        WindowStats {
            hours_2: WindowStat::new(2.0 * 3600.0),
            hours_8: WindowStat::new(8.0 * 3600.0),
            days_1: WindowStat::new(24.0 * 3600.0),
            days_7: WindowStat::new(7.0 * 24.0 * 3600.0),
            days_30: WindowStat::new(30.0 * 24.0 * 3600.0),
        }
    }
}

impl WindowStats {
    pub fn update_all(&mut self, good: bool, dt: f64) {
        self.hours_2.update(good, dt);
        self.hours_8.update(good, dt);
        self.days_1.update(good, dt);
        self.days_7.update(good, dt);
        self.days_30.update(good, dt);
    }

    /// Five uptime percentages in window order, for the human dump file.
    pub fn uptimes(&self) -> [f64; 5] {
        [
            self.hours_2.reliability,
            self.hours_8.reliability,
            self.days_1.reliability,
            self.days_7.reliability,
            self.days_30.reliability,
        ]
    }

    /// Good-for-at-least-one-window gate, thresholds taken from the
    /// well-known bitcoin-seeder `IsGood()` check: short windows require
    /// high reliability from very little evidence, long windows tolerate
    /// more noise but demand much more evidence. The 2h window's minimum
    /// sample count is 1, not 2: `count` can never exceed the number of
    /// probes ever made (spec §8 scenario 1 requires a single successful
    /// probe to be enough to make a peer selectable).
    pub fn is_good(&self) -> bool {
        self.hours_2.is_good(1.0, 0.85)
            || self.hours_8.is_good(4.0, 0.70)
            || self.days_1.is_good(8.0, 0.55)
            || self.days_7.is_good(16.0, 0.45)
            || self.days_30.is_good(32.0, 0.35)
    }
}

/// The outcome of our most recent communication attempt with a peer.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub enum ConnectionState {
    /// Never probed: due immediately.
    NeverAttempted,
    /// Dequeued for probing, no result yet.
    AttemptPending,
    /// Most recent probe succeeded.
    Responded,
    /// Most recent probe failed (network error or ban).
    Failed,
}

/// Everything the database tracks about one known endpoint.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PeerRecord {
    pub endpoint: Endpoint,
    pub services: ServiceFlags,
    pub client_version: i64,
    pub client_subversion: String,
    pub blocks: i32,

    pub last_try: i64,
    pub our_last_try: i64,
    pub our_last_success: i64,
    pub ignore_till: i64,

    pub total: u64,
    pub success: u64,
    pub consecutive_failures: u32,

    pub stats: WindowStats,
    pub state: ConnectionState,
}

impl PeerRecord {
    pub fn new(endpoint: Endpoint) -> Self {
        PeerRecord {
            endpoint,
            services: ServiceFlags::empty(),
            client_version: 0,
            client_subversion: String::new(),
            blocks: 0,
            last_try: 0,
            our_last_try: 0,
            our_last_success: 0,
            ignore_till: 0,
            total: 0,
            success: 0,
            consecutive_failures: 0,
            stats: WindowStats::default(),
            state: ConnectionState::NeverAttempted,
        }
    }

    pub fn is_ignored(&self, now: i64) -> bool {
        self.ignore_till > now
    }

    /// A peer is good iff it meets the version/height floor and at least
    /// one uptime window clears its threshold.
    pub fn is_good(&self, required_version: i64, min_height: i32) -> bool {
        self.client_version >= required_version
            && self.blocks >= min_height
            && self.stats.is_good()
    }
}
