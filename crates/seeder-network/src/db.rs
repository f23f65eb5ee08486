//! The reputation database: the authoritative store of every known peer,
//! the probe scheduler, and the source of the "currently good" address set.

use std::collections::HashMap;

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use tracing::{debug, info, trace, warn};

use seeder_chain::{AddrEntry, Endpoint, Network, ServiceFlags};

use crate::ban::BanMap;
use crate::clock::{Clock, SystemClock};
use crate::config::DbConfig;
use crate::peer_id::{PeerId, PeerIdAllocator};
use crate::prober::ProbeResult;
use crate::queue::{next_due_time, Scheduler};
use crate::record::{ConnectionState, PeerRecord};
use crate::snapshot::{DbSnapshot, SnapshotError, SNAPSHOT_VERSION};

/// Which network families a [`ReputationDb::get_ips`] caller will accept.
#[derive(Copy, Clone, Debug, Default)]
pub struct NetFilter {
    pub ipv4: bool,
    pub ipv6: bool,
    pub onion: bool,
}

impl NetFilter {
    pub fn allows(&self, network: Network) -> bool {
        match network {
            Network::Ipv4 => self.ipv4,
            Network::Ipv6 => self.ipv6,
            Network::Onion => self.onion,
        }
    }
}

/// Aggregate counts for the stats worker.
#[derive(Clone, Copy, Debug, Default)]
pub struct Stats {
    pub total: usize,
    pub good: usize,
    pub new: usize,
    pub tracked: usize,
    pub banned: usize,
    pub oldest_in_flight_age: i64,
}

/// One row of the human-readable dump file.
#[derive(Clone, Debug)]
pub struct AddrReport {
    pub endpoint: Endpoint,
    pub good: bool,
    pub last_success: i64,
    /// 2h, 8h, 1d, 7d, 30d reliability, in that order.
    pub uptimes: [f64; 5],
    pub blocks: i32,
    pub services: u64,
    pub client_version: i64,
    pub client_subversion: String,
}

/// The stateful heart of the seeder: every endpoint ever seen, the probe
/// scheduler's queues, the ban map, and the config that drives all of the
/// above. All mutation goes through `&mut self` methods, so a single lock
/// guards every mutation — callers wrap this in `Arc<Mutex<ReputationDb>>`.
pub struct ReputationDb {
    config: DbConfig,
    clock: Box<dyn Clock>,
    rng: StdRng,

    allocator: PeerIdAllocator,
    records: HashMap<PeerId, PeerRecord>,
    endpoints: HashMap<Endpoint, PeerId>,
    scheduler: Scheduler,
    bans: BanMap,
    /// Peers currently in the ignore state: excluded from
    /// scheduling until `ignore_till` passes, at which point
    /// `revive_ignored` moves them back onto the tracked queue.
    ignored: Vec<PeerId>,
}

impl ReputationDb {
    pub fn new(config: DbConfig) -> Self {
        Self::with_clock(config, Box::new(SystemClock))
    }

    pub fn with_clock(config: DbConfig, clock: Box<dyn Clock>) -> Self {
        ReputationDb {
            config,
            clock,
            rng: StdRng::from_entropy(),
            allocator: PeerIdAllocator::new(),
            records: HashMap::new(),
            endpoints: HashMap::new(),
            scheduler: Scheduler::new(),
            bans: BanMap::new(),
            ignored: Vec::new(),
        }
    }

    fn now(&self) -> i64 {
        self.clock.now()
    }

    /// Inserts an unknown endpoint in the "new" state, enqueuing it for
    /// probing. Idempotent on already-known endpoints; `force` clears the
    /// ignore state on a currently-ignored peer instead of no-op'ing.
    /// Silently drops endpoints still under an active ban.
    pub fn add(&mut self, endpoint: Endpoint, force: bool) {
        self.add_with_services(endpoint, force, ServiceFlags::empty())
    }

    fn add_with_services(&mut self, endpoint: Endpoint, force: bool, hinted_services: ServiceFlags) {
        let now = self.now();
        if self.bans.is_banned(&endpoint, now) {
            trace!(%endpoint, "ignoring Add for banned endpoint");
            return;
        }

        if let Some(&id) = self.endpoints.get(&endpoint) {
            if force {
                if let Some(record) = self.records.get_mut(&id) {
                    if record.is_ignored(now) {
                        record.ignore_till = 0;
                        self.ignored.retain(|&x| x != id);
                        self.scheduler.push_tracked(id, now);
                        debug!(%endpoint, "force-Add cleared ignore state");
                    }
                }
            }
            return;
        }

        let id = self.allocator.allocate();
        let mut record = PeerRecord::new(endpoint);
        record.services = hinted_services;
        self.records.insert(id, record);
        self.endpoints.insert(endpoint, id);
        self.scheduler.push_unknown(id);
        metrics::counter!("seeder_peers_added_total").increment(1);
    }

    /// Bulk form, reached from probe results (`getaddr` responses) and the
    /// seed-lookup worker.
    pub fn add_many(&mut self, entries: impl IntoIterator<Item = AddrEntry>) {
        for entry in entries {
            self.add_with_services(entry.endpoint, false, entry.services);
        }
    }

    /// Dequeues up to `max` peers due for probing, marking them in-flight.
    /// Returns fewer than `max` (possibly zero) if nothing is due yet,
    /// together with a suggested backoff in seconds.
    pub fn get_many(&mut self, max: usize) -> (Vec<(PeerId, Endpoint)>, Option<i64>) {
        let now = self.now();
        self.revive_ignored(now);
        self.scheduler.sweep_watchdog(now, &self.config);

        let (ids, wait) = self.scheduler.take_due(max, now);
        let out = ids
            .into_iter()
            .filter_map(|id| {
                let endpoint = self.records.get(&id)?.endpoint;
                Some((id, endpoint))
            })
            .collect();
        (out, wait)
    }

    fn revive_ignored(&mut self, now: i64) {
        let mut still_ignored = Vec::with_capacity(self.ignored.len());
        for id in std::mem::take(&mut self.ignored) {
            let expired = self
                .records
                .get(&id)
                .map(|r| r.ignore_till <= now)
                .unwrap_or(true);
            if expired {
                if let Some(record) = self.records.get_mut(&id) {
                    record.ignore_till = 0;
                }
                self.scheduler.push_tracked(id, now);
            } else {
                still_ignored.push(id);
            }
        }
        self.ignored = still_ignored;
    }

    /// Applies probe outcomes: updates counters, windowed statistics, and
    /// client metadata, and bans or ignores peers as their outcome
    /// dictates.
    pub fn result_many(&mut self, results: impl IntoIterator<Item = (PeerId, ProbeResult)>) {
        let now = self.now();
        for (id, result) in results {
            self.apply_result(id, result, now);
        }
    }

    fn apply_result(&mut self, id: PeerId, result: ProbeResult, now: i64) {
        let Some(record) = self.records.get_mut(&id) else {
            warn!(peer = %id, "ResultMany for unknown peer id, dropping");
            self.scheduler.complete(id);
            return;
        };

        // A peer's first-ever probe has no prior observation to decay from,
        // so it gets full weight rather than whatever `now - last_try`
        // happens to compute against the `last_try = 0` sentinel (which
        // only yields a large, weight-swamping `dt` when the clock's epoch
        // is already far from zero).
        let dt = if record.total == 0 {
            f64::INFINITY
        } else {
            (now - record.last_try).max(0) as f64
        };
        record.total += 1;
        record.our_last_try = now;

        if result.good {
            record.success += 1;
            record.consecutive_failures = 0;
            record.our_last_success = now;
            record.services = result.services;
            record.client_version = result.client_version;
            record.client_subversion = result.client_subversion.clone();
            record.blocks = result.height;
        } else {
            record.consecutive_failures += 1;
        }
        record.stats.update_all(result.good, dt);
        record.last_try = now;

        self.scheduler.complete(id);

        if let Some(reason) = &result.ban_reason {
            let endpoint = record.endpoint;
            record.state = ConnectionState::Failed;
            let until = now + self.config.ban_duration;
            self.bans.ban(endpoint, until);
            warn!(%endpoint, %reason, "banning peer for protocol violation");
            metrics::counter!("seeder_peers_banned_total").increment(1);
            return;
        }

        if result.good {
            record.state = ConnectionState::Responded;
        } else {
            record.state = ConnectionState::Failed;
        }

        let never_succeeded = record.success == 0;
        let ignore_now = !result.good
            && never_succeeded
            && record.consecutive_failures >= self.config.max_consecutive_failures;

        if ignore_now {
            record.ignore_till = now + self.config.ignore_window;
            self.ignored.push(id);
            debug!(peer = %id, "peer dropped to ignore state after repeated failures");
        } else {
            let due = next_due_time(record, &self.config, &mut self.rng);
            self.scheduler.push_tracked(id, due);
        }
    }

    /// Returns up to `max_n` currently-good peers whose services satisfy
    /// `flag_filter` and whose network family is allowed, chosen uniformly
    /// at random from the eligible set.
    pub fn get_ips(&mut self, flag_filter: ServiceFlags, max_n: usize, nets: NetFilter) -> Vec<Endpoint> {
        let now = self.now();
        let mut eligible: Vec<Endpoint> = self
            .records
            .values()
            .filter(|record| {
                !self.bans.is_banned(&record.endpoint, now)
                    && nets.allows(record.endpoint.network())
                    && record.services.satisfies(flag_filter)
                    && record.is_good(self.config.required_version, self.config.min_height)
            })
            .map(|record| record.endpoint)
            .collect();

        eligible.shuffle(&mut self.rng);
        eligible.truncate(max_n);
        eligible
    }

    pub fn get_stats(&self) -> Stats {
        let now = self.now();
        let mut banned = 0usize;
        let mut good = 0usize;
        for record in self.records.values() {
            if self.bans.is_banned(&record.endpoint, now) {
                banned += 1;
            } else if record.is_good(self.config.required_version, self.config.min_height) {
                good += 1;
            }
        }
        Stats {
            total: self.records.len(),
            good,
            new: self.scheduler.unknown_len(),
            tracked: self.scheduler.in_flight_len(),
            banned,
            oldest_in_flight_age: self.scheduler.oldest_in_flight_age(now),
        }
    }

    /// Materializes a consistent snapshot of every non-banned peer, for the
    /// dumper's human report.
    pub fn get_all(&self) -> Vec<AddrReport> {
        let now = self.now();
        self.records
            .values()
            .filter(|r| !self.bans.is_banned(&r.endpoint, now))
            .map(|r| AddrReport {
                endpoint: r.endpoint,
                good: r.is_good(self.config.required_version, self.config.min_height),
                last_success: r.our_last_success,
                uptimes: r.stats.uptimes(),
                blocks: r.blocks,
                services: r.services.bits(),
                client_version: r.client_version,
                client_subversion: r.client_subversion.clone(),
            })
            .collect()
    }

    pub fn clear_bans(&mut self) {
        info!("wiping ban list");
        self.bans.clear();
    }

    /// Resets every peer's ignore state and returns ignored peers to the
    /// due queue immediately. Wired to `--wipeignore`, kept distinct from
    /// `--wipeban`; see `DESIGN.md` for why that separation matters.
    pub fn clear_ignores(&mut self) {
        info!("wiping ignore list");
        let now = self.now();
        for id in std::mem::take(&mut self.ignored) {
            if let Some(record) = self.records.get_mut(&id) {
                record.ignore_till = 0;
            }
            self.scheduler.push_tracked(id, now);
        }
    }

    pub fn snapshot(&self) -> DbSnapshot {
        DbSnapshot {
            version: SNAPSHOT_VERSION,
            allocator: PeerIdAllocator::restore(self.records.keys().copied().max()),
            records: self.records.iter().map(|(&id, r)| (id, r.clone())).collect(),
            bans: self.bans.clone(),
        }
    }

    /// Rebuilds the database from a snapshot, re-deriving the endpoint
    /// index and re-enqueuing every non-banned peer for probing.
    pub fn restore(config: DbConfig, clock: Box<dyn Clock>, snapshot: DbSnapshot) -> Self {
        let mut db = ReputationDb::with_clock(config, clock);
        db.allocator = snapshot.allocator;
        db.bans = snapshot.bans;
        let now = db.now();
        for (id, record) in snapshot.records {
            db.endpoints.insert(record.endpoint, id);
            if !db.bans.is_banned(&record.endpoint, now) {
                match record.state {
                    ConnectionState::NeverAttempted => db.scheduler.push_unknown(id),
                    _ => {
                        if record.is_ignored(now) {
                            db.ignored.push(id);
                        } else {
                            db.scheduler.push_tracked(id, now);
                        }
                    }
                }
            }
            db.records.insert(id, record);
        }
        db
    }

    pub fn load_snapshot_bytes(
        config: DbConfig,
        clock: Box<dyn Clock>,
        bytes: &[u8],
    ) -> Result<Self, SnapshotError> {
        let snapshot = DbSnapshot::decode(bytes)?;
        Ok(Self::restore(config, clock, snapshot))
    }

    pub fn config(&self) -> &DbConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FakeClock;
    use crate::prober::BanReason;
    use seeder_chain::Address;
    use std::net::Ipv4Addr;
    use std::sync::Arc;

    fn endpoint(n: u8) -> Endpoint {
        Endpoint::new(Address::V4(Ipv4Addr::new(10, 0, 0, n)), 9333)
    }

    fn db_with_clock(clock: Arc<FakeClock>) -> ReputationDb {
        ReputationDb::with_clock(DbConfig::default(), Box::new(ArcClock(clock)))
    }

    struct ArcClock(Arc<FakeClock>);
    impl Clock for ArcClock {
        fn now(&self) -> i64 {
            self.0.now()
        }
    }

    #[test]
    fn bootstrap_and_probe_makes_peer_selectable() {
        let clock = Arc::new(FakeClock::new(1_000));
        let mut db = db_with_clock(clock);
        db.add(endpoint(1), false);

        let (due, _) = db.get_many(16);
        assert_eq!(due.len(), 1);
        let (id, ep) = due[0];
        assert_eq!(ep, endpoint(1));

        let result = ProbeResult {
            good: true,
            client_version: 70016,
            client_subversion: "/test:1.0/".into(),
            services: ServiceFlags::NODE_NETWORK,
            height: 2_400_000,
            ban_reason: None,
            discovered_peers: vec![],
        };
        db.result_many(vec![(id, result)]);

        let ips = db.get_ips(
            ServiceFlags::NODE_NETWORK,
            10,
            NetFilter {
                ipv4: true,
                ipv6: false,
                onion: false,
            },
        );
        assert_eq!(ips, vec![endpoint(1)]);
    }

    #[test]
    fn ban_path_excludes_peer_until_expiry() {
        let clock = Arc::new(FakeClock::new(1_000));
        let mut db = db_with_clock(clock.clone());
        db.add(endpoint(2), false);
        let (due, _) = db.get_many(16);
        let (id, _) = due[0];

        db.result_many(vec![(
            id,
            ProbeResult {
                ban_reason: Some(BanReason::WrongMagic),
                ..Default::default()
            },
        )]);

        let ips = db.get_ips(
            ServiceFlags::empty(),
            10,
            NetFilter {
                ipv4: true,
                ipv6: true,
                onion: true,
            },
        );
        assert!(!ips.contains(&endpoint(2)));

        clock.advance(db.config().ban_duration + 1);
        db.add(endpoint(2), false);
        assert!(db.endpoints.contains_key(&endpoint(2)));
    }

    #[test]
    fn get_many_on_empty_queues_returns_zero_with_wait_hint() {
        let clock = Arc::new(FakeClock::new(1_000));
        let mut db = db_with_clock(clock);
        let (due, wait) = db.get_many(16);
        assert!(due.is_empty());
        assert!(wait.unwrap_or(0) >= 0);
    }

    #[test]
    fn snapshot_round_trips() {
        let clock = Arc::new(FakeClock::new(1_000));
        let mut db = db_with_clock(clock.clone());
        db.add(endpoint(3), false);
        db.add(endpoint(4), false);
        let snapshot = db.snapshot();
        let bytes = snapshot.encode().unwrap();

        let restored = ReputationDb::load_snapshot_bytes(
            DbConfig::default(),
            Box::new(ArcClock(clock)),
            &bytes,
        )
        .unwrap();
        assert_eq!(restored.get_all().len(), db.get_all().len());
    }

    #[test]
    fn repeated_failures_without_success_move_to_ignore() {
        let clock = Arc::new(FakeClock::new(1_000));
        let mut db = db_with_clock(clock.clone());
        db.add(endpoint(5), false);

        for _ in 0..db.config().max_consecutive_failures {
            let (due, _) = db.get_many(16);
            if due.is_empty() {
                clock.advance(db.config().max_retry + 10);
                continue;
            }
            let (id, _) = due[0];
            db.result_many(vec![(id, ProbeResult::default())]);
            clock.advance(1);
        }

        assert!(db.ignored.contains(&db.endpoints[&endpoint(5)]));
    }
}
