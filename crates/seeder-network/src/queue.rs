//! The two-queue probe scheduler: an unknown-peer FIFO and a tracked-peer
//! due-time heap, plus the in-flight set and its watchdog.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap, VecDeque};

use rand::Rng;

use crate::config::DbConfig;
use crate::peer_id::PeerId;
use crate::record::{ConnectionState, PeerRecord};

/// Computes when a peer is next due for a probe:
/// never probed -> immediately; last failure -> exponential backoff capped
/// at `max_retry`; last success -> a fixed recheck interval. A small random
/// jitter is added so synchronized cohorts of peers don't all come due in
/// the same instant.
pub fn next_due_time(record: &PeerRecord, config: &DbConfig, rng: &mut impl Rng) -> i64 {
    let base = match record.state {
        ConnectionState::NeverAttempted => return record.last_try,
        ConnectionState::Responded => record.last_try + config.success_interval,
        ConnectionState::Failed | ConnectionState::AttemptPending => {
            let backoff = config
                .retry_interval
                .saturating_mul(1i64 << record.consecutive_failures.min(20));
            record.last_try + backoff.min(config.max_retry)
        }
    };
    let jitter_span = (base.saturating_sub(record.last_try) as f64 * config.jitter_fraction) as i64;
    if jitter_span > 0 {
        base + rng.gen_range(0..=jitter_span)
    } else {
        base
    }
}

/// Tracks which peers are due for probing and which are currently
/// in-flight. Owns no peer data itself — callers look up a `PeerId` in the
/// database's record map.
#[derive(Debug, Default)]
pub struct Scheduler {
    /// Peers that have never been probed: always due, served FIFO.
    unknown: VecDeque<PeerId>,
    /// Peers that have been probed at least once, ordered by due time.
    tracked: BinaryHeap<Reverse<(i64, PeerId)>>,
    /// Peers handed out by `take_due` but not yet returned via `complete`,
    /// mapped to the time they were dispatched (for the watchdog).
    in_flight: HashMap<PeerId, i64>,
}

impl Scheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_unknown(&mut self, id: PeerId) {
        self.unknown.push_back(id);
    }

    pub fn push_tracked(&mut self, id: PeerId, due_at: i64) {
        self.tracked.push(Reverse((due_at, id)));
    }

    pub fn is_in_flight(&self, id: PeerId) -> bool {
        self.in_flight.contains_key(&id)
    }

    /// Removes `id` from every queue it might be sitting in (used when a
    /// peer is banned or force-refreshed out of the ignore state).
    pub fn remove(&mut self, id: PeerId) {
        self.unknown.retain(|&x| x != id);
        self.tracked = self
            .tracked
            .drain()
            .filter(|Reverse((_, x))| *x != id)
            .collect();
        self.in_flight.remove(&id);
    }

    /// Dequeues up to `max` peers whose due time has passed, preferring
    /// never-attempted peers first — a bias toward fast first contact with
    /// newly discovered endpoints. Returns the dequeued ids and, if fewer
    /// than `max` were available, a suggested backoff in seconds for the
    /// caller.
    pub fn take_due(&mut self, max: usize, now: i64) -> (Vec<PeerId>, Option<i64>) {
        let mut out = Vec::with_capacity(max);

        while out.len() < max {
            match self.unknown.pop_front() {
                Some(id) => {
                    self.in_flight.insert(id, now);
                    out.push(id);
                }
                None => break,
            }
        }

        while out.len() < max {
            match self.tracked.peek() {
                Some(Reverse((due, _))) if *due <= now => {
                    let Reverse((_, id)) = self.tracked.pop().unwrap();
                    self.in_flight.insert(id, now);
                    out.push(id);
                }
                _ => break,
            }
        }

        if out.len() < max {
            let wait = self
                .tracked
                .peek()
                .map(|Reverse((due, _))| (*due - now).max(1))
                .unwrap_or(5);
            (out, Some(wait))
        } else {
            (out, None)
        }
    }

    /// Marks a previously-dispatched peer's probe as complete, removing it
    /// from the in-flight set. The caller is responsible for re-enqueuing
    /// it via `push_tracked` with its new due time.
    pub fn complete(&mut self, id: PeerId) {
        self.in_flight.remove(&id);
    }

    /// Sweeps in-flight peers whose dispatch is older than
    /// `config.in_flight_timeout`, returning them to the tracked queue so a
    /// worker that crashed or hung doesn't strand them forever.
    pub fn sweep_watchdog(&mut self, now: i64, config: &DbConfig) -> Vec<PeerId> {
        let stale: Vec<PeerId> = self
            .in_flight
            .iter()
            .filter(|&(_, &dispatched)| now - dispatched > config.in_flight_timeout)
            .map(|(&id, _)| id)
            .collect();
        for &id in &stale {
            self.in_flight.remove(&id);
            self.tracked.push(Reverse((now, id)));
        }
        stale
    }

    pub fn oldest_in_flight_age(&self, now: i64) -> i64 {
        self.in_flight
            .values()
            .map(|&dispatched| now - dispatched)
            .max()
            .unwrap_or(0)
    }

    pub fn tracked_len(&self) -> usize {
        self.tracked.len()
    }

    pub fn unknown_len(&self) -> usize {
        self.unknown.len()
    }

    pub fn in_flight_len(&self) -> usize {
        self.in_flight.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use seeder_chain::{Address, Endpoint};
    use std::net::Ipv4Addr;

    fn endpoint(n: u8) -> Endpoint {
        Endpoint::new(Address::V4(Ipv4Addr::new(10, 0, 0, n)), 9333)
    }

    #[test]
    fn never_attempted_is_due_immediately() {
        let record = PeerRecord::new(endpoint(1));
        let config = DbConfig::default();
        let mut rng = rand::rngs::StdRng::seed_from_u64(0);
        assert_eq!(next_due_time(&record, &config, &mut rng), record.last_try);
    }

    #[test]
    fn empty_queues_report_zero_with_wait_hint() {
        let mut scheduler = Scheduler::new();
        let (due, wait) = scheduler.take_due(16, 1_000);
        assert!(due.is_empty());
        assert_eq!(wait, Some(5));
    }

    #[test]
    fn unknown_peers_are_served_before_tracked_peers() {
        let mut scheduler = Scheduler::new();
        scheduler.push_tracked(PeerId(1), 0);
        scheduler.push_unknown(PeerId(2));
        let (due, _) = scheduler.take_due(1, 100);
        assert_eq!(due, vec![PeerId(2)]);
    }

    #[test]
    fn watchdog_reclaims_stale_in_flight_peers() {
        let mut scheduler = Scheduler::new();
        scheduler.push_unknown(PeerId(1));
        let (due, _) = scheduler.take_due(1, 0);
        assert_eq!(due, vec![PeerId(1)]);
        assert!(scheduler.is_in_flight(PeerId(1)));

        let config = DbConfig::default();
        let reclaimed = scheduler.sweep_watchdog(config.in_flight_timeout + 1, &config);
        assert_eq!(reclaimed, vec![PeerId(1)]);
        assert!(!scheduler.is_in_flight(PeerId(1)));
    }
}
