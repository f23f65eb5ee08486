//! Per-flag-set response cache: refreshed from the reputation database on
//! a self-tuning schedule, selected from via partial Fisher-Yates so a
//! heavily-queried cache isn't fully reshuffled on every request. Owned
//! exclusively by a single DNS worker — no cross-worker sharing, so no
//! lock of its own is needed.

use rand::Rng;

use seeder_chain::{Endpoint, Network, ServiceFlags};

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum Family {
    V4,
    V6,
}

#[derive(Clone, Debug)]
struct Entry {
    family: Family,
    endpoint: Endpoint,
}

pub struct FlagCache {
    #[allow(dead_code)]
    flags: ServiceFlags,
    entries: Vec<Entry>,
    ipv4_count: usize,
    ipv6_count: usize,
    refreshed_at: i64,
    hits_since_refresh: u64,
}

impl FlagCache {
    pub fn new(flags: ServiceFlags) -> Self {
        FlagCache {
            flags,
            entries: Vec::new(),
            ipv4_count: 0,
            ipv6_count: 0,
            refreshed_at: 0,
            hits_since_refresh: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn ipv4_count(&self) -> usize {
        self.ipv4_count
    }

    pub fn ipv6_count(&self) -> usize {
        self.ipv6_count
    }

    /// Decides whether a refresh is due: forced, or recent query volume
    /// has outgrown the cache quadratically (`hits · 400 > size²`), or a
    /// small cache has gone stale under sustained load (`hits² · 20 >
    /// size` and it's been more than 5s).
    fn should_refresh(&self, now: i64, force: bool) -> bool {
        if force {
            return true;
        }
        let size = self.entries.len() as u64;
        let hits = self.hits_since_refresh;
        if hits.saturating_mul(400) > size.saturating_mul(size) {
            return true;
        }
        if hits.saturating_mul(hits).saturating_mul(20) > size && now - self.refreshed_at > 5 {
            return true;
        }
        false
    }

    /// Runs `fetch` (a `ReputationDb::get_ips` call, typically) and
    /// rebuilds the cache from its result if `should_refresh` says to.
    /// `fetch` is only invoked when a refresh is actually due, so a quiet
    /// cache never touches the database lock at all.
    pub fn maybe_refresh<F>(&mut self, now: i64, force: bool, fetch: F)
    where
        F: FnOnce() -> Vec<Endpoint>,
    {
        if !self.should_refresh(now, force) {
            return;
        }
        let entries: Vec<Entry> = fetch()
            .into_iter()
            .filter_map(|endpoint| match endpoint.network() {
                Network::Ipv4 => Some(Entry {
                    family: Family::V4,
                    endpoint,
                }),
                Network::Ipv6 => Some(Entry {
                    family: Family::V6,
                    endpoint,
                }),
                Network::Onion => None,
            })
            .collect();
        self.ipv4_count = entries.iter().filter(|e| e.family == Family::V4).count();
        self.ipv6_count = entries.iter().filter(|e| e.family == Family::V6).count();
        self.entries = entries;
        self.refreshed_at = now;
        self.hits_since_refresh = 0;
    }

    /// Partial Fisher-Yates selection: only the first `max` slots are ever
    /// touched, and the permutation persists across calls — a later
    /// refresh is what resets it, not the next query.
    pub fn select(&mut self, max: usize, allow_v4: bool, allow_v6: bool, rng: &mut impl Rng) -> Vec<Endpoint> {
        self.hits_since_refresh += 1;

        let allowed_count =
            (if allow_v4 { self.ipv4_count } else { 0 }) + (if allow_v6 { self.ipv6_count } else { 0 });
        let max = max.min(self.entries.len()).min(allowed_count);
        if max == 0 {
            return Vec::new();
        }

        let size = self.entries.len();
        let allows = |e: &Entry| (e.family == Family::V4 && allow_v4) || (e.family == Family::V6 && allow_v6);

        let mut out = Vec::with_capacity(max);
        for i in 0..max {
            let range_len = size - i;
            let mut offset = rng.gen_range(0..range_len);
            let mut j = i + offset;
            let mut scanned = 0;
            while !allows(&self.entries[j]) {
                offset = (offset + 1) % range_len;
                j = i + offset;
                scanned += 1;
                if scanned > range_len {
                    // Capped by `allowed_count` above, so this shouldn't
                    // trigger; bail rather than spin if it somehow does.
                    break;
                }
            }
            self.entries.swap(i, j);
            out.push(self.entries[i].endpoint);
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use seeder_chain::Address;
    use std::net::{Ipv4Addr, Ipv6Addr};

    fn v4(n: u8) -> Endpoint {
        Endpoint::new(Address::V4(Ipv4Addr::new(10, 0, 0, n)), 9333)
    }

    fn v6(n: u16) -> Endpoint {
        Endpoint::new(Address::V6(Ipv6Addr::new(0x2001, 0xdb8, 0, 0, 0, 0, 0, n)), 9333)
    }

    #[test]
    fn refresh_preserves_family_count_invariant() {
        let mut cache = FlagCache::new(ServiceFlags::NODE_NETWORK);
        cache.maybe_refresh(1000, true, || vec![v4(1), v4(2), v6(1)]);
        assert_eq!(cache.ipv4_count() + cache.ipv6_count(), cache.len());
        assert_eq!(cache.len(), 3);
    }

    // `should_refresh`'s first clause is `hits · 400 > size²`. A 3-entry
    // cache fails that test on the very first query (1·400 > 9), which is
    // the real, intended policy for tiny caches (spec §4.2: "floods fresh
    // entries into small/new flag caches aggressively"). To exercise the
    // "a handful of queries don't force a refresh, a burst does" shape
    // spec §8 scenario 4 describes, these tests use a 30-entry cache
    // (size² = 900) instead, where 1·400 ≤ 900 but 4·400 > 900.

    #[test]
    fn one_query_against_a_cache_of_thirty_does_not_force_a_refresh() {
        let mut cache = FlagCache::new(ServiceFlags::NODE_NETWORK);
        cache.maybe_refresh(1000, true, || (0..30).map(v4).collect());
        let mut rng = rand::rngs::StdRng::seed_from_u64(1);
        cache.select(1, true, true, &mut rng);
        let mut refreshed = false;
        cache.maybe_refresh(1001, false, || {
            refreshed = true;
            vec![]
        });
        assert!(!refreshed);
    }

    #[test]
    fn four_queries_against_a_cache_of_thirty_trigger_a_refresh() {
        let mut cache = FlagCache::new(ServiceFlags::NODE_NETWORK);
        cache.maybe_refresh(1000, true, || (0..30).map(v4).collect());
        let mut rng = rand::rngs::StdRng::seed_from_u64(1);
        for _ in 0..3 {
            cache.select(1, true, true, &mut rng);
        }
        let mut refreshed = false;
        cache.maybe_refresh(1001, false, || {
            refreshed = true;
            vec![]
        });
        assert!(refreshed);
    }

    #[test]
    fn a_single_query_against_a_cache_of_three_does_force_a_refresh() {
        // The flip side of the above: this is the real policy in action,
        // not a bug. A cache this small floods on every query.
        let mut cache = FlagCache::new(ServiceFlags::NODE_NETWORK);
        cache.maybe_refresh(1000, true, || (0..3).map(v4).collect());
        let mut rng = rand::rngs::StdRng::seed_from_u64(1);
        cache.select(1, true, true, &mut rng);
        let mut refreshed = false;
        cache.maybe_refresh(1001, false, || {
            refreshed = true;
            vec![]
        });
        assert!(refreshed);
    }

    #[test]
    fn selection_only_returns_allowed_families() {
        let mut cache = FlagCache::new(ServiceFlags::NODE_NETWORK);
        cache.maybe_refresh(1000, true, || vec![v4(1), v4(2), v6(1), v6(2)]);
        let mut rng = rand::rngs::StdRng::seed_from_u64(7);
        for _ in 0..50 {
            let selected = cache.select(2, true, false, &mut rng);
            for endpoint in selected {
                assert_eq!(endpoint.network(), Network::Ipv4);
            }
        }
    }

    #[test]
    fn selection_caps_at_cache_size() {
        let mut cache = FlagCache::new(ServiceFlags::NODE_NETWORK);
        cache.maybe_refresh(1000, true, || vec![v4(1), v4(2)]);
        let mut rng = rand::rngs::StdRng::seed_from_u64(3);
        let selected = cache.select(10, true, true, &mut rng);
        assert_eq!(selected.len(), 2);
    }
}
