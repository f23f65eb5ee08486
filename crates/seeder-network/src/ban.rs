//! The ban map: endpoints excluded from scheduling, selection, and
//! serialization until their ban expires.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use seeder_chain::Endpoint;

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct BanMap {
    entries: HashMap<Endpoint, i64>,
}

impl BanMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ban(&mut self, endpoint: Endpoint, until: i64) {
        self.entries.insert(endpoint, until);
    }

    /// True iff `endpoint` is currently banned (ban hasn't expired).
    pub fn is_banned(&self, endpoint: &Endpoint, now: i64) -> bool {
        self.entries.get(endpoint).is_some_and(|&until| until > now)
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.iter().count()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drops expired entries so the persisted ban map doesn't grow forever.
    pub fn prune_expired(&mut self, now: i64) {
        self.entries.retain(|_, &mut until| until > now);
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Endpoint, &i64)> {
        self.entries.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use seeder_chain::Address;
    use std::net::Ipv4Addr;

    fn endpoint() -> Endpoint {
        Endpoint::new(Address::V4(Ipv4Addr::new(1, 2, 3, 4)), 9333)
    }

    #[test]
    fn ban_is_observed_until_expiry() {
        let mut bans = BanMap::new();
        bans.ban(endpoint(), 100);
        assert!(bans.is_banned(&endpoint(), 50));
        assert!(!bans.is_banned(&endpoint(), 150));
    }
}
