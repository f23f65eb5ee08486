//! The seed-lookup worker (spec §4.4, supplemented from
//! `original_source/main.cpp`'s `ThreadSeeder`): periodically resolves a
//! handful of bootstrap DNS hostnames and force-adds whatever comes back,
//! so a database started from nothing still finds its first peers.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use seeder_chain::{Address, Endpoint};
use seeder_network::ReputationDb;

/// How often the seed list is re-resolved, matching `main.cpp`'s
/// `Sleep(1800000)`.
const SEED_INTERVAL: Duration = Duration::from_secs(30 * 60);

const MAINNET_SEEDS: &[&str] = &[
    "dnsseed.litecoinpool.org",
    "seed-a.litecoin.loshan.co.uk",
    "dnsseed.thrasher.io",
];

const TESTNET_SEEDS: &[&str] = &["seed-b.litecoin.loshan.co.uk", "dnsseed-testnet.thrasher.io"];

pub fn default_seeds(testnet: bool) -> Vec<String> {
    let list = if testnet { TESTNET_SEEDS } else { MAINNET_SEEDS };
    list.iter().map(|s| s.to_string()).collect()
}

/// Spawns the worker. `.onion` entries are added directly as endpoints
/// (no resolution needed); everything else is looked up via the system
/// resolver on each pass.
pub fn spawn(seeds: Vec<String>, p2p_port: u16, db: Arc<Mutex<ReputationDb>>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let (onions, hosts): (Vec<String>, Vec<String>) =
            seeds.into_iter().partition(|s| s.ends_with(".onion"));

        for onion in &onions {
            match Address::parse_onion(onion) {
                Ok(address) => {
                    let mut db = db.lock().expect("reputation database lock poisoned");
                    db.add(Endpoint::new(address, p2p_port), true);
                }
                Err(err) => warn!(%onion, %err, "ignoring malformed onion seed"),
            }
        }

        loop {
            for host in &hosts {
                let lookup = format!("{host}:{p2p_port}");
                match tokio::net::lookup_host(&lookup).await {
                    Ok(addrs) => {
                        let mut count = 0;
                        let mut db = db.lock().expect("reputation database lock poisoned");
                        for addr in addrs {
                            db.add(Endpoint::from(addr), true);
                            count += 1;
                        }
                        debug!(host, count, "seed lookup resolved addresses");
                    }
                    Err(err) => warn!(host, %err, "seed lookup failed, will retry next cycle"),
                }
            }
            if !hosts.is_empty() || !onions.is_empty() {
                info!(seeds = hosts.len() + onions.len(), "seed lookup sweep complete");
            }
            tokio::time::sleep(SEED_INTERVAL).await;
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_seed_lists_differ_by_network() {
        assert_ne!(default_seeds(false), default_seeds(true));
        assert!(default_seeds(false).contains(&"dnsseed.litecoinpool.org".to_string()));
    }
}
