//! The stats worker (spec §4.4): once a second, reports the same counters
//! `original_source/main.cpp`'s `ThreadStats` prints to the terminal.
//! Per §10.2 of `SPEC_FULL.md`, ambient output goes through `tracing`
//! rather than a bare `printf`, so it composes with whatever subscriber
//! the operator has configured instead of fighting it for the terminal.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::info;

use seeder_network::ReputationDb;

const TICK: Duration = Duration::from_secs(1);

pub fn spawn(db: Arc<Mutex<ReputationDb>>) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            let stats = {
                let db = db.lock().expect("reputation database lock poisoned");
                db.get_stats()
            };
            info!(
                good = stats.good,
                available = stats.total,
                tracked = stats.tracked,
                oldest_in_flight_secs = stats.oldest_in_flight_age,
                new = stats.new,
                banned = stats.banned,
                "seeder status"
            );
            tokio::time::sleep(TICK).await;
        }
    })
}
