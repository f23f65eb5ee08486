//! Spawns the worker pool described in spec §4.4: prober workers, DNS
//! responder workers, the seed-lookup worker, the dumper, and the stats
//! reporter. Each worker only ever holds the database lock for the
//! duration of one method call (spec §5); long I/O always happens
//! outside it.

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::future::join_all;
use rand::Rng;
use tokio::net::UdpSocket;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use seeder_dns::{DnsWorker, Whitelist, ZoneConfig};
use seeder_network::{Clock, Prober, ReputationDb};

/// How many peers a single prober worker asks for per scheduling pass,
/// matching `original_source/main.cpp`'s `db.GetMany(ips, 16, wait)`.
const PROBE_BATCH: usize = 16;

/// Spawns `count` prober workers, each looping: dequeue a batch, probe it
/// concurrently, and feed the outcomes back. Mirrors `ThreadCrawler`,
/// except the batch's probes run concurrently via `join_all` rather than
/// one at a time — a direct translation of "many OS threads, one probe
/// each" into "fewer tasks, each juggling many sockets", which is the
/// idiomatic async-Rust shape for the same concurrency budget.
pub fn spawn_prober_workers(
    count: u16,
    db: Arc<Mutex<ReputationDb>>,
    prober: Arc<dyn Prober>,
) -> Vec<JoinHandle<()>> {
    (0..count)
        .map(|_| {
            let db = Arc::clone(&db);
            let prober = Arc::clone(&prober);
            tokio::spawn(async move { prober_worker_loop(count, db, prober).await })
        })
        .collect()
}

async fn prober_worker_loop(worker_count: u16, db: Arc<Mutex<ReputationDb>>, prober: Arc<dyn Prober>) {
    loop {
        let (batch, wait_hint) = {
            let mut db = db.lock().expect("reputation database lock poisoned");
            db.get_many(PROBE_BATCH)
        };

        if batch.is_empty() {
            let base_ms = wait_hint.unwrap_or(5).max(0) as u64 * 1000;
            let jitter_span = (500 * worker_count.max(1) as u64).max(1);
            let jitter_ms = rand::thread_rng().gen_range(0..jitter_span);
            tokio::time::sleep(Duration::from_millis(base_ms + jitter_ms)).await;
            continue;
        }

        let outcomes = join_all(batch.iter().map(|&(id, endpoint)| {
            let prober = Arc::clone(&prober);
            async move { (id, prober.test_node(endpoint, true).await) }
        }))
        .await;

        let discovered: Vec<_> = outcomes
            .iter()
            .flat_map(|(_, result)| result.discovered_peers.clone())
            .collect();

        let mut db = db.lock().expect("reputation database lock poisoned");
        db.result_many(outcomes);
        db.add_many(discovered);
    }
}

/// Binds one UDP socket and spawns `count` workers sharing it, each with
/// its own per-flag cache and PRNG (spec §4.2/§9 — caches never cross
/// workers, but the socket itself may, since recv is just a queue pop).
pub async fn spawn_dns_workers(
    count: u16,
    addr: SocketAddr,
    zone: ZoneConfig,
    whitelist: Whitelist,
    db: Arc<Mutex<ReputationDb>>,
    clock: Arc<dyn Clock>,
) -> std::io::Result<Vec<JoinHandle<()>>> {
    let socket = Arc::new(UdpSocket::bind(addr).await?);
    info!(%addr, threads = count, host = %zone.host, "dns responder listening");

    Ok((0..count)
        .map(|_| {
            let worker = DnsWorker::new(zone.clone(), whitelist.clone(), Arc::clone(&db), Arc::clone(&clock));
            let socket = Arc::clone(&socket);
            tokio::spawn(async move { worker.run(socket).await })
        })
        .collect())
}

/// Spawns the seed-lookup worker (spec §4.4, `crate::seeds`).
pub fn spawn_seed_worker(seeds: Vec<String>, p2p_port: u16, db: Arc<Mutex<ReputationDb>>) -> JoinHandle<()> {
    if seeds.is_empty() {
        warn!("no bootstrap seeds configured; the database will only grow from peer-supplied addr lists");
    }
    crate::seeds::spawn(seeds, p2p_port, db)
}

pub fn spawn_dumper(db: Arc<Mutex<ReputationDb>>) -> JoinHandle<()> {
    crate::dumper::spawn(db)
}

pub fn spawn_stats(db: Arc<Mutex<ReputationDb>>) -> JoinHandle<()> {
    crate::stats::spawn(db)
}
