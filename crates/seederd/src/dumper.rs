//! The dumper worker: on a growing-interval schedule, writes the binary
//! snapshot, the human-readable report, and appends a line to the stats
//! log.

use std::fs;
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use tokio::task::JoinHandle;
use tracing::{info, warn};

use seeder_network::{AddrReport, ReputationDb};

const SNAPSHOT_PATH: &str = "dnsseed.dat";
const SNAPSHOT_TMP_PATH: &str = "dnsseed.dat.new";
const DUMP_PATH: &str = "dnsseed.dump";
const STATS_LOG_PATH: &str = "dnsstats.log";

const DUMP_HEADER: &str = "# address                                        good  lastSuccess    %(2h)   %(8h)   %(1d)   %(7d)  %(30d)  blocks      svcs  version\n";

/// First five ticks are 100s, 200s, 400s, 800s, 1600s; after that every
/// tick is 3200s, doubling per tick and capped once `count` reaches 5.
fn intervals() -> impl Iterator<Item = Duration> {
    let mut count: u32 = 0;
    std::iter::from_fn(move || {
        let secs = 100u64 << count;
        if count < 5 {
            count += 1;
        }
        Some(Duration::from_secs(secs))
    })
}

pub fn spawn(db: Arc<Mutex<ReputationDb>>) -> JoinHandle<()> {
    tokio::spawn(async move {
        for interval in intervals() {
            tokio::time::sleep(interval).await;
            dump_once(&db);
        }
    })
}

fn dump_once(db: &Arc<Mutex<ReputationDb>>) {
    let (snapshot_bytes, mut reports) = {
        let db = db.lock().expect("reputation database lock poisoned");
        let bytes = match db.snapshot().encode() {
            Ok(bytes) => Some(bytes),
            Err(err) => {
                warn!(%err, "failed to encode database snapshot, skipping this tick");
                None
            }
        };
        (bytes, db.get_all())
    };

    if let Some(bytes) = snapshot_bytes {
        if let Err(err) = write_snapshot(&bytes) {
            warn!(%err, "failed to write dnsseed.dat, will retry next cycle");
        }
    }

    sort_reports(&mut reports);
    if let Err(err) = write_human_dump(&reports) {
        warn!(%err, "failed to write dnsseed.dump, will retry next cycle");
    }
    if let Err(err) = append_stats_log(&reports) {
        warn!(%err, "failed to append dnsstats.log, will retry next cycle");
    }

    info!(peers = reports.len(), "dump cycle complete");
}

/// Sort order for the human-readable dump: longest-window uptime
/// descending, then the next window down, then reported client version
/// descending.
fn sort_reports(reports: &mut [AddrReport]) {
    reports.sort_by(|a, b| {
        b.uptimes[4]
            .partial_cmp(&a.uptimes[4])
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| b.uptimes[3].partial_cmp(&a.uptimes[3]).unwrap_or(std::cmp::Ordering::Equal))
            .then_with(|| b.client_version.cmp(&a.client_version))
    });
}

fn write_snapshot(bytes: &[u8]) -> std::io::Result<()> {
    fs::write(SNAPSHOT_TMP_PATH, bytes)?;
    fs::rename(SNAPSHOT_TMP_PATH, SNAPSHOT_PATH)
}

fn write_human_dump(reports: &[AddrReport]) -> std::io::Result<()> {
    let mut out = String::with_capacity(DUMP_HEADER.len() + reports.len() * 96);
    out.push_str(DUMP_HEADER);
    for r in reports {
        out.push_str(&format!(
            "{:<47}  {:>4}  {:>11}  {:>6.2}% {:>6.2}% {:>6.2}% {:>6.2}% {:>6.2}%  {:>6}  {:08x}  {:>5} \"{}\"\n",
            r.endpoint.to_string(),
            r.good as i32,
            r.last_success,
            100.0 * r.uptimes[0],
            100.0 * r.uptimes[1],
            100.0 * r.uptimes[2],
            100.0 * r.uptimes[3],
            100.0 * r.uptimes[4],
            r.blocks,
            r.services,
            r.client_version,
            r.client_subversion,
        ));
    }
    fs::write(DUMP_PATH, out)
}

fn append_stats_log(reports: &[AddrReport]) -> std::io::Result<()> {
    let mut sums = [0.0f64; 5];
    for r in reports {
        for i in 0..5 {
            sums[i] += r.uptimes[i];
        }
    }
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);
    let line = format!(
        "{} {} {} {} {} {}\n",
        now, sums[0], sums[1], sums[2], sums[3], sums[4]
    );
    use std::io::Write;
    let mut file = fs::OpenOptions::new().create(true).append(true).open(STATS_LOG_PATH)?;
    file.write_all(line.as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interval_schedule_caps_at_3200_seconds() {
        let schedule: Vec<u64> = intervals().take(7).map(|d| d.as_secs()).collect();
        assert_eq!(schedule, vec![100, 200, 400, 800, 1600, 3200, 3200]);
    }

    fn report(uptime30: f64, uptime7: f64, version: i64) -> AddrReport {
        AddrReport {
            endpoint: seeder_chain::Endpoint::new(
                seeder_chain::Address::V4(std::net::Ipv4Addr::new(10, 0, 0, 1)),
                9333,
            ),
            good: true,
            last_success: 0,
            uptimes: [0.0, 0.0, 0.0, uptime7, uptime30],
            blocks: 0,
            services: 1,
            client_version: version,
            client_subversion: String::new(),
        }
    }

    #[test]
    fn sort_orders_by_30d_then_7d_then_version_descending() {
        let mut reports = vec![
            report(0.5, 0.9, 1),
            report(0.9, 0.1, 2),
            report(0.9, 0.1, 3),
        ];
        sort_reports(&mut reports);
        assert_eq!(
            reports.iter().map(|r| r.client_version).collect::<Vec<_>>(),
            vec![3, 2, 1]
        );
    }
}
