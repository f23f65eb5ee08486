//! `seederd`: the peer-discovery DNS seed binary. Parses configuration,
//! loads any persisted reputation database, and spawns the prober, DNS,
//! seed-lookup, dumper, and stats workers.

mod cli;
mod config;
mod dumper;
mod orchestrator;
mod seeds;
mod stats;

use std::fs;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use gumdrop::Options;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use cli::Cli;
use config::Settings;

use seeder_chain::ServiceFlags;
use seeder_dns::ZoneConfig;
use seeder_network::{Clock, DbConfig, Prober, ReputationDb, SystemClock, TcpProber, TcpProberConfig};

const SNAPSHOT_PATH: &str = "dnsseed.dat";

/// Our own advertised protocol version in the handshake we send peers.
/// The prober contract only requires *reporting* what peers say back,
/// not advertising a particular version ourselves.
const OUR_PROTOCOL_VERSION: i64 = 70016;

#[tokio::main]
async fn main() -> color_eyre::Result<()> {
    color_eyre::install()?;

    let cli = Cli::parse_args_default_or_exit();
    let file_config = config::load_file_config(cli.config.as_deref())?;
    let settings = Settings::merge(cli, file_config);

    init_tracing();

    let whitelist = settings.whitelist();
    let filters = whitelist.iter().map(|f| format!("{:#x}", f.bits())).collect::<Vec<_>>().join(",");
    info!(%filters, "supporting whitelisted filters");

    for (label, proxy) in [
        ("tor", &settings.tor_proxy),
        ("ipv4", &settings.ipv4_proxy),
        ("ipv6", &settings.ipv6_proxy),
    ] {
        if let Some(addr) = proxy {
            info!(%addr, kind = label, "proxy configured (accepted and logged, not dialed)");
        }
    }

    let dns_enabled = settings.nameserver.is_some();
    if dns_enabled && settings.host.is_none() {
        eprintln!("No hostname set. Please use -h.");
        std::process::exit(1);
    }
    if dns_enabled && settings.mailbox.is_none() {
        eprintln!("No e-mail address set. Please use -m.");
        std::process::exit(1);
    }
    if settings.testnet {
        info!("using testnet defaults");
    }

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let db_config = DbConfig {
        min_height: settings.min_height,
        ..DbConfig::default()
    };

    let mut db = load_database(db_config, Arc::clone(&clock));
    if settings.wipeban {
        db.clear_bans();
    }
    if settings.wipeignore {
        db.clear_ignores();
    }
    let db = Arc::new(Mutex::new(db));

    let p2p_port = settings.resolved_p2p_port();
    let prober_config = TcpProberConfig {
        magic: settings.magic_bytes(),
        p2p_port,
        our_version: OUR_PROTOCOL_VERSION,
        our_services: ServiceFlags::NODE_NETWORK,
        ..TcpProberConfig::default()
    };
    let prober: Arc<dyn Prober> = Arc::new(TcpProber::new(prober_config));

    let mut tasks = Vec::new();

    info!(threads = settings.threads, "starting prober workers");
    tasks.extend(orchestrator::spawn_prober_workers(
        settings.threads,
        Arc::clone(&db),
        Arc::clone(&prober),
    ));

    if dns_enabled {
        let zone = ZoneConfig {
            host: settings.host.clone().expect("checked above"),
            nameserver: settings.nameserver.clone().expect("checked above"),
            mailbox: settings.mailbox.clone().expect("checked above"),
            default_flags: ServiceFlags::NODE_NETWORK,
        };
        let addr: SocketAddr = format!("{}:{}", settings.listen_address, settings.port)
            .parse()
            .map_err(|err| color_eyre::eyre::eyre!("invalid listen address/port: {err}"))?;
        let dns_tasks = orchestrator::spawn_dns_workers(
            settings.dns_threads,
            addr,
            zone,
            whitelist,
            Arc::clone(&db),
            Arc::clone(&clock),
        )
        .await?;
        tasks.extend(dns_tasks);
    } else {
        info!("no nameserver set, not starting the dns responder");
    }

    tasks.push(orchestrator::spawn_seed_worker(
        settings.seed_list(),
        p2p_port,
        Arc::clone(&db),
    ));
    tasks.push(orchestrator::spawn_dumper(Arc::clone(&db)));
    tasks.push(orchestrator::spawn_stats(Arc::clone(&db)));

    tokio::signal::ctrl_c().await?;
    info!("shutdown signal received, exiting at next worker loop boundary");
    Ok(())
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

/// Loads the persisted snapshot if `dnsseed.dat` exists, starting a fresh
/// database on any read/decode failure rather than aborting — disk I/O
/// failures are recoverable, and a corrupt startup snapshot is the same
/// kind of failure, just earlier.
fn load_database(config: DbConfig, clock: Arc<dyn Clock>) -> ReputationDb {
    match fs::read(SNAPSHOT_PATH) {
        Ok(bytes) => {
            info!(path = SNAPSHOT_PATH, "loading persisted reputation database");
            match ReputationDb::load_snapshot_bytes(config, Box::new(ArcClock(clock)), &bytes) {
                Ok(db) => db,
                Err(err) => {
                    warn!(%err, "failed to decode dnsseed.dat, starting from an empty database");
                    ReputationDb::with_clock(config, Box::new(ArcClock(Arc::new(SystemClock))))
                }
            }
        }
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            ReputationDb::with_clock(config, Box::new(ArcClock(clock)))
        }
        Err(err) => {
            warn!(%err, "failed to read dnsseed.dat, starting from an empty database");
            ReputationDb::with_clock(config, Box::new(ArcClock(clock)))
        }
    }
}

struct ArcClock(Arc<dyn Clock>);

impl Clock for ArcClock {
    fn now(&self) -> i64 {
        self.0.now()
    }
}
