//! The UDP authoritative responder. Each worker owns its own per-flag
//! cache set and seeded PRNG, and only ever takes the reputation
//! database's lock for the duration of a `GetIPs` call.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use rand::rngs::StdRng;
use rand::SeedableRng;
use tokio::net::UdpSocket;
use tracing::{trace, warn};

use seeder_chain::{Address, Network, ServiceFlags};
use seeder_network::{Clock, NetFilter, ReputationDb};

use crate::cache::FlagCache;
use crate::message::{self, Answer, Query, RData, RecordType};
use crate::whitelist::Whitelist;

const MAX_UDP_RESPONSE: usize = 512;
const MAX_ANSWERS_PER_QUERY: usize = 25;
const ADDRESS_TTL: u32 = 3600;
const NS_TTL: u32 = 40_000;
const REFRESH_FETCH_LIMIT: usize = 1000;

/// The authoritative zone's static identity: never changes after startup.
#[derive(Clone, Debug)]
pub struct ZoneConfig {
    pub host: String,
    pub nameserver: String,
    pub mailbox: String,
    /// Services requested by a bare query for `host` with no `x<HEX>`
    /// label — typically just `NODE_NETWORK`.
    pub default_flags: ServiceFlags,
}

enum Label {
    Apex,
    Flagged(ServiceFlags),
}

/// Parses a query name against the configured zone apex, implementing
/// the `x<HEX>.<host>` subdomain convention. `None` covers both "not this
/// zone at all" and a malshaped flagged label; either way the caller
/// answers with an empty authoritative response.
fn parse_label(name: &str, host: &str) -> Option<Label> {
    if name == host {
        return Some(Label::Apex);
    }
    let prefix = name.strip_suffix(&format!(".{host}"))?;
    let hex = prefix.strip_prefix('x')?;
    if hex.is_empty() || hex.len() > 16 || hex.starts_with('0') {
        return None;
    }
    if !hex.chars().all(|c| c.is_ascii_hexdigit()) {
        return None;
    }
    let value = u64::from_str_radix(hex, 16).ok()?;
    Some(Label::Flagged(ServiceFlags::from_bits_truncate(value)))
}

fn mailbox_to_rname(mailbox: &str) -> String {
    match mailbox.split_once('@') {
        Some((local, domain)) => format!("{local}.{domain}"),
        None => mailbox.to_string(),
    }
}

/// One DNS responder worker: an independent cache set, PRNG, and socket.
/// Per-worker caches never share state, so nothing here is behind a lock
/// except the database itself.
pub struct DnsWorker {
    zone: ZoneConfig,
    whitelist: Whitelist,
    db: Arc<Mutex<ReputationDb>>,
    clock: Arc<dyn Clock>,
    caches: HashMap<ServiceFlags, FlagCache>,
    rng: StdRng,
}

impl DnsWorker {
    pub fn new(zone: ZoneConfig, whitelist: Whitelist, db: Arc<Mutex<ReputationDb>>, clock: Arc<dyn Clock>) -> Self {
        DnsWorker {
            zone,
            whitelist,
            db,
            clock,
            caches: HashMap::new(),
            rng: StdRng::from_entropy(),
        }
    }

    /// Services queries off a socket shared with sibling workers.
    /// Per-worker caches never share state, but nothing stops several
    /// workers from pulling datagrams off the same bound port.
    pub async fn run(mut self, socket: Arc<UdpSocket>) {
        let mut buf = [0u8; 512];
        loop {
            let (len, peer) = match socket.recv_from(&mut buf).await {
                Ok(v) => v,
                Err(err) => {
                    warn!(%err, "dns socket recv error");
                    continue;
                }
            };
            if let Some(response) = self.handle_packet(&buf[..len]) {
                if let Err(err) = socket.send_to(&response, peer).await {
                    warn!(%err, %peer, "dns socket send error");
                }
            }
        }
    }

    /// Parses and answers one datagram. Returns `None` on a parse
    /// failure; a malformed query is dropped silently, with no error
    /// response sent back.
    fn handle_packet(&mut self, packet: &[u8]) -> Option<Vec<u8>> {
        let query = match message::parse_query(packet) {
            Ok(q) => q,
            Err(err) => {
                trace!(%err, "dropping malformed dns query");
                return None;
            }
        };
        let answers = self.answer(&query);
        Some(message::build_response(&query, &answers, MAX_UDP_RESPONSE))
    }

    fn answer(&mut self, query: &Query) -> Vec<Answer> {
        let name = query.name.trim_end_matches('.');
        let label = match parse_label(name, &self.zone.host) {
            Some(label) => label,
            None => return Vec::new(),
        };

        let flags = match label {
            Label::Apex => Some(self.zone.default_flags),
            Label::Flagged(flags) => self.whitelist.allows(flags).then_some(flags),
        };
        let Some(flags) = flags else {
            return Vec::new();
        };

        match query.qtype {
            RecordType::A => self.address_answers(flags, true, false),
            RecordType::Aaaa => self.address_answers(flags, false, true),
            RecordType::Ns => vec![self.ns_answer()],
            RecordType::Soa => vec![self.soa_answer()],
            RecordType::Any => {
                let mut out = self.address_answers(flags, true, true);
                out.push(self.ns_answer());
                out.push(self.soa_answer());
                out
            }
            RecordType::Other(_) => Vec::new(),
        }
    }

    fn address_answers(&mut self, flags: ServiceFlags, allow_v4: bool, allow_v6: bool) -> Vec<Answer> {
        let now = self.clock.now();
        let db = Arc::clone(&self.db);
        let cache = self.caches.entry(flags).or_insert_with(|| FlagCache::new(flags));
        cache.maybe_refresh(now, false, || {
            let mut db = db.lock().expect("reputation database lock poisoned");
            db.get_ips(
                flags,
                REFRESH_FETCH_LIMIT,
                NetFilter {
                    ipv4: true,
                    ipv6: true,
                    onion: false,
                },
            )
        });

        cache
            .select(MAX_ANSWERS_PER_QUERY, allow_v4, allow_v6, &mut self.rng)
            .into_iter()
            .map(|endpoint| Answer {
                rtype: match endpoint.network() {
                    Network::Ipv4 => RecordType::A,
                    _ => RecordType::Aaaa,
                },
                ttl: ADDRESS_TTL,
                rdata: match endpoint.address {
                    Address::V4(addr) => RData::A(addr),
                    Address::V6(addr) => RData::Aaaa(addr),
                    Address::Onion(_) => unreachable!("the cache never stores onion endpoints"),
                },
            })
            .collect()
    }

    fn ns_answer(&self) -> Answer {
        Answer {
            rtype: RecordType::Ns,
            ttl: NS_TTL,
            rdata: RData::Name(self.zone.nameserver.clone()),
        }
    }

    fn soa_answer(&self) -> Answer {
        Answer {
            rtype: RecordType::Soa,
            ttl: NS_TTL,
            rdata: RData::Soa {
                mname: self.zone.nameserver.clone(),
                rname: mailbox_to_rname(&self.zone.mailbox),
                serial: self.clock.now() as u32,
                refresh: 604_800,
                retry: 86_400,
                expire: 2_592_000,
                minimum: 604_800,
            },
        }
    }
}

/// Binds the UDP socket a [`DnsWorker`] serves on.
pub async fn bind(addr: SocketAddr) -> std::io::Result<UdpSocket> {
    UdpSocket::bind(addr).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn apex_name_parses_as_default_flags() {
        assert!(matches!(parse_label("seed.example.com", "seed.example.com"), Some(Label::Apex)));
    }

    #[test]
    fn flagged_label_decodes_hex_services() {
        match parse_label("x409.seed.example.com", "seed.example.com") {
            Some(Label::Flagged(flags)) => assert_eq!(flags.bits(), 0x409),
            _ => panic!("expected a flagged label"),
        }
    }

    #[test]
    fn leading_zero_is_rejected() {
        assert!(parse_label("x0409.seed.example.com", "seed.example.com").is_none());
    }

    #[test]
    fn more_than_sixteen_hex_digits_is_rejected() {
        let label = format!("x{}.seed.example.com", "1".repeat(17));
        assert!(parse_label(&label, "seed.example.com").is_none());
    }

    #[test]
    fn unrelated_names_are_rejected() {
        assert!(parse_label("example.org", "seed.example.com").is_none());
    }

    #[test]
    fn mailbox_at_sign_becomes_a_dot() {
        assert_eq!(mailbox_to_rname("hostmaster@example.com"), "hostmaster.example.com");
    }
}
