//! The peer prober's external-facing contract: connect to an endpoint,
//! run the handshake, and report what it said about itself.
//!
//! Full conformance with any particular peer-to-peer protocol variant is
//! out of scope; this module defines the `Prober` trait the orchestrator's
//! crawler workers depend on, plus a [`TcpProber`] that performs a real —
//! if minimal — TCP handshake using `seeder_chain`'s wire codec, so the
//! contract has a working default rather than only existing on paper.

use std::io;
use std::time::Duration;

use async_trait::async_trait;
use byteorder::WriteBytesExt;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;

use seeder_chain::{parse_addr_list, AddrEntry, Endpoint, ReadWireExt, ServiceFlags};

/// Why a probe resulted in a ban: protocol-level offenses ban, transient
/// network failures do not.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum BanReason {
    WrongMagic,
    RejectedVersion,
    Malformed,
}

impl std::fmt::Display for BanReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            BanReason::WrongMagic => "bad_magic",
            BanReason::RejectedVersion => "rejected_version",
            BanReason::Malformed => "malformed_message",
        };
        write!(f, "{s}")
    }
}

/// The outcome of one probe attempt: whether the handshake succeeded, what
/// the peer reported about itself, and — if it misbehaved — why it earned
/// a ban.
#[derive(Clone, Debug, Default)]
pub struct ProbeResult {
    pub good: bool,
    pub client_version: i64,
    pub client_subversion: String,
    pub services: ServiceFlags,
    pub height: i32,
    pub ban_reason: Option<BanReason>,
    /// Populated only when the prober requested `getaddr` and the peer
    /// answered with an address list.
    pub discovered_peers: Vec<AddrEntry>,
}

/// Performs the version/verack/getaddr handshake against a single
/// endpoint. Implementations must be safely callable from many threads in
/// parallel and must bound their own wall time — [`TcpProber`] does both
/// via `tokio::time::timeout` and by taking `&self`.
#[async_trait]
pub trait Prober: Send + Sync {
    async fn test_node(&self, endpoint: Endpoint, request_getaddr: bool) -> ProbeResult;
}

/// Config for [`TcpProber`]: the magic bytes and port that identify this
/// network, and how long a single probe is allowed to take.
#[derive(Clone, Debug)]
pub struct TcpProberConfig {
    pub magic: [u8; 4],
    pub p2p_port: u16,
    pub timeout: Duration,
    pub our_version: i64,
    pub our_services: ServiceFlags,
}

impl Default for TcpProberConfig {
    fn default() -> Self {
        TcpProberConfig {
            magic: [0xfb, 0xc0, 0xb6, 0xdb],
            p2p_port: 9333,
            timeout: Duration::from_secs(15),
            our_version: 70016,
            our_services: ServiceFlags::empty(),
        }
    }
}

/// A minimal real handshake: connect, exchange `version`/`verack`,
/// optionally request `addr`. Message framing is the classic
/// magic+command+length+checksum header; full conformance with any
/// specific peer-to-peer protocol variant is intentionally not attempted.
pub struct TcpProber {
    config: TcpProberConfig,
}

impl TcpProber {
    pub fn new(config: TcpProberConfig) -> Self {
        TcpProber { config }
    }

    async fn handshake(&self, endpoint: Endpoint) -> io::Result<ProbeResult> {
        let socket_addr: std::net::SocketAddr = endpoint
            .try_into()
            .map_err(|_| io::Error::new(io::ErrorKind::Unsupported, "onion endpoints need a proxy"))?;

        let mut stream = TcpStream::connect(socket_addr).await?;

        let mut version_payload = Vec::new();
        version_payload.write_u16::<byteorder::LittleEndian>(0)?; // reserved, keeps payload non-empty
        self.write_message(&mut stream, b"version", &version_payload)
            .await?;

        let (command, payload) = match self.read_message(&mut stream).await {
            Ok(v) => v,
            Err(err) if is_wrong_magic(&err) => {
                return Ok(ProbeResult {
                    ban_reason: Some(BanReason::WrongMagic),
                    ..Default::default()
                });
            }
            Err(err) => return Err(err),
        };
        if command != *b"version\0\0\0\0\0" {
            return Ok(ProbeResult {
                ban_reason: Some(BanReason::Malformed),
                ..Default::default()
            });
        }
        let mut cursor = &payload[..];
        let peer_version = cursor.read_compact_size().unwrap_or(0) as i64;
        let peer_services = ServiceFlags::from_bits_truncate(cursor.read_compact_size().unwrap_or(0));
        let peer_height = cursor.read_compact_size().unwrap_or(0) as i32;

        if peer_version < 209 {
            return Ok(ProbeResult {
                ban_reason: Some(BanReason::RejectedVersion),
                ..Default::default()
            });
        }

        self.write_message(&mut stream, b"verack", &[]).await?;
        let (ack_command, _) = self.read_message(&mut stream).await?;
        if ack_command != *b"verack\0\0\0\0\0\0" {
            return Ok(ProbeResult {
                ban_reason: Some(BanReason::Malformed),
                ..Default::default()
            });
        }

        let mut discovered_peers = Vec::new();
        self.write_message(&mut stream, b"getaddr", &[]).await?;
        if let Ok((command, payload)) = self.read_message(&mut stream).await {
            if command == *b"addr\0\0\0\0\0\0\0\0" {
                discovered_peers = parse_addr_list(&payload[..]).unwrap_or_default();
            }
        }

        Ok(ProbeResult {
            good: true,
            client_version: peer_version,
            client_subversion: String::new(),
            services: peer_services,
            height: peer_height,
            ban_reason: None,
            discovered_peers,
        })
    }

    async fn write_message(
        &self,
        stream: &mut TcpStream,
        command: &[u8],
        payload: &[u8],
    ) -> io::Result<()> {
        let mut header = Vec::with_capacity(24 + payload.len());
        header.extend_from_slice(&self.config.magic);
        let mut command_padded = [0u8; 12];
        command_padded[..command.len()].copy_from_slice(command);
        header.extend_from_slice(&command_padded);
        header.extend_from_slice(&(payload.len() as u32).to_le_bytes());
        header.extend_from_slice(&checksum(payload));
        header.extend_from_slice(payload);
        stream.write_all(&header).await
    }

    async fn read_message(&self, stream: &mut TcpStream) -> io::Result<([u8; 12], Vec<u8>)> {
        let mut header = [0u8; 24];
        stream.read_exact(&mut header).await?;
        if header[0..4] != self.config.magic[..] {
            return Err(io::Error::new(io::ErrorKind::InvalidData, WRONG_MAGIC_MARKER));
        }
        let mut command = [0u8; 12];
        command.copy_from_slice(&header[4..16]);
        let len = u32::from_le_bytes(header[16..20].try_into().unwrap()) as usize;
        if len > seeder_chain::MAX_PROTOCOL_MESSAGE_LEN {
            return Err(io::Error::new(io::ErrorKind::InvalidData, "message too large"));
        }
        let mut payload = vec![0u8; len];
        stream.read_exact(&mut payload).await?;
        Ok((command, payload))
    }
}

#[async_trait]
impl Prober for TcpProber {
    async fn test_node(&self, endpoint: Endpoint, _request_getaddr: bool) -> ProbeResult {
        match timeout(self.config.timeout, self.handshake(endpoint)).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) | Err(_) => ProbeResult::default(),
        }
    }
}

const WRONG_MAGIC_MARKER: &str = "bad network magic";

fn is_wrong_magic(err: &io::Error) -> bool {
    err.kind() == io::ErrorKind::InvalidData && err.to_string().contains(WRONG_MAGIC_MARKER)
}

/// Bitcoin-style message checksum: first 4 bytes of double-SHA256.
fn checksum(payload: &[u8]) -> [u8; 4] {
    use sha2::{Digest, Sha256};
    let first = Sha256::digest(payload);
    let second = Sha256::digest(first);
    let mut out = [0u8; 4];
    out.copy_from_slice(&second[..4]);
    out
}

