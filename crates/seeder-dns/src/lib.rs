//! The authoritative DNS responder: wire codec, the subdomain label
//! protocol, and the per-flag selection cache that sits between DNS
//! workers and the reputation database.

pub mod cache;
pub mod error;
pub mod message;
pub mod server;
pub mod whitelist;

pub use cache::FlagCache;
pub use error::DnsError;
pub use server::{bind, DnsWorker, ZoneConfig};
pub use whitelist::Whitelist;
