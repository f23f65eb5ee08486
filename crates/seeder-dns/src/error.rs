//! Errors the DNS responder can encounter. A malformed incoming packet
//! is always dropped silently by the caller — this type exists so
//! `message::parse_query` has somewhere to put the reason (visible in a
//! `trace!` log), not to drive any retry or ban logic.

#[derive(Debug, thiserror::Error)]
pub enum DnsError {
    #[error("malformed dns query: {0}")]
    Malformed(&'static str),
}
