//! Peer endpoint addressing: IPv4, IPv6, and Tor onion services.

use std::{
    fmt,
    net::{Ipv4Addr, Ipv6Addr, SocketAddr},
};

use crate::error::SerializationError;

/// The IPv6 prefix Tor onion-service addresses are mapped into on the wire,
/// following the long-standing Bitcoin Core "OnionCat" convention
/// (`fd87:d87e:eb43::/48`).
const ONION_PREFIX: [u8; 6] = [0xfd, 0x87, 0xd8, 0x7e, 0xeb, 0x43];

/// A peer's network family and address, without a port.
///
/// Endpoints are plain data: the reputation database and probe scheduler
/// reference peers through a [`crate::PeerId`], never by holding an
/// `Address` or any other handle, so this type only needs to be cheap to
/// copy, hash, and compare.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
pub enum Address {
    V4(Ipv4Addr),
    V6(Ipv6Addr),
    /// The 10-byte public-key portion of a Tor onion-service address.
    Onion([u8; 10]),
}

impl Address {
    pub fn network(&self) -> Network {
        match self {
            Address::V4(_) => Network::Ipv4,
            Address::V6(_) => Network::Ipv6,
            Address::Onion(_) => Network::Onion,
        }
    }

    /// Encodes this address as the 16-byte on-wire representation used by
    /// `CAddress`-style peer messages: IPv4 addresses are mapped into
    /// `::ffff:0:0/96`, onion addresses into the OnionCat prefix, and IPv6
    /// addresses pass through unchanged.
    pub fn to_wire_bytes(&self) -> [u8; 16] {
        match self {
            Address::V4(v4) => v4.to_ipv6_mapped().octets(),
            Address::V6(v6) => v6.octets(),
            Address::Onion(key) => {
                let mut out = [0u8; 16];
                out[..6].copy_from_slice(&ONION_PREFIX);
                out[6..].copy_from_slice(key);
                out
            }
        }
    }

    /// Decodes the 16-byte on-wire representation, recovering the original
    /// family from the OnionCat prefix or the IPv4-mapped prefix.
    pub fn from_wire_bytes(bytes: [u8; 16]) -> Address {
        if bytes[..6] == ONION_PREFIX {
            let mut key = [0u8; 10];
            key.copy_from_slice(&bytes[6..]);
            return Address::Onion(key);
        }
        let v6 = Ipv6Addr::from(bytes);
        match v6.to_ipv4_mapped() {
            Some(v4) => Address::V4(v4),
            None => Address::V6(v6),
        }
    }

    /// Parses a `.onion` hostname (v2-style, 16-character base32 label) into
    /// its 10-byte key.
    pub fn parse_onion(label: &str) -> Result<Address, SerializationError> {
        let label = label
            .strip_suffix(".onion")
            .ok_or(SerializationError::Parse("missing .onion suffix"))?;
        let decoded = base32_decode(label).ok_or(SerializationError::Parse(
            "invalid base32 in onion address",
        ))?;
        if decoded.len() != 10 {
            return Err(SerializationError::Parse("onion address must decode to 10 bytes"));
        }
        let mut key = [0u8; 10];
        key.copy_from_slice(&decoded);
        Ok(Address::Onion(key))
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Address::V4(v4) => write!(f, "{v4}"),
            Address::V6(v6) => write!(f, "[{v6}]"),
            Address::Onion(key) => write!(f, "{}.onion", base32_encode(key)),
        }
    }
}

/// Which of the three peer network families an [`Address`] belongs to.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum Network {
    Ipv4,
    Ipv6,
    Onion,
}

/// An [`Address`] plus the port peers of this family are contacted on.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
pub struct Endpoint {
    pub address: Address,
    pub port: u16,
}

impl Endpoint {
    pub fn new(address: Address, port: u16) -> Self {
        Endpoint { address, port }
    }

    pub fn network(&self) -> Network {
        self.address.network()
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.address {
            Address::V6(_) => write!(f, "[{}]:{}", self.address, self.port),
            _ => write!(f, "{}:{}", self.address, self.port),
        }
    }
}

impl From<SocketAddr> for Endpoint {
    fn from(sa: SocketAddr) -> Self {
        match sa {
            SocketAddr::V4(v4) => Endpoint::new(Address::V4(*v4.ip()), v4.port()),
            SocketAddr::V6(v6) => Endpoint::new(Address::V6(*v6.ip()), v6.port()),
        }
    }
}

impl TryFrom<Endpoint> for SocketAddr {
    type Error = SerializationError;

    fn try_from(ep: Endpoint) -> Result<Self, Self::Error> {
        match ep.address {
            Address::V4(v4) => Ok(SocketAddr::new(v4.into(), ep.port)),
            Address::V6(v6) => Ok(SocketAddr::new(v6.into(), ep.port)),
            Address::Onion(_) => Err(SerializationError::Parse(
                "onion endpoints cannot become a SocketAddr without a proxy",
            )),
        }
    }
}

const BASE32_ALPHABET: &[u8; 32] = b"abcdefghijklmnopqrstuvwxyz234567";

fn base32_encode(data: &[u8]) -> String {
    let mut bits = 0u32;
    let mut bit_count = 0u32;
    let mut out = String::new();
    for &byte in data {
        bits = (bits << 8) | byte as u32;
        bit_count += 8;
        while bit_count >= 5 {
            bit_count -= 5;
            let idx = (bits >> bit_count) & 0x1f;
            out.push(BASE32_ALPHABET[idx as usize] as char);
        }
    }
    if bit_count > 0 {
        let idx = (bits << (5 - bit_count)) & 0x1f;
        out.push(BASE32_ALPHABET[idx as usize] as char);
    }
    out
}

fn base32_decode(label: &str) -> Option<Vec<u8>> {
    let mut bits = 0u32;
    let mut bit_count = 0u32;
    let mut out = Vec::new();
    for ch in label.chars() {
        let ch = ch.to_ascii_lowercase();
        let val = BASE32_ALPHABET.iter().position(|&c| c as char == ch)? as u32;
        bits = (bits << 5) | val;
        bit_count += 5;
        if bit_count >= 8 {
            bit_count -= 8;
            out.push(((bits >> bit_count) & 0xff) as u8);
        }
    }
    Some(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn v4_round_trips_through_wire_bytes() {
        let addr = Address::V4(Ipv4Addr::new(10, 0, 0, 1));
        let wire = addr.to_wire_bytes();
        assert_eq!(Address::from_wire_bytes(wire), addr);
    }

    #[test]
    fn v6_round_trips_through_wire_bytes() {
        let addr = Address::V6(Ipv6Addr::new(0x2001, 0xdb8, 0, 0, 0, 0, 0, 1));
        let wire = addr.to_wire_bytes();
        assert_eq!(Address::from_wire_bytes(wire), addr);
    }

    #[test]
    fn onion_round_trips_through_wire_bytes() {
        let addr = Address::Onion([1, 2, 3, 4, 5, 6, 7, 8, 9, 10]);
        let wire = addr.to_wire_bytes();
        assert_eq!(Address::from_wire_bytes(wire), addr);
    }

    #[test]
    fn onion_label_round_trips() {
        let addr = Address::Onion([0xaa; 10]);
        let rendered = addr.to_string();
        let parsed = Address::parse_onion(&rendered).unwrap();
        assert_eq!(parsed, addr);
    }

    #[test]
    fn endpoint_display_brackets_v6() {
        let ep = Endpoint::new(Address::V6(Ipv6Addr::LOCALHOST), 8333);
        assert_eq!(ep.to_string(), "[::1]:8333");
    }
}
