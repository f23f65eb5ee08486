//! The wire `addr` message: a list of gossiped peer endpoints with metadata.

use std::io::{Read, Write};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

use crate::endpoint::Endpoint;
use crate::error::SerializationError;
use crate::serialization::{
    ReadWireExt, TrustedPreallocate, WireDeserialize, WireSerialize, WriteWireExt,
};
use crate::services::ServiceFlags;

/// One entry of an `addr` message: a gossiped endpoint, the services its
/// sender last observed it advertising, and when it was last seen.
///
/// This is the wire counterpart of `seeder_network::PeerRecord` — it's what
/// peers exchange, stripped down to only the fields the protocol carries.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct AddrEntry {
    /// Unix timestamp the sending peer last interacted with this address.
    pub timestamp: u32,
    pub services: ServiceFlags,
    pub endpoint: Endpoint,
}

/// A serialized `AddrEntry` is 4 bytes of timestamp, 8 bytes of services,
/// and a 16-byte address + 2-byte port endpoint.
const ADDR_ENTRY_SIZE: usize = 4 + 8 + 16 + 2;

/// The maximum size of a single peer-to-peer protocol message, used to
/// bound how many `AddrEntry` values an incoming `addr` message is allowed
/// to claim without us trusting its length prefix outright.
pub const MAX_PROTOCOL_MESSAGE_LEN: usize = 4 * 1024 * 1024;

impl WireSerialize for AddrEntry {
    fn wire_serialize<W: Write>(&self, mut writer: W) -> std::io::Result<()> {
        writer.write_u32::<LittleEndian>(self.timestamp)?;
        writer.write_u64::<LittleEndian>(self.services.bits())?;
        writer.write_endpoint(&self.endpoint)?;
        Ok(())
    }
}

impl WireDeserialize for AddrEntry {
    fn wire_deserialize<R: Read>(mut reader: R) -> Result<Self, SerializationError> {
        let timestamp = reader.read_u32::<LittleEndian>()?;
        let services = ServiceFlags::from_bits_truncate(reader.read_u64::<LittleEndian>()?);
        let endpoint = reader.read_endpoint()?;
        Ok(AddrEntry {
            timestamp,
            services,
            endpoint,
        })
    }
}

impl TrustedPreallocate for AddrEntry {
    fn max_allocation() -> u64 {
        // A length prefix takes at least one byte, so a single message can
        // never actually contain more entries than this bound even if the
        // prefix claims otherwise.
        ((MAX_PROTOCOL_MESSAGE_LEN - 1) / ADDR_ENTRY_SIZE) as u64
    }
}

/// Parses a complete `addr` message body: a `CompactSize` count followed by
/// that many [`AddrEntry`] values.
///
/// A malformed individual entry is discarded rather than failing the
/// whole message: decoding stops at the first entry that doesn't parse
/// and returns everything decoded so far. The `count` prefix is clamped
/// against [`AddrEntry::max_allocation`] before any allocation happens.
pub fn parse_addr_list<R: Read>(mut reader: R) -> Result<Vec<AddrEntry>, SerializationError> {
    let count = reader.read_compact_size()?;
    let count = count.min(AddrEntry::max_allocation());
    let mut out = Vec::with_capacity(count as usize);
    for _ in 0..count {
        match AddrEntry::wire_deserialize(&mut reader) {
            Ok(entry) => out.push(entry),
            Err(_) => break,
        }
    }
    Ok(out)
}

pub fn write_addr_list<W: Write>(mut writer: W, entries: &[AddrEntry]) -> std::io::Result<()> {
    writer.write_compact_size(entries.len() as u64)?;
    for entry in entries {
        entry.wire_serialize(&mut writer)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::endpoint::Address;
    use std::net::Ipv4Addr;

    fn sample_entry(last_octet: u8) -> AddrEntry {
        AddrEntry {
            timestamp: 1_700_000_000,
            services: ServiceFlags::NODE_NETWORK,
            endpoint: Endpoint::new(Address::V4(Ipv4Addr::new(10, 0, 0, last_octet)), 9333),
        }
    }

    #[test]
    fn addr_list_round_trips() {
        let entries = vec![sample_entry(1), sample_entry(2), sample_entry(3)];
        let mut buf = Vec::new();
        write_addr_list(&mut buf, &entries).unwrap();
        let decoded = parse_addr_list(&buf[..]).unwrap();
        assert_eq!(decoded, entries);
    }

    #[test]
    fn truncated_entry_is_dropped_not_fatal() {
        let entries = vec![sample_entry(1), sample_entry(2)];
        let mut buf = Vec::new();
        write_addr_list(&mut buf, &entries).unwrap();
        buf.truncate(buf.len() - 4); // cut the last entry short
        let decoded = parse_addr_list(&buf[..]).unwrap();
        assert_eq!(decoded, vec![entries[0]]);
    }
}
