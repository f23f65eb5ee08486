//! Wire (de)serialization traits for peer-to-peer protocol values.
//!
//! A pair of traits for types that can round-trip through the wire
//! format, small `Read`/`Write` extension traits for the primitives those
//! impls need, and [`TrustedPreallocate`] so callers can bound how much
//! memory a variable-length list is allowed to pre-allocate based on an
//! untrusted length prefix.

use std::io::{self, Read, Write};
use std::net::SocketAddr;

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

use crate::endpoint::{Address, Endpoint};
use crate::error::SerializationError;

/// A type that knows how to write itself in wire format.
pub trait WireSerialize {
    fn wire_serialize<W: Write>(&self, writer: W) -> io::Result<()>;
}

/// A type that knows how to read itself from wire format.
pub trait WireDeserialize: Sized {
    fn wire_deserialize<R: Read>(reader: R) -> Result<Self, SerializationError>;
}

/// Bounds how many elements of `Self` a length-prefixed list is allowed to
/// pre-allocate, so a malicious or corrupt length field can't be used to
/// force an over-large allocation before the rest of the message arrives.
pub trait TrustedPreallocate {
    fn max_allocation() -> u64;
}

/// `Read` helpers for the handful of fixed-size fields peer messages use.
pub trait ReadWireExt: Read {
    fn read_16_bytes(&mut self) -> io::Result<[u8; 16]> {
        let mut buf = [0u8; 16];
        self.read_exact(&mut buf)?;
        Ok(buf)
    }

    fn read_10_bytes(&mut self) -> io::Result<[u8; 10]> {
        let mut buf = [0u8; 10];
        self.read_exact(&mut buf)?;
        Ok(buf)
    }

    /// Reads a 16-byte address plus a big-endian port, as used by
    /// `CAddress`-style peer address entries.
    fn read_endpoint(&mut self) -> io::Result<Endpoint> {
        let bytes = self.read_16_bytes()?;
        let port = ReadBytesExt::read_u16::<byteorder::BigEndian>(self)?;
        Ok(Endpoint::new(Address::from_wire_bytes(bytes), port))
    }

    /// Reads a Bitcoin-style variable-length integer (`CompactSize`).
    fn read_compact_size(&mut self) -> io::Result<u64> {
        let first = self.read_u8()?;
        match first {
            0..=0xfc => Ok(first as u64),
            0xfd => Ok(self.read_u16::<LittleEndian>()? as u64),
            0xfe => Ok(self.read_u32::<LittleEndian>()? as u64),
            0xff => self.read_u64::<LittleEndian>(),
        }
    }
}

impl<R: Read + ?Sized> ReadWireExt for R {}

/// `Write` helpers mirroring [`ReadWireExt`].
pub trait WriteWireExt: Write {
    fn write_endpoint(&mut self, endpoint: &Endpoint) -> io::Result<()> {
        self.write_all(&endpoint.address.to_wire_bytes())?;
        WriteBytesExt::write_u16::<byteorder::BigEndian>(self, endpoint.port)
    }

    fn write_socket_addr(&mut self, addr: SocketAddr) -> io::Result<()> {
        self.write_endpoint(&Endpoint::from(addr))
    }

    fn write_compact_size(&mut self, value: u64) -> io::Result<()> {
        match value {
            0..=0xfc => self.write_u8(value as u8),
            0xfd..=0xffff => {
                self.write_u8(0xfd)?;
                self.write_u16::<LittleEndian>(value as u16)
            }
            0x1_0000..=0xffff_ffff => {
                self.write_u8(0xfe)?;
                self.write_u32::<LittleEndian>(value as u32)
            }
            _ => {
                self.write_u8(0xff)?;
                self.write_u64::<LittleEndian>(value)
            }
        }
    }
}

impl<W: Write + ?Sized> WriteWireExt for W {}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    #[test]
    fn endpoint_round_trips_through_wire_io() {
        let ep = Endpoint::new(Address::V4(Ipv4Addr::new(127, 0, 0, 1)), 9333);
        let mut buf = Vec::new();
        buf.write_endpoint(&ep).unwrap();
        let mut cursor = &buf[..];
        let decoded = cursor.read_endpoint().unwrap();
        assert_eq!(decoded, ep);
    }

    #[test]
    fn compact_size_round_trips_boundaries() {
        for value in [0u64, 0xfc, 0xfd, 0xffff, 0x1_0000, 0xffff_ffff, u64::MAX] {
            let mut buf = Vec::new();
            buf.write_compact_size(value).unwrap();
            let mut cursor = &buf[..];
            assert_eq!(cursor.read_compact_size().unwrap(), value);
        }
    }
}
