//! Minimal DNS wire codec: header, question, and the handful of resource
//! record types this responder ever emits (A, AAAA, NS, SOA).
//!
//! This is not a general-purpose DNS library: only single-question
//! queries are parsed, and answer names are always written as a
//! compression pointer back to the question, since every record this
//! zone serves shares that name.

use std::net::{Ipv4Addr, Ipv6Addr};

use byteorder::{BigEndian, ByteOrder};

use crate::error::DnsError;

pub const HEADER_LEN: usize = 12;

/// Pointer to offset 12, immediately after the header, where the
/// question's name always begins in a packet we write.
const QUESTION_NAME_POINTER: u16 = 0xC00C;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum RecordType {
    A,
    Aaaa,
    Ns,
    Soa,
    Any,
    Other(u16),
}

impl RecordType {
    pub fn from_u16(value: u16) -> Self {
        match value {
            1 => RecordType::A,
            28 => RecordType::Aaaa,
            2 => RecordType::Ns,
            6 => RecordType::Soa,
            255 => RecordType::Any,
            other => RecordType::Other(other),
        }
    }

    pub fn to_u16(self) -> u16 {
        match self {
            RecordType::A => 1,
            RecordType::Aaaa => 28,
            RecordType::Ns => 2,
            RecordType::Soa => 6,
            RecordType::Any => 255,
            RecordType::Other(v) => v,
        }
    }
}

#[derive(Clone, Debug)]
pub struct Query {
    pub id: u16,
    pub recursion_desired: bool,
    pub name: String,
    pub qtype: RecordType,
}

/// Parses a UDP datagram into its transaction id, question name, and
/// question type. Only single-question queries are accepted — every real
/// stub resolver sends exactly one, and accepting more would mean
/// answering a shape of query this zone never needs to support.
pub fn parse_query(packet: &[u8]) -> Result<Query, DnsError> {
    if packet.len() < HEADER_LEN {
        return Err(DnsError::Malformed("packet shorter than a dns header"));
    }
    let id = BigEndian::read_u16(&packet[0..2]);
    let flags = BigEndian::read_u16(&packet[2..4]);
    if (flags >> 15) & 1 != 0 {
        return Err(DnsError::Malformed("response bit set on a query"));
    }
    let recursion_desired = (flags >> 8) & 1 == 1;
    let qdcount = BigEndian::read_u16(&packet[4..6]);
    if qdcount != 1 {
        return Err(DnsError::Malformed("only single-question queries are supported"));
    }

    let mut pos = HEADER_LEN;
    let name = read_name(packet, &mut pos)?;
    if pos + 4 > packet.len() {
        return Err(DnsError::Malformed("truncated question"));
    }
    let qtype = RecordType::from_u16(BigEndian::read_u16(&packet[pos..pos + 2]));

    Ok(Query {
        id,
        recursion_desired,
        name,
        qtype,
    })
}

fn read_name(packet: &[u8], pos: &mut usize) -> Result<String, DnsError> {
    let mut labels = Vec::new();
    let mut jumped = false;
    let mut cursor = *pos;
    let mut guard = 0;
    loop {
        guard += 1;
        if guard > 128 {
            return Err(DnsError::Malformed("name compressed too deeply"));
        }
        let len = *packet
            .get(cursor)
            .ok_or(DnsError::Malformed("name runs past packet end"))? as usize;
        if len == 0 {
            cursor += 1;
            if !jumped {
                *pos = cursor;
            }
            break;
        }
        if len & 0xC0 == 0xC0 {
            if cursor + 1 >= packet.len() {
                return Err(DnsError::Malformed("truncated compression pointer"));
            }
            let pointer = ((len & 0x3F) << 8) | packet[cursor + 1] as usize;
            if !jumped {
                *pos = cursor + 2;
            }
            jumped = true;
            cursor = pointer;
            continue;
        }
        if len > 63 {
            return Err(DnsError::Malformed("label longer than 63 bytes"));
        }
        let start = cursor + 1;
        let end = start + len;
        let label = packet
            .get(start..end)
            .ok_or(DnsError::Malformed("label runs past packet end"))?;
        labels.push(String::from_utf8_lossy(label).to_ascii_lowercase());
        cursor = end;
    }
    Ok(labels.join("."))
}

fn write_name(buf: &mut Vec<u8>, name: &str) {
    if name.is_empty() {
        buf.push(0);
        return;
    }
    for label in name.split('.') {
        let bytes = label.as_bytes();
        buf.push(bytes.len() as u8);
        buf.extend_from_slice(bytes);
    }
    buf.push(0);
}

#[derive(Clone, Debug)]
pub enum RData {
    A(Ipv4Addr),
    Aaaa(Ipv6Addr),
    Name(String),
    Soa {
        mname: String,
        rname: String,
        serial: u32,
        refresh: u32,
        retry: u32,
        expire: u32,
        minimum: u32,
    },
}

pub struct Answer {
    pub rtype: RecordType,
    pub ttl: u32,
    pub rdata: RData,
}

/// Builds a complete response packet, truncating (TC bit, empty answer
/// section) if the full encoding would exceed `max_len` — 512 bytes for
/// plain UDP.
pub fn build_response(query: &Query, answers: &[Answer], max_len: usize) -> Vec<u8> {
    let full = encode_response(query, answers, false);
    if full.len() <= max_len {
        return full;
    }
    encode_response(query, &[], true)
}

fn encode_response(query: &Query, answers: &[Answer], truncated: bool) -> Vec<u8> {
    let mut buf = Vec::with_capacity(64 + answers.len() * 32);
    buf.extend_from_slice(&query.id.to_be_bytes());

    let mut flags: u16 = 0x8000; // QR
    flags |= 1 << 10; // AA
    if truncated {
        flags |= 1 << 9; // TC
    }
    // RA stays 0: this responder never recurses.
    buf.extend_from_slice(&flags.to_be_bytes());

    buf.extend_from_slice(&1u16.to_be_bytes()); // QDCOUNT
    buf.extend_from_slice(&(answers.len() as u16).to_be_bytes()); // ANCOUNT
    buf.extend_from_slice(&0u16.to_be_bytes()); // NSCOUNT
    buf.extend_from_slice(&0u16.to_be_bytes()); // ARCOUNT

    write_name(&mut buf, &query.name);
    buf.extend_from_slice(&query.qtype.to_u16().to_be_bytes());
    buf.extend_from_slice(&1u16.to_be_bytes()); // QCLASS IN

    for answer in answers {
        buf.extend_from_slice(&QUESTION_NAME_POINTER.to_be_bytes());
        buf.extend_from_slice(&answer.rtype.to_u16().to_be_bytes());
        buf.extend_from_slice(&1u16.to_be_bytes()); // CLASS IN
        buf.extend_from_slice(&answer.ttl.to_be_bytes());

        let rdata_start = buf.len();
        buf.extend_from_slice(&0u16.to_be_bytes()); // RDLENGTH placeholder
        match &answer.rdata {
            RData::A(addr) => buf.extend_from_slice(&addr.octets()),
            RData::Aaaa(addr) => buf.extend_from_slice(&addr.octets()),
            RData::Name(name) => write_name(&mut buf, name),
            RData::Soa {
                mname,
                rname,
                serial,
                refresh,
                retry,
                expire,
                minimum,
            } => {
                write_name(&mut buf, mname);
                write_name(&mut buf, rname);
                buf.extend_from_slice(&serial.to_be_bytes());
                buf.extend_from_slice(&refresh.to_be_bytes());
                buf.extend_from_slice(&retry.to_be_bytes());
                buf.extend_from_slice(&expire.to_be_bytes());
                buf.extend_from_slice(&minimum.to_be_bytes());
            }
        }
        let rdlength = (buf.len() - rdata_start - 2) as u16;
        buf[rdata_start..rdata_start + 2].copy_from_slice(&rdlength.to_be_bytes());
    }

    buf
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_query(name: &str, qtype: RecordType) -> Vec<u8> {
        let mut buf = Vec::new();
        buf.extend_from_slice(&0x1234u16.to_be_bytes());
        buf.extend_from_slice(&0x0100u16.to_be_bytes()); // RD=1
        buf.extend_from_slice(&1u16.to_be_bytes());
        buf.extend_from_slice(&0u16.to_be_bytes());
        buf.extend_from_slice(&0u16.to_be_bytes());
        buf.extend_from_slice(&0u16.to_be_bytes());
        write_name(&mut buf, name);
        buf.extend_from_slice(&qtype.to_u16().to_be_bytes());
        buf.extend_from_slice(&1u16.to_be_bytes());
        buf
    }

    #[test]
    fn parses_a_well_formed_query() {
        let packet = sample_query("seed.example.com", RecordType::A);
        let query = parse_query(&packet).unwrap();
        assert_eq!(query.id, 0x1234);
        assert_eq!(query.name, "seed.example.com");
        assert_eq!(query.qtype, RecordType::A);
        assert!(query.recursion_desired);
    }

    #[test]
    fn rejects_multi_question_packets() {
        let mut packet = sample_query("seed.example.com", RecordType::A);
        packet[5] = 2; // QDCOUNT = 2
        assert!(parse_query(&packet).is_err());
    }

    #[test]
    fn response_echoes_id_and_sets_aa_not_tc() {
        let packet = sample_query("seed.example.com", RecordType::A);
        let query = parse_query(&packet).unwrap();
        let answers = vec![Answer {
            rtype: RecordType::A,
            ttl: 3600,
            rdata: RData::A(Ipv4Addr::new(10, 0, 0, 1)),
        }];
        let response = build_response(&query, &answers, 512);
        assert_eq!(BigEndian::read_u16(&response[0..2]), 0x1234);
        let flags = BigEndian::read_u16(&response[2..4]);
        assert_eq!(flags & 0x8000, 0x8000);
        assert_eq!(flags & 0x0400, 0x0400);
        assert_eq!(flags & 0x0200, 0);
    }

    #[test]
    fn truncates_when_answer_section_is_too_large() {
        let packet = sample_query("seed.example.com", RecordType::A);
        let query = parse_query(&packet).unwrap();
        let answers: Vec<Answer> = (0..100)
            .map(|i| Answer {
                rtype: RecordType::A,
                ttl: 3600,
                rdata: RData::A(Ipv4Addr::new(10, 0, 0, i as u8)),
            })
            .collect();
        let response = build_response(&query, &answers, 512);
        let flags = BigEndian::read_u16(&response[2..4]);
        assert_eq!(flags & 0x0200, 0x0200);
        assert_eq!(BigEndian::read_u16(&response[6..8]), 0);
    }
}
