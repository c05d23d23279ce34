//! RFC 1035 query encoding and response parsing, A and AAAA only.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

/// Record types the resolver asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum RecordType {
    A = 1,
    Aaaa = 28,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub(crate) enum WireError {
    #[error("name does not fit a dns query")]
    BadName,
    #[error("malformed response packet")]
    Malformed,
    #[error("response id mismatch")]
    IdMismatch,
}

const FLAG_QR: u16 = 0x8000;
const FLAG_TC: u16 = 0x0200;
const FLAG_RD: u16 = 0x0100;
const CLASS_IN: u16 = 1;

/// One recursive-desired question for `name`.
pub(crate) fn encode_query(id: u16, name: &str, rtype: RecordType) -> Result<Vec<u8>, WireError> {
    if name.is_empty() || name.len() > 253 {
        return Err(WireError::BadName);
    }
    let mut packet = Vec::with_capacity(17 + name.len());
    packet.extend_from_slice(&id.to_be_bytes());
    packet.extend_from_slice(&FLAG_RD.to_be_bytes());
    packet.extend_from_slice(&1u16.to_be_bytes()); // QDCOUNT
    packet.extend_from_slice(&0u16.to_be_bytes()); // ANCOUNT
    packet.extend_from_slice(&0u16.to_be_bytes()); // NSCOUNT
    packet.extend_from_slice(&0u16.to_be_bytes()); // ARCOUNT

    for label in name.trim_end_matches('.').split('.') {
        if label.is_empty() || label.len() > 63 {
            return Err(WireError::BadName);
        }
        packet.push(label.len() as u8);
        packet.extend_from_slice(label.as_bytes());
    }
    packet.push(0);
    packet.extend_from_slice(&(rtype as u16).to_be_bytes());
    packet.extend_from_slice(&CLASS_IN.to_be_bytes());
    Ok(packet)
}

/// What a parsed response amounts to.
#[derive(Debug, PartialEq, Eq)]
pub(crate) struct Response {
    /// TC bit: the answer did not fit the datagram.
    pub truncated: bool,
    /// RCODE from the header (3 = NXDOMAIN).
    pub rcode: u8,
    /// A/AAAA answers with their TTLs; other record types are skipped.
    pub answers: Vec<(IpAddr, u32)>,
}

pub(crate) const RCODE_NXDOMAIN: u8 = 3;

/// Parses a response datagram, verifying it answers query `expect_id`.
pub(crate) fn parse_response(packet: &[u8], expect_id: u16) -> Result<Response, WireError> {
    if packet.len() < 12 {
        return Err(WireError::Malformed);
    }
    let id = u16::from_be_bytes([packet[0], packet[1]]);
    if id != expect_id {
        return Err(WireError::IdMismatch);
    }
    let flags = u16::from_be_bytes([packet[2], packet[3]]);
    if flags & FLAG_QR == 0 {
        return Err(WireError::Malformed);
    }
    let qdcount = u16::from_be_bytes([packet[4], packet[5]]);
    let ancount = u16::from_be_bytes([packet[6], packet[7]]);

    let mut pos = 12;
    for _ in 0..qdcount {
        pos = skip_name(packet, pos)?;
        pos = checked_add(packet, pos, 4)?; // QTYPE + QCLASS
    }

    let mut answers = Vec::new();
    for _ in 0..ancount {
        pos = skip_name(packet, pos)?;
        if packet.len() < pos + 10 {
            return Err(WireError::Malformed);
        }
        let rtype = u16::from_be_bytes([packet[pos], packet[pos + 1]]);
        let ttl = u32::from_be_bytes([
            packet[pos + 4],
            packet[pos + 5],
            packet[pos + 6],
            packet[pos + 7],
        ]);
        let rdlength = u16::from_be_bytes([packet[pos + 8], packet[pos + 9]]) as usize;
        pos = checked_add(packet, pos, 10)?;
        if packet.len() < pos + rdlength {
            return Err(WireError::Malformed);
        }
        let rdata = &packet[pos..pos + rdlength];
        pos += rdlength;

        match (rtype, rdlength) {
            (t, 4) if t == RecordType::A as u16 => {
                let octets: [u8; 4] = rdata.try_into().unwrap();
                answers.push((IpAddr::V4(Ipv4Addr::from(octets)), ttl));
            }
            (t, 16) if t == RecordType::Aaaa as u16 => {
                let octets: [u8; 16] = rdata.try_into().unwrap();
                answers.push((IpAddr::V6(Ipv6Addr::from(octets)), ttl));
            }
            _ => {} // CNAME chains etc.; only address records matter here
        }
    }

    Ok(Response {
        truncated: flags & FLAG_TC != 0,
        rcode: (flags & 0x000f) as u8,
        answers,
    })
}

/// Advances past a possibly-compressed name.
fn skip_name(packet: &[u8], mut pos: usize) -> Result<usize, WireError> {
    let mut hops = 0;
    loop {
        let &len = packet.get(pos).ok_or(WireError::Malformed)?;
        if len & 0xc0 == 0xc0 {
            // Compression pointer ends the name.
            return checked_add(packet, pos, 2);
        }
        if len == 0 {
            return checked_add(packet, pos, 1);
        }
        pos = checked_add(packet, pos, 1 + len as usize)?;
        hops += 1;
        if hops > 128 {
            return Err(WireError::Malformed);
        }
    }
}

fn checked_add(packet: &[u8], pos: usize, n: usize) -> Result<usize, WireError> {
    let next = pos + n;
    if next > packet.len() {
        return Err(WireError::Malformed);
    }
    Ok(next)
}
