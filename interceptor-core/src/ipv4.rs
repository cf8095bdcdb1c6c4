//! Minimal IPv4 header parsing and serialization.
//!
//! Only what the datapath needs: no options, no fragmentation, no IP-level
//! reassembly. `spec.md`'s Non-goals explicitly exclude path-MTU discovery
//! and fragment reassembly, so every header this module emits has the DF
//! bit clear, a fragment offset of zero, and an IHL of exactly 5 words.

use std::net::Ipv4Addr;

use crate::checksum::Checksum;
use crate::error::Error;

pub const PROTOCOL_TCP: u8 = 6;
pub const PROTOCOL_UDP: u8 = 17;

const HEADER_LEN: usize = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ipv4Header {
    pub ttl: u8,
    pub protocol: u8,
    pub identification: u16,
    pub source: Ipv4Addr,
    pub destination: Ipv4Addr,
}

impl Ipv4Header {
    /// Parses a header from the front of `bytes`, returning the header and
    /// the remaining bytes (the payload, IP options notwithstanding since we
    /// reject any frame that carries them). Verifies the header checksum;
    /// a mismatch is reported as [`Error::MalformedFrame`].
    pub fn parse(bytes: &[u8]) -> Result<(Self, &[u8]), Error> {
        if bytes.len() < HEADER_LEN {
            return Err(Error::MalformedFrame("ipv4 header too short"));
        }

        let version_ihl = bytes[0];
        let version = version_ihl >> 4;
        let ihl = (version_ihl & 0x0f) as usize;
        if version != 4 {
            return Err(Error::MalformedFrame("not an ipv4 frame"));
        }
        if ihl != 5 {
            return Err(Error::MalformedFrame("ipv4 options are not supported"));
        }

        let total_length = u16::from_be_bytes([bytes[2], bytes[3]]) as usize;
        if total_length > bytes.len() || total_length < HEADER_LEN {
            return Err(Error::MalformedFrame("ipv4 total length inconsistent"));
        }

        let identification = u16::from_be_bytes([bytes[4], bytes[5]]);
        let ttl = bytes[8];
        let protocol = bytes[9];
        let source = Ipv4Addr::new(bytes[12], bytes[13], bytes[14], bytes[15]);
        let destination = Ipv4Addr::new(bytes[16], bytes[17], bytes[18], bytes[19]);

        let mut checksum = Checksum::new();
        let mut words = bytes[..HEADER_LEN].chunks_exact(2);
        for word in &mut words {
            checksum.add_u16(u16::from_be_bytes([word[0], word[1]]));
        }
        if checksum.as_u16() != 0 {
            return Err(Error::MalformedFrame("ipv4 header checksum invalid"));
        }

        let header = Self {
            ttl,
            protocol,
            identification,
            source,
            destination,
        };
        Ok((header, &bytes[HEADER_LEN..total_length]))
    }

    /// Serializes this header into `out`, followed by `payload`. `out` is
    /// cleared first; the caller owns the resulting buffer and may enqueue
    /// it directly.
    pub fn serialize_into(&self, out: &mut Vec<u8>, payload: &[u8]) -> Result<(), Error> {
        let total_length = HEADER_LEN + payload.len();
        if total_length > u16::MAX as usize {
            return Err(Error::SerializeError("ipv4 payload too large"));
        }

        out.clear();
        out.reserve(total_length);
        out.push(0x45); // version 4, IHL 5
        out.push(0); // DSCP/ECN unused
        out.extend_from_slice(&(total_length as u16).to_be_bytes());
        out.extend_from_slice(&self.identification.to_be_bytes());
        out.extend_from_slice(&0u16.to_be_bytes()); // flags=0 (no DF), fragment offset 0
        out.push(self.ttl);
        out.push(self.protocol);
        out.extend_from_slice(&[0, 0]); // checksum placeholder
        out.extend_from_slice(&self.source.octets());
        out.extend_from_slice(&self.destination.octets());

        let mut checksum = Checksum::new();
        for word in out[..HEADER_LEN].chunks_exact(2) {
            checksum.add_u16(u16::from_be_bytes([word[0], word[1]]));
        }
        let checksum = checksum.as_u16();
        out[10..12].copy_from_slice(&checksum.to_be_bytes());

        out.extend_from_slice(payload);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_a_header() {
        let header = Ipv4Header {
            ttl: 10,
            protocol: PROTOCOL_TCP,
            identification: 42,
            source: Ipv4Addr::new(10, 0, 0, 1),
            destination: Ipv4Addr::new(93, 184, 216, 34),
        };
        let mut buf = Vec::new();
        header.serialize_into(&mut buf, b"hello").unwrap();
        let (parsed, payload) = Ipv4Header::parse(&buf).unwrap();
        assert_eq!(parsed, header);
        assert_eq!(payload, b"hello");
    }

    #[test]
    fn rejects_bad_checksum() {
        let header = Ipv4Header {
            ttl: 10,
            protocol: PROTOCOL_TCP,
            identification: 1,
            source: Ipv4Addr::new(1, 2, 3, 4),
            destination: Ipv4Addr::new(5, 6, 7, 8),
        };
        let mut buf = Vec::new();
        header.serialize_into(&mut buf, b"x").unwrap();
        buf[10] ^= 0xff;
        assert!(Ipv4Header::parse(&buf).is_err());
    }
}
