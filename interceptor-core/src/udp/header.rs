//! UDP datagram header parsing and serialization.

use std::net::Ipv4Addr;

use crate::checksum::Checksum;
use crate::error::Error;

const HEADER_LEN: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UdpHeader {
    pub source_port: u16,
    pub destination_port: u16,
}

impl UdpHeader {
    pub fn parse(
        bytes: &[u8],
        source_addr: Ipv4Addr,
        destination_addr: Ipv4Addr,
    ) -> Result<(Self, &[u8]), Error> {
        if bytes.len() < HEADER_LEN {
            return Err(Error::MalformedFrame("udp datagram too short"));
        }
        let length = u16::from_be_bytes([bytes[4], bytes[5]]) as usize;
        if length < HEADER_LEN || length > bytes.len() {
            return Err(Error::MalformedFrame("udp length inconsistent"));
        }

        let checksum_field = u16::from_be_bytes([bytes[6], bytes[7]]);
        if checksum_field != 0 {
            let mut checksum = Checksum::new();
            checksum.add_u32(source_addr.octets());
            checksum.add_u32(destination_addr.octets());
            checksum.add_u8_pair(0, crate::ipv4::PROTOCOL_UDP);
            checksum.add_u16(length as u16);
            let mut words = bytes[..length].chunks_exact(2);
            for word in &mut words {
                checksum.add_u16(u16::from_be_bytes([word[0], word[1]]));
            }
            if let [last] = words.remainder() {
                checksum.add_u8_pair(*last, 0);
            }
            if checksum.as_u16() != 0 {
                return Err(Error::MalformedFrame("udp checksum invalid"));
            }
        }

        let header = Self {
            source_port: u16::from_be_bytes([bytes[0], bytes[1]]),
            destination_port: u16::from_be_bytes([bytes[2], bytes[3]]),
        };
        Ok((header, &bytes[HEADER_LEN..length]))
    }

    pub fn serialize_into(
        &self,
        out: &mut Vec<u8>,
        payload: &[u8],
        source_addr: Ipv4Addr,
        destination_addr: Ipv4Addr,
    ) -> Result<(), Error> {
        let length = HEADER_LEN + payload.len();
        if length > u16::MAX as usize {
            return Err(Error::SerializeError("udp datagram too large"));
        }

        out.clear();
        out.reserve(length);
        out.extend_from_slice(&self.source_port.to_be_bytes());
        out.extend_from_slice(&self.destination_port.to_be_bytes());
        out.extend_from_slice(&(length as u16).to_be_bytes());
        out.extend_from_slice(&[0, 0]); // checksum placeholder
        out.extend_from_slice(payload);

        let mut checksum = Checksum::new();
        checksum.add_u32(source_addr.octets());
        checksum.add_u32(destination_addr.octets());
        checksum.add_u8_pair(0, crate::ipv4::PROTOCOL_UDP);
        checksum.add_u16(length as u16);
        let mut words = out.chunks_exact(2);
        for word in &mut words {
            checksum.add_u16(u16::from_be_bytes([word[0], word[1]]));
        }
        if let [last] = words.remainder() {
            checksum.add_u8_pair(*last, 0);
        }
        let checksum = checksum.as_u16();
        out[6..8].copy_from_slice(&checksum.to_be_bytes());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_a_datagram() {
        let source_addr = Ipv4Addr::new(10, 0, 0, 1);
        let destination_addr = Ipv4Addr::new(8, 8, 8, 8);
        let header = UdpHeader {
            source_port: 55000,
            destination_port: 53,
        };
        let mut buf = Vec::new();
        header
            .serialize_into(&mut buf, b"query", source_addr, destination_addr)
            .unwrap();
        let (parsed, payload) = UdpHeader::parse(&buf, source_addr, destination_addr).unwrap();
        assert_eq!(parsed, header);
        assert_eq!(payload, b"query");
    }
}
