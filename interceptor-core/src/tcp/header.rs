//! TCP segment header parsing and serialization.
//!
//! No options are parsed or emitted (not even MSS) and no urgent pointer
//! support exists; `spec.md` calls for a fixed receive window and a
//! datapath that never negotiates anything beyond the bare handshake.

use std::net::Ipv4Addr;

use crate::checksum::Checksum;
use crate::error::Error;

const HEADER_LEN: usize = 20;

/// The subset of TCP control bits this datapath understands.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Control {
    pub syn: bool,
    pub ack: bool,
    pub fin: bool,
    pub rst: bool,
    pub psh: bool,
}

impl Control {
    pub const fn syn() -> Self {
        Self {
            syn: true,
            ..Self::EMPTY
        }
    }

    pub const fn syn_ack() -> Self {
        Self {
            syn: true,
            ack: true,
            ..Self::EMPTY
        }
    }

    pub const fn ack() -> Self {
        Self {
            ack: true,
            ..Self::EMPTY
        }
    }

    pub const fn fin_ack() -> Self {
        Self {
            fin: true,
            ack: true,
            ..Self::EMPTY
        }
    }

    pub const fn rst_ack() -> Self {
        Self {
            rst: true,
            ack: true,
            ..Self::EMPTY
        }
    }

    pub const fn psh_ack() -> Self {
        Self {
            psh: true,
            ack: true,
            ..Self::EMPTY
        }
    }

    const EMPTY: Self = Self {
        syn: false,
        ack: false,
        fin: false,
        rst: false,
        psh: false,
    };

    fn from_bits(bits: u8) -> Self {
        Self {
            fin: bits & 0b0000_0001 != 0,
            syn: bits & 0b0000_0010 != 0,
            rst: bits & 0b0000_0100 != 0,
            psh: bits & 0b0000_1000 != 0,
            ack: bits & 0b0001_0000 != 0,
        }
    }

    fn to_bits(self) -> u8 {
        let mut bits = 0u8;
        if self.fin {
            bits |= 0b0000_0001;
        }
        if self.syn {
            bits |= 0b0000_0010;
        }
        if self.rst {
            bits |= 0b0000_0100;
        }
        if self.psh {
            bits |= 0b0000_1000;
        }
        if self.ack {
            bits |= 0b0001_0000;
        }
        bits
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TcpHeader {
    pub source_port: u16,
    pub destination_port: u16,
    pub sequence: u32,
    pub acknowledgment: u32,
    pub control: Control,
    pub window: u16,
}

impl TcpHeader {
    /// Parses a segment, validating its checksum against the IPv4
    /// pseudo-header. Returns the header and the remaining payload bytes.
    pub fn parse(
        bytes: &[u8],
        source_addr: Ipv4Addr,
        destination_addr: Ipv4Addr,
    ) -> Result<(Self, &[u8]), Error> {
        if bytes.len() < HEADER_LEN {
            return Err(Error::MalformedFrame("tcp segment too short"));
        }

        let data_offset = (bytes[12] >> 4) as usize * 4;
        if data_offset != HEADER_LEN {
            return Err(Error::MalformedFrame("tcp options are not supported"));
        }

        let mut checksum = Checksum::new();
        pseudo_header(
            &mut checksum,
            source_addr,
            destination_addr,
            bytes.len() as u16,
        );
        let mut words = bytes.chunks_exact(2);
        for word in &mut words {
            checksum.add_u16(u16::from_be_bytes([word[0], word[1]]));
        }
        if let [last] = words.remainder() {
            checksum.add_u8_pair(*last, 0);
        }
        if checksum.as_u16() != 0 {
            return Err(Error::MalformedFrame("tcp checksum invalid"));
        }

        let header = Self {
            source_port: u16::from_be_bytes([bytes[0], bytes[1]]),
            destination_port: u16::from_be_bytes([bytes[2], bytes[3]]),
            sequence: u32::from_be_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]),
            acknowledgment: u32::from_be_bytes([bytes[8], bytes[9], bytes[10], bytes[11]]),
            control: Control::from_bits(bytes[13]),
            window: u16::from_be_bytes([bytes[14], bytes[15]]),
        };
        Ok((header, &bytes[HEADER_LEN..]))
    }

    /// Serializes this header and `payload` into `out`, computing the
    /// pseudo-header checksum over `source_addr`/`destination_addr`.
    pub fn serialize_into(
        &self,
        out: &mut Vec<u8>,
        payload: &[u8],
        source_addr: Ipv4Addr,
        destination_addr: Ipv4Addr,
    ) -> Result<(), Error> {
        let total_len = HEADER_LEN + payload.len();
        if total_len > u16::MAX as usize {
            return Err(Error::SerializeError("tcp segment too large"));
        }

        out.clear();
        out.reserve(total_len);
        out.extend_from_slice(&self.source_port.to_be_bytes());
        out.extend_from_slice(&self.destination_port.to_be_bytes());
        out.extend_from_slice(&self.sequence.to_be_bytes());
        out.extend_from_slice(&self.acknowledgment.to_be_bytes());
        out.push(((HEADER_LEN / 4) as u8) << 4);
        out.push(self.control.to_bits());
        out.extend_from_slice(&self.window.to_be_bytes());
        out.extend_from_slice(&[0, 0]); // checksum placeholder
        out.extend_from_slice(&[0, 0]); // urgent pointer, unused
        out.extend_from_slice(payload);

        let mut checksum = Checksum::new();
        pseudo_header(&mut checksum, source_addr, destination_addr, total_len as u16);
        let mut words = out.chunks_exact(2);
        for word in &mut words {
            checksum.add_u16(u16::from_be_bytes([word[0], word[1]]));
        }
        if let [last] = words.remainder() {
            checksum.add_u8_pair(*last, 0);
        }
        let checksum = checksum.as_u16();
        out[16..18].copy_from_slice(&checksum.to_be_bytes());
        Ok(())
    }
}

fn pseudo_header(
    checksum: &mut Checksum,
    source_addr: Ipv4Addr,
    destination_addr: Ipv4Addr,
    segment_len: u16,
) {
    checksum.add_u32(source_addr.octets());
    checksum.add_u32(destination_addr.octets());
    checksum.add_u8_pair(0, crate::ipv4::PROTOCOL_TCP);
    checksum.add_u16(segment_len);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_a_segment() {
        let source_addr = Ipv4Addr::new(10, 0, 0, 1);
        let destination_addr = Ipv4Addr::new(93, 184, 216, 34);
        let header = TcpHeader {
            source_port: 54000,
            destination_port: 443,
            sequence: 1000,
            acknowledgment: 2000,
            control: Control::psh_ack(),
            window: 64240,
        };
        let mut buf = Vec::new();
        header
            .serialize_into(&mut buf, b"hello", source_addr, destination_addr)
            .unwrap();
        let (parsed, payload) = TcpHeader::parse(&buf, source_addr, destination_addr).unwrap();
        assert_eq!(parsed, header);
        assert_eq!(payload, b"hello");
    }

    #[test]
    fn rejects_wrong_pseudo_header() {
        let header = TcpHeader {
            source_port: 1,
            destination_port: 2,
            sequence: 0,
            acknowledgment: 0,
            control: Control::syn(),
            window: 1024,
        };
        let mut buf = Vec::new();
        header
            .serialize_into(
                &mut buf,
                b"",
                Ipv4Addr::new(1, 2, 3, 4),
                Ipv4Addr::new(5, 6, 7, 8),
            )
            .unwrap();
        let result = TcpHeader::parse(&buf, Ipv4Addr::new(9, 9, 9, 9), Ipv4Addr::new(5, 6, 7, 8));
        assert!(result.is_err());
    }
}
