use byteorder::{BigEndian, ByteOrder};

use crate::error::Error;
use crate::model::Address;

const TAG_ADDRESS: u32 = 0;
const TAG_INTEGER: u32 = 1;
const TAG_DATA: u32 = 2;
const TAG_LONG: u32 = 3;

/// One typed argument carried inside a packet (spec.md §3, §6).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Arg {
    /// Always 8 bytes on the wire: `(high32, low32)` big-endian, regardless
    /// of target address width.
    Address(Address),
    /// 4 bytes big-endian.
    Integer(u32),
    /// Raw, non-null-terminated bytes; strings travel here.
    Data(Vec<u8>),
    /// 8 bytes big-endian.
    Long(u64),
}

impl Arg {
    fn tag(&self) -> u32 {
        match self {
            Arg::Address(_) => TAG_ADDRESS,
            Arg::Integer(_) => TAG_INTEGER,
            Arg::Data(_) => TAG_DATA,
            Arg::Long(_) => TAG_LONG,
        }
    }

    fn payload(&self) -> Vec<u8> {
        match self {
            Arg::Address(addr) => {
                let mut buf = [0u8; 8];
                BigEndian::write_u32(&mut buf[0..4], (*addr >> 32) as u32);
                BigEndian::write_u32(&mut buf[4..8], *addr as u32);
                buf.to_vec()
            }
            Arg::Integer(v) => {
                let mut buf = [0u8; 4];
                BigEndian::write_u32(&mut buf, *v);
                buf.to_vec()
            }
            Arg::Data(bytes) => bytes.clone(),
            Arg::Long(v) => {
                let mut buf = [0u8; 8];
                BigEndian::write_u64(&mut buf, *v);
                buf.to_vec()
            }
        }
    }

    /// Convenience accessor used by command handlers expecting a string.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Arg::Data(bytes) => std::str::from_utf8(bytes).ok(),
            _ => None,
        }
    }

    pub fn as_address(&self) -> Option<Address> {
        match self {
            Arg::Address(a) => Some(*a),
            _ => None,
        }
    }

    pub fn as_integer(&self) -> Option<u32> {
        match self {
            Arg::Integer(v) => Some(*v),
            _ => None,
        }
    }
}

/// `{ command_kind, correlation_id, arg_count, args[] }` (spec.md §3).
///
/// Unsolicited events reuse this same shape with an event kind in
/// `command`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    pub command: u32,
    pub id: u32,
    pub args: Vec<Arg>,
}

impl Packet {
    pub fn new(command: u32, id: u32, args: Vec<Arg>) -> Self {
        Packet { command, id, args }
    }
}

/// Encodes `packet` to its wire representation. Deterministic: the same
/// `Packet` always produces the same bytes (spec.md §8).
pub fn encode(packet: &Packet) -> Vec<u8> {
    let mut out = Vec::new();
    let mut header = [0u8; 12];
    BigEndian::write_u32(&mut header[0..4], packet.command);
    BigEndian::write_u32(&mut header[4..8], packet.id);
    BigEndian::write_u32(&mut header[8..12], packet.args.len() as u32);
    out.extend_from_slice(&header);

    for arg in &packet.args {
        let payload = arg.payload();
        let mut arg_header = [0u8; 8];
        BigEndian::write_u32(&mut arg_header[0..4], payload.len() as u32);
        BigEndian::write_u32(&mut arg_header[4..8], arg.tag());
        out.extend_from_slice(&arg_header);
        out.extend_from_slice(&payload);
    }

    out
}

/// Decodes a packet from `buf`, which must contain exactly one complete
/// packet (no trailing bytes).
///
/// Rejects (1) an argument length that would overrun the buffer, (2) a type
/// tag outside `{address, integer, data, long}`, (3) a truncated fixed-size
/// payload (spec.md §4.1).
pub fn decode(buf: &[u8]) -> Result<Packet, Error> {
    if buf.len() < 12 {
        return Err(Error::MalformedPacket);
    }

    let command = BigEndian::read_u32(&buf[0..4]);
    let id = BigEndian::read_u32(&buf[4..8]);
    let arg_count = BigEndian::read_u32(&buf[8..12]);

    let mut offset = 12;
    let mut args = Vec::with_capacity(arg_count as usize);

    for _ in 0..arg_count {
        if buf.len() < offset + 8 {
            return Err(Error::MalformedPacket);
        }
        let length = BigEndian::read_u32(&buf[offset..offset + 4]) as usize;
        let type_tag = BigEndian::read_u32(&buf[offset + 4..offset + 8]);
        offset += 8;

        if buf.len() < offset + length {
            return Err(Error::MalformedPacket);
        }
        let payload = &buf[offset..offset + length];
        offset += length;

        let arg = match type_tag {
            TAG_ADDRESS => {
                if length != 8 {
                    return Err(Error::MalformedPacket);
                }
                let high = BigEndian::read_u32(&payload[0..4]) as u64;
                let low = BigEndian::read_u32(&payload[4..8]) as u64;
                Arg::Address((high << 32) | low)
            }
            TAG_INTEGER => {
                if length != 4 {
                    return Err(Error::MalformedPacket);
                }
                Arg::Integer(BigEndian::read_u32(payload))
            }
            TAG_DATA => Arg::Data(payload.to_vec()),
            TAG_LONG => {
                if length != 8 {
                    return Err(Error::MalformedPacket);
                }
                Arg::Long(BigEndian::read_u64(payload))
            }
            _ => return Err(Error::MalformedPacket),
        };

        args.push(arg);
    }

    Ok(Packet { command, id, args })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn framing_round_trip_all_arg_types() {
        let packet = Packet::new(
            42,
            7,
            vec![
                Arg::Address(0x0040_1000),
                Arg::Integer(123),
                Arg::Data(b"hello".to_vec()),
                Arg::Long(0xDEAD_BEEF_CAFE_BABE),
            ],
        );
        let bytes = encode(&packet);
        let decoded = decode(&bytes).unwrap();
        assert_eq!(decoded, packet);
    }

    #[test]
    fn address_round_trip_64_bit() {
        for addr in [0u64, 1, 0xFFFF_FFFF, 0x1_0000_0000, u64::MAX] {
            let packet = Packet::new(0, 0, vec![Arg::Address(addr)]);
            let decoded = decode(&encode(&packet)).unwrap();
            assert_eq!(decoded.args[0].as_address(), Some(addr));
        }
    }

    #[test]
    fn decode_rejects_truncated_header() {
        assert!(decode(&[0u8; 4]).is_err());
    }

    #[test]
    fn decode_rejects_arg_count_exceeding_actual_args() {
        // header claims 2 args but only one legal argument follows
        let mut buf = Vec::new();
        buf.extend_from_slice(&0u32.to_be_bytes());
        buf.extend_from_slice(&1u32.to_be_bytes());
        buf.extend_from_slice(&2u32.to_be_bytes());
        buf.extend_from_slice(&4u32.to_be_bytes()); // length
        buf.extend_from_slice(&1u32.to_be_bytes()); // tag = integer
        buf.extend_from_slice(&0u32.to_be_bytes()); // payload
        assert!(decode(&buf).is_err());
    }

    #[test]
    fn decode_rejects_unknown_type_tag() {
        let mut buf = Vec::new();
        buf.extend_from_slice(&0u32.to_be_bytes());
        buf.extend_from_slice(&0u32.to_be_bytes());
        buf.extend_from_slice(&1u32.to_be_bytes());
        buf.extend_from_slice(&0u32.to_be_bytes()); // length 0
        buf.extend_from_slice(&99u32.to_be_bytes()); // bogus tag
        assert!(decode(&buf).is_err());
    }

    #[test]
    fn decode_rejects_overrunning_length() {
        let mut buf = Vec::new();
        buf.extend_from_slice(&0u32.to_be_bytes());
        buf.extend_from_slice(&0u32.to_be_bytes());
        buf.extend_from_slice(&1u32.to_be_bytes());
        buf.extend_from_slice(&1000u32.to_be_bytes()); // claims 1000 bytes
        buf.extend_from_slice(&2u32.to_be_bytes()); // data tag
        buf.extend_from_slice(b"short");
        assert!(decode(&buf).is_err());
    }

    #[test]
    fn encode_is_deterministic() {
        let packet = Packet::new(1, 2, vec![Arg::Integer(3)]);
        assert_eq!(encode(&packet), encode(&packet));
    }
}
