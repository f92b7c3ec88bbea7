//! Wire unit of the fragmentation engine
//!
//! Every packet carries a fixed 12-byte big-endian header followed by the
//! opaque data block:
//!
//! ```text
//! 0               4               8               12
//! +---------------+---------------+---------------+--------------...
//! |   base seq    |      seq      |   total len   |  data
//! +---------------+---------------+---------------+--------------...
//! ```

use bytes::{Buf, BufMut, BytesMut};
use std::fmt;

use crate::{PulsarError, Result};

/// Size of the serialized packet header
pub const HEADER_SIZE: usize = 12;

/// One fragment of a logical buffer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    /// Generation this fragment belongs to
    pub base_seq: u32,
    /// Byte offset right after this fragment's payload, plus `base_seq`
    pub seq: u32,
    /// Length of the whole logical buffer
    pub total_len: u32,
    /// Payload, possibly followed by random padding on the last fragment
    pub data: Vec<u8>,
}

impl Packet {
    pub fn new(base_seq: u32, seq: u32, total_len: u32, data: Vec<u8>) -> Self {
        Self {
            base_seq,
            seq,
            total_len,
            data,
        }
    }

    /// Offset of the end of this fragment inside its generation
    pub fn offset(&self) -> u32 {
        self.seq.wrapping_sub(self.base_seq)
    }

    /// True when this fragment closes its generation
    pub fn is_terminal(&self) -> bool {
        self.offset() == self.total_len
    }

    /// Serialize to network byte order
    pub fn serialize(&self) -> Vec<u8> {
        let mut buf = BytesMut::with_capacity(HEADER_SIZE + self.data.len());
        buf.put_u32(self.base_seq);
        buf.put_u32(self.seq);
        buf.put_u32(self.total_len);
        buf.put_slice(&self.data);
        buf.to_vec()
    }

    /// Parse a packet from wire bytes
    pub fn deserialize(mut buf: &[u8]) -> Result<Self> {
        if buf.len() < HEADER_SIZE {
            return Err(PulsarError::MalformedPacket(format!(
                "{} bytes is shorter than the {} byte header",
                buf.len(),
                HEADER_SIZE
            )));
        }

        let base_seq = buf.get_u32();
        let seq = buf.get_u32();
        let total_len = buf.get_u32();

        Ok(Self::new(base_seq, seq, total_len, buf.to_vec()))
    }
}

impl fmt::Display for Packet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "bseq: {}, seq: {}, total: {}, bytes: {}",
            self.base_seq,
            self.seq,
            self.total_len,
            hex::encode(&self.data)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_layout() {
        let packet = Packet::new(0x01020304, 0x0a0b0c0d, 7, b"payload".to_vec());
        let wire = packet.serialize();

        assert_eq!(wire.len(), HEADER_SIZE + 7);
        assert_eq!(&wire[0..4], &[0x01, 0x02, 0x03, 0x04]);
        assert_eq!(&wire[4..8], &[0x0a, 0x0b, 0x0c, 0x0d]);
        assert_eq!(&wire[8..12], &[0, 0, 0, 7]);
        assert_eq!(&wire[12..], b"payload");

        assert_eq!(Packet::deserialize(&wire).unwrap(), packet);
    }

    #[test]
    fn test_short_header_rejected() {
        let err = Packet::deserialize(&[0u8; 11]).unwrap_err();
        assert!(matches!(err, PulsarError::MalformedPacket(_)));
    }

    #[test]
    fn test_terminal_detection_wraps() {
        // Generation counter close to u32::MAX, offsets must still work
        let packet = Packet::new(u32::MAX - 1, 3, 5, vec![0; 5]);
        assert_eq!(packet.offset(), 5);
        assert!(packet.is_terminal());
    }

    #[test]
    fn test_display_hex() {
        let packet = Packet::new(1, 3, 2, vec![0xab, 0xcd]);
        assert_eq!(packet.to_string(), "bseq: 1, seq: 3, total: 2, bytes: abcd");
    }
}
