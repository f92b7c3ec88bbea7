//! ICMP echo encapsulation
//!
//! Serialized packets travel as the data of ICMP Echo Requests. Raw IPv4
//! sockets hand inbound datagrams over with their IP header, so
//! [`strip_ipv4_header`] is applied before [`EchoMessage::parse`].
//!
//! Because ICMP has no ports, the two ends of a tunnel tell each other apart
//! by the echo identifier: each process stamps its own (derived from its pid)
//! and [`EchoPeer`] binds to the first foreign identifier it sees.

use bytes::{Buf, BufMut, BytesMut};
use std::net::Ipv4Addr;

use crate::{PulsarError, Result};

pub const TYPE_ECHO_REPLY: u8 = 0;
pub const TYPE_ECHO_REQUEST: u8 = 8;

/// Type, code, checksum, identifier, sequence
pub const ECHO_HEADER_SIZE: usize = 8;

const IPV4_MIN_HEADER: usize = 20;

/// Echo identifier of this process
pub fn process_echo_id() -> u16 {
    (std::process::id() & 0xFFFF) as u16
}

/// An ICMP echo request or reply
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EchoMessage {
    pub kind: u8,
    pub code: u8,
    pub id: u16,
    pub seq: u16,
    pub data: Vec<u8>,
}

impl EchoMessage {
    pub fn request(id: u16, seq: u16, data: Vec<u8>) -> Self {
        Self {
            kind: TYPE_ECHO_REQUEST,
            code: 0,
            id,
            seq,
            data,
        }
    }

    /// Wire bytes with the checksum filled in
    pub fn marshal(&self) -> Vec<u8> {
        let mut buf = BytesMut::with_capacity(ECHO_HEADER_SIZE + self.data.len());
        buf.put_u8(self.kind);
        buf.put_u8(self.code);
        buf.put_u16(0);
        buf.put_u16(self.id);
        buf.put_u16(self.seq);
        buf.put_slice(&self.data);

        let sum = checksum(&buf);
        buf[2..4].copy_from_slice(&sum.to_be_bytes());
        buf.to_vec()
    }

    /// Parse an ICMP message, `None` if it is not an echo
    pub fn parse(buf: &[u8]) -> Result<Option<Self>> {
        if buf.len() < ECHO_HEADER_SIZE {
            return Err(PulsarError::MalformedPacket(format!(
                "ICMP message of {} bytes",
                buf.len()
            )));
        }
        if checksum(buf) != 0 {
            return Err(PulsarError::MalformedPacket(
                "ICMP checksum mismatch".to_string(),
            ));
        }

        let mut header = &buf[..ECHO_HEADER_SIZE];
        let kind = header.get_u8();
        if kind != TYPE_ECHO_REQUEST && kind != TYPE_ECHO_REPLY {
            return Ok(None);
        }
        let code = header.get_u8();
        header.advance(2);

        Ok(Some(Self {
            kind,
            code,
            id: header.get_u16(),
            seq: header.get_u16(),
            data: buf[ECHO_HEADER_SIZE..].to_vec(),
        }))
    }
}

/// Internet checksum (RFC 1071)
pub fn checksum(buf: &[u8]) -> u16 {
    let mut sum: u32 = 0;
    let mut words = buf.chunks_exact(2);
    for word in &mut words {
        sum += u16::from_be_bytes([word[0], word[1]]) as u32;
    }
    if let [last] = words.remainder() {
        sum += (*last as u32) << 8;
    }
    while sum >> 16 != 0 {
        sum = (sum & 0xFFFF) + (sum >> 16);
    }
    !(sum as u16)
}

/// Skip the IPv4 header of a raw socket datagram
pub fn strip_ipv4_header(buf: &[u8]) -> Result<&[u8]> {
    if buf.len() < IPV4_MIN_HEADER || buf[0] >> 4 != 4 {
        return Err(PulsarError::MalformedPacket(
            "not an IPv4 datagram".to_string(),
        ));
    }
    let ihl = ((buf[0] & 0x0F) as usize) * 4;
    if ihl < IPV4_MIN_HEADER || buf.len() < ihl {
        return Err(PulsarError::MalformedPacket(format!(
            "IPv4 header length {}",
            ihl
        )));
    }
    Ok(&buf[ihl..])
}

/// Peer/session binding for a connectionless echo channel
#[derive(Debug, Clone)]
pub struct EchoPeer {
    own_id: u16,
    addr: Option<Ipv4Addr>,
    id: Option<u16>,
}

impl EchoPeer {
    /// `remote` is known up front when dialing, learned when listening
    pub fn new(own_id: u16, remote: Option<Ipv4Addr>) -> Self {
        Self {
            own_id,
            addr: remote,
            id: None,
        }
    }

    pub fn addr(&self) -> Option<Ipv4Addr> {
        self.addr
    }

    pub fn id(&self) -> Option<u16> {
        self.id
    }

    /// Decide whether an inbound echo belongs to this session
    ///
    /// Echoes carrying our own identifier are our probes looping back and
    /// are never accepted. The first foreign echo binds address and
    /// identifier; afterwards both must match.
    pub fn accept(&mut self, source: Ipv4Addr, echo_id: u16) -> bool {
        if echo_id == self.own_id {
            return false;
        }
        if self.addr.map_or(false, |addr| addr != source) {
            return false;
        }
        match self.id {
            Some(id) => id == echo_id,
            None => {
                log::debug!("ICMP peer bound to {} (echo id {})", source, echo_id);
                self.addr = Some(source);
                self.id = Some(echo_id);
                true
            }
        }
    }
}
