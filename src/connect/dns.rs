//! DNS connector
//!
//! Each serialized packet is base32 encoded (RFC 4648 alphabet, padded) and
//! cut into labels of at most 63 characters. Every label becomes one A/IN
//! question `<label><domain>` of a single query message, so all questions
//! share the domain suffix and compress down to one pointer each.
//!
//! The address has the form `domain@ip:port`, e.g. `.t.example.com@10.0.0.1:53`.

use async_trait::async_trait;
use data_encoding::BASE32;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU16, Ordering};
use std::sync::Arc;
use tokio::net::UdpSocket;
use tokio::sync::Mutex;

use super::{
    parse_address, unspecified_for, Connector, ConnectorStats, Link, PacketSession, Transport,
};
use crate::dns::question::split_labels;
use crate::dns::{self, DnsMessage, Question, CLASS_IN, MAX_LABEL_LEN, QUERY_SIZE, TYPE_A};
use crate::{PulsarError, Result};

/// Message budget the packet size is derived from
pub const BASE_CHUNK: usize = 340;

const MAX_DATAGRAM: usize = 65_535;

const NAME: &str = "dns";

/// Split `domain@ip:port`, normalizing the domain to start with a dot
pub fn split_domain_addr(address: &str) -> Result<(String, &str)> {
    let (domain, addr) = address
        .split_once('@')
        .ok_or_else(|| PulsarError::InvalidAddress("missing domain name".to_string()))?;
    if domain.trim_matches('.').is_empty() {
        return Err(PulsarError::InvalidAddress("missing domain name".to_string()));
    }

    let domain = if domain.starts_with('.') {
        domain.to_string()
    } else {
        format!(".{}", domain)
    };
    Ok((domain, addr))
}

/// Serialized packet size for `domain`
///
/// Sized so that header, base32 expansion and one question trailer plus
/// pointer per label stay within [`BASE_CHUNK`]. Long domains yield a size
/// too small for any payload, which the factory rejects.
pub fn chunk_size(domain: &str) -> usize {
    let chunk = BASE_CHUNK.saturating_sub(domain.len() + dns::HEADER_SIZE);
    let chunk = (chunk / 8) * 5;
    chunk.saturating_sub((QUERY_SIZE + 1) * (((chunk / 5) * 8) / MAX_LABEL_LEN))
}

/// DNS carrier: packets as base32 labels in query names
pub struct Dns;

#[async_trait]
impl Transport for Dns {
    fn name(&self) -> &'static str {
        NAME
    }

    fn description(&self) -> &'static str {
        "Read/write from DNS packets"
    }

    async fn connect(
        &self,
        listen: bool,
        _plain: bool,
        address: &str,
    ) -> Result<Arc<dyn Connector>> {
        let (domain, addr) = split_domain_addr(address)?;
        let addr = parse_address(addr)?;
        let (local, peer) = if listen {
            (addr, None)
        } else {
            (unspecified_for(&addr), Some(addr))
        };

        let socket = UdpSocket::bind(local).await?;
        log::debug!(
            "DNS bound to {} for domain {} (peer: {:?})",
            socket.local_addr()?,
            domain,
            peer
        );

        Ok(Arc::new(DnsConnector::new(socket, peer, domain)?))
    }
}

pub struct DnsConnector {
    link: Link<UdpSocket>,
    peer: Mutex<Option<SocketAddr>>,
    /// Always starts with a dot
    domain: String,
    next_id: AtomicU16,
    session: PacketSession,
    stats: ConnectorStats,
}

impl DnsConnector {
    pub(crate) fn new(socket: UdpSocket, peer: Option<SocketAddr>, domain: String) -> Result<Self> {
        let session = PacketSession::new(chunk_size(&domain))?;
        Ok(Self {
            link: Link::new(socket),
            peer: Mutex::new(peer),
            domain,
            next_id: AtomicU16::new(std::process::id() as u16),
            session,
            stats: ConnectorStats::new(),
        })
    }

    pub async fn peer(&self) -> Option<SocketAddr> {
        *self.peer.lock().await
    }

    /// Build the query carrying one serialized packet
    fn encode_query(&self, id: u16, packet: &[u8]) -> Result<Vec<u8>> {
        let mut message = DnsMessage::new(id);
        let encoded = BASE32.encode(packet);

        for label in encoded.as_bytes().chunks(MAX_LABEL_LEN) {
            let name = format!("{}{}", String::from_utf8_lossy(label), self.domain);
            message.add_question(&Question::new(name, TYPE_A, CLASS_IN))?;
        }
        Ok(message.serialize())
    }

    /// Concatenated payload labels of the questions under our domain
    ///
    /// Returns an empty buffer for queries that carry nothing for us.
    fn extract_payload(&self, wire: &[u8]) -> Result<Vec<u8>> {
        let suffix = split_labels(&self.domain);
        let mut encoded = String::new();

        for question in DnsMessage::deserialize(wire)?.questions()? {
            let labels = question.labels();
            if labels.len() < 2 || labels.len() - 1 != suffix.len() {
                continue;
            }
            let ours = labels[1..]
                .iter()
                .zip(&suffix)
                .all(|(a, b)| a.eq_ignore_ascii_case(b));
            if ours {
                encoded.push_str(&labels[0].to_ascii_uppercase());
            }
        }

        BASE32
            .decode(encoded.as_bytes())
            .map_err(|e| PulsarError::Decode(format!("base32 payload: {}", e)))
    }

    async fn recv(&self, socket: &UdpSocket) -> Result<Vec<u8>> {
        let mut buf = vec![0u8; MAX_DATAGRAM];
        loop {
            let (n, from) = socket.recv_from(&mut buf).await?;
            if self.peer().await.map_or(false, |peer| peer != from) {
                log::trace!("Dropping query from {}", from);
                continue;
            }

            // undecodable data under our domain fails this read
            let payload = self.extract_payload(&buf[..n])?;
            if payload.is_empty() {
                log::trace!("Ignoring query without payload from {}", from);
                continue;
            }

            {
                let mut peer = self.peer.lock().await;
                if peer.is_none() {
                    log::debug!("DNS peer bound to {}", from);
                    *peer = Some(from);
                }
            }

            if let Some(data) = self.session.push(&payload).await? {
                return Ok(data);
            }
        }
    }
}

#[async_trait]
impl Connector for DnsConnector {
    fn name(&self) -> &'static str {
        NAME
    }

    fn stats(&self) -> &ConnectorStats {
        &self.stats
    }

    async fn read(&self) -> Result<Vec<u8>> {
        let Some(socket) = self.link.get().await else {
            return Ok(Vec::new());
        };

        let data = tokio::select! {
            data = self.recv(&socket) => data?,
            _ = self.link.closed() => Vec::new(),
        };
        self.stats.add_recv(data.len());
        Ok(data)
    }

    async fn write(&self, buf: &[u8]) -> Result<usize> {
        let socket = self
            .link
            .get()
            .await
            .ok_or(PulsarError::NotConnected(NAME))?;
        let Some(peer) = self.peer().await else {
            return Ok(0);
        };

        for packet in self.session.packets(buf)? {
            let id = self.next_id.fetch_add(1, Ordering::Relaxed);
            let query = self.encode_query(id, &packet)?;
            socket.send_to(&query, peer).await?;
        }

        self.stats.add_send(buf.len());
        Ok(buf.len())
    }

    async fn close(&self) -> Result<()> {
        if self.link.is_closed() {
            return Ok(());
        }

        let flushed = self.write(&[]).await;
        self.link.release().await;
        self.session.clear().await;
        flushed.map(|_| ())
    }
}
