//! ICMP connector
//!
//! Packets ride in the data of ICMP Echo Requests sent from a raw socket, in
//! both directions. The address is a bare IPv4 address: the one to bind when
//! listening, the one to ping when dialing. Requires `CAP_NET_RAW`.

use async_trait::async_trait;
use std::net::Ipv4Addr;
use std::sync::atomic::{AtomicU16, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;

use super::raw::RawSocket;
use super::{Connector, ConnectorStats, Link, PacketSession, Transport};
use crate::icmp::{process_echo_id, strip_ipv4_header, EchoMessage, EchoPeer, TYPE_ECHO_REQUEST};
use crate::{PulsarError, Result};

/// Serialized packet size
pub const ICMP_CHUNK: usize = 128;

/// MTU-sized receive buffer
const RECV_BUFFER: usize = 1500;

const NAME: &str = "icmp";

/// ICMP echo carrier
pub struct Icmp;

#[async_trait]
impl Transport for Icmp {
    fn name(&self) -> &'static str {
        NAME
    }

    fn description(&self) -> &'static str {
        "Read/write from ICMP packets"
    }

    async fn connect(
        &self,
        listen: bool,
        _plain: bool,
        address: &str,
    ) -> Result<Arc<dyn Connector>> {
        let addr: Ipv4Addr = address
            .parse()
            .map_err(|e| PulsarError::InvalidAddress(format!("{}: {}", address, e)))?;
        let (local, remote) = if listen {
            (addr, None)
        } else {
            (Ipv4Addr::UNSPECIFIED, Some(addr))
        };

        let socket = RawSocket::icmp_v4(local)?;
        let own_id = process_echo_id();
        log::debug!(
            "ICMP socket on {} (peer: {:?}, echo id {})",
            local,
            remote,
            own_id
        );

        Ok(Arc::new(IcmpConnector {
            link: Link::new(socket),
            peer: Mutex::new(EchoPeer::new(own_id, remote)),
            own_id,
            seq: AtomicU16::new(1),
            session: PacketSession::new(ICMP_CHUNK)?,
            stats: ConnectorStats::new(),
        }))
    }
}

pub struct IcmpConnector {
    link: Link<RawSocket>,
    peer: Mutex<EchoPeer>,
    own_id: u16,
    /// Echo sequence, one per message sent
    seq: AtomicU16,
    session: PacketSession,
    stats: ConnectorStats,
}

impl IcmpConnector {
    async fn recv(&self, socket: &RawSocket) -> Result<Vec<u8>> {
        let mut buf = vec![0u8; RECV_BUFFER];
        loop {
            let (n, source) = socket.recv_from(&mut buf).await?;
            // the raw socket sees every ICMP message addressed to the host
            let echo = match strip_ipv4_header(&buf[..n]).and_then(EchoMessage::parse) {
                Ok(Some(echo)) if echo.kind == TYPE_ECHO_REQUEST => echo,
                Ok(_) => continue,
                Err(e) => {
                    log::trace!("Ignoring ICMP from {}: {}", source, e);
                    continue;
                }
            };
            if !self.peer.lock().await.accept(source, echo.id) {
                continue;
            }

            if let Some(data) = self.session.push(&echo.data).await? {
                return Ok(data);
            }
        }
    }
}

#[async_trait]
impl Connector for IcmpConnector {
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
        let Some(dest) = self.peer.lock().await.addr() else {
            return Ok(0);
        };

        for packet in self.session.packets(buf)? {
            let seq = self.seq.fetch_add(1, Ordering::Relaxed);
            let echo = EchoMessage::request(self.own_id, seq, packet);
            socket.send_to(&echo.marshal(), dest).await?;
        }

        self.stats.add_send(buf.len());
        Ok(buf.len())
    }

    async fn close(&self) -> Result<()> {
        if self.link.is_closed() {
            return Ok(());
        }

        self.link.release().await;
        self.session.clear().await;
        Ok(())
    }
}
