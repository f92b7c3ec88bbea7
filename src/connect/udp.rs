//! UDP connector

use async_trait::async_trait;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::UdpSocket;
use tokio::sync::Mutex;

use super::{
    parse_address, unspecified_for, Connector, ConnectorStats, Link, PacketSession, Transport,
};
use crate::{PulsarError, Result};

/// Serialized packet size
pub const UDP_CHUNK: usize = 384;

/// Largest datagram accepted in plain mode
const MAX_DATAGRAM: usize = 65_535;

const NAME: &str = "udp";

/// UDP carrier: one packet per datagram, or raw datagrams in plain mode
pub struct Udp;

#[async_trait]
impl Transport for Udp {
    fn name(&self) -> &'static str {
        NAME
    }

    fn description(&self) -> &'static str {
        "Read/write from UDP packets"
    }

    async fn connect(
        &self,
        listen: bool,
        plain: bool,
        address: &str,
    ) -> Result<Arc<dyn Connector>> {
        let addr = parse_address(address)?;
        let (local, peer) = if listen {
            (addr, None)
        } else {
            (unspecified_for(&addr), Some(addr))
        };

        let socket = UdpSocket::bind(local).await?;
        log::debug!(
            "UDP bound to {} (peer: {:?}, plain: {})",
            socket.local_addr()?,
            peer,
            plain
        );

        Ok(Arc::new(UdpConnector::new(socket, peer, plain)?))
    }
}

pub struct UdpConnector {
    link: Link<UdpSocket>,
    peer: Mutex<Option<SocketAddr>>,
    plain: bool,
    session: PacketSession,
    stats: ConnectorStats,
}

impl UdpConnector {
    pub(crate) fn new(socket: UdpSocket, peer: Option<SocketAddr>, plain: bool) -> Result<Self> {
        Ok(Self {
            link: Link::new(socket),
            peer: Mutex::new(peer),
            plain,
            session: PacketSession::new(UDP_CHUNK)?,
            stats: ConnectorStats::new(),
        })
    }

    /// Address currently bound as peer
    pub async fn peer(&self) -> Option<SocketAddr> {
        *self.peer.lock().await
    }

    /// Bind the first sender as peer, then only accept that exact address
    async fn check_partner(&self, from: SocketAddr) -> bool {
        let mut peer = self.peer.lock().await;
        match *peer {
            Some(addr) => addr == from,
            None => {
                log::debug!("UDP peer bound to {}", from);
                *peer = Some(from);
                true
            }
        }
    }

    async fn recv(&self, socket: &UdpSocket) -> Result<Vec<u8>> {
        let mut buf = vec![0u8; MAX_DATAGRAM];
        loop {
            let (n, from) = socket.recv_from(&mut buf).await?;
            if !self.check_partner(from).await {
                log::trace!("Dropping {} bytes from {}", n, from);
                continue;
            }
            if self.plain {
                buf.truncate(n);
                return Ok(buf);
            }
            if let Some(data) = self.session.push(&buf[..n]).await? {
                return Ok(data);
            }
        }
    }
}

#[async_trait]
impl Connector for UdpConnector {
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

        if self.plain {
            socket.send_to(buf, peer).await?;
        } else {
            for packet in self.session.packets(buf)? {
                socket.send_to(&packet, peer).await?;
            }
        }

        self.stats.add_send(buf.len());
        Ok(buf.len())
    }

    async fn close(&self) -> Result<()> {
        if self.link.is_closed() {
            return Ok(());
        }

        // an empty write tells the peer we are done
        let flushed = self.write(&[]).await;
        self.link.release().await;
        self.session.clear().await;
        flushed.map(|_| ())
    }
}
