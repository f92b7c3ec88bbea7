//! Connectors: the uniform read/write surface over every carrier
//!
//! A [`Transport`] is the unconnected form of a carrier, registered by name.
//! [`Transport::connect`] binds or dials its socket and returns a connected
//! [`Connector`] with a fresh [`Factory`]/[`Queue`] pair sized for that
//! carrier. [`Connector::close`] releases the socket and clears the queue.
//!
//! Connectors are shared as `Arc<dyn Connector>`: in duplex mode one
//! direction reads a connector while the other writes it. The read path only
//! touches the queue, the write path only the factory's generation counter.

pub mod console;
pub mod dns;
#[cfg(unix)]
pub mod icmp;
#[cfg(unix)]
pub mod raw;
pub mod registry;
pub mod stats;
pub mod tcp;
pub mod udp;

pub use registry::ConnectorRegistry;
pub use stats::ConnectorStats;

use async_trait::async_trait;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::{watch, Mutex};

use crate::packet::{Factory, Queue};
use crate::{PulsarError, Result};

/// Unconnected carrier, as stored in the registry
#[async_trait]
pub trait Transport: Send + Sync {
    /// Registry name (`"udp"`, `"dns"`, ...)
    fn name(&self) -> &'static str;

    /// One-line description for usage output
    fn description(&self) -> &'static str;

    /// Bind (`listen`) or dial `address` and start a new session
    ///
    /// `plain` disables fragmentation on carriers that support raw
    /// pass-through.
    async fn connect(
        &self,
        listen: bool,
        plain: bool,
        address: &str,
    ) -> Result<Arc<dyn Connector>>;
}

/// A connected carrier
#[async_trait]
pub trait Connector: Send + Sync {
    fn name(&self) -> &'static str;

    /// Cumulative bytes received and sent
    fn stats(&self) -> &ConnectorStats;

    /// Wait for the next complete buffer
    ///
    /// An empty buffer means the peer finished or the connector was closed.
    async fn read(&self) -> Result<Vec<u8>>;

    /// Send one buffer, possibly as several carrier messages
    ///
    /// Returns 0 when the carrier has no peer to send to yet.
    async fn write(&self, buf: &[u8]) -> Result<usize>;

    /// Release the socket and drop queued packets
    async fn close(&self) -> Result<()>;
}

/// Parse an `ip:port` address
pub fn parse_address(address: &str) -> Result<SocketAddr> {
    address
        .parse()
        .map_err(|e| PulsarError::InvalidAddress(format!("{}: {}", address, e)))
}

/// Wildcard local address of the same family as `remote`
pub(crate) fn unspecified_for(remote: &SocketAddr) -> SocketAddr {
    match remote {
        SocketAddr::V4(_) => SocketAddr::from(([0, 0, 0, 0], 0)),
        SocketAddr::V6(_) => SocketAddr::from(([0u16; 8], 0)),
    }
}

/// Fragmentation state of one connector session
pub(crate) struct PacketSession {
    factory: Factory,
    queue: Mutex<Queue>,
}

impl PacketSession {
    /// New session for packets of `chunk` bytes, header included
    pub(crate) fn new(chunk: usize) -> Result<Self> {
        Ok(Self {
            factory: Factory::new(chunk, std::process::id())?,
            queue: Mutex::new(Queue::new()),
        })
    }

    /// Serialized size of every packet
    pub(crate) fn packet_size(&self) -> usize {
        self.factory.packet_size()
    }

    /// Fragment `buf` into serialized packets
    pub(crate) fn packets(&self, buf: &[u8]) -> Result<Vec<Vec<u8>>> {
        self.factory
            .fragment(buf)?
            .iter()
            .map(|packet| self.factory.serialize(packet))
            .collect()
    }

    /// Queue a received packet, returning a buffer once one is complete
    pub(crate) async fn push(&self, wire: &[u8]) -> Result<Option<Vec<u8>>> {
        let packet = self.factory.deserialize(wire)?;
        let mut queue = self.queue.lock().await;
        queue.add(packet);
        Ok(queue.buffer())
    }

    pub(crate) async fn clear(&self) {
        self.queue.lock().await.clear();
    }
}

/// Close signal shared by a connector's read and write paths
pub(crate) struct Shutdown(watch::Sender<bool>);

impl Shutdown {
    pub(crate) fn new() -> Self {
        let (tx, _) = watch::channel(false);
        Self(tx)
    }

    /// Mark closed, returns false if it already was
    pub(crate) fn trigger(&self) -> bool {
        !self.0.send_replace(true)
    }

    pub(crate) fn is_triggered(&self) -> bool {
        *self.0.borrow()
    }

    /// Resolves once the connector is closed
    pub(crate) async fn wait(&self) {
        let mut rx = self.0.subscribe();
        let _ = rx.wait_for(|closed| *closed).await;
    }
}

/// Socket of a connected datagram connector, released on close
pub(crate) struct Link<S> {
    socket: Mutex<Option<Arc<S>>>,
    shutdown: Shutdown,
}

impl<S> Link<S> {
    pub(crate) fn new(socket: S) -> Self {
        Self {
            socket: Mutex::new(Some(Arc::new(socket))),
            shutdown: Shutdown::new(),
        }
    }

    /// The socket, `None` after close
    pub(crate) async fn get(&self) -> Option<Arc<S>> {
        self.socket.lock().await.clone()
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.shutdown.is_triggered()
    }

    /// Drop our handle on the socket and wake pending reads
    pub(crate) async fn release(&self) {
        self.shutdown.trigger();
        self.socket.lock().await.take();
    }

    pub(crate) async fn closed(&self) {
        self.shutdown.wait().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_address() {
        assert_eq!(
            parse_address("127.0.0.1:53").unwrap(),
            SocketAddr::from(([127, 0, 0, 1], 53))
        );
        assert!(parse_address("[::1]:8080").is_ok());
        assert!(matches!(
            parse_address("localhost:53"),
            Err(PulsarError::InvalidAddress(_))
        ));
        assert!(parse_address("127.0.0.1").is_err());
        assert!(parse_address("127.0.0.1:70000").is_err());
    }

    #[tokio::test]
    async fn test_session_roundtrip() {
        let sender = PacketSession::new(40).unwrap();
        let receiver = PacketSession::new(40).unwrap();
        let buf: Vec<u8> = (0..100u8).collect();

        let packets = sender.packets(&buf).unwrap();
        assert!(packets.iter().all(|p| p.len() == 40));

        let mut out = None;
        for wire in packets.iter().rev() {
            out = receiver.push(wire).await.unwrap();
        }
        assert_eq!(out.unwrap(), buf);
    }

    #[tokio::test]
    async fn test_shutdown_wakes_waiters() {
        let link = Arc::new(Link::new(()));
        let waiter = {
            let link = Arc::clone(&link);
            tokio::spawn(async move { link.closed().await })
        };

        assert!(link.get().await.is_some());
        link.release().await;
        waiter.await.unwrap();

        assert!(link.is_closed());
        assert!(link.get().await.is_none());
        // already closed: resolves immediately
        link.closed().await;
    }
}
