//! TCP connector

use async_trait::async_trait;
use std::io::ErrorKind;
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Mutex;

use super::{Connector, ConnectorStats, PacketSession, Shutdown, Transport};
use crate::{PulsarError, Result};

/// Serialized packet size
pub const TCP_CHUNK: usize = 1320;

const NAME: &str = "tcp";

/// TCP carrier
///
/// Listening accepts a single connection. Packets are written back to back;
/// since every packet has the same size the reader frames them by length.
pub struct Tcp;

#[async_trait]
impl Transport for Tcp {
    fn name(&self) -> &'static str {
        NAME
    }

    fn description(&self) -> &'static str {
        "Read/write from TCP streams"
    }

    async fn connect(
        &self,
        listen: bool,
        plain: bool,
        address: &str,
    ) -> Result<Arc<dyn Connector>> {
        let stream = if listen {
            let listener = TcpListener::bind(address).await?;
            log::info!("TCP listening on {}", listener.local_addr()?);
            let (stream, peer) = listener.accept().await?;
            log::info!("TCP connection from {}", peer);
            stream
        } else {
            let stream = TcpStream::connect(address).await?;
            log::debug!("TCP connected to {}", address);
            stream
        };
        stream.set_nodelay(true)?;

        Ok(Arc::new(TcpConnector::new(stream, plain)?))
    }
}

pub struct TcpConnector {
    reader: Mutex<OwnedReadHalf>,
    writer: Mutex<Option<OwnedWriteHalf>>,
    plain: bool,
    session: PacketSession,
    stats: ConnectorStats,
    shutdown: Shutdown,
}

impl TcpConnector {
    pub(crate) fn new(stream: TcpStream, plain: bool) -> Result<Self> {
        let (reader, writer) = stream.into_split();
        Ok(Self {
            reader: Mutex::new(reader),
            writer: Mutex::new(Some(writer)),
            plain,
            session: PacketSession::new(TCP_CHUNK)?,
            stats: ConnectorStats::new(),
            shutdown: Shutdown::new(),
        })
    }

    async fn recv(&self) -> Result<Vec<u8>> {
        let mut reader = self.reader.lock().await;

        if self.plain {
            let mut buf = vec![0u8; TCP_CHUNK];
            let n = reader.read(&mut buf).await?;
            buf.truncate(n);
            return Ok(buf);
        }

        let mut buf = vec![0u8; self.session.packet_size()];
        loop {
            match reader.read_exact(&mut buf).await {
                Ok(_) => {}
                Err(e) if e.kind() == ErrorKind::UnexpectedEof => return Ok(Vec::new()),
                Err(e) => return Err(e.into()),
            }
            if let Some(data) = self.session.push(&buf).await? {
                return Ok(data);
            }
        }
    }
}

#[async_trait]
impl Connector for TcpConnector {
    fn name(&self) -> &'static str {
        NAME
    }

    fn stats(&self) -> &ConnectorStats {
        &self.stats
    }

    async fn read(&self) -> Result<Vec<u8>> {
        if self.shutdown.is_triggered() {
            return Ok(Vec::new());
        }

        let data = tokio::select! {
            data = self.recv() => data?,
            _ = self.shutdown.wait() => Vec::new(),
        };
        self.stats.add_recv(data.len());
        Ok(data)
    }

    async fn write(&self, buf: &[u8]) -> Result<usize> {
        let mut guard = self.writer.lock().await;
        let writer = guard.as_mut().ok_or(PulsarError::NotConnected(NAME))?;

        if self.plain {
            writer.write_all(buf).await?;
        } else {
            for packet in self.session.packets(buf)? {
                writer.write_all(&packet).await?;
            }
        }

        self.stats.add_send(buf.len());
        Ok(buf.len())
    }

    async fn close(&self) -> Result<()> {
        if !self.shutdown.trigger() {
            return Ok(());
        }

        let writer = self.writer.lock().await.take();
        self.session.clear().await;
        if let Some(mut writer) = writer {
            writer.shutdown().await?;
        }
        Ok(())
    }
}
