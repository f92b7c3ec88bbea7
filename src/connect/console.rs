//! stdin/stdout connector

use async_trait::async_trait;
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt, Stdin, Stdout};
use tokio::sync::Mutex;

use super::{Connector, ConnectorStats, Shutdown, Transport};
use crate::{PulsarError, Result};

/// Bytes per stdin read
pub const CONSOLE_CHUNK: usize = 4096;

const NAME: &str = "console";

/// Console carrier: reads stdin, writes stdout, ignores the address
pub struct Console;

#[async_trait]
impl Transport for Console {
    fn name(&self) -> &'static str {
        NAME
    }

    fn description(&self) -> &'static str {
        "Read/write from stdin/stdout"
    }

    async fn connect(
        &self,
        _listen: bool,
        _plain: bool,
        _address: &str,
    ) -> Result<Arc<dyn Connector>> {
        Ok(Arc::new(ConsoleConnector {
            stdin: Mutex::new(tokio::io::stdin()),
            stdout: Mutex::new(tokio::io::stdout()),
            stats: ConnectorStats::new(),
            shutdown: Shutdown::new(),
        }))
    }
}

pub struct ConsoleConnector {
    stdin: Mutex<Stdin>,
    stdout: Mutex<Stdout>,
    stats: ConnectorStats,
    shutdown: Shutdown,
}

#[async_trait]
impl Connector for ConsoleConnector {
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

        let mut buf = vec![0u8; CONSOLE_CHUNK];
        let n = tokio::select! {
            n = async { self.stdin.lock().await.read(&mut buf).await } => n?,
            _ = self.shutdown.wait() => 0,
        };
        buf.truncate(n);
        self.stats.add_recv(n);
        Ok(buf)
    }

    async fn write(&self, buf: &[u8]) -> Result<usize> {
        if self.shutdown.is_triggered() {
            return Err(PulsarError::NotConnected(NAME));
        }

        let mut stdout = self.stdout.lock().await;
        stdout.write_all(buf).await?;
        stdout.flush().await?;
        self.stats.add_send(buf.len());
        Ok(buf.len())
    }

    async fn close(&self) -> Result<()> {
        if self.shutdown.trigger() {
            self.stdout.lock().await.flush().await?;
        }
        Ok(())
    }
}
