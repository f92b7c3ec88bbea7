//! Per-connector traffic counters

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

const KILOBYTE: u64 = 1024;
const MEGABYTE: u64 = 1024 * KILOBYTE;
const GIGABYTE: u64 = 1024 * MEGABYTE;

/// Application bytes delivered by `read` and accepted by `write`
#[derive(Debug, Default)]
pub struct ConnectorStats {
    recv: AtomicU64,
    send: AtomicU64,
}

impl ConnectorStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn recv(&self) -> u64 {
        self.recv.load(Ordering::Relaxed)
    }

    pub fn send(&self) -> u64 {
        self.send.load(Ordering::Relaxed)
    }

    pub(crate) fn add_recv(&self, bytes: usize) {
        self.recv.fetch_add(bytes as u64, Ordering::Relaxed);
    }

    pub(crate) fn add_send(&self, bytes: usize) {
        self.send.fetch_add(bytes as u64, Ordering::Relaxed);
    }
}

impl fmt::Display for ConnectorStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "recv: {}, send: {}",
            pretty_size(self.recv()),
            pretty_size(self.send())
        )
    }
}

/// Whole units, rounded down
pub fn pretty_size(bytes: u64) -> String {
    match bytes {
        b if b > GIGABYTE => format!("{} GB", b / GIGABYTE),
        b if b > MEGABYTE => format!("{} MB", b / MEGABYTE),
        b if b > KILOBYTE => format!("{} KB", b / KILOBYTE),
        b => format!("{} Bytes", b),
    }
}
