//! Pulsar: byte-stream tunnelling over DNS, ICMP, UDP, TCP and the console
//!
//! Pulsar moves an arbitrary byte stream between two endpoints over carriers
//! that were never meant for generic data: DNS queries and ICMP echo
//! requests, next to plain UDP, TCP and stdin/stdout channels.
//!
//! ## Features
//!
//! - **Fragmentation engine**: buffers are cut into fixed-size packets with
//!   sequencing metadata and reassembled regardless of arrival order
//! - **DNS codec**: payload carried as base32 labels in query names, with
//!   RFC 1035 label compression
//! - **ICMP echo**: payload carried in echo request bodies, with peer/session
//!   learning by source address and echo identifier
//! - **Handler chain**: base32, base64 and AEAD cipher transforms applied
//!   between the two connectors
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use pulsar::connect::ConnectorRegistry;
//!
//! # async fn example() -> pulsar::Result<()> {
//! let registry = ConnectorRegistry::with_builtins();
//! let tunnel = registry.make_connect("dns:.t.example.com@127.0.0.1:5353", false, false).await?;
//!
//! tunnel.write(b"hello over dns").await?;
//! let reply = tunnel.read().await?;
//! println!("{} bytes back", reply.len());
//! tunnel.close().await?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌──────────────┐   ┌───────────┐   ┌─────────────┐
//! │  input   │──▶│ handler chain│──▶│  Factory  │──▶│  transport  │
//! │connector │   │ (encode/enc) │   │ fragments │   │  envelope   │
//! └──────────┘   └──────────────┘   └───────────┘   └─────────────┘
//!                                                          │
//! ┌──────────┐   ┌──────────────┐   ┌───────────┐          ▼
//! │  output  │◀──│ handler chain│◀──│   Queue   │◀── DNS / ICMP / UDP
//! │connector │   │ (decode/dec) │   │ reassembly│
//! └──────────┘   └──────────────┘   └───────────┘
//! ```

pub mod config;
pub mod connect;
pub mod dns;
pub mod handle;
pub mod icmp;
pub mod packet;
pub mod relay;

pub use config::{Direction, PulsarConfig};
pub use connect::{Connector, ConnectorRegistry, ConnectorStats};
pub use handle::{Handler, HandlerChain, HandlerRegistry};
pub use packet::{Factory, Packet, Queue};
pub use relay::Relay;

/// Pulsar error types
#[derive(Debug, thiserror::Error)]
pub enum PulsarError {
    /// Header or length invariant violated while decoding
    #[error("Malformed packet: {0}")]
    MalformedPacket(String),

    /// Factory chunk leaves no room for payload
    #[error("Invalid chunk size {chunk}, minimum size: {minimum}")]
    InvalidChunkSize { chunk: usize, minimum: usize },

    /// Socket level failure
    #[error("Transport error: {0}")]
    Transport(#[from] std::io::Error),

    /// Base32 / base64 / label decoding failure
    #[error("Decode error: {0}")]
    Decode(String),

    /// No connector registered under that name
    #[error("Connector {0} does not exist")]
    UnknownConnector(String),

    /// No handler registered under that name
    #[error("Handler {0} does not exist")]
    UnknownHandler(String),

    /// Registry already holds that name
    #[error("{0} already exists")]
    DuplicateName(String),

    /// Unparseable connector address
    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Cipher handler failure
    #[error("Cipher error: {0}")]
    Cipher(String),

    /// Read or write on a connector that is closed
    #[error("Connector {0} is not connected")]
    NotConnected(&'static str),
}

impl From<dns::DnsError> for PulsarError {
    fn from(err: dns::DnsError) -> Self {
        PulsarError::MalformedPacket(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, PulsarError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dns_error_is_malformed_packet() {
        let err: PulsarError = dns::DnsError::TooShort(3).into();
        assert!(matches!(err, PulsarError::MalformedPacket(_)));
        assert_eq!(err.to_string(), "Malformed packet: DNS message too short: 3 bytes");
    }

    #[test]
    fn test_chunk_error_message() {
        let err = PulsarError::InvalidChunkSize { chunk: 4, minimum: 13 };
        assert_eq!(err.to_string(), "Invalid chunk size 4, minimum size: 13");
    }
}
