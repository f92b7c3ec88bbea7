//! Minimal DNS wire format for carrying payload in query names
//!
//! Implements the 12-byte header, the question section and RFC 1035 name
//! compression. Answer, authority and additional records are carried as
//! opaque bytes.

pub mod message;
pub mod question;

pub use message::{DnsMessage, FLAGS_QUERY, HEADER_SIZE};
pub use question::{Question, CLASS_IN, MAX_LABEL_LEN, QUERY_SIZE, TYPE_A, TYPE_TXT};

use thiserror::Error;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum DnsError {
    #[error("DNS message too short: {0} bytes")]
    TooShort(usize),

    #[error("Truncated DNS record at offset {0}")]
    Truncated(usize),

    #[error("Invalid compression pointer to offset {0}")]
    BadPointer(usize),

    #[error("Compression pointer loop at offset {0}")]
    PointerLoop(usize),

    #[error("Unsupported label type 0x{0:02x}")]
    BadLabelType(u8),

    #[error("Label is not valid UTF-8 in question at offset {0}")]
    InvalidLabel(usize),

    #[error("Label too long: {0} bytes (max: 63)")]
    LabelTooLong(usize),

    #[error("Too many questions in one message")]
    TooManyQuestions,
}

pub type Result<T> = std::result::Result<T, DnsError>;
