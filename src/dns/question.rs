//! DNS question records

use bytes::BufMut;

use super::{DnsError, Result};

/// Size of the type + class trailer of a question
pub const QUERY_SIZE: usize = 4;

/// Maximum length of a single label (RFC 1035)
pub const MAX_LABEL_LEN: usize = 63;

pub const TYPE_A: u16 = 1;
pub const TYPE_NS: u16 = 2;
pub const TYPE_CNAME: u16 = 5;
pub const TYPE_SOA: u16 = 6;
pub const TYPE_PTR: u16 = 12;
pub const TYPE_MX: u16 = 15;
pub const TYPE_TXT: u16 = 16;
pub const TYPE_AAAA: u16 = 28;

pub const CLASS_IN: u16 = 1;

/// A question: domain name plus record type and class
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Question {
    pub domain: String,
    pub qtype: u16,
    pub qclass: u16,
}

impl Question {
    pub fn new(domain: impl Into<String>, qtype: u16, qclass: u16) -> Self {
        Self {
            domain: domain.into(),
            qtype,
            qclass,
        }
    }

    /// Labels of the domain, without empty leading/trailing separators
    pub fn labels(&self) -> Vec<&str> {
        split_labels(&self.domain)
    }

    /// Raw label bytes, checked against the label length limit
    pub(crate) fn encode_name(&self) -> Result<Vec<Vec<u8>>> {
        self.labels()
            .into_iter()
            .map(|label| {
                if label.len() > MAX_LABEL_LEN {
                    return Err(DnsError::LabelTooLong(label.len()));
                }
                Ok(label.as_bytes().to_vec())
            })
            .collect()
    }

    /// Type and class trailer
    pub(crate) fn write_trailer(&self, buf: &mut Vec<u8>) {
        buf.put_u16(self.qtype);
        buf.put_u16(self.qclass);
    }
}

pub(crate) fn split_labels(domain: &str) -> Vec<&str> {
    domain.split('.').filter(|label| !label.is_empty()).collect()
}
