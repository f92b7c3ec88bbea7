//! DNS message header and question section codec
//!
//! Only the question section is interpreted. Records after it are kept as
//! opaque bytes in [`DnsMessage::data`], which is also where new questions
//! are appended.
//!
//! Offsets inside `data` are converted to wire offsets (relative to the start
//! of the 12-byte header) whenever a compression pointer is written or read.

use bytes::{Buf, BufMut, BytesMut};

use super::question::{Question, QUERY_SIZE};
use super::{DnsError, Result};

/// Size of the fixed DNS header
pub const HEADER_SIZE: usize = 12;

/// Standard query with recursion desired
pub const FLAGS_QUERY: u16 = 0x0100;

const POINTER_MASK: u8 = 0xC0;
const POINTER_FLAG: u16 = 0xC000;
/// Largest wire offset a 14-bit pointer can reach
const MAX_POINTER: usize = 0x3FFF;

/// A DNS message
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DnsMessage {
    pub id: u16,
    pub flags: u16,
    pub qd_count: u16,
    pub an_count: u16,
    pub ns_count: u16,
    pub ar_count: u16,
    /// Raw record sections, questions first
    pub data: Vec<u8>,
}

impl DnsMessage {
    /// Create an empty query
    pub fn new(id: u16) -> Self {
        Self {
            id,
            flags: FLAGS_QUERY,
            ..Default::default()
        }
    }

    /// Parse the header and keep the remainder for lazy question parsing
    pub fn deserialize(buf: &[u8]) -> Result<Self> {
        if buf.len() < HEADER_SIZE {
            return Err(DnsError::TooShort(buf.len()));
        }

        let mut header = &buf[..HEADER_SIZE];
        Ok(Self {
            id: header.get_u16(),
            flags: header.get_u16(),
            qd_count: header.get_u16(),
            an_count: header.get_u16(),
            ns_count: header.get_u16(),
            ar_count: header.get_u16(),
            data: buf[HEADER_SIZE..].to_vec(),
        })
    }

    /// Header followed by `data`
    pub fn serialize(&self) -> Vec<u8> {
        let mut buf = BytesMut::with_capacity(HEADER_SIZE + self.data.len());
        buf.put_u16(self.id);
        buf.put_u16(self.flags);
        buf.put_u16(self.qd_count);
        buf.put_u16(self.an_count);
        buf.put_u16(self.ns_count);
        buf.put_u16(self.ar_count);
        buf.put_slice(&self.data);
        buf.to_vec()
    }

    /// Append a question, compressing its name against earlier questions
    ///
    /// The longest label suffix of the new name that already appears, byte
    /// for byte, as a complete name tail inside a previous question is
    /// replaced by a two-byte pointer to the first such occurrence.
    pub fn add_question(&mut self, question: &Question) -> Result<()> {
        let qd_count = self
            .qd_count
            .checked_add(1)
            .ok_or(DnsError::TooManyQuestions)?;
        let labels = question.encode_name()?;
        let candidates = self.name_suffixes()?;

        let mut pointer = None;
        'search: for start in 0..labels.len() {
            for (offset, suffix) in &candidates {
                if suffix.len() == labels.len() - start
                    && suffix.iter().zip(&labels[start..]).all(|(a, b)| a == b)
                {
                    pointer = Some((start, *offset));
                    break 'search;
                }
            }
        }

        let literal = pointer.map_or(labels.len(), |(start, _)| start);
        for label in &labels[..literal] {
            self.data.push(label.len() as u8);
            self.data.extend_from_slice(label);
        }
        match pointer {
            Some((_, offset)) => {
                self.data
                    .put_u16(POINTER_FLAG | (offset + HEADER_SIZE) as u16);
            }
            None => self.data.push(0),
        }
        question.write_trailer(&mut self.data);

        self.qd_count = qd_count;
        Ok(())
    }

    /// Decode the `qd_count` questions at the start of `data`
    pub fn questions(&self) -> Result<Vec<Question>> {
        let mut questions = Vec::with_capacity(self.qd_count as usize);
        let mut pos = 0;

        for _ in 0..self.qd_count {
            let (labels, next) = read_name(&self.data, pos)?;
            let mut trailer = self
                .data
                .get(next..next + QUERY_SIZE)
                .ok_or(DnsError::Truncated(next))?;

            let qtype = trailer.get_u16();
            let qclass = trailer.get_u16();
            let domain = labels
                .into_iter()
                .map(String::from_utf8)
                .collect::<std::result::Result<Vec<_>, _>>()
                .map_err(|_| DnsError::InvalidLabel(pos))?
                .join(".");

            questions.push(Question::new(domain, qtype, qclass));
            pos = next + QUERY_SIZE;
        }

        Ok(questions)
    }

    /// Every literal label position of the existing questions, with the full
    /// name that starts there (pointers resolved)
    fn name_suffixes(&self) -> Result<Vec<(usize, Vec<Vec<u8>>)>> {
        let mut suffixes = Vec::new();
        let mut pos = 0;

        for _ in 0..self.qd_count {
            let mut cursor = pos;
            loop {
                let len = *self.data.get(cursor).ok_or(DnsError::Truncated(cursor))?;
                if len == 0 {
                    cursor += 1;
                    break;
                }
                if len & POINTER_MASK == POINTER_MASK {
                    cursor += 2;
                    break;
                }
                if cursor + HEADER_SIZE <= MAX_POINTER {
                    let (name, _) = read_name(&self.data, cursor)?;
                    suffixes.push((cursor, name));
                }
                cursor += 1 + len as usize;
            }
            pos = cursor + QUERY_SIZE;
        }

        Ok(suffixes)
    }
}

/// Read the name at `pos`, following compression pointers
///
/// Returns the raw labels and the position right after the name as it is
/// laid out at `pos` (after the first pointer, if one was followed).
fn read_name(data: &[u8], mut pos: usize) -> Result<(Vec<Vec<u8>>, usize)> {
    let mut labels = Vec::new();
    let mut end = None;
    let mut jumps = 0;

    loop {
        let len = *data.get(pos).ok_or(DnsError::Truncated(pos))?;
        match len & POINTER_MASK {
            0x00 if len == 0 => {
                return Ok((labels, end.unwrap_or(pos + 1)));
            }
            0x00 => {
                let start = pos + 1;
                let stop = start + len as usize;
                let label = data.get(start..stop).ok_or(DnsError::Truncated(start))?;
                labels.push(label.to_vec());
                pos = stop;
            }
            POINTER_MASK => {
                let low = *data.get(pos + 1).ok_or(DnsError::Truncated(pos + 1))?;
                let wire = (((len & !POINTER_MASK) as usize) << 8) | low as usize;
                let target = wire
                    .checked_sub(HEADER_SIZE)
                    .filter(|target| *target < pos)
                    .ok_or(DnsError::BadPointer(wire))?;

                jumps += 1;
                if jumps > data.len() / 2 {
                    return Err(DnsError::PointerLoop(wire));
                }
                end.get_or_insert(pos + 2);
                pos = target;
            }
            _ => return Err(DnsError::BadLabelType(len)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dns::question::{CLASS_IN, TYPE_A, TYPE_TXT};

    fn roundtrip(message: &DnsMessage) -> DnsMessage {
        DnsMessage::deserialize(&message.serialize()).unwrap()
    }

    #[test]
    fn test_header_roundtrip() {
        let mut message = DnsMessage::new(0xbeef);
        message.an_count = 2;
        message.ar_count = 1;
        let wire = message.serialize();

        assert_eq!(&wire[..4], &[0xbe, 0xef, 0x01, 0x00]);
        assert_eq!(roundtrip(&message), message);
    }

    #[test]
    fn test_short_header_rejected() {
        assert!(matches!(
            DnsMessage::deserialize(&[0u8; 11]),
            Err(DnsError::TooShort(11))
        ));
    }

    #[test]
    fn test_single_question_layout() {
        let mut message = DnsMessage::new(1);
        message
            .add_question(&Question::new("ab.example.com", TYPE_A, CLASS_IN))
            .unwrap();

        assert_eq!(
            message.data,
            b"\x02ab\x07example\x03com\x00\x00\x01\x00\x01".to_vec()
        );
        assert_eq!(message.qd_count, 1);
    }

    #[test]
    fn test_suffix_compressed_to_pointer() {
        let mut message = DnsMessage::new(1);
        message
            .add_question(&Question::new("aaaa.t.example.com", TYPE_A, CLASS_IN))
            .unwrap();
        let first_len = message.data.len();
        message
            .add_question(&Question::new("bbbb.t.example.com", TYPE_A, CLASS_IN))
            .unwrap();

        // "t.example.com" starts after the 5-byte "aaaa" label: wire offset 12 + 5
        let second = &message.data[first_len..];
        assert_eq!(second, b"\x04bbbb\xc0\x11\x00\x01\x00\x01");

        let questions = roundtrip(&message).questions().unwrap();
        assert_eq!(questions[0].domain, "aaaa.t.example.com");
        assert_eq!(questions[1].domain, "bbbb.t.example.com");
    }

    #[test]
    fn test_identical_name_fully_compressed() {
        let mut message = DnsMessage::new(1);
        let question = Question::new("same.example.org", TYPE_TXT, CLASS_IN);
        message.add_question(&question).unwrap();
        let first_len = message.data.len();
        message.add_question(&question).unwrap();

        assert_eq!(&message.data[first_len..], b"\xc0\x0c\x00\x10\x00\x01");
        assert_eq!(roundtrip(&message).questions().unwrap(), vec![question.clone(), question]);
    }

    #[test]
    fn test_transitive_pointer_resolution() {
        let mut message = DnsMessage::new(7);
        let names = ["x.a.example.com", "y.x.a.example.com", "z.y.x.a.example.com"];
        for name in names {
            message
                .add_question(&Question::new(name, TYPE_A, CLASS_IN))
                .unwrap();
        }

        // third name only needs its own label plus one pointer into the second
        let tail = &message.data[message.data.len() - 8..];
        assert_eq!(tail[0], 1);
        assert_eq!(tail[1], b'z');
        assert_eq!(tail[2] & POINTER_MASK, POINTER_MASK);

        let decoded: Vec<String> = roundtrip(&message)
            .questions()
            .unwrap()
            .into_iter()
            .map(|q| q.domain)
            .collect();
        assert_eq!(decoded, names);
    }

    #[test]
    fn test_partial_label_match_not_compressed() {
        let mut message = DnsMessage::new(1);
        message
            .add_question(&Question::new("abc.example.com", TYPE_A, CLASS_IN))
            .unwrap();
        message
            .add_question(&Question::new("abc.example.net", TYPE_A, CLASS_IN))
            .unwrap();

        let questions = roundtrip(&message).questions().unwrap();
        assert_eq!(questions[1].domain, "abc.example.net");
        // no shared suffix: second name is written out in full
        assert_eq!(message.data.len(), 2 * (17 + QUERY_SIZE));
    }

    #[test]
    fn test_forward_pointer_rejected() {
        let mut message = DnsMessage::new(1);
        message.qd_count = 1;
        message.data = vec![0xc0, 0x20, 0, 1, 0, 1];
        assert!(matches!(message.questions(), Err(DnsError::BadPointer(0x20))));
    }

    #[test]
    fn test_truncated_question_rejected() {
        let mut message = DnsMessage::new(1);
        message.qd_count = 1;
        message.data = b"\x05abc".to_vec();
        assert!(matches!(message.questions(), Err(DnsError::Truncated(_))));
    }
}
