//! Base32 / base64 handlers
//!
//! Encoding turns every buffer into one padded encoding. Decoding is
//! incremental: input arrives in arbitrary slices, possibly several padded
//! encodings glued together, so complete blocks are decoded as soon as they
//! are available and the remainder waits for the next call.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use data_encoding::BASE32;

use super::{Handler, HandlerBuilder};
use crate::{PulsarError, Result};

const PADDING: u8 = b'=';

/// Base encodings offered as handlers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Base {
    Base32,
    Base64,
}

impl Base {
    /// Characters per encoded block
    fn block(self) -> usize {
        match self {
            Base::Base32 => 8,
            Base::Base64 => 4,
        }
    }

    fn encode(self, buf: &[u8]) -> Vec<u8> {
        match self {
            Base::Base32 => BASE32.encode(buf).into_bytes(),
            Base::Base64 => BASE64.encode(buf).into_bytes(),
        }
    }

    fn decode(self, buf: &[u8]) -> Result<Vec<u8>> {
        match self {
            Base::Base32 => BASE32
                .decode(buf)
                .map_err(|e| PulsarError::Decode(format!("base32: {}", e))),
            Base::Base64 => BASE64
                .decode(buf)
                .map_err(|e| PulsarError::Decode(format!("base64: {}", e))),
        }
    }
}

impl HandlerBuilder for Base {
    fn name(&self) -> &'static str {
        match self {
            Base::Base32 => "base32",
            Base::Base64 => "base64",
        }
    }

    fn description(&self) -> &'static str {
        match self {
            Base::Base32 => "Base32 encoder/decoder",
            Base::Base64 => "Base64 encoder/decoder",
        }
    }

    fn build(&self, _options: &str) -> Result<Box<dyn Handler>> {
        Ok(Box::new(BaseCodec::new(*self)))
    }
}

pub struct BaseCodec {
    base: Base,
    /// Encoded input not yet forming a complete block
    pending: Vec<u8>,
}

impl BaseCodec {
    pub fn new(base: Base) -> Self {
        Self {
            base,
            pending: Vec::new(),
        }
    }

    /// Length of the next decodable piece of `buf`
    ///
    /// Either up to and including the first block that ends in padding, or
    /// all whole blocks when no padding is present.
    fn split(&self, buf: &[u8]) -> usize {
        let block = self.base.block();
        buf.chunks_exact(block)
            .position(|chunk| chunk[block - 1] == PADDING)
            .map_or(buf.len() / block * block, |i| (i + 1) * block)
    }

    fn decode_stream(&mut self, buf: &[u8]) -> Result<Vec<u8>> {
        // line breaks from console input are not part of the encoding
        self.pending
            .extend(buf.iter().copied().filter(|b| *b != b'\n' && *b != b'\r'));

        let mut out = Vec::new();
        let mut start = 0;
        loop {
            let rest = &self.pending[start..];
            let end = self.split(rest);
            if end == 0 {
                break;
            }
            match self.base.decode(&rest[..end]) {
                Ok(decoded) => out.extend_from_slice(&decoded),
                Err(e) => {
                    self.pending.clear();
                    return Err(e);
                }
            }
            start += end;
        }

        self.pending.drain(..start);
        Ok(out)
    }
}

impl Handler for BaseCodec {
    fn name(&self) -> &'static str {
        HandlerBuilder::name(&self.base)
    }

    fn process(&mut self, buf: &[u8], decode: bool) -> Result<Vec<u8>> {
        if decode {
            self.decode_stream(buf)
        } else {
            Ok(self.base.encode(buf))
        }
    }
}
