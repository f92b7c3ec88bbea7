//! Authenticated encryption handler
//!
//! Options are `[algo#]key`: `aes` (AES-256-GCM, the default) or `chacha`
//! (ChaCha20-Poly1305). The 256-bit key is the SHA-256 digest of `key`.
//!
//! Each encoded buffer becomes one or more frames:
//!
//! ```text
//! | len: u16 BE | nonce: 12 | ciphertext + tag |
//! ```
//!
//! where `len` counts nonce, ciphertext and tag. Decoding reassembles frames
//! split across calls before opening them.

use bytes::{Buf, BufMut};
use ring::aead::{self, Aad, LessSafeKey, Nonce, UnboundKey, NONCE_LEN};
use ring::digest;
use ring::rand::{SecureRandom, SystemRandom};

use super::{Handler, HandlerBuilder};
use crate::{PulsarError, Result};

pub const DEFAULT_ALGORITHM: &str = "aes";

const ALGORITHM_SEPARATOR: char = '#';
const LEN_SIZE: usize = 2;
const TAG_LEN: usize = 16;

/// Largest plaintext that fits one frame
pub const MAX_FRAME_PLAINTEXT: usize = u16::MAX as usize - NONCE_LEN - TAG_LEN;

/// Split `[algo#]key`, defaulting the algorithm
pub fn split_cipher_options(options: &str) -> (&str, &str) {
    options
        .split_once(ALGORITHM_SEPARATOR)
        .unwrap_or((DEFAULT_ALGORITHM, options))
}

/// Cipher handler kind
pub struct Cipher;

impl HandlerBuilder for Cipher {
    fn name(&self) -> &'static str {
        "cipher"
    }

    fn description(&self) -> &'static str {
        "AEAD cipher - key|[aes|chacha#key]"
    }

    fn build(&self, options: &str) -> Result<Box<dyn Handler>> {
        let (algo, key) = split_cipher_options(options);
        Ok(Box::new(CipherHandler::new(algo, key)?))
    }
}

pub struct CipherHandler {
    key: LessSafeKey,
    rng: SystemRandom,
    /// Bytes of an incomplete frame
    pending: Vec<u8>,
}

impl CipherHandler {
    pub fn new(algo: &str, key: &str) -> Result<Self> {
        let algorithm = match algo {
            "aes" => &aead::AES_256_GCM,
            "chacha" => &aead::CHACHA20_POLY1305,
            other => return Err(PulsarError::Cipher(format!("invalid cipher: {}", other))),
        };
        if key.is_empty() {
            return Err(PulsarError::Cipher("missing key".to_string()));
        }

        let digest = digest::digest(&digest::SHA256, key.as_bytes());
        let unbound = UnboundKey::new(algorithm, digest.as_ref())
            .map_err(|_| PulsarError::Cipher("key setup failed".to_string()))?;

        Ok(Self {
            key: LessSafeKey::new(unbound),
            rng: SystemRandom::new(),
            pending: Vec::new(),
        })
    }

    fn seal(&self, plaintext: &[u8], out: &mut Vec<u8>) -> Result<()> {
        let mut nonce = [0u8; NONCE_LEN];
        self.rng
            .fill(&mut nonce)
            .map_err(|_| PulsarError::Cipher("nonce generation failed".to_string()))?;

        let mut sealed = plaintext.to_vec();
        self.key
            .seal_in_place_append_tag(Nonce::assume_unique_for_key(nonce), Aad::empty(), &mut sealed)
            .map_err(|_| PulsarError::Cipher("encryption failed".to_string()))?;

        out.put_u16((NONCE_LEN + sealed.len()) as u16);
        out.put_slice(&nonce);
        out.put_slice(&sealed);
        Ok(())
    }

    fn open(&self, frame: &[u8]) -> Result<Vec<u8>> {
        if frame.len() < NONCE_LEN + TAG_LEN {
            return Err(PulsarError::Cipher(format!(
                "frame of {} bytes is too short",
                frame.len()
            )));
        }

        let (nonce, sealed) = frame.split_at(NONCE_LEN);
        let nonce = Nonce::try_assume_unique_for_key(nonce)
            .map_err(|_| PulsarError::Cipher("invalid nonce".to_string()))?;
        let mut in_out = sealed.to_vec();
        let plaintext = self
            .key
            .open_in_place(nonce, Aad::empty(), &mut in_out)
            .map_err(|_| PulsarError::Cipher("invalid algorithm or key".to_string()))?;
        Ok(plaintext.to_vec())
    }

    fn encode(&self, buf: &[u8]) -> Result<Vec<u8>> {
        let mut out = Vec::with_capacity(buf.len() + LEN_SIZE + NONCE_LEN + TAG_LEN);
        for chunk in buf.chunks(MAX_FRAME_PLAINTEXT) {
            self.seal(chunk, &mut out)?;
        }
        Ok(out)
    }

    fn decode(&mut self, buf: &[u8]) -> Result<Vec<u8>> {
        self.pending.extend_from_slice(buf);

        let mut out = Vec::new();
        let mut start = 0;
        while self.pending.len() - start >= LEN_SIZE {
            let len = (&self.pending[start..]).get_u16() as usize;
            let end = start + LEN_SIZE + len;
            if self.pending.len() < end {
                break;
            }
            match self.open(&self.pending[start + LEN_SIZE..end]) {
                Ok(plaintext) => out.extend_from_slice(&plaintext),
                Err(e) => {
                    self.pending.clear();
                    return Err(e);
                }
            }
            start = end;
        }

        self.pending.drain(..start);
        Ok(out)
    }
}

impl Handler for CipherHandler {
    fn name(&self) -> &'static str {
        "cipher"
    }

    fn process(&mut self, buf: &[u8], decode: bool) -> Result<Vec<u8>> {
        if decode {
            self.decode(buf)
        } else {
            self.encode(buf)
        }
    }
}
