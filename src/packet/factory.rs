//! Fragmentation of application buffers into fixed-size packets

use rand::RngCore;
use std::sync::atomic::{AtomicU32, Ordering};

use super::packet::{Packet, HEADER_SIZE};
use crate::{PulsarError, Result};

/// Splits buffers into packets sized for one transport
///
/// The factory owns the generation counter: every call to [`Factory::fragment`]
/// stamps all of its packets with the current `base_seq` and then bumps the
/// counter by one. The counter is atomic so a connector can fragment on its
/// write path while its read path deserializes concurrently.
#[derive(Debug)]
pub struct Factory {
    /// Payload bytes per packet (transport chunk minus header)
    chunk: usize,
    base_seq: AtomicU32,
}

impl Factory {
    /// Create a factory for a transport chunk of `chunk` bytes
    ///
    /// `chunk` is the full serialized packet size, header included.
    ///
    /// # Errors
    ///
    /// Returns [`PulsarError::InvalidChunkSize`] when `chunk` leaves no room
    /// for payload after the header.
    pub fn new(chunk: usize, base_seq: u32) -> Result<Self> {
        if chunk <= HEADER_SIZE {
            return Err(PulsarError::InvalidChunkSize {
                chunk,
                minimum: HEADER_SIZE + 1,
            });
        }

        Ok(Self {
            chunk: chunk - HEADER_SIZE,
            base_seq: AtomicU32::new(base_seq),
        })
    }

    /// Payload bytes carried by each packet
    pub fn payload_size(&self) -> usize {
        self.chunk
    }

    /// Serialized size of each packet
    pub fn packet_size(&self) -> usize {
        self.chunk + HEADER_SIZE
    }

    /// Generation the next call to `fragment` will use
    pub fn next_base_seq(&self) -> u32 {
        self.base_seq.load(Ordering::Relaxed)
    }

    /// Split `buf` into packets of exactly `payload_size()` data bytes
    ///
    /// The tail of the last packet is filled with random bytes; receivers
    /// rely on `total_len` to drop them. An empty buffer still produces one
    /// packet (with `total_len == 0`), which peers read as end of stream.
    pub fn fragment(&self, buf: &[u8]) -> Result<Vec<Packet>> {
        let total_len = u32::try_from(buf.len()).map_err(|_| {
            PulsarError::MalformedPacket(format!("buffer of {} bytes is too large", buf.len()))
        })?;
        let base_seq = self.base_seq.fetch_add(1, Ordering::Relaxed);

        let mut rng = rand::thread_rng();
        let mut packets = Vec::with_capacity(buf.len() / self.chunk + 1);
        let mut done = 0usize;

        loop {
            let write = (buf.len() - done).min(self.chunk);
            let mut data = vec![0u8; self.chunk];
            data[..write].copy_from_slice(&buf[done..done + write]);
            if write < self.chunk {
                rng.fill_bytes(&mut data[write..]);
            }
            done += write;

            packets.push(Packet::new(
                base_seq,
                base_seq.wrapping_add(done as u32),
                total_len,
                data,
            ));

            if done == buf.len() {
                break;
            }
        }

        log::trace!(
            "Fragmented {} bytes into {} packets (bseq {})",
            buf.len(),
            packets.len(),
            base_seq
        );
        Ok(packets)
    }

    /// Validate and parse a received packet
    pub fn deserialize(&self, buf: &[u8]) -> Result<Packet> {
        if buf.len() < HEADER_SIZE {
            return Err(PulsarError::MalformedPacket(format!(
                "{} bytes is shorter than the {} byte header",
                buf.len(),
                HEADER_SIZE
            )));
        }
        if buf.len() - HEADER_SIZE > self.chunk {
            return Err(PulsarError::MalformedPacket(format!(
                "packet data of {} bytes exceeds chunk of {}",
                buf.len() - HEADER_SIZE,
                self.chunk
            )));
        }

        Packet::deserialize(buf)
    }

    /// Serialize a packet after checking it fits this factory's chunk
    pub fn serialize(&self, packet: &Packet) -> Result<Vec<u8>> {
        if packet.data.len() > self.chunk {
            return Err(PulsarError::MalformedPacket(
                "packet data longer than chunk".to_string(),
            ));
        }
        Ok(packet.serialize())
    }
}
