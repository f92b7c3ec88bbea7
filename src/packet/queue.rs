//! Out-of-order reassembly buffer

use std::collections::VecDeque;

use super::packet::Packet;

/// Delivered generations remembered to reject late copies
const RECENT_GENERATIONS: usize = 64;

const HALF_RANGE: u32 = 1 << 31;

/// Reassembly queue for the receive path of one connector
///
/// Packets may arrive in any order and more than once. They are kept sorted
/// by generation and then by offset; [`Queue::buffer`] hands out the oldest
/// generation once every fragment of it is present.
///
/// Generations are compared in serial-number order around an anchor taken
/// from the first packet of a non-empty run, so the counter may wrap from
/// `u32::MAX` to 0 without reordering.
#[derive(Debug, Default)]
pub struct Queue {
    packets: Vec<Packet>,
    /// Generation numbers at the anchor sort first
    anchor: u32,
    /// Generations already handed out, oldest first
    delivered: VecDeque<u32>,
}

impl Queue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of queued packets
    pub fn len(&self) -> usize {
        self.packets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.packets.is_empty()
    }

    fn order_key(&self, packet: &Packet) -> (u32, u32) {
        (packet.base_seq.wrapping_sub(self.anchor), packet.offset())
    }

    /// Queue a packet, returns false if it was a duplicate
    ///
    /// Copies of packets already queued, and of generations handed out
    /// recently, are duplicates.
    pub fn add(&mut self, packet: Packet) -> bool {
        if self.delivered.contains(&packet.base_seq) {
            log::trace!("Dropping packet of delivered generation {}", packet.base_seq);
            return false;
        }
        if self
            .packets
            .iter()
            .any(|p| p.base_seq == packet.base_seq && p.seq == packet.seq)
        {
            log::trace!("Dropping duplicate packet bseq {} seq {}", packet.base_seq, packet.seq);
            return false;
        }

        if self.packets.is_empty() {
            self.anchor = packet.base_seq.wrapping_sub(HALF_RANGE);
        }

        let out_of_order = self
            .packets
            .last()
            .map_or(false, |last| self.order_key(&packet) < self.order_key(last));

        self.packets.push(packet);

        if out_of_order {
            // stable: equal keys keep arrival order
            let anchor = self.anchor;
            self.packets
                .sort_by_key(|p| (p.base_seq.wrapping_sub(anchor), p.offset()));
        }
        true
    }

    /// Extract the oldest generation if it is complete
    ///
    /// Walks the queue from the front while packets share the first packet's
    /// generation. Stops at the terminal packet (`seq - base_seq == total_len`)
    /// and returns the concatenated payloads, with the terminal packet's
    /// random padding cut off. Returns `None` while the terminal packet is
    /// missing or a fragment before it has not arrived yet.
    pub fn buffer(&mut self) -> Option<Vec<u8>> {
        let base_seq = self.packets.first()?.base_seq;
        let mut consumed: u32 = 0;
        let mut terminal = None;

        for (i, packet) in self.packets.iter().enumerate() {
            if packet.base_seq != base_seq {
                // next generation starts before this one is complete
                break;
            }

            let expected = consumed
                .saturating_add(packet.data.len() as u32)
                .min(packet.total_len);
            if packet.offset() != expected {
                // gap, wait for the missing fragment
                return None;
            }

            if packet.is_terminal() {
                terminal = Some(i);
                break;
            }
            consumed = packet.offset();
        }

        let terminal = terminal?;
        let mut buf = Vec::with_capacity(self.packets[terminal].total_len as usize);

        for packet in self.packets.drain(..=terminal) {
            if packet.is_terminal() {
                let remainder = (packet.total_len - consumed) as usize;
                buf.extend_from_slice(&packet.data[..remainder]);
            } else {
                buf.extend_from_slice(&packet.data);
            }
        }

        if self.delivered.len() == RECENT_GENERATIONS {
            self.delivered.pop_front();
        }
        self.delivered.push_back(base_seq);
        Some(buf)
    }

    /// Drop every queued packet
    pub fn clear(&mut self) {
        self.packets.clear();
        self.delivered.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packet::Factory;
    use crate::packet::HEADER_SIZE;

    fn fragments(buf: &[u8], payload: usize, base_seq: u32) -> Vec<Packet> {
        Factory::new(payload + HEADER_SIZE, base_seq)
            .unwrap()
            .fragment(buf)
            .unwrap()
    }

    #[test]
    fn test_in_order_reassembly() {
        let buf = b"the quick brown fox jumps over the lazy dog".to_vec();
        let mut queue = Queue::new();

        let packets = fragments(&buf, 10, 100);
        let last = packets.len() - 1;
        for (i, packet) in packets.into_iter().enumerate() {
            queue.add(packet);
            if i < last {
                assert!(queue.buffer().is_none());
            }
        }

        assert_eq!(queue.buffer().unwrap(), buf);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_reverse_order_reassembly() {
        let buf: Vec<u8> = (0..=255u8).collect();
        let mut queue = Queue::new();

        for packet in fragments(&buf, 16, 9).into_iter().rev() {
            queue.add(packet);
        }

        assert_eq!(queue.buffer().unwrap(), buf);
    }

    #[test]
    fn test_gap_blocks_reassembly() {
        let buf = vec![0x5a; 50];
        let mut packets = fragments(&buf, 10, 0);
        let missing = packets.remove(2);

        let mut queue = Queue::new();
        for packet in packets {
            queue.add(packet);
        }
        assert!(queue.buffer().is_none());

        queue.add(missing);
        assert_eq!(queue.buffer().unwrap(), buf);
    }

    #[test]
    fn test_duplicates_ignored() {
        let buf = vec![1u8; 25];
        let packets = fragments(&buf, 10, 0);
        let mut queue = Queue::new();

        assert!(queue.add(packets[0].clone()));
        assert!(!queue.add(packets[0].clone()));
        for packet in packets {
            queue.add(packet);
        }

        assert_eq!(queue.buffer().unwrap(), buf);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_generations_kept_apart() {
        let factory = Factory::new(HEADER_SIZE + 8, 500).unwrap();
        let first = factory.fragment(&[1u8; 20]).unwrap();
        let second = factory.fragment(&[2u8; 12]).unwrap();

        let mut queue = Queue::new();
        // second generation arrives interleaved with the first
        queue.add(second[1].clone());
        queue.add(first[0].clone());
        queue.add(second[0].clone());
        queue.add(first[2].clone());
        assert!(queue.buffer().is_none());

        queue.add(first[1].clone());
        assert_eq!(queue.buffer().unwrap(), vec![1u8; 20]);
        assert_eq!(queue.buffer().unwrap(), vec![2u8; 12]);
        assert!(queue.buffer().is_none());
    }

    #[test]
    fn test_late_copy_of_delivered_generation_dropped() {
        let factory = Factory::new(HEADER_SIZE + 8, u32::MAX).unwrap();
        let first = factory.fragment(&[3u8; 10]).unwrap();
        let second = factory.fragment(&[4u8; 4]).unwrap();

        let mut queue = Queue::new();
        for packet in &first {
            queue.add(packet.clone());
        }
        assert_eq!(queue.buffer().unwrap(), vec![3u8; 10]);

        // retransmitted copy, then the next generation across the wrap
        assert!(!queue.add(first[0].clone()));
        assert!(queue.add(second[0].clone()));
        assert_eq!(second[0].base_seq, 0);
        assert_eq!(queue.buffer().unwrap(), vec![4u8; 4]);
    }

    #[test]
    fn test_overtaken_generation_still_delivered() {
        let factory = Factory::new(HEADER_SIZE + 16, 1000).unwrap();
        let first = factory.fragment(b"first write").unwrap();
        let second = factory.fragment(b"second write").unwrap();

        let mut queue = Queue::new();
        queue.add(second[0].clone());
        assert_eq!(queue.buffer().unwrap(), b"second write");

        assert!(queue.add(first[0].clone()));
        assert_eq!(queue.buffer().unwrap(), b"first write");
        assert!(!queue.add(second[0].clone()));
    }

    #[test]
    fn test_wrapped_generation_counter_keeps_order() {
        let factory = Factory::new(HEADER_SIZE + 4, u32::MAX).unwrap();
        let older = factory.fragment(b"AAAA").unwrap();
        let newer = factory.fragment(b"BBBB").unwrap();
        assert_eq!(newer[0].base_seq, 0);

        for arrival in [[&older[0], &newer[0]], [&newer[0], &older[0]]] {
            let mut queue = Queue::new();
            for packet in arrival {
                queue.add(packet.clone());
            }
            assert_eq!(queue.buffer().unwrap(), b"AAAA");
            assert_eq!(queue.buffer().unwrap(), b"BBBB");
        }
    }

    #[test]
    fn test_delivered_memory_is_bounded() {
        let factory = Factory::new(HEADER_SIZE + 4, 0).unwrap();
        let mut queue = Queue::new();
        let first = factory.fragment(b"old").unwrap();
        queue.add(first[0].clone());
        queue.buffer().unwrap();

        for _ in 0..RECENT_GENERATIONS {
            for packet in factory.fragment(b"x").unwrap() {
                queue.add(packet);
            }
            queue.buffer().unwrap();
        }
        assert_eq!(queue.delivered.len(), RECENT_GENERATIONS);
        assert!(queue.add(first[0].clone()));
    }

    #[test]
    fn test_empty_generation_yields_empty_buffer() {
        let mut queue = Queue::new();
        for packet in fragments(&[], 32, 1) {
            queue.add(packet);
        }
        assert_eq!(queue.buffer(), Some(Vec::new()));
    }

    #[test]
    fn test_clear() {
        let mut queue = Queue::new();
        for packet in fragments(&[7u8; 40], 10, 0).into_iter().take(3) {
            queue.add(packet);
        }
        assert_eq!(queue.len(), 3);
        queue.clear();
        assert!(queue.is_empty());
        assert!(queue.buffer().is_none());
    }
}
