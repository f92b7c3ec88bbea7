//! Fragmentation and reassembly through the public API

use rand::seq::SliceRandom;
use rand::SeedableRng;

use pulsar::packet::HEADER_SIZE;
use pulsar::{Factory, Packet, Queue};

#[test]
fn test_thousand_bytes_in_ten_packets() {
    let factory = Factory::new(112, 0).unwrap();
    let buf: Vec<u8> = (0..1000u32).map(|i| (i % 256) as u8).collect();

    let packets = factory.fragment(&buf).unwrap();
    assert_eq!(packets.len(), 10);
    assert_eq!(
        packets.iter().map(|p| p.seq).collect::<Vec<_>>(),
        (1..=10).map(|i| i * 100).collect::<Vec<_>>()
    );

    let mut queue = Queue::new();
    for packet in packets {
        let wire = factory.serialize(&packet).unwrap();
        assert_eq!(wire.len(), 112);
        queue.add(factory.deserialize(&wire).unwrap());
    }
    assert_eq!(queue.buffer().unwrap(), buf);
}

#[test]
fn test_shuffled_generations_reassemble_in_order() {
    let sender = Factory::new(HEADER_SIZE + 50, 7_000).unwrap();
    let buffers: Vec<Vec<u8>> = (1..=5u8).map(|n| vec![n; 40 * n as usize + 3]).collect();

    let mut packets: Vec<Packet> = buffers
        .iter()
        .flat_map(|buf| sender.fragment(buf).unwrap())
        .collect();
    packets.shuffle(&mut rand::rngs::StdRng::seed_from_u64(42));

    let mut queue = Queue::new();
    for packet in packets {
        queue.add(packet);
    }

    for buf in &buffers {
        assert_eq!(queue.buffer().as_ref(), Some(buf));
    }
    assert!(queue.is_empty());
}

#[test]
fn test_lost_fragment_blocks_later_generations() {
    let factory = Factory::new(HEADER_SIZE + 16, 0).unwrap();
    let mut first = factory.fragment(&[0xaa; 64]).unwrap();
    let second = factory.fragment(b"next").unwrap();
    let lost = first.remove(1);

    let mut queue = Queue::new();
    for packet in first.into_iter().chain(second) {
        queue.add(packet);
    }
    assert!(queue.buffer().is_none());

    queue.add(lost);
    assert_eq!(queue.buffer().unwrap(), vec![0xaa; 64]);
    assert_eq!(queue.buffer().unwrap(), b"next");
}

#[test]
fn test_zero_length_write_is_end_of_stream() {
    let factory = Factory::new(64, 3).unwrap();
    let mut queue = Queue::new();

    for packet in factory.fragment(&[]).unwrap() {
        queue.add(packet);
    }
    assert_eq!(queue.buffer(), Some(Vec::new()));
}
