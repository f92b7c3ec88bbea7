//! Transport-agnostic fragmentation and reassembly
//!
//! A [`Factory`] cuts an application buffer into fixed-size [`Packet`]s, each
//! carrying the generation (`base_seq`), its end offset (`seq`) and the full
//! buffer length. A [`Queue`] takes packets back in any order and yields the
//! original buffer once a whole generation is present.

pub mod factory;
pub mod packet;
pub mod queue;

pub use factory::Factory;
pub use packet::{Packet, HEADER_SIZE};
pub use queue::Queue;
