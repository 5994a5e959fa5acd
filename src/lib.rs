//! A CoAP (RFC 7252) transaction engine for constrained IPv6 mesh networks (6LoWPAN / Thread
//!  style), with block-wise transfers (RFC 7959) and observe (RFC 7641).
//!
//! ## Design goals
//!
//! * The engine does no I/O and owns no threads: datagrams are handed to it, messages leave it
//!   through a [transport::Transport], and a driver calls it when its timer deadline is reached
//!   * [end_point::CoapEndPoint] is such a driver for a tokio UDP socket
//!   * tests drive the engine with a manual clock and a recording transport
//! * Reliability for confirmable messages: retransmission with exponential back-off, matching of
//!   ACK / Reset by message id and of separate responses by token
//! * Deduplication on the server side: a retransmitted request is answered from a bounded cache
//!   of recent responses instead of invoking the handler again
//! * Every transaction finalizes exactly once, with a response, a timeout or an abort
//!   * observe notifications and responses to multicast requests are delivered without
//!     finalizing the transaction
//! * Bounded memory: the number of pending requests, cached responses, block sizes and message
//!   lengths are all limited by configuration
//! * Single-threaded: handlers are called synchronously with `&mut CoapEngine` and may call back
//!   into the engine
//!
//! ## Message format
//!
//! All numbers in network byte order (BE):
//! ```ascii
//! 0: version (2 bits, always 1), type (2 bits: CON, NON, ACK, RST), token length (4 bits, 0-8)
//! 1: code (3 bits class, 5 bits detail, e.g. 2.05 = 0x45)
//! 2: message id (u16)
//! 4: token (0-8 bytes)
//! *: options, sorted by option number and delta-encoded:
//!    * header byte: delta (4 bits), length (4 bits)
//!      * 0-12 inline, 13: one extension byte (value - 13), 14: two extension bytes
//!        (value - 269), 15: reserved
//!    * extended delta, extended length, value
//! *: 0xFF payload marker followed by the payload, absent if the payload is empty
//! ```
//!
//! ## Block options
//!
//! Block1 (27, request payload) and Block2 (23, response payload) carry `num << 4 | more << 3 |
//!  szx` in 1-3 bytes, the block size being `2^(szx + 4)` bytes.

pub mod config;
pub mod end_point;
pub mod engine;
pub mod error;
pub mod message;
pub mod peer_info;
pub mod resource;
pub mod responses_queue;
pub mod time;
pub mod transaction;
pub mod transport;
pub mod tx_parameters;
pub mod util;
pub mod test_util;

pub use config::CoapConfig;
pub use end_point::CoapEndPoint;
pub use engine::{CoapEngine, SendParams};
pub use error::{CoapError, CoapResult};
pub use message::{Code, Message, MessageType};
pub use peer_info::PeerInfo;


#[cfg(test)]
mod test {
    use tracing::Level;

    #[ctor::ctor]
    fn init_test_logging() {
        tracing_subscriber::fmt()
            .with_test_writer()
            .with_max_level(Level::TRACE)
            .try_init()
            .ok();
    }
}
