//! This module contains utilities for testing code based on the [CoapEngine]: a clock that is
//!  advanced by hand, deterministic randomness, a transport that records messages instead of
//!  sending them, and a response handler that records what it is called with.
//!
//! They are used for testing the engine itself, but they are also exported for application
//!  testing.

pub mod handler;
pub mod time;
pub mod transport;

use std::net::{IpAddr, Ipv6Addr, SocketAddr, SocketAddrV6};
use crate::config::CoapConfig;
use crate::engine::CoapEngine;
use crate::peer_info::PeerInfo;
use crate::test_util::time::{FixedRandom, ManualClock};
use crate::test_util::transport::TrackingMockTransport;

/// local address of engines created by [test_engine]
pub const TEST_SOCK_ADDR: Ipv6Addr = Ipv6Addr::new(0xfd00, 0, 0, 0, 0, 0, 0, 1);

/// convenience method for unit test code: create a [PeerInfo] based on a number, the same number
///  generating the same peer and different numbers different peers
pub fn test_peer_from_number(number: u16) -> PeerInfo {
    let peer_addr = SocketAddr::V6(SocketAddrV6::new(Ipv6Addr::new(0xfd00, 0, 0, 0, 0, 0, 1, number), CoapConfig::DEFAULT_PORT, 0, 0));
    PeerInfo::received(peer_addr, IpAddr::V6(TEST_SOCK_ADDR))
}

/// An engine with a [ManualClock] starting at zero, [FixedRandom] and a [TrackingMockTransport].
///  The clock and the transport are shared with the engine.
pub fn test_engine(config: CoapConfig) -> (CoapEngine, ManualClock, TrackingMockTransport) {
    let clock = ManualClock::default();
    let transport = TrackingMockTransport::default();
    let engine = CoapEngine::new(
        config,
        Box::new(transport.clone()),
        Box::new(clock.clone()),
        Box::new(FixedRandom::new(1000)),
    );
    (engine, clock, transport)
}
