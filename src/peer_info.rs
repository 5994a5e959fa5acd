use std::fmt::{Debug, Formatter};
use std::net::{IpAddr, Ipv6Addr, SocketAddr};


/// Addressing information that travels with every inbound and outbound message: who the peer is,
///  and on which local address the message was received (or should be sent from).
#[derive(Clone, Copy, Eq, PartialEq)]
pub struct PeerInfo {
    pub peer_addr: SocketAddr,
    /// local address a message was received on; unspecified for outbound messages that leave
    ///  the choice to the transport
    pub sock_addr: IpAddr,
    pub hop_limit: u8,
    pub multicast_loop: bool,
}
impl Debug for PeerInfo {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{:?} via {:?}]", self.peer_addr, self.sock_addr)
    }
}

impl PeerInfo {
    pub const DEFAULT_HOP_LIMIT: u8 = 64;

    pub fn new(peer_addr: SocketAddr) -> PeerInfo {
        PeerInfo {
            peer_addr,
            sock_addr: IpAddr::V6(Ipv6Addr::UNSPECIFIED),
            hop_limit: Self::DEFAULT_HOP_LIMIT,
            multicast_loop: false,
        }
    }

    pub fn received(peer_addr: SocketAddr, sock_addr: IpAddr) -> PeerInfo {
        PeerInfo {
            sock_addr,
            ..Self::new(peer_addr)
        }
    }

    pub fn is_peer_multicast(&self) -> bool {
        self.peer_addr.ip().is_multicast()
    }

    pub fn is_sock_addr_multicast(&self) -> bool {
        self.sock_addr.is_multicast()
    }

    /// Mesh anycast locators use the interface identifier `0000:00ff:fe00:fcXX`. Responses to
    ///  requests sent to such an address come from whichever node currently serves it.
    pub fn is_peer_anycast_locator(&self) -> bool {
        match self.peer_addr.ip() {
            IpAddr::V4(_) => false,
            IpAddr::V6(ip) => {
                let s = ip.segments();
                s[4] == 0 && s[5] == 0x00ff && s[6] == 0xfe00 && (s[7] & 0xff00) == 0xfc00
            }
        }
    }

    pub fn has_same_peer_addr_and_port(&self, other: &PeerInfo) -> bool {
        self.peer_addr == other.peer_addr
    }

    /// Does a response from `responder` belong to an exchange that was sent to `self`? Exact
    ///  address and port match, unless the request went to a multicast or anycast destination.
    pub fn matches_responder(&self, responder: &PeerInfo) -> bool {
        self.has_same_peer_addr_and_port(responder)
            || self.is_peer_multicast()
            || self.is_peer_anycast_locator()
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;
    use super::*;

    fn peer(s: &str) -> PeerInfo {
        PeerInfo::new(s.parse().unwrap())
    }

    #[rstest]
    #[case::anycast("[fd00::ff:fe00:fc10]:5683", true)]
    #[case::anycast_leader("[fd00::ff:fe00:fc00]:5683", true)]
    #[case::rloc("[fd00::ff:fe00:1000]:5683", false)]
    #[case::regular("[fd00::1234]:5683", false)]
    #[case::v4("10.0.0.1:5683", false)]
    fn test_is_peer_anycast_locator(#[case] addr: &str, #[case] expected: bool) {
        assert_eq!(peer(addr).is_peer_anycast_locator(), expected);
    }

    #[rstest]
    #[case::same("[fd00::1]:5683", "[fd00::1]:5683", true)]
    #[case::other_port("[fd00::1]:5683", "[fd00::1]:5684", false)]
    #[case::other_addr("[fd00::1]:5683", "[fd00::2]:5683", false)]
    #[case::multicast("[ff03::1]:5683", "[fd00::2]:5683", true)]
    #[case::anycast("[fd00::ff:fe00:fc01]:5683", "[fd00::2]:5683", true)]
    fn test_matches_responder(#[case] destination: &str, #[case] responder: &str, #[case] expected: bool) {
        assert_eq!(peer(destination).matches_responder(&peer(responder)), expected);
    }

    #[test]
    fn test_received_keeps_sock_addr() {
        let info = PeerInfo::received("[fd00::1]:5683".parse().unwrap(), "ff03::1".parse().unwrap());
        assert!(info.is_sock_addr_multicast());
        assert!(!info.is_peer_multicast());
        assert_eq!(info.hop_limit, PeerInfo::DEFAULT_HOP_LIMIT);
    }
}
