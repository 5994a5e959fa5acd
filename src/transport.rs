use std::net::{SocketAddr, UdpSocket};
#[cfg(test)] use mockall::automock;
use tracing::{debug, trace};
use crate::error::CoapResult;
use crate::message::Message;
use crate::peer_info::PeerInfo;

/// Sends a message to a peer without blocking. The engine calls this from its single thread of
///  control, so implementations must return immediately: a transport that can not accept a
///  datagram right now reports `NoBufs`.
#[cfg_attr(test, automock)]
pub trait Transport {
    fn send(&self, message: &Message, peer_info: &PeerInfo) -> CoapResult<()>;
}

/// [Transport] for a non-blocking UDP socket. Sends go straight to the OS and do not depend on
///  a runtime's readiness tracking, so they succeed before the end point's loop first runs. The
///  end point receives on a clone of the same socket.
///
/// NB: The message priority and the hop limit are not applied by this implementation, they are
///      carried for transports with queueing or per-datagram socket options.
pub struct UdpTransport {
    socket: UdpSocket,
}
impl UdpTransport {
    pub fn new(socket: UdpSocket) -> CoapResult<UdpTransport> {
        socket.set_nonblocking(true)?;
        Ok(UdpTransport {
            socket,
        })
    }
}

impl Transport for UdpTransport {
    fn send(&self, message: &Message, peer_info: &PeerInfo) -> CoapResult<()> {
        trace!("sending {:?} to {:?}", message, peer_info);

        if peer_info.is_peer_multicast() {
            match peer_info.peer_addr {
                SocketAddr::V4(_) => self.socket.set_multicast_loop_v4(peer_info.multicast_loop)?,
                SocketAddr::V6(_) => self.socket.set_multicast_loop_v6(peer_info.multicast_loop)?,
            }
        }

        let buf = message.ser();
        match self.socket.send_to(&buf, peer_info.peer_addr) {
            Ok(_) => Ok(()),
            Err(e) => {
                debug!("error sending UDP datagram to {:?}: {}", peer_info.peer_addr, e);
                Err(e.into())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::net::{Ipv6Addr, SocketAddrV6};
    use crate::message::{Code, MessageType};
    use super::*;

    fn localhost() -> SocketAddr {
        SocketAddr::V6(SocketAddrV6::new(Ipv6Addr::LOCALHOST, 0, 0, 0))
    }

    #[tokio::test]
    async fn test_udp_send_right_after_bind() {
        let receiver = tokio::net::UdpSocket::bind(localhost()).await.unwrap();
        let transport = UdpTransport::new(UdpSocket::bind(localhost()).unwrap()).unwrap();

        let mut message = Message::new(MessageType::NonConfirmable, Code::POST);
        message.set_message_id(17);
        message.append_payload(b"abc").unwrap();

        transport.send(&message, &PeerInfo::new(receiver.local_addr().unwrap())).unwrap();
        message.set_message_id(18);
        transport.send(&message, &PeerInfo::new(receiver.local_addr().unwrap())).unwrap();

        let mut buf = [0u8; 64];
        for message_id in [17, 18] {
            let (len, _) = receiver.recv_from(&mut buf).await.unwrap();
            assert_eq!(Message::deser(&buf[..len]).unwrap().message_id(), message_id);
        }
    }

    #[test]
    fn test_udp_send_without_runtime() {
        let receiver = UdpSocket::bind(localhost()).unwrap();
        let transport = UdpTransport::new(UdpSocket::bind(localhost()).unwrap()).unwrap();

        let mut message = Message::new(MessageType::Confirmable, Code::GET);
        message.set_message_id(5);
        message.set_token(&[1, 2]).unwrap();
        transport.send(&message, &PeerInfo::new(receiver.local_addr().unwrap())).unwrap();

        let mut buf = [0u8; 64];
        let (len, _) = receiver.recv_from(&mut buf).unwrap();
        assert_eq!(Message::deser(&buf[..len]).unwrap(), message);
    }
}
