use std::future::Future;
use std::io;
use std::io::IoSliceMut;
use std::net::{IpAddr, SocketAddr};
use quinn_udp::{RecvMeta, UdpSocketState};
use tokio::io::Interest;
use tokio::net::UdpSocket;
use tokio::select;
use tracing::{error, info, trace};
use crate::config::CoapConfig;
use crate::engine::CoapEngine;
use crate::peer_info::PeerInfo;
use crate::time::SystemClock;
use crate::transport::UdpTransport;
use crate::util::random::RngRandom;

/// CoapEndPoint is the place where the engine meets the network: it listens on a UdpSocket,
///  feeds incoming datagrams to the engine and fires the engine's timers. Application code
///  registers resources and sends requests through [CoapEndPoint::engine].
///
/// Datagrams are received through `quinn-udp`, which reports the destination address of each
///  datagram. That address is the `sock_addr` the engine sees, so requests that arrived on a
///  multicast address are recognized as such even if the socket is bound to the unspecified
///  address.
///
/// NB: The engine is single-threaded, so the receive loop's future is not `Send`. Run it on a
///      current-thread runtime or inside a `LocalSet`.
pub struct CoapEndPoint {
    socket: UdpSocket,
    socket_state: UdpSocketState,
    clock: SystemClock,
    engine: CoapEngine,
}
impl CoapEndPoint {
    pub async fn new(config: CoapConfig) -> anyhow::Result<CoapEndPoint> {
        config.validate()?;

        let std_socket = std::net::UdpSocket::bind(config.bind_addr)?;
        std_socket.set_nonblocking(true)?;
        info!("bound socket to {:?}", std_socket.local_addr()?);

        let transport = UdpTransport::new(std_socket.try_clone()?)?;
        let socket_state = UdpSocketState::new((&std_socket).into())?;
        let socket = UdpSocket::from_std(std_socket)?;

        let clock = SystemClock::new();
        let engine = CoapEngine::new(
            config,
            Box::new(transport),
            Box::new(clock.clone()),
            Box::new(RngRandom {}),
        );

        Ok(CoapEndPoint {
            socket,
            socket_state,
            clock,
            engine,
        })
    }

    pub fn self_addr(&self) -> anyhow::Result<SocketAddr> {
        Ok(self.socket.local_addr()?)
    }

    pub fn engine(&mut self) -> &mut CoapEngine {
        &mut self.engine
    }

    /// Receives datagrams and fires timers until `shutdown` completes. All pending requests are
    ///  aborted and cached responses dropped when the loop ends.
    pub async fn recv_loop(&mut self, shutdown: impl Future<Output = ()>) {
        info!("starting receive loop");
        tokio::pin!(shutdown);

        // used if the platform does not report a datagram's destination
        let bound_ip = match self.socket.local_addr() {
            Ok(addr) => addr.ip(),
            Err(e) => {
                error!("socket has no local address: {}", e);
                return;
            }
        };

        let mut buf = vec![0u8; u16::MAX as usize];
        loop {
            let deadline = self.engine.next_timer_deadline()
                .map(|t| tokio::time::Instant::from_std(self.clock.instant_of(t)));
            let timer = async move {
                match deadline {
                    Some(deadline) => tokio::time::sleep_until(deadline).await,
                    None => std::future::pending().await,
                }
            };

            select! {
                _ = &mut shutdown => {
                    info!("shutting down receive loop");
                    break;
                }
                _ = timer => {
                    self.engine.handle_timers();
                }
                received = recv_datagram(&self.socket, &self.socket_state, &mut buf) => {
                    let meta = match received {
                        Ok(meta) => meta,
                        Err(e) => {
                            error!("socket error: {}", e);
                            continue;
                        }
                    };
                    self.on_received(&buf[..meta.len], &meta, bound_ip);
                }
            }
        }

        self.engine.clear_all_requests_and_responses();
    }

    /// `buf` may hold several datagrams of `meta.stride` bytes each if the OS coalesced them
    fn on_received(&mut self, buf: &[u8], meta: &RecvMeta, bound_ip: IpAddr) {
        let sock_addr = meta.dst_ip.unwrap_or(bound_ip);
        let peer_info = PeerInfo::received(meta.addr, sock_addr);

        for datagram in buf.chunks(meta.stride.max(1)) {
            trace!("received {} bytes from {:?}", datagram.len(), peer_info);
            self.engine.receive(datagram, &peer_info);
        }
    }
}

async fn recv_datagram(socket: &UdpSocket, socket_state: &UdpSocketState, buf: &mut [u8]) -> io::Result<RecvMeta> {
    let mut meta = [RecvMeta::default()];
    socket.async_io(Interest::READABLE, || {
        socket_state.recv(socket.into(), &mut [IoSliceMut::new(&mut *buf)], &mut meta)
    }).await?;
    let [meta] = meta;
    Ok(meta)
}
