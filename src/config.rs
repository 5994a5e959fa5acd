use std::net::{Ipv6Addr, SocketAddr, SocketAddrV6};
use anyhow::bail;
use crate::message::block::BlockSize;
use crate::message::Message;
use crate::tx_parameters::TxParameters;

#[derive(Debug, Clone)]
pub struct CoapConfig {
    /// The end point binds its UDP socket to this address. Received messages carry the address
    ///  they were sent to as their local address, also if the socket is bound to the unspecified
    ///  address.
    pub bind_addr: SocketAddr,

    /// used for all messages that are sent without explicit transmission parameters
    pub default_tx_parameters: TxParameters,

    /// Number of responses kept for answering retransmitted requests. If the cache is full, the
    ///  entry that would expire first is evicted.
    pub max_cached_responses: usize,

    /// Upper limit for transactions awaiting an ACK or response. Sending beyond this limit fails
    ///  with `NoBufs`.
    pub max_pending_requests: usize,

    /// Largest block size for block-wise transfers; must be a valid block size (a power of two
    ///  between 16 and 1024)
    pub max_block_length: usize,

    /// Received requests with a longer Uri-Path (joined with '/') are rejected as malformed
    pub max_received_uri_path: usize,

    /// Messages can not grow beyond this length. The default is the IPv6 minimum MTU minus IPv6
    ///  and UDP headers, so messages are never fragmented.
    pub max_message_length: usize,

    /// If this is `false`, requests are dispatched without looking at block options, and sending
    ///  with block-wise hooks is rejected.
    pub blockwise_enabled: bool,
}

impl Default for CoapConfig {
    fn default() -> Self {
        CoapConfig {
            bind_addr: SocketAddr::V6(SocketAddrV6::new(Ipv6Addr::UNSPECIFIED, Self::DEFAULT_PORT, 0, 0)),
            default_tx_parameters: TxParameters::default(),
            max_cached_responses: 10,
            max_pending_requests: 64,
            max_block_length: 1024,
            max_received_uri_path: 32,
            max_message_length: Message::DEFAULT_MAX_LENGTH,
            blockwise_enabled: true,
        }
    }
}

impl CoapConfig {
    pub const DEFAULT_PORT: u16 = 5683;

    pub fn validate(&self) -> anyhow::Result<()> {
        if !self.default_tx_parameters.is_valid() {
            bail!("invalid default transmission parameters: {:?}", self.default_tx_parameters);
        }
        if self.max_cached_responses == 0 {
            bail!("max_cached_responses must be at least 1");
        }
        if self.max_pending_requests == 0 {
            bail!("max_pending_requests must be at least 1");
        }
        if BlockSize::from_len(self.max_block_length).is_none() {
            bail!("max_block_length must be a power of two between 16 and 1024, was {}", self.max_block_length);
        }
        if self.max_message_length < Message::HEADER_LEN + self.max_block_length {
            bail!("max_message_length {} is too small for blocks of {} bytes", self.max_message_length, self.max_block_length);
        }
        Ok(())
    }
}
