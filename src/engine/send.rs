use tracing::{debug, trace};
use crate::engine::{CoapEngine, SendParams};
use crate::error::{CoapError, CoapResult};
use crate::message::block::BlockType;
use crate::message::option::OptionNumber;
use crate::message::{Code, Message, MessageType};
use crate::peer_info::PeerInfo;
use crate::transaction::{Metadata, Transaction};

impl CoapEngine {
    /// Sends a message with the default transmission parameters, without waiting for a response
    pub fn send_message(&mut self, message: Message, peer_info: &PeerInfo) -> CoapResult<()> {
        self.send(message, peer_info, SendParams::default())
    }

    /// Sends a message, tracking it as a transaction if it is confirmable or has a response
    ///  handler. Fresh message ids are assigned to everything but ACK and Reset.
    ///
    /// Invalid transmission parameters are rejected with `InvalidArgs`. If sending fails, no
    ///  transaction is left behind and the handler is not called.
    pub fn send(&mut self, mut message: Message, peer_info: &PeerInfo, params: SendParams) -> CoapResult<()> {
        if params.has_block_hooks() && !self.config.blockwise_enabled {
            return Err(CoapError::InvalidArgs);
        }
        let tx_parameters = params.tx_parameters
            .unwrap_or(self.config.default_tx_parameters);
        if !tx_parameters.is_valid() {
            return Err(CoapError::InvalidArgs);
        }

        match message.msg_type() {
            MessageType::Ack => {
                if let Some(hook) = &params.transmit_hook {
                    if let Some(block) = message.block_option(BlockType::Block2)? {
                        if block.num == 0 {
                            self.append_first_block(&mut message, block, hook.as_ref())?;
                            self.cache_last_block_response(&message);
                        }
                    }
                }
                let now = self.clock.now();
                self.responses_queue.enqueue_response(&message, peer_info, &tx_parameters, now);
            }
            MessageType::Reset => {
                if !message.is_empty() {
                    return Err(CoapError::InvalidArgs);
                }
            }
            MessageType::Confirmable | MessageType::NonConfirmable => {
                if let Some(hook) = &params.transmit_hook {
                    if let Some(block) = message.block_option(BlockType::Block1)? {
                        if block.num == 0 {
                            self.append_first_block(&mut message, block, hook.as_ref())?;
                            // block-wise transfers are always confirmable
                            message.set_type(MessageType::Confirmable);
                        }
                    }
                }
                let message_id = self.next_message_id();
                message.set_message_id(message_id);
            }
        }

        let stored_copy = if message.is_confirmable() {
            Some(message.clone())
        }
        else if message.is_non_confirmable() && params.response_handler.is_some() {
            // non-confirmable messages are not retransmitted, the token is all we need
            Some(message.header_copy())
        }
        else {
            None
        };

        let mut transaction_id = None;
        if let Some(request) = stored_copy {
            let mut observe = message.has_option(OptionNumber::OBSERVE);

            // GET with Observe=1 cancels a subscription
            if observe && message.is_get_request() && message.observe()? == Some(1) {
                observe = false;
                if let Some(id) = self.pending_requests.find_related_request(&message, peer_info) {
                    debug!("cancelling subscription {:?} at {:?}", id, peer_info);
                    self.finalize_transaction(id, None, None, Ok(()));
                }
            }

            let retransmission_timeout = tx_parameters.initial_retransmission_timeout(self.random.as_mut());
            let confirmable = message.is_confirmable();
            let now = self.clock.now();
            let metadata = Metadata {
                peer_info: *peer_info,
                retransmissions_remaining: tx_parameters.max_retransmit,
                retransmission_timeout,
                next_timer_shot: now + if confirmable { retransmission_timeout } else { tx_parameters.max_transmit_wait() },
                acknowledged: false,
                confirmable,
                observe,
                response_handler: params.response_handler,
                transmit_hook: params.transmit_hook,
                receive_hook: params.receive_hook,
            };
            transaction_id = Some(self.pending_requests.insert(Transaction { request, metadata })?);
        }

        trace!("sending {:?} to {:?}", message, peer_info);
        if let Err(e) = self.transport.send(&message, peer_info) {
            debug!("failed to send {:?} to {:?}: {}", message, peer_info, e);
            if let Some(id) = transaction_id {
                self.pending_requests.remove(id);
            }
            return Err(e);
        }
        Ok(())
    }

    pub fn send_reset(&mut self, request: &Message, peer_info: &PeerInfo) -> CoapResult<()> {
        self.send_empty_message(MessageType::Reset, request, peer_info)
    }

    pub fn send_ack(&mut self, request: &Message, peer_info: &PeerInfo) -> CoapResult<()> {
        self.send_empty_message(MessageType::Ack, request, peer_info)
    }

    /// Acknowledges a confirmable request with a header-only response, 2.04 Changed
    pub fn send_empty_ack(&mut self, request: &Message, peer_info: &PeerInfo) -> CoapResult<()> {
        self.send_empty_ack_with_code(request, peer_info, Code::CHANGED)
    }

    pub fn send_empty_ack_with_code(&mut self, request: &Message, peer_info: &PeerInfo, code: Code) -> CoapResult<()> {
        if !request.is_confirmable() {
            return Err(CoapError::InvalidArgs);
        }
        self.send_header_response(code, request, peer_info)
    }

    pub fn send_not_found(&mut self, request: &Message, peer_info: &PeerInfo) -> CoapResult<()> {
        self.send_header_response(Code::NOT_FOUND, request, peer_info)
    }

    /// An empty ACK or Reset for a confirmable message
    pub fn send_empty_message(&mut self, msg_type: MessageType, request: &Message, peer_info: &PeerInfo) -> CoapResult<()> {
        if !request.is_confirmable() {
            return Err(CoapError::InvalidArgs);
        }
        self.send_empty_message_with_id(msg_type, request.message_id(), peer_info)
    }

    pub(crate) fn send_empty_message_with_id(&mut self, msg_type: MessageType, message_id: u16, peer_info: &PeerInfo) -> CoapResult<()> {
        let mut message = self.new_message(msg_type, Code::EMPTY);
        message.set_message_id(message_id);

        trace!("sending empty {:?} for {} to {:?}", msg_type, message_id, peer_info);
        self.transport.send(&message, peer_info)
    }

    /// Responds with a code and no payload: piggybacked on an ACK for confirmable requests, as a
    ///  non-confirmable message otherwise
    pub fn send_header_response(&mut self, code: Code, request: &Message, peer_info: &PeerInfo) -> CoapResult<()> {
        if !request.is_request() {
            return Err(CoapError::InvalidArgs);
        }

        let mut message = match request.msg_type() {
            MessageType::Confirmable => {
                let mut message = self.new_message(MessageType::Ack, code);
                message.set_message_id(request.message_id());
                message
            }
            MessageType::NonConfirmable => self.new_message(MessageType::NonConfirmable, code),
            _ => return Err(CoapError::InvalidArgs),
        };
        message.set_token_from(request)?;

        self.send_message(message, peer_info)
    }
}
