use tracing::{debug, trace};
use crate::engine::CoapEngine;
use crate::error::CoapError;
use crate::message::option::OptionNumber;
use crate::message::{Code, Message, MessageType};
use crate::peer_info::PeerInfo;
use crate::transaction::{Metadata, TransactionId};

impl CoapEngine {
    /// Entry point for every received datagram. `peer_info` carries the sender's address and
    ///  the local address the datagram was received on.
    pub fn receive(&mut self, datagram: &[u8], peer_info: &PeerInfo) {
        let message = match Message::deser(datagram) {
            Ok(message) => message.with_max_length(self.config.max_message_length),
            Err(e) => {
                debug!("failed to parse message from {:?}: {}", peer_info, e);
                self.reject_unparseable(datagram, peer_info);
                return;
            }
        };

        trace!("received {:?} from {:?}", message, peer_info);
        if message.is_request() {
            self.process_received_request(&message, peer_info);
        }
        else {
            self.process_received_response(&message, peer_info);
        }
    }

    /// A confirmable message that could not be parsed is rejected with a Reset, unless it was
    ///  sent to a multicast address
    fn reject_unparseable(&mut self, datagram: &[u8], peer_info: &PeerInfo) {
        if peer_info.is_sock_addr_multicast() {
            return;
        }
        let Some(header) = Message::peek_header(datagram) else {
            return;
        };
        if header.msg_type != MessageType::Confirmable {
            return;
        }

        if let Err(e) = self.send_empty_message_with_id(MessageType::Reset, header.message_id, peer_info) {
            debug!("failed to send reset to {:?}: {}", peer_info, e);
        }
    }

    fn process_received_response(&mut self, response: &Message, peer_info: &PeerInfo) {
        let Some(id) = self.pending_requests.find_related_request(response, peer_info) else {
            if response.is_confirmable() || response.is_non_confirmable() {
                trace!("no request matches {:?} from {:?}, rejecting", response, peer_info);
                if let Err(e) = self.send_reset(response, peer_info) {
                    trace!("no reset sent to {:?}: {}", peer_info, e);
                }
            }
            return;
        };
        let Some(transaction) = self.pending_requests.get(id) else {
            return;
        };

        // handlers may remove the transaction, so work on a snapshot of its state
        let metadata = transaction.metadata.clone();
        let is_request = transaction.request.is_request();
        let is_token_equal = response.is_token_equal(&transaction.request);
        let response_observe = metadata.observe && is_request && response.has_option(OptionNumber::OBSERVE);

        match response.msg_type() {
            MessageType::Reset => {
                // non-empty resets are ignored
                if response.is_empty() {
                    debug!("transaction {:?} was reset by {:?}", id, peer_info);
                    self.finalize_transaction(id, None, None, Err(CoapError::Abort));
                }
            }
            MessageType::Ack => {
                if response.is_empty() {
                    self.process_empty_ack(id, &metadata, is_request, response, peer_info);
                }
                else if response.is_response() && is_token_equal {
                    self.process_piggybacked_response(id, &metadata, response, peer_info, response_observe);
                }
                // ACKs carrying a request or a different token are ignored
            }
            MessageType::Confirmable | MessageType::NonConfirmable => {
                if response.is_confirmable() {
                    if let Err(e) = self.send_ack(response, peer_info) {
                        debug!("failed to acknowledge {:?} to {:?}: {}", response, peer_info, e);
                    }
                }

                // responses to multicast requests and observe notifications keep the request open
                match &metadata.response_handler {
                    Some(handler) if metadata.peer_info.is_peer_multicast() || response_observe => {
                        handler.handle_response(self, Some(response), Some(peer_info), Ok(()));
                    }
                    _ => self.finalize_transaction(id, Some(response), Some(peer_info), Ok(())),
                }
            }
        }
    }

    fn process_empty_ack(&mut self, id: TransactionId, metadata: &Metadata, is_request: bool, response: &Message, peer_info: &PeerInfo) {
        if metadata.observe && !is_request {
            // the ACK to a notification we sent: there is no separate response to wait for
            self.finalize_transaction(id, Some(response), Some(peer_info), Ok(()));
            return;
        }

        if metadata.confirmable {
            self.set_acknowledged(id);
        }
        if metadata.response_handler.is_none() {
            trace!("transaction {:?} is acknowledged and expects no response", id);
            self.pending_requests.remove(id);
        }
    }

    fn process_piggybacked_response(&mut self, id: TransactionId, metadata: &Metadata, response: &Message, peer_info: &PeerInfo, response_observe: bool) {
        if response_observe {
            if let Some(handler) = &metadata.response_handler {
                // a notification: the subscription stays open
                handler.handle_response(self, Some(response), Some(peer_info), Ok(()));
                self.set_acknowledged(id);
                return;
            }
        }

        let mut block_option_count = 0;
        let mut total_len = 0;
        if metadata.has_block_hooks() {
            for option in response.options() {
                match option.number {
                    OptionNumber::BLOCK1 => block_option_count += 1,
                    OptionNumber::BLOCK2 => block_option_count += 2,
                    OptionNumber::SIZE2 => total_len = option.uint_value().ok()
                        .and_then(|v| u32::try_from(v).ok())
                        .unwrap_or(0),
                    _ => {}
                }
            }
        }

        let code = response.code();
        match block_option_count {
            0 => self.finalize_transaction(id, Some(response), Some(peer_info), Ok(())),
            1 => {
                if code == Code::CONTINUE && metadata.transmit_hook.is_some() {
                    if let Err(e) = self.send_next_block1_request(id, response, peer_info) {
                        self.finalize_transaction(id, Some(response), Some(peer_info), Err(e));
                    }
                }
                else {
                    self.finalize_transaction(id, Some(response), Some(peer_info), Ok(()));
                }
            }
            2 => {
                if !code.is_error() && metadata.receive_hook.is_some() {
                    if let Err(e) = self.send_next_block2_request(id, response, peer_info, total_len, false) {
                        self.finalize_transaction(id, Some(response), Some(peer_info), Err(e));
                    }
                }
                else {
                    self.finalize_transaction(id, Some(response), Some(peer_info), Ok(()));
                }
            }
            3 => {
                // the last Block1 block was answered with the first Block2 block
                let result = if !code.is_error() && metadata.receive_hook.is_some() {
                    self.send_next_block2_request(id, response, peer_info, total_len, true)
                }
                else {
                    Ok(())
                };
                self.finalize_transaction(id, Some(response), Some(peer_info), result);
            }
            _ => self.finalize_transaction(id, Some(response), Some(peer_info), Err(CoapError::Abort)),
        }
    }

    fn set_acknowledged(&mut self, id: TransactionId) {
        if let Some(transaction) = self.pending_requests.get_mut(id) {
            transaction.metadata.acknowledged = true;
        }
        self.pending_requests.schedule_timer();
    }
}
