use tracing::info;
use crate::engine::{CoapEngine, SendParams};
use crate::error::{CoapError, CoapResult};
use crate::message::block::{BlockOption, BlockSize, BlockType};
use crate::message::option::OptionNumber;
use crate::message::{Code, Message, MessageType};
use crate::peer_info::PeerInfo;
use crate::resource::{BlockWiseResource, BlockwiseTransmitHook};
use crate::transaction::TransactionId;
use crate::util::safe_converter::PrecheckedCast;

impl CoapEngine {
    /// Fills the payload of the first block of an outgoing transfer from the transmit hook
    pub(super) fn append_first_block(&self, message: &mut Message, block: BlockOption, hook: &dyn BlockwiseTransmitHook) -> CoapResult<()> {
        let block_len = block.size.len();
        if block_len > self.config.max_block_length {
            return Err(CoapError::NoBufs);
        }

        let mut buf = vec![0u8; block_len];
        let chunk = hook.transmit_block(&mut buf, block.offset())?;
        if chunk.len > block_len {
            return Err(CoapError::InvalidArgs);
        }
        message.append_payload(&buf[..chunk.len])
    }

    /// The peer acknowledged a Block1 request with 2.31 Continue: send the next block, or
    ///  conclude the transfer if the acknowledged block was the last one.
    ///
    /// The acknowledged transaction is replaced by the one for the next block only once that is
    ///  sent, so the caller can still finalize it if this fails.
    pub(super) fn send_next_block1_request(&mut self, id: TransactionId, response: &Message, peer_info: &PeerInfo) -> CoapResult<()> {
        let transaction = self.pending_requests.get(id)
            .cloned()
            .ok_or(CoapError::NotFound)?;

        let request_block = transaction.request.block_option(BlockType::Block1)?
            .ok_or(CoapError::NotFound)?;
        let response_block = response.block_option(BlockType::Block1)?
            .ok_or(CoapError::NotFound)?;

        if !request_block.more {
            self.finalize_transaction(id, Some(response), Some(peer_info), Ok(()));
            return Ok(());
        }

        let block_len = response_block.size.len();
        if block_len > self.config.max_block_length {
            return Err(CoapError::NoBufs);
        }

        let metadata = transaction.metadata;
        let hook = metadata.transmit_hook.clone()
            .ok_or(CoapError::InvalidState)?;

        let mut buf = vec![0u8; block_len];
        let chunk = hook.transmit_block(&mut buf, block_len * (response_block.num as usize + 1))?;
        if chunk.len > block_len {
            return Err(CoapError::InvalidArgs);
        }

        let mut next = self.prepare_next_block_request(BlockType::Block1, chunk.more, &transaction.request, response_block)?;
        next.append_payload(&buf[..chunk.len])?;

        info!("sending block1 {} ({} bytes), more: {}", response_block.num + 1, block_len, chunk.more);

        let params = SendParams {
            tx_parameters: None,
            response_handler: metadata.response_handler,
            transmit_hook: metadata.transmit_hook,
            receive_hook: metadata.receive_hook,
        };
        self.send(next, peer_info, params)?;
        self.pending_requests.remove(id);
        Ok(())
    }

    /// Hands a received Block2 response to the receive hook and requests the next block, or
    ///  concludes the transfer after the last block.
    ///
    /// `begin_block1` is set when the response also acknowledged the final Block1 block of a
    ///  request; the caller finalizes that transaction itself.
    pub(super) fn send_next_block2_request(&mut self, id: TransactionId, response: &Message, peer_info: &PeerInfo, total_len: u32, begin_block1: bool) -> CoapResult<()> {
        let block = response.block_option(BlockType::Block2)?
            .ok_or(CoapError::NotFound)?;

        let payload = response.payload();
        if payload.len() > block.size.len() || payload.len() > self.config.max_block_length {
            return Err(CoapError::NoBufs);
        }

        let transaction = self.pending_requests.get(id)
            .cloned()
            .ok_or(CoapError::NotFound)?;
        let hook = transaction.metadata.receive_hook.clone()
            .ok_or(CoapError::InvalidState)?;

        hook.receive_block(payload, block.offset(), block.more, total_len)?;
        info!("received block2 {} ({} bytes), more: {}", block.num, block.size.len(), block.more);

        if !block.more {
            self.finalize_transaction(id, Some(response), Some(peer_info), Ok(()));
            return Ok(());
        }

        let next = self.prepare_next_block_request(BlockType::Block2, block.more, &transaction.request, block)?;
        info!("requesting block2 {} ({} bytes)", block.num + 1, block.size.len());

        let params = SendParams {
            response_handler: transaction.metadata.response_handler,
            receive_hook: transaction.metadata.receive_hook,
            ..Default::default()
        };
        self.send(next, peer_info, params)?;

        if !begin_block1 {
            self.pending_requests.remove(id);
        }
        Ok(())
    }

    /// The request for the block after `acknowledged`: a confirmable copy of `previous` with the
    ///  block option advanced. The block option takes the position of the first option with an
    ///  equal or higher number, replacing an existing block option there.
    fn prepare_next_block_request(&self, block_type: BlockType, more: bool, previous: &Message, acknowledged: BlockOption) -> CoapResult<Message> {
        let block_number = block_type.option_number();
        let next_block = BlockOption::new(acknowledged.num.saturating_add(1), more, acknowledged.size);

        let mut result = self.new_message(MessageType::Confirmable, previous.code());
        result.set_token_from(previous)?;

        let mut is_block_set = false;
        for option in previous.options() {
            if option.number >= block_number && !is_block_set {
                result.append_block_option(block_type, next_block)?;
                is_block_set = true;

                if option.number == OptionNumber::BLOCK1 || option.number == OptionNumber::BLOCK2 {
                    continue;
                }
            }
            result.append_option(option.number, option.value)?;
        }

        if !is_block_set {
            result.append_block_option(block_type, next_block)?;
        }
        Ok(result)
    }

    /// Server side of a Block1 transfer. Every block but the last is acknowledged with 2.31
    ///  Continue here, and `Busy` tells the caller that the request is handled. After the last
    ///  block, `Ok` means that the resource's handler should see the request.
    pub(super) fn process_block1_request(&mut self, request: &Message, peer_info: &PeerInfo, resource: &BlockWiseResource, total_len: u32) -> CoapResult<()> {
        let block = request.block_option(BlockType::Block1)?
            .ok_or(CoapError::NotFound)?;

        let payload = request.payload();
        if payload.len() > self.config.max_block_length {
            return Err(CoapError::NoBufs);
        }

        let hook = resource.receive_hook.as_ref()
            .ok_or(CoapError::InvalidState)?;
        hook.receive_block(payload, block.offset(), block.more, total_len)?;

        if !block.more {
            self.free_last_block_response();
            return Ok(());
        }

        let mut response = self.new_message(MessageType::Ack, Code::CONTINUE);
        response.set_message_id(request.message_id());
        response.set_token_from(request)?;
        response.append_block_option(BlockType::Block1, block)?;

        self.cache_last_block_response(&response);

        info!("acknowledging block1 {} ({} bytes)", block.num, block.size.len());
        self.send_message(response, peer_info)?;

        Err(CoapError::Busy)
    }

    /// Server side of a Block2 transfer. The first block is produced by the resource's handler,
    ///  later blocks by its transmit hook.
    pub(super) fn process_block2_request(&mut self, request: &Message, peer_info: &PeerInfo, resource: &BlockWiseResource) -> CoapResult<()> {
        let block = request.block_option(BlockType::Block2)?
            .ok_or(CoapError::NotFound)?;

        info!("received request for block2 {} ({} bytes)", block.num, block.size.len());

        if block.num == 0 {
            resource.handler.handle_request(self, request, peer_info);
            return Ok(());
        }

        let mut response = self.new_message(MessageType::Ack, Code::CONTENT);
        response.set_message_id(request.message_id());
        response.set_token_from(request)?;

        let requested_len = block.size.len();
        if requested_len > self.config.max_block_length {
            return Err(CoapError::NoBufs);
        }

        let hook = resource.transmit_hook.as_ref()
            .ok_or(CoapError::InvalidState)?;
        let mut buf = vec![0u8; requested_len];
        let chunk = hook.transmit_block(&mut buf, block.offset())?;
        if chunk.len > requested_len {
            return Err(CoapError::InvalidArgs);
        }

        // a block that is not the last one determines the block size from here on
        let size = if chunk.more {
            BlockSize::from_len(chunk.len)
                .ok_or(CoapError::InvalidArgs)?
        }
        else {
            block.size
        };
        let next_block = BlockOption::new((block.offset() / size.len()).prechecked_cast(), chunk.more, size);

        let last_response = self.last_block_response.as_ref()
            .ok_or(CoapError::InvalidState)?;
        for option in last_response.options() {
            if option.number == OptionNumber::BLOCK2 {
                response.append_block_option(BlockType::Block2, next_block)?;
            }
            else if option.number == OptionNumber::BLOCK1 {
                response.append_option(option.number, option.value)?;
            }
        }

        response.append_payload(&buf[..chunk.len])?;

        if chunk.more {
            self.cache_last_block_response(&response);
        }
        else {
            self.free_last_block_response();
        }

        info!("sending block2 {:?}", next_block);
        self.send_message(response, peer_info)
    }

    pub(super) fn cache_last_block_response(&mut self, response: &Message) {
        self.last_block_response = Some(response.clone());
    }

    pub(super) fn free_last_block_response(&mut self) {
        self.last_block_response = None;
    }
}
