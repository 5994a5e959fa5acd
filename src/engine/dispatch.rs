use tracing::{debug, info};
use crate::engine::CoapEngine;
use crate::error::{CoapError, CoapResult};
use crate::message::option::OptionNumber;
use crate::message::{Code, Message};
use crate::peer_info::PeerInfo;
use crate::resource::BlockWiseResource;

impl CoapEngine {
    pub(super) fn process_received_request(&mut self, request: &Message, peer_info: &PeerInfo) {
        if let Err(e) = self.dispatch_request(request, peer_info) {
            info!("failed to process request from {:?}: {}", peer_info, e);

            if e == CoapError::NotFound && !peer_info.is_sock_addr_multicast() {
                if let Err(e) = self.send_not_found(request, peer_info) {
                    debug!("failed to send 4.04 to {:?}: {}", peer_info, e);
                }
            }
        }
    }

    /// Hands a request to the first one of: the interceptor (which may reject it), the response
    ///  cache, block-wise resources, the resource handler, registered resources and the default
    ///  handler. `NotFound` means that nobody took it.
    fn dispatch_request(&mut self, request: &Message, peer_info: &PeerInfo) -> CoapResult<()> {
        if let Some(interceptor) = self.interceptor.clone() {
            interceptor.intercept(request, peer_info)?;
        }

        match self.responses_queue.get_matched_response_copy(request, peer_info) {
            Ok(cached) => {
                debug!("answering retransmitted request {} from {:?} from the cache", request.message_id(), peer_info);
                return self.transport.send(&cached, peer_info);
            }
            Err(CoapError::NotFound) => {}
            Err(e) => return Err(e),
        }

        let uri_path = request.uri_path(self.config.max_received_uri_path)?;

        if self.config.blockwise_enabled {
            if let Some(resource) = self.resources.block_wise_resource(&uri_path) {
                return self.dispatch_block_wise(request, peer_info, &resource);
            }
        }

        if let Some(handler) = self.resource_handler.clone() {
            if handler.handle_resource(self, &uri_path, request, peer_info) {
                return Ok(());
            }
        }

        if let Some(handler) = self.resources.resource(&uri_path) {
            handler.handle_request(self, request, peer_info);
            return Ok(());
        }

        if let Some(handler) = self.default_handler.clone() {
            handler.handle_request(self, request, peer_info);
            return Ok(());
        }

        Err(CoapError::NotFound)
    }

    fn dispatch_block_wise(&mut self, request: &Message, peer_info: &PeerInfo, resource: &BlockWiseResource) -> CoapResult<()> {
        let mut block_option_count = 0;
        let mut total_len = 0;
        for option in request.options() {
            match option.number {
                OptionNumber::BLOCK1 => block_option_count += 1,
                OptionNumber::BLOCK2 => block_option_count += 2,
                OptionNumber::SIZE1 => total_len = option.uint_value().ok()
                    .and_then(|v| u32::try_from(v).ok())
                    .unwrap_or(0),
                _ => {}
            }
        }

        if !resource.has_hooks() || block_option_count == 0 {
            resource.handler.handle_request(self, request, peer_info);
            return Ok(());
        }

        match block_option_count {
            1 if resource.receive_hook.is_some() => {
                let error_code = match self.process_block1_request(request, peer_info, resource, total_len) {
                    Ok(()) => {
                        resource.handler.handle_request(self, request, peer_info);
                        return Ok(());
                    }
                    Err(CoapError::Busy) => return Ok(()),
                    Err(CoapError::NoBufs) => Code::REQUEST_TOO_LARGE,
                    Err(CoapError::Incomplete) => Code::REQUEST_INCOMPLETE,
                    Err(e) => {
                        debug!("failed to process block1 request from {:?}: {}", peer_info, e);
                        Code::INTERNAL_ERROR
                    }
                };
                self.reject_block_request(error_code, request, peer_info)
            }
            2 if resource.transmit_hook.is_some() => {
                if let Err(e) = self.process_block2_request(request, peer_info, resource) {
                    debug!("failed to process block2 request from {:?}: {}", peer_info, e);
                    return self.reject_block_request(Code::INTERNAL_ERROR, request, peer_info);
                }
                Ok(())
            }
            _ => Ok(()),
        }
    }

    fn reject_block_request(&mut self, code: Code, request: &Message, peer_info: &PeerInfo) -> CoapResult<()> {
        if let Err(e) = self.send_header_response(code, request, peer_info) {
            debug!("failed to send {:?} to {:?}: {}", code, peer_info, e);
        }
        Err(CoapError::Drop)
    }
}
