use std::rc::Rc;
use rustc_hash::FxHashMap;
use crate::engine::CoapEngine;
use crate::error::{CoapError, CoapResult};
use crate::message::Message;
use crate::peer_info::PeerInfo;

/// Receives the outcome of a request: exactly once when the transaction finalizes, and possibly
///  several times before that for observe notifications and multicast responses.
///
/// `response` and `peer_info` are `None` when the transaction ends without a response (timeout,
///  abort, reset by the peer).
pub trait ResponseHandler {
    fn handle_response(&self, engine: &mut CoapEngine, response: Option<&Message>, peer_info: Option<&PeerInfo>, result: CoapResult<()>);
}
impl<F> ResponseHandler for F
where F: Fn(&mut CoapEngine, Option<&Message>, Option<&PeerInfo>, CoapResult<()>)
{
    fn handle_response(&self, engine: &mut CoapEngine, response: Option<&Message>, peer_info: Option<&PeerInfo>, result: CoapResult<()>) {
        self(engine, response, peer_info, result)
    }
}

pub trait RequestHandler {
    fn handle_request(&self, engine: &mut CoapEngine, request: &Message, peer_info: &PeerInfo);
}
impl<F> RequestHandler for F
where F: Fn(&mut CoapEngine, &Message, &PeerInfo)
{
    fn handle_request(&self, engine: &mut CoapEngine, request: &Message, peer_info: &PeerInfo) {
        self(engine, request, peer_info)
    }
}

/// Catch-all handler that sees every request before the resource registry. Returns `true` if it
///  handled the request.
pub trait ResourceHandler {
    fn handle_resource(&self, engine: &mut CoapEngine, uri_path: &str, request: &Message, peer_info: &PeerInfo) -> bool;
}
impl<F> ResourceHandler for F
where F: Fn(&mut CoapEngine, &str, &Message, &PeerInfo) -> bool
{
    fn handle_resource(&self, engine: &mut CoapEngine, uri_path: &str, request: &Message, peer_info: &PeerInfo) -> bool {
        self(engine, uri_path, request, peer_info)
    }
}

/// Gets first refusal on every inbound request. Returning an error drops the request.
pub trait Interceptor {
    fn intercept(&self, request: &Message, peer_info: &PeerInfo) -> CoapResult<()>;
}
impl<F> Interceptor for F
where F: Fn(&Message, &PeerInfo) -> CoapResult<()>
{
    fn intercept(&self, request: &Message, peer_info: &PeerInfo) -> CoapResult<()> {
        self(request, peer_info)
    }
}

/// Result of a [BlockwiseTransmitHook] call: the number of bytes written to the buffer, and
///  whether more blocks follow
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct BlockChunk {
    pub len: usize,
    pub more: bool,
}

/// Supplies the payload of outgoing blocks. `buf` has the length of the negotiated block size,
///  `position` is the byte offset of the block in the complete body.
pub trait BlockwiseTransmitHook {
    fn transmit_block(&self, buf: &mut [u8], position: usize) -> CoapResult<BlockChunk>;
}
impl<F> BlockwiseTransmitHook for F
where F: Fn(&mut [u8], usize) -> CoapResult<BlockChunk>
{
    fn transmit_block(&self, buf: &mut [u8], position: usize) -> CoapResult<BlockChunk> {
        self(buf, position)
    }
}

/// Consumes the payload of incoming blocks. `total_len` is the size hint from the Size1 / Size2
///  option, or 0 if the peer did not send one.
///
/// An `Incomplete` error is answered with 4.08 Request Entity Incomplete, `NoBufs` with 4.13
///  Request Entity Too Large.
pub trait BlockwiseReceiveHook {
    fn receive_block(&self, block: &[u8], position: usize, more: bool, total_len: u32) -> CoapResult<()>;
}
impl<F> BlockwiseReceiveHook for F
where F: Fn(&[u8], usize, bool, u32) -> CoapResult<()>
{
    fn receive_block(&self, block: &[u8], position: usize, more: bool, total_len: u32) -> CoapResult<()> {
        self(block, position, more, total_len)
    }
}

#[derive(Clone)]
pub struct BlockWiseResource {
    pub uri_path: String,
    pub handler: Rc<dyn RequestHandler>,
    pub receive_hook: Option<Rc<dyn BlockwiseReceiveHook>>,
    pub transmit_hook: Option<Rc<dyn BlockwiseTransmitHook>>,
}
impl BlockWiseResource {
    pub fn new(uri_path: &str, handler: Rc<dyn RequestHandler>) -> BlockWiseResource {
        BlockWiseResource {
            uri_path: uri_path.to_string(),
            handler,
            receive_hook: None,
            transmit_hook: None,
        }
    }

    pub fn with_receive_hook(mut self, hook: Rc<dyn BlockwiseReceiveHook>) -> BlockWiseResource {
        self.receive_hook = Some(hook);
        self
    }

    pub fn with_transmit_hook(mut self, hook: Rc<dyn BlockwiseTransmitHook>) -> BlockWiseResource {
        self.transmit_hook = Some(hook);
        self
    }

    pub fn has_hooks(&self) -> bool {
        self.receive_hook.is_some() || self.transmit_hook.is_some()
    }
}

/// Resources by exact URI path. The registry holds shared references to the handlers only, so
///  the registering code keeps ownership of whatever state its handlers close over.
#[derive(Default)]
pub struct ResourceRegistry {
    resources: FxHashMap<String, Rc<dyn RequestHandler>>,
    block_wise_resources: FxHashMap<String, BlockWiseResource>,
}
impl ResourceRegistry {
    pub fn add_resource(&mut self, uri_path: &str, handler: Rc<dyn RequestHandler>) -> CoapResult<()> {
        if self.resources.contains_key(uri_path) {
            return Err(CoapError::Already);
        }
        self.resources.insert(uri_path.to_string(), handler);
        Ok(())
    }

    pub fn remove_resource(&mut self, uri_path: &str) -> CoapResult<()> {
        self.resources.remove(uri_path)
            .map(|_| ())
            .ok_or(CoapError::NotFound)
    }

    pub fn resource(&self, uri_path: &str) -> Option<Rc<dyn RequestHandler>> {
        self.resources.get(uri_path).cloned()
    }

    pub fn add_block_wise_resource(&mut self, resource: BlockWiseResource) -> CoapResult<()> {
        if self.block_wise_resources.contains_key(&resource.uri_path) {
            return Err(CoapError::Already);
        }
        self.block_wise_resources.insert(resource.uri_path.clone(), resource);
        Ok(())
    }

    pub fn remove_block_wise_resource(&mut self, uri_path: &str) -> CoapResult<()> {
        self.block_wise_resources.remove(uri_path)
            .map(|_| ())
            .ok_or(CoapError::NotFound)
    }

    pub fn block_wise_resource(&self, uri_path: &str) -> Option<BlockWiseResource> {
        self.block_wise_resources.get(uri_path).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn handler() -> Rc<dyn RequestHandler> {
        Rc::new(|_: &mut CoapEngine, _: &Message, _: &PeerInfo| {})
    }

    #[test]
    fn test_add_remove_resource() {
        let mut registry = ResourceRegistry::default();
        registry.add_resource("a/b", handler()).unwrap();
        assert_eq!(registry.add_resource("a/b", handler()).err(), Some(CoapError::Already));
        assert!(registry.resource("a/b").is_some());
        assert!(registry.resource("a").is_none());

        registry.remove_resource("a/b").unwrap();
        assert!(registry.resource("a/b").is_none());
        assert_eq!(registry.remove_resource("a/b").err(), Some(CoapError::NotFound));
    }

    #[test]
    fn test_add_remove_block_wise_resource() {
        let mut registry = ResourceRegistry::default();
        let hook: Rc<dyn BlockwiseReceiveHook> = Rc::new(|_: &[u8], _: usize, _: bool, _: u32| Ok(()));
        registry.add_block_wise_resource(BlockWiseResource::new("fw", handler()).with_receive_hook(hook)).unwrap();
        assert_eq!(registry.add_block_wise_resource(BlockWiseResource::new("fw", handler())).err(), Some(CoapError::Already));

        let resource = registry.block_wise_resource("fw").unwrap();
        assert!(resource.has_hooks());
        assert!(resource.transmit_hook.is_none());

        registry.remove_block_wise_resource("fw").unwrap();
        assert!(registry.block_wise_resource("fw").is_none());
    }
}
