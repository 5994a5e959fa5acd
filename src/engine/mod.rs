mod blockwise;
mod dispatch;
mod receive;
mod send;

use std::net::IpAddr;
use std::rc::Rc;
use tracing::{debug, trace, warn};
use crate::config::CoapConfig;
use crate::error::{CoapError, CoapResult};
use crate::message::{Code, Message, MessageType, Priority};
use crate::peer_info::PeerInfo;
use crate::resource::{BlockWiseResource, BlockwiseReceiveHook, BlockwiseTransmitHook, Interceptor, RequestHandler, ResourceHandler, ResourceRegistry, ResponseHandler};
use crate::responses_queue::ResponsesQueue;
use crate::time::{Clock, TimeMilli};
use crate::transaction::{TransactionId, TransactionTable};
use crate::transport::Transport;
use crate::tx_parameters::TxParameters;
use crate::util::random::Random;

/// Optional per-send settings: transmission parameters (the configured defaults otherwise), the
///  handler for the response and block-wise hooks.
#[derive(Clone, Default)]
pub struct SendParams {
    pub tx_parameters: Option<TxParameters>,
    pub response_handler: Option<Rc<dyn ResponseHandler>>,
    pub transmit_hook: Option<Rc<dyn BlockwiseTransmitHook>>,
    pub receive_hook: Option<Rc<dyn BlockwiseReceiveHook>>,
}
impl SendParams {
    pub fn with_handler(handler: Rc<dyn ResponseHandler>) -> SendParams {
        SendParams {
            response_handler: Some(handler),
            ..Default::default()
        }
    }

    pub fn tx_parameters(mut self, tx_parameters: TxParameters) -> SendParams {
        self.tx_parameters = Some(tx_parameters);
        self
    }

    pub fn transmit_hook(mut self, hook: Rc<dyn BlockwiseTransmitHook>) -> SendParams {
        self.transmit_hook = Some(hook);
        self
    }

    pub fn receive_hook(mut self, hook: Rc<dyn BlockwiseReceiveHook>) -> SendParams {
        self.receive_hook = Some(hook);
        self
    }

    fn has_block_hooks(&self) -> bool {
        self.transmit_hook.is_some() || self.receive_hook.is_some()
    }
}

/// The transaction engine: sends requests and tracks them until they are answered, retransmits
///  confirmable messages, caches responses for deduplication, and dispatches received requests to
///  resources.
///
/// The engine does no I/O of its own. Datagrams are handed to [CoapEngine::receive] and sent
///  through a [Transport]; the driver sleeps until [CoapEngine::next_timer_deadline] and then
///  calls [CoapEngine::handle_timers].
///
/// Handlers are called with `&mut CoapEngine` and may call back into the engine, e.g. to send a
///  follow-up request or to abort a transaction.
pub struct CoapEngine {
    config: CoapConfig,
    transport: Box<dyn Transport>,
    clock: Box<dyn Clock>,
    random: Box<dyn Random>,

    message_id: u16,
    pending_requests: TransactionTable,
    responses_queue: ResponsesQueue,

    resources: ResourceRegistry,
    resource_handler: Option<Rc<dyn ResourceHandler>>,
    interceptor: Option<Rc<dyn Interceptor>>,
    default_handler: Option<Rc<dyn RequestHandler>>,

    /// single slot for the block-wise transfer currently served by this engine
    last_block_response: Option<Message>,
}

impl CoapEngine {
    pub fn new(config: CoapConfig, transport: Box<dyn Transport>, clock: Box<dyn Clock>, mut random: Box<dyn Random>) -> CoapEngine {
        let message_id = random.next_u16();
        debug!("initial message id is {}", message_id);

        CoapEngine {
            pending_requests: TransactionTable::new(config.max_pending_requests),
            responses_queue: ResponsesQueue::new(config.max_cached_responses),
            config,
            transport,
            clock,
            random,
            message_id,
            resources: ResourceRegistry::default(),
            resource_handler: None,
            interceptor: None,
            default_handler: None,
            last_block_response: None,
        }
    }

    pub fn config(&self) -> &CoapConfig {
        &self.config
    }

    pub fn now(&self) -> TimeMilli {
        self.clock.now()
    }

    pub fn random(&mut self) -> &mut dyn Random {
        self.random.as_mut()
    }

    fn next_message_id(&mut self) -> u16 {
        let result = self.message_id;
        self.message_id = self.message_id.wrapping_add(1);
        result
    }

    pub fn new_message(&self, msg_type: MessageType, code: Code) -> Message {
        Message::new(msg_type, code)
            .with_max_length(self.config.max_message_length)
    }

    pub fn new_priority_message(&self, msg_type: MessageType, code: Code) -> Message {
        self.new_message(msg_type, code)
            .with_priority(Priority::Net)
    }

    pub fn new_confirmable_post_message(&self, uri_path: &str) -> CoapResult<Message> {
        self.init_message(self.new_message(MessageType::Confirmable, Code::POST), uri_path)
    }

    pub fn new_non_confirmable_post_message(&self, uri_path: &str) -> CoapResult<Message> {
        self.init_message(self.new_message(MessageType::NonConfirmable, Code::POST), uri_path)
    }

    pub fn new_priority_confirmable_post_message(&self, uri_path: &str) -> CoapResult<Message> {
        self.init_message(self.new_priority_message(MessageType::Confirmable, Code::POST), uri_path)
    }

    pub fn new_priority_non_confirmable_post_message(&self, uri_path: &str) -> CoapResult<Message> {
        self.init_message(self.new_priority_message(MessageType::NonConfirmable, Code::POST), uri_path)
    }

    fn init_message(&self, mut message: Message, uri_path: &str) -> CoapResult<Message> {
        message.append_uri_path_options(uri_path)?;
        Ok(message)
    }

    /// piggybacked 2.04 Changed response for `request`
    pub fn new_response_message(&self, request: &Message) -> Message {
        let mut result = self.new_message(MessageType::Ack, Code::CHANGED);
        result.set_default_response_header(request);
        result
    }

    pub fn new_priority_response_message(&self, request: &Message) -> Message {
        self.new_response_message(request)
            .with_priority(Priority::Net)
    }

    pub fn pending_request_count(&self) -> usize {
        self.pending_requests.len()
    }

    pub fn cached_response_count(&self) -> usize {
        self.responses_queue.len()
    }

    pub fn add_resource(&mut self, uri_path: &str, handler: Rc<dyn RequestHandler>) -> CoapResult<()> {
        self.resources.add_resource(uri_path, handler)
    }

    pub fn remove_resource(&mut self, uri_path: &str) -> CoapResult<()> {
        self.resources.remove_resource(uri_path)
    }

    pub fn add_block_wise_resource(&mut self, resource: BlockWiseResource) -> CoapResult<()> {
        if !self.config.blockwise_enabled {
            return Err(CoapError::InvalidArgs);
        }
        self.resources.add_block_wise_resource(resource)
    }

    pub fn remove_block_wise_resource(&mut self, uri_path: &str) -> CoapResult<()> {
        self.resources.remove_block_wise_resource(uri_path)
    }

    pub fn set_resource_handler(&mut self, handler: Option<Rc<dyn ResourceHandler>>) {
        self.resource_handler = handler;
    }

    pub fn set_interceptor(&mut self, interceptor: Option<Rc<dyn Interceptor>>) {
        self.interceptor = interceptor;
    }

    pub fn set_default_handler(&mut self, handler: Option<Rc<dyn RequestHandler>>) {
        self.default_handler = handler;
    }

    /// the earliest point in time at which [CoapEngine::handle_timers] has work to do
    pub fn next_timer_deadline(&self) -> Option<TimeMilli> {
        [self.pending_requests.timer().fire_time(), self.responses_queue.timer().fire_time()]
            .into_iter()
            .flatten()
            .min()
    }

    pub fn handle_timers(&mut self) {
        let now = self.clock.now();
        if self.pending_requests.timer().is_due(now) {
            self.handle_retransmission_timer(now);
        }
        if self.responses_queue.timer().is_due(now) {
            self.responses_queue.handle_timer(now);
        }
    }

    fn handle_retransmission_timer(&mut self, now: TimeMilli) {
        for id in self.pending_requests.ids() {
            let Some(transaction) = self.pending_requests.get_mut(id) else {
                continue;
            };
            if now < transaction.metadata.next_timer_shot {
                continue;
            }
            if transaction.is_acknowledged_subscription() {
                continue;
            }

            if !transaction.metadata.confirmable || transaction.metadata.retransmissions_remaining == 0 {
                debug!("transaction {:?} to {:?} timed out", id, transaction.metadata.peer_info);
                self.finalize_transaction(id, None, None, Err(CoapError::ResponseTimeout));
                continue;
            }

            let metadata = &mut transaction.metadata;
            metadata.retransmissions_remaining -= 1;
            metadata.retransmission_timeout = metadata.retransmission_timeout.saturating_mul(2);
            metadata.next_timer_shot = now + metadata.retransmission_timeout;

            if !metadata.acknowledged {
                trace!("retransmitting {:?} to {:?}, {} retransmissions remaining", transaction.request, metadata.peer_info, metadata.retransmissions_remaining);
                if let Err(e) = self.transport.send(&transaction.request, &transaction.metadata.peer_info) {
                    warn!("failed to send copy: {}", e);
                }
            }
        }

        self.pending_requests.schedule_timer();
    }

    /// Removes the transaction and then invokes its handler. A transaction that is already gone
    ///  is not finalized a second time.
    fn finalize_transaction(&mut self, id: TransactionId, response: Option<&Message>, peer_info: Option<&PeerInfo>, result: CoapResult<()>) {
        let Some(transaction) = self.pending_requests.remove(id) else {
            return;
        };
        trace!("finalizing transaction {:?}: {:?}", id, result);

        if let Some(handler) = transaction.metadata.response_handler {
            handler.handle_response(self, response, peer_info, result);
        }
    }

    /// Aborts all transactions with this response handler. The handler is invoked with `Abort`
    ///  once per transaction.
    pub fn abort_transaction(&mut self, handler: &Rc<dyn ResponseHandler>) -> CoapResult<()> {
        let ids = self.pending_requests.ids_by_handler(handler);
        if ids.is_empty() {
            return Err(CoapError::NotFound);
        }
        for id in ids {
            self.finalize_transaction(id, None, None, Err(CoapError::Abort));
        }
        Ok(())
    }

    /// Aborts all pending requests sent from `sock_addr`, or all pending requests for `None`
    pub fn clear_requests(&mut self, sock_addr: Option<IpAddr>) {
        for id in self.pending_requests.ids_by_source(sock_addr) {
            self.finalize_transaction(id, None, None, Err(CoapError::Abort));
        }
    }

    pub fn clear_all_requests_and_responses(&mut self) {
        self.clear_requests(None);
        self.responses_queue.dequeue_all();
        self.pending_requests.schedule_timer();
    }
}
