use std::collections::BTreeMap;
use std::fmt::{Debug, Formatter};
use std::net::IpAddr;
use std::rc::Rc;
use tracing::trace;
use crate::error::{CoapError, CoapResult};
use crate::message::{Message, MessageType};
use crate::peer_info::PeerInfo;
use crate::resource::{BlockwiseReceiveHook, BlockwiseTransmitHook, ResponseHandler};
use crate::time::{TimeMilli, TimerMilli};

/// Stable identity of a pending transaction. Ids are never reused, so an id that was looked up
///  before a callback can safely be looked up again afterwards to see if the transaction is
///  still alive.
#[derive(Clone, Copy, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct TransactionId(u64);
impl Debug for TransactionId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Per-transaction state stored alongside the request copy
#[derive(Clone)]
pub struct Metadata {
    /// destination of the request, and the local address it was sent from
    pub peer_info: PeerInfo,
    pub retransmissions_remaining: u8,
    pub retransmission_timeout: u32,
    pub next_timer_shot: TimeMilli,
    pub acknowledged: bool,
    pub confirmable: bool,
    pub observe: bool,
    pub response_handler: Option<Rc<dyn ResponseHandler>>,
    pub transmit_hook: Option<Rc<dyn BlockwiseTransmitHook>>,
    pub receive_hook: Option<Rc<dyn BlockwiseReceiveHook>>,
}
impl Debug for Metadata {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Metadata")
            .field("peer_info", &self.peer_info)
            .field("retransmissions_remaining", &self.retransmissions_remaining)
            .field("retransmission_timeout", &self.retransmission_timeout)
            .field("next_timer_shot", &self.next_timer_shot)
            .field("acknowledged", &self.acknowledged)
            .field("confirmable", &self.confirmable)
            .field("observe", &self.observe)
            .field("has_handler", &self.response_handler.is_some())
            .finish()
    }
}

impl Metadata {
    pub fn has_block_hooks(&self) -> bool {
        self.transmit_hook.is_some() || self.receive_hook.is_some()
    }

    pub fn has_handler(&self, handler: &Rc<dyn ResponseHandler>) -> bool {
        match &self.response_handler {
            Some(h) => std::ptr::addr_eq(Rc::as_ptr(h), Rc::as_ptr(handler)),
            None => false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Transaction {
    /// the request as sent; only header and token for non-confirmable requests
    pub request: Message,
    pub metadata: Metadata,
}
impl Transaction {
    /// An acknowledged subscription stays open until it is cancelled, so it is exempt from
    ///  retransmission and timeout.
    pub fn is_acknowledged_subscription(&self) -> bool {
        self.request.is_request() && self.metadata.observe && self.metadata.acknowledged
    }
}

/// Pending requests awaiting an acknowledgement or a response, driven by a single retransmission
///  timer that is always armed for the earliest deadline of all non-exempt transactions.
pub struct TransactionTable {
    entries: BTreeMap<TransactionId, Transaction>,
    next_id: u64,
    max_pending_requests: usize,
    timer: TimerMilli,
}
impl TransactionTable {
    pub fn new(max_pending_requests: usize) -> TransactionTable {
        TransactionTable {
            entries: BTreeMap::new(),
            next_id: 0,
            max_pending_requests,
            timer: TimerMilli::default(),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn timer(&self) -> &TimerMilli {
        &self.timer
    }

    pub fn insert(&mut self, transaction: Transaction) -> CoapResult<TransactionId> {
        if self.entries.len() >= self.max_pending_requests {
            return Err(CoapError::NoBufs);
        }

        let id = TransactionId(self.next_id);
        self.next_id += 1;

        trace!("adding transaction {:?}: {:?}", id, transaction.request);
        self.entries.insert(id, transaction);
        self.schedule_timer();
        Ok(id)
    }

    pub fn remove(&mut self, id: TransactionId) -> Option<Transaction> {
        let result = self.entries.remove(&id);
        if result.is_some() {
            trace!("removed transaction {:?}", id);
            self.schedule_timer();
        }
        result
    }

    pub fn get(&self, id: TransactionId) -> Option<&Transaction> {
        self.entries.get(&id)
    }

    pub fn get_mut(&mut self, id: TransactionId) -> Option<&mut Transaction> {
        self.entries.get_mut(&id)
    }

    /// Snapshot of all ids, for iterations that invoke callbacks which may modify the table
    pub fn ids(&self) -> Vec<TransactionId> {
        self.entries.keys().cloned().collect()
    }

    pub fn ids_by_handler(&self, handler: &Rc<dyn ResponseHandler>) -> Vec<TransactionId> {
        self.entries.iter()
            .filter(|(_, t)| t.metadata.has_handler(handler))
            .map(|(id, _)| *id)
            .collect()
    }

    /// ids of transactions sent from `sock_addr`, or all ids for `None`
    pub fn ids_by_source(&self, sock_addr: Option<IpAddr>) -> Vec<TransactionId> {
        self.entries.iter()
            .filter(|(_, t)| sock_addr.map_or(true, |a| t.metadata.peer_info.sock_addr == a))
            .map(|(id, _)| *id)
            .collect()
    }

    /// Finds the transaction a received message belongs to. ACK and Reset are matched by message
    ///  id, separate responses by token.
    pub fn find_related_request(&self, response: &Message, peer_info: &PeerInfo) -> Option<TransactionId> {
        self.entries.iter()
            .filter(|(_, t)| t.metadata.peer_info.matches_responder(peer_info))
            .find(|(_, t)| match response.msg_type() {
                MessageType::Ack | MessageType::Reset => response.message_id() == t.request.message_id(),
                MessageType::Confirmable | MessageType::NonConfirmable => response.is_token_equal(&t.request),
            })
            .map(|(id, _)| *id)
    }

    pub fn schedule_timer(&mut self) {
        let next = self.entries.values()
            .filter(|t| !t.is_acknowledged_subscription())
            .map(|t| t.metadata.next_timer_shot)
            .min();
        self.timer.fire_at_opt(next);
    }
}
