use std::cell::{Cell, RefCell};
use std::rc::Rc;
use crate::error::{CoapError, CoapResult};
use crate::message::Message;
use crate::peer_info::PeerInfo;
use crate::transport::Transport;

/// [Transport] that records messages instead of sending them. Clones share the recorded
///  messages, so a test can keep a clone while the engine owns another.
#[derive(Clone, Default)]
pub struct TrackingMockTransport {
    tracker: Rc<RefCell<Vec<(Message, PeerInfo)>>>,
    failure: Rc<Cell<Option<CoapError>>>,
}
impl TrackingMockTransport {
    /// makes all subsequent sends fail with `error`, or succeed again for `None`
    pub fn fail_with(&self, error: Option<CoapError>) {
        self.failure.set(error);
    }

    /// returns sent messages, clearing the internal buffer
    pub fn sent_messages(&self) -> Vec<(Message, PeerInfo)> {
        std::mem::take(&mut *self.tracker.borrow_mut())
    }

    /// removes and returns the oldest sent message, panicking if there is none
    pub fn take_sent(&self) -> (Message, PeerInfo) {
        let mut tracker = self.tracker.borrow_mut();
        if tracker.is_empty() {
            panic!("no message was sent");
        }
        tracker.remove(0)
    }

    pub fn assert_no_remaining_messages(&self) {
        let tracker = self.tracker.borrow();
        assert!(tracker.is_empty(), "unexpected messages: {:?}", *tracker);
    }
}

impl Transport for TrackingMockTransport {
    fn send(&self, message: &Message, peer_info: &PeerInfo) -> CoapResult<()> {
        if let Some(error) = self.failure.get() {
            return Err(error);
        }
        self.tracker.borrow_mut().push((message.clone(), *peer_info));
        Ok(())
    }
}
