use tracing::{debug, trace};
use crate::error::{CoapError, CoapResult};
use crate::message::Message;
use crate::peer_info::PeerInfo;
use crate::time::{TimeMilli, TimerMilli};
use crate::tx_parameters::TxParameters;

struct CachedResponse {
    response: Message,
    peer_info: PeerInfo,
    dequeue_time: TimeMilli,
}

/// Cache of recently sent responses, keyed by message id and peer. A retransmitted request is
///  answered from here instead of invoking the handler a second time.
///
/// The cache is bounded: when it is full, the entry that would expire first is evicted. All
///  entries share a single expiry timer that is re-armed to the earliest remaining deadline.
pub struct ResponsesQueue {
    entries: Vec<CachedResponse>,
    max_cached_responses: usize,
    timer: TimerMilli,
}
impl ResponsesQueue {
    pub fn new(max_cached_responses: usize) -> ResponsesQueue {
        ResponsesQueue {
            entries: Vec::with_capacity(max_cached_responses),
            max_cached_responses,
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

    fn find_matched_response(&self, message_id: u16, peer_info: &PeerInfo) -> Option<&CachedResponse> {
        self.entries.iter()
            .find(|e| e.response.message_id() == message_id && e.peer_info.has_same_peer_addr_and_port(peer_info))
    }

    /// A copy of the cached response to `request`, or `NotFound`
    pub fn get_matched_response_copy(&self, request: &Message, peer_info: &PeerInfo) -> CoapResult<Message> {
        self.find_matched_response(request.message_id(), peer_info)
            .map(|e| e.response.clone())
            .ok_or(CoapError::NotFound)
    }

    pub fn enqueue_response(&mut self, response: &Message, peer_info: &PeerInfo, tx_parameters: &TxParameters, now: TimeMilli) {
        if self.find_matched_response(response.message_id(), peer_info).is_some() {
            trace!("response {} to {:?} is already cached", response.message_id(), peer_info);
            return;
        }

        self.evict_if_full();

        let dequeue_time = now + tx_parameters.exchange_lifetime();
        self.entries.push(CachedResponse {
            response: response.clone(),
            peer_info: *peer_info,
            dequeue_time,
        });
        self.timer.fire_at_if_earlier(dequeue_time);
    }

    fn evict_if_full(&mut self) {
        if self.entries.len() < self.max_cached_responses {
            return;
        }

        let earliest = self.entries.iter()
            .enumerate()
            .min_by_key(|(_, e)| e.dequeue_time)
            .map(|(idx, _)| idx);

        if let Some(idx) = earliest {
            let evicted = self.entries.remove(idx);
            debug!("evicting cached response {} to {:?}", evicted.response.message_id(), evicted.peer_info);
        }
    }

    pub fn dequeue_all(&mut self) {
        self.entries.clear();
        self.timer.stop();
    }

    /// drops all expired entries and re-arms the timer for the earliest remaining one
    pub fn handle_timer(&mut self, now: TimeMilli) {
        self.entries.retain(|e| e.dequeue_time > now);

        let next = self.entries.iter()
            .map(|e| e.dequeue_time)
            .min();
        self.timer.fire_at_opt(next);
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;
    use crate::message::{Code, MessageType};
    use super::*;

    fn response(message_id: u16) -> Message {
        let mut result = Message::new(MessageType::Ack, Code::CONTENT);
        result.set_message_id(message_id);
        result
    }

    fn peer(port: u16) -> PeerInfo {
        PeerInfo::new(format!("[fd00::1]:{}", port).parse().unwrap())
    }

    fn lifetime() -> u32 {
        TxParameters::default().exchange_lifetime()
    }

    #[rstest]
    #[case::match_(5, 1000, true)]
    #[case::other_message_id(6, 1000, false)]
    #[case::other_peer(5, 1001, false)]
    fn test_get_matched_response_copy(#[case] message_id: u16, #[case] port: u16, #[case] expected: bool) {
        let mut queue = ResponsesQueue::new(10);
        queue.enqueue_response(&response(5), &peer(1000), &TxParameters::default(), TimeMilli::ZERO);

        let result = queue.get_matched_response_copy(&response(message_id), &peer(port));
        if expected {
            assert_eq!(result.unwrap(), response(5));
        }
        else {
            assert_eq!(result, Err(CoapError::NotFound));
        }
    }

    #[test]
    fn test_enqueue_duplicate_is_ignored() {
        let mut queue = ResponsesQueue::new(10);
        queue.enqueue_response(&response(5), &peer(1000), &TxParameters::default(), TimeMilli::from_millis(1));
        queue.enqueue_response(&response(5), &peer(1000), &TxParameters::default(), TimeMilli::from_millis(2));
        assert_eq!(queue.len(), 1);
        assert_eq!(queue.timer().fire_time(), Some(TimeMilli::from_millis(1) + lifetime()));
    }

    #[test]
    fn test_eviction_of_earliest_deadline() {
        let mut queue = ResponsesQueue::new(3);
        queue.enqueue_response(&response(1), &peer(1000), &TxParameters::default(), TimeMilli::from_millis(20));
        queue.enqueue_response(&response(2), &peer(1000), &TxParameters::default(), TimeMilli::from_millis(10));
        queue.enqueue_response(&response(3), &peer(1000), &TxParameters::default(), TimeMilli::from_millis(30));
        assert_eq!(queue.len(), 3);

        queue.enqueue_response(&response(4), &peer(1000), &TxParameters::default(), TimeMilli::from_millis(40));
        assert_eq!(queue.len(), 3);
        assert!(queue.get_matched_response_copy(&response(2), &peer(1000)).is_err());
        for id in [1, 3, 4] {
            assert!(queue.get_matched_response_copy(&response(id), &peer(1000)).is_ok());
        }
    }

    #[test]
    fn test_handle_timer() {
        let mut queue = ResponsesQueue::new(10);
        queue.enqueue_response(&response(1), &peer(1000), &TxParameters::default(), TimeMilli::from_millis(0));
        queue.enqueue_response(&response(2), &peer(1000), &TxParameters::default(), TimeMilli::from_millis(100));
        assert_eq!(queue.timer().fire_time(), Some(TimeMilli::ZERO + lifetime()));

        queue.handle_timer(TimeMilli::ZERO + lifetime());
        assert_eq!(queue.len(), 1);
        assert_eq!(queue.timer().fire_time(), Some(TimeMilli::from_millis(100) + lifetime()));

        queue.handle_timer(TimeMilli::from_millis(100) + lifetime());
        assert!(queue.is_empty());
        assert!(!queue.timer().is_running());
    }

    #[test]
    fn test_dequeue_all() {
        let mut queue = ResponsesQueue::new(10);
        queue.enqueue_response(&response(1), &peer(1000), &TxParameters::default(), TimeMilli::ZERO);
        queue.dequeue_all();
        assert!(queue.is_empty());
        assert!(!queue.timer().is_running());
    }
}
