use std::cell::RefCell;
use crate::engine::CoapEngine;
use crate::error::CoapResult;
use crate::message::Message;
use crate::peer_info::PeerInfo;
use crate::resource::ResponseHandler;

#[derive(Debug, Clone)]
pub struct RecordedResponse {
    pub response: Option<Message>,
    pub peer_info: Option<PeerInfo>,
    pub result: CoapResult<()>,
}

/// [ResponseHandler] that records every invocation
#[derive(Default)]
pub struct TrackingResponseHandler {
    responses: RefCell<Vec<RecordedResponse>>,
}
impl TrackingResponseHandler {
    /// returns recorded invocations, clearing the internal buffer
    pub fn take(&self) -> Vec<RecordedResponse> {
        std::mem::take(&mut *self.responses.borrow_mut())
    }

    pub fn results(&self) -> Vec<CoapResult<()>> {
        self.take().into_iter()
            .map(|r| r.result)
            .collect()
    }
}

impl ResponseHandler for TrackingResponseHandler {
    fn handle_response(&self, _engine: &mut CoapEngine, response: Option<&Message>, peer_info: Option<&PeerInfo>, result: CoapResult<()>) {
        self.responses.borrow_mut().push(RecordedResponse {
            response: response.cloned(),
            peer_info: peer_info.copied(),
            result,
        });
    }
}
