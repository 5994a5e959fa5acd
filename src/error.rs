use std::io;
use thiserror::Error;

pub type CoapResult<T> = Result<T, CoapError>;

/// Failure taxonomy shared by the codec, the transaction engine and the handlers.
///
/// NB: `NotFound` is a regular outcome (no matching transaction / resource / cached response)
///      and is not logged as a failure. `Busy` is used internally while a block-wise transfer
///      continues and never reaches an application handler as a final result.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoapError {
    #[error("insufficient buffers")]
    NoBufs,
    #[error("invalid arguments")]
    InvalidArgs,
    #[error("invalid state")]
    InvalidState,
    #[error("not found")]
    NotFound,
    #[error("already registered")]
    Already,
    #[error("transaction aborted")]
    Abort,
    #[error("response timeout")]
    ResponseTimeout,
    #[error("malformed message")]
    Parse,
    #[error("block-wise transfer in progress")]
    Busy,
    #[error("incomplete block-wise data")]
    Incomplete,
    #[error("message dropped")]
    Drop,
    #[error("transport error: {0:?}")]
    Transport(io::ErrorKind),
}

impl From<io::Error> for CoapError {
    fn from(e: io::Error) -> Self {
        match e.kind() {
            io::ErrorKind::WouldBlock => CoapError::NoBufs,
            kind => CoapError::Transport(kind),
        }
    }
}
