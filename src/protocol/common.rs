// (c) 2024 Ross Younger

//! Stream capabilities shared by the session layer and the request protocol
//!
//! The request protocol is written against [`SendingStream`] and [`ReceivingStream`]
//! rather than concrete transport types, so it can be driven by in-memory pipes in tests.
//! Beyond plain I/O, a stream may be able to abort a direction with an
//! [`ErrorCode`] or report its transport stream id. Types without a capability
//! report [`StreamControlError::NotImplemented`].

use tokio::io::{AsyncRead, AsyncWrite};

use super::error_code::ErrorCode;

/// Failure of a stream control operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum StreamControlError {
    /// The stream direction was already finished or reset
    #[error("stream already closed")]
    Closed,
    /// This stream type cannot perform the operation
    #[error("{0} is not implemented by this stream type")]
    NotImplemented(&'static str),
}

/// Streams used for sending data
pub trait SendingStream: AsyncWrite + Send + Unpin {
    /// Abandons the write direction. The peer sees `code`; any unsent data is discarded.
    fn reset(&mut self, code: ErrorCode) -> Result<(), StreamControlError> {
        let _ = code;
        Err(StreamControlError::NotImplemented("reset"))
    }
    /// Transport stream id
    fn stream_id(&self) -> Result<u64, StreamControlError> {
        Err(StreamControlError::NotImplemented("stream_id"))
    }
}

/// Streams used for receiving data
pub trait ReceivingStream: AsyncRead + Send + Unpin {
    /// Asks the peer to stop sending, with the given code
    fn stop(&mut self, code: ErrorCode) -> Result<(), StreamControlError> {
        let _ = code;
        Err(StreamControlError::NotImplemented("stop"))
    }
}

#[cfg(test)]
impl SendingStream for tokio_test::io::Mock {}
#[cfg(test)]
impl ReceivingStream for tokio_test::io::Mock {}
#[cfg(test)]
impl SendingStream for tokio::io::WriteHalf<tokio::io::SimplexStream> {}
#[cfg(test)]
impl ReceivingStream for tokio::io::ReadHalf<tokio::io::SimplexStream> {}
#[cfg(test)]
impl SendingStream for tokio::io::DuplexStream {}
#[cfg(test)]
impl ReceivingStream for tokio::io::DuplexStream {}

/// Syntactic sugar helper type
#[derive(Debug)]
pub struct SendReceivePair<S: SendingStream, R: ReceivingStream> {
    /// outbound data
    pub send: S,
    /// inbound data
    pub recv: R,
}

impl<S: SendingStream, R: ReceivingStream> From<(S, R)> for SendReceivePair<S, R> {
    fn from(value: (S, R)) -> Self {
        Self {
            send: value.0,
            recv: value.1,
        }
    }
}
