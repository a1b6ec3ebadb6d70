// (c) 2024 Ross Younger

//! # Stream request/response protocol
//!
//! Each session stream carries exactly one exchange:
//!
//! 1. The requester writes a single line, `GET <path>\r\n`, then finishes its write half.
//! 2. The responder writes the raw bytes of the resource, then finishes its write half.
//!
//! There are no headers and no status codes. A failed request is answered with an empty body;
//! the reason is only logged. On a QUIC stream, a response that fails part way through is
//! *reset* with [`ErrorCode::INTERNAL`](crate::protocol::ErrorCode::INTERNAL) rather than
//! finished, so the requester can tell a truncated body from a complete one. Streams that
//! cannot be reset (in-memory pipes, for example) are finished instead, and a truncated body
//! on them looks complete.

use std::io;

use crate::{
    protocol::{RequestLineError, StreamControlError},
    util::PathError,
};

mod client;
pub use client::{ResponseBody, read_response_body, request, send_request};

mod server;
pub use server::{receive_request, respond_error, respond_ok};

pub use crate::protocol::RequestLine as Request;

/// Why a request was not served. Logged by the responder, never sent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
pub enum Failure {
    /// The request line could not be parsed
    BadRequest,
    /// No such resource
    NotFound,
    /// The resource is outside the serving root or otherwise off limits
    Forbidden,
    /// Only GET is supported
    MethodNotAllowed,
    /// Something went wrong locally
    InternalError,
}

/// Errors arising from the stream protocol
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// The request could not be built
    #[error("invalid request: {0}")]
    InvalidRequest(#[source] RequestLineError),
    /// The received request line could not be parsed
    #[error("malformed request: {0}")]
    MalformedRequest(#[source] RequestLineError),
    /// The stream ended before a complete request line arrived
    #[error("stream ended before the request line was complete")]
    IncompleteRequest,
    /// Writing to the stream failed
    #[error("stream write failed: {0}")]
    Write(#[source] io::Error),
    /// Reading from the stream, or copying a body, failed
    #[error("transport error: {0}")]
    Transport(#[source] io::Error),
    /// The request path would leave the serving root
    #[error(transparent)]
    PathTraversalRejected(#[from] PathError),
    /// Nothing to serve at the requested path
    #[error("not found: {0}")]
    NotFound(String),
    /// A method other than GET
    #[error("unsupported method {0:?}")]
    UnsupportedMethod(String),
    /// The stream lacks a capability the operation needed
    #[error(transparent)]
    NotImplemented(#[from] StreamControlError),
}

impl ProtocolError {
    /// The failure hint a responder logs for this error
    #[must_use]
    pub fn failure(&self) -> Failure {
        match self {
            Self::MalformedRequest(_) | Self::IncompleteRequest | Self::InvalidRequest(_) => {
                Failure::BadRequest
            }
            Self::PathTraversalRejected(_) => Failure::Forbidden,
            Self::NotFound(_) => Failure::NotFound,
            Self::UnsupportedMethod(_) => Failure::MethodNotAllowed,
            Self::Write(_) | Self::Transport(_) | Self::NotImplemented(_) => {
                Failure::InternalError
            }
        }
    }
}
