// (c) 2024 Ross Younger

//! # Multiplexed sessions over QUIC
//!
//! A session is established by an upgrade exchange (see [`crate::protocol::upgrade`]) on a
//! client-initiated bidirectional stream. The session is identified by that stream's id and
//! lives as long as the stream does. Several sessions may share one QUIC connection.
//!
//! Every other bidirectional stream belonging to a session begins with the varint
//! [`BIDI_STREAM_SIGNAL`] followed by the varint session id. Each datagram begins with the
//! session's *quarter stream id* (`session_id / 4`). A per-connection demultiplexer reads
//! these prefixes and hands the stream or payload to the right [`Session`].
//!
//! * Clients use a [`Dialer`] to obtain a [`Session`].
//! * Servers wrap each accepted connection in a [`SessionAcceptor`] and decide what to do with
//!   each [`UpgradeRequest`].

use std::{fmt::Display, io};

use crate::{
    endpoint::EndpointConfigError,
    protocol::{HeadError, StatusCode, VarIntError},
};

mod accept;
pub use accept::{SessionAcceptor, UpgradeRequest};

mod demux;

mod dial;
pub use dial::Dialer;

mod handle;
pub use handle::Session;

mod stream;
pub use stream::{RecvHalf, SendHalf, SessionStream};

/// First varint on every session stream
pub const BIDI_STREAM_SIGNAL: u64 = 0x41;

/// Identifies a session within its connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(u64);

impl SessionId {
    /// The session created by the upgrade stream with this id
    #[must_use]
    pub fn from_stream_id(id: u64) -> Self {
        Self(id)
    }
    /// Numeric value
    #[must_use]
    pub fn as_u64(self) -> u64 {
        self.0
    }
    /// Prefix used on datagrams
    pub(crate) fn quarter(self) -> u64 {
        self.0 / 4
    }
    pub(crate) fn from_quarter(quarter: u64) -> Option<Self> {
        quarter.checked_mul(4).map(Self)
    }
}

impl Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Failures establishing the underlying connection
#[derive(Debug, thiserror::Error)]
pub enum DialError {
    /// The URL cannot be dialled
    #[error("cannot dial {url}: {reason}")]
    InvalidUrl {
        /// The offending URL
        url: String,
        /// What is wrong with it
        reason: &'static str,
    },
    /// Name resolution failed
    #[error("could not resolve {host}: {source}")]
    Resolve {
        /// Host name
        host: String,
        /// Underlying error
        #[source]
        source: io::Error,
    },
    /// Name resolution returned nothing
    #[error("no addresses found for {0}")]
    NoAddress(String),
    /// The local UDP socket could not be created
    #[error("could not bind local socket: {0}")]
    Bind(#[source] io::Error),
    /// TLS or transport configuration problem
    #[error(transparent)]
    Config(#[from] EndpointConfigError),
    /// The connection attempt could not be started
    #[error("could not start connecting: {0}")]
    Connect(#[from] quinn::ConnectError),
    /// The transport handshake failed
    #[error("handshake failed: {0}")]
    Handshake(#[from] quinn::ConnectionError),
    /// [`Dialer::close`] has been called
    #[error("dialer is closed")]
    Closed,
}

/// Failures establishing a session
#[derive(Debug, thiserror::Error)]
pub enum UpgradeError {
    /// Could not connect
    #[error(transparent)]
    Dial(#[from] DialError),
    /// The server answered with a non-success status
    #[error("session upgrade rejected: {0}")]
    Rejected(StatusCode),
    /// The deadline passed before the session was established
    #[error("timed out establishing session")]
    Timeout,
    /// The upgrade exchange could not be parsed or encoded
    #[error("bad upgrade exchange: {0}")]
    Head(#[from] HeadError),
    /// I/O on the upgrade stream failed
    #[error("upgrade stream: {0}")]
    Stream(#[source] io::Error),
    /// The session could not be set up
    #[error(transparent)]
    Session(#[from] SessionError),
}

/// Failures of an established session
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// The session has ended
    #[error("session is closed")]
    Closed,
    /// The underlying connection failed
    #[error("connection lost: {0}")]
    Connection(#[from] quinn::ConnectionError),
    /// Stream I/O failed
    #[error("stream I/O: {0}")]
    Stream(#[source] io::Error),
    /// A prefix could not be encoded
    #[error(transparent)]
    Encoding(#[from] VarIntError),
    /// A datagram could not be sent
    #[error("sending datagram: {0}")]
    Datagram(#[from] quinn::SendDatagramError),
}

#[cfg(test)]
mod test {
    use super::SessionId;
    use pretty_assertions::assert_eq;

    #[test]
    fn quarter_ids() {
        let id = SessionId::from_stream_id(8);
        assert_eq!(id.quarter(), 2);
        assert_eq!(SessionId::from_quarter(2), Some(id));
        assert_eq!(SessionId::from_quarter(u64::MAX), None);
        assert_eq!(id.to_string(), "#8");
    }
}
