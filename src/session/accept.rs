// (c) 2024 Ross Younger

//! Server side of session establishment

use std::{net::SocketAddr, sync::Arc};

use quinn::Connection;
use tokio::{io::AsyncWriteExt as _, sync::mpsc};
use tracing::debug;

use super::{Session, SessionError, SessionId, SessionStream, UpgradeError, demux::Demux};
use crate::protocol::{METHOD, PROTOCOL, RequestHead, ResponseHead, SendingStream, StatusCode};

/// Incoming session requests on one connection
#[derive(Debug)]
pub struct SessionAcceptor {
    connection: Connection,
    requests: mpsc::Receiver<UpgradeRequest>,
}

impl SessionAcceptor {
    /// Starts demultiplexing an accepted connection
    #[must_use]
    pub fn new(connection: Connection) -> Self {
        let (_demux, requests) = Demux::start_accepting(&connection);
        Self {
            connection,
            requests,
        }
    }

    /// Waits for the next upgrade request. Returns `None` once the connection has closed.
    pub async fn next(&mut self) -> Option<UpgradeRequest> {
        self.requests.recv().await
    }

    /// The underlying connection
    #[must_use]
    pub fn connection(&self) -> &Connection {
        &self.connection
    }
}

/// A request to establish a session, not yet answered.
///
/// Answering consumes the request, so it can only be answered once.
#[derive(Debug)]
pub struct UpgradeRequest {
    head: RequestHead,
    control: SessionStream,
    connection: Connection,
    demux: Arc<Demux>,
}

impl UpgradeRequest {
    pub(super) fn new(
        head: RequestHead,
        control: SessionStream,
        connection: Connection,
        demux: Arc<Demux>,
    ) -> Self {
        Self {
            head,
            control,
            connection,
            demux,
        }
    }

    /// The request head
    #[must_use]
    pub fn head(&self) -> &RequestHead {
        &self.head
    }

    /// Requested path
    #[must_use]
    pub fn path(&self) -> &str {
        &self.head.path
    }

    /// Address of the peer
    #[must_use]
    pub fn remote_address(&self) -> SocketAddr {
        self.connection.remote_address()
    }

    fn check(&self, expected_path: &str) -> Result<(), StatusCode> {
        if self.head.method != METHOD {
            return Err(StatusCode::BAD_REQUEST);
        }
        if !self
            .head
            .protocol()
            .is_some_and(|p| p.eq_ignore_ascii_case(PROTOCOL))
        {
            return Err(StatusCode::BAD_REQUEST);
        }
        let path = self
            .head
            .path
            .split_once('?')
            .map_or(self.head.path.as_str(), |(p, _)| p);
        if path != expected_path {
            return Err(StatusCode::NOT_FOUND);
        }
        Ok(())
    }

    /// Validates the request and, if acceptable, establishes the session.
    ///
    /// The method must be `CONNECT`, the `protocol` header `webtransport`, and the path
    /// `expected_path`. Otherwise an error status (400 or 404) is sent and
    /// [`UpgradeError::Rejected`] returned.
    pub async fn accept(self, expected_path: &str) -> Result<Session, UpgradeError> {
        if let Err(status) = self.check(expected_path) {
            debug!(
                "rejecting {} {} from {}: {status}",
                self.head.method,
                self.head.path,
                self.remote_address()
            );
            self.reject(status).await?;
            return Err(UpgradeError::Rejected(status));
        }
        let id = SessionId::from_stream_id(self.control.send.id());
        let (routes, registration) = self.demux.register(id).ok_or(SessionError::Closed)?;
        let session = Session::establish(self.connection, self.demux, self.control, routes);
        session
            .write_control(&ResponseHead::new(StatusCode::OK).encode()?)
            .await
            .map_err(UpgradeError::Stream)?;
        registration.keep();
        debug!("accepted session {}", session.id());
        Ok(session)
    }

    /// Refuses the request with the given status, which should not be a success code
    pub async fn reject(mut self, status: StatusCode) -> Result<(), UpgradeError> {
        write_status(&mut self.control.send, status, true).await
    }
}

/// Writes a response head, optionally finishing the stream
pub(super) async fn write_status<S: SendingStream>(
    send: &mut S,
    status: StatusCode,
    finish: bool,
) -> Result<(), UpgradeError> {
    let bytes = ResponseHead::new(status).encode()?;
    send.write_all(&bytes).await.map_err(UpgradeError::Stream)?;
    if finish {
        send.shutdown().await.map_err(UpgradeError::Stream)?;
    }
    Ok(())
}
