// (c) 2024 Ross Younger

//! Per-connection routing of streams and datagrams to sessions

use std::{
    collections::HashMap,
    io,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use bytes::Bytes;
use quinn::Connection;
use tokio::{io::AsyncBufReadExt as _, sync::mpsc};
use tracing::{Instrument as _, debug, trace, trace_span};

use super::{
    BIDI_STREAM_SIGNAL, SessionId, UpgradeRequest,
    accept::write_status,
    stream::{self, SessionStream},
};
use crate::protocol::{
    ErrorCode, ReceivingStream as _, RequestHead, SendingStream as _, StatusCode, read_head,
    varint,
};

/// Streams waiting to be accepted by a session
const STREAM_BACKLOG: usize = 64;
/// Datagrams waiting to be read by a session
const DATAGRAM_BACKLOG: usize = 256;
/// Upgrade requests waiting for the server
const UPGRADE_BACKLOG: usize = 16;

/// Receiving ends handed to a newly registered session
#[derive(Debug)]
pub(super) struct Routes {
    pub(super) streams: mpsc::Receiver<SessionStream>,
    pub(super) datagrams: mpsc::Receiver<Bytes>,
}

#[derive(Debug)]
struct Route {
    streams: mpsc::Sender<SessionStream>,
    datagrams: mpsc::Sender<Bytes>,
}

#[derive(Debug, Default)]
struct State {
    routes: HashMap<SessionId, Route>,
    closed: bool,
}

/// Routing table for one connection
#[derive(Debug, Default)]
pub(super) struct Demux {
    state: Mutex<State>,
}

impl Demux {
    /// Starts demultiplexing a client connection. Upgrade requests from the peer are refused.
    pub(super) fn start(connection: &Connection) -> Arc<Self> {
        let demux = Arc::new(Self::default());
        demux.spawn_tasks(connection, None);
        demux
    }

    /// Starts demultiplexing a server connection, delivering upgrade requests to the returned channel
    pub(super) fn start_accepting(
        connection: &Connection,
    ) -> (Arc<Self>, mpsc::Receiver<UpgradeRequest>) {
        let demux = Arc::new(Self::default());
        let (tx, rx) = mpsc::channel(UPGRADE_BACKLOG);
        demux.spawn_tasks(connection, Some(tx));
        (demux, rx)
    }

    fn spawn_tasks(
        self: &Arc<Self>,
        connection: &Connection,
        upgrades: Option<mpsc::Sender<UpgradeRequest>>,
    ) {
        let span = trace_span!("demux", conn = connection.stable_id());
        let _j = tokio::spawn(
            Arc::clone(self)
                .accept_streams(connection.clone(), upgrades)
                .instrument(span.clone()),
        );
        let _j = tokio::spawn(
            Arc::clone(self)
                .accept_datagrams(connection.clone())
                .instrument(span),
        );
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Creates the routes for a new session. Returns `None` once the connection has gone.
    ///
    /// Streams and datagrams for the session queue up from this point on. The routes are
    /// removed again when the returned [`Registration`] is dropped, unless it is kept.
    pub(super) fn register(self: &Arc<Self>, id: SessionId) -> Option<(Routes, Registration)> {
        let mut state = self.lock();
        if state.closed {
            return None;
        }
        let (streams_tx, streams) = mpsc::channel(STREAM_BACKLOG);
        let (datagrams_tx, datagrams) = mpsc::channel(DATAGRAM_BACKLOG);
        let _ = state.routes.insert(
            id,
            Route {
                streams: streams_tx,
                datagrams: datagrams_tx,
            },
        );
        trace!("registered session {id}");
        let registration = Registration {
            demux: Arc::clone(self),
            id,
            armed: true,
        };
        Some((Routes { streams, datagrams }, registration))
    }

    /// Removes a session's routes. Streams already queued for it can still be accepted.
    pub(super) fn unregister(&self, id: SessionId) {
        if self.lock().routes.remove(&id).is_some() {
            trace!("unregistered session {id}");
        }
    }

    pub(super) fn is_registered(&self, id: SessionId) -> bool {
        self.lock().routes.contains_key(&id)
    }

    fn shut_down(&self) {
        let mut state = self.lock();
        state.closed = true;
        state.routes.clear();
    }

    async fn accept_streams(
        self: Arc<Self>,
        connection: Connection,
        upgrades: Option<mpsc::Sender<UpgradeRequest>>,
    ) {
        loop {
            let stream = match connection.accept_bi().await {
                Ok((send, recv)) => stream::wrap(send, recv),
                Err(e) => {
                    debug!("no more streams: {e}");
                    break;
                }
            };
            let span = trace_span!("stream", id = stream.send.id());
            let _j = tokio::spawn(
                Arc::clone(&self)
                    .classify(connection.clone(), stream, upgrades.clone())
                    .instrument(span),
            );
        }
        self.shut_down();
    }

    async fn accept_datagrams(self: Arc<Self>, connection: Connection) {
        while let Ok(mut datagram) = connection.read_datagram().await {
            let Some(id) = varint::decode(&mut datagram)
                .ok()
                .and_then(SessionId::from_quarter)
            else {
                trace!("discarding datagram without a session prefix");
                continue;
            };
            let sender = self.lock().routes.get(&id).map(|r| r.datagrams.clone());
            match sender {
                Some(tx) => {
                    if tx.try_send(datagram).is_err() {
                        trace!("session {id} is not keeping up; dropping datagram");
                    }
                }
                None => trace!("discarding datagram for unknown session {id}"),
            }
        }
    }

    /// Works out what a new stream is for.
    ///
    /// Upgrade requests are text and start with a letter; session streams start with a varint
    /// whose first byte never is one.
    async fn classify(
        self: Arc<Self>,
        connection: Connection,
        mut stream: SessionStream,
        upgrades: Option<mpsc::Sender<UpgradeRequest>>,
    ) {
        let first = match stream.recv.fill_buf().await {
            Ok([]) => {
                trace!("stream finished before sending anything");
                return;
            }
            Ok(buf) => buf[0],
            Err(e) => {
                debug!("reading stream prefix: {e}");
                return;
            }
        };
        if first.is_ascii_alphabetic() {
            match upgrades {
                Some(tx) => self.upgrade(connection, stream, tx).await,
                None => {
                    debug!("refusing upgrade request from the server side");
                    refuse(stream, ErrorCode::REQUEST_REJECTED);
                }
            }
            return;
        }
        match read_stream_header(&mut stream).await {
            Ok(id) => self.route_stream(id, stream).await,
            Err(e) => {
                debug!("bad stream header: {e}");
                refuse(stream, ErrorCode::REQUEST_REJECTED);
            }
        }
    }

    async fn route_stream(&self, id: SessionId, stream: SessionStream) {
        let sender = self.lock().routes.get(&id).map(|r| r.streams.clone());
        let Some(tx) = sender else {
            debug!("stream for unknown session {id}");
            refuse(stream, ErrorCode::UNKNOWN_SESSION);
            return;
        };
        if let Err(mpsc::error::SendError(stream)) = tx.send(stream).await {
            debug!("session {id} went away before its stream was accepted");
            refuse(stream, ErrorCode::UNKNOWN_SESSION);
        }
    }

    async fn upgrade(
        self: Arc<Self>,
        connection: Connection,
        mut stream: SessionStream,
        tx: mpsc::Sender<UpgradeRequest>,
    ) {
        let head = match read_head(&mut stream.recv)
            .await
            .and_then(|h| RequestHead::parse(&h))
        {
            Ok(head) => head,
            Err(e) => {
                debug!("unusable upgrade request: {e}");
                if let Err(e) = write_status(&mut stream.send, StatusCode::BAD_REQUEST, true).await {
                    debug!("could not send rejection: {e}");
                }
                return;
            }
        };
        trace!("upgrade request: {} {}", head.method, head.path);
        let request = UpgradeRequest::new(head, stream, connection, self);
        if let Err(mpsc::error::SendError(request)) = tx.send(request).await {
            debug!("server is no longer accepting sessions");
            if let Err(e) = request.reject(StatusCode::INTERNAL_SERVER_ERROR).await {
                debug!("could not send rejection: {e}");
            }
        }
    }
}

/// Routes of a session that is still being established
#[derive(Debug)]
pub(super) struct Registration {
    demux: Arc<Demux>,
    id: SessionId,
    armed: bool,
}

impl Registration {
    /// The session was established; its handle now owns the routes
    pub(super) fn keep(mut self) {
        self.armed = false;
    }
}

impl Drop for Registration {
    fn drop(&mut self) {
        if self.armed {
            self.demux.unregister(self.id);
        }
    }
}

async fn read_stream_header(stream: &mut SessionStream) -> io::Result<SessionId> {
    let signal = varint::read(&mut stream.recv).await?;
    if signal != BIDI_STREAM_SIGNAL {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("unknown stream type {signal:#x}"),
        ));
    }
    Ok(SessionId::from_stream_id(varint::read(&mut stream.recv).await?))
}

fn refuse(mut stream: SessionStream, code: ErrorCode) {
    let _ = stream.send.reset(code);
    let _ = stream.recv.stop(code);
}

#[cfg(test)]
mod test {
    use std::sync::Arc;

    use super::Demux;
    use crate::session::SessionId;

    #[test]
    fn dropped_registration_unregisters() {
        let demux = Arc::new(Demux::default());
        let id = SessionId::from_stream_id(4);
        let (_routes, registration) = demux.register(id).unwrap();
        assert!(demux.is_registered(id));
        drop(registration);
        assert!(!demux.is_registered(id));
    }

    #[test]
    fn kept_registration_stays() {
        let demux = Arc::new(Demux::default());
        let id = SessionId::from_stream_id(8);
        let (_routes, registration) = demux.register(id).unwrap();
        registration.keep();
        assert!(demux.is_registered(id));
        demux.unregister(id);
        assert!(!demux.is_registered(id));
    }

    #[test]
    fn no_routes_after_shutdown() {
        let demux = Arc::new(Demux::default());
        demux.shut_down();
        assert!(demux.register(SessionId::from_stream_id(0)).is_none());
    }
}
