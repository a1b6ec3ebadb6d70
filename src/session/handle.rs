// (c) 2024 Ross Younger

//! The session handle

use std::{net::SocketAddr, sync::Arc};

use bytes::{Bytes, BytesMut};
use quinn::Connection;
use tokio::{
    io::AsyncWriteExt as _,
    sync::{Mutex, mpsc},
};
use tracing::{Instrument as _, debug, trace, trace_span};

use super::{
    BIDI_STREAM_SIGNAL, SessionError, SessionId,
    demux::{Demux, Routes},
    stream::{self, RecvHalf, SendHalf, SessionStream},
};
use crate::protocol::{SendReceivePair, varint};

/// An established session.
///
/// All methods take `&self` and may be used concurrently.
/// Dropping the handle ends the session.
#[derive(Debug)]
pub struct Session {
    id: SessionId,
    connection: Connection,
    demux: Arc<Demux>,
    control: Mutex<SendHalf>,
    streams: Mutex<mpsc::Receiver<SessionStream>>,
    datagrams: Mutex<mpsc::Receiver<Bytes>>,
}

impl Session {
    /// Wraps a session whose upgrade exchange used `control` and whose `routes` are registered
    pub(super) fn establish(
        connection: Connection,
        demux: Arc<Demux>,
        control: SessionStream,
        routes: Routes,
    ) -> Self {
        let id = SessionId::from_stream_id(control.send.id());
        let SendReceivePair { send, recv } = control;
        let _j = tokio::spawn(
            watch_control(recv, Arc::clone(&demux), id)
                .instrument(trace_span!("session", id = id.as_u64())),
        );
        Self {
            id,
            connection,
            demux,
            control: Mutex::new(send),
            streams: Mutex::new(routes.streams),
            datagrams: Mutex::new(routes.datagrams),
        }
    }

    /// Session identifier
    #[must_use]
    pub fn id(&self) -> SessionId {
        self.id
    }

    /// Address of the peer
    #[must_use]
    pub fn remote_address(&self) -> SocketAddr {
        self.connection.remote_address()
    }

    /// Whether the session is still usable
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.demux.is_registered(self.id)
    }

    /// Writes to the control stream (used to answer the upgrade request)
    pub(super) async fn write_control(&self, bytes: &[u8]) -> std::io::Result<()> {
        self.control.lock().await.write_all(bytes).await
    }

    /// Opens a new bidirectional stream within this session
    pub async fn open_stream(&self) -> Result<SessionStream, SessionError> {
        if !self.is_open() {
            return Err(SessionError::Closed);
        }
        let (send, recv) = self.connection.open_bi().await?;
        let mut stream = stream::wrap(send, recv);
        let mut header = BytesMut::with_capacity(16);
        varint::encode(BIDI_STREAM_SIGNAL, &mut header)?;
        varint::encode(self.id.as_u64(), &mut header)?;
        stream
            .send
            .write_all(&header)
            .await
            .map_err(SessionError::Stream)?;
        trace!("opened stream {} on session {}", stream.send.id(), self.id);
        Ok(stream)
    }

    /// Waits for the peer to open a stream within this session
    pub async fn accept_stream(&self) -> Result<SessionStream, SessionError> {
        self.streams
            .lock()
            .await
            .recv()
            .await
            .ok_or(SessionError::Closed)
    }

    /// Sends an unreliable datagram
    pub fn send_datagram(&self, payload: &[u8]) -> Result<(), SessionError> {
        if !self.is_open() {
            return Err(SessionError::Closed);
        }
        let mut buf = BytesMut::with_capacity(8 + payload.len());
        varint::encode(self.id.quarter(), &mut buf)?;
        buf.extend_from_slice(payload);
        self.connection.send_datagram(buf.freeze())?;
        Ok(())
    }

    /// Waits for a datagram from the peer
    pub async fn read_datagram(&self) -> Result<Bytes, SessionError> {
        self.datagrams
            .lock()
            .await
            .recv()
            .await
            .ok_or(SessionError::Closed)
    }

    /// Largest payload [`send_datagram`](Self::send_datagram) can currently carry,
    /// or `None` if the peer does not accept datagrams
    #[must_use]
    pub fn max_datagram_size(&self) -> Option<usize> {
        let prefix = varint::encoded_len(self.id.quarter()).unwrap_or(8);
        self.connection
            .max_datagram_size()
            .map(|n| n.saturating_sub(prefix))
    }

    /// Ends the session by finishing the control stream.
    ///
    /// Streams already open are not affected. Calling this more than once is harmless.
    pub async fn close(&self) {
        self.demux.unregister(self.id);
        if let Err(e) = self.control.lock().await.shutdown().await {
            trace!("finishing control stream of session {}: {e}", self.id);
        }
        debug!("closed session {}", self.id);
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.demux.unregister(self.id);
    }
}

/// Keeps the session registered until the peer finishes or resets the control stream
async fn watch_control(mut recv: RecvHalf, demux: Arc<Demux>, id: SessionId) {
    let mut sink = tokio::io::sink();
    match tokio::io::copy(&mut recv, &mut sink).await {
        Ok(_) => debug!("session {id} ended by peer"),
        Err(e) => debug!("session {id} ended: {e}"),
    }
    demux.unregister(id);
}
