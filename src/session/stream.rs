// (c) 2024 Ross Younger

//! Adapters from quinn streams to the stream capability traits

use std::{
    io,
    pin::Pin,
    task::{Context, Poll},
};

use quinn::VarInt;
use tokio::io::{AsyncBufRead, AsyncRead, AsyncWrite, BufReader, ReadBuf};

use crate::protocol::{ErrorCode, ReceivingStream, SendReceivePair, SendingStream, StreamControlError};

/// A bidirectional stream belonging to a session
pub type SessionStream = SendReceivePair<SendHalf, RecvHalf>;

fn to_varint(code: ErrorCode) -> VarInt {
    VarInt::from_u64(code.to_transport()).unwrap_or(VarInt::MAX)
}

/// Write half of a session stream.
///
/// Shutting down the writer finishes the stream.
#[derive(Debug)]
pub struct SendHalf {
    inner: quinn::SendStream,
}

impl SendHalf {
    pub(crate) fn new(inner: quinn::SendStream) -> Self {
        Self { inner }
    }

    /// Transport stream id
    #[must_use]
    pub fn id(&self) -> u64 {
        VarInt::from(self.inner.id()).into_inner()
    }
}

impl AsyncWrite for SendHalf {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        AsyncWrite::poll_write(Pin::new(&mut self.get_mut().inner), cx, buf)
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        AsyncWrite::poll_flush(Pin::new(&mut self.get_mut().inner), cx)
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        AsyncWrite::poll_shutdown(Pin::new(&mut self.get_mut().inner), cx)
    }
}

impl SendingStream for SendHalf {
    fn reset(&mut self, code: ErrorCode) -> Result<(), StreamControlError> {
        self.inner
            .reset(to_varint(code))
            .map_err(|_| StreamControlError::Closed)
    }

    fn stream_id(&self) -> Result<u64, StreamControlError> {
        Ok(self.id())
    }
}

/// Read half of a session stream, buffered.
///
/// A reset from the peer is reported as [`io::ErrorKind::ConnectionReset`] with the
/// session-level [`ErrorCode`] in the message.
#[derive(Debug)]
pub struct RecvHalf {
    inner: BufReader<quinn::RecvStream>,
}

impl RecvHalf {
    pub(crate) fn new(inner: quinn::RecvStream) -> Self {
        Self {
            inner: BufReader::new(inner),
        }
    }

    /// Transport stream id
    #[must_use]
    pub fn id(&self) -> u64 {
        VarInt::from(self.inner.get_ref().id()).into_inner()
    }
}

/// Rewrites a quinn reset into something readable
fn translate_read_error(error: io::Error) -> io::Error {
    let reset = error
        .get_ref()
        .and_then(|inner| inner.downcast_ref::<quinn::ReadError>())
        .and_then(|e| match e {
            quinn::ReadError::Reset(code) => Some(code.into_inner()),
            _ => None,
        });
    match reset {
        Some(raw) => match ErrorCode::from_transport(raw) {
            Some(code) => io::Error::new(
                io::ErrorKind::ConnectionReset,
                format!("stream reset by peer: {code}"),
            ),
            None => io::Error::new(
                io::ErrorKind::ConnectionReset,
                format!("stream reset by peer with transport code {raw:#x}"),
            ),
        },
        None => error,
    }
}

impl AsyncRead for RecvHalf {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        match AsyncRead::poll_read(Pin::new(&mut self.get_mut().inner), cx, buf) {
            Poll::Ready(Err(e)) => Poll::Ready(Err(translate_read_error(e))),
            other => other,
        }
    }
}

impl AsyncBufRead for RecvHalf {
    fn poll_fill_buf(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<&[u8]>> {
        match AsyncBufRead::poll_fill_buf(Pin::new(&mut self.get_mut().inner), cx) {
            Poll::Ready(Err(e)) => Poll::Ready(Err(translate_read_error(e))),
            other => other,
        }
    }

    fn consume(self: Pin<&mut Self>, amt: usize) {
        AsyncBufRead::consume(Pin::new(&mut self.get_mut().inner), amt);
    }
}

impl ReceivingStream for RecvHalf {
    fn stop(&mut self, code: ErrorCode) -> Result<(), StreamControlError> {
        self.inner
            .get_mut()
            .stop(to_varint(code))
            .map_err(|_| StreamControlError::Closed)
    }
}

/// Wraps a freshly opened or accepted quinn stream pair
pub(crate) fn wrap(send: quinn::SendStream, recv: quinn::RecvStream) -> SessionStream {
    SendReceivePair::from((SendHalf::new(send), RecvHalf::new(recv)))
}
