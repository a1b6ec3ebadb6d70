// (c) 2024 Ross Younger

//! Requester side

use std::{
    io,
    pin::Pin,
    task::{Context, Poll},
};

use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt as _, ReadBuf};
use tokio_util::io::ReaderStream;
use tracing::trace;

use super::ProtocolError;
use crate::protocol::{ReceivingStream, RequestLine, SendReceivePair, SendingStream};

/// Writes a request line, then finishes the write half
pub async fn send_request<S: SendingStream>(
    send: &mut S,
    method: &str,
    path: &str,
) -> Result<(), ProtocolError> {
    let line = RequestLine::new(method, path).map_err(ProtocolError::InvalidRequest)?;
    send.write_all(&line.encode())
        .await
        .map_err(ProtocolError::Write)?;
    send.shutdown().await.map_err(ProtocolError::Write)?;
    trace!("sent request {line}");
    Ok(())
}

/// Wraps the read half as the response body
pub fn read_response_body<R: ReceivingStream>(recv: R) -> ResponseBody<R> {
    ResponseBody {
        inner: recv,
        received: 0,
    }
}

/// Sends a request on a fresh stream and returns its response body.
///
/// The request, including the end of the write half, is flushed before any of the body is read.
pub async fn request<S: SendingStream, R: ReceivingStream>(
    stream: SendReceivePair<S, R>,
    method: &str,
    path: &str,
) -> Result<ResponseBody<R>, ProtocolError> {
    let SendReceivePair { mut send, recv } = stream;
    send_request(&mut send, method, path).await?;
    Ok(read_response_body(recv))
}

/// A response body: finite, read once, ends when the responder finishes its stream.
///
/// Bytes already delivered stay delivered if a later read fails.
#[derive(Debug)]
pub struct ResponseBody<R> {
    inner: R,
    received: u64,
}

impl<R: ReceivingStream> ResponseBody<R> {
    /// Number of body bytes read so far
    #[must_use]
    pub fn bytes_received(&self) -> u64 {
        self.received
    }

    /// Copies the rest of the body to `sink`, returning the number of bytes copied
    pub async fn copy_to<W: AsyncWrite + Unpin + ?Sized>(
        &mut self,
        sink: &mut W,
    ) -> Result<u64, ProtocolError> {
        tokio::io::copy(self, sink)
            .await
            .map_err(ProtocolError::Transport)
    }

    /// Converts into a `Stream` of `Bytes` chunks
    pub fn into_stream(self) -> ReaderStream<Self> {
        ReaderStream::new(self)
    }
}

impl<R: ReceivingStream> AsyncRead for ResponseBody<R> {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        let before = buf.filled().len();
        let result = Pin::new(&mut this.inner).poll_read(cx, buf);
        if let Poll::Ready(Ok(())) = result {
            this.received += (buf.filled().len() - before) as u64;
        }
        result
    }
}
