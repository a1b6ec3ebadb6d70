// (c) 2024 Ross Younger

//! Responder side

use tokio::io::{AsyncBufReadExt as _, AsyncRead, AsyncReadExt as _, AsyncWriteExt as _, BufReader};
use tracing::{debug, trace, warn};

use super::{Failure, ProtocolError};
use crate::protocol::{
    ErrorCode, MAX_REQUEST_LINE, ReceivingStream, RequestLine, RequestLineError, SendingStream,
    StreamControlError,
};

/// Reads and parses the request line from a stream
pub async fn receive_request<R: ReceivingStream>(
    recv: &mut R,
) -> Result<RequestLine, ProtocolError> {
    // room for the terminator, plus one byte to detect overlong lines
    let limit = MAX_REQUEST_LINE as u64 + 3;
    let mut reader = BufReader::new(recv.take(limit));
    let mut line = Vec::new();
    let n = reader
        .read_until(b'\n', &mut line)
        .await
        .map_err(ProtocolError::Transport)?;
    if !line.ends_with(b"\n") {
        return Err(if n as u64 >= limit {
            ProtocolError::MalformedRequest(RequestLineError::TooLong)
        } else {
            ProtocolError::IncompleteRequest
        });
    }
    let request = RequestLine::parse(&line).map_err(ProtocolError::MalformedRequest)?;
    trace!("received request {request}");
    Ok(request)
}

/// Sends `body` as the response, then finishes the stream.
///
/// If the body cannot be copied in full, the stream is reset with [`ErrorCode::INTERNAL`]
/// instead of being finished. A stream that does not support reset is finished regardless,
/// so the peer cannot tell the body was cut short. Returns the number of bytes sent.
pub async fn respond_ok<S, B>(send: &mut S, body: &mut B) -> Result<u64, ProtocolError>
where
    S: SendingStream,
    B: AsyncRead + Unpin + ?Sized,
{
    match tokio::io::copy(body, send).await {
        Ok(n) => {
            send.shutdown().await.map_err(ProtocolError::Write)?;
            Ok(n)
        }
        Err(e) => {
            warn!("response failed part way: {e}");
            match send.reset(ErrorCode::INTERNAL) {
                Ok(()) | Err(StreamControlError::Closed) => (),
                Err(StreamControlError::NotImplemented(_)) => {
                    // best we can do is to end the stream
                    let _ = send.shutdown().await;
                }
            }
            Err(ProtocolError::Transport(e))
        }
    }
}

/// Answers a failed request with an empty response
pub async fn respond_error<S: SendingStream>(
    send: &mut S,
    failure: Failure,
) -> Result<(), ProtocolError> {
    debug!("request failed: {failure}");
    send.shutdown().await.map_err(ProtocolError::Write)
}

#[cfg(test)]
mod test {
    use std::{
        io,
        pin::Pin,
        task::{Context, Poll},
    };

    use pretty_assertions::assert_eq;
    use tokio::io::{AsyncRead, AsyncReadExt as _, AsyncWrite, AsyncWriteExt as _, ReadBuf};

    use super::{receive_request, respond_error, respond_ok};
    use crate::{
        h09::{Failure, ProtocolError},
        protocol::{ErrorCode, MAX_REQUEST_LINE, RequestLineError, SendingStream, StreamControlError},
    };

    #[tokio::test]
    async fn receives_request() {
        let mut recv = tokio_test::io::Builder::new()
            .read(b"GET /ind")
            .read(b"ex.html\r\n")
            .build();
        let req = receive_request(&mut recv).await.unwrap();
        assert_eq!(req.method(), "GET");
        assert_eq!(req.path(), "/index.html");
    }

    #[tokio::test]
    async fn bare_newline_accepted() {
        let mut recv = tokio_test::io::Builder::new().read(b"GET /a\n").build();
        assert_eq!(receive_request(&mut recv).await.unwrap().path(), "/a");
    }

    #[tokio::test]
    async fn incomplete_request() {
        let mut empty = tokio_test::io::Builder::new().build();
        assert!(matches!(
            receive_request(&mut empty).await,
            Err(ProtocolError::IncompleteRequest)
        ));
        let mut unterminated = tokio_test::io::Builder::new().read(b"GET /a").build();
        assert!(matches!(
            receive_request(&mut unterminated).await,
            Err(ProtocolError::IncompleteRequest)
        ));
    }

    #[tokio::test]
    async fn malformed_request() {
        let mut recv = tokio_test::io::Builder::new().read(b"GET\r\n").build();
        assert!(matches!(
            receive_request(&mut recv).await,
            Err(ProtocolError::MalformedRequest(RequestLineError::MissingPath))
        ));
    }

    #[tokio::test]
    async fn overlong_request() {
        let (mut tx, mut rx) = tokio::io::duplex(1024);
        let writer = tokio::spawn(async move {
            let mut line = b"GET /".to_vec();
            line.resize(MAX_REQUEST_LINE * 2, b'a');
            // the reader gives up early; the write may fail once it has gone
            let _ = tx.write_all(&line).await;
        });
        assert!(matches!(
            receive_request(&mut rx).await,
            Err(ProtocolError::MalformedRequest(RequestLineError::TooLong))
        ));
        drop(rx);
        writer.await.unwrap();
    }

    #[tokio::test]
    async fn ok_response_finishes() {
        let (mut tx, mut rx) = tokio::io::duplex(64);
        let mut body: &[u8] = b"0123456789";
        assert_eq!(respond_ok(&mut tx, &mut body).await.unwrap(), 10);
        drop(tx);
        let mut got = Vec::new();
        let _ = rx.read_to_end(&mut got).await.unwrap();
        assert_eq!(got, b"0123456789");
    }

    #[tokio::test]
    async fn error_response_is_empty() {
        let (mut tx, mut rx) = tokio::io::duplex(64);
        respond_error(&mut tx, Failure::NotFound).await.unwrap();
        let mut got = Vec::new();
        let _ = rx.read_to_end(&mut got).await.unwrap();
        assert!(got.is_empty());
    }

    /// Records writes and resets
    #[derive(Default)]
    struct Recorder {
        written: Vec<u8>,
        reset: Option<ErrorCode>,
        finished: bool,
    }

    impl AsyncWrite for Recorder {
        fn poll_write(
            self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
            buf: &[u8],
        ) -> Poll<io::Result<usize>> {
            self.get_mut().written.extend_from_slice(buf);
            Poll::Ready(Ok(buf.len()))
        }
        fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
            Poll::Ready(Ok(()))
        }
        fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
            self.get_mut().finished = true;
            Poll::Ready(Ok(()))
        }
    }

    impl SendingStream for Recorder {
        fn reset(&mut self, code: ErrorCode) -> Result<(), StreamControlError> {
            self.reset = Some(code);
            Ok(())
        }
    }

    /// Yields some bytes, then fails
    struct Flaky(bool);

    impl AsyncRead for Flaky {
        fn poll_read(
            self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
            buf: &mut ReadBuf<'_>,
        ) -> Poll<io::Result<()>> {
            let this = self.get_mut();
            if this.0 {
                Poll::Ready(Err(io::Error::other("disk on fire")))
            } else {
                this.0 = true;
                buf.put_slice(b"half");
                Poll::Ready(Ok(()))
            }
        }
    }

    #[tokio::test]
    async fn truncated_response_is_reset() {
        let mut send = Recorder::default();
        let result = respond_ok(&mut send, &mut Flaky(false)).await;
        assert!(matches!(result, Err(ProtocolError::Transport(_))));
        assert_eq!(send.written, b"half");
        assert_eq!(send.reset, Some(ErrorCode::INTERNAL));
        assert!(!send.finished);
    }

    #[tokio::test]
    async fn truncated_response_without_reset_capability_is_finished() {
        let (mut tx, mut rx) = tokio::io::duplex(64);
        let result = respond_ok(&mut tx, &mut Flaky(false)).await;
        assert!(matches!(result, Err(ProtocolError::Transport(_))));
        drop(tx);
        let mut got = Vec::new();
        let _ = rx.read_to_end(&mut got).await.unwrap();
        assert_eq!(got, b"half");
    }
}
