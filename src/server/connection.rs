//! Handler for an incoming connection as a whole
// (c) 2024 Ross Younger

use std::sync::Arc;

use tracing::{Instrument as _, debug, trace, trace_span};

use super::{Settings, handle_stream};
use crate::session::{Session, SessionAcceptor};

pub(super) async fn handle_incoming(
    incoming: quinn::Incoming,
    settings: Arc<Settings>,
) -> anyhow::Result<()> {
    let connection = incoming.await?;
    debug!(
        "accepted QUIC connection from {}",
        connection.remote_address()
    );

    let mut acceptor = SessionAcceptor::new(connection);
    while let Some(request) = acceptor.next().await {
        let settings = Arc::clone(&settings);
        let _j = tokio::spawn(async move {
            match request.accept(&settings.upgrade_path).await {
                Ok(session) => {
                    let span = trace_span!("session", id = session.id().as_u64());
                    serve_session(session, settings).instrument(span).await;
                }
                Err(e) => debug!("session not established: {e}"),
            }
        });
    }
    debug!(
        "connection from {} closed: {}",
        acceptor.connection().remote_address(),
        acceptor
            .connection()
            .close_reason()
            .map_or_else(|| "no reason given".into(), |r| r.to_string())
    );
    Ok(())
}

/// Serves request streams until the session ends
async fn serve_session(session: Session, settings: Arc<Settings>) {
    loop {
        let stream = match session.accept_stream().await {
            Ok(s) => s,
            Err(e) => {
                debug!("session {} ended: {e}", session.id());
                return;
            }
        };
        let id = stream.send.id();
        trace!("accepted stream {id}");
        let settings = Arc::clone(&settings);
        let _j = tokio::spawn(
            async move {
                if let Err(e) = handle_stream(stream, &settings.www).await {
                    debug!("stream handler failed: {e}");
                }
            }
            .instrument(trace_span!("stream", id)),
        );
    }
}
