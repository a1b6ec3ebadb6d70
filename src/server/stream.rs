//! Handler for a single request stream
// (c) 2024 Ross Younger

use std::{io, path::Path};

use tokio::{fs::File, io::BufReader};
use tracing::{debug, trace};

use crate::{
    h09::{ProtocolError, Request, receive_request, respond_error, respond_ok},
    protocol::{ReceivingStream, SendReceivePair, SendingStream},
    util::resolve_under,
};

/// Name served when a request names a directory
const INDEX_FILE: &str = "index.html";

/// Reads one request from the stream and answers it from the files under `root`.
///
/// Anything that goes wrong before the first body byte is answered with an empty response.
pub async fn handle_stream<S, R>(
    sp: SendReceivePair<S, R>,
    root: &Path,
) -> Result<(), ProtocolError>
where
    S: SendingStream,
    R: ReceivingStream,
{
    let SendReceivePair { mut send, mut recv } = sp;
    let request = match receive_request(&mut recv).await {
        Ok(r) => r,
        Err(e) => {
            debug!("unreadable request: {e}");
            return respond_error(&mut send, e.failure()).await;
        }
    };

    let mut file = match open_resource(&request, root).await {
        Ok(f) => BufReader::new(f),
        Err(e) => {
            debug!("{request}: {e}");
            return respond_error(&mut send, e.failure()).await;
        }
    };
    let sent = respond_ok(&mut send, &mut file).await?;
    debug!("{request}: sent {sent} bytes");
    Ok(())
}

/// Maps a request onto a readable file
async fn open_resource(request: &Request, root: &Path) -> Result<File, ProtocolError> {
    if request.method() != "GET" {
        return Err(ProtocolError::UnsupportedMethod(
            request.method().to_string(),
        ));
    }
    let url_path = request
        .path()
        .split(['?', '#'])
        .next()
        .unwrap_or_default();
    let mut path = resolve_under(root, url_path)?;
    let not_found = |e: io::Error| {
        if e.kind() == io::ErrorKind::NotFound {
            ProtocolError::NotFound(url_path.to_string())
        } else {
            ProtocolError::Transport(e)
        }
    };

    let meta = tokio::fs::metadata(&path).await.map_err(not_found)?;
    if meta.is_dir() {
        path.push(INDEX_FILE);
        trace!("directory requested, trying {}", path.display());
    }
    let file = File::open(&path).await.map_err(not_found)?;
    if !file.metadata().await.map_err(not_found)?.is_file() {
        return Err(ProtocolError::NotFound(url_path.to_string()));
    }
    Ok(file)
}
