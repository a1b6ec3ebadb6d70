//! Server event loop
// (c) 2024 Ross Younger

use std::{net::SocketAddr, path::PathBuf, sync::Arc};

use quinn::Endpoint;
use tokio::task::JoinSet;
use tracing::{Instrument as _, debug, error, error_span, info, trace};

use crate::{
    config::Configuration,
    endpoint::{EndpointConfigError, server_config},
    util::Credentials,
};

mod connection;
mod stream;
pub use stream::handle_stream;

/// Problems starting the server
#[derive(Debug, thiserror::Error)]
pub enum ServeError {
    /// The listening socket could not be bound
    #[error("could not listen on {addr}: {source}")]
    Bind {
        /// Requested address
        addr: SocketAddr,
        /// Underlying error
        source: std::io::Error,
    },
    /// TLS or transport configuration was unusable
    #[error(transparent)]
    Config(#[from] EndpointConfigError),
}

/// What every connection handler needs to know
#[derive(Debug)]
pub(crate) struct Settings {
    pub(crate) upgrade_path: String,
    pub(crate) www: PathBuf,
}

/// A listening server.
///
/// Accepts any number of connections, each carrying any number of sessions, each
/// carrying any number of concurrent request streams.
#[derive(Debug)]
pub struct Server {
    endpoint: Endpoint,
    settings: Arc<Settings>,
}

impl Server {
    /// Binds the listening endpoint
    pub fn bind(config: &Configuration, credentials: &Credentials) -> Result<Self, ServeError> {
        let server_cfg = server_config(config, credentials)?;
        let endpoint =
            Endpoint::server(server_cfg, config.listen).map_err(|source| ServeError::Bind {
                addr: config.listen,
                source,
            })?;
        Ok(Self {
            endpoint,
            settings: Arc::new(Settings {
                upgrade_path: config.upgrade_path.clone(),
                www: config.www.clone(),
            }),
        })
    }

    /// The address actually bound, which is useful when listening on port 0
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.endpoint.local_addr()
    }

    /// Accepts connections until the server is closed
    pub async fn serve(&self) -> Result<(), ServeError> {
        let mut tasks = JoinSet::new();
        while let Some(incoming) = self.endpoint.accept().await {
            while tasks.try_join_next().is_some() {}
            let settings = Arc::clone(&self.settings);
            let _ = tasks.spawn(async move {
                if let Err(e) = connection::handle_incoming(incoming, settings).await {
                    error!("connection failed: {e}");
                }
                trace!("connection completed");
            });
        }
        debug!("endpoint closed; waiting for connections to finish");
        let _ = tasks.join_all().await;
        Ok(())
    }

    /// Stops accepting and closes all connections
    pub fn close(&self) {
        self.endpoint.close(0u8.into(), b"server shutting down");
    }
}

/// Runs the server until the endpoint is closed
pub async fn server_main(config: &Configuration) -> anyhow::Result<()> {
    let credentials = Credentials::from_config(config)?;
    let server = Server::bind(config, &credentials)?;
    info!(
        "listening on {} for sessions at {}, serving {}",
        server.local_addr()?,
        config.upgrade_path,
        config.www.display()
    );
    server
        .serve()
        .instrument(error_span!("SERVER"))
        .await?;
    server.endpoint.wait_idle().await;
    Ok(())
}
