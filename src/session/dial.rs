// (c) 2024 Ross Younger

//! Client side of session establishment

use std::{
    collections::HashMap,
    net::{Ipv4Addr, Ipv6Addr, SocketAddr},
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    time::Duration,
};

use quinn::{Connection, Endpoint};
use tokio::{
    io::AsyncWriteExt as _,
    net::lookup_host,
    time::{Instant, timeout, timeout_at},
};
use tracing::{debug, trace};
use url::{Host, Url};

use super::{DialError, Session, SessionError, SessionId, UpgradeError, demux::Demux, stream};
use crate::{
    config::Configuration,
    endpoint::{EndpointConfigError, client_config},
    protocol::{ErrorCode, RequestHead, ResponseHead, read_head},
};

/// Where to dial, worked out from a URL
#[derive(Debug, Clone, PartialEq, Eq)]
struct Target {
    /// Host for name resolution and TLS server name
    host: String,
    port: u16,
    /// `host:port` as it appears in the URL, for the `host` header
    authority: String,
    /// Path and query for the upgrade request
    path: String,
}

impl Target {
    fn from_url(url: &Url) -> Result<Self, DialError> {
        let invalid = |reason| DialError::InvalidUrl {
            url: url.to_string(),
            reason,
        };
        if url.scheme() != "https" {
            return Err(invalid("scheme must be https"));
        }
        let host = match url.host() {
            Some(Host::Domain(d)) => d.to_string(),
            Some(Host::Ipv4(a)) => a.to_string(),
            Some(Host::Ipv6(a)) => a.to_string(),
            None => return Err(invalid("no host")),
        };
        let port = url.port_or_known_default().unwrap_or(443);
        let authority = format!("{}:{port}", url.host_str().unwrap_or_default());
        let path = match url.query() {
            Some(q) => format!("{}?{q}", url.path()),
            None => url.path().to_string(),
        };
        Ok(Self {
            host,
            port,
            authority,
            path,
        })
    }
}

/// A connection ready for an upgrade exchange
struct Connected {
    connection: Connection,
    demux: Arc<Demux>,
    /// Opened by this dial rather than reused
    fresh: bool,
}

#[derive(Debug, Default)]
struct State {
    endpoints: Vec<Endpoint>,
    connections: HashMap<String, (Connection, Arc<Demux>)>,
    closed: bool,
}

/// Establishes sessions with servers.
///
/// Connections are reused: dialling the same authority twice yields two sessions over one
/// connection. Dropping the dialer closes everything it opened.
#[derive(Debug)]
pub struct Dialer {
    client_config: quinn::ClientConfig,
    deadline: Duration,
    state: Mutex<State>,
}

impl Dialer {
    /// Constructor. The configuration supplies TLS settings and the dial timeout.
    pub fn new(config: &Configuration) -> Result<Self, EndpointConfigError> {
        Ok(Self {
            client_config: client_config(config)?,
            deadline: config.dial_timeout(),
            state: Mutex::new(State::default()),
        })
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Connects (if not already connected) and establishes a session at `url`.
    ///
    /// The dial timeout covers the whole operation. If it expires, the connection attempt is
    /// abandoned and [`UpgradeError::Timeout`] returned.
    pub async fn dial(&self, url: &Url) -> Result<Session, UpgradeError> {
        let target = Target::from_url(url)?;
        let deadline = Instant::now() + self.deadline;

        let Ok(connected) = timeout_at(deadline, self.connection_for(&target)).await else {
            debug!("timed out connecting to {}", target.authority);
            return Err(UpgradeError::Timeout);
        };
        let Connected {
            connection,
            demux,
            fresh,
        } = connected?;

        match timeout_at(deadline, upgrade(&connection, &demux, &target)).await {
            Ok(result) => result,
            Err(_) => {
                debug!("timed out establishing session at {url}");
                // a reused connection may carry other sessions
                if fresh {
                    connection.close(
                        quinn::VarInt::from_u32(ErrorCode::NO_ERROR.0),
                        b"session establishment timed out",
                    );
                    self.forget(&target.authority, &connection);
                }
                Err(UpgradeError::Timeout)
            }
        }
    }

    /// Drops `connection` from the reuse table, if it is still the entry for `authority`
    fn forget(&self, authority: &str, connection: &Connection) {
        let mut state = self.lock();
        if state
            .connections
            .get(authority)
            .is_some_and(|(c, _)| c.stable_id() == connection.stable_id())
        {
            let _ = state.connections.remove(authority);
        }
    }

    async fn connection_for(&self, target: &Target) -> Result<Connected, DialError> {
        if let Some((conn, demux)) = self.lock().connections.get(&target.authority) {
            if conn.close_reason().is_none() {
                trace!("reusing connection to {}", target.authority);
                return Ok(Connected {
                    connection: conn.clone(),
                    demux: Arc::clone(demux),
                    fresh: false,
                });
            }
        }

        let addr = lookup_host((target.host.as_str(), target.port))
            .await
            .map_err(|source| DialError::Resolve {
                host: target.host.clone(),
                source,
            })?
            .next()
            .ok_or_else(|| DialError::NoAddress(target.host.clone()))?;
        let endpoint = self.endpoint_for(addr)?;

        debug!("connecting to {addr} as {}", target.host);
        let connection = endpoint
            .connect_with(self.client_config.clone(), addr, &target.host)?
            .await?;
        debug!(
            "connected to {} (ALPN ok, stable id {})",
            connection.remote_address(),
            connection.stable_id()
        );
        let demux = Demux::start(&connection);

        let mut state = self.lock();
        if state.closed {
            connection.close(0u8.into(), b"dialer closed");
            return Err(DialError::Closed);
        }
        let _ = state.connections.insert(
            target.authority.clone(),
            (connection.clone(), Arc::clone(&demux)),
        );
        Ok(Connected {
            connection,
            demux,
            fresh: true,
        })
    }

    /// Returns a client endpoint of the same address family as `addr`, creating it if needed
    fn endpoint_for(&self, addr: SocketAddr) -> Result<Endpoint, DialError> {
        let mut state = self.lock();
        if state.closed {
            return Err(DialError::Closed);
        }
        let same_family = |ep: &&Endpoint| {
            ep.local_addr()
                .is_ok_and(|local| local.is_ipv4() == addr.is_ipv4())
        };
        if let Some(ep) = state.endpoints.iter().find(same_family) {
            return Ok(ep.clone());
        }
        let bind: SocketAddr = if addr.is_ipv4() {
            (Ipv4Addr::UNSPECIFIED, 0).into()
        } else {
            (Ipv6Addr::UNSPECIFIED, 0).into()
        };
        let endpoint = Endpoint::client(bind).map_err(DialError::Bind)?;
        trace!("bound client endpoint {:?}", endpoint.local_addr());
        state.endpoints.push(endpoint.clone());
        Ok(endpoint)
    }

    /// Closes all connections and endpoints. Calling this more than once is harmless.
    pub fn close(&self) {
        let mut state = self.lock();
        if !state.closed {
            debug!("closing dialer");
        }
        state.closed = true;
        for (conn, _) in state.connections.values() {
            conn.close(0u8.into(), b"done");
        }
        state.connections.clear();
        for ep in &state.endpoints {
            ep.close(0u8.into(), b"done");
        }
    }

    /// Waits up to `limit` for closed connections to finish their shutdown with the peer
    pub async fn wait_idle(&self, limit: Duration) {
        let endpoints = self.lock().endpoints.clone();
        for ep in endpoints {
            if timeout(limit, ep.wait_idle()).await.is_err() {
                debug!("endpoint did not go idle within {limit:?}");
            }
        }
    }
}

impl Drop for Dialer {
    fn drop(&mut self) {
        self.close();
    }
}

async fn upgrade(
    connection: &Connection,
    demux: &Arc<Demux>,
    target: &Target,
) -> Result<Session, UpgradeError> {
    let (send, recv) = connection.open_bi().await.map_err(SessionError::from)?;
    let mut control = stream::wrap(send, recv);
    // routed from before the request goes out, so whatever the server sends
    // straight after accepting is queued rather than refused
    let id = SessionId::from_stream_id(control.send.id());
    let (routes, registration) = demux.register(id).ok_or(SessionError::Closed)?;

    let request = RequestHead::connect(&target.authority, &target.path).encode()?;
    control
        .send
        .write_all(&request)
        .await
        .map_err(UpgradeError::Stream)?;

    let response = ResponseHead::parse(&read_head(&mut control.recv).await?)?;
    if !response.status.is_success() {
        debug!("server refused session at {}: {}", target.path, response.status);
        return Err(UpgradeError::Rejected(response.status));
    }
    let session = Session::establish(connection.clone(), Arc::clone(demux), control, routes);
    registration.keep();
    debug!("session {} established at {}", session.id(), target.path);
    Ok(session)
}
