//! Configures the QUIC transport layer from user settings
// (c) 2024 Ross Younger

use std::{sync::Arc, time::Duration};

use quinn::{IdleTimeout, TransportConfig, VarInt, VarIntBoundsExceeded};
use tracing::trace;

use crate::config::Configuration;

/// Keepalive interval for the QUIC connection
pub(crate) const PROTOCOL_KEEPALIVE: Duration = Duration::from_secs(5);

/// Datagram buffer size, in each direction
const DATAGRAM_BUFFER_SIZE: usize = 1024 * 1024;

/// Creates a `quinn::TransportConfig` for the endpoint setup
pub fn create_config(params: &Configuration) -> Result<Arc<TransportConfig>, VarIntBoundsExceeded> {
    let idle = IdleTimeout::try_from(params.idle_timeout())?;
    let keepalive = PROTOCOL_KEEPALIVE.min(params.idle_timeout() / 2);

    let mut config = TransportConfig::default();
    let _ = config
        .max_concurrent_bidi_streams(VarInt::from_u32(params.max_streams))
        .max_concurrent_uni_streams(0u8.into())
        .keep_alive_interval(Some(keepalive))
        .max_idle_timeout(Some(idle))
        .datagram_receive_buffer_size(Some(DATAGRAM_BUFFER_SIZE))
        .datagram_send_buffer_size(DATAGRAM_BUFFER_SIZE);

    trace!(
        "transport: streams={} idle={:?} keepalive={keepalive:?}",
        params.max_streams,
        params.idle_timeout()
    );
    Ok(config.into())
}

#[cfg(test)]
mod test {
    use super::create_config;
    use crate::config::Configuration;

    #[test]
    fn default_config_is_valid() {
        let _ = create_config(&Configuration::system_default()).unwrap();
    }

    #[test]
    fn oversized_idle_timeout_is_rejected() {
        let mut c = Configuration::system_default();
        c.idle_timeout = u64::MAX / 1000;
        assert!(create_config(&c).is_err());
    }
}
