//! TLS and QUIC endpoint configuration
// (c) 2024 Ross Younger

use std::sync::Arc;

use quinn::{
    VarIntBoundsExceeded,
    crypto::rustls::{NoInitialCipherSuite, QuicClientConfig, QuicServerConfig},
    rustls::{
        self, DigitallySignedStruct, SignatureScheme,
        client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier},
        crypto::CryptoProvider,
        pki_types::{CertificateDer, ServerName, UnixTime},
    },
};
use tracing::{debug, trace};

use crate::{config::Configuration, util::Credentials};

/// ALPN protocol identifier used by both sides
pub const ALPN: &[u8] = b"wt-h09";

/// Problems building an endpoint configuration
#[derive(Debug, thiserror::Error)]
pub enum EndpointConfigError {
    /// The TLS stack refused the configuration or credentials
    #[error("TLS configuration: {0}")]
    Tls(#[from] rustls::Error),
    /// No TLS 1.3 cipher suite usable for QUIC
    #[error(transparent)]
    CipherSuite(#[from] NoInitialCipherSuite),
    /// A transport parameter was out of range
    #[error("transport parameter out of range: {0}")]
    Transport(#[from] VarIntBoundsExceeded),
}

fn provider() -> Arc<CryptoProvider> {
    Arc::new(rustls::crypto::ring::default_provider())
}

/// Creates the client-side configuration.
///
/// The interop runner issues throwaway certificates, so the server's certificate is not
/// verified; handshake signatures still are.
pub fn client_config(config: &Configuration) -> Result<quinn::ClientConfig, EndpointConfigError> {
    let provider = provider();
    let mut tls_config = rustls::ClientConfig::builder_with_provider(provider.clone())
        .with_protocol_versions(&[&rustls::version::TLS13])?
        .dangerous()
        .with_custom_certificate_verifier(Arc::new(SkipServerVerification(provider)))
        .with_no_client_auth();
    tls_config.alpn_protocols = vec![ALPN.to_vec()];
    if config.keylog {
        tls_config.key_log = Arc::new(rustls::KeyLogFile::new());
    }

    let mut client_cfg = quinn::ClientConfig::new(Arc::new(QuicClientConfig::try_from(tls_config)?));
    let _ = client_cfg.transport_config(crate::transport::create_config(config)?);
    trace!("client config ready");
    Ok(client_cfg)
}

/// Creates the server-side configuration
pub fn server_config(
    config: &Configuration,
    credentials: &Credentials,
) -> Result<quinn::ServerConfig, EndpointConfigError> {
    let mut tls_config = rustls::ServerConfig::builder_with_provider(provider())
        .with_protocol_versions(&[&rustls::version::TLS13])?
        .with_no_client_auth()
        .with_single_cert(credentials.certificate_chain(), credentials.private_key())?;
    tls_config.alpn_protocols = vec![ALPN.to_vec()];
    tls_config.max_early_data_size = u32::MAX;
    if config.keylog {
        tls_config.key_log = Arc::new(rustls::KeyLogFile::new());
    }

    let qsc = QuicServerConfig::try_from(tls_config)?;
    let mut server_cfg = quinn::ServerConfig::with_crypto(Arc::new(qsc));
    let _ = server_cfg.transport_config(crate::transport::create_config(config)?);
    debug!("server config ready ({})", credentials.origin);
    Ok(server_cfg)
}

/// Accepts any server certificate, but checks handshake signatures
#[derive(Debug)]
struct SkipServerVerification(Arc<CryptoProvider>);

impl ServerCertVerifier for SkipServerVerification {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp: &[u8],
        _now: UnixTime,
    ) -> Result<ServerCertVerified, rustls::Error> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        rustls::crypto::verify_tls12_signature(
            message,
            cert,
            dss,
            &self.0.signature_verification_algorithms,
        )
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        rustls::crypto::verify_tls13_signature(
            message,
            cert,
            dss,
            &self.0.signature_verification_algorithms,
        )
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.0.signature_verification_algorithms.supported_schemes()
    }
}
