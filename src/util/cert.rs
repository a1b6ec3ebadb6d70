//! X509 certificate management helper
// (c) 2024 Ross Younger

use std::path::Path;

use anyhow::{Context as _, Result};
use rustls_pki_types::{CertificateDer, PrivateKeyDer, PrivatePkcs8KeyDer, pem::PemObject as _};
use tracing::{debug, trace};

use crate::config::Configuration;

/// In-memory representation of the server's TLS identity
#[allow(missing_debug_implementations)]
pub struct Credentials {
    chain: Vec<CertificateDer<'static>>,
    key: PrivateKeyDer<'static>,
    /// Where the credentials came from, for diagnostics
    pub origin: String,
}

impl Credentials {
    /// Generates a self-certified keypair for this host and `localhost`
    pub fn generate() -> Result<Self> {
        let hostname = gethostname::gethostname()
            .into_string()
            .unwrap_or("unknown.host.invalid".to_string());
        trace!("Creating certificate with hostname {hostname}");
        let certified = rcgen::generate_simple_self_signed([hostname.clone(), "localhost".into()])?;
        Ok(Self {
            chain: vec![certified.cert.der().clone()],
            key: PrivateKeyDer::Pkcs8(PrivatePkcs8KeyDer::from(
                certified.key_pair.serialize_der(),
            )),
            origin: format!("self-signed for {hostname}"),
        })
    }

    /// Loads a certificate chain and private key from PEM files
    pub fn load(cert_file: &Path, key_file: &Path) -> Result<Self> {
        let chain = CertificateDer::pem_file_iter(cert_file)
            .with_context(|| format!("reading certificate file {}", cert_file.display()))?
            .collect::<Result<Vec<_>, _>>()
            .with_context(|| format!("parsing certificate file {}", cert_file.display()))?;
        anyhow::ensure!(
            !chain.is_empty(),
            "no certificates found in {}",
            cert_file.display()
        );
        let key = PrivateKeyDer::from_pem_file(key_file)
            .with_context(|| format!("reading private key file {}", key_file.display()))?;
        Ok(Self {
            chain,
            key,
            origin: cert_file.display().to_string(),
        })
    }

    /// Obtains the credentials the configuration asks for
    pub fn from_config(config: &Configuration) -> Result<Self> {
        let creds = if config.generate_cert {
            Self::generate()?
        } else {
            Self::load(&config.cert_file, &config.key_file)?
        };
        debug!("using TLS credentials: {}", creds.origin);
        Ok(creds)
    }

    /// The certificate chain, leaf first
    #[must_use]
    pub fn certificate_chain(&self) -> Vec<CertificateDer<'static>> {
        self.chain.clone()
    }

    /// The private key in DER format
    #[must_use]
    pub fn private_key(&self) -> PrivateKeyDer<'static> {
        self.key.clone_key()
    }
}
