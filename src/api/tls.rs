use axum_server::tls_rustls::RustlsConfig;
use rustls::server::{ClientHello, ResolvesServerCert};
use rustls::sign::CertifiedKey;
use rustls::ServerConfig;
use std::sync::Arc;
use crate::config::TlsConfig;

/// Resolver for a listener that has no certificate: every handshake fails,
/// but the socket still binds.
#[derive(Debug)]
struct NoCertificates;

impl ResolvesServerCert for NoCertificates {
    fn resolve(&self, _client_hello: ClientHello<'_>) -> Option<Arc<CertifiedKey>> {
        None
    }
}

pub fn empty_config() -> RustlsConfig {
    let config = ServerConfig::builder()
        .with_no_client_auth()
        .with_cert_resolver(Arc::new(NoCertificates));
    RustlsConfig::from_config(Arc::new(config))
}

/// Loads the PEM certificate bundle and key. A failure is logged and an empty
/// certificate set is served instead of aborting startup.
pub async fn load_or_empty(tls: &TlsConfig) -> RustlsConfig {
    match RustlsConfig::from_pem_file(&tls.cert_path, &tls.key_path).await {
        Ok(config) => {
            tracing::info!("✓ Loaded certificate {}", tls.cert_path.display());
            config
        }
        Err(e) => {
            tracing::warn!(
                "loading certificates from {} failed: {}; serving without certificates",
                tls.cert_path.display(),
                e
            );
            empty_config()
        }
    }
}

/// Installs the process-wide rustls crypto provider. Safe to call repeatedly.
pub fn install_crypto_provider() {
    let _ = rustls::crypto::aws_lc_rs::default_provider().install_default();
}
