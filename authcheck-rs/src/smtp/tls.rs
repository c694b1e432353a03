//! TLS client setup for STARTTLS upgrades

use rustls::{ClientConfig, OwnedTrustAnchor, RootCertStore};
use std::sync::Arc;
use tokio_rustls::TlsConnector;

use crate::error::{AuthCheckError, Result};

/// Connector trusting the bundled web PKI roots.
///
/// Certificates are verified normally, so an upgrade that fails here means
/// the server's certificate would not be accepted by a verifying sender.
pub fn client_connector() -> TlsConnector {
    let mut root_store = RootCertStore::empty();
    root_store.add_trust_anchors(webpki_roots::TLS_SERVER_ROOTS.iter().map(|ta| {
        OwnedTrustAnchor::from_subject_spki_name_constraints(
            ta.subject,
            ta.spki,
            ta.name_constraints,
        )
    }));

    let config = ClientConfig::builder()
        .with_safe_defaults()
        .with_root_certificates(root_store)
        .with_no_client_auth();

    TlsConnector::from(Arc::new(config))
}

/// Name presented in SNI and checked against the certificate
pub fn server_name(host: &str) -> Result<rustls::ServerName> {
    rustls::ServerName::try_from(host)
        .map_err(|e| AuthCheckError::Tls(format!("Invalid TLS server name {}: {}", host, e)))
}
