//! RusTLS setup for our HTTPS clients.

use rustls::{ClientConfig, RootCertStore};
use rustls_native_certs::load_native_certs;

use crate::common::*;

/// Make aws-lc-rs the process-wide rustls provider. `gcp_auth` pulls in
/// `ring` as well, and rustls refuses to choose between them.
pub(crate) fn install_crypto_provider() {
    if rustls::crypto::aws_lc_rs::default_provider()
        .install_default()
        .is_err()
    {
        trace!("rustls crypto provider already installed");
    }
}

/// Build a `reqwest` client which trusts the operating system's root
/// certificates.
pub(crate) fn https_client() -> Result<reqwest::Client> {
    let mut root_store = RootCertStore::empty();
    let cert_result = load_native_certs();
    for cert in cert_result.certs {
        root_store
            .add(cert)
            .context("could not add certificate to cert store")?;
    }
    if let Some(err) = cert_result.errors.into_iter().next() {
        if root_store.is_empty() {
            return Err(err).context("error loading native certs");
        }
        // Some systems ship a few unreadable certs next to plenty of good ones.
        warn!("ignoring error loading native certs: {}", err);
    }
    let tls_config = ClientConfig::builder()
        .with_root_certificates(root_store)
        .with_no_client_auth();
    reqwest::Client::builder()
        .use_preconfigured_tls(tls_config)
        .build()
        .context("could not build HTTPS client")
}
