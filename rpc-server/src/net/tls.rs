//! Server- and client-side TLS configuration builders.
//!
//! Both builders produce plain `rustls` config types; callers plug them into
//! whatever transport they use (`tokio_rustls::TlsAcceptor`, `hyper-rustls`,
//! etc.). Certificates and keys are consumed already-parsed
//! (`rustls::pki_types::CertificateDer`/`PrivateKeyDer`) — this module never
//! parses PEM/DER itself.
//!
//! Both builders pin the crypto provider to a fixed cipher suite and curve
//! (key-exchange group) list and a TLS 1.2 floor, rather than taking whatever
//! `rustls`'s own defaults happen to be, so the negotiated parameters don't
//! silently drift across a `rustls` upgrade. The curve list is the `ring`
//! provider's supported subset of the framework's preferred order
//! (P-384, P-256, X25519) -- `ring` has no secp521r1 (P-521) implementation,
//! so that curve is never negotiable under this provider regardless of peer
//! support.

use std::sync::Arc;

use rustls::crypto::CryptoProvider;
use rustls::crypto::ring as ring_provider;
use rustls::pki_types::{CertificateDer, PrivateKeyDer};
use rustls::version::{TLS12, TLS13};
use rustls::{ClientConfig, RootCertStore, ServerConfig, SupportedCipherSuite};

#[derive(Debug, thiserror::Error)]
pub enum TlsConfigError {
    #[error("failed to build TLS config: {0}")]
    Rustls(#[source] rustls::Error),
    #[error("failed to load native root certificates: {0}")]
    NativeRoots(#[source] std::io::Error),
}

/// Default ALPN protocol preference: HTTP/2 only, matching the framework's
/// HTTP/2-native RPC transport. Set on the server config only -- a client
/// doesn't get to dictate ALPN, it just negotiates whatever the server
/// offers.
pub const DEFAULT_ALPN_PROTOCOLS: &[&[u8]] = &[b"h2"];

/// The modern ECDHE-ECDSA/RSA-AES-GCM and ChaCha20-Poly1305 suites, TLS 1.3
/// first.
const DEFAULT_CIPHER_SUITES: &[SupportedCipherSuite] = &[
    ring_provider::cipher_suite::TLS13_AES_256_GCM_SHA384,
    ring_provider::cipher_suite::TLS13_CHACHA20_POLY1305_SHA256,
    ring_provider::cipher_suite::TLS13_AES_128_GCM_SHA256,
    ring_provider::cipher_suite::TLS_ECDHE_ECDSA_WITH_AES_256_GCM_SHA384,
    ring_provider::cipher_suite::TLS_ECDHE_ECDSA_WITH_CHACHA20_POLY1305_SHA256,
    ring_provider::cipher_suite::TLS_ECDHE_ECDSA_WITH_AES_128_GCM_SHA256,
    ring_provider::cipher_suite::TLS_ECDHE_RSA_WITH_AES_256_GCM_SHA384,
    ring_provider::cipher_suite::TLS_ECDHE_RSA_WITH_CHACHA20_POLY1305_SHA256,
    ring_provider::cipher_suite::TLS_ECDHE_RSA_WITH_AES_128_GCM_SHA256,
];

/// Curve preference order: P-384, P-256, X25519. The `ring` provider doesn't
/// implement secp521r1 (P-521), so it's omitted rather than silently ignored
/// at negotiation time.
fn default_kx_groups() -> Vec<&'static dyn rustls::crypto::SupportedKxGroup> {
    vec![
        ring_provider::kx_group::SECP384R1,
        ring_provider::kx_group::SECP256R1,
        ring_provider::kx_group::X25519,
    ]
}

fn default_crypto_provider() -> CryptoProvider {
    CryptoProvider {
        cipher_suites: DEFAULT_CIPHER_SUITES.to_vec(),
        kx_groups: default_kx_groups(),
        ..ring_provider::default_provider()
    }
}

/// Build a server-side TLS config from an already-parsed certificate chain
/// and private key. Enables ALPN negotiation for `h2`, pins the cipher/curve
/// lists above, and floors the protocol version at TLS 1.2.
///
/// If `client_cas` is non-empty, the policy becomes "require and verify
/// client certificate" with those CAs as the trust anchor; an empty list
/// means no client auth is requested.
pub fn server_tls_config(
    cert_chain: Vec<CertificateDer<'static>>,
    key: PrivateKeyDer<'static>,
    client_cas: Vec<CertificateDer<'static>>,
) -> Result<ServerConfig, TlsConfigError> {
    let provider = Arc::new(default_crypto_provider());

    let versions = ServerConfig::builder_with_provider(provider.clone())
        .with_protocol_versions(&[&TLS12, &TLS13])
        .map_err(TlsConfigError::Rustls)?;

    let builder = if client_cas.is_empty() {
        versions.with_no_client_auth()
    } else {
        let mut roots = RootCertStore::empty();
        for ca in client_cas {
            roots.add(ca).map_err(TlsConfigError::Rustls)?;
        }
        let verifier = rustls::server::WebPkiClientVerifier::builder_with_provider(Arc::new(roots), provider)
            .build()
            .map_err(|e| TlsConfigError::Rustls(rustls::Error::General(e.to_string())))?;
        versions.with_client_cert_verifier(verifier)
    };

    let mut config = builder
        .with_single_cert(cert_chain, key)
        .map_err(TlsConfigError::Rustls)?;
    config.alpn_protocols = DEFAULT_ALPN_PROTOCOLS.iter().map(|p| p.to_vec()).collect();
    Ok(config)
}

/// Build a client-side TLS config.
///
/// `extra_roots` are added on top of the platform's native trust store (via
/// `rustls-native-certs`); pass an empty `Vec` to trust only the native
/// store. Pins the same cipher/curve lists and TLS 1.2 floor as
/// [`server_tls_config`], but -- unlike the server variant -- does not set
/// ALPN: ALPN is the server's call to make, and a client offering a narrower
/// protocol list than its peer supports can only make negotiation fail.
/// `danger_accept_invalid_certs` disables certificate verification entirely
/// and must never be set outside local development/testing.
pub fn client_tls_config(extra_roots: Vec<CertificateDer<'static>>) -> Result<ClientConfig, TlsConfigError> {
    let mut roots = RootCertStore::empty();

    let native = rustls_native_certs::load_native_certs();
    for err in native.errors {
        tracing::warn!(target: "rpc_server", %err, "failed to load a native root certificate");
    }
    for cert in native.certs {
        let _ = roots.add(cert);
    }
    for cert in extra_roots {
        roots.add(cert).map_err(TlsConfigError::Rustls)?;
    }

    let provider = Arc::new(default_crypto_provider());
    let config = ClientConfig::builder_with_provider(provider)
        .with_protocol_versions(&[&TLS12, &TLS13])
        .map_err(TlsConfigError::Rustls)?
        .with_root_certificates(roots)
        .with_no_client_auth();
    Ok(config)
}

/// A [`rustls::client::danger::ServerCertVerifier`] that accepts any
/// certificate. Exposed only for local development against self-signed
/// certificates; never enable this against a production endpoint.
pub fn insecure_client_config() -> ClientConfig {
    let provider = Arc::new(default_crypto_provider());
    let mut config = ClientConfig::builder_with_provider(provider)
        .with_protocol_versions(&[&TLS12, &TLS13])
        .expect("TLS12 and TLS13 are both supported by the pinned provider")
        .dangerous()
        .with_custom_certificate_verifier(Arc::new(NoVerifier))
        .with_no_client_auth();
    config.alpn_protocols = DEFAULT_ALPN_PROTOCOLS.iter().map(|p| p.to_vec()).collect();
    config
}

#[derive(Debug)]
struct NoVerifier;

impl rustls::client::danger::ServerCertVerifier for NoVerifier {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &rustls::pki_types::ServerName<'_>,
        _ocsp_response: &[u8],
        _now: rustls::pki_types::UnixTime,
    ) -> Result<rustls::client::danger::ServerCertVerified, rustls::Error> {
        Ok(rustls::client::danger::ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &rustls::DigitallySignedStruct,
    ) -> Result<rustls::client::danger::HandshakeSignatureValid, rustls::Error> {
        Ok(rustls::client::danger::HandshakeSignatureValid::assertion())
    }

    fn verify_tls13_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &rustls::DigitallySignedStruct,
    ) -> Result<rustls::client::danger::HandshakeSignatureValid, rustls::Error> {
        Ok(rustls::client::danger::HandshakeSignatureValid::assertion())
    }

    fn supported_verify_schemes(&self) -> Vec<rustls::SignatureScheme> {
        ring_provider::default_provider()
            .signature_verification_algorithms
            .supported_schemes()
    }
}
