//! TLS acceptor setup.
//!
//! A [`ServerCertificate`] is loaded from PEM material and turned into a rustls acceptor. When a
//! [`CertificateValidator`] is supplied, clients are asked for a certificate and the validator
//! decides whether the handshake may proceed; clients that present none are still accepted.

use rustls::client::danger::HandshakeSignatureValid;
use rustls::crypto::{CryptoProvider, ring};
use rustls::pki_types::{CertificateDer, PrivateKeyDer, UnixTime};
use rustls::server::danger::{ClientCertVerified, ClientCertVerifier};
use rustls::{CertificateError, DigitallySignedStruct, DistinguishedName, ServerConfig, SignatureScheme};
use std::fmt;
use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tokio_rustls::TlsAcceptor;

/// Decides whether a client certificate is acceptable.
///
/// Called with the end-entity certificate and the intermediates the client sent.
pub type CertificateValidator = Arc<dyn Fn(&CertificateDer<'_>, &[CertificateDer<'_>]) -> bool + Send + Sync>;

#[derive(Error, Debug)]
pub enum TlsError {
    #[error("can't read {path}: {source}")]
    Io { path: PathBuf, source: io::Error },

    #[error("no certificate found in {source_name}")]
    MissingCertificate { source_name: String },

    #[error("no private key found in {source_name}")]
    MissingPrivateKey { source_name: String },

    #[error("invalid pem data in {source_name}: {source}")]
    InvalidPem { source_name: String, source: io::Error },

    #[error("invalid tls configuration: {source}")]
    Config {
        #[from]
        source: rustls::Error,
    },
}

/// A server certificate chain and its private key.
#[derive(Debug)]
pub struct ServerCertificate {
    chain: Vec<CertificateDer<'static>>,
    key: PrivateKeyDer<'static>,
}

impl ServerCertificate {
    pub fn new(chain: Vec<CertificateDer<'static>>, key: PrivateKeyDer<'static>) -> Self {
        Self { chain, key }
    }

    /// Loads a PEM certificate chain and a PEM private key (PKCS#1, PKCS#8 or SEC1).
    pub fn from_pem_files(chain_path: &Path, key_path: &Path) -> Result<Self, TlsError> {
        let chain = read_certs(open(chain_path)?, chain_path.display())?;
        let key = read_private_key(open(key_path)?, key_path.display())?;
        Ok(Self { chain, key })
    }

    pub fn from_pem(chain: &[u8], key: &[u8]) -> Result<Self, TlsError> {
        let chain = read_certs(chain, "certificate pem")?;
        let key = read_private_key(key, "private key pem")?;
        Ok(Self { chain, key })
    }

    pub fn chain(&self) -> &[CertificateDer<'static>] {
        &self.chain
    }

    /// Builds the acceptor, installing `validator` as client certificate verifier if present.
    pub fn acceptor(&self, validator: Option<CertificateValidator>) -> Result<TlsAcceptor, TlsError> {
        let provider = Arc::new(ring::default_provider());
        let builder =
            ServerConfig::builder_with_provider(Arc::clone(&provider)).with_safe_default_protocol_versions()?;

        let builder = match validator {
            Some(validator) => builder.with_client_cert_verifier(Arc::new(CallbackVerifier { validator, provider })),
            None => builder.with_no_client_auth(),
        };

        let config = builder.with_single_cert(self.chain.clone(), self.key.clone_key())?;
        Ok(TlsAcceptor::from(Arc::new(config)))
    }
}

impl Clone for ServerCertificate {
    fn clone(&self) -> Self {
        Self { chain: self.chain.clone(), key: self.key.clone_key() }
    }
}

fn open(path: &Path) -> Result<BufReader<File>, TlsError> {
    File::open(path).map(BufReader::new).map_err(|source| TlsError::Io { path: path.to_owned(), source })
}

fn read_certs(mut reader: impl BufRead, source_name: impl fmt::Display) -> Result<Vec<CertificateDer<'static>>, TlsError> {
    let chain = rustls_pemfile::certs(&mut reader)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|source| TlsError::InvalidPem { source_name: source_name.to_string(), source })?;

    if chain.is_empty() {
        return Err(TlsError::MissingCertificate { source_name: source_name.to_string() });
    }
    Ok(chain)
}

fn read_private_key(mut reader: impl BufRead, source_name: impl fmt::Display) -> Result<PrivateKeyDer<'static>, TlsError> {
    match rustls_pemfile::private_key(&mut reader) {
        Ok(Some(key)) => Ok(key),
        Ok(None) => Err(TlsError::MissingPrivateKey { source_name: source_name.to_string() }),
        Err(source) => Err(TlsError::InvalidPem { source_name: source_name.to_string(), source }),
    }
}

/// Hands client certificates to a [`CertificateValidator`]; signatures are still checked with
/// the provider's algorithms.
struct CallbackVerifier {
    validator: CertificateValidator,
    provider: Arc<CryptoProvider>,
}

impl fmt::Debug for CallbackVerifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallbackVerifier").finish_non_exhaustive()
    }
}

impl ClientCertVerifier for CallbackVerifier {
    fn offer_client_auth(&self) -> bool {
        true
    }

    fn client_auth_mandatory(&self) -> bool {
        false
    }

    fn root_hint_subjects(&self) -> &[DistinguishedName] {
        &[]
    }

    fn verify_client_cert(
        &self,
        end_entity: &CertificateDer<'_>,
        intermediates: &[CertificateDer<'_>],
        _now: UnixTime,
    ) -> Result<ClientCertVerified, rustls::Error> {
        if (self.validator)(end_entity, intermediates) {
            Ok(ClientCertVerified::assertion())
        } else {
            Err(rustls::Error::InvalidCertificate(CertificateError::ApplicationVerificationFailure))
        }
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        rustls::crypto::verify_tls12_signature(message, cert, dss, &self.provider.signature_verification_algorithms)
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        rustls::crypto::verify_tls13_signature(message, cert, dss, &self.provider.signature_verification_algorithms)
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.provider.signature_verification_algorithms.supported_schemes()
    }
}
