//! TLS session management for Explicit and Implicit FTPS (RFC 4217).
//!
//! Builds a `rustls`-backed `tokio_rustls::TlsConnector`, runs the
//! standard WebPKI chain validation, and then always hands the outcome to
//! the caller-supplied `CertificateValidator` — mirroring
//! `(certificate, chain, policy_errors) -> accept` from the external
//! interfaces section. `always_accept_server_certificate` only changes
//! what happens when WebPKI validation itself fails; the callback still
//! runs either way.

use crate::error::{FtpError, FtpResult};
use crate::protocol::{FtpCodec, ReadHalf, WriteHalf};
use crate::types::SecurityProtocol;
use rustls::client::danger::{
    HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier,
};
use rustls::client::WebPkiServerVerifier;
use rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use rustls::{ClientConfig, DigitallySignedStruct, RootCertStore, SignatureScheme};
use std::fmt;
use std::sync::Arc;
use tokio::net::TcpStream;
use tokio_rustls::{client::TlsStream, TlsConnector};

/// Caller hook for certificate acceptance decisions. Always invoked,
/// whether or not standard WebPKI validation passed; `policy_errors` is
/// empty on a clean pass.
pub trait CertificateValidator: Send + Sync {
    fn validate(
        &self,
        end_entity: &CertificateDer<'static>,
        chain: &[CertificateDer<'static>],
        policy_errors: &[String],
    ) -> bool;
}

/// Default validator: accept iff WebPKI validation passed.
pub struct DefaultCertificateValidator;

impl CertificateValidator for DefaultCertificateValidator {
    fn validate(
        &self,
        _end_entity: &CertificateDer<'static>,
        _chain: &[CertificateDer<'static>],
        policy_errors: &[String],
    ) -> bool {
        policy_errors.is_empty()
    }
}

fn load_root_store() -> FtpResult<RootCertStore> {
    let mut store = RootCertStore::empty();
    let native = rustls_native_certs::load_native_certs();
    for err in &native.errors {
        log::warn!("native cert store load error: {}", err);
    }
    for cert in native.certs {
        // A handful of malformed platform certs are routinely present;
        // skip them rather than fail the whole connector.
        let _ = store.add(cert);
    }
    Ok(store)
}

struct CallbackVerifier {
    inner: Arc<WebPkiServerVerifier>,
    validator: Arc<dyn CertificateValidator>,
    always_accept: bool,
}

impl fmt::Debug for CallbackVerifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallbackVerifier").finish()
    }
}

impl ServerCertVerifier for CallbackVerifier {
    fn verify_server_cert(
        &self,
        end_entity: &CertificateDer<'static>,
        intermediates: &[CertificateDer<'static>],
        server_name: &ServerName<'static>,
        ocsp_response: &[u8],
        now: UnixTime,
    ) -> Result<ServerCertVerified, rustls::Error> {
        if self.always_accept {
            return Ok(ServerCertVerified::assertion());
        }

        let outcome = self
            .inner
            .verify_server_cert(end_entity, intermediates, server_name, ocsp_response, now);

        let policy_errors: Vec<String> = match &outcome {
            Ok(_) => Vec::new(),
            Err(e) => vec![e.to_string()],
        };

        let accepted = self
            .validator
            .validate(end_entity, intermediates, &policy_errors);

        if accepted {
            Ok(ServerCertVerified::assertion())
        } else {
            Err(rustls::Error::General(
                "server certificate rejected by validator".into(),
            ))
        }
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'static>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        self.inner.verify_tls12_signature(message, cert, dss)
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'static>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        self.inner.verify_tls13_signature(message, cert, dss)
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.inner.supported_verify_schemes()
    }
}

pub fn build_client_config(
    validator: Arc<dyn CertificateValidator>,
    always_accept_server_certificate: bool,
) -> FtpResult<ClientConfig> {
    let root_store = load_root_store()?;
    let inner = WebPkiServerVerifier::builder(Arc::new(root_store))
        .build()
        .map_err(|e| FtpError::tls(format!("failed to build certificate verifier: {}", e)))?;

    let verifier = CallbackVerifier {
        inner,
        validator,
        always_accept: always_accept_server_certificate,
    };

    let mut config = ClientConfig::builder()
        .with_root_certificates(RootCertStore::empty())
        .with_no_client_auth();
    config
        .dangerous()
        .set_certificate_verifier(Arc::new(verifier));
    Ok(config)
}

/// Reject `SecurityProtocol` variants `rustls` cannot negotiate before
/// ever touching the socket.
pub fn ensure_supported(protocol: SecurityProtocol) -> FtpResult<()> {
    if protocol.is_none() || protocol.is_supported() {
        Ok(())
    } else {
        Err(FtpError::tls(format!(
            "{:?} is not negotiable by this build (rustls supports TLS 1.2/1.3 only)",
            protocol
        )))
    }
}

/// Upgrade an existing **plain** control connection to TLS. Called after
/// a successful `AUTH TLS`/`AUTH SSL` 234 reply, or immediately at
/// connect time for implicit security.
pub async fn upgrade_to_tls(
    codec: FtpCodec,
    host: &str,
    validator: Arc<dyn CertificateValidator>,
    always_accept_server_certificate: bool,
) -> FtpResult<FtpCodec> {
    let tcp = reunite_plain(codec)?;
    let tls = connect_tls(tcp, host, validator, always_accept_server_certificate).await?;
    Ok(FtpCodec::from_tls(tls))
}

/// Wrap a freshly connected data-channel socket in TLS, reusing the same
/// validation policy as the control channel.
pub async fn wrap_data_stream(
    tcp: TcpStream,
    host: &str,
    validator: Arc<dyn CertificateValidator>,
    always_accept_server_certificate: bool,
) -> FtpResult<TlsStream<TcpStream>> {
    connect_tls(tcp, host, validator, always_accept_server_certificate).await
}

async fn connect_tls(
    tcp: TcpStream,
    host: &str,
    validator: Arc<dyn CertificateValidator>,
    always_accept_server_certificate: bool,
) -> FtpResult<TlsStream<TcpStream>> {
    let config = build_client_config(validator, always_accept_server_certificate)?;
    let connector = TlsConnector::from(Arc::new(config));
    let server_name = ServerName::try_from(host.to_string())
        .map_err(|e| FtpError::tls(format!("invalid server name '{}': {}", host, e)))?;
    connector
        .connect(server_name, tcp)
        .await
        .map_err(|e| FtpError::tls(format!("TLS handshake failed: {}", e)))
}

fn reunite_plain(codec: FtpCodec) -> FtpResult<TcpStream> {
    let rd = match codec.reader {
        ReadHalf::Plain(br) => br.into_inner(),
        ReadHalf::Tls(_) => {
            return Err(FtpError::protocol(
                "cannot upgrade: connection is already TLS",
                None,
            ))
        }
    };
    let wr = match codec.writer {
        WriteHalf::Plain(w) => w,
        WriteHalf::Tls(_) => {
            return Err(FtpError::protocol(
                "cannot upgrade: connection is already TLS",
                None,
            ))
        }
    };
    rd.reunite(wr)
        .map_err(|e| FtpError::protocol(format!("reunite failed: {}", e), None))
}
