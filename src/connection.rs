//! Control-channel transport establishment: Transport Adapter connect,
//! implicit-FTPS wrapping, and the connect-timeout policy from
//! `FtpConnectionConfig`.

use crate::error::{FtpError, FtpResult};
use crate::protocol::FtpCodec;
use crate::proxy::TransportAdapter;
use crate::tls::{self, CertificateValidator};
use crate::types::{FtpConnectionConfig, Response};
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;

/// Establish the control connection and return a ready-to-use codec,
/// the server welcome banner, and the control-channel peer IP (needed
/// later for the PASV NAT-rewrite heuristic).
///
/// For Explicit FTPS the caller issues `AUTH TLS` themselves afterward
/// (handled in `client.rs`); this only covers the Implicit case, where
/// TLS wraps the socket before the banner is read at all.
pub async fn connect(
    config: &FtpConnectionConfig,
    adapter: &dyn TransportAdapter,
    validator: Arc<dyn CertificateValidator>,
) -> FtpResult<(FtpCodec, Response, IpAddr)> {
    let dur = Duration::from_secs(config.connect_timeout_sec);

    let tcp = timeout(dur, adapter.connect(&config.host, config.port))
        .await
        .map_err(|_| {
            FtpError::connection(format!(
                "connect to {}:{} timed out",
                config.host, config.port
            ))
        })??;

    tcp.set_nodelay(true).ok();
    let peer_ip = tcp
        .peer_addr()
        .map_err(|e| FtpError::connection(format!("peer_addr: {}", e)))?
        .ip();

    if config.security.is_implicit() {
        let tls = timeout(
            dur,
            tls::wrap_data_stream(
                tcp,
                &config.host,
                validator,
                config.always_accept_server_certificate,
            ),
        )
        .await
        .map_err(|_| FtpError::tls("implicit TLS handshake timed out"))??;
        let mut codec = FtpCodec::from_tls(tls);
        let banner = timeout(dur, codec.read_response())
            .await
            .map_err(|_| FtpError::connection("timed out waiting for the server greeting"))??;
        Ok((codec, banner, peer_ip))
    } else {
        let mut codec = FtpCodec::from_tcp(tcp);
        let banner = timeout(dur, codec.read_response())
            .await
            .map_err(|_| FtpError::connection("timed out waiting for the server greeting"))??;
        Ok((codec, banner, peer_ip))
    }
}
