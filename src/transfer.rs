//! Data Channel Factory (RFC 959 §3.3 + RFC 2428).
//!
//! Supports four negotiation modes — **PASV**, **EPSV**, **PORT**,
//! **EPRT** — with the fallback chains spec.md §4.2 requires:
//! EPSV→PASV→PORT for passive preference, EPRT→PORT→PASV for active.
//! A failure of one mode tries the next without surfacing the
//! intermediate error unless every mode in the chain fails.
//!
//! The resulting socket can optionally be TLS-wrapped for FTPS (`PROT P`).

use crate::error::{FtpError, FtpResult};
use crate::events::{FtpEvent, ObserverRegistry};
use crate::protocol::FtpCodec;
use crate::tls::{self, CertificateValidator};
use crate::types::TransferMode;
use regex::Regex;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio::time::{timeout, Duration};
use tokio_rustls::client::TlsStream;

/// Abstraction over a plain or TLS-wrapped data stream.
pub enum DataStream {
    Plain(TcpStream),
    Tls(Box<TlsStream<TcpStream>>),
}

/// Everything `open_data_channel` needs beyond the control codec itself.
pub struct DataChannelOptions<'a> {
    pub mode: TransferMode,
    pub allow_fallback: bool,
    pub control_peer_ip: IpAddr,
    pub host: &'a str,
    pub tls_active: bool,
    pub validator: Arc<dyn CertificateValidator>,
    pub always_accept_server_certificate: bool,
    pub data_timeout: Duration,
    pub active_bind: Option<&'a str>,
    pub observers: &'a ObserverRegistry,
}

/// Open a data channel per the caller's preferred mode, falling back
/// through the chain spec.md §4.2 defines unless disabled.
pub async fn open_data_channel(
    codec: &mut FtpCodec,
    opts: &DataChannelOptions<'_>,
) -> FtpResult<DataStream> {
    let chain: &[TransferMode] = if !opts.allow_fallback {
        std::slice::from_ref(&opts.mode)
    } else {
        match opts.mode {
            TransferMode::ExtendedPassive => {
                &[TransferMode::ExtendedPassive, TransferMode::Passive, TransferMode::Active]
            }
            TransferMode::Passive => &[TransferMode::Passive, TransferMode::Active],
            TransferMode::Active => {
                &[TransferMode::Active, TransferMode::Passive]
            }
        }
    };

    let mut last_err = None;
    let mut tcp = None;
    for (i, candidate) in chain.iter().enumerate() {
        match open_for_mode(codec, *candidate, opts).await {
            Ok(stream) => {
                tcp = Some(stream);
                break;
            }
            Err(e) => {
                if i + 1 < chain.len() {
                    log::warn!("data channel mode {:?} failed, falling back: {}", candidate, e);
                }
                last_err = Some(e);
            }
        }
    }
    let tcp = tcp.ok_or_else(|| last_err.unwrap_or_else(|| FtpError::data_connection("no data channel mode succeeded", None)))?;

    if opts.tls_active {
        let tls = tls::wrap_data_stream(
            tcp,
            opts.host,
            opts.validator.clone(),
            opts.always_accept_server_certificate,
        )
        .await?;
        Ok(DataStream::Tls(Box::new(tls)))
    } else {
        Ok(DataStream::Plain(tcp))
    }
}

async fn open_for_mode(
    codec: &mut FtpCodec,
    mode: TransferMode,
    opts: &DataChannelOptions<'_>,
) -> FtpResult<TcpStream> {
    match mode {
        TransferMode::Passive => {
            open_pasv(codec, opts.control_peer_ip, opts.data_timeout, opts.observers).await
        }
        TransferMode::ExtendedPassive => {
            open_epsv(codec, opts.control_peer_ip, opts.host, opts.data_timeout, opts.observers).await
        }
        TransferMode::Active => {
            // "Active" internally tries EPRT before falling back to PORT,
            // per the EPRT→PORT→PASV chain in spec.md §4.2; the outer
            // `chain` in `open_data_channel` supplies the final →PASV step.
            match open_eprt(codec, opts.active_bind, opts.data_timeout, opts.observers).await {
                Ok(stream) => Ok(stream),
                Err(e) => {
                    log::warn!("EPRT failed, falling back to PORT: {}", e);
                    open_port(codec, opts.active_bind, opts.data_timeout, opts.observers).await
                }
            }
        }
    }
}

/// Send `verb`/`args` and expect a 2xx reply, emitting `RequestSent`/
/// `ResponseReceived` like `FtpClient::exec` does for every other command
/// (spec.md §6) — data-channel negotiation is otherwise invisible on the
/// observer event stream.
async fn expect_2xx(
    codec: &mut FtpCodec,
    verb: &str,
    args: Option<&str>,
    observers: &ObserverRegistry,
) -> FtpResult<String> {
    let request = codec.send(verb, args).await?;
    observers.emit(FtpEvent::RequestSent(&request));
    let resp = codec.read_response().await?;
    observers.emit(FtpEvent::ResponseReceived(&resp));
    if resp.is_success() {
        Ok(resp.text)
    } else {
        Err(FtpError::data_connection(
            format!("{} rejected: {}", verb, resp.text),
            Some(resp),
        ))
    }
}

/// Private, loopback, link-local, or unspecified — the NAT-workaround
/// condition under which the PASV/EPSV advertised host is replaced with
/// the control-channel peer address (spec.md §4.2/§9).
fn is_nat_rewrite_candidate(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => {
            v4.is_private() || v4.is_loopback() || v4.is_link_local() || v4.is_unspecified()
        }
        IpAddr::V6(v6) => v6.is_loopback() || v6.is_unspecified(),
    }
}

// ─── PASV ────────────────────────────────────────────────────────────

async fn open_pasv(
    codec: &mut FtpCodec,
    control_peer_ip: IpAddr,
    data_timeout: Duration,
    observers: &ObserverRegistry,
) -> FtpResult<TcpStream> {
    let text = expect_2xx(codec, "PASV", None, observers).await?;
    let (advertised_ip, port) = parse_pasv_response(&text)?;
    let ip = if is_nat_rewrite_candidate(advertised_ip) {
        control_peer_ip
    } else {
        advertised_ip
    };
    let addr = SocketAddr::new(ip, port);
    timeout(data_timeout, TcpStream::connect(addr))
        .await
        .map_err(|_| FtpError::data_connection("PASV data connect timed out", None))?
        .map_err(|e| FtpError::data_connection(format!("PASV data connect: {}", e), None))
}

/// Parse `(h1,h2,h3,h4,p1,p2)` from a 227 response.
fn parse_pasv_response(text: &str) -> FtpResult<(IpAddr, u16)> {
    let re = Regex::new(r"(\d+),(\d+),(\d+),(\d+),(\d+),(\d+)").unwrap();
    let caps = re
        .captures(text)
        .ok_or_else(|| FtpError::protocol(format!("cannot parse PASV: {}", text), None))?;

    let nums: Vec<u8> = (1..=6)
        .map(|i| {
            caps[i]
                .parse::<u8>()
                .map_err(|_| FtpError::protocol("PASV number out of range", None))
        })
        .collect::<Result<Vec<_>, _>>()?;

    let ip = IpAddr::V4(Ipv4Addr::new(nums[0], nums[1], nums[2], nums[3]));
    let port = (nums[4] as u16) * 256 + (nums[5] as u16);
    Ok((ip, port))
}

// ─── EPSV ────────────────────────────────────────────────────────────

async fn open_epsv(
    codec: &mut FtpCodec,
    control_peer_ip: IpAddr,
    host: &str,
    data_timeout: Duration,
    observers: &ObserverRegistry,
) -> FtpResult<TcpStream> {
    let text = expect_2xx(codec, "EPSV", None, observers).await?;
    let port = parse_epsv_response(&text)?;
    let _ = host;
    let addr = SocketAddr::new(control_peer_ip, port);
    timeout(data_timeout, TcpStream::connect(addr))
        .await
        .map_err(|_| FtpError::data_connection("EPSV data connect timed out", None))?
        .map_err(|e| FtpError::data_connection(format!("EPSV data connect: {}", e), None))
}

fn parse_epsv_response(text: &str) -> FtpResult<u16> {
    let re = Regex::new(r"\|\|\|(\d+)\|").unwrap();
    let caps = re
        .captures(text)
        .ok_or_else(|| FtpError::protocol(format!("cannot parse EPSV: {}", text), None))?;
    caps[1]
        .parse::<u16>()
        .map_err(|_| FtpError::protocol("EPSV port out of range", None))
}

// ─── PORT ────────────────────────────────────────────────────────────

async fn open_port(
    codec: &mut FtpCodec,
    bind_addr: Option<&str>,
    data_timeout: Duration,
    observers: &ObserverRegistry,
) -> FtpResult<TcpStream> {
    let bind = bind_addr.unwrap_or("0.0.0.0");
    let listener = TcpListener::bind(format!("{}:0", bind))
        .await
        .map_err(|e| FtpError::data_connection(format!("PORT bind: {}", e), None))?;
    let local = listener
        .local_addr()
        .map_err(|e| FtpError::data_connection(format!("PORT local_addr: {}", e), None))?;

    let ip = match local.ip() {
        IpAddr::V4(v4) => v4,
        _ => return Err(FtpError::data_connection("PORT requires IPv4", None)),
    };
    let octets = ip.octets();
    let port = local.port();
    let p1 = port / 256;
    let p2 = port % 256;

    let args = format!(
        "{},{},{},{},{},{}",
        octets[0], octets[1], octets[2], octets[3], p1, p2
    );
    expect_2xx(codec, "PORT", Some(&args), observers).await?;

    let (tcp, _) = timeout(data_timeout, listener.accept())
        .await
        .map_err(|_| FtpError::data_connection("PORT accept timed out", None))?
        .map_err(|e| FtpError::data_connection(format!("PORT accept: {}", e), None))?;
    Ok(tcp)
}

// ─── EPRT ────────────────────────────────────────────────────────────

async fn open_eprt(
    codec: &mut FtpCodec,
    bind_addr: Option<&str>,
    data_timeout: Duration,
    observers: &ObserverRegistry,
) -> FtpResult<TcpStream> {
    let bind = bind_addr.unwrap_or("0.0.0.0");
    let listener = TcpListener::bind(format!("{}:0", bind))
        .await
        .map_err(|e| FtpError::data_connection(format!("EPRT bind: {}", e), None))?;
    let local = listener
        .local_addr()
        .map_err(|e| FtpError::data_connection(format!("EPRT local_addr: {}", e), None))?;

    let af = match local.ip() {
        IpAddr::V4(_) => 1,
        IpAddr::V6(_) => 2,
    };
    let args = format!("|{}|{}|{}|", af, local.ip(), local.port());
    expect_2xx(codec, "EPRT", Some(&args), observers).await?;

    let (tcp, _) = timeout(data_timeout, listener.accept())
        .await
        .map_err(|_| FtpError::data_connection("EPRT accept timed out", None))?
        .map_err(|e| FtpError::data_connection(format!("EPRT accept: {}", e), None))?;
    Ok(tcp)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_pasv_response() {
        let (ip, port) = parse_pasv_response("227 Entering Passive Mode (192,0,2,1,19,138)").unwrap();
        assert_eq!(ip, IpAddr::V4(Ipv4Addr::new(192, 0, 2, 1)));
        assert_eq!(port, 19 * 256 + 138);
    }

    #[test]
    fn pasv_nat_rewrite_candidate_detects_private_and_zero() {
        assert!(is_nat_rewrite_candidate(IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1))));
        assert!(is_nat_rewrite_candidate(IpAddr::V4(Ipv4Addr::new(0, 0, 0, 0))));
        assert!(!is_nat_rewrite_candidate(IpAddr::V4(Ipv4Addr::new(
            203, 0, 113, 5
        ))));
    }

    #[test]
    fn parses_epsv_response() {
        let port = parse_epsv_response("229 Entering Extended Passive Mode (|||6446|)").unwrap();
        assert_eq!(port, 6446);
    }
}
