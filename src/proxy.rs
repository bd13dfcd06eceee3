//! Transport Adapter contract: yields a connected TCP stream to
//! `(destination_host, destination_port)`, optionally through a proxy.
//! Proxy negotiation is opaque to the control channel — once `connect`
//! returns, the stream's peer is the FTP server as far as the rest of
//! this crate is concerned.

use crate::error::{FtpError, FtpResult};
use crate::types::ProxyConfig;
use async_trait::async_trait;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

#[async_trait]
pub trait TransportAdapter: Send + Sync {
    async fn connect(&self, host: &str, port: u16) -> FtpResult<TcpStream>;
}

pub fn adapter_for(config: &ProxyConfig) -> Box<dyn TransportAdapter> {
    match config {
        ProxyConfig::Direct => Box::new(DirectAdapter),
        ProxyConfig::HttpConnect {
            host,
            port,
            username,
            password,
        } => Box::new(HttpConnectAdapter {
            proxy_host: host.clone(),
            proxy_port: *port,
            username: username.clone(),
            password: password.clone(),
        }),
        ProxyConfig::Socks4 {
            host,
            port,
            user_id,
        } => Box::new(Socks4Adapter {
            proxy_host: host.clone(),
            proxy_port: *port,
            user_id: user_id.clone().unwrap_or_default(),
        }),
        ProxyConfig::Socks5 {
            host,
            port,
            username,
            password,
        } => Box::new(Socks5Adapter {
            proxy_host: host.clone(),
            proxy_port: *port,
            username: username.clone(),
            password: password.clone(),
        }),
    }
}

/// No proxy: a direct TCP connection to the destination.
pub struct DirectAdapter;

#[async_trait]
impl TransportAdapter for DirectAdapter {
    async fn connect(&self, host: &str, port: u16) -> FtpResult<TcpStream> {
        TcpStream::connect((host, port))
            .await
            .map_err(|e| FtpError::connection(format!("TCP connect to {}:{}: {}", host, port, e)))
    }
}

async fn connect_to_proxy(proxy_host: &str, proxy_port: u16) -> FtpResult<TcpStream> {
    TcpStream::connect((proxy_host, proxy_port))
        .await
        .map_err(|e| {
            FtpError::connection(format!(
                "TCP connect to proxy {}:{}: {}",
                proxy_host, proxy_port, e
            ))
        })
}

/// HTTP `CONNECT` tunnel, with optional Basic auth.
pub struct HttpConnectAdapter {
    pub proxy_host: String,
    pub proxy_port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
}

#[async_trait]
impl TransportAdapter for HttpConnectAdapter {
    async fn connect(&self, host: &str, port: u16) -> FtpResult<TcpStream> {
        let mut stream = connect_to_proxy(&self.proxy_host, self.proxy_port).await?;

        let mut request = format!(
            "CONNECT {host}:{port} HTTP/1.1\r\nHost: {host}:{port}\r\n",
            host = host,
            port = port
        );
        if let (Some(user), Some(pass)) = (&self.username, &self.password) {
            let token = base64::Engine::encode(
                &base64::engine::general_purpose::STANDARD,
                format!("{}:{}", user, pass),
            );
            request.push_str(&format!("Proxy-Authorization: Basic {}\r\n", token));
        }
        request.push_str("\r\n");

        stream
            .write_all(request.as_bytes())
            .await
            .map_err(|e| FtpError::connection(format!("CONNECT request: {}", e)))?;

        let status_line = read_http_status_line(&mut stream).await?;
        let code: u16 = status_line
            .split_whitespace()
            .nth(1)
            .and_then(|s| s.parse().ok())
            .ok_or_else(|| FtpError::connection(format!("malformed CONNECT reply: {}", status_line)))?;
        if !(200..300).contains(&code) {
            return Err(FtpError::connection(format!(
                "proxy refused CONNECT: {}",
                status_line
            )));
        }
        drain_http_headers(&mut stream).await?;
        Ok(stream)
    }
}

async fn read_http_status_line(stream: &mut TcpStream) -> FtpResult<String> {
    let mut line = Vec::new();
    let mut byte = [0u8; 1];
    loop {
        let n = stream
            .read(&mut byte)
            .await
            .map_err(|e| FtpError::connection(format!("reading CONNECT status: {}", e)))?;
        if n == 0 {
            return Err(FtpError::connection("proxy closed connection during CONNECT"));
        }
        if byte[0] == b'\n' {
            break;
        }
        if byte[0] != b'\r' {
            line.push(byte[0]);
        }
    }
    Ok(String::from_utf8_lossy(&line).to_string())
}

async fn drain_http_headers(stream: &mut TcpStream) -> FtpResult<()> {
    let mut seen = [0u8; 4];
    let mut byte = [0u8; 1];
    loop {
        let n = stream
            .read(&mut byte)
            .await
            .map_err(|e| FtpError::connection(format!("reading CONNECT headers: {}", e)))?;
        if n == 0 {
            return Err(FtpError::connection("proxy closed connection during CONNECT"));
        }
        seen.rotate_left(1);
        seen[3] = byte[0];
        if &seen == b"\r\n\r\n" {
            break;
        }
    }
    Ok(())
}

/// SOCKS4 / SOCKS4a (domain-name variant selected automatically when the
/// destination host does not parse as an IPv4 address).
pub struct Socks4Adapter {
    pub proxy_host: String,
    pub proxy_port: u16,
    pub user_id: String,
}

#[async_trait]
impl TransportAdapter for Socks4Adapter {
    async fn connect(&self, host: &str, port: u16) -> FtpResult<TcpStream> {
        let mut stream = connect_to_proxy(&self.proxy_host, self.proxy_port).await?;

        let mut request = vec![0x04, 0x01];
        request.extend_from_slice(&port.to_be_bytes());

        let is_socks4a = host.parse::<std::net::Ipv4Addr>().is_err();
        if is_socks4a {
            request.extend_from_slice(&[0, 0, 0, 1]);
        } else {
            let ip: std::net::Ipv4Addr = host.parse().unwrap();
            request.extend_from_slice(&ip.octets());
        }
        request.extend_from_slice(self.user_id.as_bytes());
        request.push(0);
        if is_socks4a {
            request.extend_from_slice(host.as_bytes());
            request.push(0);
        }

        stream
            .write_all(&request)
            .await
            .map_err(|e| FtpError::connection(format!("SOCKS4 request: {}", e)))?;

        let mut reply = [0u8; 8];
        stream
            .read_exact(&mut reply)
            .await
            .map_err(|e| FtpError::connection(format!("SOCKS4 reply: {}", e)))?;
        if reply[1] != 0x5a {
            return Err(FtpError::connection(format!(
                "SOCKS4 connect rejected, status 0x{:02x}",
                reply[1]
            )));
        }
        Ok(stream)
    }
}

/// SOCKS5 with optional username/password sub-negotiation (RFC 1929).
pub struct Socks5Adapter {
    pub proxy_host: String,
    pub proxy_port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
}

#[async_trait]
impl TransportAdapter for Socks5Adapter {
    async fn connect(&self, host: &str, port: u16) -> FtpResult<TcpStream> {
        let mut stream = connect_to_proxy(&self.proxy_host, self.proxy_port).await?;

        let use_auth = self.username.is_some();
        let methods: &[u8] = if use_auth { &[0x00, 0x02] } else { &[0x00] };
        let mut greeting = vec![0x05, methods.len() as u8];
        greeting.extend_from_slice(methods);
        stream
            .write_all(&greeting)
            .await
            .map_err(|e| FtpError::connection(format!("SOCKS5 greeting: {}", e)))?;

        let mut chosen = [0u8; 2];
        stream
            .read_exact(&mut chosen)
            .await
            .map_err(|e| FtpError::connection(format!("SOCKS5 method select: {}", e)))?;
        if chosen[0] != 0x05 {
            return Err(FtpError::connection("SOCKS5 proxy replied with wrong version"));
        }

        match chosen[1] {
            0x00 => {}
            0x02 => self.authenticate(&mut stream).await?,
            0xff => return Err(FtpError::connection("SOCKS5 proxy rejected all auth methods")),
            m => return Err(FtpError::connection(format!("unsupported SOCKS5 method 0x{:02x}", m))),
        }

        let mut request = vec![0x05, 0x01, 0x00];
        if let Ok(ip) = host.parse::<std::net::Ipv4Addr>() {
            request.push(0x01);
            request.extend_from_slice(&ip.octets());
        } else if let Ok(ip) = host.parse::<std::net::Ipv6Addr>() {
            request.push(0x04);
            request.extend_from_slice(&ip.octets());
        } else {
            request.push(0x03);
            request.push(host.len() as u8);
            request.extend_from_slice(host.as_bytes());
        }
        request.extend_from_slice(&port.to_be_bytes());

        stream
            .write_all(&request)
            .await
            .map_err(|e| FtpError::connection(format!("SOCKS5 connect request: {}", e)))?;

        let mut reply_head = [0u8; 4];
        stream
            .read_exact(&mut reply_head)
            .await
            .map_err(|e| FtpError::connection(format!("SOCKS5 connect reply: {}", e)))?;
        if reply_head[1] != 0x00 {
            return Err(FtpError::connection(format!(
                "SOCKS5 connect rejected, status 0x{:02x}",
                reply_head[1]
            )));
        }
        let skip = match reply_head[3] {
            0x01 => 4 + 2,
            0x04 => 16 + 2,
            0x03 => {
                let mut len_buf = [0u8; 1];
                stream
                    .read_exact(&mut len_buf)
                    .await
                    .map_err(|e| FtpError::connection(format!("SOCKS5 bound addr len: {}", e)))?;
                len_buf[0] as usize + 2
            }
            a => return Err(FtpError::connection(format!("unknown SOCKS5 address type 0x{:02x}", a))),
        };
        let mut discard = vec![0u8; skip];
        stream
            .read_exact(&mut discard)
            .await
            .map_err(|e| FtpError::connection(format!("SOCKS5 bound addr: {}", e)))?;

        Ok(stream)
    }
}

impl Socks5Adapter {
    async fn authenticate(&self, stream: &mut TcpStream) -> FtpResult<()> {
        let user = self.username.as_deref().unwrap_or("");
        let pass = self.password.as_deref().unwrap_or("");
        let mut request = vec![0x01, user.len() as u8];
        request.extend_from_slice(user.as_bytes());
        request.push(pass.len() as u8);
        request.extend_from_slice(pass.as_bytes());

        stream
            .write_all(&request)
            .await
            .map_err(|e| FtpError::connection(format!("SOCKS5 auth request: {}", e)))?;

        let mut reply = [0u8; 2];
        stream
            .read_exact(&mut reply)
            .await
            .map_err(|e| FtpError::connection(format!("SOCKS5 auth reply: {}", e)))?;
        if reply[1] != 0x00 {
            return Err(FtpError::connection("SOCKS5 authentication failed"));
        }
        Ok(())
    }
}
