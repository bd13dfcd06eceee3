//! Low-level FTP command/response codec (RFC 959 §4).
//!
//! Handles sending commands terminated with `\r\n`, reading single- and
//! multi-line replies, and parsing the 3-digit reply code. Continuation
//! detection is strictly by prefix match on the opening code, per RFC 959.

use crate::error::{FtpError, FtpResult};
use crate::types::{Request, Response};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio_rustls::client::TlsStream;

/// Abstraction over plain TCP or TLS-wrapped read half.
pub enum ReadHalf {
    Plain(BufReader<OwnedReadHalf>),
    Tls(BufReader<tokio::io::ReadHalf<TlsStream<TcpStream>>>),
}

/// Abstraction over plain TCP or TLS-wrapped write half.
pub enum WriteHalf {
    Plain(OwnedWriteHalf),
    Tls(tokio::io::WriteHalf<TlsStream<TcpStream>>),
}

/// The FTP command/response codec operating on split halves.
pub struct FtpCodec {
    pub reader: ReadHalf,
    pub writer: WriteHalf,
}

impl FtpCodec {
    /// Create a codec from a plain TCP stream.
    pub fn from_tcp(stream: TcpStream) -> Self {
        let (rd, wr) = stream.into_split();
        Self {
            reader: ReadHalf::Plain(BufReader::new(rd)),
            writer: WriteHalf::Plain(wr),
        }
    }

    /// Create a codec from a TLS-wrapped TCP stream.
    pub fn from_tls(stream: TlsStream<TcpStream>) -> Self {
        let (rd, wr) = tokio::io::split(stream);
        Self {
            reader: ReadHalf::Tls(BufReader::new(rd)),
            writer: WriteHalf::Tls(wr),
        }
    }

    pub fn is_encrypted(&self) -> bool {
        matches!(self.writer, WriteHalf::Tls(_))
    }

    /// Build the request object for `verb`/`args`, setting `redacted` for
    /// `PASS` so callers can keep it out of logs/events, and send it.
    pub async fn send(&mut self, verb: &str, args: Option<&str>) -> FtpResult<Request> {
        let request = Request::new(verb, args.map(str::to_string));
        let line = match &request.arguments {
            Some(a) => format!("{} {}", request.verb, a),
            None => request.verb.clone(),
        };
        self.send_raw(&line).await?;
        log::trace!(">>> {}", request.display_line());
        Ok(request)
    }

    async fn send_raw(&mut self, line: &str) -> FtpResult<()> {
        let wire = format!("{}\r\n", line);
        match &mut self.writer {
            WriteHalf::Plain(w) => w.write_all(wire.as_bytes()).await?,
            WriteHalf::Tls(w) => w.write_all(wire.as_bytes()).await?,
        }
        Ok(())
    }

    async fn read_line_raw(&mut self) -> FtpResult<String> {
        let mut buf = String::new();
        let n = match &mut self.reader {
            ReadHalf::Plain(r) => r.read_line(&mut buf).await?,
            ReadHalf::Tls(r) => r.read_line(&mut buf).await?,
        };
        if n == 0 {
            return Err(FtpError::ConnectionClosed);
        }
        Ok(buf)
    }

    /// Read a complete FTP response (possibly multi-line):
    /// ```text
    /// 220-Welcome to my FTP server
    /// 220-This is line 2
    /// 220 End of greeting
    /// ```
    /// A continuation line terminates the response only when it begins
    /// with exactly the same three digits followed by a space.
    pub async fn read_response(&mut self) -> FtpResult<Response> {
        let first = self.read_line_raw().await?;
        let mut raw = first.clone();
        let first_trimmed = first.trim_end_matches(['\r', '\n']);

        if first_trimmed.len() < 3 {
            return Err(FtpError::protocol(
                format!("response too short: '{}'", first_trimmed),
                None,
            ));
        }

        let code = parse_code(first_trimmed)?;
        let mut lines = vec![first_trimmed.to_string()];

        let is_multi = first_trimmed.len() >= 4 && first_trimmed.as_bytes()[3] == b'-';
        if is_multi {
            let terminator = format!("{} ", code);
            loop {
                let next = self.read_line_raw().await?;
                raw.push_str(&next);
                let next_trimmed = next.trim_end_matches(['\r', '\n']);
                lines.push(next_trimmed.to_string());
                if next_trimmed.starts_with(&terminator) {
                    break;
                }
            }
        }

        let response = Response::new(code, lines.join("\n"), raw);
        log::trace!(
            "<<< {} {}",
            code,
            lines.last().map(String::as_str).unwrap_or("")
        );
        Ok(response)
    }

    /// Send a command and return the response.
    pub async fn execute(&mut self, verb: &str, args: Option<&str>) -> FtpResult<Response> {
        self.send(verb, args).await?;
        self.read_response().await
    }
}

/// Parse the 3-digit reply code from the start of a line.
fn parse_code(line: &str) -> FtpResult<u16> {
    if line.len() < 3 {
        return Err(FtpError::protocol("response too short for a code", None));
    }
    line[..3]
        .parse::<u16>()
        .map_err(|_| FtpError::protocol(format!("invalid reply code in: '{}'", line), None))
}
