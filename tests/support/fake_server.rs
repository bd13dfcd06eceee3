//! Minimal in-process FTP control/data server for integration tests.
//!
//! Each test owns its own control-channel script (the exact reply
//! sequence the scenario in spec.md §8 calls for); this module only
//! supplies the socket plumbing: spawn a listener, hand the accepted
//! stream to the test's handler, and small `send`/`expect` helpers for
//! talking RFC 959 lines over a `TcpStream`.

use std::net::SocketAddr;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};

/// Bind a control-channel listener on an ephemeral loopback port and run
/// `handler` against the first accepted connection in a background task.
/// Returns the address clients should connect to.
pub async fn spawn_control<F, Fut>(handler: F) -> SocketAddr
where
    F: FnOnce(TcpStream) -> Fut + Send + 'static,
    Fut: std::future::Future<Output = ()> + Send + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind control listener");
    let addr = listener.local_addr().expect("control listener addr");
    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.expect("accept control connection");
        handler(stream).await;
    });
    addr
}

/// Bind an ephemeral data-channel listener up front (so its port can be
/// embedded in a `227`/`229` reply before the client connects) and return
/// both the listener and the PASV-style six-octet argument string for
/// `127.0.0.1`.
pub async fn bind_pasv_listener() -> (TcpListener, String) {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind data listener");
    let port = listener.local_addr().expect("data listener addr").port();
    let args = format!("127,0,0,1,{},{}", port / 256, port % 256);
    (listener, args)
}

/// Read one line (command) off the control channel, stripped of CRLF.
pub async fn read_line(reader: &mut BufReader<tokio::net::tcp::OwnedReadHalf>) -> String {
    let mut line = String::new();
    reader.read_line(&mut line).await.expect("read control line");
    line.trim_end_matches(['\r', '\n']).to_string()
}

/// Write one reply line, appending CRLF.
pub async fn send_line(writer: &mut tokio::net::tcp::OwnedWriteHalf, line: &str) {
    writer
        .write_all(format!("{}\r\n", line).as_bytes())
        .await
        .expect("write control line");
}
