//! Control-channel response parsing: code/group classification, the
//! exact-prefix multiline continuation rule, and bit-exact raw-text
//! round-tripping (spec.md §8).

use ftps_client::protocol::FtpCodec;
use ftps_client::ResponseGroup;
use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpStream};

async fn pair() -> (TcpStream, TcpStream) {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    let (server, client) = tokio::join!(
        async { listener.accept().await.expect("accept").0 },
        async { TcpStream::connect(addr).await.expect("connect") },
    );
    (server, client)
}

#[tokio::test]
async fn single_line_response_code_and_group_match() {
    let (mut server, client) = pair().await;
    let mut codec = FtpCodec::from_tcp(client);

    server
        .write_all(b"230 Logged in\r\n")
        .await
        .expect("write banner");

    let resp = codec.read_response().await.expect("read response");
    assert_eq!(resp.code, Some(230));
    assert_eq!(resp.group, Some(ResponseGroup::PositiveCompletion));
    assert!(resp.raw.starts_with("230"));
}

#[tokio::test]
async fn multiline_response_terminates_on_matching_code_prefix() {
    let (mut server, client) = pair().await;
    let mut codec = FtpCodec::from_tcp(client);

    // The middle line deliberately starts with "220-" rather than the
    // "220 " terminator prefix, so it must be treated as a continuation
    // line rather than ending the response.
    server
        .write_all(b"220-Welcome to the test server\r\n220-Please read the rules\r\n220 Ready\r\n")
        .await
        .expect("write multiline banner");

    let resp = codec.read_response().await.expect("read response");
    assert_eq!(resp.code, Some(220));
    assert_eq!(resp.group, Some(ResponseGroup::PositiveCompletion));
    assert!(resp.text.contains("Welcome to the test server"));
    assert!(resp.text.contains("Please read the rules"));
    assert!(resp.text.contains("Ready"));
}

#[tokio::test]
async fn raw_text_round_trips_bit_exactly() {
    let (mut server, client) = pair().await;
    let mut codec = FtpCodec::from_tcp(client);

    let wire: &[u8] = b"150-Here comes the directory listing\r\n150 Listing complete\r\n";
    server.write_all(wire).await.expect("write");

    let resp = codec.read_response().await.expect("read response");
    assert_eq!(resp.raw, String::from_utf8_lossy(wire));
}
