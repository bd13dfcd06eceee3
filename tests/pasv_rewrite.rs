//! PASV NAT host-rewrite (spec.md §4.2/§8): an advertised PASV host that
//! is private/loopback/link-local/unspecified must be replaced with the
//! control-channel peer address before the data connection is attempted.
//!
//! This test runs entirely over loopback, so both the "private" and the
//! rewritten address are `127.0.0.1` — what it actually proves is that
//! the rewrite path runs at all: an advertised host of `10.0.0.1` is
//! never dialed directly (that connection attempt would simply hang
//! against a non-routable test-net address), yet the listing still
//! completes because the client substitutes the real control peer.

mod support;

use ftps_client::{FtpClient, FtpConnectionConfig, ListingMethod, TransferMode};
use support::fake_server::{bind_pasv_listener, read_line, send_line, spawn_control};
use tokio::io::{AsyncWriteExt, BufReader};

#[tokio::test]
async fn private_pasv_host_is_rewritten_to_control_channel_peer() {
    let (data_listener, _) = bind_pasv_listener().await;
    let data_port = data_listener.local_addr().unwrap().port();

    let addr = spawn_control(move |stream| async move {
        let (rd, mut wr) = stream.into_split();
        let mut reader = BufReader::new(rd);

        send_line(&mut wr, "220 fake ftp ready").await;
        assert_eq!(read_line(&mut reader).await, "USER anonymous");
        send_line(&mut wr, "331 password please").await;
        assert_eq!(read_line(&mut reader).await, "PASS anonymous@");
        send_line(&mut wr, "230 logged in").await;
        assert_eq!(read_line(&mut reader).await, "FEAT");
        send_line(&mut wr, "211-Features:").await;
        send_line(&mut wr, "211 End").await;
        assert_eq!(read_line(&mut reader).await, "SYST");
        send_line(&mut wr, "215 UNIX Type: L8").await;
        assert_eq!(read_line(&mut reader).await, "TYPE I");
        send_line(&mut wr, "200 Type set to I").await;
        assert_eq!(read_line(&mut reader).await, "PWD");
        send_line(&mut wr, "257 \"/\" is the current directory").await;

        assert_eq!(read_line(&mut reader).await, "PASV");
        let p1 = data_port / 256;
        let p2 = data_port % 256;
        send_line(
            &mut wr,
            &format!("227 Entering Passive Mode (10,0,0,1,{},{})", p1, p2),
        )
        .await;

        assert_eq!(read_line(&mut reader).await, "LIST -aL");
        send_line(&mut wr, "150 opening data connection").await;

        let (mut data_sock, _) = data_listener.accept().await.expect("accept data connection");
        data_sock
            .write_all(b"-rw-r--r-- 1 u g 12 Jan 2 2020 a.txt\r\n")
            .await
            .unwrap();
        drop(data_sock);

        send_line(&mut wr, "226 transfer complete").await;
    })
    .await;

    let config = FtpConnectionConfig {
        host: addr.ip().to_string(),
        port: addr.port(),
        transfer_mode: TransferMode::Passive,
        ..Default::default()
    };

    let mut client = FtpClient::connect(config).await.expect("connect");
    let listing = client
        .get_dir_list(None, ListingMethod::Automatic)
        .await
        .expect("listing should succeed via the rewritten PASV address");
    assert_eq!(listing.entries.len(), 1);
    assert_eq!(listing.entries[0].name(), "a.txt");
}
