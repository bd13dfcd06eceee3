//! Literal scenarios from spec.md §8, driven against an in-process fake
//! FTP server. Scenario 2 (implicit-TLS handshake ordering) is covered
//! indirectly by `tls.rs`'s unit tests instead of here, since exercising
//! it end-to-end would require generating a certificate the client's
//! validator accepts — a dependency this crate's stack has no other use
//! for.

mod support;

use ftps_client::{FtpClient, FtpConnectionConfig, FtpError, ListingMethod, PutAction, TransferMode};
use std::io::Cursor;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use support::fake_server::{bind_pasv_listener, read_line, send_line, spawn_control};
use tokio::io::{AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::OwnedWriteHalf;

/// Runs the shared connect preamble (banner through `PWD`) against a
/// fake server script, identical to every scenario's setup.
async fn drive_login_preamble(reader: &mut BufReader<tokio::net::tcp::OwnedReadHalf>, wr: &mut OwnedWriteHalf) {
    send_line(wr, "220 hi").await;
    assert_eq!(read_line(reader).await, "USER anonymous");
    send_line(wr, "331 pw").await;
    assert_eq!(read_line(reader).await, "PASS anonymous@");
    send_line(wr, "230 ok").await;
    assert_eq!(read_line(reader).await, "FEAT");
    send_line(wr, "211-Features:").await;
    send_line(wr, "211 End").await;
    assert_eq!(read_line(reader).await, "SYST");
    send_line(wr, "215 UNIX Type: L8").await;
    assert_eq!(read_line(reader).await, "TYPE I");
    send_line(wr, "200 Type set to I").await;
    assert_eq!(read_line(reader).await, "PWD");
    send_line(wr, "257 \"/\" is the current directory").await;
}

fn base_config(host: String, port: u16) -> FtpConnectionConfig {
    FtpConnectionConfig {
        host,
        port,
        transfer_mode: TransferMode::Passive,
        ..Default::default()
    }
}

/// Scenario 1: `Open` + `USER` + `PASS` + `LIST`, server returns the
/// literal banner/login/PASV/listing sequence → 4 UnixEntries, size 12,
/// name "a.txt".
#[tokio::test]
async fn scenario1_bare_list_yields_four_unix_entries() {
    let (data_listener, _) = bind_pasv_listener().await;
    let data_port = data_listener.local_addr().unwrap().port();

    let addr = spawn_control(move |stream| async move {
        let (rd, mut wr) = stream.into_split();
        let mut reader = BufReader::new(rd);
        drive_login_preamble(&mut reader, &mut wr).await;

        assert_eq!(read_line(&mut reader).await, "PASV");
        let p1 = data_port / 256;
        let p2 = data_port % 256;
        send_line(&mut wr, &format!("227 Entering Passive Mode (192,0,2,1,{p1},{p2})")).await;

        assert_eq!(read_line(&mut reader).await, "LIST");
        send_line(&mut wr, "150 here comes the listing").await;

        let (mut data_sock, _) = data_listener.accept().await.expect("accept data connection");
        let line = "-rw-r--r-- 1 u g 12 Jan 2 2020 a.txt\r\n".repeat(4);
        data_sock.write_all(line.as_bytes()).await.unwrap();
        drop(data_sock);

        send_line(&mut wr, "226 done").await;
    })
    .await;

    let mut client = FtpClient::connect(base_config(addr.ip().to_string(), addr.port()))
        .await
        .expect("connect");
    let listing = client
        .get_dir_list(None, ListingMethod::List)
        .await
        .expect("LIST should succeed");

    assert_eq!(listing.entries.len(), 4);
    for entry in &listing.entries {
        assert_eq!(entry.name(), "a.txt");
        assert_eq!(entry.common().size, Some(12));
    }
}

/// Scenario 3: `put(Create)` of 1 MiB followed by `put(CreateOrAppend)`
/// of the same 1 MiB must leave 2 MiB total on the server — `Create`
/// issues a plain `STOR` (no pre-flight `SIZE`), `CreateOrAppend` issues
/// `APPE` onto the same remote name.
#[tokio::test]
async fn scenario3_create_then_create_or_append_doubles_remote_size() {
    const CHUNK: usize = 1_048_576;
    let received = Arc::new(AtomicU64::new(0));
    let received_in_handler = received.clone();

    let addr = spawn_control(move |stream| async move {
        let (rd, mut wr) = stream.into_split();
        let mut reader = BufReader::new(rd);
        drive_login_preamble(&mut reader, &mut wr).await;

        for verb in ["STOR", "APPE"] {
            let (data_listener, pasv_args) = bind_pasv_listener().await;
            assert_eq!(read_line(&mut reader).await, "PASV");
            send_line(&mut wr, &format!("227 Entering Passive Mode ({pasv_args})")).await;

            let command = read_line(&mut reader).await;
            assert_eq!(command, format!("{verb} x"));
            send_line(&mut wr, "150 go ahead").await;

            let (mut data_sock, _) = data_listener.accept().await.expect("accept data connection");
            let mut buf = Vec::new();
            data_sock.read_to_end(&mut buf).await.expect("read upload body");
            received_in_handler.fetch_add(buf.len() as u64, Ordering::SeqCst);

            send_line(&mut wr, "226 stored").await;
        }
    })
    .await;

    let mut client = FtpClient::connect(base_config(addr.ip().to_string(), addr.port()))
        .await
        .expect("connect");

    let body = vec![0x41u8; CHUNK];
    let mut source = Cursor::new(body.clone());
    let sent = client
        .put(&mut source, "x", PutAction::Create, Some(CHUNK as u64), false)
        .await
        .expect("Create STOR should succeed");
    assert_eq!(sent, CHUNK as u64);

    let mut source = Cursor::new(body);
    let sent = client
        .put(&mut source, "x", PutAction::CreateOrAppend, Some(CHUNK as u64), false)
        .await
        .expect("CreateOrAppend APPE should succeed");
    assert_eq!(sent, CHUNK as u64);

    assert_eq!(received.load(Ordering::SeqCst), (2 * CHUNK) as u64);
}

/// Scenario 5: `CreateNew` against an existing 10-byte remote file must
/// raise `AlreadyExists` without ever sending `STOR`.
#[tokio::test]
async fn scenario5_create_new_against_existing_file_raises_already_exists() {
    let addr = spawn_control(move |stream| async move {
        let (rd, mut wr) = stream.into_split();
        let mut reader = BufReader::new(rd);
        drive_login_preamble(&mut reader, &mut wr).await;

        assert_eq!(read_line(&mut reader).await, "SIZE x");
        send_line(&mut wr, "213 10").await;

        // No further command should arrive: the client must return
        // `AlreadyExists` without issuing `PASV`/`STOR`. Confirm the
        // connection goes quiet by trying (and failing) to read more.
        let mut probe = [0u8; 1];
        let timed_out = tokio::time::timeout(
            std::time::Duration::from_millis(100),
            AsyncReadExt::read(&mut reader, &mut probe),
        )
        .await
        .is_err();
        assert!(timed_out, "client must not send anything after SIZE succeeds");
    })
    .await;

    let mut client = FtpClient::connect(base_config(addr.ip().to_string(), addr.port()))
        .await
        .expect("connect");

    let mut source = Cursor::new(vec![1u8, 2, 3]);
    let err = client
        .put(&mut source, "x", PutAction::CreateNew, Some(3), false)
        .await
        .expect_err("CreateNew against an existing file must fail");
    assert!(matches!(err, FtpError::AlreadyExists { .. }));
}

/// Scenario 6: cancelling mid-`get` closes the data socket, sends a
/// single `ABOR` on the control channel, drains its response pair, and
/// leaves the client usable afterwards.
#[tokio::test]
async fn scenario6_cancellation_mid_get_aborts_cleanly() {
    let (data_listener, _) = bind_pasv_listener().await;
    let data_port = data_listener.local_addr().unwrap().port();
    let (abort_tx, abort_rx) = tokio::sync::oneshot::channel::<()>();

    let addr = spawn_control(move |stream| async move {
        let (rd, mut wr) = stream.into_split();
        let mut reader = BufReader::new(rd);
        drive_login_preamble(&mut reader, &mut wr).await;

        assert_eq!(read_line(&mut reader).await, "SIZE big.bin");
        send_line(&mut wr, "213 104857600").await;

        assert_eq!(read_line(&mut reader).await, "PASV");
        let p1 = data_port / 256;
        let p2 = data_port % 256;
        send_line(&mut wr, &format!("227 Entering Passive Mode (127,0,0,1,{p1},{p2})")).await;

        assert_eq!(read_line(&mut reader).await, "RETR big.bin");
        send_line(&mut wr, "150 sending big.bin").await;

        let (mut data_sock, _) = data_listener.accept().await.expect("accept data connection");
        tokio::spawn(async move {
            let chunk = vec![0u8; 65536];
            for _ in 0..200 {
                if data_sock.write_all(&chunk).await.is_err() {
                    break;
                }
                tokio::time::sleep(std::time::Duration::from_millis(1)).await;
            }
        });

        assert_eq!(read_line(&mut reader).await, "ABOR");
        let _ = abort_tx.send(());
        send_line(&mut wr, "426 transfer aborted").await;
        send_line(&mut wr, "226 abort successful").await;

        assert_eq!(read_line(&mut reader).await, "NOOP");
        send_line(&mut wr, "200 still here").await;
    })
    .await;

    let mut client = FtpClient::connect(base_config(addr.ip().to_string(), addr.port()))
        .await
        .expect("connect");

    let handle = client.cancellation_handle();
    tokio::spawn(async move {
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        handle.cancel();
    });

    let mut sink = Cursor::new(Vec::new());
    let err = client
        .get("big.bin", &mut sink, false)
        .await
        .expect_err("cancelled get must return an error");
    assert!(matches!(err, FtpError::Cancelled));

    abort_rx.await.expect("server should have observed ABOR");

    client.no_operation().await.expect("client must still be usable after cancellation");
}
