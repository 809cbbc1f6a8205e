//! Connection tests against a loopback listener standing in for the server.
//!
//! Covers:
//! - binding to the requested local address
//! - CRLF framing on send
//! - batched receive, timeout and peer-closed signalling
//! - connect failures surfacing as ConnectError

use std::net::IpAddr;
use std::time::Duration;

use portswarm_sdk::{Command, CommandSink, ConnectConfig, ConnectError, Connection, Received};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpListener;

fn loopback() -> IpAddr {
    IpAddr::from([127, 0, 0, 1])
}

fn config_for(port: u16) -> ConnectConfig {
    ConnectConfig {
        local_addr: loopback(),
        server_host: "127.0.0.1".to_string(),
        server_port: port,
        connect_timeout: Duration::from_secs(5),
        send_delay: Duration::ZERO,
    }
}

#[tokio::test]
async fn sends_crlf_terminated_lines_from_bound_address() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    let server = tokio::spawn(async move {
        let (stream, peer) = listener.accept().await.unwrap();
        let mut reader = BufReader::new(stream);
        let mut first = String::new();
        let mut second = String::new();
        reader.read_line(&mut first).await.unwrap();
        reader.read_line(&mut second).await.unwrap();
        (peer, first, second)
    });

    let mut conn = Connection::open(&config_for(port)).await.unwrap();
    assert_eq!(conn.local_addr().ip(), loopback());
    conn.send(Command::Nick("port001c".into())).await.unwrap();
    conn.send_line("USER abcd01 0 * :Kim\r\nQUIT").await.unwrap();

    let (peer, first, second) = server.await.unwrap();
    assert_eq!(peer.ip(), loopback());
    assert_eq!(first, "NICK port001c\r\n");
    assert_eq!(second, "USER abcd01 0 * :Kim\r\n");
}

#[tokio::test]
async fn receive_batches_timeouts_and_close() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let (go_tx, go_rx) = tokio::sync::oneshot::channel::<()>();

    let server = tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();
        stream
            .write_all(b"PING :abc\r\n:srv 376 me :End of /MOTD command.\r\n")
            .await
            .unwrap();
        go_rx.await.unwrap();
        // Dropping the stream closes the connection.
    });

    let mut conn = Connection::open(&config_for(port)).await.unwrap();

    let mut lines = Vec::new();
    while lines.len() < 2 {
        match conn.receive(Duration::from_secs(5)).await.unwrap() {
            Received::Lines(batch) => lines.extend(batch),
            other => panic!("unexpected {other:?}"),
        }
    }
    assert_eq!(lines, vec!["PING :abc", ":srv 376 me :End of /MOTD command."]);

    assert_eq!(
        conn.receive(Duration::from_millis(50)).await.unwrap(),
        Received::Timeout
    );

    go_tx.send(()).unwrap();
    server.await.unwrap();
    assert_eq!(
        conn.receive(Duration::from_secs(5)).await.unwrap(),
        Received::Closed
    );
    conn.close().await;
}

#[tokio::test]
async fn overlong_line_is_dropped_and_reading_continues() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    let server = tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();
        let mut flood = vec![b'x'; 9000];
        flood.extend_from_slice(b"\r\nPING :abc\r\n");
        stream.write_all(&flood).await.unwrap();
        stream
    });

    let mut conn = Connection::open(&config_for(port)).await.unwrap();
    let _stream = server.await.unwrap();

    let mut lines = Vec::new();
    while lines.is_empty() {
        match conn.receive(Duration::from_secs(5)).await.unwrap() {
            Received::Lines(batch) => lines.extend(batch),
            other => panic!("unexpected {other:?}"),
        }
    }
    assert_eq!(lines, vec!["PING :abc"]);
}

#[tokio::test]
async fn refused_connection_is_connect_error() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);

    let err = Connection::open(&config_for(port)).await.err().unwrap();
    assert!(matches!(err, ConnectError::Connect { .. }), "got {err}");
}

#[tokio::test]
async fn family_mismatch_is_reported() {
    let mut config = config_for(6667);
    config.local_addr = "::1".parse().unwrap();
    let err = Connection::open(&config).await.err().unwrap();
    assert!(
        matches!(err, ConnectError::NoAddressForFamily { family: "IPv6", .. }),
        "got {err}"
    );
}
