/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2025 ByteDance and/or its affiliates.
 */

use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;

use g3_statsd_transport::transport::{TcpTransportConfig, TransportConfig};
use g3_statsd_transport::{Transport, TransportError};

async fn listen() -> (TcpListener, TcpTransportConfig) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let mut config = TcpTransportConfig::new("127.0.0.1", addr.port());
    config.set_connect_retry_wait(Duration::from_millis(100));
    (listener, config)
}

async fn accept(listener: &TcpListener) -> TcpStream {
    tokio::time::timeout(Duration::from_secs(5), listener.accept())
        .await
        .unwrap()
        .unwrap()
        .0
}

async fn read_line(reader: &mut BufReader<TcpStream>) -> String {
    let mut line = String::new();
    tokio::time::timeout(Duration::from_secs(5), reader.read_line(&mut line))
        .await
        .unwrap()
        .unwrap();
    line
}

#[tokio::test]
async fn buffered_500_lines() {
    let (listener, config) = listen().await;
    let transport = Transport::tcp(config).unwrap();

    let server = tokio::spawn(async move {
        let mut stream = accept(&listener).await;
        let mut data = String::new();
        stream.read_to_string(&mut data).await.unwrap();
        data
    });

    for i in 0..500 {
        transport.send(&format!("test.metric.{i}:{i}|c"));
    }
    transport.close();
    transport.closed().await;

    let data = server.await.unwrap();
    assert!(data.ends_with('\n'));
    let lines: Vec<&str> = data.lines().collect();
    assert_eq!(lines.len(), 500);
    for (i, line) in lines.iter().enumerate() {
        assert_eq!(*line, format!("test.metric.{i}:{i}|c"));
    }
}

#[tokio::test]
async fn unbuffered_immediate() {
    let (listener, mut config) = listen().await;
    config.set_max_buffer_size(0);
    let transport = Transport::tcp(config).unwrap();

    transport.send("a:1|c");
    let mut reader = BufReader::new(accept(&listener).await);
    assert_eq!(read_line(&mut reader).await, "a:1|c\n");
    transport.send("b:1|c");
    assert_eq!(read_line(&mut reader).await, "b:1|c\n");

    transport.close();
    transport.closed().await;
    assert_eq!(read_line(&mut reader).await, "");
}

#[tokio::test]
async fn reconnect_after_peer_close() {
    let (listener, mut config) = listen().await;
    config.set_max_buffer_size(0);

    let (err_sender, mut err_receiver) = mpsc::unbounded_channel();
    let transport = Transport::spawn(
        TransportConfig::Tcp(config),
        Some(Arc::new(move |e: &TransportError| {
            let _ = err_sender.send(e.to_string());
        })),
    )
    .unwrap();

    transport.send("before:1|c");
    let mut reader = BufReader::new(accept(&listener).await);
    assert_eq!(read_line(&mut reader).await, "before:1|c\n");
    drop(reader);

    let e = tokio::time::timeout(Duration::from_secs(5), err_receiver.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(e, "connection closed by peer");

    for i in 0..10 {
        transport.send(&format!("after.{i}:1|c"));
    }
    let mut reader = BufReader::new(accept(&listener).await);
    for i in 0..10 {
        assert_eq!(read_line(&mut reader).await, format!("after.{i}:1|c\n"));
    }

    transport.close();
    transport.closed().await;
}

#[tokio::test]
async fn buffered_while_unreachable() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);

    let mut config = TcpTransportConfig::new("127.0.0.1", port);
    config.set_max_buffer_size(0);
    config.set_connect_retry_wait(Duration::from_millis(100));
    let transport = Transport::tcp(config).unwrap();
    transport.send("x:1|c");
    transport.send("y:1|c");
    tokio::time::sleep(Duration::from_millis(150)).await;

    // the port may be taken by now, only check when it can be bound again
    let Ok(listener) = TcpListener::bind(("127.0.0.1", port)).await else {
        transport.close();
        transport.closed().await;
        return;
    };
    let mut reader = BufReader::new(accept(&listener).await);
    assert_eq!(read_line(&mut reader).await, "x:1|c\n");
    assert_eq!(read_line(&mut reader).await, "y:1|c\n");

    transport.close();
    transport.closed().await;
}

#[tokio::test]
async fn close_without_peer() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);

    let mut config = TcpTransportConfig::new("127.0.0.1", port);
    config.set_socket_timeout(Duration::from_millis(200));

    let (err_sender, mut err_receiver) = mpsc::unbounded_channel();
    let transport = Transport::spawn(
        config.into(),
        Some(Arc::new(move |e: &TransportError| {
            let _ = err_sender.send(e.to_string());
        })),
    )
    .unwrap();
    transport.send("lost:1|c");
    transport.close();
    tokio::time::timeout(Duration::from_secs(5), transport.closed())
        .await
        .unwrap();

    let mut errors = Vec::new();
    while let Ok(e) = err_receiver.try_recv() {
        errors.push(e);
    }
    assert!(errors.iter().any(|e| e.starts_with("failed to connect to")));
    assert_eq!(
        errors.last().map(|s| s.as_str()),
        Some("1 lines dropped: transport closed")
    );
}
