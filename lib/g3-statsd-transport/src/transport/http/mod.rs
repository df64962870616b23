/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2025 ByteDance and/or its affiliates.
 */

use std::collections::VecDeque;
use std::sync::Arc;

use log::debug;
use rustls::{ClientConfig, RootCertStore};
use rustls_pki_types::ServerName;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::task::JoinSet;
use tokio_rustls::TlsConnector;

use super::{Batch, ErrorReporter, PeerAddr};
use crate::{DropReason, TransportConfigError, TransportError};

mod config;
pub use config::HttpTransportConfig;

mod status;
use status::HttpStatusLine;

#[derive(Clone)]
struct TlsClient {
    connector: TlsConnector,
    server_name: ServerName<'static>,
}

impl TlsClient {
    fn new(host: &str) -> Result<Self, TransportConfigError> {
        let mut roots = RootCertStore::empty();
        roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());

        let provider = Arc::new(rustls::crypto::ring::default_provider());
        let config = ClientConfig::builder_with_provider(provider)
            .with_safe_default_protocol_versions()?
            .with_root_certificates(roots)
            .with_no_client_auth();
        let server_name = ServerName::try_from(host.to_string())
            .map_err(|_| TransportConfigError::InvalidServerName(host.to_string()))?;
        Ok(TlsClient {
            connector: TlsConnector::from(Arc::new(config)),
            server_name,
        })
    }
}

/// Everything a single POST needs, shared by all spawned requests.
struct HttpPoster {
    config: HttpTransportConfig,
    peer: PeerAddr,
    tls: Option<TlsClient>,
}

impl HttpPoster {
    async fn post(&self, body: &[u8]) -> Result<(), TransportError> {
        let addr = self.peer.resolve().await?;
        let stream = TcpStream::connect(addr)
            .await
            .map_err(|e| TransportError::Connect(self.peer.as_str().to_string(), e))?;
        let _ = stream.set_nodelay(true);

        let mut head = Vec::with_capacity(256);
        self.config.write_fixed_header(&mut head, body.len());

        match &self.tls {
            Some(tls) => {
                let stream = tls
                    .connector
                    .connect(tls.server_name.clone(), stream)
                    .await
                    .map_err(TransportError::Tls)?;
                self.exchange(stream, &head, body).await
            }
            None => self.exchange(stream, &head, body).await,
        }
    }

    async fn exchange<S>(&self, mut stream: S, head: &[u8], body: &[u8]) -> Result<(), TransportError>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        stream.write_all(head).await.map_err(TransportError::Send)?;
        stream.write_all(body).await.map_err(TransportError::Send)?;
        stream.flush().await.map_err(TransportError::Send)?;

        let mut reader = BufReader::new(stream).take(self.config.rsp_head_max_size as u64);
        let mut line = Vec::with_capacity(64);
        let nr = reader
            .read_until(b'\n', &mut line)
            .await
            .map_err(TransportError::ConnectionLost)?;
        if nr == 0 {
            return Err(TransportError::ClosedByPeer);
        }

        let status = HttpStatusLine::parse(&line).map_err(TransportError::InvalidResponse)?;
        if status.is_success() {
            Ok(())
        } else {
            debug!(
                "statsd http transport: {} got response HTTP/1.{} {} {}",
                self.peer.as_str(),
                status.version,
                status.code,
                status.reason
            );
            Err(TransportError::HttpStatus(status.code))
        }
    }
}

/// Fire-and-forget POST per batch. At most `max_in_flight` requests run
/// concurrently, batches beyond that wait in a byte-capped backlog.
pub(super) struct HttpTransportIo {
    poster: Arc<HttpPoster>,
    in_flight: JoinSet<()>,
    backlog: VecDeque<(Vec<u8>, usize)>,
    backlog_size: usize,
    reporter: ErrorReporter,
}

impl HttpTransportIo {
    pub(super) fn new(
        config: HttpTransportConfig,
        reporter: ErrorReporter,
    ) -> Result<Self, TransportConfigError> {
        let peer = PeerAddr::new(&config.host, config.port)?;
        let tls = if config.tls {
            Some(TlsClient::new(peer.host())?)
        } else {
            None
        };
        Ok(HttpTransportIo {
            poster: Arc::new(HttpPoster { config, peer, tls }),
            in_flight: JoinSet::new(),
            backlog: VecDeque::new(),
            backlog_size: 0,
            reporter,
        })
    }

    fn push_backlog(&mut self, batch: Batch) {
        let lines = batch.line_count();
        let data = batch.into_bytes();
        self.backlog_size += data.len();
        self.backlog.push_back((data, lines));

        let mut dropped = 0;
        while self.backlog_size > self.poster.config.max_backlog_size && self.backlog.len() > 1 {
            if let Some((data, lines)) = self.backlog.pop_front() {
                self.backlog_size -= data.len();
                dropped += lines;
            }
        }
        if dropped > 0 {
            self.reporter.report(TransportError::Dropped {
                lines: dropped,
                reason: DropReason::BacklogFull,
            });
        }
    }

    fn spawn_request(&mut self, body: Vec<u8>) {
        let poster = Arc::clone(&self.poster);
        let reporter = self.reporter.clone();
        self.in_flight.spawn(async move {
            match tokio::time::timeout(poster.config.request_timeout, poster.post(&body)).await {
                Ok(Ok(_)) => {}
                Ok(Err(e)) => reporter.report(e),
                Err(_) => reporter.report(TransportError::Timeout("http request")),
            }
        });
    }

    fn start_backlog(&mut self) {
        while self.in_flight.len() < self.poster.config.max_in_flight {
            let Some((body, _)) = self.backlog.pop_front() else {
                break;
            };
            self.backlog_size -= body.len();
            self.spawn_request(body);
        }
    }

    pub(super) fn deliver(&mut self, batch: Batch) {
        while self.in_flight.try_join_next().is_some() {}
        self.push_backlog(batch);
        self.start_backlog();
    }

    pub(super) async fn run_background(&mut self) {
        if self.in_flight.is_empty() {
            std::future::pending().await
        } else {
            let _ = self.in_flight.join_next().await;
            self.start_backlog();
        }
    }

    /// Issue the final request. Running and waiting requests are handed to
    /// a detached task and end on their own within `request_timeout`.
    pub(super) fn shutdown(&mut self, last: Option<Batch>) {
        if let Some(batch) = last {
            self.deliver(batch);
        }
        if self.backlog.is_empty() {
            if !self.in_flight.is_empty() {
                debug!(
                    "statsd http transport: detach {} in-flight requests",
                    self.in_flight.len()
                );
            }
            self.in_flight.detach_all();
            return;
        }

        debug!(
            "statsd http transport: detach {} in-flight and {} waiting requests",
            self.in_flight.len(),
            self.backlog.len()
        );
        let mut rest = HttpTransportIo {
            poster: Arc::clone(&self.poster),
            in_flight: std::mem::take(&mut self.in_flight),
            backlog: std::mem::take(&mut self.backlog),
            backlog_size: std::mem::take(&mut self.backlog_size),
            reporter: self.reporter.clone(),
        };
        tokio::spawn(async move {
            while !rest.backlog.is_empty() {
                rest.run_background().await;
            }
            rest.in_flight.detach_all();
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::time::Duration;

    use tokio::net::TcpListener;

    use crate::transport::TransportKind;
    use crate::transport::buffer::BufferManager;

    async fn serve_one(listener: &TcpListener, status: &str) -> (String, Vec<u8>) {
        let (stream, _) = listener.accept().await.unwrap();
        let mut reader = BufReader::new(stream);
        let mut head = String::new();
        let mut content_length = 0usize;
        loop {
            let mut line = String::new();
            reader.read_line(&mut line).await.unwrap();
            if line == "\r\n" {
                break;
            }
            if let Some(v) = line.to_ascii_lowercase().strip_prefix("content-length:") {
                content_length = v.trim().parse().unwrap();
            }
            head.push_str(&line);
        }
        let mut body = vec![0u8; content_length];
        reader.read_exact(&mut body).await.unwrap();

        let rsp = format!("HTTP/1.1 {status}\r\nContent-Length: 0\r\n\r\n");
        reader.get_mut().write_all(rsp.as_bytes()).await.unwrap();
        (head, body)
    }

    fn new_io(
        port: u16,
        max_in_flight: usize,
    ) -> (HttpTransportIo, Arc<Mutex<Vec<String>>>) {
        let errors = Arc::new(Mutex::new(Vec::new()));
        let errors_c = errors.clone();
        let reporter = ErrorReporter::new(
            TransportKind::Http,
            Some(Arc::new(move |e: &TransportError| {
                errors_c.lock().unwrap().push(e.to_string());
            })),
        );
        let mut config = HttpTransportConfig::new(&format!("http://127.0.0.1:{port}/push")).unwrap();
        config.set_header("X-Test", "Test").unwrap();
        config.set_max_in_flight(max_in_flight);
        config.set_request_timeout(Duration::from_secs(2));
        (HttpTransportIo::new(config, reporter).unwrap(), errors)
    }

    fn batch_of(lines: &[&str]) -> Batch {
        let mut buffer = BufferManager::new(4096, Duration::from_secs(1));
        for line in lines {
            assert!(buffer.append(line).is_empty());
        }
        buffer.force_flush().unwrap()
    }

    #[tokio::test]
    async fn post_batch() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let (mut io, errors) = new_io(port, 4);

        io.deliver(batch_of(&["a:1|c", "b:2|g"]));
        let (head, body) = serve_one(&listener, "200 OK").await;
        assert!(head.starts_with("POST /push HTTP/1.1\r\n"));
        assert!(head.contains("x-test: Test\r\n"));
        assert!(head.contains("Content-Type: text/plain\r\n"));
        assert_eq!(body, b"a:1|c\nb:2|g");

        tokio::time::timeout(Duration::from_secs(2), io.run_background())
            .await
            .unwrap();
        assert!(io.in_flight.is_empty());
        assert!(errors.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn bad_status() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let (mut io, errors) = new_io(port, 4);

        io.deliver(batch_of(&["a:1|c"]));
        serve_one(&listener, "500 Internal Server Error").await;
        tokio::time::timeout(Duration::from_secs(2), io.run_background())
            .await
            .unwrap();

        let errors = errors.lock().unwrap();
        assert_eq!(
            errors.as_slice(),
            &["unexpected http response status code 500".to_string()]
        );
    }

    #[tokio::test]
    async fn wait_for_free_slot() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let (mut io, errors) = new_io(port, 1);

        io.deliver(batch_of(&["a:1|c"]));
        io.deliver(batch_of(&["b:1|c", "c:1|c"]));
        assert_eq!(io.in_flight.len(), 1);
        assert_eq!(io.backlog.len(), 1);

        let (_, body) = serve_one(&listener, "204 No Content").await;
        assert_eq!(body, b"a:1|c");
        tokio::time::timeout(Duration::from_secs(2), io.run_background())
            .await
            .unwrap();
        assert!(io.backlog.is_empty());
        assert_eq!(io.backlog_size, 0);
        assert_eq!(io.in_flight.len(), 1);

        let (_, body) = serve_one(&listener, "204 No Content").await;
        assert_eq!(body, b"b:1|c\nc:1|c");
        tokio::time::timeout(Duration::from_secs(2), io.run_background())
            .await
            .unwrap();
        assert!(io.in_flight.is_empty());
        assert!(errors.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn backlog_drop_oldest() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let (mut io, errors) = new_io(port, 1);
        Arc::get_mut(&mut io.poster)
            .unwrap()
            .config
            .set_max_backlog_size(10);

        io.deliver(batch_of(&["a:1|c"]));
        io.deliver(batch_of(&["b:1|c"]));
        io.deliver(batch_of(&["c:1|c"]));
        io.deliver(batch_of(&["d:1|c"]));
        assert_eq!(io.backlog_size, 10);
        let waiting: Vec<&[u8]> = io.backlog.iter().map(|(d, _)| d.as_slice()).collect();
        assert_eq!(waiting, vec![b"c:1|c".as_slice(), b"d:1|c".as_slice()]);
        assert_eq!(
            errors.lock().unwrap().as_slice(),
            &["1 lines dropped: backlog full".to_string()]
        );
        io.shutdown(None);
        assert!(io.in_flight.is_empty());
        assert!(io.backlog.is_empty());
    }

    #[tokio::test]
    async fn shutdown_sends_waiting() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let (mut io, errors) = new_io(port, 1);

        io.deliver(batch_of(&["a:1|c"]));
        io.deliver(batch_of(&["b:1|c"]));
        io.shutdown(Some(batch_of(&["c:1|c"])));
        assert!(io.in_flight.is_empty());
        assert!(io.backlog.is_empty());

        let mut bodies = Vec::new();
        for _ in 0..3 {
            let (_, body) = serve_one(&listener, "200 OK").await;
            bodies.push(body);
        }
        assert_eq!(
            bodies,
            vec![b"a:1|c".to_vec(), b"b:1|c".to_vec(), b"c:1|c".to_vec()]
        );
        assert!(errors.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn refused() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);
        let (mut io, errors) = new_io(port, 4);

        io.deliver(batch_of(&["a:1|c"]));
        tokio::time::timeout(Duration::from_secs(2), io.run_background())
            .await
            .unwrap();
        let errors = errors.lock().unwrap();
        assert_eq!(errors.len(), 1);
        assert!(errors[0].starts_with("failed to connect to 127.0.0.1:"));
    }

    #[test]
    fn tls_setup() {
        assert!(TlsClient::new("metrics.example.net").is_ok());
        assert!(TlsClient::new("127.0.0.1").is_ok());
        assert!(TlsClient::new("bad_name!").is_err());
    }
}
