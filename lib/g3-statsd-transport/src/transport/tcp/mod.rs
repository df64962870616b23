/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2025 ByteDance and/or its affiliates.
 */

use std::collections::VecDeque;
use std::future::Future;
use std::io;
use std::pin::Pin;

use log::debug;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::Instant;

use super::{Batch, ErrorReporter, PeerAddr};
use crate::{DropReason, TransportConfigError, TransportError};

mod config;
pub use config::TcpTransportConfig;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

type ConnectFuture = Pin<Box<dyn Future<Output = Result<TcpStream, TransportError>> + Send>>;

enum TcpConnection {
    Disconnected { retry_at: Option<Instant> },
    Connecting(ConnectFuture),
    Connected(TcpStream),
}

impl TcpConnection {
    fn state(&self) -> ConnectionState {
        match self {
            TcpConnection::Disconnected { .. } => ConnectionState::Disconnected,
            TcpConnection::Connecting(_) => ConnectionState::Connecting,
            TcpConnection::Connected(_) => ConnectionState::Connected,
        }
    }
}

enum TcpEvent {
    Connected(Result<TcpStream, TransportError>),
    Lost(TransportError),
    Idle,
    Retry,
}

pub(super) struct TcpTransportIo {
    config: TcpTransportConfig,
    peer: PeerAddr,
    conn: TcpConnection,
    backlog: VecDeque<(Vec<u8>, usize)>,
    backlog_size: usize,
    last_active: Instant,
    reporter: ErrorReporter,
}

impl TcpTransportIo {
    pub(super) fn new(
        config: TcpTransportConfig,
        reporter: ErrorReporter,
    ) -> Result<Self, TransportConfigError> {
        let peer = PeerAddr::new(&config.host, config.port)?;
        Ok(TcpTransportIo {
            config,
            peer,
            conn: TcpConnection::Disconnected { retry_at: None },
            backlog: VecDeque::new(),
            backlog_size: 0,
            last_active: Instant::now(),
            reporter,
        })
    }

    #[inline]
    fn connection_state(&self) -> ConnectionState {
        self.conn.state()
    }

    fn set_connection(&mut self, conn: TcpConnection) {
        debug!(
            "statsd tcp transport {}: {:?} -> {:?}",
            self.peer.as_str(),
            self.conn.state(),
            conn.state()
        );
        self.conn = conn;
    }

    fn new_connect(&self) -> ConnectFuture {
        let peer = self.peer.clone();
        let timeout = self.config.connect_timeout;
        Box::pin(async move {
            let addr = peer.resolve().await?;
            match tokio::time::timeout(timeout, TcpStream::connect(addr)).await {
                Ok(Ok(stream)) => {
                    let _ = stream.set_nodelay(true);
                    Ok(stream)
                }
                Ok(Err(e)) => Err(TransportError::Connect(peer.as_str().to_string(), e)),
                Err(_) => Err(TransportError::Timeout("connect")),
            }
        })
    }

    fn start_connect(&mut self) {
        let fut = self.new_connect();
        self.set_connection(TcpConnection::Connecting(fut));
    }

    fn lose_connection(&mut self, e: TransportError) {
        self.reporter.report(e);
        let retry_at = Instant::now() + self.config.connect_retry_wait;
        self.set_connection(TcpConnection::Disconnected {
            retry_at: Some(retry_at),
        });
    }

    fn push_backlog(&mut self, batch: Batch) {
        let lines = batch.line_count();
        let data = batch.into_terminated();
        self.backlog_size += data.len();
        self.backlog.push_back((data, lines));

        let mut dropped = 0;
        while self.backlog_size > self.config.max_backlog_size && self.backlog.len() > 1 {
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

    async fn write_backlog(&mut self) {
        let TcpConnection::Connected(stream) = &mut self.conn else {
            return;
        };

        while let Some((data, lines)) = self.backlog.pop_front() {
            let r = tokio::time::timeout(self.config.write_timeout, stream.write_all(&data)).await;
            let e = match r {
                Ok(Ok(_)) => {
                    self.backlog_size -= data.len();
                    continue;
                }
                Ok(Err(e)) => TransportError::ConnectionLost(e),
                Err(_) => TransportError::Timeout("write"),
            };
            self.backlog.push_front((data, lines));
            self.lose_connection(e);
            return;
        }
        self.last_active = Instant::now();
    }

    pub(super) async fn deliver(&mut self, batch: Batch) {
        self.push_backlog(batch);
        match self.conn {
            TcpConnection::Connected(_) => self.write_backlog().await,
            TcpConnection::Connecting(_) => {}
            TcpConnection::Disconnected { retry_at } => {
                if retry_at.is_none_or(|t| t <= Instant::now()) {
                    self.start_connect();
                }
            }
        }
    }

    /// Wait for connection events. Only cancel safe operations are awaited here,
    /// writes happen in `after_background`.
    pub(super) async fn run_background(&mut self) {
        let event = match &mut self.conn {
            TcpConnection::Connected(stream) => {
                let mut buf = [0u8; 16];
                let idle_at = self.last_active + self.config.socket_timeout;
                tokio::select! {
                    r = stream.read(&mut buf) => {
                        let e = match r {
                            Ok(0) => TransportError::ClosedByPeer,
                            Ok(_) => TransportError::ConnectionLost(io::Error::other(
                                "unexpected data received",
                            )),
                            Err(e) => TransportError::ConnectionLost(e),
                        };
                        TcpEvent::Lost(e)
                    }
                    _ = tokio::time::sleep_until(idle_at) => TcpEvent::Idle,
                }
            }
            TcpConnection::Connecting(fut) => TcpEvent::Connected(fut.await),
            TcpConnection::Disconnected {
                retry_at: Some(retry_at),
            } if !self.backlog.is_empty() => {
                tokio::time::sleep_until(*retry_at).await;
                TcpEvent::Retry
            }
            TcpConnection::Disconnected { .. } => std::future::pending().await,
        };

        match event {
            TcpEvent::Connected(Ok(stream)) => {
                self.set_connection(TcpConnection::Connected(stream));
                self.last_active = Instant::now();
            }
            TcpEvent::Connected(Err(e)) => self.lose_connection(e),
            TcpEvent::Lost(e) => self.lose_connection(e),
            TcpEvent::Idle => {
                if self.backlog.is_empty() {
                    self.set_connection(TcpConnection::Disconnected { retry_at: None });
                } else {
                    self.last_active = Instant::now();
                }
            }
            TcpEvent::Retry => self.start_connect(),
        }
    }

    pub(super) async fn after_background(&mut self) {
        if !self.backlog.is_empty() && self.connection_state() == ConnectionState::Connected {
            self.write_backlog().await;
        }
    }

    pub(super) async fn shutdown(&mut self, last: Option<Batch>) {
        if let Some(batch) = last {
            self.push_backlog(batch);
        }

        if !self.backlog.is_empty() {
            let conn = std::mem::replace(
                &mut self.conn,
                TcpConnection::Disconnected { retry_at: None },
            );
            let connecting = match conn {
                TcpConnection::Connected(stream) => {
                    self.conn = TcpConnection::Connected(stream);
                    None
                }
                TcpConnection::Connecting(fut) => Some(fut),
                TcpConnection::Disconnected { .. } => Some(self.new_connect()),
            };
            if let Some(fut) = connecting {
                match tokio::time::timeout(self.config.socket_timeout, fut).await {
                    Ok(Ok(stream)) => self.conn = TcpConnection::Connected(stream),
                    Ok(Err(e)) => self.reporter.report(e),
                    Err(_) => self.reporter.report(TransportError::Timeout("connect")),
                }
            }
            self.write_backlog().await;
        }

        if let TcpConnection::Connected(stream) = &mut self.conn {
            let _ = tokio::time::timeout(self.config.write_timeout, stream.shutdown()).await;
        }
        self.set_connection(TcpConnection::Disconnected { retry_at: None });

        if !self.backlog.is_empty() {
            let lines = self.backlog.iter().map(|(_, n)| *n).sum();
            self.backlog.clear();
            self.backlog_size = 0;
            self.reporter.report(TransportError::Dropped {
                lines,
                reason: DropReason::Closed,
            });
        }
    }
}
