/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2025 ByteDance and/or its affiliates.
 */

use std::sync::Arc;

use log::debug;
use tokio::runtime::Handle;
use tokio::sync::{mpsc, watch};

use crate::TransportConfigError;

pub mod buffer;
use buffer::{Batch, BufferManager, FlushTrigger};

mod report;
pub use report::ErrorHook;
use report::ErrorReporter;

mod peer;
use peer::PeerAddr;

mod udp;
pub use udp::UdpTransportConfig;
use udp::UdpTransportIo;

mod tcp;
pub use tcp::{ConnectionState, TcpTransportConfig};
use tcp::TcpTransportIo;

mod http;
pub use self::http::HttpTransportConfig;
use self::http::HttpTransportIo;

#[cfg(test)]
use test::BufTransportIo;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TransportKind {
    Udp,
    Tcp,
    Http,
}

impl TransportKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransportKind::Udp => "udp",
            TransportKind::Tcp => "tcp",
            TransportKind::Http => "http",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TransportState {
    Open,
    Closing,
    Closed,
}

#[derive(Clone, Debug)]
pub enum TransportConfig {
    Udp(UdpTransportConfig),
    Tcp(TcpTransportConfig),
    Http(HttpTransportConfig),
}

impl TransportConfig {
    pub fn kind(&self) -> TransportKind {
        match self {
            TransportConfig::Udp(_) => TransportKind::Udp,
            TransportConfig::Tcp(_) => TransportKind::Tcp,
            TransportConfig::Http(_) => TransportKind::Http,
        }
    }
}

impl From<UdpTransportConfig> for TransportConfig {
    fn from(c: UdpTransportConfig) -> Self {
        TransportConfig::Udp(c)
    }
}

impl From<TcpTransportConfig> for TransportConfig {
    fn from(c: TcpTransportConfig) -> Self {
        TransportConfig::Tcp(c)
    }
}

impl From<HttpTransportConfig> for TransportConfig {
    fn from(c: HttpTransportConfig) -> Self {
        TransportConfig::Http(c)
    }
}

enum TransportCommand {
    Line(String),
    Close,
}

enum TransportIo {
    #[cfg(test)]
    Buf(BufTransportIo),
    Udp(UdpTransportIo),
    Tcp(TcpTransportIo),
    Http(HttpTransportIo),
}

impl TransportIo {
    async fn deliver(&mut self, batch: Batch) {
        match self {
            #[cfg(test)]
            TransportIo::Buf(io) => io.deliver(batch),
            TransportIo::Udp(io) => io.deliver(batch).await,
            TransportIo::Tcp(io) => io.deliver(batch).await,
            TransportIo::Http(io) => io.deliver(batch),
        }
    }

    /// Drive transport internal events. Must be cancel safe, as it is
    /// raced against new lines and the flush timer.
    async fn run_background(&mut self) {
        match self {
            #[cfg(test)]
            TransportIo::Buf(_) => std::future::pending().await,
            TransportIo::Udp(io) => io.run_background().await,
            TransportIo::Tcp(io) => io.run_background().await,
            TransportIo::Http(io) => io.run_background().await,
        }
    }

    /// Follow-up work for a completed background event, not raced.
    async fn after_background(&mut self) {
        if let TransportIo::Tcp(io) = self {
            io.after_background().await;
        }
    }

    async fn shutdown(&mut self, last: Option<Batch>) {
        match self {
            #[cfg(test)]
            TransportIo::Buf(io) => {
                if let Some(batch) = last {
                    io.deliver(batch);
                }
            }
            TransportIo::Udp(io) => io.shutdown(last).await,
            TransportIo::Tcp(io) => io.shutdown(last).await,
            TransportIo::Http(io) => io.shutdown(last),
        }
    }
}

struct TransportRuntime {
    kind: TransportKind,
    receiver: mpsc::UnboundedReceiver<TransportCommand>,
    state: Arc<watch::Sender<TransportState>>,
    buffer: BufferManager,
    io: TransportIo,
}

impl TransportRuntime {
    async fn into_running(mut self) {
        loop {
            tokio::select! {
                cmd = self.receiver.recv() => {
                    match cmd {
                        Some(TransportCommand::Line(line)) => {
                            for batch in self.buffer.append(&line) {
                                self.io.deliver(batch).await;
                            }
                        }
                        Some(TransportCommand::Close) => break,
                        None => {
                            debug!("statsd {} transport: all handles dropped", self.kind.as_str());
                            break;
                        }
                    }
                }
                _ = self.buffer.flush_timer() => {
                    if let Some(batch) = self.buffer.drain(FlushTrigger::Time) {
                        self.io.deliver(batch).await;
                    }
                }
                _ = self.io.run_background() => self.io.after_background().await,
            }
        }

        self.state.send_if_modified(|s| {
            if *s == TransportState::Open {
                *s = TransportState::Closing;
                true
            } else {
                false
            }
        });
        // lines queued behind the close command are not accepted any more
        self.receiver.close();

        let last = self.buffer.force_flush();
        self.io.shutdown(last).await;
        debug!("statsd {} transport closed", self.kind.as_str());
        self.state.send_replace(TransportState::Closed);
    }
}

/// Handle to a running transport.
///
/// Share it as `Arc<Transport>` between clients. `send` and `close` never
/// block and never fail, delivery errors only go to the error hook.
pub struct Transport {
    kind: TransportKind,
    sender: mpsc::UnboundedSender<TransportCommand>,
    state: Arc<watch::Sender<TransportState>>,
}

impl Transport {
    /// Start a transport on the current tokio runtime.
    pub fn spawn(
        config: TransportConfig,
        error_hook: Option<ErrorHook>,
    ) -> Result<Self, TransportConfigError> {
        let rt = Handle::try_current().map_err(|_| TransportConfigError::NoRuntime)?;
        let kind = config.kind();
        let reporter = ErrorReporter::new(kind, error_hook);

        let (buffer, io) = match config {
            TransportConfig::Udp(c) => {
                let buffer = c.buffer_manager();
                (buffer, TransportIo::Udp(UdpTransportIo::new(c, reporter)?))
            }
            TransportConfig::Tcp(c) => {
                let buffer = c.buffer_manager();
                (buffer, TransportIo::Tcp(TcpTransportIo::new(c, reporter)?))
            }
            TransportConfig::Http(c) => {
                let buffer = c.buffer_manager();
                (buffer, TransportIo::Http(HttpTransportIo::new(c, reporter)?))
            }
        };
        Ok(Transport::launch(&rt, kind, buffer, io))
    }

    pub fn udp(config: UdpTransportConfig) -> Result<Self, TransportConfigError> {
        Transport::spawn(config.into(), None)
    }

    pub fn tcp(config: TcpTransportConfig) -> Result<Self, TransportConfigError> {
        Transport::spawn(config.into(), None)
    }

    pub fn http(config: HttpTransportConfig) -> Result<Self, TransportConfigError> {
        Transport::spawn(config.into(), None)
    }

    fn launch(rt: &Handle, kind: TransportKind, buffer: BufferManager, io: TransportIo) -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        let (state, _) = watch::channel(TransportState::Open);
        let state = Arc::new(state);

        let runtime = TransportRuntime {
            kind,
            receiver,
            state: Arc::clone(&state),
            buffer,
            io,
        };
        rt.spawn(runtime.into_running());

        Transport {
            kind,
            sender,
            state,
        }
    }

    #[cfg(test)]
    pub(crate) fn buf(
        max_buffer_size: usize,
        flush_interval: std::time::Duration,
    ) -> (Self, Arc<std::sync::Mutex<Vec<Vec<u8>>>>) {
        let packets = Arc::new(std::sync::Mutex::new(Vec::new()));
        let io = TransportIo::Buf(BufTransportIo::new(packets.clone()));
        let buffer = BufferManager::new(max_buffer_size, flush_interval);
        let transport = Transport::launch(&Handle::current(), TransportKind::Udp, buffer, io);
        (transport, packets)
    }

    #[inline]
    pub fn kind(&self) -> TransportKind {
        self.kind
    }

    #[inline]
    pub fn state(&self) -> TransportState {
        *self.state.borrow()
    }

    /// Enqueue one complete metric line. Dropped silently once closing.
    pub fn send(&self, line: &str) {
        if self.state() != TransportState::Open {
            return;
        }
        let _ = self.sender.send(TransportCommand::Line(line.to_string()));
    }

    pub(crate) fn send_line(&self, line: String) {
        if self.state() != TransportState::Open {
            return;
        }
        let _ = self.sender.send(TransportCommand::Line(line));
    }

    /// Start the graceful shutdown. Only the first call has any effect.
    pub fn close(&self) {
        let first = self.state.send_if_modified(|s| {
            if *s == TransportState::Open {
                *s = TransportState::Closing;
                true
            } else {
                false
            }
        });
        if first {
            let _ = self.sender.send(TransportCommand::Close);
        }
    }

    /// Wait until the final flush has been attempted and all sockets released.
    pub async fn closed(&self) {
        let mut receiver = self.state.subscribe();
        let _ = receiver
            .wait_for(|s| *s == TransportState::Closed)
            .await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn unbuffered_order() {
        let (transport, packets) = Transport::buf(0, Duration::from_secs(1));
        transport.send("a:1|c");
        transport.send("b:2|c");
        transport.send("c:3|c");
        transport.close();
        transport.closed().await;

        let packets = packets.lock().unwrap();
        assert_eq!(
            packets.as_slice(),
            &[b"a:1|c".to_vec(), b"b:2|c".to_vec(), b"c:3|c".to_vec()]
        );
    }

    #[tokio::test]
    async fn close_flushes_pending() {
        let (transport, packets) = Transport::buf(1024, Duration::from_secs(60));
        transport.send("a:1|c");
        transport.send("b:2|c");
        assert_eq!(transport.state(), TransportState::Open);
        transport.close();
        assert_eq!(transport.state(), TransportState::Closing);
        transport.closed().await;
        assert_eq!(transport.state(), TransportState::Closed);

        let packets = packets.lock().unwrap();
        assert_eq!(packets.as_slice(), &[b"a:1|c\nb:2|c".to_vec()]);
    }

    #[tokio::test]
    async fn close_idempotent() {
        let (transport, packets) = Transport::buf(1024, Duration::from_secs(60));
        transport.send("a:1|c");
        transport.close();
        transport.close();
        transport.closed().await;
        transport.close();
        transport.send("b:1|c");
        transport.closed().await;

        tokio::time::sleep(Duration::from_millis(10)).await;
        let packets = packets.lock().unwrap();
        assert_eq!(packets.as_slice(), &[b"a:1|c".to_vec()]);
    }

    #[tokio::test(start_paused = true)]
    async fn time_flush() {
        let (transport, packets) = Transport::buf(1024, Duration::from_millis(25));
        transport.send("a:1|c");
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(packets.lock().unwrap().is_empty());

        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(packets.lock().unwrap().as_slice(), &[b"a:1|c".to_vec()]);
        transport.close();
        transport.closed().await;
        assert_eq!(packets.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn drop_flushes_pending() {
        let (transport, packets) = Transport::buf(1024, Duration::from_secs(60));
        let state = Arc::clone(&transport.state);
        transport.send("a:1|c");
        drop(transport);

        let mut receiver = state.subscribe();
        receiver
            .wait_for(|s| *s == TransportState::Closed)
            .await
            .unwrap();
        assert_eq!(packets.lock().unwrap().as_slice(), &[b"a:1|c".to_vec()]);
    }

    #[test]
    fn no_runtime() {
        let r = Transport::udp(UdpTransportConfig::default());
        assert!(matches!(r, Err(TransportConfigError::NoRuntime)));
    }
}
