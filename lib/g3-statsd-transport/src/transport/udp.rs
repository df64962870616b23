/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2025 ByteDance and/or its affiliates.
 */

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::time::Duration;

use log::debug;
use tokio::net::UdpSocket;
use tokio::time::Instant;

use super::{Batch, BufferManager, ErrorReporter, PeerAddr};
use crate::{TransportConfigError, TransportError};

const DEFAULT_UDP_MAX_BUFFER_SIZE: usize = 1200;
const DEFAULT_MAX_SEGMENT_SIZE: usize = 8192;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UdpTransportConfig {
    pub(super) host: String,
    pub(super) port: u16,
    pub(super) bind_ip: Option<IpAddr>,
    pub(super) max_buffer_size: usize,
    pub(super) flush_interval: Option<Duration>,
    pub(super) socket_timeout: Duration,
    pub(super) max_segment_size: usize,
}

impl Default for UdpTransportConfig {
    fn default() -> Self {
        UdpTransportConfig::new(crate::config::DEFAULT_HOST, crate::config::DEFAULT_PORT)
    }
}

impl UdpTransportConfig {
    pub fn new(host: &str, port: u16) -> Self {
        UdpTransportConfig {
            host: host.to_string(),
            port,
            bind_ip: None,
            max_buffer_size: DEFAULT_UDP_MAX_BUFFER_SIZE,
            flush_interval: None,
            socket_timeout: crate::config::DEFAULT_SOCKET_TIMEOUT,
            max_segment_size: DEFAULT_MAX_SEGMENT_SIZE,
        }
    }

    pub fn set_bind_ip(&mut self, ip: IpAddr) {
        self.bind_ip = Some(ip);
    }

    pub fn set_max_buffer_size(&mut self, size: usize) {
        self.max_buffer_size = size;
    }

    pub fn set_flush_interval(&mut self, interval: Duration) {
        self.flush_interval = Some(interval);
    }

    pub fn set_socket_timeout(&mut self, timeout: Duration) {
        self.socket_timeout = timeout;
    }

    pub fn set_max_segment_size(&mut self, size: usize) {
        self.max_segment_size = size.max(1);
    }

    pub(super) fn buffer_manager(&self) -> BufferManager {
        BufferManager::new(
            self.max_buffer_size,
            self.flush_interval.unwrap_or(self.socket_timeout),
        )
    }
}

/// Ephemeral datagram socket: bound on the first flush, released after
/// `socket_timeout` without traffic.
pub(super) struct UdpTransportIo {
    config: UdpTransportConfig,
    peer: PeerAddr,
    socket: Option<(UdpSocket, SocketAddr)>,
    last_active: Instant,
    reporter: ErrorReporter,
}

impl UdpTransportIo {
    pub(super) fn new(
        config: UdpTransportConfig,
        reporter: ErrorReporter,
    ) -> Result<Self, TransportConfigError> {
        let peer = PeerAddr::new(&config.host, config.port)?;
        Ok(UdpTransportIo {
            config,
            peer,
            socket: None,
            last_active: Instant::now(),
            reporter,
        })
    }

    async fn open_socket(&self) -> Result<(UdpSocket, SocketAddr), TransportError> {
        let peer = self.peer.resolve().await?;
        let bind_ip = self.config.bind_ip.unwrap_or(match peer {
            SocketAddr::V4(_) => IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            SocketAddr::V6(_) => IpAddr::V6(Ipv6Addr::UNSPECIFIED),
        });
        let socket = UdpSocket::bind(SocketAddr::new(bind_ip, 0))
            .await
            .map_err(TransportError::Socket)?;
        debug!("statsd udp transport: new socket for peer {peer}");
        Ok((socket, peer))
    }

    pub(super) async fn deliver(&mut self, batch: Batch) {
        if self.socket.is_none() {
            match self.open_socket().await {
                Ok(s) => self.socket = Some(s),
                Err(e) => {
                    self.reporter.report(e);
                    return;
                }
            }
        }
        let Some((socket, peer)) = &self.socket else {
            return;
        };

        for segment in batch.segments(self.config.max_segment_size) {
            if let Err(e) = socket.send_to(segment, *peer).await {
                self.reporter.report(TransportError::Send(e));
                // resolve and bind again on next flush
                self.socket = None;
                break;
            }
        }
        self.last_active = Instant::now();
    }

    pub(super) async fn run_background(&mut self) {
        if self.socket.is_some() {
            tokio::time::sleep_until(self.last_active + self.config.socket_timeout).await;
            debug!(
                "statsd udp transport: release idle socket for {}",
                self.peer.as_str()
            );
            self.socket = None;
        } else {
            std::future::pending().await
        }
    }

    pub(super) async fn shutdown(&mut self, last: Option<Batch>) {
        if let Some(batch) = last {
            self.deliver(batch).await;
        }
        self.socket = None;
    }
}
