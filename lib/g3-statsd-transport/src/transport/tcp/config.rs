/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2025 ByteDance and/or its affiliates.
 */

use std::time::Duration;

use crate::transport::BufferManager;

const DEFAULT_TCP_MAX_BUFFER_SIZE: usize = 1200;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TcpTransportConfig {
    pub(super) host: String,
    pub(super) port: u16,
    pub(super) max_buffer_size: usize,
    pub(super) flush_interval: Option<Duration>,
    pub(super) socket_timeout: Duration,
    pub(super) connect_timeout: Duration,
    pub(super) connect_retry_wait: Duration,
    pub(super) write_timeout: Duration,
    pub(super) max_backlog_size: usize,
}

impl Default for TcpTransportConfig {
    fn default() -> Self {
        TcpTransportConfig::new(crate::config::DEFAULT_HOST, crate::config::DEFAULT_PORT)
    }
}

impl TcpTransportConfig {
    pub fn new(host: &str, port: u16) -> Self {
        TcpTransportConfig {
            host: host.to_string(),
            port,
            max_buffer_size: DEFAULT_TCP_MAX_BUFFER_SIZE,
            flush_interval: None,
            socket_timeout: crate::config::DEFAULT_SOCKET_TIMEOUT,
            connect_timeout: Duration::from_secs(10),
            connect_retry_wait: Duration::from_secs(1),
            write_timeout: Duration::from_secs(5),
            max_backlog_size: 1 << 20,
        }
    }

    pub fn set_max_buffer_size(&mut self, size: usize) {
        self.max_buffer_size = size;
    }

    pub fn set_flush_interval(&mut self, interval: Duration) {
        self.flush_interval = Some(interval);
    }

    /// Idle time before an unused connection is closed.
    pub fn set_socket_timeout(&mut self, timeout: Duration) {
        self.socket_timeout = timeout;
    }

    pub fn set_connect_timeout(&mut self, timeout: Duration) {
        self.connect_timeout = timeout;
    }

    pub fn set_connect_retry_wait(&mut self, wait: Duration) {
        self.connect_retry_wait = wait;
    }

    pub fn set_write_timeout(&mut self, timeout: Duration) {
        self.write_timeout = timeout;
    }

    /// Max bytes kept while the peer is unreachable. Oldest batches go first.
    pub fn set_max_backlog_size(&mut self, size: usize) {
        self.max_backlog_size = size;
    }

    pub(crate) fn buffer_manager(&self) -> BufferManager {
        BufferManager::new(
            self.max_buffer_size,
            self.flush_interval.unwrap_or(self.socket_timeout),
        )
    }
}
