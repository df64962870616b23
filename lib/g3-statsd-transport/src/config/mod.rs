/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2025 ByteDance and/or its affiliates.
 */

use std::fmt;
use std::net::IpAddr;
use std::time::Duration;

use crate::transport::{
    ErrorHook, HttpTransportConfig, TcpTransportConfig, Transport, TransportConfig, TransportKind,
    UdpTransportConfig,
};
use crate::{StatsdClient, StatsdTagMap, TransportConfigError};

#[cfg(feature = "yaml")]
mod yaml;

pub(crate) const DEFAULT_HOST: &str = "localhost";
pub(crate) const DEFAULT_PORT: u16 = 8125;
pub(crate) const DEFAULT_SOCKET_TIMEOUT: Duration = Duration::from_secs(1);

fn is_http_url(host: &str) -> bool {
    let lower = host.get(..8).unwrap_or(host).to_ascii_lowercase();
    lower.starts_with("http://") || lower.starts_with("https://")
}

/// All client options in one place. Unset per-transport options keep the
/// defaults of the selected transport config.
#[derive(Clone)]
pub struct StatsdClientConfig {
    host: String,
    port: u16,
    tcp: bool,
    prefix: String,
    tags: StatsdTagMap,
    max_buffer_size: Option<usize>,
    flush_interval: Option<Duration>,
    socket_timeout: Duration,
    headers: Vec<(String, String)>,
    bind_ip: Option<IpAddr>,
    max_segment_size: Option<usize>,
    connect_retry_wait: Option<Duration>,
    max_backlog_size: Option<usize>,
    max_in_flight: Option<usize>,
    request_timeout: Option<Duration>,
    error_hook: Option<ErrorHook>,
}

impl Default for StatsdClientConfig {
    fn default() -> Self {
        StatsdClientConfig {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            tcp: false,
            prefix: String::new(),
            tags: StatsdTagMap::default(),
            max_buffer_size: None,
            flush_interval: None,
            socket_timeout: DEFAULT_SOCKET_TIMEOUT,
            headers: Vec::new(),
            bind_ip: None,
            max_segment_size: None,
            connect_retry_wait: None,
            max_backlog_size: None,
            max_in_flight: None,
            request_timeout: None,
            error_hook: None,
        }
    }
}

impl fmt::Debug for StatsdClientConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StatsdClientConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("tcp", &self.tcp)
            .field("prefix", &self.prefix)
            .field("tags", &self.tags)
            .field("max_buffer_size", &self.max_buffer_size)
            .field("flush_interval", &self.flush_interval)
            .field("socket_timeout", &self.socket_timeout)
            .field("headers", &self.headers)
            .field("bind_ip", &self.bind_ip)
            .field("max_segment_size", &self.max_segment_size)
            .field("connect_retry_wait", &self.connect_retry_wait)
            .field("max_backlog_size", &self.max_backlog_size)
            .field("max_in_flight", &self.max_in_flight)
            .field("request_timeout", &self.request_timeout)
            .field("error_hook", &self.error_hook.is_some())
            .finish()
    }
}

impl StatsdClientConfig {
    /// Host name or address for UDP and TCP, or the full `http(s)://` url.
    pub fn set_host(&mut self, host: &str) {
        self.host = host.to_string();
    }

    pub fn set_port(&mut self, port: u16) {
        self.port = port;
    }

    pub fn set_tcp(&mut self, tcp: bool) {
        self.tcp = tcp;
    }

    pub fn set_prefix(&mut self, prefix: &str) {
        self.prefix = prefix.to_string();
    }

    pub fn add_tag<T: AsRef<str>>(&mut self, key: &str, value: T) {
        self.tags.insert(key, value);
    }

    /// `0` disables buffering, every line is sent on its own.
    pub fn set_max_buffer_size(&mut self, size: usize) {
        self.max_buffer_size = Some(size);
    }

    pub fn set_flush_interval(&mut self, interval: Duration) {
        self.flush_interval = Some(interval);
    }

    pub fn set_socket_timeout(&mut self, timeout: Duration) {
        self.socket_timeout = timeout;
    }

    pub fn add_header(&mut self, name: &str, value: &str) {
        self.headers.push((name.to_string(), value.to_string()));
    }

    pub fn set_bind_ip(&mut self, ip: IpAddr) {
        self.bind_ip = Some(ip);
    }

    pub fn set_max_segment_size(&mut self, size: usize) {
        self.max_segment_size = Some(size);
    }

    pub fn set_connect_retry_wait(&mut self, wait: Duration) {
        self.connect_retry_wait = Some(wait);
    }

    pub fn set_max_backlog_size(&mut self, size: usize) {
        self.max_backlog_size = Some(size);
    }

    pub fn set_max_in_flight(&mut self, max: usize) {
        self.max_in_flight = Some(max);
    }

    pub fn set_request_timeout(&mut self, timeout: Duration) {
        self.request_timeout = Some(timeout);
    }

    pub fn set_error_hook(&mut self, hook: ErrorHook) {
        self.error_hook = Some(hook);
    }

    pub fn backend(&self) -> TransportKind {
        if self.tcp {
            TransportKind::Tcp
        } else if is_http_url(&self.host) {
            TransportKind::Http
        } else {
            TransportKind::Udp
        }
    }

    pub fn transport_config(&self) -> Result<TransportConfig, TransportConfigError> {
        if self.host.is_empty() {
            return Err(TransportConfigError::EmptyHost);
        }

        let config = match self.backend() {
            TransportKind::Udp => {
                let mut c = UdpTransportConfig::new(&self.host, self.port);
                if let Some(size) = self.max_buffer_size {
                    c.set_max_buffer_size(size);
                }
                if let Some(interval) = self.flush_interval {
                    c.set_flush_interval(interval);
                }
                c.set_socket_timeout(self.socket_timeout);
                if let Some(ip) = self.bind_ip {
                    c.set_bind_ip(ip);
                }
                if let Some(size) = self.max_segment_size {
                    c.set_max_segment_size(size);
                }
                TransportConfig::Udp(c)
            }
            TransportKind::Tcp => {
                let mut c = TcpTransportConfig::new(&self.host, self.port);
                if let Some(size) = self.max_buffer_size {
                    c.set_max_buffer_size(size);
                }
                if let Some(interval) = self.flush_interval {
                    c.set_flush_interval(interval);
                }
                c.set_socket_timeout(self.socket_timeout);
                if let Some(wait) = self.connect_retry_wait {
                    c.set_connect_retry_wait(wait);
                }
                if let Some(size) = self.max_backlog_size {
                    c.set_max_backlog_size(size);
                }
                TransportConfig::Tcp(c)
            }
            TransportKind::Http => {
                let mut c = HttpTransportConfig::new(&self.host)?;
                if let Some(size) = self.max_buffer_size {
                    c.set_max_buffer_size(size);
                }
                if let Some(interval) = self.flush_interval {
                    c.set_flush_interval(interval);
                }
                c.set_socket_timeout(self.socket_timeout);
                for (name, value) in &self.headers {
                    c.set_header(name, value)?;
                }
                if let Some(max) = self.max_in_flight {
                    c.set_max_in_flight(max);
                }
                if let Some(timeout) = self.request_timeout {
                    c.set_request_timeout(timeout);
                }
                if let Some(size) = self.max_backlog_size {
                    c.set_max_backlog_size(size);
                }
                TransportConfig::Http(c)
            }
        };
        Ok(config)
    }

    /// Start the transport on the current tokio runtime and return the
    /// owning client.
    pub fn build(&self) -> Result<StatsdClient, TransportConfigError> {
        let config = self.transport_config()?;
        let transport = Transport::spawn(config, self.error_hook.clone())?;
        Ok(StatsdClient::new_owner(
            &self.prefix,
            transport,
            self.tags.clone(),
        ))
    }
}
