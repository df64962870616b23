/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2025 ByteDance and/or its affiliates.
 */

use std::io::Write;
use std::time::Duration;

use http::uri::PathAndQuery;
use http::{HeaderMap, HeaderName, HeaderValue, Uri};

use crate::TransportConfigError;
use crate::transport::BufferManager;

const DEFAULT_HTTP_MAX_BUFFER_SIZE: usize = 10000;

#[derive(Clone, Debug)]
pub struct HttpTransportConfig {
    url: Uri,
    pub(super) tls: bool,
    pub(super) host: String,
    pub(super) port: u16,
    api_path: PathAndQuery,
    headers: HeaderMap,
    max_buffer_size: usize,
    flush_interval: Option<Duration>,
    socket_timeout: Duration,
    pub(super) request_timeout: Duration,
    pub(super) max_in_flight: usize,
    pub(super) max_backlog_size: usize,
    pub(super) rsp_head_max_size: usize,
}

impl HttpTransportConfig {
    /// Parse the target url, only `http` and `https` are supported.
    pub fn new(url: &str) -> Result<Self, TransportConfigError> {
        let uri = url
            .parse::<Uri>()
            .map_err(|e| TransportConfigError::InvalidUrl(url.to_string(), e))?;

        let tls = match uri.scheme_str().map(|s| s.to_ascii_lowercase()) {
            Some(s) if s == "http" => false,
            Some(s) if s == "https" => true,
            Some(s) => return Err(TransportConfigError::UnsupportedScheme(s)),
            None => return Err(TransportConfigError::UnsupportedScheme(String::new())),
        };
        let host = match uri.host() {
            Some(h) if !h.is_empty() => h.trim_start_matches('[').trim_end_matches(']'),
            _ => return Err(TransportConfigError::NoUrlHost(url.to_string())),
        };
        let port = uri.port_u16().unwrap_or(if tls { 443 } else { 80 });
        let api_path = uri
            .path_and_query()
            .cloned()
            .unwrap_or_else(|| PathAndQuery::from_static("/"));

        Ok(HttpTransportConfig {
            host: host.to_string(),
            port,
            tls,
            api_path,
            url: uri,
            headers: HeaderMap::new(),
            max_buffer_size: DEFAULT_HTTP_MAX_BUFFER_SIZE,
            flush_interval: None,
            socket_timeout: crate::config::DEFAULT_SOCKET_TIMEOUT,
            request_timeout: Duration::from_secs(10),
            max_in_flight: 64,
            max_backlog_size: 1 << 20,
            rsp_head_max_size: 8192,
        })
    }

    #[inline]
    pub fn url(&self) -> &Uri {
        &self.url
    }

    pub fn set_header(&mut self, name: &str, value: &str) -> Result<(), TransportConfigError> {
        let name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|_| TransportConfigError::InvalidHeaderName(name.to_string()))?;
        let value = HeaderValue::from_str(value)
            .map_err(|_| TransportConfigError::InvalidHeaderValue(name.to_string()))?;
        self.headers.append(name, value);
        Ok(())
    }

    pub fn set_headers(&mut self, headers: HeaderMap) {
        self.headers = headers;
    }

    pub fn set_max_buffer_size(&mut self, size: usize) {
        self.max_buffer_size = size;
    }

    pub fn set_flush_interval(&mut self, interval: Duration) {
        self.flush_interval = Some(interval);
    }

    /// Used as the flush interval if that is not set.
    pub fn set_socket_timeout(&mut self, timeout: Duration) {
        self.socket_timeout = timeout;
    }

    pub fn set_request_timeout(&mut self, timeout: Duration) {
        self.request_timeout = timeout;
    }

    pub fn set_max_in_flight(&mut self, max: usize) {
        self.max_in_flight = max.max(1);
    }

    /// Byte cap for batches waiting on a free request slot.
    pub fn set_max_backlog_size(&mut self, size: usize) {
        self.max_backlog_size = size;
    }

    pub(crate) fn buffer_manager(&self) -> BufferManager {
        BufferManager::new(
            self.max_buffer_size,
            self.flush_interval.unwrap_or(self.socket_timeout),
        )
    }

    pub(super) fn write_fixed_header(&self, header_buf: &mut Vec<u8>, body_len: usize) {
        header_buf.extend_from_slice(b"POST ");
        header_buf.extend_from_slice(self.api_path.as_str().as_bytes());
        header_buf.extend_from_slice(b" HTTP/1.1\r\n");
        header_buf.extend_from_slice(b"Host: ");
        match self.url.authority() {
            Some(authority) => header_buf.extend_from_slice(authority.host().as_bytes()),
            None => header_buf.extend_from_slice(self.host.as_bytes()),
        }
        if let Some(port) = self.url.port_u16() {
            let _ = write!(header_buf, ":{port}");
        }
        header_buf.extend_from_slice(b"\r\n");
        header_buf.extend_from_slice(b"Connection: close\r\n");
        if !self.headers.contains_key(http::header::CONTENT_TYPE) {
            header_buf.extend_from_slice(b"Content-Type: text/plain\r\n");
        }
        let _ = write!(header_buf, "Content-Length: {body_len}\r\n");
        for (header, value) in &self.headers {
            header_buf.extend_from_slice(header.as_str().as_bytes());
            header_buf.extend_from_slice(b": ");
            header_buf.extend_from_slice(value.as_bytes());
            header_buf.extend_from_slice(b"\r\n");
        }
        header_buf.extend_from_slice(b"\r\n");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_url() {
        let config = HttpTransportConfig::new("http://localhost:8125").unwrap();
        assert!(!config.tls);
        assert_eq!(config.host, "localhost");
        assert_eq!(config.port, 8125);
        assert_eq!(config.api_path.as_str(), "/");

        let config = HttpTransportConfig::new("HTTPS://metrics.example.net/v1/push?a=b").unwrap();
        assert!(config.tls);
        assert_eq!(config.host, "metrics.example.net");
        assert_eq!(config.port, 443);
        assert_eq!(config.api_path.as_str(), "/v1/push?a=b");

        let config = HttpTransportConfig::new("http://[::1]:9000/").unwrap();
        assert_eq!(config.host, "::1");
        assert_eq!(config.port, 9000);

        let config = HttpTransportConfig::new("http://127.0.0.1").unwrap();
        assert_eq!(config.port, 80);
    }

    #[test]
    fn parse_url_err() {
        assert!(matches!(
            HttpTransportConfig::new("ftp://localhost"),
            Err(TransportConfigError::UnsupportedScheme(_))
        ));
        assert!(matches!(
            HttpTransportConfig::new("localhost:8125"),
            Err(TransportConfigError::UnsupportedScheme(_))
        ));
        assert!(matches!(
            HttpTransportConfig::new("some_other_host.sbhr.dk"),
            Err(TransportConfigError::UnsupportedScheme(_))
        ));
        assert!(matches!(
            HttpTransportConfig::new("http://"),
            Err(TransportConfigError::InvalidUrl(_, _))
        ));
        assert!(HttpTransportConfig::new("http://local host/").is_err());
    }

    #[test]
    fn headers() {
        let mut config = HttpTransportConfig::new("http://localhost:8125/metrics").unwrap();
        config.set_header("X-Test", "Test").unwrap();
        assert!(config.set_header("Bad Header", "v").is_err());
        assert!(config.set_header("X-Ok", "bad\nvalue").is_err());

        let mut buf = Vec::new();
        config.write_fixed_header(&mut buf, 11);
        assert_eq!(
            String::from_utf8(buf).unwrap(),
            "POST /metrics HTTP/1.1\r\n\
             Host: localhost:8125\r\n\
             Connection: close\r\n\
             Content-Type: text/plain\r\n\
             Content-Length: 11\r\n\
             x-test: Test\r\n\
             \r\n"
        );
    }

    #[test]
    fn content_type_override() {
        let mut config = HttpTransportConfig::new("http://localhost/").unwrap();
        config.set_header("Content-Type", "application/x-statsd").unwrap();

        let mut buf = Vec::new();
        config.write_fixed_header(&mut buf, 0);
        let head = String::from_utf8(buf).unwrap();
        assert!(head.starts_with("POST / HTTP/1.1\r\nHost: localhost\r\n"));
        assert!(!head.contains("text/plain"));
        assert!(head.contains("content-type: application/x-statsd\r\n"));
    }
}
