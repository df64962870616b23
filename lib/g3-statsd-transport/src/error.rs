/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2025 ByteDance and/or its affiliates.
 */

use std::io;

use thiserror::Error;

/// Errors returned synchronously when a transport is constructed.
#[derive(Debug, Error)]
pub enum TransportConfigError {
    #[error("no target host has been set")]
    EmptyHost,
    #[error("invalid url {0}: {1}")]
    InvalidUrl(String, http::uri::InvalidUri),
    #[error("unsupported url scheme {0}")]
    UnsupportedScheme(String),
    #[error("no host found in url {0}")]
    NoUrlHost(String),
    #[error("invalid http header name {0}")]
    InvalidHeaderName(String),
    #[error("invalid value for http header {0}")]
    InvalidHeaderValue(String),
    #[error("invalid tls server name {0}")]
    InvalidServerName(String),
    #[error("tls client setup failed: {0}")]
    Tls(#[from] rustls::Error),
    #[error("no tokio runtime found in current context")]
    NoRuntime,
}

/// Reason why buffered metric data was given up on.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DropReason {
    BacklogFull,
    Closed,
}

impl DropReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            DropReason::BacklogFull => "backlog full",
            DropReason::Closed => "transport closed",
        }
    }
}

/// Delivery errors. They never reach the caller of `send` or `close`,
/// only the optional error hook and the log.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("failed to resolve {0}: {1}")]
    Resolve(String, io::Error),
    #[error("no address resolved for {0}")]
    NoAddress(String),
    #[error("failed to setup socket: {0}")]
    Socket(io::Error),
    #[error("failed to send data: {0}")]
    Send(io::Error),
    #[error("failed to connect to {0}: {1}")]
    Connect(String, io::Error),
    #[error("connection lost: {0}")]
    ConnectionLost(io::Error),
    #[error("connection closed by peer")]
    ClosedByPeer,
    #[error("timed out to {0}")]
    Timeout(&'static str),
    #[error("tls handshake failed: {0}")]
    Tls(io::Error),
    #[error("unexpected http response status code {0}")]
    HttpStatus(u16),
    #[error("invalid http response: {0}")]
    InvalidResponse(&'static str),
    #[error("{lines} lines dropped: {}", reason.as_str())]
    Dropped { lines: usize, reason: DropReason },
}
