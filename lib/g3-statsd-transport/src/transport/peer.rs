/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2025 ByteDance and/or its affiliates.
 */

use std::net::{IpAddr, SocketAddr};

use crate::{TransportConfigError, TransportError};

/// Host and port of the single configured endpoint, resolved on demand.
#[derive(Clone, Debug)]
pub(super) struct PeerAddr {
    host: String,
    port: u16,
    display: String,
}

impl PeerAddr {
    pub(super) fn new(host: &str, port: u16) -> Result<Self, TransportConfigError> {
        let host = host.trim_start_matches('[').trim_end_matches(']');
        if host.is_empty() {
            return Err(TransportConfigError::EmptyHost);
        }
        let display = match host.parse::<IpAddr>() {
            Ok(IpAddr::V6(ip)) => format!("[{ip}]:{port}"),
            _ => format!("{host}:{port}"),
        };
        Ok(PeerAddr {
            host: host.to_string(),
            port,
            display,
        })
    }

    #[inline]
    pub(super) fn host(&self) -> &str {
        &self.host
    }

    #[inline]
    pub(super) fn as_str(&self) -> &str {
        &self.display
    }

    pub(super) async fn resolve(&self) -> Result<SocketAddr, TransportError> {
        if let Ok(ip) = self.host.parse::<IpAddr>() {
            return Ok(SocketAddr::new(ip, self.port));
        }

        let mut addrs = tokio::net::lookup_host((self.host.as_str(), self.port))
            .await
            .map_err(|e| TransportError::Resolve(self.display.clone(), e))?;
        addrs
            .next()
            .ok_or_else(|| TransportError::NoAddress(self.display.clone()))
    }
}
