/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2025 ByteDance and/or its affiliates.
 */

use std::sync::Arc;

use crate::StatsdTagMap;
use crate::transport::Transport;

mod formatter;
pub use formatter::MetricFormatter;

fn normalize_prefix(prefix: &str) -> String {
    if prefix.is_empty() || prefix.ends_with('.') {
        prefix.to_string()
    } else {
        format!("{prefix}.")
    }
}

/// Formats metric lines and hands them to a possibly shared transport.
///
/// Only the client that created the transport may close it. Child clients
/// and clients built with [`StatsdClient::with_transport`] just share it.
pub struct StatsdClient {
    prefix: String,
    transport: Arc<Transport>,
    tags: StatsdTagMap,
    owns_transport: bool,
}

impl StatsdClient {
    pub(crate) fn new_owner(prefix: &str, transport: Transport, tags: StatsdTagMap) -> Self {
        StatsdClient {
            prefix: normalize_prefix(prefix),
            transport: Arc::new(transport),
            tags,
            owns_transport: true,
        }
    }

    pub fn with_transport(prefix: &str, transport: Arc<Transport>) -> Self {
        StatsdClient {
            prefix: normalize_prefix(prefix),
            transport,
            tags: StatsdTagMap::default(),
            owns_transport: false,
        }
    }

    /// Add a global tag, sent with every metric of this client.
    pub fn with_tag<T: AsRef<str>>(mut self, key: &str, value: T) -> Self {
        self.tags.insert(key, value);
        self
    }

    #[inline]
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    #[inline]
    pub fn tags(&self) -> &StatsdTagMap {
        &self.tags
    }

    #[inline]
    pub fn transport(&self) -> &Arc<Transport> {
        &self.transport
    }

    #[inline]
    pub fn owns_transport(&self) -> bool {
        self.owns_transport
    }

    /// A client for `<prefix><extra_prefix>.` on the same transport, with
    /// the same global tags.
    pub fn child_client(&self, extra_prefix: &str) -> StatsdClient {
        let prefix = format!("{}{extra_prefix}", self.prefix);
        StatsdClient {
            prefix: normalize_prefix(&prefix),
            transport: Arc::clone(&self.transport),
            tags: self.tags.clone(),
            owns_transport: false,
        }
    }

    /// Send data as is, for statsd extensions not covered here.
    pub fn raw(&self, data: &str) {
        self.transport.send(data);
    }

    /// Flush and close the transport. No-op on a non-owning client.
    pub fn close(&self) {
        if self.owns_transport {
            self.transport.close();
        }
    }

    /// Close and wait until the final flush has been attempted.
    pub async fn shutdown(&self) {
        if self.owns_transport {
            self.transport.close();
            self.transport.closed().await;
        }
    }
}
