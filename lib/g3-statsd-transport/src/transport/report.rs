/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2025 ByteDance and/or its affiliates.
 */

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use log::warn;

use super::TransportKind;
use crate::TransportError;

/// Observer for delivery errors that are otherwise absorbed by the transport.
pub type ErrorHook = Arc<dyn Fn(&TransportError) + Send + Sync>;

#[derive(Clone)]
pub(crate) struct ErrorReporter {
    kind: TransportKind,
    hook: Option<ErrorHook>,
    create_instant: Instant,
    last_report: Arc<AtomicU64>,
}

impl fmt::Debug for ErrorReporter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ErrorReporter")
            .field("kind", &self.kind)
            .field("hook", &self.hook.is_some())
            .finish()
    }
}

impl ErrorReporter {
    pub(crate) fn new(kind: TransportKind, hook: Option<ErrorHook>) -> Self {
        ErrorReporter {
            kind,
            hook,
            create_instant: Instant::now(),
            last_report: Arc::new(AtomicU64::new(u64::MAX)),
        }
    }

    pub(crate) fn report(&self, e: TransportError) {
        if let Some(hook) = &self.hook {
            hook(&e);
        }

        let time_slice = self.create_instant.elapsed().as_secs() >> 6; // every 64s
        if self.last_report.swap(time_slice, Ordering::Relaxed) != time_slice {
            warn!("statsd {} transport: {e}", self.kind.as_str());
        }
    }
}
