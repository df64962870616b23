/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2025 ByteDance and/or its affiliates.
 */

mod error;
pub use error::{DropReason, TransportConfigError, TransportError};

pub mod transport;
pub use transport::{Transport, TransportConfig, TransportKind, TransportState};

mod client;
pub use client::{MetricFormatter, StatsdClient};

mod tag;
pub use tag::StatsdTagMap;

mod config;
pub use config::StatsdClientConfig;

mod helper;
pub use helper::CallbackTimer;
