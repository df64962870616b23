/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2025 ByteDance and/or its affiliates.
 */

use std::time::{Duration, Instant};

use g3_statsd_transport::StatsdClientConfig;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let mut config = StatsdClientConfig::default();
    if let Some(host) = std::env::args().nth(1) {
        config.set_host(&host);
    }
    config.set_prefix("statsd-client-test");
    config.add_tag("source", "trivial");
    let client = config.build()?;

    let start = Instant::now();
    client.increment("counter").send();
    client.gauge("gauge", 1).send();
    client.gauge_delta("gauge", -1).send();
    client.set("set", "unique-value").send();
    client.histogram("histogram", 42).with_tag("k", "v").send();

    tokio::time::sleep(Duration::from_millis(100)).await;
    client.timing_since("timer", start).send();

    let child = client.child_client("child");
    child.increment_by("counter", 5).send();

    client.shutdown().await;
    Ok(())
}
