/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2025 ByteDance and/or its affiliates.
 */

use std::future::Future;
use std::time::Instant;

use crate::{StatsdClient, StatsdTagMap};

/// Outcome metrics for one operation, emitted under a child prefix as
/// `<prefix>.ok` or `<prefix>.err` and `<prefix>.time`.
pub struct CallbackTimer {
    client: StatsdClient,
    tags: StatsdTagMap,
    start: Instant,
}

impl CallbackTimer {
    pub fn finish(self, ok: bool) {
        let name = if ok { "ok" } else { "err" };
        self.client.increment(name).with_tags(&self.tags).send();
        self.client
            .timing_since("time", self.start)
            .with_tags(&self.tags)
            .send();
    }
}

impl StatsdClient {
    pub fn callback_timer(&self, prefix: &str, tags: &StatsdTagMap) -> CallbackTimer {
        CallbackTimer {
            client: self.child_client(prefix),
            tags: tags.clone(),
            start: Instant::now(),
        }
    }

    pub fn wrap_result<T, E, F>(&self, prefix: &str, tags: &StatsdTagMap, f: F) -> Result<T, E>
    where
        F: FnOnce() -> Result<T, E>,
    {
        let timer = self.callback_timer(prefix, tags);
        let r = f();
        timer.finish(r.is_ok());
        r
    }

    pub async fn instrument<T, E, F>(&self, prefix: &str, tags: &StatsdTagMap, fut: F) -> Result<T, E>
    where
        F: Future<Output = Result<T, E>>,
    {
        let timer = self.callback_timer(prefix, tags);
        let r = fut.await;
        timer.finish(r.is_ok());
        r
    }
}
