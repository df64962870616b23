/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2025 ByteDance and/or its affiliates.
 */

use std::time::Duration;

use smallvec::SmallVec;
use tokio::time::Instant;

const LINE_SEPARATOR: u8 = b'\n';

/// What released a batch for delivery.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FlushTrigger {
    Size,
    Time,
    Explicit,
}

/// Newline joined metric lines that will be delivered as one unit.
#[derive(Debug)]
pub struct Batch {
    buf: Vec<u8>,
    lines: usize,
    trigger: FlushTrigger,
}

impl Batch {
    fn with_capacity(capacity: usize) -> Self {
        Batch {
            buf: Vec::with_capacity(capacity),
            lines: 0,
            trigger: FlushTrigger::Size,
        }
    }

    fn single(line: &str) -> Self {
        Batch {
            buf: line.as_bytes().to_vec(),
            lines: 1,
            trigger: FlushTrigger::Size,
        }
    }

    fn push_line(&mut self, line: &str) {
        if self.lines > 0 {
            self.buf.push(LINE_SEPARATOR);
        }
        self.buf.extend_from_slice(line.as_bytes());
        self.lines += 1;
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.lines == 0
    }

    #[inline]
    pub fn line_count(&self) -> usize {
        self.lines
    }

    #[inline]
    pub fn trigger(&self) -> FlushTrigger {
        self.trigger
    }

    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    pub fn lines(&self) -> impl Iterator<Item = &[u8]> {
        self.buf.split(|b| *b == LINE_SEPARATOR)
    }

    /// Split the payload at line boundaries into chunks of at most `max_size`
    /// bytes. A line longer than `max_size` is yielded on its own.
    pub fn segments(&self, max_size: usize) -> BatchSegments<'_> {
        BatchSegments {
            left: &self.buf,
            max_size,
        }
    }

    pub(crate) fn into_terminated(mut self) -> Vec<u8> {
        self.buf.push(LINE_SEPARATOR);
        self.buf
    }

    pub(crate) fn into_bytes(self) -> Vec<u8> {
        self.buf
    }
}

pub struct BatchSegments<'a> {
    left: &'a [u8],
    max_size: usize,
}

impl<'a> Iterator for BatchSegments<'a> {
    type Item = &'a [u8];

    fn next(&mut self) -> Option<Self::Item> {
        if self.left.is_empty() {
            return None;
        }
        if self.left.len() <= self.max_size {
            let seg = self.left;
            self.left = &[];
            return Some(seg);
        }

        // the last separator that keeps the segment within limit
        let end = match memchr::memrchr(LINE_SEPARATOR, &self.left[..=self.max_size]) {
            Some(p) if p > 0 => p,
            _ => memchr::memchr(LINE_SEPARATOR, self.left).unwrap_or(self.left.len()),
        };
        let seg = &self.left[..end];
        self.left = if end < self.left.len() {
            &self.left[end + 1..]
        } else {
            &[]
        };
        Some(seg)
    }
}

/// Batches ready for delivery, in the order they must be sent.
pub type FlushDecision = SmallVec<[Batch; 2]>;

/// Accumulates metric lines and decides when the pending batch is released.
///
/// It is owned by the single task that drives a transport, so the size
/// path and the timer path never drain the same lines.
pub struct BufferManager {
    max_buffer_size: usize,
    flush_interval: Duration,
    batch: Batch,
    deadline: Option<Instant>,
}

impl BufferManager {
    pub fn new(max_buffer_size: usize, flush_interval: Duration) -> Self {
        BufferManager {
            max_buffer_size,
            flush_interval,
            batch: Batch::with_capacity(max_buffer_size),
            deadline: None,
        }
    }

    #[inline]
    pub fn is_unbuffered(&self) -> bool {
        self.max_buffer_size == 0
    }

    #[inline]
    pub fn pending_size(&self) -> usize {
        self.batch.len()
    }

    #[inline]
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn append(&mut self, line: &str) -> FlushDecision {
        let mut ready = FlushDecision::new();
        if self.is_unbuffered() {
            ready.push(Batch::single(line));
            return ready;
        }

        if !self.batch.is_empty() && self.batch.len() + 1 + line.len() > self.max_buffer_size {
            if let Some(batch) = self.drain(FlushTrigger::Size) {
                ready.push(batch);
            }
        }

        if self.batch.is_empty() {
            self.deadline = Some(Instant::now() + self.flush_interval);
        }
        self.batch.push_line(line);

        if self.batch.len() >= self.max_buffer_size {
            if let Some(batch) = self.drain(FlushTrigger::Size) {
                ready.push(batch);
            }
        }
        ready
    }

    pub fn drain(&mut self, trigger: FlushTrigger) -> Option<Batch> {
        self.deadline = None;
        if self.batch.is_empty() {
            return None;
        }
        let mut batch = std::mem::replace(
            &mut self.batch,
            Batch::with_capacity(self.max_buffer_size),
        );
        batch.trigger = trigger;
        Some(batch)
    }

    #[inline]
    pub fn force_flush(&mut self) -> Option<Batch> {
        self.drain(FlushTrigger::Explicit)
    }

    /// Resolves when the pending batch is due for a time triggered flush.
    /// Never resolves while nothing is pending.
    pub async fn flush_timer(&self) {
        match self.deadline {
            Some(deadline) => tokio::time::sleep_until(deadline).await,
            None => std::future::pending().await,
        }
    }
}
