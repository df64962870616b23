/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2025 ByteDance and/or its affiliates.
 */

use std::time::{Duration, Instant};

use itoa::Integer;
use ryu::Float;

use super::StatsdClient;
use crate::StatsdTagMap;

enum MetricType {
    Count,
    Gauge,
    Set,
    Timing,
    Histogram,
}

impl MetricType {
    fn as_str(&self) -> &'static str {
        match self {
            MetricType::Count => "c",
            MetricType::Gauge => "g",
            MetricType::Set => "s",
            MetricType::Timing => "ms",
            MetricType::Histogram => "h",
        }
    }
}

/// One metric line under construction, sent on [`MetricFormatter::send`].
#[must_use = "metrics are only sent by calling send()"]
pub struct MetricFormatter<'a> {
    client: &'a StatsdClient,
    metric_type: MetricType,
    name: &'a str,
    value: String,
    local_tags: StatsdTagMap,
}

fn format_int<T: Integer>(value: T) -> String {
    let mut buffer = itoa::Buffer::new();
    buffer.format(value).to_string()
}

fn format_float<T: Float>(value: T) -> String {
    let mut buffer = ryu::Buffer::new();
    buffer.format(value).to_string()
}

fn format_signed(delta: i64) -> String {
    let mut buffer = itoa::Buffer::new();
    let abs = buffer.format(delta.unsigned_abs());
    let mut value = String::with_capacity(abs.len() + 1);
    value.push(if delta < 0 { '-' } else { '+' });
    value.push_str(abs);
    value
}

impl StatsdClient {
    pub fn counter<'a, T: Integer>(&'a self, name: &'a str, delta: T) -> MetricFormatter<'a> {
        self.metric_with_type(MetricType::Count, name, format_int(delta))
    }

    pub fn increment<'a>(&'a self, name: &'a str) -> MetricFormatter<'a> {
        self.counter(name, 1u8)
    }

    pub fn increment_by<'a>(&'a self, name: &'a str, delta: i64) -> MetricFormatter<'a> {
        self.counter(name, delta.unsigned_abs())
    }

    pub fn decrement<'a>(&'a self, name: &'a str) -> MetricFormatter<'a> {
        self.counter(name, -1i8)
    }

    pub fn decrement_by<'a>(&'a self, name: &'a str, delta: i64) -> MetricFormatter<'a> {
        let mut value = format_int(delta.unsigned_abs());
        if delta != 0 {
            value.insert(0, '-');
        }
        self.metric_with_type(MetricType::Count, name, value)
    }

    pub fn gauge<'a, T: Integer>(&'a self, name: &'a str, value: T) -> MetricFormatter<'a> {
        self.metric_with_type(MetricType::Gauge, name, format_int(value))
    }

    pub fn gauge_float<'a, T: Float>(&'a self, name: &'a str, value: T) -> MetricFormatter<'a> {
        self.metric_with_type(MetricType::Gauge, name, format_float(value))
    }

    /// Relative gauge change, always sent with an explicit sign.
    pub fn gauge_delta<'a>(&'a self, name: &'a str, delta: i64) -> MetricFormatter<'a> {
        self.metric_with_type(MetricType::Gauge, name, format_signed(delta))
    }

    pub fn set<'a>(&'a self, name: &'a str, value: &str) -> MetricFormatter<'a> {
        self.metric_with_type(MetricType::Set, name, value.to_string())
    }

    pub fn timing<'a>(&'a self, name: &'a str, time: Duration) -> MetricFormatter<'a> {
        self.metric_with_type(MetricType::Timing, name, format_int(time.as_millis()))
    }

    pub fn timing_since<'a>(&'a self, name: &'a str, start: Instant) -> MetricFormatter<'a> {
        self.timing(name, start.elapsed())
    }

    pub fn histogram<'a, T: Integer>(&'a self, name: &'a str, value: T) -> MetricFormatter<'a> {
        self.metric_with_type(MetricType::Histogram, name, format_int(value))
    }

    pub fn histogram_float<'a, T: Float>(
        &'a self,
        name: &'a str,
        value: T,
    ) -> MetricFormatter<'a> {
        self.metric_with_type(MetricType::Histogram, name, format_float(value))
    }

    fn metric_with_type<'a>(
        &'a self,
        metric_type: MetricType,
        name: &'a str,
        value: String,
    ) -> MetricFormatter<'a> {
        MetricFormatter {
            client: self,
            metric_type,
            name,
            value,
            local_tags: StatsdTagMap::default(),
        }
    }
}

impl MetricFormatter<'_> {
    pub fn with_tag<T: AsRef<str>>(mut self, key: &str, value: T) -> Self {
        self.local_tags.insert(key, value);
        self
    }

    pub fn with_tags(mut self, tags: &StatsdTagMap) -> Self {
        self.local_tags.extend(tags);
        self
    }

    fn format(&self) -> String {
        let prefix = self.client.prefix.as_str();
        let mut line = String::with_capacity(
            prefix.len() + self.name.len() + self.value.len() + 4 + self.local_tags.len() * 16,
        );
        line.push_str(prefix);
        line.push_str(self.name);
        line.push(':');
        line.push_str(&self.value);
        line.push('|');
        line.push_str(self.metric_type.as_str());
        StatsdTagMap::write_merged(&mut line, &self.client.tags, &self.local_tags);
        line
    }

    pub fn send(self) {
        let line = self.format();
        self.client.transport.send_line(line);
    }
}
