/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2025 ByteDance and/or its affiliates.
 */

use std::net::IpAddr;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, anyhow};
use humanize_rs::ParseError;
use humanize_rs::bytes::Bytes;
use yaml_rust::{Yaml, yaml};

use super::StatsdClientConfig;

fn normalize_key(raw: &str) -> String {
    raw.to_lowercase().replace('-', "_")
}

fn foreach_kv<F>(table: &yaml::Hash, mut f: F) -> anyhow::Result<()>
where
    F: FnMut(&str, &Yaml) -> anyhow::Result<()>,
{
    for (k, v) in table.iter() {
        if let Yaml::String(key) = k {
            f(key, v).context(format!("failed to parse value of key {key}"))?;
        } else {
            return Err(anyhow!("key in hash should be string"));
        }
    }
    Ok(())
}

fn as_string(v: &Yaml) -> anyhow::Result<String> {
    match v {
        Yaml::String(s) => Ok(s.to_string()),
        Yaml::Integer(i) => Ok(i.to_string()),
        Yaml::Real(s) => Ok(s.to_string()),
        _ => Err(anyhow!(
            "yaml value type for string should be 'string', 'integer' or 'real'"
        )),
    }
}

fn as_bool(v: &Yaml) -> anyhow::Result<bool> {
    match v {
        Yaml::Boolean(b) => Ok(*b),
        Yaml::String(s) => match s.to_lowercase().as_str() {
            "on" | "true" | "yes" | "1" => Ok(true),
            "off" | "false" | "no" | "0" => Ok(false),
            _ => Err(anyhow!("invalid yaml string value for bool: {s}")),
        },
        Yaml::Integer(i) => Ok(*i != 0),
        _ => Err(anyhow!(
            "yaml value type for bool should be 'boolean', 'string' or 'integer'"
        )),
    }
}

fn as_u16(v: &Yaml) -> anyhow::Result<u16> {
    match v {
        Yaml::String(s) => Ok(u16::from_str(s)?),
        Yaml::Integer(i) => Ok(u16::try_from(*i)?),
        _ => Err(anyhow!(
            "yaml value type for u16 should be 'string' or 'integer'"
        )),
    }
}

fn as_usize(v: &Yaml) -> anyhow::Result<usize> {
    match v {
        Yaml::String(value) => {
            let v = value.parse::<Bytes>()?;
            Ok(v.size())
        }
        Yaml::Integer(value) => Ok(usize::try_from(*value)?),
        _ => Err(anyhow!(
            "yaml value type for humanize usize should be 'string' or 'integer'"
        )),
    }
}

fn as_duration(v: &Yaml) -> anyhow::Result<Duration> {
    match v {
        Yaml::String(value) => match humanize_rs::duration::parse(value) {
            Ok(v) => Ok(v),
            Err(ParseError::MissingUnit) => {
                if let Ok(u) = u64::from_str(value) {
                    Ok(Duration::from_secs(u))
                } else if let Ok(f) = f64::from_str(value) {
                    Duration::try_from_secs_f64(f).map_err(anyhow::Error::new)
                } else {
                    Err(anyhow!("invalid duration string"))
                }
            }
            Err(e) => Err(anyhow!("invalid humanize duration string: {e}")),
        },
        Yaml::Integer(value) => {
            if let Ok(u) = u64::try_from(*value) {
                Ok(Duration::from_secs(u))
            } else {
                Err(anyhow!("unsupported duration value"))
            }
        }
        Yaml::Real(s) => {
            let f = f64::from_str(s).map_err(|e| anyhow!("invalid f64 value: {e}"))?;
            Duration::try_from_secs_f64(f).map_err(anyhow::Error::new)
        }
        _ => Err(anyhow!(
            "yaml value type for humanize duration should be 'string', 'integer' or 'real'"
        )),
    }
}

impl StatsdClientConfig {
    pub fn parse_yaml(v: &Yaml) -> anyhow::Result<Self> {
        if let Yaml::Hash(map) = v {
            let mut config = StatsdClientConfig::default();
            foreach_kv(map, |k, v| config.set_by_yaml_kv(k, v))?;
            Ok(config)
        } else {
            Err(anyhow!(
                "yaml value type for 'statsd client config' should be 'map'"
            ))
        }
    }

    fn set_by_yaml_kv(&mut self, k: &str, v: &Yaml) -> anyhow::Result<()> {
        match normalize_key(k).as_str() {
            "host" | "url" => {
                let host = as_string(v).context(format!("invalid string value for key {k}"))?;
                self.set_host(&host);
            }
            "port" => {
                self.port = as_u16(v).context(format!("invalid u16 value for key {k}"))?;
            }
            "tcp" => {
                self.tcp = as_bool(v).context(format!("invalid bool value for key {k}"))?;
            }
            "prefix" => {
                let prefix = as_string(v).context(format!("invalid string value for key {k}"))?;
                self.set_prefix(&prefix);
            }
            "tags" | "global_tags" => {
                let Yaml::Hash(map) = v else {
                    return Err(anyhow!("yaml value type for key {k} should be 'map'"));
                };
                foreach_kv(map, |tk, tv| {
                    let value = as_string(tv)?;
                    self.add_tag(tk, value);
                    Ok(())
                })?;
            }
            "headers" => {
                let Yaml::Hash(map) = v else {
                    return Err(anyhow!("yaml value type for key {k} should be 'map'"));
                };
                foreach_kv(map, |hk, hv| {
                    let value = as_string(hv)?;
                    self.add_header(hk, &value);
                    Ok(())
                })?;
            }
            "max_buffer_size" => {
                let size = as_usize(v)
                    .context(format!("invalid humanize usize value for key {k}"))?;
                self.set_max_buffer_size(size);
            }
            "flush_interval" => {
                let interval = as_duration(v)
                    .context(format!("invalid humanize duration value for key {k}"))?;
                self.set_flush_interval(interval);
            }
            "socket_timeout" => {
                self.socket_timeout = as_duration(v)
                    .context(format!("invalid humanize duration value for key {k}"))?;
            }
            "bind_ip" | "bind" => {
                let s = as_string(v).context(format!("invalid string value for key {k}"))?;
                let ip = IpAddr::from_str(&s).map_err(|e| anyhow!("invalid ip address: {e}"))?;
                self.set_bind_ip(ip);
            }
            "max_segment_size" => {
                let size = as_usize(v)
                    .context(format!("invalid humanize usize value for key {k}"))?;
                self.set_max_segment_size(size);
            }
            "connect_retry_wait" => {
                let wait = as_duration(v)
                    .context(format!("invalid humanize duration value for key {k}"))?;
                self.set_connect_retry_wait(wait);
            }
            "max_backlog_size" => {
                let size = as_usize(v)
                    .context(format!("invalid humanize usize value for key {k}"))?;
                self.set_max_backlog_size(size);
            }
            "max_in_flight" => {
                let max = as_usize(v)
                    .context(format!("invalid humanize usize value for key {k}"))?;
                self.set_max_in_flight(max);
            }
            "request_timeout" => {
                let timeout = as_duration(v)
                    .context(format!("invalid humanize duration value for key {k}"))?;
                self.set_request_timeout(timeout);
            }
            _ => return Err(anyhow!("invalid key {k}")),
        }
        Ok(())
    }
}
