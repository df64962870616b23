/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2025 ByteDance and/or its affiliates.
 */

use indexmap::IndexMap;

/// Ordered tag set. Inserting an existing key replaces the value in place.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct StatsdTagMap {
    inner: IndexMap<String, String>,
}

impl StatsdTagMap {
    pub fn insert<K: Into<String>, V: AsRef<str>>(&mut self, key: K, value: V) {
        self.inner.insert(key.into(), value.as_ref().to_string());
    }

    pub fn extend(&mut self, other: &StatsdTagMap) {
        for (k, v) in other.iter() {
            self.insert(k, v);
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.inner.get(key).map(|v| v.as_str())
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.inner.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Append `|#k:v,...` for the merged tag set, nothing if both are empty.
    pub(crate) fn write_merged(buf: &mut String, global: &StatsdTagMap, local: &StatsdTagMap) {
        if global.is_empty() && local.is_empty() {
            return;
        }

        buf.push_str("|#");
        let mut first = true;
        let mut write_tag = |buf: &mut String, k: &str, v: &str| {
            if !first {
                buf.push(',');
            }
            first = false;
            buf.push_str(k);
            buf.push(':');
            buf.push_str(v);
        };

        for (k, v) in global.iter() {
            let v = local.get(k).unwrap_or(v);
            write_tag(buf, k, v);
        }
        for (k, v) in local.iter() {
            if !global.inner.contains_key(k) {
                write_tag(buf, k, v);
            }
        }
    }
}

impl<K: Into<String>, V: AsRef<str>> FromIterator<(K, V)> for StatsdTagMap {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        let mut map = StatsdTagMap::default();
        for (k, v) in iter {
            map.insert(k, v);
        }
        map
    }
}

impl<K: Into<String>, V: AsRef<str>, const N: usize> From<[(K, V); N]> for StatsdTagMap {
    fn from(value: [(K, V); N]) -> Self {
        value.into_iter().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn merged(global: &StatsdTagMap, local: &StatsdTagMap) -> String {
        let mut buf = String::new();
        StatsdTagMap::write_merged(&mut buf, global, local);
        buf
    }

    #[test]
    fn insert_in_place() {
        let mut map = StatsdTagMap::from([("a", "1"), ("b", "2")]);
        map.insert("a", "3");
        assert_eq!(map.len(), 2);
        assert_eq!(map.iter().collect::<Vec<_>>(), vec![("a", "3"), ("b", "2")]);
    }

    #[test]
    fn merge() {
        let empty = StatsdTagMap::default();
        assert_eq!(merged(&empty, &empty), "");

        let global = StatsdTagMap::from([("env", "prod"), ("dc", "east")]);
        assert_eq!(merged(&global, &empty), "|#env:prod,dc:east");

        let local = StatsdTagMap::from([("dc", "west"), ("host", "a1")]);
        assert_eq!(merged(&global, &local), "|#env:prod,dc:west,host:a1");
        assert_eq!(merged(&empty, &local), "|#dc:west,host:a1");
    }
}
