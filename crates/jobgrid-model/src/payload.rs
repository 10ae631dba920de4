use std::collections::BTreeMap;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Ordered key-value bag attached to jobs and triggers.
///
/// Values are stored as JSON and read back with an expected type; a lookup
/// that misses or fails to convert yields `None` rather than an error, so
/// executors can fall back to defaults without touching error paths.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PayloadMap(BTreeMap<String, Value>);

impl PayloadMap {
    /// Create an empty map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a value under `key`, replacing any previous entry.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.0.insert(key.into(), value.into());
    }

    /// Typed lookup. `None` when the key is absent or the stored value
    /// does not convert to `T`.
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let value = self.0.get(key)?;
        serde_json::from_value(value.clone()).ok()
    }

    /// Typed lookup with a fallback default.
    pub fn get_or<T: DeserializeOwned>(&self, key: &str, default: T) -> T {
        self.get(key).unwrap_or(default)
    }

    /// Raw JSON value for `key`, if present.
    pub fn raw(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// Whether `key` is present.
    pub fn contains(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    /// Merge `other` into `self`; on key collision `other` wins.
    pub fn merge(&mut self, other: &PayloadMap) {
        for (k, v) in &other.0 {
            self.0.insert(k.clone(), v.clone());
        }
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Iterate entries in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }
}

impl FromIterator<(String, Value)> for PayloadMap {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn typed_lookup_hits_and_misses() {
        let mut map = PayloadMap::new();
        map.insert("retries", 3);
        map.insert("endpoint", "https://example.org");

        assert_eq!(map.get::<i64>("retries"), Some(3));
        assert_eq!(map.get::<String>("endpoint").as_deref(), Some("https://example.org"));
        assert_eq!(map.get::<i64>("missing"), None);
        // wrong expected type falls back to None, not an error
        assert_eq!(map.get::<i64>("endpoint"), None);
    }

    #[test]
    fn get_or_falls_back() {
        let map = PayloadMap::new();
        assert_eq!(map.get_or("threshold", 10u32), 10);
    }

    #[test]
    fn merge_prefers_other() {
        let mut base = PayloadMap::new();
        base.insert("a", 1);
        base.insert("b", 1);

        let mut over = PayloadMap::new();
        over.insert("b", 2);
        over.insert("c", 3);

        base.merge(&over);
        assert_eq!(base.get::<i64>("a"), Some(1));
        assert_eq!(base.get::<i64>("b"), Some(2));
        assert_eq!(base.get::<i64>("c"), Some(3));
    }
}
