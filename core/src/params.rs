//! The per-call parameter bag and the set of keys kept off the wire.
//!
//! # Design
//! A `ParameterBag` is loose: remote handlers may read any field
//! the caller put in, so the bag is a JSON object rather than a struct. The
//! handful of keys the dispatcher itself understands (`query`, `headers`, and
//! the transport overrides) get typed accessors here; everything else rides
//! along untouched.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub const QUERY: &str = "query";
pub const HEADERS: &str = "headers";
pub const PROVIDER: &str = "provider";

/// Keys stripped from the bag (and from caller headers) unless configured
/// otherwise.
pub const DEFAULT_EXCLUDED_PARAMS: [&str; 8] = [
    "headers",
    "authentication",
    "route",
    "connection",
    "provider",
    "authorization",
    "host",
    "content-length",
];

/// Mapping from field name to arbitrary JSON value attached to one call.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ParameterBag(Map<String, Value>);

impl ParameterBag {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    pub fn with_query(self, query: Value) -> Self {
        self.with(QUERY, query)
    }

    /// Adds one caller-supplied HTTP header under the `headers` key.
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        let headers = self
            .0
            .entry(HEADERS)
            .or_insert_with(|| Value::Object(Map::new()));
        if !headers.is_object() {
            *headers = Value::Object(Map::new());
        }
        if let Value::Object(map) = headers {
            map.insert(name.into(), Value::String(value.into()));
        }
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.0.insert(key.into(), value.into())
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// Like `get`, but a JSON `null` counts as absent.
    pub fn get_present(&self, key: &str) -> Option<&Value> {
        self.0.get(key).filter(|v| !v.is_null())
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.0.remove(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn query(&self) -> Option<&Value> {
        self.get_present(QUERY)
    }

    pub fn headers(&self) -> Option<&Map<String, Value>> {
        self.0.get(HEADERS).and_then(Value::as_object)
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn into_map(self) -> Map<String, Value> {
        self.0
    }
}

impl From<Map<String, Value>> for ParameterBag {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

/// Field names removed from a bag before it is serialized.
///
/// Matching is exact and case-sensitive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExcludedKeys(Vec<String>);

impl ExcludedKeys {
    pub fn new<I, S>(keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(keys.into_iter().map(Into::into).collect())
    }

    /// An empty set: nothing is filtered.
    pub fn none() -> Self {
        Self(Vec::new())
    }

    pub fn contains(&self, key: &str) -> bool {
        self.0.iter().any(|k| k == key)
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    /// Shallow copy of `map` without the excluded keys.
    pub fn filter(&self, map: &Map<String, Value>) -> Map<String, Value> {
        map.iter()
            .filter(|(k, _)| !self.contains(k))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }
}

impl Default for ExcludedKeys {
    fn default() -> Self {
        Self::new(DEFAULT_EXCLUDED_PARAMS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn with_header_creates_headers_object() {
        let bag = ParameterBag::new()
            .with_header("x-trace", "abc")
            .with_header("accept", "application/json");
        let headers = bag.headers().unwrap();
        assert_eq!(headers["x-trace"], "abc");
        assert_eq!(headers["accept"], "application/json");
    }

    #[test]
    fn with_header_replaces_non_object_headers() {
        let bag = ParameterBag::new()
            .with("headers", "garbage")
            .with_header("x-trace", "abc");
        assert_eq!(bag.get("headers"), Some(&json!({ "x-trace": "abc" })));
    }

    #[test]
    fn null_query_counts_as_absent() {
        let bag = ParameterBag::new().with("query", Value::Null);
        assert!(bag.query().is_none());
        assert!(bag.contains_key("query"));
    }

    #[test]
    fn default_exclusions_keep_query() {
        let excluded = ExcludedKeys::default();
        assert!(!excluded.contains("query"));
        for key in DEFAULT_EXCLUDED_PARAMS {
            assert!(excluded.contains(key), "{key} should be excluded");
        }
    }

    #[test]
    fn filter_is_case_sensitive() {
        let bag = ParameterBag::new()
            .with("authorization", "secret")
            .with("Authorization", "kept")
            .with("user", json!({ "id": 1 }));
        let filtered = ExcludedKeys::default().filter(bag.as_map());
        assert!(!filtered.contains_key("authorization"));
        assert_eq!(filtered["Authorization"], "kept");
        assert_eq!(filtered["user"], json!({ "id": 1 }));
    }

    #[test]
    fn filter_does_not_touch_source() {
        let bag = ParameterBag::new().with("route", json!({ "id": "1" }));
        let _ = ExcludedKeys::default().filter(bag.as_map());
        assert!(bag.contains_key("route"));
    }

    #[test]
    fn excluded_keys_deserialize_from_list() {
        let keys: ExcludedKeys = serde_json::from_str(r#"["secret","token"]"#).unwrap();
        assert!(keys.contains("secret"));
        assert!(!keys.contains("headers"));
    }
}
