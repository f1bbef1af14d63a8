use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashSet};
use url::form_urlencoded;

lazy_static! {
    /// Payload keys that Bear sends back as JSON documents.
    static ref JSON_PAYLOAD_KEYS: HashSet<&'static str> = ["tags", "notes"].iter().copied().collect();
}

/// Key to one-or-many values, used for request parameters and callback payloads.
///
/// Keys iterate in sorted order, so anything serialised from a `Params` is deterministic.
/// A key is never stored with zero values.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Params {
    values: BTreeMap<String, Vec<String>>,
}

impl Params {
    pub fn new() -> Self {
        Params::default()
    }

    /// Decodes an `application/x-www-form-urlencoded` query string.
    pub fn from_query(query: &str) -> Self {
        let mut params = Params::new();
        for (key, value) in form_urlencoded::parse(query.as_bytes()) {
            params.append(key, value);
        }
        params
    }

    /// Replaces every value of `key` with `value`.
    pub fn set<K: ToString, V: ToString>(&mut self, key: K, value: V) {
        self.values
            .insert(key.to_string(), vec![value.to_string()]);
    }

    /// Replaces every value of `key`; an empty iterator removes the key.
    pub fn set_all<K, I>(&mut self, key: K, values: I)
    where
        K: ToString,
        I: IntoIterator,
        I::Item: ToString,
    {
        let values: Vec<String> = values.into_iter().map(|v| v.to_string()).collect();
        if values.is_empty() {
            self.values.remove(&key.to_string());
        } else {
            self.values.insert(key.to_string(), values);
        }
    }

    pub fn append<K: ToString, V: ToString>(&mut self, key: K, value: V) {
        self.values
            .entry(key.to_string())
            .or_default()
            .push(value.to_string());
    }

    /// First value stored under `key`.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.values
            .get(key)
            .and_then(|values| values.first())
            .map(String::as_str)
    }

    pub fn get_all(&self, key: &str) -> &[String] {
        self.values.get(key).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }

    /// Flattened `(key, value)` pairs in key order.
    pub fn pairs(&self) -> impl Iterator<Item = (&str, &str)> {
        self.values.iter().flat_map(|(k, values)| {
            values.iter().map(move |v| (k.as_str(), v.as_str()))
        })
    }

    /// Percent-encodes the set as a query string. Spaces become `%20` because Bear's
    /// decoder does not treat `+` as a space.
    pub fn encode(&self) -> String {
        form_urlencoded::Serializer::new(String::new())
            .extend_pairs(self.pairs())
            .finish()
            .replace('+', "%20")
    }

    /// Converts a callback payload into a JSON object.
    ///
    /// `tags` and `notes` are decoded as JSON when their first value parses, even if the key
    /// repeats. Otherwise single values map to strings and repeated keys to string arrays.
    pub fn to_data(&self) -> Map<String, Value> {
        let mut data = Map::new();
        for (key, values) in &self.values {
            let first = match values.first() {
                Some(first) => first,
                None => continue,
            };
            let decoded = if JSON_PAYLOAD_KEYS.contains(key.as_str()) {
                serde_json::from_str::<Value>(first).ok()
            } else {
                None
            };
            let value = match (decoded, values.as_slice()) {
                (Some(parsed), _) => parsed,
                (None, [single]) => Value::String(single.clone()),
                (None, many) => Value::Array(many.iter().cloned().map(Value::String).collect()),
            };
            data.insert(key.clone(), value);
        }
        data
    }
}

impl<K, V> std::iter::FromIterator<(K, V)> for Params
where
    K: ToString,
    V: ToString,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut params = Params::new();
        params.extend(iter);
        params
    }
}

impl<K, V> Extend<(K, V)> for Params
where
    K: ToString,
    V: ToString,
{
    fn extend<I: IntoIterator<Item = (K, V)>>(&mut self, iter: I) {
        for (k, v) in iter {
            self.append(k, v);
        }
    }
}
