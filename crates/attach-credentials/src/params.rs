use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Configuration of an outbound HTTP call, as a JSON object.
///
/// Auth material is attached under `auth` (`username`/`password`, `bearer`,
/// `sendImmediately`), `headers` and `authType`. Merging is always deep, so
/// attaching credentials never drops unrelated keys.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestParams(Map<String, Value>);

impl RequestParams {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Build params from a JSON value. Returns `None` if the value is not an object.
    #[must_use]
    pub fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Object(map) => Some(Self(map)),
            _ => None,
        }
    }

    #[must_use]
    pub fn into_value(self) -> Value {
        Value::Object(self.0)
    }

    #[must_use]
    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    #[must_use]
    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.0.insert(key.into(), value.into())
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.0.remove(key)
    }

    /// The `authType` label, if set.
    #[must_use]
    pub fn auth_type(&self) -> Option<&str> {
        self.0.get("authType").and_then(Value::as_str)
    }

    /// The `auth` object, if set.
    #[must_use]
    pub fn auth(&self) -> Option<&Map<String, Value>> {
        self.0.get("auth").and_then(Value::as_object)
    }

    /// The `headers` object, if set.
    #[must_use]
    pub fn headers(&self) -> Option<&Map<String, Value>> {
        self.0.get("headers").and_then(Value::as_object)
    }

    /// A single header value, if set and a string.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers()
            .and_then(|headers| headers.get(name))
            .and_then(Value::as_str)
    }

    /// Deep-merge `other` into `self`.
    ///
    /// Objects merge key by key, arrays index by index; any other source value
    /// replaces the target value.
    pub fn merge(&mut self, other: RequestParams) {
        merge_maps(&mut self.0, other.0);
    }

    /// Deep-merge `other` into a copy of `self`, leaving `self` untouched.
    #[must_use]
    pub fn merged(&self, other: RequestParams) -> RequestParams {
        let mut copy = self.clone();
        copy.merge(other);
        copy
    }
}

impl From<Map<String, Value>> for RequestParams {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

impl From<RequestParams> for Value {
    fn from(params: RequestParams) -> Self {
        params.into_value()
    }
}

fn merge_maps(target: &mut Map<String, Value>, source: Map<String, Value>) {
    for (key, value) in source {
        match target.get_mut(&key) {
            Some(existing) => merge_values(existing, value),
            None => {
                target.insert(key, value);
            }
        }
    }
}

fn merge_values(target: &mut Value, source: Value) {
    match (target, source) {
        (Value::Object(target), Value::Object(source)) => merge_maps(target, source),
        (Value::Array(target), Value::Array(source)) => {
            for (index, value) in source.into_iter().enumerate() {
                match target.get_mut(index) {
                    Some(existing) => merge_values(existing, value),
                    None => target.push(value),
                }
            }
        }
        (target, source) => *target = source,
    }
}
