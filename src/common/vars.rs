//! Typed access to a JSON object used for node parameters and outputs.

use serde::{Deserialize, Serialize, de::DeserializeOwned};
use serde_json::{Map, Value};

/// A JSON object with convenience accessors.
///
/// `Vars` is the currency of the engine: node parameters, node outputs,
/// trigger arguments and appearance configs are all `Vars`. Values are plain
/// `serde_json::Value`s; typed reads go through [`Vars::get`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Vars {
    inner: Map<String, Value>,
}

impl Vars {
    /// Create an empty variable set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a key, converting the value into JSON.
    pub fn set<V: Into<Value>>(
        &mut self,
        key: &str,
        value: V,
    ) {
        self.inner.insert(key.to_string(), value.into());
    }

    /// Builder-style [`Vars::set`].
    pub fn with<V: Into<Value>>(
        mut self,
        key: &str,
        value: V,
    ) -> Self {
        self.set(key, value);
        self
    }

    /// Insert a raw JSON value.
    pub fn insert(
        &mut self,
        key: String,
        value: Value,
    ) {
        self.inner.insert(key, value);
    }

    /// Get a key, deserialized into `T`. Returns `None` when the key is
    /// absent or the value does not deserialize.
    pub fn get<T: DeserializeOwned>(
        &self,
        key: &str,
    ) -> Option<T> {
        self.inner.get(key).and_then(|v| serde_json::from_value(v.clone()).ok())
    }

    /// Get a key as a raw JSON value reference.
    pub fn get_value(
        &self,
        key: &str,
    ) -> Option<&Value> {
        self.inner.get(key)
    }

    /// Remove a key, returning its value if present.
    pub fn remove(
        &mut self,
        key: &str,
    ) -> Option<Value> {
        self.inner.remove(key)
    }

    pub fn contains_key(
        &self,
        key: &str,
    ) -> bool {
        self.inner.contains_key(key)
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.inner.keys()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.inner.iter()
    }
}

impl From<Vars> for Value {
    fn from(vars: Vars) -> Self {
        Value::Object(vars.inner)
    }
}

/// Non-object values convert to an empty set; callers that need the raw
/// value should keep it as `Value`.
impl From<Value> for Vars {
    fn from(value: Value) -> Self {
        match value {
            Value::Object(inner) => Self {
                inner,
            },
            _ => Self::new(),
        }
    }
}

impl std::fmt::Display for Vars {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        write!(f, "{}", Value::Object(self.inner.clone()))
    }
}
