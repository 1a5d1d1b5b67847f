//! The accumulating run context.
//!
//! A `Context` is seeded from trigger data and threaded through every node.
//! Nodes may add one new top-level key holding their output; nothing ever
//! removes or rewrites a key once it is present.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::NodeError;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Context(Map<String, Value>);

impl Context {
    pub fn new() -> Self {
        Self(Map::new())
    }

    /// Build a context from trigger-supplied data.
    ///
    /// `null` yields an empty context; any other non-object value is fatal.
    pub fn from_value(value: Value) -> Result<Self, NodeError> {
        match value {
            Value::Null => Ok(Self::new()),
            Value::Object(map) => Ok(Self(map)),
            other => Err(NodeError::fatal(format!(
                "context must be a JSON object, got {}",
                kind_of(&other)
            ))),
        }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
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

    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.0.keys()
    }

    /// Add a new top-level key.
    ///
    /// Fails when the key is already present; existing entries are never
    /// overwritten.
    pub fn with_entry(mut self, key: impl Into<String>, value: Value) -> Result<Self, NodeError> {
        let key = key.into();
        if self.0.contains_key(&key) {
            return Err(NodeError::fatal(format!(
                "context already contains '{key}'; choose a different variable name"
            )));
        }
        self.0.insert(key, value);
        Ok(self)
    }

    /// Fold every key of `other` that is not already present into `self`.
    ///
    /// Used when a memoized step returns a whole context: keys already in
    /// `self` keep their current value.
    pub fn absorb(mut self, other: Context) -> Self {
        for (key, value) in other.0 {
            self.0.entry(key).or_insert(value);
        }
        self
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn to_value(&self) -> Value {
        Value::Object(self.0.clone())
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.0)
    }
}

impl From<Map<String, Value>> for Context {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn null_seeds_empty_context() {
        assert!(Context::from_value(Value::Null).unwrap().is_empty());
    }

    #[test]
    fn non_object_seed_is_fatal() {
        let err = Context::from_value(json!([1, 2])).unwrap_err();
        assert!(!err.is_retryable());
        assert!(err.message().contains("an array"));
    }

    #[test]
    fn with_entry_adds_and_preserves_existing_keys() {
        let ctx = Context::from_value(json!({ "stripe": { "eventId": "evt_1" } })).unwrap();
        let ctx = ctx.with_entry("weather", json!({ "temp": 21 })).unwrap();

        assert_eq!(ctx.len(), 2);
        assert_eq!(ctx.get("stripe"), Some(&json!({ "eventId": "evt_1" })));
        assert_eq!(ctx.get("weather"), Some(&json!({ "temp": 21 })));
    }

    #[test]
    fn with_entry_refuses_to_overwrite() {
        let ctx = Context::new().with_entry("a", json!(1)).unwrap();
        let err = ctx.with_entry("a", json!(2)).unwrap_err();
        assert!(err.message().contains("'a'"));
    }

    #[test]
    fn absorb_keeps_current_values() {
        let current = Context::from_value(json!({ "a": 1 })).unwrap();
        let other = Context::from_value(json!({ "a": 99, "b": 2 })).unwrap();
        let merged = current.absorb(other);
        assert_eq!(merged.to_value(), json!({ "a": 1, "b": 2 }));
    }
}
