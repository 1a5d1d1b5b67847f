//! Configuration validation helpers shared by the built-in executors.
//!
//! Executors deserialize their raw configuration into a struct whose fields
//! are all optional, then collect every violation before failing so the
//! error names each invalid field at once. A field of the wrong JSON type is
//! reported as a violation too and is left out of the parsed struct.

use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use std::fmt::Display;

use crate::{NodeError, NodeType};

/// Deserialize a node's raw configuration.
///
/// `null` is treated as an empty object. Each field of an object is checked
/// on its own, so every mistyped field lands in the returned [`Violations`]
/// and the remaining fields still parse. Anything else that fails to
/// deserialize is fatal.
pub fn parse_config<T: DeserializeOwned>(
    node_type: NodeType,
    raw: &Value,
) -> Result<(T, Violations), NodeError> {
    let invalid = |e: serde_json::Error| {
        NodeError::fatal(format!(
            "Invalid configuration for {} node: {e}",
            node_type.label()
        ))
    };

    let mut fields = match raw {
        Value::Null => Map::new(),
        Value::Object(fields) => fields.clone(),
        other => {
            return serde_json::from_value(other.clone())
                .map(|config| (config, Violations::new()))
                .map_err(invalid)
        }
    };

    let mut violations = Violations::new();
    if let Ok(config) = serde_json::from_value(Value::Object(fields.clone())) {
        return Ok((config, violations));
    }

    let names: Vec<String> = fields.keys().cloned().collect();
    for name in names {
        let Some(value) = fields.get(&name) else { continue };
        let single = Map::from_iter([(name.clone(), value.clone())]);
        if let Err(e) = serde_json::from_value::<T>(Value::Object(single)) {
            violations.mistyped(&name, &e);
            fields.remove(&name);
        }
    }

    let config = serde_json::from_value(Value::Object(fields)).map_err(invalid)?;
    Ok((config, violations))
}

/// Take a field that validation already checked.
pub fn take(field: &str, value: Option<String>) -> Result<String, NodeError> {
    value.ok_or_else(|| NodeError::fatal(format!("{field} is required")))
}

/// Accumulates configuration violations.
///
/// Fields already reported as mistyped are not reported again as missing.
#[derive(Debug, Default)]
pub struct Violations {
    messages: Vec<String>,
    mistyped: Vec<String>,
}

impl Violations {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, msg: impl Into<String>) {
        self.messages.push(msg.into());
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn messages(&self) -> &[String] {
        &self.messages
    }

    pub fn mistyped(&mut self, field: &str, err: &serde_json::Error) {
        self.push(format!("{field} has the wrong type ({err})"));
        self.mistyped.push(field.to_owned());
    }

    pub fn is_mistyped(&self, field: &str) -> bool {
        self.mistyped.iter().any(|f| f == field)
    }

    fn require(&mut self, field: &str) {
        if !self.is_mistyped(field) {
            self.push(format!("{field} is required"));
        }
    }

    /// Require a non-blank string. Returns the value when present.
    pub fn require_text<'a>(&mut self, field: &str, value: &'a Option<String>) -> Option<&'a str> {
        match value.as_deref().map(str::trim) {
            Some(v) if !v.is_empty() => value.as_deref(),
            _ => {
                self.require(field);
                None
            }
        }
    }

    pub fn variable_name(&mut self, value: &Option<String>) {
        if let Some(name) = self.require_text("variableName", value) {
            if !is_valid_variable_name(name) {
                self.push(
                    "variableName must start with a letter or underscore and contain only \
                     letters, numbers, and underscores",
                );
            }
        }
    }

    /// Require `value` to lie within `min..=max`.
    pub fn in_range<T>(&mut self, field: &str, value: Option<T>, min: T, max: T)
    where
        T: PartialOrd + Display + Copy,
    {
        match value {
            None => self.require(field),
            Some(v) if v < min || v > max => {
                self.push(format!("{field} must be between {min} and {max}"))
            }
            Some(_) => {}
        }
    }

    pub fn into_result(self, node_type: NodeType) -> Result<(), NodeError> {
        if self.messages.is_empty() {
            return Ok(());
        }
        Err(NodeError::fatal(format!(
            "Invalid configuration for {} node: {}",
            node_type.label(),
            self.messages.join(", ")
        )))
    }
}

/// `^[A-Za-z_][A-Za-z0-9_$]*$`
pub fn is_valid_variable_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$')
}
