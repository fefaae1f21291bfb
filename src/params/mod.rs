//! Parameter spaces for test cases.
//!
//! A [`ParamSpec`] is an ordered list of steps; [`expand`] walks it and
//! yields every fully bound [`ParamBinding`] in declaration order, later
//! steps varying fastest.
//!
//! ```
//! use gpu_cts::params::{expand, ParamSpec};
//!
//! let spec = ParamSpec::new()
//!     .options("a", [1, 2])
//!     .bools("b")
//!     .unless(["a", "b"], |p| Ok(p.get_u64("a")? == 2 && p.get_bool("b")?));
//! let bindings: Vec<_> = expand(&spec).collect::<Result<_, _>>().unwrap();
//! assert_eq!(bindings.len(), 3);
//! ```

use std::fmt;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::{err_help, err_msg, CtsError};

mod expander;
mod spec;

pub use expander::{expand, Expansion, ExpansionFailure};
pub use spec::{ParamSpec, Step};

/// An immutable mapping from parameter key to value.
///
/// Equality ignores key order. Serialization keeps the order in which keys
/// were bound, which is the step declaration order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ParamBinding(Map<String, Value>);

impl ParamBinding {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a copy of this binding extended with `key = value`.
    pub fn with(&self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        let mut map = self.0.clone();
        map.insert(key.into(), value.into());
        Self(map)
    }

    pub fn get(&self, key: &str) -> Result<&Value, CtsError> {
        self.0.get(key).ok_or_else(|| {
            err_help!(
                Param,
                "bound keys are: ".to_string() + &self.keys().collect::<Vec<_>>().join(", "),
                "parameter '{}' is not bound",
                key
            )
        })
    }

    pub fn get_str(&self, key: &str) -> Result<&str, CtsError> {
        self.get(key)?
            .as_str()
            .ok_or_else(|| self.type_mismatch(key, "a string"))
    }

    pub fn get_u64(&self, key: &str) -> Result<u64, CtsError> {
        self.get(key)?
            .as_u64()
            .ok_or_else(|| self.type_mismatch(key, "an unsigned integer"))
    }

    pub fn get_bool(&self, key: &str) -> Result<bool, CtsError> {
        self.get(key)?
            .as_bool()
            .ok_or_else(|| self.type_mismatch(key, "a boolean"))
    }

    /// Deserializes a parameter into any serde type, e.g. a format enum.
    pub fn get_as<T: DeserializeOwned>(&self, key: &str) -> Result<T, CtsError> {
        let value = self.get(key)?;
        serde_json::from_value(value.clone())
            .map_err(|e| err_msg!(Param, "parameter '{}' = {} is malformed: {}", key, value, e))
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Parses a compact JSON object as produced by `Display`.
    pub fn from_json(text: &str) -> Result<Self, CtsError> {
        serde_json::from_str(text).map_err(|e| {
            err_help!(
                Query,
                "parameters must be a JSON object such as {\"size\":4}",
                "malformed parameter binding '{}': {}",
                text,
                e
            )
        })
    }

    fn type_mismatch(&self, key: &str, expected: &str) -> CtsError {
        let found = self.0.get(key).map(Value::to_string).unwrap_or_default();
        err_msg!(Param, "parameter '{}' is {}, expected {}", key, found, expected)
    }
}

impl fmt::Display for ParamBinding {
    /// Compact JSON with keys in binding order.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let json = serde_json::to_string(&self.0).map_err(|_| fmt::Error)?;
        f.write_str(&json)
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for ParamBinding {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::TextureFormat;
    use crate::diagnostics::ErrorType;

    #[test]
    fn equality_ignores_key_order() {
        let a: ParamBinding = [("x", 1), ("y", 2)].into_iter().collect();
        let b: ParamBinding = [("y", 2), ("x", 1)].into_iter().collect();
        assert_eq!(a, b);
        assert_eq!(a.to_string(), r#"{"x":1,"y":2}"#);
        assert_eq!(b.to_string(), r#"{"y":2,"x":1}"#);
    }

    #[test]
    fn typed_access_reports_parameter_errors() {
        let binding = ParamBinding::new()
            .with("size", 4)
            .with("format", TextureFormat::Bc1RgbaUnorm);
        assert_eq!(binding.get_u64("size").unwrap(), 4);
        assert_eq!(
            binding.get_as::<TextureFormat>("format").unwrap(),
            TextureFormat::Bc1RgbaUnorm
        );
        assert_eq!(
            binding.get_bool("size").unwrap_err().error_type(),
            ErrorType::Param
        );
        assert_eq!(
            binding.get("missing").unwrap_err().error_type(),
            ErrorType::Param
        );
    }

    #[test]
    fn json_text_parses_back() {
        let binding = ParamBinding::new().with("a", "x y").with("b", true);
        let parsed = ParamBinding::from_json(&binding.to_string()).unwrap();
        assert_eq!(parsed, binding);
        assert!(ParamBinding::from_json("[1,2]").is_err());
    }
}
