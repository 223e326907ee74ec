//! Raw setting value types and conversion utilities.

use serde::{Deserialize, Serialize};

/// A raw, uninterpolated setting value.
///
/// The layered store holds these; only the three variants the file
/// grammar's type-guessing rule can produce exist. `Boolean(false)` is
/// a real stored value and must never be conflated with "absent" —
/// absence is always `Option::None` at the store boundary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SettingValue {
    /// String value
    String(String),
    /// Integer value
    Integer(i64),
    /// Boolean value
    Boolean(bool),
}

impl SettingValue {
    /// Builds a value from raw text using the file grammar's guessing
    /// rule: case-insensitive `true`/`false` become booleans, all-digit
    /// text becomes an integer, anything else stays a string.
    pub fn guess(raw: &str) -> Self {
        if raw.eq_ignore_ascii_case("true") {
            SettingValue::Boolean(true)
        } else if raw.eq_ignore_ascii_case("false") {
            SettingValue::Boolean(false)
        } else if !raw.is_empty() && raw.bytes().all(|b| b.is_ascii_digit()) {
            match raw.parse::<i64>() {
                Ok(i) => SettingValue::Integer(i),
                Err(_) => SettingValue::String(raw.to_string()),
            }
        } else {
            SettingValue::String(raw.to_string())
        }
    }

    /// Returns the value as a string reference if it's a string.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            SettingValue::String(s) => Some(s),
            _ => None,
        }
    }

    /// Returns the value as an i64 if it's an integer.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            SettingValue::Integer(i) => Some(*i),
            _ => None,
        }
    }

    /// Returns the value as a bool if it's a boolean.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            SettingValue::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    /// Coerces the value to its textual representation.
    ///
    /// Interpolation and config-file generation both work on this form.
    pub fn coerce_to_string(&self) -> String {
        match self {
            SettingValue::String(s) => s.clone(),
            SettingValue::Integer(i) => i.to_string(),
            SettingValue::Boolean(b) => b.to_string(),
        }
    }

    /// Returns the type name of the variant.
    pub fn type_name(&self) -> &'static str {
        match self {
            SettingValue::String(_) => "String",
            SettingValue::Integer(_) => "Integer",
            SettingValue::Boolean(_) => "Boolean",
        }
    }
}

impl From<String> for SettingValue {
    fn from(s: String) -> Self {
        SettingValue::String(s)
    }
}

impl From<&str> for SettingValue {
    fn from(s: &str) -> Self {
        SettingValue::String(s.to_string())
    }
}

impl From<i64> for SettingValue {
    fn from(i: i64) -> Self {
        SettingValue::Integer(i)
    }
}

impl From<bool> for SettingValue {
    fn from(b: bool) -> Self {
        SettingValue::Boolean(b)
    }
}
