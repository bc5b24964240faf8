//! Typed value encoding.
//!
//! The automation service stores every variable value as a string whose shape
//! depends on the variable's type:
//!
//! | Kind       | Logical value           | Stored text                  |
//! |------------|-------------------------|------------------------------|
//! | `Int`      | `1234`                  | `1234`                       |
//! | `Bool`     | `true`                  | `true`                       |
//! | `DateTime` | `2023-01-02T15:04:05Z`  | `"\/Date(1672671845000)\/"`  |
//! | `String`   | `hello "world"`         | `"hello \"world\""`          |
//!
//! Date-times only survive a round trip at millisecond precision and always
//! decode to UTC with a fixed `.mmmZ` suffix.

use std::fmt;

use chrono::{DateTime, SecondsFormat, TimeZone, Utc};
use serde_json::Value;

use crate::error::ProviderError;

const DATE_PREFIX: &str = "\"\\/Date(";
const DATE_SUFFIX: &str = ")\\/\"";

/// The type of an automation variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueKind {
    /// A signed integer.
    Int,
    /// A boolean.
    Bool,
    /// A point in time, written as RFC 3339.
    DateTime,
    /// A plain string.
    String,
}

impl ValueKind {
    /// Every supported kind.
    pub const ALL: [ValueKind; 4] = [
        ValueKind::Int,
        ValueKind::Bool,
        ValueKind::DateTime,
        ValueKind::String,
    ];

    /// Resource type name exposed to the declarative layer.
    pub fn resource_type(&self) -> &'static str {
        match self {
            Self::Int => "azurerm_automation_int_variable",
            Self::Bool => "azurerm_automation_bool_variable",
            Self::DateTime => "azurerm_automation_datetime_variable",
            Self::String => "azurerm_automation_string_variable",
        }
    }

    /// Look up a kind by resource type name.
    pub fn from_resource_type(resource_type: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.resource_type() == resource_type)
    }

    /// Human-readable label used in logs and error messages.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Int => "Int",
            Self::Bool => "Bool",
            Self::DateTime => "Datetime",
            Self::String => "String",
        }
    }
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// A logical variable value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VariableValue {
    /// Integer value.
    Int(i64),
    /// Boolean value.
    Bool(bool),
    /// RFC 3339 timestamp.
    DateTime(String),
    /// Plain string.
    String(String),
}

impl VariableValue {
    /// The kind this value belongs to.
    pub fn kind(&self) -> ValueKind {
        match self {
            Self::Int(_) => ValueKind::Int,
            Self::Bool(_) => ValueKind::Bool,
            Self::DateTime(_) => ValueKind::DateTime,
            Self::String(_) => ValueKind::String,
        }
    }

    /// Read a value of the given kind from resource configuration.
    pub fn from_json(kind: ValueKind, value: &Value) -> Result<Self, ProviderError> {
        let parsed = match kind {
            ValueKind::Int => value.as_i64().map(Self::Int),
            ValueKind::Bool => value.as_bool().map(Self::Bool),
            ValueKind::DateTime => value.as_str().map(|s| Self::DateTime(s.to_string())),
            ValueKind::String => value.as_str().map(|s| Self::String(s.to_string())),
        };
        parsed.ok_or_else(|| {
            ProviderError::Validation(format!(
                "value {} is not valid for a {} variable",
                value, kind
            ))
        })
    }

    /// Render the value for resource state.
    pub fn to_json(&self) -> Value {
        match self {
            Self::Int(v) => Value::from(*v),
            Self::Bool(v) => Value::Bool(*v),
            Self::DateTime(v) | Self::String(v) => Value::String(v.clone()),
        }
    }
}

/// Encode a logical value into the service's stored form.
///
/// Fails with [`ProviderError::InvalidTimeFormat`] when a date-time value is
/// not valid RFC 3339.
pub fn encode(value: &VariableValue) -> Result<String, ProviderError> {
    match value {
        VariableValue::Int(v) => Ok(v.to_string()),
        VariableValue::Bool(v) => Ok(v.to_string()),
        VariableValue::DateTime(v) => {
            let parsed = DateTime::parse_from_rfc3339(v).map_err(|e| {
                ProviderError::InvalidTimeFormat(format!("{:?} is not RFC 3339: {}", v, e))
            })?;
            Ok(format!(
                "{}{}{}",
                DATE_PREFIX,
                parsed.timestamp_millis(),
                DATE_SUFFIX
            ))
        },
        VariableValue::String(v) => Ok(Value::String(v.clone()).to_string()),
    }
}

/// Decode a stored value as the given kind.
///
/// Fails with [`ProviderError::ValueDecode`] when the stored text is not in
/// the encoding for `kind`. The error names the kind the text looks like,
/// which usually points at a variable of the wrong type.
pub fn decode(kind: ValueKind, encoded: &str) -> Result<VariableValue, ProviderError> {
    let decoded = match kind {
        ValueKind::Int => parse_int(encoded).map(VariableValue::Int),
        ValueKind::Bool => match encoded {
            "true" => Some(VariableValue::Bool(true)),
            "false" => Some(VariableValue::Bool(false)),
            _ => None,
        },
        ValueKind::DateTime => parse_date_token(encoded)
            .and_then(|ms| Utc.timestamp_millis_opt(ms).single())
            .map(|t| VariableValue::DateTime(t.to_rfc3339_opts(SecondsFormat::Millis, true))),
        ValueKind::String => parse_quoted(encoded).map(VariableValue::String),
    };

    decoded.ok_or_else(|| decode_error(kind, encoded))
}

/// Guess the kind of a stored value from its shape.
pub fn detect_kind(encoded: &str) -> Option<ValueKind> {
    if parse_date_token(encoded).is_some() {
        Some(ValueKind::DateTime)
    } else if parse_quoted(encoded).is_some() {
        Some(ValueKind::String)
    } else if encoded == "true" || encoded == "false" {
        Some(ValueKind::Bool)
    } else if parse_int(encoded).is_some() {
        Some(ValueKind::Int)
    } else {
        None
    }
}

// Plain decimal, optionally negative. `str::parse` would also take a `+`.
fn parse_int(encoded: &str) -> Option<i64> {
    if encoded.starts_with('+') {
        return None;
    }
    encoded.parse().ok()
}

// A single JSON string with nothing around it.
fn parse_quoted(encoded: &str) -> Option<String> {
    if encoded.trim() != encoded {
        return None;
    }
    serde_json::from_str(encoded).ok()
}

fn parse_date_token(encoded: &str) -> Option<i64> {
    let digits = encoded
        .strip_prefix(DATE_PREFIX)?
        .strip_suffix(DATE_SUFFIX)?;
    let unsigned = digits.strip_prefix('-').unwrap_or(digits);
    if unsigned.is_empty() || !unsigned.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

fn decode_error(kind: ValueKind, encoded: &str) -> ProviderError {
    let found = match detect_kind(encoded) {
        Some(found) => format!("found a {} value", found),
        None => "the encoding is not recognised".to_string(),
    };
    ProviderError::ValueDecode(format!(
        "cannot parse {:?} as a {} variable: {}",
        encoded, kind, found
    ))
}
