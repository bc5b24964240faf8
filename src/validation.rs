//! Schema validation helpers.
//!
//! This module validates `serde_json::Value` configuration against a
//! [`Schema`] before any remote call is made.
//!
//! # Example
//!
//! ```
//! use hemmer_automation_variables::schema::{Attribute, Schema};
//! use hemmer_automation_variables::validation::validate;
//! use serde_json::json;
//!
//! let schema = Schema::v0()
//!     .with_attribute("name", Attribute::required_string().non_empty())
//!     .with_attribute("value", Attribute::required_int64());
//!
//! let diagnostics = validate(&schema, &json!({"name": "v1", "value": 1234}));
//! assert!(diagnostics.is_empty());
//!
//! let diagnostics = validate(&schema, &json!({"name": "", "value": "1234"}));
//! assert_eq!(diagnostics.len(), 2);
//! ```

use crate::schema::{Attribute, AttributeType, Diagnostic, Schema};
use serde_json::Value;

/// Validate a JSON value against a schema.
///
/// Returns a list of diagnostics for any validation errors found.
/// An empty list means the value is valid.
///
/// # Validation Rules
///
/// - Required attributes must be present and non-null
/// - Optional attributes may be absent or null
/// - Computed attributes are skipped (provider sets these)
/// - Attribute types must match the schema
/// - Attributes marked non-empty reject blank strings
pub fn validate(schema: &Schema, value: &Value) -> Vec<Diagnostic> {
    let mut diagnostics = Vec::new();

    let obj = match value {
        Value::Object(map) => map,
        _ => {
            diagnostics.push(
                Diagnostic::error("Expected object")
                    .with_detail(format!("Got {}", value_type_name(value))),
            );
            return diagnostics;
        },
    };

    let mut names: Vec<&String> = schema.attributes.keys().collect();
    names.sort();
    for name in names {
        let attr = &schema.attributes[name];
        validate_attribute(attr, obj.get(name), name, &mut diagnostics);
    }

    diagnostics
}

/// Validate a JSON value against a schema, returning Ok if valid or Err with diagnostics.
///
/// This is a convenience wrapper around [`validate`] that returns a Result.
pub fn validate_result(schema: &Schema, value: &Value) -> Result<(), Vec<Diagnostic>> {
    let diagnostics = validate(schema, value);
    if diagnostics.is_empty() {
        Ok(())
    } else {
        Err(diagnostics)
    }
}

/// Check if a JSON value is valid against a schema.
pub fn is_valid(schema: &Schema, value: &Value) -> bool {
    validate(schema, value).is_empty()
}

fn validate_attribute(
    attr: &Attribute,
    value: Option<&Value>,
    path: &str,
    diagnostics: &mut Vec<Diagnostic>,
) {
    // Computed-only attributes are set by the provider
    if attr.flags.computed && !attr.flags.optional && !attr.flags.required {
        return;
    }

    match value {
        None | Some(Value::Null) => {
            if attr.flags.required {
                diagnostics.push(
                    Diagnostic::error(format!("Missing required attribute '{}'", path))
                        .with_detail("This attribute is required and must be provided")
                        .with_attribute(path),
                );
            }
        },
        Some(v) => {
            if !type_matches(attr.attr_type, v) {
                diagnostics.push(type_error(path, attr.attr_type, v));
            } else if attr.non_empty && v.as_str().is_some_and(|s| s.trim().is_empty()) {
                diagnostics.push(
                    Diagnostic::error(format!("Attribute '{}' must not be empty", path))
                        .with_attribute(path),
                );
            }
        },
    }
}

fn type_matches(attr_type: AttributeType, value: &Value) -> bool {
    match attr_type {
        AttributeType::String => value.is_string(),
        AttributeType::Int64 => value.is_i64(),
        AttributeType::Bool => value.is_boolean(),
    }
}

fn type_error(path: &str, attr_type: AttributeType, value: &Value) -> Diagnostic {
    let expected = match attr_type {
        AttributeType::String => "string",
        AttributeType::Int64 => "int64",
        AttributeType::Bool => "bool",
    };
    Diagnostic::error(format!("Invalid type for attribute '{}'", path))
        .with_detail(format!("Expected {}, got {}", expected, value_type_name(value)))
        .with_attribute(path)
}

fn value_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
