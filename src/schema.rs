//! Attribute schemas for the variable resources and provider configuration.
//!
//! A [`Schema`] lists the attributes a resource state object may carry.
//! [`crate::validation`] checks configuration against it, and the provider's
//! plan walks it to decide which attributes to diff and which force a
//! replacement.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// JSON type accepted for an attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttributeType {
    /// JSON string. Also carries RFC 3339 date-times.
    String,
    /// JSON integer that fits in an `i64`.
    Int64,
    /// JSON boolean.
    Bool,
}

/// Who supplies an attribute: the user, optionally the user, or the provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct AttributeFlags {
    /// Must be present and non-null in configuration.
    pub required: bool,
    /// May be omitted or null.
    pub optional: bool,
    /// Filled in from the service, such as the canonical `id`.
    pub computed: bool,
}

impl AttributeFlags {
    /// Flags for a user-supplied attribute.
    pub fn required() -> Self {
        Self {
            required: true,
            ..Default::default()
        }
    }

    /// Flags for an attribute the user may leave out.
    pub fn optional() -> Self {
        Self {
            optional: true,
            ..Default::default()
        }
    }

    /// Flags for a provider-set attribute.
    pub fn computed() -> Self {
        Self {
            computed: true,
            ..Default::default()
        }
    }
}

/// One attribute of a resource or of the provider configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attribute {
    /// Accepted JSON type.
    #[serde(rename = "type")]
    pub attr_type: AttributeType,
    /// Who supplies the attribute.
    #[serde(flatten)]
    pub flags: AttributeFlags,
    /// Shown to users in generated documentation.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// A change plans a replacement rather than an in-place update.
    #[serde(default)]
    pub force_new: bool,
    /// Blank strings fail validation.
    #[serde(default)]
    pub non_empty: bool,
    /// Value assumed when the attribute is omitted.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default: Option<serde_json::Value>,
}

impl Attribute {
    /// Build an attribute from its type and flags.
    pub fn new(attr_type: AttributeType, flags: AttributeFlags) -> Self {
        Self {
            attr_type,
            flags,
            description: None,
            force_new: false,
            non_empty: false,
            default: None,
        }
    }

    /// `String`, required.
    pub fn required_string() -> Self {
        Self::new(AttributeType::String, AttributeFlags::required())
    }

    /// `String`, optional.
    pub fn optional_string() -> Self {
        Self::new(AttributeType::String, AttributeFlags::optional())
    }

    /// `String`, computed.
    pub fn computed_string() -> Self {
        Self::new(AttributeType::String, AttributeFlags::computed())
    }

    /// `Int64`, required.
    pub fn required_int64() -> Self {
        Self::new(AttributeType::Int64, AttributeFlags::required())
    }

    /// `Bool`, required.
    pub fn required_bool() -> Self {
        Self::new(AttributeType::Bool, AttributeFlags::required())
    }

    /// `Bool`, optional.
    pub fn optional_bool() -> Self {
        Self::new(AttributeType::Bool, AttributeFlags::optional())
    }

    /// Attach user-facing documentation.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Plan a replacement whenever this attribute changes.
    pub fn with_force_new(mut self) -> Self {
        self.force_new = true;
        self
    }

    /// Reject blank strings.
    pub fn non_empty(mut self) -> Self {
        self.non_empty = true;
        self
    }

    /// Record the value assumed when omitted.
    pub fn with_default(mut self, default: serde_json::Value) -> Self {
        self.default = Some(default);
        self
    }
}

/// The attribute set of one resource type or of the provider configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Schema {
    /// State format version; every schema here is at 0.
    #[serde(default)]
    pub version: u64,
    /// Attributes keyed by name.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub attributes: HashMap<String, Attribute>,
    /// Shown to users in generated documentation.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl Schema {
    /// An empty schema at `version`.
    pub fn new(version: u64) -> Self {
        Self {
            version,
            attributes: HashMap::new(),
            description: None,
        }
    }

    /// An empty schema at version 0.
    pub fn v0() -> Self {
        Self::new(0)
    }

    /// Add or replace an attribute.
    pub fn with_attribute(mut self, name: impl Into<String>, attr: Attribute) -> Self {
        self.attributes.insert(name.into(), attr);
        self
    }

    /// Attach user-facing documentation.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

impl Default for Schema {
    fn default() -> Self {
        Self::v0()
    }
}

/// Everything the provider exposes: its configuration and each resource type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct ProviderSchema {
    /// Attributes accepted by `configure`.
    #[serde(default)]
    pub provider: Schema,
    /// One schema per resource type name.
    #[serde(default)]
    pub resources: HashMap<String, Schema>,
}

impl ProviderSchema {
    /// No configuration attributes and no resources.
    pub fn new() -> Self {
        Self::default()
    }

    /// Use `schema` for the provider configuration.
    pub fn with_provider_config(mut self, schema: Schema) -> Self {
        self.provider = schema;
        self
    }

    /// Register a resource type.
    pub fn with_resource(mut self, name: impl Into<String>, schema: Schema) -> Self {
        self.resources.insert(name.into(), schema);
        self
    }
}

/// Whether a diagnostic blocks the operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiagnosticSeverity {
    /// The operation cannot proceed.
    Error,
    /// Reported but not blocking.
    Warning,
}

/// A user-facing problem report, optionally pinned to an attribute.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    /// Blocking or not.
    pub severity: DiagnosticSeverity,
    /// One-line summary.
    pub summary: String,
    /// Longer explanation, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    /// Attribute the problem refers to, such as `value`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attribute: Option<String>,
}

impl Diagnostic {
    /// A blocking diagnostic.
    pub fn error(summary: impl Into<String>) -> Self {
        Self {
            severity: DiagnosticSeverity::Error,
            summary: summary.into(),
            detail: None,
            attribute: None,
        }
    }

    /// A non-blocking diagnostic.
    pub fn warning(summary: impl Into<String>) -> Self {
        Self {
            severity: DiagnosticSeverity::Warning,
            summary: summary.into(),
            detail: None,
            attribute: None,
        }
    }

    /// Add a longer explanation.
    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    /// Pin the diagnostic to an attribute.
    pub fn with_attribute(mut self, attribute: impl Into<String>) -> Self {
        self.attribute = Some(attribute.into());
        self
    }

    /// Whether this diagnostic is an error.
    pub fn is_error(&self) -> bool {
        matches!(self.severity, DiagnosticSeverity::Error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_flags_are_exclusive() {
        let cases = [
            (AttributeFlags::required(), (true, false, false)),
            (AttributeFlags::optional(), (false, true, false)),
            (AttributeFlags::computed(), (false, false, true)),
        ];
        for (flags, (required, optional, computed)) in cases {
            assert_eq!((flags.required, flags.optional, flags.computed), (required, optional, computed));
        }
    }

    #[test]
    fn test_key_attribute() {
        let name = Attribute::required_string()
            .with_description("Variable name")
            .with_force_new()
            .non_empty();

        assert_eq!(name.attr_type, AttributeType::String);
        assert!(name.flags.required && name.force_new && name.non_empty);
        assert_eq!(name.description.as_deref(), Some("Variable name"));

        let encrypted = Attribute::optional_bool().with_default(json!(false));
        assert_eq!(encrypted.default, Some(json!(false)));
        assert!(!encrypted.force_new);
    }

    #[test]
    fn test_schema_wire_shape() {
        let schema = Schema::v0()
            .with_attribute("value", Attribute::required_int64())
            .with_attribute("id", Attribute::computed_string());
        let encoded = serde_json::to_value(&schema).unwrap();

        assert_eq!(encoded["version"], 0);
        assert_eq!(encoded["attributes"]["value"]["type"], "int64");
        assert_eq!(encoded["attributes"]["value"]["required"], true);
        assert_eq!(encoded["attributes"]["id"]["computed"], true);
        assert!(encoded.get("description").is_none());
    }

    #[test]
    fn test_provider_schema_registers_resources() {
        let provider_schema = ProviderSchema::new()
            .with_provider_config(
                Schema::v0().with_attribute("subscription_id", Attribute::optional_string()),
            )
            .with_resource(
                "azurerm_automation_bool_variable",
                Schema::v0().with_attribute("value", Attribute::required_bool()),
            );

        assert!(provider_schema.provider.attributes.contains_key("subscription_id"));
        assert_eq!(
            provider_schema.resources["azurerm_automation_bool_variable"].attributes["value"].attr_type,
            AttributeType::Bool
        );
    }

    #[test]
    fn test_diagnostic_builders() {
        let diagnostic = Diagnostic::error("Invalid time format")
            .with_detail("\"yesterday\" is not RFC 3339")
            .with_attribute("value");

        assert!(diagnostic.is_error());
        assert_eq!(diagnostic.severity, DiagnosticSeverity::Error);
        assert_eq!(diagnostic.attribute.as_deref(), Some("value"));
        assert_eq!(diagnostic.detail.as_deref(), Some("\"yesterday\" is not RFC 3339"));

        let warning = Diagnostic::warning("description is empty");
        assert!(!warning.is_error());
        assert_eq!(serde_json::to_value(&warning).unwrap()["severity"], "warning");
    }
}
