//! Provider configuration.
//!
//! Configuration arrives as JSON through `configure`. Fields left unset fall
//! back to environment variables.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ProviderError;
use crate::identity::IdentityResolver;
use crate::schema::{Attribute, Diagnostic, Schema};

/// Environment variable consulted when `subscription_id` is not configured.
pub const SUBSCRIPTION_ID_ENV: &str = "ARM_SUBSCRIPTION_ID";

/// Environment variable consulted when `require_resources_to_be_imported`
/// is not configured.
pub const STRICT_IMPORT_ENV: &str = "ARM_PROVIDER_STRICT";

/// Resolved provider configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProviderConfig {
    /// The subscription every resource lives in.
    pub subscription_id: String,
    /// Refuse to create a variable that already exists remotely.
    pub require_resources_to_be_imported: bool,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawConfig {
    #[serde(default)]
    subscription_id: Option<String>,
    #[serde(default)]
    require_resources_to_be_imported: Option<bool>,
}

impl ProviderConfig {
    /// Create a configuration for the given subscription.
    pub fn new(subscription_id: impl Into<String>) -> Self {
        Self {
            subscription_id: subscription_id.into(),
            require_resources_to_be_imported: false,
        }
    }

    /// Require existing remote variables to be imported before management.
    pub fn with_require_import(mut self, require: bool) -> Self {
        self.require_resources_to_be_imported = require;
        self
    }

    /// Parse configuration, falling back to the process environment.
    pub fn from_value(value: &Value) -> Result<Self, ProviderError> {
        Self::from_value_with_env(value, |key| std::env::var(key).ok())
    }

    /// Parse configuration, falling back to `env` for unset fields.
    pub fn from_value_with_env<F>(value: &Value, env: F) -> Result<Self, ProviderError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let raw: RawConfig = match value {
            Value::Null => RawConfig::default(),
            other => serde_json::from_value(other.clone())
                .map_err(|e| ProviderError::Configuration(e.to_string()))?,
        };

        let subscription_id = raw
            .subscription_id
            .filter(|s| !s.trim().is_empty())
            .or_else(|| env(SUBSCRIPTION_ID_ENV).filter(|s| !s.trim().is_empty()))
            .ok_or_else(|| {
                ProviderError::Configuration(format!(
                    "subscription_id must be set, either in configuration or via {}",
                    SUBSCRIPTION_ID_ENV
                ))
            })?;

        let require_resources_to_be_imported = match raw.require_resources_to_be_imported {
            Some(flag) => flag,
            None => match env(STRICT_IMPORT_ENV) {
                Some(flag) => parse_flag(&flag)?,
                None => false,
            },
        };

        Ok(Self {
            subscription_id,
            require_resources_to_be_imported,
        })
    }

    /// Validate configuration without keeping it.
    pub fn validate(value: &Value) -> Vec<Diagnostic> {
        match Self::from_value(value) {
            Ok(_) => vec![],
            Err(e) => vec![e.to_diagnostic()],
        }
    }

    /// An identity resolver for this configuration's subscription.
    pub fn resolver(&self) -> IdentityResolver {
        IdentityResolver::new(self.subscription_id.clone())
    }

    /// The provider configuration schema.
    pub fn schema() -> Schema {
        Schema::v0()
            .with_description("Typed Azure Automation variables")
            .with_attribute(
                "subscription_id",
                Attribute::optional_string().with_description(format!(
                    "Subscription containing the automation accounts. Defaults to ${}.",
                    SUBSCRIPTION_ID_ENV
                )),
            )
            .with_attribute(
                "require_resources_to_be_imported",
                Attribute::optional_bool()
                    .with_description(
                        "Fail instead of adopting variables that already exist remotely",
                    )
                    .with_default(Value::Bool(false)),
            )
    }
}

fn parse_flag(raw: &str) -> Result<bool, ProviderError> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" => Ok(true),
        "0" | "false" | "no" | "" => Ok(false),
        other => Err(ProviderError::Configuration(format!(
            "{} must be a boolean, got {:?}",
            STRICT_IMPORT_ENV, other
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn no_env(_: &str) -> Option<String> {
        None
    }

    #[test]
    fn test_explicit_config() {
        let config = ProviderConfig::from_value_with_env(
            &json!({"subscription_id": "sub", "require_resources_to_be_imported": true}),
            no_env,
        )
        .unwrap();
        assert_eq!(config, ProviderConfig::new("sub").with_require_import(true));
    }

    #[test]
    fn test_env_fallback() {
        let env = |key: &str| match key {
            SUBSCRIPTION_ID_ENV => Some("from-env".to_string()),
            STRICT_IMPORT_ENV => Some("TRUE".to_string()),
            _ => None,
        };
        let config = ProviderConfig::from_value_with_env(&json!({}), env).unwrap();
        assert_eq!(config.subscription_id, "from-env");
        assert!(config.require_resources_to_be_imported);

        // Configuration wins over the environment.
        let config =
            ProviderConfig::from_value_with_env(&json!({"subscription_id": "cfg"}), env).unwrap();
        assert_eq!(config.subscription_id, "cfg");
    }

    #[test]
    fn test_null_config_uses_env() {
        let env = |key: &str| (key == SUBSCRIPTION_ID_ENV).then(|| "sub".to_string());
        let config = ProviderConfig::from_value_with_env(&Value::Null, env).unwrap();
        assert_eq!(config, ProviderConfig::new("sub"));
    }

    #[test]
    fn test_missing_subscription() {
        let err = ProviderConfig::from_value_with_env(&json!({"subscription_id": " "}), no_env)
            .unwrap_err();
        assert!(matches!(err, ProviderError::Configuration(_)));
        assert!(err.to_string().contains(SUBSCRIPTION_ID_ENV));
    }

    #[test]
    fn test_bad_strict_flag() {
        let env = |key: &str| match key {
            SUBSCRIPTION_ID_ENV => Some("sub".to_string()),
            _ => Some("maybe".to_string()),
        };
        let err = ProviderConfig::from_value_with_env(&json!({}), env).unwrap_err();
        assert!(err.to_string().contains("maybe"));
    }

    #[test]
    fn test_unknown_field_rejected() {
        let err = ProviderConfig::from_value_with_env(
            &json!({"subscription_id": "sub", "tenant": "t"}),
            no_env,
        )
        .unwrap_err();
        assert!(matches!(err, ProviderError::Configuration(_)));
    }

    #[test]
    fn test_resolver_uses_subscription() {
        let resolver = ProviderConfig::new("sub").resolver();
        assert_eq!(resolver.subscription_id(), "sub");
    }

    #[test]
    fn test_schema() {
        let schema = ProviderConfig::schema();
        assert!(schema.attributes.contains_key("subscription_id"));
        assert_eq!(
            schema.attributes["require_resources_to_be_imported"].default,
            Some(json!(false))
        );
    }
}
