//! Addressing for automation variables.
//!
//! A variable is addressed remotely by `(resource_group, account_name, name)`
//! within a subscription, and persisted locally by its canonical resource id:
//!
//! ```text
//! /subscriptions/{sub}/resourceGroups/{rg}/providers/Microsoft.Automation/automationAccounts/{account}/variables/{name}
//! ```

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::ProviderError;

/// Resource provider namespace for automation accounts.
pub const PROVIDER_NAMESPACE: &str = "Microsoft.Automation";

const ACCOUNTS_SEGMENT: &str = "automationAccounts";
const VARIABLES_SEGMENT: &str = "variables";

/// The full key of an automation variable.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VariableIdentity {
    /// Subscription that owns the resource group.
    pub subscription_id: String,
    /// Resource group containing the automation account.
    pub resource_group: String,
    /// Automation account name.
    pub account_name: String,
    /// Variable name. Immutable once created.
    pub name: String,
}

impl VariableIdentity {
    /// Parse a canonical resource id.
    ///
    /// Fails with [`ProviderError::MalformedIdentifier`] when the id is not a
    /// well-formed key/value path or lacks the subscription, resource group,
    /// automation account or variable segments.
    pub fn parse_canonical(id: &str) -> Result<Self, ProviderError> {
        let parsed = ResourceId::parse(id)?;
        let account_name = parsed.path_segment(id, ACCOUNTS_SEGMENT)?;
        let name = parsed.path_segment(id, VARIABLES_SEGMENT)?;

        Ok(Self {
            subscription_id: parsed.subscription_id,
            resource_group: parsed.resource_group,
            account_name,
            name,
        })
    }

    /// Render the canonical resource id.
    pub fn resource_id(&self) -> String {
        format!(
            "/subscriptions/{}/resourceGroups/{}/providers/{}/{}/{}/{}/{}",
            self.subscription_id,
            self.resource_group,
            PROVIDER_NAMESPACE,
            ACCOUNTS_SEGMENT,
            self.account_name,
            VARIABLES_SEGMENT,
            self.name
        )
    }
}

impl fmt::Display for VariableIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:?} (Automation Account Name {:?} / Resource Group {:?})",
            self.name, self.account_name, self.resource_group
        )
    }
}

/// Builds [`VariableIdentity`] values for the write path.
///
/// The subscription comes from provider configuration; the remaining key
/// fields come from the resource configuration.
#[derive(Debug, Clone)]
pub struct IdentityResolver {
    subscription_id: String,
}

impl IdentityResolver {
    /// Create a resolver for the given subscription.
    pub fn new(subscription_id: impl Into<String>) -> Self {
        Self {
            subscription_id: subscription_id.into(),
        }
    }

    /// The subscription this resolver addresses.
    pub fn subscription_id(&self) -> &str {
        &self.subscription_id
    }

    /// Validate the user-supplied key and build an identity.
    pub fn resolve_for_write(
        &self,
        resource_group: &str,
        account_name: &str,
        name: &str,
    ) -> Result<VariableIdentity, ProviderError> {
        let fields = [
            ("subscription_id", self.subscription_id.as_str()),
            ("resource_group_name", resource_group),
            ("automation_account_name", account_name),
            ("name", name),
        ];
        for (field, value) in fields {
            if value.trim().is_empty() {
                return Err(ProviderError::InvalidIdentity(format!(
                    "{} must not be empty",
                    field
                )));
            }
        }

        Ok(VariableIdentity {
            subscription_id: self.subscription_id.clone(),
            resource_group: resource_group.to_string(),
            account_name: account_name.to_string(),
            name: name.to_string(),
        })
    }
}

/// A generic ARM resource id split into its well-known parts.
#[derive(Debug, Clone, PartialEq, Eq)]
struct ResourceId {
    subscription_id: String,
    resource_group: String,
    path: HashMap<String, String>,
}

impl ResourceId {
    fn parse(id: &str) -> Result<Self, ProviderError> {
        let trimmed = id.trim_matches('/');
        if trimmed.is_empty() {
            return Err(malformed(id, "identifier is empty"));
        }

        let segments: Vec<&str> = trimmed.split('/').collect();
        if segments.len() % 2 != 0 {
            return Err(malformed(id, "number of path segments is not divisible by 2"));
        }

        let mut components = HashMap::new();
        for pair in segments.chunks(2) {
            let (key, value) = (pair[0], pair[1]);
            if key.is_empty() || value.is_empty() {
                return Err(malformed(id, "keys and values must not be empty"));
            }
            components.insert(key.to_string(), value.to_string());
        }

        let subscription_id = components
            .remove("subscriptions")
            .ok_or_else(|| malformed(id, "no subscription id found"))?;

        // Some APIs hand back the resource group key in lower case.
        let resource_group = components
            .remove("resourceGroups")
            .or_else(|| components.remove("resourcegroups"))
            .ok_or_else(|| malformed(id, "no resource group name found"))?;

        components.remove("providers");

        Ok(Self {
            subscription_id,
            resource_group,
            path: components,
        })
    }

    fn path_segment(&self, id: &str, key: &str) -> Result<String, ProviderError> {
        self.path
            .get(key)
            .cloned()
            .ok_or_else(|| malformed(id, &format!("missing '{}' segment", key)))
    }
}

fn malformed(id: &str, reason: &str) -> ProviderError {
    ProviderError::MalformedIdentifier(format!("{:?}: {}", id, reason))
}

#[cfg(test)]
mod tests {
    use super::*;

    const ID: &str = "/subscriptions/00000000-0000-0000-0000-000000000000/resourceGroups/acctestRG-1/providers/Microsoft.Automation/automationAccounts/acctestAutoAcct-1/variables/acctestAutoVar-1";

    fn identity() -> VariableIdentity {
        VariableIdentity {
            subscription_id: "00000000-0000-0000-0000-000000000000".to_string(),
            resource_group: "acctestRG-1".to_string(),
            account_name: "acctestAutoAcct-1".to_string(),
            name: "acctestAutoVar-1".to_string(),
        }
    }

    #[test]
    fn test_parse_canonical() {
        assert_eq!(VariableIdentity::parse_canonical(ID).unwrap(), identity());
    }

    #[test]
    fn test_resource_id_parses_back() {
        let id = identity();
        assert_eq!(id.resource_id(), ID);
        assert_eq!(VariableIdentity::parse_canonical(&id.resource_id()).unwrap(), id);
    }

    #[test]
    fn test_parse_accepts_lowercase_resource_group_key() {
        let id = ID.replace("resourceGroups", "resourcegroups");
        let parsed = VariableIdentity::parse_canonical(&id).unwrap();
        assert_eq!(parsed.resource_group, "acctestRG-1");
    }

    #[test]
    fn test_parse_ignores_trailing_slash() {
        let id = format!("{}/", ID);
        assert_eq!(VariableIdentity::parse_canonical(&id).unwrap(), identity());
    }

    #[test]
    fn test_parse_missing_variables_segment() {
        let id = "/subscriptions/s/resourceGroups/rg/providers/Microsoft.Automation/automationAccounts/acct";
        let err = VariableIdentity::parse_canonical(id).unwrap_err();
        assert!(matches!(err, ProviderError::MalformedIdentifier(_)));
        assert!(err.to_string().contains("variables"));
    }

    #[test]
    fn test_parse_malformed_inputs() {
        let cases = [
            "",
            "/",
            "/subscriptions/s/resourceGroups",
            "/resourceGroups/rg/providers/Microsoft.Automation/automationAccounts/a/variables/v",
            "/subscriptions/s/providers/Microsoft.Automation/automationAccounts/a/variables/v",
            "/subscriptions/s/resourceGroups/rg/providers/Microsoft.Automation/variables/v",
            "/subscriptions/s/resourceGroups//providers/Microsoft.Automation/automationAccounts/a/variables/v",
        ];
        for case in cases {
            let result = VariableIdentity::parse_canonical(case);
            assert!(
                matches!(result, Err(ProviderError::MalformedIdentifier(_))),
                "expected MalformedIdentifier for {:?}, got {:?}",
                case,
                result
            );
        }
    }

    #[test]
    fn test_resolve_for_write() {
        let resolver = IdentityResolver::new("00000000-0000-0000-0000-000000000000");
        let id = resolver
            .resolve_for_write("acctestRG-1", "acctestAutoAcct-1", "acctestAutoVar-1")
            .unwrap();
        assert_eq!(id, identity());
    }

    #[test]
    fn test_resolve_for_write_rejects_empty_fields() {
        let resolver = IdentityResolver::new("sub");
        for (rg, account, name, field) in [
            ("", "a", "v", "resource_group_name"),
            ("rg", "  ", "v", "automation_account_name"),
            ("rg", "a", "", "name"),
        ] {
            let err = resolver.resolve_for_write(rg, account, name).unwrap_err();
            match err {
                ProviderError::InvalidIdentity(msg) => assert!(msg.starts_with(field)),
                other => panic!("expected InvalidIdentity, got {:?}", other),
            }
        }

        let err = IdentityResolver::new("")
            .resolve_for_write("rg", "a", "v")
            .unwrap_err();
        assert!(matches!(err, ProviderError::InvalidIdentity(_)));
    }

    #[test]
    fn test_display() {
        assert_eq!(
            identity().to_string(),
            "\"acctestAutoVar-1\" (Automation Account Name \"acctestAutoAcct-1\" / Resource Group \"acctestRG-1\")"
        );
    }
}
