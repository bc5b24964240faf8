//! The automation variable provider.
//!
//! [`AutomationVariableProvider`] serves one resource type per [`ValueKind`]
//! and translates between JSON resource state and the [`Reconciler`].

use serde_json::{json, Map, Value};
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::client::VariableClient;
use crate::codec::{self, ValueKind, VariableValue};
use crate::config::ProviderConfig;
use crate::error::ProviderError;
use crate::identity::{IdentityResolver, VariableIdentity};
use crate::reconciler::{ReadOutcome, Reconciler, VariableSpec, VariableState};
use crate::schema::{Attribute, Diagnostic, ProviderSchema, Schema};
use crate::service::{diagnostics_or_error, ProviderService};
use crate::types::{AttributeChange, ImportedResource, PlanResult};
use crate::validation;

/// Build the resource schema for a variable kind.
pub fn variable_schema(kind: ValueKind) -> Schema {
    let value = match kind {
        ValueKind::Int => Attribute::required_int64(),
        ValueKind::Bool => Attribute::required_bool(),
        ValueKind::DateTime => {
            Attribute::required_string().with_description("RFC 3339 timestamp")
        },
        ValueKind::String => Attribute::required_string(),
    };

    Schema::v0()
        .with_description(format!("An Automation {} Variable", kind))
        .with_attribute(
            "name",
            Attribute::required_string()
                .with_force_new()
                .non_empty()
                .with_description("Variable name"),
        )
        .with_attribute(
            "resource_group_name",
            Attribute::required_string().with_force_new().non_empty(),
        )
        .with_attribute(
            "automation_account_name",
            Attribute::required_string().with_force_new().non_empty(),
        )
        .with_attribute("description", Attribute::optional_string())
        .with_attribute(
            "encrypted",
            Attribute::optional_bool().with_default(Value::Bool(false)),
        )
        .with_attribute("value", value)
        .with_attribute(
            "id",
            Attribute::computed_string().with_description("Canonical resource id"),
        )
}

/// Provider for typed automation variables.
pub struct AutomationVariableProvider<C> {
    reconciler: Reconciler<C>,
    config: RwLock<Option<ProviderConfig>>,
    stop: CancellationToken,
}

impl<C: VariableClient> AutomationVariableProvider<C> {
    /// Create an unconfigured provider over the given client.
    pub fn new(client: C) -> Self {
        Self {
            reconciler: Reconciler::new(client),
            config: RwLock::new(None),
            stop: CancellationToken::new(),
        }
    }

    /// Create a provider that is already configured.
    pub fn with_config(client: C, config: ProviderConfig) -> Self {
        Self {
            reconciler: Reconciler::new(client),
            config: RwLock::new(Some(config)),
            stop: CancellationToken::new(),
        }
    }

    /// The underlying client.
    pub fn client(&self) -> &C {
        self.reconciler.client()
    }

    /// The active configuration, if `configure` has succeeded.
    pub async fn config(&self) -> Option<ProviderConfig> {
        self.config.read().await.clone()
    }

    async fn configured(&self) -> Result<ProviderConfig, ProviderError> {
        self.config().await.ok_or_else(|| {
            ProviderError::Configuration("provider has not been configured".to_string())
        })
    }

    // Tokens created after stop() start out cancelled.
    fn operation_token(&self) -> CancellationToken {
        self.stop.child_token()
    }
}

fn kind_for(resource_type: &str) -> Result<ValueKind, ProviderError> {
    ValueKind::from_resource_type(resource_type)
        .ok_or_else(|| ProviderError::UnknownResource(resource_type.to_string()))
}

fn object<'a>(state: &'a Value, what: &str) -> Result<&'a Map<String, Value>, ProviderError> {
    state
        .as_object()
        .ok_or_else(|| ProviderError::Validation(format!("{} must be an object", what)))
}

fn required_str<'a>(obj: &'a Map<String, Value>, field: &str) -> Result<&'a str, ProviderError> {
    obj.get(field)
        .and_then(Value::as_str)
        .ok_or_else(|| ProviderError::Validation(format!("Missing required attribute '{}'", field)))
}

/// Build the desired state from resource configuration.
fn spec_from_config(
    resolver: &IdentityResolver,
    kind: ValueKind,
    config: &Value,
) -> Result<VariableSpec, ProviderError> {
    let obj = object(config, "resource configuration")?;

    let identity = resolver.resolve_for_write(
        required_str(obj, "resource_group_name")?,
        required_str(obj, "automation_account_name")?,
        required_str(obj, "name")?,
    )?;
    let value = match obj.get("value") {
        Some(v) if !v.is_null() => VariableValue::from_json(kind, v)?,
        _ => {
            return Err(ProviderError::Validation(
                "Missing required attribute 'value'".to_string(),
            ))
        },
    };

    let mut spec = VariableSpec::new(identity, value)
        .with_encrypted(obj.get("encrypted").and_then(Value::as_bool).unwrap_or(false));
    if let Some(description) = obj
        .get("description")
        .and_then(Value::as_str)
        .filter(|d| !d.is_empty())
    {
        spec = spec.with_description(description);
    }
    Ok(spec)
}

/// Find the identity of tracked state, preferring its canonical id.
fn identity_from_state(
    config: &ProviderConfig,
    state: &Value,
) -> Result<VariableIdentity, ProviderError> {
    let obj = object(state, "resource state")?;
    match obj.get("id").and_then(Value::as_str).filter(|id| !id.is_empty()) {
        Some(id) => VariableIdentity::parse_canonical(id),
        None => config.resolver().resolve_for_write(
            required_str(obj, "resource_group_name")?,
            required_str(obj, "automation_account_name")?,
            required_str(obj, "name")?,
        ),
    }
}

/// Render observed state in the resource schema's shape.
fn state_to_json(state: &VariableState) -> Value {
    json!({
        "id": state.id,
        "name": state.identity.name,
        "resource_group_name": state.identity.resource_group,
        "automation_account_name": state.identity.account_name,
        "description": state.description,
        "encrypted": state.encrypted,
        "value": state.value.as_ref().map(VariableValue::to_json),
    })
}

/// Fill defaults and fold equivalent representations together.
fn normalize(state: &Value) -> Value {
    let mut state = state.clone();
    if let Some(obj) = state.as_object_mut() {
        if obj.get("description").and_then(Value::as_str) == Some("") {
            obj.insert("description".to_string(), Value::Null);
        }
        if !obj.get("encrypted").is_some_and(Value::is_boolean) {
            obj.insert("encrypted".to_string(), Value::Bool(false));
        }
    }
    state
}

fn validation_error(diagnostics: Vec<Diagnostic>) -> ProviderError {
    let messages: Vec<String> = diagnostics
        .iter()
        .map(|d| match &d.detail {
            Some(detail) => format!("{}: {}", d.summary, detail),
            None => d.summary.clone(),
        })
        .collect();
    ProviderError::Validation(messages.join("; "))
}

/// Whether two configured values name the same stored value.
///
/// Date-times are compared by the instant they encode to, so `...05Z`,
/// `...05.000Z` and an equivalent offset form are all equal.
fn same_value(kind: ValueKind, before: Option<&Value>, after: Option<&Value>) -> bool {
    let encoded = |v: Option<&Value>| {
        v.filter(|v| !v.is_null())
            .and_then(|v| VariableValue::from_json(kind, v).ok())
            .and_then(|v| codec::encode(&v).ok())
    };
    match (encoded(before), encoded(after)) {
        (Some(b), Some(a)) => b == a,
        _ => false,
    }
}

fn diff(
    schema: &Schema,
    kind: ValueKind,
    prior: &Value,
    planned: &Value,
) -> (Vec<AttributeChange>, bool) {
    // The service never returns encrypted values, so there is nothing to diff against.
    let value_unknown = prior.get("encrypted").and_then(Value::as_bool) == Some(true)
        && prior.get("value").unwrap_or(&Value::Null).is_null();

    let mut names: Vec<&String> = schema.attributes.keys().collect();
    names.sort();

    let mut changes = Vec::new();
    let mut requires_replace = false;
    for name in names {
        let attr = &schema.attributes[name];
        if attr.flags.computed || (name == "value" && value_unknown) {
            continue;
        }
        if name == "value"
            && kind == ValueKind::DateTime
            && same_value(kind, prior.get(name), planned.get(name))
        {
            continue;
        }
        if let Some(change) = AttributeChange::between(name.as_str(), prior.get(name), planned.get(name)) {
            requires_replace |= attr.force_new;
            changes.push(change);
        }
    }
    (changes, requires_replace)
}

fn immutable_field_changed(prior: &VariableIdentity, planned: &VariableIdentity) -> Option<&'static str> {
    if prior.name != planned.name {
        Some("name")
    } else if prior.resource_group != planned.resource_group {
        Some("resource_group_name")
    } else if prior.account_name != planned.account_name {
        Some("automation_account_name")
    } else if prior.subscription_id != planned.subscription_id {
        Some("subscription_id")
    } else {
        None
    }
}

#[async_trait::async_trait]
impl<C: VariableClient> ProviderService for AutomationVariableProvider<C> {
    fn schema(&self) -> ProviderSchema {
        ValueKind::ALL.iter().fold(
            ProviderSchema::new().with_provider_config(ProviderConfig::schema()),
            |schema, kind| schema.with_resource(kind.resource_type(), variable_schema(*kind)),
        )
    }

    async fn validate_provider_config(&self, config: Value) -> Result<Vec<Diagnostic>, ProviderError> {
        if !config.is_null() {
            let diagnostics = validation::validate(&ProviderConfig::schema(), &config);
            if !diagnostics.is_empty() {
                return Ok(diagnostics);
            }
        }
        Ok(ProviderConfig::validate(&config))
    }

    #[instrument(skip_all)]
    async fn configure(&self, config: Value) -> Result<Vec<Diagnostic>, ProviderError> {
        match diagnostics_or_error(ProviderConfig::from_value(&config)) {
            Ok(resolved) => {
                info!(
                    subscription_id = %resolved.subscription_id,
                    require_import = resolved.require_resources_to_be_imported,
                    "Provider configured"
                );
                *self.config.write().await = Some(resolved);
                Ok(vec![])
            },
            Err(diagnostics) => {
                warn!(diagnostics = diagnostics.len(), "Provider configuration rejected");
                Ok(diagnostics)
            },
        }
    }

    async fn stop(&self) -> Result<(), ProviderError> {
        info!("Stopping provider; cancelling in-flight operations");
        self.stop.cancel();
        Ok(())
    }

    async fn validate_resource_config(
        &self,
        resource_type: &str,
        config: Value,
    ) -> Result<Vec<Diagnostic>, ProviderError> {
        let kind = kind_for(resource_type)?;
        let diagnostics = validation::validate(&variable_schema(kind), &config);
        if !diagnostics.is_empty() {
            return Ok(diagnostics);
        }

        // Catch values the service would reject before anything is sent.
        let checked = config
            .get("value")
            .map(|v| VariableValue::from_json(kind, v))
            .transpose()
            .and_then(|value| value.as_ref().map(codec::encode).transpose());
        Ok(diagnostics_or_error(checked).err().unwrap_or_default())
    }

    #[instrument(skip_all, fields(resource_type = %resource_type, create = prior_state.is_none()))]
    async fn plan(
        &self,
        resource_type: &str,
        prior_state: Option<Value>,
        proposed_state: Value,
        _config: Value,
    ) -> Result<PlanResult, ProviderError> {
        let kind = kind_for(resource_type)?;
        let schema = variable_schema(kind);
        validation::validate_result(&schema, &proposed_state).map_err(validation_error)?;

        let mut planned = normalize(&proposed_state);
        let Some(prior) = prior_state.as_ref().map(normalize) else {
            if let Some(obj) = planned.as_object_mut() {
                obj.insert("id".to_string(), Value::Null);
            }
            let (changes, _) = diff(&schema, kind, &json!({}), &planned);
            debug!(changes = changes.len(), "Planned creation");
            return Ok(PlanResult::with_changes(planned, changes, false));
        };

        let (changes, requires_replace) = diff(&schema, kind, &prior, &planned);
        if let Some(obj) = planned.as_object_mut() {
            let id = if requires_replace {
                Value::Null
            } else {
                prior.get("id").cloned().unwrap_or(Value::Null)
            };
            obj.insert("id".to_string(), id);
        }

        debug!(changes = changes.len(), requires_replace, "Planned update");
        Ok(PlanResult::with_changes(planned, changes, requires_replace))
    }

    #[instrument(skip_all, fields(resource_type = %resource_type))]
    async fn create(&self, resource_type: &str, planned_state: Value) -> Result<Value, ProviderError> {
        let kind = kind_for(resource_type)?;
        let config = self.configured().await?;
        let spec = spec_from_config(&config.resolver(), kind, &planned_state)?;

        let state = self
            .reconciler
            .create_or_update(
                &self.operation_token(),
                &spec,
                config.require_resources_to_be_imported,
            )
            .await?;
        Ok(state_to_json(&state))
    }

    #[instrument(skip_all, fields(resource_type = %resource_type))]
    async fn read(&self, resource_type: &str, current_state: Value) -> Result<Value, ProviderError> {
        let kind = kind_for(resource_type)?;
        let config = self.configured().await?;
        let identity = identity_from_state(&config, &current_state)?;

        match self.reconciler.read(&self.operation_token(), &identity, kind).await? {
            ReadOutcome::Present(state) => Ok(state_to_json(&state)),
            ReadOutcome::Removed => Ok(Value::Null),
        }
    }

    #[instrument(skip_all, fields(resource_type = %resource_type))]
    async fn update(
        &self,
        resource_type: &str,
        prior_state: Value,
        planned_state: Value,
    ) -> Result<Value, ProviderError> {
        let kind = kind_for(resource_type)?;
        let config = self.configured().await?;
        let prior = identity_from_state(&config, &prior_state)?;
        let spec = spec_from_config(&config.resolver(), kind, &planned_state)?;

        if let Some(field) = immutable_field_changed(&prior, &spec.identity) {
            return Err(ProviderError::Validation(format!(
                "'{}' cannot be changed in place; the variable must be replaced",
                field
            )));
        }

        let state = self
            .reconciler
            .create_or_update(&self.operation_token(), &spec, false)
            .await?;
        Ok(state_to_json(&state))
    }

    #[instrument(skip_all, fields(resource_type = %resource_type))]
    async fn delete(&self, resource_type: &str, current_state: Value) -> Result<(), ProviderError> {
        kind_for(resource_type)?;
        let config = self.configured().await?;
        let identity = identity_from_state(&config, &current_state)?;
        self.reconciler.delete(&self.operation_token(), &identity).await
    }

    #[instrument(skip_all, fields(resource_type = %resource_type, id = %id))]
    async fn import_resource(
        &self,
        resource_type: &str,
        id: &str,
    ) -> Result<Vec<ImportedResource>, ProviderError> {
        let kind = kind_for(resource_type)?;
        self.configured().await?;

        match self.reconciler.import(&self.operation_token(), id, kind).await? {
            ReadOutcome::Present(state) => {
                info!("Imported automation variable");
                Ok(vec![ImportedResource::new(resource_type, state_to_json(&state))])
            },
            ReadOutcome::Removed => Err(ProviderError::NotFound(format!(
                "cannot import non-existent remote object {}",
                id
            ))),
        }
    }
}
