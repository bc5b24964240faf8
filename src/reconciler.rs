//! Lifecycle operations for automation variables.
//!
//! The [`Reconciler`] is stateless between calls: every operation addresses
//! the service through the injected [`VariableClient`] and receives the
//! caller's cancellation token. It never retries and never imposes timeouts.

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::client::{ClientError, RemoteVariableRecord, VariableClient, VariableWriteParameters};
use crate::codec::{self, ValueKind, VariableValue};
use crate::error::ProviderError;
use crate::identity::VariableIdentity;

/// Desired state of a variable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VariableSpec {
    /// Where the variable lives.
    pub identity: VariableIdentity,
    /// Optional description.
    pub description: Option<String>,
    /// Whether the service should encrypt the value.
    pub encrypted: bool,
    /// The logical value; its variant selects the variable kind.
    pub value: VariableValue,
}

impl VariableSpec {
    /// Create an unencrypted spec without a description.
    pub fn new(identity: VariableIdentity, value: VariableValue) -> Self {
        Self {
            identity,
            description: None,
            encrypted: false,
            value,
        }
    }

    /// Set the description.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Set whether the value is stored encrypted.
    pub fn with_encrypted(mut self, encrypted: bool) -> Self {
        self.encrypted = encrypted;
        self
    }

    /// The variable kind.
    pub fn kind(&self) -> ValueKind {
        self.value.kind()
    }
}

/// A variable as last observed in the service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VariableState {
    /// Canonical resource id.
    pub id: String,
    /// Where the variable lives.
    pub identity: VariableIdentity,
    /// The declared kind used to decode the value.
    pub kind: ValueKind,
    /// Description, `None` when unset or empty.
    pub description: Option<String>,
    /// Whether the value is stored encrypted.
    pub encrypted: bool,
    /// Decoded value. Always `None` for encrypted variables.
    pub value: Option<VariableValue>,
}

/// Result of refreshing a variable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadOutcome {
    /// The variable exists.
    Present(VariableState),
    /// The variable no longer exists; the caller should stop tracking it.
    Removed,
}

impl ReadOutcome {
    /// The refreshed state, if the variable still exists.
    pub fn into_state(self) -> Option<VariableState> {
        match self {
            Self::Present(state) => Some(state),
            Self::Removed => None,
        }
    }
}

/// Drives create-or-update, read, delete and import against the service.
#[derive(Debug)]
pub struct Reconciler<C> {
    client: C,
}

impl<C: VariableClient> Reconciler<C> {
    /// Create a reconciler over the given client.
    pub fn new(client: C) -> Self {
        Self { client }
    }

    /// The underlying client.
    pub fn client(&self) -> &C {
        &self.client
    }

    /// Write the variable and return its refreshed state.
    ///
    /// With `import_guard` set, an existing remote variable fails the call
    /// with [`ProviderError::AlreadyExists`] instead of being overwritten.
    /// Repeating the call with the guard off converges to the same state.
    #[instrument(
        skip_all,
        fields(
            kind = %spec.kind(),
            resource_group = %spec.identity.resource_group,
            account = %spec.identity.account_name,
            name = %spec.identity.name
        )
    )]
    pub async fn create_or_update(
        &self,
        ctx: &CancellationToken,
        spec: &VariableSpec,
        import_guard: bool,
    ) -> Result<VariableState, ProviderError> {
        let kind = spec.kind();
        let identity = &spec.identity;
        let target = describe(kind, identity);

        if import_guard {
            ensure_active(ctx, &target)?;
            match self
                .client
                .get(ctx, &identity.resource_group, &identity.account_name, &identity.name)
                .await
            {
                Ok(existing) => {
                    let id = canonical_id(&existing, identity);
                    warn!(id = %id, "Found an unmanaged automation variable");
                    return Err(ProviderError::AlreadyExists(id));
                },
                Err(e) if e.is_not_found() => {},
                Err(e) => return Err(remote("checking for presence of existing", &target, e)),
            }
        }

        let parameters = VariableWriteParameters {
            name: identity.name.clone(),
            description: spec.description.clone().unwrap_or_default(),
            is_encrypted: spec.encrypted,
            value: codec::encode(&spec.value)?,
        };

        ensure_active(ctx, &target)?;
        self.client
            .create_or_update(
                ctx,
                &identity.resource_group,
                &identity.account_name,
                &identity.name,
                parameters,
            )
            .await
            .map_err(|e| remote("creating", &target, e))?;

        ensure_active(ctx, &target)?;
        let record = self
            .client
            .get(ctx, &identity.resource_group, &identity.account_name, &identity.name)
            .await
            .map_err(|e| remote("retrieving", &target, e))?;

        let id = match record.id.as_deref() {
            Some(id) if !id.is_empty() => id.to_string(),
            _ => {
                return Err(ProviderError::IncompleteWrite(format!(
                    "cannot read {} ID",
                    target
                )))
            },
        };

        info!(id = %id, encrypted = spec.encrypted, "Automation variable written");
        state_from_record(kind, identity.clone(), id, record, &target)
    }

    /// Refresh a variable from the service.
    ///
    /// A missing variable yields [`ReadOutcome::Removed`]. Encrypted values are
    /// never decoded.
    #[instrument(
        skip_all,
        fields(
            kind = %kind,
            resource_group = %identity.resource_group,
            account = %identity.account_name,
            name = %identity.name
        )
    )]
    pub async fn read(
        &self,
        ctx: &CancellationToken,
        identity: &VariableIdentity,
        kind: ValueKind,
    ) -> Result<ReadOutcome, ProviderError> {
        let target = describe(kind, identity);
        ensure_active(ctx, &target)?;

        match self
            .client
            .get(ctx, &identity.resource_group, &identity.account_name, &identity.name)
            .await
        {
            Ok(record) => {
                let id = canonical_id(&record, identity);
                debug!(id = %id, encrypted = record.is_encrypted, "Automation variable found");
                state_from_record(kind, identity.clone(), id, record, &target)
                    .map(ReadOutcome::Present)
            },
            Err(e) if e.is_not_found() => {
                info!(id = %identity.resource_id(), "Automation variable does not exist - removing from state");
                Ok(ReadOutcome::Removed)
            },
            Err(e) => Err(remote("reading", &target, e)),
        }
    }

    /// Delete a variable. Deleting an absent variable succeeds.
    #[instrument(
        skip_all,
        fields(
            resource_group = %identity.resource_group,
            account = %identity.account_name,
            name = %identity.name
        )
    )]
    pub async fn delete(
        &self,
        ctx: &CancellationToken,
        identity: &VariableIdentity,
    ) -> Result<(), ProviderError> {
        let target = format!("Automation Variable {}", identity);
        ensure_active(ctx, &target)?;

        match self
            .client
            .delete(ctx, &identity.resource_group, &identity.account_name, &identity.name)
            .await
        {
            Ok(()) => {
                info!("Automation variable deleted");
                Ok(())
            },
            Err(e) if e.is_not_found() => {
                debug!("Automation variable already absent");
                Ok(())
            },
            Err(ClientError::Cancelled) => Err(ProviderError::Cancelled(format!("deleting {}", target))),
            Err(e) => Err(ProviderError::DeleteFailed(target, e)),
        }
    }

    /// Bring an existing variable under management by its canonical id.
    #[instrument(skip_all, fields(kind = %kind, id = %canonical_id))]
    pub async fn import(
        &self,
        ctx: &CancellationToken,
        canonical_id: &str,
        kind: ValueKind,
    ) -> Result<ReadOutcome, ProviderError> {
        let identity = VariableIdentity::parse_canonical(canonical_id)?;
        self.read(ctx, &identity, kind).await
    }
}

fn describe(kind: ValueKind, identity: &VariableIdentity) -> String {
    format!("Automation {} Variable {}", kind, identity)
}

fn ensure_active(ctx: &CancellationToken, target: &str) -> Result<(), ProviderError> {
    if ctx.is_cancelled() {
        return Err(ProviderError::Cancelled(target.to_string()));
    }
    Ok(())
}

fn remote(operation: &'static str, target: &str, source: ClientError) -> ProviderError {
    match source {
        ClientError::Cancelled => ProviderError::Cancelled(format!("{} {}", operation, target)),
        source => ProviderError::Remote {
            operation,
            target: target.to_string(),
            source,
        },
    }
}

fn canonical_id(record: &RemoteVariableRecord, identity: &VariableIdentity) -> String {
    match record.id.as_deref() {
        Some(id) if !id.is_empty() => id.to_string(),
        _ => identity.resource_id(),
    }
}

fn state_from_record(
    kind: ValueKind,
    identity: VariableIdentity,
    id: String,
    record: RemoteVariableRecord,
    target: &str,
) -> Result<VariableState, ProviderError> {
    let value = if record.is_encrypted {
        None
    } else {
        let encoded = record.value.as_deref().ok_or_else(|| {
            ProviderError::ValueDecode(format!("{} has no value", target))
        })?;
        Some(codec::decode(kind, encoded)?)
    };

    Ok(VariableState {
        id,
        identity,
        kind,
        description: record.description.filter(|d| !d.is_empty()),
        encrypted: record.is_encrypted,
        value,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{InMemoryAutomationService, Operation};
    use tokio_test::{assert_err, assert_ok};

    const SUBSCRIPTION: &str = "00000000-0000-0000-0000-000000000000";

    fn identity(name: &str) -> VariableIdentity {
        VariableIdentity {
            subscription_id: SUBSCRIPTION.to_string(),
            resource_group: "acctestRG-1".to_string(),
            account_name: "acctestAutoAcct-1".to_string(),
            name: name.to_string(),
        }
    }

    fn reconciler() -> Reconciler<InMemoryAutomationService> {
        Reconciler::new(InMemoryAutomationService::new(SUBSCRIPTION))
    }

    async fn read_state(
        reconciler: &Reconciler<InMemoryAutomationService>,
        id: &VariableIdentity,
        kind: ValueKind,
    ) -> VariableState {
        reconciler
            .read(&CancellationToken::new(), id, kind)
            .await
            .unwrap()
            .into_state()
            .expect("variable should exist")
    }

    #[tokio::test]
    async fn test_int_create_update_revert() {
        let reconciler = reconciler();
        let ctx = CancellationToken::new();
        let id = identity("v1");

        let created = reconciler
            .create_or_update(&ctx, &VariableSpec::new(id.clone(), VariableValue::Int(1234)), true)
            .await
            .unwrap();
        assert_eq!(created.id, id.resource_id());
        assert_eq!(created.value, Some(VariableValue::Int(1234)));

        let state = read_state(&reconciler, &id, ValueKind::Int).await;
        assert_eq!(state.value, Some(VariableValue::Int(1234)));
        assert_eq!(state.description, None);

        let updated = VariableSpec::new(id.clone(), VariableValue::Int(12345)).with_description("d");
        assert_ok!(reconciler.create_or_update(&ctx, &updated, false).await);
        let state = read_state(&reconciler, &id, ValueKind::Int).await;
        assert_eq!(state.value, Some(VariableValue::Int(12345)));
        assert_eq!(state.description, Some("d".to_string()));

        let reverted = VariableSpec::new(id.clone(), VariableValue::Int(1234));
        assert_ok!(reconciler.create_or_update(&ctx, &reverted, false).await);
        let state = read_state(&reconciler, &id, ValueKind::Int).await;
        assert_eq!(state.value, Some(VariableValue::Int(1234)));
        assert_eq!(state.description, None);

        assert_eq!(reconciler.client().len().await, 1);
    }

    #[tokio::test]
    async fn test_datetime_create_stores_wrapper_token() {
        let reconciler = reconciler();
        let id = identity("when");
        let spec = VariableSpec::new(
            id.clone(),
            VariableValue::DateTime("2023-01-02T15:04:05Z".to_string()),
        );

        let state = reconciler
            .create_or_update(&CancellationToken::new(), &spec, true)
            .await
            .unwrap();

        assert_eq!(
            reconciler.client().stored_value(&id).await,
            Some(r#""\/Date(1672671845000)\/""#.to_string())
        );
        assert_eq!(
            state.value,
            Some(VariableValue::DateTime("2023-01-02T15:04:05.000Z".to_string()))
        );
    }

    #[tokio::test]
    async fn test_invalid_time_format_makes_no_write() {
        let reconciler = reconciler();
        let spec = VariableSpec::new(
            identity("when"),
            VariableValue::DateTime("yesterday".to_string()),
        );

        let err = reconciler
            .create_or_update(&CancellationToken::new(), &spec, false)
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::InvalidTimeFormat(_)));
        assert!(!err.is_retryable());
        assert_eq!(reconciler.client().calls().await.create_or_update, 0);
    }

    #[tokio::test]
    async fn test_string_and_bool_consistency() {
        let reconciler = reconciler();
        let ctx = CancellationToken::new();

        let text = VariableSpec::new(
            identity("greeting"),
            VariableValue::String("Hello, \"Terraform\" \\ world".to_string()),
        );
        let flag = VariableSpec::new(identity("flag"), VariableValue::Bool(true));

        for spec in [&text, &flag] {
            assert_ok!(reconciler.create_or_update(&ctx, spec, true).await);
            let state = read_state(&reconciler, &spec.identity, spec.kind()).await;
            assert_eq!(state.value.as_ref(), Some(&spec.value));
        }
    }

    #[tokio::test]
    async fn test_encrypted_value_is_opaque() {
        let reconciler = reconciler();
        let id = identity("secret");
        let spec = VariableSpec::new(id.clone(), VariableValue::String("hunter2".to_string()))
            .with_encrypted(true);

        let created = reconciler
            .create_or_update(&CancellationToken::new(), &spec, true)
            .await
            .unwrap();
        assert!(created.encrypted);
        assert_eq!(created.value, None);

        let state = read_state(&reconciler, &id, ValueKind::String).await;
        assert!(state.encrypted);
        assert_eq!(state.value, None);

        // Even a value that would not decode as the declared kind is never touched.
        let state = read_state(&reconciler, &id, ValueKind::Int).await;
        assert_eq!(state.value, None);
    }

    #[tokio::test]
    async fn test_import_guard_rejects_existing_variable() {
        let reconciler = reconciler();
        let id = identity("existing");
        reconciler
            .client()
            .seed(&id, VariableWriteParameters {
                name: id.name.clone(),
                description: String::new(),
                is_encrypted: false,
                value: "1".to_string(),
            })
            .await;

        let spec = VariableSpec::new(id.clone(), VariableValue::Int(2));
        let err = reconciler
            .create_or_update(&CancellationToken::new(), &spec, true)
            .await
            .unwrap_err();
        match err {
            ProviderError::AlreadyExists(found) => assert_eq!(found, id.resource_id()),
            other => panic!("expected AlreadyExists, got {:?}", other),
        }
        assert_eq!(reconciler.client().stored_value(&id).await, Some("1".to_string()));

        // Without the guard the write is a plain update.
        let state = reconciler
            .create_or_update(&CancellationToken::new(), &spec, false)
            .await
            .unwrap();
        assert_eq!(state.value, Some(VariableValue::Int(2)));
    }

    #[tokio::test]
    async fn test_import_guard_surfaces_lookup_failure() {
        let reconciler = reconciler();
        reconciler
            .client()
            .fail_next(Operation::Get, ClientError::Status {
                status: 500,
                message: "boom".to_string(),
            })
            .await;

        let spec = VariableSpec::new(identity("v"), VariableValue::Int(1));
        let err = reconciler
            .create_or_update(&CancellationToken::new(), &spec, true)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ProviderError::Remote {
                operation: "checking for presence of existing",
                ..
            }
        ));
        assert!(err.is_retryable());
        assert_eq!(reconciler.client().calls().await.create_or_update, 0);
    }

    #[tokio::test]
    async fn test_missing_id_is_incomplete_write() {
        let reconciler = reconciler();
        reconciler.client().set_omit_ids(true).await;

        let spec = VariableSpec::new(identity("v"), VariableValue::Int(1));
        let err = reconciler
            .create_or_update(&CancellationToken::new(), &spec, false)
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::IncompleteWrite(_)));
        assert!(!err.is_retryable());
    }

    #[tokio::test]
    async fn test_transport_failure_surfaces_unchanged() {
        let reconciler = reconciler();
        let failure = ClientError::Transport("connection reset".to_string());
        reconciler
            .client()
            .fail_next(Operation::CreateOrUpdate, failure.clone())
            .await;

        let spec = VariableSpec::new(identity("v"), VariableValue::Int(1));
        let err = reconciler
            .create_or_update(&CancellationToken::new(), &spec, false)
            .await
            .unwrap_err();
        match err {
            ProviderError::Remote { source, operation, .. } => {
                assert_eq!(source, failure);
                assert_eq!(operation, "creating");
            },
            other => panic!("expected Remote, got {:?}", other),
        }
        assert_eq!(reconciler.client().calls().await.create_or_update, 1);
    }

    #[tokio::test]
    async fn test_read_missing_variable_is_removed() {
        let reconciler = reconciler();
        let outcome = reconciler
            .read(&CancellationToken::new(), &identity("gone"), ValueKind::Int)
            .await
            .unwrap();
        assert_eq!(outcome, ReadOutcome::Removed);
    }

    #[tokio::test]
    async fn test_read_type_mismatch_is_decode_error() {
        let reconciler = reconciler();
        let id = identity("text");
        let spec = VariableSpec::new(id.clone(), VariableValue::String("abc".to_string()));
        assert_ok!(reconciler.create_or_update(&CancellationToken::new(), &spec, false).await);

        let err = reconciler
            .read(&CancellationToken::new(), &id, ValueKind::Int)
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::ValueDecode(_)));
        assert!(err.to_string().contains("found a String value"));
    }

    #[tokio::test]
    async fn test_delete_is_idempotent() {
        let reconciler = reconciler();
        let ctx = CancellationToken::new();
        let id = identity("v1");
        let spec = VariableSpec::new(id.clone(), VariableValue::Int(1234));
        assert_ok!(reconciler.create_or_update(&ctx, &spec, true).await);

        assert_ok!(reconciler.delete(&ctx, &id).await);
        assert_ok!(reconciler.delete(&ctx, &id).await);
        assert!(!reconciler.client().contains(&id).await);
        assert_eq!(reconciler.client().calls().await.delete, 2);
    }

    #[tokio::test]
    async fn test_delete_failure() {
        let reconciler = reconciler();
        reconciler
            .client()
            .fail_next(Operation::Delete, ClientError::Status {
                status: 409,
                message: "conflict".to_string(),
            })
            .await;

        let err = reconciler
            .delete(&CancellationToken::new(), &identity("v1"))
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::DeleteFailed(_, ClientError::Status { status: 409, .. })));
    }

    #[tokio::test]
    async fn test_import_reads_by_canonical_id() {
        let reconciler = reconciler();
        let ctx = CancellationToken::new();
        let id = identity("imported");
        let spec = VariableSpec::new(id.clone(), VariableValue::Bool(false)).with_description("from elsewhere");
        assert_ok!(reconciler.create_or_update(&ctx, &spec, false).await);

        let state = reconciler
            .import(&ctx, &id.resource_id(), ValueKind::Bool)
            .await
            .unwrap()
            .into_state()
            .unwrap();
        assert_eq!(state.identity, id);
        assert_eq!(state.value, Some(VariableValue::Bool(false)));
        assert_eq!(state.description, Some("from elsewhere".to_string()));
    }

    #[tokio::test]
    async fn test_import_malformed_id() {
        let reconciler = reconciler();
        let result = reconciler
            .import(
                &CancellationToken::new(),
                "/subscriptions/s/resourceGroups/rg/providers/Microsoft.Automation/automationAccounts/a",
                ValueKind::Int,
            )
            .await;
        assert!(matches!(assert_err!(result), ProviderError::MalformedIdentifier(_)));
        assert_eq!(reconciler.client().calls().await.get, 0);
    }

    #[tokio::test]
    async fn test_cancelled_token_stops_before_remote_call() {
        let reconciler = reconciler();
        let ctx = CancellationToken::new();
        ctx.cancel();

        let spec = VariableSpec::new(identity("v"), VariableValue::Int(1));
        let err = reconciler.create_or_update(&ctx, &spec, true).await.unwrap_err();
        assert!(matches!(err, ProviderError::Cancelled(_)));

        let err = reconciler.read(&ctx, &identity("v"), ValueKind::Int).await.unwrap_err();
        assert!(matches!(err, ProviderError::Cancelled(_)));

        let err = reconciler.delete(&ctx, &identity("v")).await.unwrap_err();
        assert!(matches!(err, ProviderError::Cancelled(_)));

        let calls = reconciler.client().calls().await;
        assert_eq!(calls.get + calls.create_or_update + calls.delete, 0);
    }

    #[tokio::test]
    async fn test_client_cancellation_is_not_swallowed() {
        let reconciler = reconciler();
        reconciler
            .client()
            .fail_next(Operation::Get, ClientError::Cancelled)
            .await;

        let err = reconciler
            .read(&CancellationToken::new(), &identity("v"), ValueKind::Int)
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::Cancelled(_)));
    }
}
