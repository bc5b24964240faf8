//! Testing utilities for automation variable resources.
//!
//! [`InMemoryAutomationService`] stands in for the automation service so the
//! reconciler and provider can be exercised without network access, and
//! [`VariableTester`] drives full resource lifecycles through a
//! [`ProviderService`].
//!
//! # Example
//!
//! ```ignore
//! use hemmer_automation_variables::testing::{InMemoryAutomationService, VariableTester};
//! use hemmer_automation_variables::AutomationVariableProvider;
//! use serde_json::json;
//!
//! #[tokio::test]
//! async fn test_create_int_variable() {
//!     let service = InMemoryAutomationService::new("sub");
//!     let tester = VariableTester::new(AutomationVariableProvider::new(service));
//!     tester.configure(json!({"subscription_id": "sub"})).await.unwrap();
//!
//!     let state = tester.lifecycle_create("azurerm_automation_int_variable", json!({
//!         "name": "v1",
//!         "resource_group_name": "rg",
//!         "automation_account_name": "acct",
//!         "value": 1234
//!     })).await.unwrap();
//!
//!     assert_eq!(state["value"], 1234);
//! }
//! ```

use std::collections::{HashMap, VecDeque};

use serde_json::Value;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use crate::client::{ClientError, RemoteVariableRecord, VariableClient, VariableWriteParameters};
use crate::error::ProviderError;
use crate::identity::{VariableIdentity, PROVIDER_NAMESPACE};
use crate::schema::Diagnostic;
use crate::service::ProviderService;
use crate::types::{ImportedResource, PlanResult};

/// A client operation, used to target injected failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    /// [`VariableClient::get`]
    Get,
    /// [`VariableClient::create_or_update`]
    CreateOrUpdate,
    /// [`VariableClient::delete`]
    Delete,
}

/// How many times each client operation was invoked.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CallCounts {
    /// Calls to `get`.
    pub get: usize,
    /// Calls to `create_or_update`.
    pub create_or_update: usize,
    /// Calls to `delete`.
    pub delete: usize,
}

type Key = (String, String, String);

#[derive(Debug, Default)]
struct ServiceState {
    variables: HashMap<Key, VariableWriteParameters>,
    failures: VecDeque<(Operation, ClientError)>,
    calls: CallCounts,
    omit_ids: bool,
}

/// An in-memory automation service.
///
/// Behaves like the real service where the reconciler cares: writes replace
/// the stored variable, reads never return encrypted values, and missing
/// variables are reported as [`ClientError::NotFound`].
#[derive(Debug)]
pub struct InMemoryAutomationService {
    subscription_id: String,
    state: Mutex<ServiceState>,
}

impl InMemoryAutomationService {
    /// Create an empty service for the given subscription.
    pub fn new(subscription_id: impl Into<String>) -> Self {
        Self {
            subscription_id: subscription_id.into(),
            state: Mutex::new(ServiceState::default()),
        }
    }

    /// Store a variable directly, bypassing the client API.
    pub async fn seed(&self, identity: &VariableIdentity, parameters: VariableWriteParameters) {
        self.state
            .lock()
            .await
            .variables
            .insert(key(&identity.resource_group, &identity.account_name, &identity.name), parameters);
    }

    /// Whether a variable is stored.
    pub async fn contains(&self, identity: &VariableIdentity) -> bool {
        self.state
            .lock()
            .await
            .variables
            .contains_key(&key(&identity.resource_group, &identity.account_name, &identity.name))
    }

    /// The raw stored value, including values of encrypted variables.
    pub async fn stored_value(&self, identity: &VariableIdentity) -> Option<String> {
        self.state
            .lock()
            .await
            .variables
            .get(&key(&identity.resource_group, &identity.account_name, &identity.name))
            .map(|v| v.value.clone())
    }

    /// Number of stored variables.
    pub async fn len(&self) -> usize {
        self.state.lock().await.variables.len()
    }

    /// Whether no variables are stored.
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Fail the next call to `operation` with `error`.
    ///
    /// Failures queue up and are consumed in order of registration.
    pub async fn fail_next(&self, operation: Operation, error: ClientError) {
        self.state.lock().await.failures.push_back((operation, error));
    }

    /// Stop echoing resource ids in responses.
    pub async fn set_omit_ids(&self, omit: bool) {
        self.state.lock().await.omit_ids = omit;
    }

    /// Call counts so far.
    pub async fn calls(&self) -> CallCounts {
        self.state.lock().await.calls
    }

    fn record(&self, state: &ServiceState, key: &Key, stored: &VariableWriteParameters) -> RemoteVariableRecord {
        let id = (!state.omit_ids).then(|| {
            format!(
                "/subscriptions/{}/resourceGroups/{}/providers/{}/automationAccounts/{}/variables/{}",
                self.subscription_id, key.0, PROVIDER_NAMESPACE, key.1, key.2
            )
        });
        RemoteVariableRecord {
            id,
            name: stored.name.clone(),
            description: Some(stored.description.clone()),
            is_encrypted: stored.is_encrypted,
            value: (!stored.is_encrypted).then(|| stored.value.clone()),
        }
    }
}

impl ServiceState {
    fn begin(&mut self, ctx: &CancellationToken, operation: Operation) -> Result<(), ClientError> {
        match operation {
            Operation::Get => self.calls.get += 1,
            Operation::CreateOrUpdate => self.calls.create_or_update += 1,
            Operation::Delete => self.calls.delete += 1,
        }
        if ctx.is_cancelled() {
            return Err(ClientError::Cancelled);
        }
        if let Some(pos) = self.failures.iter().position(|(op, _)| *op == operation) {
            if let Some((_, error)) = self.failures.remove(pos) {
                return Err(error);
            }
        }
        Ok(())
    }
}

fn key(resource_group: &str, account_name: &str, name: &str) -> Key {
    (
        resource_group.to_string(),
        account_name.to_string(),
        name.to_string(),
    )
}

#[async_trait::async_trait]
impl VariableClient for InMemoryAutomationService {
    async fn get(
        &self,
        ctx: &CancellationToken,
        resource_group: &str,
        account_name: &str,
        name: &str,
    ) -> Result<RemoteVariableRecord, ClientError> {
        let mut state = self.state.lock().await;
        state.begin(ctx, Operation::Get)?;

        let key = key(resource_group, account_name, name);
        match state.variables.get(&key) {
            Some(stored) => Ok(self.record(&state, &key, stored)),
            None => Err(ClientError::NotFound),
        }
    }

    async fn create_or_update(
        &self,
        ctx: &CancellationToken,
        resource_group: &str,
        account_name: &str,
        name: &str,
        parameters: VariableWriteParameters,
    ) -> Result<RemoteVariableRecord, ClientError> {
        let mut state = self.state.lock().await;
        state.begin(ctx, Operation::CreateOrUpdate)?;

        let key = key(resource_group, account_name, name);
        let record = self.record(&state, &key, &parameters);
        state.variables.insert(key, parameters);
        Ok(record)
    }

    async fn delete(
        &self,
        ctx: &CancellationToken,
        resource_group: &str,
        account_name: &str,
        name: &str,
    ) -> Result<(), ClientError> {
        let mut state = self.state.lock().await;
        state.begin(ctx, Operation::Delete)?;

        match state.variables.remove(&key(resource_group, account_name, name)) {
            Some(_) => Ok(()),
            None => Err(ClientError::NotFound),
        }
    }
}

/// A test harness for provider implementations.
///
/// This wraps a `ProviderService` implementation and provides
/// lifecycle helpers that mirror how the declarative layer drives it.
pub struct VariableTester<P: ProviderService> {
    provider: P,
}

impl<P: ProviderService> VariableTester<P> {
    /// Create a new tester for the given provider.
    pub fn new(provider: P) -> Self {
        Self { provider }
    }

    /// Get a reference to the underlying provider.
    pub fn provider(&self) -> &P {
        &self.provider
    }

    // =========================================================================
    // Provider Lifecycle
    // =========================================================================

    /// Configure the provider.
    ///
    /// Returns `Err` with the diagnostics if there are errors.
    pub async fn configure(&self, config: Value) -> Result<(), TestError> {
        let diagnostics = self.provider.configure(config).await?;
        check_diagnostics(diagnostics)
    }

    /// Validate a resource configuration.
    pub async fn validate_resource_config(
        &self,
        resource_type: &str,
        config: Value,
    ) -> Result<(), TestError> {
        let diagnostics = self
            .provider
            .validate_resource_config(resource_type, config)
            .await?;
        check_diagnostics(diagnostics)
    }

    // =========================================================================
    // Resource Operations
    // =========================================================================

    /// Plan a resource creation (no prior state).
    pub async fn plan_create(
        &self,
        resource_type: &str,
        proposed_state: Value,
    ) -> Result<PlanResult, ProviderError> {
        self.provider
            .plan(resource_type, None, proposed_state.clone(), proposed_state)
            .await
    }

    /// Plan a resource update.
    pub async fn plan_update(
        &self,
        resource_type: &str,
        prior_state: Value,
        proposed_state: Value,
    ) -> Result<PlanResult, ProviderError> {
        self.provider
            .plan(
                resource_type,
                Some(prior_state),
                proposed_state.clone(),
                proposed_state,
            )
            .await
    }

    /// Create a new resource.
    pub async fn create(
        &self,
        resource_type: &str,
        planned_state: Value,
    ) -> Result<Value, ProviderError> {
        self.provider.create(resource_type, planned_state).await
    }

    /// Read the current state of a resource.
    pub async fn read(
        &self,
        resource_type: &str,
        current_state: Value,
    ) -> Result<Value, ProviderError> {
        self.provider.read(resource_type, current_state).await
    }

    /// Update an existing resource.
    pub async fn update(
        &self,
        resource_type: &str,
        prior_state: Value,
        planned_state: Value,
    ) -> Result<Value, ProviderError> {
        self.provider
            .update(resource_type, prior_state, planned_state)
            .await
    }

    /// Delete a resource.
    pub async fn delete(
        &self,
        resource_type: &str,
        current_state: Value,
    ) -> Result<(), ProviderError> {
        self.provider.delete(resource_type, current_state).await
    }

    /// Import an existing resource.
    pub async fn import_resource(
        &self,
        resource_type: &str,
        id: &str,
    ) -> Result<Vec<ImportedResource>, ProviderError> {
        self.provider.import_resource(resource_type, id).await
    }

    // =========================================================================
    // Lifecycle Helpers
    // =========================================================================

    /// Run a full create lifecycle: plan → create → read.
    ///
    /// Returns the final state after read.
    pub async fn lifecycle_create(
        &self,
        resource_type: &str,
        config: Value,
    ) -> Result<Value, ProviderError> {
        let plan_result = self.plan_create(resource_type, config).await?;
        let created_state = self
            .create(resource_type, plan_result.planned_state)
            .await?;
        self.read(resource_type, created_state).await
    }

    /// Run a full update lifecycle: plan → update → read.
    ///
    /// Returns the final state after read.
    pub async fn lifecycle_update(
        &self,
        resource_type: &str,
        prior_state: Value,
        proposed_state: Value,
    ) -> Result<Value, ProviderError> {
        let plan_result = self
            .plan_update(resource_type, prior_state.clone(), proposed_state)
            .await?;
        let updated_state = self
            .update(resource_type, prior_state, plan_result.planned_state)
            .await?;
        self.read(resource_type, updated_state).await
    }

    /// Run a full CRUD lifecycle: create → read → update → read → delete.
    ///
    /// Returns the state after the update (before delete).
    pub async fn lifecycle_crud(
        &self,
        resource_type: &str,
        initial_config: Value,
        updated_config: Value,
    ) -> Result<Value, ProviderError> {
        let created_state = self.lifecycle_create(resource_type, initial_config).await?;
        let updated_state = self
            .lifecycle_update(resource_type, created_state, updated_config)
            .await?;
        self.delete(resource_type, updated_state.clone()).await?;
        Ok(updated_state)
    }

    // =========================================================================
    // State Checks
    // =========================================================================

    /// Check that a tracked resource still exists remotely.
    pub async fn check_exists(&self, resource_type: &str, state: &Value) -> Result<(), TestError> {
        let refreshed = self.read(resource_type, state.clone()).await?;
        if refreshed.is_null() {
            return Err(TestError::Missing(vec![state_label(state)]));
        }
        Ok(())
    }

    /// Check that every tracked resource is gone.
    ///
    /// All states are checked; the error lists each resource that survived.
    pub async fn check_destroyed(
        &self,
        resource_type: &str,
        states: &[Value],
    ) -> Result<(), TestError> {
        let mut survivors = Vec::new();
        for state in states {
            let refreshed = self.read(resource_type, state.clone()).await?;
            if !refreshed.is_null() {
                survivors.push(state_label(state));
            }
        }

        if survivors.is_empty() {
            Ok(())
        } else {
            Err(TestError::StillExists(survivors))
        }
    }
}

fn state_label(state: &Value) -> String {
    match state.get("id").and_then(Value::as_str) {
        Some(id) => id.to_string(),
        None => state
            .get("name")
            .and_then(Value::as_str)
            .unwrap_or("<unnamed>")
            .to_string(),
    }
}

/// Error type for test operations that may fail with diagnostics.
#[derive(Debug)]
pub enum TestError {
    /// The operation failed with diagnostics.
    Diagnostics(Vec<Diagnostic>),
    /// The operation failed with a provider error.
    Provider(ProviderError),
    /// Resources expected to exist were not found.
    Missing(Vec<String>),
    /// Resources expected to be destroyed still exist.
    StillExists(Vec<String>),
}

impl std::fmt::Display for TestError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TestError::Diagnostics(diags) => {
                writeln!(f, "Operation failed with {} diagnostic(s):", diags.len())?;
                for diag in diags {
                    write!(f, "  [{:?}] {}", diag.severity, diag.summary)?;
                    if let Some(detail) = &diag.detail {
                        write!(f, ": {}", detail)?;
                    }
                    if let Some(attr) = &diag.attribute {
                        write!(f, " (at {})", attr)?;
                    }
                    writeln!(f)?;
                }
                Ok(())
            },
            TestError::Provider(e) => write!(f, "Provider error: {}", e),
            TestError::Missing(ids) => write!(f, "Resources do not exist: {}", ids.join(", ")),
            TestError::StillExists(ids) => {
                write!(f, "Resources still exist: {}", ids.join(", "))
            },
        }
    }
}

impl std::error::Error for TestError {}

impl From<ProviderError> for TestError {
    fn from(e: ProviderError) -> Self {
        TestError::Provider(e)
    }
}

/// Check diagnostics and return an error if there are any errors.
fn check_diagnostics(diagnostics: Vec<Diagnostic>) -> Result<(), TestError> {
    let errors: Vec<_> = diagnostics.into_iter().filter(Diagnostic::is_error).collect();

    if errors.is_empty() {
        Ok(())
    } else {
        Err(TestError::Diagnostics(errors))
    }
}

// =========================================================================
// Assertion Helpers
// =========================================================================

/// Assert that a plan result indicates no changes.
///
/// # Panics
///
/// Panics if the plan has any changes.
pub fn assert_plan_no_changes(plan: &PlanResult) {
    assert!(
        plan.changes.is_empty(),
        "Expected no changes, but got {} change(s): {:?}",
        plan.changes.len(),
        plan.changes.iter().map(|c| &c.path).collect::<Vec<_>>()
    );
}

/// Assert that a plan requires resource replacement.
///
/// # Panics
///
/// Panics if the plan does not require replacement.
pub fn assert_plan_replaces(plan: &PlanResult) {
    assert!(
        plan.requires_replace,
        "Expected plan to require replacement, but it does not"
    );
}

/// Assert that a plan does not require resource replacement.
///
/// # Panics
///
/// Panics if the plan requires replacement.
pub fn assert_plan_updates_in_place(plan: &PlanResult) {
    assert!(
        !plan.requires_replace,
        "Expected plan to update in place, but it requires replacement"
    );
}

/// Assert that a plan has a change for a specific attribute path.
///
/// # Panics
///
/// Panics if the plan does not have a change for the given path.
pub fn assert_plan_changes_attribute(plan: &PlanResult, path: &str) {
    let has_change = plan.changes.iter().any(|c| c.path == path);
    assert!(
        has_change,
        "Expected plan to change attribute '{}', but it was not changed. Changed attributes: {:?}",
        path,
        plan.changes.iter().map(|c| &c.path).collect::<Vec<_>>()
    );
}

/// Assert that a plan does not have a change for a specific attribute path.
///
/// # Panics
///
/// Panics if the plan has a change for the given path.
pub fn assert_plan_does_not_change_attribute(plan: &PlanResult, path: &str) {
    let has_change = plan.changes.iter().any(|c| c.path == path);
    assert!(
        !has_change,
        "Expected plan to not change attribute '{}', but it was changed",
        path
    );
}

/// Assert that diagnostics contain an error with the given summary substring.
///
/// # Panics
///
/// Panics if no error diagnostic contains the given substring.
pub fn assert_error_contains(diagnostics: &[Diagnostic], substring: &str) {
    let has_matching_error = diagnostics
        .iter()
        .any(|d| d.is_error() && d.summary.contains(substring));

    assert!(
        has_matching_error,
        "Expected an error containing '{}', but no matching error found. Errors: {:?}",
        substring,
        diagnostics
            .iter()
            .filter(|d| d.is_error())
            .map(|d| &d.summary)
            .collect::<Vec<_>>()
    );
}
