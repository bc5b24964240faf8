//! Hemmer provider resources for typed Azure Automation variables.
//!
//! An automation account stores variables as strings whose encoding depends
//! on the variable's type. This crate manages four resource types, one per
//! [`ValueKind`], and keeps the declared typed value in sync with the
//! service:
//!
//! - `azurerm_automation_int_variable`
//! - `azurerm_automation_bool_variable`
//! - `azurerm_automation_datetime_variable`
//! - `azurerm_automation_string_variable`
//!
//! # Overview
//!
//! - **identity**: canonical resource ids and the key used to address a variable
//! - **codec**: encoding of typed values into the service's stored form
//! - **reconciler**: create-or-update, read, delete and import against a [`VariableClient`]
//! - **provider**: the [`ProviderService`] implementation driven by Hemmer
//! - **testing**: an in-memory service and lifecycle helpers
//!
//! The HTTP client is not part of this crate. Callers supply a
//! [`VariableClient`] that handles transport, authentication and retries.
//!
//! # Quick Start
//!
//! ```ignore
//! use hemmer_automation_variables::{
//!     init_logging, AutomationVariableProvider, ProviderService,
//! };
//! use serde_json::json;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     init_logging();
//!
//!     let provider = AutomationVariableProvider::new(MyAutomationClient::new());
//!     provider.configure(json!({"subscription_id": "..."})).await?;
//!
//!     let state = provider
//!         .create("azurerm_automation_int_variable", json!({
//!             "name": "retries",
//!             "resource_group_name": "ops",
//!             "automation_account_name": "runbooks",
//!             "value": 3
//!         }))
//!         .await?;
//!     println!("{}", state["id"]);
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod client;
pub mod codec;
pub mod config;
pub mod error;
pub mod identity;
pub mod logging;
pub mod provider;
pub mod reconciler;
pub mod schema;
pub mod service;
pub mod testing;
pub mod types;
pub mod validation;

// Re-export main types at crate root
pub use client::{ClientError, RemoteVariableRecord, VariableClient, VariableWriteParameters};
pub use codec::{ValueKind, VariableValue};
pub use config::ProviderConfig;
pub use error::ProviderError;
pub use identity::{IdentityResolver, VariableIdentity};
pub use logging::{init_logging, init_logging_with_default, try_init_logging};
pub use provider::{variable_schema, AutomationVariableProvider};
pub use reconciler::{ReadOutcome, Reconciler, VariableSpec, VariableState};
pub use schema::ProviderSchema;
pub use service::ProviderService;
pub use types::{AttributeChange, ImportedResource, PlanResult, ProviderMetadata};
pub use validation::{is_valid, validate, validate_result};

// Re-export async_trait for convenience
pub use async_trait::async_trait;

// Re-export commonly used external types
pub use serde_json;
pub use tokio_util::sync::CancellationToken;
pub use tracing;
