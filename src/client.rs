//! The automation service client seam.
//!
//! The reconciler never talks HTTP itself. It consumes a [`VariableClient`]
//! keyed by `(resource_group, account_name, name)`; transport, authentication
//! and retry policy all live behind that trait.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio_util::sync::CancellationToken;

/// A variable as stored by the automation service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteVariableRecord {
    /// Canonical resource id, if the service echoed one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Variable name.
    pub name: String,
    /// Free-form description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Whether the value is stored encrypted.
    #[serde(default)]
    pub is_encrypted: bool,
    /// The encoded value. Never returned for encrypted variables.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
}

/// The body of a create-or-update request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VariableWriteParameters {
    /// Variable name.
    pub name: String,
    /// Free-form description (empty when unset).
    pub description: String,
    /// Whether the service should encrypt the value.
    pub is_encrypted: bool,
    /// The encoded value.
    pub value: String,
}

/// Failures reported by a [`VariableClient`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ClientError {
    /// The addressed variable does not exist.
    #[error("not found")]
    NotFound,

    /// The request was abandoned because its cancellation token fired.
    #[error("request cancelled")]
    Cancelled,

    /// The service answered with an error status.
    #[error("HTTP {status}: {message}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Service-supplied error message.
        message: String,
    },

    /// The request never produced a response.
    #[error("transport error: {0}")]
    Transport(String),
}

impl ClientError {
    /// Whether the service reported the variable as absent.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound | Self::Status { status: 404, .. })
    }

    /// Whether the failure is likely to go away on its own.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Transport(_) => true,
            Self::Status { status, .. } => matches!(status, 408 | 429 | 500..=599),
            Self::NotFound | Self::Cancelled => false,
        }
    }
}

/// Operations the automation service exposes for variables.
///
/// Every call receives the caller's cancellation token. Implementations
/// should abandon the request and return [`ClientError::Cancelled`] once
/// the token fires.
#[async_trait::async_trait]
pub trait VariableClient: Send + Sync + 'static {
    /// Fetch a variable.
    async fn get(
        &self,
        ctx: &CancellationToken,
        resource_group: &str,
        account_name: &str,
        name: &str,
    ) -> Result<RemoteVariableRecord, ClientError>;

    /// Create the variable, or replace it if it already exists.
    async fn create_or_update(
        &self,
        ctx: &CancellationToken,
        resource_group: &str,
        account_name: &str,
        name: &str,
        parameters: VariableWriteParameters,
    ) -> Result<RemoteVariableRecord, ClientError>;

    /// Delete a variable.
    async fn delete(
        &self,
        ctx: &CancellationToken,
        resource_group: &str,
        account_name: &str,
        name: &str,
    ) -> Result<(), ClientError>;
}
