//! Error types for automation variable resources.

use thiserror::Error;

use crate::client::ClientError;
use crate::schema::Diagnostic;

/// Errors that can occur while managing an automation variable.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// A key field needed to address a variable was empty.
    #[error("Invalid identity: {0}")]
    InvalidIdentity(String),

    /// A canonical resource id could not be parsed.
    #[error("Malformed identifier: {0}")]
    MalformedIdentifier(String),

    /// An unmanaged remote variable already exists under the requested key.
    #[error(
        "Resource already exists: {0} - to be managed it needs to be imported into state"
    )]
    AlreadyExists(String),

    /// A date-time value was not valid RFC 3339.
    #[error("Invalid time format: {0}")]
    InvalidTimeFormat(String),

    /// A stored value did not match the encoding of the declared kind.
    #[error("Value decode error: {0}")]
    ValueDecode(String),

    /// The write succeeded but the service did not echo a resource id.
    #[error("Incomplete write: {0}")]
    IncompleteWrite(String),

    /// Deleting a variable failed for a reason other than it being absent.
    #[error("Delete failed for {0}: {1}")]
    DeleteFailed(String, #[source] ClientError),

    /// The automation service rejected or failed a request.
    #[error("Error {operation} {target}: {source}")]
    Remote {
        /// What the core was doing, e.g. "creating".
        operation: &'static str,
        /// Human-readable description of the variable.
        target: String,
        /// The underlying client failure.
        #[source]
        source: ClientError,
    },

    /// The operation's cancellation token fired before a remote call.
    #[error("Cancelled: {0}")]
    Cancelled(String),

    /// The requested resource was not found.
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// A validation error occurred.
    #[error("Validation error: {0}")]
    Validation(String),

    /// A configuration error occurred.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// The requested resource type is unknown.
    #[error("Unknown resource type: {0}")]
    UnknownResource(String),

    /// A serialization/deserialization error occurred.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl ProviderError {
    /// Get the error message as a string.
    ///
    /// Returns the payload of the variant without the category prefix.
    pub fn message(&self) -> &str {
        match self {
            Self::InvalidIdentity(msg) => msg,
            Self::MalformedIdentifier(msg) => msg,
            Self::AlreadyExists(id) => id,
            Self::InvalidTimeFormat(msg) => msg,
            Self::ValueDecode(msg) => msg,
            Self::IncompleteWrite(msg) => msg,
            Self::DeleteFailed(target, _) => target,
            Self::Remote { target, .. } => target,
            Self::Cancelled(msg) => msg,
            Self::NotFound(msg) => msg,
            Self::Validation(msg) => msg,
            Self::Configuration(msg) => msg,
            Self::UnknownResource(msg) => msg,
            Self::Serialization(_err) => "serialization error (see Debug output)",
        }
    }

    /// Whether a caller may reasonably retry the failed operation.
    ///
    /// Only transient client failures qualify. Identity, codec and
    /// consistency errors are never retryable.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Remote { source, .. } => source.is_transient(),
            Self::DeleteFailed(_, source) => source.is_transient(),
            _ => false,
        }
    }

    /// Convert the error into an error diagnostic for the declarative layer.
    pub fn to_diagnostic(&self) -> Diagnostic {
        let diagnostic = Diagnostic::error(self.to_string());
        match self {
            Self::InvalidTimeFormat(_) | Self::ValueDecode(_) => diagnostic.with_attribute("value"),
            Self::InvalidIdentity(_) => diagnostic.with_attribute("name"),
            Self::MalformedIdentifier(_) | Self::AlreadyExists(_) => {
                diagnostic.with_attribute("id")
            },
            _ => diagnostic,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ProviderError::InvalidIdentity("name must not be empty".to_string());
        assert_eq!(format!("{}", err), "Invalid identity: name must not be empty");

        let err = ProviderError::ValueDecode("expected int variable".to_string());
        assert_eq!(format!("{}", err), "Value decode error: expected int variable");

        let err = ProviderError::UnknownResource("azurerm_thing".to_string());
        assert_eq!(format!("{}", err), "Unknown resource type: azurerm_thing");
    }

    #[test]
    fn test_already_exists_mentions_import() {
        let err = ProviderError::AlreadyExists("/subscriptions/s/x".to_string());
        let display = err.to_string();
        assert!(display.contains("/subscriptions/s/x"));
        assert!(display.contains("imported"));
        assert_eq!(err.message(), "/subscriptions/s/x");
    }

    #[test]
    fn test_remote_error_display() {
        let err = ProviderError::Remote {
            operation: "creating",
            target: "Automation Int Variable \"v1\"".to_string(),
            source: ClientError::Transport("connection reset".to_string()),
        };
        assert_eq!(
            err.to_string(),
            "Error creating Automation Int Variable \"v1\": transport error: connection reset"
        );
        assert_eq!(err.message(), "Automation Int Variable \"v1\"");
    }

    #[test]
    fn test_retryable_classification() {
        let transient = ProviderError::Remote {
            operation: "reading",
            target: "v".to_string(),
            source: ClientError::Status {
                status: 503,
                message: "busy".to_string(),
            },
        };
        assert!(transient.is_retryable());

        let rejected = ProviderError::DeleteFailed(
            "v".to_string(),
            ClientError::Status {
                status: 403,
                message: "forbidden".to_string(),
            },
        );
        assert!(!rejected.is_retryable());

        assert!(!ProviderError::IncompleteWrite("v".to_string()).is_retryable());
        assert!(!ProviderError::MalformedIdentifier("x".to_string()).is_retryable());
        assert!(!ProviderError::InvalidTimeFormat("x".to_string()).is_retryable());
    }

    #[test]
    fn test_to_diagnostic_attribute_paths() {
        let diag = ProviderError::InvalidTimeFormat("bad".to_string()).to_diagnostic();
        assert_eq!(diag.attribute, Some("value".to_string()));
        assert!(diag.summary.contains("Invalid time format"));

        let diag = ProviderError::MalformedIdentifier("bad".to_string()).to_diagnostic();
        assert_eq!(diag.attribute, Some("id".to_string()));

        let diag = ProviderError::Configuration("bad".to_string()).to_diagnostic();
        assert_eq!(diag.attribute, None);
    }
}
