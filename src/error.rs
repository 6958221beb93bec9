//! Error types for the courier.

use serde::{Deserialize, Serialize};

/// Failure taxonomy surfaced by every dispatch path.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DispatchError {
    #[error("{0}")]
    Validation(String),

    #[error("Chat backend unavailable: {0}")]
    ChatUnavailable(String),

    #[error("{0}")]
    ChatApi(String),

    #[error("{0}")]
    ChatConnection(String),

    #[error("Mail backend unavailable: {0}")]
    MailUnavailable(String),

    #[error("{0}")]
    MailTransport(String),

    #[error("No notification backend is configured")]
    NoBackendConfigured,
}

impl DispatchError {
    /// Taxonomy kind of this failure.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation(_) => ErrorKind::ValidationError,
            Self::ChatUnavailable(_) => ErrorKind::ChatUnavailableError,
            Self::ChatApi(_) => ErrorKind::ChatApiError,
            Self::ChatConnection(_) => ErrorKind::ChatConnectionError,
            Self::MailUnavailable(_) => ErrorKind::MailUnavailableError,
            Self::MailTransport(_) => ErrorKind::MailTransportError,
            Self::NoBackendConfigured => ErrorKind::NoBackendConfiguredError,
        }
    }

    pub fn missing_body() -> Self {
        Self::Validation("Missing the 'm_body' argument".to_string())
    }
}

/// Serializable taxonomy kind. Variant names are part of the wire format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorKind {
    ValidationError,
    ChatUnavailableError,
    ChatApiError,
    ChatConnectionError,
    MailUnavailableError,
    MailTransportError,
    NoBackendConfiguredError,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ValidationError => "ValidationError",
            Self::ChatUnavailableError => "ChatUnavailableError",
            Self::ChatApiError => "ChatApiError",
            Self::ChatConnectionError => "ChatConnectionError",
            Self::MailUnavailableError => "MailUnavailableError",
            Self::MailTransportError => "MailTransportError",
            Self::NoBackendConfiguredError => "NoBackendConfiguredError",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error carried inside a [`DispatchOutcome`](crate::notify::DispatchOutcome).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorInfo {
    pub kind: ErrorKind,
    pub message: String,
}

impl From<&DispatchError> for ErrorInfo {
    fn from(err: &DispatchError) -> Self {
        Self {
            kind: err.kind(),
            message: err.to_string(),
        }
    }
}

/// Failures reported by the chat collaborator.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ChatClientError {
    /// The chat service answered but rejected the request.
    #[error("{0}")]
    Api(String),

    /// The chat service could not be reached.
    #[error("ConnectionError to Slack API: {0}")]
    Connection(String),
}

/// Failure reported by the mail collaborator.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{0}")]
pub struct MailTransportFailure(pub String);

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Chat client initialization failed: {0}")]
    ChatInit(String),
}
