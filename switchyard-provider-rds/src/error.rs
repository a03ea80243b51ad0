//! Error types for the RDS provider

use switchyard_core::retry::RetryError;
use switchyard_core::wait::{WaitError, WaitStatus};
use thiserror::Error;

/// Classification of a remote API failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiErrorKind {
    NotFound,
    AlreadyExists,
    InvalidState,
    Throttling,
    InvalidParameter,
    /// The response could not be mapped onto the contract
    Malformed,
    Service,
    Transport,
}

/// Error returned by an [`RdsApi`](crate::api::RdsApi) call
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{code}: {message}")]
pub struct ApiError {
    pub kind: ApiErrorKind,
    /// AWS error code (e.g., "DBClusterNotFoundFault")
    pub code: String,
    pub message: String,
}

impl ApiError {
    pub fn new(kind: ApiErrorKind, code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind,
            code: code.into(),
            message: message.into(),
        }
    }

    /// Classify an error by its AWS error code
    pub fn classify(code: impl Into<String>, message: impl Into<String>) -> Self {
        let code = code.into();
        let kind = classify_code(&code);
        Self::new(kind, code, message)
    }

    pub fn malformed(message: impl Into<String>) -> Self {
        Self::new(ApiErrorKind::Malformed, "MalformedResponse", message)
    }

    pub fn transport(message: impl Into<String>) -> Self {
        Self::new(ApiErrorKind::Transport, "TransportError", message)
    }

    pub fn is_not_found(&self) -> bool {
        self.kind == ApiErrorKind::NotFound
    }

    pub fn is_already_exists(&self) -> bool {
        self.kind == ApiErrorKind::AlreadyExists
    }

    pub fn is_throttling(&self) -> bool {
        self.kind == ApiErrorKind::Throttling
    }

    /// Whether the error carries `code` and its message contains `needle`
    pub fn matches(&self, code: &str, needle: &str) -> bool {
        self.code == code && self.message.contains(needle)
    }
}

fn classify_code(code: &str) -> ApiErrorKind {
    match code {
        "Throttling" | "ThrottlingException" | "RequestLimitExceeded" | "TooManyRequestsException" => {
            ApiErrorKind::Throttling
        }
        "InvalidParameterValue" | "InvalidParameterCombination" | "InvalidParameter" => {
            ApiErrorKind::InvalidParameter
        }
        c if c.ends_with("NotFound") || c.ends_with("NotFoundFault") => ApiErrorKind::NotFound,
        c if c.ends_with("AlreadyExists") || c.ends_with("AlreadyExistsFault") => {
            ApiErrorKind::AlreadyExists
        }
        c if c.starts_with("Invalid") && c.contains("State") => ApiErrorKind::InvalidState,
        _ => ApiErrorKind::Service,
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

/// Error of an orchestrator or lifecycle operation, with the operation and
/// the remote identifier it was working on
#[derive(Debug, Error)]
pub enum RdsError {
    #[error("{operation} ({id}): {source}")]
    Api {
        operation: &'static str,
        id: String,
        #[source]
        source: ApiError,
    },

    #[error("{operation} ({id}): {message}")]
    Timeout {
        operation: &'static str,
        id: String,
        message: String,
    },

    #[error("{operation} ({id}): {message}")]
    UnexpectedState {
        operation: &'static str,
        id: String,
        status: String,
        message: String,
    },

    #[error("{operation} ({id}): {message}")]
    NotFound {
        operation: &'static str,
        id: String,
        message: String,
    },

    #[error("{operation} ({id}): found {count} active blue/green deployments, expected at most one")]
    AmbiguousDeployment {
        operation: &'static str,
        id: String,
        count: usize,
    },

    #[error("{operation} ({id}): cancelled")]
    Cancelled { operation: &'static str, id: String },

    #[error("{operation} ({id}): {message}")]
    Invalid {
        operation: &'static str,
        id: String,
        message: String,
    },
}

impl RdsError {
    pub fn api(operation: &'static str, id: impl Into<String>, source: ApiError) -> Self {
        Self::Api {
            operation,
            id: id.into(),
            source,
        }
    }

    pub fn invalid(operation: &'static str, id: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Invalid {
            operation,
            id: id.into(),
            message: message.into(),
        }
    }

    pub fn from_wait<S: WaitStatus>(
        operation: &'static str,
        id: impl Into<String>,
        err: WaitError<S, ApiError>,
    ) -> Self {
        let id = id.into();
        let message = err.to_string();
        match err {
            WaitError::Timeout { .. } => Self::Timeout {
                operation,
                id,
                message,
            },
            WaitError::UnexpectedState { status, .. } => Self::UnexpectedState {
                operation,
                id,
                status: status.to_string(),
                message,
            },
            WaitError::NotFound { .. } => Self::NotFound {
                operation,
                id,
                message,
            },
            WaitError::Cancelled => Self::Cancelled { operation, id },
            WaitError::Refresh(source) => Self::Api {
                operation,
                id,
                source,
            },
        }
    }

    pub fn from_retry(
        operation: &'static str,
        id: impl Into<String>,
        err: RetryError<ApiError>,
    ) -> Self {
        let id = id.into();
        let message = err.to_string();
        match err {
            RetryError::Timeout { .. } => Self::Timeout {
                operation,
                id,
                message,
            },
            RetryError::Cancelled => Self::Cancelled { operation, id },
            RetryError::Failed(source) => Self::Api {
                operation,
                id,
                source,
            },
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }

    pub fn is_unexpected_state(&self) -> bool {
        matches!(self, Self::UnexpectedState { .. })
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled { .. })
    }

    pub fn is_not_found(&self) -> bool {
        match self {
            Self::NotFound { .. } => true,
            Self::Api { source, .. } => source.is_not_found(),
            _ => false,
        }
    }

    pub fn operation(&self) -> &'static str {
        match self {
            Self::Api { operation, .. }
            | Self::Timeout { operation, .. }
            | Self::UnexpectedState { operation, .. }
            | Self::NotFound { operation, .. }
            | Self::AmbiguousDeployment { operation, .. }
            | Self::Cancelled { operation, .. }
            | Self::Invalid { operation, .. } => operation,
        }
    }
}

pub type RdsResult<T> = Result<T, RdsError>;
