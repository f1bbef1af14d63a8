use thiserror::Error;

pub const EXIT_SUCCESS: i32 = 0;
pub const EXIT_FAILURE: i32 = 1;
pub const EXIT_USAGE: i32 = 2;
pub const EXIT_TIMEOUT: i32 = 3;
pub const EXIT_OPEN: i32 = 4;
pub const EXIT_CALLBACK: i32 = 5;

/// Default message when Bear reports an error without an `errorMessage`.
pub const DEFAULT_APPLICATION_ERROR: &str = "Bear reported an error";

/// Classification of a failed action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    TransportFailure,
    ApplicationError,
    Timeout,
    LocalSetupFailure,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::TransportFailure => "transport_failure",
            ErrorKind::ApplicationError => "application_error",
            ErrorKind::Timeout => "timeout",
            ErrorKind::LocalSetupFailure => "local_setup_failure",
        }
    }

    pub fn exit_code(&self) -> i32 {
        match self {
            ErrorKind::TransportFailure => EXIT_OPEN,
            ErrorKind::ApplicationError => EXIT_CALLBACK,
            ErrorKind::Timeout => EXIT_TIMEOUT,
            ErrorKind::LocalSetupFailure => EXIT_FAILURE,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ActionError {
    /// Bear could not be launched at all.
    #[error("{message}")]
    TransportFailure { message: String },
    /// Bear hit the `x-error` callback.
    #[error("{message}")]
    ApplicationError {
        message: String,
        code: Option<String>,
    },
    #[error("callback timed out")]
    Timeout,
    /// The callback listener could not be set up or failed while waiting.
    #[error("{message}")]
    LocalSetupFailure { message: String },
}

impl ActionError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ActionError::TransportFailure { .. } => ErrorKind::TransportFailure,
            ActionError::ApplicationError { .. } => ErrorKind::ApplicationError,
            ActionError::Timeout => ErrorKind::Timeout,
            ActionError::LocalSetupFailure { .. } => ErrorKind::LocalSetupFailure,
        }
    }

    /// Machine-readable code shown next to the message. Application errors only carry
    /// the code Bear supplied.
    pub fn code(&self) -> Option<&str> {
        match self {
            ActionError::TransportFailure { .. } => Some("open_url"),
            ActionError::ApplicationError { code, .. } => code.as_deref(),
            ActionError::Timeout => Some("timeout"),
            ActionError::LocalSetupFailure { .. } => Some("callback_error"),
        }
    }

    pub fn exit_code(&self) -> i32 {
        self.kind().exit_code()
    }
}

/// A failed action together with the URL that was (or would have been) opened.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{action}: {error}")]
pub struct ExecutionFailure {
    pub action: String,
    pub url: String,
    #[source]
    pub error: ActionError,
}

impl ExecutionFailure {
    pub fn new<A: ToString, U: ToString>(action: A, url: U, error: ActionError) -> Self {
        ExecutionFailure {
            action: action.to_string(),
            url: url.to_string(),
            error,
        }
    }
}
