use std::fmt;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, PaymentError>;

type Cause = Box<dyn std::error::Error + Send + Sync>;

#[derive(Error, Debug)]
pub enum PaymentError {
    #[error(transparent)]
    Business(#[from] BizError),
    #[error("CSV error: {0}")]
    CsvError(#[from] csv::Error),
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Serialization error: {0}")]
    SerdeError(#[from] serde_json::Error),
    #[cfg(feature = "storage-rocksdb")]
    #[error("Storage error: {0}")]
    StorageError(#[from] rocksdb::Error),
    #[error("Internal error: {0}")]
    InternalError(Cause),
}

impl PaymentError {
    /// Returns the structured error when this is a business failure.
    pub fn as_business(&self) -> Option<&BizError> {
        match self {
            PaymentError::Business(err) => Some(err),
            _ => None,
        }
    }

    /// Whether the failure carries a stable code.
    pub fn is_structured(&self) -> bool {
        self.as_business().is_some()
    }

    /// Structured errors report their own flag, everything else is assumed permanent.
    pub fn is_retryable(&self) -> bool {
        self.as_business().is_some_and(|err| err.retryable)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        PaymentError::InternalError(Box::new(std::io::Error::other(message.into())))
    }
}

impl From<ErrorCode> for PaymentError {
    fn from(code: ErrorCode) -> Self {
        PaymentError::Business(code.into())
    }
}

/// Stable, machine-readable failure codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    InvalidOperation,
    InvalidParameter,
    DuplicateHandler,
    PhaseMismatch,
    IdGenerateFailed,
    IdGenerateMaxRetry,
    IdGenerateInvalid,
    OrderNotFound,
    DuplicateOrder,
    VersionConflict,
    LockNotAcquired,
    LockUnavailable,
    ChannelFailure,
    NotifyFailed,
}

impl ErrorCode {
    pub fn code(&self) -> &'static str {
        match self {
            ErrorCode::InvalidOperation => "E0001",
            ErrorCode::InvalidParameter => "E0002",
            ErrorCode::DuplicateHandler => "E0003",
            ErrorCode::PhaseMismatch => "E0004",
            ErrorCode::IdGenerateFailed => "E1001",
            ErrorCode::IdGenerateMaxRetry => "E1002",
            ErrorCode::IdGenerateInvalid => "E1003",
            ErrorCode::OrderNotFound => "E2001",
            ErrorCode::DuplicateOrder => "E2002",
            ErrorCode::VersionConflict => "E2003",
            ErrorCode::LockNotAcquired => "E3001",
            ErrorCode::LockUnavailable => "E3002",
            ErrorCode::ChannelFailure => "E4001",
            ErrorCode::NotifyFailed => "E5001",
        }
    }

    pub fn message(&self) -> &'static str {
        match self {
            ErrorCode::InvalidOperation => "invalid operation",
            ErrorCode::InvalidParameter => "invalid parameter",
            ErrorCode::DuplicateHandler => "duplicate handler registration",
            ErrorCode::PhaseMismatch => "phase payload mismatch",
            ErrorCode::IdGenerateFailed => "identifier generation failed",
            ErrorCode::IdGenerateMaxRetry => "identifier generation exhausted retries",
            ErrorCode::IdGenerateInvalid => "generated identifier invalid",
            ErrorCode::OrderNotFound => "order not found",
            ErrorCode::DuplicateOrder => "duplicate order",
            ErrorCode::VersionConflict => "optimistic version conflict",
            ErrorCode::LockNotAcquired => "lock not acquired",
            ErrorCode::LockUnavailable => "lock manager unavailable",
            ErrorCode::ChannelFailure => "payment channel failure",
            ErrorCode::NotifyFailed => "notification delivery failed",
        }
    }

    pub fn retryable(&self) -> bool {
        matches!(
            self,
            ErrorCode::IdGenerateMaxRetry
                | ErrorCode::VersionConflict
                | ErrorCode::LockNotAcquired
                | ErrorCode::ChannelFailure
                | ErrorCode::NotifyFailed
        )
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// A business failure with a stable code.
///
/// Validation helpers throughout the pipeline raise these exclusively; they travel
/// through the phases untouched and end up in the result model's error fields.
#[derive(Error, Debug)]
#[error("[{code}] {message}")]
pub struct BizError {
    pub code: String,
    pub message: String,
    pub retryable: bool,
    #[source]
    pub cause: Option<Cause>,
}

impl BizError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            retryable: false,
            cause: None,
        }
    }

    /// Replaces the default message of the code.
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }

    pub fn with_cause<E>(mut self, cause: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        self.cause = Some(Box::new(cause));
        self
    }

    pub fn retryable(mut self, retryable: bool) -> Self {
        self.retryable = retryable;
        self
    }

    pub fn is(&self, code: ErrorCode) -> bool {
        self.code == code.code()
    }
}

impl From<ErrorCode> for BizError {
    fn from(code: ErrorCode) -> Self {
        Self::new(code.code(), code.message()).retryable(code.retryable())
    }
}
