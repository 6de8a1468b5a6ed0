//! Domain-level error types.
//!
//! These errors are transport agnostic. Callers of the admission facade map
//! them to HTTP responses, WebSocket frames, or any other envelope.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Stable machine-readable error code describing the failure category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[non_exhaustive]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    /// The request is malformed or violates a place policy.
    InvalidRequest,
    /// The caller does not own or may not act on the resource.
    Unauthorized,
    /// The queue, ticket or place does not exist.
    NotFound,
    /// The targeted queue is not accepting joins.
    QueueClosed,
    /// The place has no open queue to join.
    NoOpenQueue,
    /// The user already holds an active or called ticket in the queue.
    DuplicateActiveTicket,
    /// The ticket lifecycle does not allow the requested transition.
    InvalidTransition,
    /// The ticket already reached a terminal state.
    AlreadyTerminal,
    /// A concurrent writer won the race and retries were exhausted.
    Conflict,
    /// The store could not be reached or timed out.
    ServiceUnavailable,
    /// An unexpected error occurred inside the engine.
    InternalError,
}

impl ErrorCode {
    /// Stable wire identifier for the code.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::InvalidRequest => "invalid_request",
            Self::Unauthorized => "unauthorized",
            Self::NotFound => "not_found",
            Self::QueueClosed => "queue_closed",
            Self::NoOpenQueue => "no_open_queue",
            Self::DuplicateActiveTicket => "duplicate_active_ticket",
            Self::InvalidTransition => "invalid_transition",
            Self::AlreadyTerminal => "already_terminal",
            Self::Conflict => "conflict",
            Self::ServiceUnavailable => "service_unavailable",
            Self::InternalError => "internal_error",
        }
    }

    /// Whether the code is an expected rejection under concurrent operator
    /// actions rather than a failure.
    ///
    /// # Examples
    /// ```
    /// use smartqueue::domain::ErrorCode;
    ///
    /// assert!(ErrorCode::AlreadyTerminal.is_rejection());
    /// assert!(!ErrorCode::InternalError.is_rejection());
    /// ```
    pub const fn is_rejection(self) -> bool {
        matches!(self, Self::InvalidTransition | Self::AlreadyTerminal)
    }

    const fn fallback_message(self) -> &'static str {
        match self {
            Self::InvalidRequest => "request rejected",
            Self::Unauthorized => "caller may not perform this action",
            Self::NotFound => "resource not found",
            Self::QueueClosed => "queue is closed",
            Self::NoOpenQueue => "no open queue",
            Self::DuplicateActiveTicket => "user already holds an active ticket",
            Self::InvalidTransition => "ticket transition not allowed",
            Self::AlreadyTerminal => "ticket already finished",
            Self::Conflict => "concurrent update conflict",
            Self::ServiceUnavailable => "ticket store unavailable",
            Self::InternalError => "internal error",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Domain error payload.
///
/// ## Invariants
/// - `message` is non-empty once trimmed of whitespace.
///
/// # Examples
/// ```
/// use smartqueue::domain::{Error, ErrorCode};
///
/// let err = Error::not_found("ticket missing");
/// assert_eq!(err.code(), ErrorCode::NotFound);
/// assert_eq!(err.message(), "ticket missing");
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[serde(try_from = "ErrorDto", into = "ErrorDto")]
pub struct Error {
    code: ErrorCode,
    message: String,
    details: Option<Value>,
}

/// Validation errors emitted by [`Error::try_new`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ErrorValidationError {
    /// The message was blank.
    #[error("error message must not be empty")]
    EmptyMessage,
}

impl Error {
    /// Create a new error. Blank messages fall back to the code's default
    /// description.
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self::try_new(code, message).unwrap_or_else(|_| Self {
            code,
            message: code.fallback_message().to_owned(),
            details: None,
        })
    }

    /// Fallible constructor that validates the message content.
    pub fn try_new(code: ErrorCode, message: impl Into<String>) -> Result<Self, ErrorValidationError> {
        let message = message.into();
        if message.trim().is_empty() {
            return Err(ErrorValidationError::EmptyMessage);
        }
        Ok(Self {
            code,
            message,
            details: None,
        })
    }

    /// Stable machine-readable error code.
    pub const fn code(&self) -> ErrorCode {
        self.code
    }

    /// Human-readable message returned to callers.
    pub fn message(&self) -> &str {
        self.message.as_str()
    }

    /// Supplementary structured details.
    pub const fn details(&self) -> Option<&Value> {
        self.details.as_ref()
    }

    /// Attach structured details to the error.
    ///
    /// # Examples
    /// ```
    /// use smartqueue::domain::Error;
    /// use serde_json::json;
    ///
    /// let err = Error::invalid_transition("ticket is used")
    ///     .with_details(json!({ "status": "used" }));
    /// assert!(err.details().is_some());
    /// ```
    #[must_use]
    pub fn with_details(mut self, details: Value) -> Self {
        self.details = Some(details);
        self
    }

    /// Convenience constructor for [`ErrorCode::InvalidRequest`].
    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidRequest, message)
    }

    /// Convenience constructor for [`ErrorCode::Unauthorized`].
    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Unauthorized, message)
    }

    /// Convenience constructor for [`ErrorCode::NotFound`].
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::NotFound, message)
    }

    /// Convenience constructor for [`ErrorCode::QueueClosed`].
    pub fn queue_closed(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::QueueClosed, message)
    }

    /// Convenience constructor for [`ErrorCode::NoOpenQueue`].
    pub fn no_open_queue(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::NoOpenQueue, message)
    }

    /// Convenience constructor for [`ErrorCode::DuplicateActiveTicket`].
    pub fn duplicate_active_ticket(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::DuplicateActiveTicket, message)
    }

    /// Convenience constructor for [`ErrorCode::InvalidTransition`].
    pub fn invalid_transition(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidTransition, message)
    }

    /// Convenience constructor for [`ErrorCode::AlreadyTerminal`].
    pub fn already_terminal(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::AlreadyTerminal, message)
    }

    /// Convenience constructor for [`ErrorCode::Conflict`].
    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Conflict, message)
    }

    /// Convenience constructor for [`ErrorCode::ServiceUnavailable`].
    pub fn service_unavailable(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::ServiceUnavailable, message)
    }

    /// Convenience constructor for [`ErrorCode::InternalError`].
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InternalError, message)
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl std::error::Error for Error {}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ErrorDto {
    code: ErrorCode,
    message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    details: Option<Value>,
}

impl From<Error> for ErrorDto {
    fn from(value: Error) -> Self {
        Self {
            code: value.code,
            message: value.message,
            details: value.details,
        }
    }
}

impl TryFrom<ErrorDto> for Error {
    type Error = ErrorValidationError;

    fn try_from(value: ErrorDto) -> Result<Self, Self::Error> {
        let ErrorDto {
            code,
            message,
            details,
        } = value;

        let mut error = Self::try_new(code, message)?;
        error.details = details;
        Ok(error)
    }
}
