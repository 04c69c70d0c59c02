//! Error types for the Canvas client.

use std::fmt;
use thiserror::Error;

/// Result type alias for Canvas operations.
pub type CanvasResult<T> = Result<T, CanvasError>;

/// Error kinds for categorizing Canvas errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CanvasErrorKind {
    // Configuration errors
    /// Invalid configuration.
    InvalidConfiguration,
    /// Invalid base URL.
    InvalidBaseUrl,
    /// Missing bearer credential.
    MissingCredential,

    // Network errors
    /// Connection failed.
    ConnectionFailed,
    /// Transport-level timeout.
    Timeout,
    /// Any other transport failure.
    Network,

    // Caller intent
    /// The caller's cancellation signal fired.
    Cancelled,
    /// The caller's deadline passed.
    DeadlineExceeded,

    // Client errors
    /// Bad request (400).
    BadRequest,
    /// Unauthorized (401).
    Unauthorized,
    /// Forbidden (403).
    Forbidden,
    /// Resource not found (404).
    NotFound,
    /// Conflict (409).
    Conflict,
    /// Unprocessable entity (422).
    UnprocessableEntity,
    /// Rate limited (429).
    RateLimited,
    /// Any other 4xx status.
    ClientError,

    // Server errors
    /// Internal server error (500).
    InternalError,
    /// Bad gateway (502).
    BadGateway,
    /// Service unavailable (503).
    ServiceUnavailable,
    /// Gateway timeout (504).
    GatewayTimeout,
    /// Any other 5xx status.
    ServerError,

    // Payload errors
    /// Failed to serialize a request body.
    SerializationError,
    /// Failed to deserialize a response body.
    DeserializationError,
    /// Response metadata had an unexpected shape.
    UnexpectedFormat,

    // Retry / polling
    /// Retries exhausted on a retryable failure.
    RetriesExhausted,
    /// A background job reported failure.
    ProgressFailed,

    // Generic
    /// Unknown error.
    Unknown,
}

impl fmt::Display for CanvasErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::InvalidConfiguration => "invalid_configuration",
            Self::InvalidBaseUrl => "invalid_base_url",
            Self::MissingCredential => "missing_credential",
            Self::ConnectionFailed => "connection_failed",
            Self::Timeout => "timeout",
            Self::Network => "network",
            Self::Cancelled => "cancelled",
            Self::DeadlineExceeded => "deadline_exceeded",
            Self::BadRequest => "bad_request",
            Self::Unauthorized => "unauthorized",
            Self::Forbidden => "forbidden",
            Self::NotFound => "not_found",
            Self::Conflict => "conflict",
            Self::UnprocessableEntity => "unprocessable_entity",
            Self::RateLimited => "rate_limited",
            Self::ClientError => "client_error",
            Self::InternalError => "internal_error",
            Self::BadGateway => "bad_gateway",
            Self::ServiceUnavailable => "service_unavailable",
            Self::GatewayTimeout => "gateway_timeout",
            Self::ServerError => "server_error",
            Self::SerializationError => "serialization_error",
            Self::DeserializationError => "deserialization_error",
            Self::UnexpectedFormat => "unexpected_format",
            Self::RetriesExhausted => "retries_exhausted",
            Self::ProgressFailed => "progress_failed",
            Self::Unknown => "unknown",
        };
        f.write_str(name)
    }
}

/// Canvas API error with detailed information.
#[derive(Error, Debug)]
pub struct CanvasError {
    /// Error kind.
    kind: CanvasErrorKind,
    /// Error message.
    message: String,
    /// HTTP status code.
    status_code: Option<u16>,
    /// Request path the error belongs to.
    path: Option<String>,
    /// Number of attempts made before giving up.
    attempts: Option<u32>,
    /// Retry-After header value in seconds.
    retry_after: Option<u64>,
    /// Underlying cause.
    #[source]
    cause: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl fmt::Display for CanvasError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.kind, self.message)?;
        if let Some(code) = self.status_code {
            write!(f, " (HTTP {})", code)?;
        }
        if let Some(ref path) = self.path {
            write!(f, " [path: {}]", path)?;
        }
        if let Some(attempts) = self.attempts {
            write!(f, " after {} attempts", attempts)?;
        }
        Ok(())
    }
}

impl CanvasError {
    /// Creates a new Canvas error.
    pub fn new(kind: CanvasErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            status_code: None,
            path: None,
            attempts: None,
            retry_after: None,
            cause: None,
        }
    }

    /// Sets the HTTP status code.
    pub fn with_status(mut self, code: u16) -> Self {
        self.status_code = Some(code);
        self
    }

    /// Sets the request path.
    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    /// Sets the Retry-After hint in seconds.
    pub fn with_retry_after(mut self, seconds: u64) -> Self {
        self.retry_after = Some(seconds);
        self
    }

    /// Sets the underlying cause.
    pub fn with_cause(mut self, cause: impl std::error::Error + Send + Sync + 'static) -> Self {
        self.cause = Some(Box::new(cause));
        self
    }

    /// Gets the error kind.
    pub fn kind(&self) -> CanvasErrorKind {
        self.kind
    }

    /// Gets the error message.
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Gets the HTTP status code.
    pub fn status_code(&self) -> Option<u16> {
        self.status_code
    }

    /// Gets the request path.
    pub fn path(&self) -> Option<&str> {
        self.path.as_deref()
    }

    /// Gets the number of attempts, set on retry exhaustion.
    pub fn attempts(&self) -> Option<u32> {
        self.attempts
    }

    /// Returns the Retry-After hint in seconds.
    pub fn retry_after(&self) -> Option<u64> {
        self.retry_after
    }

    /// Returns the wrapped error when this is a retry-exhaustion error.
    pub fn last_error(&self) -> Option<&CanvasError> {
        if self.kind != CanvasErrorKind::RetriesExhausted {
            return None;
        }
        self.cause
            .as_ref()
            .and_then(|c| c.downcast_ref::<CanvasError>())
    }

    /// Returns true if the caller cancelled or the caller's deadline passed.
    pub fn is_cancellation(&self) -> bool {
        matches!(
            self.kind,
            CanvasErrorKind::Cancelled | CanvasErrorKind::DeadlineExceeded
        )
    }

    /// Returns true if this error is retryable.
    ///
    /// Transport failures, 429 and 500/502/503/504 are retryable. Caller
    /// cancellation and deadlines never are.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self.kind,
            CanvasErrorKind::ConnectionFailed
                | CanvasErrorKind::Timeout
                | CanvasErrorKind::Network
                | CanvasErrorKind::RateLimited
                | CanvasErrorKind::InternalError
                | CanvasErrorKind::BadGateway
                | CanvasErrorKind::ServiceUnavailable
                | CanvasErrorKind::GatewayTimeout
        )
    }

    /// Wraps a retryable error after the retry budget ran out.
    pub fn retries_exhausted(last: CanvasError, attempts: u32) -> Self {
        let mut error = Self::new(
            CanvasErrorKind::RetriesExhausted,
            format!("giving up: {}", last.message),
        );
        error.status_code = last.status_code;
        error.path = last.path.clone();
        error.attempts = Some(attempts);
        error.with_cause(last)
    }

    /// Creates an error from an HTTP status code and response message.
    pub fn from_response(status: u16, message: impl Into<String>) -> Self {
        Self::new(Self::kind_from_status(status), message).with_status(status)
    }

    /// Maps HTTP status code to error kind.
    pub fn kind_from_status(status: u16) -> CanvasErrorKind {
        match status {
            400 => CanvasErrorKind::BadRequest,
            401 => CanvasErrorKind::Unauthorized,
            403 => CanvasErrorKind::Forbidden,
            404 => CanvasErrorKind::NotFound,
            409 => CanvasErrorKind::Conflict,
            422 => CanvasErrorKind::UnprocessableEntity,
            429 => CanvasErrorKind::RateLimited,
            400..=499 => CanvasErrorKind::ClientError,
            500 => CanvasErrorKind::InternalError,
            502 => CanvasErrorKind::BadGateway,
            503 => CanvasErrorKind::ServiceUnavailable,
            504 => CanvasErrorKind::GatewayTimeout,
            500..=599 => CanvasErrorKind::ServerError,
            _ => CanvasErrorKind::Unknown,
        }
    }

    /// Classifies a transport failure.
    pub fn from_transport(error: reqwest::Error) -> Self {
        let kind = if error.is_timeout() {
            CanvasErrorKind::Timeout
        } else if error.is_connect() {
            CanvasErrorKind::ConnectionFailed
        } else {
            CanvasErrorKind::Network
        };
        Self::new(kind, format!("request failed: {}", error)).with_cause(error)
    }

    // Convenience constructors

    /// Creates a configuration error.
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::new(CanvasErrorKind::InvalidConfiguration, message)
    }

    /// Creates a cancellation error.
    pub fn cancelled() -> Self {
        Self::new(CanvasErrorKind::Cancelled, "operation cancelled by caller")
    }

    /// Creates a deadline error.
    pub fn deadline_exceeded() -> Self {
        Self::new(CanvasErrorKind::DeadlineExceeded, "caller deadline exceeded")
    }

    /// Creates a deserialization error.
    pub fn deserialization(message: impl Into<String>) -> Self {
        Self::new(CanvasErrorKind::DeserializationError, message)
    }

    /// Creates a serialization error.
    pub fn serialization(message: impl Into<String>) -> Self {
        Self::new(CanvasErrorKind::SerializationError, message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn test_error_display() {
        let error = CanvasError::new(CanvasErrorKind::NotFound, "Course not found")
            .with_status(404)
            .with_path("courses/42");

        let display = format!("{}", error);
        assert!(display.contains("not_found"));
        assert!(display.contains("Course not found"));
        assert!(display.contains("404"));
        assert!(display.contains("courses/42"));
    }

    #[test]
    fn test_is_retryable() {
        for status in [429, 500, 502, 503, 504] {
            assert!(CanvasError::from_response(status, "x").is_retryable(), "{}", status);
        }
        for status in [400, 401, 403, 404, 409, 422, 501] {
            assert!(!CanvasError::from_response(status, "x").is_retryable(), "{}", status);
        }

        assert!(CanvasError::new(CanvasErrorKind::ConnectionFailed, "refused").is_retryable());
        assert!(!CanvasError::cancelled().is_retryable());
        assert!(!CanvasError::deadline_exceeded().is_retryable());
    }

    #[test]
    fn test_kind_from_status() {
        assert_eq!(CanvasError::kind_from_status(418), CanvasErrorKind::ClientError);
        assert_eq!(CanvasError::kind_from_status(507), CanvasErrorKind::ServerError);
        assert_eq!(CanvasError::kind_from_status(302), CanvasErrorKind::Unknown);
    }

    #[test]
    fn test_retries_exhausted_preserves_cause() {
        let last = CanvasError::from_response(503, "maintenance").with_path("courses");
        let wrapped = CanvasError::retries_exhausted(last, 4);

        assert_eq!(wrapped.kind(), CanvasErrorKind::RetriesExhausted);
        assert_eq!(wrapped.status_code(), Some(503));
        assert_eq!(wrapped.attempts(), Some(4));
        assert!(!wrapped.is_retryable());

        let inner = wrapped.last_error().unwrap();
        assert_eq!(inner.kind(), CanvasErrorKind::ServiceUnavailable);
        assert!(wrapped.source().is_some());
    }
}
