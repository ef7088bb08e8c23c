//! Error types for the salon client.
//!
//! This module defines the error type returned by every fallible operation in
//! the crate: transport failures, malformed envelopes, persona contention and
//! persistence failures.

use std::error;
use std::fmt;
use std::io;
use std::str::Utf8Error;
use std::sync::Arc;

/// The main error type for the salon client.
#[derive(Clone, Debug)]
pub enum Error {
    /// A generic API error reported by the remote service.
    Api {
        /// HTTP status code.
        status_code: u16,
        /// Error code string from the service (e.g. `STREAM_ERROR`).
        code: Option<String>,
        /// Human-readable error message.
        message: String,
        /// Additional details from the service, if any.
        details: Option<String>,
    },

    /// The request was rejected as invalid by the service.
    BadRequest {
        /// Human-readable error message.
        message: String,
        /// Error code string from the service.
        code: Option<String>,
    },

    /// The requested character does not exist on the service.
    NotFound {
        /// Human-readable error message.
        message: String,
        /// Additional details, usually the list of available characters.
        details: Option<String>,
    },

    /// The request timed out.
    Timeout {
        /// Human-readable error message.
        message: String,
        /// Duration of the timeout in seconds.
        duration: Option<f64>,
    },

    /// Could not connect to the service.
    Connection {
        /// Human-readable error message.
        message: String,
        /// Underlying error.
        source: Option<Arc<dyn error::Error + Send + Sync>>,
    },

    /// Internal server error.
    InternalServer {
        /// Human-readable error message.
        message: String,
        /// Additional details from the service.
        details: Option<String>,
    },

    /// The service (or the model behind it) is unavailable.
    ServiceUnavailable {
        /// Human-readable error message.
        message: String,
        /// Time to wait before retrying, in seconds.
        retry_after: Option<u64>,
    },

    /// HTTP client error that does not fit another category.
    HttpClient {
        /// Human-readable error message.
        message: String,
        /// Underlying error.
        source: Option<Arc<dyn error::Error + Send + Sync>>,
    },

    /// The transport failed while a response body was being consumed.
    Transport {
        /// Human-readable error message.
        message: String,
        /// Underlying error.
        source: Option<Arc<dyn error::Error + Send + Sync>>,
    },

    /// A payload was missing fields required for its envelope variant.
    MalformedEnvelope {
        /// Human-readable error message.
        message: String,
        /// Underlying error.
        source: Option<Arc<dyn error::Error + Send + Sync>>,
    },

    /// A turn is already in flight for this persona.
    AlreadyInFlight {
        /// The busy persona.
        persona: String,
    },

    /// The conversation store failed to persist a mutation.
    StoreWrite {
        /// Human-readable error message.
        message: String,
        /// Underlying error.
        source: Option<Arc<dyn error::Error + Send + Sync>>,
    },

    /// The turn was cancelled by the caller.
    Cancelled {
        /// The persona whose turn was cancelled.
        persona: String,
    },

    /// Serialization/deserialization error.
    Serialization {
        /// Human-readable error message.
        message: String,
        /// Underlying error.
        source: Option<Arc<dyn error::Error + Send + Sync>>,
    },

    /// I/O error.
    Io {
        /// Human-readable error message.
        message: String,
        /// Underlying error.
        source: Arc<io::Error>,
    },

    /// A value supplied by the caller failed validation.
    Validation {
        /// Human-readable error message.
        message: String,
        /// Parameter that failed validation.
        param: Option<String>,
    },

    /// URL parsing or joining error.
    Url {
        /// Human-readable error message.
        message: String,
        /// Underlying error.
        source: Option<url::ParseError>,
    },

    /// Encoding/decoding error.
    Encoding {
        /// Human-readable error message.
        message: String,
        /// Underlying error.
        source: Option<Arc<dyn error::Error + Send + Sync>>,
    },
}

impl Error {
    /// Creates a new API error.
    pub fn api(
        status_code: u16,
        code: Option<String>,
        message: impl Into<String>,
        details: Option<String>,
    ) -> Self {
        Error::Api {
            status_code,
            code,
            message: message.into(),
            details,
        }
    }

    /// Creates a new bad request error.
    pub fn bad_request(message: impl Into<String>, code: Option<String>) -> Self {
        Error::BadRequest {
            message: message.into(),
            code,
        }
    }

    /// Creates a new not found error.
    pub fn not_found(message: impl Into<String>, details: Option<String>) -> Self {
        Error::NotFound {
            message: message.into(),
            details,
        }
    }

    /// Creates a new timeout error.
    pub fn timeout(message: impl Into<String>, duration: Option<f64>) -> Self {
        Error::Timeout {
            message: message.into(),
            duration,
        }
    }

    /// Creates a new connection error.
    pub fn connection(
        message: impl Into<String>,
        source: Option<Box<dyn error::Error + Send + Sync>>,
    ) -> Self {
        Error::Connection {
            message: message.into(),
            source: source.map(Arc::from),
        }
    }

    /// Creates a new internal server error.
    pub fn internal_server(message: impl Into<String>, details: Option<String>) -> Self {
        Error::InternalServer {
            message: message.into(),
            details,
        }
    }

    /// Creates a new service unavailable error.
    pub fn service_unavailable(message: impl Into<String>, retry_after: Option<u64>) -> Self {
        Error::ServiceUnavailable {
            message: message.into(),
            retry_after,
        }
    }

    /// Creates a new HTTP client error.
    pub fn http_client(
        message: impl Into<String>,
        source: Option<Box<dyn error::Error + Send + Sync>>,
    ) -> Self {
        Error::HttpClient {
            message: message.into(),
            source: source.map(Arc::from),
        }
    }

    /// Creates a new transport error.
    pub fn transport(
        message: impl Into<String>,
        source: Option<Box<dyn error::Error + Send + Sync>>,
    ) -> Self {
        Error::Transport {
            message: message.into(),
            source: source.map(Arc::from),
        }
    }

    /// Creates a new malformed envelope error.
    pub fn malformed_envelope(
        message: impl Into<String>,
        source: Option<Box<dyn error::Error + Send + Sync>>,
    ) -> Self {
        Error::MalformedEnvelope {
            message: message.into(),
            source: source.map(Arc::from),
        }
    }

    /// Creates a new already-in-flight error.
    pub fn already_in_flight(persona: impl Into<String>) -> Self {
        Error::AlreadyInFlight {
            persona: persona.into(),
        }
    }

    /// Creates a new store write error.
    pub fn store_write(
        message: impl Into<String>,
        source: Option<Box<dyn error::Error + Send + Sync>>,
    ) -> Self {
        Error::StoreWrite {
            message: message.into(),
            source: source.map(Arc::from),
        }
    }

    /// Creates a new cancellation error.
    pub fn cancelled(persona: impl Into<String>) -> Self {
        Error::Cancelled {
            persona: persona.into(),
        }
    }

    /// Creates a new serialization error.
    pub fn serialization(
        message: impl Into<String>,
        source: Option<Box<dyn error::Error + Send + Sync>>,
    ) -> Self {
        Error::Serialization {
            message: message.into(),
            source: source.map(Arc::from),
        }
    }

    /// Creates a new I/O error.
    pub fn io(message: impl Into<String>, source: io::Error) -> Self {
        Error::Io {
            message: message.into(),
            source: Arc::new(source),
        }
    }

    /// Creates a new validation error.
    pub fn validation(message: impl Into<String>, param: Option<String>) -> Self {
        Error::Validation {
            message: message.into(),
            param,
        }
    }

    /// Creates a new URL error.
    pub fn url(message: impl Into<String>, source: Option<url::ParseError>) -> Self {
        Error::Url {
            message: message.into(),
            source,
        }
    }

    /// Creates a new encoding error.
    pub fn encoding(
        message: impl Into<String>,
        source: Option<Box<dyn error::Error + Send + Sync>>,
    ) -> Self {
        Error::Encoding {
            message: message.into(),
            source: source.map(Arc::from),
        }
    }

    /// Returns true if this error came from talking to the remote service.
    ///
    /// These errors discard the in-flight turn but keep the user's message.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            Error::Api { .. }
                | Error::BadRequest { .. }
                | Error::NotFound { .. }
                | Error::Timeout { .. }
                | Error::Connection { .. }
                | Error::InternalServer { .. }
                | Error::ServiceUnavailable { .. }
                | Error::HttpClient { .. }
                | Error::Transport { .. }
        )
    }

    /// Returns true if this error is a malformed envelope.
    pub fn is_malformed_envelope(&self) -> bool {
        matches!(self, Error::MalformedEnvelope { .. })
    }

    /// Returns true if a turn was already in flight for the persona.
    pub fn is_already_in_flight(&self) -> bool {
        matches!(self, Error::AlreadyInFlight { .. })
    }

    /// Returns true if the conversation store failed to persist.
    pub fn is_store_write(&self) -> bool {
        matches!(self, Error::StoreWrite { .. })
    }

    /// Returns true if the turn was cancelled.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Error::Cancelled { .. })
    }

    /// Returns true if this error is a "not found" error.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound { .. })
    }

    /// Returns true if this error is a bad request.
    pub fn is_bad_request(&self) -> bool {
        matches!(self, Error::BadRequest { .. })
    }

    /// Returns true if this error is a timeout.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Error::Timeout { .. })
    }

    /// Returns true if this error is a connection error.
    pub fn is_connection(&self) -> bool {
        matches!(self, Error::Connection { .. })
    }

    /// Returns true if this error is a server error.
    pub fn is_server_error(&self) -> bool {
        matches!(
            self,
            Error::InternalServer { .. } | Error::ServiceUnavailable { .. }
        )
    }

    /// Returns true if this error is a validation error.
    pub fn is_validation(&self) -> bool {
        matches!(self, Error::Validation { .. })
    }

    /// Returns the status code associated with this error, if any.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Error::Api { status_code, .. } => Some(*status_code),
            Error::BadRequest { .. } => Some(400),
            Error::NotFound { .. } => Some(404),
            Error::InternalServer { .. } => Some(500),
            _ => None,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Api {
                status_code,
                code,
                message,
                details,
            } => {
                match code {
                    Some(code) => write!(f, "{code} ({status_code}): {message}")?,
                    None => write!(f, "API error ({status_code}): {message}")?,
                }
                if let Some(details) = details {
                    write!(f, " [{details}]")?;
                }
                Ok(())
            }
            Error::BadRequest { message, code } => {
                if let Some(code) = code {
                    write!(f, "Bad request: {message} ({code})")
                } else {
                    write!(f, "Bad request: {message}")
                }
            }
            Error::NotFound { message, details } => {
                if let Some(details) = details {
                    write!(f, "Not found: {message} ({details})")
                } else {
                    write!(f, "Not found: {message}")
                }
            }
            Error::Timeout { message, duration } => {
                if let Some(duration) = duration {
                    write!(f, "Timeout error: {message} ({duration} seconds)")
                } else {
                    write!(f, "Timeout error: {message}")
                }
            }
            Error::Connection { message, .. } => {
                write!(f, "Connection error: {message}")
            }
            Error::InternalServer { message, details } => {
                if let Some(details) = details {
                    write!(f, "Internal server error: {message} ({details})")
                } else {
                    write!(f, "Internal server error: {message}")
                }
            }
            Error::ServiceUnavailable {
                message,
                retry_after,
            } => {
                if let Some(retry_after) = retry_after {
                    write!(
                        f,
                        "Service unavailable: {message} (retry after {retry_after} seconds)"
                    )
                } else {
                    write!(f, "Service unavailable: {message}")
                }
            }
            Error::HttpClient { message, .. } => {
                write!(f, "HTTP client error: {message}")
            }
            Error::Transport { message, .. } => {
                write!(f, "Transport error: {message}")
            }
            Error::MalformedEnvelope { message, .. } => {
                write!(f, "Malformed envelope: {message}")
            }
            Error::AlreadyInFlight { persona } => {
                write!(f, "A turn is already in flight for persona '{persona}'")
            }
            Error::StoreWrite { message, .. } => {
                write!(f, "Conversation store write failed: {message}")
            }
            Error::Cancelled { persona } => {
                write!(f, "Turn cancelled for persona '{persona}'")
            }
            Error::Serialization { message, .. } => {
                write!(f, "Serialization error: {message}")
            }
            Error::Io { message, .. } => {
                write!(f, "I/O error: {message}")
            }
            Error::Validation { message, param } => {
                if let Some(param) = param {
                    write!(f, "Validation error: {message} (parameter: {param})")
                } else {
                    write!(f, "Validation error: {message}")
                }
            }
            Error::Url { message, .. } => {
                write!(f, "URL error: {message}")
            }
            Error::Encoding { message, .. } => {
                write!(f, "Encoding error: {message}")
            }
        }
    }
}

impl error::Error for Error {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match self {
            Error::Connection { source, .. }
            | Error::HttpClient { source, .. }
            | Error::Transport { source, .. }
            | Error::MalformedEnvelope { source, .. }
            | Error::StoreWrite { source, .. }
            | Error::Serialization { source, .. }
            | Error::Encoding { source, .. } => source
                .as_ref()
                .map(|e| e.as_ref() as &(dyn error::Error + 'static)),
            Error::Io { source, .. } => Some(source.as_ref()),
            Error::Url { source, .. } => {
                source.as_ref().map(|e| e as &(dyn error::Error + 'static))
            }
            _ => None,
        }
    }
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Self {
        Error::io(err.to_string(), err)
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::serialization(format!("JSON error: {err}"), Some(Box::new(err)))
    }
}

impl From<url::ParseError> for Error {
    fn from(err: url::ParseError) -> Self {
        Error::url(format!("URL parse error: {err}"), Some(err))
    }
}

impl From<Utf8Error> for Error {
    fn from(err: Utf8Error) -> Self {
        Error::encoding(format!("UTF-8 error: {err}"), Some(Box::new(err)))
    }
}

/// A specialized Result type for salon operations.
pub type Result<T> = std::result::Result<T, Error>;
