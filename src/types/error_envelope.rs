use serde::{Deserialize, Serialize};

use crate::Error;

/// The details of an error reported by the service.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ErrorDetail {
    /// Machine-readable error code, e.g. `CHARACTER_NOT_FOUND`.
    pub code: String,

    /// Human-readable message.
    pub message: String,

    /// Extra context, e.g. the list of available characters.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

/// An error reported by the service, either as an HTTP error body or in-band
/// as a `data:` payload of an event stream.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ErrorEnvelope {
    /// The error.
    pub error: ErrorDetail,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ErrorBody {
    Wrapped { detail: ErrorEnvelope },
    Bare(ErrorEnvelope),
}

impl ErrorEnvelope {
    /// Parse an HTTP error body, accepting both `{"error": ...}` and the
    /// framework's `{"detail": {"error": ...}}` wrapping.
    pub fn parse_body(body: &str) -> Option<Self> {
        match serde_json::from_str::<ErrorBody>(body).ok()? {
            ErrorBody::Wrapped { detail } => Some(detail),
            ErrorBody::Bare(envelope) => Some(envelope),
        }
    }

    /// Map this envelope onto the crate error for the given HTTP status.
    pub fn into_error(self, status_code: u16, retry_after: Option<u64>) -> Error {
        let ErrorDetail {
            code,
            message,
            details,
        } = self.error;
        match status_code {
            400 => Error::bad_request(message, Some(code)),
            404 => Error::not_found(message, details),
            408 => Error::timeout(message, None),
            500 => Error::internal_server(message, details),
            502..=504 => Error::service_unavailable(message, retry_after),
            _ => Error::api(status_code, Some(code), message, details),
        }
    }
}
