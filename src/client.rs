use std::env;
use std::pin::Pin;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use futures::Stream;
use futures::stream::StreamExt;
use reqwest::header::{HeaderMap, HeaderValue};
use reqwest::{Client as ReqwestClient, Response, header};
use url::Url;

use crate::error::{Error, Result};
use crate::observability::{CLIENT_REQUESTS, CLIENT_REQUEST_DURATION, CLIENT_REQUEST_ERRORS};
use crate::sse::process_sse;
use crate::types::{
    ChatRequest, ChatResponse, ErrorEnvelope, FeedbackRequest, FeedbackResponse, HealthResponse,
    StreamEvent,
};

/// Base URL used when neither an explicit URL nor `SALON_BASE_URL` is given.
pub const DEFAULT_BASE_URL: &str = "http://localhost:8000/api/v1/";

/// Environment variable that overrides the default base URL.
pub const BASE_URL_ENV: &str = "SALON_BASE_URL";

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// A boxed stream of decoded events for one streamed turn.
pub type EventStream = Pin<Box<dyn Stream<Item = Result<StreamEvent>> + Send>>;

/// The seam between the chat controller and the remote service.
///
/// `send` returns one complete response; `stream` returns the decoded event
/// sequence of a streamed response. Dropping the returned future or stream
/// releases the underlying connection.
#[async_trait]
pub trait ChatTransport: Send + Sync {
    /// Issue a request and wait for the complete response.
    async fn send(&self, request: ChatRequest) -> Result<ChatResponse>;

    /// Issue a request and return its event stream.
    async fn stream(&self, request: ChatRequest) -> Result<EventStream>;
}

/// HTTP client for the chat service.
#[derive(Debug, Clone)]
pub struct SalonClient {
    client: ReqwestClient,
    base_url: Url,
    timeout: Duration,
}

impl SalonClient {
    /// Create a client for the default base URL.
    ///
    /// The base URL is read from the `SALON_BASE_URL` environment variable when
    /// set, falling back to `http://localhost:8000/api/v1/`.
    pub fn new() -> Result<Self> {
        Self::with_options(None, None)
    }

    /// Create a new client with custom settings.
    pub fn with_options(base_url: Option<String>, timeout: Option<Duration>) -> Result<Self> {
        let base_url = match base_url {
            Some(url) => url,
            None => env::var(BASE_URL_ENV).unwrap_or_else(|_| DEFAULT_BASE_URL.to_string()),
        };
        let base_url = normalize_base_url(&base_url)?;

        let timeout = timeout.unwrap_or(DEFAULT_TIMEOUT);
        // The overall timeout is applied per request so that long streams are
        // not cut off; only connecting is bounded client-wide.
        let client = ReqwestClient::builder()
            .connect_timeout(timeout)
            .build()
            .map_err(|e| {
                Error::http_client(
                    format!("Failed to build HTTP client: {}", e),
                    Some(Box::new(e)),
                )
            })?;

        Ok(Self {
            client,
            base_url,
            timeout,
        })
    }

    /// The base URL requests are resolved against.
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// The request timeout.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        Ok(self.base_url.join(path)?)
    }

    fn default_headers() -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("application/json"),
        );
        headers.insert(header::ACCEPT, HeaderValue::from_static("application/json"));
        headers
    }

    fn map_request_error(&self, e: reqwest::Error) -> Error {
        if e.is_timeout() {
            Error::timeout(
                format!("Request timed out: {}", e),
                Some(self.timeout.as_secs_f64()),
            )
        } else if e.is_connect() {
            Error::connection(format!("Connection error: {}", e), Some(Box::new(e)))
        } else {
            Error::http_client(format!("Request failed: {}", e), Some(Box::new(e)))
        }
    }

    /// Process error responses and convert to our Error type.
    async fn process_error_response(response: Response) -> Error {
        let status_code = response.status().as_u16();
        let retry_after = response
            .headers()
            .get(header::RETRY_AFTER)
            .and_then(|val| val.to_str().ok())
            .and_then(|val| val.parse::<u64>().ok());

        let body = match response.text().await {
            Ok(body) => body,
            Err(e) => {
                return Error::http_client(
                    format!("Failed to read error response: {}", e),
                    Some(Box::new(e)),
                );
            }
        };
        error_from_body(status_code, retry_after, &body)
    }

    async fn post(
        &self,
        path: &str,
        body: &impl serde::Serialize,
        accept: &'static str,
        timeout: bool,
    ) -> Result<Response> {
        let url = self.endpoint(path)?;
        let mut headers = Self::default_headers();
        headers.insert(header::ACCEPT, HeaderValue::from_static(accept));

        let mut builder = self.client.post(url).headers(headers).json(body);
        if timeout {
            builder = builder.timeout(self.timeout);
        }

        CLIENT_REQUESTS.click();
        let response = builder.send().await.map_err(|e| {
            CLIENT_REQUEST_ERRORS.click();
            self.map_request_error(e)
        })?;

        if !response.status().is_success() {
            CLIENT_REQUEST_ERRORS.click();
            let err = Self::process_error_response(response).await;
            tracing::warn!(path, error = %err, "request rejected by service");
            return Err(err);
        }
        Ok(response)
    }

    /// Submit a rating for a conversation.
    pub async fn submit_feedback(&self, feedback: &FeedbackRequest) -> Result<FeedbackResponse> {
        let response = self
            .post("telemetry", feedback, "application/json", true)
            .await?;
        response.json::<FeedbackResponse>().await.map_err(|e| {
            Error::serialization(
                format!("Failed to parse feedback response: {}", e),
                Some(Box::new(e)),
            )
        })
    }

    /// Probe the service's health endpoint at the origin of the base URL.
    pub async fn health(&self) -> Result<HealthResponse> {
        let url = self.endpoint("/health")?;
        CLIENT_REQUESTS.click();
        let response = self
            .client
            .get(url)
            .headers(Self::default_headers())
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| {
                CLIENT_REQUEST_ERRORS.click();
                self.map_request_error(e)
            })?;

        if !response.status().is_success() {
            CLIENT_REQUEST_ERRORS.click();
            return Err(Self::process_error_response(response).await);
        }

        response.json::<HealthResponse>().await.map_err(|e| {
            Error::serialization(
                format!("Failed to parse health response: {}", e),
                Some(Box::new(e)),
            )
        })
    }
}

#[async_trait]
impl ChatTransport for SalonClient {
    async fn send(&self, request: ChatRequest) -> Result<ChatResponse> {
        let request = request.with_stream(false);
        let start = Instant::now();
        tracing::debug!(
            character = %request.character,
            messages = request.messages.len(),
            "sending chat request"
        );

        let response = self
            .post("chat", &request, "application/json", true)
            .await?;
        let body = response.text().await.map_err(|e| {
            CLIENT_REQUEST_ERRORS.click();
            Error::transport(
                format!("Failed to read response body: {}", e),
                Some(Box::new(e)),
            )
        })?;
        CLIENT_REQUEST_DURATION.add(start.elapsed().as_secs_f64());
        ChatResponse::from_json(&body)
    }

    async fn stream(&self, request: ChatRequest) -> Result<EventStream> {
        let request = request.with_stream(true);
        let start = Instant::now();
        tracing::debug!(
            character = %request.character,
            messages = request.messages.len(),
            "opening chat stream"
        );

        let response = self
            .post("chat", &request, "text/event-stream", false)
            .await?;
        CLIENT_REQUEST_DURATION.add(start.elapsed().as_secs_f64());

        let bytes = Box::pin(response.bytes_stream().map(|chunk| {
            chunk.map_err(|e| {
                Error::transport(format!("Stream read failed: {}", e), Some(Box::new(e)))
            })
        }));
        Ok(Box::pin(process_sse(bytes)))
    }
}

/// Parse and normalize a base URL so that relative endpoints join beneath it.
fn normalize_base_url(base_url: &str) -> Result<Url> {
    let mut url = Url::parse(base_url.trim())?;
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    Ok(url)
}

/// Map an HTTP error body onto the crate error for its status.
///
/// Bodies that are not a recognizable error envelope keep their raw text as
/// the message.
fn error_from_body(status_code: u16, retry_after: Option<u64>, body: &str) -> Error {
    if let Some(envelope) = ErrorEnvelope::parse_body(body) {
        return envelope.into_error(status_code, retry_after);
    }
    let message = if body.trim().is_empty() {
        format!("HTTP {status_code}")
    } else {
        body.to_string()
    };
    match status_code {
        400 => Error::bad_request(message, None),
        404 => Error::not_found(message, None),
        408 => Error::timeout(message, None),
        500 => Error::internal_server(message, None),
        502..=504 => Error::service_unavailable(message, retry_after),
        _ => Error::api(status_code, None, message, None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_creation() {
        let client = SalonClient::with_options(
            Some("http://sociology.example.com/api/v1/".to_string()),
            Some(Duration::from_secs(30)),
        )
        .unwrap();
        assert_eq!(
            client.base_url().as_str(),
            "http://sociology.example.com/api/v1/"
        );
        assert_eq!(client.timeout(), Duration::from_secs(30));
    }

    #[test]
    fn base_url_gains_trailing_slash() {
        let url = normalize_base_url("http://localhost:8000/api/v1").unwrap();
        assert_eq!(url.as_str(), "http://localhost:8000/api/v1/");
        assert_eq!(
            url.join("chat").unwrap().as_str(),
            "http://localhost:8000/api/v1/chat"
        );
    }

    #[test]
    fn health_lives_at_the_origin() {
        let client = SalonClient::with_options(Some(DEFAULT_BASE_URL.to_string()), None).unwrap();
        assert_eq!(
            client.endpoint("/health").unwrap().as_str(),
            "http://localhost:8000/health"
        );
        assert_eq!(
            client.endpoint("telemetry").unwrap().as_str(),
            "http://localhost:8000/api/v1/telemetry"
        );
    }

    #[test]
    fn invalid_base_url_is_rejected() {
        let err = SalonClient::with_options(Some("not a url".to_string()), None).unwrap_err();
        assert!(matches!(err, Error::Url { .. }));
    }

    #[test]
    fn unknown_character_maps_to_not_found() {
        let body = r#"{"detail":{"error":{"code":"CHARACTER_NOT_FOUND","message":"Character 'nobody' not found","details":"Available characters: tocqueville"}}}"#;
        let err = error_from_body(404, None, body);
        assert!(err.is_not_found());
        assert!(err.is_transport());
    }

    #[test]
    fn unstructured_bodies_keep_their_text() {
        let err = error_from_body(502, Some(3), "bad gateway");
        match err {
            Error::ServiceUnavailable {
                message,
                retry_after,
            } => {
                assert_eq!(message, "bad gateway");
                assert_eq!(retry_after, Some(3));
            }
            other => panic!("unexpected error: {other:?}"),
        }

        let err = error_from_body(418, None, "");
        assert_eq!(err.status_code(), Some(418));
        assert!(err.to_string().contains("HTTP 418"));
    }

    #[test]
    fn validation_lists_fall_back_to_status() {
        let body = r#"{"detail":[{"loc":["body","temperature"],"msg":"ensure this value is less than or equal to 2"}]}"#;
        let err = error_from_body(422, None, body);
        assert_eq!(err.status_code(), Some(422));
    }
}
