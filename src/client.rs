//! HTTP transport for the Messages endpoint.
//!
//! The chat loop talks to the API through the [`MessageTransport`] trait so
//! that sessions can be driven by a scripted transport in tests.  [`Anthropic`]
//! is the production implementation.

use std::fmt;
use std::pin::Pin;
use std::time::Instant;

use bytes::Bytes;
use futures::{Stream, StreamExt};
use reqwest::header::{self, HeaderMap, HeaderValue};
use reqwest::{Client as ReqwestClient, Response};
use serde::Deserialize;

use crate::error::{Error, Result};
use crate::observability::{
    CLIENT_REQUEST_DURATION, CLIENT_REQUEST_ERRORS, CLIENT_REQUESTS, CLIENT_UNCHECKED_STATUS,
};
use crate::types::RequestPayload;

const DEFAULT_API_URL: &str = "https://api.anthropic.com/v1/";
const ANTHROPIC_API_VERSION: &str = "2023-06-01";
const ANTHROPIC_BETA: &str = "messages-2023-12-15";

/// A response body, chunk by chunk.
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes>> + Send>>;

/// Issues one streaming request and hands back the response body.
#[async_trait::async_trait]
pub trait MessageTransport: Send + Sync {
    /// Sends `payload` and returns the body of the response.
    ///
    /// The connection lives as long as the returned stream.
    async fn open_stream(&self, payload: &RequestPayload) -> Result<ByteStream>;
}

/// Client for the Anthropic Messages API.
#[derive(Clone)]
pub struct Anthropic {
    api_key: String,
    client: ReqwestClient,
    base_url: String,
    strict_status: bool,
}

impl Anthropic {
    /// Create a new Anthropic client for the public endpoint.
    pub fn new(api_key: impl Into<String>) -> Result<Self> {
        Self::with_options(api_key, None, false)
    }

    /// Create a new client with custom settings.
    ///
    /// With `strict_status` false, the body of a non-success response is
    /// decoded like any other stream.  With it true, a non-success response
    /// becomes an [`Error::Api`].
    pub fn with_options(
        api_key: impl Into<String>,
        base_url: Option<String>,
        strict_status: bool,
    ) -> Result<Self> {
        let api_key = api_key.into();
        if api_key.is_empty() {
            return Err(Error::config("api_key is empty", None));
        }
        let client = ReqwestClient::builder().build().map_err(|e| {
            Error::http_client(
                format!("Failed to build HTTP client: {}", e),
                Some(Box::new(e)),
            )
        })?;

        let mut base_url = base_url.unwrap_or_else(|| DEFAULT_API_URL.to_string());
        if !base_url.ends_with('/') {
            base_url.push('/');
        }

        Ok(Self {
            api_key,
            client,
            base_url,
            strict_status,
        })
    }

    /// The URL requests are posted to.
    pub fn messages_url(&self) -> String {
        format!("{}messages", self.base_url)
    }

    /// Whether non-success responses are turned into errors.
    pub fn strict_status(&self) -> bool {
        self.strict_status
    }

    /// Create and return default headers for API requests.
    fn default_headers(&self) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("application/json"),
        );
        headers.insert(header::ACCEPT, HeaderValue::from_static("text/event-stream"));
        let api_key = HeaderValue::from_str(&self.api_key).map_err(|e| {
            Error::config(
                "api_key contains characters not allowed in a header",
                Some(Box::new(e)),
            )
        })?;
        headers.insert("x-api-key", api_key);
        headers.insert(
            "anthropic-version",
            HeaderValue::from_static(ANTHROPIC_API_VERSION),
        );
        headers.insert("anthropic-beta", HeaderValue::from_static(ANTHROPIC_BETA));
        Ok(headers)
    }

    /// Process API response errors and convert to our Error type
    async fn process_error_response(response: Response) -> Error {
        let status_code = response.status().as_u16();

        let request_id = response
            .headers()
            .get("request-id")
            .or_else(|| response.headers().get("x-request-id"))
            .and_then(|val| val.to_str().ok())
            .map(String::from);

        #[derive(Deserialize)]
        struct ErrorResponse {
            error: Option<ErrorDetail>,
        }

        #[derive(Deserialize)]
        struct ErrorDetail {
            #[serde(rename = "type")]
            error_type: Option<String>,
            message: Option<String>,
        }

        let error_body = match response.text().await {
            Ok(body) => body,
            Err(e) => {
                return Error::http_client(
                    format!("Failed to read error response: {}", e),
                    Some(Box::new(e)),
                );
            }
        };

        let detail = serde_json::from_str::<ErrorResponse>(&error_body)
            .ok()
            .and_then(|e| e.error);
        let error_type = detail.as_ref().and_then(|d| d.error_type.clone());
        let message = detail
            .and_then(|d| d.message)
            .unwrap_or(error_body);

        Error::api(status_code, error_type, message, request_id)
    }
}

impl fmt::Debug for Anthropic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Anthropic")
            .field("api_key", &"<redacted>")
            .field("base_url", &self.base_url)
            .field("strict_status", &self.strict_status)
            .finish()
    }
}

#[async_trait::async_trait]
impl MessageTransport for Anthropic {
    async fn open_stream(&self, payload: &RequestPayload) -> Result<ByteStream> {
        CLIENT_REQUESTS.click();
        let start = Instant::now();
        let headers = self.default_headers()?;

        let response = self
            .client
            .post(self.messages_url())
            .headers(headers)
            .json(payload)
            .send()
            .await
            .map_err(|e| {
                CLIENT_REQUEST_ERRORS.click();
                if e.is_timeout() {
                    Error::timeout(format!("Request timed out: {}", e))
                } else if e.is_connect() {
                    Error::connection(format!("Connection error: {}", e), Some(Box::new(e)))
                } else {
                    Error::http_client(format!("Request failed: {}", e), Some(Box::new(e)))
                }
            })?;
        CLIENT_REQUEST_DURATION.add(start.elapsed().as_secs_f64());

        let status = response.status();
        if !status.is_success() {
            if self.strict_status {
                CLIENT_REQUEST_ERRORS.click();
                return Err(Self::process_error_response(response).await);
            }
            CLIENT_UNCHECKED_STATUS.click();
            tracing::warn!(
                status = status.as_u16(),
                "non-success response; decoding body as a stream anyway"
            );
        }
        tracing::debug!(
            status = status.as_u16(),
            messages = payload.messages.len(),
            "response stream opened"
        );

        let stream = response.bytes_stream().map(|result| {
            result.map_err(|e| {
                Error::streaming(format!("Error in HTTP stream: {}", e), Some(Box::new(e)))
            })
        });
        Ok(Box::pin(stream))
    }
}
