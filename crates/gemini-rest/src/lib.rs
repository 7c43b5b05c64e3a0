//! # gemini-rest
//!
//! A deliberately small client for the Gemini `generateContent` REST API:
//! typed request/response bodies, a raw-JSON escape hatch, and
//! server-sent-event streaming for `streamGenerateContent`.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use gemini_rest::{Content, GeminiClient, GenerateContentRequest, Part};
//!
//! # async fn run() -> Result<(), gemini_rest::GeminiError> {
//! let client = GeminiClient::new("my-api-key")?;
//! let req = GenerateContentRequest {
//!     contents: vec![Content::user(vec![Part::text("Say hello")])],
//!     ..Default::default()
//! };
//! let resp = client.generate_content("gemini-2.5-flash", &req).await?;
//! println!("{}", resp.text());
//! # Ok(())
//! # }
//! ```
//!
//! No retries and no timeouts are applied: a call runs until the server
//! answers or the transport fails. Callers that need either wrap the futures
//! themselves.

pub mod sse;
pub mod types;

pub use sse::SseDecoder;
pub use types::*;

use futures::stream::{self, Stream, StreamExt};
use std::collections::VecDeque;
use std::pin::Pin;
use thiserror::Error;
use tracing::debug;

/// Default API root.
pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

// ── Error type ───────────────────────────────────────────────────────────────

/// Errors returned by [`GeminiClient`].
#[derive(Error, Debug)]
pub enum GeminiError {
    /// No API key was supplied.
    #[error("Gemini API key is empty")]
    MissingApiKey,

    /// Transport-level failure (DNS, TLS, connection reset, body read).
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The API answered with a non-success status.
    #[error("Gemini API returned {status}: {message}")]
    Api { status: u16, message: String },

    /// The body was not the JSON we expected.
    #[error("Failed to decode Gemini response: {0}")]
    Decode(#[from] serde_json::Error),
}

/// A boxed stream of streamed response chunks.
pub type ResponseStream =
    Pin<Box<dyn Stream<Item = Result<GenerateContentResponse, GeminiError>> + Send>>;

// ── Client ───────────────────────────────────────────────────────────────────

/// Cheap to clone; the inner `reqwest::Client` shares its connection pool.
#[derive(Clone)]
pub struct GeminiClient {
    http: reqwest::Client,
    api_key: String,
    base_url: String,
}

impl std::fmt::Debug for GeminiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeminiClient")
            .field("base_url", &self.base_url)
            .field("api_key", &"<redacted>")
            .finish()
    }
}

impl GeminiClient {
    pub fn new(api_key: impl Into<String>) -> Result<Self, GeminiError> {
        let api_key = api_key.into();
        if api_key.trim().is_empty() {
            return Err(GeminiError::MissingApiKey);
        }
        Ok(Self {
            http: reqwest::Client::new(),
            api_key,
            base_url: DEFAULT_BASE_URL.to_string(),
        })
    }

    /// Point the client at a different API root (proxies, test servers).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Call `generateContent` and return the untouched response JSON.
    ///
    /// Useful when the caller wants to inspect fields this crate does not
    /// model, or to archive the exact server answer.
    pub async fn generate_content_raw(
        &self,
        model: &str,
        request: &GenerateContentRequest,
    ) -> Result<serde_json::Value, GeminiError> {
        let url = self.endpoint(model, "generateContent");
        debug!("POST {}", url);
        let response = self
            .http
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .json(request)
            .send()
            .await?;
        let response = check_status(response).await?;
        let body = response.text().await?;
        debug!("{} returned {} bytes", model, body.len());
        Ok(serde_json::from_str(&body)?)
    }

    /// Call `generateContent` and decode the response.
    pub async fn generate_content(
        &self,
        model: &str,
        request: &GenerateContentRequest,
    ) -> Result<GenerateContentResponse, GeminiError> {
        let raw = self.generate_content_raw(model, request).await?;
        Ok(serde_json::from_value(raw)?)
    }

    /// Call `streamGenerateContent?alt=sse`, yielding each chunk as it
    /// arrives. A malformed event surfaces as an `Err` item; the stream keeps
    /// going after it.
    pub async fn stream_generate_content(
        &self,
        model: &str,
        request: &GenerateContentRequest,
    ) -> Result<ResponseStream, GeminiError> {
        let url = format!("{}?alt=sse", self.endpoint(model, "streamGenerateContent"));
        debug!("POST {}", url);
        let response = self
            .http
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .json(request)
            .send()
            .await?;
        let response = check_status(response).await?;

        let body = Box::pin(response.bytes_stream());
        let state = (body, SseDecoder::new(), VecDeque::<String>::new(), false);
        let chunks = stream::unfold(state, |state| async move {
            let (mut body, mut decoder, mut queue, mut done) = state;
            loop {
                if let Some(event) = queue.pop_front() {
                    let item = serde_json::from_str::<GenerateContentResponse>(&event)
                        .map_err(GeminiError::from);
                    return Some((item, (body, decoder, queue, done)));
                }
                if done {
                    return None;
                }
                match body.next().await {
                    Some(Ok(bytes)) => queue.extend(decoder.push(&bytes)),
                    Some(Err(e)) => {
                        done = true;
                        return Some((Err(GeminiError::Http(e)), (body, decoder, queue, done)));
                    }
                    None => {
                        done = true;
                        queue.extend(decoder.finish());
                    }
                }
            }
        });

        Ok(Box::pin(chunks))
    }

    fn endpoint(&self, model: &str, method: &str) -> String {
        format!("{}/models/{}:{}", self.base_url, model, method)
    }
}

/// Turn a non-2xx response into [`GeminiError::Api`], pulling the message out
/// of Google's `{"error": {"message": ...}}` envelope when present.
async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, GeminiError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(GeminiError::Api {
        status: status.as_u16(),
        message: api_error_message(&body),
    })
}

fn api_error_message(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| v["error"]["message"].as_str().map(str::to_string))
        .unwrap_or_else(|| body.trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_key_rejected() {
        assert!(matches!(GeminiClient::new("  "), Err(GeminiError::MissingApiKey)));
    }

    #[test]
    fn endpoint_format() {
        let c = GeminiClient::new("k")
            .unwrap()
            .with_base_url("http://localhost:8080/v1beta/");
        assert_eq!(
            c.endpoint("gemini-2.5-pro", "generateContent"),
            "http://localhost:8080/v1beta/models/gemini-2.5-pro:generateContent"
        );
    }

    #[test]
    fn api_error_message_from_envelope() {
        let body = r#"{"error":{"code":400,"message":"API key not valid","status":"INVALID_ARGUMENT"}}"#;
        assert_eq!(api_error_message(body), "API key not valid");
        assert_eq!(api_error_message("  upstream down \n"), "upstream down");
    }

    #[test]
    fn debug_redacts_key() {
        let c = GeminiClient::new("secret-key").unwrap();
        assert!(!format!("{c:?}").contains("secret-key"));
    }
}
