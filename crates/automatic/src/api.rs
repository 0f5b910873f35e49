//! REST API client for the Stable Diffusion WebUI HTTP endpoints.
//!
//! Forwards opaque job payloads to `/sdapi/v1/<endpoint>` using
//! [`reqwest`]. Gateway errors (502/503/504) are retried with a small
//! exponential backoff before being surfaced; every other failure is
//! surfaced immediately.

use std::time::Duration;

use serde_json::Value;

/// Default base URL of the co-located WebUI API.
pub const DEFAULT_API_URL: &str = "http://127.0.0.1:3000/sdapi/v1";

/// Timeout for a single inference request. Generation can take minutes.
pub const INFERENCE_TIMEOUT: Duration = Duration::from_secs(600);

/// Maximum number of retries after a gateway-error response.
pub const MAX_GATEWAY_RETRIES: u32 = 10;

/// Base factor of the exponential retry backoff.
pub const BACKOFF_FACTOR: Duration = Duration::from_millis(100);

/// Statuses treated as transient gateway errors.
const RETRYABLE_STATUSES: [u16; 3] = [502, 503, 504];

/// HTTP client for a single WebUI instance.
pub struct AutomaticApi {
    client: reqwest::Client,
    api_url: String,
    max_retries: u32,
    backoff_factor: Duration,
}

/// Errors from the WebUI REST API layer.
#[derive(Debug, thiserror::Error)]
pub enum AutomaticApiError {
    /// The HTTP request itself failed (network, DNS, TLS, etc.).
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The WebUI returned a non-2xx status code.
    #[error("WebUI API error ({status}): {body}")]
    ApiError {
        /// HTTP status code.
        status: u16,
        /// Raw response body for debugging.
        body: String,
    },
}

impl AutomaticApi {
    /// Create a new API client for a WebUI instance.
    ///
    /// * `api_url` - Base HTTP URL, e.g. `http://127.0.0.1:3000/sdapi/v1`.
    pub fn new(api_url: String) -> Self {
        Self::with_client(reqwest::Client::new(), api_url)
    }

    /// Create an API client reusing an existing [`reqwest::Client`]
    /// (connection pooling across the worker's other HTTP calls).
    pub fn with_client(client: reqwest::Client, api_url: String) -> Self {
        Self {
            client,
            api_url,
            max_retries: MAX_GATEWAY_RETRIES,
            backoff_factor: BACKOFF_FACTOR,
        }
    }

    /// Override the gateway-error retry policy.
    pub fn with_retry_policy(mut self, max_retries: u32, backoff_factor: Duration) -> Self {
        self.max_retries = max_retries;
        self.backoff_factor = backoff_factor;
        self
    }

    /// Base HTTP API URL.
    pub fn api_url(&self) -> &str {
        &self.api_url
    }

    /// Forward a job payload to the WebUI.
    ///
    /// Sends `POST <base>/<endpoint>` with `payload` as the JSON body and
    /// returns the parsed response body without interpreting it. Retries
    /// gateway errors up to the configured count; application-level
    /// errors (4xx, malformed JSON) are not retried.
    pub async fn run_inference(
        &self,
        endpoint: &str,
        payload: &Value,
    ) -> Result<Value, AutomaticApiError> {
        let url = format!("{}/{}", self.api_url, endpoint);
        let mut attempt = 0u32;

        loop {
            let response = self
                .client
                .post(&url)
                .json(payload)
                .timeout(INFERENCE_TIMEOUT)
                .send()
                .await?;

            let status = response.status().as_u16();
            if is_retryable_status(status) && attempt < self.max_retries {
                attempt += 1;
                let delay = retry_delay(attempt, self.backoff_factor);
                tracing::warn!(
                    status,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    "Gateway error from WebUI, retrying",
                );
                tokio::time::sleep(delay).await;
                continue;
            }

            return Self::parse_response(response).await;
        }
    }

    // ---- private helpers ----

    /// Ensure the response has a success status code. Returns the
    /// response unchanged on success, or an
    /// [`AutomaticApiError::ApiError`] containing the status and body
    /// text on failure.
    async fn ensure_success(
        response: reqwest::Response,
    ) -> Result<reqwest::Response, AutomaticApiError> {
        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            return Err(AutomaticApiError::ApiError {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response)
    }

    /// Parse a successful JSON response body into the expected type.
    async fn parse_response<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, AutomaticApiError> {
        let response = Self::ensure_success(response).await?;
        Ok(response.json::<T>().await?)
    }
}

/// `true` for the gateway statuses the transport layer retries.
pub fn is_retryable_status(status: u16) -> bool {
    RETRYABLE_STATUSES.contains(&status)
}

/// Delay before retry `attempt` (1-based): `factor * 2^(attempt - 1)`.
pub fn retry_delay(attempt: u32, factor: Duration) -> Duration {
    factor * 2u32.saturating_pow(attempt.saturating_sub(1))
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;
    use serde_json::json;

    #[test]
    fn retry_delay_grows_exponentially() {
        let factor = Duration::from_millis(100);
        assert_eq!(retry_delay(1, factor), Duration::from_millis(100));
        assert_eq!(retry_delay(2, factor), Duration::from_millis(200));
        assert_eq!(retry_delay(3, factor), Duration::from_millis(400));
        assert_eq!(retry_delay(4, factor), Duration::from_millis(800));
    }

    #[test]
    fn only_gateway_statuses_are_retryable() {
        assert!(is_retryable_status(502));
        assert!(is_retryable_status(503));
        assert!(is_retryable_status(504));
        assert!(!is_retryable_status(400));
        assert!(!is_retryable_status(404));
        assert!(!is_retryable_status(500));
        assert!(!is_retryable_status(200));
    }

    #[tokio::test]
    async fn run_inference_forwards_payload_and_parses_response() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/sdapi/v1/txt2img")
            .match_body(Matcher::Json(json!({"prompt": "a cat"})))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"images": [], "info": "{}"}"#)
            .create_async()
            .await;

        let api = AutomaticApi::new(format!("{}/sdapi/v1", server.url()));
        let result = api
            .run_inference("txt2img", &json!({"prompt": "a cat"}))
            .await
            .expect("inference should succeed");

        assert!(result["images"].as_array().unwrap().is_empty());
        assert_eq!(result["info"], "{}");
        mock.assert_async().await;
    }

    /// 4xx responses surface immediately and are never retried.
    #[tokio::test]
    async fn client_error_is_not_retried() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/sdapi/v1/txt2img")
            .with_status(400)
            .with_body("bad prompt")
            .expect(1)
            .create_async()
            .await;

        let api = AutomaticApi::new(format!("{}/sdapi/v1", server.url()));
        let err = api
            .run_inference("txt2img", &json!({}))
            .await
            .expect_err("400 should be an error");

        match err {
            AutomaticApiError::ApiError { status, body } => {
                assert_eq!(status, 400);
                assert_eq!(body, "bad prompt");
            }
            other => panic!("unexpected error: {other}"),
        }
        mock.assert_async().await;
    }

    /// Gateway errors are retried until the retry budget runs out, then
    /// the last response is surfaced.
    #[tokio::test]
    async fn gateway_error_exhausts_retry_budget() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/sdapi/v1/txt2img")
            .with_status(503)
            .with_body("upstream not ready")
            .expect(3)
            .create_async()
            .await;

        let api = AutomaticApi::new(format!("{}/sdapi/v1", server.url()))
            .with_retry_policy(2, Duration::from_millis(1));
        let err = api
            .run_inference("txt2img", &json!({}))
            .await
            .expect_err("503 should surface after retries");

        match err {
            AutomaticApiError::ApiError { status, .. } => assert_eq!(status, 503),
            other => panic!("unexpected error: {other}"),
        }
        mock.assert_async().await;
    }
}
