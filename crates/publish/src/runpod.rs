//! Presigned-URL strategy backed by the RunPod volume API.
//!
//! Asks the RunPod REST API to issue a time-limited read URL for a file
//! on the network volume. The volume id scopes the request; a bearer
//! token authenticates it.

use serde::Deserialize;

use crate::{ensure_success, placeholder_url, PublishError, UrlPublisher};

/// Default base of the RunPod v2 REST API.
pub const DEFAULT_API_BASE: &str = "https://api.runpod.io/v2";

/// Credentials for the presigned-URL API.
#[derive(Debug, Clone)]
pub struct RunpodCredentials {
    /// Network volume identifier.
    pub volume_id: String,
    /// API key sent as a bearer token.
    pub api_key: String,
}

impl RunpodCredentials {
    /// Read `RUNPOD_VOLUME_ID` and `RUNPOD_API_KEY` from the
    /// environment. Returns `None` when either is absent.
    pub fn from_env() -> Option<Self> {
        Some(Self {
            volume_id: std::env::var("RUNPOD_VOLUME_ID").ok()?,
            api_key: std::env::var("RUNPOD_API_KEY").ok()?,
        })
    }
}

/// URL publisher that calls the RunPod presigned-URL endpoint.
pub struct RunpodPublisher {
    client: reqwest::Client,
    api_base: String,
    credentials: Option<RunpodCredentials>,
}

#[derive(Debug, Deserialize)]
struct PresignedUrlResponse {
    url: String,
}

impl RunpodPublisher {
    /// Create a publisher with explicit credentials (or none, in which
    /// case every publish returns a placeholder URL).
    pub fn new(
        client: reqwest::Client,
        api_base: String,
        credentials: Option<RunpodCredentials>,
    ) -> Self {
        Self {
            client,
            api_base,
            credentials,
        }
    }

    /// Create a publisher from the environment.
    ///
    /// `RUNPOD_API_BASE` overrides the API base; credentials come from
    /// [`RunpodCredentials::from_env`].
    pub fn from_env(client: reqwest::Client) -> Self {
        let api_base =
            std::env::var("RUNPOD_API_BASE").unwrap_or_else(|_| DEFAULT_API_BASE.into());
        Self::new(client, api_base, RunpodCredentials::from_env())
    }
}

#[async_trait::async_trait]
impl UrlPublisher for RunpodPublisher {
    async fn publish(&self, path: &str) -> Result<String, PublishError> {
        let Some(creds) = &self.credentials else {
            tracing::debug!(path, "RunPod credentials absent, returning placeholder URL");
            return Ok(placeholder_url(path));
        };

        let url = format!(
            "{}/volume/{}/presigned-url",
            self.api_base, creds.volume_id
        );
        let response = self
            .client
            .post(&url)
            .bearer_auth(&creds.api_key)
            .json(&serde_json::json!({ "path": path, "operation": "read" }))
            .send()
            .await?;

        let response = ensure_success(response).await?;
        let parsed: PresignedUrlResponse = response.json().await?;
        Ok(parsed.url)
    }
}
