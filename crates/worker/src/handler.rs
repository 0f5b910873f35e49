//! Job orchestration: forward the job to the WebUI, materialize the
//! returned images, publish one URL per image, shape the response.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use sdworker_automatic::api::{AutomaticApi, AutomaticApiError};
use sdworker_publish::{PublishError, UrlPublisher};

use crate::artifacts::{self, ArtifactError};
use crate::config::EndpointSource;

/// One job document as delivered by the task queue.
#[derive(Debug, Clone, Deserialize)]
pub struct JobRequest {
    /// Endpoint name, honored when [`EndpointSource::Event`] is
    /// configured.
    #[serde(default)]
    pub endpoint: Option<String>,
    /// Opaque payload forwarded verbatim to the WebUI.
    pub input: serde_json::Value,
}

/// Response returned to the task queue.
#[derive(Debug, Serialize)]
pub struct JobOutput {
    /// One fetchable URL per generated image, index-aligned with the
    /// WebUI's image list.
    pub output_urls: Vec<String>,
    /// Generation parameters echoed from the WebUI, when present.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parameters: Option<serde_json::Value>,
    /// Info block echoed from the WebUI, when present.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub info: Option<serde_json::Value>,
    /// The endpoint the job was forwarded to.
    pub endpoint: String,
}

/// Errors from the job-handling chain.
#[derive(Debug, thiserror::Error)]
pub enum HandlerError {
    #[error(transparent)]
    Inference(#[from] AutomaticApiError),

    #[error(transparent)]
    Artifact(#[from] ArtifactError),

    #[error(transparent)]
    Publish(#[from] PublishError),
}

/// Processes one job start-to-finish against a fixed publisher strategy.
pub struct JobHandler {
    api: AutomaticApi,
    publisher: Box<dyn UrlPublisher>,
    volume_root: PathBuf,
    default_endpoint: String,
    endpoint_source: EndpointSource,
}

impl JobHandler {
    pub fn new(
        api: AutomaticApi,
        publisher: Box<dyn UrlPublisher>,
        volume_root: impl Into<PathBuf>,
        default_endpoint: impl Into<String>,
        endpoint_source: EndpointSource,
    ) -> Self {
        Self {
            api,
            publisher,
            volume_root: volume_root.into(),
            default_endpoint: default_endpoint.into(),
            endpoint_source,
        }
    }

    /// Run one job through the whole chain.
    ///
    /// Any failure aborts the job and propagates to the caller; there is
    /// no partial-result recovery beyond the transport-level retry
    /// inside [`AutomaticApi`].
    pub async fn handle(&self, job: JobRequest) -> Result<JobOutput, HandlerError> {
        tracing::debug!(endpoint = ?job.endpoint, input = %job.input, "Handling job");

        let endpoint = resolve_endpoint(&job, self.endpoint_source, &self.default_endpoint);
        let result = self.api.run_inference(&endpoint, &job.input).await?;

        let paths = artifacts::materialize(&result, &self.volume_root).await?;

        let mut output_urls = Vec::with_capacity(paths.len());
        for path in &paths {
            output_urls.push(self.publisher.publish(path).await?);
        }

        Ok(JobOutput {
            output_urls,
            parameters: result.get("parameters").cloned(),
            info: result.get("info").cloned(),
            endpoint,
        })
    }
}

/// Resolve the endpoint name from the configured source, falling back to
/// the default when the selected field is absent.
pub(crate) fn resolve_endpoint(
    job: &JobRequest,
    source: EndpointSource,
    default_endpoint: &str,
) -> String {
    let resolved = match source {
        EndpointSource::Event => job.endpoint.as_deref(),
        EndpointSource::Input => job.input.get("endpoint").and_then(|v| v.as_str()),
    };
    resolved.unwrap_or(default_endpoint).to_string()
}
