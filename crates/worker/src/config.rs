//! Worker configuration loaded from environment variables.

use std::path::PathBuf;

use sdworker_automatic::api::DEFAULT_API_URL;

/// Default mount point of the shared network volume.
pub const DEFAULT_VOLUME_ROOT: &str = "/runpod-volume";

/// Default WebUI endpoint when a job names none.
pub const DEFAULT_ENDPOINT: &str = "txt2img";

/// Where the handler reads the endpoint name from on an inbound job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndpointSource {
    /// Top-level `endpoint` field of the job document.
    Event,
    /// `endpoint` field nested inside the job's `input`.
    Input,
}

impl EndpointSource {
    /// Parse the `ENDPOINT_SOURCE` value.
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "event" => Some(Self::Event),
            "input" => Some(Self::Input),
            _ => None,
        }
    }
}

/// Which URL-publishing strategy backs this deployment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishBackend {
    /// RunPod presigned-URL API.
    Runpod,
    /// Locally computed S3-compatible presigned GET.
    S3,
    /// uploadthing upload-then-link.
    Uploadthing,
}

impl PublishBackend {
    /// Parse the `PUBLISH_BACKEND` value.
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "runpod" => Some(Self::Runpod),
            "s3" => Some(Self::S3),
            "uploadthing" => Some(Self::Uploadthing),
            _ => None,
        }
    }
}

/// Worker configuration loaded from environment variables.
///
/// All fields have defaults suitable for a standard RunPod deployment.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Base URL of the local WebUI API.
    pub api_url: String,
    /// Mount point of the shared volume that receives artifacts.
    pub volume_root: PathBuf,
    /// Endpoint used when a job names none.
    pub default_endpoint: String,
    /// Where the endpoint name is read from on inbound jobs.
    pub endpoint_source: EndpointSource,
    /// Active URL-publishing strategy.
    pub publish_backend: PublishBackend,
}

impl WorkerConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var            | Default                         |
    /// |--------------------|---------------------------------|
    /// | `AUTOMATIC_API_URL`| `http://127.0.0.1:3000/sdapi/v1`|
    /// | `VOLUME_ROOT`      | `/runpod-volume`                |
    /// | `DEFAULT_ENDPOINT` | `txt2img`                       |
    /// | `ENDPOINT_SOURCE`  | `event` (or `input`)            |
    /// | `PUBLISH_BACKEND`  | `runpod` (or `s3`, `uploadthing`)|
    pub fn from_env() -> Self {
        let api_url =
            std::env::var("AUTOMATIC_API_URL").unwrap_or_else(|_| DEFAULT_API_URL.into());

        let volume_root: PathBuf = std::env::var("VOLUME_ROOT")
            .unwrap_or_else(|_| DEFAULT_VOLUME_ROOT.into())
            .into();

        let default_endpoint =
            std::env::var("DEFAULT_ENDPOINT").unwrap_or_else(|_| DEFAULT_ENDPOINT.into());

        let endpoint_source = std::env::var("ENDPOINT_SOURCE")
            .map(|v| {
                EndpointSource::parse(&v)
                    .unwrap_or_else(|| panic!("ENDPOINT_SOURCE must be 'event' or 'input', got '{v}'"))
            })
            .unwrap_or(EndpointSource::Event);

        let publish_backend = std::env::var("PUBLISH_BACKEND")
            .map(|v| {
                PublishBackend::parse(&v).unwrap_or_else(|| {
                    panic!("PUBLISH_BACKEND must be 'runpod', 's3' or 'uploadthing', got '{v}'")
                })
            })
            .unwrap_or(PublishBackend::Runpod);

        Self {
            api_url,
            volume_root,
            default_endpoint,
            endpoint_source,
            publish_backend,
        }
    }
}
