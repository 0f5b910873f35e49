//! S3-compatible presigned-GET strategy.
//!
//! The network volume is exposed as a bucket named after the volume id
//! on an S3-compatible endpoint. Presigning is a pure signature
//! computation over the request parameters, so publishing needs no
//! network round trip once credentials are known.

use std::time::Duration;

use aws_credential_types::Credentials;
use aws_sdk_s3::config::{BehaviorVersion, Region};
use aws_sdk_s3::presigning::PresigningConfig;

use crate::{placeholder_url, PublishError, UrlPublisher};

/// Default signing region of the RunPod S3 API.
pub const DEFAULT_REGION: &str = "EU-RO-1";

/// Default S3-compatible endpoint fronting the network volumes.
pub const DEFAULT_ENDPOINT: &str = "https://s3api-eu-ro-1.runpod.io";

/// Lifetime of an issued presigned GET URL.
pub const URL_EXPIRY: Duration = Duration::from_secs(3600);

/// Credentials and bucket identity for S3-compatible presigning.
#[derive(Debug, Clone)]
pub struct S3Credentials {
    pub access_key_id: String,
    pub secret_access_key: String,
    /// Network volume identifier, used as the bucket name.
    pub volume_id: String,
}

impl S3Credentials {
    /// Read `S3_ACCESS_KEY_ID`, `S3_SECRET_ACCESS_KEY` and
    /// `RUNPOD_VOLUME_ID` from the environment. Returns `None` when any
    /// is absent.
    pub fn from_env() -> Option<Self> {
        Some(Self {
            access_key_id: std::env::var("S3_ACCESS_KEY_ID").ok()?,
            secret_access_key: std::env::var("S3_SECRET_ACCESS_KEY").ok()?,
            volume_id: std::env::var("RUNPOD_VOLUME_ID").ok()?,
        })
    }
}

/// URL publisher that presigns S3 GET requests locally.
pub struct S3Publisher {
    inner: Option<Inner>,
}

struct Inner {
    client: aws_sdk_s3::Client,
    bucket: String,
}

impl S3Publisher {
    /// Create a publisher with explicit credentials (or none, in which
    /// case every publish returns a placeholder URL).
    pub fn new(credentials: Option<S3Credentials>, region: String, endpoint: String) -> Self {
        let inner = credentials.map(|creds| {
            let config = aws_sdk_s3::Config::builder()
                .behavior_version(BehaviorVersion::latest())
                .region(Region::new(region))
                .endpoint_url(endpoint)
                .credentials_provider(Credentials::new(
                    creds.access_key_id,
                    creds.secret_access_key,
                    None,
                    None,
                    "sdworker",
                ))
                .force_path_style(true)
                .build();

            Inner {
                client: aws_sdk_s3::Client::from_conf(config),
                bucket: creds.volume_id,
            }
        });

        Self { inner }
    }

    /// Create a publisher from the environment.
    ///
    /// `S3_REGION` and `S3_ENDPOINT_URL` override the defaults;
    /// credentials come from [`S3Credentials::from_env`].
    pub fn from_env() -> Self {
        let region = std::env::var("S3_REGION").unwrap_or_else(|_| DEFAULT_REGION.into());
        let endpoint =
            std::env::var("S3_ENDPOINT_URL").unwrap_or_else(|_| DEFAULT_ENDPOINT.into());
        Self::new(S3Credentials::from_env(), region, endpoint)
    }
}

#[async_trait::async_trait]
impl UrlPublisher for S3Publisher {
    async fn publish(&self, path: &str) -> Result<String, PublishError> {
        let Some(inner) = &self.inner else {
            tracing::debug!(path, "S3 credentials absent, returning placeholder URL");
            return Ok(placeholder_url(path));
        };

        let presigning = PresigningConfig::expires_in(URL_EXPIRY)
            .map_err(|e| PublishError::Presign(e.to_string()))?;

        let presigned = inner
            .client
            .get_object()
            .bucket(&inner.bucket)
            .key(path)
            .presigned(presigning)
            .await
            .map_err(|e| PublishError::Presign(e.to_string()))?;

        Ok(presigned.uri().to_string())
    }
}
