//! Interchangeable URL-publishing strategies.
//!
//! Each strategy turns a volume-relative file path into a publicly
//! fetchable URL: a RunPod presigned-URL API call, a locally computed
//! S3-compatible presigned GET, or an uploadthing upload-then-link.
//! Exactly one strategy is active per deployment, selected at startup.
//!
//! When the credentials a strategy needs are absent from the
//! environment it returns a placeholder URL instead of failing, so the
//! pipeline stays runnable in credential-less test and build contexts.

pub mod runpod;
pub mod s3;
pub mod uploadthing;

pub use runpod::RunpodPublisher;
pub use s3::S3Publisher;
pub use uploadthing::UploadthingPublisher;

/// Prefix of the placeholder URLs returned when credentials are absent.
pub const PLACEHOLDER_URL_PREFIX: &str = "https://dummy-url-for-testing";

/// Build the credential-less placeholder URL for a path.
pub(crate) fn placeholder_url(path: &str) -> String {
    format!("{PLACEHOLDER_URL_PREFIX}/{path}")
}

/// Errors from the URL-publishing layer.
#[derive(Debug, thiserror::Error)]
pub enum PublishError {
    /// The HTTP request itself failed (network, DNS, TLS, etc.).
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The remote API returned a non-2xx status code.
    #[error("upload API error ({status}): {body}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Raw response body for debugging.
        body: String,
    },

    /// Reading the artifact from the shared volume failed.
    #[error("failed to read artifact: {0}")]
    Io(#[from] std::io::Error),

    /// Building the presigned request failed.
    #[error("failed to presign request: {0}")]
    Presign(String),

    /// The upload API accepted the request but returned no target.
    #[error("upload API returned no upload target")]
    MissingUploadTarget,
}

/// Turns a volume-relative file path into a fetchable URL.
#[async_trait::async_trait]
pub trait UrlPublisher: Send + Sync {
    /// Publish one artifact and return its URL.
    async fn publish(&self, path: &str) -> Result<String, PublishError>;
}

/// Ensure the response has a success status code. Returns the response
/// unchanged on success, or a [`PublishError::Api`] containing the
/// status and body text on failure.
pub(crate) async fn ensure_success(
    response: reqwest::Response,
) -> Result<reqwest::Response, PublishError> {
    let status = response.status();
    if !status.is_success() {
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "<unreadable body>".to_string());
        return Err(PublishError::Api {
            status: status.as_u16(),
            body,
        });
    }
    Ok(response)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn placeholder_url_keeps_the_path() {
        let url = placeholder_url("output/image_0.png");
        assert!(url.starts_with(PLACEHOLDER_URL_PREFIX));
        assert!(url.ends_with("/output/image_0.png"));
    }
}
