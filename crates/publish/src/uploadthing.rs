//! Upload-then-link strategy backed by the uploadthing REST API.
//!
//! Two-step handshake: request upload authorization for the file's
//! metadata, then POST the bytes as multipart form data to the presigned
//! target the service hands back. The returned public file URL has no
//! expiry.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use rand::Rng;
use serde::Deserialize;
use sha2::{Digest, Sha256};

use crate::{ensure_success, placeholder_url, PublishError, UrlPublisher};

/// Default base of the uploadthing REST API.
pub const DEFAULT_API_BASE: &str = "https://api.uploadthing.com";

/// Header carrying the API key.
const API_KEY_HEADER: &str = "x-uploadthing-api-key";

/// URL publisher that uploads artifacts to uploadthing.
pub struct UploadthingPublisher {
    client: reqwest::Client,
    api_base: String,
    volume_root: PathBuf,
    api_key: Option<String>,
}

#[derive(Debug, Deserialize)]
struct UploadFilesResponse {
    data: Vec<UploadTarget>,
}

#[derive(Debug, Deserialize)]
struct UploadTarget {
    /// Presigned upload target.
    url: String,
    /// Form fields that must accompany the upload.
    #[serde(default)]
    fields: HashMap<String, String>,
    /// Public URL of the file once uploaded.
    #[serde(rename = "fileUrl")]
    file_url: String,
}

impl UploadthingPublisher {
    /// Create a publisher with an explicit API key (or none, in which
    /// case every publish returns a placeholder URL).
    pub fn new(
        client: reqwest::Client,
        api_base: String,
        volume_root: impl Into<PathBuf>,
        api_key: Option<String>,
    ) -> Self {
        Self {
            client,
            api_base,
            volume_root: volume_root.into(),
            api_key,
        }
    }

    /// Create a publisher from the environment.
    ///
    /// `UPLOADTHING_API_BASE` overrides the API base; the key comes
    /// from `UPLOADTHING_API_KEY`.
    pub fn from_env(client: reqwest::Client, volume_root: impl Into<PathBuf>) -> Self {
        let api_base =
            std::env::var("UPLOADTHING_API_BASE").unwrap_or_else(|_| DEFAULT_API_BASE.into());
        Self::new(
            client,
            api_base,
            volume_root,
            std::env::var("UPLOADTHING_API_KEY").ok(),
        )
    }
}

#[async_trait::async_trait]
impl UrlPublisher for UploadthingPublisher {
    async fn publish(&self, path: &str) -> Result<String, PublishError> {
        let Some(api_key) = &self.api_key else {
            tracing::debug!(path, "uploadthing API key absent, returning placeholder URL");
            return Ok(placeholder_url(path));
        };

        let bytes = tokio::fs::read(self.volume_root.join(path)).await?;
        let original = Path::new(path)
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or(path);
        let name = upload_name(original);
        let content_type = content_type_for(path);

        let authorize = self
            .client
            .post(format!("{}/v6/uploadFiles", self.api_base))
            .header(API_KEY_HEADER, api_key)
            .json(&serde_json::json!({
                "files": [{ "name": name, "size": bytes.len(), "type": content_type }],
                "contentDisposition": "inline",
            }))
            .send()
            .await?;
        let authorize = ensure_success(authorize).await?;
        let parsed: UploadFilesResponse = authorize.json().await?;
        let target = parsed
            .data
            .into_iter()
            .next()
            .ok_or(PublishError::MissingUploadTarget)?;

        // Presigned POST targets require the form fields ahead of the
        // file part.
        let mut form = reqwest::multipart::Form::new();
        for (key, value) in target.fields {
            form = form.text(key, value);
        }
        let part = reqwest::multipart::Part::bytes(bytes)
            .file_name(name)
            .mime_str(content_type)?;
        form = form.part("file", part);

        let upload = self
            .client
            .post(&target.url)
            .multipart(form)
            .send()
            .await?;
        ensure_success(upload).await?;

        Ok(target.file_url)
    }
}

/// Derive a collision-resistant upload name: a SHA-256 hex digest over a
/// random nonce and the original name, keeping the original extension.
pub fn upload_name(original: &str) -> String {
    let nonce: [u8; 16] = rand::rng().random();

    let mut hasher = Sha256::new();
    hasher.update(nonce);
    hasher.update(original.as_bytes());
    let digest = hasher.finalize();
    let stem = format!("{digest:x}");

    match Path::new(original).extension().and_then(|e| e.to_str()) {
        Some(ext) => format!("{stem}.{ext}"),
        None => stem,
    }
}

/// Guess a MIME type from the file extension.
pub fn content_type_for(path: &str) -> &'static str {
    match Path::new(path).extension().and_then(|e| e.to_str()) {
        Some("png") => "image/png",
        Some("jpg" | "jpeg") => "image/jpeg",
        Some("webp") => "image/webp",
        Some("gif") => "image/gif",
        _ => "application/octet-stream",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::PLACEHOLDER_URL_PREFIX;

    #[test]
    fn upload_name_keeps_extension_and_randomizes_stem() {
        let a = upload_name("image_0.png");
        let b = upload_name("image_0.png");

        assert!(a.ends_with(".png"));
        assert!(b.ends_with(".png"));
        assert_ne!(a, b);
        // 64 hex chars plus ".png".
        assert_eq!(a.len(), 68);
        assert!(a[..64].chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn upload_name_without_extension() {
        let name = upload_name("artifact");
        assert_eq!(name.len(), 64);
        assert!(!name.contains('.'));
    }

    #[test]
    fn content_types_from_extension() {
        assert_eq!(content_type_for("output/image_0.png"), "image/png");
        assert_eq!(content_type_for("a.jpg"), "image/jpeg");
        assert_eq!(content_type_for("a.jpeg"), "image/jpeg");
        assert_eq!(content_type_for("a.webp"), "image/webp");
        assert_eq!(content_type_for("a.bin"), "application/octet-stream");
        assert_eq!(content_type_for("noext"), "application/octet-stream");
    }

    #[tokio::test]
    async fn publish_runs_the_two_step_handshake() {
        let temp = tempfile::tempdir().expect("tempdir");
        std::fs::create_dir_all(temp.path().join("output")).expect("mkdir");
        std::fs::write(temp.path().join("output/image_0.png"), b"png bytes").expect("write");

        let mut server = mockito::Server::new_async().await;
        let authorize = server
            .mock("POST", "/v6/uploadFiles")
            .match_header(API_KEY_HEADER, "sk_test")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(format!(
                r#"{{"data": [{{"url": "{}/upload-target", "fields": {{"key": "abc"}}, "fileUrl": "https://utfs.io/f/abc"}}]}}"#,
                server.url()
            ))
            .create_async()
            .await;
        let upload = server
            .mock("POST", "/upload-target")
            .with_status(204)
            .create_async()
            .await;

        let publisher = UploadthingPublisher::new(
            reqwest::Client::new(),
            server.url(),
            temp.path(),
            Some("sk_test".into()),
        );
        let url = publisher
            .publish("output/image_0.png")
            .await
            .expect("publish should succeed");

        assert_eq!(url, "https://utfs.io/f/abc");
        authorize.assert_async().await;
        upload.assert_async().await;
    }

    #[tokio::test]
    async fn authorization_failure_is_an_error() {
        let temp = tempfile::tempdir().expect("tempdir");
        std::fs::write(temp.path().join("artifact.png"), b"png bytes").expect("write");

        let mut server = mockito::Server::new_async().await;
        let authorize = server
            .mock("POST", "/v6/uploadFiles")
            .with_status(401)
            .with_body("bad key")
            .create_async()
            .await;

        let publisher = UploadthingPublisher::new(
            reqwest::Client::new(),
            server.url(),
            temp.path(),
            Some("sk_bad".into()),
        );
        let err = publisher
            .publish("artifact.png")
            .await
            .expect_err("401 should be an error");

        match err {
            PublishError::Api { status, body } => {
                assert_eq!(status, 401);
                assert_eq!(body, "bad key");
            }
            other => panic!("unexpected error: {other}"),
        }
        authorize.assert_async().await;
    }

    #[tokio::test]
    async fn missing_api_key_falls_back_to_placeholder() {
        let publisher = UploadthingPublisher::new(
            reqwest::Client::new(),
            DEFAULT_API_BASE.into(),
            "/tmp/does-not-matter",
            None,
        );
        let url = publisher.publish("output/image_0.png").await.unwrap();

        assert!(url.starts_with(PLACEHOLDER_URL_PREFIX));
        assert!(url.contains("output/image_0.png"));
    }
}
