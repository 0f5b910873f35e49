//! Artifact materialization: decode the base64 images embedded in an
//! inference response and write them to the shared volume.

use std::path::{Path, PathBuf};

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;

/// Subdirectory of the volume root that receives decoded images.
pub const OUTPUT_DIR: &str = "output";

/// Errors from artifact materialization.
#[derive(Debug, thiserror::Error)]
pub enum ArtifactError {
    /// An `images` entry was not a JSON string.
    #[error("images[{index}] is not a string")]
    NotAString { index: usize },

    /// An `images` entry was not valid base64.
    #[error("images[{index}] is not valid base64: {source}")]
    Decode {
        index: usize,
        source: base64::DecodeError,
    },

    /// Creating the output directory or writing a file failed.
    #[error("failed to write artifact: {0}")]
    Io(#[from] std::io::Error),
}

/// Decode `response["images"]` in order and write each entry to
/// `<volume_root>/output/image_<index>.png`.
///
/// Returns the volume-relative paths in index order. A missing `images`
/// key yields an empty list. On failure the files already written by
/// this call are removed best-effort before the error is returned.
pub async fn materialize(
    response: &serde_json::Value,
    volume_root: &Path,
) -> Result<Vec<String>, ArtifactError> {
    let Some(images) = response.get("images").and_then(|v| v.as_array()) else {
        return Ok(Vec::new());
    };

    let output_dir = volume_root.join(OUTPUT_DIR);
    tokio::fs::create_dir_all(&output_dir).await?;

    let mut written: Vec<PathBuf> = Vec::with_capacity(images.len());
    let mut relative: Vec<String> = Vec::with_capacity(images.len());

    for (index, entry) in images.iter().enumerate() {
        match write_image(entry, index, &output_dir).await {
            Ok(path) => {
                written.push(path);
                relative.push(format!("{OUTPUT_DIR}/image_{index}.png"));
            }
            Err(e) => {
                cleanup(&written).await;
                return Err(e);
            }
        }
    }

    Ok(relative)
}

/// Decode one image entry and write it under the output directory.
async fn write_image(
    entry: &serde_json::Value,
    index: usize,
    output_dir: &Path,
) -> Result<PathBuf, ArtifactError> {
    let encoded = entry.as_str().ok_or(ArtifactError::NotAString { index })?;
    let bytes = BASE64
        .decode(encoded)
        .map_err(|source| ArtifactError::Decode { index, source })?;

    let path = output_dir.join(format!("image_{index}.png"));
    tokio::fs::write(&path, bytes).await?;
    Ok(path)
}

/// Best-effort removal of files written earlier in a failed invocation.
async fn cleanup(written: &[PathBuf]) {
    for path in written {
        if let Err(e) = tokio::fs::remove_file(path).await {
            tracing::warn!(path = %path.display(), error = %e, "Failed to clean up partial artifact");
        }
    }
}
