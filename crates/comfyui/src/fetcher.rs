//! Output artifact retrieval.
//!
//! [`ArtifactFetcher`] downloads artifacts named by `executed` frames
//! through `GET /view` and writes them into an output directory.

use std::path::{Path, PathBuf};

use crate::api::{ComfyUIApi, ComfyUIApiError};
use crate::messages::ArtifactDescriptor;

/// Errors from downloading or persisting artifacts.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    /// The `/view` request failed.
    #[error("Failed to download {filename}: {source}")]
    Download {
        filename: String,
        #[source]
        source: ComfyUIApiError,
    },

    /// The filename has no usable final path component.
    #[error("Invalid artifact filename '{0}'")]
    InvalidFilename(String),

    #[error("Failed to create output directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Downloads artifacts from one ComfyUI server.
#[derive(Debug, Clone)]
pub struct ArtifactFetcher {
    api: ComfyUIApi,
}

impl ArtifactFetcher {
    pub fn new(api: ComfyUIApi) -> Self {
        Self { api }
    }

    /// Download the bytes of one artifact.
    pub async fn fetch(&self, artifact: &ArtifactDescriptor) -> Result<Vec<u8>, FetchError> {
        self.api
            .view(artifact)
            .await
            .map_err(|source| FetchError::Download {
                filename: artifact.filename.clone(),
                source,
            })
    }

    /// Download every artifact into `dir`, creating it if needed.
    ///
    /// Files are written in order as `dir/<filename>`. The first failure
    /// stops the batch; files already written stay on disk. Returns the
    /// written paths.
    pub async fn save_all(
        &self,
        artifacts: &[ArtifactDescriptor],
        dir: &Path,
    ) -> Result<Vec<PathBuf>, FetchError> {
        tokio::fs::create_dir_all(dir)
            .await
            .map_err(|source| FetchError::CreateDir {
                path: dir.to_path_buf(),
                source,
            })?;

        let mut written = Vec::with_capacity(artifacts.len());
        for artifact in artifacts {
            let path = dir.join(local_name(&artifact.filename)?);
            let bytes = self.fetch(artifact).await?;
            tokio::fs::write(&path, &bytes)
                .await
                .map_err(|source| FetchError::Write {
                    path: path.clone(),
                    source,
                })?;
            tracing::info!(path = %path.display(), bytes = bytes.len(), "Saved artifact");
            written.push(path);
        }
        Ok(written)
    }
}

/// The final path component of a server-supplied filename.
fn local_name(filename: &str) -> Result<&Path, FetchError> {
    Path::new(filename)
        .file_name()
        .map(Path::new)
        .ok_or_else(|| FetchError::InvalidFilename(filename.to_string()))
}
