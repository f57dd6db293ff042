//! REST API client for the ComfyUI HTTP endpoints.
//!
//! Wraps workflow submission (`/prompt`), input image upload
//! (`/upload/image`) and output retrieval (`/view`) using [`reqwest`].

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::client::ClientId;
use crate::messages::ArtifactDescriptor;

/// HTTP client for a single ComfyUI server.
///
/// Cloning is cheap: the underlying [`reqwest::Client`] shares its
/// connection pool between clones.
#[derive(Debug, Clone)]
pub struct ComfyUIApi {
    client: reqwest::Client,
    api_url: String,
}

/// Response returned by the `/prompt` endpoint after queuing a workflow.
#[derive(Debug, Deserialize)]
pub struct SubmitResponse {
    /// Server-assigned identifier for the queued prompt.
    pub prompt_id: String,
    /// Position in the execution queue.
    pub number: i64,
    /// Per-node validation errors, keyed by node id.
    #[serde(default)]
    pub node_errors: serde_json::Value,
}

impl SubmitResponse {
    /// Whether the server reported any per-node validation error.
    pub fn has_node_errors(&self) -> bool {
        match &self.node_errors {
            serde_json::Value::Object(map) => !map.is_empty(),
            serde_json::Value::Array(items) => !items.is_empty(),
            serde_json::Value::Null => false,
            _ => true,
        }
    }
}

/// Errors from the ComfyUI REST API layer.
#[derive(Debug, thiserror::Error)]
pub enum ComfyUIApiError {
    /// The HTTP request itself failed (network, DNS, TLS, etc.).
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// ComfyUI returned a non-2xx status code.
    #[error("ComfyUI API error ({status}): {body}")]
    ApiError {
        /// HTTP status code.
        status: u16,
        /// Raw response body for debugging.
        body: String,
    },

    /// A success response whose body did not have the expected shape.
    #[error("Malformed response from ComfyUI: {0}")]
    MalformedResponse(String),

    /// The server accepted the request but rejected nodes of the workflow.
    #[error("Workflow validation failed: {0}")]
    Validation(serde_json::Value),

    /// A local input file could not be read.
    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl ComfyUIApiError {
    /// Network or status failures, as opposed to content problems.
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Request(_) | Self::ApiError { .. })
    }
}

impl ComfyUIApi {
    /// Create a new API client for a ComfyUI server.
    ///
    /// * `api_url` - Base HTTP URL, e.g. `http://host:8188`.
    pub fn new(api_url: impl Into<String>) -> Self {
        Self::with_client(reqwest::Client::new(), api_url)
    }

    /// Create an API client reusing an existing [`reqwest::Client`].
    pub fn with_client(client: reqwest::Client, api_url: impl Into<String>) -> Self {
        Self {
            client,
            api_url: api_url.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn api_url(&self) -> &str {
        &self.api_url
    }

    /// Submit a workflow for execution.
    ///
    /// Sends `POST /prompt` with the workflow and client ID. A response
    /// carrying node errors is turned into [`ComfyUIApiError::Validation`].
    pub async fn submit_workflow(
        &self,
        workflow: &serde_json::Value,
        client_id: &ClientId,
    ) -> Result<SubmitResponse, ComfyUIApiError> {
        let body = serde_json::json!({
            "prompt": workflow,
            "client_id": client_id.as_str(),
        });

        let response = self
            .client
            .post(format!("{}/prompt", self.api_url))
            .json(&body)
            .send()
            .await?;

        let submitted: SubmitResponse = Self::parse_response(response).await?;
        if submitted.has_node_errors() {
            return Err(ComfyUIApiError::Validation(submitted.node_errors));
        }

        tracing::debug!(
            prompt_id = %submitted.prompt_id,
            number = submitted.number,
            "Workflow queued",
        );
        Ok(submitted)
    }

    /// Upload a local image into the server's input folder.
    ///
    /// Sends a multipart `POST /upload/image` with `type=input`,
    /// `overwrite=true` and the file as the `image` part.
    pub async fn upload_image(&self, path: &Path) -> Result<(), ComfyUIApiError> {
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|source| ComfyUIApiError::Io {
                path: path.to_path_buf(),
                source,
            })?;
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "image".to_string());

        let part = reqwest::multipart::Part::bytes(bytes).file_name(file_name.clone());
        let form = reqwest::multipart::Form::new()
            .text("type", "input")
            .text("overwrite", "true")
            .part("image", part);

        let response = self
            .client
            .post(format!("{}/upload/image", self.api_url))
            .multipart(form)
            .send()
            .await?;

        Self::check_status(response).await?;
        tracing::info!(file = %file_name, "Uploaded input image");
        Ok(())
    }

    /// Download the raw bytes of one output artifact via `GET /view`.
    pub async fn view(&self, artifact: &ArtifactDescriptor) -> Result<Vec<u8>, ComfyUIApiError> {
        let response = self
            .client
            .get(format!("{}/view", self.api_url))
            .query(&[
                ("filename", artifact.filename.as_str()),
                ("subfolder", artifact.subfolder.as_str()),
                ("type", artifact.kind.as_str()),
            ])
            .send()
            .await?;

        let response = Self::ensure_success(response).await?;
        Ok(response.bytes().await?.to_vec())
    }

    // ---- private helpers ----

    /// Ensure the response has a success status code. Returns the
    /// response unchanged on success, or a [`ComfyUIApiError::ApiError`]
    /// containing the status and body text on failure.
    async fn ensure_success(
        response: reqwest::Response,
    ) -> Result<reqwest::Response, ComfyUIApiError> {
        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            return Err(ComfyUIApiError::ApiError {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response)
    }

    /// Parse a successful JSON response body into the expected type.
    async fn parse_response<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, ComfyUIApiError> {
        let response = Self::ensure_success(response).await?;
        let body = response.text().await?;
        serde_json::from_str(&body)
            .map_err(|e| ComfyUIApiError::MalformedResponse(format!("{e}; body: {body}")))
    }

    /// Assert the response has a success status code, discarding the body.
    async fn check_status(response: reqwest::Response) -> Result<(), ComfyUIApiError> {
        Self::ensure_success(response).await?;
        Ok(())
    }
}
