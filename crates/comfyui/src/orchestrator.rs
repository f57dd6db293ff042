//! End-to-end job execution against one ComfyUI server.
//!
//! [`Orchestrator::execute`] uploads an optional input image, submits
//! the job description, and (when tracking) follows the event stream
//! until the prompt finishes, then saves the produced artifacts.

use std::path::{Path, PathBuf};

use tokio_util::sync::CancellationToken;

use crate::api::{ComfyUIApi, ComfyUIApiError};
use crate::client::{ComfyUIClient, ComfyUIClientError};
use crate::fetcher::{ArtifactFetcher, FetchError};
use crate::messages::ArtifactDescriptor;
use crate::processor::{watch, StreamError};
use crate::session::SessionState;

/// Options for one [`Orchestrator::execute`] call.
#[derive(Debug, Clone)]
pub struct ExecuteOptions {
    /// Directory the artifacts are written to.
    pub output_dir: PathBuf,
    /// Image uploaded to the server's input folder before submission.
    pub input_image: Option<PathBuf>,
    /// Follow the event stream until the prompt finishes.
    pub track: bool,
}

/// What [`Orchestrator::execute`] produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Execution {
    /// Submitted without tracking.
    Queued { prompt_id: String },
    /// Tracked to completion; `outputs` are the names of the saved files
    /// in arrival order.
    Finished {
        prompt_id: String,
        outputs: Vec<String>,
    },
}

impl Execution {
    pub fn prompt_id(&self) -> &str {
        match self {
            Self::Queued { prompt_id } | Self::Finished { prompt_id, .. } => prompt_id,
        }
    }
}

/// Errors from [`Orchestrator::execute`]. The first failure wins.
#[derive(Debug, thiserror::Error)]
pub enum ExecuteError {
    #[error("Failed to upload input image: {0}")]
    Upload(#[source] ComfyUIApiError),

    #[error("Failed to submit workflow: {0}")]
    Submit(#[source] ComfyUIApiError),

    #[error(transparent)]
    Connect(#[from] ComfyUIClientError),

    #[error("Event stream failed: {0}")]
    Stream(#[from] StreamError),

    #[error(transparent)]
    Fetch(#[from] FetchError),

    /// The cancellation token fired before the prompt finished.
    #[error("Interrupted while waiting for prompt {prompt_id}")]
    Interrupted { prompt_id: String },
}

/// Composes submission, event tracking and artifact retrieval.
#[derive(Debug, Clone)]
pub struct Orchestrator {
    client: ComfyUIClient,
    api: ComfyUIApi,
    fetcher: ArtifactFetcher,
}

impl Orchestrator {
    pub fn new(client: ComfyUIClient) -> Self {
        let api = ComfyUIApi::new(client.api_url());
        let fetcher = ArtifactFetcher::new(api.clone());
        Self {
            client,
            api,
            fetcher,
        }
    }

    pub fn client(&self) -> &ComfyUIClient {
        &self.client
    }

    /// Submit `job` and, if `options.track` is set, wait for it to finish
    /// and save its artifacts.
    ///
    /// The event stream is opened before submission so that frames the
    /// server emits before the submit call returns are not missed.
    pub async fn execute(
        &self,
        job: &serde_json::Value,
        options: &ExecuteOptions,
        cancel: CancellationToken,
    ) -> Result<Execution, ExecuteError> {
        if let Some(image) = &options.input_image {
            self.api
                .upload_image(image)
                .await
                .map_err(ExecuteError::Upload)?;
        }

        let connection = if options.track {
            Some(self.client.connect().await?)
        } else {
            None
        };

        let submitted = self
            .api
            .submit_workflow(job, self.client.client_id())
            .await
            .map_err(ExecuteError::Submit)?;
        let prompt_id = submitted.prompt_id;
        tracing::info!(
            prompt_id = %prompt_id,
            number = submitted.number,
            client_id = %self.client.client_id(),
            "Workflow submitted to ComfyUI",
        );

        let Some(connection) = connection else {
            return Ok(Execution::Queued { prompt_id });
        };

        let mut collected: Vec<ArtifactDescriptor> = Vec::new();
        let outcome = watch(
            connection.ws_stream,
            Some(prompt_id.clone()),
            cancel,
            |result| collected.extend(result.artifacts.iter().cloned()),
        )
        .await?;

        if outcome.state == SessionState::Interrupted {
            return Err(ExecuteError::Interrupted { prompt_id });
        }

        let written = self.save(&collected, &options.output_dir).await?;
        let outputs: Vec<String> = written
            .iter()
            .filter_map(|path| path.file_name())
            .map(|name| name.to_string_lossy().into_owned())
            .collect();
        tracing::info!(prompt_id = %prompt_id, outputs = ?outputs, "Execution finished");

        Ok(Execution::Finished { prompt_id, outputs })
    }

    /// Follow every frame addressed to this client until `cancel` fires.
    pub async fn observe(&self, cancel: CancellationToken) -> Result<(), ExecuteError> {
        let connection = self.client.connect().await?;
        let mut observed = 0usize;
        let outcome = watch(connection.ws_stream, None, cancel, |result| {
            observed += result.artifacts.len();
            tracing::debug!(
                prompt_id = %result.prompt_id,
                node = %result.node,
                count = result.artifacts.len(),
                "Observed node output",
            );
        })
        .await?;
        tracing::info!(
            state = ?outcome.state,
            artifacts = observed,
            "Stopped watching",
        );
        Ok(())
    }

    async fn save(
        &self,
        artifacts: &[ArtifactDescriptor],
        dir: &Path,
    ) -> Result<Vec<PathBuf>, FetchError> {
        if artifacts.is_empty() {
            tracing::warn!("Prompt finished without image outputs");
            return Ok(Vec::new());
        }
        self.fetcher.save_all(artifacts, dir).await
    }
}
