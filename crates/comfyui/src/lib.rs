//! ComfyUI WebSocket and REST client library.
//!
//! Provides typed frame parsing, the execution tracking state machine,
//! the event stream reader, HTTP API wrappers, artifact retrieval and
//! the orchestrator that ties them together for one job at a time.

pub mod api;
pub mod client;
pub mod events;
pub mod fetcher;
pub mod messages;
pub mod orchestrator;
pub mod processor;
pub mod session;

pub use api::{ComfyUIApi, ComfyUIApiError, SubmitResponse};
pub use client::{ClientId, ComfyUIClient, ComfyUIClientError, ComfyUIConnection, Scheme};
pub use fetcher::{ArtifactFetcher, FetchError};
pub use messages::{parse_frame, ArtifactDescriptor, EventFrame};
pub use orchestrator::{ExecuteError, ExecuteOptions, Execution, Orchestrator};
pub use processor::{watch, StreamError, WatchOutcome};
pub use session::{SessionState, TrackingSession};
