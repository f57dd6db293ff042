//! Signals passed from the stream reader task to the waiting caller.
//!
//! The reader owns the connection and pushes these onto a bounded
//! channel in frame-arrival order. The last signal of every session is
//! [`SessionSignal::Finished`].

use crate::messages::ArtifactDescriptor;
use crate::processor::StreamError;

/// Output of one `executed` frame accepted by the session.
#[derive(Debug, Clone, PartialEq)]
pub struct NodeResult {
    pub prompt_id: String,
    /// The node that produced this output.
    pub node: String,
    /// Artifacts from this frame only.
    pub artifacts: Vec<ArtifactDescriptor>,
}

/// How a session ended.
#[derive(Debug)]
pub enum SessionEnd {
    /// The target prompt finished.
    Completed { artifacts: Vec<ArtifactDescriptor> },
    /// The cancellation token fired first.
    Interrupted { artifacts: Vec<ArtifactDescriptor> },
    /// A fatal frame or transport error.
    Failed(StreamError),
}

/// A message on the reader-to-caller channel.
#[derive(Debug)]
pub enum SessionSignal {
    Result(NodeResult),
    Finished(SessionEnd),
}
