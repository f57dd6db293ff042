//! Execution tracking state machine.
//!
//! [`TrackingSession`] decides, frame by frame, whether a tracked prompt
//! has finished and which artifacts it produced. It does no I/O; the
//! stream reader in [`crate::processor`] feeds it frames and acts on the
//! returned [`FrameOutcome`].
//!
//! ```text
//! Idle -> Connected -> AwaitingCompletion -> Completed
//!                    \                    \-> Interrupted
//!                     \-> (observation)    \-> Failed
//! ```

use crate::events::NodeResult;
use crate::messages::{ArtifactDescriptor, EventFrame, ExecutingData};

/// Lifecycle of one tracking session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Created, connection not yet open.
    Idle,
    /// Connection open with no target prompt (observation mode).
    Connected,
    /// Connection open, waiting for the target prompt to finish.
    AwaitingCompletion,
    Completed,
    Interrupted,
    Failed,
}

impl SessionState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Interrupted | Self::Failed)
    }

    fn is_open(self) -> bool {
        matches!(self, Self::Connected | Self::AwaitingCompletion)
    }
}

/// Effect of a single frame on the session.
#[derive(Debug, Clone, PartialEq)]
pub enum FrameOutcome {
    /// No state change and nothing to report.
    Ignored,
    /// A node of the tracked prompt produced output.
    Result(NodeResult),
    /// The tracked prompt finished. Emitted at most once.
    Completed,
}

/// One open event stream bound to zero or one awaited prompt.
#[derive(Debug)]
pub struct TrackingSession {
    target: Option<String>,
    state: SessionState,
    artifacts: Vec<ArtifactDescriptor>,
}

impl TrackingSession {
    /// A session waiting for `target`, or observing everything when `None`.
    pub fn new(target: Option<String>) -> Self {
        Self {
            target,
            state: SessionState::Idle,
            artifacts: Vec::new(),
        }
    }

    pub fn target(&self) -> Option<&str> {
        self.target.as_deref()
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Artifacts of the target prompt accumulated so far, in arrival
    /// order. Always empty in observation mode.
    pub fn artifacts(&self) -> &[ArtifactDescriptor] {
        &self.artifacts
    }

    pub fn into_artifacts(self) -> Vec<ArtifactDescriptor> {
        self.artifacts
    }

    /// The connection is open. Moves straight to `AwaitingCompletion`
    /// when there is a target prompt.
    pub fn connected(&mut self) {
        if self.state == SessionState::Idle {
            self.state = if self.target.is_some() {
                SessionState::AwaitingCompletion
            } else {
                SessionState::Connected
            };
        }
    }

    /// Feed one frame to the session.
    ///
    /// Frames are ignored once the session is terminal, and job-scoped
    /// frames for a prompt other than the target are ignored entirely.
    pub fn apply(&mut self, frame: &EventFrame) -> FrameOutcome {
        if !self.state.is_open() {
            return FrameOutcome::Ignored;
        }
        if let (Some(target), Some(prompt_id)) = (self.target.as_deref(), frame.prompt_id()) {
            if target != prompt_id {
                return FrameOutcome::Ignored;
            }
        }

        match frame {
            EventFrame::Executing(ExecutingData { node: None, .. })
                if self.state == SessionState::AwaitingCompletion =>
            {
                self.state = SessionState::Completed;
                FrameOutcome::Completed
            }
            EventFrame::Executed(data) => {
                // Observation mode never ends on its own, so nothing is kept.
                if self.target.is_some() {
                    self.artifacts.extend(data.output.images.iter().cloned());
                }
                FrameOutcome::Result(NodeResult {
                    prompt_id: data.prompt_id.clone(),
                    node: data.node.clone(),
                    artifacts: data.output.images.clone(),
                })
            }
            _ => FrameOutcome::Ignored,
        }
    }

    /// External cancellation. Returns `false` if the session had already
    /// reached a terminal state.
    pub fn interrupt(&mut self) -> bool {
        self.finish(SessionState::Interrupted)
    }

    /// Fatal stream or frame error. Returns `false` if the session had
    /// already reached a terminal state.
    pub fn fail(&mut self) -> bool {
        self.finish(SessionState::Failed)
    }

    fn finish(&mut self, state: SessionState) -> bool {
        if self.state.is_terminal() {
            return false;
        }
        self.state = state;
        true
    }
}
