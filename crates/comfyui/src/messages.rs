//! ComfyUI WebSocket message types and parser.
//!
//! ComfyUI sends JSON messages over WebSocket with the shape
//! `{"type": "<kind>", "data": {...}}`. Parsing is done in two steps:
//! the envelope is read first, then `data` is decoded into the payload
//! struct selected by `type`. Tags this client does not know become
//! [`EventFrame::Unknown`] so that new server message kinds never break
//! a session.

use serde::de::{self, DeserializeOwned};
use serde::{Deserialize, Deserializer};

pub const TYPE_STATUS: &str = "status";
pub const TYPE_EXECUTION_START: &str = "execution_start";
pub const TYPE_EXECUTION_CACHED: &str = "execution_cached";
pub const TYPE_EXECUTING: &str = "executing";
pub const TYPE_PROGRESS: &str = "progress";
pub const TYPE_EXECUTED: &str = "executed";
pub const TYPE_EXECUTION_ERROR: &str = "execution_error";

/// One frame received on the event stream.
#[derive(Debug, Clone, PartialEq)]
pub enum EventFrame {
    /// Server status broadcast (queue depth, etc.).
    Status(StatusData),

    /// A prompt has started executing.
    ExecutionStart(ExecutionStartData),

    /// Some nodes were skipped because their outputs are cached.
    ExecutionCached(ExecutionCachedData),

    /// A specific node is currently executing (or execution finished when `node` is `None`).
    Executing(ExecutingData),

    /// Progress update from a long-running node (e.g. KSampler).
    Progress(ProgressData),

    /// A node has finished and produced output.
    Executed(ExecutedData),

    /// A node raised an error.
    ExecutionError(ErrorData),

    /// Any other `type`, kept by name only.
    Unknown(String),
}

impl EventFrame {
    /// The `type` tag this frame was decoded from.
    pub fn kind(&self) -> &str {
        match self {
            Self::Status(_) => TYPE_STATUS,
            Self::ExecutionStart(_) => TYPE_EXECUTION_START,
            Self::ExecutionCached(_) => TYPE_EXECUTION_CACHED,
            Self::Executing(_) => TYPE_EXECUTING,
            Self::Progress(_) => TYPE_PROGRESS,
            Self::Executed(_) => TYPE_EXECUTED,
            Self::ExecutionError(_) => TYPE_EXECUTION_ERROR,
            Self::Unknown(kind) => kind.as_str(),
        }
    }

    /// The prompt this frame belongs to, for job-scoped frames.
    pub fn prompt_id(&self) -> Option<&str> {
        match self {
            Self::ExecutionStart(d) => Some(&d.prompt_id),
            Self::ExecutionCached(d) => Some(&d.prompt_id),
            Self::Executing(d) => Some(&d.prompt_id),
            Self::Progress(d) => Some(&d.prompt_id),
            Self::Executed(d) => Some(&d.prompt_id),
            Self::ExecutionError(d) => Some(&d.prompt_id),
            Self::Status(_) | Self::Unknown(_) => None,
        }
    }
}

/// Queue status information. Every field is optional; status frames are
/// only a liveness signal.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct StatusData {
    #[serde(default)]
    pub status: Option<QueueStatus>,
    /// Session id the server assigned to this socket.
    #[serde(default)]
    pub sid: Option<String>,
}

impl StatusData {
    pub fn queue_remaining(&self) -> Option<i64> {
        self.status.as_ref()?.exec_info.queue_remaining
    }
}

/// Current queue state.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct QueueStatus {
    #[serde(default)]
    pub exec_info: ExecInfo,
}

/// Execution queue statistics.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ExecInfo {
    #[serde(default)]
    pub queue_remaining: Option<i64>,
}

/// Payload for `execution_start` messages.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ExecutionStartData {
    pub prompt_id: String,
}

/// Payload for `execution_cached` messages.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ExecutionCachedData {
    /// Node IDs whose outputs were served from cache.
    pub nodes: Vec<String>,
    pub prompt_id: String,
}

/// Payload for `executing` messages.
///
/// When `node` is `None`, execution of the prompt has completed.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ExecutingData {
    #[serde(default)]
    pub node: Option<String>,
    pub prompt_id: String,
}

/// Payload for `progress` messages (step-level progress within a node).
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ProgressData {
    /// Current step number.
    #[serde(deserialize_with = "step_count")]
    pub value: i64,
    /// Total number of steps.
    #[serde(deserialize_with = "step_count")]
    pub max: i64,
    pub node: String,
    pub prompt_id: String,
}

impl ProgressData {
    /// Completion percentage (0-100); 0 when `max` is not positive.
    pub fn percent(&self) -> i16 {
        if self.max > 0 {
            ((self.value as f64 / self.max as f64) * 100.0).clamp(0.0, 100.0) as i16
        } else {
            0
        }
    }
}

/// Step counts arrive as integers or floats; floats are truncated.
fn step_count<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    let n = serde_json::Number::deserialize(deserializer)?;
    n.as_i64()
        .or_else(|| n.as_f64().map(|f| f as i64))
        .ok_or_else(|| de::Error::custom(format!("step count out of range: {n}")))
}

/// Payload for `executed` messages (node output).
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ExecutedData {
    /// The node that produced this output.
    pub node: String,
    pub output: NodeOutput,
    pub prompt_id: String,
}

/// The output block of an `executed` message. Only image outputs are
/// retrievable artifacts; other keys are ignored.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct NodeOutput {
    #[serde(default)]
    pub images: Vec<ArtifactDescriptor>,
}

/// Retrieval key for one output file.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Deserialize)]
pub struct ArtifactDescriptor {
    pub filename: String,
    #[serde(default)]
    pub subfolder: String,
    /// Storage kind on the server (`output`, `temp`, `input`).
    #[serde(rename = "type", default)]
    pub kind: String,
}

impl ArtifactDescriptor {
    pub fn new(
        filename: impl Into<String>,
        subfolder: impl Into<String>,
        kind: impl Into<String>,
    ) -> Self {
        Self {
            filename: filename.into(),
            subfolder: subfolder.into(),
            kind: kind.into(),
        }
    }
}

/// Payload for `execution_error` messages.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ErrorData {
    pub prompt_id: String,
    #[serde(default)]
    pub node_id: String,
    #[serde(default)]
    pub exception_message: String,
    #[serde(default)]
    pub exception_type: String,
}

/// Raw `{type, data}` envelope.
#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    data: serde_json::Value,
}

/// Why a text frame could not be turned into an [`EventFrame`].
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// Not JSON, or no string `type` field.
    #[error("invalid frame envelope: {0}")]
    Envelope(#[source] serde_json::Error),

    /// A known `type` whose `data` is missing a required field.
    #[error("invalid '{kind}' payload: {source}")]
    Payload {
        kind: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Parse a ComfyUI WebSocket text message into a typed frame.
///
/// Unknown `type` values are returned as [`EventFrame::Unknown`], not as
/// errors. Malformed JSON and missing required fields are errors.
pub fn parse_frame(text: &str) -> Result<EventFrame, FrameError> {
    let envelope: Envelope = serde_json::from_str(text).map_err(FrameError::Envelope)?;
    let Envelope { kind, data } = envelope;

    let frame = match kind.as_str() {
        TYPE_STATUS => EventFrame::Status(serde_json::from_value(data).unwrap_or_default()),
        TYPE_EXECUTION_START => EventFrame::ExecutionStart(payload(&kind, data)?),
        TYPE_EXECUTION_CACHED => EventFrame::ExecutionCached(payload(&kind, data)?),
        TYPE_EXECUTING => EventFrame::Executing(payload(&kind, data)?),
        TYPE_PROGRESS => EventFrame::Progress(payload(&kind, data)?),
        TYPE_EXECUTED => EventFrame::Executed(payload(&kind, data)?),
        TYPE_EXECUTION_ERROR => EventFrame::ExecutionError(payload(&kind, data)?),
        _ => EventFrame::Unknown(kind),
    };
    Ok(frame)
}

fn payload<T: DeserializeOwned>(kind: &str, data: serde_json::Value) -> Result<T, FrameError> {
    serde_json::from_value(data).map_err(|source| FrameError::Payload {
        kind: kind.to_string(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn parse_status_message() {
        let json = r#"{"type":"status","data":{"status":{"exec_info":{"queue_remaining":3}},"sid":"s1"}}"#;
        let msg = parse_frame(json).unwrap();
        match msg {
            EventFrame::Status(data) => {
                assert_eq!(data.queue_remaining(), Some(3));
                assert_eq!(data.sid.as_deref(), Some("s1"));
            }
            other => panic!("Expected Status, got {other:?}"),
        }
    }

    #[test]
    fn odd_status_payload_still_parses() {
        let msg = parse_frame(r#"{"type":"status","data":"weird"}"#).unwrap();
        assert_matches!(msg, EventFrame::Status(data) if data.queue_remaining().is_none());
    }

    #[test]
    fn parse_execution_start_message() {
        let json = r#"{"type":"execution_start","data":{"prompt_id":"abc-123","timestamp":1}}"#;
        let msg = parse_frame(json).unwrap();
        match msg {
            EventFrame::ExecutionStart(data) => {
                assert_eq!(data.prompt_id, "abc-123");
            }
            other => panic!("Expected ExecutionStart, got {other:?}"),
        }
    }

    #[test]
    fn parse_execution_cached_message() {
        let json =
            r#"{"type":"execution_cached","data":{"prompt_id":"abc","nodes":["1","2","3"]}}"#;
        let msg = parse_frame(json).unwrap();
        match msg {
            EventFrame::ExecutionCached(data) => {
                assert_eq!(data.prompt_id, "abc");
                assert_eq!(data.nodes, vec!["1", "2", "3"]);
            }
            other => panic!("Expected ExecutionCached, got {other:?}"),
        }
    }

    #[test]
    fn execution_cached_without_nodes_is_malformed() {
        let json = r#"{"type":"execution_cached","data":{"prompt_id":"abc"}}"#;
        let err = parse_frame(json).unwrap_err();
        assert_matches!(err, FrameError::Payload { kind, .. } if kind == "execution_cached");
    }

    #[test]
    fn parse_executing_with_node() {
        let json = r#"{"type":"executing","data":{"node":"42","display_node":"42","prompt_id":"xyz"}}"#;
        let msg = parse_frame(json).unwrap();
        match msg {
            EventFrame::Executing(data) => {
                assert_eq!(data.node.as_deref(), Some("42"));
                assert_eq!(data.prompt_id, "xyz");
            }
            other => panic!("Expected Executing, got {other:?}"),
        }
    }

    #[test]
    fn parse_executing_finished() {
        let json = r#"{"type":"executing","data":{"node":null,"prompt_id":"xyz"}}"#;
        let msg = parse_frame(json).unwrap();
        assert_matches!(msg, EventFrame::Executing(ExecutingData { node: None, .. }));
    }

    #[test]
    fn executing_without_node_field_is_finished() {
        let json = r#"{"type":"executing","data":{"prompt_id":"xyz"}}"#;
        let msg = parse_frame(json).unwrap();
        assert_matches!(msg, EventFrame::Executing(ExecutingData { node: None, .. }));
    }

    #[test]
    fn executing_without_prompt_id_is_malformed() {
        let json = r#"{"type":"executing","data":{"node":null}}"#;
        assert_matches!(parse_frame(json), Err(FrameError::Payload { .. }));
    }

    #[test]
    fn parse_progress_message() {
        let json = r#"{"type":"progress","data":{"value":5,"max":20,"node":"3","prompt_id":"p"}}"#;
        let msg = parse_frame(json).unwrap();
        match msg {
            EventFrame::Progress(data) => {
                assert_eq!(data.value, 5);
                assert_eq!(data.max, 20);
                assert_eq!(data.node, "3");
                assert_eq!(data.percent(), 25);
            }
            other => panic!("Expected Progress, got {other:?}"),
        }
    }

    #[test]
    fn progress_with_float_steps_is_truncated() {
        let json = r#"{"type":"progress","data":{"value":5.0,"max":10.7,"node":"3","prompt_id":"p1"}}"#;
        match parse_frame(json).unwrap() {
            EventFrame::Progress(data) => {
                assert_eq!(data.value, 5);
                assert_eq!(data.max, 10);
                assert_eq!(data.percent(), 50);
                assert_eq!(data.prompt_id, "p1");
            }
            other => panic!("Expected Progress, got {other:?}"),
        }
    }

    #[test]
    fn progress_with_text_step_is_malformed() {
        let json = r#"{"type":"progress","data":{"value":"5","max":10,"node":"3","prompt_id":"p1"}}"#;
        assert_matches!(parse_frame(json), Err(FrameError::Payload { kind, .. }) if kind == "progress");
    }

    #[test]
    fn progress_percent_with_zero_max() {
        let data = ProgressData {
            value: 3,
            max: 0,
            node: "1".into(),
            prompt_id: "p".into(),
        };
        assert_eq!(data.percent(), 0);
    }

    #[test]
    fn parse_executed_message() {
        let json = r#"{"type":"executed","data":{"node":"9","output":{"images":[{"filename":"out.png","subfolder":"","type":"output"}]},"prompt_id":"abc"}}"#;
        let msg = parse_frame(json).unwrap();
        match msg {
            EventFrame::Executed(data) => {
                assert_eq!(data.node, "9");
                assert_eq!(data.prompt_id, "abc");
                assert_eq!(
                    data.output.images,
                    vec![ArtifactDescriptor::new("out.png", "", "output")]
                );
            }
            other => panic!("Expected Executed, got {other:?}"),
        }
    }

    #[test]
    fn executed_without_images_has_no_artifacts() {
        let json = r#"{"type":"executed","data":{"node":"9","output":{"text":["hi"]},"prompt_id":"abc"}}"#;
        let msg = parse_frame(json).unwrap();
        assert_matches!(msg, EventFrame::Executed(data) if data.output.images.is_empty());
    }

    #[test]
    fn artifact_defaults_missing_subfolder_and_type() {
        let json = r#"{"type":"executed","data":{"node":"9","output":{"images":[{"filename":"x.png"}]},"prompt_id":"abc"}}"#;
        let msg = parse_frame(json).unwrap();
        assert_matches!(msg, EventFrame::Executed(data) => {
            assert_eq!(data.output.images[0], ArtifactDescriptor::new("x.png", "", ""));
        });
    }

    #[test]
    fn parse_execution_error_message() {
        let json = r#"{"type":"execution_error","data":{"prompt_id":"abc","node_id":"5","exception_message":"out of memory","exception_type":"RuntimeError"}}"#;
        let msg = parse_frame(json).unwrap();
        match msg {
            EventFrame::ExecutionError(data) => {
                assert_eq!(data.prompt_id, "abc");
                assert_eq!(data.node_id, "5");
                assert_eq!(data.exception_message, "out of memory");
                assert_eq!(data.exception_type, "RuntimeError");
            }
            other => panic!("Expected ExecutionError, got {other:?}"),
        }
    }

    #[test]
    fn unknown_type_is_kept_by_name() {
        let json = r#"{"type":"crystools.monitor","data":{"cpu":3}}"#;
        let msg = parse_frame(json).unwrap();
        assert_eq!(msg, EventFrame::Unknown("crystools.monitor".into()));
        assert_eq!(msg.kind(), "crystools.monitor");
        assert!(msg.prompt_id().is_none());
    }

    #[test]
    fn unknown_type_without_data_is_accepted() {
        assert_matches!(
            parse_frame(r#"{"type":"something_new"}"#),
            Ok(EventFrame::Unknown(_))
        );
    }

    #[test]
    fn parse_invalid_json_returns_error() {
        assert_matches!(parse_frame("not json at all"), Err(FrameError::Envelope(_)));
    }

    #[test]
    fn missing_type_returns_error() {
        assert_matches!(parse_frame(r#"{"data":{}}"#), Err(FrameError::Envelope(_)));
    }
}
