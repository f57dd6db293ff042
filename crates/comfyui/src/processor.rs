//! Event stream reader task.
//!
//! [`watch`] spawns one reader task per connection. The reader owns the
//! WebSocket, parses each text frame, drives a [`TrackingSession`] and
//! pushes [`SessionSignal`]s onto a bounded channel. The calling task
//! consumes the channel in order, invoking the per-result callback,
//! until the session reaches a terminal state.
//!
//! Cancellation is checked before every frame. On any terminal state
//! the reader sends a normal-closure frame before dropping the socket.

use futures::{Sink, SinkExt, Stream, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tokio_util::sync::CancellationToken;

use crate::events::{NodeResult, SessionEnd, SessionSignal};
use crate::messages::{parse_frame, ArtifactDescriptor, EventFrame, FrameError};
use crate::session::{FrameOutcome, SessionState, TrackingSession};

/// Capacity of the reader-to-caller signal channel.
pub const SIGNAL_CHANNEL_CAPACITY: usize = 64;

/// Errors that end a session in the `Failed` state.
#[derive(Debug, thiserror::Error)]
pub enum StreamError {
    /// A text frame that could not be decoded.
    #[error("Malformed frame: {0}")]
    MalformedFrame(#[from] FrameError),

    /// The transport failed while reading.
    #[error("WebSocket receive error: {0}")]
    Transport(#[from] WsError),

    /// The server closed the stream (or it ended) before a terminal state.
    #[error("Event stream closed before the session finished")]
    ConnectionClosed,

    /// The reader task ended without reporting a terminal state.
    #[error("Event stream reader stopped unexpectedly")]
    ReaderAborted,
}

/// Result of a session that ended without error.
#[derive(Debug)]
pub struct WatchOutcome {
    /// `Completed` or `Interrupted`.
    pub state: SessionState,
    /// Every artifact accepted by the session, in arrival order.
    pub artifacts: Vec<ArtifactDescriptor>,
}

/// Run a tracking session over `ws` until it reaches a terminal state.
///
/// With `target = None` the session only ends on cancellation or error.
/// Dropping the returned future before it resolves cancels the session
/// the same way `cancel` does. `on_result` is called on the calling task once per accepted
/// `executed` frame, in arrival order.
pub async fn watch<S, F>(
    ws: S,
    target: Option<String>,
    cancel: CancellationToken,
    mut on_result: F,
) -> Result<WatchOutcome, StreamError>
where
    S: Stream<Item = Result<Message, WsError>> + Sink<Message, Error = WsError> + Unpin + Send + 'static,
    F: FnMut(&NodeResult),
{
    let (tx, mut rx) = mpsc::channel(SIGNAL_CHANNEL_CAPACITY);
    let session = TrackingSession::new(target);
    // Dropping this future (e.g. under `tokio::time::timeout`) interrupts
    // the reader so it still closes the stream.
    let reader_cancel = cancel.child_token();
    let _interrupt_on_drop = reader_cancel.clone().drop_guard();
    let reader = tokio::spawn(run_reader(ws, session, reader_cancel, tx));

    let mut end = None;
    while let Some(signal) = rx.recv().await {
        match signal {
            SessionSignal::Result(result) => on_result(&result),
            SessionSignal::Finished(finished) => {
                end = Some(finished);
                break;
            }
        }
    }

    if let Err(e) = reader.await {
        tracing::error!(error = %e, "Event stream reader task failed");
    }

    match end {
        Some(SessionEnd::Completed { artifacts }) => Ok(WatchOutcome {
            state: SessionState::Completed,
            artifacts,
        }),
        Some(SessionEnd::Interrupted { artifacts }) => Ok(WatchOutcome {
            state: SessionState::Interrupted,
            artifacts,
        }),
        Some(SessionEnd::Failed(e)) => Err(e),
        None => Err(StreamError::ReaderAborted),
    }
}

/// Reader task body: owns the stream for the whole session.
///
/// Always finishes by sending exactly one [`SessionSignal::Finished`]
/// (unless the receiver is already gone).
pub async fn run_reader<S>(
    mut ws: S,
    mut session: TrackingSession,
    cancel: CancellationToken,
    tx: mpsc::Sender<SessionSignal>,
) where
    S: Stream<Item = Result<Message, WsError>> + Sink<Message, Error = WsError> + Unpin,
{
    session.connected();
    tracing::debug!(target_prompt = ?session.target(), "Event stream session started");

    let failure = loop {
        let msg = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                tracing::info!("Interrupt received, stopping event stream");
                session.interrupt();
                break None;
            }
            msg = ws.next() => msg,
        };

        match msg {
            Some(Ok(Message::Text(text))) => match handle_text(&text, &mut session) {
                Ok(FrameOutcome::Ignored) => {}
                Ok(FrameOutcome::Result(result)) => {
                    tokio::select! {
                        biased;
                        _ = cancel.cancelled() => {
                            tracing::info!("Interrupt received, stopping event stream");
                            session.interrupt();
                            break None;
                        }
                        sent = tx.send(SessionSignal::Result(result)) => {
                            if sent.is_err() {
                                tracing::debug!("Session receiver dropped, stopping event stream");
                                session.interrupt();
                                break None;
                            }
                        }
                    }
                }
                Ok(FrameOutcome::Completed) => break None,
                Err(e) => {
                    tracing::error!(error = %e, raw_message = %text, "Failed to parse ComfyUI message");
                    session.fail();
                    break Some(e);
                }
            },
            Some(Ok(Message::Binary(_))) => {
                // ComfyUI sends binary messages for preview images.
                tracing::trace!("Ignoring binary message (preview image)");
            }
            Some(Ok(Message::Ping(_) | Message::Pong(_))) => {
                // Handled automatically by tungstenite.
            }
            Some(Ok(Message::Close(frame))) => {
                tracing::warn!(?frame, "ComfyUI closed the event stream");
                session.fail();
                break Some(StreamError::ConnectionClosed);
            }
            Some(Ok(Message::Frame(_))) => {}
            Some(Err(e)) => {
                tracing::error!(error = %e, "WebSocket receive error");
                session.fail();
                break Some(StreamError::Transport(e));
            }
            None => {
                tracing::warn!("Event stream exhausted");
                session.fail();
                break Some(StreamError::ConnectionClosed);
            }
        }
    };

    close_stream(&mut ws).await;

    let state = session.state();
    let end = match (state, failure) {
        (SessionState::Completed, _) => SessionEnd::Completed {
            artifacts: session.into_artifacts(),
        },
        (SessionState::Interrupted, _) => SessionEnd::Interrupted {
            artifacts: session.into_artifacts(),
        },
        (_, Some(e)) => SessionEnd::Failed(e),
        (_, None) => SessionEnd::Failed(StreamError::ReaderAborted),
    };
    tracing::debug!(?state, "Event stream session finished");

    let _ = tx.send(SessionSignal::Finished(end)).await;
}

/// Parse one text frame, log it and apply it to the session.
fn handle_text(text: &str, session: &mut TrackingSession) -> Result<FrameOutcome, StreamError> {
    let frame = parse_frame(text)?;
    log_frame(&frame);
    Ok(session.apply(&frame))
}

/// Send a normal-closure frame. Failure is logged, never escalated.
async fn close_stream<S>(ws: &mut S)
where
    S: Sink<Message, Error = WsError> + Unpin,
{
    let close = Message::Close(Some(CloseFrame {
        code: CloseCode::Normal,
        reason: "".into(),
    }));
    if let Err(e) = ws.send(close).await {
        tracing::warn!(error = %e, "Failed to send WebSocket close frame");
    }
}

// ---- frame logging ----

fn log_frame(frame: &EventFrame) {
    match frame {
        EventFrame::ExecutionStart(data) => {
            tracing::info!(prompt_id = %data.prompt_id, "Execution started");
        }
        EventFrame::ExecutionCached(data) => {
            tracing::info!(
                prompt_id = %data.prompt_id,
                nodes = ?data.nodes,
                "Cached nodes skipped",
            );
        }
        EventFrame::Executing(data) => match &data.node {
            Some(node) => {
                tracing::info!(prompt_id = %data.prompt_id, node = %node, "Executing node");
            }
            None => {
                tracing::info!(prompt_id = %data.prompt_id, "Execution finished (all nodes done)");
            }
        },
        EventFrame::Progress(data) => {
            tracing::info!(
                prompt_id = %data.prompt_id,
                node = %data.node,
                value = data.value,
                max = data.max,
                percent = data.percent(),
                "Generation progress",
            );
        }
        EventFrame::Executed(data) => {
            let files: Vec<&str> = data
                .output
                .images
                .iter()
                .map(|a| a.filename.as_str())
                .collect();
            tracing::info!(
                prompt_id = %data.prompt_id,
                node = %data.node,
                outputs = ?files,
                "Node executed with output",
            );
        }
        EventFrame::ExecutionError(data) => {
            tracing::error!(
                prompt_id = %data.prompt_id,
                node_id = %data.node_id,
                error_type = %data.exception_type,
                error_message = %data.exception_message,
                "Execution error",
            );
        }
        EventFrame::Status(data) => {
            tracing::debug!(queue_remaining = ?data.queue_remaining(), "ComfyUI queue status");
        }
        EventFrame::Unknown(kind) => {
            tracing::debug!(kind = %kind, "Ignoring unknown message type");
        }
    }
}
