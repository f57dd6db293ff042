//! Shared helpers for the integration tests: a loopback WebSocket server
//! that replays scripted frames and reports what the client sent back.

#![allow(dead_code)]

use futures::{SinkExt, StreamExt};
use serde_json::json;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::Message;

/// What the server does once every scripted frame has been sent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AfterFrames {
    /// Keep the connection open until the client goes away.
    Wait,
    /// Close the connection from the server side.
    Close,
    /// Drop the TCP connection without a closing handshake.
    Drop,
}

/// What the server observed during the session.
#[derive(Debug, Default)]
pub struct ServerReport {
    /// Request URI of the WebSocket handshake (path and query).
    pub request_uri: String,
    /// Number of close frames received from the client.
    pub close_frames: usize,
}

/// Start a one-shot WebSocket server on a random local port.
///
/// Returns the `ws://` base URL and a handle resolving to the report
/// once the connection ends.
pub async fn spawn_ws_server(
    frames: Vec<Message>,
    after: AfterFrames,
) -> (String, JoinHandle<ServerReport>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let handle = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut report = ServerReport::default();

        let mut request_uri = String::new();
        let callback = |req: &Request, resp: Response| {
            request_uri = req.uri().to_string();
            Ok::<Response, ErrorResponse>(resp)
        };
        let mut ws = tokio_tungstenite::accept_hdr_async(stream, callback)
            .await
            .unwrap();
        report.request_uri = request_uri;

        for frame in frames {
            if ws.send(frame).await.is_err() {
                return report;
            }
        }

        match after {
            AfterFrames::Wait => {}
            AfterFrames::Close => {
                let _ = ws.close(None).await;
            }
            AfterFrames::Drop => {
                drop(ws);
                return report;
            }
        }

        while let Some(msg) = ws.next().await {
            match msg {
                Ok(Message::Close(_)) => report.close_frames += 1,
                Ok(_) => {}
                Err(_) => break,
            }
        }
        report
    });

    (format!("ws://{addr}"), handle)
}

pub fn text(value: serde_json::Value) -> Message {
    Message::Text(value.to_string())
}

pub fn execution_start(prompt_id: &str) -> Message {
    text(json!({"type": "execution_start", "data": {"prompt_id": prompt_id}}))
}

pub fn executing(node: Option<&str>, prompt_id: &str) -> Message {
    text(json!({"type": "executing", "data": {"node": node, "prompt_id": prompt_id}}))
}

pub fn progress(value: i64, max: i64, node: &str, prompt_id: &str) -> Message {
    text(json!({
        "type": "progress",
        "data": {"value": value, "max": max, "node": node, "prompt_id": prompt_id}
    }))
}

pub fn executed(prompt_id: &str, files: &[&str]) -> Message {
    let images: Vec<_> = files
        .iter()
        .map(|f| json!({"filename": f, "subfolder": "", "type": "output"}))
        .collect();
    text(json!({
        "type": "executed",
        "data": {"node": "9", "output": {"images": images}, "prompt_id": prompt_id}
    }))
}

pub fn status(queue_remaining: i64) -> Message {
    text(json!({
        "type": "status",
        "data": {"status": {"exec_info": {"queue_remaining": queue_remaining}}, "sid": "s"}
    }))
}
