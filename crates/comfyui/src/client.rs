//! Connection configuration and WebSocket client for a ComfyUI server.
//!
//! [`ComfyUIClient`] holds the client identity and the HTTP and
//! WebSocket base URLs for one server. Call [`ComfyUIClient::connect`]
//! to open a live [`ComfyUIConnection`] on the event stream.

use std::fmt;

use tokio_tungstenite::{connect_async, MaybeTlsStream};

/// The raw event stream type produced by [`ComfyUIClient::connect`].
pub type WsStream = tokio_tungstenite::WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

/// Identity sent with every submission and on the stream handshake.
///
/// The server only delivers job-scoped frames to the client that
/// submitted the job, so this value must be the same for the
/// submission and the stream.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ClientId(String);

impl ClientId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// A fresh random identity (UUID v4).
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Transport security for both the HTTP and the WebSocket channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Scheme {
    /// `http://` and `ws://`.
    Plaintext,
    /// `https://` and `wss://`.
    #[default]
    Secure,
}

impl Scheme {
    pub fn from_plaintext(plaintext: bool) -> Self {
        if plaintext {
            Self::Plaintext
        } else {
            Self::Secure
        }
    }

    fn http(self) -> &'static str {
        match self {
            Self::Plaintext => "http",
            Self::Secure => "https",
        }
    }

    fn ws(self) -> &'static str {
        match self {
            Self::Plaintext => "ws",
            Self::Secure => "wss",
        }
    }
}

/// Configuration handle for a ComfyUI server.
#[derive(Debug, Clone)]
pub struct ComfyUIClient {
    client_id: ClientId,
    api_url: String,
    ws_url: String,
}

/// A live event stream connection.
pub struct ComfyUIConnection {
    /// Identity the stream was opened with.
    pub client_id: ClientId,
    /// The raw WebSocket stream for reading/writing frames.
    pub ws_stream: WsStream,
}

impl ComfyUIClient {
    /// Create a client for `host` (e.g. `127.0.0.1:8188`).
    ///
    /// A missing or empty `client_id` is replaced by a generated one,
    /// which then stays fixed for the lifetime of the client.
    pub fn new(host: &str, scheme: Scheme, client_id: Option<String>) -> Self {
        let host = host.trim_end_matches('/');
        Self::from_urls(
            format!("{}://{host}", scheme.http()),
            format!("{}://{host}", scheme.ws()),
            client_id,
        )
    }

    /// Create a client with explicit base URLs.
    ///
    /// * `api_url` - HTTP base URL, e.g. `http://host:8188`.
    /// * `ws_url`  - WebSocket base URL, e.g. `ws://host:8188`.
    pub fn from_urls(
        api_url: impl Into<String>,
        ws_url: impl Into<String>,
        client_id: Option<String>,
    ) -> Self {
        let client_id = match client_id {
            Some(id) if !id.is_empty() => ClientId::new(id),
            _ => ClientId::generate(),
        };
        Self {
            client_id,
            api_url: api_url.into().trim_end_matches('/').to_string(),
            ws_url: ws_url.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn client_id(&self) -> &ClientId {
        &self.client_id
    }

    /// HTTP API base URL (e.g. `http://host:8188`).
    pub fn api_url(&self) -> &str {
        &self.api_url
    }

    /// WebSocket base URL (e.g. `ws://host:8188`).
    pub fn ws_url(&self) -> &str {
        &self.ws_url
    }

    /// Full event stream URL including the form-encoded `clientId` query
    /// parameter.
    pub fn stream_url(&self) -> Result<String, ComfyUIClientError> {
        let url = reqwest::Url::parse_with_params(
            &format!("{}/ws", self.ws_url),
            [("clientId", self.client_id.as_str())],
        )
        .map_err(|e| ComfyUIClientError::InvalidUrl(format!("{}: {e}", self.ws_url)))?;
        Ok(url.into())
    }

    /// Connect to the event stream endpoint.
    pub async fn connect(&self) -> Result<ComfyUIConnection, ComfyUIClientError> {
        let url = self.stream_url()?;

        let (ws_stream, _response) = connect_async(&url).await.map_err(|e| {
            ComfyUIClientError::Connection(format!(
                "Failed to connect to ComfyUI at {}: {e}",
                self.ws_url
            ))
        })?;

        tracing::info!(
            client_id = %self.client_id,
            "Connected to ComfyUI at {}",
            self.ws_url,
        );

        Ok(ComfyUIConnection {
            client_id: self.client_id.clone(),
            ws_stream,
        })
    }
}

/// Errors that can occur when opening the event stream.
#[derive(Debug, thiserror::Error)]
pub enum ComfyUIClientError {
    /// Failed to establish the WebSocket connection.
    #[error("Connection error: {0}")]
    Connection(String),

    /// The WebSocket base URL could not be parsed.
    #[error("Invalid event stream URL: {0}")]
    InvalidUrl(String),
}
