use thiserror::Error;

#[derive(Debug, Error)]
pub enum RealtimeError {
    #[error("realtime socket is not connected")]
    NotConnected,
    #[error("channel {0} is not joined")]
    NotJoined(String),
    #[error("websocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),
    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("initial load failed (HTTP {status}): {body}")]
    Status { status: u16, body: String },
    #[error("malformed change event: {0}")]
    MalformedChange(String),
}
