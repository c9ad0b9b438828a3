//! Client error types.

use gavel_core::IntentError;

/// A transport failed to open or broke mid-session.
///
/// The connection manager never reports these to callers; they only decide
/// when the next reconnect attempt happens.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("connection refused: {0}")]
    Refused(String),
    #[error("connection closed by peer")]
    Closed,
    #[error("websocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),
}

/// Error returned to users of [`AuctionClient`](crate::AuctionClient).
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error(transparent)]
    Intent(#[from] IntentError),
    #[error("failed to encode intent: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("connection manager has stopped")]
    ManagerStopped,
}
