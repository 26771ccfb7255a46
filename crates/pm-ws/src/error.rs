use thiserror::Error;

#[derive(Debug, Error)]
pub enum WsError {
    #[error("failed to connect: {0}")]
    ConnectionFailed(String),

    #[error("connection closed: code={code} reason={reason}")]
    ConnectionClosed { code: u16, reason: String },

    #[error("heartbeat timed out waiting for pong")]
    HeartbeatTimeout,

    #[error("transport error: {0}")]
    Transport(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("malformed frame: {0}")]
    Json(#[from] serde_json::Error),

    #[error("signer error: {0}")]
    Signer(#[from] pm_signer::SignerError),
}

pub type Result<T> = std::result::Result<T, WsError>;
