use thiserror::Error;

use varta_shared::ProtocolError;

#[derive(Error, Debug)]
pub enum NetError {
    #[error("Relay command channel closed")]
    ChannelClosed,

    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("Timed out connecting to {0}")]
    ConnectTimeout(String),

    #[error("Relay handshake failed: {0}")]
    Handshake(String),
}
