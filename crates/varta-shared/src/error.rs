use thiserror::Error;

#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Room id '{id}' does not match room type {kind}")]
    PrefixMismatch { id: String, kind: String },

    #[error("Room id '{0}' has no known type prefix")]
    UnknownRoomPrefix(String),

    #[error("Chat messages cannot target the signaling room")]
    ReservedRoom,

    #[error("Frame too large: {size} bytes (max {max})")]
    FrameTooLarge { size: usize, max: usize },
}
