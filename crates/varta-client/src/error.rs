use thiserror::Error;

use varta_net::NetError;
use varta_shared::ProtocolError;
use varta_store::StoreError;

#[derive(Error, Debug)]
pub enum ClientError {
    /// A store operation ran before `StoreHandle::open`.
    #[error("Store not initialised")]
    StoreNotReady,

    #[error("No active session")]
    NoSession,

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Transport error: {0}")]
    Net(#[from] NetError),

    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),
}

pub type Result<T> = std::result::Result<T, ClientError>;
