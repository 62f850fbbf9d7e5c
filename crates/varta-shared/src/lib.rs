//! # varta-shared
//!
//! Data model and wire protocol shared by the VartaSphere client crates and
//! the relay: rooms, messages, identities, the signaling sum type and the
//! JSON frames exchanged over the relay socket.

pub mod constants;
pub mod directory;
pub mod error;
pub mod identity;
pub mod ids;
pub mod protocol;
pub mod types;

pub use error::ProtocolError;
