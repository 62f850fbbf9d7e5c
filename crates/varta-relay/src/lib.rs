//! # varta-relay
//!
//! Stateless relay for VartaSphere clients.
//!
//! Clients hold one WebSocket each. The relay groups connections by room id
//! and forwards frames: envelopes addressed to the signaling room go to every
//! connection, everything else only to that room's group. Nothing is stored
//! and nothing is inspected beyond the routing fields.

pub mod api;
pub mod config;
pub mod error;
pub mod hub;

pub use api::{build_router, serve, serve_listener, AppState};
pub use config::RelayConfig;
pub use error::RelayError;
pub use hub::RelayHub;
