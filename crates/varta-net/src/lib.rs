// Relay transport: one WebSocket link to the relay, room membership
// bookkeeping and automatic reconnection.

pub mod backoff;
pub mod client;
pub mod connection;
pub mod error;
pub mod membership;

#[cfg(any(test, feature = "test-support"))]
pub mod test_support;

pub use backoff::Backoff;
pub use client::{LinkConfig, RelayClient, RelayCommand, RelayNotification};
pub use connection::spawn_relay_client;
pub use error::NetError;
pub use membership::Membership;
