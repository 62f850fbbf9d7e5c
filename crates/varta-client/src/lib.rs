//! # varta-client
//!
//! Client core for VartaSphere: the local event bus, discovery, room and
//! messaging services, and the [`ClientHub`] that wires them to the store
//! and the relay link.

pub mod bus;
pub mod config;
pub mod discovery;
pub mod error;
pub mod hub;
pub mod messaging;
pub mod rooms;
pub mod session;
pub mod store;
pub mod tabs;

use tracing_subscriber::{fmt, EnvFilter};

pub use bus::{BusEvent, EventBus, EventKind, Subscription};
pub use config::ClientConfig;
pub use discovery::{Discovery, ResolvedIdentity};
pub use error::ClientError;
pub use hub::ClientHub;
pub use tabs::TabOrigin;

/// Install the `tracing` subscriber for an embedding application.
/// Safe to call more than once; later calls are ignored.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new("varta_client=debug,varta_net=debug,varta_store=info,warn")
    });

    let _ = fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .try_init();
}
