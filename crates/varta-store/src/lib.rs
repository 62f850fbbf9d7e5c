//! # varta-store
//!
//! Local durable storage for the VartaSphere client, backed by SQLite.
//!
//! The store keeps four document collections (`messages`, `rooms`, `clans`,
//! `settings`). Every record is persisted whole as JSON; a handful of columns
//! (room id, timestamp) are copied out so history queries can filter in SQL.
//! The crate exposes a synchronous [`Database`] handle that wraps a
//! `rusqlite::Connection` and provides typed helpers per collection.

pub mod clans;
pub mod database;
pub mod messages;
pub mod migrations;
pub mod rooms;
pub mod settings;

mod error;

pub use database::Database;
pub use error::StoreError;
