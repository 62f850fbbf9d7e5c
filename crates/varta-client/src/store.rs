//! Shared, lazily opened handle to the local database.
//!
//! Services receive a clone before the database exists; every call made
//! before `open` fails with `ClientError::StoreNotReady`.

use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};

use tracing::info;

use varta_store::{Database, StoreError};

use crate::error::{ClientError, Result};

#[derive(Clone, Default)]
pub struct StoreHandle {
    database: Arc<Mutex<Option<Database>>>,
}

impl StoreHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn open(&self, database: Database) {
        info!(path = ?database.path(), "Store opened");
        *self.database.lock().unwrap_or_else(PoisonError::into_inner) = Some(database);
    }

    /// Open (or create) the database at `path`, or the platform default when `None`.
    pub fn open_path(&self, path: Option<&Path>) -> Result<()> {
        let database = match path {
            Some(path) => Database::open_at(path)?,
            None => Database::new()?,
        };
        self.open(database);
        Ok(())
    }

    pub fn close(&self) {
        self.database.lock().unwrap_or_else(PoisonError::into_inner).take();
    }

    pub fn is_ready(&self) -> bool {
        self.database
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    /// Run `f` against the open database. The lock is released before returning,
    /// so callers must not hold the result across an `.await` expecting the lock.
    pub fn with<T>(&self, f: impl FnOnce(&Database) -> std::result::Result<T, StoreError>) -> Result<T> {
        let guard = self.database.lock().unwrap_or_else(PoisonError::into_inner);
        let database = guard.as_ref().ok_or(ClientError::StoreNotReady)?;
        Ok(f(database)?)
    }
}
