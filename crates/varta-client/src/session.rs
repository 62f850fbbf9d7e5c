//! Login state: the current identity and the persisted UI theme.

use std::sync::{Arc, PoisonError, RwLock};

use tracing::info;

use varta_shared::constants::{DEFAULT_THEME, SETTING_SESSION_IDENTITY, SETTING_THEME};
use varta_shared::identity::Identity;

use crate::bus::{BusEvent, EventBus};
use crate::error::Result;
use crate::store::StoreHandle;

/// The identity this client speaks as, shared by every service.
#[derive(Debug, Clone, Default)]
pub struct CurrentIdentity {
    inner: Arc<RwLock<Option<Identity>>>,
}

impl CurrentIdentity {
    pub fn get(&self) -> Option<Identity> {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Stable id of the current identity.
    pub fn id(&self) -> Option<String> {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map(|identity| identity.id.clone())
    }

    pub fn is(&self, id: &str) -> bool {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_some_and(|identity| identity.id == id)
    }

    pub(crate) fn set(&self, identity: Option<Identity>) {
        *self.inner.write().unwrap_or_else(PoisonError::into_inner) = identity;
    }
}

#[derive(Clone)]
pub struct SessionService {
    store: StoreHandle,
    current: CurrentIdentity,
    bus: EventBus,
}

impl SessionService {
    pub fn new(store: StoreHandle, current: CurrentIdentity, bus: EventBus) -> Self {
        Self {
            store,
            current,
            bus,
        }
    }

    /// Create a fresh identity and make it the session.
    pub fn login(&self, name: &str, avatar: &str, position: &str) -> Result<Identity> {
        let identity = Identity::generate(name, avatar, position);
        self.adopt(identity.clone())?;
        Ok(identity)
    }

    /// Make an existing identity the session (e.g. one restored elsewhere).
    pub fn adopt(&self, identity: Identity) -> Result<()> {
        self.store
            .with(|db| db.put_setting(SETTING_SESSION_IDENTITY, &identity))?;
        info!(id = %identity.id, name = %identity.name, "Session started");
        self.current.set(Some(identity.clone()));
        self.bus.emit(BusEvent::SessionChanged(Some(identity)), true);
        Ok(())
    }

    /// Load the persisted session, if any.
    pub fn restore(&self) -> Result<Option<Identity>> {
        let identity: Option<Identity> = self
            .store
            .with(|db| db.get_setting(SETTING_SESSION_IDENTITY))?;
        if let Some(identity) = &identity {
            info!(id = %identity.id, "Session restored");
        }
        self.current.set(identity.clone());
        Ok(identity)
    }

    pub fn logout(&self) -> Result<()> {
        self.store
            .with(|db| db.remove_setting(SETTING_SESSION_IDENTITY))?;
        self.current.set(None);
        info!("Session ended");
        self.bus.emit(BusEvent::SessionChanged(None), true);
        Ok(())
    }

    pub fn current(&self) -> Option<Identity> {
        self.current.get()
    }

    pub fn save_theme(&self, theme: &str) -> Result<()> {
        self.store.with(|db| db.put_setting(SETTING_THEME, &theme))
    }

    pub fn theme(&self) -> Result<String> {
        let theme: Option<String> = self.store.with(|db| db.get_setting(SETTING_THEME))?;
        Ok(theme.unwrap_or_else(|| DEFAULT_THEME.to_string()))
    }
}
