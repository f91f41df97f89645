//! Driver registry — named factories per capability, lazily instantiated.
//!
//! DESIGN
//! ======
//! Each capability (currently only [`Http`]) owns a slot holding its named
//! factories, the instances built so far, and the active name. `get` builds
//! the active driver on first use with the resolved `Config` and hands out
//! the same `Arc` afterwards, so switching the active name before first use
//! costs nothing and switching back reuses the earlier instance.
//!
//! TRADE-OFFS
//! ==========
//! Factories run under the slot lock. That makes construction at-most-once
//! per name without a second synchronization step, at the cost of a factory
//! never being allowed to call back into the registry.

pub mod http;

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::config::Config;
use crate::error::DriverError;

/// Capability families a driver can provide.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DriverKind {
    Http,
}

impl fmt::Display for DriverKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Http => f.write_str("http"),
        }
    }
}

/// A capability type: its kind tag, the driver trait object it yields, and
/// where its slot lives in [`Drivers`].
pub trait Capability: Sized + 'static {
    const KIND: DriverKind;
    type Driver: ?Sized + Send + Sync + 'static;

    fn slot(drivers: &Drivers) -> &DriverSlot<Self>;
}

/// The HTTP transport capability.
#[derive(Debug, Clone, Copy)]
pub struct Http;

impl Capability for Http {
    const KIND: DriverKind = DriverKind::Http;
    type Driver = dyn http::Transport;

    fn slot(drivers: &Drivers) -> &DriverSlot<Self> {
        &drivers.http
    }
}

/// Builds a driver from the resolved configuration.
pub type DriverFactory<C> =
    Arc<dyn Fn(&Config) -> Result<Arc<<C as Capability>::Driver>, DriverError> + Send + Sync>;

// =============================================================================
// SLOT
// =============================================================================

struct SlotInner<C: Capability> {
    factories: HashMap<String, DriverFactory<C>>,
    instances: HashMap<String, Arc<C::Driver>>,
    active: Option<String>,
}

/// Per-capability registry state.
pub struct DriverSlot<C: Capability> {
    inner: Mutex<SlotInner<C>>,
}

impl<C: Capability> Default for DriverSlot<C> {
    fn default() -> Self {
        Self { inner: Mutex::new(SlotInner { factories: HashMap::new(), instances: HashMap::new(), active: None }) }
    }
}

impl<C: Capability> DriverSlot<C> {
    fn lock(&self) -> MutexGuard<'_, SlotInner<C>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

// =============================================================================
// REGISTRY
// =============================================================================

/// Registry of transport drivers, keyed by capability and name.
pub struct Drivers {
    config: Arc<Config>,
    http: DriverSlot<Http>,
}

impl Drivers {
    #[must_use]
    pub fn new(config: Arc<Config>) -> Self {
        Self { config, http: DriverSlot::default() }
    }

    /// Register (or silently replace) the factory for `name`.
    pub fn register<C, F>(&self, name: impl Into<String>, factory: F)
    where
        C: Capability,
        F: Fn(&Config) -> Result<Arc<C::Driver>, DriverError> + Send + Sync + 'static,
    {
        self.register_factory::<C>(name, Arc::new(factory));
    }

    pub fn register_factory<C: Capability>(&self, name: impl Into<String>, factory: DriverFactory<C>) {
        let name = name.into();
        tracing::debug!(kind = %C::KIND, %name, "driver registered");
        C::slot(self).lock().factories.insert(name, factory);
    }

    /// Make `name` the active driver for the capability. Existence is
    /// checked on the next `get`.
    pub fn select<C: Capability>(&self, name: impl Into<String>) -> &Self {
        C::slot(self).lock().active = Some(name.into());
        self
    }

    /// Name of the active driver, if one was selected.
    #[must_use]
    pub fn active<C: Capability>(&self) -> Option<String> {
        C::slot(self).lock().active.clone()
    }

    /// Return the active driver, building it on first use.
    ///
    /// # Errors
    ///
    /// Returns [`DriverError::Unselected`] if no name is active,
    /// [`DriverError::Unknown`] if the active name has no factory, or the
    /// factory's own [`DriverError::Build`].
    pub fn get<C: Capability>(&self) -> Result<Arc<C::Driver>, DriverError> {
        let mut slot = C::slot(self).lock();
        let name = slot.active.clone().ok_or(DriverError::Unselected { kind: C::KIND })?;

        if let Some(instance) = slot.instances.get(&name) {
            return Ok(Arc::clone(instance));
        }

        let factory = slot
            .factories
            .get(&name)
            .cloned()
            .ok_or_else(|| DriverError::Unknown { kind: C::KIND, name: name.clone() })?;
        let instance = factory(self.config.as_ref())?;
        tracing::info!(kind = %C::KIND, %name, "driver instantiated");
        slot.instances.insert(name, Arc::clone(&instance));
        Ok(instance)
    }

    #[must_use]
    pub fn config(&self) -> &Arc<Config> {
        &self.config
    }
}

#[cfg(test)]
#[path = "mod_test.rs"]
mod tests;
