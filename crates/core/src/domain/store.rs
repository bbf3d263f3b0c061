//! Exclusion store: the user's hidden devices and the devices seen so far
//!
//! Backed by a [`SettingsBackend`] holding four string lists and one boolean.
//! Lists are ordered; duplicates are only prevented by the add guards here.

use crate::domain::device::{DeviceType, DisplayName};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("exclusion store has been disposed")]
    Disposed,

    #[error("settings backend error: {0}")]
    Backend(String),
}

pub type Result<T> = std::result::Result<T, StoreError>;

/// Keys of the settings schema
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SettingKey {
    ExcludedOutputNames,
    ExcludedInputNames,
    AvailableOutputNames,
    AvailableInputNames,
    ShowDisconnectedDevices,
}

impl SettingKey {
    pub const ALL: [SettingKey; 5] = [
        SettingKey::ExcludedOutputNames,
        SettingKey::ExcludedInputNames,
        SettingKey::AvailableOutputNames,
        SettingKey::AvailableInputNames,
        SettingKey::ShowDisconnectedDevices,
    ];

    pub fn excluded(device_type: DeviceType) -> Self {
        match device_type {
            DeviceType::Output => SettingKey::ExcludedOutputNames,
            DeviceType::Input => SettingKey::ExcludedInputNames,
        }
    }

    pub fn available(device_type: DeviceType) -> Self {
        match device_type {
            DeviceType::Output => SettingKey::AvailableOutputNames,
            DeviceType::Input => SettingKey::AvailableInputNames,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            SettingKey::ExcludedOutputNames => "excluded-output-names",
            SettingKey::ExcludedInputNames => "excluded-input-names",
            SettingKey::AvailableOutputNames => "available-output-names",
            SettingKey::AvailableInputNames => "available-input-names",
            SettingKey::ShowDisconnectedDevices => "show-disconnected-devices",
        }
    }

    pub fn is_list(&self) -> bool {
        !matches!(self, SettingKey::ShowDisconnectedDevices)
    }
}

impl fmt::Display for SettingKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

impl SubscriptionId {
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    pub const fn get(self) -> u64 {
        self.0
    }
}

pub type ChangeHandler = Arc<dyn Fn(SettingKey) + Send + Sync>;

/// Durable key/value settings with change notification
pub trait SettingsBackend: Send + Sync {
    fn get_strv(&self, key: SettingKey) -> Vec<String>;

    fn set_strv(&self, key: SettingKey, values: Vec<String>) -> Result<()>;

    fn get_bool(&self, key: SettingKey) -> bool;

    fn set_bool(&self, key: SettingKey, value: bool) -> Result<()>;

    /// Call `handler` whenever `key` changes
    fn connect(&self, key: SettingKey, handler: ChangeHandler) -> SubscriptionId;

    /// Returns `false` if the id was not connected
    fn disconnect(&self, id: SubscriptionId) -> bool;
}

/// Typed access to the exclusion and availability lists
pub struct ExclusionStore {
    backend: RwLock<Option<Arc<dyn SettingsBackend>>>,
}

impl ExclusionStore {
    pub fn new(backend: Arc<dyn SettingsBackend>) -> Self {
        Self {
            backend: RwLock::new(Some(backend)),
        }
    }

    fn backend(&self) -> Result<Arc<dyn SettingsBackend>> {
        self.backend.read().clone().ok_or(StoreError::Disposed)
    }

    fn get_names(&self, key: SettingKey) -> Result<Vec<DisplayName>> {
        Ok(self
            .backend()?
            .get_strv(key)
            .into_iter()
            .map(DisplayName::from)
            .collect())
    }

    fn set_names(&self, key: SettingKey, names: &[DisplayName]) -> Result<()> {
        let values = names.iter().map(|n| n.as_str().to_string()).collect();
        self.backend()?.set_strv(key, values)
    }

    fn add_name(&self, key: SettingKey, name: &DisplayName) -> Result<bool> {
        let mut names = self.get_names(key)?;
        if names.contains(name) {
            return Ok(false);
        }
        names.push(name.clone());
        self.set_names(key, &names)?;
        debug!(%key, %name, "Name added");
        Ok(true)
    }

    fn remove_name(&self, key: SettingKey, name: &DisplayName) -> Result<bool> {
        let mut names = self.get_names(key)?;
        let Some(index) = names.iter().position(|n| n == name) else {
            return Ok(false);
        };
        names.remove(index);
        self.set_names(key, &names)?;
        debug!(%key, %name, "Name removed");
        Ok(true)
    }

    pub fn get_excluded(&self, device_type: DeviceType) -> Result<Vec<DisplayName>> {
        self.get_names(SettingKey::excluded(device_type))
    }

    pub fn get_available(&self, device_type: DeviceType) -> Result<Vec<DisplayName>> {
        self.get_names(SettingKey::available(device_type))
    }

    pub fn set_excluded(&self, device_type: DeviceType, names: &[DisplayName]) -> Result<()> {
        self.set_names(SettingKey::excluded(device_type), names)
    }

    /// Overwrite the available list
    pub fn set_available(&self, device_type: DeviceType, names: &[DisplayName]) -> Result<()> {
        self.set_names(SettingKey::available(device_type), names)
    }

    /// Returns `true` if the name was not excluded before
    pub fn add_excluded(&self, name: &DisplayName, device_type: DeviceType) -> Result<bool> {
        self.add_name(SettingKey::excluded(device_type), name)
    }

    /// Returns `true` if the name was excluded before
    pub fn remove_excluded(&self, name: &DisplayName, device_type: DeviceType) -> Result<bool> {
        self.remove_name(SettingKey::excluded(device_type), name)
    }

    pub fn add_available(&self, name: &DisplayName, device_type: DeviceType) -> Result<bool> {
        self.add_name(SettingKey::available(device_type), name)
    }

    pub fn remove_available(&self, name: &DisplayName, device_type: DeviceType) -> Result<bool> {
        self.remove_name(SettingKey::available(device_type), name)
    }

    pub fn show_disconnected(&self) -> Result<bool> {
        Ok(self
            .backend()?
            .get_bool(SettingKey::ShowDisconnectedDevices))
    }

    pub fn set_show_disconnected(&self, value: bool) -> Result<()> {
        self.backend()?
            .set_bool(SettingKey::ShowDisconnectedDevices, value)
    }

    pub fn on_change<F>(&self, key: SettingKey, handler: F) -> Result<SubscriptionId>
    where
        F: Fn(SettingKey) + Send + Sync + 'static,
    {
        Ok(self.backend()?.connect(key, Arc::new(handler)))
    }

    /// Disconnect a change handler. Tolerates stale ids and a disposed store.
    pub fn disconnect(&self, id: SubscriptionId) {
        let Ok(backend) = self.backend() else {
            warn!(subscription = id.get(), "Disconnect invoked on a disposed store");
            return;
        };
        if !backend.disconnect(id) {
            warn!(subscription = id.get(), "Settings subscription was not connected");
        }
    }

    pub fn is_disposed(&self) -> bool {
        self.backend.read().is_none()
    }

    /// Drop the backend. Safe to call more than once.
    pub fn dispose(&self) {
        if self.backend.write().take().is_some() {
            debug!("Exclusion store disposed");
        }
    }
}
