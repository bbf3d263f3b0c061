//! Settings backends for the exclusion store
//!
//! Both backends hold the whole schema in a [`SettingsDocument`] and share
//! the handler bookkeeping in [`HandlerRegistry`].

pub mod file;
pub mod memory;

pub use file::{SettingsError, TomlSettings};
pub use memory::MemorySettings;

use muffle_core::domain::store::{self, ChangeHandler, SettingKey, StoreError, SubscriptionId};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Every key of the settings schema
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct SettingsDocument {
    pub excluded_output_names: Vec<String>,
    pub excluded_input_names: Vec<String>,
    pub available_output_names: Vec<String>,
    pub available_input_names: Vec<String>,
    pub show_disconnected_devices: bool,
}

impl SettingsDocument {
    fn list(&self, key: SettingKey) -> Option<&Vec<String>> {
        match key {
            SettingKey::ExcludedOutputNames => Some(&self.excluded_output_names),
            SettingKey::ExcludedInputNames => Some(&self.excluded_input_names),
            SettingKey::AvailableOutputNames => Some(&self.available_output_names),
            SettingKey::AvailableInputNames => Some(&self.available_input_names),
            SettingKey::ShowDisconnectedDevices => None,
        }
    }

    fn list_mut(&mut self, key: SettingKey) -> Option<&mut Vec<String>> {
        match key {
            SettingKey::ExcludedOutputNames => Some(&mut self.excluded_output_names),
            SettingKey::ExcludedInputNames => Some(&mut self.excluded_input_names),
            SettingKey::AvailableOutputNames => Some(&mut self.available_output_names),
            SettingKey::AvailableInputNames => Some(&mut self.available_input_names),
            SettingKey::ShowDisconnectedDevices => None,
        }
    }

    /// A string list. Empty for the boolean key.
    pub fn strv(&self, key: SettingKey) -> Vec<String> {
        self.list(key).cloned().unwrap_or_default()
    }

    pub fn set_strv(&mut self, key: SettingKey, values: Vec<String>) -> store::Result<()> {
        let list = self
            .list_mut(key)
            .ok_or_else(|| StoreError::Backend(format!("{key} is not a string list")))?;
        *list = values;
        Ok(())
    }

    /// A flag. `false` for list keys.
    pub fn flag(&self, key: SettingKey) -> bool {
        match key {
            SettingKey::ShowDisconnectedDevices => self.show_disconnected_devices,
            _ => false,
        }
    }

    pub fn set_flag(&mut self, key: SettingKey, value: bool) -> store::Result<()> {
        match key {
            SettingKey::ShowDisconnectedDevices => {
                self.show_disconnected_devices = value;
                Ok(())
            }
            _ => Err(StoreError::Backend(format!("{key} is not a boolean"))),
        }
    }

    /// Keys whose value differs between `self` and `other`
    pub fn changed_keys(&self, other: &SettingsDocument) -> Vec<SettingKey> {
        SettingKey::ALL
            .into_iter()
            .filter(|&key| {
                if key.is_list() {
                    self.list(key) != other.list(key)
                } else {
                    self.flag(key) != other.flag(key)
                }
            })
            .collect()
    }
}

/// Change handlers keyed by subscription id
#[derive(Default)]
pub struct HandlerRegistry {
    inner: Mutex<RegistryInner>,
}

#[derive(Default)]
struct RegistryInner {
    next_id: u64,
    handlers: HashMap<u64, (SettingKey, ChangeHandler)>,
}

impl HandlerRegistry {
    pub fn connect(&self, key: SettingKey, handler: ChangeHandler) -> SubscriptionId {
        let mut inner = self.inner.lock();
        inner.next_id += 1;
        let id = inner.next_id;
        inner.handlers.insert(id, (key, handler));
        SubscriptionId::new(id)
    }

    pub fn disconnect(&self, id: SubscriptionId) -> bool {
        self.inner.lock().handlers.remove(&id.get()).is_some()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Call every handler connected to `key`
    pub fn notify(&self, key: SettingKey) {
        // Snapshot first: a handler may connect or disconnect
        let handlers: Vec<ChangeHandler> = self
            .inner
            .lock()
            .handlers
            .values()
            .filter(|(k, _)| *k == key)
            .map(|(_, h)| h.clone())
            .collect();
        for handler in handlers {
            handler(key);
        }
    }
}
