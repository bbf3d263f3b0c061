//! Settings kept in memory for the lifetime of the process

use super::{HandlerRegistry, SettingsDocument};
use muffle_core::domain::store::{self, ChangeHandler, SettingKey, SettingsBackend, SubscriptionId};
use parking_lot::RwLock;

/// Every write notifies, even when the value is unchanged
#[derive(Default)]
pub struct MemorySettings {
    document: RwLock<SettingsDocument>,
    handlers: HandlerRegistry,
}

impl MemorySettings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> SettingsDocument {
        self.document.read().clone()
    }

    pub fn handler_count(&self) -> usize {
        self.handlers.len()
    }
}

impl SettingsBackend for MemorySettings {
    fn get_strv(&self, key: SettingKey) -> Vec<String> {
        self.document.read().strv(key)
    }

    fn set_strv(&self, key: SettingKey, values: Vec<String>) -> store::Result<()> {
        self.document.write().set_strv(key, values)?;
        self.handlers.notify(key);
        Ok(())
    }

    fn get_bool(&self, key: SettingKey) -> bool {
        self.document.read().flag(key)
    }

    fn set_bool(&self, key: SettingKey, value: bool) -> store::Result<()> {
        self.document.write().set_flag(key, value)?;
        self.handlers.notify(key);
        Ok(())
    }

    fn connect(&self, key: SettingKey, handler: ChangeHandler) -> SubscriptionId {
        self.handlers.connect(key, handler)
    }

    fn disconnect(&self, id: SubscriptionId) -> bool {
        self.handlers.disconnect(id)
    }
}
