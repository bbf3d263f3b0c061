//! Preferences model: which devices to list and how toggling a row works
//!
//! The panel no longer exposes hidden devices, so the rows come from the
//! stored lists rather than from the mixer.

use crate::domain::device::{DeviceType, DisplayName};
use crate::domain::store::{self, ExclusionStore};
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, instrument};

/// One toggleable device entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeviceRow {
    pub display_name: DisplayName,
    pub device_type: DeviceType,
    /// Shown in the volume panel
    pub visible: bool,
    /// Currently present in the mixer
    pub connected: bool,
}

/// Command types for preference changes
#[derive(Debug, Clone)]
pub enum PreferenceCommand {
    SetVisible {
        name: DisplayName,
        device_type: DeviceType,
        visible: bool,
    },
    SetShowDisconnected(bool),
    ClearExclusions(DeviceType),
}

/// Result of command execution
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandResult {
    VisibilityChanged {
        name: DisplayName,
        device_type: DeviceType,
        visible: bool,
        changed: bool,
    },
    ShowDisconnectedChanged(bool),
    ExclusionsCleared {
        device_type: DeviceType,
        count: usize,
    },
    Error(String),
}

/// Trait for command execution
#[async_trait::async_trait]
pub trait CommandExecutor: Send + Sync {
    async fn execute(&self, command: PreferenceCommand) -> CommandResult;
}

pub struct Preferences {
    store: Arc<ExclusionStore>,
}

impl Preferences {
    pub fn new(store: Arc<ExclusionStore>) -> Self {
        Self { store }
    }

    /// Available devices first, then (optionally) excluded devices that are
    /// not connected right now
    pub fn rows(&self, device_type: DeviceType) -> store::Result<Vec<DeviceRow>> {
        let available = self.store.get_available(device_type)?;
        let excluded = self.store.get_excluded(device_type)?;

        let mut rows: Vec<DeviceRow> = available
            .iter()
            .map(|name| DeviceRow {
                display_name: name.clone(),
                device_type,
                visible: !excluded.contains(name),
                connected: true,
            })
            .collect();

        if self.store.show_disconnected()? {
            rows.extend(
                excluded
                    .iter()
                    .filter(|name| !available.contains(name))
                    .map(|name| DeviceRow {
                        display_name: name.clone(),
                        device_type,
                        visible: false,
                        connected: false,
                    }),
            );
        }

        Ok(rows)
    }

    /// Returns `true` if the exclusion list changed
    #[instrument(skip(self))]
    pub fn set_visible(
        &self,
        name: &DisplayName,
        device_type: DeviceType,
        visible: bool,
    ) -> store::Result<bool> {
        let changed = if visible {
            self.store.remove_excluded(name, device_type)?
        } else {
            self.store.add_excluded(name, device_type)?
        };
        if changed {
            info!(%name, %device_type, visible, "Device visibility changed");
        }
        Ok(changed)
    }

    fn run(&self, command: PreferenceCommand) -> store::Result<CommandResult> {
        match command {
            PreferenceCommand::SetVisible {
                name,
                device_type,
                visible,
            } => {
                let changed = self.set_visible(&name, device_type, visible)?;
                Ok(CommandResult::VisibilityChanged {
                    name,
                    device_type,
                    visible,
                    changed,
                })
            }
            PreferenceCommand::SetShowDisconnected(value) => {
                self.store.set_show_disconnected(value)?;
                Ok(CommandResult::ShowDisconnectedChanged(value))
            }
            PreferenceCommand::ClearExclusions(device_type) => {
                let count = self.store.get_excluded(device_type)?.len();
                if count > 0 {
                    self.store.set_excluded(device_type, &[])?;
                }
                info!(%device_type, count, "Exclusions cleared");
                Ok(CommandResult::ExclusionsCleared { device_type, count })
            }
        }
    }
}

#[async_trait::async_trait]
impl CommandExecutor for Preferences {
    async fn execute(&self, command: PreferenceCommand) -> CommandResult {
        self.run(command)
            .unwrap_or_else(|e| CommandResult::Error(e.to_string()))
    }
}
