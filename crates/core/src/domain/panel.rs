//! Boundary to the volume panel's device rows
//!
//! The host UI owns this state and mutates it on its own as devices come and
//! go, so anything written here can be overwritten later. Implementations
//! are not expected to deduplicate: a redundant `add` may produce a second
//! row.

use crate::domain::device::{DeviceId, DeviceType};

pub trait VisibilityPanel: Send + Sync {
    /// Ids of the devices the panel currently shows, in row order
    fn list_shown(&self, device_type: DeviceType) -> Vec<DeviceId>;

    fn add(&self, id: DeviceId, device_type: DeviceType);

    fn remove(&self, id: DeviceId, device_type: DeviceType);

    fn is_shown(&self, id: DeviceId, device_type: DeviceType) -> bool {
        self.list_shown(device_type).contains(&id)
    }
}
