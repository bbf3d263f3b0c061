//! In-memory volume panel
//!
//! Besides being written to by the engine, the panel can follow a mixer the
//! way the desktop's own panel does: rows appear a moment after a device is
//! plugged and disappear as soon as it is unplugged. That independent
//! mutation is what the engine's settle delay has to outlast.

use crate::mixer::SimulatedMixer;
use muffle_core::domain::device::{DeviceId, DeviceType, MixerEventKind};
use muffle_core::domain::directory::{MixerControl, SignalId};
use muffle_core::domain::panel::VisibilityPanel;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, trace};

/// Rows per device class. Does not deduplicate.
#[derive(Default)]
pub struct MemoryPanel {
    rows: Mutex<HashMap<DeviceType, Vec<DeviceId>>>,
}

impl MemoryPanel {
    pub fn new() -> Self {
        Self::default()
    }

    /// How many rows show `id`. More than one means a redundant add happened.
    pub fn row_count(&self, id: DeviceId, device_type: DeviceType) -> usize {
        self.rows
            .lock()
            .get(&device_type)
            .map(|rows| rows.iter().filter(|row| **row == id).count())
            .unwrap_or(0)
    }

    /// Mirror the mixer like the host panel: list what is plugged now, then
    /// insert a row `insert_delay` after each "added" signal and drop rows on
    /// "removed".
    ///
    /// Returns the signal ids so the caller can stop following.
    pub fn follow_mixer(
        self: &Arc<Self>,
        mixer: &Arc<SimulatedMixer>,
        insert_delay: Duration,
    ) -> Vec<SignalId> {
        for device_type in DeviceType::ALL {
            let mut rows = self.rows.lock();
            let entry = rows.entry(device_type).or_default();
            for device in mixer.devices(device_type) {
                if !entry.contains(&device.id) {
                    entry.push(device.id);
                }
            }
        }

        MixerEventKind::ALL
            .iter()
            .map(|&kind| {
                let panel = Arc::downgrade(self);
                let source = Arc::downgrade(mixer);
                let device_type = kind.device_type();
                let added = kind.is_added();
                mixer.connect(
                    kind,
                    Arc::new(move |id| {
                        let Some(panel) = panel.upgrade() else {
                            return;
                        };
                        if !added {
                            trace!(%id, %device_type, "Host panel drops row");
                            panel.remove(id, device_type);
                            return;
                        }
                        match tokio::runtime::Handle::try_current() {
                            Ok(runtime) if !insert_delay.is_zero() => {
                                let source = source.clone();
                                runtime.spawn(async move {
                                    tokio::time::sleep(insert_delay).await;
                                    let present = source
                                        .upgrade()
                                        .is_some_and(|m| m.lookup(id, device_type).is_some());
                                    if present {
                                        trace!(%id, %device_type, "Host panel inserts row");
                                        panel.add(id, device_type);
                                    }
                                });
                            }
                            _ => panel.add(id, device_type),
                        }
                    }),
                )
            })
            .collect()
    }
}

impl VisibilityPanel for MemoryPanel {
    fn list_shown(&self, device_type: DeviceType) -> Vec<DeviceId> {
        self.rows
            .lock()
            .get(&device_type)
            .cloned()
            .unwrap_or_default()
    }

    fn add(&self, id: DeviceId, device_type: DeviceType) {
        debug!(%id, %device_type, "Panel row added");
        self.rows.lock().entry(device_type).or_default().push(id);
    }

    fn remove(&self, id: DeviceId, device_type: DeviceType) {
        debug!(%id, %device_type, "Panel row removed");
        if let Some(rows) = self.rows.lock().get_mut(&device_type) {
            rows.retain(|row| *row != id);
        }
    }
}
