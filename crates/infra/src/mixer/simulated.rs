//! In-process mixer that behaves like the desktop sound server
//!
//! Ids are handed out sequentially starting at 1 and never reused. Probing
//! for the next id consumes one, the same way the real server allocates a
//! throwaway stream to find out how far the id space extends.

use async_trait::async_trait;
use muffle_core::domain::config::SimulationConfig;
use muffle_core::domain::device::{
    AudioDevice, DeviceDescription, DeviceId, DeviceType, MixerEventKind, MixerState,
};
use muffle_core::domain::directory::{
    self, MixerControl, MixerHandle, MixerSource, SignalHandler, SignalId,
};
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::{debug, info};

struct SimulatedDevice {
    device_type: DeviceType,
    description: DeviceDescription,
}

struct MixerInner {
    forced_state: Option<MixerState>,
    connecting_polls: u32,
    next_id: u32,
    devices: BTreeMap<u32, SimulatedDevice>,
    handlers: HashMap<u64, (MixerEventKind, SignalHandler)>,
    next_signal: u64,
}

pub struct SimulatedMixer {
    inner: Mutex<MixerInner>,
}

impl SimulatedMixer {
    /// A mixer that reports "connecting" for the first `connecting_polls`
    /// state queries
    pub fn new(connecting_polls: u32) -> Self {
        Self {
            inner: Mutex::new(MixerInner {
                forced_state: None,
                connecting_polls,
                next_id: 1,
                devices: BTreeMap::new(),
                handlers: HashMap::new(),
                next_signal: 0,
            }),
        }
    }

    pub fn ready() -> Self {
        Self::new(0)
    }

    /// Build a mixer seeded with the configured devices
    pub fn from_config(config: &SimulationConfig) -> Self {
        let mixer = Self::new(config.connecting_polls);
        for device in &config.devices {
            mixer.plug(
                device.description.as_deref(),
                device.origin.as_deref(),
                device.device_type,
            );
        }
        info!(
            devices = config.devices.len(),
            connecting_polls = config.connecting_polls,
            "Simulated mixer seeded"
        );
        mixer
    }

    /// Pin the reported state, e.g. to simulate a failed connection
    pub fn set_state(&self, state: MixerState) {
        self.inner.lock().forced_state = Some(state);
    }

    pub fn is_closed(&self) -> bool {
        self.inner.lock().forced_state == Some(MixerState::Closed)
    }

    /// Number of connected signal handlers
    pub fn handler_count(&self) -> usize {
        self.inner.lock().handlers.len()
    }

    /// Connect a device and emit the matching "added" signal
    pub fn plug(
        &self,
        description: Option<&str>,
        origin: Option<&str>,
        device_type: DeviceType,
    ) -> DeviceId {
        let id = {
            let mut inner = self.inner.lock();
            let id = inner.next_id;
            inner.next_id += 1;
            inner.devices.insert(
                id,
                SimulatedDevice {
                    device_type,
                    description: DeviceDescription::new(description, origin),
                },
            );
            DeviceId::new(id)
        };
        debug!(%id, %device_type, "Device plugged");
        self.emit(MixerEventKind::added(device_type), id);
        id
    }

    /// Disconnect a device and emit the matching "removed" signal.
    ///
    /// Returns `false` if no such device exists.
    pub fn unplug(&self, id: DeviceId) -> bool {
        let removed = self.inner.lock().devices.remove(&id.get());
        match removed {
            Some(device) => {
                debug!(%id, device_type = %device.device_type, "Device unplugged");
                self.emit(MixerEventKind::removed(device.device_type), id);
                true
            }
            None => false,
        }
    }

    /// Live devices of one class, in id order
    pub fn devices(&self, device_type: DeviceType) -> Vec<AudioDevice> {
        self.inner
            .lock()
            .devices
            .iter()
            .filter(|(_, d)| d.device_type == device_type)
            .map(|(&id, d)| AudioDevice {
                id: DeviceId::new(id),
                display_name: d.description.display_name(),
                device_type,
            })
            .collect()
    }

    fn emit(&self, kind: MixerEventKind, id: DeviceId) {
        // Handlers run without the lock so they may call back into the mixer
        let handlers: Vec<SignalHandler> = self
            .inner
            .lock()
            .handlers
            .values()
            .filter(|(k, _)| *k == kind)
            .map(|(_, h)| h.clone())
            .collect();
        for handler in handlers {
            handler(id);
        }
    }
}

impl MixerControl for SimulatedMixer {
    fn state(&self) -> MixerState {
        let mut inner = self.inner.lock();
        if let Some(state) = inner.forced_state {
            return state;
        }
        if inner.connecting_polls > 0 {
            inner.connecting_polls -= 1;
            MixerState::Connecting
        } else {
            MixerState::Ready
        }
    }

    fn lookup(&self, id: DeviceId, device_type: DeviceType) -> Option<DeviceDescription> {
        self.inner
            .lock()
            .devices
            .get(&id.get())
            .filter(|d| d.device_type == device_type)
            .map(|d| d.description.clone())
    }

    fn probe_next_id(&self) -> DeviceId {
        let mut inner = self.inner.lock();
        let id = inner.next_id;
        inner.next_id += 1;
        DeviceId::new(id)
    }

    fn connect(&self, kind: MixerEventKind, handler: SignalHandler) -> SignalId {
        let mut inner = self.inner.lock();
        inner.next_signal += 1;
        let id = inner.next_signal;
        inner.handlers.insert(id, (kind, handler));
        SignalId::new(id)
    }

    fn disconnect(&self, id: SignalId) -> bool {
        self.inner.lock().handlers.remove(&id.get()).is_some()
    }

    fn close(&self) {
        let mut inner = self.inner.lock();
        inner.forced_state = Some(MixerState::Closed);
        inner.handlers.clear();
        info!("Simulated mixer closed");
    }
}

/// Hands out a [`SimulatedMixer`] either as the host's shared connection
/// (left open on dispose) or as a private one (closed on dispose)
pub struct SimulatedMixerSource {
    mixer: Arc<SimulatedMixer>,
    close_on_dispose: bool,
}

impl SimulatedMixerSource {
    pub fn shared(mixer: Arc<SimulatedMixer>) -> Self {
        Self {
            mixer,
            close_on_dispose: false,
        }
    }

    pub fn owned(mixer: Arc<SimulatedMixer>) -> Self {
        Self {
            mixer,
            close_on_dispose: true,
        }
    }
}

#[async_trait]
impl MixerSource for SimulatedMixerSource {
    async fn open(&self) -> directory::Result<MixerHandle> {
        if self.mixer.is_closed() {
            return Err(directory::DirectoryError::Open(
                "simulated mixer is closed".to_string(),
            ));
        }
        Ok(MixerHandle {
            control: self.mixer.clone(),
            close_on_dispose: self.close_on_dispose,
        })
    }
}
