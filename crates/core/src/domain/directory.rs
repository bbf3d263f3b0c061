//! Device directory: id/name lookups and device change events
//!
//! Wraps a [`MixerControl`] connection. The mixer only enumerates devices the
//! panel currently shows, so resolving names of hidden devices probes the id
//! space instead: ids are handed out sequentially, so creating a throwaway
//! device reveals an upper bound, and every id below it is looked up. A
//! backend with a native "all devices" enumeration should use that instead;
//! only the contract of [`DeviceDirectory::resolve_by_names`] matters.

use crate::domain::device::{
    AudioDevice, DeviceDescription, DeviceId, DeviceType, DisplayName, MixerEvent,
    MixerEventKind, MixerState,
};
use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, instrument, trace, warn};

use super::schedule::delay;

#[derive(Debug, Error)]
pub enum DirectoryError {
    /// Mixer ended up failed or closed while waiting for it
    #[error("mixer unavailable: connection is {0}")]
    Unavailable(MixerState),

    /// The mixer could not be opened at all
    #[error("failed to open mixer: {0}")]
    Open(String),
}

pub type Result<T> = std::result::Result<T, DirectoryError>;

/// Identifier of one connected mixer signal handler
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SignalId(u64);

impl SignalId {
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    pub const fn get(self) -> u64 {
        self.0
    }
}

pub type SignalHandler = Arc<dyn Fn(DeviceId) + Send + Sync>;

/// Connection to the audio mixer service
pub trait MixerControl: Send + Sync {
    fn state(&self) -> MixerState;

    /// Look up a live device. `None` when the id is vacant or of the other class.
    fn lookup(&self, id: DeviceId, device_type: DeviceType) -> Option<DeviceDescription>;

    /// Create a throwaway device and return its id
    fn probe_next_id(&self) -> DeviceId;

    fn connect(&self, kind: MixerEventKind, handler: SignalHandler) -> SignalId;

    /// Returns `false` if the id was not connected
    fn disconnect(&self, id: SignalId) -> bool;

    fn close(&self);
}

/// An opened mixer plus whether disposing the directory should close it
pub struct MixerHandle {
    pub control: Arc<dyn MixerControl>,
    pub close_on_dispose: bool,
}

/// Where a directory gets its mixer from
#[async_trait]
pub trait MixerSource: Send + Sync {
    async fn open(&self) -> Result<MixerHandle>;
}

/// Timing of the directory-ready wait
#[derive(Debug, Clone, Copy)]
pub struct DirectoryTiming {
    pub poll_interval: Duration,
    pub post_ready_delay: Duration,
}

impl Default for DirectoryTiming {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(200),
            post_ready_delay: Duration::from_millis(200),
        }
    }
}

/// Handle bundling the signal connections of one subscription
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MixerSubscription {
    pub ids: Vec<SignalId>,
}

pub struct DeviceDirectory {
    mixer: Mutex<Option<Arc<dyn MixerControl>>>,
    close_on_dispose: bool,
}

impl DeviceDirectory {
    pub fn new(control: Arc<dyn MixerControl>, close_on_dispose: bool) -> Self {
        Self {
            mixer: Mutex::new(Some(control)),
            close_on_dispose,
        }
    }

    /// Open a mixer from `source` and wait until it is ready.
    ///
    /// Polls while the mixer is connecting. There is no upper bound on how
    /// long that may take.
    #[instrument(skip(source, timing))]
    pub async fn acquire(source: &dyn MixerSource, timing: &DirectoryTiming) -> Result<Self> {
        let handle = source.open().await?;

        if let Err(e) = wait_until_ready(handle.control.as_ref(), timing.poll_interval).await {
            if handle.close_on_dispose {
                handle.control.close();
            }
            return Err(e);
        }

        delay(timing.post_ready_delay).await;
        info!("Mixer ready");

        Ok(Self::new(handle.control, handle.close_on_dispose))
    }

    fn control(&self) -> Option<Arc<dyn MixerControl>> {
        self.mixer.lock().clone()
    }

    pub fn is_disposed(&self) -> bool {
        self.mixer.lock().is_none()
    }

    /// Resolve ids to devices. Unknown ids get the fallback name.
    pub fn resolve(&self, ids: &[DeviceId], device_type: DeviceType) -> Vec<AudioDevice> {
        let control = self.control();
        if control.is_none() {
            warn!("resolve called on a disposed directory");
        }

        ids.iter()
            .map(|&id| {
                let description = control
                    .as_ref()
                    .and_then(|mixer| mixer.lookup(id, device_type))
                    .unwrap_or_default();
                AudioDevice {
                    id,
                    display_name: description.display_name(),
                    device_type,
                }
            })
            .collect()
    }

    /// The device behind `id`, or `None` once it has left the mixer
    pub fn lookup(&self, id: DeviceId, device_type: DeviceType) -> Option<AudioDevice> {
        let description = self.control()?.lookup(id, device_type)?;
        Some(AudioDevice {
            id,
            display_name: description.display_name(),
            device_type,
        })
    }

    /// Find the first live device for each name, shown or hidden.
    ///
    /// The result has one slot per requested name, `None` where no device
    /// with that name currently exists.
    pub fn resolve_by_names(
        &self,
        names: &[DisplayName],
        device_type: DeviceType,
    ) -> Vec<Option<AudioDevice>> {
        if names.is_empty() {
            return Vec::new();
        }

        let Some(control) = self.control() else {
            warn!("resolve_by_names called on a disposed directory");
            return vec![None; names.len()];
        };

        let devices = probe_all(control.as_ref(), device_type);

        names
            .iter()
            .map(|name| {
                devices
                    .iter()
                    .find(|device| &device.display_name == name)
                    .cloned()
            })
            .collect()
    }

    /// Merge the four device signals into one callback
    pub fn subscribe<F>(&self, callback: F) -> Result<MixerSubscription>
    where
        F: Fn(MixerEvent) + Send + Sync + 'static,
    {
        let control = self
            .control()
            .ok_or(DirectoryError::Unavailable(MixerState::Closed))?;
        let callback = Arc::new(callback);

        let ids = MixerEventKind::ALL
            .iter()
            .map(|&kind| {
                let callback = callback.clone();
                control.connect(
                    kind,
                    Arc::new(move |device_id| callback(MixerEvent { kind, device_id })),
                )
            })
            .collect();

        debug!("Subscribed to mixer device signals");
        Ok(MixerSubscription { ids })
    }

    /// Disconnect a subscription. Tolerates a disposed directory.
    pub fn unsubscribe(&self, subscription: &MixerSubscription) {
        let Some(control) = self.control() else {
            warn!("Unsubscribe invoked after the mixer was disposed");
            return;
        };

        for id in &subscription.ids {
            if !control.disconnect(*id) {
                warn!(signal = id.get(), "Signal was already disconnected");
            }
        }
        debug!("Unsubscribed from mixer device signals");
    }

    /// Release the mixer connection. Safe to call more than once.
    pub fn dispose(&self) {
        let Some(control) = self.mixer.lock().take() else {
            return;
        };
        if self.close_on_dispose {
            control.close();
        }
        debug!(closed = self.close_on_dispose, "Device directory disposed");
    }
}

impl Drop for DeviceDirectory {
    fn drop(&mut self) {
        self.dispose();
    }
}

/// Wait while the mixer is connecting; fail on a terminal state
pub async fn wait_until_ready(mixer: &dyn MixerControl, poll_interval: Duration) -> Result<()> {
    loop {
        match mixer.state() {
            MixerState::Connecting => {
                trace!("Mixer still connecting");
                delay(poll_interval).await;
            }
            MixerState::Ready => return Ok(()),
            state @ (MixerState::Failed | MixerState::Closed) => {
                return Err(DirectoryError::Unavailable(state));
            }
        }
    }
}

fn probe_all(mixer: &dyn MixerControl, device_type: DeviceType) -> Vec<AudioDevice> {
    let bound = mixer.probe_next_id().get();
    trace!(bound, %device_type, "Probing device id space");

    (0..bound)
        .map(DeviceId::new)
        .filter_map(|id| {
            mixer.lookup(id, device_type).map(|description| AudioDevice {
                id,
                display_name: description.display_name(),
                device_type,
            })
        })
        .collect()
}
