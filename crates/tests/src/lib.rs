//! Shared rig for the integration tests
//!
//! Wires the real engine to the simulated mixer, an in-memory settings
//! backend and a panel that follows the mixer like the host panel does.

use muffle_core::domain::device::{DeviceId, DeviceType, DisplayName};
use muffle_core::domain::directory::SignalId;
use muffle_core::domain::engine::{EngineConfig, EngineHandle, ReconciliationEngine};
use muffle_core::domain::panel::VisibilityPanel;
use muffle_core::domain::store::{ExclusionStore, SettingsBackend};
use muffle_infra::mixer::{SimulatedMixer, SimulatedMixerSource};
use muffle_infra::panel::MemoryPanel;
use muffle_infra::settings::MemorySettings;
use std::sync::Arc;
use std::time::Duration;

/// How long the simulated host panel takes to insert a row
pub const HOST_INSERT_DELAY: Duration = Duration::from_millis(50);

/// Engine timing with short startup waits and the default settle delay
pub fn test_config() -> EngineConfig {
    EngineConfig {
        settle_delay_ms: 250,
        ready_poll_interval_ms: 10,
        post_ready_delay_ms: 10,
    }
}

pub fn names(list: &[&str]) -> Vec<DisplayName> {
    list.iter().map(|n| DisplayName::from(*n)).collect()
}

/// Let spawned tasks run and advance paused time
pub async fn advance(ms: u64) {
    tokio::time::sleep(Duration::from_millis(ms)).await;
}

pub struct Rig {
    pub mixer: Arc<SimulatedMixer>,
    pub store: Arc<ExclusionStore>,
    pub panel: Arc<MemoryPanel>,
    panel_signals: Vec<SignalId>,
}

impl Rig {
    /// Rig on top of in-memory settings
    pub fn new() -> Self {
        Self::with_backend(Arc::new(MemorySettings::new()))
    }

    pub fn with_backend(backend: Arc<dyn SettingsBackend>) -> Self {
        let mixer = Arc::new(SimulatedMixer::ready());
        let panel = Arc::new(MemoryPanel::new());
        let panel_signals = panel.follow_mixer(&mixer, HOST_INSERT_DELAY);
        Self {
            mixer,
            store: Arc::new(ExclusionStore::new(backend)),
            panel,
            panel_signals,
        }
    }

    pub fn plug(&self, description: &str, origin: Option<&str>, device_type: DeviceType) -> DeviceId {
        self.mixer.plug(Some(description), origin, device_type)
    }

    pub async fn enable(&self) -> EngineHandle {
        self.enable_with(test_config()).await
    }

    /// Start the engine once the host panel has caught up with the mixer
    pub async fn enable_with(&self, config: EngineConfig) -> EngineHandle {
        tokio::time::sleep(HOST_INSERT_DELAY * 2).await;
        ReconciliationEngine::enable(
            &SimulatedMixerSource::shared(self.mixer.clone()),
            self.store.clone(),
            self.panel.clone(),
            config,
        )
        .await
        .expect("engine should start against a ready mixer")
    }

    /// Number of mixer handlers besides the panel's own
    pub fn engine_signal_count(&self) -> usize {
        self.mixer.handler_count() - self.panel_signals.len()
    }

    /// Names of the devices the panel shows, in mixer id order
    pub fn shown_names(&self, device_type: DeviceType) -> Vec<DisplayName> {
        let shown = self.panel.list_shown(device_type);
        self.mixer
            .devices(device_type)
            .into_iter()
            .filter(|d| shown.contains(&d.id))
            .map(|d| d.display_name)
            .collect()
    }

    /// Names of present devices minus excluded names, in mixer id order
    pub fn expected_names(&self, device_type: DeviceType) -> Vec<DisplayName> {
        let excluded = self
            .store
            .get_excluded(device_type)
            .expect("store should be readable");
        self.mixer
            .devices(device_type)
            .into_iter()
            .map(|d| d.display_name)
            .filter(|name| !excluded.contains(name))
            .collect()
    }

    /// Panel shows exactly available minus excluded, without duplicate rows
    pub fn assert_consistent(&self, device_type: DeviceType) {
        assert_eq!(
            self.shown_names(device_type),
            self.expected_names(device_type),
            "{device_type} panel out of sync"
        );
        for device in self.mixer.devices(device_type) {
            assert!(
                self.panel.row_count(device.id, device_type) <= 1,
                "duplicate row for {}",
                device.display_name
            );
        }

        let mut available = self
            .store
            .get_available(device_type)
            .expect("store should be readable");
        available.sort();
        let mut present: Vec<DisplayName> = self
            .mixer
            .devices(device_type)
            .into_iter()
            .map(|d| d.display_name)
            .collect();
        present.sort();
        present.dedup();
        assert_eq!(available, present, "{device_type} available list out of sync");
    }
}

impl Default for Rig {
    fn default() -> Self {
        Self::new()
    }
}
