//! Domain entities and business rules

pub mod config;
pub mod device;
pub mod directory;
pub mod engine;
pub mod panel;
pub mod preferences;
pub mod schedule;
pub mod store;


// Re-export specific items to avoid ambiguous glob imports
pub use config::{ConfigError, ConfigManager, MuffleConfig, SimulatedDeviceConfig, SimulationConfig, StoreConfig};
pub use device::{
    AudioDevice, DeviceDescription, DeviceId, DeviceType, DisplayName, MixerEvent, MixerEventKind,
    MixerState, ParseDeviceTypeError, UNKNOWN_DEVICE,
};
pub use directory::{
    DeviceDirectory, DirectoryError, DirectoryTiming, MixerControl, MixerHandle, MixerSource,
    MixerSubscription, SignalHandler, SignalId,
};
pub use engine::{
    diff_exclusions, EngineConfig, EngineError, EngineHandle, EnginePhases, ExclusionDiff,
    ReconciliationEngine, SyncPhase,
};
pub use panel::VisibilityPanel;
pub use preferences::{CommandExecutor, CommandResult, DeviceRow, PreferenceCommand, Preferences};
pub use schedule::{delay, SettleScheduler, Ticket};
pub use store::{
    ChangeHandler, ExclusionStore, SettingKey, SettingsBackend, StoreError, SubscriptionId,
};
