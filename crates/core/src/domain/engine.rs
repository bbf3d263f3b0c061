//! Reconciliation engine
//!
//! Keeps three things eventually consistent for each device class:
//! - the devices the volume panel shows
//! - the names the user excluded
//! - the names the mixer reports as present (the "available" list)
//!
//! At a settled state the panel shows exactly available minus excluded.
//! Events from the mixer and from the settings store are funnelled into one
//! channel and handled one at a time by a single task, so handlers never
//! interleave. The host panel is a concurrent writer the engine does not
//! control, which is why removals of newly added devices wait for a settle
//! delay first.

use crate::domain::device::{AudioDevice, DeviceId, DeviceType, DisplayName, MixerEvent};
use crate::domain::directory::{
    DeviceDirectory, DirectoryError, DirectoryTiming, MixerSource, MixerSubscription,
};
use crate::domain::panel::VisibilityPanel;
use crate::domain::schedule::{SettleScheduler, Ticket};
use crate::domain::store::{ExclusionStore, SettingKey, StoreError, SubscriptionId};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::ops::ControlFlow;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, instrument, trace, warn};

#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Directory(#[from] DirectoryError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

pub type Result<T> = std::result::Result<T, EngineError>;

/// Engine timing, in milliseconds
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Wait before hiding a newly added excluded device
    pub settle_delay_ms: u64,

    /// Poll interval while the mixer is connecting
    pub ready_poll_interval_ms: u64,

    /// Extra wait once the mixer reports ready
    pub post_ready_delay_ms: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            settle_delay_ms: 250,
            ready_poll_interval_ms: 200,
            post_ready_delay_ms: 200,
        }
    }
}

impl EngineConfig {
    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }

    pub fn directory_timing(&self) -> DirectoryTiming {
        DirectoryTiming {
            poll_interval: Duration::from_millis(self.ready_poll_interval_ms),
            post_ready_delay: Duration::from_millis(self.post_ready_delay_ms),
        }
    }
}

/// Reconciliation state of one device class
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SyncPhase {
    Uninitialized,
    Syncing,
    Settled,
    Disposed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct EnginePhases {
    pub output: SyncPhase,
    pub input: SyncPhase,
}

impl EnginePhases {
    fn uninitialized() -> Self {
        Self {
            output: SyncPhase::Uninitialized,
            input: SyncPhase::Uninitialized,
        }
    }

    pub fn get(&self, device_type: DeviceType) -> SyncPhase {
        match device_type {
            DeviceType::Output => self.output,
            DeviceType::Input => self.input,
        }
    }

    fn slot(&mut self, device_type: DeviceType) -> &mut SyncPhase {
        match device_type {
            DeviceType::Output => &mut self.output,
            DeviceType::Input => &mut self.input,
        }
    }

    pub fn all_settled(&self) -> bool {
        self.output == SyncPhase::Settled && self.input == SyncPhase::Settled
    }

    pub fn is_disposed(&self) -> bool {
        self.output == SyncPhase::Disposed && self.input == SyncPhase::Disposed
    }
}

/// Names that left and entered an exclusion list
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExclusionDiff {
    pub to_show: Vec<DisplayName>,
    pub to_hide: Vec<DisplayName>,
}

impl ExclusionDiff {
    pub fn is_empty(&self) -> bool {
        self.to_show.is_empty() && self.to_hide.is_empty()
    }
}

/// `to_show = previous - current`, `to_hide = current - previous`, in list order
pub fn diff_exclusions(previous: &[DisplayName], current: &[DisplayName]) -> ExclusionDiff {
    ExclusionDiff {
        to_show: previous
            .iter()
            .filter(|name| !current.contains(name))
            .cloned()
            .collect(),
        to_hide: current
            .iter()
            .filter(|name| !previous.contains(name))
            .cloned()
            .collect(),
    }
}

/// Inputs of the engine loop
#[derive(Debug)]
pub enum EngineEvent {
    Mixer(MixerEvent),
    ExclusionChanged(DeviceType),
    SettleElapsed {
        device_type: DeviceType,
        device_id: DeviceId,
        ticket: Ticket,
    },
    Shutdown,
}

#[derive(Default)]
struct ClassState {
    previous_excluded: Vec<DisplayName>,
    /// Last name seen per id; devices may be gone from the mixer by the
    /// time their removal is handled
    known_names: HashMap<DeviceId, DisplayName>,
    /// Ids the engine has hidden and not shown since
    hidden: HashSet<DeviceId>,
}

type SettleKey = (DeviceType, DeviceId);

struct Reconciler {
    directory: DeviceDirectory,
    store: Arc<ExclusionStore>,
    panel: Arc<dyn VisibilityPanel>,
    settle_delay: Duration,
    output: ClassState,
    input: ClassState,
    scheduler: SettleScheduler<SettleKey>,
    events: mpsc::UnboundedSender<EngineEvent>,
    mixer_subscription: Option<MixerSubscription>,
    store_subscriptions: Vec<SubscriptionId>,
    phases: watch::Sender<EnginePhases>,
    disposed: bool,
}

impl Reconciler {
    fn class(&self, device_type: DeviceType) -> &ClassState {
        match device_type {
            DeviceType::Output => &self.output,
            DeviceType::Input => &self.input,
        }
    }

    fn class_mut(&mut self, device_type: DeviceType) -> &mut ClassState {
        match device_type {
            DeviceType::Output => &mut self.output,
            DeviceType::Input => &mut self.input,
        }
    }

    fn set_phase(&self, device_type: DeviceType, phase: SyncPhase) {
        self.phases.send_if_modified(|phases| {
            let slot = phases.slot(device_type);
            if *slot == phase || *slot == SyncPhase::Disposed {
                return false;
            }
            *slot = phase;
            true
        });
    }

    /// Settled unless a removal is still waiting on its settle delay
    fn refresh_phase(&self, device_type: DeviceType) {
        let pending = self
            .scheduler
            .has_pending_where(|(t, _)| *t == device_type);
        let phase = if pending {
            SyncPhase::Syncing
        } else {
            SyncPhase::Settled
        };
        self.set_phase(device_type, phase);
    }

    fn remember(&mut self, device: &AudioDevice) {
        self.class_mut(device.device_type)
            .known_names
            .insert(device.id, device.display_name.clone());
    }

    fn resolve_ids(&mut self, names: &[DisplayName], device_type: DeviceType) -> Vec<DeviceId> {
        let devices: Vec<AudioDevice> = self
            .directory
            .resolve_by_names(names, device_type)
            .into_iter()
            .flatten()
            .collect();

        devices
            .iter()
            .map(|device| {
                self.remember(device);
                device.id
            })
            .collect()
    }

    /// Ids this engine hid under one of `names` that are still present
    fn hidden_named(&self, names: &[DisplayName], device_type: DeviceType) -> Vec<DeviceId> {
        let class = self.class(device_type);
        let mut ids: Vec<DeviceId> = class
            .hidden
            .iter()
            .copied()
            .filter(|id| class.known_names.get(id).is_some_and(|name| names.contains(name)))
            .filter(|&id| self.directory.lookup(id, device_type).is_some())
            .collect();
        ids.sort_unstable();
        ids
    }

    fn show(&mut self, id: DeviceId, device_type: DeviceType) {
        self.class_mut(device_type).hidden.remove(&id);
        if self.panel.is_shown(id, device_type) {
            trace!(%id, %device_type, "Already shown");
            return;
        }
        self.panel.add(id, device_type);
        debug!(%id, %device_type, "Device shown");
    }

    fn hide(&mut self, id: DeviceId, device_type: DeviceType) {
        self.class_mut(device_type).hidden.insert(id);
        if !self.panel.is_shown(id, device_type) {
            trace!(%id, %device_type, "Already hidden");
            return;
        }
        self.panel.remove(id, device_type);
        debug!(%id, %device_type, "Device hidden");
    }

    fn start(&mut self) -> Result<()> {
        for device_type in DeviceType::ALL {
            self.set_phase(device_type, SyncPhase::Syncing);
            self.sync_available(device_type)?;
            self.hide_excluded(device_type)?;
        }
        self.subscribe()?;
        for device_type in DeviceType::ALL {
            self.refresh_phase(device_type);
        }
        info!("Reconciliation engine enabled");
        Ok(())
    }

    /// Overwrite the available list with what the panel shows right now
    fn sync_available(&mut self, device_type: DeviceType) -> Result<()> {
        let shown = self.panel.list_shown(device_type);
        let devices = self.directory.resolve(&shown, device_type);

        let mut names: Vec<DisplayName> = Vec::with_capacity(devices.len());
        for device in &devices {
            self.remember(device);
            if !names.contains(&device.display_name) {
                names.push(device.display_name.clone());
            }
        }

        self.store.set_available(device_type, &names)?;
        debug!(%device_type, count = names.len(), "Available devices recorded");
        Ok(())
    }

    fn hide_excluded(&mut self, device_type: DeviceType) -> Result<()> {
        let excluded = self.store.get_excluded(device_type)?;
        let ids = self.resolve_ids(&excluded, device_type);
        debug!(
            %device_type,
            excluded = excluded.len(),
            present = ids.len(),
            "Hiding excluded devices"
        );

        for id in ids {
            self.hide(id, device_type);
        }
        self.class_mut(device_type).previous_excluded = excluded;
        Ok(())
    }

    fn subscribe(&mut self) -> Result<()> {
        let events = self.events.clone();
        let subscription = self.directory.subscribe(move |event| {
            if events.send(EngineEvent::Mixer(event)).is_err() {
                trace!(?event, "Engine stopped, dropping mixer event");
            }
        })?;
        self.mixer_subscription = Some(subscription);

        for device_type in DeviceType::ALL {
            let events = self.events.clone();
            let id = self
                .store
                .on_change(SettingKey::excluded(device_type), move |_| {
                    let _ = events.send(EngineEvent::ExclusionChanged(device_type));
                })?;
            self.store_subscriptions.push(id);
        }
        Ok(())
    }

    fn handle(&mut self, event: EngineEvent) -> ControlFlow<()> {
        let (device_type, result) = match event {
            EngineEvent::Mixer(MixerEvent { kind, device_id }) => {
                let device_type = kind.device_type();
                self.set_phase(device_type, SyncPhase::Syncing);
                let result = if kind.is_added() {
                    self.device_added(device_id, device_type)
                } else {
                    self.device_removed(device_id, device_type)
                };
                (device_type, result)
            }
            EngineEvent::ExclusionChanged(device_type) => {
                self.set_phase(device_type, SyncPhase::Syncing);
                (device_type, self.exclusion_changed(device_type))
            }
            EngineEvent::SettleElapsed {
                device_type,
                device_id,
                ticket,
            } => (
                device_type,
                self.settle_elapsed(device_id, device_type, ticket),
            ),
            EngineEvent::Shutdown => return ControlFlow::Break(()),
        };

        if let Err(e) = result {
            error!(%device_type, error = %e, "Failed to reconcile event");
        }
        self.refresh_phase(device_type);
        ControlFlow::Continue(())
    }

    fn device_added(&mut self, id: DeviceId, device_type: DeviceType) -> Result<()> {
        let Some(device) = self.directory.lookup(id, device_type) else {
            // Already gone; its name can no longer be told apart from a
            // present device without a description
            debug!(%id, %device_type, "Device left before it could be recorded");
            return Ok(());
        };
        self.remember(&device);
        self.class_mut(device_type).hidden.remove(&id);

        let name = device.display_name;
        if self.store.add_available(&name, device_type)? {
            debug!(%id, %device_type, %name, "New device recorded as available");
        }

        if self.store.get_excluded(device_type)?.contains(&name) {
            let events = self.events.clone();
            self.scheduler.schedule(
                (device_type, id),
                self.settle_delay,
                move |ticket| {
                    let _ = events.send(EngineEvent::SettleElapsed {
                        device_type,
                        device_id: id,
                        ticket,
                    });
                },
            );
            debug!(%id, %device_type, %name, "Excluded device added, removal scheduled");
        } else if self.scheduler.cancel(&(device_type, id)) {
            debug!(%id, %device_type, "Dropped stale pending removal");
        }
        Ok(())
    }

    fn device_removed(&mut self, id: DeviceId, device_type: DeviceType) -> Result<()> {
        if self.scheduler.cancel(&(device_type, id)) {
            debug!(%id, %device_type, "Device left before its removal was due");
        }

        let class = self.class_mut(device_type);
        class.hidden.remove(&id);
        let known = class.known_names.remove(&id);

        let name = match known {
            Some(name) => name,
            None => {
                let resolved = self
                    .directory
                    .resolve(&[id], device_type)
                    .into_iter()
                    .next()
                    .map(|device| device.display_name);
                match resolved {
                    Some(name) if !name.is_unknown() => name,
                    _ => {
                        warn!(%id, %device_type, "Removed device has no known name");
                        return Ok(());
                    }
                }
            }
        };

        if self.store.remove_available(&name, device_type)? {
            debug!(%id, %device_type, %name, "Device no longer available");
        }
        Ok(())
    }

    fn exclusion_changed(&mut self, device_type: DeviceType) -> Result<()> {
        let current = self.store.get_excluded(device_type)?;
        let diff = diff_exclusions(&self.class(device_type).previous_excluded, &current);

        if !diff.is_empty() {
            debug!(
                %device_type,
                show = diff.to_show.len(),
                hide = diff.to_hide.len(),
                "Exclusion list changed"
            );

            let mut to_show = self.resolve_ids(&diff.to_show, device_type);
            for id in self.hidden_named(&diff.to_show, device_type) {
                if !to_show.contains(&id) {
                    to_show.push(id);
                }
            }
            for id in to_show {
                self.scheduler.cancel(&(device_type, id));
                self.show(id, device_type);
            }
            for id in self.resolve_ids(&diff.to_hide, device_type) {
                self.hide(id, device_type);
            }
        }

        self.class_mut(device_type).previous_excluded = current;
        Ok(())
    }

    fn settle_elapsed(
        &mut self,
        id: DeviceId,
        device_type: DeviceType,
        ticket: Ticket,
    ) -> Result<()> {
        if !self.scheduler.complete(&(device_type, id), ticket) {
            trace!(%id, %device_type, "Ignoring stale settle timer");
            return Ok(());
        }

        let Some(name) = self.class(device_type).known_names.get(&id).cloned() else {
            return Ok(());
        };
        if self.store.get_excluded(device_type)?.contains(&name) {
            self.hide(id, device_type);
        }
        Ok(())
    }

    /// Show every excluded device that is still present
    fn restore(&mut self, device_type: DeviceType) {
        let mut names = match self.store.get_excluded(device_type) {
            Ok(names) => names,
            Err(e) => {
                warn!(%device_type, error = %e, "Could not read exclusions, using last known list");
                Vec::new()
            }
        };
        let previous = self.class(device_type).previous_excluded.clone();
        for name in previous {
            if !names.contains(&name) {
                names.push(name);
            }
        }

        let mut ids = self.resolve_ids(&names, device_type);
        // Name lookups only find the first device per name
        let mut hidden: Vec<DeviceId> = self.class(device_type).hidden.iter().copied().collect();
        hidden.sort_unstable();
        for id in hidden {
            if !ids.contains(&id) && self.directory.lookup(id, device_type).is_some() {
                ids.push(id);
            }
        }

        for id in ids {
            self.show(id, device_type);
        }
        self.class_mut(device_type).hidden.clear();
    }

    fn teardown(&mut self) {
        if self.disposed {
            return;
        }

        if let Some(subscription) = self.mixer_subscription.take() {
            self.directory.unsubscribe(&subscription);
        }
        for id in self.store_subscriptions.drain(..) {
            self.store.disconnect(id);
        }
        self.scheduler.dispose();

        for device_type in DeviceType::ALL {
            self.restore(device_type);
        }
        self.directory.dispose();
        self.disposed = true;

        self.phases.send_replace(EnginePhases {
            output: SyncPhase::Disposed,
            input: SyncPhase::Disposed,
        });
        info!("Reconciliation engine disabled");
    }
}

impl Drop for Reconciler {
    fn drop(&mut self) {
        self.teardown();
    }
}

async fn run(mut reconciler: Reconciler, mut events: mpsc::UnboundedReceiver<EngineEvent>) {
    while let Some(event) = events.recv().await {
        trace!(?event, "Engine event");
        if reconciler.handle(event).is_break() {
            break;
        }
    }
    reconciler.teardown();
}

pub struct ReconciliationEngine;

impl ReconciliationEngine {
    /// Acquire the mixer, bring the panel in line with the stored
    /// exclusions and start following changes.
    ///
    /// Fails without retrying when the mixer is unavailable.
    #[instrument(skip_all)]
    pub async fn enable(
        source: &dyn MixerSource,
        store: Arc<ExclusionStore>,
        panel: Arc<dyn VisibilityPanel>,
        config: EngineConfig,
    ) -> Result<EngineHandle> {
        info!("Enabling reconciliation engine");
        let (phases_tx, phases_rx) = watch::channel(EnginePhases::uninitialized());

        let directory = match DeviceDirectory::acquire(source, &config.directory_timing()).await {
            Ok(directory) => directory,
            Err(e) => {
                error!(error = %e, "Mixer unavailable, aborting startup");
                return Err(e.into());
            }
        };

        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let mut reconciler = Reconciler {
            directory,
            store,
            panel,
            settle_delay: config.settle_delay(),
            output: ClassState::default(),
            input: ClassState::default(),
            scheduler: SettleScheduler::new(),
            events: events_tx.clone(),
            mixer_subscription: None,
            store_subscriptions: Vec::new(),
            phases: phases_tx,
            disposed: false,
        };

        if let Err(e) = reconciler.start() {
            error!(error = %e, "Startup failed, rolling back");
            reconciler.teardown();
            return Err(e);
        }

        let task = tokio::spawn(run(reconciler, events_rx));
        Ok(EngineHandle {
            events: events_tx,
            phases: phases_rx,
            task: Some(task),
        })
    }
}

/// Running engine. Dropping it requests shutdown.
pub struct EngineHandle {
    events: mpsc::UnboundedSender<EngineEvent>,
    phases: watch::Receiver<EnginePhases>,
    task: Option<JoinHandle<()>>,
}

impl EngineHandle {
    pub fn phases(&self) -> EnginePhases {
        *self.phases.borrow()
    }

    pub fn watch_phases(&self) -> watch::Receiver<EnginePhases> {
        self.phases.clone()
    }

    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|task| !task.is_finished())
    }

    /// Stop following changes and show every hidden device again
    #[instrument(skip(self))]
    pub async fn disable(mut self) {
        if self.events.send(EngineEvent::Shutdown).is_err() {
            warn!("Engine loop already stopped");
        }
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                error!(error = %e, "Engine task ended abnormally");
            }
        }
    }
}

impl Drop for EngineHandle {
    fn drop(&mut self) {
        if self.task.is_some() {
            let _ = self.events.send(EngineEvent::Shutdown);
        }
    }
}
