//! Disabling the engine: hidden devices come back, signals are released and
//! late events are harmless

use muffle_core::domain::device::{DeviceType, DisplayName, MixerState};
use muffle_core::domain::engine::{ReconciliationEngine, SyncPhase};
use muffle_core::domain::panel::VisibilityPanel;
use muffle_core::domain::store::ExclusionStore;
use muffle_infra::mixer::{SimulatedMixer, SimulatedMixerSource};
use muffle_infra::panel::MemoryPanel;
use muffle_infra::settings::MemorySettings;
use muffle_tests::{advance, names, test_config, Rig};
use std::sync::Arc;

#[tokio::test(start_paused = true)]
async fn test_disable_restores_hidden_devices() {
    let rig = Rig::new();
    let speakers = rig.plug("Speakers", None, DeviceType::Output);
    let hdmi = rig.plug("HDMI", None, DeviceType::Output);
    let mic = rig.plug("Mic", None, DeviceType::Input);
    rig.store
        .set_excluded(DeviceType::Output, &names(&["HDMI"]))
        .unwrap();
    let engine = rig.enable().await;

    rig.store
        .add_excluded(&DisplayName::from("Mic"), DeviceType::Input)
        .unwrap();
    advance(1).await;
    assert!(!rig.panel.is_shown(hdmi, DeviceType::Output));
    assert!(!rig.panel.is_shown(mic, DeviceType::Input));

    let mut phases = engine.watch_phases();
    engine.disable().await;

    assert!(phases.borrow_and_update().is_disposed());
    for (id, device_type) in [
        (speakers, DeviceType::Output),
        (hdmi, DeviceType::Output),
        (mic, DeviceType::Input),
    ] {
        assert_eq!(rig.panel.row_count(id, device_type), 1);
    }
    assert_eq!(rig.engine_signal_count(), 0);

    // Exclusions are kept for the next session
    assert_eq!(
        rig.store.get_excluded(DeviceType::Output).unwrap(),
        names(&["HDMI"])
    );
}

#[tokio::test(start_paused = true)]
async fn test_disable_restores_every_hidden_device_sharing_a_name() {
    let rig = Rig::new();
    rig.store
        .set_excluded(DeviceType::Output, &names(&["Dock"]))
        .unwrap();
    let engine = rig.enable().await;

    let first = rig.plug("Dock", None, DeviceType::Output);
    let second = rig.plug("Dock", None, DeviceType::Output);
    advance(300).await;
    assert!(!rig.panel.is_shown(first, DeviceType::Output));
    assert!(!rig.panel.is_shown(second, DeviceType::Output));

    engine.disable().await;

    assert_eq!(rig.panel.row_count(first, DeviceType::Output), 1);
    assert_eq!(rig.panel.row_count(second, DeviceType::Output), 1);
}

#[tokio::test(start_paused = true)]
async fn test_disable_with_pending_hide_shows_device() {
    let rig = Rig::new();
    rig.store
        .set_excluded(DeviceType::Output, &names(&["Dock"]))
        .unwrap();
    let engine = rig.enable().await;

    let dock = rig.plug("Dock", None, DeviceType::Output);
    advance(100).await;
    engine.disable().await;

    // The settle timer was cancelled, so nothing hides the row later
    advance(1000).await;
    assert_eq!(rig.panel.row_count(dock, DeviceType::Output), 1);
}

#[tokio::test(start_paused = true)]
async fn test_events_after_disable_are_ignored() {
    let rig = Rig::new();
    let speakers = rig.plug("Speakers", None, DeviceType::Output);
    let engine = rig.enable().await;
    engine.disable().await;

    rig.store
        .add_excluded(&DisplayName::from("Speakers"), DeviceType::Output)
        .unwrap();
    let tv = rig.plug("TV", None, DeviceType::Output);
    advance(500).await;

    assert!(rig.panel.is_shown(speakers, DeviceType::Output));
    assert!(rig.panel.is_shown(tv, DeviceType::Output));
    // The engine no longer maintains the available list
    assert_eq!(
        rig.store.get_available(DeviceType::Output).unwrap(),
        names(&["Speakers"])
    );
}

#[tokio::test(start_paused = true)]
async fn test_dropping_handle_disposes_engine() {
    let rig = Rig::new();
    let hdmi = rig.plug("HDMI", None, DeviceType::Output);
    rig.store
        .set_excluded(DeviceType::Output, &names(&["HDMI"]))
        .unwrap();

    let engine = rig.enable().await;
    let mut phases = engine.watch_phases();
    assert!(!rig.panel.is_shown(hdmi, DeviceType::Output));

    drop(engine);
    while phases.changed().await.is_ok() {
        if phases.borrow().is_disposed() {
            break;
        }
    }

    assert_eq!(rig.panel.row_count(hdmi, DeviceType::Output), 1);
    assert_eq!(rig.engine_signal_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_owned_mixer_closed_on_disable_shared_kept_open() {
    let store = Arc::new(ExclusionStore::new(Arc::new(MemorySettings::new())));
    let panel = Arc::new(MemoryPanel::new());

    let owned = Arc::new(SimulatedMixer::ready());
    let engine = ReconciliationEngine::enable(
        &SimulatedMixerSource::owned(owned.clone()),
        store.clone(),
        panel.clone(),
        test_config(),
    )
    .await
    .unwrap();
    engine.disable().await;
    assert!(owned.is_closed());

    let shared = Arc::new(SimulatedMixer::ready());
    let engine = ReconciliationEngine::enable(
        &SimulatedMixerSource::shared(shared.clone()),
        store,
        panel,
        test_config(),
    )
    .await
    .unwrap();
    engine.disable().await;
    assert!(!shared.is_closed());
    assert_eq!(shared.handler_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_failed_mixer_aborts_startup_without_side_effects() {
    let store = Arc::new(ExclusionStore::new(Arc::new(MemorySettings::new())));
    let panel = Arc::new(MemoryPanel::new());
    let mixer = Arc::new(SimulatedMixer::new(3));
    mixer.set_state(MixerState::Failed);

    let result = ReconciliationEngine::enable(
        &SimulatedMixerSource::shared(mixer.clone()),
        store.clone(),
        panel,
        test_config(),
    )
    .await;

    assert!(result.is_err());
    assert_eq!(mixer.handler_count(), 0);
    assert!(store.get_available(DeviceType::Output).unwrap().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_phases_progress_to_settled() {
    let rig = Rig::new();
    let engine = rig.enable().await;
    assert_eq!(engine.phases().get(DeviceType::Output), SyncPhase::Settled);
    assert_eq!(engine.phases().get(DeviceType::Input), SyncPhase::Settled);
    assert!(engine.is_running());
}
