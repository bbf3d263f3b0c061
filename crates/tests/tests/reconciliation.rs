//! End-to-end reconciliation against a panel that mutates on its own
//!
//! The host panel inserts a row shortly after a device is plugged. The engine
//! must outlast that insertion before hiding an excluded device, and must
//! never leave the panel with a duplicate row.

use muffle_core::domain::device::{DeviceType, DisplayName};
use muffle_core::domain::engine::SyncPhase;
use muffle_core::domain::panel::VisibilityPanel;
use muffle_tests::{advance, names, Rig};

// ============================================================================
// STARTUP
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_startup_reaches_consistent_state() {
    let rig = Rig::new();
    rig.plug("Speakers", Some("Built-in Audio"), DeviceType::Output);
    rig.plug("HDMI", Some("Built-in Audio"), DeviceType::Output);
    rig.plug("Webcam", Some("USB"), DeviceType::Input);
    rig.store
        .set_excluded(DeviceType::Output, &names(&["HDMI \u{2013} Built-in Audio"]))
        .unwrap();
    rig.store
        .set_excluded(DeviceType::Input, &names(&["Webcam \u{2013} USB"]))
        .unwrap();

    let engine = rig.enable().await;

    assert!(engine.phases().all_settled());
    assert_eq!(
        rig.shown_names(DeviceType::Output),
        names(&["Speakers \u{2013} Built-in Audio"])
    );
    assert!(rig.shown_names(DeviceType::Input).is_empty());
    for device_type in DeviceType::ALL {
        rig.assert_consistent(device_type);
    }
}

#[tokio::test(start_paused = true)]
async fn test_excluded_name_not_present_is_ignored() {
    let rig = Rig::new();
    rig.plug("Speakers", None, DeviceType::Output);
    rig.store
        .set_excluded(DeviceType::Output, &names(&["Bluetooth Headset"]))
        .unwrap();

    let _engine = rig.enable().await;

    assert_eq!(rig.shown_names(DeviceType::Output), names(&["Speakers"]));
    rig.assert_consistent(DeviceType::Output);
}

// ============================================================================
// HOTPLUG RACE WITH THE HOST PANEL
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_excluded_device_hidden_after_host_inserts_it() {
    let rig = Rig::new();
    rig.store
        .set_excluded(DeviceType::Output, &names(&["Dock"]))
        .unwrap();
    let engine = rig.enable().await;

    let dock = rig.plug("Dock", None, DeviceType::Output);
    advance(1).await;
    assert_eq!(engine.phases().output, SyncPhase::Syncing);

    // The host panel inserts the row before the settle delay runs out
    advance(100).await;
    assert!(rig.panel.is_shown(dock, DeviceType::Output));

    advance(200).await;
    assert!(!rig.panel.is_shown(dock, DeviceType::Output));
    assert_eq!(engine.phases().output, SyncPhase::Settled);
    rig.assert_consistent(DeviceType::Output);
}

#[tokio::test(start_paused = true)]
async fn test_plain_device_left_to_host() {
    let rig = Rig::new();
    let engine = rig.enable().await;

    let mic = rig.plug("Mic", None, DeviceType::Input);
    advance(100).await;

    assert_eq!(rig.panel.row_count(mic, DeviceType::Input), 1);
    assert_eq!(
        rig.store.get_available(DeviceType::Input).unwrap(),
        names(&["Mic"])
    );
    assert!(engine.phases().all_settled());
    rig.assert_consistent(DeviceType::Input);
}

#[tokio::test(start_paused = true)]
async fn test_unplug_before_settle_cancels_hide() {
    let rig = Rig::new();
    rig.store
        .set_excluded(DeviceType::Output, &names(&["Dock"]))
        .unwrap();
    let engine = rig.enable().await;

    let dock = rig.plug("Dock", None, DeviceType::Output);
    advance(100).await;
    assert!(rig.mixer.unplug(dock));
    advance(1).await;

    assert!(engine.phases().all_settled());
    advance(500).await;
    assert!(!rig.panel.is_shown(dock, DeviceType::Output));
    assert!(rig.store.get_available(DeviceType::Output).unwrap().is_empty());
    rig.assert_consistent(DeviceType::Output);
}

#[tokio::test(start_paused = true)]
async fn test_replug_gets_fresh_id_and_is_hidden_again() {
    let rig = Rig::new();
    rig.store
        .set_excluded(DeviceType::Input, &names(&["Webcam"]))
        .unwrap();
    let _engine = rig.enable().await;

    let first = rig.plug("Webcam", None, DeviceType::Input);
    advance(300).await;
    rig.mixer.unplug(first);
    let second = rig.plug("Webcam", None, DeviceType::Input);
    advance(300).await;

    assert_ne!(first, second);
    assert!(!rig.panel.is_shown(second, DeviceType::Input));
    rig.assert_consistent(DeviceType::Input);
}

#[tokio::test(start_paused = true)]
async fn test_device_gone_before_added_event_leaves_available_list_alone() {
    let rig = Rig::new();
    // Present, but without a description: listed under the fallback name
    rig.mixer.plug(None, None, DeviceType::Output);
    let _engine = rig.enable().await;
    assert_eq!(
        rig.store.get_available(DeviceType::Output).unwrap(),
        names(&["unknown device"])
    );

    // Both events are queued before the engine sees the device
    let dock = rig.plug("Dock", None, DeviceType::Output);
    rig.mixer.unplug(dock);
    advance(100).await;

    assert_eq!(
        rig.store.get_available(DeviceType::Output).unwrap(),
        names(&["unknown device"])
    );
    rig.assert_consistent(DeviceType::Output);
}

// ============================================================================
// EXCLUSION CHANGES
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_including_name_again_shows_every_device_with_it() {
    let rig = Rig::new();
    rig.store
        .set_excluded(DeviceType::Output, &names(&["Dock"]))
        .unwrap();
    let _engine = rig.enable().await;

    let first = rig.plug("Dock", None, DeviceType::Output);
    let second = rig.plug("Dock", None, DeviceType::Output);
    advance(300).await;
    assert!(!rig.panel.is_shown(first, DeviceType::Output));
    assert!(!rig.panel.is_shown(second, DeviceType::Output));

    rig.store
        .remove_excluded(&DisplayName::from("Dock"), DeviceType::Output)
        .unwrap();
    advance(1).await;

    assert_eq!(rig.panel.row_count(first, DeviceType::Output), 1);
    assert_eq!(rig.panel.row_count(second, DeviceType::Output), 1);
    rig.assert_consistent(DeviceType::Output);
}

#[tokio::test(start_paused = true)]
async fn test_toggling_exclusions_keeps_panel_consistent() {
    let rig = Rig::new();
    let speakers = rig.plug("Speakers", None, DeviceType::Output);
    let hdmi = rig.plug("HDMI", None, DeviceType::Output);
    let _engine = rig.enable().await;

    let hdmi_name = DisplayName::from("HDMI");
    rig.store.add_excluded(&hdmi_name, DeviceType::Output).unwrap();
    advance(1).await;
    assert!(!rig.panel.is_shown(hdmi, DeviceType::Output));
    rig.assert_consistent(DeviceType::Output);

    rig.store.remove_excluded(&hdmi_name, DeviceType::Output).unwrap();
    advance(1).await;
    assert_eq!(rig.panel.row_count(hdmi, DeviceType::Output), 1);
    rig.assert_consistent(DeviceType::Output);

    // Hide both at once, then show both at once
    rig.store
        .set_excluded(DeviceType::Output, &names(&["Speakers", "HDMI"]))
        .unwrap();
    advance(1).await;
    assert!(rig.panel.list_shown(DeviceType::Output).is_empty());

    rig.store.set_excluded(DeviceType::Output, &[]).unwrap();
    advance(1).await;
    assert_eq!(rig.panel.row_count(speakers, DeviceType::Output), 1);
    assert_eq!(rig.panel.row_count(hdmi, DeviceType::Output), 1);
    rig.assert_consistent(DeviceType::Output);
}

#[tokio::test(start_paused = true)]
async fn test_exclusion_change_only_touches_its_class() {
    let rig = Rig::new();
    let speakers = rig.plug("Shared", None, DeviceType::Output);
    let mic = rig.plug("Shared", None, DeviceType::Input);
    let _engine = rig.enable().await;

    rig.store
        .add_excluded(&DisplayName::from("Shared"), DeviceType::Input)
        .unwrap();
    advance(1).await;

    assert!(rig.panel.is_shown(speakers, DeviceType::Output));
    assert!(!rig.panel.is_shown(mic, DeviceType::Input));
    rig.assert_consistent(DeviceType::Output);
    rig.assert_consistent(DeviceType::Input);
}

#[tokio::test(start_paused = true)]
async fn test_showing_during_pending_hide_wins() {
    let rig = Rig::new();
    rig.store
        .set_excluded(DeviceType::Output, &names(&["Dock"]))
        .unwrap();
    let _engine = rig.enable().await;

    let dock = rig.plug("Dock", None, DeviceType::Output);
    advance(100).await;
    rig.store
        .remove_excluded(&DisplayName::from("Dock"), DeviceType::Output)
        .unwrap();
    advance(500).await;

    assert_eq!(rig.panel.row_count(dock, DeviceType::Output), 1);
    rig.assert_consistent(DeviceType::Output);
}

#[tokio::test(start_paused = true)]
async fn test_mixed_sequence_settles_consistently() {
    let rig = Rig::new();
    rig.plug("Speakers", None, DeviceType::Output);
    rig.plug("Mic", None, DeviceType::Input);
    rig.store
        .set_excluded(DeviceType::Output, &names(&["TV"]))
        .unwrap();
    let engine = rig.enable().await;

    let tv = rig.plug("TV", None, DeviceType::Output);
    rig.plug("Headset", None, DeviceType::Output);
    rig.plug("Headset Mic", None, DeviceType::Input);
    advance(20).await;
    rig.store
        .add_excluded(&DisplayName::from("Mic"), DeviceType::Input)
        .unwrap();
    advance(20).await;
    rig.mixer.unplug(tv);
    rig.plug("TV", None, DeviceType::Output);
    advance(100).await;
    rig.store
        .add_excluded(&DisplayName::from("Headset"), DeviceType::Output)
        .unwrap();

    advance(1000).await;
    assert!(engine.phases().all_settled());
    rig.assert_consistent(DeviceType::Output);
    rig.assert_consistent(DeviceType::Input);
}
