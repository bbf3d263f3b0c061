//! Randomized operation sequences always settle to a consistent panel

use muffle_core::domain::device::{DeviceType, DisplayName};
use muffle_tests::{advance, Rig};
use proptest::prelude::*;

const NAMES: [&str; 4] = ["Speakers", "HDMI", "Headset", "Dock"];

#[derive(Debug, Clone)]
enum Op {
    Plug(usize, DeviceType),
    Unplug(usize, DeviceType),
    Exclude(usize, DeviceType),
    Include(usize, DeviceType),
}

fn device_type() -> impl Strategy<Value = DeviceType> {
    prop_oneof![Just(DeviceType::Output), Just(DeviceType::Input)]
}

fn op() -> impl Strategy<Value = Op> {
    let name = 0..NAMES.len();
    prop_oneof![
        (name.clone(), device_type()).prop_map(|(n, t)| Op::Plug(n, t)),
        (name.clone(), device_type()).prop_map(|(n, t)| Op::Unplug(n, t)),
        (name.clone(), device_type()).prop_map(|(n, t)| Op::Exclude(n, t)),
        (name, device_type()).prop_map(|(n, t)| Op::Include(n, t)),
    ]
}

async fn apply(rig: &Rig, op: &Op) {
    match *op {
        Op::Plug(n, t) => {
            // One live device per name keeps the available list comparable
            let name = DisplayName::from(NAMES[n]);
            if !rig.mixer.devices(t).iter().any(|d| d.display_name == name) {
                rig.plug(NAMES[n], None, t);
            }
        }
        Op::Unplug(n, t) => {
            let name = DisplayName::from(NAMES[n]);
            if let Some(device) = rig.mixer.devices(t).into_iter().find(|d| d.display_name == name) {
                rig.mixer.unplug(device.id);
            }
        }
        Op::Exclude(n, t) => {
            rig.store.add_excluded(&DisplayName::from(NAMES[n]), t).unwrap();
        }
        Op::Include(n, t) => {
            rig.store.remove_excluded(&DisplayName::from(NAMES[n]), t).unwrap();
        }
    }
    // Past the host panel's insertion delay, well inside the settle delay
    advance(60).await;
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn prop_any_sequence_settles_consistently(
        initial in prop::collection::vec((0..NAMES.len(), device_type()), 0..4),
        ops in prop::collection::vec(op(), 1..24),
    ) {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .start_paused(true)
            .build()
            .unwrap();

        runtime.block_on(async {
            let rig = Rig::new();
            for (n, t) in &initial {
                apply(&rig, &Op::Plug(*n, *t)).await;
            }
            let engine = rig.enable().await;

            for op in &ops {
                apply(&rig, op).await;
            }
            advance(1000).await;

            assert!(engine.phases().all_settled());
            rig.assert_consistent(DeviceType::Output);
            rig.assert_consistent(DeviceType::Input);
        });
    }
}
