//! `muffle run`: a simulated desktop session with the engine enabled
//!
//! The mixer is seeded from the config, the panel follows it like the host
//! panel would, and the settings file is watched so `muffle hide` from
//! another terminal takes effect here.

use muffle_core::domain::config::MuffleConfig;
use muffle_core::domain::device::DeviceType;
use muffle_core::domain::directory::MixerControl;
use muffle_core::domain::engine::ReconciliationEngine;
use muffle_core::domain::panel::VisibilityPanel;
use muffle_core::domain::store::ExclusionStore;
use muffle_infra::mixer::{SimulatedMixer, SimulatedMixerSource};
use muffle_infra::panel::MemoryPanel;
use muffle_infra::settings::TomlSettings;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, instrument, warn};

fn log_panel(mixer: &SimulatedMixer, panel: &MemoryPanel) {
    for device_type in DeviceType::ALL {
        let shown = panel.list_shown(device_type);
        for device in mixer.devices(device_type) {
            info!(
                %device_type,
                name = %device.display_name,
                shown = shown.contains(&device.id),
                "Panel row"
            );
        }
    }
}

#[instrument(skip(config, settings_path))]
pub async fn run(
    config: MuffleConfig,
    settings_path: &Path,
    for_secs: Option<Duration>,
) -> anyhow::Result<()> {
    let settings = Arc::new(TomlSettings::open(settings_path).await?);
    if let Err(e) = settings.watch() {
        warn!(error = %e, "Settings changes from other processes will not be picked up");
    }
    let store = Arc::new(ExclusionStore::new(settings.clone()));

    let mixer = Arc::new(SimulatedMixer::from_config(&config.simulation));
    let panel = Arc::new(MemoryPanel::new());
    let panel_signals = panel.follow_mixer(
        &mixer,
        Duration::from_millis(config.simulation.host_insert_delay_ms),
    );

    let engine = ReconciliationEngine::enable(
        &SimulatedMixerSource::shared(mixer.clone()),
        store,
        panel.clone(),
        config.engine.clone(),
    )
    .await?;

    let mut phases = engine.watch_phases();
    let deadline = async {
        match for_secs {
            Some(duration) => tokio::time::sleep(duration).await,
            None => std::future::pending().await,
        }
    };
    tokio::pin!(deadline);

    loop {
        if phases.borrow_and_update().all_settled() {
            info!("Panel settled");
            log_panel(&mixer, &panel);
        }

        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted");
                break;
            }
            _ = &mut deadline => {
                info!("Session time elapsed");
                break;
            }
            changed = phases.changed() => {
                if changed.is_err() {
                    warn!("Engine stopped on its own");
                    break;
                }
            }
        }
    }

    engine.disable().await;
    for signal in panel_signals {
        mixer.disconnect(signal);
    }

    info!("Engine disabled, hidden devices restored");
    log_panel(&mixer, &panel);
    Ok(())
}
