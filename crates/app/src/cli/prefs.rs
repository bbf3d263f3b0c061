//! Preference subcommands: list, hide, show, show-disconnected
//!
//! These only touch the settings file. A running session watches that file
//! and reconciles the panel on its own.

use anyhow::Context;
use muffle_core::domain::device::{DeviceType, DisplayName};
use muffle_core::domain::preferences::{
    CommandExecutor, CommandResult, DeviceRow, PreferenceCommand, Preferences,
};
use muffle_core::domain::store::ExclusionStore;
use muffle_infra::settings::TomlSettings;
use std::path::Path;
use std::sync::Arc;

async fn open_preferences(settings_path: &Path) -> anyhow::Result<Preferences> {
    let settings = TomlSettings::open(settings_path)
        .await
        .with_context(|| format!("opening {}", settings_path.display()))?;
    let store = Arc::new(ExclusionStore::new(Arc::new(settings)));
    Ok(Preferences::new(store))
}

fn format_rows(rows: &[DeviceRow]) -> String {
    let mut out = String::new();
    for row in rows {
        let visibility = if row.visible { "shown" } else { "hidden" };
        let presence = if row.connected { "" } else { " (disconnected)" };
        out.push_str(&format!(
            "{:<7} {:<7} {}{}\n",
            row.device_type.as_str(),
            visibility,
            row.display_name,
            presence
        ));
    }
    out
}

pub async fn list(
    settings_path: &Path,
    device_type: Option<DeviceType>,
    json: bool,
) -> anyhow::Result<()> {
    let prefs = open_preferences(settings_path).await?;

    let types: Vec<DeviceType> = match device_type {
        Some(device_type) => vec![device_type],
        None => DeviceType::ALL.to_vec(),
    };
    let mut rows = Vec::new();
    for device_type in types {
        rows.extend(prefs.rows(device_type)?);
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&rows)?);
    } else if rows.is_empty() {
        println!("No devices recorded yet. Start a session with `muffle run`.");
    } else {
        print!("{}", format_rows(&rows));
    }
    Ok(())
}

pub async fn set_visible(
    settings_path: &Path,
    name: DisplayName,
    device_type: DeviceType,
    visible: bool,
) -> anyhow::Result<()> {
    let prefs = open_preferences(settings_path).await?;
    let result = prefs
        .execute(PreferenceCommand::SetVisible {
            name,
            device_type,
            visible,
        })
        .await;

    match result {
        CommandResult::VisibilityChanged {
            name,
            visible,
            changed,
            ..
        } => {
            let state = if visible { "shown" } else { "hidden" };
            if changed {
                println!("{name} is now {state}");
            } else {
                println!("{name} was already {state}");
            }
            Ok(())
        }
        CommandResult::Error(e) => anyhow::bail!(e),
        other => anyhow::bail!("unexpected result: {other:?}"),
    }
}

pub async fn show_disconnected(settings_path: &Path, value: bool) -> anyhow::Result<()> {
    let prefs = open_preferences(settings_path).await?;
    match prefs
        .execute(PreferenceCommand::SetShowDisconnected(value))
        .await
    {
        CommandResult::ShowDisconnectedChanged(value) => {
            println!("show-disconnected-devices = {value}");
            Ok(())
        }
        CommandResult::Error(e) => anyhow::bail!(e),
        other => anyhow::bail!("unexpected result: {other:?}"),
    }
}
