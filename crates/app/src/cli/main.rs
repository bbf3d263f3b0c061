//! muffle CLI Application

mod prefs;
mod session;

use anyhow::Context;
use clap::{ArgAction, Parser, Subcommand};
use muffle_core::domain::config::{ConfigManager, MuffleConfig};
use muffle_core::domain::device::{DeviceType, DisplayName};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "muffle")]
#[command(about = "Keep unwanted audio devices out of the volume panel", long_about = None)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Config file (default: ~/.config/muffle/config.toml)
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run a simulated session with the engine enabled
    Run {
        /// Stop after this many seconds instead of waiting for Ctrl-C
        #[arg(long, value_name = "SECS")]
        for_secs: Option<u64>,
    },
    /// List known devices and whether they are shown
    List {
        /// Only this device class (output or input)
        #[arg(long = "type", value_name = "TYPE")]
        device_type: Option<DeviceType>,

        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },
    /// Hide a device from the volume panel
    Hide {
        name: String,

        #[arg(long = "type", value_name = "TYPE", default_value = "output")]
        device_type: DeviceType,
    },
    /// Show a previously hidden device again
    Show {
        name: String,

        #[arg(long = "type", value_name = "TYPE", default_value = "output")]
        device_type: DeviceType,
    },
    /// List excluded devices that are not connected
    ShowDisconnected {
        #[arg(action = ArgAction::Set, value_name = "BOOL")]
        value: bool,
    },
    /// Manage the config file
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Write the factory default config
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
    /// Print the config file location
    Path,
}

fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn config_manager(path: Option<PathBuf>) -> anyhow::Result<ConfigManager> {
    match path {
        Some(path) => Ok(ConfigManager::with_config_file(path)),
        None => Ok(ConfigManager::new(ConfigManager::default_config_dir()?)),
    }
}

async fn load_config(manager: &ConfigManager) -> (MuffleConfig, PathBuf) {
    let config = manager.load().await;
    let settings_path = config.settings_path(manager.config_dir());
    (config, settings_path)
}

async fn config_command(manager: &ConfigManager, action: ConfigAction) -> anyhow::Result<()> {
    match action {
        ConfigAction::Init { force } => {
            if manager.exists() && !force {
                anyhow::bail!(
                    "{} already exists (use --force to overwrite)",
                    manager.config_path().display()
                );
            }
            manager
                .save(&MuffleConfig::factory_default())
                .await
                .with_context(|| format!("writing {}", manager.config_path().display()))?;
            println!("{}", manager.config_path().display());
        }
        ConfigAction::Path => println!("{}", manager.config_path().display()),
    }
    Ok(())
}

fn settings_hint(path: &Path) -> String {
    format!("settings file {}", path.display())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let manager = config_manager(cli.config)?;

    match cli.command {
        Command::Config { action } => config_command(&manager, action).await,
        Command::Run { for_secs } => {
            let (config, settings_path) = load_config(&manager).await;
            tracing::info!("muffle starting...");
            session::run(config, &settings_path, for_secs.map(Duration::from_secs))
                .await
                .with_context(|| settings_hint(&settings_path))
        }
        Command::List { device_type, json } => {
            let (_, settings_path) = load_config(&manager).await;
            prefs::list(&settings_path, device_type, json).await
        }
        Command::Hide { name, device_type } => {
            let (_, settings_path) = load_config(&manager).await;
            prefs::set_visible(&settings_path, DisplayName::new(name), device_type, false).await
        }
        Command::Show { name, device_type } => {
            let (_, settings_path) = load_config(&manager).await;
            prefs::set_visible(&settings_path, DisplayName::new(name), device_type, true).await
        }
        Command::ShowDisconnected { value } => {
            let (_, settings_path) = load_config(&manager).await;
            prefs::show_disconnected(&settings_path, value).await
        }
    }
}
