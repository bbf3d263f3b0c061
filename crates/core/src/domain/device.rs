//! Audio device identity and mixer event types
//!
//! Device ids are handed out by the mixer and only live as long as the device
//! instance does. Display names are derived from the device description and
//! origin and are what gets persisted across sessions.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Description used when the mixer reports none
pub const UNKNOWN_DEVICE: &str = "unknown device";

/// Separator between description and origin (U+2013, matches the volume panel)
pub const NAME_SEPARATOR: &str = " \u{2013} ";

/// Mixer-assigned identifier for an audio device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeviceId(u32);

impl DeviceId {
    pub const fn new(id: u32) -> Self {
        Self(id)
    }

    pub const fn get(self) -> u32 {
        self.0
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Human-readable device name, the durable identity key
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DisplayName(String);

impl DisplayName {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Derive the name the volume panel shows for a device.
    ///
    /// An empty description counts as missing, and so does an empty origin.
    pub fn derive(description: Option<&str>, origin: Option<&str>) -> Self {
        let description = description
            .filter(|d| !d.is_empty())
            .unwrap_or(UNKNOWN_DEVICE);

        match origin.filter(|o| !o.is_empty()) {
            Some(origin) => Self(format!("{description}{NAME_SEPARATOR}{origin}")),
            None => Self(description.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }

    pub fn is_unknown(&self) -> bool {
        self.0 == UNKNOWN_DEVICE
    }
}

impl fmt::Display for DisplayName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for DisplayName {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

impl From<String> for DisplayName {
    fn from(name: String) -> Self {
        Self(name)
    }
}

/// Device class. Everything in muffle is kept symmetric between the two.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceType {
    Output,
    Input,
}

impl DeviceType {
    pub const ALL: [DeviceType; 2] = [DeviceType::Output, DeviceType::Input];

    pub fn as_str(&self) -> &'static str {
        match self {
            DeviceType::Output => "output",
            DeviceType::Input => "input",
        }
    }
}

impl fmt::Display for DeviceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Error)]
#[error("unknown device type '{0}', expected 'output' or 'input'")]
pub struct ParseDeviceTypeError(String);

impl FromStr for DeviceType {
    type Err = ParseDeviceTypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "output" => Ok(DeviceType::Output),
            "input" => Ok(DeviceType::Input),
            other => Err(ParseDeviceTypeError(other.to_string())),
        }
    }
}

/// What the mixer knows about a device
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeviceDescription {
    pub description: Option<String>,
    pub origin: Option<String>,
}

impl DeviceDescription {
    pub fn new(description: Option<&str>, origin: Option<&str>) -> Self {
        Self {
            description: description.map(str::to_string),
            origin: origin.map(str::to_string),
        }
    }

    pub fn display_name(&self) -> DisplayName {
        DisplayName::derive(self.description.as_deref(), self.origin.as_deref())
    }
}

/// Read-only snapshot joining a device id with its identity
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AudioDevice {
    pub id: DeviceId,
    pub display_name: DisplayName,
    pub device_type: DeviceType,
}

impl AudioDevice {
    pub fn from_parts(
        id: DeviceId,
        description: Option<&str>,
        origin: Option<&str>,
        device_type: DeviceType,
    ) -> Self {
        Self {
            id,
            display_name: DisplayName::derive(description, origin),
            device_type,
        }
    }
}

/// Mixer signal a device transition arrives on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MixerEventKind {
    OutputAdded,
    OutputRemoved,
    InputAdded,
    InputRemoved,
}

impl MixerEventKind {
    pub const ALL: [MixerEventKind; 4] = [
        MixerEventKind::OutputAdded,
        MixerEventKind::OutputRemoved,
        MixerEventKind::InputAdded,
        MixerEventKind::InputRemoved,
    ];

    pub fn added(device_type: DeviceType) -> Self {
        match device_type {
            DeviceType::Output => MixerEventKind::OutputAdded,
            DeviceType::Input => MixerEventKind::InputAdded,
        }
    }

    pub fn removed(device_type: DeviceType) -> Self {
        match device_type {
            DeviceType::Output => MixerEventKind::OutputRemoved,
            DeviceType::Input => MixerEventKind::InputRemoved,
        }
    }

    pub fn device_type(&self) -> DeviceType {
        match self {
            MixerEventKind::OutputAdded | MixerEventKind::OutputRemoved => DeviceType::Output,
            MixerEventKind::InputAdded | MixerEventKind::InputRemoved => DeviceType::Input,
        }
    }

    pub fn is_added(&self) -> bool {
        matches!(self, MixerEventKind::OutputAdded | MixerEventKind::InputAdded)
    }

    pub fn signal_name(&self) -> &'static str {
        match self {
            MixerEventKind::OutputAdded => "output-added",
            MixerEventKind::OutputRemoved => "output-removed",
            MixerEventKind::InputAdded => "input-added",
            MixerEventKind::InputRemoved => "input-removed",
        }
    }
}

/// A single device-added/removed transition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MixerEvent {
    pub kind: MixerEventKind,
    pub device_id: DeviceId,
}

/// Connection state reported by the mixer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MixerState {
    Connecting,
    Ready,
    Failed,
    Closed,
}

impl fmt::Display for MixerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            MixerState::Connecting => "connecting",
            MixerState::Ready => "ready",
            MixerState::Failed => "failed",
            MixerState::Closed => "closed",
        };
        f.write_str(s)
    }
}
