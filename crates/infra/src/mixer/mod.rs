//! Mixer implementations
//!
//! The simulated mixer stands in for the desktop sound server. It speaks the
//! same [`MixerControl`](muffle_core::domain::MixerControl) contract so the
//! engine cannot tell the difference.

pub mod simulated;

pub use simulated::{SimulatedMixer, SimulatedMixerSource};
