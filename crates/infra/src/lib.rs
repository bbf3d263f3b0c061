//! muffle infrastructure
//!
//! In-process implementations of the collaborators the core engine talks
//! to: the mixer, the settings backend and the volume panel.

pub mod mixer;
pub mod panel;
pub mod settings;
