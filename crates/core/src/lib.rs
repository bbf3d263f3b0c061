//! muffle core
//!
//! Platform-agnostic pieces of muffle: device identity, the collaborator
//! traits for the mixer, the settings store and the volume panel, and the
//! reconciliation engine that ties them together. Implementations of the
//! collaborators live in the `infra` crate.

pub mod domain;
