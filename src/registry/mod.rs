//! Model registry module
//!
//! Publishes trained models as numbered versions and moves them through
//! lifecycle stages. [`ModelRegistry`] is built once and handed to callers.

mod registry;
mod store;

pub use registry::{ModelRegistry, VERSION_DESCRIPTION};
pub use store::{ModelVersionInfo, RegistryStore, Stage};
