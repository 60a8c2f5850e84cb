//! Infrastructure adapters for kubegen.
//!
//! This crate implements the ports defined in `kubegen-core::application::ports`
//! and supplies the built-in provider targets and stacks. It contains all
//! file I/O and YAML handling.

pub mod drivers;
pub mod providers;
pub mod serializer;
pub mod stacks;
pub mod values;

// Re-export commonly used adapters
pub use drivers::{DirectoryDriver, MemoryDriver, StreamDriver};
pub use providers::{provider_for, provider_with_cluster};
pub use serializer::YamlSerializer;
pub use stacks::{LokiStack, PrometheusStack, Traefik2};
