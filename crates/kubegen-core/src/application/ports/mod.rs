//! Application ports (traits) for external dependencies.
//!
//! In hexagonal architecture, ports define interfaces that the application
//! needs from the outside world. Adapters in `kubegen-adapters` implement these.
//!
//! ## Port Types
//!
//! - **Driven (Output) Ports**: Called by application, implemented by infrastructure
//!   - `OutputDriver`: File placement and all-or-nothing persistence
//!   - `DocumentSerializer`: Structural objects to text
//!
//! - **Profiles and targets** are domain traits (`ProviderTarget`,
//!   `PersistentVolumeProfile`), also implemented in `kubegen-adapters`

pub mod output;

pub use output::{DocumentSerializer, OutputDriver};

#[cfg(test)]
pub use output::{MockDocumentSerializer, MockOutputDriver};
