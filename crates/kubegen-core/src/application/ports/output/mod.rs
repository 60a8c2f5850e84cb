//! Driven (output) ports - implemented by infrastructure.
//!
//! These traits define what the application needs from external systems.
//! The `kubegen-adapters` crate provides implementations.

use crate::domain::{FileId, FileKind, Location, StructuralObject};
use crate::error::KubegenResult;

/// Port for persisting output files.
///
/// Implemented by:
/// - `kubegen_adapters::drivers::DirectoryDriver` (staged directory, production)
/// - `kubegen_adapters::drivers::StreamDriver` (stdout)
/// - `kubegen_adapters::drivers::MemoryDriver` (testing)
///
/// ## Contract
///
/// - `choose_location` is called for every file, in append order, before
///   anything is written
/// - `write` stages content; nothing is visible until `commit`
/// - `rollback` discards everything staged and must be safe to call after a
///   partial `write` sequence
#[cfg_attr(test, mockall::automock)]
pub trait OutputDriver: Send + Sync {
    /// Decide where file `id` will live.
    fn choose_location(&self, id: FileId, kind: FileKind, file_name: &str)
    -> KubegenResult<Location>;

    /// Stage `contents` at `location`.
    fn write(&self, location: &Location, contents: &[u8], executable: bool) -> KubegenResult<()>;

    /// Publish every staged file at once.
    fn commit(&self) -> KubegenResult<()>;

    /// Discard every staged file.
    fn rollback(&self) -> KubegenResult<()>;
}

/// Port for turning structural objects into text.
///
/// Implemented by:
/// - `kubegen_adapters::serializer::YamlSerializer`
#[cfg_attr(test, mockall::automock)]
pub trait DocumentSerializer: Send + Sync {
    /// Serialize `objects` as one multi-document text, in order.
    fn serialize(&self, objects: &[StructuralObject]) -> KubegenResult<String>;
}
