//! Option Store: layered configuration with deferred references.
//!
//! A store is built once from a literal tree, optionally overlaid with
//! partial trees (each overlay returns a new snapshot), and then only read.
//! References are resolved when read, never when written, so a value can
//! point at a path whose final content is supplied later.

mod path;
mod store;
mod value;

pub use path::DottedPath;
pub use store::OptionStore;
pub use value::{OptionRef, OptionValue, RefScope};
